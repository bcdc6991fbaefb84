//! Idle pools of servers and sessions

use crate::{Result, Error, Env, Srv, Ses, Stmt, Dsn, cfg::{SrvCfg, SesCfg}};
use parking_lot::{Mutex, MutexGuard, Condvar};
use std::{fmt, thread, sync::{Arc, Weak}, time::{Duration, Instant}};

/// Number of idle elements a pool keeps when the requested size is 0.
pub const DEFAULT_POOL_SIZE : usize = 4;
/// Default period of the eviction ticker.
pub const DEFAULT_EVICT_DURATION : Duration = Duration::from_secs(60);

/// Shortest eviction period. Shorter ones, zero included, are raised to it.
const MIN_EVICT_DURATION : Duration = Duration::from_millis(10);
const PUT_TIMEOUT : Duration = Duration::from_secs(1);
const GET_TIMEOUT : Duration = Duration::from_millis(10);

/// Resources that an [`IdlePool`] closes when it evicts or discards them.
pub trait Close: Send + 'static {
    fn close(&self) -> Result<()>;
}

impl Close for Env {
    fn close(&self) -> Result<()> {
        Env::close(self)
    }
}

impl Close for Srv {
    fn close(&self) -> Result<()> {
        Srv::close(self)
    }
}

impl Close for Ses {
    fn close(&self) -> Result<()> {
        Ses::close(self)
    }
}

impl Close for Stmt {
    fn close(&self) -> Result<()> {
        Stmt::close(self)
    }
}

fn close_quietly<T: Close>(elem: T, why: &str) {
    if let Err(err) = elem.close() {
        log::warn!("idle pool {}: {}", why, err);
    }
}

struct TickerState {
    period: Duration,
    /// Bumped on every period change to restart the wait
    epoch: u64,
    stopped: bool,
}

/// Calls an eviction callback every period until stopped or the callback returns `false`.
struct Ticker {
    state: Arc<(Mutex<TickerState>, Condvar)>,
}

impl Ticker {
    fn start<F>(period: Duration, evict: F) -> Self
    where
        F: Fn(Duration) -> bool + Send + 'static
    {
        let period = period.max(MIN_EVICT_DURATION);
        let state = Arc::new((Mutex::new(TickerState { period, epoch: 0, stopped: false }), Condvar::new()));
        let shared = state.clone();
        let spawned = thread::Builder::new()
            .name("ora-evict".to_string())
            .spawn(move || {
                let (lock, cv) = &*shared;
                let mut state = lock.lock();
                while !state.stopped {
                    let epoch = state.epoch;
                    let period = state.period;
                    let timed_out = cv.wait_for(&mut state, period).timed_out();
                    if state.stopped || epoch != state.epoch || !timed_out {
                        continue;
                    }
                    let alive = MutexGuard::unlocked(&mut state, || evict(period));
                    if !alive {
                        break;
                    }
                }
            });
        if let Err(err) = spawned {
            log::warn!("cannot start the eviction ticker: {}", err);
        }
        Self { state }
    }

    fn set_period(&self, period: Duration) {
        let (lock, cv) = &*self.state;
        let mut state = lock.lock();
        state.period = period.max(MIN_EVICT_DURATION);
        state.epoch += 1;
        cv.notify_all();
    }

    fn period(&self) -> Duration {
        self.state.0.lock().period
    }

    fn stop(&self) {
        let (lock, cv) = &*self.state;
        lock.lock().stopped = true;
        cv.notify_all();
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Idle<T> {
    elem: T,
    since: Instant,
}

struct Slots<T> {
    elems: Vec<Idle<T>>,
    closed: bool,
}

struct IdleInner<T: Close> {
    slots: Mutex<Slots<T>>,
    /// Signals a change in the number of idle elements, or close
    changed: Condvar,
    capacity: usize,
    put_timeout: Duration,
    get_timeout: Duration,
    ticker: Ticker,
}

impl<T: Close> IdleInner<T> {
    /// Waits up to the put timeout for a free slot. Closes the element if none frees up.
    fn deposit(&self, elem: T) {
        let deadline = Instant::now() + self.put_timeout;
        let mut slots = self.slots.lock();
        while !slots.closed && slots.elems.len() >= self.capacity {
            if self.changed.wait_until(&mut slots, deadline).timed_out() {
                break;
            }
        }
        if !slots.closed && slots.elems.len() < self.capacity {
            slots.elems.push(Idle { elem, since: Instant::now() });
            self.changed.notify_all();
            return;
        }
        drop(slots);
        log::debug!("idle pool full, closing the element");
        close_quietly(elem, "overflow");
    }

    fn evict(&self, max_age: Duration) -> usize {
        let stale = {
            let mut slots = self.slots.lock();
            if slots.closed {
                return 0;
            }
            let limit = slots.elems.len() / 2 + 1;
            let now = Instant::now();
            let mut stale = Vec::new();
            let mut i = slots.elems.len();
            while i > 0 && stale.len() < limit {
                i -= 1;
                if now.saturating_duration_since(slots.elems[i].since) >= max_age {
                    stale.push(slots.elems.remove(i).elem);
                }
            }
            if !stale.is_empty() {
                self.changed.notify_all();
            }
            stale
        };
        let num = stale.len();
        if num > 0 {
            log::debug!("evicted {} idle elements", num);
        }
        for elem in stale {
            close_quietly(elem, "eviction");
        }
        num
    }
}

/**
    Bounded store of idle resources.

    Elements are handed out last-in first-out. A ticker evicts elements that have been idle longer
    than its period, at most half the pool plus one on each tick. Evicted, discarded and remaining
    elements at [`IdlePool::close`] are closed.

    # Example
    ```
    use ora::{IdlePool, Close};

    struct Conn(u32);
    impl Close for Conn {
        fn close(&self) -> ora::Result<()> { Ok(()) }
    }

    let pool = IdlePool::new(2);
    pool.put(Conn(1));
    pool.put(Conn(2));
    assert_eq!(pool.len(), 2);
    assert_eq!(pool.get().map(|c| c.0), Some(2));
    pool.close()?;
    assert!(pool.get().is_none());
    # Ok::<(),ora::Error>(())
    ```
*/
pub struct IdlePool<T: Close> {
    inner: Arc<IdleInner<T>>,
}

impl<T: Close> Clone for IdlePool<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: Close> fmt::Debug for IdlePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("IdlePool")
            .field("capacity", &self.inner.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl<T: Close> IdlePool<T> {
    /// Creates a pool that keeps up to `capacity` idle elements. 0 selects [`DEFAULT_POOL_SIZE`].
    pub fn new(capacity: usize) -> Self {
        Self::with_timeouts(capacity, PUT_TIMEOUT, GET_TIMEOUT, DEFAULT_EVICT_DURATION)
    }

    pub(crate) fn with_timeouts(capacity: usize, put_timeout: Duration, get_timeout: Duration, evict_every: Duration) -> Self {
        let capacity = if capacity == 0 { DEFAULT_POOL_SIZE } else { capacity };
        let inner = Arc::new_cyclic(|this: &Weak<IdleInner<T>>| {
            let this = this.clone();
            let ticker = Ticker::start(evict_every, move |max_age| {
                match this.upgrade() {
                    Some(pool) => {
                        pool.evict(max_age);
                        true
                    }
                    None => false,
                }
            });
            IdleInner {
                slots: Mutex::new(Slots { elems: Vec::with_capacity(capacity), closed: false }),
                changed: Condvar::new(),
                capacity, put_timeout, get_timeout, ticker,
            }
        });
        Self { inner }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of idle elements.
    pub fn len(&self) -> usize {
        self.inner.slots.lock().elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.slots.lock().closed
    }

    /**
        Stores an idle element.

        Returns at once. When the pool is full a background thread waits up to a second for a
        free slot and closes the element if none frees up. A closed pool closes the element.
    */
    pub fn put(&self, elem: T) {
        let mut slots = self.inner.slots.lock();
        if slots.closed {
            drop(slots);
            close_quietly(elem, "put after close");
            return;
        }
        if slots.elems.len() < self.inner.capacity {
            slots.elems.push(Idle { elem, since: Instant::now() });
            self.inner.changed.notify_all();
            return;
        }
        drop(slots);
        let inner = self.inner.clone();
        let spawned = thread::Builder::new()
            .name("ora-idle-put".to_string())
            .spawn(move || inner.deposit(elem));
        if let Err(err) = spawned {
            log::warn!("cannot start the idle pool deposit: {}", err);
        }
    }

    /// Takes the most recently stored element. Waits up to 10 ms for one to appear.
    pub fn get(&self) -> Option<T> {
        let deadline = Instant::now() + self.inner.get_timeout;
        let mut slots = self.inner.slots.lock();
        loop {
            if slots.closed {
                return None;
            }
            if let Some(idle) = slots.elems.pop() {
                self.inner.changed.notify_all();
                return Some(idle.elem);
            }
            if self.inner.changed.wait_until(&mut slots, deadline).timed_out() {
                return if slots.closed { None } else { slots.elems.pop().map(|idle| idle.elem) };
            }
        }
    }

    /**
        Closes elements that have been idle for at least `max_age`, newest first, and at most half
        of the pool plus one. Returns the number of closed elements.
    */
    pub fn evict(&self, max_age: Duration) -> usize {
        self.inner.evict(max_age)
    }

    /**
        Changes the period of the eviction ticker. Each tick evicts elements idle for a full period.
        Periods under 10 ms, zero included, are raised to 10 ms.
    */
    pub fn set_evict_duration(&self, period: Duration) {
        self.inner.ticker.set_period(period);
    }

    pub fn evict_duration(&self) -> Duration {
        self.inner.ticker.period()
    }

    /// Stops the ticker and closes every idle element. Later operations do nothing.
    pub fn close(&self) -> Result<()> {
        let elems = {
            let mut slots = self.inner.slots.lock();
            if slots.closed {
                return Ok(());
            }
            slots.closed = true;
            self.inner.changed.notify_all();
            std::mem::take(&mut slots.elems)
        };
        self.inner.ticker.stop();
        let mut errs = Vec::new();
        for idle in elems {
            if let Err(err) = idle.elem.close() {
                errs.push(err);
            }
        }
        Error::collect(errs)
    }
}

/// Idle session that returns its server to the server pool when closed.
struct IdleSes {
    ses: Ses,
    srvs: IdlePool<Srv>,
}

impl Close for IdleSes {
    fn close(&self) -> Result<()> {
        let srv = self.ses.srv();
        let bad = self.ses.is_bad();
        let res = self.ses.close_now();
        if let Some(srv) = srv {
            if bad || res.is_err() {
                close_quietly(srv, "server of a bad session");
            } else if srv.is_open() {
                self.srvs.put(srv);
            }
        }
        res
    }
}

pub(crate) struct PoolInner {
    env: Env,
    own_env: bool,
    srv_cfg: SrvCfg,
    ses_cfg: SesCfg,
    lock: Mutex<()>,
    srvs: IdlePool<Srv>,
    sess: IdlePool<IdleSes>,
}

impl PoolInner {
    /// Takes back a session that was closed by the application.
    pub(crate) fn put_back(&self, ses: Ses) {
        if !ses.is_open() {
            return;
        }
        log::debug!("{} returned to the pool", ses.sys_name());
        self.sess.put(IdleSes { ses, srvs: self.srvs.clone() });
    }
}

/**
    Reuses idle sessions and the servers they run on.

    Each session that the pool opens runs on its own server. Closing a session taken from the pool
    returns it to the pool; bad sessions are closed with their servers. The pool does not limit
    the number of sessions in use.

    # Example
    ```no_run
    let pool = ora::Pool::open("scott/tiger@localhost/orcl", 4)?;
    let ses = pool.get()?;
    ses.ping()?;
    ses.close()?;
    let again = pool.get()?;
    again.close()?;
    pool.close()?;
    # Ok::<(),ora::Error>(())
    ```
*/
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Pool")
            .field("idle_srv", &self.inner.srvs.len())
            .field("idle_ses", &self.inner.sess.len())
            .finish()
    }
}

impl Pool {
    /// Creates a pool that opens servers and sessions in `env`. `size` limits idle servers and idle sessions.
    pub fn new(env: &Env, srv_cfg: SrvCfg, ses_cfg: SesCfg, size: usize) -> Self {
        Self::with_env(env.clone(), false, srv_cfg, ses_cfg, size)
    }

    /// Opens a new environment and creates a pool for the connection string. The environment is
    /// closed with the pool.
    pub fn open(dsn: &str, size: usize) -> Result<Self> {
        let dsn = Dsn::parse(dsn)?;
        let env = Env::open()?;
        Ok( Self::with_env(env, true, dsn.srv_cfg(), dsn.ses_cfg(), size) )
    }

    fn with_env(env: Env, own_env: bool, srv_cfg: SrvCfg, ses_cfg: SesCfg, size: usize) -> Self {
        let inner = PoolInner {
            env, own_env, srv_cfg, ses_cfg,
            lock: Mutex::new(()),
            srvs: IdlePool::new(size),
            sess: IdlePool::new(size),
        };
        Self { inner: Arc::new(inner) }
    }

    /**
        Returns an idle session that answers a ping, or a new session on an idle server, or a new
        session on a new server.
    */
    pub fn get(&self) -> Result<Ses> {
        let _guard = self.inner.lock.lock();
        let pool = Arc::downgrade(&self.inner);
        while let Some(idle) = self.inner.sess.get() {
            match idle.ses.ping() {
                Ok(()) => {
                    log::debug!("{} reused", idle.ses.sys_name());
                    idle.ses.set_pool(pool);
                    return Ok(idle.ses);
                }
                Err(err) => log::warn!("{} discarded: {}", idle.ses.sys_name(), err),
            }
            close_quietly(idle, "stale session");
        }
        while let Some(srv) = self.inner.srvs.get() {
            match srv.open_ses(&self.inner.ses_cfg) {
                Ok(ses) => {
                    ses.set_pool(pool);
                    return Ok(ses);
                }
                Err(err) => {
                    log::warn!("{} logon: {}", srv.sys_name(), err);
                    close_quietly(srv, "server without session");
                }
            }
        }
        let srv = self.inner.env.open_srv(&self.inner.srv_cfg)?;
        match srv.open_ses(&self.inner.ses_cfg) {
            Ok(ses) => {
                ses.set_pool(pool);
                Ok(ses)
            }
            Err(err) => {
                close_quietly(srv, "server without session");
                Err(err)
            }
        }
    }

    /// Number of idle sessions.
    pub fn num_idle_ses(&self) -> usize {
        self.inner.sess.len()
    }

    /// Number of idle servers without a session.
    pub fn num_idle_srv(&self) -> usize {
        self.inner.srvs.len()
    }

    /// Sets how often idle sessions and servers are evicted, and how long they must be idle.
    pub fn set_evict_duration(&self, period: Duration) {
        self.inner.sess.set_evict_duration(period);
        self.inner.srvs.set_evict_duration(period);
    }

    /// Closes idle sessions and servers. Sessions in use are not affected, but are closed instead
    /// of returned from then on.
    pub fn close(&self) -> Result<()> {
        let _guard = self.inner.lock.lock();
        let mut errs = Vec::new();
        errs.extend(self.inner.sess.close().err());
        errs.extend(self.inner.srvs.close().err());
        if self.inner.own_env {
            errs.extend(self.inner.env.close().err());
        }
        Error::collect(errs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Item {
        id: usize,
        closed: Arc<AtomicUsize>,
    }

    impl Close for Item {
        fn close(&self) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn items(num: usize, closed: &Arc<AtomicUsize>) -> Vec<Item> {
        (0..num).map(|id| Item { id, closed: closed.clone() }).collect()
    }

    fn quick_pool(capacity: usize) -> IdlePool<Item> {
        IdlePool::with_timeouts(capacity, Duration::from_millis(50), Duration::from_millis(5), Duration::from_secs(3600))
    }

    #[test]
    fn get_is_lifo() {
        let closed = Arc::new(AtomicUsize::new(0));
        let pool = quick_pool(3);
        for item in items(3, &closed) {
            pool.put(item);
        }
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.get().map(|item| item.id), Some(2));
        assert_eq!(pool.get().map(|item| item.id), Some(1));
        assert_eq!(pool.get().map(|item| item.id), Some(0));
        assert!(pool.get().is_none());
        assert_eq!(closed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn zero_capacity_uses_default() {
        let pool = quick_pool(0);
        assert_eq!(pool.capacity(), DEFAULT_POOL_SIZE);
    }

    #[test]
    fn overflow_is_closed_after_put_timeout() {
        let closed = Arc::new(AtomicUsize::new(0));
        let pool = quick_pool(2);
        for item in items(3, &closed) {
            pool.put(item);
        }
        assert_eq!(pool.len(), 2);
        thread::sleep(Duration::from_millis(300));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn overflow_is_deposited_when_a_slot_frees_up() {
        let closed = Arc::new(AtomicUsize::new(0));
        let pool = IdlePool::with_timeouts(1, Duration::from_secs(5), Duration::from_millis(5), Duration::from_secs(3600));
        let mut all = items(2, &closed).into_iter();
        pool.put(all.next().unwrap());
        pool.put(all.next().unwrap());
        thread::sleep(Duration::from_millis(20));
        assert_eq!(pool.get().map(|item| item.id), Some(0));
        thread::sleep(Duration::from_millis(100));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.get().map(|item| item.id), Some(1));
        assert_eq!(closed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn get_waits_for_a_put() {
        let closed = Arc::new(AtomicUsize::new(0));
        let pool = IdlePool::with_timeouts(1, Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(3600));
        let producer = {
            let pool = pool.clone();
            let item = Item { id: 7, closed: closed.clone() };
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                pool.put(item);
            })
        };
        assert_eq!(pool.get().map(|item| item.id), Some(7));
        producer.join().unwrap();
    }

    #[test]
    fn evict_closes_half_plus_one_newest_first() {
        let closed = Arc::new(AtomicUsize::new(0));
        let pool = quick_pool(5);
        for item in items(5, &closed) {
            pool.put(item);
        }
        assert_eq!(pool.evict(Duration::from_secs(0)), 3);
        assert_eq!(closed.load(Ordering::SeqCst), 3);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get().map(|item| item.id), Some(1));
        assert_eq!(pool.get().map(|item| item.id), Some(0));
    }

    #[test]
    fn evict_keeps_fresh_elements() {
        let closed = Arc::new(AtomicUsize::new(0));
        let pool = quick_pool(4);
        for item in items(4, &closed) {
            pool.put(item);
        }
        assert_eq!(pool.evict(Duration::from_secs(3600)), 0);
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn ticker_evicts() {
        let closed = Arc::new(AtomicUsize::new(0));
        let pool = quick_pool(4);
        for item in items(4, &closed) {
            pool.put(item);
        }
        pool.set_evict_duration(Duration::from_millis(20));
        assert_eq!(pool.evict_duration(), Duration::from_millis(20));
        thread::sleep(Duration::from_millis(400));
        assert_eq!(pool.len(), 0);
        assert_eq!(closed.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn zero_evict_period_is_raised() {
        let closed = Arc::new(AtomicUsize::new(0));
        let pool = quick_pool(2);
        pool.set_evict_duration(Duration::ZERO);
        assert_eq!(pool.evict_duration(), MIN_EVICT_DURATION);
        for item in items(2, &closed) {
            pool.put(item);
        }
        thread::sleep(Duration::from_millis(300));
        assert_eq!(pool.len(), 0);
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn close_drains_and_disables() {
        let closed = Arc::new(AtomicUsize::new(0));
        let pool = quick_pool(3);
        let mut all = items(4, &closed);
        let last = all.pop().unwrap();
        for item in all {
            pool.put(item);
        }
        pool.close().unwrap();
        assert!(pool.is_closed());
        assert_eq!(closed.load(Ordering::SeqCst), 3);
        assert!(pool.get().is_none());
        pool.put(last);
        assert_eq!(closed.load(Ordering::SeqCst), 4);
        assert_eq!(pool.evict(Duration::from_secs(0)), 0);
        pool.close().unwrap();
    }
}
