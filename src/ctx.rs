//! Call-scoped configuration and cancellation

use crate::{Result, Error, cfg::StmtCfg, ses::OciSes};
use parking_lot::{Mutex, Condvar};
use std::{
    sync::{Arc, atomic::{AtomicBool, Ordering}},
    thread::JoinHandle,
    time::{Duration, Instant},
};

#[derive(Default)]
struct TokenInner {
    cancelled: Mutex<bool>,
    cv: Condvar,
}

/**
    Cancellation signal shared between the caller and the calls it wants to interrupt.

    # Example
    ```
    use ora::{Ctx, CancelToken};

    let token = CancelToken::new();
    let ctx = Ctx::new().with_cancel(token.clone());
    assert!(!ctx.is_done());
    token.cancel();
    assert!(ctx.is_done());
    ```
*/
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenInner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels every call that is watching this token. Calls started later fail at once.
    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        *cancelled = true;
        self.inner.cv.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    fn wake(&self) {
        let _cancelled = self.inner.cancelled.lock();
        self.inner.cv.notify_all();
    }
}

/**
    Per-call overrides: a statement configuration, a cancellation token and a deadline.

    When a token or a deadline is present the call is watched; on cancellation or when the deadline
    passes the watcher breaks the in-flight server call, the call returns [`Error::Cancelled`], and
    the session is marked bad.
*/
#[derive(Clone, Default)]
pub struct Ctx {
    cfg: Option<StmtCfg>,
    token: Option<CancelToken>,
    deadline: Option<Instant>,
}

impl Ctx {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cfg(mut self, cfg: StmtCfg) -> Self {
        self.cfg = Some(cfg);
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cfg(&self) -> Option<&StmtCfg> {
        self.cfg.as_ref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` when the token has been cancelled or the deadline has passed.
    pub fn is_done(&self) -> bool {
        self.token.as_ref().map_or(false, CancelToken::is_cancelled)
            || self.deadline.map_or(false, |deadline| Instant::now() >= deadline)
    }

    /// Starts a watcher for one call on the session. Fails at once if the context is already done.
    pub(crate) fn watch(&self, ses: &Arc<OciSes>) -> Result<Option<Watch>> {
        if self.is_done() {
            return Err( Error::Cancelled );
        }
        if self.token.is_none() && self.deadline.is_none() {
            return Ok(None);
        }
        let token = self.token.clone().unwrap_or_default();
        let deadline = self.deadline;
        let done = Arc::new(AtomicBool::new(false));
        let fired = Arc::new(AtomicBool::new(false));
        let thread = {
            let token = token.clone();
            let done = done.clone();
            let fired = fired.clone();
            let ses = ses.clone();
            std::thread::Builder::new()
                .name("ora-watch".to_string())
                .spawn(move || {
                    {
                        let mut cancelled = token.inner.cancelled.lock();
                        loop {
                            if done.load(Ordering::Acquire) {
                                return;
                            }
                            if *cancelled {
                                break;
                            }
                            match deadline {
                                Some(deadline) => {
                                    if Instant::now() >= deadline {
                                        break;
                                    }
                                    token.inner.cv.wait_until(&mut cancelled, deadline);
                                }
                                None => token.inner.cv.wait(&mut cancelled),
                            }
                        }
                    }
                    fired.store(true, Ordering::Release);
                    if let Err(err) = ses.break_call() {
                        log::warn!("break: {}", err);
                    }
                })
                .map_err(|err| Error::msg(format!("cannot start the call watcher: {}", err)))?
        };
        Ok( Some( Watch { token, done, fired, ses: ses.clone(), thread: Some(thread) } ) )
    }
}

/// Watches one call. Dropping it stops the watcher.
pub(crate) struct Watch {
    token: CancelToken,
    done: Arc<AtomicBool>,
    fired: Arc<AtomicBool>,
    ses: Arc<OciSes>,
    thread: Option<JoinHandle<()>>,
}

impl Watch {
    fn stop(&mut self) {
        self.done.store(true, Ordering::Release);
        self.token.wake();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("call watcher panicked");
            }
        }
    }

    /// Stops the watcher and converts the result of a call that was broken into `Cancelled`.
    pub(crate) fn finish<T>(mut self, res: Result<T>) -> Result<T> {
        self.stop();
        if self.fired.load(Ordering::Acquire) {
            self.ses.set_bad();
            res.map_err(|_| Error::Cancelled)
        } else {
            res
        }
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runs `call` under the watcher of `ctx`, if it has one.
pub(crate) fn watched<T, F>(ctx: &Ctx, ses: &Arc<OciSes>, call: F) -> Result<T>
where F: FnOnce() -> Result<T>
{
    match ctx.watch(ses)? {
        Some(watch) => watch.finish(call()),
        None => call(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadlines() {
        let ctx = Ctx::new().with_timeout(Duration::from_secs(3600));
        assert!(!ctx.is_done());
        let ctx = Ctx::new().with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(ctx.is_done());
        assert!(!Ctx::new().is_done());
    }

    #[test]
    fn cancellation_is_shared() {
        let token = CancelToken::new();
        let ctx = Ctx::new().with_cancel(token.clone());
        let other = ctx.clone();
        assert!(!other.is_done());
        token.cancel();
        assert!(ctx.is_done());
        assert!(other.is_done());
    }

    #[test]
    fn cfg_override() {
        let cfg = StmtCfg::default().set_prefetch_row_count(7);
        let ctx = Ctx::new().with_cfg(cfg);
        assert_eq!(ctx.cfg().map(StmtCfg::prefetch_row_count), Some(7));
        assert!(Ctx::new().cfg().is_none());
    }
}
