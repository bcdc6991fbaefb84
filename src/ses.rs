//! User session

use crate::{
    Result, Error,
    oci::*,
    cfg::{ColumnType, StmtCfg, SesCfg},
    ctx::Ctx,
    drv::{DRV, Level},
    pool::PoolInner,
    reg::{self, Registry},
    rset::Rset,
    srv::{OciSrv, SrvInner, SrvKind, Srv},
    stmt::Stmt,
    tx::Tx,
    bind::Arg,
};
use parking_lot::{Mutex, RwLock, ReentrantMutex, ReentrantMutexGuard};
use std::{ptr, fmt, time::Duration, sync::{Arc, Weak, atomic::{AtomicBool, Ordering}}};

const DRIVER_NAME : &str = concat!("ora : ", env!("CARGO_PKG_VERSION"));

/// Default inactivity timeout of transactions.
pub const DEFAULT_TX_TIMEOUT : Duration = Duration::from_secs(60);

pub(crate) enum SesKind {
    Begun { usr: Handle<OCISession>, svc: Handle<OCISvcCtx> },
    Pooled { svc: Ptr<OCISvcCtx>, _auth: Handle<OCIAuthInfo> },
}

/**
    Native session.

    `call` serializes every server round trip made on the session, and every use of `err`.
    The break path uses its own error handle as it runs while a call is in flight.
*/
pub(crate) struct OciSes {
    kind: SesKind,
    usr: Ptr<OCISession>,
    err: Handle<OCIError>,
    brk: Handle<OCIError>,
    call: ReentrantMutex<()>,
    bad: AtomicBool,
    released: AtomicBool,
    srv: Arc<OciSrv>,
}

impl Drop for OciSes {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            log::warn!("session release: {}", err);
        }
    }
}

impl OciSes {
    fn begin(srv: Arc<OciSrv>, cfg: &SesCfg) -> Result<Self> {
        let env = srv.env().env();
        let err = Handle::<OCIError>::new(env)?;
        let brk = Handle::<OCIError>::new(env)?;
        let errp = err.get();
        let (kind, usr) = match srv.kind() {
            SrvKind::Server(server) => {
                let svc = Handle::<OCISvcCtx>::new(env)?;
                svc.set_attr(OCI_ATTR_SERVER, server.get(), errp)?;
                let usr = Handle::<OCISession>::new(env)?;
                let cred = if cfg.is_external() {
                    OCI_CRED_EXT
                } else {
                    usr.set_attr(OCI_ATTR_USERNAME, cfg.username.as_str(), errp)?;
                    usr.set_attr(OCI_ATTR_PASSWORD, cfg.password.as_str(), errp)?;
                    OCI_CRED_RDBMS
                };
                usr.set_attr(OCI_ATTR_DRIVER_NAME, DRIVER_NAME, errp)?;
                catch!{errp =>
                    OCISessionBegin(svc.get(), errp, usr.get(), cred, cfg.mode.oci_mode() | OCI_STMT_CACHE)
                }
                svc.set_attr(OCI_ATTR_SESSION, usr.get(), errp)?;
                let usr_ptr = Ptr::new(usr.get());
                (SesKind::Begun { usr, svc }, usr_ptr)
            }
            SrvKind::SesPool { name, .. } | SrvKind::ConnPool { name, .. } => {
                let auth = Handle::<OCIAuthInfo>::new(env)?;
                let mut mode = match srv.kind() {
                    SrvKind::ConnPool { .. } => OCI_SESSGET_CPOOL,
                    _ => OCI_SESSGET_SPOOL,
                } | OCI_SESSGET_STMTCACHE;
                if cfg.is_external() {
                    mode |= OCI_SESSGET_CREDEXT;
                } else {
                    auth.set_attr(OCI_ATTR_USERNAME, cfg.username.as_str(), errp)?;
                    auth.set_attr(OCI_ATTR_PASSWORD, cfg.password.as_str(), errp)?;
                }
                auth.set_attr(OCI_ATTR_DRIVER_NAME, DRIVER_NAME, errp)?;
                let mut svc = Ptr::<OCISvcCtx>::null();
                let mut found = 0u8;
                catch!{errp =>
                    OCISessionGet(
                        env, errp, svc.as_mut_ptr(), auth.get(),
                        name.as_ptr(), name.len() as u32, ptr::null(), 0,
                        ptr::null_mut(), ptr::null_mut(), &mut found, mode
                    )
                }
                let usr : Ptr<OCISession> = attr::get(OCI_ATTR_SESSION, OCI_HTYPE_SVCCTX, svc.get() as _, errp)?;
                (SesKind::Pooled { svc, _auth: auth }, usr)
            }
        };
        Ok( Self {
            kind, usr, err, brk,
            call: ReentrantMutex::new(()),
            bad: AtomicBool::new(false),
            released: AtomicBool::new(false),
            srv,
        } )
    }

    pub(crate) fn svc(&self) -> *mut OCISvcCtx {
        match &self.kind {
            SesKind::Begun { svc, .. } => svc.get(),
            SesKind::Pooled { svc, .. } => svc.get(),
        }
    }

    /// Session handle. Date and time values are constructed in its time zone.
    pub(crate) fn usr(&self) -> *mut OCISession {
        self.usr.get()
    }

    pub(crate) fn env(&self) -> *mut OCIEnv {
        self.srv.env().env()
    }

    pub(crate) fn err(&self) -> *mut OCIError {
        self.err.get()
    }

    /// Takes the call lock. Calls made on the same thread while it is held do not block.
    pub(crate) fn lock(&self) -> ReentrantMutexGuard<()> {
        self.call.lock()
    }

    pub(crate) fn is_bad(&self) -> bool {
        self.bad.load(Ordering::Acquire)
    }

    pub(crate) fn set_bad(&self) {
        if !self.bad.swap(true, Ordering::AcqRel) {
            log::warn!("session marked bad");
        }
    }

    /// Marks the session bad when the error means it cannot be reused.
    pub(crate) fn check(&self, err: Error) -> Error {
        if err.is_session_bad() {
            self.set_bad();
        }
        err
    }

    /**
        Runs one OCI call on the session under the call lock. Errors are read from the session
        error handle; other return codes, like `OCI_NO_DATA`, are passed through.
    */
    pub(crate) fn call<F>(&self, f: F) -> Result<i32>
    where F: FnOnce(*mut OCISvcCtx, *mut OCIError) -> i32
    {
        let _call = self.call.lock();
        let errp = self.err.get();
        let res = f(self.svc(), errp);
        match res {
            OCI_ERROR | OCI_INVALID_HANDLE => Err( self.check(Error::oci(errp, res)) ),
            _ => Ok(res)
        }
    }

    /// Interrupts the call in flight.
    pub(crate) fn break_call(&self) -> Result<()> {
        let brk = self.brk.get();
        let svc = self.svc();
        log::debug!("break");
        catch!{brk =>
            OCIBreak(svc as _, brk)
        }
        catch!{brk =>
            OCIReset(svc as _, brk)
        }
        Ok(())
    }

    /// Ends the session or returns it to the native pool. Only the first call does anything.
    pub(crate) fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let _call = self.call.lock();
        let errp = self.err.get();
        let res = match &self.kind {
            SesKind::Begun { usr, svc } => unsafe {
                OCISessionEnd(svc.get(), errp, usr.get(), OCI_DEFAULT)
            },
            SesKind::Pooled { svc, .. } => {
                let mode = if self.is_bad() { OCI_SESSRLS_DROPSESS } else { OCI_DEFAULT };
                unsafe { OCISessionRelease(svc.get(), errp, ptr::null(), 0, mode) }
            }
        };
        match res {
            OCI_ERROR | OCI_INVALID_HANDLE => {
                let err = Error::oci(errp, res);
                if self.is_bad() {
                    log::warn!("release of a bad session: {}", err);
                    Ok(())
                } else {
                    Err(err)
                }
            }
            _ => Ok(())
        }
    }
}

pub(crate) struct SesInner {
    id: u64,
    name: String,
    close_lock: Mutex<()>,
    oci: RwLock<Option<Arc<OciSes>>>,
    srv: RwLock<Weak<SrvInner>>,
    cfg: RwLock<Option<StmtCfg>>,
    stmts: Registry<Stmt>,
    txs: Registry<Tx>,
    /// Pool that takes the session back on close. One-shot.
    pool: Mutex<Option<Weak<PoolInner>>>,
    close_srv: AtomicBool,
}

impl SesInner {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn oci(&self) -> Result<Arc<OciSes>> {
        self.oci.read().clone().ok_or(Error::Closed("Ses"))
    }

    pub(crate) fn stmt_cfg(&self) -> StmtCfg {
        let cfg = self.cfg.read().clone();
        match cfg {
            Some(cfg) => cfg,
            None => {
                let srv = self.srv.read().upgrade();
                srv.map(|srv| srv.stmt_cfg()).unwrap_or_else(|| DRV.stmt_cfg())
            }
        }
    }

    /// Returns `true` while a transaction started on this session is open.
    pub(crate) fn has_open_tx(&self) -> bool {
        !self.txs.is_empty()
    }

    pub(crate) fn remove_stmt(&self, id: u64) {
        self.stmts.remove(id);
    }

    pub(crate) fn remove_tx(&self, id: u64) {
        self.txs.remove(id);
    }
}

/**
    An authenticated session on a server.

    A session runs one server call at a time; threads sharing it take turns.

    # Example
    ```no_run
    let env = ora::Env::open()?;
    let ses = env.connect("scott/tiger@localhost/orcl")?;
    ses.set_action("reports", "monthly")?;
    let tx = ses.start_tx()?;
    ses.prep_and_exe("UPDATE emp SET sal = sal * 1.1 WHERE deptno = :1", &mut [10.into()])?;
    tx.commit()?;
    ses.close()?;
    # Ok::<(),ora::Error>(())
    ```
*/
#[derive(Clone)]
pub struct Ses {
    inner: Arc<SesInner>,
}

impl fmt::Debug for Ses {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

impl Ses {
    pub(crate) fn open(srv: &Arc<SrvInner>, oci_srv: Arc<OciSrv>, cfg: &SesCfg) -> Result<Self> {
        let oci = OciSes::begin(oci_srv, cfg)?;
        let id = DRV.next_id(Level::Ses);
        let name = reg::sys_name(srv.name(), 'S', id);
        log::debug!("{} opened ({})", name, if cfg.is_external() { "external" } else { cfg.username.as_str() });
        let inner = SesInner {
            id, name,
            close_lock: Mutex::new(()),
            oci: RwLock::new(Some(Arc::new(oci))),
            srv: RwLock::new(Arc::downgrade(srv)),
            cfg: RwLock::new(cfg.stmt.clone()),
            stmts: Registry::new(),
            txs: Registry::new(),
            pool: Mutex::new(None),
            close_srv: AtomicBool::new(false),
        };
        Ok( Self { inner: Arc::new(inner) } )
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    pub(crate) fn inner(&self) -> &Arc<SesInner> {
        &self.inner
    }

    /// Makes `close` close the server too. Used for the server that `Env::connect` opens.
    pub(crate) fn close_srv_with_ses(&self) {
        self.inner.close_srv.store(true, Ordering::Release);
    }

    pub(crate) fn set_pool(&self, pool: Weak<PoolInner>) {
        *self.inner.pool.lock() = Some(pool);
    }

    /// Returns the system name, like `E1S3S2`.
    pub fn sys_name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_open(&self) -> bool {
        self.inner.oci.read().is_some()
    }

    /// Returns `true` after an error that means the session cannot be reused.
    pub fn is_bad(&self) -> bool {
        self.inner.oci.read().as_ref().map_or(false, |oci| oci.is_bad())
    }

    /// Returns the server the session was opened on, unless it has been closed.
    pub fn srv(&self) -> Option<Srv> {
        let srv = self.inner.srv.read().upgrade()?;
        Some( Srv::from_inner(srv) )
    }

    pub fn cfg(&self) -> StmtCfg {
        self.inner.stmt_cfg()
    }

    pub fn set_cfg(&self, cfg: StmtCfg) {
        *self.inner.cfg.write() = Some(cfg);
    }

    /// Returns the number of open statements.
    pub fn num_stmt(&self) -> usize {
        self.inner.stmts.len()
    }

    /// Returns the number of open transactions.
    pub fn num_tx(&self) -> usize {
        self.inner.txs.len()
    }

    /// Prepares a statement. Result set columns get their host types from the configuration.
    pub fn prep(&self, sql: &str) -> Result<Stmt> {
        self.prep_with(sql, &[])
    }

    /**
        Prepares a statement with host type hints for the leading select-list columns.
        `ColumnType::Default` leaves a column to the configuration.

        # Example
        ```no_run
        use ora::ColumnType;

        # let env = ora::Env::open()?;
        # let ses = env.connect("scott/tiger@localhost/orcl")?;
        let stmt = ses.prep_with("SELECT empno, comm FROM emp", &[ColumnType::I32, ColumnType::OraF64])?;
        let rset = stmt.qry(&mut [])?;
        while let Some(row) = rset.next_row()? {
            let _empno : i32 = row.get(0)?;
            let _comm : Option<f64> = row.get(1)?;
        }
        # Ok::<(),ora::Error>(())
        ```
    */
    pub fn prep_with(&self, sql: &str, gcts: &[ColumnType]) -> Result<Stmt> {
        let _guard = self.inner.close_lock.lock();
        let oci = self.inner.oci()?;
        let stmt = Stmt::prepare(&self.inner, oci, sql, gcts)?;
        self.inner.stmts.add(stmt.id(), stmt.clone());
        Ok(stmt)
    }

    /// Prepares, executes and closes a statement. Returns the number of affected rows.
    pub fn prep_and_exe(&self, sql: &str, args: &mut [Arg]) -> Result<u64> {
        let stmt = self.prep(sql)?;
        let res = stmt.exe(args);
        let close_res = stmt.close();
        let rows = res?;
        close_res?;
        Ok(rows)
    }

    /// Prepares and runs a query. The statement is closed when its result set is exhausted or closed.
    pub fn prep_and_qry(&self, sql: &str, args: &mut [Arg]) -> Result<Rset> {
        let stmt = self.prep(sql)?;
        match stmt.qry(args) {
            Ok(rset) => {
                rset.set_auto_close();
                Ok(rset)
            }
            Err(err) => {
                if let Err(close_err) = stmt.close() {
                    log::warn!("{} close: {}", stmt.sys_name(), close_err);
                }
                Err(err)
            }
        }
    }

    /// Starts a transaction with the default inactivity timeout of 60 seconds.
    pub fn start_tx(&self) -> Result<Tx> {
        self.start_tx_with(DEFAULT_TX_TIMEOUT)
    }

    /**
        Starts a transaction that the server rolls back after `timeout` of inactivity.

        While a transaction is open, statements of this session do not commit on success.
    */
    pub fn start_tx_with(&self, timeout: Duration) -> Result<Tx> {
        let _guard = self.inner.close_lock.lock();
        let oci = self.inner.oci()?;
        let tx = Tx::begin(&self.inner, oci, timeout)?;
        self.inner.txs.add(tx.id(), tx.clone());
        Ok(tx)
    }

    /// Commits the most recently started open transaction, or the session's implicit one when
    /// no transaction was started.
    pub fn commit(&self) -> Result<()> {
        match self.inner.txs.last() {
            Some(tx) => tx.commit(),
            None => {
                let oci = self.inner.oci()?;
                oci.call(|svc, errp| unsafe { OCITransCommit(svc, errp, OCI_DEFAULT) })?;
                log::debug!("{} commit", self.inner.name);
                Ok(())
            }
        }
    }

    /// Rolls back the most recently started open transaction, or the session's implicit one
    /// when no transaction was started.
    pub fn rollback(&self) -> Result<()> {
        match self.inner.txs.last() {
            Some(tx) => tx.rollback(),
            None => {
                let oci = self.inner.oci()?;
                oci.call(|svc, errp| unsafe { OCITransRollback(svc, errp, OCI_DEFAULT) })?;
                log::debug!("{} rollback", self.inner.name);
                Ok(())
            }
        }
    }

    /// Makes a round trip to the server.
    pub fn ping(&self) -> Result<()> {
        self.ping_ctx(&Ctx::default())
    }

    pub fn ping_ctx(&self, ctx: &Ctx) -> Result<()> {
        let oci = self.inner.oci()?;
        crate::ctx::watched(ctx, &oci, || {
            let _call = oci.lock();
            let errp = oci.err();
            let res = unsafe { OCIPing(oci.svc(), errp, OCI_DEFAULT) };
            match res {
                OCI_ERROR | OCI_INVALID_HANDLE => {
                    let err = Error::oci(errp, res);
                    // servers older than 10.2 do not know OCIPing
                    if err.code() == 1010 { Ok(()) } else { Err(oci.check(err)) }
                }
                _ => Ok(())
            }
        })
    }

    /// Interrupts the server call that another thread is running on this session.
    /// The session is marked bad.
    pub fn break_call(&self) -> Result<()> {
        let oci = self.inner.oci()?;
        oci.set_bad();
        oci.break_call()
    }

    /// Sets the module and action reported in `V$SESSION`.
    pub fn set_action(&self, module: &str, action: &str) -> Result<()> {
        let oci = self.inner.oci()?;
        let _call = oci.lock();
        attr::set(OCI_ATTR_MODULE, module, OCI_HTYPE_SESSION, oci.usr() as _, oci.err())?;
        attr::set(OCI_ATTR_ACTION, action, OCI_HTYPE_SESSION, oci.usr() as _, oci.err())
    }

    /// Returns the version banner of the server the session runs on.
    pub fn version(&self) -> Result<String> {
        let oci = self.inner.oci()?;
        let _call = oci.lock();
        let mut buf = vec![0u8; 512];
        let errp = oci.err();
        catch!{errp =>
            OCIServerVersion(oci.svc() as _, errp, buf.as_mut_ptr(), buf.len() as u32, OCI_HTYPE_SVCCTX as u8)
        }
        let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        buf.truncate(len);
        Ok( String::from_utf8_lossy(&buf).into_owned() )
    }

    /**
        Closes the session with its statements and transactions. Open transactions are neither
        committed nor rolled back; the server rolls them back.

        A session taken from a [`Pool`](crate::Pool) goes back to the pool instead, unless it is bad.
    */
    pub fn close(&self) -> Result<()> {
        let pool = self.inner.pool.lock().take().and_then(|pool| pool.upgrade());
        if let Some(pool) = pool {
            if self.is_open() && !self.is_bad() {
                pool.put_back(self.clone());
                return Ok(());
            }
            log::debug!("{} is bad, closed with its server", self.inner.name);
            self.close_srv_with_ses();
        }
        let close_srv = self.inner.close_srv.load(Ordering::Acquire);
        let res = self.close_now();
        if close_srv {
            if let Some(srv) = self.srv_for_close() {
                return Error::collect( res.err().into_iter().chain(srv.close().err()).collect() );
            }
        }
        res
    }

    /// The server to close with a session opened by `Env::connect`. Read before the session
    /// drops its link to it.
    fn srv_for_close(&self) -> Option<Srv> {
        self.inner.srv.read().upgrade().map(Srv::from_inner)
    }

    /// Closes the session without returning it to a pool.
    pub(crate) fn close_now(&self) -> Result<()> {
        let _guard = self.inner.close_lock.lock();
        let oci = match self.inner.oci.read().clone() {
            Some(oci) => oci,
            None => return Ok(()),
        };
        let mut errs = Vec::new();
        for tx in self.inner.txs.snapshot() {
            tx.close();
        }
        for stmt in self.inner.stmts.snapshot() {
            if let Err(err) = stmt.close() {
                log::warn!("{} close: {}", stmt.sys_name(), err);
                errs.push(err);
            }
        }
        if let Err(err) = oci.release() {
            errs.push(err);
        }
        self.inner.oci.write().take();
        if self.inner.close_srv.load(Ordering::Acquire) {
            // the server is closed by `close` once this guard is released
            let srv = self.inner.srv.read().upgrade();
            if let Some(srv) = srv {
                srv.remove_ses(self.inner.id);
            }
        } else {
            let srv = std::mem::replace(&mut *self.inner.srv.write(), Weak::new());
            if let Some(srv) = srv.upgrade() {
                srv.remove_ses(self.inner.id);
            }
        }
        log::debug!("{} closed", self.inner.name);
        Error::collect(errs)
    }
}
