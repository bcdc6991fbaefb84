//! Server: a physical connection or a native pool

use crate::{
    Result, Error,
    oci::*,
    cfg::{StmtCfg, SrvCfg, SesCfg, PoolKind},
    drv::{DRV, Level},
    env::{EnvInner, OciEnv},
    reg::{self, Registry},
    ses::Ses,
};
use parking_lot::{Mutex, RwLock};
use std::{ptr, fmt, sync::{Arc, Weak, atomic::{AtomicBool, Ordering}}};

pub(crate) enum SrvKind {
    Server(Handle<OCIServer>),
    SesPool { pool: Handle<OCISPool>, name: Vec<u8> },
    ConnPool { pool: Handle<OCICPool>, name: Vec<u8> },
}

/// Native server. Exactly one of a server handle or a pool handle.
pub(crate) struct OciSrv {
    kind: SrvKind,
    err: Handle<OCIError>,
    released: AtomicBool,
    env: Arc<OciEnv>,
}

impl Drop for OciSrv {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            log::warn!("server release: {}", err);
        }
    }
}

/// Copies the pool name that OCI returns into memory it owns.
fn pool_name(ptr: *const u8, len: usize) -> Vec<u8> {
    if ptr.is_null() || len == 0 {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(ptr, len) }.to_vec()
    }
}

impl OciSrv {
    fn attach(env: Arc<OciEnv>, cfg: &SrvCfg) -> Result<Self> {
        let err = Handle::<OCIError>::new(env.env())?;
        let errp = err.get();
        let dblink = cfg.dblink.as_str();
        let kind = match cfg.pool {
            PoolKind::None => {
                let srv = Handle::<OCIServer>::new(env.env())?;
                catch!{errp =>
                    OCIServerAttach(srv.get(), errp, dblink.as_ptr(), dblink.len() as i32, OCI_DEFAULT)
                }
                SrvKind::Server(srv)
            }
            PoolKind::Ses | PoolKind::Drcp => {
                let pool = Handle::<OCISPool>::new(env.env())?;
                let user = cfg.pool_username.as_str();
                let pass = cfg.pool_password.as_str();
                let mode = if user.is_empty() { OCI_SPC_STMTCACHE } else { OCI_SPC_HOMOGENEOUS | OCI_SPC_STMTCACHE };
                let mut name_ptr = ptr::null::<u8>();
                let mut name_len = 0u32;
                catch!{errp =>
                    OCISessionPoolCreate(
                        env.env(), errp, pool.get(),
                        &mut name_ptr, &mut name_len, dblink.as_ptr(), dblink.len() as u32,
                        cfg.pool_min, cfg.pool_max, cfg.pool_incr,
                        user.as_ptr(), user.len() as u32, pass.as_ptr(), pass.len() as u32,
                        mode
                    )
                }
                let name = pool_name(name_ptr, name_len as usize);
                SrvKind::SesPool { pool, name }
            }
            PoolKind::Conn => {
                let pool = Handle::<OCICPool>::new(env.env())?;
                let user = cfg.pool_username.as_str();
                let pass = cfg.pool_password.as_str();
                let mut name_ptr = ptr::null::<u8>();
                let mut name_len = 0i32;
                catch!{errp =>
                    OCIConnectionPoolCreate(
                        env.env(), errp, pool.get(),
                        &mut name_ptr, &mut name_len, dblink.as_ptr(), dblink.len() as i32,
                        cfg.pool_min, cfg.pool_max, cfg.pool_incr,
                        user.as_ptr(), user.len() as i32, pass.as_ptr(), pass.len() as i32,
                        OCI_DEFAULT
                    )
                }
                let name = pool_name(name_ptr, name_len.max(0) as usize);
                SrvKind::ConnPool { pool, name }
            }
        };
        Ok( Self { kind, err, released: AtomicBool::new(false), env } )
    }

    pub(crate) fn kind(&self) -> &SrvKind {
        &self.kind
    }

    pub(crate) fn env(&self) -> &Arc<OciEnv> {
        &self.env
    }

    pub(crate) fn err(&self) -> *mut OCIError {
        self.err.get()
    }

    /// Detaches from the server or destroys the pool. Only the first call does anything.
    pub(crate) fn release(&self) -> Result<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let errp = self.err.get();
        match &self.kind {
            SrvKind::Server(srv) => {
                catch!{errp =>
                    OCIServerDetach(srv.get(), errp, OCI_DEFAULT)
                }
            }
            SrvKind::SesPool { pool, .. } => {
                catch!{errp =>
                    OCISessionPoolDestroy(pool.get(), errp, OCI_SPD_FORCE)
                }
            }
            SrvKind::ConnPool { pool, .. } => {
                catch!{errp =>
                    OCIConnectionPoolDestroy(pool.get(), errp, OCI_DEFAULT)
                }
            }
        }
        Ok(())
    }
}

pub(crate) struct SrvInner {
    id: u64,
    name: String,
    close_lock: Mutex<()>,
    oci: RwLock<Option<Arc<OciSrv>>>,
    env: RwLock<Weak<EnvInner>>,
    cfg: RwLock<Option<StmtCfg>>,
    pool: PoolKind,
    is_utf8: bool,
    sess: Registry<Ses>,
}

impl SrvInner {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn oci(&self) -> Result<Arc<OciSrv>> {
        self.oci.read().clone().ok_or(Error::Closed("Srv"))
    }

    pub(crate) fn stmt_cfg(&self) -> StmtCfg {
        let cfg = self.cfg.read().clone();
        let cfg = match cfg {
            Some(cfg) => cfg,
            None => {
                let env = self.env.read().upgrade();
                env.map(|env| env.stmt_cfg()).unwrap_or_else(|| DRV.stmt_cfg())
            }
        };
        if self.is_utf8 { cfg.for_utf8_server() } else { cfg }
    }

    pub(crate) fn remove_ses(&self, id: u64) {
        self.sess.remove(id);
    }
}

/**
    A connection to the database server, or a native connection or session pool.

    Sessions opened on a pooled server are taken from and returned to the native pool.

    # Example
    ```no_run
    use ora::{Env, SrvCfg, SesCfg, PoolKind};

    let env = Env::open()?;
    let mut cfg = SrvCfg::new("localhost/orcl");
    cfg.pool = PoolKind::Ses;
    cfg.pool_max = 8;
    let srv = env.open_srv(&cfg)?;
    let ses = srv.open_ses(&SesCfg::new("scott", "tiger"))?;
    ses.ping()?;
    ses.close()?;
    srv.close()?;
    # Ok::<(),ora::Error>(())
    ```
*/
#[derive(Clone)]
pub struct Srv {
    inner: Arc<SrvInner>,
}

impl fmt::Debug for Srv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

impl Srv {
    pub(crate) fn open(env: &Arc<EnvInner>, oci_env: Arc<OciEnv>, cfg: &SrvCfg) -> Result<Self> {
        let is_utf8 = oci_env.is_utf8()?;
        let oci = OciSrv::attach(oci_env, cfg)?;
        let id = DRV.next_id(Level::Srv);
        let name = reg::sys_name(env.name(), 'S', id);
        log::debug!("{} opened ({:?} {})", name, cfg.pool, cfg.dblink);
        let inner = SrvInner {
            id, name,
            close_lock: Mutex::new(()),
            oci: RwLock::new(Some(Arc::new(oci))),
            env: RwLock::new(Arc::downgrade(env)),
            cfg: RwLock::new(cfg.stmt.clone()),
            pool: cfg.pool,
            is_utf8,
            sess: Registry::new(),
        };
        Ok( Self { inner: Arc::new(inner) } )
    }

    pub(crate) fn from_inner(inner: Arc<SrvInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    pub(crate) fn inner(&self) -> &Arc<SrvInner> {
        &self.inner
    }

    /// Returns the system name, like `E1S3`.
    pub fn sys_name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_open(&self) -> bool {
        self.inner.oci.read().is_some()
    }

    /// Returns `true` when strings are exchanged with the server in a UTF-8 character set.
    pub fn is_utf8(&self) -> bool {
        self.inner.is_utf8
    }

    pub fn pool_kind(&self) -> PoolKind {
        self.inner.pool
    }

    /// Returns the number of open sessions.
    pub fn num_ses(&self) -> usize {
        self.inner.sess.len()
    }

    pub fn cfg(&self) -> StmtCfg {
        self.inner.stmt_cfg()
    }

    pub fn set_cfg(&self, cfg: StmtCfg) {
        *self.inner.cfg.write() = Some(cfg);
    }

    /**
        Returns the server version banner.

        Pooled servers have no server handle of their own; use [`Ses::version`] for them.
    */
    pub fn version(&self) -> Result<String> {
        let oci = self.inner.oci()?;
        match oci.kind() {
            SrvKind::Server(srv) => {
                let mut buf = vec![0u8; 512];
                let errp = oci.err();
                catch!{errp =>
                    OCIServerVersion(srv.get() as _, errp, buf.as_mut_ptr(), buf.len() as u32, OCI_HTYPE_SERVER as u8)
                }
                let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
                buf.truncate(len);
                Ok( String::from_utf8_lossy(&buf).into_owned() )
            }
            _ => Err( Error::new("server version is only available on dedicated servers") ),
        }
    }

    /// Begins a new session, or takes one from the native pool.
    pub fn open_ses(&self, cfg: &SesCfg) -> Result<Ses> {
        let _guard = self.inner.close_lock.lock();
        let oci = self.inner.oci()?;
        let ses = Ses::open(&self.inner, oci, cfg)?;
        self.inner.sess.add(ses.id(), ses.clone());
        Ok(ses)
    }

    /// Closes every open session, then detaches from the server or destroys the pool.
    pub fn close(&self) -> Result<()> {
        let _guard = self.inner.close_lock.lock();
        let oci = match self.inner.oci.read().clone() {
            Some(oci) => oci,
            None => return Ok(()),
        };
        let mut errs = Vec::new();
        for ses in self.inner.sess.snapshot() {
            if let Err(err) = ses.close_now() {
                log::warn!("{} close: {}", ses.sys_name(), err);
                errs.push(err);
            }
        }
        if let Err(err) = oci.release() {
            errs.push(err);
        }
        self.inner.oci.write().take();
        let env = std::mem::replace(&mut *self.inner.env.write(), Weak::new());
        if let Some(env) = env.upgrade() {
            env.remove_srv(self.inner.id);
        }
        log::debug!("{} closed", self.inner.name);
        Error::collect(errs)
    }
}
