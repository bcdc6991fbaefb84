//! OCI environment

use crate::{
    Result, Error, Ses,
    oci::{self, *},
    cfg::{StmtCfg, SrvCfg},
    drv::{DRV, Level},
    dsn::Dsn,
    reg::{self, Registry},
    srv::Srv,
};
use parking_lot::{Mutex, RwLock};
use std::{ptr, fmt, sync::Arc};

/// Native environment. Outlives every server, session and statement created in it.
pub(crate) struct OciEnv {
    err: Handle<OCIError>,
    env: Handle<OCIEnv>,
}

impl OciEnv {
    fn new() -> Result<Self> {
        oci::load()?;
        let mut env = Ptr::<OCIEnv>::null();
        let res = unsafe {
            OCIEnvNlsCreate(
                env.as_mut_ptr(), OCI_OBJECT | OCI_THREADED,
                ptr::null(), ptr::null(), ptr::null(), ptr::null(), 0, ptr::null(),
                AL32UTF8, AL32UTF8
            )
        };
        if res != OCI_SUCCESS {
            if env.is_null() {
                return Err( Error::new("Cannot create OCI environment") );
            }
            let err = Error::env(env.get(), res);
            drop(Handle::from(env));
            return Err(err);
        }
        let env = Handle::from(env);
        let err = Handle::<OCIError>::new(env.get())?;
        Ok( Self { err, env } )
    }

    pub(crate) fn env(&self) -> *mut OCIEnv {
        self.env.get()
    }

    pub(crate) fn err(&self) -> *mut OCIError {
        self.err.get()
    }

    /// Returns `true` when the client character set is a UTF-8 one.
    pub(crate) fn is_utf8(&self) -> Result<bool> {
        let csid : u16 = self.env.get_attr(OCI_ATTR_ENV_CHARSET_ID, self.err())?;
        Ok( csid == AL32UTF8 || csid == UTF8 )
    }
}

pub(crate) struct EnvInner {
    id: u64,
    name: String,
    close_lock: Mutex<()>,
    oci: RwLock<Option<Arc<OciEnv>>>,
    cfg: RwLock<Option<StmtCfg>>,
    srvs: Registry<Srv>,
}

impl EnvInner {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn oci(&self) -> Result<Arc<OciEnv>> {
        self.oci.read().clone().ok_or(Error::Closed("Env"))
    }

    pub(crate) fn stmt_cfg(&self) -> StmtCfg {
        let cfg = self.cfg.read().clone();
        cfg.unwrap_or_else(|| DRV.stmt_cfg())
    }

    pub(crate) fn remove_srv(&self, id: u64) {
        self.srvs.remove(id);
    }
}

/**
    Oracle environment. The root of every handle the driver opens.

    An `Env` is cheap to clone; clones refer to the same environment.

    # Example
    ```no_run
    let env = ora::Env::open()?;
    let ses = env.connect("scott/tiger@localhost/orcl")?;
    let stmt = ses.prep("SELECT 1 FROM dual")?;
    let rset = stmt.qry(&mut [])?;
    for row in rset.clone() {
        let one : i64 = row.get(0)?;
        assert_eq!(one, 1);
    }
    assert!(rset.err().is_none());
    env.close()?;
    # Ok::<(),ora::Error>(())
    ```
*/
#[derive(Clone)]
pub struct Env {
    inner: Arc<EnvInner>,
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

impl Env {
    /// Loads the OCI client library on first use and creates a new environment.
    pub fn open() -> Result<Self> {
        let oci = OciEnv::new()?;
        let id = DRV.next_id(Level::Env);
        let name = reg::sys_name("", 'E', id);
        log::debug!("{} opened", name);
        let inner = EnvInner {
            id, name,
            close_lock: Mutex::new(()),
            oci: RwLock::new(Some(Arc::new(oci))),
            cfg: RwLock::new(None),
            srvs: Registry::new(),
        };
        Ok( Self { inner: Arc::new(inner) } )
    }

    pub(crate) fn inner(&self) -> &Arc<EnvInner> {
        &self.inner
    }

    /// Returns the system name, like `E1`.
    pub fn sys_name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_open(&self) -> bool {
        self.inner.oci.read().is_some()
    }

    /// Returns the statement configuration that servers of this environment inherit.
    pub fn cfg(&self) -> StmtCfg {
        self.inner.stmt_cfg()
    }

    /// Sets the statement configuration for every server, session and statement that has not set its own.
    pub fn set_cfg(&self, cfg: StmtCfg) {
        *self.inner.cfg.write() = Some(cfg);
    }

    /// Returns the number of open servers.
    pub fn num_srv(&self) -> usize {
        self.inner.srvs.len()
    }

    /// Connects to the server, or creates a native pool, as described by `cfg`.
    pub fn open_srv(&self, cfg: &SrvCfg) -> Result<Srv> {
        let _guard = self.inner.close_lock.lock();
        let oci = self.inner.oci()?;
        let srv = Srv::open(&self.inner, oci, cfg)?;
        self.inner.srvs.add(srv.id(), srv.clone());
        Ok(srv)
    }

    /**
        Opens a server and a session on it as described by the connection string. The server is
        closed with the session.

        See [`Dsn`] for the accepted forms.
    */
    pub fn connect(&self, dsn: &str) -> Result<Ses> {
        let dsn = Dsn::parse(dsn)?;
        let srv = self.open_srv(&dsn.srv_cfg())?;
        match srv.open_ses(&dsn.ses_cfg()) {
            Ok(ses) => {
                ses.close_srv_with_ses();
                Ok(ses)
            }
            Err(err) => {
                if let Err(close_err) = srv.close() {
                    log::warn!("{} close after failed logon: {}", srv.sys_name(), close_err);
                }
                Err(err)
            }
        }
    }

    /**
        Closes every open server (and through them every session, statement and result set) and
        releases the environment. Errors of the children are returned together.
    */
    pub fn close(&self) -> Result<()> {
        let _guard = self.inner.close_lock.lock();
        if self.inner.oci.read().is_none() {
            return Ok(());
        }
        let mut errs = Vec::new();
        for srv in self.inner.srvs.snapshot() {
            if let Err(err) = srv.close() {
                log::warn!("{} close: {}", srv.sys_name(), err);
                errs.push(err);
            }
        }
        self.inner.oci.write().take();
        log::debug!("{} closed", self.inner.name);
        Error::collect(errs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_library_is_an_error() {
        if oci::is_loaded() || std::env::var_os(OCI_LIB_ENV).is_some() {
            return;
        }
        std::env::set_var(OCI_LIB_ENV, "/nonexistent/libclntsh.so");
        let res = Env::open();
        std::env::remove_var(OCI_LIB_ENV);
        match res {
            Err(Error::Interface(msg)) => assert!(msg.starts_with("cannot load the OCI library")),
            _ => panic!("expected a library load error"),
        }
    }
}
