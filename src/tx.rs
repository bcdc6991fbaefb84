//! Explicit transactions

use crate::{
    Result, Error,
    oci::*,
    drv::{DRV, Level},
    reg,
    ses::{OciSes, SesInner},
};
use parking_lot::{Mutex, RwLock};
use std::{fmt, time::Duration, sync::{Arc, Weak}};

struct TxInner {
    id: u64,
    name: String,
    close_lock: Mutex<()>,
    oci: RwLock<Option<Arc<OciSes>>>,
    ses: RwLock<Weak<SesInner>>,
}

/**
    A transaction started on a session.

    While it is open, statements of the session do not commit on success. `commit` and `rollback`
    end it; a transaction that is neither committed nor rolled back when its session closes is
    rolled back by the server.
*/
#[derive(Clone)]
pub struct Tx {
    inner: Arc<TxInner>,
}

impl fmt::Debug for Tx {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

impl Tx {
    pub(crate) fn begin(ses: &Arc<SesInner>, oci: Arc<OciSes>, timeout: Duration) -> Result<Self> {
        let secs = timeout.as_secs().min(u32::MAX as u64) as u32;
        oci.call(|svc, errp| unsafe { OCITransStart(svc, errp, secs, OCI_TRANS_NEW) })?;
        let id = DRV.next_id(Level::Tx);
        let name = reg::sys_name(ses.name(), 'T', id);
        log::debug!("{} started", name);
        let inner = TxInner {
            id, name,
            close_lock: Mutex::new(()),
            oci: RwLock::new(Some(oci)),
            ses: RwLock::new(Arc::downgrade(ses)),
        };
        Ok( Self { inner: Arc::new(inner) } )
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    /// Returns the system name, like `E1S3S2T1`.
    pub fn sys_name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_open(&self) -> bool {
        self.inner.oci.read().is_some()
    }

    pub fn commit(&self) -> Result<()> {
        self.end(|svc, errp| unsafe { OCITransCommit(svc, errp, OCI_DEFAULT) }, "commit")
    }

    pub fn rollback(&self) -> Result<()> {
        self.end(|svc, errp| unsafe { OCITransRollback(svc, errp, OCI_DEFAULT) }, "rollback")
    }

    fn end<F>(&self, call: F, what: &str) -> Result<()>
    where F: FnOnce(*mut OCISvcCtx, *mut OCIError) -> i32
    {
        let _guard = self.inner.close_lock.lock();
        let oci = self.inner.oci.read().clone().ok_or(Error::Closed("Tx"))?;
        oci.call(call)?;
        log::debug!("{} {}", self.inner.name, what);
        self.detach();
        Ok(())
    }

    fn detach(&self) {
        self.inner.oci.write().take();
        let ses = std::mem::replace(&mut *self.inner.ses.write(), Weak::new());
        if let Some(ses) = ses.upgrade() {
            ses.remove_tx(self.inner.id);
        }
    }

    /// Marks the transaction ended without a server call. Used when its session closes.
    pub(crate) fn close(&self) {
        let _guard = self.inner.close_lock.lock();
        if self.inner.oci.read().is_some() {
            log::debug!("{} closed with its session", self.inner.name);
            self.detach();
        }
    }
}
