//! Result set

use crate::{
    Result, Error,
    oci::{*, attr},
    cfg::{ColumnType, StmtCfg},
    ctx::{self, Ctx},
    def::{Cell, Column, Defs},
    drv::{DRV, Level},
    reg,
    stmt::{OciStmt, Stmt, StmtInner},
    types::{Row, Value},
};
use libc::c_void;
use parking_lot::{Mutex, RwLock};
use std::{fmt, sync::{Arc, Weak, atomic::{AtomicBool, Ordering}}};

/// Fetch state of a result set
struct Fetch {
    defs: Defs,
    /// Rows in the current window
    fetched: u32,
    /// Next row of the window to read
    offset: u32,
    /// Set when the server has no more rows beyond the current window
    finished: bool,
    in_window: bool,
    /// Index of the last row returned, -1 before the first
    index: i64,
    /// Set once the end of data has been reported
    drained: bool,
    err: Option<Error>,
}

struct RsetInner {
    id: u64,
    name: String,
    close_lock: Mutex<()>,
    oci: RwLock<Option<Arc<OciStmt>>>,
    stmt: RwLock<Weak<StmtInner>>,
    cfg: StmtCfg,
    /// Context of the query, watches every fetch
    ctx: Ctx,
    fetch: Mutex<Fetch>,
    names: Arc<Vec<String>>,
    columns: Vec<Column>,
    /// Close the statement with the result set
    auto_close: AtomicBool,
}

/**
    Rows returned by a query, a REF CURSOR or an implicit result.

    Rows are fetched from the server in windows of `fetch_len` rows (`lob_fetch_len` when the
    select list has LOB or LONG columns). `Rset` is also an iterator over its rows; an iteration
    error ends the iteration and is kept for [`Rset::err`].

    # Example
    ```no_run
    # let env = ora::Env::open()?;
    # let ses = env.connect("scott/tiger@localhost/orcl")?;
    let rset = ses.prep_and_qry("SELECT ename, sal FROM emp WHERE deptno = :1", &mut [20.into()])?;
    for row in rset.clone() {
        let name : String = row.get("ENAME")?;
        let sal : Option<f64> = row.get(1)?;
        println!("{} {:?}", name, sal);
    }
    if let Some(err) = rset.err() {
        return Err(err);
    }
    # Ok::<(),ora::Error>(())
    ```
*/
#[derive(Clone)]
pub struct Rset {
    inner: Arc<RsetInner>,
}

impl fmt::Debug for Rset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

impl Rset {
    /// Describes and defines the select list of an executed statement.
    pub(crate) fn open(stmt: &Arc<StmtInner>, oci: Arc<OciStmt>, cfg: StmtCfg, ctx: &Ctx, gcts: &[ColumnType]) -> Result<Self> {
        let defs = {
            let ses = oci.ses();
            let _call = ses.lock();
            Defs::new(oci.get(), ses, &cfg, gcts)?
        };
        let id = DRV.next_id(Level::Rset);
        let name = reg::sys_name(stmt.name(), 'R', id);
        log::debug!("{} opened: {} columns, window of {}", name, defs.names().len(), defs.window());
        let inner = RsetInner {
            id, name, cfg,
            ctx: ctx.clone(),
            close_lock: Mutex::new(()),
            oci: RwLock::new(Some(oci)),
            stmt: RwLock::new(Arc::downgrade(stmt)),
            names: defs.names().clone(),
            columns: defs.columns(),
            fetch: Mutex::new(Fetch {
                defs,
                fetched: 0,
                offset: 0,
                finished: false,
                in_window: false,
                index: -1,
                drained: false,
                err: None,
            }),
            auto_close: AtomicBool::new(false),
        };
        Ok( Self { inner: Arc::new(inner) } )
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    /// Closes the statement together with this result set, when it is exhausted or closed.
    pub(crate) fn set_auto_close(&self) {
        self.inner.auto_close.store(true, Ordering::Release);
    }

    pub fn sys_name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_open(&self) -> bool {
        self.inner.oci.read().is_some()
    }

    pub fn columns(&self) -> &[Column] {
        &self.inner.columns
    }

    pub fn column_names(&self) -> &[String] {
        &self.inner.names
    }

    /// Returns the zero-based index of the last row returned, or -1 before the first row.
    pub fn index(&self) -> i64 {
        self.inner.fetch.lock().index
    }

    /// Returns the error that ended the iteration, if any.
    pub fn err(&self) -> Option<Error> {
        self.inner.fetch.lock().err.clone()
    }

    /**
        Returns the next row, or `None` after the last one.

        Fetches run under the context the query was started with: its cancellation or deadline
        interrupts a fetch in flight, which then fails with [`Error::Cancelled`] and leaves the
        session marked bad. A result set closed before its end fails with `Closed`.

        An error is also kept for [`Rset::err`], and ends the result set.
    */
    pub fn next_row(&self) -> Result<Option<Row>> {
        match self.fetch_row() {
            Ok(Some(row)) => Ok(Some(row)),
            Ok(None) => {
                self.inner.fetch.lock().drained = true;
                if self.inner.auto_close.load(Ordering::Acquire) {
                    self.close()?;
                }
                Ok(None)
            }
            Err(err) => {
                let mut fetch = self.inner.fetch.lock();
                fetch.err = Some(err.clone());
                fetch.finished = true;
                if fetch.in_window {
                    fetch.defs.free_window();
                    fetch.in_window = false;
                }
                Err(err)
            }
        }
    }

    fn fetch_row(&self) -> Result<Option<Row>> {
        let oci = self.inner.oci.read().clone();
        let oci = match oci {
            Some(oci) => oci,
            None if self.inner.fetch.lock().drained => return Ok(None),
            None => return Err( Error::Closed("Rset") ),
        };
        let mut fetch = self.inner.fetch.lock();
        if !self.begin_row(&mut fetch, &oci)? {
            return Ok(None);
        }
        let offset = fetch.offset as usize;
        let cells = {
            let ses = oci.ses();
            let _call = ses.lock();
            fetch.defs.row(offset, ses, &self.inner.cfg)
        };
        self.end_row(&mut fetch);
        let mut vals = Vec::with_capacity(self.inner.names.len());
        for cell in cells? {
            let val = match cell {
                Cell::Val(val) => val,
                Cell::Cursor(handle) => {
                    let stmt = self.inner.stmt.read().upgrade().ok_or(Error::Closed("Stmt"))?;
                    let cursor = Arc::new(OciStmt::cursor(handle, oci.ses().clone()));
                    Value::Rset(stmt.open_rset(cursor, self.inner.cfg.clone(), &self.inner.ctx, &[])?)
                }
            };
            vals.push(val);
        }
        Ok( Some( Row::new(self.inner.names.clone(), vals) ) )
    }

    /// Makes the next row current. Fetches a new window when the current one is used up.
    /// Returns `false` at the end of data.
    fn begin_row(&self, fetch: &mut Fetch, oci: &OciStmt) -> Result<bool> {
        if fetch.in_window && fetch.offset < fetch.fetched {
            return Ok(true);
        }
        if fetch.in_window {
            fetch.defs.free_window();
            fetch.in_window = false;
        }
        if fetch.finished {
            return Ok(false);
        }
        let ses = oci.ses();
        let _call = ses.lock();
        fetch.defs.alloc_window(ses.env())?;
        let window = fetch.defs.window();
        let stmtp = oci.get();
        let res = ctx::watched(&self.inner.ctx, ses, || ses.call(|_, errp| stmt_fetch(stmtp, errp, window)));
        let res = match res {
            Ok(res) => res,
            Err(err) => {
                fetch.defs.free_window();
                return Err(err);
            }
        };
        let fetched = attr::get::<u32>(OCI_ATTR_ROWS_FETCHED, OCI_HTYPE_STMT, stmtp as *const c_void, ses.err())?;
        log::trace!("{} fetched {} of {} rows", self.inner.name, fetched, window);
        if fetched == 0 || (res == OCI_NO_DATA && window == 1) {
            fetch.finished = true;
            fetch.defs.free_window();
            return Ok(false);
        }
        if res == OCI_NO_DATA || fetched < window {
            fetch.finished = true;
        }
        fetch.fetched = fetched;
        fetch.offset = 0;
        fetch.in_window = true;
        Ok(true)
    }

    fn end_row(&self, fetch: &mut Fetch) {
        fetch.offset += 1;
        fetch.index += 1;
        debug_assert!(fetch.offset <= fetch.fetched);
        if fetch.offset >= fetch.fetched {
            fetch.defs.free_window();
            fetch.in_window = false;
        }
    }

    /// Closes the result set. A result set opened by `Ses::prep_and_qry` also closes its statement.
    pub fn close(&self) -> Result<()> {
        let stmt = self.inner.stmt.read().upgrade();
        self.close_now()?;
        if self.inner.auto_close.swap(false, Ordering::AcqRel) {
            if let Some(stmt) = stmt {
                return Stmt::from_inner(stmt).close();
            }
        }
        Ok(())
    }

    /// Closes the result set but not its statement.
    pub(crate) fn close_now(&self) -> Result<()> {
        let _guard = self.inner.close_lock.lock();
        if self.inner.oci.read().is_none() {
            return Ok(());
        }
        {
            let mut fetch = self.inner.fetch.lock();
            fetch.defs.free_window();
            fetch.in_window = false;
            fetch.finished = true;
        }
        self.inner.oci.write().take();
        let stmt = std::mem::replace(&mut *self.inner.stmt.write(), Weak::new());
        if let Some(stmt) = stmt.upgrade() {
            stmt.remove_rset(self.inner.id);
        }
        log::debug!("{} closed", self.inner.name);
        Ok(())
    }
}

impl Iterator for Rset {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.next_row().unwrap_or(None)
    }
}
