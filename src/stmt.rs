//! SQL or PL/SQL statement and its executor

use crate::{
    Result, Error,
    oci::{*, attr},
    bind::{Arg, Binds},
    cfg::{ColumnType, StmtCfg},
    ctx::{self, Ctx},
    drv::{DRV, Level},
    reg::{self, Registry},
    rset::Rset,
    ses::{OciSes, SesInner},
};
use libc::c_void;
use parking_lot::{Mutex, RwLock};
use std::{fmt, ptr, sync::{Arc, Weak}};

/// Where the native statement handle came from, which decides how it is released.
enum Source {
    /// `OCIStmtPrepare2`, released with `OCIStmtRelease`
    Prepared,
    /// Allocated for a REF CURSOR bind or column, freed with the handle
    Cursor(Handle<OCIStmt>),
    /// Implicit result owned by the statement that returned it
    Implicit(Arc<OciStmt>),
}

/// Native statement
pub(crate) struct OciStmt {
    stmt: Ptr<OCIStmt>,
    src: Source,
    ses: Arc<OciSes>,
}

impl Drop for OciStmt {
    fn drop(&mut self) {
        if let Source::Prepared = self.src {
            let _call = self.ses.lock();
            let res = unsafe { OCIStmtRelease(self.stmt.get(), self.ses.err(), ptr::null(), 0, OCI_DEFAULT) };
            if res == OCI_ERROR || res == OCI_INVALID_HANDLE {
                log::warn!("statement release: {}", Error::oci(self.ses.err(), res));
            }
        }
    }
}

impl OciStmt {
    fn prepare(ses: Arc<OciSes>, sql: &str) -> Result<Self> {
        let mut stmt = Ptr::<OCIStmt>::null();
        let stmtp = stmt.as_mut_ptr();
        ses.call(|svc, errp| unsafe {
            OCIStmtPrepare2(svc, stmtp, errp, sql.as_ptr(), sql.len() as u32, ptr::null(), 0, OCI_NTV_SYNTAX, OCI_DEFAULT)
        })?;
        Ok( Self { stmt, src: Source::Prepared, ses } )
    }

    /// Wraps the handle a REF CURSOR was opened into.
    pub(crate) fn cursor(handle: Handle<OCIStmt>, ses: Arc<OciSes>) -> Self {
        let stmt = Ptr::new(handle.get());
        Self { stmt, src: Source::Cursor(handle), ses }
    }

    fn implicit(stmt: Ptr<OCIStmt>, parent: Arc<OciStmt>) -> Self {
        let ses = parent.ses.clone();
        Self { stmt, src: Source::Implicit(parent), ses }
    }

    pub(crate) fn get(&self) -> *mut OCIStmt {
        self.stmt.get()
    }

    pub(crate) fn ses(&self) -> &Arc<OciSes> {
        &self.ses
    }

    /// Reads a statement attribute. Takes the session call lock.
    fn get_attr<V: attr::AttrGet>(&self, attr_type: u32) -> Result<V> {
        let _call = self.ses.lock();
        attr::get::<V>(attr_type, OCI_HTYPE_STMT, self.stmt.get() as *const c_void, self.ses.err())
    }
}

/// Statement type reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmtType {
    Select, Update, Delete, Insert, Create, Drop, Alter, Begin, Declare, Call, Merge,
    /// Any other type code
    Other(u16),
}

impl StmtType {
    fn from_code(code: u16) -> Self {
        match code {
            OCI_STMT_SELECT  => StmtType::Select,
            OCI_STMT_UPDATE  => StmtType::Update,
            OCI_STMT_DELETE  => StmtType::Delete,
            OCI_STMT_INSERT  => StmtType::Insert,
            OCI_STMT_CREATE  => StmtType::Create,
            OCI_STMT_DROP    => StmtType::Drop,
            OCI_STMT_ALTER   => StmtType::Alter,
            OCI_STMT_BEGIN   => StmtType::Begin,
            OCI_STMT_DECLARE => StmtType::Declare,
            OCI_STMT_CALL    => StmtType::Call,
            OCI_STMT_MERGE   => StmtType::Merge,
            code => StmtType::Other(code),
        }
    }

    /// DML statements report the number of rows they processed.
    fn has_row_count(self) -> bool {
        matches!(self, StmtType::Select | StmtType::Update | StmtType::Delete | StmtType::Insert | StmtType::Merge)
    }
}

/// Returns `true` for an INSERT whose text after the last closing parenthesis has a `RETURNING` clause.
fn is_returning(stmt_type: StmtType, sql: &str) -> bool {
    if stmt_type != StmtType::Insert {
        return false;
    }
    match sql.rfind(')') {
        Some(pos) => sql[pos..].to_ascii_uppercase().contains("RETURNING"),
        None => false,
    }
}

pub(crate) struct StmtInner {
    id: u64,
    name: String,
    sql: String,
    stmt_type: StmtType,
    gcts: Vec<ColumnType>,
    close_lock: Mutex<()>,
    oci: RwLock<Option<Arc<OciStmt>>>,
    ses: RwLock<Weak<SesInner>>,
    cfg: RwLock<Option<StmtCfg>>,
    rsets: Registry<Rset>,
    /// Buffers of the last execute
    binds: Mutex<Option<Binds>>,
}

impl StmtInner {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn stmt_cfg(&self) -> StmtCfg {
        let cfg = self.cfg.read().clone();
        match cfg {
            Some(cfg) => cfg,
            None => {
                let ses = self.ses.read().upgrade();
                ses.map(|ses| ses.stmt_cfg()).unwrap_or_else(|| DRV.stmt_cfg())
            }
        }
    }

    /// Opens a result set on `oci` and registers it with this statement.
    pub(crate) fn open_rset(self: &Arc<Self>, oci: Arc<OciStmt>, cfg: StmtCfg, ctx: &Ctx, gcts: &[ColumnType]) -> Result<Rset> {
        let rset = Rset::open(self, oci, cfg, ctx, gcts)?;
        self.rsets.add(rset.id(), rset.clone());
        Ok(rset)
    }

    pub(crate) fn remove_rset(&self, id: u64) {
        self.rsets.remove(id);
    }
}

/**
    A prepared SQL or PL/SQL statement.

    # Example
    ```no_run
    use ora::Arg;

    # let env = ora::Env::open()?;
    # let ses = env.connect("scott/tiger@localhost/orcl")?;
    let stmt = ses.prep("UPDATE emp SET sal = sal + :1 WHERE empno = :2")?;
    let rows = stmt.exe(&mut [100.into(), 7369.into()])?;
    assert_eq!(rows, 1);

    let mut cur = None;
    let stmt = ses.prep("BEGIN OPEN :1 FOR SELECT ename FROM emp; END;")?;
    stmt.exe(&mut [Arg::Cursor(&mut cur)])?;
    if let Some(rset) = cur {
        for row in rset {
            let _name : String = row.get(0)?;
        }
    }
    # Ok::<(),ora::Error>(())
    ```
*/
#[derive(Clone)]
pub struct Stmt {
    inner: Arc<StmtInner>,
}

impl fmt::Debug for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

impl Stmt {
    pub(crate) fn prepare(ses: &Arc<SesInner>, oci: Arc<OciSes>, sql: &str, gcts: &[ColumnType]) -> Result<Self> {
        let oci = OciStmt::prepare(oci, sql)?;
        let stmt_type = StmtType::from_code(oci.get_attr::<u16>(OCI_ATTR_STMT_TYPE)?);
        let id = DRV.next_id(Level::Stmt);
        let name = reg::sys_name(ses.name(), 'S', id);
        log::debug!("{} prepared {:?}: {}", name, stmt_type, sql);
        let inner = StmtInner {
            id, name, stmt_type,
            sql: sql.to_string(),
            gcts: gcts.to_vec(),
            close_lock: Mutex::new(()),
            oci: RwLock::new(Some(Arc::new(oci))),
            ses: RwLock::new(Arc::downgrade(ses)),
            cfg: RwLock::new(None),
            rsets: Registry::new(),
            binds: Mutex::new(None),
        };
        Ok( Self { inner: Arc::new(inner) } )
    }

    pub(crate) fn from_inner(inner: Arc<StmtInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn sys_name(&self) -> &str {
        &self.inner.name
    }

    pub fn sql(&self) -> &str {
        &self.inner.sql
    }

    pub fn is_open(&self) -> bool {
        self.inner.oci.read().is_some()
    }

    pub fn stmt_type(&self) -> StmtType {
        self.inner.stmt_type
    }

    /// Returns the effective configuration: the statement's own, or the one it inherits.
    pub fn cfg(&self) -> StmtCfg {
        self.inner.stmt_cfg()
    }

    pub fn set_cfg(&self, cfg: StmtCfg) {
        *self.inner.cfg.write() = Some(cfg);
    }

    /// Returns the number of open result sets.
    pub fn num_rset(&self) -> usize {
        self.inner.rsets.len()
    }

    /// Returns the number of bind placeholders in the statement text.
    pub fn num_input(&self) -> Result<usize> {
        let oci = self.oci()?;
        Ok( oci.get_attr::<u32>(OCI_ATTR_BIND_COUNT)? as usize )
    }

    fn oci(&self) -> Result<Arc<OciStmt>> {
        self.inner.oci.read().clone().ok_or(Error::Closed("Stmt"))
    }

    /// Executes the statement. Returns the number of rows processed, or 0 for DDL and PL/SQL.
    pub fn exe(&self, args: &mut [Arg]) -> Result<u64> {
        self.exe_ctx(&Ctx::default(), args)
    }

    pub fn exe_ctx(&self, ctx: &Ctx, args: &mut [Arg]) -> Result<u64> {
        let (rows, _, _) = self.execute(ctx, args, false, false)?;
        Ok(rows)
    }

    /// Runs the query and opens a result set over its rows.
    pub fn qry(&self, args: &mut [Arg]) -> Result<Rset> {
        self.qry_ctx(&Ctx::default(), args)
    }

    /// Runs the query under `ctx`. The result set keeps the context, so its fetches are watched too.
    pub fn qry_ctx(&self, ctx: &Ctx, args: &mut [Arg]) -> Result<Rset> {
        if self.inner.stmt_type != StmtType::Select {
            return Err( Error::new("only SELECT statements return a result set") );
        }
        let (_, _, rset) = self.execute(ctx, args, true, false)?;
        rset.ok_or_else(|| Error::Protocol("query opened no result set".to_string()))
    }

    /**
        Executes an `INSERT ... RETURNING key INTO :n` statement. The last placeholder is bound
        as an `i64` output whatever the last argument is. Returns the number of rows inserted and
        the returned key.

        # Example
        ```no_run
        use ora::Arg;

        # let env = ora::Env::open()?;
        # let ses = env.connect("scott/tiger@localhost/orcl")?;
        let stmt = ses.prep("INSERT INTO t (name) VALUES (:1) RETURNING id INTO :2")?;
        let (rows, id) = stmt.exec_returning(&mut ["x".into(), Arg::null()])?;
        assert_eq!(rows, 1);
        assert!(id > 0);
        # Ok::<(),ora::Error>(())
        ```
    */
    pub fn exec_returning(&self, args: &mut [Arg]) -> Result<(u64, i64)> {
        if self.inner.stmt_type != StmtType::Insert {
            return Err( Error::new("only INSERT statements return a generated key") );
        }
        if !is_returning(self.inner.stmt_type, &self.inner.sql) {
            return Err( Error::new("statement has no RETURNING clause") );
        }
        if args.is_empty() {
            return Err( Error::new("RETURNING needs a placeholder for the key") );
        }
        let (rows, key, _) = self.execute(&Ctx::default(), args, false, true)?;
        Ok( (rows, key.unwrap_or_default()) )
    }

    /**
        Returns the next implicit result (`DBMS_SQL.RETURN_RESULT`) of an executed PL/SQL block,
        or `None` when there are no more.
    */
    pub fn next_result(&self) -> Result<Option<Rset>> {
        let oci = self.oci()?;
        let mut stmt = Ptr::<OCIStmt>::null();
        let stmtp = stmt.as_mut_ptr();
        let mut rtype = 0u32;
        let res = oci.ses().call(|_, errp| unsafe {
            OCIStmtGetNextResult(oci.get(), errp, stmtp as *mut *mut c_void, &mut rtype, OCI_DEFAULT)
        })?;
        if res == OCI_NO_DATA || stmt.is_null() {
            return Ok(None);
        }
        let implicit = Arc::new(OciStmt::implicit(stmt, oci));
        let rset = self.inner.open_rset(implicit, self.inner.stmt_cfg(), &Ctx::default(), &[])?;
        Ok(Some(rset))
    }

    /**
        Binds, executes, reads the row count, writes back output arguments and opens the
        requested result sets. Returns the row count, the captured RETURNING key and the
        query result set.
    */
    fn execute(&self, ctx: &Ctx, args: &mut [Arg], want_rset: bool, returning: bool) -> Result<(u64, Option<i64>, Option<Rset>)> {
        let _guard = self.inner.close_lock.lock();
        let oci = self.oci()?;
        let cfg = ctx.cfg().cloned().unwrap_or_else(|| self.inner.stmt_cfg());
        let stmt_type = self.inner.stmt_type;
        let is_select = stmt_type == StmtType::Select;
        let has_tx = self.inner.ses.read().upgrade().map_or(false, |ses| ses.has_open_tx());
        let ses = oci.ses().clone();
        ctx::watched(ctx, &ses, || {
            let _call = ses.lock();
            let stmtp = oci.get();
            let err = ses.err();
            self.inner.binds.lock().take();
            let mut binds = Binds::new(stmtp, &ses, &cfg, args, returning)?;
            let iters = if is_select { 0 } else { binds.iters() };
            if !is_select && iters == 0 {
                log::debug!("{} skipped: empty arrays", self.inner.name);
                return Ok( (0, None, None) );
            }
            if cfg.prefetch_row_count() > 0 {
                attr::set(OCI_ATTR_PREFETCH_ROWS, cfg.prefetch_row_count(), OCI_HTYPE_STMT, stmtp as *mut c_void, err)?;
            } else {
                attr::set(OCI_ATTR_PREFETCH_MEMORY, cfg.prefetch_memory_size(), OCI_HTYPE_STMT, stmtp as *mut c_void, err)?;
            }
            let mode = if cfg.is_auto_committing() && !has_tx { OCI_COMMIT_ON_SUCCESS } else { OCI_DEFAULT };
            ses.call(|svc, errp| stmt_execute(svc, stmtp, errp, iters, mode))?;
            let rows = if stmt_type.has_row_count() {
                oci.get_attr::<u64>(OCI_ATTR_UB8_ROW_COUNT)?
            } else {
                0
            };
            log::debug!("{} executed: {} rows, {} iterations", self.inner.name, rows, iters);
            if binds.has_out() {
                binds.write_back(args, &ses, &cfg)?;
            }
            let key = if returning { binds.returned_key(&ses, &cfg)? } else { None };
            for (pos, arg) in args.iter_mut().enumerate() {
                if let Arg::Cursor(slot) = arg {
                    if let Some(handle) = binds.take_cursor(pos) {
                        let cursor = Arc::new(OciStmt::cursor(handle, ses.clone()));
                        **slot = Some(self.inner.open_rset(cursor, cfg.clone(), ctx, &[])?);
                    }
                }
            }
            *self.inner.binds.lock() = Some(binds);
            let rset = if want_rset && is_select {
                Some(self.inner.open_rset(oci.clone(), cfg.clone(), ctx, &self.inner.gcts)?)
            } else {
                None
            };
            Ok( (rows, key, rset) )
        })
    }

    /// Closes the statement with its open result sets.
    pub fn close(&self) -> Result<()> {
        let _guard = self.inner.close_lock.lock();
        if self.inner.oci.read().is_none() {
            return Ok(());
        }
        let mut errs = Vec::new();
        for rset in self.inner.rsets.snapshot() {
            if let Err(err) = rset.close_now() {
                log::warn!("{} close: {}", rset.sys_name(), err);
                errs.push(err);
            }
        }
        self.inner.binds.lock().take();
        self.inner.oci.write().take();
        let ses = std::mem::replace(&mut *self.inner.ses.write(), Weak::new());
        if let Some(ses) = ses.upgrade() {
            ses.remove_stmt(self.inner.id);
        }
        log::debug!("{} closed", self.inner.name);
        Error::collect(errs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returning_clause() {
        use StmtType::{Insert, Update, Delete, Merge};
        assert!(is_returning(Insert, "INSERT INTO t (a, b) VALUES (:1, :2) RETURNING id INTO :3"));
        assert!(is_returning(Insert, "insert into t (a) values (:1) returning id into :2"));
        assert!(!is_returning(Insert, "INSERT INTO t (a) VALUES (:1)"));
        // RETURNING inside the parenthesized part does not count
        assert!(!is_returning(Insert, "INSERT INTO t (returning) VALUES (:1)"));
        assert!(!is_returning(Delete, "DELETE FROM t RETURNING id INTO :1"));
        // only INSERT captures a generated key
        assert!(!is_returning(Update, "UPDATE t SET a = NVL(:1, 0) RETURNING id INTO :2"));
        assert!(!is_returning(Delete, "DELETE FROM t WHERE a IN (:1) RETURNING id INTO :2"));
        assert!(!is_returning(Merge, "MERGE INTO t USING (SELECT :1 a FROM dual) s ON (t.a = s.a) WHEN MATCHED THEN UPDATE SET b = 1 RETURNING id INTO :2"));
    }

    #[test]
    fn statement_types() {
        assert_eq!(StmtType::from_code(1), StmtType::Select);
        assert_eq!(StmtType::from_code(16), StmtType::Merge);
        assert_eq!(StmtType::from_code(99), StmtType::Other(99));
        assert!(StmtType::Merge.has_row_count());
        assert!(!StmtType::Begin.has_row_count());
        assert!(!StmtType::Create.has_row_count());
    }
}
