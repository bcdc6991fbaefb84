//! Select-list description, output buffers and fetch windows

use crate::{
    Result, Error,
    oci::{*, attr, param},
    cfg::{self, ColumnType, StmtCfg},
    conv,
    lob::{Lob, LobKind, Locator},
    ses::OciSes,
    types::Value,
};
use libc::c_void;
use std::{mem, sync::Arc};

/// Described select-list column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    /// OCI data type code (SQLT)
    pub sqlt: u16,
    /// Maximum size in bytes
    pub size: u32,
    pub precision: i16,
    pub scale: i8,
    /// Host type values of the column are converted into
    pub gct: ColumnType,
}

/// Maximum text width of a ROWID
const ROWID_WIDTH : usize = 64;
/// Bytes per character in the client character set
const MAX_CHAR_WIDTH : usize = 4;
const PTR_SIZE : usize = mem::size_of::<*mut c_void>();

/// Output buffers of one column, sized for a full fetch window.
enum Buf {
    Number(Vec<u8>),
    Text { data: Vec<u8>, width: usize, sqlt: u16 },
    Raw { data: Vec<u8>, width: usize, sqlt: u16 },
    Time(Vec<Descriptor<OCITimestampTZ>>),
    YearMonth(Vec<Descriptor<OCIIntervalYearToMonth>>),
    DaySecond(Vec<Descriptor<OCIIntervalDayToSecond>>),
    /// Locators are allocated when a window starts and freed when it ends,
    /// unless a value took ownership of them
    Lob { kind: LobKind, locs: Vec<Descriptor<OCILobLocator>> },
    File(Vec<Descriptor<OCIBFileLocator>>),
    Cursor(Vec<Handle<OCIStmt>>),
}

impl Buf {
    fn sqlt_width_ptr(&mut self) -> (u16, usize, *mut c_void) {
        match self {
            Buf::Number(data) => (SQLT_VNU, OCINumber::SIZE, data.as_mut_ptr() as _),
            Buf::Text { data, width, sqlt } | Buf::Raw { data, width, sqlt } => (*sqlt, *width, data.as_mut_ptr() as _),
            Buf::Time(descs) => (SQLT_TIMESTAMP_TZ, PTR_SIZE, descs.as_mut_ptr() as _),
            Buf::YearMonth(descs) => (SQLT_INTERVAL_YM, PTR_SIZE, descs.as_mut_ptr() as _),
            Buf::DaySecond(descs) => (SQLT_INTERVAL_DS, PTR_SIZE, descs.as_mut_ptr() as _),
            Buf::Lob { kind: LobKind::Clob, locs } => (SQLT_CLOB, PTR_SIZE, locs.as_mut_ptr() as _),
            Buf::Lob { locs, .. } => (SQLT_BLOB, PTR_SIZE, locs.as_mut_ptr() as _),
            Buf::File(locs) => (SQLT_BFILE, PTR_SIZE, locs.as_mut_ptr() as _),
            Buf::Cursor(stmts) => (SQLT_RSET, 0, stmts.as_mut_ptr() as _),
        }
    }

    fn is_per_window(&self) -> bool {
        matches!(self, Buf::Lob { .. } | Buf::File(_) | Buf::Cursor(_))
    }
}

/// Native define of one column
struct Define {
    col: Column,
    hndl: Ptr<OCIDefine>,
    buf: Buf,
    inds: Vec<i16>,
    lens: Vec<u32>,
    rcs: Vec<u16>,
}

/// A fetched cell. Cursor columns hand over the statement handle the nested cursor was opened into.
pub(crate) enum Cell {
    Val(Value),
    Cursor(Handle<OCIStmt>),
}

/// Defines of a described query and the size of its fetch window.
pub(crate) struct Defs {
    defs: Vec<Define>,
    names: Arc<Vec<String>>,
    window: u32,
}

fn alloc_descs<T: DescriptorType>(env: *mut OCIEnv, n: usize) -> Result<Vec<Descriptor<T>>> {
    (0..n).map(|_| Descriptor::new(env)).collect()
}

/// Picks the host type of a column: a valid hint wins over the configured rule.
fn column_type(sqlt: u16, size: u32, precision: i16, scale: i8, hint: Option<ColumnType>, cfg: &StmtCfg) -> Result<ColumnType> {
    match hint {
        Some(gct) if gct != ColumnType::Default => {
            cfg::check_hint(sqlt, size, gct)?;
            Ok(gct)
        }
        _ => Ok(cfg.rset().column_type(sqlt, size, precision, scale)),
    }
}

/// Returns the fetch window: `lob_fetch_len` when any column is fetched through a locator or as LONG data.
fn window_len(cols: &[Column], cfg: &StmtCfg) -> u32 {
    let has_lob = cols.iter().any(|col| matches!(col.sqlt, SQLT_CLOB | SQLT_BLOB | SQLT_BFILE | SQLT_LNG | SQLT_LBI));
    if has_lob { cfg.lob_fetch_len() } else { cfg.fetch_len() }
}

impl Define {
    fn new(col: Column, window: usize, env: *mut OCIEnv, cfg: &StmtCfg) -> Result<Self> {
        let buf = match col.sqlt {
            SQLT_NUM | SQLT_VNU | SQLT_INT | SQLT_UIN | SQLT_FLT |
            SQLT_IBFLOAT | SQLT_IBDOUBLE | SQLT_BFLOAT | SQLT_BDOUBLE => Buf::Number(vec![0; OCINumber::SIZE * window]),
            SQLT_DAT | SQLT_TIMESTAMP | SQLT_TIMESTAMP_TZ | SQLT_TIMESTAMP_LTZ => Buf::Time(alloc_descs(env, window)?),
            SQLT_INTERVAL_YM => Buf::YearMonth(alloc_descs(env, window)?),
            SQLT_INTERVAL_DS => Buf::DaySecond(alloc_descs(env, window)?),
            SQLT_RID | SQLT_RDD => Buf::Text { data: vec![0; ROWID_WIDTH * window], width: ROWID_WIDTH, sqlt: SQLT_CHR },
            SQLT_LNG => {
                let width = cfg.long_buffer_size();
                Buf::Text { data: vec![0; width * window], width, sqlt: SQLT_LNG }
            }
            SQLT_CHR | SQLT_AVC | SQLT_AFC => {
                let width = (col.size as usize * MAX_CHAR_WIDTH).max(1);
                let sqlt = if col.sqlt == SQLT_AFC { SQLT_AFC } else { SQLT_CHR };
                Buf::Text { data: vec![0; width * window], width, sqlt }
            }
            SQLT_BIN => {
                let width = (col.size as usize).max(1);
                Buf::Raw { data: vec![0; width * window], width, sqlt: SQLT_BIN }
            }
            SQLT_LBI => {
                let width = cfg.long_raw_buffer_size();
                Buf::Raw { data: vec![0; width * window], width, sqlt: SQLT_LBI }
            }
            SQLT_CLOB => Buf::Lob { kind: LobKind::Clob, locs: (0..window).map(|_| Descriptor::null()).collect() },
            SQLT_BLOB => Buf::Lob { kind: LobKind::Blob, locs: (0..window).map(|_| Descriptor::null()).collect() },
            SQLT_BFILE => Buf::File((0..window).map(|_| Descriptor::null()).collect()),
            SQLT_RSET => Buf::Cursor((0..window).map(|_| Handle::from(Ptr::null())).collect()),
            sqlt => return Err( Error::msg(format!("column {} has unsupported type {}", col.name, sqlt)) ),
        };
        log::trace!("define {} (SQLT {}) as {:?}", col.name, col.sqlt, col.gct);
        Ok( Self {
            col, buf,
            hndl: Ptr::null(),
            inds: vec![OCI_IND_NULL; window],
            lens: vec![0; window],
            rcs: vec![0; window],
        } )
    }

    /// Allocates the locators or cursor handles that the next window is fetched into.
    fn alloc_window(&mut self, env: *mut OCIEnv) -> Result<()> {
        match &mut self.buf {
            Buf::Lob { locs, .. } => {
                for loc in locs.iter_mut().filter(|loc| loc.is_null()) {
                    *loc = Descriptor::new(env)?;
                }
            }
            Buf::File(locs) => {
                for loc in locs.iter_mut().filter(|loc| loc.is_null()) {
                    *loc = Descriptor::new(env)?;
                }
            }
            Buf::Cursor(stmts) => {
                for stmt in stmts.iter_mut().filter(|stmt| stmt.is_null()) {
                    *stmt = Handle::new(env)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Frees per-window locators and handles nobody took.
    fn free_window(&mut self) {
        match &mut self.buf {
            Buf::Lob { locs, .. } => locs.iter_mut().for_each(|loc| *loc = Descriptor::null()),
            Buf::File(locs) => locs.iter_mut().for_each(|loc| *loc = Descriptor::null()),
            Buf::Cursor(stmts) => stmts.iter_mut().for_each(|stmt| *stmt = Handle::from(Ptr::null())),
            _ => {}
        }
    }

    fn define(&mut self, stmt: *mut OCIStmt, pos: u32, err: *mut OCIError) -> Result<()> {
        let (sqlt, width, valuep) = self.buf.sqlt_width_ptr();
        catch!{err =>
            OCIDefineByPos2(
                stmt, self.hndl.as_mut_ptr(), err, pos,
                valuep, width as i64, sqlt,
                self.inds.as_mut_ptr() as *mut c_void, self.lens.as_mut_ptr(), self.rcs.as_mut_ptr(),
                OCI_DEFAULT
            )
        }
        Ok(())
    }

    /// Extracts the value fetched into row `offset` of the window. The caller holds the session call lock.
    fn value(&mut self, offset: usize, ses: &Arc<OciSes>, cfg: &StmtCfg) -> Result<Cell> {
        let gct = self.col.gct;
        if self.inds[offset] == OCI_IND_NULL {
            let val = if gct.is_nullable() { Value::Null } else { conv::zero_value(gct) };
            return Ok(Cell::Val(val));
        }
        let len = self.lens[offset] as usize;
        let val = match &mut self.buf {
            Buf::Number(data) => {
                let mut num = OCINumber { bytes: [0; OCINumber::SIZE] };
                num.bytes.copy_from_slice(&data[offset * OCINumber::SIZE..(offset + 1) * OCINumber::SIZE]);
                conv::from_number(&num, gct, ses.err())?
            }
            Buf::Text { data, width, sqlt } => {
                let start = offset * *width;
                let bytes = &data[start..start + len.min(*width)];
                if gct.base() == ColumnType::Bool {
                    Value::Bool(conv::to_bool(bytes, cfg.true_rune()))
                } else {
                    let txt = String::from_utf8_lossy(bytes);
                    if *sqlt == SQLT_AFC && cfg.rtrim_char() {
                        Value::Str(conv::rtrim(&txt).to_string())
                    } else {
                        Value::Str(txt.into_owned())
                    }
                }
            }
            Buf::Raw { data, width, .. } => {
                let start = offset * *width;
                Value::Bytes(data[start..start + len.min(*width)].to_vec())
            }
            Buf::Time(descs) => Value::Time(conv::from_datetime(descs[offset].get(), ses.usr(), ses.err())?),
            Buf::YearMonth(descs) => Value::IntervalYM(conv::from_interval_ym(descs[offset].get(), ses.usr(), ses.err())?),
            Buf::DaySecond(descs) => Value::IntervalDS(conv::from_interval_ds(descs[offset].get(), ses.usr(), ses.err())?),
            Buf::Lob { kind, locs } => {
                let loc = Descriptor::take(&mut locs[offset]);
                let lob = Lob::from_locator(Locator::Lob(loc), *kind, ses.clone(), cfg.lob_buffer_size());
                match gct.base() {
                    ColumnType::Str => Value::Str(lob.read_to_string()?),
                    ColumnType::Bin => Value::Bytes(lob.read_to_end()?),
                    _ => Value::Lob(lob),
                }
            }
            Buf::File(locs) => {
                let loc = Descriptor::take(&mut locs[offset]);
                let lob = Lob::from_locator(Locator::File(loc), LobKind::Bfile, ses.clone(), cfg.lob_buffer_size());
                match gct.base() {
                    ColumnType::Lob => Value::Lob(lob),
                    ColumnType::Bin => Value::Bytes(lob.read_to_end()?),
                    _ => Value::Bfile(lob.bfile_name()?),
                }
            }
            Buf::Cursor(stmts) => return Ok(Cell::Cursor(Handle::take(&mut stmts[offset]))),
        };
        Ok(Cell::Val(val))
    }
}

impl Defs {
    /**
        Describes the select list of an executed query and defines its output buffers.

        `hints` are optional per-column host types given at prepare time. The caller holds the
        session call lock.
    */
    pub(crate) fn new(stmt: *mut OCIStmt, ses: &Arc<OciSes>, cfg: &StmtCfg, hints: &[ColumnType]) -> Result<Self> {
        let err = ses.err();
        let num_cols = attr::get::<u32>(OCI_ATTR_PARAM_COUNT, OCI_HTYPE_STMT, stmt as *const c_void, err)? as usize;
        let mut cols = Vec::with_capacity(num_cols);
        for pos in 1..=num_cols {
            let param = param::get(pos as u32, stmt, err)?;
            let sqlt = param.get_attr::<u16>(OCI_ATTR_DATA_TYPE, err)?;
            let size = param.get_attr::<u16>(OCI_ATTR_DATA_SIZE, err)? as u32;
            let name = param.get_attr::<String>(OCI_ATTR_NAME, err)?;
            let (precision, scale) = match sqlt {
                SQLT_NUM | SQLT_VNU => (param.get_attr::<i16>(OCI_ATTR_PRECISION, err)?, param.get_attr::<i8>(OCI_ATTR_SCALE, err)?),
                _ => (0, 0),
            };
            let gct = column_type(sqlt, size, precision, scale, hints.get(pos - 1).copied(), cfg)?;
            cols.push(Column { name, sqlt, size, precision, scale, gct });
        }
        let window = window_len(&cols, cfg);
        let names = Arc::new(cols.iter().map(|col| col.name.clone()).collect::<Vec<_>>());
        let mut defs = Vec::with_capacity(num_cols);
        for col in cols {
            defs.push(Define::new(col, window as usize, ses.env(), cfg)?);
        }
        for (idx, def) in defs.iter_mut().enumerate() {
            def.define(stmt, idx as u32 + 1, err)?;
        }
        Ok( Self { defs, names, window } )
    }

    pub(crate) fn names(&self) -> &Arc<Vec<String>> {
        &self.names
    }

    pub(crate) fn columns(&self) -> Vec<Column> {
        self.defs.iter().map(|def| def.col.clone()).collect()
    }

    pub(crate) fn window(&self) -> u32 {
        self.window
    }

    pub(crate) fn has_per_window(&self) -> bool {
        self.defs.iter().any(|def| def.buf.is_per_window())
    }

    pub(crate) fn alloc_window(&mut self, env: *mut OCIEnv) -> Result<()> {
        for def in self.defs.iter_mut() {
            def.alloc_window(env)?;
        }
        Ok(())
    }

    pub(crate) fn free_window(&mut self) {
        for def in self.defs.iter_mut() {
            def.free_window();
        }
    }

    /// Extracts every column of row `offset` of the window. The caller holds the session call lock.
    pub(crate) fn row(&mut self, offset: usize, ses: &Arc<OciSes>, cfg: &StmtCfg) -> Result<Vec<Cell>> {
        self.defs.iter_mut().map(|def| def.value(offset, ses, cfg)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(sqlt: u16) -> Column {
        Column { name: "C".to_string(), sqlt, size: 10, precision: 0, scale: 0, gct: ColumnType::Default }
    }

    #[test]
    fn lob_columns_shrink_the_window() {
        let cfg = StmtCfg::default();
        assert_eq!(window_len(&[col(SQLT_NUM), col(SQLT_CHR)], &cfg), 128);
        assert_eq!(window_len(&[col(SQLT_NUM), col(SQLT_CLOB)], &cfg), 8);
        assert_eq!(window_len(&[col(SQLT_LNG)], &cfg), 8);
        assert_eq!(window_len(&[col(SQLT_BFILE)], &cfg), 8);
        let cfg = cfg.set_lob_fetch_len(2).unwrap();
        assert_eq!(window_len(&[col(SQLT_BLOB)], &cfg), 2);
    }

    #[test]
    fn hints_override_rules() {
        let cfg = StmtCfg::default();
        assert_eq!(column_type(SQLT_NUM, 22, 10, 0, None, &cfg).unwrap(), ColumnType::I64);
        assert_eq!(column_type(SQLT_NUM, 22, 10, 0, Some(ColumnType::Default), &cfg).unwrap(), ColumnType::I64);
        assert_eq!(column_type(SQLT_NUM, 22, 10, 0, Some(ColumnType::OraU16), &cfg).unwrap(), ColumnType::OraU16);
        assert!(column_type(SQLT_NUM, 22, 10, 0, Some(ColumnType::Time), &cfg).is_err());
        assert_eq!(column_type(SQLT_AFC, 1, 0, 0, Some(ColumnType::Bool), &cfg).unwrap(), ColumnType::Bool);
        assert!(column_type(SQLT_CHR, 20, 0, 0, Some(ColumnType::Bool), &cfg).is_err());
        assert_eq!(column_type(SQLT_CLOB, 0, 0, 0, Some(ColumnType::Lob), &cfg).unwrap(), ColumnType::Lob);
        assert_eq!(column_type(SQLT_RDD, 10, 0, 0, None, &cfg).unwrap(), ColumnType::Default);
    }
}
