//! Statement, result set, server and session configuration

use crate::{Result, Error, oci::*};

/**
    Host representation of a column value.

    The `Ora*` variants keep SQL NULL as `Value::Null`. The plain variants map NULL to the zero
    value of the type (0, empty string, `false`, empty bytes, default timestamp).
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Use the configured rule for the column's SQL type
    Default,
    I64, I32, I16, I8, U64, U32, U16, U8, F64, F32,
    OraI64, OraI32, OraI16, OraI8, OraU64, OraU32, OraU16, OraU8, OraF64, OraF32,
    /// Arbitrary precision number as its decimal text
    Num, OraNum,
    Time, OraTime,
    Str, OraStr,
    /// Single character compared against the true rune
    Bool, OraBool,
    Bin, OraBin,
    /// Streaming LOB reader
    Lob,
}

impl ColumnType {
    /// Returns `true` for the variants that report SQL NULL as `Value::Null`.
    pub fn is_nullable(self) -> bool {
        use ColumnType::*;
        matches!(self,
            OraI64 | OraI32 | OraI16 | OraI8 | OraU64 | OraU32 | OraU16 | OraU8 | OraF64 | OraF32 |
            OraNum | OraTime | OraStr | OraBool | OraBin | Lob
        )
    }

    /// Returns the non-nullable counterpart of an `Ora*` variant.
    pub(crate) fn base(self) -> Self {
        use ColumnType::*;
        match self {
            OraI64 => I64, OraI32 => I32, OraI16 => I16, OraI8 => I8,
            OraU64 => U64, OraU32 => U32, OraU16 => U16, OraU8 => U8,
            OraF64 => F64, OraF32 => F32,
            OraNum => Num, OraTime => Time, OraStr => Str, OraBool => Bool, OraBin => Bin,
            other => other,
        }
    }

    fn is_numeric(self) -> bool {
        use ColumnType::*;
        matches!(self.base(), I64 | I32 | I16 | I8 | U64 | U32 | U16 | U8 | F64 | F32 | Num | Str)
    }

    fn is_time(self) -> bool {
        self.base() == ColumnType::Time
    }

    fn is_string(self) -> bool {
        self.base() == ColumnType::Str
    }

    fn is_bool_or_string(self) -> bool {
        matches!(self.base(), ColumnType::Bool | ColumnType::Str)
    }

    fn is_bin(self) -> bool {
        self.base() == ColumnType::Bin
    }
}

fn check(ok: bool, what: &str, gct: ColumnType) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err( Error::msg(format!("{:?} is not a valid host type for {} columns", gct, what)) )
    }
}

pub(crate) fn check_numeric(gct: ColumnType) -> Result<()> {
    check(gct.is_numeric(), "numeric", gct)
}

pub(crate) fn check_time(gct: ColumnType) -> Result<()> {
    check(gct.is_time(), "date and time", gct)
}

pub(crate) fn check_string(gct: ColumnType) -> Result<()> {
    check(gct.is_string(), "character", gct)
}

pub(crate) fn check_bool_or_string(gct: ColumnType) -> Result<()> {
    check(gct.is_bool_or_string(), "single character", gct)
}

pub(crate) fn check_bin(gct: ColumnType) -> Result<()> {
    check(gct.is_bin(), "binary", gct)
}

fn check_clob(gct: ColumnType) -> Result<()> {
    check(gct == ColumnType::Lob || gct.is_string(), "character LOB", gct)
}

fn check_blob(gct: ColumnType) -> Result<()> {
    check(gct == ColumnType::Lob || gct.is_bin(), "binary LOB", gct)
}

/// Validates a column type hint against the column's SQL type.
pub(crate) fn check_hint(sqlt: u16, size: u32, gct: ColumnType) -> Result<()> {
    if gct == ColumnType::Default {
        return Ok(());
    }
    match sqlt {
        SQLT_NUM | SQLT_VNU | SQLT_INT | SQLT_UIN | SQLT_FLT |
        SQLT_IBFLOAT | SQLT_IBDOUBLE | SQLT_BFLOAT | SQLT_BDOUBLE => check_numeric(gct),
        SQLT_DAT | SQLT_TIMESTAMP | SQLT_TIMESTAMP_TZ | SQLT_TIMESTAMP_LTZ => check_time(gct),
        SQLT_AFC if size == 1 || size == 4 => check_bool_or_string(gct),
        SQLT_CHR | SQLT_AVC | SQLT_AFC | SQLT_LNG | SQLT_RDD | SQLT_RID => check_string(gct),
        SQLT_CLOB => check_clob(gct),
        SQLT_BLOB => check_blob(gct),
        SQLT_BIN | SQLT_LBI => check_bin(gct),
        SQLT_BFILE => check(gct == ColumnType::Lob || gct.is_bin(), "BFILE", gct),
        _ => Err( Error::msg(format!("column type {} does not accept host type hints", sqlt)) ),
    }
}

/// Host types used for result set columns when no hint is given.
#[derive(Debug, Clone, PartialEq)]
pub struct RsetCfg {
    number_int: ColumnType,
    number_big_int: ColumnType,
    number_float: ColumnType,
    number_big_float: ColumnType,
    binary_double: ColumnType,
    binary_float: ColumnType,
    float: ColumnType,
    date: ColumnType,
    timestamp: ColumnType,
    timestamp_tz: ColumnType,
    timestamp_ltz: ColumnType,
    char1: ColumnType,
    char: ColumnType,
    varchar: ColumnType,
    long: ColumnType,
    clob: ColumnType,
    blob: ColumnType,
    raw: ColumnType,
    long_raw: ColumnType,
}

impl Default for RsetCfg {
    fn default() -> Self {
        use ColumnType::*;
        Self {
            number_int: I64,
            number_big_int: Num,
            number_float: F64,
            number_big_float: Num,
            binary_double: F64,
            binary_float: F32,
            float: F64,
            date: Time,
            timestamp: Time,
            timestamp_tz: Time,
            timestamp_ltz: Time,
            char1: Str,
            char: Str,
            varchar: Str,
            long: Str,
            clob: Str,
            blob: Bin,
            raw: Bin,
            long_raw: Bin,
        }
    }
}

macro_rules! rset_cfg_options {
    ($($name:ident, $setter:ident, $check:ident);+ $(;)?) => {
        impl RsetCfg {
            $(
                pub fn $name(&self) -> ColumnType {
                    self.$name
                }

                pub fn $setter(mut self, gct: ColumnType) -> Result<Self> {
                    $check(gct)?;
                    self.$name = gct;
                    Ok(self)
                }
            )+
        }
    };
}

rset_cfg_options! {
    number_int,       set_number_int,       check_numeric;
    number_big_int,   set_number_big_int,   check_numeric;
    number_float,     set_number_float,     check_numeric;
    number_big_float, set_number_big_float, check_numeric;
    binary_double,    set_binary_double,    check_numeric;
    binary_float,     set_binary_float,     check_numeric;
    float,            set_float,            check_numeric;
    date,             set_date,             check_time;
    timestamp,        set_timestamp,        check_time;
    timestamp_tz,     set_timestamp_tz,     check_time;
    timestamp_ltz,    set_timestamp_ltz,    check_time;
    char1,            set_char1,            check_bool_or_string;
    char,             set_char,             check_string;
    varchar,          set_varchar,          check_string;
    long,             set_long,             check_string;
    clob,             set_clob,             check_clob;
    blob,             set_blob,             check_blob;
    raw,              set_raw,              check_bin;
    long_raw,         set_long_raw,         check_bin;
}

impl RsetCfg {
    /**
        Returns the host type of a NUMBER column with the given precision and scale.

        Integers (scale 0) up to 19 digits fit `number_int`, wider ones use `number_big_int`.
        Decimals up to 15 digits fit `number_float`, wider ones use `number_big_float`.
        FLOAT (precision 0, scale -127) uses `float`; unconstrained NUMBER uses `number_big_float`.
    */
    pub fn numeric_column_type(&self, precision: i16, scale: i8) -> ColumnType {
        if precision != 0 {
            if scale == 0 {
                if precision <= 19 { self.number_int } else { self.number_big_int }
            } else if precision <= 15 {
                self.number_float
            } else {
                self.number_big_float
            }
        } else if scale == -127 {
            self.float
        } else {
            self.number_big_float
        }
    }

    /// Returns the configured host type of a described column. Types with a single host
    /// representation (ROWID, intervals, BFILE, REF CURSOR) return `ColumnType::Default`.
    pub(crate) fn column_type(&self, sqlt: u16, size: u32, precision: i16, scale: i8) -> ColumnType {
        match sqlt {
            SQLT_NUM | SQLT_VNU => self.numeric_column_type(precision, scale),
            SQLT_INT => self.number_int,
            SQLT_UIN => self.number_int,
            SQLT_IBDOUBLE | SQLT_BDOUBLE => self.binary_double,
            SQLT_IBFLOAT | SQLT_BFLOAT => self.binary_float,
            SQLT_FLT => self.float,
            SQLT_DAT => self.date,
            SQLT_TIMESTAMP => self.timestamp,
            SQLT_TIMESTAMP_TZ => self.timestamp_tz,
            SQLT_TIMESTAMP_LTZ => self.timestamp_ltz,
            // CHAR(1) is reported as 1 byte, or 4 when the size is in UTF-8 characters
            SQLT_AFC if size == 1 || size == 4 => self.char1,
            SQLT_AFC => self.char,
            SQLT_CHR | SQLT_AVC => self.varchar,
            SQLT_LNG => self.long,
            SQLT_CLOB => self.clob,
            SQLT_BLOB => self.blob,
            SQLT_BIN => self.raw,
            SQLT_LBI => self.long_raw,
            _ => ColumnType::Default,
        }
    }
}

const MAX_FETCH_LEN : u32 = 1024;

/**
    Statement configuration.

    Set on the driver, an environment, a server, a session or a statement. A level that has not set
    its own configuration uses its parent's. A call-scoped `Ctx` may override it for one call.

    # Example
    ```
    use ora::{StmtCfg, ColumnType};

    let cfg = StmtCfg::default()
        .set_fetch_len(256)?
        .set_prefetch_row_count(0)
        .set_rset(|rset| rset.set_number_int(ColumnType::OraI64))?;
    assert_eq!(cfg.fetch_len(), 256);
    assert_eq!(cfg.rset().number_int(), ColumnType::OraI64);
    # Ok::<(),ora::Error>(())
    ```
*/
#[derive(Debug, Clone, PartialEq)]
pub struct StmtCfg {
    rset: RsetCfg,
    fetch_len: u32,
    lob_fetch_len: u32,
    lob_buffer_size: usize,
    long_buffer_size: usize,
    long_raw_buffer_size: usize,
    string_ptr_buffer_size: usize,
    prefetch_row_count: u32,
    prefetch_memory_size: u32,
    byte_slice: ColumnType,
    true_rune: char,
    false_rune: char,
    is_auto_committing: bool,
    rtrim_char: bool,
}

impl Default for StmtCfg {
    fn default() -> Self {
        Self {
            rset: RsetCfg::default(),
            fetch_len: 128,
            lob_fetch_len: 8,
            lob_buffer_size: 16 << 20,
            long_buffer_size: 16 << 20,
            long_raw_buffer_size: 16 << 20,
            string_ptr_buffer_size: 4000,
            prefetch_row_count: 128,
            prefetch_memory_size: 128 << 20,
            byte_slice: ColumnType::Bin,
            true_rune: '1',
            false_rune: '0',
            is_auto_committing: true,
            rtrim_char: true,
        }
    }
}

fn check_len(name: &str, len: u32, max: u32) -> Result<()> {
    if len == 0 || len > max {
        Err( Error::msg(format!("{} must be between 1 and {}, got {}", name, max, len)) )
    } else {
        Ok(())
    }
}

fn check_size(name: &str, size: usize) -> Result<()> {
    if size == 0 {
        Err( Error::msg(format!("{} must be greater than zero", name)) )
    } else {
        Ok(())
    }
}

impl StmtCfg {
    pub fn rset(&self) -> &RsetCfg                { &self.rset }
    pub fn fetch_len(&self) -> u32                { self.fetch_len }
    pub fn lob_fetch_len(&self) -> u32            { self.lob_fetch_len }
    pub fn lob_buffer_size(&self) -> usize        { self.lob_buffer_size }
    pub fn long_buffer_size(&self) -> usize       { self.long_buffer_size }
    pub fn long_raw_buffer_size(&self) -> usize   { self.long_raw_buffer_size }
    pub fn string_ptr_buffer_size(&self) -> usize { self.string_ptr_buffer_size }
    pub fn prefetch_row_count(&self) -> u32       { self.prefetch_row_count }
    pub fn prefetch_memory_size(&self) -> u32     { self.prefetch_memory_size }
    pub fn byte_slice(&self) -> ColumnType        { self.byte_slice }
    pub fn true_rune(&self) -> char               { self.true_rune }
    pub fn false_rune(&self) -> char              { self.false_rune }
    pub fn is_auto_committing(&self) -> bool      { self.is_auto_committing }
    pub fn rtrim_char(&self) -> bool              { self.rtrim_char }

    /// Replaces the result set configuration with the one produced by `f`.
    pub fn set_rset<F>(mut self, f: F) -> Result<Self>
    where F: FnOnce(RsetCfg) -> Result<RsetCfg>
    {
        self.rset = f(self.rset)?;
        Ok(self)
    }

    /// Sets the number of rows fetched per round trip (1..=1024).
    pub fn set_fetch_len(mut self, len: u32) -> Result<Self> {
        check_len("fetch_len", len, MAX_FETCH_LEN)?;
        self.fetch_len = len;
        Ok(self)
    }

    /// Sets the number of rows fetched per round trip when the select list has a LOB, BFILE or LONG column.
    pub fn set_lob_fetch_len(mut self, len: u32) -> Result<Self> {
        check_len("lob_fetch_len", len, MAX_FETCH_LEN)?;
        self.lob_fetch_len = len;
        Ok(self)
    }

    pub fn set_lob_buffer_size(mut self, size: usize) -> Result<Self> {
        check_size("lob_buffer_size", size)?;
        self.lob_buffer_size = size;
        Ok(self)
    }

    pub fn set_long_buffer_size(mut self, size: usize) -> Result<Self> {
        check_size("long_buffer_size", size)?;
        self.long_buffer_size = size;
        Ok(self)
    }

    pub fn set_long_raw_buffer_size(mut self, size: usize) -> Result<Self> {
        check_size("long_raw_buffer_size", size)?;
        self.long_raw_buffer_size = size;
        Ok(self)
    }

    /// Sets the buffer size of string and byte output binds.
    pub fn set_string_ptr_buffer_size(mut self, size: usize) -> Result<Self> {
        check_size("string_ptr_buffer_size", size)?;
        self.string_ptr_buffer_size = size;
        Ok(self)
    }

    /// Sets the number of rows the client prefetches. 0 switches to memory based prefetching.
    pub fn set_prefetch_row_count(mut self, rows: u32) -> Self {
        self.prefetch_row_count = rows;
        self
    }

    pub fn set_prefetch_memory_size(mut self, size: u32) -> Self {
        self.prefetch_memory_size = size;
        self
    }

    /**
        Selects how byte slices are bound: `ColumnType::Bin` binds a single RAW value,
        `ColumnType::U8` binds an array of numbers for array DML.
    */
    pub fn set_byte_slice(mut self, gct: ColumnType) -> Result<Self> {
        match gct {
            ColumnType::Bin | ColumnType::U8 => {
                self.byte_slice = gct;
                Ok(self)
            }
            _ => Err( Error::msg(format!("byte_slice must be Bin or U8, got {:?}", gct)) ),
        }
    }

    pub fn set_true_rune(mut self, rune: char) -> Self {
        self.true_rune = rune;
        self
    }

    pub fn set_false_rune(mut self, rune: char) -> Self {
        self.false_rune = rune;
        self
    }

    pub fn set_auto_commit(mut self, on: bool) -> Self {
        self.is_auto_committing = on;
        self
    }

    pub fn set_rtrim_char(mut self, on: bool) -> Self {
        self.rtrim_char = on;
        self
    }

    /// Caps output string buffers for UTF-8 servers.
    pub(crate) fn for_utf8_server(mut self) -> Self {
        if self.string_ptr_buffer_size > 1000 {
            self.string_ptr_buffer_size = 1000;
        }
        self
    }
}

/// Native pooling used by a server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// A dedicated physical connection
    None,
    /// OCI connection pool
    Conn,
    /// OCI session pool
    Ses,
    /// Database resident connection pool, reached through a session pool
    Drcp,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SrvCfg {
    pub dblink: String,
    pub pool: PoolKind,
    pub pool_min: u32,
    pub pool_max: u32,
    pub pool_incr: u32,
    /// Credentials of homogeneous session and connection pools
    pub pool_username: String,
    pub pool_password: String,
    pub stmt: Option<StmtCfg>,
}

impl SrvCfg {
    pub fn new(dblink: &str) -> Self {
        Self {
            dblink: dblink.to_string(),
            pool: PoolKind::None,
            pool_min: 1,
            pool_max: 999,
            pool_incr: 1,
            pool_username: String::new(),
            pool_password: String::new(),
            stmt: None,
        }
    }
}

/// Session privilege mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SesMode {
    Default,
    SysDba,
    SysOper,
}

impl SesMode {
    pub(crate) fn oci_mode(self) -> u32 {
        match self {
            SesMode::Default => OCI_DEFAULT,
            SesMode::SysDba  => OCI_SYSDBA,
            SesMode::SysOper => OCI_SYSOPER,
        }
    }
}

/// Session configuration. Empty username and password request external authentication.
#[derive(Debug, Clone, PartialEq)]
pub struct SesCfg {
    pub username: String,
    pub password: String,
    pub mode: SesMode,
    pub stmt: Option<StmtCfg>,
}

impl SesCfg {
    pub fn new(username: &str, password: &str) -> Self {
        Self { username: username.to_string(), password: password.to_string(), mode: SesMode::Default, stmt: None }
    }

    pub(crate) fn is_external(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ColumnType as CT;

    #[test]
    fn stmt_defaults() {
        let cfg = StmtCfg::default();
        assert_eq!(cfg.fetch_len(), 128);
        assert_eq!(cfg.lob_fetch_len(), 8);
        assert_eq!(cfg.prefetch_row_count(), 128);
        assert_eq!(cfg.prefetch_memory_size(), 128 << 20);
        assert_eq!(cfg.lob_buffer_size(), 16 << 20);
        assert_eq!(cfg.string_ptr_buffer_size(), 4000);
        assert_eq!(cfg.byte_slice(), CT::Bin);
        assert_eq!((cfg.true_rune(), cfg.false_rune()), ('1', '0'));
        assert!(cfg.is_auto_committing());
        assert!(cfg.rtrim_char());
        assert_eq!(cfg.clone().for_utf8_server().string_ptr_buffer_size(), 1000);
    }

    #[test]
    fn fetch_len_bounds() {
        assert!(StmtCfg::default().set_fetch_len(0).is_err());
        assert!(StmtCfg::default().set_fetch_len(1025).is_err());
        assert_eq!(StmtCfg::default().set_fetch_len(1024).map(|c| c.fetch_len()), Ok(1024));
        assert!(StmtCfg::default().set_lob_buffer_size(0).is_err());
    }

    #[test]
    fn byte_slice_policy() {
        assert!(StmtCfg::default().set_byte_slice(CT::U8).is_ok());
        assert!(StmtCfg::default().set_byte_slice(CT::Bin).is_ok());
        assert!(StmtCfg::default().set_byte_slice(CT::Str).is_err());
    }

    #[test]
    fn category_checks() {
        let cfg = RsetCfg::default();
        assert!(cfg.clone().set_number_int(CT::OraU32).is_ok());
        assert!(cfg.clone().set_number_int(CT::Str).is_ok());
        assert!(cfg.clone().set_number_int(CT::Time).is_err());
        assert!(cfg.clone().set_date(CT::OraTime).is_ok());
        assert!(cfg.clone().set_date(CT::Str).is_err());
        assert!(cfg.clone().set_char1(CT::Bool).is_ok());
        assert!(cfg.clone().set_char(CT::Bool).is_err());
        assert!(cfg.clone().set_clob(CT::Lob).is_ok());
        assert!(cfg.clone().set_clob(CT::Bin).is_err());
        assert!(cfg.clone().set_blob(CT::OraBin).is_ok());
        assert!(cfg.clone().set_raw(CT::Lob).is_err());
    }

    #[test]
    fn numeric_inference() {
        let cfg = RsetCfg::default();
        assert_eq!(cfg.numeric_column_type(10, 0), CT::I64);
        assert_eq!(cfg.numeric_column_type(19, 0), CT::I64);
        assert_eq!(cfg.numeric_column_type(20, 0), CT::Num);
        assert_eq!(cfg.numeric_column_type(15, 2), CT::F64);
        assert_eq!(cfg.numeric_column_type(16, 2), CT::Num);
        assert_eq!(cfg.numeric_column_type(0, -127), CT::F64);
        assert_eq!(cfg.numeric_column_type(0, 0), CT::Num);
    }

    #[test]
    fn column_rules() {
        let cfg = RsetCfg::default().set_char1(CT::Bool).unwrap();
        assert_eq!(cfg.column_type(SQLT_AFC, 1, 0, 0), CT::Bool);
        assert_eq!(cfg.column_type(SQLT_AFC, 4, 0, 0), CT::Bool);
        assert_eq!(cfg.column_type(SQLT_AFC, 10, 0, 0), CT::Str);
        assert_eq!(cfg.column_type(SQLT_TIMESTAMP_TZ, 13, 0, 0), CT::Time);
        assert_eq!(cfg.column_type(SQLT_IBFLOAT, 4, 0, 0), CT::F32);
        assert_eq!(cfg.column_type(SQLT_BLOB, 4000, 0, 0), CT::Bin);
        assert_eq!(cfg.column_type(SQLT_RSET, 8, 0, 0), CT::Default);
    }

    #[test]
    fn hints() {
        assert!(check_hint(SQLT_NUM, 22, CT::OraNum).is_ok());
        assert!(check_hint(SQLT_NUM, 22, CT::Bin).is_err());
        assert!(check_hint(SQLT_AFC, 1, CT::Bool).is_ok());
        assert!(check_hint(SQLT_CHR, 30, CT::Bool).is_err());
        assert!(check_hint(SQLT_BLOB, 4000, CT::Lob).is_ok());
        assert!(check_hint(SQLT_RSET, 8, CT::Default).is_ok());
        assert!(check_hint(SQLT_RSET, 8, CT::Str).is_err());
    }

    #[test]
    fn nullable_variants() {
        assert!(CT::OraI64.is_nullable());
        assert!(!CT::I64.is_nullable());
        assert_eq!(CT::OraStr.base(), CT::Str);
        assert_eq!(CT::Lob.base(), CT::Lob);
    }
}
