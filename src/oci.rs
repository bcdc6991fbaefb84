//! Oracle OCI
//!
//! The client library is loaded at run time. Every entry point the driver uses is resolved once into a
//! function table. Until the table is loaded each wrapper returns `OCI_INVALID_HANDLE`.

#![allow(dead_code, non_snake_case)]

use crate::{Result, Error};
use libc::{size_t, c_void};
use once_cell::sync::OnceCell;

pub(crate) mod ptr;
pub(crate) mod attr;
pub(crate) mod param;
pub(crate) mod handle;
pub(crate) mod desc;

pub(crate) use ptr::Ptr;
pub(crate) use handle::{Handle, HandleType};
pub(crate) use desc::{Descriptor, DescriptorType};

pub(crate) const OCI_DEFAULT                : u32 = 0;

// OCI Error Codes
pub(crate) const OCI_SUCCESS                : i32 = 0;
pub(crate) const OCI_SUCCESS_WITH_INFO      : i32 = 1;
pub(crate) const OCI_NEED_DATA              : i32 = 99;
pub(crate) const OCI_NO_DATA                : i32 = 100;
pub(crate) const OCI_ERROR                  : i32 = -1;
pub(crate) const OCI_INVALID_HANDLE         : i32 = -2;
pub(crate) const OCI_STILL_EXECUTING        : i32 = -3123;

// Attribute Constants
pub(crate) const OCI_ATTR_DATA_SIZE         : u32 = 1;      // maximum size of the data
pub(crate) const OCI_ATTR_DATA_TYPE         : u32 = 2;      // the SQL type of the column/argument
pub(crate) const OCI_ATTR_NAME              : u32 = 4;      // the name of the column/argument
pub(crate) const OCI_ATTR_PRECISION         : u32 = 5;      // precision if number type
pub(crate) const OCI_ATTR_SCALE             : u32 = 6;      // scale if number type
pub(crate) const OCI_ATTR_IS_NULL           : u32 = 7;      // is it null ?
pub(crate) const OCI_ATTR_SERVER            : u32 = 6;
pub(crate) const OCI_ATTR_SESSION           : u32 = 7;
pub(crate) const OCI_ATTR_ROW_COUNT         : u32 = 9;
pub(crate) const OCI_ATTR_PREFETCH_ROWS     : u32 = 11;
pub(crate) const OCI_ATTR_PREFETCH_MEMORY   : u32 = 13;
pub(crate) const OCI_ATTR_PARAM_COUNT       : u32 = 18;     // number of columns in the select list
pub(crate) const OCI_ATTR_USERNAME          : u32 = 22;
pub(crate) const OCI_ATTR_PASSWORD          : u32 = 23;
pub(crate) const OCI_ATTR_STMT_TYPE         : u32 = 24;
pub(crate) const OCI_ATTR_ENV_CHARSET_ID    : u32 = 31;
pub(crate) const OCI_ATTR_CHARSET_FORM      : u32 = 32;
pub(crate) const OCI_ATTR_STMTCACHESIZE     : u32 = 176;
pub(crate) const OCI_ATTR_BIND_COUNT        : u32 = 190;
pub(crate) const OCI_ATTR_ROWS_FETCHED      : u32 = 197;
pub(crate) const OCI_ATTR_STMT_IS_RETURNING : u32 = 218;
pub(crate) const OCI_ATTR_SPOOL_TIMEOUT     : u32 = 308;
pub(crate) const OCI_ATTR_SPOOL_GETMODE     : u32 = 309;
pub(crate) const OCI_ATTR_SPOOL_BUSY_COUNT  : u32 = 310;
pub(crate) const OCI_ATTR_SPOOL_OPEN_COUNT  : u32 = 311;
pub(crate) const OCI_ATTR_MODULE            : u32 = 366;
pub(crate) const OCI_ATTR_ACTION            : u32 = 367;
pub(crate) const OCI_ATTR_DRIVER_NAME       : u32 = 424;
pub(crate) const OCI_ATTR_UB8_ROW_COUNT     : u32 = 457;
pub(crate) const OCI_ATTR_SPOOL_AUTH        : u32 = 460;
pub(crate) const OCI_ATTR_IMPLICIT_RESULT_COUNT : u32 = 463;

// Handle Types
pub(crate) const OCI_HTYPE_ENV              : u32 = 1;
pub(crate) const OCI_HTYPE_ERROR            : u32 = 2;
pub(crate) const OCI_HTYPE_SVCCTX           : u32 = 3;
pub(crate) const OCI_HTYPE_STMT             : u32 = 4;
pub(crate) const OCI_HTYPE_BIND             : u32 = 5;
pub(crate) const OCI_HTYPE_DEFINE           : u32 = 6;
pub(crate) const OCI_HTYPE_SERVER           : u32 = 8;
pub(crate) const OCI_HTYPE_SESSION          : u32 = 9;
pub(crate) const OCI_HTYPE_AUTHINFO         : u32 = OCI_HTYPE_SESSION;
pub(crate) const OCI_HTYPE_CPOOL            : u32 = 26;
pub(crate) const OCI_HTYPE_SPOOL            : u32 = 27;

// Handle Definitions
#[repr(C)] pub struct OCIEnv                { _private: [u8; 0] }
#[repr(C)] pub struct OCIError              { _private: [u8; 0] }
#[repr(C)] pub struct OCISvcCtx             { _private: [u8; 0] }
#[repr(C)] pub struct OCIStmt               { _private: [u8; 0] }
#[repr(C)] pub struct OCIBind               { _private: [u8; 0] }
#[repr(C)] pub struct OCIDefine             { _private: [u8; 0] }
#[repr(C)] pub struct OCIServer             { _private: [u8; 0] }
#[repr(C)] pub struct OCISession            { _private: [u8; 0] }
#[repr(C)] pub struct OCIAuthInfo           { _private: [u8; 0] }
#[repr(C)] pub struct OCISPool              { _private: [u8; 0] }
#[repr(C)] pub struct OCICPool              { _private: [u8; 0] }

// Descriptor Types
pub(crate) const OCI_DTYPE_LOB              : u32 = 50;  // lob locator
pub(crate) const OCI_DTYPE_PARAM            : u32 = 53;  // a parameter descriptor obtained from ocigparm
pub(crate) const OCI_DTYPE_FILE             : u32 = 56;  // File Lob locator
pub(crate) const OCI_DTYPE_INTERVAL_YM      : u32 = 62;  // Interval year month
pub(crate) const OCI_DTYPE_INTERVAL_DS      : u32 = 63;  // Interval day second
pub(crate) const OCI_DTYPE_TIMESTAMP_TZ     : u32 = 69;  // Timestamp with timezone

// Descriptor Definitions
#[repr(C)] pub struct OCILobLocator         { _private: [u8; 0] }
#[repr(C)] pub struct OCIParam              { _private: [u8; 0] }
#[repr(C)] pub struct OCIDateTime           { _private: [u8; 0] }
#[repr(C)] pub struct OCIInterval           { _private: [u8; 0] }

// Virtual descriptors
pub struct OCIBFileLocator          {}
pub struct OCITimestampTZ           {}
pub struct OCIIntervalYearToMonth   {}
pub struct OCIIntervalDayToSecond   {}

/// Marker trait for OCI handles and descriptors
pub trait OCIStruct {}

macro_rules! mark_as_oci {
    ($($t:ty),+) => {
        $(
            impl OCIStruct for $t {}
        )+
    };
}

mark_as_oci!(OCIEnv, OCIError, OCISvcCtx, OCIStmt, OCIBind, OCIDefine, OCIServer, OCISession, OCIAuthInfo, OCISPool, OCICPool);
mark_as_oci!(OCILobLocator, OCIParam, OCIDateTime, OCIInterval);
mark_as_oci!(OCIBFileLocator, OCITimestampTZ, OCIIntervalYearToMonth, OCIIntervalDayToSecond);

/// C mapping of the Oracle NUMBER
#[derive(Clone, Copy)]
#[repr(C)] pub struct OCINumber {
    pub(crate) bytes: [u8; 22]
}

impl OCINumber {
    pub(crate) const SIZE : usize = 22;
}

// Data types
pub(crate) const SQLT_CHR           : u16 = 1;   // (ORANET TYPE) character string
pub(crate) const SQLT_NUM           : u16 = 2;   // (ORANET TYPE) oracle numeric
pub(crate) const SQLT_INT           : u16 = 3;   // (ORANET TYPE) integer
pub(crate) const SQLT_FLT           : u16 = 4;   // (ORANET TYPE) Floating point number
pub(crate) const SQLT_VNU           : u16 = 6;   // NUM with preceding length byte
pub(crate) const SQLT_LNG           : u16 = 8;   // long
pub(crate) const SQLT_RID           : u16 = 11;  // rowid
pub(crate) const SQLT_DAT           : u16 = 12;  // date in oracle format
pub(crate) const SQLT_BFLOAT        : u16 = 21;  // Native Binary float
pub(crate) const SQLT_BDOUBLE       : u16 = 22;  // NAtive binary double
pub(crate) const SQLT_BIN           : u16 = 23;  // binary data(DTYBIN)
pub(crate) const SQLT_LBI           : u16 = 24;  // long binary
pub(crate) const SQLT_UIN           : u16 = 68;  // unsigned integer
pub(crate) const SQLT_AFC           : u16 = 96;  // Ansi fixed char
pub(crate) const SQLT_AVC           : u16 = 97;  // Ansi Var char
pub(crate) const SQLT_IBFLOAT       : u16 = 100; // binary float canonical
pub(crate) const SQLT_IBDOUBLE      : u16 = 101; // binary double canonical
pub(crate) const SQLT_RDD           : u16 = 104; // rowid descriptor
pub(crate) const SQLT_CLOB          : u16 = 112; // character lob
pub(crate) const SQLT_BLOB          : u16 = 113; // binary lob
pub(crate) const SQLT_BFILE         : u16 = 114; // binary file lob
pub(crate) const SQLT_RSET          : u16 = 116; // result set type
pub(crate) const SQLT_TIMESTAMP     : u16 = 187; // TIMESTAMP
pub(crate) const SQLT_TIMESTAMP_TZ  : u16 = 188; // TIMESTAMP WITH TIME ZONE
pub(crate) const SQLT_INTERVAL_YM   : u16 = 189; // INTERVAL YEAR TO MONTH
pub(crate) const SQLT_INTERVAL_DS   : u16 = 190; // INTERVAL DAY TO SECOND
pub(crate) const SQLT_TIMESTAMP_LTZ : u16 = 232; // TIMESTAMP WITH LOCAL TZ

// Null indicator
pub(crate) const OCI_IND_NOTNULL    : i16 = 0;
pub(crate) const OCI_IND_NULL       : i16 = -1;

// Character set forms
pub(crate) const SQLCS_IMPLICIT     : u8 = 1;
pub(crate) const SQLCS_NCHAR        : u8 = 2;

pub(crate) const AL32UTF8           : u16 = 873;
pub(crate) const UTF8               : u16 = 871;

// Initialization Modes
pub(crate) const OCI_THREADED       : u32 = 1;
pub(crate) const OCI_OBJECT         : u32 = 2;

// Credential types
pub(crate) const OCI_CRED_RDBMS     : u32 = 1;
pub(crate) const OCI_CRED_EXT       : u32 = 2;

// Authentication modes
pub(crate) const OCI_SYSDBA         : u32 = 0x00000002;
pub(crate) const OCI_SYSOPER        : u32 = 0x00000004;
pub(crate) const OCI_STMT_CACHE     : u32 = 0x00000040;

// OCISessionGet modes
pub(crate) const OCI_SESSGET_SPOOL          : u32 = 0x0001;
pub(crate) const OCI_SESSGET_STMTCACHE      : u32 = 0x0004;
pub(crate) const OCI_SESSGET_CREDEXT        : u32 = 0x0010;
pub(crate) const OCI_SESSGET_SPOOL_MATCHANY : u32 = 0x0020;
pub(crate) const OCI_SESSGET_PURITY_SELF    : u32 = 0x0080;
pub(crate) const OCI_SESSGET_CPOOL          : u32 = 0x0200;

// Session pool create/destroy and session release modes
pub(crate) const OCI_SPC_HOMOGENEOUS        : u32 = 0x0002;
pub(crate) const OCI_SPC_STMTCACHE          : u32 = 0x0004;
pub(crate) const OCI_SPD_FORCE              : u32 = 0x0001;
pub(crate) const OCI_SESSRLS_DROPSESS       : u32 = 0x0001;
pub(crate) const OCI_SPOOL_ATTRVAL_NOWAIT   : u8  = 1;

// Statement languages and modes
pub(crate) const OCI_NTV_SYNTAX             : u32 = 1;
pub(crate) const OCI_DESCRIBE_ONLY          : u32 = 0x00000010;
pub(crate) const OCI_COMMIT_ON_SUCCESS      : u32 = 0x00000020;

// Transaction flags
pub(crate) const OCI_TRANS_NEW              : u32 = 0x00000001;

// Fetch orientation
pub(crate) const OCI_FETCH_NEXT             : u16 = 0x02;

// Number conversion flags
pub(crate) const OCI_NUMBER_UNSIGNED        : u32 = 0;
pub(crate) const OCI_NUMBER_SIGNED          : u32 = 2;

// Statement types
pub(crate) const OCI_STMT_SELECT            : u16 = 1;
pub(crate) const OCI_STMT_UPDATE            : u16 = 2;
pub(crate) const OCI_STMT_DELETE            : u16 = 3;
pub(crate) const OCI_STMT_INSERT            : u16 = 4;
pub(crate) const OCI_STMT_CREATE            : u16 = 5;
pub(crate) const OCI_STMT_DROP              : u16 = 6;
pub(crate) const OCI_STMT_ALTER             : u16 = 7;
pub(crate) const OCI_STMT_BEGIN             : u16 = 8;
pub(crate) const OCI_STMT_DECLARE           : u16 = 9;
pub(crate) const OCI_STMT_CALL              : u16 = 10;
pub(crate) const OCI_STMT_MERGE             : u16 = 16;

// LOB
pub(crate) const OCI_TEMP_BLOB              : u8 = 1;
pub(crate) const OCI_TEMP_CLOB              : u8 = 2;
pub(crate) const OCI_LOB_READONLY           : u8 = 1;
pub(crate) const OCI_LOB_READWRITE          : u8 = 2;
pub(crate) const OCI_FILE_READONLY          : u8 = 1;
pub(crate) const OCI_DURATION_SESSION       : u16 = 10;
pub(crate) const OCI_ONE_PIECE              : u8 = 0;

/// Defines the function table and one `unsafe fn` per OCI entry point that calls through it.
macro_rules! oci_api {
    ( $( fn $name:ident ( $( $arg:ident : $ty:ty ),* $(,)? ); )+ ) => {
        struct Api {
            $( $name: unsafe extern "C" fn( $( $ty ),* ) -> i32, )+
            _lib: libloading::Library,
        }

        impl Api {
            unsafe fn load(lib: libloading::Library) -> std::result::Result<Self, libloading::Error> {
                $(
                    let $name = *lib.get::<unsafe extern "C" fn( $( $ty ),* ) -> i32>(concat!(stringify!($name), "\0").as_bytes())?;
                )+
                Ok( Self { $( $name, )+ _lib: lib } )
            }
        }

        $(
            pub(crate) unsafe fn $name( $( $arg : $ty ),* ) -> i32 {
                match API.get() {
                    Some(api) => (api.$name)( $( $arg ),* ),
                    None => OCI_INVALID_HANDLE,
                }
            }
        )+
    };
}

static API : OnceCell<Api> = OnceCell::new();

/// Environment variable that overrides the path of the OCI client library.
pub const OCI_LIB_ENV : &str = "ORA_OCI_LIB";

/// Loads the OCI client library unless it has been loaded already.
pub(crate) fn load() -> Result<()> {
    API.get_or_try_init(|| {
        let path = std::env::var_os(OCI_LIB_ENV).unwrap_or_else(||
            libloading::library_filename(if cfg!(windows) { "oci" } else { "clntsh" })
        );
        log::debug!("loading OCI from {:?}", path);
        let lib = unsafe { libloading::Library::new(&path) }?;
        let api = unsafe { Api::load(lib) }?;
        Ok::<_,Error>(api)
    })?;
    Ok(())
}

pub(crate) fn is_loaded() -> bool {
    API.get().is_some()
}

oci_api! {
    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/connect-authorize-and-initialize-functions.html#GUID-0B6911A9-4B46-476C-BC5E-B87581666CD9
    fn OCIEnvNlsCreate(
        envhpp: *mut *mut OCIEnv, mode: u32, ctxp: *const c_void,
        malocfp: *const c_void, ralocfp: *const c_void, mfreefp: *const c_void,
        xtramemsz: size_t, usrmempp: *const c_void, charset: u16, ncharset: u16
    );
    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/handle-and-descriptor-functions.html#GUID-C5BF55F7-A110-4CB5-9663-5056590F12B5
    fn OCIHandleAlloc(
        parenth: *const OCIEnv, hndlpp: *mut *mut c_void, hndl_type: u32, xtramem_sz: size_t, usrmempp: *const c_void
    );
    fn OCIHandleFree(hndlp: *mut c_void, hnd_type: u32);
    fn OCIDescriptorAlloc(
        parenth: *const OCIEnv, descpp: *mut *mut c_void, desc_type: u32, xtramem_sz: size_t, usrmempp: *const c_void
    );
    fn OCIDescriptorFree(descp: *mut c_void, desc_type: u32);
    fn OCIAttrGet(
        trgthndlp: *const c_void, trghndltyp: u32, attributep: *mut c_void, sizep: *mut u32, attrtype: u32, errhp: *mut OCIError
    );
    fn OCIAttrSet(
        trgthndlp: *mut c_void, trghndltyp: u32, attributep: *const c_void, size: u32, attrtype: u32, errhp: *mut OCIError
    );
    fn OCIParamGet(hndlp: *const c_void, htype: u32, errhp: *mut OCIError, parmdpp: *mut *mut c_void, pos: u32);
    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/miscellaneous-functions.html#GUID-4B99087C-74F6-498A-8310-D6645172390A
    fn OCIErrorGet(
        hndlp: *mut c_void, recordno: u32, sqlstate: *mut u8, errcodep: *mut i32, bufp: *mut u8, bufsiz: u32, hnd_type: u32
    );

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/connect-authorize-and-initialize-functions.html#GUID-B6291228-DA2F-4CE9-870A-F94243141757
    fn OCIServerAttach(srvhp: *mut OCIServer, errhp: *mut OCIError, dblink: *const u8, dblink_len: i32, mode: u32);
    fn OCIServerDetach(srvhp: *mut OCIServer, errhp: *mut OCIError, mode: u32);
    fn OCIServerVersion(hndlp: *mut c_void, errhp: *mut OCIError, bufp: *mut u8, bufsz: u32, hndltype: u8);
    fn OCISessionBegin(svchp: *mut OCISvcCtx, errhp: *mut OCIError, usrhp: *mut OCISession, credt: u32, mode: u32);
    fn OCISessionEnd(svchp: *mut OCISvcCtx, errhp: *mut OCIError, usrhp: *mut OCISession, mode: u32);
    fn OCISessionGet(
        envhp: *mut OCIEnv, errhp: *mut OCIError, svchp: *mut *mut OCISvcCtx, authinfop: *mut OCIAuthInfo,
        pool_name: *const u8, pool_name_len: u32, tagp: *const u8, tag_len: u32,
        ret_tagp: *mut *const u8, ret_tag_len: *mut u32, found: *mut u8, mode: u32
    );
    fn OCISessionRelease(svchp: *mut OCISvcCtx, errhp: *mut OCIError, tag: *const u8, tag_len: u32, mode: u32);
    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/connect-authorize-and-initialize-functions.html#GUID-1DD36D3D-5C4F-4F1B-A5E8-3E4BAB5C6C5E
    fn OCISessionPoolCreate(
        envhp: *mut OCIEnv, errhp: *mut OCIError, spoolhp: *mut OCISPool,
        pool_name: *mut *const u8, pool_name_len: *mut u32, conn_str: *const u8, conn_str_len: u32,
        sess_min: u32, sess_max: u32, sess_incr: u32,
        userid: *const u8, userid_len: u32, password: *const u8, password_len: u32, mode: u32
    );
    fn OCISessionPoolDestroy(spoolhp: *mut OCISPool, errhp: *mut OCIError, mode: u32);
    fn OCIConnectionPoolCreate(
        envhp: *mut OCIEnv, errhp: *mut OCIError, poolhp: *mut OCICPool,
        pool_name: *mut *const u8, pool_name_len: *mut i32, dblink: *const u8, dblink_len: i32,
        conn_min: u32, conn_max: u32, conn_incr: u32,
        username: *const u8, username_len: i32, password: *const u8, password_len: i32, mode: u32
    );
    fn OCIConnectionPoolDestroy(poolhp: *mut OCICPool, errhp: *mut OCIError, mode: u32);

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/transaction-functions.html
    fn OCITransStart(svchp: *mut OCISvcCtx, errhp: *mut OCIError, timeout: u32, flags: u32);
    fn OCITransCommit(svchp: *mut OCISvcCtx, errhp: *mut OCIError, flags: u32);
    fn OCITransRollback(svchp: *mut OCISvcCtx, errhp: *mut OCIError, flags: u32);
    fn OCIPing(svchp: *mut OCISvcCtx, errhp: *mut OCIError, mode: u32);
    fn OCIBreak(hndlp: *mut c_void, errhp: *mut OCIError);
    fn OCIReset(hndlp: *mut c_void, errhp: *mut OCIError);

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/statement-functions.html
    fn OCIStmtPrepare2(
        svchp: *mut OCISvcCtx, stmthp: *mut *mut OCIStmt, errhp: *mut OCIError, stmttext: *const u8, stmt_len: u32,
        key: *const u8, keylen: u32, language: u32, mode: u32
    );
    fn OCIStmtRelease(stmthp: *mut OCIStmt, errhp: *mut OCIError, key: *const u8, keylen: u32, mode: u32);
    fn OCIStmtExecute(
        svchp: *mut OCISvcCtx, stmtp: *mut OCIStmt, errhp: *mut OCIError, iters: u32, rowoff: u32,
        snap_in: *const c_void, snap_out: *mut c_void, mode: u32
    );
    fn OCIStmtFetch2(stmtp: *mut OCIStmt, errhp: *mut OCIError, nrows: u32, orient: u16, fetch_offset: i32, mode: u32);
    fn OCIStmtGetNextResult(stmtp: *mut OCIStmt, errhp: *mut OCIError, result: *mut *mut c_void, rtype: *mut u32, mode: u32);

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/bind-define-describe-functions.html
    fn OCIBindByPos2(
        stmtp: *mut OCIStmt, bindpp: *mut *mut OCIBind, errhp: *mut OCIError, position: u32,
        valuep: *mut c_void, value_sz: i64, dty: u16, indp: *mut c_void, alenp: *mut u32, rcodep: *mut u16,
        maxarr_len: u32, curelep: *mut u32, mode: u32
    );
    fn OCIBindArrayOfStruct(
        bindp: *mut OCIBind, errhp: *mut OCIError, pvskip: u32, indskip: u32, alskip: u32, rcskip: u32
    );
    fn OCIDefineByPos2(
        stmtp: *mut OCIStmt, defnpp: *mut *mut OCIDefine, errhp: *mut OCIError, position: u32,
        valuep: *mut c_void, value_sz: i64, dty: u16, indp: *mut c_void, rlenp: *mut u32, rcodep: *mut u16, mode: u32
    );

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/lob-functions.html
    fn OCILobGetLength2(svchp: *mut OCISvcCtx, errhp: *mut OCIError, locp: *mut OCILobLocator, lenp: *mut u64);
    fn OCILobRead2(
        svchp: *mut OCISvcCtx, errhp: *mut OCIError, locp: *mut OCILobLocator,
        byte_amtp: *mut u64, char_amtp: *mut u64, offset: u64, bufp: *mut u8, bufl: u64, piece: u8,
        ctxp: *mut c_void, cbfp: *const c_void, csid: u16, csfrm: u8
    );
    fn OCILobWrite2(
        svchp: *mut OCISvcCtx, errhp: *mut OCIError, locp: *mut OCILobLocator,
        byte_amtp: *mut u64, char_amtp: *mut u64, offset: u64, bufp: *const u8, buflen: u64, piece: u8,
        ctxp: *mut c_void, cbfp: *const c_void, csid: u16, csfrm: u8
    );
    fn OCILobTrim2(svchp: *mut OCISvcCtx, errhp: *mut OCIError, locp: *mut OCILobLocator, newlen: u64);
    fn OCILobOpen(svchp: *mut OCISvcCtx, errhp: *mut OCIError, locp: *mut OCILobLocator, mode: u8);
    fn OCILobClose(svchp: *mut OCISvcCtx, errhp: *mut OCIError, locp: *mut OCILobLocator);
    fn OCILobIsOpen(svchp: *mut OCISvcCtx, errhp: *mut OCIError, locp: *mut OCILobLocator, flag: *mut i32);
    fn OCILobGetChunkSize(svchp: *mut OCISvcCtx, errhp: *mut OCIError, locp: *mut OCILobLocator, chunk_size: *mut u32);
    fn OCILobCreateTemporary(
        svchp: *mut OCISvcCtx, errhp: *mut OCIError, locp: *mut OCILobLocator,
        csid: u16, csfrm: u8, lobtype: u8, cache: i32, duration: u16
    );
    fn OCILobFreeTemporary(svchp: *mut OCISvcCtx, errhp: *mut OCIError, locp: *mut OCILobLocator);
    fn OCILobFileOpen(svchp: *mut OCISvcCtx, errhp: *mut OCIError, filep: *mut OCILobLocator, mode: u8);
    fn OCILobFileClose(svchp: *mut OCISvcCtx, errhp: *mut OCIError, filep: *mut OCILobLocator);
    fn OCILobFileGetName(
        envhp: *mut OCIEnv, errhp: *mut OCIError, filep: *const OCILobLocator,
        dir_alias: *mut u8, d_length: *mut u16, filename: *mut u8, f_length: *mut u16
    );
    fn OCILobFileSetName(
        envhp: *mut OCIEnv, errhp: *mut OCIError, filepp: *mut *mut OCILobLocator,
        dir_alias: *const u8, d_length: u16, filename: *const u8, f_length: u16
    );

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/oci-NUMBER-functions.html
    fn OCINumberFromInt(err: *mut OCIError, inum: *const c_void, inum_length: u32, inum_s_flag: u32, number: *mut OCINumber);
    fn OCINumberToInt(err: *mut OCIError, number: *const OCINumber, rsl_length: u32, rsl_flag: u32, rsl: *mut c_void);
    fn OCINumberFromReal(err: *mut OCIError, rnum: *const c_void, rnum_length: u32, number: *mut OCINumber);
    fn OCINumberToReal(err: *mut OCIError, number: *const OCINumber, rsl_length: u32, rsl: *mut c_void);
    fn OCINumberToText(
        err: *mut OCIError, number: *const OCINumber, fmt: *const u8, fmt_length: u32,
        nls_params: *const u8, nls_p_length: u32, buf_size: *mut u32, buf: *mut u8
    );
    fn OCINumberFromText(
        err: *mut OCIError, txt: *const u8, txt_len: u32, fmt: *const u8, fmt_length: u32,
        nls_params: *const u8, nls_p_length: u32, number: *mut OCINumber
    );

    // https://docs.oracle.com/en/database/oracle/oracle-database/19/lnoci/oci-date-datetime-and-interval-functions.html
    fn OCIDateTimeConstruct(
        hndl: *mut c_void, err: *mut OCIError, datetime: *mut OCIDateTime,
        year: i16, month: u8, day: u8, hour: u8, min: u8, sec: u8, fsec: u32, timezone: *const u8, timezone_length: size_t
    );
    fn OCIDateTimeGetDate(
        hndl: *mut c_void, err: *mut OCIError, datetime: *const OCIDateTime, year: *mut i16, month: *mut u8, day: *mut u8
    );
    fn OCIDateTimeGetTime(
        hndl: *mut c_void, err: *mut OCIError, datetime: *const OCIDateTime, hour: *mut u8, min: *mut u8, sec: *mut u8, fsec: *mut u32
    );
    fn OCIDateTimeGetTimeZoneOffset(
        hndl: *mut c_void, err: *mut OCIError, datetime: *const OCIDateTime, hour: *mut i8, min: *mut i8
    );
    fn OCIIntervalSetYearMonth(hndl: *mut c_void, err: *mut OCIError, yr: i32, mnth: i32, result: *mut OCIInterval);
    fn OCIIntervalGetYearMonth(hndl: *mut c_void, err: *mut OCIError, yr: *mut i32, mnth: *mut i32, interval: *const OCIInterval);
    fn OCIIntervalSetDaySecond(
        hndl: *mut c_void, err: *mut OCIError, dy: i32, hr: i32, mm: i32, ss: i32, fsec: i32, result: *mut OCIInterval
    );
    fn OCIIntervalGetDaySecond(
        hndl: *mut c_void, err: *mut OCIError, dy: *mut i32, hr: *mut i32, mm: *mut i32, ss: *mut i32, fsec: *mut i32,
        interval: *const OCIInterval
    );
}

// Safe(r) wrappers for calls that are made from more than one place.
// The caller must hold whatever lock serializes use of `err` (the session call lock for
// session-scoped error handles, the level's field lock otherwise).

pub(crate) fn handle_alloc(env: *const OCIEnv, handle: *mut *mut c_void, htype: u32) -> Result<()> {
    let res = unsafe { OCIHandleAlloc(env, handle, htype, 0, std::ptr::null()) };
    if res != OCI_SUCCESS {
        return Err( Error::env(env as *mut OCIEnv, res) );
    }
    Ok(())
}

pub(crate) fn descriptor_alloc(env: *const OCIEnv, desc: *mut *mut c_void, dtype: u32) -> Result<()> {
    let res = unsafe { OCIDescriptorAlloc(env, desc, dtype, 0, std::ptr::null()) };
    if res != OCI_SUCCESS {
        return Err( Error::env(env as *mut OCIEnv, res) );
    }
    Ok(())
}

pub(crate) fn attr_get(obj: *const c_void, obj_type: u32, val: *mut c_void, size: *mut u32, attr: u32, err: *mut OCIError) -> Result<()> {
    catch!{err =>
        OCIAttrGet(obj, obj_type, val, size, attr, err)
    }
    Ok(())
}

pub(crate) fn attr_set(obj: *mut c_void, obj_type: u32, val: *const c_void, size: u32, attr: u32, err: *mut OCIError) -> Result<()> {
    catch!{err =>
        OCIAttrSet(obj, obj_type, val, size, attr, err)
    }
    Ok(())
}

pub(crate) fn param_get(obj: *const c_void, obj_type: u32, err: *mut OCIError, param: *mut *mut c_void, pos: u32) -> Result<()> {
    catch!{err =>
        OCIParamGet(obj, obj_type, err, param, pos)
    }
    Ok(())
}

/// Executes a prepared statement and returns the OCI status. The caller holds the session call lock.
pub(crate) fn stmt_execute(svc: *mut OCISvcCtx, stmt: *mut OCIStmt, err: *mut OCIError, iters: u32, mode: u32) -> i32 {
    unsafe { OCIStmtExecute(svc, stmt, err, iters, 0, std::ptr::null(), std::ptr::null_mut(), mode) }
}

/// Fetches the next `nrows` rows and returns the OCI status, `OCI_NO_DATA` at the end of the
/// cursor. The caller holds the session call lock.
pub(crate) fn stmt_fetch(stmt: *mut OCIStmt, err: *mut OCIError, nrows: u32) -> i32 {
    unsafe { OCIStmtFetch2(stmt, err, nrows, OCI_FETCH_NEXT, 0, OCI_DEFAULT) }
}

/// Sets the strides OCI steps through for each iteration of an array bind.
/// A scalar bound for an array execute has no strides, so every iteration reuses its value.
pub(crate) fn bind_array_of_struct(bind: *mut OCIBind, err: *mut OCIError, value_skip: usize, is_array: bool) -> Result<()> {
    let (ind_skip, len_skip, rc_skip) = if is_array {
        (std::mem::size_of::<i16>(), std::mem::size_of::<u32>(), std::mem::size_of::<u16>())
    } else {
        (0, 0, 0)
    };
    catch!{err =>
        OCIBindArrayOfStruct(bind, err, value_skip as u32, ind_skip as u32, len_skip as u32, rc_skip as u32)
    }
    Ok(())
}

pub(crate) fn number_from_int<T: Copy>(val: T, signed: bool, num: &mut OCINumber, err: *mut OCIError) -> Result<()> {
    let flag = if signed { OCI_NUMBER_SIGNED } else { OCI_NUMBER_UNSIGNED };
    catch!{err =>
        OCINumberFromInt(err, &val as *const T as _, std::mem::size_of::<T>() as u32, flag, num)
    }
    Ok(())
}

pub(crate) fn number_to_int<T: Copy + Default>(num: &OCINumber, signed: bool, err: *mut OCIError) -> Result<T> {
    let flag = if signed { OCI_NUMBER_SIGNED } else { OCI_NUMBER_UNSIGNED };
    let mut val = T::default();
    catch!{err =>
        OCINumberToInt(err, num, std::mem::size_of::<T>() as u32, flag, &mut val as *mut T as _)
    }
    Ok(val)
}

pub(crate) fn number_from_real<T: Copy>(val: T, num: &mut OCINumber, err: *mut OCIError) -> Result<()> {
    catch!{err =>
        OCINumberFromReal(err, &val as *const T as _, std::mem::size_of::<T>() as u32, num)
    }
    Ok(())
}

pub(crate) fn number_to_real<T: Copy + Default>(num: &OCINumber, err: *mut OCIError) -> Result<T> {
    let mut val = T::default();
    catch!{err =>
        OCINumberToReal(err, num, std::mem::size_of::<T>() as u32, &mut val as *mut T as _)
    }
    Ok(val)
}

const NUM_TEXT_FMT : &str = "TM9";
const NUM_NLS_PARAMS : &str = "NLS_NUMERIC_CHARACTERS='.,'";

pub(crate) fn number_to_text(num: &OCINumber, err: *mut OCIError) -> Result<String> {
    let mut buf = [0u8; 64];
    let mut len = buf.len() as u32;
    catch!{err =>
        OCINumberToText(
            err, num, NUM_TEXT_FMT.as_ptr(), NUM_TEXT_FMT.len() as u32,
            NUM_NLS_PARAMS.as_ptr(), NUM_NLS_PARAMS.len() as u32, &mut len, buf.as_mut_ptr()
        )
    }
    Ok( String::from_utf8_lossy(&buf[..len as usize]).trim().to_string() )
}

pub(crate) fn number_from_text(txt: &str, num: &mut OCINumber, err: *mut OCIError) -> Result<()> {
    let fmt = numeric_format(txt);
    catch!{err =>
        OCINumberFromText(
            err, txt.as_ptr(), txt.len() as u32, fmt.as_ptr(), fmt.len() as u32,
            NUM_NLS_PARAMS.as_ptr(), NUM_NLS_PARAMS.len() as u32, num
        )
    }
    Ok(())
}

/// Builds a `9...D9...` mask wide enough for a plain decimal literal.
fn numeric_format(txt: &str) -> String {
    let txt = txt.trim_start_matches(|c| c == '-' || c == '+');
    match txt.find('.') {
        Some(dot) => {
            let int_len = dot.max(1);
            let frac_len = (txt.len() - dot - 1).max(1);
            format!("{}D{}", "9".repeat(int_len), "9".repeat(frac_len))
        }
        None => "9".repeat(txt.len().max(1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calls_fail_cleanly_before_load() {
        if is_loaded() {
            return;
        }
        let res = unsafe { OCIHandleFree(std::ptr::null_mut(), OCI_HTYPE_ERROR) };
        assert_eq!(res, OCI_INVALID_HANDLE);
    }

    #[test]
    fn number_formats() {
        assert_eq!(numeric_format("12345"), "99999");
        assert_eq!(numeric_format("-12.5"), "99D9");
        assert_eq!(numeric_format(".25"), "9D99");
        assert_eq!(numeric_format(""), "9");
    }
}
