use crate::oci::{self, OCIEnv, OCIError};
use libc::c_void;
use std::{ptr, cmp, fmt, error, io, ffi::CStr};

const OCI_ERROR_MAXMSG_SIZE : usize = 3072;

fn get_oracle_error(rc: i32, errhp: *mut c_void, htype: u32) -> (i32, String) {
    let mut errcode = rc;
    let mut errmsg : Vec<u8> = vec![0; OCI_ERROR_MAXMSG_SIZE];
    let errmsg_ptr = errmsg.as_mut_ptr();
    let res = unsafe {
        oci::OCIErrorGet(errhp, 1, ptr::null_mut(), &mut errcode, errmsg_ptr, OCI_ERROR_MAXMSG_SIZE as u32, htype)
    };
    let msg = if res == oci::OCI_SUCCESS {
        let msg = unsafe { CStr::from_ptr(errmsg_ptr as *const libc::c_char) };
        msg.to_string_lossy().trim_end().to_string()
    } else {
        match errcode {
            oci::OCI_NO_DATA        => String::from("No Data"),
            oci::OCI_NEED_DATA      => String::from("Need Data"),
            oci::OCI_INVALID_HANDLE => String::from("Invalid Handle"),
            _ => format!("Error {}", errcode),
        }
    };
    (errcode, msg)
}

/// Returns early with the Oracle error recorded in `$err` when the OCI call fails.
macro_rules! catch {
    ( $err:expr => $( $stmt:stmt );+ ) => {{
        let res = unsafe { $($stmt)+ };
        match res {
            crate::oci::OCI_ERROR | crate::oci::OCI_INVALID_HANDLE => { return Err( crate::Error::oci($err, res) ); },
            _ => {}
        }
    }};
}

/// Oracle error codes after which a session cannot be reused.
const BAD_SESSION_CODES : [i32; 20] = [
    28,     // your session has been killed
    1012,   // not logged on
    1033,   // ORACLE initialization or shutdown in progress
    1034,   // ORACLE not available
    1089,   // immediate shutdown in progress
    2396,   // exceeded maximum idle time
    3113,   // end-of-file on communication channel
    3114,   // not connected to ORACLE
    3135,   // connection lost contact
    12153,  // TNS:not connected
    12514,  // TNS:listener does not currently know of service
    12537,  // TNS:connection closed
    12547,  // TNS:lost contact
    12570,  // TNS:packet reader failure
    12571,  // TNS:packet writer failure
    12583,  // TNS:no reader
    27146,  // post/wait initialization failed
    28511,  // lost RPC connection to heterogeneous remote agent
    1013,   // user requested cancel of current operation
    -2,     // invalid handle
];

/// Represents possible errors returned from the driver
#[derive(Debug, Clone)]
pub enum Error {
    /// Misuse of the driver API: invalid DSN, invalid config value, value conversion failure
    Interface(String),
    /// Error reported by the server or the OCI client library
    Oracle(i32,String),
    /// The named object has been closed
    Closed(&'static str),
    /// Unexpected response from OCI
    Protocol(String),
    /// The call was interrupted by a cancellation or a deadline
    Cancelled,
    /// Several errors collected while closing a handle and its children
    Multi(Vec<Error>),
    /// The host value has no binding
    UnsupportedBind(String),
    /// A list argument that cannot be bound, like a list of mixed value types
    InvalidBind(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Oracle(errcode, errmsg) if *errcode > 0 => write!(f, "ORA-{:05}: {}", errcode, errmsg),
            Error::Oracle(errcode, errmsg) => write!(f, "OCI error {}: {}", errcode, errmsg),
            Error::Interface(errmsg) => write!(f, "{}", errmsg),
            Error::Closed(what) => write!(f, "{} is closed", what),
            Error::Protocol(errmsg) => write!(f, "protocol error: {}", errmsg),
            Error::Cancelled => write!(f, "ORA-01013: user requested cancel of current operation"),
            Error::UnsupportedBind(what) => write!(f, "unsupported bind: {}", what),
            Error::InvalidBind(what) => write!(f, "invalid bind: {}", what),
            Error::Multi(errs) => {
                for (i, err) in errs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl error::Error for Error {}

impl cmp::PartialEq for Error {
    fn eq(&self, other: &Error) -> bool {
        match (self, other) {
            (Error::Oracle(this_code, _), Error::Oracle(other_code, _)) => this_code == other_code,
            (Error::Interface(this_msg),  Error::Interface(other_msg))  => this_msg  == other_msg,
            (Error::Closed(this),         Error::Closed(other))         => this == other,
            (Error::Protocol(this_msg),   Error::Protocol(other_msg))   => this_msg  == other_msg,
            (Error::Cancelled,            Error::Cancelled)             => true,
            (Error::UnsupportedBind(this),Error::UnsupportedBind(other))=> this == other,
            (Error::InvalidBind(this),    Error::InvalidBind(other))    => this == other,
            (Error::Multi(this),          Error::Multi(other))          => this == other,
            _ => false,
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        io::Error::new(io::ErrorKind::Other, err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.get_ref().and_then(|inner| inner.downcast_ref::<Error>()) {
            Some(err) => err.clone(),
            None => Error::Interface(err.to_string()),
        }
    }
}

impl From<libloading::Error> for Error {
    fn from(err: libloading::Error) -> Self {
        Error::Interface(format!("cannot load the OCI library: {}", err))
    }
}

impl Error {
    pub(crate) fn new(msg: &str) -> Self {
        Error::Interface( msg.to_owned() )
    }

    pub fn msg(msg: String) -> Self {
        Error::Interface(msg)
    }

    pub(crate) fn env(env: *mut OCIEnv, rc: i32) -> Self {
        let (code, msg) = get_oracle_error(rc, env as *mut c_void, oci::OCI_HTYPE_ENV);
        Error::Oracle(code, msg)
    }

    pub(crate) fn oci(err: *mut OCIError, rc: i32) -> Self {
        let (code, msg) = get_oracle_error(rc, err as *mut c_void, oci::OCI_HTYPE_ERROR);
        Error::Oracle(code, msg)
    }

    /// Returns the Oracle error code, 0 for errors that did not originate in the database.
    pub fn code(&self) -> i32 {
        match self {
            Error::Oracle(code, _) => *code,
            Error::Cancelled => 1013,
            _ => 0,
        }
    }

    /// Returns `true` when the error indicates that the session is no longer usable and should not be
    /// returned to a pool.
    pub fn is_session_bad(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::Oracle(code, _) => BAD_SESSION_CODES.contains(code),
            Error::Multi(errs) => errs.iter().any(Error::is_session_bad),
            _ => false,
        }
    }

    /// Folds errors collected during a close cascade into a single result.
    pub fn collect(mut errs: Vec<Error>) -> crate::Result<()> {
        match errs.len() {
            0 => Ok(()),
            1 => Err( errs.remove(0) ),
            _ => Err( Error::Multi(errs) ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oracle_errors_render_with_code() {
        let err = Error::Oracle(1017, "invalid username/password; logon denied".to_string());
        assert_eq!(err.to_string(), "ORA-01017: invalid username/password; logon denied");
        assert_eq!(err.code(), 1017);
        assert_eq!(Error::new("bad").code(), 0);
        assert_eq!(Error::Cancelled.code(), 1013);
    }

    #[test]
    fn negative_codes_render_without_ora_prefix() {
        let err = Error::Oracle(-2, "invalid handle".to_string());
        assert_eq!(err.to_string(), "OCI error -2: invalid handle");
        assert!(err.is_session_bad());
    }

    #[test]
    fn errors_compare_by_code() {
        assert_eq!(Error::Oracle(3113, "a".to_string()), Error::Oracle(3113, "b".to_string()));
        assert_ne!(Error::Oracle(3113, "a".to_string()), Error::Oracle(3114, "a".to_string()));
        assert_ne!(Error::Closed("Ses"), Error::Closed("Stmt"));
    }

    #[test]
    fn bad_session_codes() {
        assert!(Error::Oracle(3113, String::new()).is_session_bad());
        assert!(Error::Oracle(3114, String::new()).is_session_bad());
        assert!(Error::Cancelled.is_session_bad());
        assert!(!Error::Oracle(1, String::new()).is_session_bad());
        assert!(!Error::new("closed").is_session_bad());
        let multi = Error::Multi(vec![Error::new("x"), Error::Oracle(28, String::new())]);
        assert!(multi.is_session_bad());
    }

    #[test]
    fn collect_folds_errors() {
        assert!(Error::collect(Vec::new()).is_ok());
        assert_eq!(Error::collect(vec![Error::Closed("Stmt")]), Err(Error::Closed("Stmt")));
        let res = Error::collect(vec![Error::Closed("Stmt"), Error::Closed("Rset")]);
        match res {
            Err(err @ Error::Multi(_)) => assert_eq!(err.to_string(), "Stmt is closed, Rset is closed"),
            _ => panic!("expected an aggregate error"),
        }
    }

    #[test]
    fn io_errors_keep_driver_errors() {
        let io_err : io::Error = Error::Oracle(22922, "nonexistent LOB value".to_string()).into();
        assert_eq!(Error::from(io_err).code(), 22922);
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        assert_eq!(Error::from(io_err), Error::new("short read"));
    }
}
