//! OCI Parameter descriptor functions

use crate::Result;
use super::*;
use libc::c_void;

/// Returns the descriptor of the select-list column at `pos` (1-based) of a described statement.
/// The caller holds the session call lock that guards `err`.
pub(crate) fn get(pos: u32, stmt: *mut OCIStmt, err: *mut OCIError) -> Result<Descriptor<OCIParam>> {
    let mut descr = std::ptr::null_mut::<OCIParam>();
    param_get(stmt as *const c_void, OCI_HTYPE_STMT, err, &mut descr as *mut *mut OCIParam as *mut *mut c_void, pos)?;
    Ok( Descriptor::from(descr) )
}
