//! OCI handles.

use crate::{Result, Error};
use super::*;

pub(crate) trait HandleType : OCIStruct {
    fn get_type() -> u32;
}

macro_rules! impl_handle_type {
    ($($oci_handle:ident => $id:ident),+) => {
        $(
            impl HandleType for $oci_handle {
                fn get_type() -> u32 { $id }
            }
        )+
    };
}

impl_handle_type!{
    OCIEnv      => OCI_HTYPE_ENV,
    OCIError    => OCI_HTYPE_ERROR,
    OCISvcCtx   => OCI_HTYPE_SVCCTX,
    OCIStmt     => OCI_HTYPE_STMT,
    OCIBind     => OCI_HTYPE_BIND,
    OCIDefine   => OCI_HTYPE_DEFINE,
    OCIServer   => OCI_HTYPE_SERVER,
    OCISession  => OCI_HTYPE_SESSION,
    OCIAuthInfo => OCI_HTYPE_AUTHINFO,
    OCISPool    => OCI_HTYPE_SPOOL,
    OCICPool    => OCI_HTYPE_CPOOL
}

/// Owned OCI handle. Freed when dropped.
#[repr(transparent)]
pub(crate) struct Handle<T: HandleType> (Ptr<T>);

impl<T: HandleType> Drop for Handle<T> {
    fn drop(&mut self) {
        if !self.0.is_null() {
            unsafe {
                OCIHandleFree(self.0.get() as _, T::get_type());
            }
        }
    }
}

impl<T: HandleType> Handle<T> {
    fn alloc(env: *const OCIEnv) -> Result<Ptr<T>> {
        let mut handle_ptr = Ptr::<T>::null();
        handle_alloc(env, handle_ptr.as_mut_ptr() as _, T::get_type())?;
        if handle_ptr.is_null() {
            Err( Error::msg(format!("OCI returned NULL for handle {}", T::get_type())) )
        } else {
            Ok( handle_ptr )
        }
    }

    pub(crate) fn new(env: *const OCIEnv) -> Result<Self> {
        let handle_ptr = Self::alloc(env)?;
        Ok( Self(handle_ptr) )
    }

    // Some handles (like OCIEnv) are allocated by their respective OCI*Create* APIs.
    // But we need to dispose of them (as handles) when it is time to drop them.
    pub(crate) fn from(handle_ptr: Ptr<T>) -> Self {
        Self(handle_ptr)
    }

    pub(crate) fn take(other: &mut Self) -> Self {
        let mut handle_ptr = Ptr::<T>::null();
        handle_ptr.swap(&mut other.0);
        Self(handle_ptr)
    }

    pub(crate) fn is_null(&self) -> bool {
        self.0.is_null()
    }

    pub(crate) fn get(&self) -> *mut T {
        self.0.get()
    }

    pub(crate) fn as_ptr(&self) -> *const *mut T {
        self.0.as_ptr()
    }

    pub(crate) fn get_attr<V: attr::AttrGet>(&self, attr_type: u32, err: *mut OCIError) -> Result<V> {
        attr::get::<V>(attr_type, T::get_type(), self.get() as _, err)
    }

    pub(crate) fn set_attr<V: attr::AttrSet>(&self, attr_type: u32, attr_val: V, err: *mut OCIError) -> Result<()> {
        attr::set::<V>(attr_type, attr_val, T::get_type(), self.get() as _, err)
    }
}
