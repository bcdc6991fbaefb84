//! OCI descriptors

use crate::{Result, Error};
use super::*;
use libc::c_void;

pub(crate) trait DescriptorType : OCIStruct {
    type OCIType : OCIStruct;
    fn get_type() -> u32;
}

macro_rules! impl_descr_type {
    ($($oci_desc:ident => $id:ident, $ret:ident),+) => {
        $(
            impl DescriptorType for $oci_desc {
                type OCIType = $ret;
                fn get_type() -> u32 { $id }
            }
        )+
    };
}

impl_descr_type!{
    OCILobLocator           => OCI_DTYPE_LOB,           OCILobLocator,
    OCIBFileLocator         => OCI_DTYPE_FILE,          OCILobLocator,
    OCIParam                => OCI_DTYPE_PARAM,         OCIParam,
    OCITimestampTZ          => OCI_DTYPE_TIMESTAMP_TZ,  OCIDateTime,
    OCIIntervalYearToMonth  => OCI_DTYPE_INTERVAL_YM,   OCIInterval,
    OCIIntervalDayToSecond  => OCI_DTYPE_INTERVAL_DS,   OCIInterval
}

/// Owned OCI descriptor. Freed when dropped.
///
/// A `Vec<Descriptor<T>>` is laid out as an array of descriptor pointers, which is what
/// array binds and defines of descriptor-based types expect.
#[repr(transparent)]
pub(crate) struct Descriptor<T: DescriptorType> {
    ptr: Ptr<T>,
}

impl<T: DescriptorType> Drop for Descriptor<T> {
    fn drop(&mut self) {
        let ptr = self.ptr.get();
        if !ptr.is_null() {
            unsafe {
                OCIDescriptorFree(ptr as *mut c_void, T::get_type());
            }
        }
    }
}

impl<T: DescriptorType> Descriptor<T> {
    fn alloc(env: *const OCIEnv) -> Result<*mut T> {
        let mut desc = std::ptr::null_mut::<T>();
        descriptor_alloc(env, &mut desc as *mut *mut T as *mut *mut c_void, T::get_type())?;
        if desc.is_null() {
            Err( Error::new("OCIDescriptorAlloc returned NULL") )
        } else {
            Ok( desc )
        }
    }

    pub(crate) fn new(env: *const OCIEnv) -> Result<Self> {
        let desc = Self::alloc(env)?;
        Ok( Self { ptr: Ptr::new(desc) } )
    }

    pub(crate) fn null() -> Self {
        Self { ptr: Ptr::null() }
    }

    pub(crate) fn from(ptr: *mut T) -> Self {
        Self { ptr: Ptr::new(ptr) }
    }

    /// Moves the descriptor out leaving a null one in its place.
    pub(crate) fn take(other: &mut Self) -> Self {
        let mut ptr = Ptr::null();
        ptr.swap(&mut other.ptr);
        Self { ptr }
    }

    pub(crate) fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    pub(crate) fn get(&self) -> *mut T::OCIType {
        self.ptr.get() as *mut T::OCIType
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut *mut T::OCIType {
        self.ptr.as_mut_ptr() as *mut *mut T::OCIType
    }

    pub(crate) fn get_attr<V: attr::AttrGet>(&self, attr_type: u32, err: *mut OCIError) -> Result<V> {
        attr::get::<V>(attr_type, T::get_type(), self.get() as *const c_void, err)
    }
}
