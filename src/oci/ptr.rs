//! Send-able pointers to OCI handles and descriptors

use std::ptr;

use super::OCIStruct;

/// Send-able cell-like wrapper around a pointer to OCI handle or descriptor.
///
/// It has the layout of the raw pointer, so a slice of `Ptr`s can be passed to OCI
/// as an array of handles or descriptors.
#[repr(transparent)]
pub(crate) struct Ptr<T: OCIStruct> {
    value: *mut T
}

impl<T: OCIStruct> Ptr<T> {
    pub(crate) fn new(ptr: *mut T) -> Self {
        Self{ value: ptr }
    }

    pub(crate) fn null() -> Self {
        Self{ value: ptr::null_mut() }
    }

    pub(crate) fn swap(&mut self, other: &mut Self) {
        if !ptr::eq(self, other) && !ptr::eq(self.value, other.value) {
            std::mem::swap(&mut self.value, &mut other.value);
        }
    }

    pub(crate) fn is_null(&self) -> bool {
        self.value.is_null()
    }

    pub(crate) fn get(&self) -> *mut T {
        self.value
    }

    pub(crate) fn as_ptr(&self) -> *const *mut T {
        &self.value as *const *mut T
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut *mut T {
        &mut self.value as *mut *mut T
    }
}

impl<T: OCIStruct> Clone for Ptr<T> {
    fn clone(&self) -> Self {
        Self { value: self.value }
    }
}

impl<T: OCIStruct> Copy for Ptr<T> {}

unsafe impl<T: OCIStruct> Send for Ptr<T> {}
unsafe impl<T: OCIStruct> Sync for Ptr<T> {}
