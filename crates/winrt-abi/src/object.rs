//! Owning handle to a native object
//!
//! A [`ComObject`] is either unbound (no pointer yet) or bound to a non-null
//! pointer whose first word is the object's vtable. A bound handle owns one
//! reference: cloning calls `AddRef`, dropping calls `Release`.

use std::ffi::c_void;
use std::fmt;
use std::ptr::{self, NonNull};

use log::trace;

use crate::com::{E_NOINTERFACE, IInspectable, IUnknown, S_OK, TrustLevel};
use crate::error::{AbiError, Result};
use crate::guid::GUID;
use crate::hstring::{HStringHandle, StringPlatform};

/// Whether a handle currently refers to a native object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    Unbound,
    Bound,
}

pub struct ComObject {
    ptr: Option<NonNull<c_void>>,
}

impl ComObject {
    /// A handle with no native object behind it.
    #[must_use]
    pub const fn unbound() -> Self {
        Self { ptr: None }
    }

    /// Take ownership of one reference held by `ptr`. Null yields an unbound handle.
    ///
    /// # Safety
    /// `ptr` must be null or a live object pointer carrying a reference the
    /// caller is giving up.
    pub unsafe fn from_raw(ptr: *mut c_void) -> Self {
        Self {
            ptr: NonNull::new(ptr),
        }
    }

    /// Wrap a borrowed pointer, taking a new reference with `AddRef`.
    ///
    /// # Safety
    /// `ptr` must be null or a live object pointer.
    pub unsafe fn from_borrowed(ptr: *mut c_void) -> Self {
        let object = Self {
            ptr: NonNull::new(ptr),
        };
        if let Some(p) = object.ptr {
            unsafe { IUnknown::from_raw(p.as_ptr()).add_ref() };
        }
        object
    }

    #[must_use]
    pub fn state(&self) -> ObjectState {
        match self.ptr {
            Some(_) => ObjectState::Bound,
            None => ObjectState::Unbound,
        }
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.ptr.is_some()
    }

    /// The bound pointer, or [`AbiError::Unbound`].
    pub fn ptr(&self) -> Result<NonNull<c_void>> {
        self.ptr.ok_or(AbiError::Unbound)
    }

    /// The raw pointer without transferring ownership; null when unbound.
    #[must_use]
    pub fn as_raw(&self) -> *mut c_void {
        self.ptr.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    /// Give up ownership of the reference and return the raw pointer.
    #[must_use]
    pub fn into_raw(self) -> *mut c_void {
        let raw = self.as_raw();
        std::mem::forget(self);
        raw
    }

    /// Call `AddRef` and return the new count. The extra reference belongs to the caller.
    pub fn add_ref(&self) -> Result<u32> {
        let p = self.ptr()?;
        Ok(unsafe { IUnknown::from_raw(p.as_ptr()).add_ref() })
    }

    /// Ask the object for `iid`.
    ///
    /// `E_NOINTERFACE` maps to [`AbiError::NoSuchInterface`]; any other
    /// failure code maps to [`AbiError::NativeCallFailure`].
    pub fn query_interface(&self, iid: &GUID) -> Result<ComObject> {
        let p = self.ptr()?;
        let mut out = ptr::null_mut();
        let hr = unsafe { IUnknown::from_raw(p.as_ptr()).query_interface(iid, &mut out) };
        trace!("QueryInterface({iid}) on {:p} -> {hr:#010x}", p.as_ptr());
        match hr {
            S_OK if out.is_null() => Err(AbiError::NullPointer("QueryInterface result")),
            S_OK => Ok(unsafe { ComObject::from_raw(out) }),
            E_NOINTERFACE => Err(AbiError::NoSuchInterface { iid: *iid }),
            code => Err(AbiError::NativeCallFailure { code }),
        }
    }

    /// Capability probe: `Ok(None)` when the object does not implement `iid`.
    pub fn try_cast(&self, iid: &GUID) -> Result<Option<ComObject>> {
        match self.query_interface(iid) {
            Ok(object) => Ok(Some(object)),
            Err(AbiError::NoSuchInterface { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// `IInspectable::GetRuntimeClassName` (slot 4).
    pub fn runtime_class_name(&self, strings: &dyn StringPlatform) -> Result<String> {
        let p = self.ptr()?;
        let mut handle = HStringHandle::NULL;
        let hr = unsafe { IInspectable::from_raw(p.as_ptr()).get_runtime_class_name(&mut handle) };
        if hr != S_OK {
            return Err(AbiError::NativeCallFailure { code: hr });
        }
        let name = unsafe { strings.read(handle) };
        unsafe { strings.delete(handle) };
        name
    }

    /// `IInspectable::GetTrustLevel` (slot 5).
    pub fn trust_level(&self) -> Result<TrustLevel> {
        let p = self.ptr()?;
        let mut raw = 0i32;
        let hr = unsafe { IInspectable::from_raw(p.as_ptr()).get_trust_level(&mut raw) };
        if hr != S_OK {
            return Err(AbiError::NativeCallFailure { code: hr });
        }
        TrustLevel::from_raw(raw).ok_or_else(|| AbiError::TypeMismatch {
            expected: "TrustLevel".into(),
            found: raw.to_string(),
        })
    }
}

impl Default for ComObject {
    fn default() -> Self {
        Self::unbound()
    }
}

impl Clone for ComObject {
    fn clone(&self) -> Self {
        if let Some(p) = self.ptr {
            unsafe { IUnknown::from_raw(p.as_ptr()).add_ref() };
        }
        Self { ptr: self.ptr }
    }
}

impl Drop for ComObject {
    fn drop(&mut self) {
        if let Some(p) = self.ptr.take() {
            unsafe { IUnknown::from_raw(p.as_ptr()).release() };
        }
    }
}

impl PartialEq for ComObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl Eq for ComObject {}

impl fmt::Debug for ComObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ptr {
            Some(p) => write!(f, "ComObject({:p})", p.as_ptr()),
            None => f.write_str("ComObject(unbound)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbound_operations_fail() {
        let object = ComObject::unbound();
        assert_eq!(object.state(), ObjectState::Unbound);
        assert!(object.as_raw().is_null());
        assert!(matches!(object.add_ref(), Err(AbiError::Unbound)));
        assert!(matches!(
            object.query_interface(&GUID::ZERO),
            Err(AbiError::Unbound)
        ));
        assert!(matches!(object.trust_level(), Err(AbiError::Unbound)));
    }

    #[test]
    fn test_from_null_raw_is_unbound() {
        let object = unsafe { ComObject::from_raw(ptr::null_mut()) };
        assert!(!object.is_bound());
        assert!(object.into_raw().is_null());
    }
}
