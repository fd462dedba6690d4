//! COM base types shared by every Windows Runtime interface
//!
//! ## Key Types
//! - [`HRESULT`] - native result code
//! - [`IUnknownVTable`] - slots 0-2, the base of every vtable
//! - [`IInspectableVTable`] - slots 3-5, the base of every runtime interface
//! - [`RefCount`] - reference counter embedded in runtime-owned callback blocks
//! - [`VTableLayout`] / [`ComInterface`] - implemented by `#[winrt_interface]`
//!
//! Function pointers use `extern "system"`: `stdcall` on 32-bit Windows and the
//! C convention everywhere else.

use std::cell::Cell;
use std::ffi::c_void;

use crate::guid::GUID;
use crate::hstring::HStringHandle;

// =============================================================================
// HRESULT - COM error codes
// =============================================================================

/// Native result type. 0 (S_OK) indicates success, negative values indicate errors.
pub type HRESULT = i32;

/// Success
pub const S_OK: HRESULT = 0;
/// Success, but returned false
pub const S_FALSE: HRESULT = 1;
/// Not implemented
pub const E_NOTIMPL: HRESULT = 0x8000_4001_u32 as i32;
/// No such interface supported
pub const E_NOINTERFACE: HRESULT = 0x8000_4002_u32 as i32;
/// Invalid pointer
pub const E_POINTER: HRESULT = 0x8000_4003_u32 as i32;
/// Unspecified failure
pub const E_FAIL: HRESULT = 0x8000_4005_u32 as i32;
/// Out of memory
pub const E_OUTOFMEMORY: HRESULT = 0x8007_000E_u32 as i32;
/// Invalid argument
pub const E_INVALIDARG: HRESULT = 0x8007_0057_u32 as i32;
/// Index out of range
pub const E_BOUNDS: HRESULT = 0x8000_000B_u32 as i32;
/// Class is not registered with the activation runtime
pub const REGDB_E_CLASSNOTREG: HRESULT = 0x8004_0154_u32 as i32;

/// Check if an HRESULT indicates success (non-negative)
#[inline]
#[must_use]
pub const fn succeeded(hr: HRESULT) -> bool {
    hr >= 0
}

/// Check if an HRESULT indicates failure (negative)
#[inline]
#[must_use]
pub const fn failed(hr: HRESULT) -> bool {
    hr < 0
}

// =============================================================================
// Well-known interface ids
// =============================================================================

/// IUnknown interface ID
pub const IID_IUNKNOWN: GUID = GUID::new(
    0x00000000,
    0x0000,
    0x0000,
    [0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46],
);

/// IInspectable interface ID
pub const IID_IINSPECTABLE: GUID = GUID::new(
    0xAF86E2E0,
    0xB12D,
    0x4C6A,
    [0x9C, 0x5A, 0xD7, 0xAA, 0x65, 0x10, 0x1E, 0x90],
);

/// IAgileObject interface ID. Callback blocks do not answer it.
pub const IID_IAGILEOBJECT: GUID = GUID::new(
    0x94EA2B94,
    0xE9CC,
    0x49E0,
    [0xC0, 0xFF, 0xEE, 0x64, 0xCA, 0x8F, 0x5B, 0x90],
);

// =============================================================================
// Base vtables
// =============================================================================

pub type QueryInterfaceFn =
    unsafe extern "system" fn(this: *mut c_void, riid: *const GUID, ppv: *mut *mut c_void) -> HRESULT;
pub type AddRefFn = unsafe extern "system" fn(this: *mut c_void) -> u32;
pub type ReleaseFn = unsafe extern "system" fn(this: *mut c_void) -> u32;
pub type GetIidsFn =
    unsafe extern "system" fn(this: *mut c_void, count: *mut u32, iids: *mut *mut GUID) -> HRESULT;
pub type GetRuntimeClassNameFn =
    unsafe extern "system" fn(this: *mut c_void, name: *mut HStringHandle) -> HRESULT;
pub type GetTrustLevelFn =
    unsafe extern "system" fn(this: *mut c_void, level: *mut i32) -> HRESULT;

/// IUnknown - slots 0, 1, 2 of every vtable.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct IUnknownVTable {
    pub query_interface: QueryInterfaceFn,
    pub add_ref: AddRefFn,
    pub release: ReleaseFn,
}

/// IInspectable - IUnknown followed by slots 3, 4, 5.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct IInspectableVTable {
    pub base: IUnknownVTable,
    pub get_iids: GetIidsFn,
    pub get_runtime_class_name: GetRuntimeClassNameFn,
    pub get_trust_level: GetTrustLevelFn,
}

/// Result of `GetTrustLevel`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustLevel {
    BaseTrust = 0,
    PartialTrust = 1,
    FullTrust = 2,
}

impl TrustLevel {
    /// Map the raw native value; unknown values are reported as `None`.
    #[must_use]
    pub const fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::BaseTrust),
            1 => Some(Self::PartialTrust),
            2 => Some(Self::FullTrust),
            _ => None,
        }
    }
}

// =============================================================================
// Interface wrappers
// =============================================================================

/// An object pointer seen through its IUnknown vtable.
#[repr(C)]
pub struct IUnknown {
    pub vtable: *const IUnknownVTable,
}

impl IUnknown {
    /// # Safety
    /// `ptr` must be a live object pointer whose first word is a vtable.
    pub unsafe fn from_raw<'a>(ptr: *mut c_void) -> &'a Self {
        unsafe { &*(ptr as *const Self) }
    }

    #[inline]
    pub fn as_raw(&self) -> *mut c_void {
        self as *const Self as *mut c_void
    }

    /// # Safety
    /// `riid` and `ppv` must be valid for the duration of the call.
    #[inline]
    pub unsafe fn query_interface(&self, riid: *const GUID, ppv: *mut *mut c_void) -> HRESULT {
        unsafe { ((*self.vtable).query_interface)(self.as_raw(), riid, ppv) }
    }

    /// # Safety
    /// The object must be alive.
    #[inline]
    pub unsafe fn add_ref(&self) -> u32 {
        unsafe { ((*self.vtable).add_ref)(self.as_raw()) }
    }

    /// # Safety
    /// The caller gives up one reference; the object may be freed.
    #[inline]
    pub unsafe fn release(&self) -> u32 {
        unsafe { ((*self.vtable).release)(self.as_raw()) }
    }
}

/// An object pointer seen through its IInspectable vtable.
#[repr(C)]
pub struct IInspectable {
    pub vtable: *const IInspectableVTable,
}

impl IInspectable {
    /// # Safety
    /// `ptr` must be a live object pointer whose vtable starts with IInspectable.
    pub unsafe fn from_raw<'a>(ptr: *mut c_void) -> &'a Self {
        unsafe { &*(ptr as *const Self) }
    }

    #[inline]
    pub fn as_raw(&self) -> *mut c_void {
        self as *const Self as *mut c_void
    }

    /// # Safety
    /// `name` must be writable.
    #[inline]
    pub unsafe fn get_runtime_class_name(&self, name: *mut HStringHandle) -> HRESULT {
        unsafe { ((*self.vtable).get_runtime_class_name)(self.as_raw(), name) }
    }

    /// # Safety
    /// `level` must be writable.
    #[inline]
    pub unsafe fn get_trust_level(&self, level: *mut i32) -> HRESULT {
        unsafe { ((*self.vtable).get_trust_level)(self.as_raw(), level) }
    }
}

// =============================================================================
// Layout traits
// =============================================================================

/// Compile-time vtable description of an interface.
pub trait VTableLayout {
    /// The `#[repr(C)]` vtable struct.
    type VTable;
    /// Total number of slots, base slots included.
    const SLOT_COUNT: usize;
}

impl VTableLayout for IUnknown {
    type VTable = IUnknownVTable;
    const SLOT_COUNT: usize = 3;
}

impl VTableLayout for IInspectable {
    type VTable = IInspectableVTable;
    const SLOT_COUNT: usize = 6;
}

/// Trait for types that have a COM interface ID (IID).
///
/// Automatically implemented by `#[winrt_interface]`.
pub trait ComInterface {
    /// The interface ID (IID) for this interface.
    const IID: GUID;
}

impl ComInterface for IUnknown {
    const IID: GUID = IID_IUNKNOWN;
}

impl ComInterface for IInspectable {
    const IID: GUID = IID_IINSPECTABLE;
}

// =============================================================================
// RefCount - counter for runtime-owned callback blocks
// =============================================================================

/// Reference counter for callback blocks handed to native code.
///
/// Not synchronized: blocks live in a single apartment and the owning type is
/// `!Send`/`!Sync`.
#[repr(transparent)]
#[derive(Debug)]
pub struct RefCount(Cell<u32>);

impl RefCount {
    /// Create a new reference counter with count = 1
    #[must_use]
    pub const fn new() -> Self {
        Self(Cell::new(1))
    }

    /// Increment the reference count. Returns the new count.
    #[inline]
    pub fn add_ref(&self) -> u32 {
        let next = self.0.get().wrapping_add(1);
        self.0.set(next);
        next
    }

    /// Decrement the reference count. Returns the new count.
    ///
    /// Reaching zero does not free anything; the owner controls the block's lifetime.
    #[inline]
    pub fn release(&self) -> u32 {
        let next = self.0.get().saturating_sub(1);
        self.0.set(next);
        next
    }

    /// Get the current reference count.
    #[inline]
    #[must_use]
    pub fn count(&self) -> u32 {
        self.0.get()
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hresult_classification() {
        assert!(succeeded(S_OK));
        assert!(succeeded(S_FALSE));
        assert!(failed(E_NOINTERFACE));
        assert_eq!(E_NOINTERFACE, -2147467262);
        assert_eq!(E_INVALIDARG as u32, 0x80070057);
    }

    #[test]
    fn test_ref_count() {
        let count = RefCount::new();
        assert_eq!(count.count(), 1);
        assert_eq!(count.add_ref(), 2);
        assert_eq!(count.release(), 1);
        assert_eq!(count.release(), 0);
        assert_eq!(count.release(), 0);
    }

    #[test]
    fn test_trust_level_from_raw() {
        assert_eq!(TrustLevel::from_raw(2), Some(TrustLevel::FullTrust));
        assert_eq!(TrustLevel::from_raw(7), None);
    }
}
