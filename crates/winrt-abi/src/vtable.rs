//! Vtable slot addressing
//!
//! Every runtime interface has the same fixed prefix:
//!
//! | Slot | Method |
//! |------|--------|
//! | 0 | `QueryInterface` |
//! | 1 | `AddRef` |
//! | 2 | `Release` |
//! | 3 | `GetIids` |
//! | 4 | `GetRuntimeClassName` |
//! | 5 | `GetTrustLevel` |
//! | 6+ | declared methods, in declaration order |
//!
//! Delegates only inherit IUnknown, so their `Invoke` sits in slot 3.

use std::ffi::c_void;
use std::ptr::NonNull;

pub const QUERY_INTERFACE_SLOT: usize = 0;
pub const ADD_REF_SLOT: usize = 1;
pub const RELEASE_SLOT: usize = 2;
pub const GET_IIDS_SLOT: usize = 3;
pub const GET_RUNTIME_CLASS_NAME_SLOT: usize = 4;
pub const GET_TRUST_LEVEL_SLOT: usize = 5;
pub const FIRST_METHOD_SLOT: usize = 6;
pub const DELEGATE_INVOKE_SLOT: usize = 3;

/// Width of one vtable entry.
pub const SLOT_WIDTH: usize = size_of::<*const c_void>();

/// Slot of the `index`-th declared method of an interface.
#[inline]
#[must_use]
pub const fn method_slot(index: usize) -> usize {
    FIRST_METHOD_SLOT + index
}

/// Byte offset of `slot` from the start of the vtable.
#[inline]
#[must_use]
pub const fn slot_offset(slot: usize) -> usize {
    slot * SLOT_WIDTH
}

/// Read the function pointer stored in `slot` of `object`'s vtable.
///
/// # Safety
/// `object` must point to a live object whose vtable has more than `slot` entries.
#[inline]
pub unsafe fn read_slot(object: NonNull<c_void>, slot: usize) -> *const c_void {
    unsafe {
        let vtable = *(object.as_ptr() as *const *const *const c_void);
        *vtable.add(slot)
    }
}
