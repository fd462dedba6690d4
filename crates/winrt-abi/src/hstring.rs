//! Platform string handles
//!
//! Runtime strings cross the ABI as opaque `HSTRING` handles. A null handle is
//! the empty string. The [`StringPlatform`] trait abstracts over who owns the
//! buffers:
//!
//! - [`InProcessStrings`] allocates UTF-16 buffers in this process. It is used
//!   when no host support exists and by tests.
//! - [`Combase`] forwards to `WindowsCreateString`, `WindowsGetStringRawBuffer`
//!   and `WindowsDeleteString` loaded from the platform library.

use std::ffi::c_void;
use std::ptr;

use log::trace;

use crate::com::{HRESULT, S_OK};
use crate::error::{AbiError, Result};
use crate::library::NativeLibrary;

/// Opaque string handle as passed across the ABI. Null means "".
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HStringHandle(pub *mut c_void);

impl HStringHandle {
    pub const NULL: Self = Self(ptr::null_mut());

    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

impl Default for HStringHandle {
    fn default() -> Self {
        Self::NULL
    }
}

/// Create, read and delete platform string handles.
///
/// Handles returned by [`create`](StringPlatform::create) are owned by the
/// caller and must be passed to [`delete`](StringPlatform::delete) exactly once.
pub trait StringPlatform: Send + Sync {
    /// Allocate a handle holding `text`. The empty string yields the null handle.
    fn create(&self, text: &str) -> Result<HStringHandle>;

    /// Copy the contents of `handle` into a Rust string.
    ///
    /// # Safety
    /// `handle` must be null or a live handle produced by this platform.
    unsafe fn read(&self, handle: HStringHandle) -> Result<String>;

    /// Free `handle`. Deleting the null handle is a no-op.
    ///
    /// # Safety
    /// `handle` must be null or a live handle produced by this platform, and
    /// must not be used afterwards.
    unsafe fn delete(&self, handle: HStringHandle);
}

fn decode_utf16(units: &[u16]) -> Result<String> {
    String::from_utf16(units).map_err(|e| AbiError::TypeMismatch {
        expected: "UTF-16 string".into(),
        found: e.to_string(),
    })
}

// =============================================================================
// InProcessStrings
// =============================================================================

/// Header behind an in-process handle: length followed by the UTF-16 buffer.
#[repr(C)]
struct InProcessHeader {
    length: u32,
    buffer: Box<[u16]>,
}

/// String handles backed by heap buffers owned by this process.
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcessStrings;

impl StringPlatform for InProcessStrings {
    fn create(&self, text: &str) -> Result<HStringHandle> {
        if text.is_empty() {
            return Ok(HStringHandle::NULL);
        }
        let buffer: Box<[u16]> = text.encode_utf16().collect();
        let length = u32::try_from(buffer.len()).map_err(|_| AbiError::TypeMismatch {
            expected: "string shorter than 4G code units".into(),
            found: format!("{} code units", buffer.len()),
        })?;
        let header = Box::new(InProcessHeader { length, buffer });
        Ok(HStringHandle(Box::into_raw(header).cast()))
    }

    unsafe fn read(&self, handle: HStringHandle) -> Result<String> {
        if handle.is_null() {
            return Ok(String::new());
        }
        let header = unsafe { &*(handle.0 as *const InProcessHeader) };
        decode_utf16(&header.buffer[..header.length as usize])
    }

    unsafe fn delete(&self, handle: HStringHandle) {
        if !handle.is_null() {
            drop(unsafe { Box::from_raw(handle.0 as *mut InProcessHeader) });
        }
    }
}

// =============================================================================
// Combase
// =============================================================================

type WindowsCreateString =
    unsafe extern "system" fn(source: *const u16, length: u32, string: *mut HStringHandle) -> HRESULT;
type WindowsGetStringRawBuffer =
    unsafe extern "system" fn(string: HStringHandle, length: *mut u32) -> *const u16;
type WindowsDeleteString = unsafe extern "system" fn(string: HStringHandle) -> HRESULT;

/// String handles managed by the platform's `combase` library.
pub struct Combase {
    create: WindowsCreateString,
    raw_buffer: WindowsGetStringRawBuffer,
    delete: WindowsDeleteString,
    _library: NativeLibrary,
}

impl Combase {
    pub const LIBRARY: &'static str = "combase.dll";

    /// Load the string functions from [`Combase::LIBRARY`].
    pub fn load() -> Result<Self> {
        Self::from_library(NativeLibrary::open(Self::LIBRARY)?)
    }

    /// Resolve the string functions from an already opened library.
    pub fn from_library(library: NativeLibrary) -> Result<Self> {
        // SAFETY: the symbol types match the documented platform signatures.
        let (create, raw_buffer, delete) = unsafe {
            (
                library.function::<WindowsCreateString>("WindowsCreateString")?,
                library.function::<WindowsGetStringRawBuffer>("WindowsGetStringRawBuffer")?,
                library.function::<WindowsDeleteString>("WindowsDeleteString")?,
            )
        };
        Ok(Self {
            create,
            raw_buffer,
            delete,
            _library: library,
        })
    }
}

impl StringPlatform for Combase {
    fn create(&self, text: &str) -> Result<HStringHandle> {
        let units: Vec<u16> = text.encode_utf16().collect();
        let length = u32::try_from(units.len()).map_err(|_| AbiError::TypeMismatch {
            expected: "string shorter than 4G code units".into(),
            found: format!("{} code units", units.len()),
        })?;
        let mut handle = HStringHandle::NULL;
        let hr = unsafe { (self.create)(units.as_ptr(), length, &mut handle) };
        if hr != S_OK {
            return Err(AbiError::NativeCallFailure { code: hr });
        }
        trace!("WindowsCreateString({length} units) -> {:p}", handle.0);
        Ok(handle)
    }

    unsafe fn read(&self, handle: HStringHandle) -> Result<String> {
        if handle.is_null() {
            return Ok(String::new());
        }
        let mut length = 0u32;
        let buffer = unsafe { (self.raw_buffer)(handle, &mut length) };
        if buffer.is_null() || length == 0 {
            return Ok(String::new());
        }
        let units = unsafe { std::slice::from_raw_parts(buffer, length as usize) };
        decode_utf16(units)
    }

    unsafe fn delete(&self, handle: HStringHandle) {
        if !handle.is_null() {
            unsafe { (self.delete)(handle) };
        }
    }
}

// SAFETY: the combase string functions are free-threaded.
unsafe impl Send for Combase {}
unsafe impl Sync for Combase {}
