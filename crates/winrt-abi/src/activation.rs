//! Activation factories
//!
//! Runtime classes are created through their activation factory, obtained
//! once per `(class name, factory interface)` and cached.

use std::ffi::c_void;
use std::ptr;
use std::sync::Arc;

use log::debug;

use crate::com::{HRESULT, S_OK};
use crate::error::{AbiError, Result};
use crate::guid::GUID;
use crate::hstring::{HStringHandle, StringPlatform};
use crate::library::NativeLibrary;
use crate::memo::Memoized;
use crate::object::ComObject;
use crate::proc::winrt_interface;

/// The factory every activatable class exposes.
#[winrt_interface("00000035-0000-0000-c000-000000000046", internal)]
pub trait IActivationFactory {
    /// Create an instance with the class's default constructor.
    fn activate_instance(&self, instance: *mut *mut c_void) -> HRESULT;
}

/// Signature of `RoGetActivationFactory`.
pub type GetActivationFactoryFn = unsafe extern "system" fn(
    class_id: HStringHandle,
    iid: *const GUID,
    factory: *mut *mut c_void,
) -> HRESULT;

/// A cached factory reference.
#[derive(Clone)]
struct FactoryHandle(ComObject);

// SAFETY: activation factories are required to be agile, so their references
// may be used and released from any thread.
unsafe impl Send for FactoryHandle {}
unsafe impl Sync for FactoryHandle {}

/// Compute-once cache of activation factories.
///
/// Lookups are not re-entrant: see [`factory`](Self::factory).
pub struct ActivationFactories {
    get_factory: GetActivationFactoryFn,
    strings: Arc<dyn StringPlatform>,
    cache: Memoized<(String, GUID), FactoryHandle>,
}

impl ActivationFactories {
    #[must_use]
    pub fn new(get_factory: GetActivationFactoryFn, strings: Arc<dyn StringPlatform>) -> Self {
        Self {
            get_factory,
            strings,
            cache: Memoized::new(),
        }
    }

    /// Use `RoGetActivationFactory` exported by `library`.
    pub fn from_library(library: &NativeLibrary, strings: Arc<dyn StringPlatform>) -> Result<Self> {
        // SAFETY: the type matches the documented export.
        let get_factory =
            unsafe { library.function::<GetActivationFactoryFn>("RoGetActivationFactory")? };
        Ok(Self::new(get_factory, strings))
    }

    /// The factory of `class_name` seen through `iid`, fetched at most once.
    ///
    /// The native lookup runs while the cache entry is locked. The
    /// `get_factory` function must not call back into this cache, or a lookup
    /// landing on the same shard deadlocks.
    pub fn factory(&self, class_name: &str, iid: &GUID) -> Result<ComObject> {
        let key = (class_name.to_string(), *iid);
        let handle = self
            .cache
            .get_or_try_init(&key, || self.fetch(class_name, iid).map(FactoryHandle))?;
        Ok(handle.0)
    }

    fn fetch(&self, class_name: &str, iid: &GUID) -> Result<ComObject> {
        let class_id = self.strings.create(class_name)?;
        let mut out = ptr::null_mut();
        let hr = unsafe { (self.get_factory)(class_id, iid, &mut out) };
        unsafe { self.strings.delete(class_id) };
        debug!("activation factory for {class_name} ({iid}) -> {hr:#010x}");

        if hr != S_OK {
            return Err(AbiError::NativeCallFailure { code: hr });
        }
        if out.is_null() {
            return Err(AbiError::NullPointer("activation factory"));
        }
        Ok(unsafe { ComObject::from_raw(out) })
    }

    /// Default-construct `class_name` through `IActivationFactory::ActivateInstance`.
    pub fn activate_instance(&self, class_name: &str) -> Result<ComObject> {
        let factory = self.factory(class_name, &IID_IACTIVATIONFACTORY)?;
        let iface = unsafe { IActivationFactory::from_raw(factory.ptr()?.as_ptr()) };
        let mut instance = ptr::null_mut();
        let hr = unsafe { iface.activate_instance(&mut instance) };
        if hr != S_OK {
            return Err(AbiError::NativeCallFailure { code: hr });
        }
        if instance.is_null() {
            return Err(AbiError::NullPointer("activated instance"));
        }
        Ok(unsafe { ComObject::from_raw(instance) })
    }

    /// Number of factories fetched so far.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
