//! Windows Runtime ABI invocation runtime
//!
//! This crate calls into native components through their vtables without any
//! host support for the runtime's type system. It provides:
//!
//! - [`GUID`], [`HRESULT`] and the IUnknown / IInspectable base vtables
//! - vtable slot addressing ([`vtable`])
//! - owning object handles with COM reference counting ([`ComObject`])
//! - typed marshalling descriptors and managed values ([`marshal`])
//! - platform string handles ([`hstring`])
//! - dynamic-signature vtable calls through libffi ([`Runtime`])
//! - native callback objects backed by Rust closures ([`NativeDelegate`])
//! - activation factories and compute-once caches
//!
//! ## Declaring a known interface
//! ```ignore
//! use winrt_abi::proc::winrt_interface;
//! use winrt_abi::{HRESULT, hstring::HStringHandle};
//!
//! #[winrt_interface("96369f54-8eb6-48f0-abce-c1b211e627c3")]
//! pub trait IStringable {
//!     fn to_string(&self, value: *mut HStringHandle) -> HRESULT;
//! }
//! ```
//!
//! ## Calling by descriptor
//! ```ignore
//! let runtime = Runtime::in_process();
//! let signature = AbiSignature::new(
//!     vec![TypeDescriptor::Primitive(PrimitiveKind::Int32)],
//!     TypeDescriptor::VOID,
//! );
//! runtime.invoke(&vector, 7, &signature, &mut [Value::I32(5)])?;
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Effect |
//! |---------|--------|
//! | `windows-compat` | `From` conversions between [`GUID`] and `windows_core::GUID` |

pub mod activation;
pub mod com;
pub mod delegate;
pub mod error;
pub mod guid;
pub mod hstring;
pub mod invoke;
pub mod library;
pub mod marshal;
pub mod memo;
pub mod object;
pub mod vtable;

/// Proc-macro re-exports from winrt-abi-macro
pub mod proc {
    pub use winrt_abi_macro::winrt_interface;
}

pub use activation::{ActivationFactories, IActivationFactory, IID_IACTIVATIONFACTORY};
pub use com::{
    ComInterface, HRESULT, IID_IINSPECTABLE, IID_IUNKNOWN, IInspectable, IInspectableVTable,
    IUnknown, IUnknownVTable, RefCount, S_OK, TrustLevel, VTableLayout,
};
pub use delegate::NativeDelegate;
pub use error::{AbiError, Result};
pub use guid::{GUID, GuidParseError, make_guid};
pub use hstring::{Combase, HStringHandle, InProcessStrings, StringPlatform};
pub use invoke::Runtime;
pub use library::NativeLibrary;
pub use marshal::{AbiSignature, Layout, PrimitiveKind, TypeDescriptor, Value};
pub use memo::Memoized;
pub use object::{ComObject, ObjectState};
