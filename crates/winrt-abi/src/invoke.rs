//! Raw vtable calls through libffi
//!
//! The native signature of a call is only known at run time, so calls are
//! made through a libffi call interface built from an [`AbiSignature`]:
//!
//! ```text
//! HRESULT method(this, arg0, ..., argN [, out_result])
//! ```
//!
//! Arrays expand to `(u32 count, pointer)`. A non-zero result code is a
//! failure and the out-parameter is never read.

use std::sync::Arc;

use libffi::middle::{Arg, Cif, CodePtr, Type};
use log::trace;

use crate::com::{HRESULT, S_OK};
use crate::delegate::NativeDelegate;
use crate::error::{AbiError, Result};
use crate::guid::GUID;
use crate::hstring::{InProcessStrings, StringPlatform};
use crate::marshal::{AbiSignature, Marshaller, NativeBuffer, Ownership, Transfer, TypeDescriptor, Value};
use crate::object::ComObject;
use crate::vtable::{DELEGATE_INVOKE_SLOT, method_slot, read_slot};

/// Build the call interface for `signature` with the platform's COM calling convention.
pub(crate) fn call_interface(signature: &AbiSignature) -> Cif {
    #[allow(unused_mut)]
    let mut cif = Cif::new(signature.ffi_arg_types(), Type::i32());
    #[cfg(all(target_arch = "x86", windows))]
    cif.set_abi(libffi::raw::ffi_abi_FFI_STDCALL);
    cif
}

/// Explicit context for native calls: which string platform marshals `HSTRING`s.
#[derive(Clone)]
pub struct Runtime {
    strings: Arc<dyn StringPlatform>,
}

impl Runtime {
    #[must_use]
    pub fn new(strings: Arc<dyn StringPlatform>) -> Self {
        Self { strings }
    }

    /// A runtime whose strings are owned by this process.
    #[must_use]
    pub fn in_process() -> Self {
        Self::new(Arc::new(InProcessStrings))
    }

    #[must_use]
    pub fn strings(&self) -> &dyn StringPlatform {
        self.strings.as_ref()
    }

    /// Call the `method_index`-th declared method of `object` (slot `6 + method_index`).
    ///
    /// By-reference arguments are out-parameters: their incoming value is ignored
    /// and the native result is written back into `args` after a successful call.
    pub fn invoke(
        &self,
        object: &ComObject,
        method_index: usize,
        signature: &AbiSignature,
        args: &mut [Value],
    ) -> Result<Value> {
        self.invoke_slot(object, method_slot(method_index), signature, args)
    }

    /// Call a delegate's `Invoke` (slot 3).
    pub fn invoke_delegate(
        &self,
        delegate: &ComObject,
        signature: &AbiSignature,
        args: &mut [Value],
    ) -> Result<Value> {
        self.invoke_slot(delegate, DELEGATE_INVOKE_SLOT, signature, args)
    }

    /// Call the function stored in `slot` of `object`'s vtable.
    pub fn invoke_slot(
        &self,
        object: &ComObject,
        slot: usize,
        signature: &AbiSignature,
        args: &mut [Value],
    ) -> Result<Value> {
        let this = object.ptr()?;
        if args.len() != signature.params.len() {
            return Err(AbiError::ArgumentCount {
                expected: signature.params.len(),
                found: args.len(),
            });
        }
        signature.check_return()?;

        // SAFETY: a bound handle points at a live object; the caller picks a slot
        // that exists in its vtable.
        let target = unsafe { read_slot(this, slot) };
        if target.is_null() {
            return Err(AbiError::NullPointer("vtable slot"));
        }

        let mut marshaller = Marshaller::new(self.strings(), Transfer::Lend);
        let mut slots = vec![NativeBuffer::holding(this.as_ptr())];
        let mut write_backs: Vec<(usize, *mut u8)> = Vec::new();

        for (index, (value, desc)) in args.iter().zip(&signature.params).enumerate() {
            match desc {
                TypeDescriptor::Array(elem) => {
                    let (count, data) = marshaller.write_array(value, elem)?;
                    slots.push(NativeBuffer::holding(count));
                    slots.push(NativeBuffer::holding(data));
                }
                TypeDescriptor::Reference(inner) => {
                    let cell = marshaller.scratch(inner.layout());
                    slots.push(NativeBuffer::holding(cell));
                    write_backs.push((index, cell));
                }
                _ => {
                    let mut buffer = NativeBuffer::zeroed(desc.layout().size);
                    unsafe { marshaller.write(buffer.as_mut_ptr(), value, desc)? };
                    slots.push(buffer);
                }
            }
        }

        let mut result = NativeBuffer::zeroed(signature.ret.layout().size);
        if !signature.ret.is_void() {
            slots.push(NativeBuffer::holding(result.as_mut_ptr()));
        }

        let cif = call_interface(signature);
        let ffi_args: Vec<Arg> = slots.iter().map(|s| Arg::new(s.first_word())).collect();

        // SAFETY: the call interface was built from the same signature the
        // arguments were marshalled with, and every buffer outlives the call.
        let raw: isize = unsafe { cif.call(CodePtr::from_ptr(target), &ffi_args) };
        let hr = raw as HRESULT;
        trace!(
            "slot {slot} on {:p} ({} args) -> {hr:#010x}",
            this.as_ptr(),
            args.len()
        );
        if hr != S_OK {
            return Err(AbiError::NativeCallFailure { code: hr });
        }

        for (index, cell) in write_backs {
            if let TypeDescriptor::Reference(inner) = &signature.params[index] {
                args[index] = unsafe { marshaller.read(cell, inner, Ownership::Owned)? };
            }
        }

        if signature.ret.is_void() {
            return Ok(Value::Unit);
        }
        unsafe { marshaller.read(result.as_mut_ptr(), &signature.ret, Ownership::Owned) }
    }

    /// Wrap `handler` in a native delegate object answering `iid`.
    pub fn create_delegate(
        &self,
        iid: GUID,
        signature: AbiSignature,
        handler: impl Fn(&[Value]) -> Result<Value> + 'static,
    ) -> Result<NativeDelegate> {
        NativeDelegate::new(iid, signature, Arc::clone(&self.strings), handler)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::in_process()
    }
}
