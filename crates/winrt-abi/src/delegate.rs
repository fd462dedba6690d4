//! Native callback objects backed by Rust closures
//!
//! A [`NativeDelegate`] is a fixed-layout block that native code can hold and
//! call like any other delegate:
//!
//! ```text
//! block:  [vtable*][ref_count][accepted iids]
//! vtable: [QueryInterface][AddRef][Release][Invoke]
//! ```
//!
//! `Invoke` is a libffi closure built for the delegate's native signature. It
//! converts the native arguments to [`Value`]s, runs the handler and writes the
//! result through the trailing out-parameter.
//!
//! The reference count is not synchronized. Blocks belong to one apartment and
//! `NativeDelegate` is neither `Send` nor `Sync`. The count only reports what
//! native code did; the block is freed when the `NativeDelegate` is dropped.

use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::Arc;

use libffi::low::ffi_cif;
use libffi::middle::Closure;
use log::{debug, trace};

use crate::com::{
    E_FAIL, E_INVALIDARG, E_NOINTERFACE, E_POINTER, HRESULT, IID_IUNKNOWN, IUnknownVTable,
    RefCount, S_OK,
};
use crate::error::{AbiError, Result};
use crate::guid::GUID;
use crate::hstring::StringPlatform;
use crate::invoke::call_interface;
use crate::marshal::{AbiSignature, Marshaller, Ownership, Transfer, TypeDescriptor, Value};
use crate::object::ComObject;

/// Delegate vtable: IUnknown followed by `Invoke` in slot 3.
#[repr(C)]
pub struct DelegateVTable {
    pub base: IUnknownVTable,
    pub invoke: *const c_void,
}

#[repr(C)]
struct DelegateBlock {
    vtable: *const DelegateVTable,
    ref_count: RefCount,
    accepted: [GUID; 2],
}

type Handler = dyn Fn(&[Value]) -> Result<Value>;

struct InvokeContext {
    signature: AbiSignature,
    handler: Box<Handler>,
    strings: Arc<dyn StringPlatform>,
}

pub struct NativeDelegate {
    // Field order is drop order: the closure must go before the context it borrows.
    block: Box<DelegateBlock>,
    vtable: Box<DelegateVTable>,
    _closure: Closure<'static>,
    context: Box<InvokeContext>,
}

impl NativeDelegate {
    /// Build a delegate answering `iid` whose `Invoke` has `signature`.
    pub fn new(
        iid: GUID,
        signature: AbiSignature,
        strings: Arc<dyn StringPlatform>,
        handler: impl Fn(&[Value]) -> Result<Value> + 'static,
    ) -> Result<Self> {
        signature.check_return()?;

        let cif = call_interface(&signature);
        let context = Box::new(InvokeContext {
            signature,
            handler: Box::new(handler),
            strings,
        });

        // SAFETY: the context is boxed, so its address is stable, and `closure`
        // is dropped before `context` (field order).
        let userdata: &'static InvokeContext = unsafe { &*ptr::from_ref(context.as_ref()) };
        let closure = Closure::new(cif, invoke_trampoline, userdata);
        let invoke = *closure.code_ptr() as *const c_void;

        let vtable = Box::new(DelegateVTable {
            base: IUnknownVTable {
                query_interface: delegate_query_interface,
                add_ref: delegate_add_ref,
                release: delegate_release,
            },
            invoke,
        });
        let block = Box::new(DelegateBlock {
            vtable: ptr::from_ref(vtable.as_ref()),
            ref_count: RefCount::new(),
            accepted: [iid, IID_IUNKNOWN],
        });

        debug!("created delegate {iid} at {:p}", ptr::from_ref(block.as_ref()));
        Ok(Self {
            block,
            vtable,
            _closure: closure,
            context,
        })
    }

    /// The object pointer handed to native code.
    #[must_use]
    pub fn as_raw(&self) -> *mut c_void {
        ptr::from_ref(self.block.as_ref()) as *mut c_void
    }

    #[must_use]
    pub fn iid(&self) -> GUID {
        self.block.accepted[0]
    }

    /// Current value of the embedded reference count.
    #[must_use]
    pub fn ref_count(&self) -> u32 {
        self.block.ref_count.count()
    }

    #[must_use]
    pub fn signature(&self) -> &AbiSignature {
        &self.context.signature
    }

    /// An owning handle to this delegate (takes a reference with `AddRef`).
    ///
    /// # Safety
    /// The handle must be dropped before `self`.
    #[must_use]
    pub unsafe fn to_object(&self) -> ComObject {
        unsafe { ComObject::from_borrowed(self.as_raw()) }
    }

    #[doc(hidden)]
    pub fn vtable(&self) -> &DelegateVTable {
        &self.vtable
    }
}

impl Drop for NativeDelegate {
    fn drop(&mut self) {
        let outstanding = self.block.ref_count.count();
        if outstanding > 1 {
            debug!(
                "dropping delegate {} with {} outstanding native references",
                self.iid(),
                outstanding - 1
            );
        }
    }
}

// =============================================================================
// IUnknown for the block
// =============================================================================

unsafe extern "system" fn delegate_query_interface(
    this: *mut c_void,
    riid: *const GUID,
    ppv: *mut *mut c_void,
) -> HRESULT {
    unsafe {
        if ppv.is_null() {
            return E_POINTER;
        }
        if this.is_null() || riid.is_null() {
            *ppv = ptr::null_mut();
            return E_INVALIDARG;
        }

        let block = &*(this as *const DelegateBlock);
        if block.accepted.contains(&*riid) {
            block.ref_count.add_ref();
            *ppv = this;
            return S_OK;
        }

        trace!("delegate {} refused {}", block.accepted[0], *riid);
        *ppv = ptr::null_mut();
        E_NOINTERFACE
    }
}

unsafe extern "system" fn delegate_add_ref(this: *mut c_void) -> u32 {
    if this.is_null() {
        return 0;
    }
    unsafe { (*(this as *const DelegateBlock)).ref_count.add_ref() }
}

unsafe extern "system" fn delegate_release(this: *mut c_void) -> u32 {
    if this.is_null() {
        return 0;
    }
    unsafe { (*(this as *const DelegateBlock)).ref_count.release() }
}

// =============================================================================
// Invoke trampoline
// =============================================================================

unsafe extern "C" fn invoke_trampoline(
    _cif: &ffi_cif,
    result: &mut isize,
    args: *const *const c_void,
    context: &InvokeContext,
) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| unsafe { context.dispatch(args) }));
    let hr = match outcome {
        Ok(Ok(())) => S_OK,
        Ok(Err(e)) => {
            debug!("delegate handler failed: {e}");
            e.hresult()
        }
        Err(_) => E_FAIL,
    };
    *result = hr as isize;
}

impl InvokeContext {
    /// # Safety
    /// `args` must be the libffi argument array for this context's signature.
    unsafe fn dispatch(&self, args: *const *const c_void) -> Result<()> {
        unsafe {
            let reader = Marshaller::new(self.strings.as_ref(), Transfer::Lend);
            let arg = |index: usize| *args.add(index) as *const u8;

            // Argument 0 is `this`.
            let mut cursor = 1;
            let mut values = Vec::with_capacity(self.signature.params.len());
            for desc in &self.signature.params {
                match desc {
                    TypeDescriptor::Array(elem) => {
                        let count = *(arg(cursor) as *const u32);
                        let data = *(arg(cursor + 1) as *const *const u8);
                        values.push(reader.read_array(data, count, elem, Ownership::Borrowed)?);
                        cursor += 2;
                    }
                    _ => {
                        values.push(reader.read(arg(cursor), desc, Ownership::Borrowed)?);
                        cursor += 1;
                    }
                }
            }

            let value = (self.handler)(&values)?;

            if !self.signature.ret.is_void() {
                let out = *(arg(cursor) as *const *mut u8);
                if out.is_null() {
                    return Err(AbiError::NullPointer("delegate result"));
                }
                let mut writer = Marshaller::new(self.strings.as_ref(), Transfer::Give);
                writer.write(out, &value, &self.signature.ret)?;
            }
            Ok(())
        }
    }
}
