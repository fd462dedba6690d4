//! Typed descriptors and value marshalling
//!
//! Marshalling is driven by [`TypeDescriptor`] trees built from resolved type
//! references, never by reflection. A descriptor knows its native layout and
//! libffi type. [`Value`] is the managed side of a native value.
//!
//! Primitive mapping is data: [`PRIMITIVES`] is keyed by `(namespace, name)`.

use std::ffi::c_void;
use std::fmt;
use std::ptr;

use libffi::middle::Type;

use crate::error::{AbiError, Result};
use crate::guid::GUID;
use crate::hstring::{HStringHandle, StringPlatform};
use crate::object::ComObject;

// =============================================================================
// Primitives
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Void,
    Boolean,
    Char16,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Single,
    Double,
    Guid,
    /// HSTRING handle
    String,
    /// IInspectable pointer
    Object,
}

/// Managed system types with a direct native representation.
pub const PRIMITIVES: &[(&str, &str, PrimitiveKind)] = &[
    ("System", "Void", PrimitiveKind::Void),
    ("System", "Boolean", PrimitiveKind::Boolean),
    ("System", "Char", PrimitiveKind::Char16),
    ("System", "Byte", PrimitiveKind::UInt8),
    ("System", "Int16", PrimitiveKind::Int16),
    ("System", "UInt16", PrimitiveKind::UInt16),
    ("System", "Int32", PrimitiveKind::Int32),
    ("System", "UInt32", PrimitiveKind::UInt32),
    ("System", "Int64", PrimitiveKind::Int64),
    ("System", "UInt64", PrimitiveKind::UInt64),
    ("System", "Single", PrimitiveKind::Single),
    ("System", "Double", PrimitiveKind::Double),
    ("System", "Guid", PrimitiveKind::Guid),
    ("System", "String", PrimitiveKind::String),
    ("System", "Object", PrimitiveKind::Object),
];

/// Namespace whose types are never catalog entries.
pub const SYSTEM_NAMESPACE: &str = "System";

impl PrimitiveKind {
    /// Look up `(namespace, name)` in [`PRIMITIVES`].
    #[must_use]
    pub fn lookup(namespace: &str, name: &str) -> Option<Self> {
        PRIMITIVES
            .iter()
            .find(|(ns, n, _)| *ns == namespace && *n == name)
            .map(|&(_, _, kind)| kind)
    }

    /// Like [`lookup`](Self::lookup) but a miss inside `System` is an error.
    pub fn require(namespace: &str, name: &str) -> Result<Self> {
        Self::lookup(namespace, name).ok_or_else(|| AbiError::UnsupportedPrimitive {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    /// Token used in parameterized type signatures. `Void` has none.
    #[must_use]
    pub const fn signature_token(self) -> Option<&'static str> {
        Some(match self {
            Self::Void => return None,
            Self::Boolean => "b1",
            Self::Char16 => "c2",
            Self::UInt8 => "u1",
            Self::Int16 => "i2",
            Self::UInt16 => "u2",
            Self::Int32 => "i4",
            Self::UInt32 => "u4",
            Self::Int64 => "i8",
            Self::UInt64 => "u8",
            Self::Single => "f4",
            Self::Double => "f8",
            Self::Guid => "g16",
            Self::String => "string",
            Self::Object => "cinterface(IInspectable)",
        })
    }

    #[must_use]
    pub const fn layout(self) -> Layout {
        match self {
            Self::Void => Layout::new(0, 1),
            Self::Boolean | Self::UInt8 => Layout::new(1, 1),
            Self::Char16 | Self::Int16 | Self::UInt16 => Layout::new(2, 2),
            Self::Int32 | Self::UInt32 | Self::Single => Layout::new(4, 4),
            Self::Int64 | Self::UInt64 | Self::Double => Layout::new(8, 8),
            Self::Guid => Layout::new(16, 4),
            Self::String | Self::Object => Layout::of::<*mut c_void>(),
        }
    }

    #[must_use]
    pub fn ffi_type(self) -> Type {
        match self {
            Self::Void => Type::void(),
            Self::Boolean | Self::UInt8 => Type::u8(),
            Self::Char16 | Self::UInt16 => Type::u16(),
            Self::Int16 => Type::i16(),
            Self::Int32 => Type::i32(),
            Self::UInt32 => Type::u32(),
            Self::Int64 => Type::i64(),
            Self::UInt64 => Type::u64(),
            Self::Single => Type::f32(),
            Self::Double => Type::f64(),
            Self::Guid => Type::structure([
                Type::u32(),
                Type::u16(),
                Type::u16(),
                Type::u8(),
                Type::u8(),
                Type::u8(),
                Type::u8(),
                Type::u8(),
                Type::u8(),
                Type::u8(),
                Type::u8(),
            ]),
            Self::String | Self::Object => Type::pointer(),
        }
    }
}

/// Size and alignment of a native value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub size: usize,
    pub align: usize,
}

impl Layout {
    #[must_use]
    pub const fn new(size: usize, align: usize) -> Self {
        Self { size, align }
    }

    #[must_use]
    pub const fn of<T>() -> Self {
        Self::new(size_of::<T>(), align_of::<T>())
    }
}

const fn align_up(offset: usize, align: usize) -> usize {
    offset.div_ceil(align) * align
}

// =============================================================================
// TypeDescriptor
// =============================================================================

/// Native shape of a resolved type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Primitive(PrimitiveKind),
    Enum { name: String },
    Struct { name: String, fields: Vec<TypeDescriptor> },
    Interface { name: String, iid: GUID },
    Delegate { name: String, iid: GUID },
    Class { name: String, default_iid: GUID },
    /// Passed as `(u32 count, pointer)`.
    Array(Box<TypeDescriptor>),
    /// Out-parameter: passed as a pointer to zeroed storage, read back after the call.
    Reference(Box<TypeDescriptor>),
    Parameterized {
        base: String,
        args: Vec<TypeDescriptor>,
        iid: GUID,
    },
}

impl TypeDescriptor {
    pub const VOID: Self = Self::Primitive(PrimitiveKind::Void);

    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, Self::Primitive(PrimitiveKind::Void))
    }

    /// Whether values of this type cross the ABI as an object pointer.
    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(
            self,
            Self::Primitive(PrimitiveKind::Object)
                | Self::Interface { .. }
                | Self::Delegate { .. }
                | Self::Class { .. }
                | Self::Parameterized { .. }
        )
    }

    /// The interface id an object of this type is expected to answer.
    #[must_use]
    pub fn iid(&self) -> Option<GUID> {
        match self {
            Self::Interface { iid, .. }
            | Self::Delegate { iid, .. }
            | Self::Parameterized { iid, .. } => Some(*iid),
            Self::Class { default_iid, .. } => Some(*default_iid),
            _ => None,
        }
    }

    #[must_use]
    pub fn layout(&self) -> Layout {
        match self {
            Self::Primitive(kind) => kind.layout(),
            Self::Enum { .. } => Layout::of::<i32>(),
            Self::Struct { fields, .. } => struct_layout(fields).1,
            Self::Interface { .. }
            | Self::Delegate { .. }
            | Self::Class { .. }
            | Self::Parameterized { .. }
            | Self::Array(_)
            | Self::Reference(_) => Layout::of::<*mut c_void>(),
        }
    }

    /// libffi type of a single native slot holding this type.
    #[must_use]
    pub fn ffi_type(&self) -> Type {
        match self {
            Self::Primitive(kind) => kind.ffi_type(),
            Self::Enum { .. } => Type::i32(),
            Self::Struct { fields, .. } => Type::structure(fields.iter().map(Self::ffi_type)),
            _ => Type::pointer(),
        }
    }

    /// libffi types of the arguments this type expands to in a call.
    #[must_use]
    pub fn ffi_arg_types(&self) -> Vec<Type> {
        match self {
            Self::Array(_) => vec![Type::u32(), Type::pointer()],
            _ => vec![self.ffi_type()],
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(kind) => write!(f, "{kind:?}"),
            Self::Enum { name }
            | Self::Struct { name, .. }
            | Self::Interface { name, .. }
            | Self::Delegate { name, .. }
            | Self::Class { name, .. } => f.write_str(name),
            Self::Array(elem) => write!(f, "{elem}[]"),
            Self::Reference(inner) => write!(f, "{inner}&"),
            Self::Parameterized { base, args, .. } => {
                write!(f, "{base}<")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(">")
            }
        }
    }
}

/// Field offsets and overall layout of a `#[repr(C)]`-style struct.
#[must_use]
pub fn struct_layout(fields: &[TypeDescriptor]) -> (Vec<usize>, Layout) {
    let mut offsets = Vec::with_capacity(fields.len());
    let mut offset = 0;
    let mut align = 1;
    for field in fields {
        let layout = field.layout();
        offset = align_up(offset, layout.align);
        offsets.push(offset);
        offset += layout.size;
        align = align.max(layout.align);
    }
    (offsets, Layout::new(align_up(offset, align), align))
}

/// Native signature of a method or delegate `Invoke`, excluding `this`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AbiSignature {
    pub params: Vec<TypeDescriptor>,
    pub ret: TypeDescriptor,
}

impl AbiSignature {
    #[must_use]
    pub fn new(params: Vec<TypeDescriptor>, ret: TypeDescriptor) -> Self {
        Self { params, ret }
    }

    /// `this`, every expanded parameter and, for non-void returns, the out-pointer.
    #[must_use]
    pub fn ffi_arg_types(&self) -> Vec<Type> {
        let mut types = vec![Type::pointer()];
        types.extend(self.params.iter().flat_map(TypeDescriptor::ffi_arg_types));
        if !self.ret.is_void() {
            types.push(Type::pointer());
        }
        types
    }

    pub(crate) fn check_return(&self) -> Result<()> {
        if let TypeDescriptor::Array(_) = self.ret {
            return Err(AbiError::TypeMismatch {
                expected: "non-array return type".into(),
                found: self.ret.to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Value
// =============================================================================

/// Managed representation of a native value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Bool(bool),
    Char16(u16),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Guid(GUID),
    String(String),
    /// An unbound handle stands for a null pointer.
    Object(ComObject),
    Enum(i32),
    Struct(Vec<Value>),
    Array(Vec<Value>),
}

impl Value {
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Bool(_) => "bool",
            Self::Char16(_) => "char16",
            Self::U8(_) => "u8",
            Self::I16(_) => "i16",
            Self::U16(_) => "u16",
            Self::I32(_) => "i32",
            Self::U32(_) => "u32",
            Self::I64(_) => "i64",
            Self::U64(_) => "u64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Guid(_) => "guid",
            Self::String(_) => "string",
            Self::Object(_) => "object",
            Self::Enum(_) => "enum",
            Self::Struct(_) => "struct",
            Self::Array(_) => "array",
        }
    }

    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::I32(v) | Self::Enum(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

fn mismatch(desc: &TypeDescriptor, value: &Value) -> AbiError {
    AbiError::TypeMismatch {
        expected: desc.to_string(),
        found: value.kind_name().to_string(),
    }
}

// =============================================================================
// Native buffers
// =============================================================================

/// Zeroed, 8-byte aligned scratch storage for one native slot.
#[derive(Debug)]
pub(crate) struct NativeBuffer {
    words: Vec<u64>,
}

impl NativeBuffer {
    pub(crate) fn zeroed(size: usize) -> Self {
        Self {
            words: vec![0; size.div_ceil(8).max(1)],
        }
    }

    pub(crate) fn holding<T: Copy>(value: T) -> Self {
        let mut buffer = Self::zeroed(size_of::<T>());
        unsafe { ptr::write_unaligned(buffer.as_mut_ptr().cast::<T>(), value) };
        buffer
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        self.words.as_mut_ptr().cast()
    }

    /// First word of the buffer, for `libffi::middle::Arg::new`.
    pub(crate) fn first_word(&self) -> &u64 {
        &self.words[0]
    }
}

/// Who owns pointers handed across the ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transfer {
    /// Values live only for the duration of a call; temporaries are freed afterwards.
    Lend,
    /// Values are handed to the native side, which now owns a reference.
    Give,
}

/// Ownership of pointers read back from native memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ownership {
    /// Out values: the reference or string now belongs to us.
    Owned,
    /// Incoming callback arguments: take our own reference.
    Borrowed,
}

/// Converts between [`Value`]s and native memory, tracking temporaries.
pub(crate) struct Marshaller<'a> {
    strings: &'a dyn StringPlatform,
    transfer: Transfer,
    temporaries: Vec<HStringHandle>,
    buffers: Vec<NativeBuffer>,
}

impl<'a> Marshaller<'a> {
    pub(crate) fn new(strings: &'a dyn StringPlatform, transfer: Transfer) -> Self {
        Self {
            strings,
            transfer,
            temporaries: Vec::new(),
            buffers: Vec::new(),
        }
    }

    /// Scratch memory that lives as long as the marshaller.
    pub(crate) fn scratch(&mut self, layout: Layout) -> *mut u8 {
        let mut buffer = NativeBuffer::zeroed(layout.size);
        let ptr = buffer.as_mut_ptr();
        self.buffers.push(buffer);
        ptr
    }

    /// Write `value` as `desc` at `dst`.
    ///
    /// # Safety
    /// `dst` must be writable for `desc.layout().size` bytes.
    pub(crate) unsafe fn write(
        &mut self,
        dst: *mut u8,
        value: &Value,
        desc: &TypeDescriptor,
    ) -> Result<()> {
        use PrimitiveKind as P;
        use TypeDescriptor as D;

        unsafe {
            match (desc, value) {
                (D::Primitive(P::Boolean), Value::Bool(b)) => put(dst, u8::from(*b)),
                (D::Primitive(P::Char16), Value::Char16(c)) => put(dst, *c),
                (D::Primitive(P::UInt8), Value::U8(v)) => put(dst, *v),
                (D::Primitive(P::Int16), Value::I16(v)) => put(dst, *v),
                (D::Primitive(P::UInt16), Value::U16(v)) => put(dst, *v),
                (D::Primitive(P::Int32), Value::I32(v)) => put(dst, *v),
                (D::Primitive(P::UInt32), Value::U32(v)) => put(dst, *v),
                (D::Primitive(P::Int64), Value::I64(v)) => put(dst, *v),
                (D::Primitive(P::UInt64), Value::U64(v)) => put(dst, *v),
                (D::Primitive(P::Single), Value::F32(v)) => put(dst, *v),
                (D::Primitive(P::Double), Value::F64(v)) => put(dst, *v),
                (D::Primitive(P::Guid), Value::Guid(g)) => put(dst, *g),
                (D::Primitive(P::String), Value::String(s)) => {
                    let handle = self.strings.create(s)?;
                    if self.transfer == Transfer::Lend {
                        self.temporaries.push(handle);
                    }
                    put(dst, handle);
                }
                (D::Enum { .. }, Value::Enum(v) | Value::I32(v)) => put(dst, *v),
                (d, Value::Object(object)) if d.is_object() => {
                    let raw = match self.transfer {
                        Transfer::Lend => object.as_raw(),
                        Transfer::Give => object.clone().into_raw(),
                    };
                    put(dst, raw);
                }
                (D::Struct { fields, .. }, Value::Struct(values)) => {
                    if fields.len() != values.len() {
                        return Err(mismatch(desc, value));
                    }
                    let (offsets, _) = struct_layout(fields);
                    for ((field, offset), v) in fields.iter().zip(offsets).zip(values) {
                        self.write(dst.add(offset), v, field)?;
                    }
                }
                _ => return Err(mismatch(desc, value)),
            }
        }
        Ok(())
    }

    /// Lay out array elements contiguously; returns `(count, data)`.
    pub(crate) fn write_array(
        &mut self,
        value: &Value,
        elem: &TypeDescriptor,
    ) -> Result<(u32, *mut u8)> {
        let Value::Array(items) = value else {
            return Err(AbiError::TypeMismatch {
                expected: format!("{elem}[]"),
                found: value.kind_name().to_string(),
            });
        };
        let count = u32::try_from(items.len()).map_err(|_| AbiError::TypeMismatch {
            expected: "array shorter than 4G elements".into(),
            found: format!("{} elements", items.len()),
        })?;
        if items.is_empty() {
            return Ok((0, ptr::null_mut()));
        }
        let stride = elem.layout().size;
        let data = self.scratch(Layout::new(stride * items.len(), elem.layout().align));
        for (i, item) in items.iter().enumerate() {
            unsafe { self.write(data.add(i * stride), item, elem)? };
        }
        Ok((count, data))
    }

    /// Read a `desc` value from `src`.
    ///
    /// # Safety
    /// `src` must be readable for `desc.layout().size` bytes and hold a valid value.
    pub(crate) unsafe fn read(
        &self,
        src: *const u8,
        desc: &TypeDescriptor,
        ownership: Ownership,
    ) -> Result<Value> {
        use PrimitiveKind as P;
        use TypeDescriptor as D;

        unsafe {
            Ok(match desc {
                D::Primitive(P::Void) => Value::Unit,
                D::Primitive(P::Boolean) => Value::Bool(get::<u8>(src) != 0),
                D::Primitive(P::Char16) => Value::Char16(get(src)),
                D::Primitive(P::UInt8) => Value::U8(get(src)),
                D::Primitive(P::Int16) => Value::I16(get(src)),
                D::Primitive(P::UInt16) => Value::U16(get(src)),
                D::Primitive(P::Int32) => Value::I32(get(src)),
                D::Primitive(P::UInt32) => Value::U32(get(src)),
                D::Primitive(P::Int64) => Value::I64(get(src)),
                D::Primitive(P::UInt64) => Value::U64(get(src)),
                D::Primitive(P::Single) => Value::F32(get(src)),
                D::Primitive(P::Double) => Value::F64(get(src)),
                D::Primitive(P::Guid) => Value::Guid(get(src)),
                D::Primitive(P::String) => {
                    let handle: HStringHandle = get(src);
                    let text = self.strings.read(handle);
                    if ownership == Ownership::Owned {
                        self.strings.delete(handle);
                    }
                    Value::String(text?)
                }
                D::Enum { .. } => Value::Enum(get(src)),
                D::Primitive(P::Object)
                | D::Interface { .. }
                | D::Delegate { .. }
                | D::Class { .. }
                | D::Parameterized { .. } => {
                    let raw: *mut c_void = get(src);
                    Value::Object(match ownership {
                        Ownership::Owned => ComObject::from_raw(raw),
                        Ownership::Borrowed => ComObject::from_borrowed(raw),
                    })
                }
                D::Struct { fields, .. } => {
                    let (offsets, _) = struct_layout(fields);
                    let mut values = Vec::with_capacity(fields.len());
                    for (field, offset) in fields.iter().zip(offsets) {
                        values.push(self.read(src.add(offset), field, ownership)?);
                    }
                    Value::Struct(values)
                }
                D::Reference(inner) => {
                    let target: *const u8 = get(src);
                    if target.is_null() {
                        return Err(AbiError::NullPointer("by-reference argument"));
                    }
                    self.read(target, inner, ownership)?
                }
                D::Array(_) => {
                    return Err(AbiError::TypeMismatch {
                        expected: "single native slot".into(),
                        found: desc.to_string(),
                    });
                }
            })
        }
    }

    /// Read `count` contiguous elements starting at `data`.
    ///
    /// # Safety
    /// `data` must be null (with `count == 0`) or point to `count` valid elements.
    pub(crate) unsafe fn read_array(
        &self,
        data: *const u8,
        count: u32,
        elem: &TypeDescriptor,
        ownership: Ownership,
    ) -> Result<Value> {
        if count == 0 {
            return Ok(Value::Array(Vec::new()));
        }
        if data.is_null() {
            return Err(AbiError::NullPointer("array data"));
        }
        let stride = elem.layout().size;
        let mut items = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            items.push(unsafe { self.read(data.add(i * stride), elem, ownership)? });
        }
        Ok(Value::Array(items))
    }
}

impl Drop for Marshaller<'_> {
    fn drop(&mut self) {
        for handle in self.temporaries.drain(..) {
            unsafe { self.strings.delete(handle) };
        }
    }
}

#[inline]
unsafe fn put<T>(dst: *mut u8, value: T) {
    unsafe { ptr::write_unaligned(dst.cast::<T>(), value) }
}

#[inline]
unsafe fn get<T>(src: *const u8) -> T {
    unsafe { ptr::read_unaligned(src.cast::<T>()) }
}
