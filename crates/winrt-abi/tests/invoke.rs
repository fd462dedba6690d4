//! Tests for dynamic vtable calls against an in-process native object

use std::ffi::c_void;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use winrt_abi::com::{E_FAIL, E_INVALIDARG, E_NOINTERFACE, E_POINTER, IID_IAGILEOBJECT};
use winrt_abi::proc::winrt_interface;
use winrt_abi::{
    AbiError, AbiSignature, ComObject, HRESULT, HStringHandle, IID_IINSPECTABLE, IID_IUNKNOWN,
    IInspectableVTable, IUnknownVTable, InProcessStrings, PrimitiveKind, RefCount, Runtime, S_OK,
    StringPlatform, TrustLevel, TypeDescriptor, Value, GUID,
};

// =============================================================================
// Fake native object
// =============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    x: f32,
    y: f32,
}

#[winrt_interface("6b2e0f31-7d53-4a8e-9c1d-2f4a5b6c7d80")]
pub trait ICalculator {
    fn add(&self, a: i32, b: i32, result: *mut i32) -> HRESULT;
    fn concat(&self, a: HStringHandle, b: HStringHandle, result: *mut HStringHandle) -> HRESULT;
    fn sum(&self, count: u32, values: *const i32, result: *mut i32) -> HRESULT;
    fn fail(&self, result: *mut i32) -> HRESULT;
    fn negate(&self, value: u8, result: *mut u8) -> HRESULT;
    fn this(&self, result: *mut *mut c_void) -> HRESULT;
    fn div_rem(&self, a: i32, b: i32, remainder: *mut i32, quotient: *mut i32) -> HRESULT;
    fn offset(&self, point: Point, delta: f32, result: *mut Point) -> HRESULT;
    fn echo_guid(&self, value: GUID, result: *mut GUID) -> HRESULT;
    fn reset(&self) -> HRESULT;
}

#[repr(C)]
struct Calculator {
    vtable: *const ICalculatorVTable,
    refs: RefCount,
    strings: InProcessStrings,
    freed: Arc<AtomicBool>,
}

unsafe fn calc<'a>(this: *mut c_void) -> &'a Calculator {
    unsafe { &*(this as *const Calculator) }
}

unsafe extern "system" fn calc_query_interface(
    this: *mut c_void,
    riid: *const GUID,
    ppv: *mut *mut c_void,
) -> HRESULT {
    unsafe {
        if ppv.is_null() {
            return E_POINTER;
        }
        let iid = *riid;
        if iid == IID_IUNKNOWN || iid == IID_IINSPECTABLE || iid == IID_ICALCULATOR {
            calc(this).refs.add_ref();
            *ppv = this;
            return S_OK;
        }
        *ppv = ptr::null_mut();
        E_NOINTERFACE
    }
}

unsafe extern "system" fn calc_add_ref(this: *mut c_void) -> u32 {
    unsafe { calc(this).refs.add_ref() }
}

unsafe extern "system" fn calc_release(this: *mut c_void) -> u32 {
    unsafe {
        let remaining = calc(this).refs.release();
        if remaining == 0 {
            let object = Box::from_raw(this as *mut Calculator);
            object.freed.store(true, Ordering::SeqCst);
        }
        remaining
    }
}

unsafe extern "system" fn calc_get_iids(
    _this: *mut c_void,
    _count: *mut u32,
    _iids: *mut *mut GUID,
) -> HRESULT {
    E_FAIL
}

unsafe extern "system" fn calc_get_runtime_class_name(
    this: *mut c_void,
    name: *mut HStringHandle,
) -> HRESULT {
    unsafe {
        match calc(this).strings.create("Test.Calculator") {
            Ok(handle) => {
                *name = handle;
                S_OK
            }
            Err(_) => E_FAIL,
        }
    }
}

unsafe extern "system" fn calc_get_trust_level(_this: *mut c_void, level: *mut i32) -> HRESULT {
    unsafe { *level = TrustLevel::FullTrust as i32 };
    S_OK
}

unsafe extern "system" fn calc_add(_this: *mut c_void, a: i32, b: i32, result: *mut i32) -> HRESULT {
    unsafe { *result = a + b };
    S_OK
}

unsafe extern "system" fn calc_concat(
    this: *mut c_void,
    a: HStringHandle,
    b: HStringHandle,
    result: *mut HStringHandle,
) -> HRESULT {
    unsafe {
        let strings = &calc(this).strings;
        let (Ok(a), Ok(b)) = (strings.read(a), strings.read(b)) else {
            return E_INVALIDARG;
        };
        match strings.create(&format!("{a}{b}")) {
            Ok(handle) => {
                *result = handle;
                S_OK
            }
            Err(_) => E_FAIL,
        }
    }
}

unsafe extern "system" fn calc_sum(
    _this: *mut c_void,
    count: u32,
    values: *const i32,
    result: *mut i32,
) -> HRESULT {
    unsafe {
        let values = if count == 0 {
            &[][..]
        } else {
            std::slice::from_raw_parts(values, count as usize)
        };
        *result = values.iter().sum();
    }
    S_OK
}

unsafe extern "system" fn calc_fail(_this: *mut c_void, result: *mut i32) -> HRESULT {
    unsafe { *result = 42 };
    E_INVALIDARG
}

unsafe extern "system" fn calc_negate(_this: *mut c_void, value: u8, result: *mut u8) -> HRESULT {
    unsafe { *result = u8::from(value == 0) };
    S_OK
}

unsafe extern "system" fn calc_this(this: *mut c_void, result: *mut *mut c_void) -> HRESULT {
    unsafe {
        calc(this).refs.add_ref();
        *result = this;
    }
    S_OK
}

unsafe extern "system" fn calc_div_rem(
    _this: *mut c_void,
    a: i32,
    b: i32,
    remainder: *mut i32,
    quotient: *mut i32,
) -> HRESULT {
    if b == 0 {
        return E_INVALIDARG;
    }
    unsafe {
        *remainder = a % b;
        *quotient = a / b;
    }
    S_OK
}

unsafe extern "system" fn calc_offset(
    _this: *mut c_void,
    point: Point,
    delta: f32,
    result: *mut Point,
) -> HRESULT {
    unsafe {
        *result = Point {
            x: point.x + delta,
            y: point.y + delta,
        }
    };
    S_OK
}

unsafe extern "system" fn calc_echo_guid(_this: *mut c_void, value: GUID, result: *mut GUID) -> HRESULT {
    unsafe { *result = value };
    S_OK
}

unsafe extern "system" fn calc_reset(_this: *mut c_void) -> HRESULT {
    S_OK
}

static CALCULATOR_VTABLE: ICalculatorVTable = ICalculatorVTable {
    base: IInspectableVTable {
        base: IUnknownVTable {
            query_interface: calc_query_interface,
            add_ref: calc_add_ref,
            release: calc_release,
        },
        get_iids: calc_get_iids,
        get_runtime_class_name: calc_get_runtime_class_name,
        get_trust_level: calc_get_trust_level,
    },
    add: calc_add,
    concat: calc_concat,
    sum: calc_sum,
    fail: calc_fail,
    negate: calc_negate,
    this: calc_this,
    div_rem: calc_div_rem,
    offset: calc_offset,
    echo_guid: calc_echo_guid,
    reset: calc_reset,
};

fn new_calculator() -> (ComObject, Arc<AtomicBool>) {
    let freed = Arc::new(AtomicBool::new(false));
    let object = Box::new(Calculator {
        vtable: &CALCULATOR_VTABLE,
        refs: RefCount::new(),
        strings: InProcessStrings,
        freed: Arc::clone(&freed),
    });
    let raw = Box::into_raw(object) as *mut c_void;
    (unsafe { ComObject::from_raw(raw) }, freed)
}

fn ref_count(object: &ComObject) -> u32 {
    unsafe { calc(object.as_raw()).refs.count() }
}

fn prim(kind: PrimitiveKind) -> TypeDescriptor {
    TypeDescriptor::Primitive(kind)
}

fn point_descriptor() -> TypeDescriptor {
    TypeDescriptor::Struct {
        name: "Test.Point".into(),
        fields: vec![prim(PrimitiveKind::Single), prim(PrimitiveKind::Single)],
    }
}

// =============================================================================
// Test: calls by descriptor
// =============================================================================

#[test]
fn test_invoke_int_method() {
    let (calculator, _) = new_calculator();
    let runtime = Runtime::in_process();
    let signature = AbiSignature::new(
        vec![prim(PrimitiveKind::Int32), prim(PrimitiveKind::Int32)],
        prim(PrimitiveKind::Int32),
    );

    let result = runtime
        .invoke(&calculator, 0, &signature, &mut [Value::I32(40), Value::I32(2)])
        .unwrap();
    assert_eq!(result, Value::I32(42));
}

#[test]
fn test_invoke_string_method() {
    let (calculator, _) = new_calculator();
    let runtime = Runtime::in_process();
    let signature = AbiSignature::new(
        vec![prim(PrimitiveKind::String), prim(PrimitiveKind::String)],
        prim(PrimitiveKind::String),
    );

    let mut args = [Value::String("Grüße, ".into()), Value::String("世界".into())];
    let result = runtime.invoke(&calculator, 1, &signature, &mut args).unwrap();
    assert_eq!(result, Value::String("Grüße, 世界".into()));

    let mut empty = [Value::String(String::new()), Value::String(String::new())];
    let result = runtime.invoke(&calculator, 1, &signature, &mut empty).unwrap();
    assert_eq!(result, Value::String(String::new()));
}

#[test]
fn test_invoke_array_argument() {
    let (calculator, _) = new_calculator();
    let runtime = Runtime::in_process();
    let signature = AbiSignature::new(
        vec![TypeDescriptor::Array(Box::new(prim(PrimitiveKind::Int32)))],
        prim(PrimitiveKind::Int32),
    );

    let values = (1..=10).map(Value::I32).collect();
    let result = runtime
        .invoke(&calculator, 2, &signature, &mut [Value::Array(values)])
        .unwrap();
    assert_eq!(result, Value::I32(55));

    let result = runtime
        .invoke(&calculator, 2, &signature, &mut [Value::Array(vec![])])
        .unwrap();
    assert_eq!(result, Value::I32(0));
}

#[test]
fn test_failure_code_is_reported_without_reading_output() {
    let (calculator, _) = new_calculator();
    let runtime = Runtime::in_process();
    let signature = AbiSignature::new(vec![], prim(PrimitiveKind::Int32));

    let err = runtime.invoke(&calculator, 3, &signature, &mut []).unwrap_err();
    match err {
        AbiError::NativeCallFailure { code } => assert_eq!(code, E_INVALIDARG),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_boolean_crosses_as_byte() {
    let (calculator, _) = new_calculator();
    let runtime = Runtime::in_process();
    let signature = AbiSignature::new(
        vec![prim(PrimitiveKind::Boolean)],
        prim(PrimitiveKind::Boolean),
    );

    let result = runtime
        .invoke(&calculator, 4, &signature, &mut [Value::Bool(false)])
        .unwrap();
    assert_eq!(result, Value::Bool(true));
}

#[test]
fn test_object_return_takes_ownership() {
    let (calculator, freed) = new_calculator();
    let runtime = Runtime::in_process();
    let signature = AbiSignature::new(vec![], prim(PrimitiveKind::Object));

    let result = runtime.invoke(&calculator, 5, &signature, &mut []).unwrap();
    assert_eq!(ref_count(&calculator), 2);
    let Value::Object(same) = result else {
        panic!("expected an object");
    };
    assert_eq!(same, calculator);

    drop(same);
    assert_eq!(ref_count(&calculator), 1);
    drop(calculator);
    assert!(freed.load(Ordering::SeqCst));
}

#[test]
fn test_by_reference_argument_is_written_back() {
    let (calculator, _) = new_calculator();
    let runtime = Runtime::in_process();
    let signature = AbiSignature::new(
        vec![
            prim(PrimitiveKind::Int32),
            prim(PrimitiveKind::Int32),
            TypeDescriptor::Reference(Box::new(prim(PrimitiveKind::Int32))),
        ],
        prim(PrimitiveKind::Int32),
    );

    let mut args = [Value::I32(17), Value::I32(5), Value::Unit];
    let quotient = runtime.invoke(&calculator, 6, &signature, &mut args).unwrap();
    assert_eq!(quotient, Value::I32(3));
    assert_eq!(args[2], Value::I32(2));
}

#[test]
fn test_struct_by_value() {
    let (calculator, _) = new_calculator();
    let runtime = Runtime::in_process();
    let signature = AbiSignature::new(
        vec![point_descriptor(), prim(PrimitiveKind::Single)],
        point_descriptor(),
    );

    let mut args = [
        Value::Struct(vec![Value::F32(1.0), Value::F32(2.5)]),
        Value::F32(0.5),
    ];
    let result = runtime.invoke(&calculator, 7, &signature, &mut args).unwrap();
    assert_eq!(result, Value::Struct(vec![Value::F32(1.5), Value::F32(3.0)]));
}

#[test]
fn test_guid_by_value() {
    let (calculator, _) = new_calculator();
    let runtime = Runtime::in_process();
    let signature = AbiSignature::new(vec![prim(PrimitiveKind::Guid)], prim(PrimitiveKind::Guid));

    let result = runtime
        .invoke(&calculator, 8, &signature, &mut [Value::Guid(IID_ICALCULATOR)])
        .unwrap();
    assert_eq!(result, Value::Guid(IID_ICALCULATOR));
}

#[test]
fn test_void_method() {
    let (calculator, _) = new_calculator();
    let runtime = Runtime::in_process();
    let signature = AbiSignature::new(vec![], TypeDescriptor::VOID);
    assert_eq!(
        runtime.invoke(&calculator, 9, &signature, &mut []).unwrap(),
        Value::Unit
    );
}

#[test]
fn test_mismatches_rejected_before_call() {
    let (calculator, _) = new_calculator();
    let runtime = Runtime::in_process();
    let signature = AbiSignature::new(
        vec![prim(PrimitiveKind::Int32), prim(PrimitiveKind::Int32)],
        prim(PrimitiveKind::Int32),
    );

    let err = runtime
        .invoke(&calculator, 0, &signature, &mut [Value::I32(1)])
        .unwrap_err();
    assert!(matches!(err, AbiError::ArgumentCount { expected: 2, found: 1 }));

    let err = runtime
        .invoke(
            &calculator,
            0,
            &signature,
            &mut [Value::I32(1), Value::String("2".into())],
        )
        .unwrap_err();
    assert!(matches!(err, AbiError::TypeMismatch { .. }));
}

// =============================================================================
// Test: object handle
// =============================================================================

#[test]
fn test_clone_and_drop_adjust_ref_count() {
    let (calculator, freed) = new_calculator();
    assert_eq!(ref_count(&calculator), 1);

    let copy = calculator.clone();
    assert_eq!(ref_count(&calculator), 2);
    drop(copy);
    assert_eq!(ref_count(&calculator), 1);

    let raw = calculator.into_raw();
    assert!(!freed.load(Ordering::SeqCst));
    drop(unsafe { ComObject::from_raw(raw) });
    assert!(freed.load(Ordering::SeqCst));
}

#[test]
fn test_query_interface_and_try_cast() {
    let (calculator, _) = new_calculator();

    let inspectable = calculator.query_interface(&IID_IINSPECTABLE).unwrap();
    assert_eq!(inspectable, calculator);
    assert_eq!(ref_count(&calculator), 2);
    drop(inspectable);

    let err = calculator.query_interface(&IID_IAGILEOBJECT).unwrap_err();
    assert!(matches!(err, AbiError::NoSuchInterface { iid } if iid == IID_IAGILEOBJECT));

    assert!(calculator.try_cast(&IID_IAGILEOBJECT).unwrap().is_none());
    assert!(calculator.try_cast(&IID_ICALCULATOR).unwrap().is_some());
    assert_eq!(ref_count(&calculator), 1);
}

#[test]
fn test_inspectable_calls() {
    let (calculator, _) = new_calculator();
    let strings = InProcessStrings;
    assert_eq!(
        calculator.runtime_class_name(&strings).unwrap(),
        "Test.Calculator"
    );
    assert_eq!(calculator.trust_level().unwrap(), TrustLevel::FullTrust);
}

// =============================================================================
// Test: generated wrapper
// =============================================================================

#[test]
fn test_generated_wrapper_calls_through_vtable() {
    let (calculator, _) = new_calculator();
    let iface = unsafe { ICalculator::from_raw(calculator.as_raw()) };

    let mut result = 0;
    let hr = unsafe { iface.add(2, 3, &mut result) };
    assert_eq!(hr, S_OK);
    assert_eq!(result, 5);

    let mut level = 0;
    let hr = unsafe { iface.as_inspectable().get_trust_level(&mut level) };
    assert_eq!(hr, S_OK);
    assert_eq!(level, TrustLevel::FullTrust as i32);
}
