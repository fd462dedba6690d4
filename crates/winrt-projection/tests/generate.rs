//! End-to-end generation over the foundation fixture

mod common;

use common::*;
use winrt_abi::GUID;
use winrt_abi::marshal::{PrimitiveKind, TypeDescriptor};
use winrt_abi::vtable::{DELEGATE_INVOKE_SLOT, method_slot};
use winrt_projection::{GenerationOptions, ProjectionError, generate};

fn iid(text: &str) -> GUID {
    GUID::parse(text).unwrap()
}

#[test]
fn test_generation_summary() {
    let output = generate(&foundation(), &GenerationOptions::default()).unwrap();
    assert_eq!(output.entities.len(), 6);
    assert_eq!(output.projections.len(), 10);
    assert_eq!(output.rounds, 4);
    assert!(output.failures.is_empty(), "{:?}", output.failures);

    let names: Vec<String> = output.entities.iter().map(|e| e.full_name()).collect();
    assert_eq!(
        names,
        [
            "Test.Widgets.ChangedHandler",
            "Test.Widgets.Color",
            "Test.Widgets.IWidget",
            "Test.Widgets.Point",
            "Test.Widgets.Widget",
            "Windows.Foundation.IStringable",
        ]
    );
}

#[test]
fn test_vector_projection_binding() {
    let output = generate(&foundation(), &GenerationOptions::default()).unwrap();
    let vector = output.projection("IVector_Int32_").unwrap();

    assert_eq!(vector.iid, iid("b939af5b-b45d-5489-9149-61442c1905fe"));
    assert_eq!(
        vector.signature,
        "pinterface({913337e9-11a1-4345-a3a2-4e7f956e222d};i4)"
    );
    assert_eq!(vector.methods.len(), 12);

    let append = vector.method("Append").unwrap();
    assert_eq!(append.slot, 13);
    assert_eq!(append.slot, method_slot(7));
    assert_eq!(
        append.signature.params,
        [TypeDescriptor::Primitive(PrimitiveKind::Int32)]
    );
    assert!(append.signature.ret.is_void());

    let index_of = vector.method("IndexOf").unwrap();
    assert_eq!(
        index_of.signature.params[1],
        TypeDescriptor::Reference(Box::new(TypeDescriptor::Primitive(PrimitiveKind::UInt32)))
    );

    let view = vector.method("GetView").unwrap();
    assert_eq!(
        view.signature.ret.iid(),
        Some(iid("8d720cdf-3934-5d3f-9a55-40e8063b086a"))
    );
}

#[test]
fn test_projected_entities_carry_their_own_identifier() {
    let output = generate(&foundation(), &GenerationOptions::default()).unwrap();
    for projection in &output.projections {
        assert_eq!(
            projection.entity.guid(),
            Some(projection.iid),
            "{}",
            projection.entity.name()
        );
    }

    let vector = output.projection("IVector_Int32_").unwrap();
    assert_eq!(
        vector.entity.guid(),
        Some(iid("b939af5b-b45d-5489-9149-61442c1905fe"))
    );
    let handler = output.projection("TypedEventHandler_Object_Object_").unwrap();
    assert_eq!(
        handler.entity.guid(),
        Some(iid("c7e65ce2-fad5-5e3b-9c58-186ca8c1dd57"))
    );
}

#[test]
fn test_map_and_handler_projections() {
    let output = generate(&foundation(), &GenerationOptions::default()).unwrap();

    let map = output.projection("IMap_String_Int32_").unwrap();
    assert_eq!(map.iid, iid("ae681871-dd82-5299-93ea-0275e4e073e7"));
    let pair = output.projection("IKeyValuePair_String_Int32_").unwrap();
    assert_eq!(pair.iid, iid("40e7e72d-cbab-588b-a227-9e60532f0121"));
    assert_eq!(pair.method("get_Value").unwrap().slot, method_slot(1));

    let handler = output.projection("TypedEventHandler_Object_Object_").unwrap();
    assert_eq!(handler.iid, iid("c7e65ce2-fad5-5e3b-9c58-186ca8c1dd57"));
    let invoke = handler.method("Invoke").unwrap();
    assert_eq!(invoke.slot, DELEGATE_INVOKE_SLOT);
    assert_eq!(invoke.signature.params.len(), 2);
    assert!(invoke.signature.params.iter().all(TypeDescriptor::is_object));
}

#[test]
fn test_concrete_entity_binding() {
    let output = generate(&foundation(), &GenerationOptions::default()).unwrap();

    let widget = output.entity("Test.Widgets.IWidget").unwrap();
    assert_eq!(widget.iid, Some(iid("4b8c3e1a-2d6f-4a90-8c7e-1f2a3b4c5d6e")));
    let slots: Vec<usize> = widget.methods.iter().map(|m| m.slot).collect();
    assert_eq!(slots, [6, 7, 8, 9, 10, 11]);

    let origin = widget.method("get_Origin").unwrap();
    assert!(matches!(origin.signature.ret, TypeDescriptor::Struct { ref fields, .. } if fields.len() == 2));
    let subscribe = widget.method("Subscribe").unwrap();
    assert_eq!(
        subscribe.signature.params[0].iid(),
        Some(iid("0d9e8f7a-6b5c-4d3e-a2f1-0e9d8c7b6a59"))
    );

    let class = output.entity("Test.Widgets.Widget").unwrap();
    assert_eq!(class.iid, widget.iid);
    assert!(class.methods.is_empty());

    let point = output.entity("Test.Widgets.Point").unwrap();
    assert_eq!(point.iid, None);
    assert_eq!(point.signature.as_deref(), Some("struct(Test.Widgets.Point;f4;f4)"));
}

#[test]
fn test_sequential_generation_matches_parallel() {
    let catalog = foundation();
    let parallel = generate(&catalog, &GenerationOptions::default()).unwrap();
    let options = GenerationOptions::from_json_str(r#"{ "parallel": false }"#).unwrap();
    assert_eq!(options.max_closure_rounds, 64);
    let sequential = generate(&catalog, &options).unwrap();

    let ids = |output: &winrt_projection::GenerationOutput| {
        output
            .projections
            .iter()
            .map(|p| (p.entity.name().to_string(), p.iid))
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&parallel), ids(&sequential));
}

#[test]
fn test_unbindable_entities_are_reported() {
    let catalog = winrt_projection::Catalog::from_json_str(
        r#"[
        { "Type": "Interface", "Name": "IBroken", "Namespace": "Test",
          "Guid": "2a1b2c3d-4e5f-4071-8293-a4b5c6d7e8f9",
          "Methods": [{ "Name": "get_Missing", "ReturnType": { "Name": "Missing", "Namespace": "Test" } }] },
        { "Type": "Class", "Name": "Loose", "Namespace": "Test" },
        { "Type": "Interface", "Name": "IFine", "Namespace": "Test",
          "Guid": "3a1b2c3d-4e5f-4071-8293-a4b5c6d7e8f9",
          "Methods": [{ "Name": "Ping" }] }
    ]"#,
    )
    .unwrap();
    let output = generate(&catalog, &GenerationOptions::default()).unwrap();

    assert_eq!(output.failures.len(), 1);
    assert_eq!(output.failures[0].name, "Test.IBroken");
    assert!(matches!(
        output.failures[0].error,
        ProjectionError::UnresolvedType { .. }
    ));

    let loose = output.entity("Test.Loose").unwrap();
    assert_eq!(loose.iid, None);
    assert_eq!(output.entity("Test.IFine").unwrap().methods[0].slot, 6);
}

#[test]
fn test_round_limit_from_options() {
    let options = GenerationOptions::from_json_str(r#"{ "max_closure_rounds": 2 }"#).unwrap();
    assert!(options.parallel);
    let err = generate(&foundation(), &options).unwrap_err();
    assert!(matches!(err, ProjectionError::ClosureDidNotConverge { rounds: 2 }));
}

#[test]
fn test_malformed_options() {
    let err = GenerationOptions::from_json_str(r#"{ "parallel": "yes" }"#).unwrap_err();
    assert!(matches!(err, ProjectionError::Json { .. }));
}
