//! Closure tests over the foundation fixture catalog

mod common;

use common::*;
use indexmap::IndexMap;
use proptest::prelude::*;
use winrt_projection::{
    Catalog, Entity, ProjectionEngine, ProjectionError, ProjectionRequest, Resolver, TypeKey,
    TypeReference, project, projected_name,
};

fn run(catalog: &Catalog) -> winrt_projection::ProjectionSet {
    ProjectionEngine::new(Resolver::new(catalog)).run().unwrap()
}

fn projected_names(set: &winrt_projection::ProjectionSet) -> Vec<String> {
    let mut names: Vec<String> = set.iter().map(|(_, e)| e.name().to_string()).collect();
    names.sort();
    names
}

#[test]
fn test_seeds_come_from_concrete_entities() {
    let catalog = foundation();
    let seeds = ProjectionEngine::new(Resolver::new(&catalog)).seeds();
    let mut names: Vec<String> = seeds.iter().map(ProjectionRequest::projected_name).collect();
    names.sort();
    assert_eq!(
        names,
        [
            "IMap_String_Int32_",
            "IVector_Int32_",
            "TypedEventHandler_Object_Object_"
        ]
    );
}

#[test]
fn test_closure_contents() {
    let catalog = foundation();
    let set = run(&catalog);

    assert_eq!(
        projected_names(&set),
        [
            "IIterable_IKeyValuePair_String_Int32__",
            "IIterable_Int32_",
            "IIterator_IKeyValuePair_String_Int32__",
            "IIterator_Int32_",
            "IKeyValuePair_String_Int32_",
            "IMapView_String_Int32_",
            "IMap_String_Int32_",
            "IVectorView_Int32_",
            "IVector_Int32_",
            "TypedEventHandler_Object_Object_",
        ]
    );
    assert_eq!(set.rounds(), 4);
    assert!(set.failures().is_empty());
}

#[test]
fn test_closure_is_sequentially_identical() {
    let catalog = foundation();
    let parallel = run(&catalog);
    let sequential = ProjectionEngine::new(Resolver::new(&catalog))
        .with_parallel(false)
        .run()
        .unwrap();
    assert_eq!(projected_names(&parallel), projected_names(&sequential));
    assert_eq!(parallel.rounds(), sequential.rounds());
}

#[test]
fn test_projected_vector_is_substituted() {
    let catalog = foundation();
    let set = run(&catalog);
    let request = ProjectionRequest::from_reference(&collection("IVector`1", [int32()])).unwrap();
    let Some(Entity::Interface(vector)) = set.get(&request) else {
        panic!("IVector<Int32> was not projected");
    };

    assert_eq!(vector.name, "IVector_Int32_");
    assert_eq!(vector.methods.len(), 12);
    assert_eq!(vector.methods[0].return_type, int32());
    assert_eq!(vector.super_interfaces.len(), 1);
    assert_eq!(projected_name(&vector.super_interfaces[0]), "IIterable_Int32_");

    let get_many = vector.methods.iter().find(|m| m.name == "GetMany").unwrap();
    let items = &get_many.parameters[1].ty;
    assert!(items.is_array_type());
    assert_eq!(items.bare_name(), "Int32");

    let params = vector.generic_parameters.as_ref().unwrap();
    assert_eq!(params[0].bound.as_ref(), Some(&int32()));
}

#[test]
fn test_by_reference_self_mention_is_deduplicated() {
    let catalog = foundation();
    let set = run(&catalog);
    let request = ProjectionRequest::from_reference(&collection(
        "IMapView`2",
        [string(), int32()],
    ))
    .unwrap();
    let Some(Entity::Interface(view)) = set.get(&request) else {
        panic!("IMapView<String, Int32> was not projected");
    };
    let split = view.methods.iter().find(|m| m.name == "Split").unwrap();
    assert!(split.parameters[0].ty.is_by_reference());
    assert_eq!(
        set.requests()
            .filter(|r| r.target == TypeKey::new(COLLECTIONS, "IMapView`2"))
            .count(),
        1
    );
}

#[test]
fn test_closure_is_idempotent() {
    let catalog = foundation();
    let engine = ProjectionEngine::new(Resolver::new(&catalog));
    let first = engine.run().unwrap();
    let again = engine.close(first.requests().cloned()).unwrap();

    assert_eq!(projected_names(&first), projected_names(&again));
    // everything was already discovered, so a single round suffices
    assert_eq!(again.rounds(), 1);
}

#[test]
fn test_project_rejects_concrete_entity() {
    let catalog = foundation();
    let widget = catalog.get(WIDGETS, "IWidget").unwrap();
    let err = project(widget, &IndexMap::new()).unwrap_err();
    assert!(matches!(err, ProjectionError::NotProjectable { kind: "interface", .. }));

    let point = catalog.get(WIDGETS, "Point").unwrap();
    let err = project(point, &IndexMap::new()).unwrap_err();
    assert!(matches!(err, ProjectionError::NotProjectable { kind: "struct", .. }));
}

#[test]
fn test_project_delegate() {
    let catalog = foundation();
    let handler = catalog.get(FOUNDATION, "TypedEventHandler`2").unwrap();
    let bindings = IndexMap::from([
        ("TSender".to_string(), object()),
        ("TResult".to_string(), string()),
    ]);
    let Entity::Delegate(projected) = project(handler, &bindings).unwrap() else {
        panic!("expected a delegate");
    };
    assert_eq!(projected.name, "TypedEventHandler_Object_String_");
    assert_eq!(projected.parameters[0].ty, object());
    assert_eq!(projected.parameters[1].ty, string());
    assert!(projected.return_type.is_void());
}

#[test]
fn test_argument_count_mismatch_is_a_failure() {
    let catalog = foundation();
    let engine = ProjectionEngine::new(Resolver::new(&catalog));
    let request = ProjectionRequest::from_reference(&collection("IVector`1", [int32(), string()]))
        .unwrap();
    let set = engine.close([request]).unwrap();
    assert!(set.is_empty());
    assert!(matches!(
        set.failures()[0].1,
        ProjectionError::OpenGeneric { .. }
    ));
}

#[test]
fn test_unresolved_target_is_a_failure() {
    let catalog = foundation();
    let engine = ProjectionEngine::new(Resolver::new(&catalog));
    let request = ProjectionRequest::from_reference(&collection("IObservableVector`1", [int32()]))
        .unwrap();
    let set = engine.close([request]).unwrap();
    assert!(set.is_empty());
    assert!(matches!(
        set.failures()[0].1,
        ProjectionError::UnresolvedType { .. }
    ));
}

/// A generic interface whose method returns itself nested one level deeper
/// never stops producing new instantiations.
#[test]
fn test_growing_catalog_does_not_converge() {
    let catalog = Catalog::from_json_str(
        r#"[
        { "Type": "Interface", "Name": "INest`1", "Namespace": "Test",
          "Guid": "0a1b2c3d-4e5f-4071-8293-a4b5c6d7e8f9",
          "GenericParameters": [{ "Name": "T", "Position": 0 }],
          "Methods": [{ "Name": "Deeper", "ReturnType":
            { "Name": "INest`1", "Namespace": "Test", "GenericParameters": [
              { "Name": "T", "Position": 0, "Type":
                { "Name": "INest`1", "Namespace": "Test", "GenericParameters": [
                  { "Name": "T", "Position": 0, "Type": { "Name": "T", "Namespace": "" } } ] } } ] } }] },
        { "Type": "Interface", "Name": "IRoot", "Namespace": "Test",
          "Guid": "1a1b2c3d-4e5f-4071-8293-a4b5c6d7e8f9",
          "Methods": [{ "Name": "Start", "ReturnType":
            { "Name": "INest`1", "Namespace": "Test", "GenericParameters": [
              { "Name": "T", "Position": 0, "Type": { "Name": "Int32", "Namespace": "System" } } ] } }] }
    ]"#,
    )
    .unwrap();

    let err = ProjectionEngine::new(Resolver::new(&catalog))
        .with_max_rounds(8)
        .run()
        .unwrap_err();
    assert!(matches!(err, ProjectionError::ClosureDidNotConverge { rounds: 8 }));
}

fn bound_type() -> impl Strategy<Value = TypeReference> {
    prop_oneof![
        Just(int32()),
        Just(string()),
        Just(object()),
        Just(TypeReference::system("Boolean")),
        Just(TypeReference::new(WIDGETS, "Point")),
    ]
}

proptest! {
    #[test]
    fn prop_permuted_requests_collapse(
        a in bound_type(),
        b in bound_type(),
        names in prop::sample::subsequence(vec!["K", "V", "T0", "T1", "Key", "Value"], 2),
    ) {
        let target = TypeKey::new(COLLECTIONS, "IMap`2");
        let forward = ProjectionRequest::new(
            target.clone(),
            IndexMap::from([("K".to_string(), a.clone()), ("V".to_string(), b.clone())]),
        );
        let reversed = ProjectionRequest::new(
            target,
            IndexMap::from([(names[0].to_string(), b), (names[1].to_string(), a)]),
        );
        prop_assert_eq!(&forward, &reversed);

        let set: std::collections::HashSet<_> = [forward, reversed].into_iter().collect();
        prop_assert_eq!(set.len(), 1);
    }
}
