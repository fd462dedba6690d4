#![allow(dead_code)]

use winrt_projection::{Catalog, TypeReference};

pub const COLLECTIONS: &str = "Windows.Foundation.Collections";
pub const FOUNDATION: &str = "Windows.Foundation";
pub const WIDGETS: &str = "Test.Widgets";

pub fn foundation() -> Catalog {
    Catalog::from_json_str(include_str!("../fixtures/foundation.json")).unwrap()
}

pub fn int32() -> TypeReference {
    TypeReference::system("Int32")
}

pub fn string() -> TypeReference {
    TypeReference::system("String")
}

pub fn object() -> TypeReference {
    TypeReference::system("Object")
}

pub fn collection(name: &str, args: impl IntoIterator<Item = TypeReference>) -> TypeReference {
    TypeReference::generic(COLLECTIONS, name, args)
}
