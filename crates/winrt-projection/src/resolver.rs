//! Type resolution against a catalog

use log::trace;

use crate::catalog::Catalog;
use crate::error::{ProjectionError, Result};
use crate::model::{Entity, TypeKey, TypeReference};

/// The catalog key a reference is looked up under.
///
/// `&` and `[]` suffixes are dropped. A projected name such as
/// `IVector_Int32_` on a reference with generic arguments maps back to the
/// open generic `IVector`1`. Names that already carry a backtick arity are
/// catalog names and are kept as they are.
#[must_use]
pub fn normalize(reference: &TypeReference) -> TypeKey {
    let name = reference.bare_name();
    let arity = reference.generic_arguments.as_ref().map_or(0, Vec::len);
    let name = match name.split_once('_') {
        Some((base, _)) if arity > 0 && !name.contains('`') => format!("{base}`{arity}"),
        _ => name.to_string(),
    };
    TypeKey::new(&reference.namespace, name)
}

/// Open generic keys a projected name could come from, shortest base first.
///
/// `Legacy_Box_Int32_` with one argument yields `Legacy`1` then `Legacy_Box`1`.
fn projected_bases(reference: &TypeReference) -> Vec<TypeKey> {
    let name = reference.bare_name();
    let arity = reference.generic_arguments.as_ref().map_or(0, Vec::len);
    if arity == 0 || name.contains('`') {
        return Vec::new();
    }
    name.match_indices('_')
        .map(|(i, _)| TypeKey::new(&reference.namespace, format!("{}`{arity}", &name[..i])))
        .collect()
}

/// Explicit lookup context passed to every projection and identifier operation.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    catalog: &'a Catalog,
}

impl<'a> Resolver<'a> {
    #[must_use]
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    #[must_use]
    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    /// The entity `reference` names.
    ///
    /// Primitives are never catalog entries and resolve to
    /// [`ProjectionError::UnresolvedType`]; test
    /// [`TypeReference::is_primitive`] first.
    pub fn resolve(&self, reference: &TypeReference) -> Result<&'a Entity> {
        let exact = TypeKey::new(&reference.namespace, reference.bare_name());
        let found = std::iter::once(exact)
            .chain(projected_bases(reference))
            .find_map(|key| self.catalog.get_key(&key).map(|entity| (key, entity)));
        match found {
            Some((key, entity)) => {
                trace!("resolved {reference} to {key}");
                Ok(entity)
            }
            None => {
                let key = normalize(reference);
                Err(ProjectionError::UnresolvedType {
                    namespace: key.namespace,
                    name: key.name,
                })
            }
        }
    }
}
