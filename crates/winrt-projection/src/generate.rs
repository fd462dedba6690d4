//! The generation pass
//!
//! Binds every concrete catalog entity and every projected instantiation to
//! its identifier, signature and vtable slots. This is what an emission
//! backend consumes.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use winrt_abi::GUID;
use winrt_abi::marshal::AbiSignature;
use winrt_abi::vtable::{DELEGATE_INVOKE_SLOT, method_slot};

use crate::catalog::Catalog;
use crate::error::{ProjectionError, Result};
use crate::model::Entity;
use crate::projection::{DEFAULT_MAX_ROUNDS, ProjectionEngine, ProjectionRequest, fan_out};
use crate::resolver::Resolver;
use crate::signature::IdentifierGenerator;

/// Generation settings.
///
/// ```json
/// { "max_closure_rounds": 64, "parallel": true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    /// Closure rounds before the catalog is reported as cyclic.
    pub max_closure_rounds: usize,
    /// Fan work out on the rayon pool.
    pub parallel: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_closure_rounds: DEFAULT_MAX_ROUNDS,
            parallel: true,
        }
    }
}

impl GenerationOptions {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|source| ProjectionError::Json {
            origin: "generation options".to_string(),
            source,
        })
    }
}

/// A vtable method with its slot and native signature.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundMethod {
    pub name: String,
    pub slot: usize,
    pub signature: AbiSignature,
}

/// A concrete catalog entity ready for emission.
#[derive(Debug, Clone)]
pub struct BoundEntity {
    pub entity: Entity,
    /// Interface id for interfaces and delegates, default interface id for
    /// classes that have one.
    pub iid: Option<GUID>,
    pub signature: Option<String>,
    pub methods: Vec<BoundMethod>,
}

impl BoundEntity {
    #[must_use]
    pub fn full_name(&self) -> String {
        self.entity.full_name()
    }

    #[must_use]
    pub fn method(&self, name: &str) -> Option<&BoundMethod> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// A concrete instantiation of a generic interface or delegate.
#[derive(Debug, Clone)]
pub struct ProjectedEntity {
    pub request: ProjectionRequest,
    /// The projected entity, renamed to its projected name and carrying
    /// `iid` as its identifier.
    pub entity: Entity,
    pub iid: GUID,
    pub signature: String,
    pub methods: Vec<BoundMethod>,
}

impl ProjectedEntity {
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&BoundMethod> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// An entity dropped from the output.
#[derive(Debug)]
pub struct GenerationFailure {
    pub name: String,
    pub error: ProjectionError,
}

/// Everything the generation pass produced, sorted by full name.
#[derive(Debug, Default)]
pub struct GenerationOutput {
    pub entities: Vec<BoundEntity>,
    pub projections: Vec<ProjectedEntity>,
    pub failures: Vec<GenerationFailure>,
    /// Closure rounds the projection engine ran.
    pub rounds: usize,
}

impl GenerationOutput {
    #[must_use]
    pub fn entity(&self, full_name: &str) -> Option<&BoundEntity> {
        self.entities.iter().find(|e| e.full_name() == full_name)
    }

    /// Look up a projection by projected name, e.g. `IVector_Int32_`.
    #[must_use]
    pub fn projection(&self, name: &str) -> Option<&ProjectedEntity> {
        self.projections.iter().find(|p| p.entity.name() == name)
    }
}

fn bind_methods(ids: &IdentifierGenerator<'_>, entity: &Entity) -> Result<Vec<BoundMethod>> {
    match entity {
        Entity::Interface(def) => def
            .methods
            .iter()
            .enumerate()
            .map(|(index, method)| {
                Ok(BoundMethod {
                    name: method.name.clone(),
                    slot: method_slot(index),
                    signature: ids.abi_signature(method)?,
                })
            })
            .collect(),
        Entity::Delegate(def) => {
            let invoke = def.invoke_method();
            Ok(vec![BoundMethod {
                signature: ids.abi_signature(&invoke)?,
                name: invoke.name,
                slot: DELEGATE_INVOKE_SLOT,
            }])
        }
        _ => Ok(Vec::new()),
    }
}

fn bind_entity(ids: &IdentifierGenerator<'_>, entity: &Entity) -> Result<BoundEntity> {
    let reference = entity.as_reference();
    let (iid, signature) = match entity {
        Entity::Interface(_) | Entity::Delegate(_) => (
            Some(ids.identifier(&reference)?),
            Some(ids.signature(&reference)?),
        ),
        Entity::Class(def) if def.default_interface().is_none() => (None, None),
        Entity::Class(_) => (
            Some(ids.identifier(&reference)?),
            Some(ids.signature(&reference)?),
        ),
        Entity::Enum(_) | Entity::Struct(_) => (None, Some(ids.signature(&reference)?)),
    };
    Ok(BoundEntity {
        methods: bind_methods(ids, entity)?,
        entity: entity.clone(),
        iid,
        signature,
    })
}

fn bind_projection(
    ids: &IdentifierGenerator<'_>,
    request: &ProjectionRequest,
    entity: &Entity,
) -> Result<ProjectedEntity> {
    let reference = request.to_reference();
    let iid = ids.identifier(&reference)?;
    // the projection inherits the generic's identifier, replace it with its own
    let mut entity = entity.clone();
    match &mut entity {
        Entity::Interface(def) => def.guid = iid,
        Entity::Delegate(def) => def.guid = iid,
        _ => {}
    }
    Ok(ProjectedEntity {
        signature: ids.signature(&reference)?,
        methods: bind_methods(ids, &entity)?,
        request: request.clone(),
        entity,
        iid,
    })
}

/// Run the generation pass over `catalog`.
///
/// Entities that fail to resolve or bind are left out and reported in
/// [`GenerationOutput::failures`]. A projection closure that does not
/// converge fails the whole pass.
pub fn generate(catalog: &Catalog, options: &GenerationOptions) -> Result<GenerationOutput> {
    let resolver = Resolver::new(catalog);
    let ids = IdentifierGenerator::new(resolver);
    let mut output = GenerationOutput::default();

    let concrete: Vec<&Entity> = catalog.entities().iter().filter(|e| !e.is_generic()).collect();
    let bound = fan_out(&concrete, options.parallel, |entity| {
        bind_entity(&ids, entity).map_err(|error| GenerationFailure {
            name: entity.full_name(),
            error,
        })
    });
    for result in bound {
        match result {
            Ok(entity) => output.entities.push(entity),
            Err(failure) => {
                warn!("dropping {}: {}", failure.name, failure.error);
                output.failures.push(failure);
            }
        }
    }

    let set = ProjectionEngine::new(resolver)
        .with_max_rounds(options.max_closure_rounds)
        .with_parallel(options.parallel)
        .run()?;
    output.rounds = set.rounds();
    let (projected, failed) = set.into_parts();
    output
        .failures
        .extend(failed.into_iter().map(|(request, error)| GenerationFailure {
            name: request.to_string(),
            error,
        }));

    let bound = fan_out(&projected, options.parallel, |(request, entity)| {
        bind_projection(&ids, request, entity).map_err(|error| GenerationFailure {
            name: request.to_string(),
            error,
        })
    });
    for result in bound {
        match result {
            Ok(projection) => output.projections.push(projection),
            Err(failure) => {
                warn!("dropping {}: {}", failure.name, failure.error);
                output.failures.push(failure);
            }
        }
    }

    output.entities.sort_by_key(BoundEntity::full_name);
    output
        .projections
        .sort_by(|a, b| a.entity.full_name().cmp(&b.entity.full_name()));
    output.failures.sort_by(|a, b| a.name.cmp(&b.name));

    info!(
        "generated {} entities and {} projections in {} rounds ({} failures)",
        output.entities.len(),
        output.projections.len(),
        output.rounds,
        output.failures.len()
    );
    Ok(output)
}
