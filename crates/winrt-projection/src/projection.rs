//! Generic projection
//!
//! A generic interface or delegate is instantiated by substituting its
//! parameters throughout its shape. The closure engine finds every
//! instantiation the catalog needs, starting from the concrete entities and
//! following what each projected entity mentions:
//!
//! ```text
//! IWidget.Items : IVector`1<Int32>
//!   -> IVector_Int32_      : IIterable`1<Int32>, GetView() -> IVectorView`1<Int32>
//!   -> IIterable_Int32_    : First() -> IIterator`1<Int32>
//!   -> IVectorView_Int32_
//!   -> IIterator_Int32_
//! ```

use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use log::{debug, trace, warn};
use rayon::prelude::*;

use crate::error::{ProjectionError, Result};
use crate::model::{Entity, GenericArgument, Method, Parameter, TypeKey, TypeReference};
use crate::resolver::{Resolver, normalize};

/// Closure rounds allowed before a catalog is declared cyclic.
pub const DEFAULT_MAX_ROUNDS: usize = 64;

/// Map `f` over `items`, on the rayon pool when `parallel` is set.
pub(crate) fn fan_out<T, R>(items: &[T], parallel: bool, f: impl Fn(&T) -> R + Sync + Send) -> Vec<R>
where
    T: Sync,
    R: Send,
{
    if parallel {
        items.par_iter().map(f).collect()
    } else {
        items.iter().map(f).collect()
    }
}

// =============================================================================
// Substitution and naming
// =============================================================================

/// Replace generic parameter `param` by `replacement` throughout `reference`.
///
/// A parameter is written as a reference with an empty namespace. One naming
/// `param` is replaced wholesale, keeping its array and by-reference
/// decoration. Otherwise the generic argument bounds are rewritten
/// recursively.
#[must_use]
pub fn substitute(reference: &TypeReference, param: &str, replacement: &TypeReference) -> TypeReference {
    if reference.namespace.is_empty() && reference.bare_name() == param {
        let mut replaced = replacement.clone();
        replaced.is_array |= reference.is_array_type();
        replaced.is_reference |= reference.is_by_reference();
        return replaced;
    }
    let generic_arguments = reference.generic_arguments.as_ref().map(|args| {
        args.iter()
            .map(|arg| GenericArgument {
                name: arg.name.clone(),
                position: arg.position,
                bound: arg.bound.as_ref().map(|b| substitute(b, param, replacement)),
            })
            .collect()
    });
    TypeReference {
        generic_arguments,
        ..reference.clone()
    }
}

/// `IVector`1` -> `IVector`.
#[must_use]
pub fn base_name(name: &str) -> &str {
    name.split_once('`').map_or(name, |(base, _)| base)
}

/// Name of an instantiation: the base name followed by `_` and, for every
/// argument in parameter order, its own projected name and `_`.
///
/// `IVector`1<IMap`2<String, Int32>>` becomes `IVector_IMap_String_Int32__`.
#[must_use]
pub fn projected_name(reference: &TypeReference) -> String {
    let base = base_name(reference.bare_name());
    if !reference.is_generic() {
        return base.to_string();
    }
    let mut name = format!("{base}_");
    for arg in reference.arguments() {
        match &arg.bound {
            Some(bound) => name.push_str(&projected_name(bound)),
            None => name.push_str(&arg.name),
        }
        name.push('_');
    }
    name
}

/// Instantiate a generic interface or delegate.
///
/// Bindings apply in order to method parameters and return types,
/// super-interfaces and the entity's own generic parameters, then the entity
/// is renamed to its projected name.
pub fn project(entity: &Entity, bindings: &IndexMap<String, TypeReference>) -> Result<Entity> {
    if !entity.is_generic() {
        return Err(not_projectable(entity));
    }

    let apply = |reference: &TypeReference| {
        bindings
            .iter()
            .fold(reference.clone(), |acc, (param, bound)| substitute(&acc, param, bound))
    };
    let apply_params = |params: &[Parameter]| -> Vec<Parameter> {
        params
            .iter()
            .map(|p| Parameter {
                name: p.name.clone(),
                ty: apply(&p.ty),
            })
            .collect()
    };
    let bind_generics = |params: &Option<Vec<GenericArgument>>| {
        params.as_ref().map(|params| {
            params
                .iter()
                .map(|p| GenericArgument {
                    name: p.name.clone(),
                    position: p.position,
                    bound: match &p.bound {
                        Some(existing) => Some(apply(existing)),
                        None => bindings.get(&p.name).cloned(),
                    },
                })
                .collect::<Vec<_>>()
        })
    };
    let rename = |name: &str, namespace: &str, params: &Option<Vec<GenericArgument>>| {
        projected_name(&TypeReference {
            generic_arguments: params.clone(),
            ..TypeReference::new(namespace, name)
        })
    };

    match entity {
        Entity::Interface(def) => {
            let generic_parameters = bind_generics(&def.generic_parameters);
            let mut projected = def.clone();
            projected.name = rename(&def.name, &def.namespace, &generic_parameters);
            projected.methods = def
                .methods
                .iter()
                .map(|m| Method {
                    name: m.name.clone(),
                    parameters: apply_params(&m.parameters),
                    return_type: apply(&m.return_type),
                })
                .collect();
            projected.super_interfaces = def.super_interfaces.iter().map(apply).collect();
            projected.generic_parameters = generic_parameters;
            Ok(Entity::Interface(projected))
        }
        Entity::Delegate(def) => {
            let generic_parameters = bind_generics(&def.generic_parameters);
            let mut projected = def.clone();
            projected.name = rename(&def.name, &def.namespace, &generic_parameters);
            projected.parameters = apply_params(&def.parameters);
            projected.return_type = apply(&def.return_type);
            projected.generic_parameters = generic_parameters;
            Ok(Entity::Delegate(projected))
        }
        _ => Err(not_projectable(entity)),
    }
}

fn not_projectable(entity: &Entity) -> ProjectionError {
    ProjectionError::NotProjectable {
        name: entity.full_name(),
        kind: entity.kind(),
    }
}

// =============================================================================
// ProjectionRequest
// =============================================================================

/// A pending instantiation of a generic entity.
///
/// Two requests are equivalent when they target the same entity and bind the
/// same *set* of types, regardless of order or parameter names. Instantiations
/// that only permute their arguments therefore collapse into one.
#[derive(Debug, Clone)]
pub struct ProjectionRequest {
    pub target: TypeKey,
    /// Parameter name -> bound type, in parameter order.
    pub bindings: IndexMap<String, TypeReference>,
}

impl ProjectionRequest {
    #[must_use]
    pub fn new(target: TypeKey, bindings: IndexMap<String, TypeReference>) -> Self {
        let bindings = bindings
            .into_iter()
            .map(|(name, bound)| (name, bound.canonical()))
            .collect();
        Self { target, bindings }
    }

    /// The request a generic reference asks for. Unbound arguments are left out.
    #[must_use]
    pub fn from_reference(reference: &TypeReference) -> Option<Self> {
        if !reference.is_generic() {
            return None;
        }
        let bindings = reference
            .arguments()
            .into_iter()
            .filter_map(|arg| Some((arg.name.clone(), arg.bound.clone()?)))
            .collect();
        Some(Self::new(normalize(reference), bindings))
    }

    /// The generic reference this request instantiates.
    #[must_use]
    pub fn to_reference(&self) -> TypeReference {
        let generic_arguments = self
            .bindings
            .iter()
            .enumerate()
            .map(|(position, (name, bound))| GenericArgument {
                name: name.clone(),
                position: position as u32,
                bound: Some(bound.clone()),
            })
            .collect();
        TypeReference {
            generic_arguments: Some(generic_arguments),
            ..TypeReference::new(&self.target.namespace, &self.target.name)
        }
    }

    #[must_use]
    pub fn projected_name(&self) -> String {
        projected_name(&self.to_reference())
    }

    fn bound_set(&self) -> HashSet<&TypeReference> {
        self.bindings.values().collect()
    }
}

impl PartialEq for ProjectionRequest {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target && self.bound_set() == other.bound_set()
    }
}

impl Eq for ProjectionRequest {}

impl Hash for ProjectionRequest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.target.hash(state);
        // order-independent combination, consistent with set equality
        let combined = self.bound_set().into_iter().fold(0u64, |acc, bound| {
            let mut hasher = DefaultHasher::new();
            bound.hash(&mut hasher);
            acc.wrapping_add(hasher.finish())
        });
        combined.hash(state);
    }
}

impl fmt::Display for ProjectionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_reference())
    }
}

// =============================================================================
// ProjectionSet
// =============================================================================

/// Result of a closure run: projected entities keyed by request.
#[derive(Debug, Default)]
pub struct ProjectionSet {
    projected: IndexMap<ProjectionRequest, Entity>,
    failures: Vec<(ProjectionRequest, ProjectionError)>,
    rounds: usize,
}

impl ProjectionSet {
    #[must_use]
    pub fn len(&self) -> usize {
        self.projected.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projected.is_empty()
    }

    #[must_use]
    pub fn get(&self, request: &ProjectionRequest) -> Option<&Entity> {
        self.projected.get(request)
    }

    #[must_use]
    pub fn contains(&self, request: &ProjectionRequest) -> bool {
        self.projected.contains_key(request)
    }

    /// Projected entities in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&ProjectionRequest, &Entity)> {
        self.projected.iter()
    }

    pub fn requests(&self) -> impl Iterator<Item = &ProjectionRequest> {
        self.projected.keys()
    }

    /// Requests that could not be projected.
    #[must_use]
    pub fn failures(&self) -> &[(ProjectionRequest, ProjectionError)] {
        &self.failures
    }

    /// Number of closure rounds that ran.
    #[must_use]
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        Vec<(ProjectionRequest, Entity)>,
        Vec<(ProjectionRequest, ProjectionError)>,
    ) {
        (self.projected.into_iter().collect(), self.failures)
    }
}

// =============================================================================
// ProjectionEngine
// =============================================================================

/// Breadth-first closure over projection requests.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionEngine<'a> {
    resolver: Resolver<'a>,
    max_rounds: usize,
    parallel: bool,
}

impl<'a> ProjectionEngine<'a> {
    #[must_use]
    pub fn new(resolver: Resolver<'a>) -> Self {
        Self {
            resolver,
            max_rounds: DEFAULT_MAX_ROUNDS,
            parallel: true,
        }
    }

    #[must_use]
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Requests made by the catalog's concrete entities: interface
    /// super-interfaces and method types, class interfaces (implemented,
    /// default, static and factory) and delegate signatures.
    #[must_use]
    pub fn seeds(&self) -> Vec<ProjectionRequest> {
        let mut seeds = Vec::new();
        for entity in self.resolver.catalog().entities() {
            if entity.is_generic() {
                continue;
            }
            let references: Vec<&TypeReference> = match entity {
                Entity::Interface(def) => def
                    .super_interfaces
                    .iter()
                    .chain(def.methods.iter().flat_map(Method::types))
                    .collect(),
                Entity::Class(def) => def
                    .interfaces
                    .iter()
                    .chain(def.default_interface())
                    .chain(def.static_interfaces())
                    .chain(def.factory_interfaces())
                    .collect(),
                Entity::Delegate(def) => def
                    .parameters
                    .iter()
                    .map(|p| &p.ty)
                    .chain(std::iter::once(&def.return_type))
                    .collect(),
                Entity::Enum(_) | Entity::Struct(_) => Vec::new(),
            };
            seeds.extend(references.into_iter().filter_map(request_for));
        }
        debug!("{} projection seeds", seeds.len());
        seeds
    }

    /// Resolve the request's target and project it with the request's arguments.
    ///
    /// Arguments bind to the target's parameters by position.
    pub fn project_request(&self, request: &ProjectionRequest) -> Result<Entity> {
        let reference = request.to_reference();
        let entity = self.resolver.resolve(&reference)?;

        let mut params: Vec<&GenericArgument> = entity.generic_parameters().iter().collect();
        params.sort_by_key(|p| p.position);
        if params.len() != request.bindings.len() {
            return Err(ProjectionError::OpenGeneric {
                name: reference.to_string(),
            });
        }
        let bindings: IndexMap<String, TypeReference> = params
            .into_iter()
            .zip(request.bindings.values())
            .map(|(param, bound)| (param.name.clone(), bound.clone()))
            .collect();

        trace!("projecting {request}");
        project(entity, &bindings)
    }

    /// Project `seeds` and everything they transitively mention.
    ///
    /// Each round projects only the requests discovered by the previous one.
    /// Fails with [`ProjectionError::ClosureDidNotConverge`] when new requests
    /// keep appearing after the round limit.
    pub fn close(&self, seeds: impl IntoIterator<Item = ProjectionRequest>) -> Result<ProjectionSet> {
        let mut set = ProjectionSet::default();
        let mut known: HashSet<ProjectionRequest> = HashSet::new();
        let mut frontier: Vec<ProjectionRequest> = seeds
            .into_iter()
            .filter(|request| known.insert(request.clone()))
            .collect();

        while !frontier.is_empty() {
            if set.rounds >= self.max_rounds {
                return Err(ProjectionError::ClosureDidNotConverge { rounds: set.rounds });
            }
            set.rounds += 1;

            let results = fan_out(&frontier, self.parallel, |request| self.project_request(request));
            let mut next = Vec::new();
            for (request, result) in frontier.into_iter().zip(results) {
                match result {
                    Ok(entity) => {
                        for discovered in mentioned_requests(&entity) {
                            if known.insert(discovered.clone()) {
                                next.push(discovered);
                            }
                        }
                        set.projected.insert(request, entity);
                    }
                    Err(e) => {
                        warn!("dropping projection {request}: {e}");
                        set.failures.push((request, e));
                    }
                }
            }

            debug!(
                "projection round {}: {} projected, {} new requests",
                set.rounds,
                set.projected.len(),
                next.len()
            );
            frontier = next;
        }
        Ok(set)
    }

    /// [`close`](Self::close) over the catalog's [`seeds`](Self::seeds).
    pub fn run(&self) -> Result<ProjectionSet> {
        self.close(self.seeds())
    }
}

/// The request for `reference` if it is a fully bound generic instantiation.
fn request_for(reference: &TypeReference) -> Option<ProjectionRequest> {
    if !reference.is_generic() {
        return None;
    }
    if !reference.is_actualized() {
        trace!("skipping open generic {reference}");
        return None;
    }
    ProjectionRequest::from_reference(reference)
}

/// Requests made by a projected entity's super-interfaces and method types.
fn mentioned_requests(entity: &Entity) -> Vec<ProjectionRequest> {
    let supers = entity
        .as_interface()
        .map(|def| def.super_interfaces.clone())
        .unwrap_or_default();
    let methods = entity.methods();
    supers
        .iter()
        .chain(methods.iter().flat_map(Method::types))
        .filter_map(request_for)
        .collect()
}
