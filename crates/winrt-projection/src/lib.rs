//! Type catalog, generic projection and interface identifiers
//!
//! This crate turns a closed-world catalog of runtime types into what a
//! binding generator needs:
//!
//! - [`Catalog`]: entities loaded from JSON records
//! - [`Resolver`]: reference to entity lookup, passed explicitly
//! - [`ProjectionEngine`]: instantiation of generic interfaces and delegates,
//!   closed over everything the instantiations mention
//! - [`IdentifierGenerator`]: type signatures, interface identifiers and
//!   marshalling descriptors
//! - [`generate`]: the parallel generation pass tying these together
//!
//! ## Example
//! ```ignore
//! let catalog = Catalog::load_dir("metadata/")?;
//! let output = generate(&catalog, &GenerationOptions::default())?;
//! let vector = output.projection("IVector_Int32_").unwrap();
//! println!("{} {}", vector.signature, vector.iid);
//! ```

pub mod catalog;
pub mod error;
pub mod generate;
pub mod model;
pub mod projection;
pub mod resolver;
pub mod signature;

pub use catalog::Catalog;
pub use error::{ProjectionError, Result};
pub use generate::{
    BoundEntity, BoundMethod, GenerationFailure, GenerationOptions, GenerationOutput,
    ProjectedEntity, generate,
};
pub use model::{
    ClassDef, DelegateDef, Entity, EnumDef, Field, GenericArgument, InterfaceDef, Method,
    Parameter, StructDef, Trait, TypeKey, TypeReference,
};
pub use projection::{
    ProjectionEngine, ProjectionRequest, ProjectionSet, project, projected_name, substitute,
};
pub use resolver::{Resolver, normalize};
pub use signature::{IdentifierGenerator, PINTERFACE_NAMESPACE, identifier_for_signature};
