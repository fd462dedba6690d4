use std::path::PathBuf;

use thiserror::Error;

/// Failures while resolving, projecting or identifying catalog types.
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("unresolved type {namespace}.{name}")]
    UnresolvedType { namespace: String, name: String },

    #[error("unsupported primitive {namespace}.{name}")]
    UnsupportedPrimitive { namespace: String, name: String },

    #[error("{name} has unbound generic arguments")]
    OpenGeneric { name: String },

    #[error("{kind} {name} cannot be projected")]
    NotProjectable { name: String, kind: &'static str },

    #[error("{name} is parameterized but is neither an interface nor a delegate")]
    NonInterfaceGeneric { name: String },

    #[error("runtime class {name} has no default interface")]
    MissingDefaultInterface { name: String },

    #[error("{kind} {name} has no interface identifier")]
    NoIdentifier { name: String, kind: &'static str },

    #[error("projection closure did not converge after {rounds} rounds")]
    ClosureDidNotConverge { rounds: usize },

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid catalog record in {origin}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T, E = ProjectionError> = std::result::Result<T, E>;
