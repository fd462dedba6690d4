//! Runtime error type

use thiserror::Error;

use crate::com::{E_FAIL, E_INVALIDARG, E_NOINTERFACE, E_POINTER, HRESULT};
use crate::guid::{GUID, GuidParseError};

#[derive(Debug, Error)]
pub enum AbiError {
    #[error("native call failed with HRESULT {code:#010x}")]
    NativeCallFailure { code: HRESULT },

    #[error("interface {iid} is not supported by the object")]
    NoSuchInterface { iid: GUID },

    #[error("no native mapping for primitive {namespace}.{name}")]
    UnsupportedPrimitive { namespace: String, name: String },

    #[error("object handle is not bound to a native pointer")]
    Unbound,

    #[error("null {0} pointer")]
    NullPointer(&'static str),

    #[error("expected {expected} arguments, got {found}")]
    ArgumentCount { expected: usize, found: usize },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("failed to load library '{name}': {reason}")]
    LibraryLoad { name: String, reason: String },

    #[error("symbol '{symbol}' not found in '{library}'")]
    SymbolNotFound { library: String, symbol: String },

    #[error(transparent)]
    InvalidGuid(#[from] GuidParseError),
}

impl AbiError {
    /// The code reported to native callers when this error crosses the ABI.
    #[must_use]
    pub fn hresult(&self) -> HRESULT {
        match self {
            Self::NativeCallFailure { code } => *code,
            Self::NoSuchInterface { .. } => E_NOINTERFACE,
            Self::NullPointer(_) => E_POINTER,
            Self::ArgumentCount { .. } | Self::TypeMismatch { .. } | Self::InvalidGuid(_) => {
                E_INVALIDARG
            }
            _ => E_FAIL,
        }
    }
}

pub type Result<T, E = AbiError> = std::result::Result<T, E>;
