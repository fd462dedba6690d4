//! Type signatures and interface identifiers
//!
//! The identifier of a parameterized interface is a name-based UUID (version
//! 5) over its signature string in the namespace
//! `11f47ad5-7b73-42c0-abae-878b1e16adee`:
//!
//! ```text
//! IIterable`1<String>
//!   signature  pinterface({faa585ea-6214-4217-afda-7f46de5869b3};string)
//!   identifier e2fcc7c1-3bfc-5a0b-b2b0-72e769d1cb7e
//! ```

use log::trace;
use uuid::Uuid;
use winrt_abi::marshal::{AbiSignature, PrimitiveKind, TypeDescriptor};
use winrt_abi::{GUID, IID_IINSPECTABLE, Memoized};

use crate::error::{ProjectionError, Result};
use crate::model::{Entity, Method, TypeReference};
use crate::projection::projected_name;
use crate::resolver::Resolver;

/// Namespace of parameterized interface identifiers.
pub const PINTERFACE_NAMESPACE: Uuid = Uuid::from_u128(0x11f47ad5_7b73_42c0_abae_878b1e16adee);

/// The identifier of a type with signature `signature`.
#[must_use]
pub fn identifier_for_signature(signature: &str) -> GUID {
    let uuid = Uuid::new_v5(&PINTERFACE_NAMESPACE, signature.as_bytes());
    GUID::from_u128(uuid.as_u128())
}

fn unsupported(reference: &TypeReference) -> ProjectionError {
    ProjectionError::UnsupportedPrimitive {
        namespace: reference.namespace.clone(),
        name: reference.bare_name().to_string(),
    }
}

fn open_generic(reference: &TypeReference) -> ProjectionError {
    ProjectionError::OpenGeneric {
        name: reference.to_string(),
    }
}

/// Computes signatures, identifiers and marshalling descriptors.
///
/// Identifiers are memoized per reference, so the generator can be shared
/// across the generation fan-out.
pub struct IdentifierGenerator<'a> {
    resolver: Resolver<'a>,
    cache: Memoized<TypeReference, GUID>,
}

impl<'a> IdentifierGenerator<'a> {
    #[must_use]
    pub fn new(resolver: Resolver<'a>) -> Self {
        Self {
            resolver,
            cache: Memoized::new(),
        }
    }

    #[must_use]
    pub fn resolver(&self) -> Resolver<'a> {
        self.resolver
    }

    /// Signature string of `reference`.
    pub fn signature(&self, reference: &TypeReference) -> Result<String> {
        if reference.is_system() {
            return PrimitiveKind::lookup(&reference.namespace, reference.bare_name())
                .and_then(PrimitiveKind::signature_token)
                .map(str::to_string)
                .ok_or_else(|| unsupported(reference));
        }

        let entity = self.resolver.resolve(reference)?;
        if reference.is_generic() {
            if !reference.is_actualized() {
                return Err(open_generic(reference));
            }
            let guid = match entity {
                Entity::Interface(def) => def.guid,
                Entity::Delegate(def) => def.guid,
                _ => {
                    return Err(ProjectionError::NonInterfaceGeneric {
                        name: entity.full_name(),
                    });
                }
            };
            let mut signature = format!("pinterface({}", guid.signature_form());
            for arg in reference.arguments() {
                let bound = arg.bound.as_ref().ok_or_else(|| open_generic(reference))?;
                signature.push(';');
                signature.push_str(&self.signature(bound)?);
            }
            signature.push(')');
            return Ok(signature);
        }

        if entity.is_generic() {
            return Err(open_generic(reference));
        }
        match entity {
            Entity::Interface(def) => Ok(def.guid.signature_form()),
            Entity::Delegate(def) => Ok(format!("delegate({})", def.guid.signature_form())),
            Entity::Enum(_) => Ok(format!("enum({};i4)", entity.full_name())),
            Entity::Struct(def) => {
                let mut signature = format!("struct({}", entity.full_name());
                for field in def.ordered_fields() {
                    signature.push(';');
                    signature.push_str(&self.signature(&field.ty)?);
                }
                signature.push(')');
                Ok(signature)
            }
            Entity::Class(def) => {
                let default = def.default_interface().ok_or_else(|| {
                    ProjectionError::MissingDefaultInterface {
                        name: entity.full_name(),
                    }
                })?;
                Ok(format!("rc({};{})", entity.full_name(), self.signature(default)?))
            }
        }
    }

    /// Interface identifier of `reference`.
    ///
    /// Parameterized references hash their signature. Plain interfaces and
    /// delegates return their stored identifier and runtime classes that of
    /// their default interface.
    pub fn identifier(&self, reference: &TypeReference) -> Result<GUID> {
        let key = reference.canonical();
        self.cache
            .get_or_try_init(&key, || self.compute_identifier(reference))
    }

    fn compute_identifier(&self, reference: &TypeReference) -> Result<GUID> {
        if reference.primitive() == Some(PrimitiveKind::Object) {
            return Ok(IID_IINSPECTABLE);
        }
        if reference.is_system() {
            return Err(ProjectionError::NoIdentifier {
                name: reference.full_name(),
                kind: "primitive",
            });
        }
        if reference.is_generic() {
            let signature = self.signature(reference)?;
            let iid = identifier_for_signature(&signature);
            trace!("{signature} -> {iid}");
            return Ok(iid);
        }

        let entity = self.resolver.resolve(reference)?;
        if entity.is_generic() {
            return Err(open_generic(reference));
        }
        match entity {
            Entity::Interface(def) => Ok(def.guid),
            Entity::Delegate(def) => Ok(def.guid),
            Entity::Class(def) => {
                let default = def.default_interface().ok_or_else(|| {
                    ProjectionError::MissingDefaultInterface {
                        name: entity.full_name(),
                    }
                })?;
                // not through the cache: its initializer is running
                self.compute_identifier(default)
            }
            Entity::Enum(_) | Entity::Struct(_) => Err(ProjectionError::NoIdentifier {
                name: entity.full_name(),
                kind: entity.kind(),
            }),
        }
    }

    /// Native shape of `reference` for the runtime marshaller.
    pub fn descriptor(&self, reference: &TypeReference) -> Result<TypeDescriptor> {
        if reference.is_by_reference() {
            let inner = TypeReference {
                is_reference: false,
                name: reference.name.strip_suffix('&').unwrap_or(&reference.name).to_string(),
                ..reference.clone()
            };
            return Ok(TypeDescriptor::Reference(Box::new(self.descriptor(&inner)?)));
        }
        if reference.is_array_type() {
            let elem = self.descriptor(&reference.element())?;
            return Ok(TypeDescriptor::Array(Box::new(elem)));
        }
        if reference.is_system() {
            let kind = reference.primitive().ok_or_else(|| unsupported(reference))?;
            return Ok(TypeDescriptor::Primitive(kind));
        }

        if reference.is_generic() {
            let args = reference
                .arguments()
                .into_iter()
                .map(|arg| {
                    let bound = arg.bound.as_ref().ok_or_else(|| open_generic(reference))?;
                    self.descriptor(bound)
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok(TypeDescriptor::Parameterized {
                base: projected_name(reference),
                args,
                iid: self.identifier(reference)?,
            });
        }

        let entity = self.resolver.resolve(reference)?;
        let name = entity.full_name();
        Ok(match entity {
            Entity::Interface(def) => TypeDescriptor::Interface { name, iid: def.guid },
            Entity::Delegate(def) => TypeDescriptor::Delegate { name, iid: def.guid },
            Entity::Class(_) => TypeDescriptor::Class {
                default_iid: self.identifier(reference)?,
                name,
            },
            Entity::Enum(_) => TypeDescriptor::Enum { name },
            Entity::Struct(def) => TypeDescriptor::Struct {
                fields: def
                    .ordered_fields()
                    .into_iter()
                    .map(|field| self.descriptor(&field.ty))
                    .collect::<Result<Vec<_>>>()?,
                name,
            },
        })
    }

    /// Native signature of `method`: parameters then the return value.
    pub fn abi_signature(&self, method: &Method) -> Result<AbiSignature> {
        let params = method
            .parameters
            .iter()
            .map(|p| self.descriptor(&p.ty))
            .collect::<Result<Vec<_>>>()?;
        let ret = self.descriptor(&method.return_type)?;
        Ok(AbiSignature::new(params, ret))
    }
}
