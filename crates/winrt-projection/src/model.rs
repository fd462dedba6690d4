//! Catalog records
//!
//! Records are read from JSON with PascalCase keys. Entities carry a `"Type"`
//! discriminator and class traits a `"TraitType"` discriminator:
//!
//! ```json
//! {
//!   "Type": "Interface",
//!   "Name": "IVector`1",
//!   "Namespace": "Windows.Foundation.Collections",
//!   "Guid": "913337e9-11a1-4345-a3a2-4e7f956e222d",
//!   "GenericParameters": [{ "Name": "T", "Position": 0 }],
//!   "Methods": [ ... ]
//! }
//! ```

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use winrt_abi::GUID;
use winrt_abi::marshal::{PrimitiveKind, SYSTEM_NAMESPACE};

fn is_false(value: &bool) -> bool {
    !*value
}

// =============================================================================
// TypeKey
// =============================================================================

/// Catalog identity of an entity: `(namespace, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeKey {
    pub namespace: String,
    pub name: String,
}

impl TypeKey {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}.{}", self.namespace, self.name)
        }
    }
}

// =============================================================================
// TypeReference
// =============================================================================

/// A use of a type: a primitive, a catalog entity or a generic parameter.
///
/// The derived equality is structural. Catalog identity is [`key`](Self::key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TypeReference {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(
        rename = "GenericParameters",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub generic_arguments: Option<Vec<GenericArgument>>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_array: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_reference: bool,
}

impl TypeReference {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            generic_arguments: None,
            is_array: false,
            is_reference: false,
        }
    }

    /// A `System` type.
    #[must_use]
    pub fn system(name: &str) -> Self {
        Self::new(SYSTEM_NAMESPACE, name)
    }

    /// A generic instantiation bound to `args` in parameter order.
    ///
    /// Arguments are named `T0`, `T1`, ... since only their positions matter
    /// to a reference.
    #[must_use]
    pub fn generic(
        namespace: impl Into<String>,
        name: impl Into<String>,
        args: impl IntoIterator<Item = TypeReference>,
    ) -> Self {
        let generic_arguments = args
            .into_iter()
            .enumerate()
            .map(|(position, bound)| GenericArgument {
                name: format!("T{position}"),
                position: position as u32,
                bound: Some(bound),
            })
            .collect();
        Self {
            generic_arguments: Some(generic_arguments),
            ..Self::new(namespace, name)
        }
    }

    #[must_use]
    pub fn with_array(mut self) -> Self {
        self.is_array = true;
        self
    }

    #[must_use]
    pub fn with_reference(mut self) -> Self {
        self.is_reference = true;
        self
    }

    #[must_use]
    pub fn key(&self) -> TypeKey {
        TypeKey::new(&self.namespace, &self.name)
    }

    #[must_use]
    pub fn full_name(&self) -> String {
        self.key().to_string()
    }

    #[must_use]
    pub fn is_type_of(&self, namespace: &str, name: &str) -> bool {
        self.namespace == namespace && self.name == name
    }

    /// The name without a by-reference `&` or array `[]` suffix.
    #[must_use]
    pub fn bare_name(&self) -> &str {
        let name = self.name.strip_suffix('&').unwrap_or(&self.name);
        name.strip_suffix("[]").unwrap_or(name)
    }

    /// Whether the name or flags mark this as an array.
    #[must_use]
    pub fn is_array_type(&self) -> bool {
        self.is_array || self.name.trim_end_matches('&').ends_with("[]")
    }

    /// Whether the name or flags mark this as passed by reference.
    #[must_use]
    pub fn is_by_reference(&self) -> bool {
        self.is_reference || self.name.ends_with('&')
    }

    /// This reference without array or by-reference decoration.
    #[must_use]
    pub fn element(&self) -> Self {
        Self {
            name: self.bare_name().to_string(),
            namespace: self.namespace.clone(),
            generic_arguments: self.generic_arguments.clone(),
            is_array: false,
            is_reference: false,
        }
    }

    /// Whether this names a `System` type rather than a catalog entry.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.namespace == SYSTEM_NAMESPACE
    }

    /// The native primitive this reference maps to, if any.
    #[must_use]
    pub fn primitive(&self) -> Option<PrimitiveKind> {
        if !self.is_system() {
            return None;
        }
        PrimitiveKind::lookup(&self.namespace, self.bare_name())
    }

    #[must_use]
    pub fn is_primitive(&self) -> bool {
        self.primitive().is_some()
    }

    #[must_use]
    pub fn is_void(&self) -> bool {
        self.primitive() == Some(PrimitiveKind::Void)
    }

    /// Whether the reference carries generic arguments.
    #[must_use]
    pub fn is_generic(&self) -> bool {
        self.generic_arguments
            .as_ref()
            .is_some_and(|args| !args.is_empty())
    }

    /// Generic arguments in parameter order.
    #[must_use]
    pub fn arguments(&self) -> Vec<&GenericArgument> {
        let mut args: Vec<&GenericArgument> = self.generic_arguments.iter().flatten().collect();
        args.sort_by_key(|arg| arg.position);
        args
    }

    /// Structural form with arguments sorted and named by position, recursively.
    ///
    /// Two references to the same instantiation written by different records
    /// have equal canonical forms.
    #[must_use]
    pub fn canonical(&self) -> Self {
        let generic_arguments = self.generic_arguments.as_ref().map(|_| {
            self.arguments()
                .into_iter()
                .map(|arg| GenericArgument {
                    name: format!("T{}", arg.position),
                    position: arg.position,
                    bound: arg.bound.as_ref().map(TypeReference::canonical),
                })
                .collect()
        });
        Self {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            generic_arguments,
            is_array: self.is_array,
            is_reference: self.is_reference,
        }
    }

    /// Every generic argument is bound, recursively.
    #[must_use]
    pub fn is_actualized(&self) -> bool {
        self.generic_arguments.iter().flatten().all(|arg| {
            arg.bound
                .as_ref()
                .is_some_and(TypeReference::is_actualized)
        })
    }
}

impl fmt::Display for TypeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())?;
        if self.is_generic() {
            f.write_str("<")?;
            for (i, arg) in self.arguments().into_iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                match &arg.bound {
                    Some(bound) => write!(f, "{bound}")?,
                    None => f.write_str(&arg.name)?,
                }
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

/// A generic parameter, or an argument bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GenericArgument {
    pub name: String,
    #[serde(default)]
    pub position: u32,
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub bound: Option<TypeReference>,
}

impl GenericArgument {
    #[must_use]
    pub fn open(name: impl Into<String>, position: u32) -> Self {
        Self {
            name: name.into(),
            position,
            bound: None,
        }
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }
}

// =============================================================================
// Members
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "Type")]
    pub ty: TypeReference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Method {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default = "void_type")]
    pub return_type: TypeReference,
}

fn void_type() -> TypeReference {
    TypeReference::system("Void")
}

impl Method {
    /// Every type the method mentions: parameters, then the return type.
    pub fn types(&self) -> impl Iterator<Item = &TypeReference> {
        self.parameters
            .iter()
            .map(|p| &p.ty)
            .chain(std::iter::once(&self.return_type))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Field {
    pub name: String,
    #[serde(default)]
    pub index: u32,
    #[serde(rename = "Type")]
    pub ty: TypeReference,
}

/// Class capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "TraitType")]
pub enum Trait {
    DirectActivation,
    Static {
        #[serde(rename = "Interfaces", default)]
        interfaces: Vec<TypeReference>,
    },
    FactoryActivation {
        #[serde(rename = "FactoryTypes", default)]
        factory_types: Vec<TypeReference>,
    },
    DefaultInterface {
        #[serde(rename = "Interface")]
        interface: TypeReference,
    },
    ValueType,
}

// =============================================================================
// Entities
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InterfaceDef {
    pub name: String,
    pub namespace: String,
    pub guid: GUID,
    #[serde(default)]
    pub methods: Vec<Method>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generic_parameters: Option<Vec<GenericArgument>>,
    #[serde(default)]
    pub super_interfaces: Vec<TypeReference>,
    #[serde(default)]
    pub traits: Vec<Trait>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClassDef {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub interfaces: Vec<TypeReference>,
    #[serde(default)]
    pub traits: Vec<Trait>,
}

impl ClassDef {
    #[must_use]
    pub fn default_interface(&self) -> Option<&TypeReference> {
        self.traits.iter().find_map(|t| match t {
            Trait::DefaultInterface { interface } => Some(interface),
            _ => None,
        })
    }

    #[must_use]
    pub fn is_directly_activatable(&self) -> bool {
        self.traits.iter().any(|t| matches!(t, Trait::DirectActivation))
    }

    pub fn static_interfaces(&self) -> impl Iterator<Item = &TypeReference> {
        self.traits.iter().flat_map(|t| match t {
            Trait::Static { interfaces } => interfaces.as_slice(),
            _ => &[][..],
        })
    }

    pub fn factory_interfaces(&self) -> impl Iterator<Item = &TypeReference> {
        self.traits.iter().flat_map(|t| match t {
            Trait::FactoryActivation { factory_types } => factory_types.as_slice(),
            _ => &[][..],
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DelegateDef {
    pub name: String,
    pub namespace: String,
    pub guid: GUID,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default = "void_type")]
    pub return_type: TypeReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generic_parameters: Option<Vec<GenericArgument>>,
}

impl DelegateDef {
    /// The delegate's `Invoke` as a method.
    #[must_use]
    pub fn invoke_method(&self) -> Method {
        Method {
            name: "Invoke".to_string(),
            parameters: self.parameters.clone(),
            return_type: self.return_type.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnumDef {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub values: IndexMap<String, i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StructDef {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl StructDef {
    /// Fields in layout order.
    #[must_use]
    pub fn ordered_fields(&self) -> Vec<&Field> {
        let mut fields: Vec<&Field> = self.fields.iter().collect();
        fields.sort_by_key(|f| f.index);
        fields
    }
}

/// A catalog record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Type")]
pub enum Entity {
    Interface(InterfaceDef),
    Class(ClassDef),
    Delegate(DelegateDef),
    Enum(EnumDef),
    Struct(StructDef),
}

impl Entity {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Interface(d) => &d.name,
            Self::Class(d) => &d.name,
            Self::Delegate(d) => &d.name,
            Self::Enum(d) => &d.name,
            Self::Struct(d) => &d.name,
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        match self {
            Self::Interface(d) => &d.namespace,
            Self::Class(d) => &d.namespace,
            Self::Delegate(d) => &d.namespace,
            Self::Enum(d) => &d.namespace,
            Self::Struct(d) => &d.namespace,
        }
    }

    #[must_use]
    pub fn key(&self) -> TypeKey {
        TypeKey::new(self.namespace(), self.name())
    }

    #[must_use]
    pub fn full_name(&self) -> String {
        self.key().to_string()
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Interface(_) => "interface",
            Self::Class(_) => "class",
            Self::Delegate(_) => "delegate",
            Self::Enum(_) => "enum",
            Self::Struct(_) => "struct",
        }
    }

    /// Stored identifier of interfaces and delegates.
    #[must_use]
    pub fn guid(&self) -> Option<GUID> {
        match self {
            Self::Interface(d) => Some(d.guid),
            Self::Delegate(d) => Some(d.guid),
            _ => None,
        }
    }

    #[must_use]
    pub fn generic_parameters(&self) -> &[GenericArgument] {
        match self {
            Self::Interface(d) => d.generic_parameters.as_deref().unwrap_or_default(),
            Self::Delegate(d) => d.generic_parameters.as_deref().unwrap_or_default(),
            _ => &[][..],
        }
    }

    /// Declares generic parameters, bound or not.
    #[must_use]
    pub fn is_generic(&self) -> bool {
        !self.generic_parameters().is_empty()
    }

    /// Vtable methods in declaration order; a delegate has only `Invoke`.
    #[must_use]
    pub fn methods(&self) -> Vec<Method> {
        match self {
            Self::Interface(d) => d.methods.clone(),
            Self::Delegate(d) => vec![d.invoke_method()],
            _ => Vec::new(),
        }
    }

    /// A reference naming this entity, with its generic parameters as arguments.
    #[must_use]
    pub fn as_reference(&self) -> TypeReference {
        let params = self.generic_parameters();
        TypeReference {
            generic_arguments: (!params.is_empty()).then(|| params.to_vec()),
            ..TypeReference::new(self.namespace(), self.name())
        }
    }

    #[must_use]
    pub fn as_interface(&self) -> Option<&InterfaceDef> {
        match self {
            Self::Interface(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_class(&self) -> Option<&ClassDef> {
        match self {
            Self::Class(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_delegate(&self) -> Option<&DelegateDef> {
        match self {
            Self::Delegate(d) => Some(d),
            _ => None,
        }
    }
}
