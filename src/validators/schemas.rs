//! XML Schema component arena
//!
//! A compiled [`Schema`] owns every component (types, element and attribute
//! declarations, identity constraints and content models) in flat vectors.
//! Components refer to each other through typed ids resolved by the
//! [`SchemaBuilder`](super::builders::SchemaBuilder); only the three global
//! lookups go by qualified name. A built schema is immutable and is shared
//! between sessions through an `Arc`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::namespaces::QName;
use crate::XSD_1_0_NAMESPACE;

use super::attributes::AttributeDecl;
use super::base::{DerivationFlags, DerivationMethod};
use super::complex_types::ComplexTypeDef;
use super::elements::ElementDecl;
use super::identities::IdentityConstraint;
use super::models::ContentModel;
use super::simple_types::SimpleTypeDef;

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) usize);

        impl $name {
            /// Position in the schema arena
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

arena_id!(
    /// Id of a simple or complex type
    TypeId
);
arena_id!(
    /// Id of an element declaration
    ElementId
);
arena_id!(
    /// Id of an attribute declaration
    AttributeId
);
arena_id!(
    /// Id of an identity constraint
    ConstraintId
);
arena_id!(
    /// Id of a compiled content model
    ModelId
);

/// A type definition
#[derive(Debug, Clone)]
pub enum TypeDef {
    /// Simple type
    Simple(SimpleTypeDef),
    /// Complex type
    Complex(ComplexTypeDef),
}

impl TypeDef {
    /// Name of a global or built-in type
    pub fn name(&self) -> Option<&QName> {
        match self {
            Self::Simple(def) => def.name.as_ref(),
            Self::Complex(def) => def.name.as_ref(),
        }
    }

    /// Base type; None for anyType and anySimpleType
    pub fn base(&self) -> Option<TypeId> {
        match self {
            Self::Simple(def) => def.base,
            Self::Complex(def) => def.base,
        }
    }

    /// How the type derives from its base
    pub fn derivation(&self) -> DerivationMethod {
        match self {
            Self::Simple(def) => def.derivation(),
            Self::Complex(def) => def.derivation,
        }
    }

    /// `block` set; simple types block nothing
    pub fn block(&self) -> DerivationFlags {
        match self {
            Self::Simple(_) => DerivationFlags::default(),
            Self::Complex(def) => def.block,
        }
    }

    /// `final` set
    pub fn final_set(&self) -> DerivationFlags {
        match self {
            Self::Simple(def) => def.final_set,
            Self::Complex(def) => def.final_set,
        }
    }

    /// Whether this is a simple type
    pub fn is_simple(&self) -> bool {
        matches!(self, Self::Simple(_))
    }

    /// Whether the type is abstract
    pub fn is_abstract(&self) -> bool {
        matches!(self, Self::Complex(def) if def.is_abstract)
    }
}

/// A compiled XML Schema
#[derive(Debug, Clone)]
pub struct Schema {
    pub(crate) target_namespace: Option<String>,
    pub(crate) types: Vec<TypeDef>,
    pub(crate) elements: Vec<ElementDecl>,
    pub(crate) attributes: Vec<AttributeDecl>,
    pub(crate) constraints: Vec<IdentityConstraint>,
    pub(crate) models: Vec<Arc<ContentModel>>,
    pub(crate) global_elements: IndexMap<QName, ElementId>,
    pub(crate) global_types: IndexMap<QName, TypeId>,
    pub(crate) global_attributes: IndexMap<QName, AttributeId>,
    pub(crate) builtins: HashMap<&'static str, TypeId>,
    pub(crate) referenced: HashSet<ConstraintId>,
    pub(crate) any_type: TypeId,
    pub(crate) any_simple_type: TypeId,
}

impl Schema {
    pub(crate) fn empty(target_namespace: Option<&str>) -> Self {
        Self {
            target_namespace: target_namespace
                .filter(|ns| !ns.is_empty())
                .map(str::to_string),
            types: Vec::new(),
            elements: Vec::new(),
            attributes: Vec::new(),
            constraints: Vec::new(),
            models: Vec::new(),
            global_elements: IndexMap::new(),
            global_types: IndexMap::new(),
            global_attributes: IndexMap::new(),
            builtins: HashMap::new(),
            referenced: HashSet::new(),
            any_type: TypeId(0),
            any_simple_type: TypeId(0),
        }
    }

    /// Target namespace
    pub fn target_namespace(&self) -> Option<&str> {
        self.target_namespace.as_deref()
    }

    /// Look up a global element declaration
    pub fn global_element(&self, name: &QName) -> Option<ElementId> {
        self.global_elements.get(name).copied()
    }

    /// Look up a global or built-in type
    pub fn global_type(&self, name: &QName) -> Option<TypeId> {
        self.global_types.get(name).copied()
    }

    /// Look up a global attribute declaration
    pub fn global_attribute(&self, name: &QName) -> Option<AttributeId> {
        self.global_attributes.get(name).copied()
    }

    /// Global element declarations in declaration order
    pub fn global_elements(&self) -> impl Iterator<Item = (&QName, ElementId)> {
        self.global_elements.iter().map(|(name, id)| (name, *id))
    }

    /// Element declaration
    pub fn element(&self, id: ElementId) -> &ElementDecl {
        &self.elements[id.0]
    }

    /// Attribute declaration
    pub fn attribute(&self, id: AttributeId) -> &AttributeDecl {
        &self.attributes[id.0]
    }

    /// Type definition
    pub fn type_def(&self, id: TypeId) -> &TypeDef {
        &self.types[id.0]
    }

    /// Simple type definition, if `id` is simple
    pub fn simple_type(&self, id: TypeId) -> Option<&SimpleTypeDef> {
        match self.types.get(id.0) {
            Some(TypeDef::Simple(def)) => Some(def),
            _ => None,
        }
    }

    /// Complex type definition, if `id` is complex
    pub fn complex_type(&self, id: TypeId) -> Option<&ComplexTypeDef> {
        match self.types.get(id.0) {
            Some(TypeDef::Complex(def)) => Some(def),
            _ => None,
        }
    }

    /// Identity constraint
    pub fn constraint(&self, id: ConstraintId) -> &IdentityConstraint {
        &self.constraints[id.0]
    }

    /// Compiled content model
    pub fn model(&self, id: ModelId) -> &Arc<ContentModel> {
        &self.models[id.0]
    }

    /// Built-in type by local name in the XSD namespace
    pub fn builtin(&self, name: &str) -> Option<TypeId> {
        self.builtins.get(name).copied()
    }

    /// The ur-type `xs:anyType`
    pub fn any_type(&self) -> TypeId {
        self.any_type
    }

    /// `xs:anySimpleType`
    pub fn any_simple_type(&self) -> TypeId {
        self.any_simple_type
    }

    /// Whether some keyref refers to `constraint`
    pub fn is_referenced(&self, constraint: ConstraintId) -> bool {
        self.referenced.contains(&constraint)
    }

    /// Display name of a type for messages: `xs:local` for built-ins
    pub fn type_name(&self, id: TypeId) -> String {
        match self.types.get(id.0).and_then(TypeDef::name) {
            Some(name) if name.namespace.as_deref() == Some(XSD_1_0_NAMESPACE) => {
                format!("xs:{}", name.local_name)
            }
            Some(name) => name.to_string(),
            None => "anonymous type".to_string(),
        }
    }

    /// Whether `derived` is `base` or derives from it, by any method
    pub fn is_derived_from(&self, derived: TypeId, base: TypeId) -> bool {
        self.derivation_steps(derived, base).is_some()
    }

    /// Derivation methods used on the way from `derived` up to `base`, or
    /// None if `derived` does not derive from `base`
    pub fn derivation_steps(&self, derived: TypeId, base: TypeId) -> Option<Vec<DerivationMethod>> {
        let mut steps = Vec::new();
        let mut current = derived;
        loop {
            if current == base {
                return Some(steps);
            }
            let def = self.types.get(current.0)?;
            match def.base() {
                Some(next) => {
                    steps.push(def.derivation());
                    current = next;
                }
                // anySimpleType restricts anyType
                None if base == self.any_type && current == self.any_simple_type => {
                    steps.push(DerivationMethod::Restriction);
                    return Some(steps);
                }
                None => return None,
            }
        }
    }

    /// Whether substituting `derived` for `base` is blocked by `block` or
    /// by the `block` of `base` itself
    pub fn is_derivation_blocked(
        &self,
        derived: TypeId,
        base: TypeId,
        block: DerivationFlags,
    ) -> bool {
        let block = block.union(self.type_def(base).block());
        match self.derivation_steps(derived, base) {
            Some(steps) => steps.into_iter().any(|method| block.is_blocked(method)),
            None => true,
        }
    }

    /// Whether the schema declares components in `namespace`
    pub fn covers_namespace(&self, namespace: Option<&str>) -> bool {
        self.target_namespace.as_deref() == namespace
            || self
                .global_elements
                .keys()
                .any(|name| name.namespace.as_deref() == namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::builders::SchemaBuilder;
    use crate::validators::complex_types::ComplexTypeDecl;
    use crate::validators::facets::FacetSet;
    use crate::validators::particles::Particle;

    #[test]
    fn test_builtin_lookup_and_names() {
        let schema = SchemaBuilder::new(None).build().unwrap();
        let int = schema.builtin("int").unwrap();
        assert_eq!(schema.type_name(int), "xs:int");
        assert_eq!(
            schema.global_type(&QName::namespaced(XSD_1_0_NAMESPACE, "int")),
            Some(int)
        );
        assert!(schema.simple_type(int).is_some());
        assert!(schema.complex_type(int).is_none());
        assert!(schema.complex_type(schema.any_type()).is_some());
        assert_eq!(schema.type_name(schema.any_type()), "xs:anyType");
    }

    #[test]
    fn test_derivation_chain() {
        let schema = SchemaBuilder::new(None).build().unwrap();
        let byte = schema.builtin("byte").unwrap();
        let integer = schema.builtin("integer").unwrap();
        let string = schema.builtin("string").unwrap();

        assert!(schema.is_derived_from(byte, integer));
        assert!(schema.is_derived_from(byte, schema.any_simple_type()));
        assert!(schema.is_derived_from(byte, schema.any_type()));
        assert!(!schema.is_derived_from(integer, byte));
        assert!(!schema.is_derived_from(string, integer));
        assert_eq!(schema.derivation_steps(byte, byte), Some(vec![]));
    }

    #[test]
    fn test_blocked_derivation() {
        let mut builder = SchemaBuilder::new(Some("urn:t"));
        let string = builder.builtin("string").unwrap();
        let a = builder.add_element(crate::validators::elements::ElementDecl::local(
            QName::local("a"),
            string,
        ));
        let base = builder
            .add_complex_type(
                ComplexTypeDecl::element_only(Particle::sequence(vec![Particle::element(a)]))
                    .named(QName::namespaced("urn:t", "base")),
            )
            .unwrap();
        let extended = builder
            .add_complex_type(ComplexTypeDecl::empty().extends(base))
            .unwrap();
        let restricted = builder
            .restriction(None, string, FacetSet::new().max_length(2))
            .unwrap();
        let schema = builder.build().unwrap();

        let none = DerivationFlags::default();
        let no_extension = DerivationFlags::from_attr("extension");
        assert!(!schema.is_derivation_blocked(extended, base, none));
        assert!(schema.is_derivation_blocked(extended, base, no_extension));
        assert!(!schema.is_derivation_blocked(restricted, string, no_extension));
        assert!(schema.is_derivation_blocked(string, restricted, none));
        assert_eq!(schema.type_name(base), "{urn:t}base");
        assert_eq!(schema.type_name(extended), "anonymous type");
    }

    #[test]
    fn test_covers_namespace() {
        let schema = SchemaBuilder::new(Some("urn:t")).build().unwrap();
        assert!(schema.covers_namespace(Some("urn:t")));
        assert!(!schema.covers_namespace(Some("urn:other")));
        assert!(!schema.covers_namespace(None));
    }
}
