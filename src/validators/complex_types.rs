//! XSD Complex Types
//!
//! Complex type definitions as stored in the schema arena. Content is one of
//! four kinds; element-only and mixed content refer to a compiled content
//! model by id.
//!
//! Reference: https://www.w3.org/TR/xmlschema-1/#Complex_Type_Definitions

use indexmap::IndexMap;

use crate::namespaces::QName;

use super::attributes::AttributeUseDef;
use super::base::{DerivationFlags, DerivationMethod};
use super::particles::Particle;
use super::schemas::{ModelId, TypeId};
use super::wildcards::Wildcard;

/// Content type of a complex type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// No character data or child elements
    Empty,
    /// Character data of a simple type
    Simple(TypeId),
    /// Child elements only
    ElementOnly(ModelId),
    /// Child elements interleaved with character data
    Mixed(ModelId),
}

impl ContentType {
    /// Content model of element-only and mixed content
    pub fn model(&self) -> Option<ModelId> {
        match self {
            Self::ElementOnly(model) | Self::Mixed(model) => Some(*model),
            _ => None,
        }
    }

    /// Simple type of simple content
    pub fn simple_type(&self) -> Option<TypeId> {
        match self {
            Self::Simple(type_id) => Some(*type_id),
            _ => None,
        }
    }

    /// Whether non-whitespace character data is allowed
    pub fn allows_text(&self) -> bool {
        matches!(self, Self::Simple(_) | Self::Mixed(_))
    }

    /// Content type label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Simple(_) => "simple",
            Self::ElementOnly(_) => "element-only",
            Self::Mixed(_) => "mixed",
        }
    }
}

/// Declared content of a complex type, before its model is compiled
#[derive(Debug, Clone, PartialEq)]
pub enum ContentDecl {
    /// Empty content
    Empty,
    /// Simple content of the given simple type
    Simple(TypeId),
    /// Element-only content
    ElementOnly(Particle),
    /// Mixed content
    Mixed(Particle),
}

/// XSD Complex Type definition
#[derive(Debug, Clone)]
pub struct ComplexTypeDef {
    /// Name for global types
    pub name: Option<QName>,
    /// Base type; None only for anyType
    pub base: Option<TypeId>,
    /// How the type derives from its base
    pub derivation: DerivationMethod,
    /// Content type
    pub content: ContentType,
    /// Attribute uses keyed by attribute name, in declaration order
    pub attributes: IndexMap<QName, AttributeUseDef>,
    /// `xs:anyAttribute`
    pub attribute_wildcard: Option<Wildcard>,
    /// Whether the type is abstract
    pub is_abstract: bool,
    /// `block` derivation control
    pub block: DerivationFlags,
    /// `final` derivation control
    pub final_set: DerivationFlags,
}

impl ComplexTypeDef {
    /// Look up the attribute use for a name
    pub fn attribute_use(&self, name: &QName) -> Option<&AttributeUseDef> {
        self.attributes.get(name)
    }

    /// Whether the content holds child elements
    pub fn has_element_content(&self) -> bool {
        self.content.model().is_some()
    }
}

/// Declaration of a complex type handed to the schema builder
#[derive(Debug, Clone)]
pub struct ComplexTypeDecl {
    /// Name for global types
    pub name: Option<QName>,
    /// Base type and derivation method; anyType by restriction when absent
    pub base: Option<(TypeId, DerivationMethod)>,
    /// Declared content
    pub content: ContentDecl,
    /// Attribute uses
    pub attributes: Vec<AttributeUseDef>,
    /// `xs:anyAttribute`
    pub attribute_wildcard: Option<Wildcard>,
    /// Whether the type is abstract
    pub is_abstract: bool,
    /// `block` derivation control
    pub block: DerivationFlags,
    /// `final` derivation control
    pub final_set: DerivationFlags,
}

impl ComplexTypeDecl {
    /// New declaration with the given content
    pub fn new(content: ContentDecl) -> Self {
        Self {
            name: None,
            base: None,
            content,
            attributes: Vec::new(),
            attribute_wildcard: None,
            is_abstract: false,
            block: DerivationFlags::default(),
            final_set: DerivationFlags::default(),
        }
    }

    /// Element-only content
    pub fn element_only(particle: Particle) -> Self {
        Self::new(ContentDecl::ElementOnly(particle))
    }

    /// Mixed content
    pub fn mixed(particle: Particle) -> Self {
        Self::new(ContentDecl::Mixed(particle))
    }

    /// Simple content
    pub fn simple(type_id: TypeId) -> Self {
        Self::new(ContentDecl::Simple(type_id))
    }

    /// Empty content
    pub fn empty() -> Self {
        Self::new(ContentDecl::Empty)
    }

    /// Give the type a global name
    pub fn named(mut self, name: QName) -> Self {
        self.name = Some(name);
        self
    }

    /// Derive from `base` by extension. The builder prepends the base's
    /// particle and inherits its attribute uses.
    pub fn extends(mut self, base: TypeId) -> Self {
        self.base = Some((base, DerivationMethod::Extension));
        self
    }

    /// Derive from `base` by restriction
    pub fn restricts(mut self, base: TypeId) -> Self {
        self.base = Some((base, DerivationMethod::Restriction));
        self
    }

    /// Add an attribute use
    pub fn attribute(mut self, attribute_use: AttributeUseDef) -> Self {
        self.attributes.push(attribute_use);
        self
    }

    /// Set the attribute wildcard
    pub fn any_attribute(mut self, wildcard: Wildcard) -> Self {
        self.attribute_wildcard = Some(wildcard);
        self
    }

    /// Mark the type abstract
    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Set `block`
    pub fn block(mut self, flags: DerivationFlags) -> Self {
        self.block = flags;
        self
    }

    /// Set `final`
    pub fn final_set(mut self, flags: DerivationFlags) -> Self {
        self.final_set = flags;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_accessors() {
        assert_eq!(ContentType::ElementOnly(ModelId(3)).model(), Some(ModelId(3)));
        assert_eq!(ContentType::Simple(TypeId(1)).simple_type(), Some(TypeId(1)));
        assert!(ContentType::Mixed(ModelId(0)).allows_text());
        assert!(!ContentType::Empty.allows_text());
        assert!(!ContentType::ElementOnly(ModelId(0)).allows_text());
        assert_eq!(ContentType::Empty.label(), "empty");
    }

    #[test]
    fn test_decl_builder() {
        let decl = ComplexTypeDecl::empty()
            .named(QName::local("t"))
            .extends(TypeId(7))
            .abstract_type()
            .block(DerivationFlags::from_attr("extension"));
        assert_eq!(decl.base, Some((TypeId(7), DerivationMethod::Extension)));
        assert!(decl.is_abstract);
        assert!(decl.block.extension);
        assert_eq!(decl.content, ContentDecl::Empty);
    }
}
