//! XSD Element declarations
//!
//! Element declarations as stored in the schema arena, with their value
//! constraint, nillability, substitution group affiliation and identity
//! constraints.
//!
//! Reference: https://www.w3.org/TR/xmlschema-1/#Element_Declarations

use crate::namespaces::QName;

use super::base::DerivationFlags;
use super::schemas::{ConstraintId, ElementId, TypeId};
use super::simple_types::TypedValue;

/// The scope of an element or attribute declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Top-level declaration, reachable by name
    #[default]
    Global,
    /// Declaration local to a complex type or group
    Local,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// Default or fixed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueConstraintKind {
    /// Value used when the item is absent or empty
    Default,
    /// Value the item must have; also used when absent
    Fixed,
}

/// A default or fixed value
#[derive(Debug, Clone, PartialEq)]
pub struct ValueConstraint {
    /// Default or fixed
    pub kind: ValueConstraintKind,
    /// Value as declared
    pub lexical: String,
    /// Value parsed against the declaration's type (set by the builder)
    pub value: Option<TypedValue>,
}

impl ValueConstraint {
    /// A default value
    pub fn default_value(lexical: impl Into<String>) -> Self {
        Self {
            kind: ValueConstraintKind::Default,
            lexical: lexical.into(),
            value: None,
        }
    }

    /// A fixed value
    pub fn fixed(lexical: impl Into<String>) -> Self {
        Self {
            kind: ValueConstraintKind::Fixed,
            lexical: lexical.into(),
            value: None,
        }
    }

    /// Whether this is a fixed value
    pub fn is_fixed(&self) -> bool {
        self.kind == ValueConstraintKind::Fixed
    }
}

/// XSD Element declaration
#[derive(Debug, Clone)]
pub struct ElementDecl {
    /// Element name
    pub name: QName,
    /// Declared type
    pub type_id: TypeId,
    /// Global or local
    pub scope: Scope,
    /// Whether `xsi:nil` is allowed
    pub nillable: bool,
    /// Whether the element may only appear through substitution
    pub is_abstract: bool,
    /// Default or fixed value
    pub value_constraint: Option<ValueConstraint>,
    /// `block` set: disallowed xsi:type derivations and substitutions
    pub block: DerivationFlags,
    /// `final` set: disallowed substitution group members
    pub final_set: DerivationFlags,
    /// Head of the substitution group this element belongs to
    pub substitution_group: Option<ElementId>,
    /// Identity constraints declared on this element
    pub constraints: Vec<ConstraintId>,
}

impl ElementDecl {
    /// Global element declaration
    pub fn global(name: QName, type_id: TypeId) -> Self {
        Self {
            name,
            type_id,
            scope: Scope::Global,
            nillable: false,
            is_abstract: false,
            value_constraint: None,
            block: DerivationFlags::default(),
            final_set: DerivationFlags::default(),
            substitution_group: None,
            constraints: Vec::new(),
        }
    }

    /// Local element declaration
    pub fn local(name: QName, type_id: TypeId) -> Self {
        Self {
            scope: Scope::Local,
            ..Self::global(name, type_id)
        }
    }

    /// Allow `xsi:nil`
    pub fn nillable(mut self) -> Self {
        self.nillable = true;
        self
    }

    /// Mark abstract
    pub fn abstract_element(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Set a default value
    pub fn with_default(mut self, lexical: impl Into<String>) -> Self {
        self.value_constraint = Some(ValueConstraint::default_value(lexical));
        self
    }

    /// Set a fixed value
    pub fn with_fixed(mut self, lexical: impl Into<String>) -> Self {
        self.value_constraint = Some(ValueConstraint::fixed(lexical));
        self
    }

    /// Set `block`
    pub fn with_block(mut self, flags: DerivationFlags) -> Self {
        self.block = flags;
        self
    }

    /// Set `final`
    pub fn with_final(mut self, flags: DerivationFlags) -> Self {
        self.final_set = flags;
        self
    }

    /// Join the substitution group headed by `head`
    pub fn substitutes(mut self, head: ElementId) -> Self {
        self.substitution_group = Some(head);
        self
    }

    /// Whether the declaration is global
    pub fn is_global(&self) -> bool {
        self.scope == Scope::Global
    }

    /// Default or fixed lexical value, if any
    pub fn default_lexical(&self) -> Option<&str> {
        self.value_constraint.as_ref().map(|vc| vc.lexical.as_str())
    }

    /// Fixed value constraint, if any
    pub fn fixed(&self) -> Option<&ValueConstraint> {
        self.value_constraint.as_ref().filter(|vc| vc.is_fixed())
    }
}
