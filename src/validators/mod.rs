//! XML Schema validators
//!
//! Schema components, the schema builder and the streaming validation
//! session.

// Foundation
pub mod base;
pub mod exceptions;

// Type system
pub mod builtins;
pub mod datetime;
pub mod facets;
pub mod simple_types;

// Structures
pub mod attributes;
pub mod complex_types;
pub mod elements;
pub mod models;
pub mod particles;
pub mod wildcards;

// Schema graph and identity constraints
pub mod builders;
pub mod identities;
pub mod schemas;

// Streaming validation
pub mod validation;

pub use attributes::{AttributeDecl, AttributeUse, AttributeUseDef};
pub use base::{DerivationFlags, DerivationMethod, ValidationMode, ValidityStatus};
pub use builders::SchemaBuilder;
pub use builtins::{XsdOrdering, XsdValue};
pub use complex_types::{ComplexTypeDecl, ComplexTypeDef, ContentDecl, ContentType};
pub use elements::{ElementDecl, Scope, ValueConstraint};
pub use exceptions::{ErrorCategory, SchemaComponent, Severity, ValidationEvent, ValidationEventHandler};
pub use facets::{FacetKind, FacetSet, FacetViolation, WhiteSpace};
pub use identities::{IdentityConstraintDecl, IdentityKind};
pub use models::{ContentModel, Expected, ModelState};
pub use particles::{Compositor, Occurs, Particle};
pub use schemas::{AttributeId, ConstraintId, ElementId, ModelId, Schema, TypeDef, TypeId};
pub use simple_types::{compare, parse, validate, LexicalError, TypedValue, ValueContext, ValueError};
pub use validation::{ElementStart, PartialTarget, SchemaInfo, ValidationSession};
pub use wildcards::{NamespaceConstraint, ProcessContents, Wildcard};
