//! XSD Validation events
//!
//! Findings of a validation session are not Rust errors: they are delivered
//! as [`ValidationEvent`]s to a [`ValidationEventHandler`] and validation
//! goes on with the next node.

use std::fmt;

use crate::error::ValidationError;

use super::schemas::{AttributeId, ConstraintId, ElementId, Schema, TypeId};

/// Severity of a validation event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Recoverable finding that does not make the document invalid
    Warning,
    /// The document is invalid
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Which rule family a validation event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// A value outside the lexical space of its type
    Lexical,
    /// A value violating a constraining facet
    Facet,
    /// Unexpected, missing or misplaced child elements or text
    ContentModel,
    /// Missing, prohibited or undeclared attributes
    Attribute,
    /// key, unique, keyref and ID/IDREF violations
    Identity,
    /// Declarations, xsi:type, xsi:nil and abstract components
    Structural,
}

impl ErrorCategory {
    /// Get the category as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Facet => "facet",
            Self::ContentModel => "content model",
            Self::Attribute => "attribute",
            Self::Identity => "identity",
            Self::Structural => "structural",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema component an event relates to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaComponent {
    /// Element declaration
    Element(ElementId),
    /// Attribute declaration
    Attribute(AttributeId),
    /// Simple or complex type
    Type(TypeId),
    /// Identity constraint
    Constraint(ConstraintId),
}

impl SchemaComponent {
    /// Describe the component by name
    pub fn describe(&self, schema: &Schema) -> String {
        match *self {
            Self::Element(id) => format!("element '{}'", schema.element(id).name),
            Self::Attribute(id) => format!("attribute '{}'", schema.attribute(id).name),
            Self::Type(id) => schema.type_name(id),
            Self::Constraint(id) => schema.constraint(id).to_string(),
        }
    }
}

/// One validation finding
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationEvent {
    /// Error or warning
    pub severity: Severity,
    /// Rule family
    pub category: ErrorCategory,
    /// Message, element path and offending value
    pub error: ValidationError,
    /// Related schema component
    pub component: Option<SchemaComponent>,
}

impl ValidationEvent {
    /// An error event
    pub fn error(category: ErrorCategory, error: ValidationError) -> Self {
        Self {
            severity: Severity::Error,
            category,
            error,
            component: None,
        }
    }

    /// A warning event
    pub fn warning(category: ErrorCategory, error: ValidationError) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(category, error)
        }
    }

    /// Attach the related schema component
    pub fn with_component(mut self, component: SchemaComponent) -> Self {
        self.component = Some(component);
        self
    }

    /// Whether this is an error
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// The message
    pub fn message(&self) -> &str {
        &self.error.message
    }
}

impl fmt::Display for ValidationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.severity, self.category, self.error.message)?;
        if let Some(ref path) = self.error.path {
            write!(f, " at {}", path)?;
        }
        Ok(())
    }
}

/// Receiver of validation events
pub trait ValidationEventHandler {
    /// Handle one event
    fn handle(&mut self, event: &ValidationEvent);
}

impl<F> ValidationEventHandler for F
where
    F: FnMut(&ValidationEvent),
{
    fn handle(&mut self, event: &ValidationEvent) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_display() {
        let event = ValidationEvent::error(
            ErrorCategory::Facet,
            ValidationError::new("value 7 exceeds maxInclusive 5").with_path("/a/b[2]"),
        );
        assert!(event.is_error());
        assert_eq!(
            event.to_string(),
            "error (facet): value 7 exceeds maxInclusive 5 at /a/b[2]"
        );
        let warning = ValidationEvent::warning(ErrorCategory::Structural, ValidationError::new("x"));
        assert!(!warning.is_error());
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn test_closure_handler() {
        let mut seen = Vec::new();
        {
            let mut handler = |event: &ValidationEvent| seen.push(event.category);
            handler.handle(&ValidationEvent::error(
                ErrorCategory::Identity,
                ValidationError::new("duplicate"),
            ));
        }
        assert_eq!(seen, vec![ErrorCategory::Identity]);
    }
}
