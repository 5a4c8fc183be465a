//! Error types for xmlschema-stream
//!
//! This module defines the crate-level error type. Findings about the
//! instance document travel through the session's event handler; only
//! fail-closed validation errors, schema build errors and API misuse
//! surface as [`Error`].

use std::fmt;
use thiserror::Error;

/// Result type alias using xmlschema-stream Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for xmlschema-stream operations
#[derive(Error, Debug)]
pub enum Error {
    /// Validation error raised with no event handler registered
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Schema building/compilation error
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// A session call was issued out of sequence
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Value error (invalid configuration value)
    #[error("value error: {0}")]
    Value(String),

    /// Limit exceeded error
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// Settings could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// XML input error from the document driver
    #[error("XML error: {0}")]
    Xml(String),
}

/// A finding about the instance document, located by element path
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Error message
    pub message: String,
    /// Element path, e.g. `/order/item`
    pub path: Option<String>,
    /// Schema component concerned
    pub schema_component: Option<String>,
    /// Offending instance text
    pub instance: Option<String>,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            schema_component: None,
            instance: None,
        }
    }

    /// Set the element path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the schema component
    pub fn with_schema_component(mut self, component: impl Into<String>) -> Self {
        self.schema_component = Some(component.into());
        self
    }

    /// Set the instance text
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(path) = &self.path {
            write!(f, " at {}", path)?;
        }
        if let Some(component) = &self.schema_component {
            write!(f, " ({})", component)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Schema building error
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    /// Error message
    pub message: String,
    /// Schema component the error refers to
    pub location: Option<String>,
    /// Offending source text (a pattern, a facet value, a path)
    pub source: Option<String>,
}

impl ParseError {
    /// Create a new parse error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            source: None,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(location) = &self.location {
            write!(f, "{}: ", location)?;
        }
        f.write_str(&self.message)?;
        if let Some(source) = &self.source {
            write!(f, " [{}]", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("value '9' violates maxInclusive '5'")
            .with_path("/a/b")
            .with_schema_component("element 'b'")
            .with_instance("9");
        assert_eq!(
            err.to_string(),
            "value '9' violates maxInclusive '5' at /a/b (element 'b')"
        );
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("invalid pattern facet")
            .with_location("simpleType 'code'")
            .with_source("[a-");
        assert_eq!(err.to_string(), "simpleType 'code': invalid pattern facet [[a-]");
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = ValidationError::new("duplicate ID 'a'").into();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(err.to_string(), "validation error: duplicate ID 'a'");

        let err: Error = ParseError::new("duplicate global element 'a'").into();
        assert!(matches!(err, Error::Parse(_)));
    }
}
