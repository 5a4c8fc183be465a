//! Limits for streaming validation
//!
//! A session keeps one frame per open element and one entry per identity
//! selector match. These limits bound that growth for untrusted input.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Resource limits applied by a validation session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum element nesting depth
    pub max_xml_depth: usize,

    /// Maximum number of attributes per element
    pub max_attributes: usize,

    /// Maximum number of live identity-constraint entries
    pub max_identity_entries: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_xml_depth: 1000,
            max_attributes: 1000,
            max_identity_entries: 1_000_000,
        }
    }
}

impl Limits {
    /// Tight limits for small, untrusted documents
    pub fn strict() -> Self {
        Self {
            max_xml_depth: 100,
            max_attributes: 100,
            max_identity_entries: 10_000,
        }
    }

    /// Loose limits for large trusted documents
    pub fn permissive() -> Self {
        Self {
            max_xml_depth: 10_000,
            max_attributes: 10_000,
            max_identity_entries: 100_000_000,
        }
    }

    /// Check an element nesting depth
    pub fn check_xml_depth(&self, depth: usize) -> Result<()> {
        within("element depth", depth, self.max_xml_depth)
    }

    /// Check the attribute count of one start tag
    pub fn check_attributes(&self, count: usize) -> Result<()> {
        within("attribute count", count, self.max_attributes)
    }
}

fn within(what: &str, value: usize, max: usize) -> Result<()> {
    if value > max {
        return Err(Error::LimitExceeded(format!("{} {} exceeds maximum {}", what, value, max)));
    }
    Ok(())
}
