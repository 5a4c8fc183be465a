//! Validation settings

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::limits::Limits;
use crate::validators::ValidationMode;

/// Options of a validation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Deliver warnings to the handler
    pub report_warnings: bool,

    /// Check key/unique/keyref and ID/IDREF
    pub process_identity_constraints: bool,

    /// Accept undeclared `xml:*` attributes
    pub allow_xml_attributes: bool,

    /// How to treat root elements that have no global declaration
    pub process_contents: ValidationMode,

    /// Resource limits
    pub limits: Limits,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            report_warnings: false,
            process_identity_constraints: true,
            allow_xml_attributes: true,
            process_contents: ValidationMode::Strict,
            limits: Limits::default(),
        }
    }
}

impl ValidationSettings {
    /// Load settings from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set whether warnings are delivered
    pub fn with_warnings(mut self, report: bool) -> Self {
        self.report_warnings = report;
        self
    }

    /// Set the mode for undeclared roots
    pub fn with_process_contents(mut self, mode: ValidationMode) -> Self {
        self.process_contents = mode;
        self
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }
}
