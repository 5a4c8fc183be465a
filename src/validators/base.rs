//! Base validator infrastructure
//!
//! Small enums shared by every schema component and by the validation
//! session: processing modes, validity outcomes and derivation control.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Validation mode for elements that have no governing declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// A declaration is required; its absence is an error
    #[default]
    Strict,
    /// Validate if a declaration is found, otherwise accept with a warning
    Lax,
    /// Accept without validation
    Skip,
}

impl ValidationMode {
    /// Get the mode as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationMode::Strict => "strict",
            ValidationMode::Lax => "lax",
            ValidationMode::Skip => "skip",
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Validity outcome of an element or attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidityStatus {
    /// Valid according to the schema
    Valid,
    /// Invalid according to the schema
    Invalid,
    /// Validity is unknown
    #[default]
    NotKnown,
}

impl fmt::Display for ValidityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::Invalid => write!(f, "invalid"),
            Self::NotKnown => write!(f, "notKnown"),
        }
    }
}

/// Derivation method of a type definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DerivationMethod {
    /// Type derived by restriction (list and union types included)
    #[default]
    Restriction,
    /// Type derived by extension
    Extension,
}

impl fmt::Display for DerivationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Restriction => write!(f, "restriction"),
            Self::Extension => write!(f, "extension"),
        }
    }
}

/// Block/final derivation flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DerivationFlags {
    /// Block/finalize restriction
    pub restriction: bool,
    /// Block/finalize extension
    pub extension: bool,
    /// Block substitution group members (element `block` only)
    pub substitution: bool,
}

impl DerivationFlags {
    /// All derivations blocked/finalized
    pub fn all() -> Self {
        Self {
            restriction: true,
            extension: true,
            substitution: true,
        }
    }

    /// Parse from a `block`/`final` attribute value
    pub fn from_attr(value: &str) -> Self {
        let mut flags = DerivationFlags::default();
        for token in value.split_whitespace() {
            match token {
                "#all" => return Self::all(),
                "restriction" => flags.restriction = true,
                "extension" => flags.extension = true,
                "substitution" => flags.substitution = true,
                _ => {}
            }
        }
        flags
    }

    /// Union of two flag sets
    pub fn union(self, other: DerivationFlags) -> Self {
        Self {
            restriction: self.restriction || other.restriction,
            extension: self.extension || other.extension,
            substitution: self.substitution || other.substitution,
        }
    }

    /// Check if a derivation method is blocked
    pub fn is_blocked(&self, method: DerivationMethod) -> bool {
        match method {
            DerivationMethod::Restriction => self.restriction,
            DerivationMethod::Extension => self.extension,
        }
    }
}
