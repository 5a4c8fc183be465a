//! XSD Wildcards
//!
//! Namespace constraints shared by `xs:any` particles and `xs:anyAttribute`
//! declarations, plus the processContents mode that decides how a matched
//! element or attribute is assessed.
//!
//! Reference: https://www.w3.org/TR/xmlschema-1/#Wildcards

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::namespaces::QName;

/// Process contents mode for wildcards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessContents {
    /// A global declaration must exist and is validated against
    #[default]
    Strict,
    /// Validate if a global declaration is found, otherwise accept
    Lax,
    /// Accept without any validation, including descendants
    Skip,
}

impl fmt::Display for ProcessContents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Lax => write!(f, "lax"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// Namespace constraint of a wildcard.
///
/// The empty string stands for "no namespace" inside an enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NamespaceConstraint {
    /// `##any`
    #[default]
    Any,
    /// `##other`: neither the target namespace nor no namespace
    Other {
        /// The excluded target namespace
        target_namespace: Option<String>,
    },
    /// An explicit list of namespaces
    Enumeration(BTreeSet<String>),
}

impl NamespaceConstraint {
    /// Build a constraint from a `namespace` attribute value
    pub fn from_namespace_attr(
        value: &str,
        target_namespace: Option<&str>,
    ) -> Result<Self, ParseError> {
        match value.trim() {
            "##any" => Ok(Self::Any),
            "##other" => Ok(Self::Other {
                target_namespace: target_namespace.map(String::from),
            }),
            list => {
                let mut namespaces = BTreeSet::new();
                for token in list.split_whitespace() {
                    match token {
                        "##local" => {
                            namespaces.insert(String::new());
                        }
                        "##targetNamespace" => {
                            namespaces.insert(target_namespace.unwrap_or("").to_string());
                        }
                        s if s.starts_with("##") => {
                            return Err(ParseError::new(format!(
                                "wrong value '{}' in 'namespace' attribute",
                                s
                            )));
                        }
                        uri => {
                            namespaces.insert(uri.to_string());
                        }
                    }
                }
                Ok(Self::Enumeration(namespaces))
            }
        }
    }

    /// Enumeration constraint from a list of namespaces (`""` for none)
    pub fn enumeration<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enumeration(namespaces.into_iter().map(Into::into).collect())
    }

    /// Check if a namespace (`""` for none) is allowed
    pub fn allows_namespace(&self, namespace: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Other { target_namespace } => {
                !namespace.is_empty() && Some(namespace) != target_namespace.as_deref()
            }
            Self::Enumeration(set) => set.contains(namespace),
        }
    }

    /// Check if some namespace is allowed by both constraints
    pub fn overlaps(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Any, _) | (_, Self::Any) => true,
            (Self::Other { .. }, Self::Other { .. }) => true,
            (Self::Enumeration(set), constraint) | (constraint, Self::Enumeration(set)) => {
                set.iter().any(|ns| constraint.allows_namespace(ns))
            }
        }
    }
}

/// A wildcard: a namespace constraint with its processContents mode
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Wildcard {
    /// Allowed namespaces
    pub namespace: NamespaceConstraint,
    /// How matched items are assessed
    pub process_contents: ProcessContents,
}

impl Wildcard {
    /// Create a wildcard
    pub fn new(namespace: NamespaceConstraint, process_contents: ProcessContents) -> Self {
        Self {
            namespace,
            process_contents,
        }
    }

    /// `##any` with the given mode
    pub fn any(process_contents: ProcessContents) -> Self {
        Self::new(NamespaceConstraint::Any, process_contents)
    }

    /// Check if a name is matched by the wildcard
    pub fn allows(&self, name: &QName) -> bool {
        self.namespace.allows_namespace(name.namespace_str())
    }

    /// Check if some name is matched by both wildcards
    pub fn overlaps(&self, other: &Wildcard) -> bool {
        self.namespace.overlaps(&other.namespace)
    }
}

impl fmt::Display for Wildcard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            NamespaceConstraint::Any => write!(f, "##any")?,
            NamespaceConstraint::Other { .. } => write!(f, "##other")?,
            NamespaceConstraint::Enumeration(set) => {
                let items: Vec<&str> = set
                    .iter()
                    .map(|ns| if ns.is_empty() { "##local" } else { ns.as_str() })
                    .collect();
                write!(f, "{}", items.join(" "))?;
            }
        }
        write!(f, " ({})", self.process_contents)
    }
}
