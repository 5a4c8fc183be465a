//! XSD attribute declarations and attribute-use resolution
//!
//! This module holds attribute declarations, the attribute uses of complex
//! types and the per-element [`AttributeResolver`] that classifies observed
//! attributes and computes missing and defaulted ones.

use std::collections::HashSet;

use crate::namespaces::QName;
use crate::{XMLNS_NAMESPACE, XML_NAMESPACE, XSI_NAMESPACE};

use super::complex_types::ComplexTypeDef;
use super::elements::{Scope, ValueConstraint};
use super::schemas::{AttributeId, Schema, TypeId};
use super::wildcards::ProcessContents;

/// Attribute use mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributeUse {
    /// Attribute is optional (default)
    #[default]
    Optional,
    /// Attribute is required
    Required,
    /// Attribute is prohibited
    Prohibited,
}

impl AttributeUse {
    /// Get the use as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeUse::Optional => "optional",
            AttributeUse::Required => "required",
            AttributeUse::Prohibited => "prohibited",
        }
    }
}

impl std::fmt::Display for AttributeUse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// XSD attribute declaration
#[derive(Debug, Clone)]
pub struct AttributeDecl {
    /// Attribute name
    pub name: QName,
    /// Simple type of the attribute
    pub type_id: TypeId,
    /// Global or local
    pub scope: Scope,
    /// Default or fixed value
    pub value_constraint: Option<ValueConstraint>,
}

impl AttributeDecl {
    /// Global attribute declaration
    pub fn global(name: QName, type_id: TypeId) -> Self {
        Self {
            name,
            type_id,
            scope: Scope::Global,
            value_constraint: None,
        }
    }

    /// Local attribute declaration
    pub fn local(name: QName, type_id: TypeId) -> Self {
        Self {
            scope: Scope::Local,
            ..Self::global(name, type_id)
        }
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
}

/// Use of an attribute declaration by a complex type
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeUseDef {
    /// Declaration used
    pub attribute: AttributeId,
    /// Optional, required or prohibited
    pub use_mode: AttributeUse,
    /// Value constraint of the use; the builder falls back to the
    /// declaration's own constraint
    pub value_constraint: Option<ValueConstraint>,
}

impl AttributeUseDef {
    fn new(attribute: AttributeId, use_mode: AttributeUse) -> Self {
        Self {
            attribute,
            use_mode,
            value_constraint: None,
        }
    }

    /// Optional use
    pub fn optional(attribute: AttributeId) -> Self {
        Self::new(attribute, AttributeUse::Optional)
    }

    /// Required use
    pub fn required(attribute: AttributeId) -> Self {
        Self::new(attribute, AttributeUse::Required)
    }

    /// Prohibited use
    pub fn prohibited(attribute: AttributeId) -> Self {
        Self::new(attribute, AttributeUse::Prohibited)
    }

    /// Set a default value on the use
    pub fn with_default(mut self, lexical: impl Into<String>) -> Self {
        self.value_constraint = Some(ValueConstraint::default_value(lexical));
        self
    }

    /// Set a fixed value on the use
    pub fn with_fixed(mut self, lexical: impl Into<String>) -> Self {
        self.value_constraint = Some(ValueConstraint::fixed(lexical));
        self
    }
}

/// Classification of an observed attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeMatch {
    /// Matches an attribute use of the element's type
    Declared(AttributeUseDef),
    /// Matches a prohibited use
    Prohibited,
    /// Matches the attribute wildcard; `decl` is the global declaration
    /// found for lax and strict processing
    Wildcard {
        /// processContents of the wildcard
        mode: ProcessContents,
        /// Global declaration, when one exists
        decl: Option<AttributeId>,
    },
    /// One of the recognized `xsi:` attributes
    Xsi,
    /// An `xsi:` attribute that does not exist
    UnknownXsi,
    /// Namespace declaration or tolerated `xml:` attribute
    Ignored,
    /// Not allowed by the type
    Undeclared,
    /// Second occurrence on the same start tag
    Duplicate,
}

/// A default or fixed attribute the instance omitted
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAttribute {
    /// Attribute name
    pub name: QName,
    /// Declaration
    pub attribute: AttributeId,
    /// Value to use
    pub lexical: String,
}

/// Result of [`AttributeResolver::finish`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeCompletion {
    /// Required attributes never observed
    pub missing: Vec<QName>,
    /// Defaulted attributes to feed through validation
    pub synthesized: Vec<SynthesizedAttribute>,
}

const XSI_ATTRIBUTES: [&str; 4] = ["type", "nil", "schemaLocation", "noNamespaceSchemaLocation"];

/// Tracks the attributes of one start tag
#[derive(Debug, Clone, Default)]
pub struct AttributeResolver {
    observed: HashSet<QName>,
    allow_xml_attributes: bool,
}

impl AttributeResolver {
    /// New resolver; `allow_xml_attributes` tolerates undeclared `xml:*`
    pub fn new(allow_xml_attributes: bool) -> Self {
        Self {
            observed: HashSet::new(),
            allow_xml_attributes,
        }
    }

    /// Number of attributes observed so far
    pub fn len(&self) -> usize {
        self.observed.len()
    }

    /// Whether no attribute was observed
    pub fn is_empty(&self) -> bool {
        self.observed.is_empty()
    }

    /// Whether `name` was already observed
    pub fn contains(&self, name: &QName) -> bool {
        self.observed.contains(name)
    }

    /// Classify an observed attribute. `ctype` is None for simple-typed
    /// elements, which accept no attributes besides the special ones.
    pub fn resolve(
        &mut self,
        schema: &Schema,
        ctype: Option<&ComplexTypeDef>,
        name: &QName,
    ) -> AttributeMatch {
        if !self.observed.insert(name.clone()) {
            return AttributeMatch::Duplicate;
        }
        let namespace = name.namespace.as_deref();
        if namespace == Some(XMLNS_NAMESPACE) || (namespace.is_none() && name.local_name == "xmlns")
        {
            return AttributeMatch::Ignored;
        }
        if namespace == Some(XSI_NAMESPACE) {
            return if XSI_ATTRIBUTES.contains(&name.local_name.as_str()) {
                AttributeMatch::Xsi
            } else {
                AttributeMatch::UnknownXsi
            };
        }

        if let Some(ctype) = ctype {
            if let Some(use_def) = ctype.attribute_use(name) {
                return match use_def.use_mode {
                    AttributeUse::Prohibited => AttributeMatch::Prohibited,
                    _ => AttributeMatch::Declared(use_def.clone()),
                };
            }
            if let Some(wildcard) = ctype.attribute_wildcard.as_ref().filter(|w| w.allows(name)) {
                let decl = match wildcard.process_contents {
                    ProcessContents::Skip => None,
                    _ => schema.global_attribute(name),
                };
                return AttributeMatch::Wildcard {
                    mode: wildcard.process_contents,
                    decl,
                };
            }
        }

        if self.allow_xml_attributes && namespace == Some(XML_NAMESPACE) {
            AttributeMatch::Ignored
        } else {
            AttributeMatch::Undeclared
        }
    }

    /// Compute missing required attributes and the defaulted ones
    pub fn finish(&self, ctype: Option<&ComplexTypeDef>) -> AttributeCompletion {
        let mut completion = AttributeCompletion::default();
        let Some(ctype) = ctype else {
            return completion;
        };
        for (name, use_def) in &ctype.attributes {
            if self.observed.contains(name) {
                continue;
            }
            match (use_def.use_mode, &use_def.value_constraint) {
                (AttributeUse::Required, _) => completion.missing.push(name.clone()),
                (AttributeUse::Optional, Some(vc)) => {
                    completion.synthesized.push(SynthesizedAttribute {
                        name: name.clone(),
                        attribute: use_def.attribute,
                        lexical: vc.lexical.clone(),
                    })
                }
                _ => {}
            }
        }
        completion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::builders::SchemaBuilder;
    use crate::validators::complex_types::ComplexTypeDecl;
    use crate::validators::wildcards::{NamespaceConstraint, Wildcard};

    fn fixture() -> (Schema, TypeId) {
        let mut builder = SchemaBuilder::new(Some("urn:t"));
        let string = builder.builtin("string").unwrap();
        let id = builder.add_attribute(AttributeDecl::local(QName::local("id"), string));
        let lang = builder.add_attribute(AttributeDecl::local(QName::local("lang"), string));
        let old = builder.add_attribute(AttributeDecl::local(QName::local("old"), string));
        builder.add_attribute(AttributeDecl::global(QName::namespaced("urn:x", "g"), string));
        let ctype = builder
            .add_complex_type(
                ComplexTypeDecl::empty()
                    .attribute(AttributeUseDef::required(id))
                    .attribute(AttributeUseDef::optional(lang).with_default("en"))
                    .attribute(AttributeUseDef::prohibited(old))
                    .any_attribute(Wildcard::new(
                        NamespaceConstraint::enumeration(["urn:x"]),
                        ProcessContents::Lax,
                    )),
            )
            .unwrap();
        (builder.build().unwrap(), ctype)
    }

    #[test]
    fn test_resolve_classification() {
        let (schema, ctype) = fixture();
        let ct = schema.complex_type(ctype);
        let mut resolver = AttributeResolver::new(true);

        assert!(matches!(
            resolver.resolve(&schema, ct, &QName::local("id")),
            AttributeMatch::Declared(_)
        ));
        assert_eq!(
            resolver.resolve(&schema, ct, &QName::local("id")),
            AttributeMatch::Duplicate
        );
        assert_eq!(
            resolver.resolve(&schema, ct, &QName::local("old")),
            AttributeMatch::Prohibited
        );
        assert_eq!(
            resolver.resolve(&schema, ct, &QName::local("other")),
            AttributeMatch::Undeclared
        );
        assert_eq!(
            resolver.resolve(&schema, ct, &QName::namespaced("urn:x", "g")),
            AttributeMatch::Wildcard {
                mode: ProcessContents::Lax,
                decl: schema.global_attribute(&QName::namespaced("urn:x", "g")),
            }
        );
        assert_eq!(
            resolver.resolve(&schema, ct, &QName::namespaced(XSI_NAMESPACE, "nil")),
            AttributeMatch::Xsi
        );
        assert_eq!(
            resolver.resolve(&schema, ct, &QName::namespaced(XSI_NAMESPACE, "bogus")),
            AttributeMatch::UnknownXsi
        );
        assert_eq!(
            resolver.resolve(&schema, ct, &QName::namespaced(XML_NAMESPACE, "lang")),
            AttributeMatch::Ignored
        );
        assert_eq!(
            resolver.resolve(&schema, ct, &QName::namespaced(XMLNS_NAMESPACE, "p")),
            AttributeMatch::Ignored
        );
    }

    #[test]
    fn test_xml_attributes_not_tolerated() {
        let (schema, ctype) = fixture();
        let mut resolver = AttributeResolver::new(false);
        assert_eq!(
            resolver.resolve(
                &schema,
                schema.complex_type(ctype),
                &QName::namespaced(XML_NAMESPACE, "space")
            ),
            AttributeMatch::Undeclared
        );
    }

    #[test]
    fn test_finish_missing_and_defaults() {
        let (schema, ctype) = fixture();
        let ct = schema.complex_type(ctype);

        let resolver = AttributeResolver::new(true);
        let completion = resolver.finish(ct);
        assert_eq!(completion.missing, vec![QName::local("id")]);
        assert_eq!(completion.synthesized.len(), 1);
        assert_eq!(completion.synthesized[0].name, QName::local("lang"));
        assert_eq!(completion.synthesized[0].lexical, "en");

        let mut resolver = AttributeResolver::new(true);
        resolver.resolve(&schema, ct, &QName::local("id"));
        resolver.resolve(&schema, ct, &QName::local("lang"));
        assert_eq!(resolver.finish(ct), AttributeCompletion::default());
    }
}
