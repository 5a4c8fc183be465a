//! XML Validation session
//!
//! [`ValidationSession`] validates one instance document pushed to it as
//! parse events. It keeps a stack of frames, one per open element, and
//! drives the content model automata, the attribute resolver, the datatype
//! validator and the identity constraint engine from them.
//!
//! Findings go to the registered [`ValidationEventHandler`]. Without a
//! handler the session fails closed: the call that raised an error returns
//! it as [`Error::Validation`] after completing its state transition.
//! Calls issued out of sequence return [`Error::InvalidState`] and leave
//! the session untouched.

use std::fmt;
use std::mem;
use std::sync::Arc;

use log::debug;

use crate::error::{Error, Result, ValidationError};
use crate::namespaces::{NamespaceContext, QName};
use crate::settings::ValidationSettings;

use super::attributes::{AttributeMatch, AttributeResolver, AttributeUse};
use super::base::{ValidationMode, ValidityStatus};
use super::builtins::{XsdOrdering, XSD_ID, XSD_IDREF};
use super::complex_types::ContentType;
use super::elements::ValueConstraint;
use super::exceptions::{
    ErrorCategory, SchemaComponent, Severity, ValidationEvent, ValidationEventHandler,
};
use super::identities::{IdTracker, IdentityEngine};
use super::models::{Expected, ModelState, ParticleMatch};
use super::schemas::{AttributeId, ElementId, Schema, TypeDef, TypeId};
use super::simple_types::{compare, validate, TypedValue, ValueContext, ValueError, Variety};
use super::wildcards::ProcessContents;

/// An element start tag, with the xsi attributes and namespace
/// declarations it carries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementStart {
    /// Local name
    pub local_name: String,
    /// Namespace URI
    pub namespace: Option<String>,
    /// Value of `xsi:type`
    pub xsi_type: Option<String>,
    /// Value of `xsi:nil`
    pub xsi_nil: Option<String>,
    /// Value of `xsi:schemaLocation`
    pub schema_location: Option<String>,
    /// Value of `xsi:noNamespaceSchemaLocation`
    pub no_namespace_schema_location: Option<String>,
    /// Namespace declarations; an empty prefix declares the default namespace
    pub namespaces: Vec<(String, String)>,
}

impl ElementStart {
    /// Start tag of `{namespace}local_name`
    pub fn new(namespace: Option<&str>, local_name: impl Into<String>) -> Self {
        Self {
            local_name: local_name.into(),
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
            ..Self::default()
        }
    }

    /// Start tag of an unqualified element
    pub fn local(local_name: impl Into<String>) -> Self {
        Self::new(None, local_name)
    }

    /// Set `xsi:type`
    pub fn with_xsi_type(mut self, value: impl Into<String>) -> Self {
        self.xsi_type = Some(value.into());
        self
    }

    /// Set `xsi:nil`
    pub fn with_xsi_nil(mut self, value: impl Into<String>) -> Self {
        self.xsi_nil = Some(value.into());
        self
    }

    /// Add a namespace declaration
    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.push((prefix.into(), uri.into()));
        self
    }

    /// Qualified name of the element
    pub fn name(&self) -> QName {
        QName::new(self.namespace.as_deref(), self.local_name.as_str())
    }
}

/// Per-node validation outcome
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaInfo {
    /// Valid, Invalid or NotKnown
    pub validity: ValidityStatus,
    /// Governing element declaration
    pub element: Option<ElementId>,
    /// Governing attribute declaration
    pub attribute: Option<AttributeId>,
    /// Governing type, after xsi:type
    pub type_id: Option<TypeId>,
    /// Union member type that accepted the value
    pub member_type: Option<TypeId>,
    /// Whether the element was nilled
    pub nil: bool,
    /// Whether the value came from a default
    pub is_default: bool,
    /// Typed value of an attribute or simple-content element
    pub value: Option<TypedValue>,
}

impl SchemaInfo {
    /// Whether the node is valid
    pub fn is_valid(&self) -> bool {
        self.validity == ValidityStatus::Valid
    }
}

/// Component a partial validation starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialTarget {
    /// The root must be this element
    Element(ElementId),
    /// The root, whatever its name, is assessed against this type
    Type(TypeId),
    /// A single top-level attribute is validated, with no element
    Attribute(AttributeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Content,
    StartTag,
    Finished,
}

#[derive(Debug)]
struct Frame {
    name: QName,
    element: Option<ElementId>,
    type_id: Option<TypeId>,
    mode: ProcessContents,
    model: Option<ModelState>,
    attributes: AttributeResolver,
    text: String,
    text_error: bool,
    nil: bool,
    invalid: bool,
}

impl Frame {
    fn validity(&self) -> ValidityStatus {
        if self.invalid {
            ValidityStatus::Invalid
        } else if self.type_id.is_some() {
            ValidityStatus::Valid
        } else {
            ValidityStatus::NotKnown
        }
    }

    fn is_skipped(&self) -> bool {
        self.mode == ProcessContents::Skip
    }
}

/// Streaming validation of one document at a time
pub struct ValidationSession {
    schema: Arc<Schema>,
    settings: ValidationSettings,
    handler: Option<Box<dyn ValidationEventHandler>>,
    state: SessionState,
    frames: Vec<Frame>,
    names: Vec<QName>,
    namespaces: NamespaceContext,
    identities: IdentityEngine,
    ids: IdTracker,
    partial: Option<PartialTarget>,
    failure: Option<ValidationError>,
}

impl fmt::Debug for ValidationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationSession")
            .field("state", &self.state)
            .field("depth", &self.frames.len())
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

impl ValidationSession {
    /// New session over a built schema
    pub fn new(schema: Arc<Schema>, settings: ValidationSettings) -> Self {
        let identities = IdentityEngine::new(settings.limits.max_identity_entries);
        Self {
            schema,
            settings,
            handler: None,
            state: SessionState::Content,
            frames: Vec::new(),
            names: Vec::new(),
            namespaces: NamespaceContext::new(),
            identities,
            ids: IdTracker::new(),
            partial: None,
            failure: None,
        }
    }

    /// Start a partial validation rooted at an element declaration, a type
    /// or a top-level attribute. Discards any previous document state.
    pub fn initialize_partial(&mut self, target: PartialTarget) -> Result<()> {
        if !self.frames.is_empty() || self.state == SessionState::StartTag {
            return Err(self.misuse("initialize_partial"));
        }
        self.reset();
        debug!("partial validation from {:?}", target);
        self.partial = Some(target);
        Ok(())
    }

    /// Register the event handler
    pub fn with_handler(mut self, handler: impl ValidationEventHandler + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Replace the event handler; None makes the session fail closed
    pub fn set_handler(&mut self, handler: Option<Box<dyn ValidationEventHandler>>) {
        self.handler = handler;
    }

    /// The schema
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The settings
    pub fn settings(&self) -> &ValidationSettings {
        &self.settings
    }

    /// Number of open elements
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether `end_validation` was called
    pub fn is_finished(&self) -> bool {
        self.state == SessionState::Finished
    }

    /// Open an element
    pub fn start_element(&mut self, start: ElementStart) -> Result<SchemaInfo> {
        if self.state != SessionState::Content {
            return Err(self.misuse("start_element"));
        }
        self.settings.limits.check_xml_depth(self.frames.len() + 1)?;
        let schema = Arc::clone(&self.schema);

        self.namespaces.push_scope();
        for (prefix, uri) in &start.namespaces {
            if prefix.is_empty() {
                self.namespaces.set_default_namespace(uri.as_str());
            } else {
                self.namespaces.add_prefix(prefix.as_str(), uri.as_str());
            }
        }
        let name = start.name();
        let root_type = match self.partial {
            Some(PartialTarget::Type(t)) if self.frames.is_empty() => Some(t),
            _ => None,
        };
        let (element, mode, root_finding) = match self.frames.is_empty() {
            true => self.match_root(&schema, &name),
            false => {
                let (element, mode) = self.match_child(&schema, &name);
                (element, mode, None)
            }
        };

        self.names.push(name.clone());
        self.frames.push(Frame {
            name,
            element: None,
            type_id: None,
            mode,
            model: None,
            attributes: AttributeResolver::new(self.settings.allow_xml_attributes),
            text: String::new(),
            text_error: false,
            nil: false,
            invalid: false,
        });
        if let Some((severity, message)) = root_finding {
            self.report(severity, ErrorCategory::Structural, message, None, None);
        }
        if mode != ProcessContents::Skip {
            self.assess_element(&schema, element, root_type, mode, &start);
        }
        self.state = SessionState::StartTag;

        if self.settings.process_identity_constraints {
            let element = self.frames.last().and_then(|f| f.element);
            self.identities
                .on_element_start(&schema, element, &self.names)?;
        }

        let frame = self.current()?;
        debug!(
            "push frame {} at depth {} ({})",
            frame.name,
            self.frames.len(),
            frame
                .type_id
                .map(|t| schema.type_name(t))
                .unwrap_or_else(|| "unassessed".to_string())
        );
        let info = SchemaInfo {
            validity: if frame.invalid {
                ValidityStatus::Invalid
            } else {
                ValidityStatus::NotKnown
            },
            element: frame.element,
            type_id: frame.type_id,
            nil: frame.nil,
            ..SchemaInfo::default()
        };
        self.outcome(info)
    }

    fn match_root(
        &self,
        schema: &Schema,
        name: &QName,
    ) -> (Option<ElementId>, ProcessContents, Option<(Severity, String)>) {
        match self.partial {
            Some(PartialTarget::Element(element)) => {
                let decl = schema.element(element);
                if decl.name == *name {
                    return (Some(element), ProcessContents::Strict, None);
                }
                let message = format!(
                    "root element '{}' does not match the partial validation element '{}'",
                    name, decl.name
                );
                return (None, ProcessContents::Lax, Some((Severity::Error, message)));
            }
            Some(PartialTarget::Type(_)) => return (None, ProcessContents::Strict, None),
            Some(PartialTarget::Attribute(attribute)) => {
                let message = format!(
                    "element '{}' cannot be validated when validating attribute '{}'",
                    name,
                    schema.attribute(attribute).name
                );
                return (None, ProcessContents::Lax, Some((Severity::Error, message)));
            }
            None => {}
        }
        if let Some(element) = schema.global_element(name) {
            return (Some(element), ProcessContents::Strict, None);
        }
        match self.settings.process_contents {
            ValidationMode::Skip => (None, ProcessContents::Skip, None),
            ValidationMode::Strict if schema.covers_namespace(name.namespace.as_deref()) => (
                None,
                ProcessContents::Lax,
                Some((
                    Severity::Error,
                    format!("no global declaration for root element '{}'", name),
                )),
            ),
            _ => (
                None,
                ProcessContents::Lax,
                Some((
                    Severity::Warning,
                    format!("no schema found for root element '{}'", name),
                )),
            ),
        }
    }

    fn match_child(&mut self, schema: &Schema, name: &QName) -> (Option<ElementId>, ProcessContents) {
        let Some(parent) = self.frames.last_mut() else {
            return (None, ProcessContents::Lax);
        };
        if parent.is_skipped() {
            return (None, ProcessContents::Skip);
        }
        if parent.nil {
            let message = format!("content in a nilled element: unexpected child '{}'", name);
            self.error(ErrorCategory::ContentModel, message);
            return (schema.global_element(name), ProcessContents::Lax);
        }
        let fixed_mixed = parent.element.is_some_and(|e| {
            let decl = schema.element(e);
            decl.fixed().is_some()
                && parent
                    .type_id
                    .and_then(|t| schema.complex_type(t))
                    .is_some_and(|ct| matches!(ct.content, ContentType::Mixed(_)))
        });

        let matched = parent
            .model
            .as_mut()
            .map(|state| (state.advance_in_place(name), state.expected()));
        let assessed = parent.type_id.is_some();
        let parent_name = parent.name.clone();
        if fixed_mixed {
            self.error(
                ErrorCategory::ContentModel,
                format!(
                    "element '{}' has a fixed value and cannot have child elements",
                    parent_name
                ),
            );
        }

        match matched {
            Some((Some(ParticleMatch::Element(element)), _)) => (Some(element), ProcessContents::Strict),
            Some((Some(ParticleMatch::Any(wildcard)), _)) => match wildcard.process_contents {
                ProcessContents::Skip => (None, ProcessContents::Skip),
                mode => {
                    let element = schema.global_element(name);
                    if element.is_none() && mode == ProcessContents::Strict {
                        self.error(
                            ErrorCategory::Structural,
                            format!(
                                "no global declaration for element '{}' matched by a strict wildcard",
                                name
                            ),
                        );
                    }
                    (element, mode)
                }
            },
            Some((None, expected)) => {
                self.error(
                    ErrorCategory::ContentModel,
                    format!(
                        "unexpected child element '{}' in '{}'{}",
                        name,
                        parent_name,
                        describe_expected(&expected)
                    ),
                );
                (schema.global_element(name), ProcessContents::Lax)
            }
            None => {
                if assessed {
                    self.error(
                        ErrorCategory::ContentModel,
                        format!("element '{}' cannot have child elements", parent_name),
                    );
                }
                (schema.global_element(name), ProcessContents::Lax)
            }
        }
    }

    // Resolve the governing type of the new top frame from its declaration
    // and xsi:type, then apply xsi:nil.
    fn assess_element(
        &mut self,
        schema: &Schema,
        element: Option<ElementId>,
        root_type: Option<TypeId>,
        mode: ProcessContents,
        start: &ElementStart,
    ) {
        let decl = element.map(|e| schema.element(e));
        let mut type_id = decl.map(|d| d.type_id).or(root_type);
        if let Some(decl) = decl {
            if decl.is_abstract {
                self.report(
                    Severity::Error,
                    ErrorCategory::Structural,
                    format!("element '{}' is abstract", decl.name),
                    element.map(SchemaComponent::Element),
                    None,
                );
            }
        }

        if let Some(lexical) = start.xsi_type.as_deref() {
            match self.namespaces.resolve(lexical.trim()) {
                None => self.report(
                    Severity::Error,
                    ErrorCategory::Lexical,
                    format!("invalid xsi:type value '{}'", lexical),
                    None,
                    Some(lexical),
                ),
                Some(qname) => match schema.global_type(&qname) {
                    None => {
                        let severity = match element.is_some() || mode == ProcessContents::Strict {
                            true => Severity::Error,
                            false => Severity::Warning,
                        };
                        self.report(
                            severity,
                            ErrorCategory::Structural,
                            format!("unknown xsi:type '{}'", qname),
                            None,
                            Some(lexical),
                        );
                    }
                    Some(xsi_type) => match type_id {
                        Some(declared)
                            if schema.is_derivation_blocked(
                                xsi_type,
                                declared,
                                decl.map(|d| d.block).unwrap_or_default(),
                            ) =>
                        {
                            self.report(
                                Severity::Error,
                                ErrorCategory::Structural,
                                format!(
                                    "xsi:type {} is not validly derived from {}",
                                    schema.type_name(xsi_type),
                                    schema.type_name(declared)
                                ),
                                Some(SchemaComponent::Type(xsi_type)),
                                Some(lexical),
                            );
                        }
                        _ => {
                            debug!("xsi:type {} substituted", schema.type_name(xsi_type));
                            type_id = Some(xsi_type);
                        }
                    },
                },
            }
        }

        if let Some(t) = type_id {
            if schema.type_def(t).is_abstract() {
                self.report(
                    Severity::Error,
                    ErrorCategory::Structural,
                    format!("type {} is abstract", schema.type_name(t)),
                    Some(SchemaComponent::Type(t)),
                    None,
                );
            }
        }

        let mut nil = false;
        if let Some(lexical) = start.xsi_nil.as_deref() {
            match lexical.trim() {
                "true" | "1" => nil = true,
                "false" | "0" => {}
                _ => self.report(
                    Severity::Error,
                    ErrorCategory::Lexical,
                    format!("invalid xsi:nil value '{}': not a boolean", lexical),
                    None,
                    Some(lexical),
                ),
            }
            if nil {
                match decl {
                    Some(decl) if !decl.nillable => {
                        self.report(
                            Severity::Error,
                            ErrorCategory::Structural,
                            format!("element '{}' is not nillable", decl.name),
                            element.map(SchemaComponent::Element),
                            None,
                        );
                        nil = false;
                    }
                    Some(decl) if decl.fixed().is_some() => self.report(
                        Severity::Error,
                        ErrorCategory::Structural,
                        format!("element '{}' has a fixed value and cannot be nilled", decl.name),
                        element.map(SchemaComponent::Element),
                        None,
                    ),
                    Some(_) => {}
                    None => nil = false,
                }
            }
        }

        let model = match type_id.map(|t| schema.type_def(t)) {
            Some(TypeDef::Complex(ct)) if !nil => ct.content.model().map(|m| schema.model(m).start()),
            _ => None,
        };
        if let Some(frame) = self.frames.last_mut() {
            frame.element = element;
            frame.type_id = type_id;
            frame.nil = nil;
            frame.model = model;
        }
    }

    /// Report an attribute of the current start tag, or the top-level
    /// attribute of a partial validation
    pub fn attribute(&mut self, local_name: &str, namespace: Option<&str>, value: &str) -> Result<SchemaInfo> {
        if let (Some(PartialTarget::Attribute(attribute)), SessionState::Content, true) =
            (self.partial, self.state, self.frames.is_empty())
        {
            return self.top_level_attribute(attribute, QName::new(namespace, local_name), value);
        }
        if self.state != SessionState::StartTag {
            return Err(self.misuse("attribute"));
        }
        let count = self.current()?.attributes.len() + 1;
        self.settings.limits.check_attributes(count)?;
        let schema = Arc::clone(&self.schema);
        let name = QName::new(namespace, local_name);

        let frame = self.current_mut()?;
        if frame.is_skipped() {
            return Ok(SchemaInfo::default());
        }
        let assessed = frame.type_id.is_some();
        let ctype = frame.type_id.and_then(|t| schema.complex_type(t));
        let matched = frame.attributes.resolve(&schema, ctype, &name);

        let info = match matched {
            AttributeMatch::Declared(use_def) => self.validate_attribute(
                &schema,
                &name,
                use_def.attribute,
                value,
                use_def.value_constraint.as_ref(),
                false,
            ),
            AttributeMatch::Wildcard { mode, decl } => match decl {
                Some(attribute) => {
                    let vc = schema.attribute(attribute).value_constraint.as_ref();
                    self.validate_attribute(&schema, &name, attribute, value, vc, false)
                }
                None => {
                    if mode == ProcessContents::Strict {
                        self.error(
                            ErrorCategory::Attribute,
                            format!(
                                "no global declaration for attribute '{}' matched by a strict wildcard",
                                name
                            ),
                        );
                    }
                    SchemaInfo::default()
                }
            },
            AttributeMatch::Undeclared if !assessed => match schema.global_attribute(&name) {
                Some(attribute) => {
                    let vc = schema.attribute(attribute).value_constraint.as_ref();
                    self.validate_attribute(&schema, &name, attribute, value, vc, false)
                }
                None => SchemaInfo::default(),
            },
            AttributeMatch::Undeclared => {
                self.error(ErrorCategory::Attribute, format!("attribute '{}' is not allowed", name));
                invalid_info()
            }
            AttributeMatch::Prohibited => {
                self.error(ErrorCategory::Attribute, format!("attribute '{}' is prohibited", name));
                invalid_info()
            }
            AttributeMatch::UnknownXsi => {
                self.error(ErrorCategory::Attribute, format!("unknown xsi attribute '{}'", name));
                invalid_info()
            }
            AttributeMatch::Duplicate => {
                self.error(ErrorCategory::Attribute, format!("duplicate attribute '{}'", name));
                invalid_info()
            }
            AttributeMatch::Xsi | AttributeMatch::Ignored => SchemaInfo::default(),
        };
        self.outcome(info)
    }

    fn top_level_attribute(&mut self, attribute: AttributeId, name: QName, value: &str) -> Result<SchemaInfo> {
        let schema = Arc::clone(&self.schema);
        let decl = schema.attribute(attribute);
        let info = if decl.name == name {
            let vc = decl.value_constraint.as_ref();
            self.validate_attribute(&schema, &name, attribute, value, vc, false)
        } else {
            self.error(
                ErrorCategory::Attribute,
                format!(
                    "attribute '{}' does not match the partial validation attribute '{}'",
                    name, decl.name
                ),
            );
            invalid_info()
        };
        self.outcome(info)
    }

    fn validate_attribute(
        &mut self,
        schema: &Schema,
        name: &QName,
        attribute: AttributeId,
        lexical: &str,
        value_constraint: Option<&ValueConstraint>,
        is_default: bool,
    ) -> SchemaInfo {
        let type_id = schema.attribute(attribute).type_id;
        let component = Some(SchemaComponent::Attribute(attribute));
        let result = validate(schema, type_id, lexical, &ValueContext::new(&self.namespaces));
        let mut info = SchemaInfo {
            validity: ValidityStatus::Valid,
            attribute: Some(attribute),
            type_id: Some(type_id),
            is_default,
            ..SchemaInfo::default()
        };
        match result {
            Ok(value) => {
                if let Some(fixed) = value_constraint.filter(|vc| vc.is_fixed()) {
                    if !fixed_matches(&value, fixed) {
                        self.report(
                            Severity::Error,
                            ErrorCategory::Facet,
                            format!(
                                "attribute '{}' must have the fixed value '{}'",
                                name, fixed.lexical
                            ),
                            component,
                            Some(lexical),
                        );
                        info.validity = ValidityStatus::Invalid;
                    }
                }
                self.track_ids(schema, type_id, &value);
                if self.settings.process_identity_constraints {
                    let errors = self.identities.on_attribute(schema, &self.names, name, &value);
                    for error in errors {
                        self.report(
                            Severity::Error,
                            ErrorCategory::Identity,
                            error.message,
                            Some(SchemaComponent::Constraint(error.constraint)),
                            None,
                        );
                    }
                }
                info.member_type = value.member_type;
                info.value = Some(value);
            }
            Err(error) => {
                self.report_value_error(error, component, lexical);
                info.validity = ValidityStatus::Invalid;
            }
        }
        info
    }

    /// Close the current start tag: check required attributes and apply
    /// attribute defaults. Returns the attributes added from a default or
    /// fixed value, in declaration order.
    pub fn end_of_attributes(&mut self) -> Result<Vec<(QName, SchemaInfo)>> {
        if self.state != SessionState::StartTag {
            return Err(self.misuse("end_of_attributes"));
        }
        let defaulted = self.complete_attributes()?;
        self.outcome(defaulted)
    }

    fn complete_attributes(&mut self) -> Result<Vec<(QName, SchemaInfo)>> {
        let schema = Arc::clone(&self.schema);
        let frame = self.current()?;
        let mut defaulted = Vec::new();
        if !frame.is_skipped() {
            let ctype = frame.type_id.and_then(|t| schema.complex_type(t));
            let completion = frame.attributes.finish(ctype);
            for name in completion.missing {
                self.error(
                    ErrorCategory::Attribute,
                    format!("missing required attribute '{}'", name),
                );
            }
            for synthesized in completion.synthesized {
                let vc = ctype
                    .and_then(|ct| ct.attribute_use(&synthesized.name))
                    .and_then(|u| u.value_constraint.clone());
                let info = self.validate_attribute(
                    &schema,
                    &synthesized.name,
                    synthesized.attribute,
                    &synthesized.lexical,
                    vc.as_ref(),
                    true,
                );
                defaulted.push((synthesized.name, info));
            }
        }
        self.state = SessionState::Content;
        Ok(defaulted)
    }

    /// Character data
    pub fn text(&mut self, value: &str) -> Result<()> {
        if self.state != SessionState::Content {
            return Err(self.misuse("text"));
        }
        let is_blank = value.chars().all(char::is_whitespace);
        let Some(frame) = self.frames.last_mut() else {
            return match is_blank {
                true => Ok(()),
                false => Err(Error::InvalidState(
                    "text outside the root element".to_string(),
                )),
            };
        };
        if frame.is_skipped() {
            return Ok(());
        }
        let schema = Arc::clone(&self.schema);

        if frame.nil {
            if !is_blank && !frame.text_error {
                frame.text_error = true;
                let message = format!("content in a nilled element '{}'", frame.name);
                self.error(ErrorCategory::ContentModel, message);
            }
            return self.outcome(());
        }
        let Some(type_id) = frame.type_id else {
            return Ok(());
        };
        let content = match schema.type_def(type_id) {
            TypeDef::Simple(_) => ContentType::Simple(type_id),
            TypeDef::Complex(ct) => ct.content,
        };
        match content {
            ContentType::Simple(_) => frame.text.push_str(value),
            ContentType::Mixed(_) => {
                if frame
                    .element
                    .is_some_and(|e| schema.element(e).value_constraint.is_some())
                {
                    frame.text.push_str(value);
                }
            }
            ContentType::Empty | ContentType::ElementOnly(_) if is_blank || frame.text_error => {}
            ContentType::Empty => {
                frame.text_error = true;
                let message = format!("element '{}' must have empty content", frame.name);
                self.error(ErrorCategory::ContentModel, message);
            }
            ContentType::ElementOnly(_) => {
                frame.text_error = true;
                let expected = frame.model.as_ref().map(|m| m.expected()).unwrap_or_default();
                let message = format!(
                    "character data not allowed in element-only content of '{}'{}",
                    frame.name,
                    describe_expected(&expected)
                );
                self.error(ErrorCategory::ContentModel, message);
            }
        }
        self.outcome(())
    }

    /// Close the current element
    pub fn end_element(&mut self) -> Result<SchemaInfo> {
        if self.frames.is_empty() || self.state == SessionState::Finished {
            return Err(self.misuse("end_element"));
        }
        if self.state == SessionState::StartTag {
            self.complete_attributes()?;
        }
        let schema = Arc::clone(&self.schema);
        let depth = self.frames.len();

        let frame = self.current_mut()?;
        let mut info = SchemaInfo {
            element: frame.element,
            type_id: frame.type_id,
            nil: frame.nil,
            ..SchemaInfo::default()
        };
        let (skipped, nil, type_id) = (frame.is_skipped(), frame.nil, frame.type_id);
        let simple = match type_id {
            Some(type_id) if !skipped && nil => has_simple_content(&schema, type_id),
            Some(type_id) if !skipped => self.check_content(&schema, type_id, &mut info),
            _ => true,
        };

        if self.settings.process_identity_constraints {
            let errors = self
                .identities
                .on_element_end(&schema, depth, info.value.as_ref(), nil, simple);
            for error in errors {
                self.report(
                    Severity::Error,
                    ErrorCategory::Identity,
                    error.message,
                    Some(SchemaComponent::Constraint(error.constraint)),
                    None,
                );
            }
        }

        let frame = self.pop_frame()?;
        info.validity = frame.validity();
        if frame.invalid {
            if let Some(parent) = self.frames.last_mut() {
                parent.invalid = true;
            }
        }
        debug!("pop frame {} at depth {} ({})", frame.name, depth, info.validity);
        self.outcome(info)
    }

    // Value, fixed value and completion checks of the closing element.
    // Returns whether the element has simple content.
    fn check_content(&mut self, schema: &Schema, type_id: TypeId, info: &mut SchemaInfo) -> bool {
        let Some(frame) = self.frames.last_mut() else {
            return false;
        };
        let text = mem::take(&mut frame.text);
        let model = frame.model.take();
        let element = frame.element;
        let name = frame.name.clone();
        let value_constraint = element.and_then(|e| schema.element(e).value_constraint.as_ref());

        let (simple_type, mixed) = match schema.type_def(type_id) {
            TypeDef::Simple(_) => (Some(type_id), false),
            TypeDef::Complex(ct) => (
                ct.content.simple_type(),
                matches!(ct.content, ContentType::Mixed(_)),
            ),
        };

        if let Some(simple_type) = simple_type {
            let default = value_constraint.filter(|_| text.is_empty());
            let value = match default.and_then(|vc| vc.value.clone()) {
                Some(value) => {
                    info.is_default = true;
                    Some(value)
                }
                None => {
                    let result = validate(schema, simple_type, &text, &ValueContext::new(&self.namespaces));
                    match result {
                        Ok(value) => Some(value),
                        Err(error) => {
                            self.report_value_error(error, element.map(SchemaComponent::Element), &text);
                            None
                        }
                    }
                }
            };
            if let Some(value) = value {
                if let Some(fixed) = value_constraint.filter(|vc| vc.is_fixed()) {
                    if !fixed_matches(&value, fixed) {
                        self.report(
                            Severity::Error,
                            ErrorCategory::Facet,
                            format!("element '{}' must have the fixed value '{}'", name, fixed.lexical),
                            element.map(SchemaComponent::Element),
                            Some(&text),
                        );
                    }
                }
                self.track_ids(schema, simple_type, &value);
                info.member_type = value.member_type;
                info.value = Some(value);
            }
        } else if mixed {
            if let Some(vc) = value_constraint {
                if text.is_empty() {
                    info.is_default = true;
                } else if vc.is_fixed() && text != vc.lexical {
                    self.report(
                        Severity::Error,
                        ErrorCategory::Facet,
                        format!("element '{}' must have the fixed value '{}'", name, vc.lexical),
                        element.map(SchemaComponent::Element),
                        Some(&text),
                    );
                }
            }
        }

        if let Some(model) = model {
            if !model.is_final() {
                self.error(
                    ErrorCategory::ContentModel,
                    format!(
                        "the content of element '{}' is not complete{}",
                        name,
                        describe_expected(&model.expected())
                    ),
                );
            }
        }
        simple_type.is_some()
    }

    /// Abandon validation of the current element's subtree. The caller
    /// does not push its remaining events.
    pub fn skip_to_end_element(&mut self) -> Result<SchemaInfo> {
        if self.frames.is_empty() || self.state == SessionState::Finished {
            return Err(self.misuse("skip_to_end_element"));
        }
        let depth = self.frames.len();
        if self.settings.process_identity_constraints {
            let schema = Arc::clone(&self.schema);
            // Findings about a skipped subtree are not reported
            let _ = self.identities.on_element_end(&schema, depth, None, false, true);
        }
        let frame = self.pop_frame()?;
        if frame.invalid {
            if let Some(parent) = self.frames.last_mut() {
                parent.invalid = true;
            }
        }
        debug!("skipped subtree of {} at depth {}", frame.name, depth);
        self.state = SessionState::Content;
        self.outcome(SchemaInfo {
            validity: ValidityStatus::NotKnown,
            element: frame.element,
            type_id: frame.type_id,
            nil: frame.nil,
            ..SchemaInfo::default()
        })
    }

    /// Finish the document: check deferred identity checks and IDREFs
    pub fn end_validation(&mut self) -> Result<()> {
        if self.state != SessionState::Content || !self.frames.is_empty() {
            return Err(self.misuse("end_validation"));
        }
        if self.settings.process_identity_constraints {
            if !self.identities.is_idle() {
                self.error(
                    ErrorCategory::Identity,
                    "identity constraint checks left unresolved at end of document".to_string(),
                );
            }
            let unresolved: Vec<String> = self.ids.unresolved().into_iter().map(str::to_string).collect();
            for idref in unresolved {
                self.report(
                    Severity::Error,
                    ErrorCategory::Identity,
                    format!("IDREF '{}' does not match any ID", idref),
                    None,
                    Some(&idref),
                );
            }
        }
        self.state = SessionState::Finished;
        debug!("validation finished");
        self.outcome(())
    }

    /// Discard all document state; the session can validate a new document
    pub fn reset(&mut self) {
        self.state = SessionState::Content;
        self.frames.clear();
        self.names.clear();
        self.namespaces = NamespaceContext::new();
        self.identities.reset();
        self.ids.clear();
        self.partial = None;
        self.failure = None;
    }

    /// Children the current element accepts next; global elements at the
    /// top level
    pub fn expected_particles(&self) -> Vec<Expected> {
        if let Some(frame) = self.frames.last() {
            return frame
                .model
                .as_ref()
                .map(|m| m.expected())
                .unwrap_or_default();
        }
        match self.partial {
            Some(PartialTarget::Element(element)) => vec![Expected::Element {
                name: self.schema.element(element).name.clone(),
                element,
            }],
            Some(_) => Vec::new(),
            None => self
                .schema
                .global_elements()
                .map(|(name, element)| Expected::Element {
                    name: name.clone(),
                    element,
                })
                .collect(),
        }
    }

    /// Attributes of the current element's type not observed yet
    pub fn expected_attributes(&self) -> Vec<QName> {
        let Some(frame) = self.frames.last() else {
            return match self.partial {
                Some(PartialTarget::Attribute(attribute)) => {
                    vec![self.schema.attribute(attribute).name.clone()]
                }
                _ => Vec::new(),
            };
        };
        let Some(ctype) = frame.type_id.and_then(|t| self.schema.complex_type(t)) else {
            return Vec::new();
        };
        ctype
            .attributes
            .iter()
            .filter(|(name, u)| u.use_mode != AttributeUse::Prohibited && !frame.attributes.contains(name))
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn pop_frame(&mut self) -> Result<Frame> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| Error::InvalidState("no open element".to_string()))?;
        self.names.pop();
        self.namespaces.pop_scope();
        self.state = SessionState::Content;
        Ok(frame)
    }

    fn current(&self) -> Result<&Frame> {
        self.frames
            .last()
            .ok_or_else(|| Error::InvalidState("no open element".to_string()))
    }

    fn current_mut(&mut self) -> Result<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| Error::InvalidState("no open element".to_string()))
    }

    fn misuse(&self, call: &str) -> Error {
        let state = match self.state {
            SessionState::Content if self.frames.is_empty() => "top level",
            SessionState::Content => "element content",
            SessionState::StartTag => "start tag",
            SessionState::Finished => "finished",
        };
        Error::InvalidState(format!("{} called in state '{}'", call, state))
    }

    fn track_ids(&mut self, schema: &Schema, type_id: TypeId, value: &TypedValue) {
        if !self.settings.process_identity_constraints {
            return;
        }
        let Some(def) = schema.simple_type(value.member_type.unwrap_or(type_id)) else {
            return;
        };
        let derives = |chain: &[TypeId], name: &str| {
            schema.builtin(name).is_some_and(|b| chain.contains(&b))
        };
        match &def.variety {
            Variety::Atomic if derives(&def.chain, XSD_ID) => {
                if !self.ids.add_id(&value.normalized) {
                    self.report(
                        Severity::Error,
                        ErrorCategory::Identity,
                        format!("duplicate ID '{}'", value.normalized),
                        Some(SchemaComponent::Type(type_id)),
                        Some(&value.normalized),
                    );
                }
            }
            Variety::Atomic if derives(&def.chain, XSD_IDREF) => self.ids.add_idref(&value.normalized),
            Variety::List { item } => {
                let item_is_idref = schema
                    .simple_type(*item)
                    .is_some_and(|item| derives(&item.chain, XSD_IDREF));
                if item_is_idref {
                    for idref in value.normalized.split_whitespace() {
                        self.ids.add_idref(idref);
                    }
                }
            }
            _ => {}
        }
    }

    fn path(&self) -> String {
        let mut path = String::new();
        for frame in &self.frames {
            path.push('/');
            path.push_str(&frame.name.to_string());
        }
        if path.is_empty() {
            path.push('/');
        }
        path
    }

    fn error(&mut self, category: ErrorCategory, message: String) {
        self.report(Severity::Error, category, message, None, None);
    }

    fn report_value_error(&mut self, error: ValueError, component: Option<SchemaComponent>, lexical: &str) {
        match error {
            ValueError::Lexical(e) => {
                self.report(Severity::Error, ErrorCategory::Lexical, e.to_string(), component, Some(lexical))
            }
            ValueError::Facets(violations) => {
                for violation in violations {
                    self.report(
                        Severity::Error,
                        ErrorCategory::Facet,
                        violation.to_string(),
                        component,
                        Some(lexical),
                    );
                }
            }
        }
    }

    fn report(
        &mut self,
        severity: Severity,
        category: ErrorCategory,
        message: String,
        component: Option<SchemaComponent>,
        instance: Option<&str>,
    ) {
        let mut error = ValidationError::new(message).with_path(self.path());
        if let Some(instance) = instance {
            error = error.with_instance(instance);
        }
        if let Some(component) = component {
            error = error.with_schema_component(component.describe(&self.schema));
        }
        if severity == Severity::Error {
            if let Some(frame) = self.frames.last_mut() {
                frame.invalid = true;
            }
        }
        self.emit(ValidationEvent {
            severity,
            category,
            error,
            component,
        });
    }

    fn emit(&mut self, event: ValidationEvent) {
        match self.handler.as_mut() {
            Some(handler) => {
                if event.is_error() || self.settings.report_warnings {
                    handler.handle(&event);
                }
            }
            None => {
                if event.is_error() && self.failure.is_none() {
                    self.failure = Some(event.error);
                }
            }
        }
    }

    fn outcome<T>(&mut self, value: T) -> Result<T> {
        match self.failure.take() {
            Some(error) => Err(Error::Validation(error)),
            None => Ok(value),
        }
    }
}

fn invalid_info() -> SchemaInfo {
    SchemaInfo {
        validity: ValidityStatus::Invalid,
        ..SchemaInfo::default()
    }
}

fn has_simple_content(schema: &Schema, type_id: TypeId) -> bool {
    match schema.type_def(type_id) {
        TypeDef::Simple(_) => true,
        TypeDef::Complex(ct) => ct.content.simple_type().is_some(),
    }
}

fn fixed_matches(value: &TypedValue, fixed: &ValueConstraint) -> bool {
    match &fixed.value {
        Some(expected) => compare(value, expected) == XsdOrdering::Equal,
        None => value.normalized == fixed.lexical,
    }
}

fn describe_expected(expected: &[Expected]) -> String {
    match expected {
        [] => String::new(),
        [one] => format!("; expected '{}'", one),
        many => {
            let names: Vec<String> = many.iter().map(|e| format!("'{}'", e)).collect();
            format!("; expected one of {}", names.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::attributes::{AttributeDecl, AttributeUseDef};
    use crate::validators::builders::SchemaBuilder;
    use crate::validators::complex_types::ComplexTypeDecl;
    use crate::validators::elements::ElementDecl;
    use crate::validators::facets::FacetSet;
    use crate::validators::particles::Particle;
    use std::cell::RefCell;
    use std::rc::Rc;

    // <a> holds one or more <b> of a positive int up to 5, plus an
    // optional code attribute
    fn schema() -> Arc<Schema> {
        let mut builder = SchemaBuilder::new(None);
        let int = builder.builtin("int").unwrap();
        let small = builder
            .restriction(Some("small"), int, FacetSet::new().max_inclusive("5"))
            .unwrap();
        let b = builder.add_element(ElementDecl::local(QName::local("b"), small).nillable());
        let code = builder.add_attribute(AttributeDecl::local(QName::local("code"), int));
        let ctype = builder
            .add_complex_type(
                ComplexTypeDecl::element_only(Particle::element(b).with_occurs(1, None))
                    .attribute(AttributeUseDef::optional(code)),
            )
            .unwrap();
        builder.add_element(ElementDecl::global(QName::local("a"), ctype));
        Arc::new(builder.build().unwrap())
    }

    fn collecting(schema: Arc<Schema>) -> (ValidationSession, Rc<RefCell<Vec<ValidationEvent>>>) {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        let session = ValidationSession::new(schema, ValidationSettings::default())
            .with_handler(move |event: &ValidationEvent| sink.borrow_mut().push(event.clone()));
        (session, events)
    }

    fn leaf(session: &mut ValidationSession, name: &str, text: &str) -> SchemaInfo {
        session.start_element(ElementStart::local(name)).unwrap();
        session.end_of_attributes().unwrap();
        session.text(text).unwrap();
        session.end_element().unwrap()
    }

    #[test]
    fn test_valid_document() {
        let (mut session, events) = collecting(schema());
        session.start_element(ElementStart::local("a")).unwrap();
        let code = session.attribute("code", None, " 12 ").unwrap();
        assert!(code.is_valid());
        session.end_of_attributes().unwrap();
        let b = leaf(&mut session, "b", "5");
        assert!(b.is_valid());
        assert!(b.value.is_some());
        leaf(&mut session, "b", "4");
        let a = session.end_element().unwrap();
        session.end_validation().unwrap();
        assert!(a.is_valid());
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn test_errors_are_local() {
        let (mut session, events) = collecting(schema());
        session.start_element(ElementStart::local("a")).unwrap();
        session.end_of_attributes().unwrap();
        let bad = leaf(&mut session, "b", "x");
        let good = leaf(&mut session, "b", "2");
        let facet = leaf(&mut session, "b", "9");
        let a = session.end_element().unwrap();

        assert_eq!(bad.validity, ValidityStatus::Invalid);
        assert!(good.is_valid());
        assert_eq!(facet.validity, ValidityStatus::Invalid);
        assert_eq!(a.validity, ValidityStatus::Invalid);
        let categories: Vec<ErrorCategory> = events.borrow().iter().map(|e| e.category).collect();
        assert_eq!(categories, vec![ErrorCategory::Lexical, ErrorCategory::Facet]);
        assert_eq!(events.borrow()[0].error.path.as_deref(), Some("/a/b"));
    }

    #[test]
    fn test_incomplete_and_unexpected_content() {
        let (mut session, events) = collecting(schema());
        session.start_element(ElementStart::local("a")).unwrap();
        session.end_of_attributes().unwrap();
        session.text("stray").unwrap();
        let a = session.end_element().unwrap();
        assert_eq!(a.validity, ValidityStatus::Invalid);
        let messages: Vec<String> = events.borrow().iter().map(|e| e.message().to_string()).collect();
        assert_eq!(
            messages,
            vec![
                "character data not allowed in element-only content of 'a'; expected 'b'",
                "the content of element 'a' is not complete; expected 'b'",
            ]
        );

        events.borrow_mut().clear();
        session.reset();
        session.start_element(ElementStart::local("a")).unwrap();
        session.end_of_attributes().unwrap();
        let c = leaf(&mut session, "c", "1");
        assert_eq!(c.validity, ValidityStatus::NotKnown);
        leaf(&mut session, "b", "1");
        session.end_element().unwrap();
        assert_eq!(events.borrow().len(), 1);
        assert_eq!(events.borrow()[0].category, ErrorCategory::ContentModel);
    }

    #[test]
    fn test_attribute_checks() {
        let (mut session, events) = collecting(schema());
        session.start_element(ElementStart::local("a")).unwrap();
        session.attribute("code", None, "1").unwrap();
        session.attribute("code", None, "2").unwrap();
        session.attribute("other", None, "2").unwrap();
        session
            .attribute("bogus", Some(crate::XSI_NAMESPACE), "1")
            .unwrap();
        session
            .attribute("lang", Some(crate::XML_NAMESPACE), "en")
            .unwrap();
        session.end_of_attributes().unwrap();
        let messages: Vec<String> = events.borrow().iter().map(|e| e.message().to_string()).collect();
        assert_eq!(
            messages,
            vec![
                "duplicate attribute 'code'",
                "attribute 'other' is not allowed",
                format!("unknown xsi attribute '{{{}}}bogus'", crate::XSI_NAMESPACE).as_str(),
            ]
        );
        assert_eq!(session.expected_attributes(), Vec::<QName>::new());
    }

    #[test]
    fn test_nil_handling() {
        let (mut session, events) = collecting(schema());
        session.start_element(ElementStart::local("a")).unwrap();
        session.end_of_attributes().unwrap();
        session
            .start_element(ElementStart::local("b").with_xsi_nil("true"))
            .unwrap();
        session.end_of_attributes().unwrap();
        let b = session.end_element().unwrap();
        assert!(b.nil);
        assert!(b.is_valid());

        session
            .start_element(ElementStart::local("b").with_xsi_nil("true"))
            .unwrap();
        session.end_of_attributes().unwrap();
        session.text("3").unwrap();
        let b = session.end_element().unwrap();
        assert_eq!(b.validity, ValidityStatus::Invalid);

        session
            .start_element(ElementStart::local("b").with_xsi_nil("maybe"))
            .unwrap();
        session.end_of_attributes().unwrap();
        session.text("3").unwrap();
        session.end_element().unwrap();
        session.end_element().unwrap();

        let categories: Vec<ErrorCategory> = events.borrow().iter().map(|e| e.category).collect();
        assert_eq!(categories, vec![ErrorCategory::ContentModel, ErrorCategory::Lexical]);
    }

    #[test]
    fn test_misuse_leaves_state() {
        let (mut session, _events) = collecting(schema());
        assert!(matches!(session.attribute("x", None, "1"), Err(Error::InvalidState(_))));
        assert!(matches!(session.end_element(), Err(Error::InvalidState(_))));
        session.start_element(ElementStart::local("a")).unwrap();
        assert!(matches!(session.text("x"), Err(Error::InvalidState(_))));
        assert!(matches!(
            session.start_element(ElementStart::local("b")),
            Err(Error::InvalidState(_))
        ));
        assert!(matches!(session.end_validation(), Err(Error::InvalidState(_))));
        session.end_of_attributes().unwrap();
        assert_eq!(session.depth(), 1);
        session.skip_to_end_element().unwrap();
        session.end_validation().unwrap();
        assert!(session.is_finished());
        assert!(matches!(
            session.start_element(ElementStart::local("a")),
            Err(Error::InvalidState(_))
        ));
        session.reset();
        assert!(!session.is_finished());
    }

    #[test]
    fn test_fail_closed_without_handler() {
        let mut session = ValidationSession::new(schema(), ValidationSettings::default());
        session.start_element(ElementStart::local("a")).unwrap();
        session.end_of_attributes().unwrap();
        session.start_element(ElementStart::local("b")).unwrap();
        session.end_of_attributes().unwrap();
        session.text("x").unwrap();
        let err = session.end_element().unwrap_err();
        match err {
            Error::Validation(e) => assert_eq!(e.instance.as_deref(), Some("x")),
            other => panic!("unexpected {:?}", other),
        }
        // the element was still closed
        assert_eq!(session.depth(), 1);
        leaf(&mut session, "b", "1");
        session.end_element().unwrap();
    }

    #[test]
    fn test_undeclared_root() {
        let (mut session, events) = collecting(schema());
        session.start_element(ElementStart::local("zzz")).unwrap();
        session.end_of_attributes().unwrap();
        let info = session.end_element().unwrap();
        assert_eq!(info.validity, ValidityStatus::Invalid);
        assert_eq!(events.borrow().len(), 1);

        let settings = ValidationSettings::default()
            .with_process_contents(ValidationMode::Lax)
            .with_warnings(true);
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        let mut session = ValidationSession::new(schema(), settings)
            .with_handler(move |e: &ValidationEvent| sink.borrow_mut().push(e.clone()));
        session.start_element(ElementStart::local("zzz")).unwrap();
        let info = session.end_element().unwrap();
        assert_eq!(info.validity, ValidityStatus::NotKnown);
        assert_eq!(events.borrow()[0].severity, Severity::Warning);
    }

    #[test]
    fn test_depth_limit() {
        let mut settings = ValidationSettings::default();
        settings.limits.max_xml_depth = 1;
        let mut session = ValidationSession::new(schema(), settings);
        session.start_element(ElementStart::local("a")).unwrap();
        session.end_of_attributes().unwrap();
        assert!(matches!(
            session.start_element(ElementStart::local("b")),
            Err(Error::LimitExceeded(_))
        ));
    }

    #[test]
    fn test_expected_particles() {
        let (mut session, _events) = collecting(schema());
        let roots: Vec<String> = session.expected_particles().iter().map(|e| e.to_string()).collect();
        assert_eq!(roots, vec!["a"]);
        session.start_element(ElementStart::local("a")).unwrap();
        assert_eq!(session.expected_attributes(), vec![QName::local("code")]);
        session.end_of_attributes().unwrap();
        let children: Vec<String> = session.expected_particles().iter().map(|e| e.to_string()).collect();
        assert_eq!(children, vec!["b"]);
    }
}
