//! XSD schema builder
//!
//! [`SchemaBuilder`] assembles a [`Schema`] arena from component
//! declarations. Components are added bottom-up and referenced by the ids
//! the builder hands out. [`SchemaBuilder::build`] then runs the checks that
//! need the whole graph: substitution groups, content model compilation
//! (including Unique Particle Attribution), default and fixed values and
//! keyref resolution.

use std::mem;
use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;

use crate::error::{ParseError, Result};
use crate::namespaces::{NamespaceContext, QName};
use crate::xpath::ElementSelector;
use crate::XSD_1_0_NAMESPACE;

use super::attributes::AttributeDecl;
use super::base::DerivationMethod;
use super::builtins::{BuiltinType, Primitive, BUILTIN_TYPES, XSD_ANY_SIMPLE_TYPE, XSD_ANY_TYPE};
use super::complex_types::{ComplexTypeDecl, ComplexTypeDef, ContentDecl, ContentType};
use super::elements::{ElementDecl, Scope, ValueConstraint};
use super::facets::{CompiledFacets, EffectiveFacets, FacetSet, WhiteSpace};
use super::identities::{IdentityConstraint, IdentityConstraintDecl, IdentityKind};
use super::models::ContentModel;
use super::particles::{Particle, Term};
use super::schemas::{AttributeId, ConstraintId, ElementId, ModelId, Schema, TypeDef, TypeId};
use super::simple_types::{compile_facets, validate, SimpleTypeDef, ValueContext, Variety};
use super::wildcards::{ProcessContents, Wildcard};

/// Builder of a compiled [`Schema`]
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    schema: Schema,
    namespaces: NamespaceContext,
    particles: Vec<Option<Particle>>,
    keyrefs: Vec<(ConstraintId, QName)>,
    errors: Vec<ParseError>,
}

impl SchemaBuilder {
    /// New builder for `target_namespace`, holding `xs:anyType` and every
    /// built-in simple type
    pub fn new(target_namespace: Option<&str>) -> Self {
        let mut builder = Self {
            schema: Schema::empty(target_namespace),
            namespaces: NamespaceContext::new(),
            particles: Vec::new(),
            keyrefs: Vec::new(),
            errors: Vec::new(),
        };
        builder.register_any_type();
        builder.register_builtins();
        builder
    }

    fn register_any_type(&mut self) {
        let wildcard = Wildcard::any(ProcessContents::Lax);
        let model = self.reserve_model(Particle::sequence(vec![
            Particle::any(wildcard.clone()).with_occurs(0, None)
        ]));
        let id = self.register_type(TypeDef::Complex(ComplexTypeDef {
            name: Some(QName::namespaced(XSD_1_0_NAMESPACE, XSD_ANY_TYPE)),
            base: None,
            derivation: DerivationMethod::Restriction,
            content: ContentType::Mixed(model),
            attributes: IndexMap::new(),
            attribute_wildcard: Some(wildcard),
            is_abstract: false,
            block: Default::default(),
            final_set: Default::default(),
        }));
        self.schema.any_type = id;
        self.schema.builtins.insert(XSD_ANY_TYPE, id);
    }

    fn register_builtins(&mut self) {
        let registry: &'static [BuiltinType] = BUILTIN_TYPES.as_slice();
        for builtin in registry {
            let id = TypeId(self.schema.types.len());
            let base = builtin
                .base_type
                .and_then(|name| self.schema.builtins.get(name).copied());
            let name = Some(QName::namespaced(XSD_1_0_NAMESPACE, builtin.name));
            let item = builtin
                .item_type
                .and_then(|item| self.schema.builtins.get(item).copied());

            let def = match item {
                Some(item) => SimpleTypeDef {
                    name,
                    base,
                    variety: Variety::List { item },
                    primitive: Primitive::AnySimpleType,
                    builtin: None,
                    chain: vec![id, self.schema.any_simple_type],
                    facets: CompiledFacets::default(),
                    effective: EffectiveFacets::unconstrained(WhiteSpace::Collapse),
                    final_set: Default::default(),
                },
                None => {
                    let mut chain = vec![id];
                    if let Some(base_def) = base.and_then(|b| self.schema.simple_type(b)) {
                        chain.extend(base_def.chain.iter().copied());
                    }
                    SimpleTypeDef {
                        name,
                        base,
                        variety: Variety::Atomic,
                        primitive: builtin.primitive,
                        builtin: Some(builtin),
                        chain,
                        facets: CompiledFacets::default(),
                        effective: EffectiveFacets::unconstrained(builtin.white_space),
                        final_set: Default::default(),
                    }
                }
            };
            self.register_type(TypeDef::Simple(def));
            self.schema.builtins.insert(builtin.name, id);
            if builtin.name == XSD_ANY_SIMPLE_TYPE {
                self.schema.any_simple_type = id;
            }
        }
    }

    fn register_type(&mut self, def: TypeDef) -> TypeId {
        let id = TypeId(self.schema.types.len());
        if let Some(name) = def.name().cloned() {
            if self.schema.global_types.insert(name.clone(), id).is_some() {
                self.errors
                    .push(ParseError::new(format!("duplicate type definition '{}'", name)));
            }
        }
        self.schema.types.push(def);
        id
    }

    fn reserve_model(&mut self, particle: Particle) -> ModelId {
        let id = ModelId(self.schema.models.len());
        self.schema.models.push(Arc::new(ContentModel::empty()));
        self.particles.push(Some(particle));
        id
    }

    fn target_name(&self, local: &str) -> QName {
        QName::new(self.schema.target_namespace.as_deref(), local)
    }

    fn check_type(&self, id: TypeId) -> Result<&TypeDef> {
        self.schema
            .types
            .get(id.0)
            .ok_or_else(|| ParseError::new(format!("unknown type {}", id)).into())
    }

    /// Bind a prefix for QName-valued facets, defaults and identity paths
    pub fn bind_prefix(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.namespaces.add_prefix(prefix, uri);
    }

    /// Built-in type by local name
    pub fn builtin(&self, name: &str) -> Option<TypeId> {
        self.schema.builtin(name)
    }

    /// `xs:anyType`
    pub fn any_type(&self) -> TypeId {
        self.schema.any_type
    }

    /// Look up a global element added so far
    pub fn global_element(&self, name: &QName) -> Option<ElementId> {
        self.schema.global_element(name)
    }

    /// Look up a global type added so far
    pub fn global_type(&self, name: &QName) -> Option<TypeId> {
        self.schema.global_type(name)
    }

    /// Derive a simple type by restriction. Facet values are parsed against
    /// `base`; inapplicable and widening facets are rejected.
    pub fn restriction(&mut self, name: Option<&str>, base: TypeId, facets: FacetSet) -> Result<TypeId> {
        self.check_type(base)?;
        let base_name = self.schema.type_name(base);
        if self
            .schema
            .simple_type(base)
            .is_some_and(|def| def.final_set.restriction)
        {
            return Err(ParseError::new(format!("{} is final for restriction", base_name)).into());
        }
        let ctx = ValueContext::new(&self.namespaces);
        let compiled = compile_facets(&self.schema, base, &facets, &ctx)?;
        let base_def = self
            .schema
            .simple_type(base)
            .ok_or_else(|| ParseError::new(format!("base type {} is not simple", base_name)))?;

        let id = TypeId(self.schema.types.len());
        let mut chain = vec![id];
        chain.extend(base_def.chain.iter().copied());
        let def = SimpleTypeDef {
            name: name.map(|n| self.target_name(n)),
            base: Some(base),
            variety: base_def.variety.clone(),
            primitive: base_def.primitive,
            builtin: base_def.builtin,
            chain,
            effective: base_def.effective.derive(&compiled),
            facets: compiled,
            final_set: Default::default(),
        };
        Ok(self.register_type(TypeDef::Simple(def)))
    }

    /// Define a list type of `item`
    pub fn list(&mut self, name: Option<&str>, item: TypeId) -> TypeId {
        match self.schema.simple_type(item) {
            Some(def) if matches!(def.variety, Variety::List { .. }) => self.errors.push(
                ParseError::new(format!("list item type {} is a list", self.schema.type_name(item))),
            ),
            Some(_) => {}
            None => self
                .errors
                .push(ParseError::new(format!("list item type {} is not simple", item))),
        }
        self.derived_by_variety(name, Variety::List { item })
    }

    /// Define a union of `members`, tried in order
    pub fn union(&mut self, name: Option<&str>, members: Vec<TypeId>) -> TypeId {
        if members.is_empty() {
            self.errors
                .push(ParseError::new("union type has no member types"));
        }
        for member in &members {
            if self.schema.simple_type(*member).is_none() {
                self.errors
                    .push(ParseError::new(format!("union member {} is not simple", member)));
            }
        }
        self.derived_by_variety(name, Variety::Union { members })
    }

    fn derived_by_variety(&mut self, name: Option<&str>, variety: Variety) -> TypeId {
        let id = TypeId(self.schema.types.len());
        let any_simple = self.schema.any_simple_type;
        let def = SimpleTypeDef {
            name: name.map(|n| self.target_name(n)),
            base: Some(any_simple),
            variety,
            primitive: Primitive::AnySimpleType,
            builtin: None,
            chain: vec![id, any_simple],
            facets: CompiledFacets::default(),
            effective: EffectiveFacets::unconstrained(WhiteSpace::Collapse),
            final_set: Default::default(),
        };
        self.register_type(TypeDef::Simple(def))
    }

    /// Add a complex type. Extension prepends the base content and
    /// inherits attribute uses; restriction inherits attribute uses only.
    pub fn add_complex_type(&mut self, decl: ComplexTypeDecl) -> Result<TypeId> {
        let (base, derivation) = decl
            .base
            .unwrap_or((self.schema.any_type, DerivationMethod::Restriction));
        let base_def = self.check_type(base)?;
        if base_def.final_set().is_blocked(derivation) {
            return Err(ParseError::new(format!(
                "{} is final for {}",
                self.schema.type_name(base),
                derivation
            ))
            .into());
        }

        let extension = derivation == DerivationMethod::Extension;
        let mut attributes = IndexMap::new();
        let mut attribute_wildcard = decl.attribute_wildcard.clone();
        let mut inherited = None;
        match base_def {
            TypeDef::Complex(base_ct) if base != self.schema.any_type || extension => {
                attributes = base_ct.attributes.clone();
                if extension {
                    if attribute_wildcard.is_none() {
                        attribute_wildcard = base_ct.attribute_wildcard.clone();
                    }
                    inherited = Some(base_ct.content);
                }
            }
            TypeDef::Simple(_) if extension => inherited = Some(ContentType::Simple(base)),
            TypeDef::Simple(_) => {
                return Err(ParseError::new(format!(
                    "complex type cannot restrict simple type {}",
                    self.schema.type_name(base)
                ))
                .into())
            }
            _ => {}
        }

        for attribute_use in &decl.attributes {
            let attribute = self.schema.attributes.get(attribute_use.attribute.0).ok_or_else(|| {
                ParseError::new(format!("unknown attribute {}", attribute_use.attribute))
            })?;
            attributes.insert(attribute.name.clone(), attribute_use.clone());
        }

        let inherited_particle = inherited
            .and_then(|content| content.model())
            .and_then(|model| self.particles.get(model.0).cloned().flatten());
        let content = match decl.content {
            ContentDecl::Empty => match inherited {
                Some(content) if extension => content,
                _ => ContentType::Empty,
            },
            ContentDecl::Simple(type_id) => {
                if self.schema.simple_type(type_id).is_none() {
                    return Err(ParseError::new(format!(
                        "simple content type {} is not simple",
                        self.schema.type_name(type_id)
                    ))
                    .into());
                }
                ContentType::Simple(type_id)
            }
            ContentDecl::ElementOnly(particle) => {
                let particle = extend_particle(inherited_particle, particle);
                ContentType::ElementOnly(self.reserve_model(particle))
            }
            ContentDecl::Mixed(particle) => {
                let particle = extend_particle(inherited_particle, particle);
                ContentType::Mixed(self.reserve_model(particle))
            }
        };

        Ok(self.register_type(TypeDef::Complex(ComplexTypeDef {
            name: decl.name,
            base: Some(base),
            derivation,
            content,
            attributes,
            attribute_wildcard,
            is_abstract: decl.is_abstract,
            block: decl.block,
            final_set: decl.final_set,
        })))
    }

    /// Add an element declaration; global declarations become reachable
    /// by name
    pub fn add_element(&mut self, decl: ElementDecl) -> ElementId {
        let id = ElementId(self.schema.elements.len());
        if decl.type_id.0 >= self.schema.types.len() {
            self.errors.push(ParseError::new(format!(
                "element '{}' has unknown type {}",
                decl.name, decl.type_id
            )));
        }
        if decl.is_global() && self.schema.global_elements.insert(decl.name.clone(), id).is_some() {
            self.errors
                .push(ParseError::new(format!("duplicate element declaration '{}'", decl.name)));
        }
        self.schema.elements.push(decl);
        id
    }

    /// Set the type of an element added earlier, for recursive content
    pub fn set_element_type(&mut self, element: ElementId, type_id: TypeId) -> Result<()> {
        self.check_type(type_id)?;
        let decl = self
            .schema
            .elements
            .get_mut(element.0)
            .ok_or_else(|| ParseError::new(format!("unknown element {}", element)))?;
        decl.type_id = type_id;
        Ok(())
    }

    /// Add an attribute declaration; global declarations become reachable
    /// by name
    pub fn add_attribute(&mut self, decl: AttributeDecl) -> AttributeId {
        let id = AttributeId(self.schema.attributes.len());
        if self.schema.simple_type(decl.type_id).is_none() {
            self.errors.push(ParseError::new(format!(
                "attribute '{}' must have a simple type",
                decl.name
            )));
        }
        if decl.scope == Scope::Global
            && self.schema.global_attributes.insert(decl.name.clone(), id).is_some()
        {
            self.errors.push(ParseError::new(format!(
                "duplicate attribute declaration '{}'",
                decl.name
            )));
        }
        self.schema.attributes.push(decl);
        id
    }

    /// Declare an identity constraint on `element`. Paths are compiled
    /// now; a keyref's `refer` is resolved by [`build`](Self::build).
    pub fn add_identity_constraint(
        &mut self,
        element: ElementId,
        decl: IdentityConstraintDecl,
    ) -> Result<ConstraintId> {
        if element.0 >= self.schema.elements.len() {
            return Err(ParseError::new(format!("unknown element {}", element)).into());
        }
        if self.schema.constraints.iter().any(|c| c.name == decl.name) {
            return Err(ParseError::new(format!(
                "duplicate identity constraint '{}'",
                decl.name
            ))
            .into());
        }
        if decl.fields.is_empty() {
            return Err(ParseError::new(format!("{} '{}' has no fields", decl.kind, decl.name)).into());
        }

        let mut namespaces = self.namespaces.clone();
        namespaces.push_scope();
        for (prefix, uri) in &decl.namespaces {
            namespaces.add_prefix(prefix.as_str(), uri.as_str());
        }
        let location = format!("{} '{}'", decl.kind, decl.name);
        let selector = ElementSelector::selector(&decl.selector, &namespaces)
            .map_err(|e| with_location(e, &location))?;
        let fields = decl
            .fields
            .iter()
            .map(|field| ElementSelector::field(field, &namespaces))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| with_location(e, &location))?;

        let id = ConstraintId(self.schema.constraints.len());
        match (decl.kind, decl.refer) {
            (IdentityKind::Keyref, Some(refer)) => self.keyrefs.push((id, refer)),
            (IdentityKind::Keyref, None) => {
                return Err(ParseError::new(format!("{} has no refer", location)).into())
            }
            _ => {}
        }
        self.schema.constraints.push(IdentityConstraint {
            name: decl.name,
            kind: decl.kind,
            refer: None,
            selector,
            fields,
            element,
        });
        self.schema.elements[element.0].constraints.push(id);
        Ok(id)
    }

    /// Finish the schema
    pub fn build(mut self) -> Result<Schema> {
        if !self.errors.is_empty() {
            return Err(self.errors.swap_remove(0).into());
        }
        self.check_substitution_groups()?;
        self.compile_models()?;
        self.resolve_value_constraints()?;
        self.resolve_keyrefs()?;
        debug!(
            "built schema {:?}: {} types, {} elements, {} models",
            self.schema.target_namespace,
            self.schema.types.len(),
            self.schema.elements.len(),
            self.schema.models.len()
        );
        Ok(self.schema)
    }

    fn check_substitution_groups(&self) -> Result<()> {
        for (i, decl) in self.schema.elements.iter().enumerate() {
            let Some(head) = decl.substitution_group else {
                continue;
            };
            let head_decl = self
                .schema
                .elements
                .get(head.0)
                .ok_or_else(|| ParseError::new(format!("unknown substitution group head {}", head)))?;
            if !head_decl.is_global() || !decl.is_global() {
                return Err(ParseError::new(format!(
                    "substitution group of '{}' must join global declarations",
                    decl.name
                ))
                .into());
            }
            let Some(steps) = self.schema.derivation_steps(decl.type_id, head_decl.type_id) else {
                return Err(ParseError::new(format!(
                    "type of '{}' is not derived from the type of its head '{}'",
                    decl.name, head_decl.name
                ))
                .into());
            };
            if steps.iter().any(|m| head_decl.final_set.is_blocked(*m)) {
                return Err(ParseError::new(format!(
                    "'{}' is final for the derivation of '{}'",
                    head_decl.name, decl.name
                ))
                .into());
            }

            let mut seen = vec![ElementId(i)];
            let mut current = Some(head);
            while let Some(h) = current {
                if seen.contains(&h) {
                    return Err(ParseError::new(format!(
                        "circular substitution group at '{}'",
                        decl.name
                    ))
                    .into());
                }
                seen.push(h);
                current = self.schema.elements.get(h.0).and_then(|e| e.substitution_group);
            }
        }
        Ok(())
    }

    fn compile_models(&mut self) -> Result<()> {
        let mut compiled = Vec::new();
        for (i, particle) in self.particles.iter().enumerate() {
            let Some(particle) = particle else {
                continue;
            };
            for p in particle.iter() {
                if let Term::Element(id) = p.term {
                    if id.0 >= self.schema.elements.len() {
                        return Err(ParseError::new(format!("unknown element {} in particle", id)).into());
                    }
                }
            }
            let schema = &self.schema;
            let model = ContentModel::compile(particle, |id| substitutes(schema, id))
                .map_err(|e| with_location(e, &self.model_owner(ModelId(i))))?;
            compiled.push((i, model));
        }
        for (i, model) in compiled {
            self.schema.models[i] = Arc::new(model);
        }
        Ok(())
    }

    fn model_owner(&self, model: ModelId) -> String {
        self.schema
            .types
            .iter()
            .enumerate()
            .find(|(_, def)| matches!(def, TypeDef::Complex(ct) if ct.content.model() == Some(model)))
            .map(|(i, _)| format!("complex type {}", self.schema.type_name(TypeId(i))))
            .unwrap_or_else(|| format!("content model {}", model))
    }

    fn resolve_value_constraints(&mut self) -> Result<()> {
        let ctx = ValueContext::new(&self.namespaces);
        let schema = &self.schema;

        let mut element_values = Vec::new();
        for (i, decl) in schema.elements.iter().enumerate() {
            let Some(vc) = &decl.value_constraint else {
                continue;
            };
            let simple = match schema.type_def(decl.type_id) {
                TypeDef::Simple(_) => Some(decl.type_id),
                TypeDef::Complex(ct) => match ct.content {
                    ContentType::Simple(type_id) => Some(type_id),
                    ContentType::Mixed(_) => None,
                    ContentType::Empty | ContentType::ElementOnly(_) => {
                        return Err(ParseError::new(format!(
                            "element '{}' has a value constraint but {} content",
                            decl.name,
                            ct.content.label()
                        ))
                        .into())
                    }
                },
            };
            if let Some(type_id) = simple {
                let value = checked_value(schema, type_id, vc, &ctx, &decl.name)?;
                element_values.push((i, value));
            }
        }

        let mut attribute_values = Vec::new();
        for (i, decl) in schema.attributes.iter().enumerate() {
            if let Some(vc) = &decl.value_constraint {
                let value = checked_value(schema, decl.type_id, vc, &ctx, &decl.name)?;
                attribute_values.push((i, value));
            }
        }

        let mut use_values = Vec::new();
        for (t, def) in schema.types.iter().enumerate() {
            let TypeDef::Complex(ct) = def else {
                continue;
            };
            for (name, attribute_use) in &ct.attributes {
                let decl = schema.attribute(attribute_use.attribute);
                let Some(vc) = attribute_use
                    .value_constraint
                    .as_ref()
                    .or(decl.value_constraint.as_ref())
                else {
                    continue;
                };
                let mut vc = vc.clone();
                vc.value = Some(checked_value(schema, decl.type_id, &vc, &ctx, name)?);
                use_values.push((t, name.clone(), vc));
            }
        }

        for (i, value) in element_values {
            if let Some(vc) = self.schema.elements[i].value_constraint.as_mut() {
                vc.value = Some(value);
            }
        }
        for (i, value) in attribute_values {
            if let Some(vc) = self.schema.attributes[i].value_constraint.as_mut() {
                vc.value = Some(value);
            }
        }
        for (t, name, vc) in use_values {
            if let TypeDef::Complex(ct) = &mut self.schema.types[t] {
                if let Some(attribute_use) = ct.attributes.get_mut(&name) {
                    attribute_use.value_constraint = Some(vc);
                }
            }
        }
        Ok(())
    }

    fn resolve_keyrefs(&mut self) -> Result<()> {
        for (keyref, refer) in mem::take(&mut self.keyrefs) {
            let constraints = &self.schema.constraints;
            let decl = &constraints[keyref.0];
            let target = constraints
                .iter()
                .position(|c| c.name == refer && c.kind != IdentityKind::Keyref)
                .ok_or_else(|| {
                    ParseError::new(format!("{} refers to unknown key '{}'", decl, refer))
                })?;
            if constraints[target].fields.len() != decl.fields.len() {
                return Err(ParseError::new(format!(
                    "{} has {} fields but {} has {}",
                    decl,
                    decl.fields.len(),
                    constraints[target],
                    constraints[target].fields.len()
                ))
                .into());
            }
            let target = ConstraintId(target);
            self.schema.constraints[keyref.0].refer = Some(target);
            self.schema.referenced.insert(target);
        }
        Ok(())
    }
}

fn extend_particle(base: Option<Particle>, particle: Particle) -> Particle {
    match base {
        Some(base) => Particle::sequence(vec![base, particle]),
        None => particle,
    }
}

fn with_location(error: crate::error::Error, location: &str) -> crate::error::Error {
    match error {
        crate::error::Error::Parse(e) => e.with_location(location).into(),
        other => other,
    }
}

fn checked_value(
    schema: &Schema,
    type_id: TypeId,
    vc: &ValueConstraint,
    ctx: &ValueContext<'_>,
    owner: &QName,
) -> Result<super::simple_types::TypedValue> {
    validate(schema, type_id, &vc.lexical, ctx).map_err(|e| {
        ParseError::new(format!(
            "value constraint '{}' of '{}' is not valid for {}",
            vc.lexical,
            owner,
            schema.type_name(type_id)
        ))
        .with_source(e.to_string())
        .into()
    })
}

/// Names an element particle answers to: the element itself, then the
/// members of its substitution group that are not abstract and whose
/// derivation the head does not block
fn substitutes(schema: &Schema, head: ElementId) -> Vec<(QName, ElementId)> {
    let head_decl = schema.element(head);
    let mut names = vec![(head_decl.name.clone(), head)];
    if head_decl.block.substitution {
        return names;
    }
    let mut group = vec![head];
    let mut next = 0;
    while next < group.len() {
        let current = group[next];
        next += 1;
        for (i, decl) in schema.elements.iter().enumerate() {
            let member = ElementId(i);
            if decl.substitution_group != Some(current) || group.contains(&member) {
                continue;
            }
            group.push(member);
            if !decl.is_abstract
                && !schema.is_derivation_blocked(decl.type_id, head_decl.type_id, head_decl.block)
            {
                names.push((decl.name.clone(), member));
            }
        }
    }
    names
}
