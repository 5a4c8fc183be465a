//! XSD Identity Constraints
//!
//! This module implements identity constraints for XML Schema:
//! - xs:unique - Ensures values are unique within scope
//! - xs:key - Like unique, but all field values must be present
//! - xs:keyref - References a key/unique constraint (foreign key)
//!
//! The [`IdentityEngine`] follows the element stack of a validation session.
//! Every occurrence of a declaring element opens a key table; selector
//! matches open entries in it; field matches bind values into the entries'
//! slots. Tables are checked when their declaring element closes. Keyrefs
//! resolve against a table of the same element, against tables propagated
//! up from descendants, or against an open ancestor table, in which case
//! the check waits until that ancestor closes.
//!
//! Reference: https://www.w3.org/TR/xmlschema-1/#Identity-constraint_Definitions

use std::collections::{HashMap, HashSet};
use std::fmt;

use indexmap::IndexSet;
use log::{debug, trace};

use crate::error::{Error, Result};
use crate::namespaces::QName;
use crate::xpath::ElementSelector;

use super::builtins::KeyValue;
use super::schemas::{ConstraintId, ElementId, Schema};
use super::simple_types::TypedValue;

/// Kind of identity constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityKind {
    /// xs:key
    Key,
    /// xs:unique
    Unique,
    /// xs:keyref
    Keyref,
}

impl IdentityKind {
    /// Element name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::Unique => "unique",
            Self::Keyref => "keyref",
        }
    }
}

impl fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of an identity constraint handed to the schema builder
#[derive(Debug, Clone)]
pub struct IdentityConstraintDecl {
    /// Constraint name
    pub name: QName,
    /// Key, unique or keyref
    pub kind: IdentityKind,
    /// Name of the referenced key/unique (keyref only)
    pub refer: Option<QName>,
    /// Selector expression
    pub selector: String,
    /// Field expressions
    pub fields: Vec<String>,
    /// Prefix bindings for the paths
    pub namespaces: Vec<(String, String)>,
}

impl IdentityConstraintDecl {
    fn new(name: QName, kind: IdentityKind, selector: &str, fields: &[&str]) -> Self {
        Self {
            name,
            kind,
            refer: None,
            selector: selector.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            namespaces: Vec::new(),
        }
    }

    /// An xs:key
    pub fn key(name: QName, selector: &str, fields: &[&str]) -> Self {
        Self::new(name, IdentityKind::Key, selector, fields)
    }

    /// An xs:unique
    pub fn unique(name: QName, selector: &str, fields: &[&str]) -> Self {
        Self::new(name, IdentityKind::Unique, selector, fields)
    }

    /// An xs:keyref referring to the key or unique named `refer`
    pub fn keyref(name: QName, refer: QName, selector: &str, fields: &[&str]) -> Self {
        Self {
            refer: Some(refer),
            ..Self::new(name, IdentityKind::Keyref, selector, fields)
        }
    }

    /// Bind a prefix used in the paths
    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.push((prefix.into(), uri.into()));
        self
    }
}

/// A compiled identity constraint
#[derive(Debug, Clone)]
pub struct IdentityConstraint {
    /// Constraint name
    pub name: QName,
    /// Key, unique or keyref
    pub kind: IdentityKind,
    /// Referenced key/unique (keyref only), resolved at build time
    pub refer: Option<ConstraintId>,
    /// Compiled selector
    pub selector: ElementSelector,
    /// Compiled fields
    pub fields: Vec<ElementSelector>,
    /// Declaring element
    pub element: ElementId,
}

impl fmt::Display for IdentityConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.name)
    }
}

/// An identity-constraint violation found by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityError {
    /// Constraint concerned
    pub constraint: ConstraintId,
    /// Description
    pub message: String,
}

type Tuple = Vec<KeyValue>;

fn format_tuple(tuple: &[KeyValue]) -> String {
    let values: Vec<String> = tuple.iter().map(|v| v.to_string()).collect();
    format!("({})", values.join(", "))
}

/// Field slot of an entry
#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Empty,
    Bound(KeyValue),
    Nil,
}

/// One selector match
#[derive(Debug, Clone)]
struct KeyEntry {
    depth: usize,
    slots: Vec<Slot>,
}

/// One occurrence of a declaring element
#[derive(Debug, Clone)]
struct KeyTable {
    constraint: ConstraintId,
    depth: usize,
    entries: Vec<KeyEntry>,
    tuples: IndexSet<Tuple>,
    keyrefs: Vec<Tuple>,
    deferred: Vec<(ConstraintId, Vec<Tuple>)>,
    created: usize,
}

impl KeyTable {
    fn new(constraint: ConstraintId, depth: usize) -> Self {
        Self {
            constraint,
            depth,
            entries: Vec::new(),
            tuples: IndexSet::new(),
            keyrefs: Vec::new(),
            deferred: Vec::new(),
            created: 0,
        }
    }
}

/// An element field waiting for the element's value
#[derive(Debug, Clone, Copy)]
struct PendingField {
    table: usize,
    entry: usize,
    field: usize,
    depth: usize,
}

/// Streaming evaluator of key, unique and keyref constraints.
///
/// Depths count open elements, the root being depth 1. `stack` arguments
/// hold the names of the open elements, root first.
#[derive(Debug, Clone)]
pub struct IdentityEngine {
    tables: Vec<KeyTable>,
    pending: Vec<PendingField>,
    propagated: Vec<HashMap<ConstraintId, HashSet<Tuple>>>,
    live_entries: usize,
    max_entries: usize,
}

impl IdentityEngine {
    /// New engine holding at most `max_entries` entries at a time
    pub fn new(max_entries: usize) -> Self {
        Self {
            tables: Vec::new(),
            pending: Vec::new(),
            propagated: Vec::new(),
            live_entries: 0,
            max_entries,
        }
    }

    /// Drop all state
    pub fn reset(&mut self) {
        self.tables.clear();
        self.pending.clear();
        self.propagated.clear();
        self.live_entries = 0;
    }

    /// Whether no table is open
    pub fn is_idle(&self) -> bool {
        self.tables.is_empty()
    }

    /// An element opened. `element` is its declaration when it has one.
    pub fn on_element_start(
        &mut self,
        schema: &Schema,
        element: Option<ElementId>,
        stack: &[QName],
    ) -> Result<()> {
        let depth = stack.len();
        self.propagated.push(HashMap::new());

        if let Some(element) = element {
            for &constraint in &schema.element(element).constraints {
                debug!(
                    "open key table for {} at depth {}",
                    schema.constraint(constraint),
                    depth
                );
                self.tables.push(KeyTable::new(constraint, depth));
            }
        }

        for table in &mut self.tables {
            let decl = schema.constraint(table.constraint);
            if decl.selector.matches_element(&stack[table.depth..]) {
                trace!("selector of {} matched at depth {}", decl, depth);
                table.entries.push(KeyEntry {
                    depth,
                    slots: vec![Slot::Empty; decl.fields.len()],
                });
                table.created += 1;
                self.live_entries += 1;
            }
        }
        if self.live_entries > self.max_entries {
            return Err(Error::LimitExceeded(format!(
                "identity constraint entries {} exceed maximum {}",
                self.live_entries, self.max_entries
            )));
        }

        for (t, table) in self.tables.iter().enumerate() {
            let decl = schema.constraint(table.constraint);
            for (e, entry) in table.entries.iter().enumerate() {
                let relative = &stack[entry.depth..];
                for (f, field) in decl.fields.iter().enumerate() {
                    if field.matches_element(relative) {
                        self.pending.push(PendingField {
                            table: t,
                            entry: e,
                            field: f,
                            depth,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// An attribute of the current element was validated (observed or
    /// defaulted)
    pub fn on_attribute(
        &mut self,
        schema: &Schema,
        stack: &[QName],
        name: &QName,
        value: &TypedValue,
    ) -> Vec<IdentityError> {
        let mut errors = Vec::new();
        for table in &mut self.tables {
            let decl = schema.constraint(table.constraint);
            for entry in &mut table.entries {
                let relative = &stack[entry.depth..];
                for (f, field) in decl.fields.iter().enumerate() {
                    if field.matches_attribute(relative, name) {
                        trace!("bind attribute {} to field '{}' of {}", name, field, decl);
                        let key = Slot::Bound(value.value.key_value());
                        if let Some(err) = bind(&mut entry.slots[f], key, table.constraint, decl, f) {
                            errors.push(err);
                        }
                    }
                }
            }
        }
        errors
    }

    /// The element at `depth` closed. `value` is its simple value when it
    /// has one, `simple` tells whether it has simple content at all.
    pub fn on_element_end(
        &mut self,
        schema: &Schema,
        depth: usize,
        value: Option<&TypedValue>,
        nil: bool,
        simple: bool,
    ) -> Vec<IdentityError> {
        let mut errors = Vec::new();
        self.bind_pending(schema, depth, value, nil, simple, &mut errors);

        for table in &mut self.tables {
            let decl = schema.constraint(table.constraint);
            while table.entries.last().is_some_and(|e| e.depth == depth) {
                if let Some(entry) = table.entries.pop() {
                    close_entry(table, decl, entry, &mut errors);
                }
            }
        }

        let first = self
            .tables
            .iter()
            .position(|t| t.depth == depth)
            .unwrap_or(self.tables.len());
        let closing = self.tables.split_off(first);
        let mut scope = self.propagated.pop().unwrap_or_default();

        for table in closing.iter().filter(|t| !is_keyref(schema, t)) {
            scope
                .entry(table.constraint)
                .or_default()
                .extend(table.tuples.iter().cloned());
        }
        for table in &closing {
            self.live_entries = self.live_entries.saturating_sub(table.created);
            let decl = schema.constraint(table.constraint);
            debug!("close key table for {} at depth {}", decl, depth);
            if decl.kind != IdentityKind::Keyref {
                let keys = scope.get(&table.constraint);
                for (keyref, tuples) in &table.deferred {
                    check_keyrefs(schema, *keyref, tuples, keys, &mut errors);
                }
                continue;
            }
            let Some(refer) = decl.refer else {
                continue;
            };
            if let Some(keys) = scope.get(&refer) {
                check_keyrefs(schema, table.constraint, &table.keyrefs, Some(keys), &mut errors);
            } else if let Some(ancestor) = self.tables.iter_mut().rev().find(|t| t.constraint == refer)
            {
                debug!(
                    "defer {} to the table opened at depth {}",
                    decl, ancestor.depth
                );
                ancestor
                    .deferred
                    .push((table.constraint, table.keyrefs.clone()));
            } else if !table.keyrefs.is_empty() {
                errors.push(IdentityError {
                    constraint: table.constraint,
                    message: format!(
                        "{} refers to {} which is not in scope",
                        decl,
                        schema.constraint(refer)
                    ),
                });
            }
        }

        if let Some(parent) = self.propagated.last_mut() {
            for (constraint, tuples) in scope {
                if schema.is_referenced(constraint) {
                    parent.entry(constraint).or_default().extend(tuples);
                }
            }
        }
        errors
    }

    fn bind_pending(
        &mut self,
        schema: &Schema,
        depth: usize,
        value: Option<&TypedValue>,
        nil: bool,
        simple: bool,
        errors: &mut Vec<IdentityError>,
    ) {
        let (due, rest): (Vec<PendingField>, Vec<PendingField>) =
            self.pending.iter().partition(|p| p.depth == depth);
        self.pending = rest;

        for p in due {
            let Some(table) = self.tables.get_mut(p.table) else {
                continue;
            };
            let decl = schema.constraint(table.constraint);
            let slot = if nil {
                Slot::Nil
            } else if !simple {
                errors.push(IdentityError {
                    constraint: table.constraint,
                    message: format!(
                        "field '{}' of {} must select an element with simple content",
                        decl.fields[p.field], decl
                    ),
                });
                continue;
            } else if let Some(value) = value {
                Slot::Bound(value.value.key_value())
            } else {
                continue;
            };
            trace!("bind element value to field '{}' of {}", decl.fields[p.field], decl);
            if let Some(entry) = table.entries.get_mut(p.entry) {
                if let Some(err) = bind(&mut entry.slots[p.field], slot, table.constraint, decl, p.field) {
                    errors.push(err);
                }
            }
        }
    }
}

fn is_keyref(schema: &Schema, table: &KeyTable) -> bool {
    schema.constraint(table.constraint).kind == IdentityKind::Keyref
}

fn bind(
    slot: &mut Slot,
    value: Slot,
    constraint: ConstraintId,
    decl: &IdentityConstraint,
    field: usize,
) -> Option<IdentityError> {
    if *slot == Slot::Empty {
        *slot = value;
        None
    } else {
        Some(IdentityError {
            constraint,
            message: format!(
                "field '{}' of {} selects two or more values",
                decl.fields[field], decl
            ),
        })
    }
}

fn close_entry(
    table: &mut KeyTable,
    decl: &IdentityConstraint,
    entry: KeyEntry,
    errors: &mut Vec<IdentityError>,
) {
    let mut tuple = Vec::with_capacity(entry.slots.len());
    for (i, slot) in entry.slots.into_iter().enumerate() {
        match slot {
            Slot::Bound(value) => tuple.push(value),
            Slot::Empty if decl.kind == IdentityKind::Key => {
                errors.push(IdentityError {
                    constraint: table.constraint,
                    message: format!("missing key field '{}' for {}", decl.fields[i], decl),
                });
                return;
            }
            Slot::Nil if decl.kind == IdentityKind::Key => {
                errors.push(IdentityError {
                    constraint: table.constraint,
                    message: format!("key field '{}' of {} is nil", decl.fields[i], decl),
                });
                return;
            }
            _ => return,
        }
    }

    if decl.kind == IdentityKind::Keyref {
        table.keyrefs.push(tuple);
    } else if table.tuples.contains(&tuple) {
        errors.push(IdentityError {
            constraint: table.constraint,
            message: format!("duplicate value {} for {}", format_tuple(&tuple), decl),
        });
    } else {
        table.tuples.insert(tuple);
    }
}

fn check_keyrefs(
    schema: &Schema,
    keyref: ConstraintId,
    tuples: &[Tuple],
    keys: Option<&HashSet<Tuple>>,
    errors: &mut Vec<IdentityError>,
) {
    let decl = schema.constraint(keyref);
    for tuple in tuples {
        if !keys.is_some_and(|keys| keys.contains(tuple)) {
            errors.push(IdentityError {
                constraint: keyref,
                message: format!(
                    "value {} of {} does not match any key",
                    format_tuple(tuple),
                    decl
                ),
            });
        }
    }
}

/// Document-wide tracking of `ID` and `IDREF` values
#[derive(Debug, Clone, Default)]
pub struct IdTracker {
    ids: HashSet<String>,
    idrefs: Vec<String>,
}

impl IdTracker {
    /// New empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an ID; false if it was already defined
    pub fn add_id(&mut self, id: &str) -> bool {
        self.ids.insert(id.to_string())
    }

    /// Record an IDREF to be checked at the end of the document
    pub fn add_idref(&mut self, idref: &str) {
        self.idrefs.push(idref.to_string());
    }

    /// IDREFs with no matching ID, in document order
    pub fn unresolved(&self) -> Vec<&str> {
        self.idrefs
            .iter()
            .filter(|r| !self.ids.contains(*r))
            .map(String::as_str)
            .collect()
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.ids.clear();
        self.idrefs.clear();
    }
}
