//! XSD constraining facets
//!
//! Facets are declared per derivation step ([`FacetSet`]), compiled against
//! the base type ([`CompiledFacets`]) and flattened along the derivation
//! chain into one [`EffectiveFacets`] per simple type.

use std::fmt;

use regex::Regex;

use crate::error::{ParseError, Result};
use crate::names::{NAME_REST, NAME_START};

use super::builtins::{compare_values, XsdOrdering, XsdValue};

/// White space handling modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WhiteSpace {
    /// Preserve all white space
    Preserve,
    /// Replace tabs and newlines with spaces
    Replace,
    /// Replace and collapse multiple spaces
    Collapse,
}

impl WhiteSpace {
    /// Parse from string value
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "preserve" => Some(WhiteSpace::Preserve),
            "replace" => Some(WhiteSpace::Replace),
            "collapse" => Some(WhiteSpace::Collapse),
            _ => None,
        }
    }

    /// Normalize a string according to this white space mode
    pub fn normalize(&self, s: &str) -> String {
        match self {
            WhiteSpace::Preserve => s.to_string(),
            WhiteSpace::Replace => s.replace(['\t', '\n', '\r'], " "),
            WhiteSpace::Collapse => s
                .split([' ', '\t', '\n', '\r'])
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// The constraining facet kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacetKind {
    /// length
    Length,
    /// minLength
    MinLength,
    /// maxLength
    MaxLength,
    /// pattern
    Pattern,
    /// enumeration
    Enumeration,
    /// whiteSpace
    WhiteSpace,
    /// maxInclusive
    MaxInclusive,
    /// maxExclusive
    MaxExclusive,
    /// minInclusive
    MinInclusive,
    /// minExclusive
    MinExclusive,
    /// totalDigits
    TotalDigits,
    /// fractionDigits
    FractionDigits,
}

impl FacetKind {
    /// Facet name as written in a schema
    pub fn name(self) -> &'static str {
        match self {
            FacetKind::Length => "length",
            FacetKind::MinLength => "minLength",
            FacetKind::MaxLength => "maxLength",
            FacetKind::Pattern => "pattern",
            FacetKind::Enumeration => "enumeration",
            FacetKind::WhiteSpace => "whiteSpace",
            FacetKind::MaxInclusive => "maxInclusive",
            FacetKind::MaxExclusive => "maxExclusive",
            FacetKind::MinInclusive => "minInclusive",
            FacetKind::MinExclusive => "minExclusive",
            FacetKind::TotalDigits => "totalDigits",
            FacetKind::FractionDigits => "fractionDigits",
        }
    }
}

impl fmt::Display for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Facets declared on one restriction step, in lexical form
#[derive(Debug, Clone, Default)]
pub struct FacetSet {
    /// length
    pub length: Option<usize>,
    /// minLength
    pub min_length: Option<usize>,
    /// maxLength
    pub max_length: Option<usize>,
    /// pattern values (ORed)
    pub patterns: Vec<String>,
    /// enumeration values
    pub enumeration: Vec<String>,
    /// whiteSpace
    pub white_space: Option<WhiteSpace>,
    /// Range facets with their lexical bound
    pub bounds: Vec<(FacetKind, String)>,
    /// totalDigits
    pub total_digits: Option<u32>,
    /// fractionDigits
    pub fraction_digits: Option<u32>,
}

impl FacetSet {
    /// An empty facet set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a length facet
    pub fn length(mut self, value: usize) -> Self {
        self.length = Some(value);
        self
    }

    /// Add a minLength facet
    pub fn min_length(mut self, value: usize) -> Self {
        self.min_length = Some(value);
        self
    }

    /// Add a maxLength facet
    pub fn max_length(mut self, value: usize) -> Self {
        self.max_length = Some(value);
        self
    }

    /// Add a pattern facet
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    /// Add an enumeration value
    pub fn enumeration(mut self, value: impl Into<String>) -> Self {
        self.enumeration.push(value.into());
        self
    }

    /// Set the whiteSpace facet
    pub fn white_space(mut self, ws: WhiteSpace) -> Self {
        self.white_space = Some(ws);
        self
    }

    /// Add a minInclusive facet
    pub fn min_inclusive(self, value: impl Into<String>) -> Self {
        self.bound(FacetKind::MinInclusive, value)
    }

    /// Add a maxInclusive facet
    pub fn max_inclusive(self, value: impl Into<String>) -> Self {
        self.bound(FacetKind::MaxInclusive, value)
    }

    /// Add a minExclusive facet
    pub fn min_exclusive(self, value: impl Into<String>) -> Self {
        self.bound(FacetKind::MinExclusive, value)
    }

    /// Add a maxExclusive facet
    pub fn max_exclusive(self, value: impl Into<String>) -> Self {
        self.bound(FacetKind::MaxExclusive, value)
    }

    fn bound(mut self, kind: FacetKind, value: impl Into<String>) -> Self {
        self.bounds.retain(|(k, _)| *k != kind);
        self.bounds.push((kind, value.into()));
        self
    }

    /// Add a totalDigits facet
    pub fn total_digits(mut self, value: u32) -> Self {
        self.total_digits = Some(value);
        self
    }

    /// Add a fractionDigits facet
    pub fn fraction_digits(mut self, value: u32) -> Self {
        self.fraction_digits = Some(value);
        self
    }

    /// Facet kinds present in this set
    pub fn kinds(&self) -> Vec<FacetKind> {
        let mut kinds = Vec::new();
        if self.length.is_some() {
            kinds.push(FacetKind::Length);
        }
        if self.min_length.is_some() {
            kinds.push(FacetKind::MinLength);
        }
        if self.max_length.is_some() {
            kinds.push(FacetKind::MaxLength);
        }
        if !self.patterns.is_empty() {
            kinds.push(FacetKind::Pattern);
        }
        if !self.enumeration.is_empty() {
            kinds.push(FacetKind::Enumeration);
        }
        if self.white_space.is_some() {
            kinds.push(FacetKind::WhiteSpace);
        }
        kinds.extend(self.bounds.iter().map(|(k, _)| *k));
        if self.total_digits.is_some() {
            kinds.push(FacetKind::TotalDigits);
        }
        if self.fraction_digits.is_some() {
            kinds.push(FacetKind::FractionDigits);
        }
        kinds
    }
}

/// The patterns of one derivation step, compiled into a single regex
#[derive(Debug, Clone)]
pub struct XsdPattern {
    /// Pattern sources as declared
    pub sources: Vec<String>,
    regex: Regex,
}

impl XsdPattern {
    /// Compile XSD regular expressions; a value must match at least one
    pub fn new(sources: &[String]) -> Result<Self> {
        let mut alternatives = Vec::with_capacity(sources.len());
        for source in sources {
            let translated = translate_pattern(source);
            // validate each one alone so the error names the culprit
            Regex::new(&format!("^(?:{})$", translated)).map_err(|e| {
                ParseError::new("invalid pattern facet")
                    .with_source(source.clone())
                    .with_location(e.to_string())
            })?;
            alternatives.push(format!("(?:{})", translated));
        }
        let regex = Regex::new(&format!("^(?:{})$", alternatives.join("|")))
            .map_err(|e| ParseError::new(format!("invalid pattern facet: {}", e)))?;
        Ok(Self {
            sources: sources.to_vec(),
            regex,
        })
    }

    /// Check a normalized lexical value
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Translate XSD regular expression syntax into `regex` crate syntax
pub fn translate_pattern(pattern: &str) -> String {
    let name_start = format!(":{}", NAME_START);
    let name_char = format!(":{}{}", NAME_START, NAME_REST);
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars().peekable();
    let mut class_depth = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('i') if class_depth > 0 => out.push_str(&name_start),
                Some('c') if class_depth > 0 => out.push_str(&name_char),
                Some('i') => out.push_str(&format!("[{}]", name_start)),
                Some('c') => out.push_str(&format!("[{}]", name_char)),
                Some('I') => out.push_str(&format!("[^{}]", name_start)),
                Some('C') => out.push_str(&format!("[^{}]", name_char)),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push_str("\\\\"),
            },
            '[' => {
                class_depth += 1;
                out.push('[');
                if chars.peek() == Some(&'^') {
                    out.push('^');
                    chars.next();
                }
            }
            ']' if class_depth > 0 => {
                class_depth -= 1;
                out.push(']');
            }
            // character class subtraction: [a-z-[aeiou]]
            '-' if class_depth > 0 && chars.peek() == Some(&'[') => out.push_str("--"),
            '^' | '$' if class_depth == 0 => {
                out.push('\\');
                out.push(c);
            }
            '&' | '~' if class_depth > 0 => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// A compiled range facet
#[derive(Debug, Clone)]
pub struct Bound {
    /// Which of the four range facets
    pub kind: FacetKind,
    /// Bound as declared
    pub lexical: String,
    /// Bound in the value space of the restricted type
    pub value: XsdValue,
}

/// Facets of one derivation step after parsing their values against the base
#[derive(Debug, Clone, Default)]
pub struct CompiledFacets {
    /// length
    pub length: Option<usize>,
    /// minLength
    pub min_length: Option<usize>,
    /// maxLength
    pub max_length: Option<usize>,
    /// pattern facets
    pub pattern: Option<XsdPattern>,
    /// enumeration values
    pub enumeration: Option<Vec<XsdValue>>,
    /// whiteSpace
    pub white_space: Option<WhiteSpace>,
    /// range facets
    pub bounds: Vec<Bound>,
    /// totalDigits
    pub total_digits: Option<u32>,
    /// fractionDigits
    pub fraction_digits: Option<u32>,
}

/// All facets that apply to a type, flattened along its derivation chain
#[derive(Debug, Clone)]
pub struct EffectiveFacets {
    /// Most-derived whiteSpace policy
    pub white_space: WhiteSpace,
    /// length
    pub length: Option<usize>,
    /// tightest minLength
    pub min_length: Option<usize>,
    /// tightest maxLength
    pub max_length: Option<usize>,
    /// one pattern group per derivation step; every group must match
    pub patterns: Vec<XsdPattern>,
    /// nearest enumeration
    pub enumeration: Option<Vec<XsdValue>>,
    /// every range facet along the chain
    pub bounds: Vec<Bound>,
    /// tightest totalDigits
    pub total_digits: Option<u32>,
    /// tightest fractionDigits
    pub fraction_digits: Option<u32>,
}

fn tighter<T: Ord + Copy>(a: Option<T>, b: Option<T>, pick_min: bool) -> Option<T> {
    match (a, b) {
        (Some(x), Some(y)) => Some(if pick_min { x.min(y) } else { x.max(y) }),
        (x, None) => x,
        (None, y) => y,
    }
}

impl EffectiveFacets {
    /// Facets of a type with no constraining facets
    pub fn unconstrained(white_space: WhiteSpace) -> Self {
        Self {
            white_space,
            length: None,
            min_length: None,
            max_length: None,
            patterns: Vec::new(),
            enumeration: None,
            bounds: Vec::new(),
            total_digits: None,
            fraction_digits: None,
        }
    }

    /// Merge one more derivation step on top of the inherited facets
    pub fn derive(&self, step: &CompiledFacets) -> Self {
        let mut effective = self.clone();
        if let Some(ws) = step.white_space {
            effective.white_space = ws;
        }
        effective.length = step.length.or(self.length);
        effective.min_length = tighter(self.min_length, step.min_length, false);
        effective.max_length = tighter(self.max_length, step.max_length, true);
        if let Some(pattern) = &step.pattern {
            effective.patterns.push(pattern.clone());
        }
        if step.enumeration.is_some() {
            effective.enumeration = step.enumeration.clone();
        }
        effective.bounds.extend(step.bounds.iter().cloned());
        effective.total_digits = tighter(self.total_digits, step.total_digits, true);
        effective.fraction_digits = tighter(self.fraction_digits, step.fraction_digits, true);
        effective
    }

    /// Whether any constraining facet besides whiteSpace applies
    pub fn is_empty(&self) -> bool {
        self.length.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.patterns.is_empty()
            && self.enumeration.is_none()
            && self.bounds.is_empty()
            && self.total_digits.is_none()
            && self.fraction_digits.is_none()
    }

    /// Check a normalized lexical value and its typed value
    pub fn check(&self, text: &str, value: &XsdValue) -> Vec<FacetViolation> {
        let mut violations = Vec::new();

        if let Some(units) = value.length_units() {
            if let Some(length) = self.length {
                if units != length {
                    violations.push(FacetViolation::new(
                        FacetKind::Length,
                        format!("length must be {}, found {}", length, units),
                    ));
                }
            }
            if let Some(min) = self.min_length {
                if units < min {
                    violations.push(FacetViolation::new(
                        FacetKind::MinLength,
                        format!("length must be at least {}, found {}", min, units),
                    ));
                }
            }
            if let Some(max) = self.max_length {
                if units > max {
                    violations.push(FacetViolation::new(
                        FacetKind::MaxLength,
                        format!("length must be at most {}, found {}", max, units),
                    ));
                }
            }
        }

        for pattern in &self.patterns {
            if !pattern.is_match(text) {
                violations.push(FacetViolation::new(
                    FacetKind::Pattern,
                    format!("value '{}' does not match {:?}", text, pattern.sources),
                ));
            }
        }

        if let Some(values) = &self.enumeration {
            let found = values
                .iter()
                .any(|v| compare_values(value, v) == XsdOrdering::Equal);
            if !found {
                let listed: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                violations.push(FacetViolation::new(
                    FacetKind::Enumeration,
                    format!("value '{}' is not one of {:?}", text, listed),
                ));
            }
        }

        for bound in &self.bounds {
            if let Some(violation) = check_bound(bound, text, value) {
                violations.push(violation);
            }
        }

        if let Some((total, fraction)) = value.digits() {
            if let Some(max) = self.total_digits {
                if total > max {
                    violations.push(FacetViolation::new(
                        FacetKind::TotalDigits,
                        format!("value '{}' has more than {} digits", text, max),
                    ));
                }
            }
            if let Some(max) = self.fraction_digits {
                if fraction > max {
                    violations.push(FacetViolation::new(
                        FacetKind::FractionDigits,
                        format!("value '{}' has more than {} fraction digits", text, max),
                    ));
                }
            }
        }

        violations
    }
}

fn check_bound(bound: &Bound, text: &str, value: &XsdValue) -> Option<FacetViolation> {
    let ordering = compare_values(value, &bound.value);
    if ordering == XsdOrdering::Indeterminate {
        return Some(FacetViolation {
            kind: ViolationKind::Indeterminate(bound.kind),
            message: format!(
                "value '{}' is not comparable with {} '{}'",
                text, bound.kind, bound.lexical
            ),
        });
    }
    let satisfied = match bound.kind {
        FacetKind::MinInclusive => ordering != XsdOrdering::Less,
        FacetKind::MinExclusive => ordering == XsdOrdering::Greater,
        FacetKind::MaxInclusive => ordering != XsdOrdering::Greater,
        FacetKind::MaxExclusive => ordering == XsdOrdering::Less,
        _ => true,
    };
    if satisfied {
        None
    } else {
        Some(FacetViolation::new(
            bound.kind,
            format!("value '{}' violates {} '{}'", text, bound.kind, bound.lexical),
        ))
    }
}

/// What a facet violation is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// The value violates the facet
    Facet(FacetKind),
    /// The value cannot be ordered against the facet's bound
    Indeterminate(FacetKind),
}

/// A single facet check failure
#[derive(Debug, Clone, PartialEq)]
pub struct FacetViolation {
    /// Violated facet
    pub kind: ViolationKind,
    /// Human readable description
    pub message: String,
}

impl FacetViolation {
    /// A definite violation of a facet
    pub fn new(facet: FacetKind, message: impl Into<String>) -> Self {
        Self {
            kind: ViolationKind::Facet(facet),
            message: message.into(),
        }
    }

    /// The facet concerned, definite or indeterminate
    pub fn facet(&self) -> FacetKind {
        match self.kind {
            ViolationKind::Facet(f) | ViolationKind::Indeterminate(f) => f,
        }
    }
}

impl fmt::Display for FacetViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
