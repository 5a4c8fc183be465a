//! XSD built-in datatypes
//!
//! This module holds the registry of built-in simple types, the typed value
//! representation shared by every simple type, lexical parsing of the
//! primitives and the three-state value ordering used by range facets,
//! enumerations, fixed values and identity constraints.

use std::collections::HashMap;
use std::fmt;

use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use url::Url;

use crate::names::{is_valid_language, is_valid_name, is_valid_ncname, is_valid_nmtoken};
use crate::namespaces::{NamespaceContext, QName};

use super::datetime::{DateTimeKind, XsdDateTime, XsdDuration};
use super::facets::{FacetKind, WhiteSpace};

// =============================================================================
// Type names
// =============================================================================

/// XSD anyType name
pub const XSD_ANY_TYPE: &str = "anyType";
/// XSD anySimpleType name
pub const XSD_ANY_SIMPLE_TYPE: &str = "anySimpleType";
/// XSD string name
pub const XSD_STRING: &str = "string";
/// XSD decimal name
pub const XSD_DECIMAL: &str = "decimal";
/// XSD integer name
pub const XSD_INTEGER: &str = "integer";
/// XSD int name
pub const XSD_INT: &str = "int";
/// XSD boolean name
pub const XSD_BOOLEAN: &str = "boolean";
/// XSD ID name
pub const XSD_ID: &str = "ID";
/// XSD IDREF name
pub const XSD_IDREF: &str = "IDREF";
/// XSD IDREFS name
pub const XSD_IDREFS: &str = "IDREFS";

lazy_static::lazy_static! {
    /// XSD boolean value mapping
    pub static ref XSD_BOOLEAN_MAP: HashMap<&'static str, bool> = {
        let mut m = HashMap::new();
        m.insert("false", false);
        m.insert("0", false);
        m.insert("true", true);
        m.insert("1", true);
        m
    };
}

static DECIMAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)$").unwrap());
static FLOAT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?|-?INF|NaN)$").unwrap()
});
static HEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([0-9a-fA-F]{2})*$").unwrap());
static ANY_URI_BASE: Lazy<Option<Url>> = Lazy::new(|| Url::parse("http://base.invalid/").ok());

// =============================================================================
// Ordering
// =============================================================================

/// Result of comparing two typed values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XsdOrdering {
    /// First value is smaller
    Less,
    /// Values are equal in the value space
    Equal,
    /// First value is greater
    Greater,
    /// Values are not comparable
    Indeterminate,
}

impl XsdOrdering {
    /// Swap Less and Greater
    pub fn reverse(self) -> Self {
        match self {
            XsdOrdering::Less => XsdOrdering::Greater,
            XsdOrdering::Greater => XsdOrdering::Less,
            other => other,
        }
    }
}

impl From<std::cmp::Ordering> for XsdOrdering {
    fn from(ordering: std::cmp::Ordering) -> Self {
        match ordering {
            std::cmp::Ordering::Less => XsdOrdering::Less,
            std::cmp::Ordering::Equal => XsdOrdering::Equal,
            std::cmp::Ordering::Greater => XsdOrdering::Greater,
        }
    }
}

// =============================================================================
// Primitives and fundamental facets
// =============================================================================

/// Ordering kind of a primitive (fundamental facet `ordered`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordered {
    /// No order relation
    None,
    /// Partial order
    Partial,
    /// Total order
    Total,
}

/// Cardinality of a primitive's value space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Finitely many values
    Finite,
    /// Countably infinite
    CountablyInfinite,
}

/// The XSD 1.0 primitive datatypes (plus anySimpleType)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// xs:anySimpleType
    AnySimpleType,
    /// xs:string
    String,
    /// xs:boolean
    Boolean,
    /// xs:decimal
    Decimal,
    /// xs:float
    Float,
    /// xs:double
    Double,
    /// xs:duration
    Duration,
    /// One of the date/time primitives
    DateTime(DateTimeKind),
    /// xs:hexBinary
    HexBinary,
    /// xs:base64Binary
    Base64Binary,
    /// xs:anyURI
    AnyUri,
    /// xs:QName
    QName,
    /// xs:NOTATION
    Notation,
}

impl Primitive {
    /// Fundamental facet `ordered`
    pub fn ordered(self) -> Ordered {
        match self {
            Primitive::Decimal | Primitive::Float | Primitive::Double => Ordered::Total,
            Primitive::Duration | Primitive::DateTime(_) => Ordered::Partial,
            _ => Ordered::None,
        }
    }

    /// Fundamental facet `bounded`
    pub fn bounded(self) -> bool {
        matches!(self, Primitive::Float | Primitive::Double | Primitive::Boolean)
    }

    /// Fundamental facet `cardinality`
    pub fn cardinality(self) -> Cardinality {
        match self {
            Primitive::Boolean | Primitive::Float | Primitive::Double => Cardinality::Finite,
            _ => Cardinality::CountablyInfinite,
        }
    }

    /// Fundamental facet `numeric`
    pub fn numeric(self) -> bool {
        matches!(self, Primitive::Decimal | Primitive::Float | Primitive::Double)
    }

    /// Whether a constraining facet may be applied to types of this primitive
    pub fn admits(self, facet: FacetKind) -> bool {
        match facet {
            FacetKind::Pattern | FacetKind::WhiteSpace => true,
            FacetKind::Enumeration => self != Primitive::Boolean,
            FacetKind::Length | FacetKind::MinLength | FacetKind::MaxLength => matches!(
                self,
                Primitive::AnySimpleType
                    | Primitive::String
                    | Primitive::HexBinary
                    | Primitive::Base64Binary
                    | Primitive::AnyUri
                    | Primitive::QName
                    | Primitive::Notation
            ),
            FacetKind::MinInclusive
            | FacetKind::MaxInclusive
            | FacetKind::MinExclusive
            | FacetKind::MaxExclusive => self.ordered() != Ordered::None,
            FacetKind::TotalDigits | FacetKind::FractionDigits => self == Primitive::Decimal,
        }
    }

    /// Parse a whitespace-normalized lexical value into the value space
    pub fn parse(
        self,
        text: &str,
        namespaces: Option<&NamespaceContext>,
    ) -> Result<XsdValue, String> {
        match self {
            Primitive::AnySimpleType | Primitive::String => Ok(XsdValue::String(text.to_string())),
            Primitive::Boolean => XSD_BOOLEAN_MAP
                .get(text)
                .map(|b| XsdValue::Boolean(*b))
                .ok_or_else(|| format!("'{}' is not a valid xs:boolean", text)),
            Primitive::Decimal => parse_decimal(text).map(XsdValue::Decimal),
            Primitive::Float => parse_float(text)
                .map(|v| XsdValue::Float(v as f32))
                .ok_or_else(|| format!("'{}' is not a valid xs:float", text)),
            Primitive::Double => parse_float(text)
                .map(XsdValue::Double)
                .ok_or_else(|| format!("'{}' is not a valid xs:double", text)),
            Primitive::Duration => XsdDuration::parse(text).map(XsdValue::Duration),
            Primitive::DateTime(kind) => XsdDateTime::parse(kind, text).map(XsdValue::DateTime),
            Primitive::HexBinary => parse_hex(text)
                .map(XsdValue::HexBinary)
                .ok_or_else(|| format!("'{}' is not a valid xs:hexBinary", text)),
            Primitive::Base64Binary => {
                let compact: String = text.chars().filter(|c| *c != ' ').collect();
                base64::engine::general_purpose::STANDARD
                    .decode(compact)
                    .map(XsdValue::Base64Binary)
                    .map_err(|e| format!("'{}' is not a valid xs:base64Binary: {}", text, e))
            }
            Primitive::AnyUri => {
                let ok = Url::parse(text).is_ok()
                    || ANY_URI_BASE
                        .as_ref()
                        .map(|base| base.join(text).is_ok())
                        .unwrap_or(false);
                if ok {
                    Ok(XsdValue::AnyUri(text.to_string()))
                } else {
                    Err(format!("'{}' is not a valid xs:anyURI", text))
                }
            }
            Primitive::QName => parse_qname(text, namespaces).map(XsdValue::QName),
            Primitive::Notation => parse_qname(text, namespaces).map(XsdValue::Notation),
        }
    }
}

fn parse_decimal(text: &str) -> Result<Decimal, String> {
    if !DECIMAL_RE.is_match(text) {
        return Err(format!("'{}' is not a valid xs:decimal", text));
    }
    let mut normalized = text.trim_start_matches('+').to_string();
    if normalized.ends_with('.') {
        normalized.push('0');
    }
    if let Some(rest) = normalized.strip_prefix("-.") {
        normalized = format!("-0.{}", rest);
    } else if normalized.starts_with('.') {
        normalized.insert(0, '0');
    }
    Decimal::from_str_exact(&normalized)
        .map_err(|_| format!("'{}' is out of the supported xs:decimal range", text))
}

fn parse_float(text: &str) -> Option<f64> {
    if !FLOAT_RE.is_match(text) {
        return None;
    }
    match text {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => text.parse().ok(),
    }
}

fn parse_hex(text: &str) -> Option<Vec<u8>> {
    if !HEX_RE.is_match(text) {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).ok())
        .collect()
}

fn parse_qname(text: &str, namespaces: Option<&NamespaceContext>) -> Result<QName, String> {
    let resolved = match namespaces {
        Some(ctx) => ctx.resolve(text),
        None if !text.contains(':') && is_valid_ncname(text) => Some(QName::local(text)),
        None => None,
    };
    resolved.ok_or_else(|| format!("'{}' is not a resolvable xs:QName", text))
}

// =============================================================================
// Built-in type registry
// =============================================================================

/// Additional lexical rule a derived built-in imposes on top of its primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexicalRule {
    /// No additional rule
    None,
    /// No carriage return, line feed or tab
    NoLineBreaks,
    /// xs:token shape: no line breaks, no leading, trailing or double spaces
    Token,
    /// xs:language tag
    Language,
    /// XML Name
    Name,
    /// XML NCName
    NCName,
    /// XML NMTOKEN
    NmToken,
    /// Integer lexical form within optional bounds
    Integer {
        /// Inclusive lower bound
        min: Option<i128>,
        /// Inclusive upper bound
        max: Option<i128>,
    },
}

impl LexicalRule {
    /// Check a normalized lexical value and its parsed value
    pub fn check(self, text: &str, value: &XsdValue) -> Result<(), String> {
        let ok = match self {
            LexicalRule::None => true,
            LexicalRule::NoLineBreaks => !text.contains(['\r', '\n', '\t']),
            LexicalRule::Token => {
                !text.contains(['\r', '\n', '\t'])
                    && !text.starts_with(' ')
                    && !text.ends_with(' ')
                    && !text.contains("  ")
            }
            LexicalRule::Language => is_valid_language(text),
            LexicalRule::Name => is_valid_name(text),
            LexicalRule::NCName => is_valid_ncname(text),
            LexicalRule::NmToken => is_valid_nmtoken(text),
            LexicalRule::Integer { min, max } => {
                if text.contains('.') {
                    false
                } else if let XsdValue::Decimal(d) = value {
                    min.map_or(true, |m| *d >= Decimal::from_i128_with_scale(m, 0))
                        && max.map_or(true, |m| *d <= Decimal::from_i128_with_scale(m, 0))
                } else {
                    false
                }
            }
        };
        if ok {
            Ok(())
        } else {
            Err(format!("'{}' is not a valid value for this built-in type", text))
        }
    }
}

/// A built-in simple type
#[derive(Debug, Clone)]
pub struct BuiltinType {
    /// Local name in the XSD namespace
    pub name: &'static str,
    /// Name of the base built-in type
    pub base_type: Option<&'static str>,
    /// Primitive ancestor
    pub primitive: Primitive,
    /// Whitespace policy
    pub white_space: WhiteSpace,
    /// Item type for the built-in list types
    pub item_type: Option<&'static str>,
    /// Extra lexical constraint
    pub rule: LexicalRule,
}

const fn builtin(
    name: &'static str,
    base_type: &'static str,
    primitive: Primitive,
    white_space: WhiteSpace,
    rule: LexicalRule,
) -> BuiltinType {
    BuiltinType {
        name,
        base_type: Some(base_type),
        primitive,
        white_space,
        item_type: None,
        rule,
    }
}

const fn builtin_list(name: &'static str, item: &'static str) -> BuiltinType {
    BuiltinType {
        name,
        base_type: Some(XSD_ANY_SIMPLE_TYPE),
        primitive: Primitive::AnySimpleType,
        white_space: WhiteSpace::Collapse,
        item_type: Some(item),
        rule: LexicalRule::None,
    }
}

const fn int_range(min: Option<i128>, max: Option<i128>) -> LexicalRule {
    LexicalRule::Integer { min, max }
}

lazy_static::lazy_static! {
    /// Registry of all built-in simple types, bases before derived types
    pub static ref BUILTIN_TYPES: Vec<BuiltinType> = {
        use WhiteSpace::{Collapse, Preserve, Replace};
        let c = Collapse;
        let dt = Primitive::DateTime;
        vec![
            BuiltinType {
                name: XSD_ANY_SIMPLE_TYPE,
                base_type: None,
                primitive: Primitive::AnySimpleType,
                white_space: Preserve,
                item_type: None,
                rule: LexicalRule::None,
            },
            builtin(XSD_STRING, XSD_ANY_SIMPLE_TYPE, Primitive::String, Preserve, LexicalRule::None),
            builtin(XSD_BOOLEAN, XSD_ANY_SIMPLE_TYPE, Primitive::Boolean, c, LexicalRule::None),
            builtin(XSD_DECIMAL, XSD_ANY_SIMPLE_TYPE, Primitive::Decimal, c, LexicalRule::None),
            builtin("float", XSD_ANY_SIMPLE_TYPE, Primitive::Float, c, LexicalRule::None),
            builtin("double", XSD_ANY_SIMPLE_TYPE, Primitive::Double, c, LexicalRule::None),
            builtin("duration", XSD_ANY_SIMPLE_TYPE, Primitive::Duration, c, LexicalRule::None),
            builtin("dateTime", XSD_ANY_SIMPLE_TYPE, dt(DateTimeKind::DateTime), c, LexicalRule::None),
            builtin("time", XSD_ANY_SIMPLE_TYPE, dt(DateTimeKind::Time), c, LexicalRule::None),
            builtin("date", XSD_ANY_SIMPLE_TYPE, dt(DateTimeKind::Date), c, LexicalRule::None),
            builtin("gYearMonth", XSD_ANY_SIMPLE_TYPE, dt(DateTimeKind::GYearMonth), c, LexicalRule::None),
            builtin("gYear", XSD_ANY_SIMPLE_TYPE, dt(DateTimeKind::GYear), c, LexicalRule::None),
            builtin("gMonthDay", XSD_ANY_SIMPLE_TYPE, dt(DateTimeKind::GMonthDay), c, LexicalRule::None),
            builtin("gDay", XSD_ANY_SIMPLE_TYPE, dt(DateTimeKind::GDay), c, LexicalRule::None),
            builtin("gMonth", XSD_ANY_SIMPLE_TYPE, dt(DateTimeKind::GMonth), c, LexicalRule::None),
            builtin("hexBinary", XSD_ANY_SIMPLE_TYPE, Primitive::HexBinary, c, LexicalRule::None),
            builtin("base64Binary", XSD_ANY_SIMPLE_TYPE, Primitive::Base64Binary, c, LexicalRule::None),
            builtin("anyURI", XSD_ANY_SIMPLE_TYPE, Primitive::AnyUri, c, LexicalRule::None),
            builtin("QName", XSD_ANY_SIMPLE_TYPE, Primitive::QName, c, LexicalRule::None),
            builtin("NOTATION", XSD_ANY_SIMPLE_TYPE, Primitive::Notation, c, LexicalRule::None),

            // string derivations
            builtin("normalizedString", XSD_STRING, Primitive::String, Replace, LexicalRule::NoLineBreaks),
            builtin("token", "normalizedString", Primitive::String, c, LexicalRule::Token),
            builtin("language", "token", Primitive::String, c, LexicalRule::Language),
            builtin("Name", "token", Primitive::String, c, LexicalRule::Name),
            builtin("NMTOKEN", "token", Primitive::String, c, LexicalRule::NmToken),
            builtin("NCName", "Name", Primitive::String, c, LexicalRule::NCName),
            builtin(XSD_ID, "NCName", Primitive::String, c, LexicalRule::NCName),
            builtin(XSD_IDREF, "NCName", Primitive::String, c, LexicalRule::NCName),
            builtin("ENTITY", "NCName", Primitive::String, c, LexicalRule::NCName),

            // decimal derivations
            builtin(XSD_INTEGER, XSD_DECIMAL, Primitive::Decimal, c, int_range(None, None)),
            builtin("nonPositiveInteger", XSD_INTEGER, Primitive::Decimal, c, int_range(None, Some(0))),
            builtin("negativeInteger", "nonPositiveInteger", Primitive::Decimal, c, int_range(None, Some(-1))),
            builtin("long", XSD_INTEGER, Primitive::Decimal, c, int_range(Some(i64::MIN as i128), Some(i64::MAX as i128))),
            builtin(XSD_INT, "long", Primitive::Decimal, c, int_range(Some(i32::MIN as i128), Some(i32::MAX as i128))),
            builtin("short", XSD_INT, Primitive::Decimal, c, int_range(Some(i16::MIN as i128), Some(i16::MAX as i128))),
            builtin("byte", "short", Primitive::Decimal, c, int_range(Some(i8::MIN as i128), Some(i8::MAX as i128))),
            builtin("nonNegativeInteger", XSD_INTEGER, Primitive::Decimal, c, int_range(Some(0), None)),
            builtin("unsignedLong", "nonNegativeInteger", Primitive::Decimal, c, int_range(Some(0), Some(u64::MAX as i128))),
            builtin("unsignedInt", "unsignedLong", Primitive::Decimal, c, int_range(Some(0), Some(u32::MAX as i128))),
            builtin("unsignedShort", "unsignedInt", Primitive::Decimal, c, int_range(Some(0), Some(u16::MAX as i128))),
            builtin("unsignedByte", "unsignedShort", Primitive::Decimal, c, int_range(Some(0), Some(u8::MAX as i128))),
            builtin("positiveInteger", "nonNegativeInteger", Primitive::Decimal, c, int_range(Some(1), None)),

            // list types
            builtin_list("NMTOKENS", "NMTOKEN"),
            builtin_list(XSD_IDREFS, XSD_IDREF),
            builtin_list("ENTITIES", "ENTITY"),
        ]
    };

    static ref BUILTIN_INDEX: HashMap<&'static str, usize> = BUILTIN_TYPES
        .iter()
        .enumerate()
        .map(|(i, b)| (b.name, i))
        .collect();
}

/// Look up a built-in simple type by local name
pub fn get_builtin_type(name: &str) -> Option<&'static BuiltinType> {
    BUILTIN_INDEX.get(name).map(|i| &BUILTIN_TYPES[*i])
}

impl BuiltinType {
    /// Validate a normalized lexical value against this built-in alone
    pub fn parse(
        &self,
        text: &str,
        namespaces: Option<&NamespaceContext>,
    ) -> Result<XsdValue, String> {
        let value = self.primitive.parse(text, namespaces)?;
        self.rule.check(text, &value)?;
        Ok(value)
    }
}

// =============================================================================
// Typed values
// =============================================================================

/// A value in the value space of some simple type
#[derive(Debug, Clone, PartialEq)]
pub enum XsdValue {
    /// string family (including anySimpleType)
    String(String),
    /// boolean
    Boolean(bool),
    /// decimal family, integers included
    Decimal(Decimal),
    /// float
    Float(f32),
    /// double
    Double(f64),
    /// duration
    Duration(XsdDuration),
    /// date/time family
    DateTime(XsdDateTime),
    /// hexBinary octets
    HexBinary(Vec<u8>),
    /// base64Binary octets
    Base64Binary(Vec<u8>),
    /// anyURI
    AnyUri(String),
    /// QName
    QName(QName),
    /// NOTATION
    Notation(QName),
    /// list of item values
    List(Vec<XsdValue>),
}

/// Hashable canonical form of a typed value, used by identity constraints.
/// Two keys are equal exactly when the values compare Equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyValue {
    family: &'static str,
    canonical: String,
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl XsdValue {
    /// Number of length units (characters, octets or items), if the
    /// length facets apply to this value
    pub fn length_units(&self) -> Option<usize> {
        match self {
            XsdValue::String(s) | XsdValue::AnyUri(s) => Some(s.chars().count()),
            XsdValue::HexBinary(b) | XsdValue::Base64Binary(b) => Some(b.len()),
            XsdValue::List(items) => Some(items.len()),
            _ => None,
        }
    }

    /// Digit counts (total, fraction) of a decimal value
    pub fn digits(&self) -> Option<(u32, u32)> {
        match self {
            XsdValue::Decimal(d) => {
                let n = d.normalize();
                let mantissa = n.mantissa().unsigned_abs().to_string();
                let total = mantissa.trim_start_matches('0').len().max(1) as u32;
                Some((total.max(n.scale()), n.scale()))
            }
            _ => None,
        }
    }

    fn family(&self) -> &'static str {
        match self {
            XsdValue::String(_) => "string",
            XsdValue::Boolean(_) => "boolean",
            XsdValue::Decimal(_) => "decimal",
            XsdValue::Float(_) => "float",
            XsdValue::Double(_) => "double",
            XsdValue::Duration(_) => "duration",
            XsdValue::DateTime(_) => "dateTime",
            XsdValue::HexBinary(_) => "hexBinary",
            XsdValue::Base64Binary(_) => "base64Binary",
            XsdValue::AnyUri(_) => "anyURI",
            XsdValue::QName(_) => "QName",
            XsdValue::Notation(_) => "NOTATION",
            XsdValue::List(_) => "list",
        }
    }

    /// Canonical identity key of this value
    pub fn key_value(&self) -> KeyValue {
        let canonical = match self {
            XsdValue::Decimal(d) if d.is_zero() => "0".to_string(),
            XsdValue::Decimal(d) => d.normalize().to_string(),
            XsdValue::Float(f) if *f == 0.0 => "0".to_string(),
            XsdValue::Double(f) if *f == 0.0 => "0".to_string(),
            XsdValue::DateTime(dt) => dt.identity_key(),
            XsdValue::List(items) => items
                .iter()
                .map(|item| {
                    let key = item.key_value();
                    format!("{}:{}", key.family, key.canonical)
                })
                .collect::<Vec<_>>()
                .join(" "),
            other => other.to_string(),
        };
        KeyValue {
            family: self.family(),
            canonical,
        }
    }
}

impl fmt::Display for XsdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XsdValue::String(s) | XsdValue::AnyUri(s) => f.write_str(s),
            XsdValue::Boolean(b) => write!(f, "{}", b),
            XsdValue::Decimal(d) => write!(f, "{}", d.normalize()),
            XsdValue::Float(v) => write_float(f, f64::from(*v), v.to_string()),
            XsdValue::Double(v) => write_float(f, *v, v.to_string()),
            XsdValue::Duration(d) => write!(f, "{}", d),
            XsdValue::DateTime(dt) => write!(f, "{}", dt),
            XsdValue::HexBinary(bytes) => {
                for b in bytes {
                    write!(f, "{:02X}", b)?;
                }
                Ok(())
            }
            XsdValue::Base64Binary(bytes) => {
                f.write_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            XsdValue::QName(q) | XsdValue::Notation(q) => write!(f, "{}", q),
            XsdValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

fn write_float(f: &mut fmt::Formatter<'_>, v: f64, shortest: String) -> fmt::Result {
    if v.is_nan() {
        f.write_str("NaN")
    } else if v == f64::INFINITY {
        f.write_str("INF")
    } else if v == f64::NEG_INFINITY {
        f.write_str("-INF")
    } else {
        f.write_str(&shortest)
    }
}

fn compare_floats(a: f64, b: f64) -> XsdOrdering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => XsdOrdering::Equal,
        (false, false) => a
            .partial_cmp(&b)
            .map(XsdOrdering::from)
            .unwrap_or(XsdOrdering::Indeterminate),
        _ => XsdOrdering::Indeterminate,
    }
}

fn equality(equal: bool) -> XsdOrdering {
    if equal {
        XsdOrdering::Equal
    } else {
        XsdOrdering::Indeterminate
    }
}

/// Compare two typed values.
///
/// Ordered primitives yield Less/Equal/Greater where the order is defined;
/// unordered primitives yield Equal or Indeterminate. Values of different
/// primitive families are never comparable.
pub fn compare_values(a: &XsdValue, b: &XsdValue) -> XsdOrdering {
    match (a, b) {
        (XsdValue::Decimal(x), XsdValue::Decimal(y)) => XsdOrdering::from(x.cmp(y)),
        (XsdValue::Float(x), XsdValue::Float(y)) => {
            compare_floats(f64::from(*x), f64::from(*y))
        }
        (XsdValue::Double(x), XsdValue::Double(y)) => compare_floats(*x, *y),
        (XsdValue::Duration(x), XsdValue::Duration(y)) => x.compare(y),
        (XsdValue::DateTime(x), XsdValue::DateTime(y)) => x.compare(y),
        (XsdValue::String(x), XsdValue::String(y)) => equality(x == y),
        (XsdValue::AnyUri(x), XsdValue::AnyUri(y)) => equality(x == y),
        (XsdValue::Boolean(x), XsdValue::Boolean(y)) => equality(x == y),
        (XsdValue::HexBinary(x), XsdValue::HexBinary(y)) => equality(x == y),
        (XsdValue::Base64Binary(x), XsdValue::Base64Binary(y)) => equality(x == y),
        (XsdValue::QName(x), XsdValue::QName(y)) => equality(x == y),
        (XsdValue::Notation(x), XsdValue::Notation(y)) => equality(x == y),
        (XsdValue::List(x), XsdValue::List(y)) => equality(
            x.len() == y.len()
                && x.iter()
                    .zip(y)
                    .all(|(p, q)| compare_values(p, q) == XsdOrdering::Equal),
        ),
        _ => XsdOrdering::Indeterminate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(name: &str, text: &str) -> Result<XsdValue, String> {
        get_builtin_type(name).unwrap().parse(text, None)
    }

    #[test]
    fn test_registry_lookup() {
        let int = get_builtin_type("int").unwrap();
        assert_eq!(int.base_type, Some("long"));
        assert_eq!(int.primitive, Primitive::Decimal);
        assert_eq!(int.white_space, WhiteSpace::Collapse);
        assert_eq!(get_builtin_type("IDREFS").unwrap().item_type, Some("IDREF"));
        assert!(get_builtin_type("anyType").is_none());

        // every base is registered before the types derived from it
        for (i, b) in BUILTIN_TYPES.iter().enumerate() {
            if let Some(base) = b.base_type {
                assert!(BUILTIN_INDEX[base] < i, "{} before {}", base, b.name);
            }
        }
    }

    #[test]
    fn test_integer_ranges() {
        assert!(parse("byte", "127").is_ok());
        assert!(parse("byte", "128").is_err());
        assert!(parse("unsignedLong", "18446744073709551615").is_ok());
        assert!(parse("unsignedLong", "-1").is_err());
        assert!(parse("integer", "1.0").is_err());
        assert!(parse("negativeInteger", "0").is_err());
        assert!(parse("negativeInteger", "-3").is_ok());
        assert!(parse("positiveInteger", "0").is_err());
    }

    #[test]
    fn test_decimal_lexical_forms() {
        assert_eq!(parse("decimal", "+1.").unwrap(), XsdValue::Decimal(Decimal::ONE));
        assert!(parse("decimal", ".5").is_ok());
        assert!(parse("decimal", "-.5").is_ok());
        assert!(parse("decimal", "1e5").is_err());
        assert!(parse("decimal", "").is_err());
    }

    #[test]
    fn test_float_lexical_forms() {
        assert!(parse("float", "INF").is_ok());
        assert!(parse("float", "-1.5E3").is_ok());
        assert!(parse("float", "inf").is_err());
        assert!(parse("double", "+INF").is_err());
    }

    #[test]
    fn test_string_family_rules() {
        assert!(parse("token", "a b").is_ok());
        assert!(parse("token", "a  b").is_err());
        assert!(parse("NCName", "a:b").is_err());
        assert!(parse("Name", "a:b").is_ok());
        assert!(parse("language", "en-US").is_ok());
    }

    #[test]
    fn test_binary_and_uri() {
        assert_eq!(parse("hexBinary", "0fA0").unwrap(), XsdValue::HexBinary(vec![0x0f, 0xa0]));
        assert!(parse("hexBinary", "abc").is_err());
        assert_eq!(
            parse("base64Binary", "aGVs bG8=").unwrap(),
            XsdValue::Base64Binary(b"hello".to_vec())
        );
        assert!(parse("anyURI", "http://example.com/a b").is_ok());
        assert!(parse("anyURI", "../relative#frag").is_ok());
    }

    #[test]
    fn test_qname_needs_namespace_context() {
        assert!(parse("QName", "local").is_ok());
        assert!(parse("QName", "p:local").is_err());

        let mut ctx = NamespaceContext::new();
        ctx.add_prefix("p", "urn:p");
        let v = get_builtin_type("QName").unwrap().parse("p:local", Some(&ctx)).unwrap();
        assert_eq!(v, XsdValue::QName(QName::namespaced("urn:p", "local")));
    }

    #[test]
    fn test_compare_values() {
        let five = parse("int", "5").unwrap();
        let five_decimal = parse("decimal", "5.00").unwrap();
        let six = parse("int", "6").unwrap();
        assert_eq!(compare_values(&five, &five_decimal), XsdOrdering::Equal);
        assert_eq!(compare_values(&five, &six), XsdOrdering::Less);
        assert_eq!(compare_values(&six, &five), XsdOrdering::Greater);

        let text = parse("string", "5").unwrap();
        assert_eq!(compare_values(&five, &text), XsdOrdering::Indeterminate);

        let nan = parse("double", "NaN").unwrap();
        assert_eq!(compare_values(&nan, &nan), XsdOrdering::Equal);
        assert_eq!(
            compare_values(&nan, &parse("double", "1").unwrap()),
            XsdOrdering::Indeterminate
        );
    }

    #[test]
    fn test_key_values() {
        assert_eq!(
            parse("int", "05").unwrap().key_value(),
            parse("decimal", "5.0").unwrap().key_value()
        );
        assert_ne!(
            parse("int", "5").unwrap().key_value(),
            parse("string", "5").unwrap().key_value()
        );
        assert_eq!(
            parse("float", "-0").unwrap().key_value(),
            parse("float", "0").unwrap().key_value()
        );
    }

    #[test]
    fn test_digits() {
        let v = parse("decimal", "123.4500").unwrap();
        assert_eq!(v.digits(), Some((5, 2)));
        let v = parse("decimal", "0.05").unwrap();
        assert_eq!(v.digits(), Some((2, 2)));
        let v = parse("decimal", "0").unwrap();
        assert_eq!(v.digits(), Some((1, 0)));
    }
}
