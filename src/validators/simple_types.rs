//! XSD Simple Types
//!
//! Simple type definitions stored in the schema arena, and the value
//! pipeline every simple value goes through: whitespace normalization,
//! lexical parsing (atomic, list and union varieties) and facet checking.
//!
//! Reference: https://www.w3.org/TR/xmlschema-2/#Simple_Type_Definitions

use std::fmt;

use crate::error::{ParseError, Result};
use crate::namespaces::{NamespaceContext, QName};

use super::base::{DerivationFlags, DerivationMethod};
use super::builtins::{compare_values, BuiltinType, Primitive, XsdOrdering, XsdValue};
use super::facets::{
    Bound, CompiledFacets, EffectiveFacets, FacetKind, FacetSet, FacetViolation, WhiteSpace,
    XsdPattern,
};
use super::schemas::{Schema, TypeId};

/// Variety of a simple type
#[derive(Debug, Clone, PartialEq)]
pub enum Variety {
    /// Atomic values of a primitive
    Atomic,
    /// Whitespace separated lists of an item type
    List {
        /// Item type
        item: TypeId,
    },
    /// Values of any of the member types, tried in order
    Union {
        /// Member types
        members: Vec<TypeId>,
    },
}

/// A simple type definition
#[derive(Debug, Clone)]
pub struct SimpleTypeDef {
    /// Name for global and built-in types
    pub name: Option<QName>,
    /// Base type; None only for anySimpleType
    pub base: Option<TypeId>,
    /// Variety, inherited by restrictions
    pub variety: Variety,
    /// Primitive ancestor (anySimpleType for lists and unions)
    pub primitive: Primitive,
    /// Nearest built-in ancestor for atomic types
    pub builtin: Option<&'static BuiltinType>,
    /// Derivation chain, this type first
    pub chain: Vec<TypeId>,
    /// Facets declared by this derivation step
    pub facets: CompiledFacets,
    /// Facets of the whole chain
    pub effective: EffectiveFacets,
    /// `final` derivation control
    pub final_set: DerivationFlags,
}

impl SimpleTypeDef {
    /// Simple types are always derived by restriction
    pub fn derivation(&self) -> DerivationMethod {
        DerivationMethod::Restriction
    }

    /// Whether `kind` may be applied to this type's variety
    pub fn admits(&self, kind: FacetKind) -> bool {
        match self.variety {
            Variety::Atomic => self.primitive.admits(kind),
            Variety::List { .. } => matches!(
                kind,
                FacetKind::Length
                    | FacetKind::MinLength
                    | FacetKind::MaxLength
                    | FacetKind::Pattern
                    | FacetKind::Enumeration
                    | FacetKind::WhiteSpace
            ),
            Variety::Union { .. } => matches!(kind, FacetKind::Pattern | FacetKind::Enumeration),
        }
    }
}

/// Context needed to interpret lexical values
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueContext<'a> {
    /// In-scope namespaces for QName and NOTATION values
    pub namespaces: Option<&'a NamespaceContext>,
}

impl<'a> ValueContext<'a> {
    /// Context resolving prefixes through `namespaces`
    pub fn new(namespaces: &'a NamespaceContext) -> Self {
        Self {
            namespaces: Some(namespaces),
        }
    }
}

/// A parsed simple value
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    /// Value in the value space
    pub value: XsdValue,
    /// Union member type that accepted the value
    pub member_type: Option<TypeId>,
    /// Whitespace-normalized lexical form
    pub normalized: String,
}

/// A lexical value that does not belong to a type's lexical space
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalError {
    /// Type the value was parsed against
    pub type_name: String,
    /// Offending lexical value
    pub lexical: String,
    /// Reason
    pub message: String,
}

impl LexicalError {
    fn new(type_name: String, lexical: &str, message: impl Into<String>) -> Self {
        Self {
            type_name,
            lexical: lexical.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for LexicalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid value '{}' for type {}: {}",
            self.lexical, self.type_name, self.message
        )
    }
}

impl std::error::Error for LexicalError {}

/// Failure of [`validate`]
#[derive(Debug, Clone, PartialEq)]
pub enum ValueError {
    /// The value does not parse
    Lexical(LexicalError),
    /// The value parses but violates facets
    Facets(Vec<FacetViolation>),
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lexical(e) => write!(f, "{}", e),
            Self::Facets(violations) => {
                let messages: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", messages.join("; "))
            }
        }
    }
}

/// Parse a lexical value against a simple type.
///
/// Whitespace is normalized first. Union members are tried in declaration
/// order and the first one that parses and satisfies its own facets wins.
pub fn parse(
    schema: &Schema,
    type_id: TypeId,
    lexical: &str,
    ctx: &ValueContext<'_>,
) -> std::result::Result<TypedValue, LexicalError> {
    let def = schema
        .simple_type(type_id)
        .ok_or_else(|| LexicalError::new(schema.type_name(type_id), lexical, "not a simple type"))?;

    match &def.variety {
        Variety::Atomic => {
            let normalized = def.effective.white_space.normalize(lexical);
            let value = match def.builtin {
                Some(builtin) => builtin.parse(&normalized, ctx.namespaces),
                None => def.primitive.parse(&normalized, ctx.namespaces),
            }
            .map_err(|message| LexicalError::new(schema.type_name(type_id), lexical, message))?;
            Ok(TypedValue {
                value,
                member_type: None,
                normalized,
            })
        }
        Variety::List { item } => {
            let normalized = WhiteSpace::Collapse.normalize(lexical);
            let mut items = Vec::new();
            for token in list_items(&normalized) {
                let typed = parse(schema, *item, token, ctx).map_err(|e| {
                    LexicalError::new(
                        schema.type_name(type_id),
                        lexical,
                        format!("invalid list item: {}", e.message),
                    )
                })?;
                items.push(typed.value);
            }
            Ok(TypedValue {
                value: XsdValue::List(items),
                member_type: None,
                normalized,
            })
        }
        Variety::Union { members } => {
            for &member in members {
                if let Ok(typed) = validate(schema, member, lexical, ctx) {
                    return Ok(TypedValue {
                        member_type: Some(typed.member_type.unwrap_or(member)),
                        ..typed
                    });
                }
            }
            Err(LexicalError::new(
                schema.type_name(type_id),
                lexical,
                "no member type of the union accepts the value",
            ))
        }
    }
}

fn list_items(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split(' ').filter(|item| !item.is_empty())
}

/// Check a parsed value against every facet of the type's derivation chain
pub fn check_facets(schema: &Schema, type_id: TypeId, value: &TypedValue) -> Vec<FacetViolation> {
    let Some(def) = schema.simple_type(type_id) else {
        return Vec::new();
    };
    let mut violations = def.effective.check(&value.normalized, &value.value);

    // union members were checked when the member was chosen
    if let (Variety::List { item }, XsdValue::List(items)) = (&def.variety, &value.value) {
        if let Some(item_def) = schema.simple_type(*item) {
            for (text, item_value) in list_items(&value.normalized).zip(items) {
                violations.extend(item_def.effective.check(text, item_value));
            }
        }
    }
    violations
}

/// Parse and check facets
pub fn validate(
    schema: &Schema,
    type_id: TypeId,
    lexical: &str,
    ctx: &ValueContext<'_>,
) -> std::result::Result<TypedValue, ValueError> {
    let typed = parse(schema, type_id, lexical, ctx).map_err(ValueError::Lexical)?;
    let violations = check_facets(schema, type_id, &typed);
    if violations.is_empty() {
        Ok(typed)
    } else {
        Err(ValueError::Facets(violations))
    }
}

/// Three-state comparison of two parsed values
pub fn compare(a: &TypedValue, b: &TypedValue) -> XsdOrdering {
    compare_values(&a.value, &b.value)
}

/// Compile the facets of a restriction step against its base type.
///
/// Facet values are parsed in the base's value space; facets the base
/// variety does not admit and facets that widen an inherited constraint are
/// rejected.
pub fn compile_facets(
    schema: &Schema,
    base: TypeId,
    facets: &FacetSet,
    ctx: &ValueContext<'_>,
) -> Result<CompiledFacets> {
    let base_def = schema.simple_type(base).ok_or_else(|| {
        ParseError::new(format!("base type {} is not simple", schema.type_name(base)))
    })?;
    let inherited = &base_def.effective;
    let base_name = schema.type_name(base);

    for kind in facets.kinds() {
        if !base_def.admits(kind) {
            return Err(ParseError::new(format!(
                "facet {} is not applicable to {}",
                kind, base_name
            ))
            .into());
        }
    }

    let mut compiled = CompiledFacets {
        length: facets.length,
        min_length: facets.min_length,
        max_length: facets.max_length,
        white_space: facets.white_space,
        total_digits: facets.total_digits,
        fraction_digits: facets.fraction_digits,
        ..CompiledFacets::default()
    };

    if let Some(ws) = facets.white_space {
        if ws < inherited.white_space {
            return Err(widening("whiteSpace", &base_name));
        }
    }
    if let (Some(length), Some(base_length)) = (facets.length, inherited.length) {
        if length != base_length {
            return Err(widening("length", &base_name));
        }
    }
    if let (Some(min), Some(base_min)) = (facets.min_length, inherited.min_length) {
        if min < base_min {
            return Err(widening("minLength", &base_name));
        }
    }
    if let (Some(max), Some(base_max)) = (facets.max_length, inherited.max_length) {
        if max > base_max {
            return Err(widening("maxLength", &base_name));
        }
    }
    let min = facets.min_length.or(inherited.min_length);
    let max = facets.max_length.or(inherited.max_length);
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(ParseError::new("minLength is greater than maxLength").into());
        }
    }
    if let (Some(total), Some(base_total)) = (facets.total_digits, inherited.total_digits) {
        if total > base_total {
            return Err(widening("totalDigits", &base_name));
        }
    }
    if let (Some(fraction), Some(base_fraction)) =
        (facets.fraction_digits, inherited.fraction_digits)
    {
        if fraction > base_fraction {
            return Err(widening("fractionDigits", &base_name));
        }
    }
    if let (Some(fraction), Some(total)) = (
        facets.fraction_digits.or(inherited.fraction_digits),
        facets.total_digits.or(inherited.total_digits),
    ) {
        if fraction > total {
            return Err(ParseError::new("fractionDigits is greater than totalDigits").into());
        }
    }

    if !facets.patterns.is_empty() {
        compiled.pattern = Some(XsdPattern::new(&facets.patterns)?);
    }

    if !facets.enumeration.is_empty() {
        let mut values = Vec::with_capacity(facets.enumeration.len());
        for lexical in &facets.enumeration {
            let typed = validate(schema, base, lexical, ctx).map_err(|e| {
                ParseError::new(format!("enumeration value is not valid for {}", base_name))
                    .with_source(e.to_string())
            })?;
            values.push(typed.value);
        }
        compiled.enumeration = Some(values);
    }

    for (kind, lexical) in &facets.bounds {
        let typed = parse(schema, base, lexical, ctx).map_err(|e| {
            ParseError::new(format!("{} value is not valid for {}", kind, base_name))
                .with_source(e.to_string())
        })?;
        let bound = Bound {
            kind: *kind,
            lexical: lexical.clone(),
            value: typed.value,
        };
        for other in inherited.bounds.iter().chain(compiled.bounds.iter()) {
            if !bound_narrows(&bound, other) {
                return Err(ParseError::new(format!(
                    "{} '{}' is not within {} '{}'",
                    bound.kind, bound.lexical, other.kind, other.lexical
                ))
                .with_location(base_name.clone())
                .into());
            }
        }
        compiled.bounds.push(bound);
    }

    Ok(compiled)
}

fn widening(facet: &str, base_name: &str) -> crate::error::Error {
    ParseError::new(format!("{} facet widens the constraint of {}", facet, base_name)).into()
}

/// Whether a new range facet is compatible with an existing one: same
/// direction facets must not widen, opposite direction facets must not cross.
fn bound_narrows(new: &Bound, old: &Bound) -> bool {
    use XsdOrdering::{Equal, Greater, Less};
    let ordering = compare_values(&new.value, &old.value);
    let at_most = matches!(ordering, Less | Equal);
    let at_least = matches!(ordering, Greater | Equal);
    match (new.kind, old.kind) {
        (FacetKind::MaxInclusive, FacetKind::MaxInclusive)
        | (FacetKind::MaxExclusive, FacetKind::MaxExclusive)
        | (FacetKind::MaxExclusive, FacetKind::MaxInclusive) => at_most,
        (FacetKind::MaxInclusive, FacetKind::MaxExclusive) => ordering == Less,
        (FacetKind::MinInclusive, FacetKind::MinInclusive)
        | (FacetKind::MinExclusive, FacetKind::MinExclusive)
        | (FacetKind::MinExclusive, FacetKind::MinInclusive) => at_least,
        (FacetKind::MinInclusive, FacetKind::MinExclusive) => ordering == Greater,
        (FacetKind::MaxInclusive, FacetKind::MinInclusive) => at_least,
        (FacetKind::MaxInclusive, FacetKind::MinExclusive)
        | (FacetKind::MaxExclusive, FacetKind::MinInclusive)
        | (FacetKind::MaxExclusive, FacetKind::MinExclusive) => ordering == Greater,
        (FacetKind::MinInclusive, FacetKind::MaxInclusive) => at_most,
        (FacetKind::MinInclusive, FacetKind::MaxExclusive)
        | (FacetKind::MinExclusive, FacetKind::MaxInclusive)
        | (FacetKind::MinExclusive, FacetKind::MaxExclusive) => ordering == Less,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::builders::SchemaBuilder;
    use crate::validators::facets::ViolationKind;

    fn xs(schema: &Schema, name: &str) -> TypeId {
        schema.builtin(name).unwrap()
    }

    #[test]
    fn test_atomic_parse_normalizes() {
        let schema = SchemaBuilder::new(None).build().unwrap();
        let int = xs(&schema, "int");
        let typed = parse(&schema, int, "  42\n", &ValueContext::default()).unwrap();
        assert_eq!(typed.normalized, "42");
        assert_eq!(typed.value, XsdValue::Decimal(42.into()));

        let err = parse(&schema, int, "4 2", &ValueContext::default()).unwrap_err();
        assert_eq!(err.type_name, "xs:int");
    }

    #[test]
    fn test_restriction_chain_facets() {
        let mut builder = SchemaBuilder::new(None);
        let decimal = builder.builtin("decimal").unwrap();
        let small = builder
            .restriction(Some("small"), decimal, FacetSet::new().max_inclusive("5"))
            .unwrap();
        let smaller = builder
            .restriction(Some("smaller"), small, FacetSet::new().min_inclusive("1"))
            .unwrap();
        let schema = builder.build().unwrap();
        let ctx = ValueContext::default();

        assert!(validate(&schema, smaller, "3", &ctx).is_ok());
        match validate(&schema, smaller, "6", &ctx) {
            Err(ValueError::Facets(v)) => assert_eq!(v[0].facet(), FacetKind::MaxInclusive),
            other => panic!("unexpected {:?}", other),
        }
        assert!(validate(&schema, smaller, "0", &ctx).is_err());
        assert_eq!(schema.simple_type(smaller).unwrap().chain.len(), 4);
    }

    #[test]
    fn test_widening_facet_rejected() {
        let mut builder = SchemaBuilder::new(None);
        let decimal = builder.builtin("decimal").unwrap();
        let small = builder
            .restriction(Some("small"), decimal, FacetSet::new().max_inclusive("5"))
            .unwrap();
        assert!(builder
            .restriction(Some("wide"), small, FacetSet::new().max_inclusive("10"))
            .is_err());
        assert!(builder
            .restriction(Some("crossed"), small, FacetSet::new().min_exclusive("5"))
            .is_err());
        assert!(builder
            .restriction(None, small, FacetSet::new().max_exclusive("5"))
            .is_ok());

        let string = builder.builtin("string").unwrap();
        assert!(builder
            .restriction(None, string, FacetSet::new().total_digits(3))
            .is_err());
        let short = builder
            .restriction(None, string, FacetSet::new().max_length(3))
            .unwrap();
        assert!(builder
            .restriction(None, short, FacetSet::new().max_length(4))
            .is_err());
    }

    #[test]
    fn test_list_type() {
        let mut builder = SchemaBuilder::new(None);
        let int = builder.builtin("int").unwrap();
        let list = builder.list(Some("ints"), int);
        let bounded = builder
            .restriction(None, list, FacetSet::new().max_length(2))
            .unwrap();
        let schema = builder.build().unwrap();
        let ctx = ValueContext::default();

        let typed = validate(&schema, list, " 1  2\t3 ", &ctx).unwrap();
        assert_eq!(typed.normalized, "1 2 3");
        assert_eq!(typed.value.length_units(), Some(3));
        assert!(validate(&schema, list, "", &ctx).is_ok());
        assert!(matches!(
            validate(&schema, list, "1 x", &ctx),
            Err(ValueError::Lexical(_))
        ));
        assert!(matches!(
            validate(&schema, bounded, "1 2 3", &ctx),
            Err(ValueError::Facets(_))
        ));
    }

    #[test]
    fn test_union_member_order() {
        let mut builder = SchemaBuilder::new(None);
        let int = builder.builtin("int").unwrap();
        let boolean = builder.builtin("boolean").unwrap();
        let string = builder.builtin("string").unwrap();
        let small = builder
            .restriction(None, int, FacetSet::new().max_inclusive("10"))
            .unwrap();
        let union = builder.union(Some("u"), vec![small, boolean, string]);
        let schema = builder.build().unwrap();
        let ctx = ValueContext::default();

        assert_eq!(validate(&schema, union, "1", &ctx).unwrap().member_type, Some(small));
        // 11 fails the first member's facet and falls through to string
        assert_eq!(validate(&schema, union, "11", &ctx).unwrap().member_type, Some(string));
        assert_eq!(validate(&schema, union, "true", &ctx).unwrap().member_type, Some(boolean));
    }

    #[test]
    fn test_indeterminate_bound() {
        let mut builder = SchemaBuilder::new(None);
        let date_time = builder.builtin("dateTime").unwrap();
        let bounded = builder
            .restriction(
                None,
                date_time,
                FacetSet::new().max_inclusive("2000-01-01T12:00:00Z"),
            )
            .unwrap();
        let schema = builder.build().unwrap();
        let ctx = ValueContext::default();

        assert!(validate(&schema, bounded, "2000-01-01T00:00:00Z", &ctx).is_ok());
        match validate(&schema, bounded, "2000-01-01T12:00:00", &ctx) {
            Err(ValueError::Facets(v)) => {
                assert_eq!(v[0].kind, ViolationKind::Indeterminate(FacetKind::MaxInclusive))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_enumeration_must_be_valid_for_base() {
        let mut builder = SchemaBuilder::new(None);
        let int = builder.builtin("int").unwrap();
        assert!(builder
            .restriction(None, int, FacetSet::new().enumeration("x"))
            .is_err());
        let colors = builder
            .restriction(None, int, FacetSet::new().enumeration("1").enumeration("02"))
            .unwrap();
        let schema = builder.build().unwrap();
        assert!(validate(&schema, colors, "2", &ValueContext::default()).is_ok());
        assert!(validate(&schema, colors, "3", &ValueContext::default()).is_err());
    }

    #[test]
    fn test_qname_needs_context() {
        let schema = SchemaBuilder::new(None).build().unwrap();
        let qname = xs(&schema, "QName");
        let mut namespaces = NamespaceContext::new();
        namespaces.add_prefix("p", "urn:p");

        let typed = parse(&schema, qname, "p:a", &ValueContext::new(&namespaces)).unwrap();
        assert_eq!(typed.value, XsdValue::QName(QName::namespaced("urn:p", "a")));
        assert!(parse(&schema, qname, "p:a", &ValueContext::default()).is_err());
    }
}
