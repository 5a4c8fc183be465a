//! XML name validation
//!
//! Lexical checks for the name-like built-in datatypes (`Name`, `NCName`,
//! `NMTOKEN`, `language`) and for prefixed names.

use once_cell::sync::Lazy;
use regex::Regex;

pub(crate) const NAME_START: &str = r"A-Z_a-z\x{C0}-\x{D6}\x{D8}-\x{F6}\x{F8}-\x{2FF}\x{370}-\x{37D}\x{37F}-\x{1FFF}\x{200C}-\x{200D}\x{2070}-\x{218F}\x{2C00}-\x{2FEF}\x{3001}-\x{D7FF}\x{F900}-\x{FDCF}\x{FDF0}-\x{FFFD}\x{10000}-\x{EFFFF}";
pub(crate) const NAME_REST: &str = r"\-\.0-9\x{B7}\x{300}-\x{36F}\x{203F}-\x{2040}";

static NCNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        "^[{start}][{start}{rest}]*$",
        start = NAME_START,
        rest = NAME_REST
    ))
    .unwrap()
});

static NMTOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        "^[:{start}{rest}]+$",
        start = NAME_START,
        rest = NAME_REST
    ))
    .unwrap()
});

static LANGUAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").unwrap());

/// Check if a string is a valid XML Name (colons allowed)
pub fn is_valid_name(name: &str) -> bool {
    match name.chars().next() {
        Some(first) if first == ':' || NCNAME.is_match(&first.to_string()) => {
            name.split(':').all(|part| part.is_empty() || NCNAME.is_match(part))
        }
        _ => false,
    }
}

/// Check if a string is a valid NCName (non-colonized name)
pub fn is_valid_ncname(name: &str) -> bool {
    NCNAME.is_match(name)
}

/// Check if a string is a valid NMTOKEN
pub fn is_valid_nmtoken(name: &str) -> bool {
    NMTOKEN.is_match(name)
}

/// Check if a string is a valid `xml:lang` language tag
pub fn is_valid_language(tag: &str) -> bool {
    LANGUAGE.is_match(tag)
}

/// Check if a string is a valid QName (qualified name)
pub fn is_valid_qname(name: &str) -> bool {
    match name.split_once(':') {
        Some((prefix, local)) => is_valid_ncname(prefix) && is_valid_ncname(local),
        None => is_valid_ncname(name),
    }
}

/// Split a QName into prefix and local name
pub fn split_qname(qname: &str) -> (Option<&str>, &str) {
    if let Some((prefix, local)) = qname.split_once(':') {
        (Some(prefix), local)
    } else {
        (None, qname)
    }
}
