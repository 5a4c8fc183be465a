//! XPath Selectors for XML Schema
//!
//! Compiler and matcher for the restricted XPath subset of `xs:selector` and
//! `xs:field`:
//!
//! ```text
//! Selector ::= Path ( '|' Path )*
//! Path     ::= ('.//')? Step ( '/' Step )*
//! Step     ::= '.' | ( 'child::' )? NameTest
//! Field    ::= same as Selector, the last step may be ( '@' | 'attribute::' ) NameTest
//! NameTest ::= QName | '*' | NCName ':' '*'
//! ```
//!
//! Paths are matched against the names of the elements between the context
//! element (exclusive) and the current element (inclusive).

use std::fmt;

use crate::error::{ParseError, Result};
use crate::names::is_valid_ncname;
use crate::namespaces::{NamespaceContext, QName};

/// Name test of a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    /// `*`
    Any,
    /// `prefix:*`, holding the resolved namespace
    Namespace(String),
    /// A qualified name; unprefixed names are in no namespace
    Name(QName),
}

impl NameTest {
    fn parse(test: &str, namespaces: &NamespaceContext) -> Result<Self> {
        if test == "*" {
            return Ok(Self::Any);
        }
        let unbound = |prefix: &str| {
            ParseError::new(format!("unbound namespace prefix '{}' in path", prefix))
        };
        match test.split_once(':') {
            Some((prefix, "*")) if is_valid_ncname(prefix) => namespaces
                .get_namespace(prefix)
                .map(|ns| Self::Namespace(ns.to_string()))
                .ok_or_else(|| unbound(prefix).into()),
            Some((prefix, local)) if is_valid_ncname(prefix) && is_valid_ncname(local) => {
                namespaces
                    .get_namespace(prefix)
                    .map(|ns| Self::Name(QName::namespaced(ns, local)))
                    .ok_or_else(|| unbound(prefix).into())
            }
            None if is_valid_ncname(test) => Ok(Self::Name(QName::local(test))),
            _ => Err(ParseError::new(format!("invalid name test '{}' in path", test)).into()),
        }
    }

    /// Check if a name passes the test
    pub fn matches(&self, name: &QName) -> bool {
        match self {
            Self::Any => true,
            Self::Namespace(ns) => name.namespace.as_deref() == Some(ns.as_str()),
            Self::Name(expected) => expected == name,
        }
    }
}

impl fmt::Display for NameTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Namespace(ns) => write!(f, "{{{}}}*", ns),
            Self::Name(name) => write!(f, "{}", name),
        }
    }
}

/// One alternative of a selector or field
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    /// Whether the path starts with `.//`
    pub descendant: bool,
    /// Child steps, `.` steps removed
    pub steps: Vec<NameTest>,
    /// Final attribute step (fields only)
    pub attribute: Option<NameTest>,
}

impl Path {
    fn parse(source: &str, namespaces: &NamespaceContext, allow_attribute: bool) -> Result<Self> {
        let source = source.trim();
        let (descendant, rest) = match source.strip_prefix(".//") {
            Some(rest) => (true, rest),
            None => (false, source),
        };
        if rest.is_empty() {
            return Err(ParseError::new(format!("empty path in '{}'", source)).into());
        }

        let raw_steps: Vec<&str> = rest.split('/').map(str::trim).collect();
        let mut path = Path {
            descendant,
            steps: Vec::new(),
            attribute: None,
        };
        for (i, step) in raw_steps.iter().enumerate() {
            let last = i + 1 == raw_steps.len();
            if step.is_empty() {
                return Err(ParseError::new(format!(
                    "'//' is only allowed at the start of a path: '{}'",
                    source
                ))
                .into());
            }
            if *step == "." {
                continue;
            }
            let attribute = step
                .strip_prefix('@')
                .or_else(|| step.strip_prefix("attribute::"));
            match attribute {
                Some(test) if allow_attribute && last => {
                    path.attribute = Some(NameTest::parse(test.trim(), namespaces)?);
                }
                Some(_) => {
                    return Err(ParseError::new(format!(
                        "attribute step not allowed here: '{}'",
                        source
                    ))
                    .into());
                }
                None => {
                    let test = step.strip_prefix("child::").unwrap_or(step);
                    path.steps.push(NameTest::parse(test.trim(), namespaces)?);
                }
            }
        }
        Ok(path)
    }

    /// Match the element steps against the relative element-name stack
    pub fn matches_elements(&self, relative: &[QName]) -> bool {
        let n = self.steps.len();
        let candidates = if self.descendant {
            if relative.len() < n {
                return false;
            }
            &relative[relative.len() - n..]
        } else {
            if relative.len() != n {
                return false;
            }
            relative
        };
        self.steps
            .iter()
            .zip(candidates)
            .all(|(test, name)| test.matches(name))
    }
}

/// A compiled `xs:selector` or `xs:field` expression
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSelector {
    /// The raw XPath expression
    pub xpath: String,
    /// Alternatives
    pub paths: Vec<Path>,
}

impl ElementSelector {
    /// Compile a selector expression (element steps only)
    pub fn selector(xpath: &str, namespaces: &NamespaceContext) -> Result<Self> {
        Self::compile(xpath, namespaces, false)
    }

    /// Compile a field expression (may end with an attribute step)
    pub fn field(xpath: &str, namespaces: &NamespaceContext) -> Result<Self> {
        Self::compile(xpath, namespaces, true)
    }

    fn compile(xpath: &str, namespaces: &NamespaceContext, allow_attribute: bool) -> Result<Self> {
        let paths = xpath
            .split('|')
            .map(|alternative| Path::parse(alternative, namespaces, allow_attribute))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            xpath: xpath.to_string(),
            paths,
        })
    }

    /// Check whether the current element is selected
    pub fn matches_element(&self, relative: &[QName]) -> bool {
        self.paths
            .iter()
            .any(|p| p.attribute.is_none() && p.matches_elements(relative))
    }

    /// Check whether an attribute of the current element is selected
    pub fn matches_attribute(&self, relative: &[QName], attribute: &QName) -> bool {
        self.paths.iter().any(|p| {
            p.attribute
                .as_ref()
                .is_some_and(|test| test.matches(attribute) && p.matches_elements(relative))
        })
    }

    /// Whether some alternative selects attributes
    pub fn selects_attributes(&self) -> bool {
        self.paths.iter().any(|p| p.attribute.is_some())
    }
}

impl fmt::Display for ElementSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.xpath)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<QName> {
        list.iter().map(|n| QName::local(*n)).collect()
    }

    #[test]
    fn test_child_paths() {
        let ctx = NamespaceContext::new();
        let selector = ElementSelector::selector("item | group/item", &ctx).unwrap();
        assert!(selector.matches_element(&names(&["item"])));
        assert!(selector.matches_element(&names(&["group", "item"])));
        assert!(!selector.matches_element(&names(&["x", "group", "item"])));
        assert!(!selector.matches_element(&names(&[])));
    }

    #[test]
    fn test_descendant_and_self() {
        let ctx = NamespaceContext::new();
        let selector = ElementSelector::selector(".//item", &ctx).unwrap();
        assert!(selector.matches_element(&names(&["item"])));
        assert!(selector.matches_element(&names(&["a", "b", "item"])));
        assert!(!selector.matches_element(&names(&["item", "b"])));

        let this = ElementSelector::field(".", &ctx).unwrap();
        assert!(this.matches_element(&[]));
        assert!(!this.matches_element(&names(&["a"])));
    }

    #[test]
    fn test_field_attributes() {
        let ctx = NamespaceContext::new();
        let field = ElementSelector::field("@id | child::ref/attribute::key", &ctx).unwrap();
        assert!(field.selects_attributes());
        assert!(field.matches_attribute(&[], &QName::local("id")));
        assert!(field.matches_attribute(&names(&["ref"]), &QName::local("key")));
        assert!(!field.matches_attribute(&[], &QName::local("key")));
        assert!(!field.matches_element(&[]));
    }

    #[test]
    fn test_namespaced_tests() {
        let mut ctx = NamespaceContext::new();
        ctx.add_prefix("p", "urn:p");
        let selector = ElementSelector::selector("p:item | p:*/x", &ctx).unwrap();
        assert!(selector.matches_element(&[QName::namespaced("urn:p", "item")]));
        assert!(!selector.matches_element(&[QName::local("item")]));
        assert!(selector.matches_element(&[QName::namespaced("urn:p", "any"), QName::local("x")]));
    }

    #[test]
    fn test_rejected_expressions() {
        let ctx = NamespaceContext::new();
        assert!(ElementSelector::selector("@id", &ctx).is_err());
        assert!(ElementSelector::selector("a//b", &ctx).is_err());
        assert!(ElementSelector::selector("q:item", &ctx).is_err());
        assert!(ElementSelector::field("@id/a", &ctx).is_err());
        assert!(ElementSelector::selector("a[1]", &ctx).is_err());
        assert!(ElementSelector::selector("", &ctx).is_err());
    }
}
