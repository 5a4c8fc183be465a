//! XML namespace handling
//!
//! This module provides qualified names (QNames) and the scoped prefix
//! mappings a validation session needs to resolve `xsi:type` values,
//! `QName`-typed content and identity-constraint paths.

use std::collections::HashMap;
use std::fmt;

use crate::names::is_valid_ncname;

/// XML Namespace URI
pub type NamespaceUri = String;

/// Namespace prefix
pub type Prefix = String;

/// Qualified name (QName) - combination of namespace and local name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    /// Namespace URI (None for no namespace)
    pub namespace: Option<NamespaceUri>,
    /// Local name
    pub local_name: String,
}

impl QName {
    /// Create a new QName
    pub fn new(namespace: Option<impl Into<String>>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(|s| s.into()).filter(|s: &String| !s.is_empty()),
            local_name: local_name.into(),
        }
    }

    /// Create a QName without a namespace
    pub fn local(local_name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local_name: local_name.into(),
        }
    }

    /// Create a QName with a namespace
    pub fn namespaced(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self::new(Some(namespace), local_name)
    }

    /// Namespace URI, with the empty string standing for "no namespace"
    pub fn namespace_str(&self) -> &str {
        self.namespace.as_deref().unwrap_or("")
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local_name),
            None => write!(f, "{}", self.local_name),
        }
    }
}

/// Scoped namespace context for resolving prefixes.
///
/// Each open element pushes a scope holding the declarations made on its
/// start tag; lookups search innermost scope first.
#[derive(Debug, Clone)]
pub struct NamespaceContext {
    scopes: Vec<HashMap<Prefix, NamespaceUri>>,
}

impl NamespaceContext {
    /// Create a context with a single empty scope
    pub fn new() -> Self {
        let mut root = HashMap::new();
        root.insert("xml".to_string(), crate::XML_NAMESPACE.to_string());
        Self { scopes: vec![root] }
    }

    /// Open a new innermost scope
    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Close the innermost scope; the root scope is never removed
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Add a namespace prefix mapping to the innermost scope.
    /// The empty prefix declares the default namespace.
    pub fn add_prefix(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(prefix.into(), namespace.into());
        }
    }

    /// Set the default namespace in the innermost scope
    pub fn set_default_namespace(&mut self, namespace: impl Into<String>) {
        self.add_prefix("", namespace);
    }

    /// Get the namespace bound to a prefix
    pub fn get_namespace(&self, prefix: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(prefix))
            .map(|s| s.as_str())
    }

    /// Get the default namespace; an empty declaration undeclares it
    pub fn get_default_namespace(&self) -> Option<&str> {
        self.get_namespace("").filter(|ns| !ns.is_empty())
    }

    /// Resolve a lexical `prefix:local` or `local` name.
    ///
    /// Unprefixed names take the default namespace. Returns `None` for an
    /// unbound prefix or a name that is not a lexical QName.
    pub fn resolve(&self, prefixed_name: &str) -> Option<QName> {
        match prefixed_name.split_once(':') {
            Some((prefix, local)) => {
                if !is_valid_ncname(prefix) || !is_valid_ncname(local) {
                    return None;
                }
                let namespace = self.get_namespace(prefix)?;
                Some(QName::namespaced(namespace, local))
            }
            None => {
                if !is_valid_ncname(prefixed_name) {
                    return None;
                }
                Some(QName::new(self.get_default_namespace(), prefixed_name))
            }
        }
    }
}

impl Default for NamespaceContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qname_creation() {
        let qname = QName::namespaced("http://example.com", "element");
        assert_eq!(qname.namespace, Some("http://example.com".to_string()));
        assert_eq!(qname.local_name, "element");

        // an empty namespace is no namespace
        assert_eq!(QName::namespaced("", "a"), QName::local("a"));
    }

    #[test]
    fn test_qname_display() {
        let qname = QName::namespaced("http://example.com", "element");
        assert_eq!(qname.to_string(), "{http://example.com}element");
        assert_eq!(QName::local("element").to_string(), "element");
    }

    #[test]
    fn test_scoped_resolution() {
        let mut ctx = NamespaceContext::new();
        ctx.add_prefix("p", "urn:outer");
        ctx.push_scope();
        ctx.add_prefix("p", "urn:inner");
        ctx.set_default_namespace("urn:default");

        assert_eq!(ctx.resolve("p:a"), Some(QName::namespaced("urn:inner", "a")));
        assert_eq!(ctx.resolve("a"), Some(QName::namespaced("urn:default", "a")));

        ctx.pop_scope();
        assert_eq!(ctx.resolve("p:a"), Some(QName::namespaced("urn:outer", "a")));
        assert_eq!(ctx.resolve("a"), Some(QName::local("a")));
    }

    #[test]
    fn test_resolve_failures() {
        let ctx = NamespaceContext::new();
        assert_eq!(ctx.resolve("q:a"), None);
        assert_eq!(ctx.resolve("1a"), None);
        assert_eq!(ctx.resolve("a:"), None);
        assert!(ctx.resolve("xml:lang").is_some());
    }
}
