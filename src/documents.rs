//! XML document drivers
//!
//! Adapters that push a whole XML document through a
//! [`ValidationSession`]: [`validate_document`] walks a parsed roxmltree
//! tree, [`validate_reader`] streams raw XML through quick-xml without
//! building a tree.

use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Error, Result};
use crate::namespaces::NamespaceContext;
use crate::validators::{ElementStart, ValidationSession};
use crate::XSI_NAMESPACE;

/// Validate a parsed document. Session findings go to its handler; the
/// first `Err` (fail-closed error, limit or misuse) stops the walk.
pub fn validate_document(session: &mut ValidationSession, document: &roxmltree::Document<'_>) -> Result<()> {
    validate_node(session, document.root_element())?;
    session.end_validation()
}

fn validate_node(session: &mut ValidationSession, node: roxmltree::Node<'_, '_>) -> Result<()> {
    let tag = node.tag_name();
    let mut start = ElementStart::new(tag.namespace(), tag.name());
    for ns in node.namespaces() {
        start
            .namespaces
            .push((ns.name().unwrap_or_default().to_string(), ns.uri().to_string()));
    }
    let mut attributes = Vec::new();
    for attribute in node.attributes() {
        if attribute.namespace() == Some(XSI_NAMESPACE)
            && set_xsi(&mut start, attribute.name(), attribute.value())
        {
            continue;
        }
        attributes.push((attribute.namespace(), attribute.name(), attribute.value()));
    }

    session.start_element(start)?;
    for (namespace, name, value) in attributes {
        session.attribute(name, namespace, value)?;
    }
    session.end_of_attributes()?;

    for child in node.children() {
        if child.is_element() {
            validate_node(session, child)?;
        } else if child.is_text() {
            if let Some(text) = child.text() {
                session.text(text)?;
            }
        }
    }
    session.end_element()?;
    Ok(())
}

// Returns false for xsi attributes that are not carried by the start tag
fn set_xsi(start: &mut ElementStart, name: &str, value: &str) -> bool {
    let slot = match name {
        "type" => &mut start.xsi_type,
        "nil" => &mut start.xsi_nil,
        "schemaLocation" => &mut start.schema_location,
        "noNamespaceSchemaLocation" => &mut start.no_namespace_schema_location,
        _ => return false,
    };
    *slot = Some(value.to_string());
    true
}

/// Validate raw XML, streaming its events into the session
pub fn validate_reader(session: &mut ValidationSession, xml: &[u8]) -> Result<()> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(false);

    let mut namespaces = NamespaceContext::new();
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                push_start(session, &mut namespaces, &e)?;
            }
            Ok(Event::Empty(e)) => {
                push_start(session, &mut namespaces, &e)?;
                session.end_element()?;
                namespaces.pop_scope();
            }
            Ok(Event::End(_)) => {
                session.end_element()?;
                namespaces.pop_scope();
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| Error::Xml(format!("Failed to unescape text: {}", e)))?;
                if session.depth() > 0 || !text.trim().is_empty() {
                    session.text(&text)?;
                }
            }
            Ok(Event::CData(e)) => {
                let bytes = e.into_inner();
                let text = std::str::from_utf8(&bytes)
                    .map_err(|e| Error::Xml(format!("Invalid CDATA section: {}", e)))?;
                session.text(text)?;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::Xml(format!(
                    "Error parsing XML at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }
    if session.depth() > 0 {
        return Err(Error::Xml("unexpected end of document".to_string()));
    }
    debug!("streamed document into session");
    session.end_validation()
}

fn push_start(session: &mut ValidationSession, namespaces: &mut NamespaceContext, e: &BytesStart<'_>) -> Result<()> {
    let mut declarations = Vec::new();
    let mut attributes = Vec::new();
    for attr_result in e.attributes() {
        let attr = attr_result.map_err(|e| Error::Xml(format!("Failed to parse attribute: {}", e)))?;
        let name = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| Error::Xml(format!("Invalid attribute name: {}", e)))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| Error::Xml(format!("Failed to unescape attribute value: {}", e)))?
            .into_owned();
        if name == "xmlns" {
            declarations.push((String::new(), value));
        } else if let Some(prefix) = name.strip_prefix("xmlns:") {
            declarations.push((prefix.to_string(), value));
        } else {
            attributes.push((name, value));
        }
    }

    namespaces.push_scope();
    for (prefix, uri) in &declarations {
        if prefix.is_empty() {
            namespaces.set_default_namespace(uri.as_str());
        } else {
            namespaces.add_prefix(prefix.as_str(), uri.as_str());
        }
    }

    let tag = std::str::from_utf8(e.name().as_ref())
        .map_err(|e| Error::Xml(format!("Invalid element name: {}", e)))?
        .to_string();
    let element = namespaces
        .resolve(&tag)
        .ok_or_else(|| Error::Xml(format!("unbound prefix in element name '{}'", tag)))?;
    let mut start = ElementStart::new(element.namespace.as_deref(), element.local_name);
    start.namespaces = declarations;

    let mut resolved = Vec::new();
    for (name, value) in attributes {
        let (namespace, local) = match name.split_once(':') {
            Some((prefix, local)) => {
                let namespace = namespaces
                    .get_namespace(prefix)
                    .ok_or_else(|| Error::Xml(format!("unbound prefix in attribute name '{}'", name)))?;
                (Some(namespace.to_string()), local.to_string())
            }
            None => (None, name),
        };
        if namespace.as_deref() == Some(XSI_NAMESPACE) && set_xsi(&mut start, &local, &value) {
            continue;
        }
        resolved.push((namespace, local, value));
    }

    session.start_element(start)?;
    for (namespace, local, value) in &resolved {
        session.attribute(local, namespace.as_deref(), value)?;
    }
    session.end_of_attributes()?;
    Ok(())
}

/// Parse `xml` with roxmltree and validate it
pub fn validate_str(session: &mut ValidationSession, xml: &str) -> Result<()> {
    let document = roxmltree::Document::parse(xml).map_err(|e| Error::Xml(e.to_string()))?;
    validate_document(session, &document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::QName;
    use crate::settings::ValidationSettings;
    use crate::validators::{
        AttributeDecl, AttributeUseDef, ComplexTypeDecl, ElementDecl, Particle, SchemaBuilder,
        ValidationEvent,
    };
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    fn session() -> (ValidationSession, Rc<RefCell<Vec<ValidationEvent>>>) {
        let mut builder = SchemaBuilder::new(Some("urn:t"));
        let int = builder.builtin("int").unwrap();
        let b = builder.add_element(ElementDecl::local(QName::namespaced("urn:t", "b"), int));
        let n = builder.add_attribute(AttributeDecl::local(QName::local("n"), int));
        let ctype = builder
            .add_complex_type(
                ComplexTypeDecl::element_only(Particle::element(b).with_occurs(0, None))
                    .attribute(AttributeUseDef::optional(n)),
            )
            .unwrap();
        builder.add_element(ElementDecl::global(QName::namespaced("urn:t", "a"), ctype));
        let schema = Arc::new(builder.build().unwrap());

        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        let session = ValidationSession::new(schema, ValidationSettings::default())
            .with_handler(move |e: &ValidationEvent| sink.borrow_mut().push(e.clone()));
        (session, events)
    }

    #[test]
    fn test_tree_and_stream_agree() {
        let xml = r#"<t:a xmlns:t="urn:t" n="1"><t:b>5</t:b><t:b>x</t:b><!-- c --><t:b/></t:a>"#;

        let (mut tree, tree_events) = session();
        validate_str(&mut tree, xml).unwrap();
        let (mut stream, stream_events) = session();
        validate_reader(&mut stream, xml.as_bytes()).unwrap();

        let messages = |events: &Rc<RefCell<Vec<ValidationEvent>>>| -> Vec<String> {
            events.borrow().iter().map(|e| e.message().to_string()).collect()
        };
        assert_eq!(messages(&tree_events).len(), 2);
        assert_eq!(messages(&tree_events), messages(&stream_events));
        assert!(tree.is_finished());
        assert!(stream.is_finished());
    }

    #[test]
    fn test_malformed_input() {
        let (mut stream, _) = session();
        assert!(matches!(
            validate_reader(&mut stream, b"<t:a xmlns:t=\"urn:t\">"),
            Err(Error::Xml(_))
        ));
        let (mut tree, _) = session();
        assert!(matches!(validate_str(&mut tree, "<a>"), Err(Error::Xml(_))));
        let (mut stream, _) = session();
        assert!(matches!(validate_reader(&mut stream, b"<p:a/>"), Err(Error::Xml(_))));
    }
}
