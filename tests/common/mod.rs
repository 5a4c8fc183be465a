//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use xmlschema_stream::namespaces::QName;
use xmlschema_stream::validators::{
    AttributeDecl, AttributeUseDef, ComplexTypeDecl, ElementDecl, ElementStart, ErrorCategory,
    FacetSet, Particle, Schema, SchemaBuilder, SchemaInfo, ValidationEvent, ValidationSession,
};
use xmlschema_stream::ValidationSettings;

/// Events recorded by a collecting handler
pub type Events = Rc<RefCell<Vec<ValidationEvent>>>;

/// A session whose events are recorded
pub fn collecting(schema: Arc<Schema>) -> (ValidationSession, Events) {
    collecting_with(schema, ValidationSettings::default())
}

pub fn collecting_with(schema: Arc<Schema>, settings: ValidationSettings) -> (ValidationSession, Events) {
    let events: Events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    let session = ValidationSession::new(schema, settings)
        .with_handler(move |event: &ValidationEvent| sink.borrow_mut().push(event.clone()));
    (session, events)
}

pub fn messages(events: &Events) -> Vec<String> {
    events.borrow().iter().map(|e| e.message().to_string()).collect()
}

pub fn categories(events: &Events) -> Vec<ErrorCategory> {
    events.borrow().iter().map(|e| e.category).collect()
}

/// Push a start tag with attributes
pub fn open(session: &mut ValidationSession, start: ElementStart, attributes: &[(&str, &str)]) {
    session.start_element(start).unwrap();
    for (name, value) in attributes {
        session.attribute(name, None, value).unwrap();
    }
    session.end_of_attributes().unwrap();
}

/// Push an element holding only text
pub fn leaf(session: &mut ValidationSession, name: &str, text: &str) -> SchemaInfo {
    open(session, ElementStart::local(name), &[]);
    session.text(text).unwrap();
    session.end_element().unwrap()
}

/// `<a>` with one or more `<b>` of type int restricted to at most 5
pub fn numbers_schema() -> Arc<Schema> {
    let mut builder = SchemaBuilder::new(None);
    let int = builder.builtin("int").unwrap();
    let small = builder
        .restriction(Some("small"), int, FacetSet::new().max_inclusive("5"))
        .unwrap();
    let b = builder.add_element(ElementDecl::local(QName::local("b"), small));
    let ctype = builder
        .add_complex_type(ComplexTypeDecl::element_only(
            Particle::element(b).with_occurs(1, None),
        ))
        .unwrap();
    builder.add_element(ElementDecl::global(QName::local("a"), ctype));
    Arc::new(builder.build().unwrap())
}

/// Catalog of `<item id=".." ref="..">` under `<catalog>`, with ID and
/// IDREF typed attributes and a nillable, defaulted `<note>`
pub fn catalog_schema() -> Arc<Schema> {
    let mut builder = SchemaBuilder::new(None);
    let id = builder.builtin("ID").unwrap();
    let idref = builder.builtin("IDREF").unwrap();
    let string = builder.builtin("string").unwrap();

    let id_attr = builder.add_attribute(AttributeDecl::local(QName::local("id"), id));
    let ref_attr = builder.add_attribute(AttributeDecl::local(QName::local("ref"), idref));
    let item_type = builder
        .add_complex_type(
            ComplexTypeDecl::empty()
                .attribute(AttributeUseDef::required(id_attr))
                .attribute(AttributeUseDef::optional(ref_attr)),
        )
        .unwrap();
    let item = builder.add_element(ElementDecl::local(QName::local("item"), item_type));
    let note = builder.add_element(
        ElementDecl::local(QName::local("note"), string)
            .nillable()
            .with_default("none"),
    );
    let catalog_type = builder
        .add_complex_type(ComplexTypeDecl::element_only(Particle::sequence(vec![
            Particle::element(item).with_occurs(0, None),
            Particle::element(note).optional(),
        ])))
        .unwrap();
    builder.add_element(ElementDecl::global(QName::local("catalog"), catalog_type));
    Arc::new(builder.build().unwrap())
}
