//! End-to-end tests of the validation session

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use xmlschema_stream::documents::{validate_reader, validate_str};
use xmlschema_stream::namespaces::QName;
use xmlschema_stream::validators::{
    AttributeDecl, AttributeUseDef, ComplexTypeDecl, DerivationFlags, ElementDecl, ElementStart,
    ErrorCategory, Particle, PartialTarget, ProcessContents, SchemaBuilder, ValidityStatus, Wildcard,
    XsdValue,
};
use xmlschema_stream::{Error, ValidationSettings, XSD_1_0_NAMESPACE, XSI_NAMESPACE};

use common::*;

#[test]
fn test_valid_numbers() {
    let (mut session, events) = collecting(numbers_schema());
    validate_str(&mut session, "<a><b>5</b><b>6</b></a>").unwrap();
    // 6 exceeds maxInclusive
    assert_eq!(categories(&events), vec![ErrorCategory::Facet]);

    let (mut session, events) = collecting(numbers_schema());
    validate_str(&mut session, "<a><b>5</b><b>4</b></a>").unwrap();
    assert!(events.borrow().is_empty());
}

#[test]
fn test_lexical_error_keeps_automaton() {
    let (mut session, events) = collecting(numbers_schema());
    validate_str(&mut session, "<a><b>5</b><b>x</b></a>").unwrap();
    assert_eq!(categories(&events), vec![ErrorCategory::Lexical]);
    assert_eq!(events.borrow()[0].error.path.as_deref(), Some("/a/b"));
    assert_eq!(events.borrow()[0].error.instance.as_deref(), Some("x"));
}

#[test]
fn test_stream_driver_matches_tree_driver() {
    let xml = "<a>\n  <b>1</b>\n  <c/>\n  <b>9</b>\n</a>";
    let (mut tree, tree_events) = collecting(numbers_schema());
    validate_str(&mut tree, xml).unwrap();
    let (mut stream, stream_events) = collecting(numbers_schema());
    validate_reader(&mut stream, xml.as_bytes()).unwrap();
    assert_eq!(messages(&tree_events), messages(&stream_events));
    assert_eq!(
        categories(&tree_events),
        vec![ErrorCategory::ContentModel, ErrorCategory::Facet]
    );
}

fn typed_schema() -> Arc<xmlschema_stream::Schema> {
    let mut builder = SchemaBuilder::new(None);
    let string = builder.builtin("string").unwrap();
    let name = builder.add_element(ElementDecl::local(QName::local("name"), string));
    let extra = builder.add_element(ElementDecl::local(QName::local("extra"), string));
    let base = builder
        .add_complex_type(
            ComplexTypeDecl::element_only(Particle::sequence(vec![Particle::element(name)]))
                .named(QName::local("base")),
        )
        .unwrap();
    builder
        .add_complex_type(
            ComplexTypeDecl::element_only(Particle::sequence(vec![Particle::element(extra)]))
                .named(QName::local("derived"))
                .extends(base),
        )
        .unwrap();
    let vague = builder
        .add_complex_type(
            ComplexTypeDecl::element_only(Particle::sequence(vec![Particle::element(name)]))
                .named(QName::local("vague"))
                .abstract_type(),
        )
        .unwrap();
    builder.add_element(ElementDecl::global(QName::local("open"), base));
    builder.add_element(ElementDecl::global(QName::local("unclear"), vague));
    builder.add_element(
        ElementDecl::global(QName::local("closed"), base).with_block(DerivationFlags::from_attr("extension")),
    );
    Arc::new(builder.build().unwrap())
}

#[test]
fn test_xsi_type_substitution() {
    let schema = typed_schema();
    let derived = schema.global_type(&QName::local("derived")).unwrap();

    let (mut session, events) = collecting(Arc::clone(&schema));
    let info = session
        .start_element(ElementStart::local("open").with_xsi_type("derived"))
        .unwrap();
    assert_eq!(info.type_id, Some(derived));
    session.end_of_attributes().unwrap();
    leaf(&mut session, "name", "n");
    leaf(&mut session, "extra", "e");
    let info = session.end_element().unwrap();
    session.end_validation().unwrap();
    assert!(info.is_valid());
    assert!(events.borrow().is_empty());

    let (mut session, events) = collecting(Arc::clone(&schema));
    let xml = format!(
        r#"<open xmlns:xsi="{}" xmlns:xs="{}" xsi:type="xs:int"><name>n</name></open>"#,
        XSI_NAMESPACE, XSD_1_0_NAMESPACE
    );
    validate_str(&mut session, &xml).unwrap();
    assert_eq!(
        messages(&events),
        vec!["xsi:type xs:int is not validly derived from base"]
    );

    let (mut session, events) = collecting(Arc::clone(&schema));
    let xml = format!(
        r#"<closed xmlns:xsi="{}" xsi:type="derived"><name>n</name></closed>"#,
        XSI_NAMESPACE
    );
    validate_str(&mut session, &xml).unwrap();
    assert_eq!(categories(&events), vec![ErrorCategory::Structural]);

    let (mut session, events) = collecting(schema);
    let xml = format!(
        r#"<open xmlns:xsi="{}" xsi:type="nowhere"><name>n</name></open>"#,
        XSI_NAMESPACE
    );
    validate_str(&mut session, &xml).unwrap();
    assert_eq!(messages(&events), vec!["unknown xsi:type 'nowhere'"]);
}

#[test]
fn test_abstract_type_rejected() {
    let schema = typed_schema();
    let (mut session, events) = collecting(Arc::clone(&schema));
    validate_str(&mut session, "<unclear><name>n</name></unclear>").unwrap();
    assert_eq!(messages(&events), vec!["type vague is abstract"]);

    let (mut session, events) = collecting(schema);
    let xml = format!(
        r#"<open xmlns:xsi="{}" xsi:type="vague"><name>n</name></open>"#,
        XSI_NAMESPACE
    );
    validate_str(&mut session, &xml).unwrap();
    assert_eq!(
        messages(&events),
        vec!["xsi:type vague is not validly derived from base"]
    );
}

#[test]
fn test_nil_and_default() {
    let (mut session, events) = collecting(catalog_schema());
    open(&mut session, ElementStart::local("catalog"), &[]);
    let note = leaf(&mut session, "note", "");
    assert!(note.is_default);
    assert_eq!(
        note.value.map(|v| v.value),
        Some(XsdValue::String("none".to_string()))
    );
    session.end_element().unwrap();
    session.end_validation().unwrap();
    assert!(events.borrow().is_empty());

    let (mut session, events) = collecting(catalog_schema());
    let xml = format!(
        r#"<catalog xmlns:xsi="{}"><note xsi:nil="true">text</note></catalog>"#,
        XSI_NAMESPACE
    );
    validate_str(&mut session, &xml).unwrap();
    assert_eq!(messages(&events), vec!["content in a nilled element 'note'"]);

    let (mut session, events) = collecting(catalog_schema());
    let xml = format!(
        r#"<catalog xmlns:xsi="{}"><item id="a" xsi:nil="true"/></catalog>"#,
        XSI_NAMESPACE
    );
    validate_str(&mut session, &xml).unwrap();
    assert_eq!(messages(&events), vec!["element 'item' is not nillable"]);
}

#[test]
fn test_id_and_idref() {
    let (mut session, events) = collecting(catalog_schema());
    validate_str(
        &mut session,
        r#"<catalog><item id="a"/><item id="b" ref="a"/><item id="a" ref="zz"/></catalog>"#,
    )
    .unwrap();
    assert_eq!(
        messages(&events),
        vec!["duplicate ID 'a'", "IDREF 'zz' does not match any ID"]
    );
    assert!(categories(&events).iter().all(|c| *c == ErrorCategory::Identity));
}

#[test]
fn test_missing_required_attribute() {
    let (mut session, events) = collecting(catalog_schema());
    validate_str(&mut session, r#"<catalog><item ref="a"/></catalog>"#).unwrap();
    assert_eq!(
        messages(&events),
        vec![
            "missing required attribute 'id'",
            "IDREF 'a' does not match any ID"
        ]
    );
}

fn wildcard_schema() -> Arc<xmlschema_stream::Schema> {
    let mut builder = SchemaBuilder::new(None);
    let int = builder.builtin("int").unwrap();
    builder.add_element(ElementDecl::global(QName::local("known"), int));
    for (name, mode) in [("strict", ProcessContents::Strict), ("skip", ProcessContents::Skip)] {
        let ctype = builder
            .add_complex_type(ComplexTypeDecl::element_only(
                Particle::any(Wildcard::any(mode)).with_occurs(0, None),
            ))
            .unwrap();
        builder.add_element(ElementDecl::global(QName::local(name), ctype));
    }
    Arc::new(builder.build().unwrap())
}

#[test]
fn test_strict_wildcard() {
    let (mut session, events) = collecting(wildcard_schema());
    validate_str(&mut session, "<strict><known>1</known><unknown/></strict>").unwrap();
    assert_eq!(
        messages(&events),
        vec!["no global declaration for element 'unknown' matched by a strict wildcard"]
    );

    let (mut session, events) = collecting(wildcard_schema());
    validate_str(&mut session, "<strict><known>one</known></strict>").unwrap();
    assert_eq!(categories(&events), vec![ErrorCategory::Lexical]);
}

#[test]
fn test_skip_wildcard() {
    let (mut session, events) = collecting(wildcard_schema());
    validate_str(
        &mut session,
        r#"<skip><known>one</known><x a="1"><known>two</known></x></skip>"#,
    )
    .unwrap();
    assert!(events.borrow().is_empty());

    let (mut session, _) = collecting(wildcard_schema());
    open(&mut session, ElementStart::local("skip"), &[]);
    open(&mut session, ElementStart::local("known"), &[]);
    session.text("one").unwrap();
    let info = session.end_element().unwrap();
    assert_eq!(info.validity, ValidityStatus::NotKnown);
    assert!(session.end_element().unwrap().is_valid());
}

#[test]
fn test_misuse_with_handler() {
    let (mut session, events) = collecting(numbers_schema());
    open(&mut session, ElementStart::local("a"), &[]);
    assert!(matches!(
        session.attribute("x", None, "1"),
        Err(Error::InvalidState(_))
    ));
    assert!(matches!(session.end_validation(), Err(Error::InvalidState(_))));
    assert!(events.borrow().is_empty());
    assert_eq!(session.depth(), 1);
}

#[test]
fn test_fixed_attribute() {
    let mut builder = SchemaBuilder::new(None);
    let decimal = builder.builtin("decimal").unwrap();
    let version = builder.add_attribute(AttributeDecl::local(QName::local("version"), decimal));
    let ctype = builder
        .add_complex_type(
            ComplexTypeDecl::empty().attribute(AttributeUseDef::optional(version).with_fixed("1.0")),
        )
        .unwrap();
    builder.add_element(ElementDecl::global(QName::local("doc"), ctype));
    let schema = Arc::new(builder.build().unwrap());

    let (mut session, events) = collecting(Arc::clone(&schema));
    validate_str(&mut session, r#"<doc version="1.00"/>"#).unwrap();
    assert!(events.borrow().is_empty());

    let (mut session, events) = collecting(Arc::clone(&schema));
    validate_str(&mut session, r#"<doc version="2"/>"#).unwrap();
    assert_eq!(
        messages(&events),
        vec!["attribute 'version' must have the fixed value '1.0'"]
    );

    // an omitted fixed attribute is synthesized
    let (mut session, events) = collecting(schema);
    session.start_element(ElementStart::local("doc")).unwrap();
    assert_eq!(session.expected_attributes(), vec![QName::local("version")]);
    let defaulted = session.end_of_attributes().unwrap();
    assert_eq!(defaulted.len(), 1);
    assert_eq!(defaulted[0].0, QName::local("version"));
    assert!(defaulted[0].1.is_default);
    assert!(session.end_element().unwrap().is_valid());
    assert!(events.borrow().is_empty());
}

#[test]
fn test_union_member_reported() {
    let mut builder = SchemaBuilder::new(None);
    let int = builder.builtin("int").unwrap();
    let boolean = builder.builtin("boolean").unwrap();
    let either = builder.union(Some("either"), vec![int, boolean]);
    builder.add_element(ElementDecl::global(QName::local("v"), either));
    let schema = Arc::new(builder.build().unwrap());

    let (mut session, _) = collecting(schema);
    let info = leaf(&mut session, "v", "true");
    assert_eq!(info.type_id, Some(either));
    assert_eq!(info.member_type, Some(boolean));
}

#[test]
fn test_substitution_group_in_session() {
    let mut builder = SchemaBuilder::new(None);
    let decimal = builder.builtin("decimal").unwrap();
    let int = builder.builtin("int").unwrap();
    let head = builder.add_element(ElementDecl::global(QName::local("amount"), decimal));
    let member = builder.add_element(ElementDecl::global(QName::local("count"), int).substitutes(head));
    let ctype = builder
        .add_complex_type(ComplexTypeDecl::element_only(
            Particle::element(head).with_occurs(0, None),
        ))
        .unwrap();
    builder.add_element(ElementDecl::global(QName::local("totals"), ctype));
    let schema = Arc::new(builder.build().unwrap());

    let (mut session, events) = collecting(schema);
    open(&mut session, ElementStart::local("totals"), &[]);
    let info = leaf(&mut session, "count", "1.5");
    assert_eq!(info.element, Some(member));
    assert_eq!(info.validity, ValidityStatus::Invalid);
    let info = leaf(&mut session, "amount", "1.5");
    assert_eq!(info.element, Some(head));
    session.end_element().unwrap();
    assert_eq!(categories(&events), vec![ErrorCategory::Lexical]);
}

#[test]
fn test_warnings_only_when_enabled() {
    let settings = ValidationSettings::from_json(r#"{"process_contents": "lax"}"#).unwrap();
    let (mut session, events) = collecting_with(numbers_schema(), settings.clone());
    validate_str(&mut session, "<z><b>1</b></z>").unwrap();
    assert!(events.borrow().is_empty());

    let (mut session, events) = collecting_with(numbers_schema(), settings.with_warnings(true));
    validate_str(&mut session, "<z/>").unwrap();
    assert_eq!(messages(&events), vec!["no schema found for root element 'z'"]);
    assert!(!events.borrow()[0].is_error());
}

#[test]
fn test_default_attributes_returned() {
    let mut builder = SchemaBuilder::new(None);
    let string = builder.builtin("string").unwrap();
    let lang = builder.add_attribute(AttributeDecl::local(QName::local("lang"), string));
    let ctype = builder
        .add_complex_type(ComplexTypeDecl::empty().attribute(AttributeUseDef::optional(lang).with_default("en")))
        .unwrap();
    builder.add_element(ElementDecl::global(QName::local("doc"), ctype));
    let schema = Arc::new(builder.build().unwrap());

    let (mut session, events) = collecting(Arc::clone(&schema));
    session.start_element(ElementStart::local("doc")).unwrap();
    let defaulted = session.end_of_attributes().unwrap();
    assert_eq!(defaulted.len(), 1);
    let (name, info) = &defaulted[0];
    assert_eq!(*name, QName::local("lang"));
    assert!(info.is_default);
    assert!(info.is_valid());
    assert_eq!(info.attribute, Some(lang));
    assert_eq!(
        info.value.as_ref().map(|v| v.value.clone()),
        Some(XsdValue::String("en".to_string()))
    );
    session.end_element().unwrap();
    session.end_validation().unwrap();
    assert!(events.borrow().is_empty());

    // a present attribute is not defaulted
    let (mut session, _) = collecting(schema);
    session.start_element(ElementStart::local("doc")).unwrap();
    session.attribute("lang", None, "fr").unwrap();
    assert!(session.end_of_attributes().unwrap().is_empty());
}

#[test]
fn test_element_fixed_value_compared_by_value() {
    let mut builder = SchemaBuilder::new(None);
    let decimal = builder.builtin("decimal").unwrap();
    builder.add_element(ElementDecl::global(QName::local("price"), decimal).with_fixed("1.0"));
    let schema = Arc::new(builder.build().unwrap());

    let (mut session, events) = collecting(Arc::clone(&schema));
    validate_str(&mut session, "<price>1.00</price>").unwrap();
    assert!(events.borrow().is_empty());

    let (mut session, events) = collecting(Arc::clone(&schema));
    validate_str(&mut session, "<price>+01</price>").unwrap();
    assert!(events.borrow().is_empty());

    let (mut session, events) = collecting(Arc::clone(&schema));
    validate_str(&mut session, "<price>2</price>").unwrap();
    assert_eq!(messages(&events), vec!["element 'price' must have the fixed value '1.0'"]);
    assert_eq!(categories(&events), vec![ErrorCategory::Facet]);

    // an empty element takes the fixed value
    let (mut session, events) = collecting(schema);
    open(&mut session, ElementStart::local("price"), &[]);
    let info = session.end_element().unwrap();
    assert!(info.is_default);
    assert!(info.is_valid());
    assert!(info.value.is_some());
    assert!(events.borrow().is_empty());
}

#[test]
fn test_partial_validation_from_type() {
    let schema = numbers_schema();
    let small = schema.global_type(&QName::local("small")).unwrap();

    let (mut session, events) = collecting(Arc::clone(&schema));
    session.initialize_partial(PartialTarget::Type(small)).unwrap();
    assert!(session.expected_particles().is_empty());
    let info = leaf(&mut session, "anything", "4");
    assert_eq!(info.type_id, Some(small));
    assert!(info.is_valid());
    session.end_validation().unwrap();
    assert!(events.borrow().is_empty());

    let (mut session, events) = collecting(schema);
    session.initialize_partial(PartialTarget::Type(small)).unwrap();
    validate_str(&mut session, "<other>9</other>").unwrap();
    assert_eq!(categories(&events), vec![ErrorCategory::Facet]);
}

#[test]
fn test_partial_validation_from_element() {
    let schema = numbers_schema();
    let a = schema.global_element(&QName::local("a")).unwrap();

    let (mut session, events) = collecting(Arc::clone(&schema));
    session.initialize_partial(PartialTarget::Element(a)).unwrap();
    let expected: Vec<String> = session.expected_particles().iter().map(|e| e.to_string()).collect();
    assert_eq!(expected, vec!["a"]);
    validate_str(&mut session, "<a><b>1</b></a>").unwrap();
    assert!(events.borrow().is_empty());

    let (mut session, events) = collecting(Arc::clone(&schema));
    session.initialize_partial(PartialTarget::Element(a)).unwrap();
    validate_str(&mut session, "<b>1</b>").unwrap();
    assert_eq!(
        messages(&events),
        vec!["root element 'b' does not match the partial validation element 'a'"]
    );

    // not while a document is open, and reset forgets the target
    let (mut session, _) = collecting(schema);
    session.initialize_partial(PartialTarget::Element(a)).unwrap();
    open(&mut session, ElementStart::local("a"), &[]);
    assert!(matches!(
        session.initialize_partial(PartialTarget::Element(a)),
        Err(Error::InvalidState(_))
    ));
    session.reset();
    assert_eq!(session.expected_particles().len(), 1);
    assert!(session.attribute("a", None, "1").is_err());
}

#[test]
fn test_partial_validation_of_attribute() {
    let mut builder = SchemaBuilder::new(None);
    let language = builder.builtin("language").unwrap();
    let lang = builder.add_attribute(AttributeDecl::global(QName::local("lang"), language));
    let schema = Arc::new(builder.build().unwrap());

    let (mut session, events) = collecting(schema);
    session.initialize_partial(PartialTarget::Attribute(lang)).unwrap();
    assert_eq!(session.expected_attributes(), vec![QName::local("lang")]);
    let info = session.attribute("lang", None, "en-GB").unwrap();
    assert!(info.is_valid());
    assert_eq!(info.attribute, Some(lang));
    let info = session.attribute("lang", None, "en_GB").unwrap();
    assert_eq!(info.validity, ValidityStatus::Invalid);
    session.attribute("other", None, "x").unwrap();
    session.end_validation().unwrap();
    assert_eq!(categories(&events), vec![ErrorCategory::Lexical, ErrorCategory::Attribute]);
    assert_eq!(
        messages(&events)[1],
        "attribute 'other' does not match the partial validation attribute 'lang'"
    );
}

#[test]
fn test_skipped_subtree_error_reaches_parent() {
    let (mut session, events) = collecting(catalog_schema());
    open(&mut session, ElementStart::local("catalog"), &[]);
    session
        .start_element(ElementStart::local("item").with_xsi_nil("true"))
        .unwrap();
    let item = session.skip_to_end_element().unwrap();
    assert_eq!(item.validity, ValidityStatus::NotKnown);
    let catalog = session.end_element().unwrap();
    assert_eq!(catalog.validity, ValidityStatus::Invalid);
    assert_eq!(messages(&events), vec!["element 'item' is not nillable"]);
}
