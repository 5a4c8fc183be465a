//! # xmlschema-stream
//!
//! A streaming, push-driven XML Schema (XSD 1.0) validation engine.
//!
//! A [`Schema`](validators::Schema) is assembled with a
//! [`SchemaBuilder`](validators::SchemaBuilder), which resolves every
//! reference to an id and checks the schema constraints the engine relies
//! on. A [`ValidationSession`](validators::ValidationSession) is then fed
//! parse events (element start, attribute, text, element end) in document
//! order and returns a per-node [`SchemaInfo`](validators::SchemaInfo).
//!
//! ## Features
//!
//! - Deterministic content models compiled from particles, with Unique
//!   Particle Attribution checked at build time
//! - All XSD 1.0 built-in datatypes, list and union derivation and the
//!   constraining facets
//! - key, unique and keyref across arbitrary subtree depth
//! - xsi:type, xsi:nil, substitution groups and ID/IDREF tracking
//! - Drivers for roxmltree trees and quick-xml streams
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use xmlschema_stream::documents::validate_str;
//! use xmlschema_stream::namespaces::QName;
//! use xmlschema_stream::validators::{ElementDecl, SchemaBuilder, ValidationSession};
//! use xmlschema_stream::ValidationSettings;
//!
//! let mut builder = SchemaBuilder::new(None);
//! let int = builder.builtin("int").unwrap();
//! builder.add_element(ElementDecl::global(QName::local("count"), int));
//! let schema = Arc::new(builder.build()?);
//!
//! let mut session = ValidationSession::new(schema, ValidationSettings::default())
//!     .with_handler(|event: &_| println!("{}", event));
//! validate_str(&mut session, "<count>12</count>")?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod limits;

pub mod names;
pub mod namespaces;
pub mod settings;

pub mod validators;
pub mod xpath;

pub mod documents;

pub use error::{Error, Result};
pub use settings::ValidationSettings;
pub use validators::{
    ElementStart, Schema, SchemaBuilder, SchemaInfo, ValidationEvent, ValidationSession,
};

/// Version of the xmlschema-stream library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// XSD 1.0 namespace
pub const XSD_1_0_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// XML namespace
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// XMLNS namespace
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// XML Schema instance namespace
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
