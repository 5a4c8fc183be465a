//! XPath Support for XML Schema
//!
//! Identity constraints locate their targets with a small XPath subset
//! (`xs:selector` and `xs:field`). This module compiles those expressions
//! once at schema build time and matches them against the element-name
//! stack during streaming validation.
//!
//! ## Limitations
//!
//! Only the identity-constraint subset is supported: child and attribute
//! axes, `.` and a leading `.//`. General XPath evaluation is not provided.

mod selectors;

pub use selectors::{ElementSelector, NameTest, Path};
