//! Output formats for parse trees
//!
//! Each format implements [`Formatter`] and is looked up by name in a
//! [`FormatRegistry`]. Built-ins:
//! - `lisp` - the `(rule child ...)` form of [`ParseTree::to_string_tree`]
//! - `json` / `yaml` - the serde form of the tree
//! - `dot` - a Graphviz digraph
//! - `xml` - nested elements, one per rule, tokens as text
//!
//! [`ParseTree::to_string_tree`]: crate::kiln::runtime::ParseTree::to_string_tree

pub mod dot;
pub mod registry;
pub mod serde_formats;
pub mod xml;

pub use dot::DotFormatter;
pub use registry::{FormatError, FormatRegistry, Formatter, LispFormatter};
pub use serde_formats::{JsonFormatter, YamlFormatter};
pub use xml::XmlFormatter;
