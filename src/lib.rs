//! # grammar-kiln
//!
//! Compiles a set of interdependent grammar specifications into an in-memory parser
//! that can be invoked repeatedly, stored as a snapshot, and restored without
//! recompiling.
//!
//! The crate is organised around the lifecycle of a compiled grammar set:
//!
//! - [`kiln::resolver`] orders grammar specifications by their vocabulary imports.
//! - [`kiln::pipeline`] generates source modules and compiles them in one batch into
//!   the content-addressed [`kiln::artifact::ArtifactStore`].
//! - [`kiln::loader`] and [`kiln::cache`] turn stored units into live lexers and parsers.
//! - [`kiln::workflow`] ties it together behind [`CompiledParser`].
//!
//! ```rust,ignore
//! use grammar_kiln::{CompiledParser, GrammarSpec, ParserOptions};
//!
//! let spec = GrammarSpec::from_source("Expr.g4", "grammar Expr; expr: NUM '+' NUM; NUM: [0-9]+;");
//! let mut parser = CompiledParser::new(vec![spec], ParserOptions::default())?;
//! parser.compile()?;
//! let result = parser.parse("3+100", None)?;
//! println!("{}", result.tree.to_string_tree());
//! ```

pub mod kiln;

pub use kiln::error::{KilnError, Result};
pub use kiln::grammar::GrammarSpec;
pub use kiln::runtime::stream::CaseSensitivity;
pub use kiln::session::ParseResult;
pub use kiln::workflow::{CompiledParser, ParserOptions, WorkflowState};
