//! Recognizer runtime
//!
//! Everything needed to run compiled units: the unit image format, character and
//! token streams, the lexer and the interpreting parser, parse trees, diagnostics
//! and tree listeners.

pub mod diagnostics;
pub mod image;
pub mod lexer;
pub mod listener;
pub mod parser;
pub mod stream;
pub mod tree;

pub use diagnostics::{Diagnostic, DiagnosticCollector, DiagnosticKind};
pub use lexer::{Lexer, LexerType};
pub use listener::{walk, NoopListener, ParseTreeListener, RuleTraceListener};
pub use parser::{ContextType, Parser, ParserType, ProductionFn};
pub use stream::{CaseSensitivity, CharStream, Token, TokenStream};
pub use tree::{ParseTree, RuleNode, TerminalNode};
