//! Grammar specification front end
//!
//! Grammar files use a compact ANTLR-style notation:
//!
//! ```text
//! grammar Expr;                       // or: lexer grammar X; / parser grammar X;
//! options { tokenVocab = ExprLexer; } // vocabulary import (parser grammars)
//! expr : NUM (PLUS | MINUS) NUM ;     // parser rules are lowercase-initial
//! NUM  : [0-9]+ ;                     // lexer rules are uppercase-initial
//! WS   : [ \t\r\n]+ -> skip ;
//! ```
//!
//! Tokenization is done by [`tokens`] (logos), parsing by [`parser`] (chumsky).

pub mod ast;
pub mod parser;
pub mod spec;
pub mod tokens;

pub use ast::{GrammarAst, GrammarKind};
pub use parser::{parse_grammar, GrammarSyntaxError};
pub use spec::{GrammarSpec, ParsedGrammar};
