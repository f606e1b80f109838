//! Testing utilities
//!
//! Curated sample grammars shared by unit tests, integration tests and the CLI smoke
//! tests. Tests should use these samples instead of writing ad-hoc grammar text, so
//! that a change to the grammar notation only has to be reflected here.
//!
//! Available samples:
//! - [`EXPR_GRAMMAR`] - combined grammar, a single `expr : NUM (PLUS | MINUS) NUM` rule
//! - [`CALC_LEXER`] / [`CALC_PARSER`] - split grammar pair joined by `tokenVocab`
//! - [`GREETING_GRAMMAR`] - combined grammar whose parser rules use implicit literal tokens
//! - [`AMBIGUOUS_GRAMMAR`] - two alternatives matching the same input

use crate::kiln::error::Result;
use crate::kiln::grammar::GrammarSpec;
use crate::kiln::workflow::{CompiledParser, ParserOptions};

pub const EXPR_GRAMMAR: &str = r"grammar Expr;

expr : NUM (PLUS | MINUS) NUM ;

NUM   : [0-9]+ ;
PLUS  : '+' ;
MINUS : '-' ;
WS    : [ \t\r\n]+ -> skip ;
";

pub const CALC_LEXER: &str = r"lexer grammar CalcLexer;

NUM     : DIGIT+ ;
ID      : [a-zA-Z_] [a-zA-Z_0-9]* ;
PLUS    : '+' ;
MINUS   : '-' ;
STAR    : '*' ;
SLASH   : '/' ;
LPAREN  : '(' ;
RPAREN  : ')' ;
ASSIGN  : '=' ;
SEMI    : ';' ;
COMMENT : '#' ~[\r\n]* -> channel(HIDDEN) ;
WS      : [ \t\r\n]+ -> skip ;

fragment DIGIT : [0-9] ;
";

pub const CALC_PARSER: &str = r"parser grammar CalcParser;

options { tokenVocab = CalcLexer; }

program   : statement+ EOF ;
statement : ID ASSIGN expr SEMI
          | expr SEMI
          ;
expr      : term ((PLUS | MINUS) term)* ;
term      : factor ((STAR | SLASH) factor)* ;
factor    : NUM
          | ID
          | LPAREN expr RPAREN
          ;
";

pub const GREETING_GRAMMAR: &str = r"grammar Greeting;

greeting : 'hello' NAME '!'? ;

NAME : [a-z]+ ;
WS   : ' '+ -> skip ;
";

pub const AMBIGUOUS_GRAMMAR: &str = r"grammar Amb;

start : left | right ;
left  : ID ;
right : ID ;

ID : [a-z]+ ;
WS : [ \t]+ -> skip ;
";

/// The sample expression grammar as a spec.
pub fn expr_spec() -> GrammarSpec {
    GrammarSpec::from_source("Expr.g4", EXPR_GRAMMAR)
}

/// The split calculator grammars, parser first to show that input order is irrelevant.
pub fn calc_specs() -> Vec<GrammarSpec> {
    vec![
        GrammarSpec::from_source("CalcParser.g4", CALC_PARSER),
        GrammarSpec::from_source("CalcLexer.g4", CALC_LEXER),
    ]
}

/// Construct and compile a parser over the given specs with default options.
pub fn compiled(specs: Vec<GrammarSpec>) -> Result<CompiledParser> {
    let mut parser = CompiledParser::new(specs, ParserOptions::default())?;
    parser.compile()?;
    Ok(parser)
}
