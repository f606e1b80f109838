//! Structural representation of a parsed grammar specification

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The three header forms of a grammar file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrammarKind {
    /// `grammar X;` carries both lexer and parser rules
    Combined,
    /// `lexer grammar X;`
    Lexer,
    /// `parser grammar X;`
    Parser,
}

impl GrammarKind {
    pub fn has_lexer_rules(&self) -> bool {
        matches!(self, GrammarKind::Combined | GrammarKind::Lexer)
    }

    pub fn has_parser_rules(&self) -> bool {
        matches!(self, GrammarKind::Combined | GrammarKind::Parser)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarAst {
    pub kind: GrammarKind,
    pub name: String,
    pub options: BTreeMap<String, String>,
    pub parser_rules: Vec<ParserRule>,
    pub lexer_rules: Vec<LexerRule>,
}

impl GrammarAst {
    /// The grammar whose vocabulary this one imports, if any.
    pub fn token_vocab(&self) -> Option<&str> {
        self.options.get("tokenVocab").map(String::as_str)
    }

    pub fn parser_rule(&self, name: &str) -> Option<&ParserRule> {
        self.parser_rules.iter().find(|r| r.name == name)
    }

    pub fn lexer_rule(&self, name: &str) -> Option<&LexerRule> {
        self.lexer_rules.iter().find(|r| r.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserRule {
    pub name: String,
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub elements: Vec<Element>,
    /// `# Label` suffix
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub atom: Atom,
    pub quantifier: Quantifier,
    /// `false` for the `??`, `*?` and `+?` forms
    pub greedy: bool,
    /// `x=` or `x+=` element label
    pub label: Option<String>,
}

impl Element {
    pub fn single(atom: Atom) -> Self {
        Element {
            atom,
            quantifier: Quantifier::One,
            greedy: true,
            label: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Atom {
    TokenRef(String),
    RuleRef(String),
    Literal(String),
    /// `.` matches any single token
    Wildcard,
    Eof,
    Block(Vec<Alternative>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantifier {
    One,
    Optional,
    Star,
    Plus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexerRule {
    pub name: String,
    pub fragment: bool,
    pub alternatives: Vec<LexerAlt>,
    pub commands: Vec<LexerCommand>,
}

impl LexerRule {
    pub fn is_skipped(&self) -> bool {
        self.commands.contains(&LexerCommand::Skip)
    }

    pub fn channel(&self) -> Option<&str> {
        self.commands.iter().find_map(|c| match c {
            LexerCommand::Channel(name) => Some(name.as_str()),
            LexerCommand::Skip => None,
        })
    }

    /// The literal text if the rule is exactly one literal (`PLUS: '+';`).
    pub fn literal_text(&self) -> Option<&str> {
        match self.alternatives.as_slice() {
            [alt] => match alt.elements.as_slice() {
                [LexerElement {
                    atom: LexerAtom::Literal(text),
                    quantifier: Quantifier::One,
                    ..
                }] => Some(text),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexerAlt {
    pub elements: Vec<LexerElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexerElement {
    pub atom: LexerAtom,
    pub quantifier: Quantifier,
    pub greedy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LexerAtom {
    Literal(String),
    Range(char, char),
    /// Raw body of `[...]`, escapes still in place
    Set { body: String, negated: bool },
    /// `~'x'`
    NotLiteral(char),
    Any,
    RuleRef(String),
    Block(Vec<LexerAlt>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LexerCommand {
    Skip,
    Channel(String),
}
