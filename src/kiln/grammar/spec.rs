//! Grammar specification inputs
//!
//! A [`GrammarSpec`] is the raw, immutable input: where the text came from and the
//! text itself. Parsing it yields a [`ParsedGrammar`], which knows the declared name,
//! the grammar kind and the imported vocabulary.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use super::ast::{GrammarAst, GrammarKind};
use super::parser::{parse_grammar, GrammarSyntaxError};
use crate::kiln::error::{KilnError, Result};

/// Immutable grammar input, built from user text or a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarSpec {
    origin: String,
    text: Arc<str>,
}

impl GrammarSpec {
    /// Build a specification from in-memory text. `origin` is only used in messages.
    pub fn from_source(origin: impl Into<String>, text: impl Into<String>) -> Self {
        GrammarSpec {
            origin: origin.into(),
            text: Arc::from(text.into()),
        }
    }

    /// Read a specification from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| KilnError::config_io(path, e))?;
        Ok(Self::from_source(path.display().to_string(), text))
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Parse the text into its structural form.
    pub fn parse(&self) -> std::result::Result<ParsedGrammar, Vec<GrammarSyntaxError>> {
        let ast = parse_grammar(&self.text)?;
        Ok(ParsedGrammar {
            spec: self.clone(),
            ast: Arc::new(ast),
        })
    }
}

/// A specification together with its parsed structure.
#[derive(Debug, Clone)]
pub struct ParsedGrammar {
    pub spec: GrammarSpec,
    pub ast: Arc<GrammarAst>,
}

impl ParsedGrammar {
    /// The declared grammar name (`grammar X;`).
    pub fn name(&self) -> &str {
        &self.ast.name
    }

    /// The grammar whose vocabulary is imported through `options { tokenVocab = V; }`.
    pub fn vocabulary(&self) -> Option<&str> {
        self.ast.token_vocab()
    }

    pub fn kind(&self) -> GrammarKind {
        self.ast.kind
    }
}
