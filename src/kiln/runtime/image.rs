//! Binary unit images
//!
//! A compiled unit is a bincode-encoded [`UnitImage`]. Lexer images carry the token
//! vocabulary and the rule patterns; parser images carry the productions with every
//! reference already resolved (token types and production indices); context images
//! describe the node type of one production.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::stream::EOF;
use crate::kiln::grammar::ast::Quantifier;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnitImage {
    Lexer(LexerImage),
    Parser(ParserImage),
    Context(ContextImage),
}

impl UnitImage {
    pub fn encode(&self) -> Result<Vec<u8>, String> {
        bincode::serialize(self).map_err(|e| e.to_string())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, String> {
        bincode::deserialize(bytes).map_err(|e| e.to_string())
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            UnitImage::Lexer(_) => "lexer",
            UnitImage::Parser(_) => "parser",
            UnitImage::Context(_) => "context",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDef {
    pub token_type: i32,
    pub symbolic: String,
    /// Literal text for tokens defined by a single literal
    pub literal: Option<String>,
}

/// Token names by type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    tokens: Vec<TokenDef>,
}

impl Vocabulary {
    pub fn new(tokens: Vec<TokenDef>) -> Self {
        Vocabulary { tokens }
    }

    pub fn tokens(&self) -> &[TokenDef] {
        &self.tokens
    }

    pub fn get(&self, token_type: i32) -> Option<&TokenDef> {
        self.tokens.iter().find(|t| t.token_type == token_type)
    }

    pub fn token_type(&self, symbolic: &str) -> Option<i32> {
        if symbolic == "EOF" {
            return Some(EOF);
        }
        self.tokens
            .iter()
            .find(|t| t.symbolic == symbolic)
            .map(|t| t.token_type)
    }

    pub fn literal_type(&self, literal: &str) -> Option<i32> {
        self.tokens
            .iter()
            .find(|t| t.literal.as_deref() == Some(literal))
            .map(|t| t.token_type)
    }

    /// Name used for a token type inside the parse tree.
    pub fn symbolic_name(&self, token_type: i32) -> String {
        if token_type == EOF {
            return "EOF".to_string();
        }
        self.get(token_type)
            .map(|t| t.symbolic.clone())
            .unwrap_or_else(|| token_type.to_string())
    }

    /// Name used for a token type in error messages: the quoted literal when there
    /// is one, otherwise the symbolic name.
    pub fn display_name(&self, token_type: i32) -> String {
        if token_type == EOF {
            return "<EOF>".to_string();
        }
        match self.get(token_type) {
            Some(TokenDef {
                literal: Some(literal),
                ..
            }) => format!("'{}'", literal),
            Some(def) => def.symbolic.clone(),
            None => token_type.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexerRuleImage {
    pub name: String,
    pub token_type: i32,
    /// `regex` syntax, matched anchored at the current position
    pub pattern: String,
    /// Separately matched branches of `pattern`; empty for a single branch
    #[serde(default)]
    pub branches: Vec<String>,
    pub skip: bool,
    pub channel: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexerImage {
    pub grammar: String,
    pub name: String,
    pub vocabulary: Vocabulary,
    /// Channel names by number
    pub channels: Vec<String>,
    pub rules: Vec<LexerRuleImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Matcher {
    Token(i32),
    /// Index into the parser's production list
    Rule(usize),
    Wildcard,
    Eof,
    Block(Vec<AlternativeImage>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementImage {
    pub matcher: Matcher,
    pub quantifier: Quantifier,
    pub greedy: bool,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeImage {
    pub label: Option<String>,
    pub elements: Vec<ElementImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionImage {
    pub name: String,
    /// Unit name of the context type, e.g. `ExprParser$ExprContext`
    pub context: String,
    pub alternatives: Vec<AlternativeImage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserImage {
    pub grammar: String,
    pub name: String,
    /// Module name of the lexer that supplies the token vocabulary
    pub lexer: String,
    pub vocabulary: Vocabulary,
    pub productions: Vec<ProductionImage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextImage {
    pub name: String,
    pub parser: String,
    pub production: String,
    pub rule_index: usize,
    pub alternative_labels: Vec<String>,
    /// Element labels declared anywhere in the production, mapped to whether
    /// they collect a list (`+=`)
    pub element_labels: BTreeMap<String, bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocabulary() -> Vocabulary {
        Vocabulary::new(vec![
            TokenDef {
                token_type: 1,
                symbolic: "NUM".into(),
                literal: None,
            },
            TokenDef {
                token_type: 2,
                symbolic: "PLUS".into(),
                literal: Some("+".into()),
            },
        ])
    }

    #[test]
    fn test_display_names() {
        let vocab = vocabulary();
        assert_eq!(vocab.display_name(1), "NUM");
        assert_eq!(vocab.display_name(2), "'+'");
        assert_eq!(vocab.display_name(EOF), "<EOF>");
        assert_eq!(vocab.symbolic_name(2), "PLUS");
        assert_eq!(vocab.token_type("EOF"), Some(EOF));
        assert_eq!(vocab.literal_type("+"), Some(2));
    }

    #[test]
    fn test_encode_decode() {
        let image = UnitImage::Lexer(LexerImage {
            grammar: "Expr".into(),
            name: "ExprLexer".into(),
            vocabulary: vocabulary(),
            channels: vec!["DEFAULT_TOKEN_CHANNEL".into(), "HIDDEN".into()],
            rules: vec![LexerRuleImage {
                name: "NUM".into(),
                token_type: 1,
                pattern: "[0-9]+".into(),
                branches: Vec::new(),
                skip: false,
                channel: 0,
            }],
        });
        let bytes = image.encode().expect("encodes");
        assert_eq!(UnitImage::decode(&bytes).expect("decodes"), image);
        assert!(UnitImage::decode(&bytes[..3]).is_err());
    }
}
