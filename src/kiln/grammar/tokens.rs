//! Token definitions for the grammar specification language
//!
//! The tokens are defined using the logos derive macro. Whitespace and both comment
//! styles are skipped by the lexer itself, so the parser only ever sees significant
//! tokens paired with their byte spans.
use logos::Logos;
use std::fmt;

/// All possible tokens of a grammar specification
#[derive(Logos, Debug, PartialEq, Eq, Hash, Clone)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
pub enum Token {
    // Header keywords
    #[token("grammar")]
    Grammar,
    #[token("lexer")]
    Lexer,
    #[token("parser")]
    Parser,
    #[token("fragment")]
    Fragment,
    #[token("options")]
    Options,

    // Punctuation
    #[token("->")]
    Arrow,
    #[token("..")]
    Range,
    #[token(":")]
    Colon,
    #[token(";")]
    Semi,
    #[token("|")]
    Pipe,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("?")]
    Question,
    #[token("*")]
    Star,
    #[token("+")]
    Plus,
    #[token("~")]
    Tilde,
    #[token(".")]
    Dot,
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("#")]
    Hash,
    #[token(",")]
    Comma,

    // Names: uppercase-initial names are tokens, lowercase-initial names are rules
    #[regex(r"[A-Z][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    TokenName(String),
    #[regex(r"[a-z][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    RuleName(String),

    // Quoted literal, already unescaped
    #[regex(r"'([^'\\]|\\.)*'", |lex| unescape_literal(lex.slice()))]
    Literal(String),

    // Character set body, kept raw (escapes are interpreted by the generator)
    #[regex(r"\[([^\]\\]|\\.)*\]", |lex| {
        let slice = lex.slice();
        slice[1..slice.len() - 1].to_string()
    })]
    CharSet(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Grammar => write!(f, "'grammar'"),
            Token::Lexer => write!(f, "'lexer'"),
            Token::Parser => write!(f, "'parser'"),
            Token::Fragment => write!(f, "'fragment'"),
            Token::Options => write!(f, "'options'"),
            Token::Arrow => write!(f, "'->'"),
            Token::Range => write!(f, "'..'"),
            Token::Colon => write!(f, "':'"),
            Token::Semi => write!(f, "';'"),
            Token::Pipe => write!(f, "'|'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::LBrace => write!(f, "'{{'"),
            Token::RBrace => write!(f, "'}}'"),
            Token::Question => write!(f, "'?'"),
            Token::Star => write!(f, "'*'"),
            Token::Plus => write!(f, "'+'"),
            Token::Tilde => write!(f, "'~'"),
            Token::Dot => write!(f, "'.'"),
            Token::Assign => write!(f, "'='"),
            Token::PlusAssign => write!(f, "'+='"),
            Token::Hash => write!(f, "'#'"),
            Token::Comma => write!(f, "','"),
            Token::TokenName(name) | Token::RuleName(name) => write!(f, "{}", name),
            Token::Literal(text) => write!(f, "'{}'", text),
            Token::CharSet(body) => write!(f, "[{}]", body),
        }
    }
}

/// Strip the quotes of a literal and resolve its escape sequences.
///
/// Returns `None` for malformed escapes, which logos reports as a lexing error.
fn unescape_literal(slice: &str) -> Option<String> {
    let inner = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                if hex.len() != 4 {
                    return None;
                }
                let code = u32::from_str_radix(&hex, 16).ok()?;
                out.push(char::from_u32(code)?);
            }
            _ => return None,
        }
    }
    Some(out)
}

/// Tokenize a grammar specification, keeping byte spans.
///
/// Unrecognised input is returned as an `Err` carrying the offending span.
pub fn tokenize(source: &str) -> Result<Vec<(Token, logos::Span)>, logos::Span> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => return Err(lexer.span()),
        }
    }

    Ok(tokens)
}
