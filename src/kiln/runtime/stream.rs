//! Character and token streams

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::lexer::Lexer;

/// Token type of the end-of-file token.
pub const EOF: i32 = -1;
pub const DEFAULT_CHANNEL: u32 = 0;
pub const HIDDEN_CHANNEL: u32 = 1;

/// Case folding applied to the input before lexing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseSensitivity {
    #[default]
    None,
    Upper,
    Lower,
}

impl FromStr for CaseSensitivity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(CaseSensitivity::None),
            "upper" => Ok(CaseSensitivity::Upper),
            "lower" => Ok(CaseSensitivity::Lower),
            other => Err(format!(
                "unknown case sensitivity '{}' (expected none, upper or lower)",
                other
            )),
        }
    }
}

impl fmt::Display for CaseSensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaseSensitivity::None => "none",
            CaseSensitivity::Upper => "upper",
            CaseSensitivity::Lower => "lower",
        };
        f.write_str(name)
    }
}

/// Input text as seen by the lexer.
///
/// Matching runs against the folded text, token text is taken from the original.
/// A character is only folded when its folded form has the same UTF-8 length, so
/// byte offsets are identical in both views.
#[derive(Debug, Clone)]
pub struct CharStream {
    original: String,
    folded: Option<String>,
}

impl CharStream {
    pub fn new(text: &str, case: CaseSensitivity) -> Self {
        let fold = |c: char, folded: &mut String| {
            let mapped: Vec<char> = match case {
                CaseSensitivity::None => vec![c],
                CaseSensitivity::Upper => c.to_uppercase().collect(),
                CaseSensitivity::Lower => c.to_lowercase().collect(),
            };
            match mapped.as_slice() {
                [single] if single.len_utf8() == c.len_utf8() => folded.push(*single),
                _ => folded.push(c),
            }
        };

        let folded = match case {
            CaseSensitivity::None => None,
            _ => {
                let mut folded = String::with_capacity(text.len());
                for c in text.chars() {
                    fold(c, &mut folded);
                }
                Some(folded)
            }
        };

        CharStream {
            original: text.to_string(),
            folded,
        }
    }

    /// The text the lexer matches against.
    pub fn matching_text(&self) -> &str {
        self.folded.as_deref().unwrap_or(&self.original)
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn len(&self) -> usize {
        self.original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub token_type: i32,
    pub text: String,
    pub channel: u32,
    /// 1-based
    pub line: usize,
    /// 0-based, in characters
    pub column: usize,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub stop: usize,
    /// Position in the token stream
    pub index: usize,
}

impl Token {
    pub fn is_eof(&self) -> bool {
        self.token_type == EOF
    }
}

/// Buffered stream of every token the lexer emitted, hidden channels included.
/// Skipped tokens never reach it.
#[derive(Debug, Clone, Default)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stream over tokens produced elsewhere.
    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        TokenStream { tokens }
    }

    /// Pull tokens from the lexer up to and including EOF.
    pub fn fill(&mut self, lexer: &mut Lexer) {
        if self.tokens.last().is_some_and(Token::is_eof) {
            return;
        }
        loop {
            let mut token = lexer.next_token();
            token.index = self.tokens.len();
            let done = token.is_eof();
            self.tokens.push(token);
            if done {
                break;
            }
        }
    }

    pub fn get(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    /// Type of the `i`-th default-channel token (0-based), EOF past the end.
    pub fn la(&self, i: usize) -> i32 {
        self.on_channel(DEFAULT_CHANNEL)
            .nth(i)
            .map(|t| t.token_type)
            .unwrap_or(EOF)
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn on_channel(&self, channel: u32) -> impl Iterator<Item = &Token> {
        self.tokens.iter().filter(move |t| t.channel == channel)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Concatenated text of the tokens at positions `start..=stop`, EOF excluded.
    pub fn text(&self, start: usize, stop: usize) -> String {
        self.tokens
            .iter()
            .skip(start)
            .take(stop.saturating_sub(start) + 1)
            .filter(|t| !t.is_eof())
            .map(|t| t.text.as_str())
            .collect()
    }
}
