//! Lexer runtime
//!
//! A [`LexerType`] is the materialized form of a lexer unit: its rules with their
//! patterns compiled. [`LexerType::instantiate`] is the only way to obtain a
//! [`Lexer`]; an existing instance is re-primed for new input with [`Lexer::reset`].
//!
//! Matching picks the longest match over all rules. On a tie the rule declared
//! first wins. A rule split into branches matches as its longest branch.

use std::sync::Arc;

use regex::Regex;

use super::diagnostics::Diagnostic;
use super::image::{LexerImage, Vocabulary};
use super::stream::{CharStream, Token, EOF};

#[derive(Debug)]
struct LexerRuleDef {
    name: String,
    token_type: i32,
    branches: Vec<Regex>,
    skip: bool,
    channel: u32,
}

impl LexerRuleDef {
    /// Length of the longest branch match at the start of `text`, 0 for none.
    fn longest_match(&self, text: &str) -> usize {
        self.branches
            .iter()
            .filter_map(|regex| regex.find(text))
            .map(|found| found.end())
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug)]
pub struct LexerType {
    name: String,
    grammar: String,
    rules: Vec<LexerRuleDef>,
    vocabulary: Arc<Vocabulary>,
    channels: Vec<String>,
}

impl LexerType {
    pub fn from_image(image: LexerImage) -> Result<Self, String> {
        let rules = image
            .rules
            .into_iter()
            .map(|rule| {
                let patterns = if rule.branches.is_empty() {
                    std::slice::from_ref(&rule.pattern)
                } else {
                    rule.branches.as_slice()
                };
                let branches = patterns
                    .iter()
                    .map(|pattern| Regex::new(&format!(r"\A(?:{})", pattern)))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| format!("rule {}: {}", rule.name, e))?;
                Ok(LexerRuleDef {
                    name: rule.name,
                    token_type: rule.token_type,
                    branches,
                    skip: rule.skip,
                    channel: rule.channel,
                })
            })
            .collect::<Result<Vec<_>, String>>()?;

        Ok(LexerType {
            name: image.name,
            grammar: image.grammar,
            rules,
            vocabulary: Arc::new(image.vocabulary),
            channels: image.channels,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grammar(&self) -> &str {
        &self.grammar
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocabulary
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    /// The designated constructor for lexer instances.
    pub fn instantiate(self: &Arc<Self>, input: CharStream) -> Lexer {
        Lexer {
            lexer_type: Arc::clone(self),
            input,
            pos: 0,
            line: 1,
            column: 0,
            emitted: 0,
            diagnostics: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct Lexer {
    lexer_type: Arc<LexerType>,
    input: CharStream,
    pos: usize,
    line: usize,
    column: usize,
    emitted: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Lexer {
    /// Re-prime the instance for new input, dropping all previous state.
    pub fn reset(&mut self, input: CharStream) {
        self.input = input;
        self.pos = 0;
        self.line = 1;
        self.column = 0;
        self.emitted = 0;
        self.diagnostics.clear();
    }

    pub fn lexer_type(&self) -> &Arc<LexerType> {
        &self.lexer_type
    }

    /// Recognition errors reported since the last reset.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Next token on any channel. Returns EOF repeatedly once the input is exhausted.
    pub fn next_token(&mut self) -> Token {
        loop {
            let text = self.input.matching_text();
            if self.pos >= text.len() {
                return self.token(EOF, self.pos, self.pos, 0);
            }

            let rest = &text[self.pos..];
            let mut best: Option<(usize, usize)> = None;
            for (index, rule) in self.lexer_type.rules.iter().enumerate() {
                let len = rule.longest_match(rest);
                if len > 0 && best.map_or(true, |(_, best_len)| len > best_len) {
                    best = Some((index, len));
                }
            }

            let Some((index, len)) = best else {
                let offending = rest.chars().next().unwrap_or('\u{fffd}');
                self.diagnostics.push(Diagnostic::syntax(
                    self.line,
                    self.column,
                    format!(
                        "token recognition error at: '{}'",
                        escape_whitespace(&offending.to_string())
                    ),
                ));
                self.advance(offending.len_utf8());
                continue;
            };

            let start = self.pos;
            let stop = start + len;
            let (token_type, skip, channel) = {
                let rule = &self.lexer_type.rules[index];
                (rule.token_type, rule.skip, rule.channel)
            };

            if skip {
                self.advance(len);
                continue;
            }

            let token = self.token(token_type, start, stop, channel);
            self.advance(len);
            return token;
        }
    }

    /// Every remaining token up to and including EOF.
    pub fn all_tokens(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.is_eof();
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }

    fn token(&mut self, token_type: i32, start: usize, stop: usize, channel: u32) -> Token {
        let text = if token_type == EOF {
            "<EOF>".to_string()
        } else {
            self.input.original()[start..stop].to_string()
        };
        let index = self.emitted;
        if token_type != EOF {
            self.emitted += 1;
        }
        Token {
            token_type,
            text,
            channel,
            line: self.line,
            column: self.column,
            start,
            stop,
            index,
        }
    }

    fn advance(&mut self, len: usize) {
        let end = self.pos + len;
        for c in self.input.original()[self.pos..end].chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        self.pos = end;
    }
}

/// Render control whitespace the way error messages show it.
pub(crate) fn escape_whitespace(text: &str) -> String {
    text.replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kiln::runtime::image::{LexerRuleImage, TokenDef};
    use crate::kiln::runtime::stream::{CaseSensitivity, HIDDEN_CHANNEL};

    fn rule(name: &str, token_type: i32, pattern: &str) -> LexerRuleImage {
        LexerRuleImage {
            name: name.into(),
            token_type,
            pattern: pattern.into(),
            branches: Vec::new(),
            skip: false,
            channel: 0,
        }
    }

    fn lexer_type() -> Arc<LexerType> {
        let image = LexerImage {
            grammar: "Kw".into(),
            name: "KwLexer".into(),
            vocabulary: Vocabulary::new(vec![
                TokenDef {
                    token_type: 1,
                    symbolic: "IF".into(),
                    literal: Some("if".into()),
                },
                TokenDef {
                    token_type: 2,
                    symbolic: "ID".into(),
                    literal: None,
                },
            ]),
            channels: vec!["DEFAULT_TOKEN_CHANNEL".into(), "HIDDEN".into()],
            rules: vec![
                rule("IF", 1, "if"),
                rule("ID", 2, "[a-z]+"),
                LexerRuleImage {
                    skip: true,
                    ..rule("WS", 3, "[ \\n]+")
                },
                LexerRuleImage {
                    channel: HIDDEN_CHANNEL,
                    ..rule("COMMENT", 4, "#[^\\n]*")
                },
            ],
        };
        Arc::new(LexerType::from_image(image).expect("valid patterns"))
    }

    fn types(lexer: &mut Lexer) -> Vec<i32> {
        lexer.all_tokens().iter().map(|t| t.token_type).collect()
    }

    #[test]
    fn test_longest_match_then_rule_order() {
        let ty = lexer_type();
        let mut lexer = ty.instantiate(CharStream::new("if iffy", CaseSensitivity::None));
        assert_eq!(types(&mut lexer), vec![1, 2, EOF]);
    }

    #[test]
    fn test_positions_and_hidden_channel() {
        let ty = lexer_type();
        let mut lexer = ty.instantiate(CharStream::new("a\n  # note\nb", CaseSensitivity::None));
        let tokens = lexer.all_tokens();

        assert_eq!(tokens[0].text, "a");
        assert_eq!((tokens[1].line, tokens[1].column), (2, 2));
        assert_eq!(tokens[1].channel, HIDDEN_CHANNEL);
        assert_eq!(tokens[2].text, "b");
        assert_eq!((tokens[2].line, tokens[2].column), (3, 0));
        assert!(tokens[3].is_eof());
    }

    #[test]
    fn test_recognition_error_skips_one_char() {
        let ty = lexer_type();
        let mut lexer = ty.instantiate(CharStream::new("a$b", CaseSensitivity::None));
        assert_eq!(types(&mut lexer), vec![2, 2, EOF]);
        assert_eq!(
            lexer.diagnostics()[0].to_string(),
            "line 1:1 token recognition error at: '$'"
        );
    }

    #[test]
    fn test_reset_reprimes_instance() {
        let ty = lexer_type();
        let mut lexer = ty.instantiate(CharStream::new("a$", CaseSensitivity::None));
        lexer.all_tokens();
        assert_eq!(lexer.diagnostics().len(), 1);

        lexer.reset(CharStream::new("if", CaseSensitivity::None));
        assert!(lexer.diagnostics().is_empty());
        let tokens = lexer.all_tokens();
        assert_eq!(tokens[0].token_type, 1);
        assert_eq!((tokens[0].line, tokens[0].column, tokens[0].index), (1, 0, 0));
    }

    #[test]
    fn test_folded_matching_keeps_original_text() {
        let ty = lexer_type();
        let mut lexer = ty.instantiate(CharStream::new("IF Foo", CaseSensitivity::Lower));
        let tokens = lexer.all_tokens();
        assert_eq!(tokens[0].token_type, 1);
        assert_eq!(tokens[0].text, "IF");
        assert_eq!(tokens[1].text, "Foo");
    }

    #[test]
    fn test_longest_branch_within_a_rule() {
        // OP : '=' | '==' ;
        let image = LexerImage {
            grammar: "Op".into(),
            name: "OpLexer".into(),
            vocabulary: Vocabulary::default(),
            channels: vec![],
            rules: vec![LexerRuleImage {
                branches: vec!["=".into(), "==".into()],
                ..rule("OP", 1, "=|==")
            }],
        };
        let ty = Arc::new(LexerType::from_image(image).expect("valid patterns"));
        let mut lexer = ty.instantiate(CharStream::new("===", CaseSensitivity::None));
        let texts: Vec<String> = lexer.all_tokens().into_iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["==", "=", "<EOF>"]);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let image = LexerImage {
            grammar: "Bad".into(),
            name: "Bad".into(),
            vocabulary: Vocabulary::default(),
            channels: vec![],
            rules: vec![rule("X", 1, "(")],
        };
        assert!(LexerType::from_image(image).is_err());
    }
}
