//! Grammar specification parser
//!
//! Built with chumsky combinators over the logos token stream. The parser is purely
//! structural: it checks the shape of the file and a few whole-file rules (rule kinds
//! allowed by the header, duplicate names) but does not resolve references. That
//! happens later in the generator and the compiler.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::ops::Range;

use chumsky::error::SimpleReason;
use chumsky::prelude::*;
use chumsky::Stream;

use super::ast::{
    Alternative, Atom, Element, GrammarAst, GrammarKind, LexerAlt, LexerAtom, LexerCommand,
    LexerElement, LexerRule, ParserRule, Quantifier,
};
use super::tokens::{tokenize, Token};

type ParserError = Simple<Token>;

/// A problem found while parsing grammar text, positioned in that text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarSyntaxError {
    /// 1-based line
    pub line: usize,
    /// 0-based column, in characters
    pub column: usize,
    pub message: String,
}

impl fmt::Display for GrammarSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}:{} {}", self.line, self.column, self.message)
    }
}

impl GrammarSyntaxError {
    fn at(source: &str, offset: usize, message: impl Into<String>) -> Self {
        let (line, column) = line_column(source, offset);
        GrammarSyntaxError {
            line,
            column,
            message: message.into(),
        }
    }
}

fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = source.get(..offset).unwrap_or(source);
    let line = before.matches('\n').count() + 1;
    let column = match before.rfind('\n') {
        Some(pos) => before[pos + 1..].chars().count(),
        None => before.chars().count(),
    };
    (line, column)
}

enum Rule {
    Parser(ParserRule),
    Lexer(LexerRule),
}

impl Rule {
    fn name(&self) -> &str {
        match self {
            Rule::Parser(rule) => &rule.name,
            Rule::Lexer(rule) => &rule.name,
        }
    }
}

/// Parse grammar text into its structural representation.
pub fn parse_grammar(source: &str) -> Result<GrammarAst, Vec<GrammarSyntaxError>> {
    let tokens = tokenize(source).map_err(|span| {
        let text = source.get(span.clone()).unwrap_or("");
        vec![GrammarSyntaxError::at(
            source,
            span.start,
            format!("unrecognized input '{}'", text),
        )]
    })?;

    let eoi = source.len()..source.len() + 1;
    let stream = Stream::from_iter(eoi, tokens.into_iter());

    let ((kind, name), options, rules) = grammar_file().parse(stream).map_err(|errors| {
        errors
            .iter()
            .map(|e| GrammarSyntaxError::at(source, e.span().start, describe(e)))
            .collect::<Vec<_>>()
    })?;

    let mut problems = Vec::new();
    let mut seen = HashSet::new();
    let mut parser_rules = Vec::new();
    let mut lexer_rules = Vec::new();

    for (rule, span) in rules {
        if !seen.insert(rule.name().to_string()) {
            problems.push(GrammarSyntaxError::at(
                source,
                span.start,
                format!("rule '{}' redefinition", rule.name()),
            ));
            continue;
        }
        match rule {
            Rule::Parser(rule) if !kind.has_parser_rules() => problems.push(
                GrammarSyntaxError::at(
                    source,
                    span.start,
                    format!("parser rule '{}' not allowed in lexer grammar", rule.name),
                ),
            ),
            Rule::Lexer(rule) if !kind.has_lexer_rules() => problems.push(
                GrammarSyntaxError::at(
                    source,
                    span.start,
                    format!("lexer rule '{}' not allowed in parser grammar", rule.name),
                ),
            ),
            Rule::Parser(rule) => parser_rules.push(rule),
            Rule::Lexer(rule) => lexer_rules.push(rule),
        }
    }

    if !problems.is_empty() {
        return Err(problems);
    }

    Ok(GrammarAst {
        kind,
        name,
        options,
        parser_rules,
        lexer_rules,
    })
}

fn describe(error: &ParserError) -> String {
    if let SimpleReason::Custom(message) = error.reason() {
        return message.clone();
    }

    let found = error
        .found()
        .map(|t| t.to_string())
        .unwrap_or_else(|| "end of input".to_string());

    if let Some(label) = error.label() {
        return format!("unexpected {}, expected {}", found, label);
    }

    let mut expected: Vec<String> = error
        .expected()
        .map(|e| match e {
            Some(token) => token.to_string(),
            None => "end of input".to_string(),
        })
        .collect();
    expected.sort();
    expected.dedup();

    if expected.is_empty() {
        format!("unexpected {}", found)
    } else {
        format!("unexpected {}, expected one of {}", found, expected.join(", "))
    }
}

fn grammar_file() -> impl Parser<
    Token,
    ((GrammarKind, String), BTreeMap<String, String>, Vec<(Rule, Range<usize>)>),
    Error = ParserError,
> {
    let rule = choice((
        parser_rule().map(Rule::Parser),
        lexer_rule().map(Rule::Lexer),
    ))
    .map_with_span(|rule, span| (rule, span));

    header()
        .then(options().or_not())
        .then(rule.repeated())
        .then_ignore(end())
        .map(|((header, options), rules)| (header, options.unwrap_or_default(), rules))
}

fn rule_name() -> impl Parser<Token, String, Error = ParserError> + Clone {
    filter_map(|span, token| match token {
        Token::RuleName(name) => Ok(name),
        other => Err(Simple::expected_input_found(span, Vec::new(), Some(other))),
    })
    .labelled("rule name")
}

fn token_name() -> impl Parser<Token, String, Error = ParserError> + Clone {
    filter_map(|span, token| match token {
        Token::TokenName(name) => Ok(name),
        other => Err(Simple::expected_input_found(span, Vec::new(), Some(other))),
    })
    .labelled("token name")
}

fn identifier() -> impl Parser<Token, String, Error = ParserError> + Clone {
    filter_map(|span, token| match token {
        Token::TokenName(name) | Token::RuleName(name) => Ok(name),
        other => Err(Simple::expected_input_found(span, Vec::new(), Some(other))),
    })
    .labelled("identifier")
}

fn literal() -> impl Parser<Token, String, Error = ParserError> + Clone {
    filter_map(|span, token| match token {
        Token::Literal(text) => Ok(text),
        other => Err(Simple::expected_input_found(span, Vec::new(), Some(other))),
    })
    .labelled("literal")
}

fn char_set() -> impl Parser<Token, String, Error = ParserError> + Clone {
    filter_map(|span, token| match token {
        Token::CharSet(body) => Ok(body),
        other => Err(Simple::expected_input_found(span, Vec::new(), Some(other))),
    })
    .labelled("character set")
}

fn header() -> impl Parser<Token, (GrammarKind, String), Error = ParserError> + Clone {
    choice((
        just(Token::Lexer).to(GrammarKind::Lexer),
        just(Token::Parser).to(GrammarKind::Parser),
    ))
    .or_not()
    .then_ignore(just(Token::Grammar))
    .then(identifier())
    .then_ignore(just(Token::Semi))
    .map(|(kind, name)| (kind.unwrap_or(GrammarKind::Combined), name))
}

fn options() -> impl Parser<Token, BTreeMap<String, String>, Error = ParserError> + Clone {
    let entry = identifier()
        .then_ignore(just(Token::Assign))
        .then(identifier().or(literal()))
        .then_ignore(just(Token::Semi));

    just(Token::Options)
        .ignore_then(
            entry
                .repeated()
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .map(|entries| entries.into_iter().collect())
}

/// `?`, `*` or `+`, each optionally followed by `?` for the non-greedy form
fn suffix() -> impl Parser<Token, (Quantifier, bool), Error = ParserError> + Clone {
    choice((
        just(Token::Question).to(Quantifier::Optional),
        just(Token::Star).to(Quantifier::Star),
        just(Token::Plus).to(Quantifier::Plus),
    ))
    .then(just(Token::Question).or_not())
    .map(|(quantifier, lazy)| (quantifier, lazy.is_none()))
    .or_not()
    .map(|suffix| suffix.unwrap_or((Quantifier::One, true)))
}

fn parser_alternatives() -> impl Parser<Token, Vec<Alternative>, Error = ParserError> + Clone {
    recursive(|alternatives| {
        let atom = choice((
            token_name().map(|name| {
                if name == "EOF" {
                    Atom::Eof
                } else {
                    Atom::TokenRef(name)
                }
            }),
            rule_name().map(Atom::RuleRef),
            literal().map(Atom::Literal),
            just(Token::Dot).to(Atom::Wildcard),
            alternatives
                .delimited_by(just(Token::LParen), just(Token::RParen))
                .map(Atom::Block),
        ));

        let label = identifier().then_ignore(just(Token::Assign).or(just(Token::PlusAssign)));

        let element = label
            .or_not()
            .then(atom)
            .then(suffix())
            .map(|((label, atom), (quantifier, greedy))| Element {
                atom,
                quantifier,
                greedy,
                label,
            });

        let alternative = element
            .repeated()
            .then(just(Token::Hash).ignore_then(identifier()).or_not())
            .map(|(elements, label)| Alternative { elements, label });

        alternative.separated_by(just(Token::Pipe)).at_least(1)
    })
    .boxed()
}

fn parser_rule() -> impl Parser<Token, ParserRule, Error = ParserError> + Clone {
    rule_name()
        .then_ignore(just(Token::Colon))
        .then(parser_alternatives())
        .then_ignore(just(Token::Semi))
        .map(|(name, alternatives)| ParserRule { name, alternatives })
}

fn single_char() -> impl Parser<Token, char, Error = ParserError> + Clone {
    literal().try_map(|text, span| {
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(Simple::custom(
                span,
                format!("'{}' is not a single character", text),
            )),
        }
    })
}

fn lexer_alternatives() -> impl Parser<Token, Vec<LexerAlt>, Error = ParserError> + Clone {
    recursive(|alternatives| {
        let range = single_char()
            .then_ignore(just(Token::Range))
            .then(single_char())
            .map(|(from, to)| LexerAtom::Range(from, to));

        let negated = just(Token::Tilde).ignore_then(choice((
            char_set().map(|body| LexerAtom::Set {
                body,
                negated: true,
            }),
            single_char().map(LexerAtom::NotLiteral),
        )));

        let atom = choice((
            range,
            literal().map(LexerAtom::Literal),
            char_set().map(|body| LexerAtom::Set {
                body,
                negated: false,
            }),
            negated,
            just(Token::Dot).to(LexerAtom::Any),
            token_name().map(LexerAtom::RuleRef),
            alternatives
                .delimited_by(just(Token::LParen), just(Token::RParen))
                .map(LexerAtom::Block),
        ));

        let element = atom
            .then(suffix())
            .map(|(atom, (quantifier, greedy))| LexerElement {
                atom,
                quantifier,
                greedy,
            });

        element
            .repeated()
            .map(|elements| LexerAlt { elements })
            .separated_by(just(Token::Pipe))
            .at_least(1)
    })
    .boxed()
}

fn lexer_command() -> impl Parser<Token, LexerCommand, Error = ParserError> + Clone {
    identifier()
        .then(
            identifier()
                .delimited_by(just(Token::LParen), just(Token::RParen))
                .or_not(),
        )
        .try_map(|(name, argument), span| match (name.as_str(), argument) {
            ("skip", None) => Ok(LexerCommand::Skip),
            ("channel", Some(channel)) => Ok(LexerCommand::Channel(channel)),
            _ => Err(Simple::custom(
                span,
                format!("unsupported lexer command '{}'", name),
            )),
        })
}

fn lexer_rule() -> impl Parser<Token, LexerRule, Error = ParserError> + Clone {
    let commands = just(Token::Arrow).ignore_then(
        lexer_command()
            .separated_by(just(Token::Comma))
            .at_least(1),
    );

    just(Token::Fragment)
        .or_not()
        .then(token_name())
        .then_ignore(just(Token::Colon))
        .then(lexer_alternatives())
        .then(commands.or_not())
        .then_ignore(just(Token::Semi))
        .map(|(((fragment, name), alternatives), commands)| LexerRule {
            name,
            fragment: fragment.is_some(),
            alternatives,
            commands: commands.unwrap_or_default(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kiln::testing::{CALC_LEXER, CALC_PARSER, EXPR_GRAMMAR};

    #[test]
    fn test_combined_grammar() {
        let ast = parse_grammar(EXPR_GRAMMAR).expect("parses");
        assert_eq!(ast.kind, GrammarKind::Combined);
        assert_eq!(ast.name, "Expr");
        assert_eq!(ast.parser_rules.len(), 1);
        assert_eq!(ast.parser_rules[0].name, "expr");

        let names: Vec<_> = ast.lexer_rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["NUM", "PLUS", "MINUS", "WS"]);
        assert!(ast.lexer_rule("WS").expect("WS").is_skipped());
        assert_eq!(ast.lexer_rule("PLUS").and_then(|r| r.literal_text()), Some("+"));
    }

    #[test]
    fn test_expr_rule_shape() {
        let ast = parse_grammar(EXPR_GRAMMAR).expect("parses");
        let expr = &ast.parser_rules[0];
        assert_eq!(expr.alternatives.len(), 1);

        let elements = &expr.alternatives[0].elements;
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[0].atom, Atom::TokenRef("NUM".into()));
        match &elements[1].atom {
            Atom::Block(alts) => assert_eq!(alts.len(), 2),
            other => panic!("expected block, got {:?}", other),
        }
    }

    #[test]
    fn test_split_grammars_and_token_vocab() {
        let lexer = parse_grammar(CALC_LEXER).expect("lexer parses");
        assert_eq!(lexer.kind, GrammarKind::Lexer);
        assert!(lexer.parser_rules.is_empty());

        let parser = parse_grammar(CALC_PARSER).expect("parser parses");
        assert_eq!(parser.kind, GrammarKind::Parser);
        assert_eq!(parser.token_vocab(), Some("CalcLexer"));
        assert!(parser.lexer_rules.is_empty());
    }

    #[test]
    fn test_suffixes_labels_and_commands() {
        let source = r#"
            grammar Misc;
            list : items+=ID (',' items+=ID)*? # Items
                 | EOF                          # Empty
                 ;
            ID : [a-zA-Z_] [a-zA-Z_0-9]* ;
            fragment DIGIT : '0'..'9' ;
            COMMENT : '#' ~[\r\n]* -> channel(HIDDEN) ;
        "#;
        let ast = parse_grammar(source).expect("parses");

        let list = ast.parser_rule("list").expect("list");
        assert_eq!(list.alternatives[0].label.as_deref(), Some("Items"));
        assert_eq!(list.alternatives[0].elements[0].label.as_deref(), Some("items"));
        let loop_element = &list.alternatives[0].elements[1];
        assert_eq!(loop_element.quantifier, Quantifier::Star);
        assert!(!loop_element.greedy);
        assert_eq!(list.alternatives[1].elements[0].atom, Atom::Eof);

        let digit = ast.lexer_rule("DIGIT").expect("DIGIT");
        assert!(digit.fragment);
        assert_eq!(
            digit.alternatives[0].elements[0].atom,
            LexerAtom::Range('0', '9')
        );

        let comment = ast.lexer_rule("COMMENT").expect("COMMENT");
        assert_eq!(comment.channel(), Some("HIDDEN"));
    }

    #[test]
    fn test_missing_semicolon_is_positioned() {
        let errors = parse_grammar("grammar Bad;\nexpr : NUM\nNUM : [0-9]+ ;").expect_err("fails");
        assert!(!errors.is_empty());
        assert!(errors[0].line >= 2);
    }

    #[test]
    fn test_rule_kind_must_match_header() {
        let errors =
            parse_grammar("lexer grammar L;\nexpr : A ;\nA : 'a' ;").expect_err("rejected");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("not allowed in lexer grammar"));
        assert_eq!(errors[0].line, 2);
    }

    #[test]
    fn test_duplicate_rules_are_rejected() {
        let errors =
            parse_grammar("grammar D;\na : A ;\na : A ;\nA : 'a' ;").expect_err("rejected");
        assert_eq!(errors[0].message, "rule 'a' redefinition");
    }

    #[test]
    fn test_unsupported_command() {
        assert!(parse_grammar("lexer grammar L;\nA : 'a' -> more ;").is_err());
        assert!(parse_grammar("lexer grammar L;\nA : 'a' -> skip ;").is_ok());
    }

    #[test]
    fn test_unrecognized_character() {
        let errors = parse_grammar("grammar G;\n a : $ ;").expect_err("rejected");
        assert_eq!(errors[0].line, 2);
        assert_eq!(errors[0].column, 5);
        assert!(errors[0].message.contains("'$'"));
    }
}
