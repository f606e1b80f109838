//! Parser runtime
//!
//! A [`ParserType`] is the materialized form of a parser unit. It owns the
//! production table: an explicit map from production name to a callable, built once
//! when the type is materialized. Invoking a production runs a backtracking
//! interpreter over the resolved production images. Every element is matched
//! together with the rest of the parse, so a failure further on sends the
//! interpreter back to the most recent open choice:
//!
//! - alternatives are tried in order; the first one that leads to a complete match
//!   wins
//! - greedy loops and optionals try one more match first, then give it back
//! - non-greedy loops try to stop first
//! - the farthest failure seen is reported as the syntax error
//!
//! While not probing, a decision whose later alternatives also match the same
//! extent is reported as an ambiguity, and a decision that only succeeded after an
//! earlier alternative failed past its first token is reported as context
//! sensitivity.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use super::diagnostics::{Diagnostic, DiagnosticCollector, DiagnosticKind};
use super::image::{
    AlternativeImage, ContextImage, ElementImage, Matcher, ParserImage, ProductionImage,
    Vocabulary,
};
use super::lexer::escape_whitespace;
use super::stream::{Token, TokenStream, DEFAULT_CHANNEL, EOF};
use super::tree::{ParseTree, RuleNode, TerminalNode};
use crate::kiln::grammar::ast::Quantifier;

/// Callable entry for one production.
pub type ProductionFn = Arc<dyn Fn(&mut Parser) -> RuleNode + Send + Sync>;

/// Node type of one production.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextType {
    pub name: String,
    pub parser: String,
    pub production: String,
    pub rule_index: usize,
    pub alternative_labels: Vec<String>,
    pub element_labels: BTreeMap<String, bool>,
}

impl ContextType {
    pub fn from_image(image: ContextImage) -> Self {
        ContextType {
            name: image.name,
            parser: image.parser,
            production: image.production,
            rule_index: image.rule_index,
            alternative_labels: image.alternative_labels,
            element_labels: image.element_labels,
        }
    }
}

pub struct ParserType {
    name: String,
    grammar: String,
    lexer: String,
    vocabulary: Arc<Vocabulary>,
    productions: Vec<ProductionImage>,
    table: HashMap<String, ProductionFn>,
    contexts: BTreeMap<String, Arc<ContextType>>,
}

impl fmt::Debug for ParserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserType")
            .field("name", &self.name)
            .field("grammar", &self.grammar)
            .field("lexer", &self.lexer)
            .field("productions", &self.production_names())
            .finish()
    }
}

impl ParserType {
    /// Materialize a parser from its image and its already resolved context types.
    pub fn new(image: ParserImage, contexts: Vec<Arc<ContextType>>) -> Result<Self, String> {
        let contexts: BTreeMap<String, Arc<ContextType>> = contexts
            .into_iter()
            .map(|c| (c.production.clone(), c))
            .collect();

        let count = image.productions.len();
        let mut table: HashMap<String, ProductionFn> = HashMap::with_capacity(count);
        for (index, production) in image.productions.iter().enumerate() {
            if !contexts.contains_key(&production.name) {
                return Err(format!(
                    "production '{}' has no context type",
                    production.name
                ));
            }
            check_rule_indices(&production.alternatives, count)
                .map_err(|e| format!("production '{}': {}", production.name, e))?;

            let call: ProductionFn = Arc::new(move |parser: &mut Parser| parser.run(index));
            table.insert(production.name.clone(), call);
        }

        Ok(ParserType {
            name: image.name,
            grammar: image.grammar,
            lexer: image.lexer,
            vocabulary: Arc::new(image.vocabulary),
            productions: image.productions,
            table,
            contexts,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grammar(&self) -> &str {
        &self.grammar
    }

    /// Module name of the lexer this parser was compiled against.
    pub fn lexer_name(&self) -> &str {
        &self.lexer
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocabulary
    }

    /// Production names in declaration order.
    pub fn production_names(&self) -> Vec<&str> {
        self.productions.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn first_production(&self) -> Option<&str> {
        self.productions.first().map(|p| p.name.as_str())
    }

    pub fn has_production(&self, name: &str) -> bool {
        self.productions.iter().any(|p| p.name == name)
    }

    /// The callable registered for `name` in the production table.
    pub fn production(&self, name: &str) -> Option<ProductionFn> {
        self.table.get(name).cloned()
    }

    pub fn context(&self, production: &str) -> Option<&Arc<ContextType>> {
        self.contexts.get(production)
    }

    /// Bind a fresh parser instance to a filled token stream.
    pub fn instantiate(self: &Arc<Self>, mut stream: TokenStream) -> Parser {
        if !stream.tokens().last().is_some_and(Token::is_eof) {
            stream = with_eof(stream);
        }
        let tokens = stream
            .tokens()
            .iter()
            .enumerate()
            .filter(|(_, t)| t.channel == DEFAULT_CHANNEL || t.is_eof())
            .map(|(position, _)| position)
            .collect();

        Parser {
            parser_type: Arc::clone(self),
            stream,
            tokens,
            pos: 0,
            children: Vec::new(),
            collector: DiagnosticCollector::new(),
            build_trees: true,
            farthest: Farthest::default(),
            probing: false,
            rule_stack: Vec::new(),
        }
    }
}

fn check_rule_indices(alternatives: &[AlternativeImage], count: usize) -> Result<(), String> {
    for alternative in alternatives {
        for element in &alternative.elements {
            match &element.matcher {
                Matcher::Rule(index) if *index >= count => {
                    return Err(format!("rule index {} out of range", index))
                }
                Matcher::Block(nested) => check_rule_indices(nested, count)?,
                _ => {}
            }
        }
    }
    Ok(())
}

fn with_eof(stream: TokenStream) -> TokenStream {
    let mut tokens: Vec<Token> = stream.tokens().to_vec();
    let (line, column, end) = tokens
        .last()
        .map(|t| (t.line, t.column + t.text.chars().count(), t.stop))
        .unwrap_or((1, 0, 0));
    tokens.push(Token {
        token_type: EOF,
        text: "<EOF>".to_string(),
        channel: DEFAULT_CHANNEL,
        line,
        column,
        start: end,
        stop: end,
        index: tokens.len(),
    });
    TokenStream::from_tokens(tokens)
}

#[derive(Debug, Clone, Default)]
struct Farthest {
    seen: bool,
    pos: usize,
    expected: BTreeSet<i32>,
}

/// Position (in default-channel tokens) where matching failed.
#[derive(Debug, Clone, Copy)]
struct Fail(usize);

/// The rest of the parse after the current element.
type Next<'k> = &'k mut dyn FnMut(&mut Parser) -> Result<(), Fail>;

/// The rest of the parse after an alternative, told which one matched.
type Chosen<'k> = &'k mut dyn FnMut(&mut Parser, usize) -> Result<(), Fail>;

pub struct Parser {
    parser_type: Arc<ParserType>,
    stream: TokenStream,
    /// Stream positions of the default-channel tokens, EOF last
    tokens: Vec<usize>,
    pos: usize,
    /// Finished subtrees of the rules still open
    children: Vec<ParseTree>,
    collector: DiagnosticCollector,
    build_trees: bool,
    farthest: Farthest,
    probing: bool,
    rule_stack: Vec<usize>,
}

impl fmt::Debug for Parser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser")
            .field("parser_type", &self.parser_type.name)
            .field("tokens", &self.tokens.len())
            .field("pos", &self.pos)
            .finish()
    }
}

impl Parser {
    pub fn parser_type(&self) -> &Arc<ParserType> {
        &self.parser_type
    }

    pub fn token_stream(&self) -> &TokenStream {
        &self.stream
    }

    /// Replace the installed diagnostic collector.
    pub fn set_collector(&mut self, collector: DiagnosticCollector) {
        self.collector = collector;
    }

    pub fn collector(&self) -> &DiagnosticCollector {
        &self.collector
    }

    pub fn take_collector(&mut self) -> DiagnosticCollector {
        std::mem::take(&mut self.collector)
    }

    pub fn set_build_parse_trees(&mut self, build: bool) {
        self.build_trees = build;
    }

    /// Run production `index` from the current position. A failure is reported to
    /// the collector and yields an empty node.
    fn run(&mut self, index: usize) -> RuleNode {
        self.farthest = Farthest::default();
        self.children.clear();
        self.rule_stack.clear();

        let matched = self.rule(index, &mut |_: &mut Parser| Ok(()));
        match (matched, self.children.pop()) {
            (Ok(()), Some(ParseTree::Rule(mut node))) => {
                if !self.build_trees {
                    node.children.clear();
                }
                node
            }
            _ => {
                self.report_farthest();
                RuleNode {
                    rule: self.parser_type.productions[index].name.clone(),
                    alternative: 0,
                    label: None,
                    children: Vec::new(),
                }
            }
        }
    }

    /// Match production `index`, then `next`. The finished node is on top of the
    /// child stack while `next` runs; if `next` fails the node is taken apart again
    /// so the alternatives inside the production can be retried.
    fn rule(&mut self, index: usize, next: Next<'_>) -> Result<(), Fail> {
        let parser_type = Arc::clone(&self.parser_type);
        let production = &parser_type.productions[index];
        let mark = self.children.len();

        self.rule_stack.push(index);
        let result = self.alternatives(
            &production.alternatives,
            &mut |p: &mut Parser, alternative: usize| {
                p.rule_stack.pop();
                let children = p.children.split_off(mark);
                p.children.push(ParseTree::Rule(RuleNode {
                    rule: production.name.clone(),
                    alternative: alternative + 1,
                    label: production.alternatives[alternative].label.clone(),
                    children,
                }));

                let result = next(p);
                if result.is_err() {
                    p.children.truncate(mark + 1);
                    if let Some(ParseTree::Rule(node)) = p.children.pop() {
                        p.children.extend(node.children);
                    }
                    p.rule_stack.push(index);
                }
                result
            },
        );
        if result.is_err() {
            self.rule_stack.pop();
        }
        result
    }

    /// Try each alternative in order, each followed by `chosen`. A later
    /// alternative is only tried once everything after the earlier one failed.
    fn alternatives(
        &mut self,
        alternatives: &[AlternativeImage],
        chosen: Chosen<'_>,
    ) -> Result<(), Fail> {
        let start = self.pos;
        let mark = self.children.len();
        let mut failed_late = false;
        let mut deepest = start;

        for (index, alternative) in alternatives.iter().enumerate() {
            self.rewind(start, mark);
            let reported = self.collector.len();
            let result = self.sequence(&alternative.elements, &mut |p: &mut Parser| {
                p.alternative_matched(alternatives, index, start, failed_late, &mut *chosen)
            });
            match result {
                Ok(()) => return Ok(()),
                Err(Fail(at)) => {
                    self.collector.truncate(reported);
                    failed_late |= at > start;
                    deepest = deepest.max(at);
                }
            }
        }

        self.rewind(start, mark);
        Err(Fail(deepest))
    }

    fn alternative_matched(
        &mut self,
        alternatives: &[AlternativeImage],
        index: usize,
        start: usize,
        failed_late: bool,
        chosen: Chosen<'_>,
    ) -> Result<(), Fail> {
        let end = self.pos;
        let reported = self.collector.len();
        if !self.probing {
            if failed_late {
                self.report_context_sensitivity(start, end);
            }
            if index + 1 < alternatives.len() && self.collector.reports(DiagnosticKind::Ambiguity)
            {
                self.check_ambiguity(alternatives, index, start, end);
            }
        }

        let result = chosen(self, index);
        if result.is_err() {
            self.collector.truncate(reported);
        }
        result
    }

    fn sequence(&mut self, elements: &[ElementImage], next: Next<'_>) -> Result<(), Fail> {
        match elements.split_first() {
            None => next(self),
            Some((element, rest)) => {
                self.element(element, &mut |p: &mut Parser| p.sequence(rest, &mut *next))
            }
        }
    }

    /// Greedy suffixes try one more match before giving up on it, non-greedy ones
    /// try `next` first.
    fn element(&mut self, element: &ElementImage, next: Next<'_>) -> Result<(), Fail> {
        let save = self.pos;
        let mark = self.children.len();

        match element.quantifier {
            Quantifier::One => self.matcher(&element.matcher, next),
            Quantifier::Optional if element.greedy => {
                match self.matcher(&element.matcher, &mut *next) {
                    Ok(()) => Ok(()),
                    Err(Fail(at)) => {
                        self.rewind(save, mark);
                        next(self).map_err(|Fail(other)| Fail(at.max(other)))
                    }
                }
            }
            Quantifier::Optional => match next(self) {
                Ok(()) => Ok(()),
                Err(Fail(at)) => {
                    self.rewind(save, mark);
                    self.matcher(&element.matcher, next)
                        .map_err(|Fail(other)| Fail(at.max(other)))
                }
            },
            Quantifier::Star => self.repeat(element, next),
            Quantifier::Plus => {
                self.matcher(&element.matcher, &mut |p: &mut Parser| {
                    p.repeat(element, &mut *next)
                })
            }
        }
    }

    /// Zero or more further matches of `element`, then `next`.
    fn repeat(&mut self, element: &ElementImage, next: Next<'_>) -> Result<(), Fail> {
        let save = self.pos;
        let mark = self.children.len();

        if element.greedy {
            match self.iterate(element, save, &mut *next) {
                Ok(()) => Ok(()),
                Err(Fail(at)) => {
                    self.rewind(save, mark);
                    next(self).map_err(|Fail(other)| Fail(at.max(other)))
                }
            }
        } else {
            match next(self) {
                Ok(()) => Ok(()),
                Err(Fail(at)) => {
                    self.rewind(save, mark);
                    self.iterate(element, save, next)
                        .map_err(|Fail(other)| Fail(at.max(other)))
                }
            }
        }
    }

    /// One more iteration. Iterations that consume nothing end the loop.
    fn iterate(&mut self, element: &ElementImage, save: usize, next: Next<'_>) -> Result<(), Fail> {
        self.matcher(&element.matcher, &mut |p: &mut Parser| {
            if p.pos > save {
                p.repeat(element, &mut *next)
            } else {
                Err(Fail(p.pos))
            }
        })
    }

    fn matcher(&mut self, matcher: &Matcher, next: Next<'_>) -> Result<(), Fail> {
        match matcher {
            Matcher::Token(token_type) => self.match_token(*token_type, next),
            Matcher::Eof => self.match_token(EOF, next),
            Matcher::Wildcard => {
                if self.current().is_eof() {
                    self.note_failure(None);
                    Err(Fail(self.pos))
                } else {
                    self.shift(next)
                }
            }
            Matcher::Rule(index) => self.rule(*index, next),
            Matcher::Block(alternatives) => {
                self.alternatives(alternatives, &mut |p: &mut Parser, _| next(p))
            }
        }
    }

    fn match_token(&mut self, token_type: i32, next: Next<'_>) -> Result<(), Fail> {
        if self.current().token_type == token_type {
            self.shift(next)
        } else {
            self.note_failure(Some(token_type));
            Err(Fail(self.pos))
        }
    }

    fn shift(&mut self, next: Next<'_>) -> Result<(), Fail> {
        let terminal = self.consume();
        self.children.push(terminal);
        next(self)
    }

    fn rewind(&mut self, pos: usize, mark: usize) {
        self.pos = pos;
        self.children.truncate(mark);
    }

    fn check_ambiguity(
        &mut self,
        alternatives: &[AlternativeImage],
        chosen: usize,
        start: usize,
        end: usize,
    ) {
        let farthest = self.farthest.clone();
        let reported = self.collector.len();
        let mark = self.children.len();
        self.probing = true;

        let mut ambiguous = vec![chosen + 1];
        for (index, alternative) in alternatives.iter().enumerate().skip(chosen + 1) {
            self.pos = start;
            let reaches_end = self
                .sequence(&alternative.elements, &mut |p: &mut Parser| {
                    if p.pos == end {
                        Ok(())
                    } else {
                        Err(Fail(p.pos))
                    }
                })
                .is_ok();
            if reaches_end {
                ambiguous.push(index + 1);
            }
            self.children.truncate(mark);
        }

        self.probing = false;
        self.collector.truncate(reported);
        self.farthest = farthest;
        self.pos = end;

        if ambiguous.len() > 1 {
            let alts: Vec<String> = ambiguous.iter().map(|a| a.to_string()).collect();
            let message = format!(
                "reportAmbiguity d={}: ambigAlts={{{}}}, input='{}'",
                self.current_rule(),
                alts.join(", "),
                self.input_text(start, end)
            );
            self.report_at(start, DiagnosticKind::Ambiguity, message);
        }
    }

    fn report_context_sensitivity(&mut self, start: usize, end: usize) {
        let message = format!(
            "reportContextSensitivity d={}, input='{}'",
            self.current_rule(),
            self.input_text(start, end)
        );
        self.report_at(start, DiagnosticKind::ContextSensitivity, message);
    }

    fn report_at(&mut self, pos: usize, kind: DiagnosticKind, message: String) {
        let token = self.token_at(pos);
        let diagnostic = Diagnostic {
            kind,
            line: token.line,
            column: token.column,
            message,
        };
        self.collector.report(diagnostic);
    }

    fn report_farthest(&mut self) {
        let token = self.token_at(self.farthest.pos).clone();
        let found = if token.is_eof() {
            "<EOF>".to_string()
        } else {
            escape_whitespace(&token.text)
        };

        let vocabulary = &self.parser_type.vocabulary;
        let expected: Vec<String> = self
            .farthest
            .expected
            .iter()
            .map(|t| vocabulary.display_name(*t))
            .collect();

        let message = match expected.as_slice() {
            [] => format!("no viable alternative at input '{}'", found),
            [single] => format!("mismatched input '{}' expecting {}", found, single),
            many => format!(
                "mismatched input '{}' expecting {{{}}}",
                found,
                many.join(", ")
            ),
        };
        self.collector
            .report(Diagnostic::syntax(token.line, token.column, message));
    }

    fn note_failure(&mut self, expected: Option<i32>) {
        if !self.farthest.seen || self.pos > self.farthest.pos {
            self.farthest = Farthest {
                seen: true,
                pos: self.pos,
                expected: BTreeSet::new(),
            };
        }
        if self.pos == self.farthest.pos {
            if let Some(token_type) = expected {
                self.farthest.expected.insert(token_type);
            }
        }
    }

    fn current_rule(&self) -> String {
        self.rule_stack
            .last()
            .map(|i| self.parser_type.productions[*i].name.clone())
            .unwrap_or_default()
    }

    fn stream_position(&self, pos: usize) -> usize {
        let last = self.tokens.len() - 1;
        self.tokens[pos.min(last)]
    }

    fn token_at(&self, pos: usize) -> &Token {
        &self.stream.tokens()[self.stream_position(pos)]
    }

    fn current(&self) -> &Token {
        self.token_at(self.pos)
    }

    /// Terminal for the current token. EOF is matched but never consumed.
    fn consume(&mut self) -> ParseTree {
        let token = self.current().clone();
        if !token.is_eof() {
            self.pos += 1;
        }
        ParseTree::Terminal(TerminalNode {
            symbol: self.parser_type.vocabulary.symbolic_name(token.token_type),
            token,
        })
    }

    fn input_text(&self, start: usize, end: usize) -> String {
        if end <= start {
            return String::new();
        }
        let first = self.stream_position(start);
        let last = self.stream_position(end - 1);
        escape_whitespace(&self.stream.text(first, last))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kiln::runtime::image::TokenDef;
    use crate::kiln::runtime::stream::HIDDEN_CHANNEL;

    const NUM: i32 = 1;
    const PLUS: i32 = 2;
    const MINUS: i32 = 3;
    const ID: i32 = 4;

    fn vocabulary() -> Vocabulary {
        let def = |token_type, symbolic: &str, literal: Option<&str>| TokenDef {
            token_type,
            symbolic: symbolic.into(),
            literal: literal.map(String::from),
        };
        Vocabulary::new(vec![
            def(NUM, "NUM", None),
            def(PLUS, "PLUS", Some("+")),
            def(MINUS, "MINUS", Some("-")),
            def(ID, "ID", None),
        ])
    }

    fn one(matcher: Matcher) -> ElementImage {
        ElementImage {
            matcher,
            quantifier: Quantifier::One,
            greedy: true,
            label: None,
        }
    }

    fn alt(elements: Vec<ElementImage>) -> AlternativeImage {
        AlternativeImage {
            label: None,
            elements,
        }
    }

    fn production(name: &str, alternatives: Vec<AlternativeImage>) -> ProductionImage {
        ProductionImage {
            name: name.into(),
            context: format!("TestParser${}Context", name),
            alternatives,
        }
    }

    fn parser_type(productions: Vec<ProductionImage>) -> Arc<ParserType> {
        let contexts = productions
            .iter()
            .enumerate()
            .map(|(rule_index, p)| {
                Arc::new(ContextType {
                    name: p.context.clone(),
                    parser: "TestParser".into(),
                    production: p.name.clone(),
                    rule_index,
                    alternative_labels: vec![],
                    element_labels: BTreeMap::new(),
                })
            })
            .collect();
        let image = ParserImage {
            grammar: "Test".into(),
            name: "TestParser".into(),
            lexer: "TestLexer".into(),
            vocabulary: vocabulary(),
            productions,
        };
        Arc::new(ParserType::new(image, contexts).expect("valid image"))
    }

    fn expr_type() -> Arc<ParserType> {
        parser_type(vec![production(
            "expr",
            vec![alt(vec![
                one(Matcher::Token(NUM)),
                one(Matcher::Block(vec![
                    alt(vec![one(Matcher::Token(PLUS))]),
                    alt(vec![one(Matcher::Token(MINUS))]),
                ])),
                one(Matcher::Token(NUM)),
            ])],
        )])
    }

    fn stream(tokens: &[(i32, &str)]) -> TokenStream {
        let mut column = 0;
        let tokens = tokens
            .iter()
            .enumerate()
            .map(|(index, (token_type, text))| {
                let token = Token {
                    token_type: *token_type,
                    text: text.to_string(),
                    channel: DEFAULT_CHANNEL,
                    line: 1,
                    column,
                    start: column,
                    stop: column + text.len(),
                    index,
                };
                column += text.len();
                token
            })
            .collect();
        TokenStream::from_tokens(tokens)
    }

    fn invoke(parser: &mut Parser, name: &str) -> RuleNode {
        let call = parser
            .parser_type()
            .production(name)
            .expect("production exists");
        call(parser)
    }

    #[test]
    fn test_block_children_are_flattened() {
        let ty = expr_type();
        let mut parser = ty.instantiate(stream(&[(NUM, "3"), (PLUS, "+"), (NUM, "100")]));
        let node = invoke(&mut parser, "expr");

        assert_eq!(node.child_count(), 3);
        assert_eq!(ParseTree::Rule(node).to_string_tree(), "(expr 3 + 100)");
        assert!(!parser.collector().has_syntax_errors());
    }

    #[test]
    fn test_missing_token_reports_farthest_failure() {
        let ty = expr_type();
        let mut parser = ty.instantiate(stream(&[(NUM, "3"), (PLUS, "+")]));
        invoke(&mut parser, "expr");

        assert_eq!(
            parser.collector().syntax_messages(),
            vec!["line 1:2 mismatched input '<EOF>' expecting NUM"]
        );
    }

    #[test]
    fn test_expected_set_lists_alternatives() {
        let ty = expr_type();
        let mut parser = ty.instantiate(stream(&[(NUM, "3"), (NUM, "4")]));
        invoke(&mut parser, "expr");

        assert_eq!(
            parser.collector().syntax_messages(),
            vec!["line 1:1 mismatched input '4' expecting {'+', '-'}"]
        );
    }

    #[test]
    fn test_hidden_tokens_are_not_parsed() {
        let ty = expr_type();
        let mut tokens = stream(&[(NUM, "3"), (ID, "#c"), (PLUS, "+"), (NUM, "1")])
            .tokens()
            .to_vec();
        tokens[1].channel = HIDDEN_CHANNEL;
        let mut parser = ty.instantiate(TokenStream::from_tokens(tokens));
        let node = invoke(&mut parser, "expr");

        assert_eq!(node.child_count(), 3);
        assert!(!parser.collector().has_syntax_errors());
    }

    #[test]
    fn test_loops_and_rule_references() {
        // list : item (PLUS item)* ; item : NUM | ID ;
        let ty = parser_type(vec![
            production(
                "list",
                vec![alt(vec![
                    one(Matcher::Rule(1)),
                    ElementImage {
                        quantifier: Quantifier::Star,
                        ..one(Matcher::Block(vec![alt(vec![
                            one(Matcher::Token(PLUS)),
                            one(Matcher::Rule(1)),
                        ])]))
                    },
                ])],
            ),
            production(
                "item",
                vec![
                    alt(vec![one(Matcher::Token(NUM))]),
                    alt(vec![one(Matcher::Token(ID))]),
                ],
            ),
        ]);
        let mut parser = ty.instantiate(stream(&[
            (NUM, "1"),
            (PLUS, "+"),
            (ID, "x"),
            (PLUS, "+"),
            (NUM, "2"),
        ]));
        let tree = ParseTree::Rule(invoke(&mut parser, "list"));

        assert_eq!(tree.to_string_tree(), "(list (item 1) + (item x) + (item 2))");
        assert_eq!(tree.find_all("item")[1].alternative, 2);
    }

    #[test]
    fn test_ambiguity_and_context_sensitivity_reports() {
        // start : a | b ; a : ID ; b : ID ;  /  pick : ID NUM | ID ;
        let ty = parser_type(vec![
            production(
                "start",
                vec![
                    alt(vec![one(Matcher::Rule(1))]),
                    alt(vec![one(Matcher::Rule(2))]),
                ],
            ),
            production("a", vec![alt(vec![one(Matcher::Token(ID))])]),
            production("b", vec![alt(vec![one(Matcher::Token(ID))])]),
            production(
                "pick",
                vec![
                    alt(vec![one(Matcher::Token(ID)), one(Matcher::Token(NUM))]),
                    alt(vec![one(Matcher::Token(ID))]),
                ],
            ),
        ]);

        let mut parser = ty.instantiate(stream(&[(ID, "x")]));
        parser.set_collector(DiagnosticCollector::with_reporting(true, true));
        invoke(&mut parser, "start");
        let messages: Vec<_> = parser
            .collector()
            .diagnostics()
            .iter()
            .map(|d| d.message.clone())
            .collect();
        assert_eq!(messages, vec!["reportAmbiguity d=start: ambigAlts={1, 2}, input='x'"]);

        let mut parser = ty.instantiate(stream(&[(ID, "x")]));
        parser.set_collector(DiagnosticCollector::with_reporting(true, true));
        invoke(&mut parser, "pick");
        let diagnostics = parser.collector().diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::ContextSensitivity);
        assert!(!parser.collector().has_syntax_errors());
    }

    #[test]
    fn test_block_alternative_is_retried_when_the_rest_fails() {
        // s : (ID | ID NUM) EOF ;
        let ty = parser_type(vec![production(
            "s",
            vec![alt(vec![
                one(Matcher::Block(vec![
                    alt(vec![one(Matcher::Token(ID))]),
                    alt(vec![one(Matcher::Token(ID)), one(Matcher::Token(NUM))]),
                ])),
                one(Matcher::Eof),
            ])],
        )]);
        let mut parser = ty.instantiate(stream(&[(ID, "a"), (NUM, "1")]));
        let tree = ParseTree::Rule(invoke(&mut parser, "s"));

        assert_eq!(tree.to_string_tree(), "(s a 1 <EOF>)");
        assert!(!parser.collector().has_syntax_errors());
    }

    #[test]
    fn test_rule_alternative_is_retried_inside_a_loop() {
        // prog : stat+ EOF ; stat : ID | ID PLUS ID ;
        let ty = parser_type(vec![
            production(
                "prog",
                vec![alt(vec![
                    ElementImage {
                        quantifier: Quantifier::Plus,
                        ..one(Matcher::Rule(1))
                    },
                    one(Matcher::Eof),
                ])],
            ),
            production(
                "stat",
                vec![
                    alt(vec![one(Matcher::Token(ID))]),
                    alt(vec![
                        one(Matcher::Token(ID)),
                        one(Matcher::Token(PLUS)),
                        one(Matcher::Token(ID)),
                    ]),
                ],
            ),
        ]);

        let mut parser = ty.instantiate(stream(&[(ID, "a"), (PLUS, "+"), (ID, "b"), (ID, "c")]));
        let tree = ParseTree::Rule(invoke(&mut parser, "prog"));
        assert_eq!(tree.to_string_tree(), "(prog (stat a + b) (stat c) <EOF>)");
        let alternatives: Vec<_> = tree.find_all("stat").iter().map(|s| s.alternative).collect();
        assert_eq!(alternatives, vec![2, 1]);

        // Diagnostics from abandoned attempts are dropped
        assert!(!parser.collector().has_syntax_errors());
    }

    #[test]
    fn test_failure_after_backtracking_reports_farthest_position() {
        // s : (ID | ID NUM) EOF ;  with a trailing token nothing accepts
        let ty = parser_type(vec![production(
            "s",
            vec![alt(vec![
                one(Matcher::Block(vec![
                    alt(vec![one(Matcher::Token(ID))]),
                    alt(vec![one(Matcher::Token(ID)), one(Matcher::Token(NUM))]),
                ])),
                one(Matcher::Eof),
            ])],
        )]);
        let mut parser = ty.instantiate(stream(&[(ID, "a"), (NUM, "1"), (PLUS, "+")]));
        let node = invoke(&mut parser, "s");

        assert_eq!(node.alternative, 0);
        assert_eq!(
            parser.collector().syntax_messages(),
            vec!["line 1:2 mismatched input '+' expecting <EOF>"]
        );
    }

    #[test]
    fn test_non_greedy_loop_stops_at_follow() {
        // body : .*? NUM ;
        let ty = parser_type(vec![production(
            "body",
            vec![alt(vec![
                ElementImage {
                    quantifier: Quantifier::Star,
                    greedy: false,
                    ..one(Matcher::Wildcard)
                },
                one(Matcher::Token(NUM)),
            ])],
        )]);
        let mut parser = ty.instantiate(stream(&[(ID, "a"), (PLUS, "+"), (NUM, "1"), (NUM, "2")]));
        let tree = ParseTree::Rule(invoke(&mut parser, "body"));
        assert_eq!(tree.to_string_tree(), "(body a + 1)");
    }

    #[test]
    fn test_trees_can_be_disabled() {
        let ty = expr_type();
        let mut parser = ty.instantiate(stream(&[(NUM, "3"), (MINUS, "-"), (NUM, "1")]));
        parser.set_build_parse_trees(false);
        let node = invoke(&mut parser, "expr");
        assert_eq!(node.child_count(), 0);
        assert_eq!(node.alternative, 1);
    }

    #[test]
    fn test_out_of_range_rule_index_is_rejected() {
        let image = ParserImage {
            grammar: "Bad".into(),
            name: "BadParser".into(),
            lexer: "BadLexer".into(),
            vocabulary: vocabulary(),
            productions: vec![production("p", vec![alt(vec![one(Matcher::Rule(7))])])],
        };
        let context = Arc::new(ContextType {
            name: "BadParser$PContext".into(),
            parser: "BadParser".into(),
            production: "p".into(),
            rule_index: 0,
            alternative_labels: vec![],
            element_labels: BTreeMap::new(),
        });
        assert!(ParserType::new(image, vec![context]).is_err());
    }
}
