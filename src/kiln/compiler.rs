//! Batch compilation of source modules into binary units
//!
//! The [`UnitCompiler`] trait takes every pending module of a pipeline run in one
//! call, so parser modules can resolve their token references against the lexer
//! modules of the same batch. [`ModuleCompiler`] is the built-in implementation:
//!
//! - lexer modules get token types from 1 in rule order and their patterns are
//!   checked to compile
//! - parser modules have token names, literals and rule references resolved, and
//!   left-recursive productions are rejected
//! - each parser module yields its main unit plus one context unit per production,
//!   named `Parser$RuleContext`

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use regex::Regex;

use crate::kiln::artifact::{BinaryUnit, SourceModule};
use crate::kiln::codegen::{LexerModuleSource, ModuleSource, ParserModuleSource};
use crate::kiln::grammar::ast::{Alternative, Atom, Quantifier};
use crate::kiln::runtime::image::{
    AlternativeImage, ContextImage, ElementImage, LexerImage, LexerRuleImage, Matcher,
    ParserImage, ProductionImage, TokenDef, UnitImage, Vocabulary,
};
use crate::kiln::runtime::stream::{DEFAULT_CHANNEL, HIDDEN_CHANNEL};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationDiagnostic {
    pub module: String,
    pub message: String,
}

/// Every problem reported by a generator or compiler run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilationDiagnostics {
    entries: Vec<CompilationDiagnostic>,
}

impl CompilationDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(module: &str, message: impl Into<String>) -> Self {
        let mut diagnostics = Self::new();
        diagnostics.push(module, message);
        diagnostics
    }

    pub fn push(&mut self, module: &str, message: impl Into<String>) {
        self.entries.push(CompilationDiagnostic {
            module: module.to_string(),
            message: message.into(),
        });
    }

    pub fn extend(&mut self, other: CompilationDiagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[CompilationDiagnostic] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for CompilationDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}: {}", entry.module, entry.message)?;
        }
        Ok(())
    }
}

/// Units produced for one source module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledModule {
    pub module: String,
    pub units: Vec<BinaryUnit>,
}

pub trait UnitCompiler: Send {
    /// Compile all modules in one pass. A module may produce several units.
    fn compile_batch(
        &self,
        modules: &[SourceModule],
    ) -> Result<Vec<CompiledModule>, CompilationDiagnostics>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleCompiler;

impl ModuleCompiler {
    pub fn new() -> Self {
        ModuleCompiler
    }
}

impl UnitCompiler for ModuleCompiler {
    fn compile_batch(
        &self,
        modules: &[SourceModule],
    ) -> Result<Vec<CompiledModule>, CompilationDiagnostics> {
        let mut diagnostics = CompilationDiagnostics::new();
        let mut names = HashSet::new();
        let mut decoded = Vec::with_capacity(modules.len());

        for module in modules {
            if !names.insert(module.name.as_str()) {
                diagnostics.push(&module.name, "module is submitted more than once");
                continue;
            }
            match ModuleSource::from_text(&module.text) {
                Ok(source) => decoded.push((module, source)),
                Err(e) => diagnostics.push(&module.name, format!("malformed module text: {}", e)),
            }
        }

        let mut lexers: HashMap<String, LexerImage> = HashMap::new();
        for (module, source) in &decoded {
            if let ModuleSource::Lexer(lexer) = source {
                if let Some(image) = compile_lexer(lexer, &mut diagnostics) {
                    lexers.insert(module.name.clone(), image);
                }
            }
        }

        let mut compiled = Vec::with_capacity(decoded.len());
        for (module, source) in &decoded {
            let units = match source {
                ModuleSource::Lexer(_) => match lexers.get(&module.name) {
                    Some(image) => encode_units(
                        &module.name,
                        vec![(module.name.clone(), UnitImage::Lexer(image.clone()))],
                        &mut diagnostics,
                    ),
                    None => continue,
                },
                ModuleSource::Parser(parser) => {
                    let Some(lexer) = lexers.get(&parser.vocabulary) else {
                        diagnostics.push(
                            &module.name,
                            format!(
                                "vocabulary module {} is not part of the batch",
                                parser.vocabulary
                            ),
                        );
                        continue;
                    };
                    match compile_parser(parser, &lexer.vocabulary, &mut diagnostics) {
                        Some(images) => encode_units(&module.name, images, &mut diagnostics),
                        None => continue,
                    }
                }
            };
            compiled.push(CompiledModule {
                module: module.name.clone(),
                units,
            });
        }

        if diagnostics.is_empty() {
            Ok(compiled)
        } else {
            Err(diagnostics)
        }
    }
}

fn encode_units(
    module: &str,
    images: Vec<(String, UnitImage)>,
    diagnostics: &mut CompilationDiagnostics,
) -> Vec<BinaryUnit> {
    let mut units = Vec::with_capacity(images.len());
    for (name, image) in images {
        match image.encode() {
            Ok(bytes) => units.push(BinaryUnit::new(name, bytes)),
            Err(e) => diagnostics.push(module, format!("cannot encode unit {}: {}", name, e)),
        }
    }
    units
}

fn compile_lexer(
    source: &LexerModuleSource,
    diagnostics: &mut CompilationDiagnostics,
) -> Option<LexerImage> {
    let before = diagnostics.len();
    let mut tokens = Vec::with_capacity(source.rules.len());
    let mut rules = Vec::with_capacity(source.rules.len());

    for (i, rule) in source.rules.iter().enumerate() {
        let token_type = i as i32 + 1;

        match Regex::new(&format!(r"\A(?:{})", rule.pattern)) {
            Ok(regex) if regex.is_match("") => diagnostics.push(
                &source.name,
                format!("non-fragment lexer rule {} can match the empty string", rule.name),
            ),
            Ok(_) => {
                if let Some(e) = rule
                    .branches
                    .iter()
                    .find_map(|branch| Regex::new(&format!(r"\A(?:{})", branch)).err())
                {
                    diagnostics.push(
                        &source.name,
                        format!("rule {} has an invalid pattern: {}", rule.name, e),
                    );
                }
            }
            Err(e) => diagnostics.push(
                &source.name,
                format!("rule {} has an invalid pattern: {}", rule.name, e),
            ),
        }

        let channel = match rule.channel.as_deref() {
            None | Some("DEFAULT_TOKEN_CHANNEL") => DEFAULT_CHANNEL,
            Some("HIDDEN") => HIDDEN_CHANNEL,
            Some(other) => {
                diagnostics.push(
                    &source.name,
                    format!("rule {} uses undefined channel {}", rule.name, other),
                );
                DEFAULT_CHANNEL
            }
        };

        tokens.push(TokenDef {
            token_type,
            symbolic: rule.name.clone(),
            literal: rule.literal.clone(),
        });
        rules.push(LexerRuleImage {
            name: rule.name.clone(),
            token_type,
            pattern: rule.pattern.clone(),
            branches: rule.branches.clone(),
            skip: rule.skip,
            channel,
        });
    }

    if diagnostics.len() > before {
        return None;
    }

    Some(LexerImage {
        grammar: source.grammar.clone(),
        name: source.name.clone(),
        vocabulary: Vocabulary::new(tokens),
        channels: vec!["DEFAULT_TOKEN_CHANNEL".to_string(), "HIDDEN".to_string()],
        rules,
    })
}

struct Resolver<'a> {
    module: &'a str,
    vocabulary: &'a Vocabulary,
    rules: HashMap<&'a str, usize>,
    diagnostics: &'a mut CompilationDiagnostics,
}

impl Resolver<'_> {
    fn alternatives(&mut self, rule: &str, alternatives: &[Alternative]) -> Vec<AlternativeImage> {
        alternatives
            .iter()
            .map(|alternative| AlternativeImage {
                label: alternative.label.clone(),
                elements: alternative
                    .elements
                    .iter()
                    .map(|element| ElementImage {
                        matcher: self.atom(rule, &element.atom),
                        quantifier: element.quantifier,
                        greedy: element.greedy,
                        label: element.label.clone(),
                    })
                    .collect(),
            })
            .collect()
    }

    fn atom(&mut self, rule: &str, atom: &Atom) -> Matcher {
        match atom {
            Atom::TokenRef(name) => match self.vocabulary.token_type(name) {
                Some(token_type) => Matcher::Token(token_type),
                None => {
                    self.error(format!("rule {}: undefined token {}", rule, name));
                    Matcher::Wildcard
                }
            },
            Atom::Literal(text) => match self.vocabulary.literal_type(text) {
                Some(token_type) => Matcher::Token(token_type),
                None => {
                    self.error(format!(
                        "rule {}: no token is defined for literal '{}'",
                        rule, text
                    ));
                    Matcher::Wildcard
                }
            },
            Atom::RuleRef(name) => match self.rules.get(name.as_str()) {
                Some(index) => Matcher::Rule(*index),
                None => {
                    self.error(format!("rule {}: reference to undefined rule {}", rule, name));
                    Matcher::Wildcard
                }
            },
            Atom::Wildcard => Matcher::Wildcard,
            Atom::Eof => Matcher::Eof,
            Atom::Block(alternatives) => Matcher::Block(self.alternatives(rule, alternatives)),
        }
    }

    fn error(&mut self, message: String) {
        self.diagnostics.push(self.module, message);
    }
}

fn compile_parser(
    source: &ParserModuleSource,
    vocabulary: &Vocabulary,
    diagnostics: &mut CompilationDiagnostics,
) -> Option<Vec<(String, UnitImage)>> {
    let before = diagnostics.len();

    if source.rules.is_empty() {
        diagnostics.push(&source.name, "parser declares no productions");
        return None;
    }

    let mut resolver = Resolver {
        module: &source.name,
        vocabulary,
        rules: source
            .rules
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.as_str(), i))
            .collect(),
        diagnostics,
    };

    let productions: Vec<ProductionImage> = source
        .rules
        .iter()
        .map(|rule| ProductionImage {
            name: rule.name.clone(),
            context: context_name(&source.name, &rule.name, &source.context_suffix),
            alternatives: resolver.alternatives(&rule.name, &rule.alternatives),
        })
        .collect();

    for index in left_recursive(&productions) {
        diagnostics.push(
            &source.name,
            format!(
                "rule {} is left recursive, which is not supported",
                productions[index].name
            ),
        );
    }

    if diagnostics.len() > before {
        return None;
    }

    let mut images = Vec::with_capacity(productions.len() + 1);
    for (rule_index, (rule, production)) in source.rules.iter().zip(&productions).enumerate() {
        let mut element_labels = BTreeMap::new();
        collect_labels(&rule.alternatives, &mut element_labels);
        images.push((
            production.context.clone(),
            UnitImage::Context(ContextImage {
                name: production.context.clone(),
                parser: source.name.clone(),
                production: rule.name.clone(),
                rule_index,
                alternative_labels: rule
                    .alternatives
                    .iter()
                    .filter_map(|a| a.label.clone())
                    .collect(),
                element_labels,
            }),
        ));
    }

    images.insert(
        0,
        (
            source.name.clone(),
            UnitImage::Parser(ParserImage {
                grammar: source.grammar.clone(),
                name: source.name.clone(),
                lexer: source.vocabulary.clone(),
                vocabulary: vocabulary.clone(),
                productions,
            }),
        ),
    );
    Some(images)
}

/// `ExprParser` + `expr` -> `ExprParser$ExprContext`
pub fn context_name(parser: &str, rule: &str, suffix: &str) -> String {
    let mut chars = rule.chars();
    let capitalized: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    format!("{}${}{}", parser, capitalized, suffix)
}

fn collect_labels(alternatives: &[Alternative], labels: &mut BTreeMap<String, bool>) {
    for alternative in alternatives {
        for element in &alternative.elements {
            if let Some(label) = &element.label {
                let list = labels.get(label).copied().unwrap_or(false);
                labels.insert(label.clone(), list || element.quantifier != Quantifier::One);
            }
            if let Atom::Block(nested) = &element.atom {
                collect_labels(nested, labels);
            }
        }
    }
}

/// Indices of productions that can reach themselves without consuming a token.
fn left_recursive(productions: &[ProductionImage]) -> Vec<usize> {
    let count = productions.len();

    let mut nullable = vec![false; count];
    loop {
        let mut changed = false;
        for (i, production) in productions.iter().enumerate() {
            if !nullable[i] && alternatives_nullable(&production.alternatives, &nullable) {
                nullable[i] = true;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let left_calls: Vec<BTreeSet<usize>> = productions
        .iter()
        .map(|p| {
            let mut calls = BTreeSet::new();
            collect_left_calls(&p.alternatives, &nullable, &mut calls);
            calls
        })
        .collect();

    (0..count)
        .filter(|&start| {
            let mut seen = BTreeSet::new();
            let mut pending: Vec<usize> = left_calls[start].iter().copied().collect();
            while let Some(next) = pending.pop() {
                if next == start {
                    return true;
                }
                if seen.insert(next) {
                    pending.extend(left_calls[next].iter().copied());
                }
            }
            false
        })
        .collect()
}

fn alternatives_nullable(alternatives: &[AlternativeImage], nullable: &[bool]) -> bool {
    alternatives
        .iter()
        .any(|a| a.elements.iter().all(|e| element_nullable(e, nullable)))
}

fn element_nullable(element: &ElementImage, nullable: &[bool]) -> bool {
    match element.quantifier {
        Quantifier::Optional | Quantifier::Star => true,
        Quantifier::One | Quantifier::Plus => match &element.matcher {
            Matcher::Token(_) | Matcher::Wildcard => false,
            Matcher::Eof => true,
            Matcher::Rule(index) => nullable[*index],
            Matcher::Block(alternatives) => alternatives_nullable(alternatives, nullable),
        },
    }
}

fn collect_left_calls(
    alternatives: &[AlternativeImage],
    nullable: &[bool],
    calls: &mut BTreeSet<usize>,
) {
    for alternative in alternatives {
        for element in &alternative.elements {
            match &element.matcher {
                Matcher::Rule(index) => {
                    calls.insert(*index);
                }
                Matcher::Block(nested) => collect_left_calls(nested, nullable, calls),
                _ => {}
            }
            if !element_nullable(element, nullable) {
                break;
            }
        }
    }
}
