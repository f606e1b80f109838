//! Source module generation
//!
//! The [`SourceGenerator`] trait turns one parsed grammar (plus the grammars whose
//! vocabulary it imports) into source modules. [`ModuleGenerator`] is the built-in
//! implementation. Its module text is a JSON document ([`ModuleSource`]):
//!
//! - lexer modules list every token rule in type order, with its pattern already
//!   translated to `regex` syntax and fragments inlined
//! - parser modules carry the productions as written, with references still
//!   symbolic; the compiler resolves them against the batch
//!
//! Module naming follows the grammar kind:
//!
//! | grammar                | modules                                   |
//! |------------------------|-------------------------------------------|
//! | `grammar G;`           | `G` + lexer suffix, `G` + parser suffix   |
//! | `lexer grammar G;`     | `G`                                       |
//! | `parser grammar G;`    | `G`, plus the lexer module of its vocabulary |

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::kiln::artifact::{ModuleKind, SourceModule};
use crate::kiln::compiler::CompilationDiagnostics;
use crate::kiln::grammar::ast::{
    Alternative, Atom, Element, GrammarKind, LexerAlt, LexerAtom, LexerElement, LexerRule,
    ParserRule, Quantifier,
};
use crate::kiln::grammar::ParsedGrammar;

/// Knobs of the built-in generator. A tool customizer may adjust them before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorSettings {
    /// Namespace prefix for module names (`pkg.ExprParser`)
    pub package: Option<String>,
    pub lexer_suffix: String,
    pub parser_suffix: String,
    pub context_suffix: String,
    /// Let literals in the parser rules of combined grammars define tokens
    pub implicit_literal_tokens: bool,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        GeneratorSettings {
            package: None,
            lexer_suffix: "Lexer".to_string(),
            parser_suffix: "Parser".to_string(),
            context_suffix: "Context".to_string(),
            implicit_literal_tokens: true,
        }
    }
}

impl GeneratorSettings {
    fn qualify(&self, name: &str) -> String {
        match self.package.as_deref() {
            Some(package) if !package.is_empty() => format!("{}.{}", package, name),
            _ => name.to_string(),
        }
    }

    /// Name of the lexer module generated for `grammar`.
    pub fn lexer_module_name(&self, grammar: &ParsedGrammar) -> String {
        match grammar.kind() {
            GrammarKind::Combined => {
                self.qualify(&format!("{}{}", grammar.name(), self.lexer_suffix))
            }
            _ => self.qualify(grammar.name()),
        }
    }

    /// Name of the parser module generated for `grammar`.
    pub fn parser_module_name(&self, grammar: &ParsedGrammar) -> String {
        match grammar.kind() {
            GrammarKind::Combined => {
                self.qualify(&format!("{}{}", grammar.name(), self.parser_suffix))
            }
            _ => self.qualify(grammar.name()),
        }
    }
}

/// Produces source modules for one grammar.
pub trait SourceGenerator: Send {
    /// `vocabulary` is the import chain of `grammar`, nearest first.
    fn generate(
        &self,
        grammar: &ParsedGrammar,
        vocabulary: &[&ParsedGrammar],
    ) -> Result<Vec<SourceModule>, CompilationDiagnostics>;

    /// Settings exposed to a tool customizer, if the generator has any.
    fn settings_mut(&mut self) -> Option<&mut GeneratorSettings> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexerRuleSource {
    pub name: String,
    pub pattern: String,
    /// The top-level branches of `pattern`, matched separately so that the longest
    /// one wins. Empty when the rule has a single branch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,
    pub literal: Option<String>,
    pub skip: bool,
    pub channel: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexerModuleSource {
    pub grammar: String,
    pub name: String,
    pub rules: Vec<LexerRuleSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserModuleSource {
    pub grammar: String,
    pub name: String,
    /// Name of the lexer module supplying the tokens
    pub vocabulary: String,
    pub context_suffix: String,
    pub rules: Vec<ParserRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ModuleSource {
    Lexer(LexerModuleSource),
    Parser(ParserModuleSource),
}

impl ModuleSource {
    pub fn to_text(&self) -> String {
        // Serializing plain data with string keys cannot fail
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn from_text(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModuleGenerator {
    settings: GeneratorSettings,
}

impl ModuleGenerator {
    pub fn new(settings: GeneratorSettings) -> Self {
        ModuleGenerator { settings }
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    fn lexer_module(
        &self,
        owner: &ParsedGrammar,
        chain: &[&ParsedGrammar],
        implicit_from: Option<&ParsedGrammar>,
        diagnostics: &mut CompilationDiagnostics,
    ) -> Option<SourceModule> {
        let name = self.settings.lexer_module_name(owner);

        // Farthest vocabulary first, then the owner's own rules
        let mut rules: Vec<&LexerRule> = Vec::new();
        let mut seen = HashSet::new();
        for grammar in chain.iter().rev().chain(std::iter::once(&owner)) {
            for rule in &grammar.ast.lexer_rules {
                if !seen.insert(rule.name.as_str()) {
                    diagnostics.push(
                        &name,
                        format!(
                            "token name {} is already defined (redefined in {})",
                            rule.name,
                            grammar.name()
                        ),
                    );
                    continue;
                }
                rules.push(rule);
            }
        }

        let by_name: BTreeMap<&str, &LexerRule> =
            rules.iter().map(|r| (r.name.as_str(), *r)).collect();

        let mut sources = Vec::new();

        if let Some(grammar) = implicit_from {
            let defined: HashSet<&str> = rules.iter().filter_map(|r| r.literal_text()).collect();
            let mut implicit: Vec<String> = Vec::new();
            for rule in &grammar.ast.parser_rules {
                collect_literals(&rule.alternatives, &mut implicit);
            }
            let mut seen_literals = HashSet::new();
            let mut next = 0;
            for literal in implicit {
                if defined.contains(literal.as_str()) || !seen_literals.insert(literal.clone()) {
                    continue;
                }
                sources.push(LexerRuleSource {
                    name: format!("T__{}", next),
                    pattern: regex::escape(&literal),
                    branches: Vec::new(),
                    literal: Some(literal),
                    skip: false,
                    channel: None,
                });
                next += 1;
            }
        }

        for rule in rules.iter().filter(|r| !r.fragment) {
            let mut stack = vec![rule.name.clone()];
            let translated = translate_alternatives(&rule.alternatives, &by_name, &mut stack)
                .and_then(|pattern| {
                    let branches = translate_branches(&rule.alternatives, &by_name, &mut stack)?;
                    Ok((pattern, branches))
                });
            match translated {
                Ok((pattern, branches)) => sources.push(LexerRuleSource {
                    name: rule.name.clone(),
                    pattern,
                    branches: if branches.len() > 1 { branches } else { Vec::new() },
                    literal: rule.literal_text().map(String::from),
                    skip: rule.is_skipped(),
                    channel: rule.channel().map(String::from),
                }),
                Err(message) => diagnostics.push(&name, format!("rule {}: {}", rule.name, message)),
            }
        }

        if sources.is_empty() {
            diagnostics.push(&name, "lexer defines no tokens");
            return None;
        }

        debug!(module = %name, rules = sources.len(), "generated lexer module");
        let source = ModuleSource::Lexer(LexerModuleSource {
            grammar: owner.name().to_string(),
            name: name.clone(),
            rules: sources,
        });
        Some(SourceModule {
            name,
            kind: ModuleKind::Lexer,
            grammar: owner.name().to_string(),
            text: source.to_text(),
        })
    }

    fn parser_module(&self, grammar: &ParsedGrammar, vocabulary: String) -> SourceModule {
        let name = self.settings.parser_module_name(grammar);
        debug!(
            module = %name,
            productions = grammar.ast.parser_rules.len(),
            "generated parser module"
        );
        let source = ModuleSource::Parser(ParserModuleSource {
            grammar: grammar.name().to_string(),
            name: name.clone(),
            vocabulary,
            context_suffix: self.settings.context_suffix.clone(),
            rules: grammar.ast.parser_rules.clone(),
        });
        SourceModule {
            name,
            kind: ModuleKind::Parser,
            grammar: grammar.name().to_string(),
            text: source.to_text(),
        }
    }
}

impl SourceGenerator for ModuleGenerator {
    fn generate(
        &self,
        grammar: &ParsedGrammar,
        vocabulary: &[&ParsedGrammar],
    ) -> Result<Vec<SourceModule>, CompilationDiagnostics> {
        let mut diagnostics = CompilationDiagnostics::new();
        let mut modules = Vec::new();

        match grammar.kind() {
            GrammarKind::Combined => {
                let implicit = self
                    .settings
                    .implicit_literal_tokens
                    .then_some(grammar);
                if let Some(lexer) =
                    self.lexer_module(grammar, vocabulary, implicit, &mut diagnostics)
                {
                    let lexer_name = lexer.name.clone();
                    modules.push(lexer);
                    if !grammar.ast.parser_rules.is_empty() {
                        modules.push(self.parser_module(grammar, lexer_name));
                    }
                }
            }
            GrammarKind::Lexer => {
                if let Some(lexer) =
                    self.lexer_module(grammar, vocabulary, None, &mut diagnostics)
                {
                    modules.push(lexer);
                }
            }
            GrammarKind::Parser => match vocabulary.split_first() {
                None => diagnostics.push(
                    &self.settings.parser_module_name(grammar),
                    match grammar.vocabulary() {
                        Some(v) => format!("cannot find tokens for vocabulary {}", v),
                        None => "parser grammar has no tokenVocab option".to_string(),
                    },
                ),
                Some((nearest, _)) if nearest.kind() == GrammarKind::Parser => diagnostics.push(
                    &self.settings.parser_module_name(grammar),
                    format!("vocabulary {} is a parser grammar", nearest.name()),
                ),
                Some((nearest, rest)) => {
                    if let Some(lexer) =
                        self.lexer_module(nearest, rest, None, &mut diagnostics)
                    {
                        let lexer_name = lexer.name.clone();
                        modules.push(lexer);
                        modules.push(self.parser_module(grammar, lexer_name));
                    }
                }
            },
        }

        if diagnostics.is_empty() {
            Ok(modules)
        } else {
            Err(diagnostics)
        }
    }

    fn settings_mut(&mut self) -> Option<&mut GeneratorSettings> {
        Some(&mut self.settings)
    }
}

fn collect_literals(alternatives: &[Alternative], out: &mut Vec<String>) {
    for alternative in alternatives {
        for Element { atom, .. } in &alternative.elements {
            match atom {
                Atom::Literal(text) => out.push(text.clone()),
                Atom::Block(nested) => collect_literals(nested, out),
                _ => {}
            }
        }
    }
}

fn translate_alternatives(
    alternatives: &[LexerAlt],
    rules: &BTreeMap<&str, &LexerRule>,
    stack: &mut Vec<String>,
) -> Result<String, String> {
    let parts = alternatives
        .iter()
        .map(|alt| {
            alt.elements
                .iter()
                .map(|element| translate_element(element, rules, stack))
                .collect::<Result<String, String>>()
        })
        .collect::<Result<Vec<String>, String>>()?;
    Ok(parts.join("|"))
}

/// Upper bound on the branches a single rule is split into.
const MAX_BRANCHES: usize = 64;

/// Split a rule into the branches of its alternation. Alternatives nested in
/// unquantified blocks and rule references are lifted to the top, so
/// `OP : '=' | ('==' | EQ3) ;` yields three branches. Alternations under a
/// quantifier stay inside their branch.
fn translate_branches(
    alternatives: &[LexerAlt],
    rules: &BTreeMap<&str, &LexerRule>,
    stack: &mut Vec<String>,
) -> Result<Vec<String>, String> {
    let mut branches = Vec::new();
    for alt in alternatives {
        let mut sequences = vec![String::new()];
        for element in &alt.elements {
            let pieces = element_branches(element, rules, stack)?;
            if sequences.len() * pieces.len() > MAX_BRANCHES {
                return Ok(vec![translate_alternatives(alternatives, rules, stack)?]);
            }
            sequences = sequences
                .iter()
                .flat_map(|prefix| pieces.iter().map(move |piece| format!("{prefix}{piece}")))
                .collect();
        }
        branches.extend(sequences);
        if branches.len() > MAX_BRANCHES {
            return Ok(vec![translate_alternatives(alternatives, rules, stack)?]);
        }
    }
    Ok(branches)
}

fn element_branches(
    element: &LexerElement,
    rules: &BTreeMap<&str, &LexerRule>,
    stack: &mut Vec<String>,
) -> Result<Vec<String>, String> {
    if element.quantifier != Quantifier::One {
        return Ok(vec![translate_element(element, rules, stack)?]);
    }
    let nested = match &element.atom {
        LexerAtom::Block(alternatives) => translate_branches(alternatives, rules, stack)?,
        LexerAtom::RuleRef(name) => {
            if stack.iter().any(|n| n == name) {
                return Err(format!("recursive reference to {}", name));
            }
            let rule = rules
                .get(name.as_str())
                .ok_or_else(|| format!("reference to undefined rule {}", name))?;
            stack.push(name.clone());
            let branches = translate_branches(&rule.alternatives, rules, stack);
            stack.pop();
            branches?
        }
        _ => return Ok(vec![translate_element(element, rules, stack)?]),
    };
    Ok(nested.into_iter().map(|b| format!("(?:{b})")).collect())
}

fn translate_element(
    element: &LexerElement,
    rules: &BTreeMap<&str, &LexerRule>,
    stack: &mut Vec<String>,
) -> Result<String, String> {
    let atom = translate_atom(&element.atom, rules, stack)?;
    let suffix = match element.quantifier {
        Quantifier::One => return Ok(atom),
        Quantifier::Optional => "?",
        Quantifier::Star => "*",
        Quantifier::Plus => "+",
    };
    let lazy = if element.greedy { "" } else { "?" };
    Ok(format!("(?:{}){}{}", atom, suffix, lazy))
}

fn translate_atom(
    atom: &LexerAtom,
    rules: &BTreeMap<&str, &LexerRule>,
    stack: &mut Vec<String>,
) -> Result<String, String> {
    match atom {
        LexerAtom::Literal(text) => Ok(regex::escape(text)),
        LexerAtom::Range(from, to) => {
            if from > to {
                return Err(format!("empty range '{}'..'{}'", from, to));
            }
            Ok(format!("[{}-{}]", class_char(*from), class_char(*to)))
        }
        LexerAtom::Set { body, negated } => {
            let class = translate_set(body)?;
            match (class.is_empty(), negated) {
                (true, false) => Err("empty character set".to_string()),
                (true, true) => Ok("(?s:.)".to_string()),
                (false, true) => Ok(format!("[^{}]", class)),
                (false, false) => Ok(format!("[{}]", class)),
            }
        }
        LexerAtom::NotLiteral(c) => Ok(format!("[^{}]", class_char(*c))),
        LexerAtom::Any => Ok("(?s:.)".to_string()),
        LexerAtom::RuleRef(name) => {
            if stack.iter().any(|n| n == name) {
                return Err(format!("recursive reference to {}", name));
            }
            let rule = rules
                .get(name.as_str())
                .ok_or_else(|| format!("reference to undefined rule {}", name))?;
            stack.push(name.clone());
            let pattern = translate_alternatives(&rule.alternatives, rules, stack);
            stack.pop();
            Ok(format!("(?:{})", pattern?))
        }
        LexerAtom::Block(alternatives) => Ok(format!(
            "(?:{})",
            translate_alternatives(alternatives, rules, stack)?
        )),
    }
}

/// Translate the body of `[...]` into the body of a regex class.
fn translate_set(body: &str) -> Result<String, String> {
    enum Item {
        Char(char),
        Dash,
    }

    let mut items = Vec::new();
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = match chars.next() {
                    Some('n') => '\n',
                    Some('r') => '\r',
                    Some('t') => '\t',
                    Some('b') => '\u{8}',
                    Some('f') => '\u{c}',
                    Some('u') => {
                        let hex: String = chars.by_ref().take(4).collect();
                        u32::from_str_radix(&hex, 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or_else(|| format!("invalid escape \\u{}", hex))?
                    }
                    Some(other) => other,
                    None => return Err("dangling escape in character set".to_string()),
                };
                items.push(Item::Char(escaped));
            }
            '-' => items.push(Item::Dash),
            other => items.push(Item::Char(other)),
        }
    }

    let mut out = String::new();
    let mut i = 0;
    while i < items.len() {
        match (&items[i], items.get(i + 1), items.get(i + 2)) {
            (Item::Char(from), Some(Item::Dash), Some(Item::Char(to))) => {
                if from > to {
                    return Err(format!("empty range {}-{} in character set", from, to));
                }
                out.push_str(&class_char(*from));
                out.push('-');
                out.push_str(&class_char(*to));
                i += 3;
            }
            (Item::Char(c), _, _) => {
                out.push_str(&class_char(*c));
                i += 1;
            }
            (Item::Dash, _, _) => {
                out.push_str("\\-");
                i += 1;
            }
        }
    }
    Ok(out)
}

/// A single character escaped for use inside a regex class.
fn class_char(c: char) -> String {
    match c {
        '\n' => "\\n".to_string(),
        '\r' => "\\r".to_string(),
        '\t' => "\\t".to_string(),
        '\\' | ']' | '[' | '^' | '-' | '&' | '~' => format!("\\{}", c),
        other => other.to_string(),
    }
}
