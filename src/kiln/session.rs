//! One parse of one input
//!
//! A [`ParseSession`] borrows the pieces of a compiled parser for the duration of a
//! single parse and runs the steps in a fixed order: check that compiled artifacts
//! exist, reset the listener, lex eagerly, bind a fresh parser with a fresh
//! diagnostic collector, pick and dispatch the entry production, fail on syntax
//! errors, then walk the tree with the listener.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::kiln::artifact::EntryPoints;
use crate::kiln::cache::InstanceCache;
use crate::kiln::error::{KilnError, Result};
use crate::kiln::loader::DynamicLoader;
use crate::kiln::runtime::{
    walk, CaseSensitivity, CharStream, Diagnostic, DiagnosticCollector, ParseTree,
    ParseTreeListener, TokenStream,
};

/// Outcome of a successful parse.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseResult {
    /// Production the parse started from
    pub production: String,
    pub tree: ParseTree,
    /// Informational reports (ambiguity, context sensitivity)
    pub diagnostics: Vec<Diagnostic>,
}

/// Per-parse settings taken from the parser options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub case_sensitivity: CaseSensitivity,
    pub cache_lexer: bool,
    pub report_ambiguity: bool,
    pub report_context_sensitivity: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            case_sensitivity: CaseSensitivity::None,
            cache_lexer: true,
            report_ambiguity: true,
            report_context_sensitivity: true,
        }
    }
}

pub struct ParseSession<'a> {
    pub loader: &'a mut DynamicLoader,
    pub cache: &'a mut InstanceCache,
    pub entry_points: &'a EntryPoints,
    pub listener: &'a mut dyn ParseTreeListener,
    pub settings: SessionSettings,
}

impl ParseSession<'_> {
    pub fn run(self, text: &str, entry: Option<&str>) -> Result<ParseResult> {
        if self.loader.store().is_empty() {
            return Err(KilnError::IllegalWorkflow(
                "no compiled artifacts are available".to_string(),
            ));
        }

        self.listener.reset();

        let input = CharStream::new(text, self.settings.case_sensitivity);
        let mut tokens = TokenStream::new();
        let lexer_errors = {
            let mut lexer = self.cache.lexer(
                self.loader,
                &self.entry_points.lexer,
                input,
                self.settings.cache_lexer,
            )?;
            tokens.fill(&mut lexer);
            lexer.take_diagnostics()
        };

        let mut parser = self
            .cache
            .parser(self.loader, &self.entry_points.parser, tokens)?;
        let mut collector = DiagnosticCollector::with_reporting(
            self.settings.report_ambiguity,
            self.settings.report_context_sensitivity,
        );
        collector.extend(lexer_errors);
        parser.set_collector(collector);
        parser.set_build_parse_trees(true);

        let parser_type = Arc::clone(parser.parser_type());
        let production = match entry {
            Some(name) if parser_type.has_production(name) => name.to_string(),
            Some(name) => {
                return Err(KilnError::UnknownProduction {
                    name: name.to_string(),
                    known: parser_type.production_names().join(", "),
                })
            }
            None => parser_type
                .first_production()
                .map(String::from)
                .ok_or_else(|| {
                    KilnError::IllegalWorkflow(format!(
                        "parser {} declares no productions",
                        parser_type.name()
                    ))
                })?,
        };

        let call = parser_type
            .production(&production)
            .ok_or_else(|| KilnError::Dispatch(production.clone()))?;
        debug!(parser = parser_type.name(), %production, "dispatching entry production");
        let node = call(&mut parser);

        let collector = parser.take_collector();
        if collector.has_syntax_errors() {
            return Err(KilnError::Parsing {
                messages: collector.syntax_messages().join("\n"),
                diagnostics: collector.into_diagnostics(),
            });
        }

        let tree = ParseTree::Rule(node);
        walk(self.listener, &tree);

        Ok(ParseResult {
            production,
            tree,
            diagnostics: collector.into_diagnostics(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kiln::artifact::ArtifactStore;
    use crate::kiln::grammar::GrammarSpec;
    use crate::kiln::pipeline::CompilationPipeline;
    use crate::kiln::runtime::{NoopListener, RuleTraceListener};
    use crate::kiln::testing::{AMBIGUOUS_GRAMMAR, EXPR_GRAMMAR};

    struct Fixture {
        loader: DynamicLoader,
        cache: InstanceCache,
        entry_points: EntryPoints,
    }

    impl Fixture {
        fn new(grammar: &str) -> Self {
            let parsed = GrammarSpec::from_source("test.g4", grammar)
                .parse()
                .expect("parses");
            let (entry_points, store) = CompilationPipeline::default()
                .compile(&[parsed])
                .expect("compiles");
            Fixture {
                loader: DynamicLoader::new(Arc::new(store)),
                cache: InstanceCache::new(),
                entry_points,
            }
        }

        fn parse(
            &mut self,
            listener: &mut dyn ParseTreeListener,
            text: &str,
            entry: Option<&str>,
        ) -> Result<ParseResult> {
            ParseSession {
                loader: &mut self.loader,
                cache: &mut self.cache,
                entry_points: &self.entry_points,
                listener,
                settings: SessionSettings::default(),
            }
            .run(text, entry)
        }
    }

    #[test]
    fn test_parse_and_walk() {
        let mut fixture = Fixture::new(EXPR_GRAMMAR);
        let mut trace = RuleTraceListener::new();
        let result = fixture.parse(&mut trace, "3 + 100", None).expect("parses");

        assert_eq!(result.production, "expr");
        assert_eq!(result.tree.to_string_tree(), "(expr 3 + 100)");
        assert_eq!(trace.events().first().map(String::as_str), Some("enter expr"));
        assert_eq!(trace.events().last().map(String::as_str), Some("exit expr"));
    }

    #[test]
    fn test_listener_is_reset_between_parses() {
        let mut fixture = Fixture::new(EXPR_GRAMMAR);
        let mut trace = RuleTraceListener::new();
        fixture.parse(&mut trace, "1+2", None).expect("parses");
        let first = trace.events().to_vec();
        fixture.parse(&mut trace, "1+2", None).expect("parses");
        assert_eq!(trace.events(), first.as_slice());
    }

    #[test]
    fn test_syntax_errors_fail_the_parse() {
        let mut fixture = Fixture::new(EXPR_GRAMMAR);
        let err = fixture
            .parse(&mut NoopListener, "3+", None)
            .expect_err("incomplete input");
        match err {
            KilnError::Parsing { messages, diagnostics } => {
                assert!(messages.contains("line 1:2"));
                assert!(diagnostics.iter().all(Diagnostic::is_syntax));
            }
            other => panic!("expected parsing error, got {other}"),
        }
    }

    #[test]
    fn test_lexer_errors_fail_the_parse() {
        let mut fixture = Fixture::new(EXPR_GRAMMAR);
        let err = fixture
            .parse(&mut NoopListener, "3 ? 4", None)
            .expect_err("bad character");
        assert!(err.to_string().contains("token recognition error at: '?'"));
    }

    #[test]
    fn test_unknown_entry_production() {
        let mut fixture = Fixture::new(EXPR_GRAMMAR);
        let err = fixture
            .parse(&mut NoopListener, "1+2", Some("statement"))
            .expect_err("unknown");
        assert!(matches!(
            err,
            KilnError::UnknownProduction { ref name, ref known }
                if name == "statement" && known == "expr"
        ));
    }

    #[test]
    fn test_ambiguity_is_informational() {
        let mut fixture = Fixture::new(AMBIGUOUS_GRAMMAR);
        let result = fixture
            .parse(&mut NoopListener, "abc", Some("start"))
            .expect("ambiguity is not an error");
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.message.starts_with("reportAmbiguity")));
    }

    #[test]
    fn test_empty_store_is_illegal() {
        let mut loader = DynamicLoader::new(Arc::new(ArtifactStore::new()));
        let mut cache = InstanceCache::new();
        let entry_points = EntryPoints {
            lexer: "L".into(),
            parser: "P".into(),
        };
        let err = ParseSession {
            loader: &mut loader,
            cache: &mut cache,
            entry_points: &entry_points,
            listener: &mut NoopListener,
            settings: SessionSettings::default(),
        }
        .run("x", None)
        .expect_err("nothing compiled");
        assert!(matches!(err, KilnError::IllegalWorkflow(_)));
    }
}
