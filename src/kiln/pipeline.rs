//! In-memory compilation pipeline
//!
//! Runs once per instance: generate source modules for every grammar in dependency
//! order, compile all of them in a single batch, and record the produced units in a
//! fresh [`ArtifactStore`]. Nothing touches the filesystem.
//!
//! A grammar whose vocabulary is imported by another grammar of the batch is a pure
//! vocabulary contributor: its tokens reach the importer's lexer module, and it
//! produces no module of its own.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::{debug, info};

use crate::kiln::artifact::{Artifact, ArtifactStore, EntryPoints, ModuleKind, SourceModule};
use crate::kiln::codegen::{GeneratorSettings, ModuleGenerator, SourceGenerator};
use crate::kiln::compiler::{CompilationDiagnostics, ModuleCompiler, UnitCompiler};
use crate::kiln::error::{KilnError, Result};
use crate::kiln::grammar::ParsedGrammar;

const PIPELINE: &str = "<pipeline>";

pub struct CompilationPipeline {
    generator: Box<dyn SourceGenerator>,
    compiler: Box<dyn UnitCompiler>,
    compiled: bool,
}

impl Default for CompilationPipeline {
    fn default() -> Self {
        CompilationPipeline::new(
            Box::new(ModuleGenerator::default()),
            Box::new(ModuleCompiler::new()),
        )
    }
}

impl fmt::Debug for CompilationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilationPipeline")
            .field("compiled", &self.compiled)
            .finish()
    }
}

impl CompilationPipeline {
    pub fn new(generator: Box<dyn SourceGenerator>, compiler: Box<dyn UnitCompiler>) -> Self {
        CompilationPipeline {
            generator,
            compiler,
            compiled: false,
        }
    }

    /// Let `customize` adjust the generator settings. Generators without settings
    /// are left alone.
    pub fn customize_generator(&mut self, customize: impl FnOnce(&mut GeneratorSettings)) {
        if let Some(settings) = self.generator.settings_mut() {
            customize(settings);
        }
    }

    pub fn has_compiled(&self) -> bool {
        self.compiled
    }

    /// Compile `ordered` (dependency order, as produced by the resolver).
    pub fn compile(&mut self, ordered: &[ParsedGrammar]) -> Result<(EntryPoints, ArtifactStore)> {
        if self.compiled {
            return Err(KilnError::RedundantCompilation);
        }
        if ordered.is_empty() {
            return Err(KilnError::compilation(CompilationDiagnostics::single(
                PIPELINE,
                "no grammar specifications to compile",
            )));
        }

        let by_name: HashMap<&str, &ParsedGrammar> =
            ordered.iter().map(|g| (g.name(), g)).collect();
        let imported: HashSet<&str> = ordered
            .iter()
            .filter_map(ParsedGrammar::vocabulary)
            .filter(|v| by_name.contains_key(v))
            .collect();

        let mut diagnostics = CompilationDiagnostics::new();
        let mut pending: Vec<SourceModule> = Vec::new();
        let mut pending_names: HashSet<String> = HashSet::new();
        let mut last: Option<(&str, Vec<String>, Vec<String>)> = None;

        for grammar in ordered {
            if imported.contains(grammar.name()) {
                debug!(grammar = grammar.name(), "vocabulary contributor, no module of its own");
                continue;
            }

            let chain = vocabulary_chain(grammar, &by_name);
            let modules = match self.generator.generate(grammar, &chain) {
                Ok(modules) => modules,
                Err(errors) => {
                    diagnostics.extend(errors);
                    continue;
                }
            };
            debug!(
                grammar = grammar.name(),
                modules = modules.len(),
                "generated source modules"
            );

            let names_of = |kind: ModuleKind| -> Vec<String> {
                modules
                    .iter()
                    .filter(|m| m.kind == kind)
                    .map(|m| m.name.clone())
                    .collect()
            };
            last = Some((
                grammar.name(),
                names_of(ModuleKind::Lexer),
                names_of(ModuleKind::Parser),
            ));

            for module in modules {
                if pending_names.insert(module.name.clone()) {
                    pending.push(module);
                }
            }
        }

        if !diagnostics.is_empty() {
            return Err(KilnError::compilation(diagnostics));
        }

        let entry_points = match last {
            Some((_, lexers, parsers)) if lexers.len() == 1 && parsers.len() == 1 => EntryPoints {
                lexer: lexers[0].clone(),
                parser: parsers[0].clone(),
            },
            Some((grammar, lexers, parsers)) => {
                return Err(KilnError::compilation(CompilationDiagnostics::single(
                    grammar,
                    format!(
                        "expected one lexer and one parser module, found {} and {}",
                        lexers.len(),
                        parsers.len()
                    ),
                )))
            }
            None => {
                return Err(KilnError::compilation(CompilationDiagnostics::single(
                    PIPELINE,
                    "every grammar is a vocabulary contributor, nothing to compile",
                )))
            }
        };

        let compiled = self
            .compiler
            .compile_batch(&pending)
            .map_err(KilnError::compilation)?;

        let mut units_by_module: HashMap<String, _> = compiled
            .into_iter()
            .map(|c| (c.module, c.units))
            .collect();
        let mut store = ArtifactStore::new();
        for module in pending {
            let units = units_by_module.remove(&module.name).unwrap_or_default();
            if units.is_empty() {
                diagnostics.push(&module.name, "module produced no units");
                continue;
            }
            let name = module.name.clone();
            if let Err(e) = store.insert(Artifact { module, units }) {
                diagnostics.push(&name, e.to_string());
            }
        }
        for unexpected in units_by_module.keys() {
            diagnostics.push(unexpected, "compiler returned units for an unknown module");
        }
        for unit in [&entry_points.lexer, &entry_points.parser] {
            if store.unit(unit).is_none() {
                diagnostics.push(unit, "entry point unit was not produced");
            }
        }
        if !diagnostics.is_empty() {
            return Err(KilnError::compilation(diagnostics));
        }

        info!(
            modules = store.len(),
            units = store.unit_names().count(),
            lexer = %entry_points.lexer,
            parser = %entry_points.parser,
            "compiled grammar set"
        );
        self.compiled = true;
        Ok((entry_points, store))
    }
}

/// Import chain of `grammar`, nearest vocabulary first, limited to the batch.
fn vocabulary_chain<'a>(
    grammar: &ParsedGrammar,
    by_name: &HashMap<&str, &'a ParsedGrammar>,
) -> Vec<&'a ParsedGrammar> {
    let mut chain = Vec::new();
    let mut seen = HashSet::from([grammar.name().to_string()]);
    let mut next = grammar.vocabulary();
    while let Some(name) = next {
        let Some(vocabulary) = by_name.get(name).copied() else {
            break;
        };
        if !seen.insert(name.to_string()) {
            break;
        }
        chain.push(vocabulary);
        next = vocabulary.vocabulary();
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kiln::grammar::GrammarSpec;
    use crate::kiln::resolver::DependencyResolver;
    use crate::kiln::testing::{calc_specs, expr_spec, CALC_LEXER};

    fn ordered(specs: &[GrammarSpec]) -> Vec<ParsedGrammar> {
        DependencyResolver::resolve(specs).expect("resolves").ordered
    }

    #[test]
    fn test_combined_grammar() {
        let (entry, store) = CompilationPipeline::default()
            .compile(&ordered(&[expr_spec()]))
            .expect("compiles");
        assert_eq!(entry.lexer, "ExprLexer");
        assert_eq!(entry.parser, "ExprParser");
        assert_eq!(store.names().collect::<Vec<_>>(), vec!["ExprLexer", "ExprParser"]);
        assert_eq!(store.declaring_module("ExprParser$ExprContext"), Some("ExprParser"));
    }

    #[test]
    fn test_vocabulary_contributor_is_skipped() {
        let (entry, store) = CompilationPipeline::default()
            .compile(&ordered(&calc_specs()))
            .expect("compiles");
        assert_eq!(entry.lexer, "CalcLexer");
        assert_eq!(entry.parser, "CalcParser");
        // The lexer module comes from the parser grammar's generation, once
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_one_shot() {
        let mut pipeline = CompilationPipeline::default();
        let grammars = ordered(&[expr_spec()]);
        pipeline.compile(&grammars).expect("first run");
        assert!(pipeline.has_compiled());
        assert!(matches!(
            pipeline.compile(&grammars),
            Err(KilnError::RedundantCompilation)
        ));
    }

    #[test]
    fn test_empty_batch() {
        assert!(matches!(
            CompilationPipeline::default().compile(&[]),
            Err(KilnError::Compilation { .. })
        ));
    }

    #[test]
    fn test_lexer_only_batch_has_no_parser_entry() {
        let grammars = ordered(&[GrammarSpec::from_source("L.g4", CALC_LEXER)]);
        let err = CompilationPipeline::default()
            .compile(&grammars)
            .expect_err("no parser module");
        assert!(err.to_string().contains("found 1 and 0"));
    }

    #[test]
    fn test_customizer_renames_modules() {
        let mut pipeline = CompilationPipeline::default();
        pipeline.customize_generator(|settings| settings.package = Some("demo".into()));
        let (entry, _) = pipeline.compile(&ordered(&[expr_spec()])).expect("compiles");
        assert_eq!(entry.parser, "demo.ExprParser");
    }

    #[test]
    fn test_compilation_errors_leave_pipeline_usable() {
        let broken = GrammarSpec::from_source("B.g4", "grammar B;\ns : missing ;\nA : 'a' ;");
        let mut pipeline = CompilationPipeline::default();
        let err = pipeline.compile(&ordered(&[broken])).expect_err("undefined rule");
        assert!(err.to_string().contains("reference to undefined rule missing"));
        assert!(!pipeline.has_compiled());
    }
}
