//! Compiled parser lifecycle
//!
//! A [`CompiledParser`] moves through three states:
//!
//! ```text
//! Fresh --compile()--> Compiled
//! load(path) --------> Restored
//! ```
//!
//! `Restored` counts as compiled everywhere. Parsing and storing are only legal
//! once compiled, compiling is only legal while fresh, and there is no way back to
//! `Fresh`. A snapshot keeps the artifact store and the entry points; the grammar
//! specifications and the dependency graph are not part of it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::kiln::artifact::{ArtifactStore, EntryPoints, Snapshot};
use crate::kiln::cache::InstanceCache;
use crate::kiln::codegen::{GeneratorSettings, ModuleGenerator, SourceGenerator};
use crate::kiln::compiler::{ModuleCompiler, UnitCompiler};
use crate::kiln::error::{KilnError, Result};
use crate::kiln::grammar::{GrammarSpec, GrammarSyntaxError};
use crate::kiln::loader::{DynamicLoader, TypeProvider};
use crate::kiln::pipeline::CompilationPipeline;
use crate::kiln::resolver::{DependencyResolver, Resolution};
use crate::kiln::runtime::{CaseSensitivity, NoopListener, ParseTreeListener};
use crate::kiln::session::{ParseResult, ParseSession, SessionSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowState {
    Fresh,
    Compiled,
    Restored,
}

impl WorkflowState {
    pub fn is_compiled(self) -> bool {
        matches!(self, WorkflowState::Compiled | WorkflowState::Restored)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Fresh => write!(f, "fresh"),
            WorkflowState::Compiled => write!(f, "compiled"),
            WorkflowState::Restored => write!(f, "restored"),
        }
    }
}

/// Adjusts the generator settings right before the pipeline runs.
pub type ToolCustomizer = Arc<dyn Fn(&mut GeneratorSettings) + Send + Sync>;

/// Construction-time options of a compiled parser.
#[derive(Clone)]
pub struct ParserOptions {
    /// Never cache lexer instances
    pub independent_instance: bool,
    pub case_sensitivity: CaseSensitivity,
    pub report_ambiguity: bool,
    pub report_context_sensitivity: bool,
    pub generator: GeneratorSettings,
    pub tool_customizer: Option<ToolCustomizer>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            independent_instance: false,
            case_sensitivity: CaseSensitivity::None,
            report_ambiguity: true,
            report_context_sensitivity: true,
            generator: GeneratorSettings::default(),
            tool_customizer: None,
        }
    }
}

impl fmt::Debug for ParserOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserOptions")
            .field("independent_instance", &self.independent_instance)
            .field("case_sensitivity", &self.case_sensitivity)
            .field("report_ambiguity", &self.report_ambiguity)
            .field(
                "report_context_sensitivity",
                &self.report_context_sensitivity,
            )
            .field("generator", &self.generator)
            .field("tool_customizer", &self.tool_customizer.is_some())
            .finish()
    }
}

impl ParserOptions {
    pub fn independent(mut self) -> Self {
        self.independent_instance = true;
        self
    }

    pub fn case_sensitivity(mut self, case: CaseSensitivity) -> Self {
        self.case_sensitivity = case;
        self
    }

    pub fn customize(
        mut self,
        customizer: impl Fn(&mut GeneratorSettings) + Send + Sync + 'static,
    ) -> Self {
        self.tool_customizer = Some(Arc::new(customizer));
        self
    }

    fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            case_sensitivity: self.case_sensitivity,
            cache_lexer: !self.independent_instance,
            report_ambiguity: self.report_ambiguity,
            report_context_sensitivity: self.report_context_sensitivity,
        }
    }
}

/// Assembles a [`CompiledParser`] with non-default collaborators.
#[derive(Default)]
pub struct CompiledParserBuilder {
    specs: Vec<GrammarSpec>,
    options: ParserOptions,
    generator: Option<Box<dyn SourceGenerator>>,
    compiler: Option<Box<dyn UnitCompiler>>,
    listener: Option<Box<dyn ParseTreeListener>>,
    providers: Vec<Box<dyn TypeProvider>>,
}

impl CompiledParserBuilder {
    pub fn grammar(mut self, spec: GrammarSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn grammars(mut self, specs: impl IntoIterator<Item = GrammarSpec>) -> Self {
        self.specs.extend(specs);
        self
    }

    pub fn grammar_file(self, path: impl AsRef<Path>) -> Result<Self> {
        Ok(self.grammar(GrammarSpec::from_file(path)?))
    }

    pub fn options(mut self, options: ParserOptions) -> Self {
        self.options = options;
        self
    }

    pub fn generator(mut self, generator: Box<dyn SourceGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn compiler(mut self, compiler: Box<dyn UnitCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn listener(mut self, listener: Box<dyn ParseTreeListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn type_provider(mut self, provider: Box<dyn TypeProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Resolve the grammar set. Fails with a configuration error when there is
    /// nothing usable to compile or the imports form a cycle.
    pub fn build(self) -> Result<CompiledParser> {
        if self.specs.is_empty() {
            return Err(KilnError::Configuration(
                "no grammar specifications given".to_string(),
            ));
        }
        let resolution = DependencyResolver::resolve(&self.specs)?;
        if resolution.ordered.is_empty() {
            let reasons: Vec<String> = resolution
                .rejected
                .iter()
                .flat_map(|(spec, errors)| {
                    errors.iter().map(move |e| format!("{}: {}", spec.origin(), e))
                })
                .collect();
            return Err(KilnError::Configuration(format!(
                "no grammar specification could be read:\n{}",
                reasons.join("\n")
            )));
        }

        let generator = self
            .generator
            .unwrap_or_else(|| Box::new(ModuleGenerator::new(self.options.generator.clone())));
        let compiler = self
            .compiler
            .unwrap_or_else(|| Box::new(ModuleCompiler::new()));
        let mut pipeline = CompilationPipeline::new(generator, compiler);
        if let Some(customizer) = &self.options.tool_customizer {
            pipeline.customize_generator(|settings| customizer(settings));
        }

        let mut parser = CompiledParser::empty(self.options, WorkflowState::Fresh);
        parser.resolution = Some(resolution);
        parser.pipeline = pipeline;
        if let Some(listener) = self.listener {
            parser.listener = listener;
        }
        for provider in self.providers {
            parser.loader.register_provider(provider);
        }
        Ok(parser)
    }
}

pub struct CompiledParser {
    state: WorkflowState,
    options: ParserOptions,
    resolution: Option<Resolution>,
    pipeline: CompilationPipeline,
    entry_points: Option<EntryPoints>,
    loader: DynamicLoader,
    cache: InstanceCache,
    listener: Box<dyn ParseTreeListener>,
}

impl fmt::Debug for CompiledParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledParser")
            .field("state", &self.state)
            .field("entry_points", &self.entry_points)
            .field("artifacts", &self.loader.store().len())
            .finish()
    }
}

impl CompiledParser {
    /// A fresh parser over `specs`, ready to [`compile`](Self::compile).
    pub fn new(specs: Vec<GrammarSpec>, options: ParserOptions) -> Result<Self> {
        Self::builder().grammars(specs).options(options).build()
    }

    pub fn from_files<P: AsRef<Path>>(
        paths: impl IntoIterator<Item = P>,
        options: ParserOptions,
    ) -> Result<Self> {
        let specs = paths
            .into_iter()
            .map(GrammarSpec::from_file)
            .collect::<Result<Vec<_>>>()?;
        Self::new(specs, options)
    }

    pub fn builder() -> CompiledParserBuilder {
        CompiledParserBuilder::default()
    }

    fn empty(options: ParserOptions, state: WorkflowState) -> Self {
        CompiledParser {
            state,
            options,
            resolution: None,
            pipeline: CompilationPipeline::default(),
            entry_points: None,
            loader: DynamicLoader::new(Arc::new(ArtifactStore::new())),
            cache: InstanceCache::new(),
            listener: Box::new(NoopListener),
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        self.loader.store()
    }

    pub fn entry_points(&self) -> Option<&EntryPoints> {
        self.entry_points.as_ref()
    }

    /// Grammar names in processing order. Not available after a restore.
    pub fn dependency_order(&self) -> Option<Vec<String>> {
        self.resolution.as_ref().map(Resolution::names)
    }

    /// Specifications that were excluded because they failed to parse.
    pub fn rejected(&self) -> &[(GrammarSpec, Vec<GrammarSyntaxError>)] {
        self.resolution
            .as_ref()
            .map(|r| r.rejected.as_slice())
            .unwrap_or_default()
    }

    pub fn set_listener(&mut self, listener: Box<dyn ParseTreeListener>) {
        self.listener = listener;
    }

    pub fn register_type_provider(&mut self, provider: Box<dyn TypeProvider>) {
        self.loader.register_provider(provider);
    }

    /// Run the compilation pipeline. Legal once, on a fresh instance.
    pub fn compile(&mut self) -> Result<()> {
        if self.state != WorkflowState::Fresh {
            return Err(KilnError::RedundantCompilation);
        }
        let resolution = self
            .resolution
            .as_ref()
            .ok_or_else(|| KilnError::IllegalWorkflow("no grammar set to compile".to_string()))?;

        let (entry_points, store) = self.pipeline.compile(&resolution.ordered)?;
        info!(
            grammars = resolution.ordered.len(),
            lexer = %entry_points.lexer,
            parser = %entry_points.parser,
            "grammar set compiled"
        );

        self.loader.rebind(Arc::new(store));
        self.cache.clear();
        self.entry_points = Some(entry_points);
        self.state = WorkflowState::Compiled;
        Ok(())
    }

    /// Parse `text` starting at `entry`, or at the first declared production.
    pub fn parse(&mut self, text: &str, entry: Option<&str>) -> Result<ParseResult> {
        let entry_points = self.require_compiled("parse")?.clone();
        let settings = self.options.session_settings();
        ParseSession {
            loader: &mut self.loader,
            cache: &mut self.cache,
            entry_points: &entry_points,
            listener: &mut *self.listener,
            settings,
        }
        .run(text, entry)
        .map_err(broken_state)
    }

    /// Parse with a listener other than the registered one.
    pub fn parse_with_listener(
        &mut self,
        text: &str,
        entry: Option<&str>,
        listener: &mut dyn ParseTreeListener,
    ) -> Result<ParseResult> {
        let entry_points = self.require_compiled("parse")?.clone();
        let settings = self.options.session_settings();
        ParseSession {
            loader: &mut self.loader,
            cache: &mut self.cache,
            entry_points: &entry_points,
            listener,
            settings,
        }
        .run(text, entry)
        .map_err(broken_state)
    }

    /// Parse the contents of a file. The state is checked before the file is read.
    pub fn parse_file(
        &mut self,
        path: impl AsRef<Path>,
        entry: Option<&str>,
    ) -> Result<ParseResult> {
        self.require_compiled("parse")?;
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| KilnError::config_io(path, e))?;
        self.parse(&text, entry)
    }

    /// Productions of the parser entry point, in declaration order.
    pub fn productions(&mut self) -> Result<Vec<String>> {
        let entry_points = self.require_compiled("list productions")?.clone();
        let parser_type = self
            .cache
            .parser_type(&mut self.loader, &entry_points.parser)
            .map_err(broken_state)?;
        Ok(parser_type
            .production_names()
            .into_iter()
            .map(String::from)
            .collect())
    }

    /// Point parsing at other lexer and parser units of the store.
    pub fn override_entry_points(&mut self, entry_points: EntryPoints) -> Result<()> {
        self.require_compiled("override entry points")?;
        self.loader.lexer_type(&entry_points.lexer)?;
        self.loader.parser_type(&entry_points.parser)?;
        self.cache.clear();
        self.entry_points = Some(entry_points);
        Ok(())
    }

    pub fn snapshot_bytes(&self) -> Result<Vec<u8>> {
        let entry_points = self.require_compiled("store")?;
        Snapshot::new(entry_points.clone(), self.loader.store())
            .encode()
            .map_err(|e| KilnError::serialization("<memory>", e))
    }

    /// Write a snapshot of the compiled state to `path`.
    pub fn store(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self
            .snapshot_bytes()
            .map_err(|e| match e {
                KilnError::Serialization { message, .. } => KilnError::serialization(path, message),
                other => other,
            })?;
        std::fs::write(path, &bytes).map_err(|e| KilnError::serialization(path, e))?;
        info!(path = %path.display(), bytes = bytes.len(), "stored compiled parser");
        Ok(())
    }

    /// Restore a compiled parser from a snapshot file.
    pub fn load(path: impl AsRef<Path>, options: ParserOptions) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| KilnError::deserialization(path, e))?;
        let parser = Self::restore(&bytes, options, path.to_path_buf())?;
        info!(path = %path.display(), "loaded compiled parser");
        Ok(parser)
    }

    /// Restore a compiled parser from snapshot bytes.
    pub fn from_snapshot_bytes(bytes: &[u8], options: ParserOptions) -> Result<Self> {
        Self::restore(bytes, options, PathBuf::from("<memory>"))
    }

    fn restore(bytes: &[u8], options: ParserOptions, location: PathBuf) -> Result<Self> {
        let snapshot =
            Snapshot::decode(bytes).map_err(|e| KilnError::deserialization(&location, e))?;
        let (entry_points, store) = snapshot
            .into_parts()
            .map_err(|e| KilnError::deserialization(&location, e))?;

        for unit in [&entry_points.lexer, &entry_points.parser] {
            if store.unit(unit).is_none() {
                return Err(KilnError::deserialization(
                    &location,
                    format!("entry point unit '{}' is missing", unit),
                ));
            }
        }

        let mut parser = CompiledParser::empty(options, WorkflowState::Restored);
        parser.loader.rebind(Arc::new(store));
        parser.entry_points = Some(entry_points);
        Ok(parser)
    }

    fn require_compiled(&self, operation: &str) -> Result<&EntryPoints> {
        match (&self.entry_points, self.state.is_compiled()) {
            (Some(entry_points), true) => Ok(entry_points),
            _ => Err(KilnError::IllegalWorkflow(format!(
                "cannot {} while the parser is {}; compile or load it first",
                operation, self.state
            ))),
        }
    }
}

/// A compiled parser whose own units cannot be found is broken, not misused.
fn broken_state(error: KilnError) -> KilnError {
    match error {
        KilnError::NoSuchType(name) => KilnError::IllegalWorkflow(format!(
            "compiled state does not provide type {}",
            name
        )),
        other => other,
    }
}
