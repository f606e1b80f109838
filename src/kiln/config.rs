//! Layered configuration
//!
//! `defaults/kiln.default.toml` is embedded into the crate, so the documented
//! defaults and the runtime behavior cannot drift apart. Applications layer their
//! project file, explicit files and per-run parser settings on top with [`Loader`]
//! before deserializing into [`KilnConfig`].

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat};
use serde::Deserialize;
use std::path::Path;

use crate::kiln::codegen::GeneratorSettings;
use crate::kiln::runtime::CaseSensitivity;
use crate::kiln::workflow::ParserOptions;

const DEFAULT_TOML: &str = include_str!("../../defaults/kiln.default.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct KilnConfig {
    pub parser: ParserConfig,
    pub generator: GeneratorConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParserConfig {
    pub independent_instance: bool,
    pub case_sensitivity: CaseSensitivity,
}

/// Mirrors [`GeneratorSettings`]; an empty package means none.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    pub package: String,
    pub lexer_suffix: String,
    pub parser_suffix: String,
    pub context_suffix: String,
    pub implicit_literal_tokens: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiagnosticsConfig {
    pub report_ambiguity: bool,
    pub report_context_sensitivity: bool,
}

impl KilnConfig {
    pub fn generator_settings(&self) -> GeneratorSettings {
        let generator = &self.generator;
        GeneratorSettings {
            package: Some(generator.package.clone()).filter(|p| !p.is_empty()),
            lexer_suffix: generator.lexer_suffix.clone(),
            parser_suffix: generator.parser_suffix.clone(),
            context_suffix: generator.context_suffix.clone(),
            implicit_literal_tokens: generator.implicit_literal_tokens,
        }
    }

    pub fn parser_options(&self) -> ParserOptions {
        ParserOptions {
            independent_instance: self.parser.independent_instance,
            case_sensitivity: self.parser.case_sensitivity,
            report_ambiguity: self.diagnostics.report_ambiguity,
            report_context_sensitivity: self.diagnostics.report_context_sensitivity,
            generator: self.generator_settings(),
            tool_customizer: None,
        }
    }
}

/// Name of the per-project configuration file picked up by [`Loader::with_project_dir`].
pub const PROJECT_FILE: &str = "kiln.toml";

/// Builds a [`KilnConfig`] from the embedded defaults, an optional project
/// `kiln.toml`, explicit files and per-run parser settings, in rising priority.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    pub fn new() -> Self {
        let defaults = File::from_str(DEFAULT_TOML, FileFormat::Toml);
        Self {
            builder: Config::builder().add_source(defaults),
        }
    }

    /// Layers `kiln.toml` from `dir` when the directory has one.
    pub fn with_project_dir(self, dir: impl AsRef<Path>) -> Self {
        self.layer(&dir.as_ref().join(PROJECT_FILE), false)
    }

    /// Layers a file that must exist.
    pub fn with_file(self, path: impl AsRef<Path>) -> Self {
        self.layer(path.as_ref(), true)
    }

    /// Forces the input folding regardless of any file layer.
    pub fn case_sensitivity(mut self, case: CaseSensitivity) -> Result<Self, ConfigError> {
        self.builder = self
            .builder
            .set_override("parser.case_sensitivity", case.to_string())?;
        Ok(self)
    }

    /// Forces `independent_instance` regardless of any file layer.
    pub fn independent_instance(mut self, independent: bool) -> Result<Self, ConfigError> {
        self.builder = self
            .builder
            .set_override("parser.independent_instance", independent)?;
        Ok(self)
    }

    pub fn build(self) -> Result<KilnConfig, ConfigError> {
        self.builder.build()?.try_deserialize()
    }

    fn layer(mut self, path: &Path, required: bool) -> Self {
        let source = File::from(path).format(FileFormat::Toml).required(required);
        self.builder = self.builder.add_source(source);
        self
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

pub fn load_defaults() -> Result<KilnConfig, ConfigError> {
    Loader::new().build()
}
