//! Dynamic loading of produced types
//!
//! The loader turns unit names into live types. Lookup order:
//!
//! 1. types already materialized by this loader
//! 2. the artifact store, under the name as given
//! 3. the artifact store, under the normalized name (`a/b\c.unit` -> `a.b.c`)
//! 4. the registered [`TypeProvider`]s, in registration order
//!
//! A type is materialized at most once per loader, so two lookups of the same name
//! return the same `Arc`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::kiln::artifact::{ArtifactStore, BinaryUnit};
use crate::kiln::error::{KilnError, Result};
use crate::kiln::runtime::image::UnitImage;
use crate::kiln::runtime::{ContextType, LexerType, ParserType};

#[derive(Debug, Clone)]
pub enum LoadedType {
    Lexer(Arc<LexerType>),
    Parser(Arc<ParserType>),
    Context(Arc<ContextType>),
}

impl LoadedType {
    pub fn kind_name(&self) -> &'static str {
        match self {
            LoadedType::Lexer(_) => "lexer",
            LoadedType::Parser(_) => "parser",
            LoadedType::Context(_) => "context",
        }
    }

    /// Whether both handles refer to the same materialized type.
    pub fn ptr_eq(&self, other: &LoadedType) -> bool {
        match (self, other) {
            (LoadedType::Lexer(a), LoadedType::Lexer(b)) => Arc::ptr_eq(a, b),
            (LoadedType::Parser(a), LoadedType::Parser(b)) => Arc::ptr_eq(a, b),
            (LoadedType::Context(a), LoadedType::Context(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Fallback source of types that are not in the artifact store.
pub trait TypeProvider: Send {
    fn provide(&self, name: &str) -> Option<LoadedType>;
}

/// A fixed set of user-supplied types.
#[derive(Debug, Clone, Default)]
pub struct StaticTypes {
    types: HashMap<String, LoadedType>,
}

impl StaticTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, loaded: LoadedType) -> Self {
        self.types.insert(name.into(), loaded);
        self
    }
}

impl TypeProvider for StaticTypes {
    fn provide(&self, name: &str) -> Option<LoadedType> {
        self.types.get(name).cloned()
    }
}

/// `pkg/Expr\Lexer.unit` -> `pkg.Expr.Lexer`
pub fn normalize_name(name: &str) -> String {
    let dotted = name.replace(['/', '\\'], ".");
    match dotted.strip_suffix(".unit") {
        Some(stripped) => stripped.to_string(),
        None => dotted,
    }
}

pub struct DynamicLoader {
    store: Arc<ArtifactStore>,
    types: HashMap<String, LoadedType>,
    providers: Vec<Box<dyn TypeProvider>>,
}

impl fmt::Debug for DynamicLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicLoader")
            .field("artifacts", &self.store.len())
            .field("materialized", &self.types.len())
            .field("providers", &self.providers.len())
            .finish()
    }
}

impl DynamicLoader {
    pub fn new(store: Arc<ArtifactStore>) -> Self {
        DynamicLoader {
            store,
            types: HashMap::new(),
            providers: Vec::new(),
        }
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    /// Point the loader at another store. Materialized types are dropped, providers
    /// stay registered.
    pub fn rebind(&mut self, store: Arc<ArtifactStore>) {
        self.store = store;
        self.types.clear();
    }

    pub fn register_provider(&mut self, provider: Box<dyn TypeProvider>) {
        self.providers.push(provider);
    }

    /// Number of types materialized so far.
    pub fn materialized(&self) -> usize {
        self.types.len()
    }

    pub fn resolve(&mut self, name: &str) -> Result<LoadedType> {
        if let Some(loaded) = self.types.get(name) {
            return Ok(loaded.clone());
        }

        let normalized = normalize_name(name);
        let unit = self
            .store
            .unit(name)
            .or_else(|| self.store.unit(&normalized))
            .cloned();

        let loaded = match unit {
            Some(unit) => {
                if let Some(loaded) = self.types.get(&unit.name) {
                    let loaded = loaded.clone();
                    self.types.insert(name.to_string(), loaded.clone());
                    return Ok(loaded);
                }
                let loaded = self.materialize(&unit)?;
                self.types.insert(unit.name.clone(), loaded.clone());
                loaded
            }
            None => self
                .providers
                .iter()
                .find_map(|p| p.provide(name).or_else(|| p.provide(&normalized)))
                .ok_or_else(|| KilnError::NoSuchType(name.to_string()))?,
        };

        self.types.insert(name.to_string(), loaded.clone());
        Ok(loaded)
    }

    pub fn lexer_type(&mut self, name: &str) -> Result<Arc<LexerType>> {
        match self.resolve(name)? {
            LoadedType::Lexer(lexer) => Ok(lexer),
            other => Err(wrong_kind(name, "lexer", &other)),
        }
    }

    pub fn parser_type(&mut self, name: &str) -> Result<Arc<ParserType>> {
        match self.resolve(name)? {
            LoadedType::Parser(parser) => Ok(parser),
            other => Err(wrong_kind(name, "parser", &other)),
        }
    }

    pub fn context_type(&mut self, name: &str) -> Result<Arc<ContextType>> {
        match self.resolve(name)? {
            LoadedType::Context(context) => Ok(context),
            other => Err(wrong_kind(name, "context", &other)),
        }
    }

    fn materialize(&mut self, unit: &BinaryUnit) -> Result<LoadedType> {
        if !unit.verify() {
            return Err(KilnError::deserialization(
                &unit.name,
                "unit bytes do not match their digest",
            ));
        }
        let image = UnitImage::decode(&unit.bytes)
            .map_err(|e| KilnError::deserialization(&unit.name, e))?;
        debug!(unit = %unit.name, kind = image.kind_name(), "materializing type");

        let loaded = match image {
            UnitImage::Lexer(image) => LoadedType::Lexer(Arc::new(
                LexerType::from_image(image)
                    .map_err(|e| KilnError::deserialization(&unit.name, e))?,
            )),
            UnitImage::Context(image) => {
                LoadedType::Context(Arc::new(ContextType::from_image(image)))
            }
            UnitImage::Parser(image) => {
                let contexts = image
                    .productions
                    .iter()
                    .map(|p| self.context_type(&p.context))
                    .collect::<Result<Vec<_>>>()?;
                LoadedType::Parser(Arc::new(
                    ParserType::new(image, contexts)
                        .map_err(|e| KilnError::deserialization(&unit.name, e))?,
                ))
            }
        };
        Ok(loaded)
    }
}

fn wrong_kind(name: &str, expected: &str, found: &LoadedType) -> KilnError {
    KilnError::NoSuchType(format!(
        "{} (expected a {} type, found a {})",
        name,
        expected,
        found.kind_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kiln::artifact::{Artifact, ModuleKind, SourceModule};
    use crate::kiln::grammar::GrammarSpec;
    use crate::kiln::pipeline::CompilationPipeline;
    use crate::kiln::testing::EXPR_GRAMMAR;

    fn expr_store() -> Arc<ArtifactStore> {
        let parsed = GrammarSpec::from_source("Expr.g4", EXPR_GRAMMAR)
            .parse()
            .expect("parses");
        let (_, store) = CompilationPipeline::default()
            .compile(&[parsed])
            .expect("compiles");
        Arc::new(store)
    }

    #[test]
    fn test_types_are_materialized_once() {
        let mut loader = DynamicLoader::new(expr_store());
        let first = loader.resolve("ExprParser").expect("resolves");
        let second = loader.resolve("ExprParser").expect("resolves");
        assert!(first.ptr_eq(&second));

        // The parser pulled in its context type on the way
        let context = loader
            .context_type("ExprParser$ExprContext")
            .expect("context");
        let parser = loader.parser_type("ExprParser").expect("parser");
        assert!(Arc::ptr_eq(
            parser.context("expr").expect("registered context"),
            &context
        ));
    }

    #[test]
    fn test_normalized_names_share_identity() {
        let mut loader = DynamicLoader::new(expr_store());
        let direct = loader.resolve("ExprLexer").expect("resolves");
        let aliased = loader.resolve("ExprLexer.unit").expect("resolves");
        assert!(direct.ptr_eq(&aliased));
        assert_eq!(normalize_name("calc/sub\\Expr.unit"), "calc.sub.Expr");
    }

    #[test]
    fn test_missing_type() {
        let mut loader = DynamicLoader::new(expr_store());
        assert!(matches!(
            loader.resolve("NoSuchParser"),
            Err(KilnError::NoSuchType(name)) if name == "NoSuchParser"
        ));
        assert!(matches!(
            loader.parser_type("ExprLexer"),
            Err(KilnError::NoSuchType(_))
        ));
    }

    #[test]
    fn test_providers_are_consulted_last() {
        let store = expr_store();
        let mut donor = DynamicLoader::new(Arc::clone(&store));
        let lexer = donor.resolve("ExprLexer").expect("resolves");

        let mut loader = DynamicLoader::new(Arc::new(ArtifactStore::new()));
        loader.register_provider(Box::new(StaticTypes::new().with("Builtin", lexer.clone())));
        let provided = loader.resolve("Builtin").expect("provided");
        assert!(provided.ptr_eq(&lexer));
        assert!(loader.resolve("ExprLexer").is_err());
    }

    #[test]
    fn test_corrupt_unit_is_a_deserialization_error() {
        let mut store = ArtifactStore::new();
        store
            .insert(Artifact {
                module: SourceModule {
                    name: "Broken".into(),
                    kind: ModuleKind::Lexer,
                    grammar: "Broken".into(),
                    text: String::new(),
                },
                units: vec![BinaryUnit::new("Broken", vec![0xff; 3])],
            })
            .expect("insert");
        let mut loader = DynamicLoader::new(Arc::new(store));
        assert!(matches!(
            loader.resolve("Broken"),
            Err(KilnError::Deserialization { .. })
        ));
    }
}
