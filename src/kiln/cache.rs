//! Live lexer and parser instances
//!
//! Lexers are expensive to set up compared to re-priming them, so the cache keeps
//! one lexer per type name and resets it with each new input. Parsers are cheap and
//! carry per-parse state, so a fresh parser is built every time; only the resolved
//! parser type is remembered.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::debug;

use crate::kiln::error::Result;
use crate::kiln::loader::DynamicLoader;
use crate::kiln::runtime::{CharStream, Lexer, Parser, ParserType, TokenStream};

/// A lexer that is either owned by the cache or by the caller.
#[derive(Debug)]
pub enum LexerHandle<'a> {
    Cached(&'a mut Lexer),
    Owned(Lexer),
}

impl LexerHandle<'_> {
    pub fn is_cached(&self) -> bool {
        matches!(self, LexerHandle::Cached(_))
    }
}

impl Deref for LexerHandle<'_> {
    type Target = Lexer;

    fn deref(&self) -> &Lexer {
        match self {
            LexerHandle::Cached(lexer) => lexer,
            LexerHandle::Owned(lexer) => lexer,
        }
    }
}

impl DerefMut for LexerHandle<'_> {
    fn deref_mut(&mut self) -> &mut Lexer {
        match self {
            LexerHandle::Cached(lexer) => lexer,
            LexerHandle::Owned(lexer) => lexer,
        }
    }
}

#[derive(Debug, Default)]
pub struct InstanceCache {
    lexers: HashMap<String, Lexer>,
    parser_types: HashMap<String, Arc<ParserType>>,
}

impl InstanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A lexer of type `name` primed with `input`.
    ///
    /// With `cached`, an existing instance is reset and reused, and a new one is
    /// kept for next time. Without it, the caller gets a private instance.
    pub fn lexer(
        &mut self,
        loader: &mut DynamicLoader,
        name: &str,
        input: CharStream,
        cached: bool,
    ) -> Result<LexerHandle<'_>> {
        if !cached {
            let lexer_type = loader.lexer_type(name)?;
            return Ok(LexerHandle::Owned(lexer_type.instantiate(input)));
        }

        match self.lexers.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                debug!(lexer = name, "reusing cached lexer");
                let lexer = entry.into_mut();
                lexer.reset(input);
                Ok(LexerHandle::Cached(lexer))
            }
            Entry::Vacant(entry) => {
                let lexer_type = loader.lexer_type(name)?;
                Ok(LexerHandle::Cached(entry.insert(lexer_type.instantiate(input))))
            }
        }
    }

    /// The parser type registered under `name`.
    pub fn parser_type(
        &mut self,
        loader: &mut DynamicLoader,
        name: &str,
    ) -> Result<Arc<ParserType>> {
        if let Some(parser_type) = self.parser_types.get(name) {
            return Ok(Arc::clone(parser_type));
        }
        let parser_type = loader.parser_type(name)?;
        self.parser_types
            .insert(name.to_string(), Arc::clone(&parser_type));
        Ok(parser_type)
    }

    /// A fresh parser of type `name` bound to `tokens`.
    pub fn parser(
        &mut self,
        loader: &mut DynamicLoader,
        name: &str,
        tokens: TokenStream,
    ) -> Result<Parser> {
        Ok(self.parser_type(loader, name)?.instantiate(tokens))
    }

    /// Number of cached lexer instances.
    pub fn live_lexers(&self) -> usize {
        self.lexers.len()
    }

    pub fn clear(&mut self) {
        self.lexers.clear();
        self.parser_types.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kiln::grammar::GrammarSpec;
    use crate::kiln::pipeline::CompilationPipeline;
    use crate::kiln::runtime::CaseSensitivity;
    use crate::kiln::testing::EXPR_GRAMMAR;

    fn loader() -> DynamicLoader {
        let parsed = GrammarSpec::from_source("Expr.g4", EXPR_GRAMMAR)
            .parse()
            .expect("parses");
        let (_, store) = CompilationPipeline::default()
            .compile(&[parsed])
            .expect("compiles");
        DynamicLoader::new(Arc::new(store))
    }

    fn input(text: &str) -> CharStream {
        CharStream::new(text, CaseSensitivity::None)
    }

    fn texts(lexer: &mut Lexer) -> Vec<String> {
        lexer.all_tokens().into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn test_cached_lexer_is_reprimed() {
        let mut loader = loader();
        let mut cache = InstanceCache::new();

        let mut first = cache
            .lexer(&mut loader, "ExprLexer", input("1+2"), true)
            .expect("lexer");
        assert!(first.is_cached());
        assert_eq!(texts(&mut first), vec!["1", "+", "2", "<EOF>"]);

        let mut second = cache
            .lexer(&mut loader, "ExprLexer", input("7 - 8"), true)
            .expect("lexer");
        assert_eq!(texts(&mut second), vec!["7", "-", "8", "<EOF>"]);
        assert_eq!(cache.live_lexers(), 1);
    }

    #[test]
    fn test_uncached_lexers_are_private() {
        let mut loader = loader();
        let mut cache = InstanceCache::new();
        let handle = cache
            .lexer(&mut loader, "ExprLexer", input("1"), false)
            .expect("lexer");
        assert!(!handle.is_cached());
        drop(handle);
        assert_eq!(cache.live_lexers(), 0);
    }

    #[test]
    fn test_parsers_share_their_type() {
        let mut loader = loader();
        let mut cache = InstanceCache::new();
        let a = cache
            .parser(&mut loader, "ExprParser", TokenStream::new())
            .expect("parser");
        let b = cache
            .parser(&mut loader, "ExprParser", TokenStream::new())
            .expect("parser");
        assert!(Arc::ptr_eq(a.parser_type(), b.parser_type()));

        cache.clear();
        assert_eq!(cache.live_lexers(), 0);
        assert!(cache.parser_type(&mut loader, "ExprLexer").is_err());
    }
}
