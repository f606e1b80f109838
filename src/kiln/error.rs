//! Error taxonomy for the compile / load / parse workflow
//!
//! Every public operation returns [`Result`]. No error is retried internally; all of
//! them propagate synchronously to the immediate caller.

use std::path::Path;

use thiserror::Error;

use crate::kiln::compiler::CompilationDiagnostics;
use crate::kiln::runtime::diagnostics::Diagnostic;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, KilnError>;

/// Errors raised by the compiled-parser lifecycle.
#[derive(Debug, Error)]
pub enum KilnError {
    /// Malformed or missing grammar inputs, or an import cycle. Fatal at construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// `compile` was called on an instance whose pipeline already ran.
    #[error("grammar set has already been compiled by this instance")]
    RedundantCompilation,

    /// The generator or the compiler reported diagnostics.
    #[error("compilation failed:\n{diagnostics}")]
    Compilation { diagnostics: CompilationDiagnostics },

    /// An operation was attempted in a state that does not allow it.
    #[error("illegal workflow: {0}")]
    IllegalWorkflow(String),

    /// A unit name could not be resolved by the loader.
    #[error("no such produced type: {0}")]
    NoSuchType(String),

    /// The requested entry production is not declared by the parser.
    #[error("unknown production '{name}' (known productions: {known})")]
    UnknownProduction { name: String, known: String },

    /// A validated production had no callable in the production table.
    #[error("production '{0}' could not be dispatched")]
    Dispatch(String),

    /// The input text has syntax errors.
    #[error("parsing failed:\n{messages}")]
    Parsing {
        messages: String,
        diagnostics: Vec<Diagnostic>,
    },

    /// A snapshot could not be written.
    #[error("failed to store snapshot at {location}: {message}")]
    Serialization { location: String, message: String },

    /// A snapshot (or a unit inside it) could not be read back.
    #[error("failed to load snapshot from {location}: {message}")]
    Deserialization { location: String, message: String },
}

impl KilnError {
    /// Whether the caller can reasonably retry with different input on the same instance.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, KilnError::Parsing { .. })
    }

    pub(crate) fn config_io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        KilnError::Configuration(format!(
            "cannot read {}: {}",
            path.as_ref().display(),
            source
        ))
    }

    pub(crate) fn serialization(location: impl AsRef<Path>, message: impl ToString) -> Self {
        KilnError::Serialization {
            location: location.as_ref().display().to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn deserialization(location: impl AsRef<Path>, message: impl ToString) -> Self {
        KilnError::Deserialization {
            location: location.as_ref().display().to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn compilation(diagnostics: CompilationDiagnostics) -> Self {
        KilnError::Compilation { diagnostics }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_parsing_errors_are_recoverable() {
        let parsing = KilnError::Parsing {
            messages: "line 1:2 mismatched input '<EOF>' expecting NUM".into(),
            diagnostics: vec![],
        };
        assert!(parsing.is_recoverable());
        assert!(!KilnError::RedundantCompilation.is_recoverable());
        assert!(!KilnError::IllegalWorkflow("fresh".into()).is_recoverable());
    }

    #[test]
    fn test_display_carries_context() {
        let err = KilnError::UnknownProduction {
            name: "stmt".into(),
            known: "expr, term".into(),
        };
        let text = err.to_string();
        assert!(text.contains("stmt"));
        assert!(text.contains("expr, term"));

        let err = KilnError::deserialization("/tmp/x.kiln", "snapshot is empty");
        assert!(err.to_string().contains("/tmp/x.kiln"));
        assert!(err.to_string().contains("snapshot is empty"));
    }
}
