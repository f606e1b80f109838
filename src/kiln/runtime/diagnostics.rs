//! Diagnostics reported while lexing and parsing

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Token recognition errors and mismatched input. These fail a parse.
    Syntax,
    /// More than one alternative matched the same input.
    Ambiguity,
    /// An alternative was only rejected after looking past its first token.
    ContextSensitivity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// 1-based
    pub line: usize,
    /// 0-based
    pub column: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn syntax(line: usize, column: usize, message: impl Into<String>) -> Self {
        Diagnostic {
            kind: DiagnosticKind::Syntax,
            line,
            column,
            message: message.into(),
        }
    }

    pub fn is_syntax(&self) -> bool {
        self.kind == DiagnosticKind::Syntax
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}:{} {}", self.line, self.column, self.message)
    }
}

/// Collects diagnostics for one parse. Informational kinds are dropped unless
/// reporting for them is enabled.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
    report_ambiguity: bool,
    report_context_sensitivity: bool,
}

impl DiagnosticCollector {
    /// A collector that only keeps syntax errors.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reporting(ambiguity: bool, context_sensitivity: bool) -> Self {
        DiagnosticCollector {
            diagnostics: Vec::new(),
            report_ambiguity: ambiguity,
            report_context_sensitivity: context_sensitivity,
        }
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        let keep = match diagnostic.kind {
            DiagnosticKind::Syntax => true,
            DiagnosticKind::Ambiguity => self.report_ambiguity,
            DiagnosticKind::ContextSensitivity => self.report_context_sensitivity,
        };
        if keep {
            self.diagnostics.push(diagnostic);
        }
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.report(diagnostic);
        }
    }

    pub fn reports(&self, kind: DiagnosticKind) -> bool {
        match kind {
            DiagnosticKind::Syntax => true,
            DiagnosticKind::Ambiguity => self.report_ambiguity,
            DiagnosticKind::ContextSensitivity => self.report_context_sensitivity,
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Drop everything reported after the first `len` diagnostics.
    pub fn truncate(&mut self, len: usize) {
        self.diagnostics.truncate(len);
    }

    pub fn has_syntax_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_syntax)
    }

    /// Rendered syntax errors, in report order.
    pub fn syntax_messages(&self) -> Vec<String> {
        self.diagnostics
            .iter()
            .filter(|d| d.is_syntax())
            .map(|d| d.to_string())
            .collect()
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}
