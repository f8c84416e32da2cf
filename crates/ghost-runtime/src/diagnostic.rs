//! Diagnostic system for compile errors
//!
//! All compile-time errors flow through the unified Diagnostic type so the
//! CLI can render them in human or JSON form.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity level of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    /// Fatal error that prevents compilation
    Error,
    /// Warning that doesn't prevent compilation
    Warning,
}

impl fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticLevel::Error => write!(f, "Error"),
            DiagnosticLevel::Warning => write!(f, "Warning"),
        }
    }
}

/// Where in the token stream a diagnostic points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticContext {
    /// At a specific token (carries its lexeme)
    Token(String),
    /// At end of input
    End,
    /// No token context (scan errors carry the message alone)
    None,
}

/// A diagnostic message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity level
    pub level: DiagnosticLevel,
    /// Main diagnostic message
    pub message: String,
    /// Line number (1-based)
    pub line: u32,
    /// Token context for the `at '...'` fragment
    pub context: DiagnosticContext,
}

impl Diagnostic {
    /// Create an error diagnostic at a token
    pub fn error_at(line: u32, lexeme: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            message: message.into(),
            line,
            context: DiagnosticContext::Token(lexeme.into()),
        }
    }

    /// Create an error diagnostic at end of input
    pub fn error_at_end(line: u32, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            message: message.into(),
            line,
            context: DiagnosticContext::End,
        }
    }

    /// Create an error diagnostic with no token context
    pub fn error(line: u32, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            message: message.into(),
            line,
            context: DiagnosticContext::None,
        }
    }

    /// Serialize to a single-line JSON object
    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] {}", self.line, self.level)?;
        match &self.context {
            DiagnosticContext::Token(lexeme) => write!(f, " at '{}'", lexeme)?,
            DiagnosticContext::End => write!(f, " at end")?,
            DiagnosticContext::None => {}
        }
        write!(f, ": {}", self.message)
    }
}
