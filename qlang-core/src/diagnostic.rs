//! Advisory diagnostics produced by the lexer and the semantic analyzer.
//!
//! Diagnostics never stop a pass; they are collected and handed to the
//! driver, which decides whether code generation may proceed.

use std::fmt;

use crate::span::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// A single human-readable message anchored at a source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<&'static str>,
    pub message: String,
    pub position: Position,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, position: Position) -> Self {
        Diagnostic {
            severity: Severity::Error,
            code: None,
            message: message.into(),
            position,
        }
    }

    pub fn warning(message: impl Into<String>, position: Position) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            code: None,
            message: message.into(),
            position,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(
                f,
                "{}[{}] at {}: {}",
                self.severity, code, self.position, self.message
            ),
            None => write!(f, "{} at {}: {}", self.severity, self.position, self.message),
        }
    }
}

/// Diagnostic codes shared by the passes.
pub mod codes {
    pub const UNKNOWN_CHARACTER: &str = "L0001";
    pub const UNTERMINATED_STRING: &str = "L0002";

    pub const UNDEFINED_NAME: &str = "S0001";
    pub const DUPLICATE_DECLARATION: &str = "S0002";
    pub const TYPE_MISMATCH: &str = "S0003";
    pub const ARITY_MISMATCH: &str = "S0004";
    pub const INVALID_OPERAND: &str = "S0005";
    pub const ENTANGLEMENT_TOO_DEEP: &str = "S0006";
    pub const RETURN_OUTSIDE_FUNCTION: &str = "S0007";
    pub const NOT_A_FUNCTION: &str = "S0008";
    pub const UNSUPPORTED_OPERATOR: &str = "S0009";
    pub const MISSING_TYPE: &str = "S0010";
}
