use thiserror::Error;

use crate::diagnostic::Diagnostic;
use crate::lexer::TokenKind;

/// A structural syntax error or a parser resource failure.
///
/// Parsing stops at the first of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected {found} at {line}:{column}, expected {expected}")]
    UnexpectedToken {
        found: TokenKind,
        expected: String,
        line: u32,
        column: u32,
    },
    #[error("invalid {kind} literal '{text}' at {line}:{column}")]
    InvalidLiteral {
        kind: TokenKind,
        text: String,
        line: u32,
        column: u32,
    },
    #[error("unknown type '{name}' at {line}:{column}")]
    InvalidType { name: String, line: u32, column: u32 },
    #[error("nesting deeper than {limit} levels at {line}:{column}")]
    NestingTooDeep { limit: usize, line: u32, column: u32 },
    #[error("out of memory while building {what}")]
    ResourceExhausted { what: &'static str },
}

/// Which of the three bytecode pools an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Instructions,
    Constants,
    Labels,
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolKind::Instructions => f.write_str("instruction"),
            PoolKind::Constants => f.write_str("constant"),
            PoolKind::Labels => f.write_str("label"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    #[error("{pool} pool exhausted (limit {limit} entries)")]
    PoolExhausted { pool: PoolKind, limit: usize },
    #[error("no lowering defined for {node} node")]
    UnsupportedNode { node: &'static str },
    #[error("no lowering defined for operator '{op}'")]
    UnsupportedOperator { op: &'static str },
    #[error("unresolved name '{name}' during code generation")]
    UnresolvedName { name: String },
    #[error("label {label} was never bound")]
    UnboundLabel { label: usize },
    #[error("label {label} does not exist")]
    UnknownLabel { label: usize },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source: {0}")]
    SourceIo(#[from] std::io::Error),
    #[error("unsupported emit format: {0}")]
    UnsupportedFormat(String),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("semantic analysis reported {} problem(s)", diagnostics.len())]
    Semantic { diagnostics: Vec<Diagnostic> },
    #[error("code generation failed: {0}")]
    Codegen(#[from] CodegenError),
}
