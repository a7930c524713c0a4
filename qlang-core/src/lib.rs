//! Core compiler pipeline for the QLang language.
//!
//! The pipeline is roughly:
//!
//!   source text
//!     -> lexer     (tokens + lexical diagnostics)
//!     -> parser    (arena AST)
//!     -> typecheck (scopes, types, semantic diagnostics)
//!     -> codegen   (bytecode module: instructions, constants, labels)
//!
//! The CLI and any other tooling should depend on this crate rather than
//! reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod span;
pub mod diagnostic;
pub mod error;

// ---------------------------------------------------------------------
// Front-end: lexing and parsing
// ---------------------------------------------------------------------

pub mod lexer;
pub mod ast;
pub mod parser;

// ---------------------------------------------------------------------
// Semantic layers: types, scopes, type checking
// ---------------------------------------------------------------------

pub mod types;
pub mod symbols;
pub mod builtins;
pub mod typecheck;

// ---------------------------------------------------------------------
// Back-end: bytecode and compiler orchestration
// ---------------------------------------------------------------------

pub mod bytecode;
pub mod codegen;
pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use bytecode::{BytecodeModule, Constant, ConstantType, Instruction, Opcode};
pub use codegen::{GeneratorOptions, generate_code};
pub use compiler::{
    CompilationArtifact, CompilerOptions, EmitFormat, Emitted, check, compile, compile_file, emit,
};
pub use diagnostic::{Diagnostic, Severity};
pub use error::{CodegenError, CoreError, ParseError};
pub use parser::{MAX_NESTING_DEPTH, ParseOutput, parse};
pub use typecheck::{Analysis, AnalyzerOptions, DEFAULT_MAX_ENTANGLEMENT_DEPTH, analyze, analyze_with};
