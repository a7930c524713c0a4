use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, info};

use crate::bytecode::BytecodeModule;
use crate::codegen::{GeneratorOptions, generate_code};
use crate::diagnostic::Diagnostic;
use crate::error::CoreError;
use crate::lexer::tokenize;
use crate::parser::parse;
use crate::symbols::Scope;
use crate::typecheck::{AnalyzerOptions, analyze_with};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Name used when reporting diagnostics.
    pub file_name: String,
    pub analyzer: AnalyzerOptions,
    pub generator: GeneratorOptions,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            file_name: "<input>".to_string(),
            analyzer: AnalyzerOptions::default(),
            generator: GeneratorOptions::default(),
        }
    }
}

#[derive(Debug)]
pub struct CompilationArtifact {
    pub module: BytecodeModule,
    /// Global symbols of the compiled program.
    pub globals: Scope,
    /// Non-fatal diagnostics (warnings).
    pub diagnostics: Vec<Diagnostic>,
}

/// Run the whole pipeline on `source`.
///
/// Lexical and semantic diagnostics of error severity stop the pipeline
/// before code generation and are returned in [`CoreError::Semantic`].
pub fn compile(source: &str, options: &CompilerOptions) -> Result<CompilationArtifact, CoreError> {
    info!(file = %options.file_name, bytes = source.len(), "compiling");
    let parsed = parse(source)?;
    let analysis = analyze_with(&parsed.ast, parsed.root, options.analyzer);

    let mut diagnostics = parsed.diagnostics;
    diagnostics.extend(analysis.diagnostics);
    if diagnostics.iter().any(Diagnostic::is_error) {
        debug!(count = diagnostics.len(), "stopping before code generation");
        return Err(CoreError::Semantic { diagnostics });
    }

    let module = generate_code(&parsed.ast, parsed.root, &analysis.globals, options.generator)?;
    Ok(CompilationArtifact {
        module,
        globals: analysis.globals,
        diagnostics,
    })
}

/// Read `path` and compile it.
pub fn compile_file(
    path: impl AsRef<Path>,
    options: &CompilerOptions,
) -> Result<CompilationArtifact, CoreError> {
    let source = std::fs::read_to_string(path.as_ref())?;
    compile(&source, options)
}

/// Parse and analyze without generating code.
///
/// Returns every lexical and semantic diagnostic; only a syntax error is
/// reported as `Err`.
pub fn check(source: &str, options: &CompilerOptions) -> Result<Vec<Diagnostic>, CoreError> {
    let parsed = parse(source)?;
    let analysis = analyze_with(&parsed.ast, parsed.root, options.analyzer);
    let mut diagnostics = parsed.diagnostics;
    diagnostics.extend(analysis.diagnostics);
    debug!(file = %options.file_name, count = diagnostics.len(), "checked");
    Ok(diagnostics)
}

/// What [`emit`] produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitFormat {
    /// Binary module image.
    Bytecode,
    /// Human-readable module listing.
    Listing,
    Tokens,
    Ast,
}

impl FromStr for EmitFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bytecode" => Ok(EmitFormat::Bytecode),
            "listing" => Ok(EmitFormat::Listing),
            "tokens" => Ok(EmitFormat::Tokens),
            "ast" => Ok(EmitFormat::Ast),
            other => Err(CoreError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Output of [`emit`] together with the diagnostics seen on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emitted {
    pub bytes: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn emit(
    source: &str,
    format: EmitFormat,
    options: &CompilerOptions,
) -> Result<Emitted, CoreError> {
    match format {
        EmitFormat::Bytecode | EmitFormat::Listing => {
            let artifact = compile(source, options)?;
            let bytes = match format {
                EmitFormat::Bytecode => artifact.module.encode(),
                _ => artifact.module.to_string().into_bytes(),
            };
            Ok(Emitted {
                bytes,
                diagnostics: artifact.diagnostics,
            })
        }
        EmitFormat::Tokens => {
            let lexed = tokenize(source);
            let mut out = String::new();
            for token in &lexed.tokens {
                let _ = writeln!(
                    out,
                    "{}:{} {} {:?}",
                    token.line, token.column, token.kind, token.text
                );
            }
            Ok(Emitted {
                bytes: out.into_bytes(),
                diagnostics: lexed.diagnostics,
            })
        }
        EmitFormat::Ast => {
            let parsed = parse(source)?;
            let mut out = parsed.ast.to_sexpr(parsed.root);
            out.push('\n');
            Ok(Emitted {
                bytes: out.into_bytes(),
                diagnostics: parsed.diagnostics,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{MAGIC, Opcode};
    use crate::diagnostic::codes;
    use crate::error::{CodegenError, ParseError, PoolKind};

    #[test]
    fn compiles_a_small_program() {
        let source = "
            function square(x: float): float { return x * x; }
            let q = quantum 2;
            let s = superposition { 1 : 0.5, 2 : 0.5 };
            print_float(square(3.0));
            quantum measure s;
        ";
        let artifact = compile(source, &CompilerOptions::default()).expect("compiles");
        assert!(artifact.diagnostics.is_empty());
        assert_eq!(
            artifact.module.instructions().last().map(|i| i.opcode),
            Some(Opcode::Halt)
        );
        assert!(artifact.globals.get("square").is_some_and(|s| s.is_function()));
    }

    #[test]
    fn semantic_errors_stop_before_codegen() {
        let err = compile("foo(1, 2); let a: int = true;", &CompilerOptions::default())
            .unwrap_err();
        let CoreError::Semantic { diagnostics } = err else {
            panic!("expected semantic error, got {err:?}");
        };
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn lexical_errors_stop_before_codegen() {
        let err = compile("let a = 1 @ ;", &CompilerOptions::default()).unwrap_err();
        let CoreError::Semantic { diagnostics } = err else {
            panic!("expected diagnostics, got {err:?}");
        };
        assert_eq!(diagnostics[0].code, Some(codes::UNKNOWN_CHARACTER));
    }

    #[test]
    fn syntax_errors_are_fatal() {
        let err = check("let = 3;", &CompilerOptions::default()).unwrap_err();
        assert!(matches!(err, CoreError::Parse(ParseError::UnexpectedToken { .. })));
    }

    #[test]
    fn check_collects_without_failing() {
        let diagnostics = check("x; y;", &CompilerOptions::default()).expect("parses");
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn options_reach_every_stage() {
        let mut options = CompilerOptions::default();
        options.analyzer.max_entanglement_depth = 0;
        let err = compile("1 ~ 2;", &options).unwrap_err();
        assert!(matches!(err, CoreError::Semantic { .. }));

        let mut options = CompilerOptions::default();
        options.generator.max_pool_entries = 1;
        let err = compile("let a = 1; let b = 2;", &options).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Codegen(CodegenError::PoolExhausted {
                pool: PoolKind::Instructions,
                ..
            })
        ));
    }

    #[test]
    fn emits_every_format() {
        let options = CompilerOptions::default();
        let image = emit("let a = 1;", EmitFormat::Bytecode, &options).expect("bytecode");
        assert_eq!(&image.bytes[..4], MAGIC);

        let listing = emit("let a = 1;", EmitFormat::Listing, &options).expect("listing");
        assert!(String::from_utf8_lossy(&listing.bytes).contains("DECLARE_VAR_INIT"));

        let tokens = emit("let a = 1;", EmitFormat::Tokens, &options).expect("tokens");
        let tokens = String::from_utf8(tokens.bytes).expect("utf8");
        assert!(tokens.starts_with("1:1 "));
        assert_eq!(tokens.lines().count(), 6);

        let ast = emit("let a = 1;", EmitFormat::Ast, &options).expect("ast");
        assert_eq!(String::from_utf8(ast.bytes).expect("utf8"), "(program (let a 1))\n");
    }

    #[test]
    fn rejects_unknown_format() {
        let err = "wasm".parse::<EmitFormat>().unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedFormat(name) if name == "wasm"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = compile_file("/definitely/not/here.q", &CompilerOptions::default()).unwrap_err();
        assert!(matches!(err, CoreError::SourceIo(_)));
    }
}
