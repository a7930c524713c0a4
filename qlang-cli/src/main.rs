use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use qlang_core::{
    CompilerOptions, CoreError, DEFAULT_MAX_ENTANGLEMENT_DEPTH, Diagnostic, EmitFormat, check, emit,
};
use tracing::Level;

/// Compile QLang source into bytecode.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source file; standard input when omitted.
    #[arg(short, long)]
    input: Option<String>,

    #[arg(short, long, required_unless_present = "check")]
    output: Option<String>,

    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "bytecode",
        help = "Output format: bytecode, listing, tokens, ast"
    )]
    emit: String,

    #[arg(long, help = "Only report diagnostics, write no output")]
    check: bool,

    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_ENTANGLEMENT_DEPTH)]
    max_entanglement_depth: usize,

    #[arg(long, value_name = "N", help = "Limit on entries per bytecode pool")]
    max_pool_entries: Option<usize>,

    #[arg(short, long, help = "Log pipeline stages to stderr")]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
    execute(cli)
}

fn execute(cli: Cli) -> Result<()> {
    let (file_name, source) = match &cli.input {
        Some(path) => (
            path.clone(),
            fs::read_to_string(path).with_context(|| format!("failed to read input file {path}"))?,
        ),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read standard input")?;
            ("<stdin>".to_string(), buffer)
        }
    };

    let mut options = CompilerOptions {
        file_name,
        ..CompilerOptions::default()
    };
    options.analyzer.max_entanglement_depth = cli.max_entanglement_depth;
    if let Some(limit) = cli.max_pool_entries {
        options.generator.max_pool_entries = limit;
    }

    if cli.check {
        let diagnostics = check(&source, &options)?;
        report(&options.file_name, &diagnostics);
        let errors = diagnostics.iter().filter(|d| d.is_error()).count();
        if errors > 0 {
            anyhow::bail!("{}: {errors} error(s) found", options.file_name);
        }
        return Ok(());
    }

    let format: EmitFormat = cli.emit.parse()?;
    let emitted = match emit(&source, format, &options) {
        Ok(emitted) => emitted,
        Err(CoreError::Semantic { diagnostics }) => {
            report(&options.file_name, &diagnostics);
            anyhow::bail!(
                "{}: compilation failed with {} error(s)",
                options.file_name,
                diagnostics.len()
            );
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to compile {}", options.file_name));
        }
    };
    report(&options.file_name, &emitted.diagnostics);

    if let Some(output) = &cli.output {
        write_output(output, &emitted.bytes)?;
    }
    Ok(())
}

fn report(file_name: &str, diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        eprintln!("{file_name}: {diagnostic}");
    }
}

fn write_output(path: &str, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = PathBuf::from(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {parent:?}"))?;
        }
    }
    fs::write(path, bytes).with_context(|| format!("failed to write output file {path}"))?;
    Ok(())
}
