use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use sable_core::{CoreError, standard};
use tracing_subscriber::EnvFilter;

/// コマンドライン引数を定義するための構造体
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source file; read from stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    #[arg(long, value_enum, value_name = "FORMAT", default_value_t = Emit::Run)]
    emit: Emit,

    /// Where `--emit bytecode` writes the listing (stdout by default)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Raise the log level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// Compile and execute the program
    Run,
    /// Print the bytecode listing
    Bytecode,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    execute(cli)
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn execute(cli: Cli) -> Result<ExitCode> {
    let source = match &cli.input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read input file {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            buffer
        }
    };

    tracing::debug!(emit = ?cli.emit, bytes = source.len(), "source loaded");
    let compiler = standard().context("failed to configure the standard language")?;
    let program = match compiler.compile(&source) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("Compilation Error: {err}");
            return Ok(ExitCode::FAILURE);
        }
    };

    match cli.emit {
        Emit::Run => {
            let stdout = io::stdout();
            sable_core::vm::run(&program, stdout.lock())
                .map_err(CoreError::from)
                .context("program aborted")?;
        }
        Emit::Bytecode => {
            let listing = program.to_string();
            match &cli.output {
                Some(path) => write_output(path, listing.as_bytes())?,
                None => io::stdout()
                    .write_all(listing.as_bytes())
                    .context("failed to write listing")?,
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    fs::write(path, bytes)
        .with_context(|| format!("failed to write output file {}", path.display()))?;
    Ok(())
}
