//! opC Compiler CLI
//!
//! Command-line interface for compiling a single opC translation unit to
//! Onramp VM assembly.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use std::process;

#[derive(ClapParser)]
#[command(name = "opcc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "opC compiler - compile opC source to Onramp VM assembly", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input opC source file (when no subcommand is given)
    input: Option<PathBuf>,

    /// Output assembly path (defaults to input filename with a .os extension)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completion scripts
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => run_completions(shell),
        None => {
            let Some(input) = cli.input else {
                eprintln!("Error: no input file given.");
                process::exit(2);
            };
            let output = cli
                .output
                .unwrap_or_else(|| input.with_extension("os"));
            run_compile(&input, &output);
        }
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

fn run_compile(input: &std::path::Path, output: &std::path::Path) {
    match opcc::compile_file(input, output) {
        Ok(()) => {
            tracing::info!(
                input = %input.display(),
                output = %output.display(),
                "compiled"
            );
        }
        Err(e) => {
            eprintln!("{}: {e}", input.display());
            process::exit(1);
        }
    }
}
