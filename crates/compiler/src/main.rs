//! Tealish compiler CLI
//!
//! Command-line interface for compiling .tl programs to TEAL.

use clap::{CommandFactory, Parser as ClapParser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use tracing::info;

use tealishc::{CompilerConfig, Compiler};

#[derive(ClapParser)]
#[command(name = "tealishc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tealish compiler - compile .tl programs to TEAL", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum MacroMode {
    /// Enable the macro when the program contains an inner_group
    Auto,
    On,
    Off,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .tl file to TEAL
    Build {
        /// Input .tl source file
        input: PathBuf,

        /// Output TEAL path (defaults to the input with a .teal extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write a <output>.map.json source map
        #[arg(long)]
        sourcemap: bool,

        /// Inner-transaction macro mode
        #[arg(long, value_enum, default_value_t = MacroMode::Auto)]
        inner_txn_macro: MacroMode,
    },

    /// Parse and check a .tl file without writing output
    Check {
        /// Input .tl source file
        input: PathBuf,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            sourcemap,
            inner_txn_macro,
        } => {
            let output = output.unwrap_or_else(|| input.with_extension("teal"));
            run_build(&input, &output, sourcemap, inner_txn_macro);
        }
        Commands::Check { input } => {
            run_check(&input);
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "tealishc", &mut io::stdout());
        }
    }
}

fn config_for(mode: MacroMode) -> CompilerConfig {
    CompilerConfig {
        inner_txn_macro: match mode {
            MacroMode::Auto => None,
            MacroMode::On => Some(true),
            MacroMode::Off => Some(false),
        },
    }
}

fn run_build(input: &Path, output: &Path, sourcemap: bool, mode: MacroMode) {
    let result = tealishc::compile_file(input, &config_for(mode));
    let compiled = match result {
        Ok(compiled) => compiled,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = std::fs::write(output, &compiled.teal) {
        eprintln!("Error: failed to write {}: {}", output.display(), e);
        process::exit(1);
    }
    info!(max_slot = compiled.max_slot, "compiled {}", input.display());

    if sourcemap {
        let map_path = PathBuf::from(format!("{}.map.json", output.display()));
        let json = match serde_json::to_string_pretty(&compiled.source_map) {
            Ok(json) => json,
            Err(e) => {
                eprintln!("Error: failed to serialize source map: {}", e);
                process::exit(1);
            }
        };
        if let Err(e) = std::fs::write(&map_path, json) {
            eprintln!("Error: failed to write {}: {}", map_path.display(), e);
            process::exit(1);
        }
        println!("Source map saved to {}", map_path.display());
    }

    println!("Compiled {} -> {}", input.display(), output.display());
}

fn run_check(input: &Path) {
    let source = match std::fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: failed to read {}: {}", input.display(), e);
            process::exit(1);
        }
    };
    let mut compiler = match Compiler::parse(&source, &CompilerConfig::default()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    if let Err(e) = compiler.process() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
    println!("{}: OK", input.display());
}
