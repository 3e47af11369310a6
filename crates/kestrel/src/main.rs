//! Kestrel CLI entry point: `kestrel run FILE` and `kestrel repl`
//! (spec.md §6's CLI surface), wired with `clap` and `tracing-subscriber`
//! the way `otter-cli::main` wires `otter-runtime`.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser)]
#[command(name = "kestrel", version, about = "Kestrel ECMAScript runtime")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a script file and exit 0 on success, 1 on uncaught error.
    Run {
        entry: PathBuf,

        /// Emit a tracing event per evaluator/JIT/GC decision at debug level.
        #[arg(long)]
        trace: bool,

        /// Like --trace, but newline-delimited JSON instead of text.
        #[arg(long)]
        json_trace: bool,
    },
    /// Interactive read-eval-print loop, tracking brace depth for
    /// multi-line input.
    Repl {
        #[arg(long)]
        trace: bool,

        #[arg(long)]
        json_trace: bool,
    },
}

fn init_tracing(trace: bool, json_trace: bool) {
    let filter = if trace || json_trace {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json_trace {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { entry, trace, json_trace } => {
            init_tracing(trace, json_trace);
            if let Err(err) = commands::run::run(&entry) {
                eprintln!("{err}");
                std::process::exit(1);
            }
        }
        Commands::Repl { trace, json_trace } => {
            init_tracing(trace, json_trace);
            commands::repl::run()?;
        }
    }

    Ok(())
}
