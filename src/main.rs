//! tg - task dependency graph CLI
//!
//! Reads a YAML task backlog, validates its dependency graph and picks the
//! next task to work on.

use clap::Parser;
use taskgraph::cli::Cli;
use taskgraph::output::{infer_command_name_from_args, OutputOptions, Printer};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(verbose: bool) {
    // RUST_LOG wins; ignore invalid or huge filters rather than failing startup.
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| {
            let raw = raw.trim();
            if raw.is_empty() || raw.len() > 4096 {
                return None;
            }
            EnvFilter::try_new(raw).ok()
        })
        .unwrap_or_else(|| EnvFilter::new(if verbose { "taskgraph=debug" } else { "off" }));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() {
    let command = infer_command_name_from_args();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let printer = Printer::new(
        command,
        OutputOptions {
            json: cli.json,
            quiet: false,
        },
    );
    if let Err(err) = cli.run() {
        let _ = printer.failure(&err);
        std::process::exit(err.exit_code());
    }
}
