//! rxhub-baseband: inspect packet scripts before replaying them.
//!
//! Supports:
//! - Validating a script and summarising it per message id
//! - Dumping every message as JSON

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use rxhub_baseband::PacketScript;

#[derive(Parser)]
#[command(
    name = "rxhub-baseband",
    version,
    about = "Baseband packet script tools"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a script and print message counts per id
    Check {
        /// Path to a JSON-lines packet script
        script: PathBuf,
    },

    /// Print each message of a script as JSON
    Dump {
        /// Path to a JSON-lines packet script
        script: PathBuf,

        /// Include the delay before each message
        #[arg(long)]
        with_delay: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check { script } => cmd_check(script),
        Commands::Dump { script, with_delay } => cmd_dump(script, with_delay),
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

fn cmd_check(path: PathBuf) -> rxhub_baseband::Result<()> {
    let script = PacketScript::load(&path)?;

    eprintln!(
        "{}: {} messages over {:.1}s",
        path.display(),
        script.len(),
        script.duration_ms() as f64 / 1000.0
    );
    for (id, n) in script.counts() {
        println!("{:>3}  {:<20} {n}", id.as_u32(), id.to_string());
    }
    Ok(())
}

fn cmd_dump(path: PathBuf, with_delay: bool) -> rxhub_baseband::Result<()> {
    let script = PacketScript::load(&path)?;

    for record in script.records() {
        let json = serde_json::to_string(&record.message).unwrap_or_default();
        if with_delay {
            println!("+{}ms {json}", record.delay_ms);
        } else {
            println!("{json}");
        }
    }
    Ok(())
}
