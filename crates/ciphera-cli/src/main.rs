//! Ciphera CLI - ledger inspection and in-process cluster simulation.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod error;
mod output;

use commands::{list, simulate, verify};

#[derive(Parser)]
#[command(name = "ciphera")]
#[command(about = "Ciphera ledger inspection and revocation simulation CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List entries in a ledger file
    List {
        /// Path to ledger file
        ledger: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Only show entries of this event type
        #[arg(long = "type")]
        event_type: Option<String>,
        /// Stop after N entries (default: unlimited)
        #[arg(long)]
        max_entries: Option<u64>,
    },
    /// Verify the hash chain of a ledger file
    Verify {
        /// Path to ledger file
        ledger: String,
        /// Reject truncated files and exit with an error if the chain is broken
        #[arg(long)]
        strict: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run an in-process gateway and verifier nodes through issue, verify and revoke
    Simulate {
        /// Core configuration file (JSON, durations in milliseconds)
        #[arg(long)]
        config: Option<String>,
        /// Number of verifier nodes
        #[arg(long, default_value_t = 3)]
        nodes: usize,
        /// One-way network latency in milliseconds
        #[arg(long, default_value_t = 35)]
        latency_ms: u64,
        /// Lose every push sent to this node (repeatable)
        #[arg(long)]
        drop_pushes: Vec<String>,
        /// Write each node's ledger to DIR/<node>.ledger
        #[arg(long)]
        ledger_dir: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match cli.command {
        Commands::List {
            ledger,
            json,
            event_type,
            max_entries,
        } => list::run(ledger, json, event_type, max_entries),
        Commands::Verify {
            ledger,
            strict,
            json,
        } => verify::run(ledger, strict, json),
        Commands::Simulate {
            config,
            nodes,
            latency_ms,
            drop_pushes,
            ledger_dir,
            json,
        } => simulate::run(simulate::SimulateArgs {
            config,
            nodes,
            latency_ms,
            drop_pushes,
            ledger_dir,
            json,
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
