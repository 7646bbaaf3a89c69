#![doc = include_str!("../README.md")]

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

mod replay;
mod simulate;

/// Storage partition holding the ceremony journal.
const JOURNAL_PARTITION: &str = "ceremony";

/// DKG coordinator CLI.
#[derive(Parser)]
pub struct App {
    /// Args for the runtime configuration.
    #[command(flatten)]
    runtime_args: RuntimeArgs,

    /// The subcommand to run
    #[command(subcommand)]
    subcommand: Subcommands,
}

#[derive(Args)]
pub struct RuntimeArgs {
    /// The log level for traces. opts: (error, debug, info, warn, trace)
    #[arg(long, default_value_t = Level::INFO)]
    log_level: Level,

    /// The number of worker threads for the runtime to use
    #[arg(long, default_value_t = 3)]
    worker_threads: usize,
}

/// Subcommands for the coordinator.
#[derive(Subcommand)]
pub enum Subcommands {
    /// Run key generation rounds among simulated participants.
    Simulate(SimulateArgs),

    /// Summarize the rounds recorded in a journal.
    Replay(ReplayArgs),
}

/// Arguments for the `simulate` subcommand.
#[derive(Args)]
pub struct SimulateArgs {
    /// The number of simulated participants to register.
    #[arg(long, default_value_t = 4)]
    participants: usize,

    /// The minimum number of participants required to start a round.
    #[arg(long, default_value_t = 3)]
    min_participants: usize,

    /// The number of points in every commitment.
    #[arg(long, default_value_t = 2)]
    threshold: u32,

    /// The number of rounds to run.
    #[arg(long, default_value_t = 1)]
    rounds: u64,

    /// How long (in milliseconds) a round may stay in one phase.
    #[arg(long)]
    phase_timeout_ms: Option<u64>,

    /// Participants that never submit anything (forcing a timeout).
    #[arg(long, default_value_t = 0)]
    silent: usize,

    /// Seed for participant identities and submission order.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Directory holding the journal to restore from and append to (not journaled if unset).
    #[arg(long)]
    storage_dir: Option<PathBuf>,
}

/// Arguments for the `replay` subcommand.
#[derive(Args)]
pub struct ReplayArgs {
    /// Directory holding the journal to read.
    #[arg(long)]
    storage_dir: PathBuf,
}

fn main() {
    let app = App::parse();
    tracing_subscriber::fmt()
        .with_max_level(app.runtime_args.log_level)
        .with_line_number(true)
        .with_file(true)
        .init();

    match app.subcommand {
        Subcommands::Simulate(simulate_args) => simulate::run(app.runtime_args, simulate_args),
        Subcommands::Replay(replay_args) => replay::run(app.runtime_args, replay_args),
    }
}
