//! Summarize the rounds recorded in a journal.

use commonware_runtime::{tokio, Metrics, Runner};
use dkg_ceremony::{journal, Ceremony, Config, Phase};
use tracing::{error, info};

/// Print every recorded round.
pub fn run(runtime_args: super::RuntimeArgs, args: super::ReplayArgs) {
    let cfg = tokio::Config::default()
        .with_worker_threads(runtime_args.worker_threads)
        .with_storage_directory(args.storage_dir.clone());
    let executor = tokio::Runner::new(cfg);
    executor.start(|context| replay(context, args));
}

async fn replay(context: tokio::Context, args: super::ReplayArgs) {
    // Config only governs new rounds
    let ceremony = match Ceremony::restore(
        context.with_label("ceremony"),
        Config::default(),
        journal::Config::new(super::JOURNAL_PARTITION),
    )
    .await
    {
        Ok(ceremony) => ceremony,
        Err(err) => {
            error!(path = %args.storage_dir.display(), ?err, "failed to restore ceremony");
            return;
        }
    };
    info!(
        participants = ceremony.registry().count(),
        rounds = ceremony.rounds().count(),
        "replayed journal"
    );

    for participant in ceremony.registry().participants() {
        println!(
            "participant {} (joined at round {})",
            participant.identity, participant.joined_at
        );
    }
    for round in ceremony.rounds() {
        let elapsed = match (round.history().first(), round.history().last()) {
            (Some((_, started)), Some((_, ended))) => {
                ended.duration_since(*started).unwrap_or_default()
            }
            _ => Default::default(),
        };
        let outcome = match (round.phase(), round.public_key(), round.abort_reason()) {
            (Phase::Completed, Some(public_key), _) => public_key.to_string(),
            (_, _, Some(reason)) => format!("aborted ({reason})"),
            (phase, _, _) => phase.to_string(),
        };
        println!(
            "round {}: {} participants, {} commitments, {} shares, {:?}: {}",
            round.id(),
            round.participants().len(),
            round.commitments().len(),
            round.shares().len(),
            elapsed,
            outcome
        );
    }

    if let Err(err) = ceremony.close().await {
        error!(?err, "failed to close journal");
    }
}
