//! Run key generation rounds among simulated participants.

use commonware_runtime::{tokio, Metrics, Runner};
use dkg_ceremony::{
    actor::{self, Actor},
    journal, mocks, Ceremony, Config, Error, Event, Identity,
};
use futures::{future::join_all, StreamExt};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use std::{collections::BTreeSet, time::Duration};
use tracing::{debug, error, info, warn};

const MAILBOX_SIZE: usize = 1024;

/// Run the simulation.
pub fn run(runtime_args: super::RuntimeArgs, args: super::SimulateArgs) {
    let mut cfg = tokio::Config::default().with_worker_threads(runtime_args.worker_threads);
    if let Some(storage_dir) = &args.storage_dir {
        cfg = cfg.with_storage_directory(storage_dir.clone());
    }
    let executor = tokio::Runner::new(cfg);
    executor.start(|context| simulate(context, args));
}

async fn simulate(context: tokio::Context, args: super::SimulateArgs) {
    if args.silent > 0 && args.phase_timeout_ms.is_none() {
        error!("silent participants require a phase timeout");
        return;
    }
    let config = Config {
        min_participants: args.min_participants,
        max_participants: None,
        threshold: args.threshold,
        phase_timeout: args.phase_timeout_ms.map(Duration::from_millis),
        auto_advance: true,
    };

    // Load the ceremony (journaled only when a storage directory is given)
    let ceremony = match &args.storage_dir {
        Some(_) => {
            Ceremony::restore(
                context.with_label("ceremony"),
                config,
                journal::Config::new(super::JOURNAL_PARTITION),
            )
            .await
        }
        None => Ceremony::new(context.with_label("ceremony"), config),
    };
    let ceremony = match ceremony {
        Ok(ceremony) => ceremony,
        Err(err) => {
            error!(?err, "failed to load ceremony");
            return;
        }
    };
    let (actor, mut mailbox) = Actor::new(
        context.with_label("actor"),
        ceremony,
        actor::Config {
            mailbox_size: MAILBOX_SIZE,
        },
    );
    let handle = actor.start();
    let mut events = match mailbox.subscribe().await {
        Ok(events) => events,
        Err(err) => {
            error!(?err, "failed to subscribe");
            return;
        }
    };

    // Register participants (rerunning a seed against a journal registers nobody new)
    let mut rng = StdRng::seed_from_u64(args.seed);
    let identities: Vec<Identity> = (0..args.participants)
        .map(|_| Identity::new(rng.gen()))
        .collect();
    for identity in &identities {
        match mailbox.register(*identity).await {
            Ok(()) => {}
            Err(Error::AlreadyRegistered(_)) => debug!(%identity, "already registered"),
            Err(err) => {
                error!(%identity, ?err, "failed to register participant");
                return;
            }
        }
    }
    let silent: BTreeSet<Identity> = identities.iter().take(args.silent).copied().collect();

    for _ in 0..args.rounds {
        let round = match mailbox.start_key_generation().await {
            Ok(round) => round,
            Err(err) => {
                error!(?err, "failed to start round");
                break;
            }
        };
        let snapshot = match mailbox.get_round(round).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(round, ?err, "failed to fetch round");
                break;
            }
        };
        let mut active: Vec<Identity> = snapshot
            .participants()
            .iter()
            .filter(|identity| !silent.contains(*identity))
            .copied()
            .collect();

        // Submit commitments in a random order
        active.shuffle(&mut rng);
        let submissions = active.iter().map(|identity| {
            let mut mailbox = mailbox.clone();
            let commitment = mocks::commitment(identity, args.threshold);
            let identity = *identity;
            async move {
                if let Err(err) = mailbox.submit_commitment(round, identity, commitment).await {
                    warn!(round, %identity, ?err, "commitment rejected");
                }
            }
        });
        join_all(submissions).await;

        // Submit shares in a random order
        let mut pairs: Vec<(Identity, Identity)> = active
            .iter()
            .flat_map(|from| {
                snapshot
                    .participants()
                    .iter()
                    .filter(move |to| *to != from)
                    .map(move |to| (*from, *to))
            })
            .collect();
        pairs.shuffle(&mut rng);
        let submissions = pairs.into_iter().map(|(from, to)| {
            let mut mailbox = mailbox.clone();
            async move {
                let share = mocks::share(&from, &to);
                if let Err(err) = mailbox.submit_share(round, from, to, share).await {
                    warn!(round, %from, %to, ?err, "share rejected");
                }
            }
        });
        join_all(submissions).await;

        // Wait for the round to end
        while let Some(event) = events.next().await {
            match event {
                Event::KeyGenerated {
                    round: generated,
                    public_key,
                } if generated == round => {
                    info!(round, %public_key, "round completed");
                    println!("round {round}: {public_key}");
                    break;
                }
                Event::RoundAborted {
                    round: aborted,
                    reason,
                } if aborted == round => {
                    info!(round, %reason, "round aborted");
                    println!("round {round}: aborted ({reason})");
                    break;
                }
                _ => {}
            }
        }
    }

    // Stop the actor and report
    drop(mailbox);
    let ceremony = match handle.await {
        Ok(ceremony) => ceremony,
        Err(err) => {
            error!(?err, "actor failed");
            return;
        }
    };
    if let Err(err) = ceremony.close().await {
        error!(?err, "failed to close journal");
    }
    print!("{}", context.encode());
}
