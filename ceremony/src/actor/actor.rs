use super::{metrics, Config, Mailbox, Message};
use crate::{Ceremony, Event};
use commonware_macros::select;
use commonware_runtime::{Clock, Handle, Metrics, Spawner, Storage};
use futures::{
    channel::mpsc,
    future::{self, Either},
    StreamExt,
};
use tracing::{debug, trace, warn};

/// Single writer of a [Ceremony].
pub struct Actor<E: Clock + Spawner + Metrics + Storage> {
    context: E,
    ceremony: Ceremony<E>,

    mailbox: mpsc::Receiver<Message>,
    events: mpsc::UnboundedReceiver<Event>,

    metrics: metrics::Metrics,
}

impl<E: Clock + Spawner + Metrics + Storage> Actor<E> {
    /// Wrap `ceremony` in an actor, registering its metrics with `context`.
    ///
    /// Returns the actor and a mailbox for sending commands to it.
    pub fn new(context: E, mut ceremony: Ceremony<E>, cfg: Config) -> (Self, Mailbox) {
        let (sender, receiver) = mpsc::channel(cfg.mailbox_size);
        let metrics = metrics::Metrics::init(context.clone());
        metrics
            .participants
            .set(ceremony.registry().count() as i64);
        let events = ceremony.subscribe();
        (
            Self {
                context,
                ceremony,
                mailbox: receiver,
                events,
                metrics,
            },
            Mailbox::new(sender),
        )
    }

    /// Spawn the actor.
    ///
    /// The actor stops (returning the ceremony) once every [Mailbox] is dropped.
    pub fn start(mut self) -> Handle<Ceremony<E>> {
        self.context.spawn_ref()(self.run())
    }

    async fn run(mut self) -> Ceremony<E> {
        loop {
            // Sleep until the active round times out (if ever)
            let timeout = match self.ceremony.deadline() {
                Some(deadline) => Either::Left(self.context.sleep_until(deadline)),
                None => Either::Right(future::pending::<()>()),
            };

            select! {
                mail = self.mailbox.next() => {
                    let Some(message) = mail else {
                        debug!("mailbox closed");
                        break;
                    };
                    match message {
                        Message::Command { command, response } => {
                            let name = command.name();
                            trace!(command = name, "mailbox: command");
                            let result = self.ceremony.execute(command).await;
                            self.metrics
                                .commands
                                .get_or_create(&metrics::CommandLabel::new(name, &result))
                                .inc();
                            let _ = response.send(result);
                        }
                        Message::Subscribe { response } => {
                            trace!("mailbox: subscribe");
                            let _ = response.send(self.ceremony.subscribe());
                        }
                    }
                },
                _ = timeout => {
                    if let Some(round) = self.ceremony.expire().await {
                        warn!(round, "round timed out");
                        self.metrics.timeouts.inc();
                    }
                },
            }

            // Account for everything the last step published
            while let Ok(Some(event)) = self.events.try_next() {
                self.metrics.observe(&event);
            }
        }
        self.ceremony
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mocks, Config as CeremonyConfig, Error, Identity, Phase};
    use commonware_macros::test_traced;
    use commonware_runtime::{deterministic, Runner};
    use std::time::Duration;

    fn identities(n: u8) -> Vec<Identity> {
        (0..n).map(mocks::identity).collect()
    }

    fn setup(
        context: &deterministic::Context,
        config: CeremonyConfig,
    ) -> (Actor<deterministic::Context>, Mailbox) {
        let ceremony = Ceremony::new(context.with_label("ceremony"), config).unwrap();
        Actor::new(context.with_label("actor"), ceremony, Config::default())
    }

    #[test_traced]
    fn test_concurrent_submissions() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let (actor, mut mailbox) = setup(&context, CeremonyConfig::default());
            let handle = actor.start();

            let identities = identities(4);
            for identity in &identities {
                mailbox.register(*identity).await.unwrap();
            }
            let mut events = mailbox.subscribe().await.unwrap();
            let round = mailbox.start_key_generation().await.unwrap();
            let threshold = CeremonyConfig::default().threshold;

            // Every participant submits from its own task
            let mut tasks = Vec::new();
            for identity in identities.clone() {
                let mut mailbox = mailbox.clone();
                let others = identities.clone();
                tasks.push(context.with_label("participant").spawn(move |context| async move {
                    mailbox
                        .submit_commitment(round, identity, mocks::commitment(&identity, threshold))
                        .await
                        .unwrap();

                    // Wait for every commitment before sending shares
                    loop {
                        let current = mailbox.get_round(round).await.unwrap();
                        if current.phase() == Phase::AwaitingShares {
                            break;
                        }
                        context.sleep(Duration::from_millis(1)).await;
                    }
                    for to in others.into_iter().filter(|to| *to != identity) {
                        mailbox
                            .submit_share(round, identity, to, mocks::share(&identity, &to))
                            .await
                            .unwrap();
                    }
                }));
            }
            for task in tasks {
                task.await.unwrap();
            }

            let completed = mailbox.get_round(round).await.unwrap();
            assert_eq!(completed.phase(), Phase::Completed);
            let public_key = *completed.public_key().unwrap();

            // Exactly one key event
            let mut keys = 0;
            while let Ok(Some(event)) = events.try_next() {
                if let Event::KeyGenerated {
                    public_key: generated,
                    ..
                } = event
                {
                    assert_eq!(generated, public_key);
                    keys += 1;
                }
            }
            assert_eq!(keys, 1);

            // Late submissions are rejected
            let a = identities[0];
            assert!(matches!(
                mailbox
                    .submit_commitment(round, a, mocks::commitment(&a, threshold))
                    .await,
                Err(Error::AlreadyTerminal { .. })
            ));

            // Stop the actor
            drop(mailbox);
            let ceremony = handle.await.unwrap();
            assert_eq!(ceremony.rounds().count(), 1);

            let buffer = context.encode();
            assert!(buffer.contains("actor_rounds_started_total 1"));
            assert!(buffer.contains("actor_rounds_completed_total 1"));
            assert!(buffer.contains("actor_participants 4"));
            assert!(buffer.contains(
                "actor_commands_total{command=\"submit_commitment\",outcome=\"precondition\"} 1"
            ));
        });
    }

    #[test_traced]
    fn test_abort_races_completion() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let (actor, mut mailbox) = setup(&context, CeremonyConfig::default());
            actor.start();

            let identities = identities(2);
            let (a, b) = (identities[0], identities[1]);
            for identity in &identities {
                mailbox.register(*identity).await.unwrap();
            }
            let round = mailbox.start_key_generation().await.unwrap();
            for identity in &identities {
                mailbox
                    .submit_commitment(round, *identity, mocks::commitment(identity, 2))
                    .await
                    .unwrap();
            }
            mailbox
                .submit_share(round, a, b, mocks::share(&a, &b))
                .await
                .unwrap();

            // Race the last share against an abort
            let mut sharer = mailbox.clone();
            let share = context.with_label("sharer").spawn(move |_| async move {
                sharer
                    .submit_share(round, b, a, mocks::share(&b, &a))
                    .await
            });
            let mut aborter = mailbox.clone();
            let abort = context
                .with_label("aborter")
                .spawn(move |_| async move { aborter.abort(round, "operator request").await });
            let share = share.await.unwrap();
            let abort = abort.await.unwrap();

            // Exactly one wins
            let outcome = mailbox.get_round(round).await.unwrap();
            match outcome.phase() {
                Phase::Completed => {
                    assert!(share.is_ok());
                    assert!(matches!(abort, Err(Error::AlreadyTerminal { .. })));
                    assert!(outcome.public_key().is_some());
                }
                Phase::Aborted => {
                    assert!(abort.is_ok());
                    assert!(matches!(share, Err(Error::AlreadyTerminal { .. })));
                    assert!(outcome.public_key().is_none());
                }
                phase => panic!("unexpected phase: {phase}"),
            }
        });
    }

    #[test_traced]
    fn test_phase_timeout() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let config = CeremonyConfig {
                phase_timeout: Some(Duration::from_secs(30)),
                ..CeremonyConfig::default()
            };
            let (actor, mut mailbox) = setup(&context, config);
            actor.start();

            for identity in identities(2) {
                mailbox.register(identity).await.unwrap();
            }
            let mut events = mailbox.subscribe().await.unwrap();
            let started = context.current();
            let round = mailbox.start_key_generation().await.unwrap();

            // Nobody commits
            let mut aborted = None;
            while let Some(event) = events.next().await {
                if let Event::RoundAborted { round, reason } = event {
                    aborted = Some((round, reason));
                    break;
                }
            }
            assert_eq!(
                aborted,
                Some((round, "timed out while awaiting commitments".to_string()))
            );
            assert!(context.current() >= started + Duration::from_secs(30));
            let snapshot = mailbox.get_round(round).await.unwrap();
            assert_eq!(snapshot.phase(), Phase::Aborted);

            let buffer = context.encode();
            assert!(buffer.contains("actor_timeouts_total 1"));
            assert!(buffer.contains("actor_rounds_aborted_total 1"));
        });
    }

    #[test_traced]
    fn test_closed() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let (actor, mut mailbox) = setup(&context, CeremonyConfig::default());
            drop(actor);
            assert!(matches!(
                mailbox.register(mocks::identity(1)).await,
                Err(Error::Closed)
            ));
        });
    }
}
