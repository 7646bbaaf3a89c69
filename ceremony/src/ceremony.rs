//! Round state machine and the context that owns all ceremony state.
//!
//! # Advancement
//!
//! By default a round advances as soon as the inputs of its current phase are complete:
//! the last commitment moves it to [Phase::AwaitingShares] and the last share moves it
//! through [Phase::Finalizing] (where the public key is assembled) to [Phase::Completed].
//! With [Config::auto_advance] disabled, completeness is still tracked but transitions only
//! happen when [Ceremony::advance_round] is called.
//!
//! Completeness is always evaluated against the round's snapshot, never the live registry,
//! so participants registering mid-round neither complete nor block it.
//!
//! # Aborts
//!
//! A non-terminal round may be aborted explicitly or, if [Config::phase_timeout] is set,
//! by [Ceremony::expire] once it has spent too long in one phase. An assembly failure on
//! inputs the state machine accepted is an internal invariant breach: the round is aborted
//! rather than retried.

use crate::{
    assemble,
    event::Observers,
    journal::{self, Journal, Record, RoundRecord},
    Command, Commitment, Error, ErrorKind, Event, Identity, ParticipantRegistry, Phase, Response,
    Round, RoundId, Share,
};
use commonware_runtime::{Clock, Metrics, Storage};
use futures::channel::mpsc;
use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, SystemTime},
};
use tracing::{debug, error, info, warn};

/// Configuration for a [Ceremony].
#[derive(Clone, Debug)]
pub struct Config {
    /// Minimum number of registered participants required to start a round.
    pub min_participants: usize,

    /// Maximum number of participants the registry accepts (unbounded if `None`).
    pub max_participants: Option<usize>,

    /// Number of points every commitment must contain (the reconstruction threshold).
    pub threshold: u32,

    /// How long a round may stay in a single phase before it is aborted.
    pub phase_timeout: Option<Duration>,

    /// Whether rounds advance as soon as the inputs of a phase are complete.
    pub auto_advance: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_participants: 2,
            max_participants: None,
            threshold: 2,
            phase_timeout: None,
            auto_advance: true,
        }
    }
}

impl Config {
    /// Check that the configuration can produce a valid round.
    pub fn validate(&self) -> Result<(), Error> {
        if self.min_participants < 2 {
            return Err(Error::InvalidConfig("min_participants must be at least 2"));
        }
        if self.threshold == 0 {
            return Err(Error::InvalidConfig("threshold must be non-zero"));
        }
        if self.threshold as usize > self.min_participants {
            return Err(Error::InvalidConfig(
                "threshold exceeds min_participants",
            ));
        }
        if let Some(max) = self.max_participants {
            if max < self.min_participants {
                return Err(Error::InvalidConfig(
                    "max_participants is below min_participants",
                ));
            }
        }
        if self.phase_timeout == Some(Duration::ZERO) {
            return Err(Error::InvalidConfig("phase_timeout must be non-zero"));
        }
        Ok(())
    }
}

/// Log a rejected request at a level matching its severity.
fn rejected(err: Error) -> Error {
    match err.kind() {
        ErrorKind::Integrity => warn!(error = %err, "rejected"),
        ErrorKind::Assembly | ErrorKind::Infrastructure => error!(error = %err, "rejected"),
        ErrorKind::Precondition | ErrorKind::Capacity => debug!(error = %err, "rejected"),
    }
    err
}

/// Owner of the participant registry, the active round, and the history of terminal rounds.
pub struct Ceremony<E: Clock + Storage + Metrics> {
    context: E,
    config: Config,

    registry: ParticipantRegistry,
    active: Option<Round>,
    history: BTreeMap<RoundId, Arc<Round>>,
    next_round: RoundId,

    observers: Observers,
    journal: Option<Journal<E>>,
}

impl<E: Clock + Storage + Metrics> Ceremony<E> {
    /// Create an empty ceremony that keeps no journal.
    pub fn new(context: E, config: Config) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            context,
            registry: ParticipantRegistry::new(config.max_participants),
            config,
            active: None,
            history: BTreeMap::new(),
            next_round: 0,
            observers: Observers::default(),
            journal: None,
        })
    }

    /// Open the journal described by `journal`, rebuild the ceremony it records, and keep
    /// journaling registrations and terminal rounds to it.
    ///
    /// An empty (or absent) journal yields an empty ceremony. Round numbering continues after
    /// the highest recorded round.
    pub async fn restore(context: E, config: Config, journal: journal::Config) -> Result<Self, Error> {
        config.validate()?;
        let (journal, records) = Journal::init(context.with_label("journal"), journal).await?;
        let mut ceremony = Self::from_records(context, config, records)?;
        ceremony.journal = Some(journal);
        Ok(ceremony)
    }

    /// Rebuild a ceremony from journal records without journaling anything further.
    pub fn from_records(context: E, config: Config, records: Vec<Record>) -> Result<Self, Error> {
        let mut ceremony = Self::new(context, config)?;
        for record in records {
            match record {
                Record::Participant(participant) => {
                    ceremony
                        .registry
                        .register(participant.identity, participant.joined_at)?;
                }
                Record::Round(record) => {
                    let round = record.into_round()?;
                    let id = round.id();
                    if ceremony.history.contains_key(&id) {
                        return Err(journal::Error::DuplicateRound(id).into());
                    }
                    ceremony.next_round = ceremony.next_round.max(id + 1);
                    ceremony.history.insert(id, Arc::new(round));
                }
            }
        }
        info!(
            participants = ceremony.registry.count(),
            rounds = ceremony.history.len(),
            next_round = ceremony.next_round,
            "restored ceremony"
        );
        Ok(ceremony)
    }

    /// Close the journal (if any), syncing everything recorded so far.
    pub async fn close(self) -> Result<(), Error> {
        if let Some(journal) = self.journal {
            journal.close().await?;
        }
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn context(&self) -> &E {
        &self.context
    }

    pub fn registry(&self) -> &ParticipantRegistry {
        &self.registry
    }

    /// Receive every [Event] published from now on.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Event> {
        self.observers.subscribe()
    }

    /// Phase of the active round, or [Phase::Idle] if there is none.
    pub fn phase(&self) -> Phase {
        self.active
            .as_ref()
            .map(Round::phase)
            .unwrap_or(Phase::Idle)
    }

    /// Identifier of the active round, if any.
    pub fn active_round(&self) -> Option<RoundId> {
        self.active.as_ref().map(Round::id)
    }

    /// Terminal rounds, oldest first.
    pub fn rounds(&self) -> impl Iterator<Item = &Round> {
        self.history.values().map(|round| round.as_ref())
    }

    /// Registered identities, in registration order.
    pub fn get_participants(&self) -> Vec<Identity> {
        self.registry.list()
    }

    /// A copy of the given round.
    pub fn get_round(&self, id: RoundId) -> Result<Round, Error> {
        if let Some(round) = self.active.as_ref().filter(|round| round.id() == id) {
            return Ok(round.clone());
        }
        self.history
            .get(&id)
            .map(|round| round.as_ref().clone())
            .ok_or(Error::RoundNotFound(id))
    }

    /// Add a participant to the registry.
    ///
    /// The participant is eligible for every round started after this call.
    pub async fn register(&mut self, identity: Identity) -> Result<(), Error> {
        // Nothing is journaled for a registration that would be rejected
        self.registry.check(&identity).map_err(rejected)?;
        let joined_at = self.next_round;
        if let Some(journal) = self.journal.as_mut() {
            let record = Record::Participant(crate::Participant {
                identity,
                joined_at,
            });
            journal
                .append(record)
                .await
                .map_err(|err| rejected(err.into()))?;
        }
        self.registry.register(identity, joined_at)?;
        info!(%identity, joined_at, count = self.registry.count(), "registered participant");
        self.observers.publish(Event::ParticipantAdded(identity));
        Ok(())
    }

    /// Start a round over a snapshot of the registry.
    pub fn start_key_generation(&mut self) -> Result<RoundId, Error> {
        if let Some(active) = self.active_round() {
            return Err(rejected(Error::RoundAlreadyActive(active)));
        }
        let registered = self.registry.count();
        let required = self
            .config
            .min_participants
            .max(self.config.threshold as usize);
        if registered < required {
            return Err(rejected(Error::InsufficientParticipants {
                registered,
                required,
            }));
        }

        let id = self.next_round;
        self.next_round += 1;
        let participants = self.registry.list();
        info!(round = id, participants = participants.len(), "starting key generation");
        self.active = Some(Round::new(id, participants.clone(), self.context.current()));
        self.observers.publish(Event::RoundStarted {
            round: id,
            participants,
        });
        self.observers.publish(Event::PhaseChanged {
            round: id,
            phase: Phase::AwaitingCommitments,
        });
        Ok(id)
    }

    /// Submit a participant's commitment to the active round.
    pub async fn submit_commitment(
        &mut self,
        round: RoundId,
        identity: Identity,
        commitment: Commitment,
    ) -> Result<(), Error> {
        let threshold = self.config.threshold;
        let active = self.writable(round, Phase::AwaitingCommitments).map_err(rejected)?;
        if !active.is_participant(&identity) {
            return Err(rejected(Error::NotAParticipant(identity)));
        }
        if commitment.points() != threshold as usize {
            return Err(rejected(Error::InvalidCommitment("wrong number of points")));
        }
        active
            .record_commitment(identity, commitment)
            .map_err(rejected)?;
        debug!(round, %identity, received = active.commitments().len(), "accepted commitment");
        self.observers
            .publish(Event::CommitmentSubmitted { round, identity });
        if self.config.auto_advance {
            self.progress().await;
        }
        Ok(())
    }

    /// Submit a share from one participant of the active round to another.
    pub async fn submit_share(
        &mut self,
        round: RoundId,
        from: Identity,
        to: Identity,
        share: Share,
    ) -> Result<(), Error> {
        let active = self.writable(round, Phase::AwaitingShares).map_err(rejected)?;
        active.record_share(from, to, share).map_err(rejected)?;
        debug!(round, %from, %to, received = active.shares().len(), "accepted share");
        self.observers
            .publish(Event::ShareSubmitted { round, from, to });
        if self.config.auto_advance {
            self.progress().await;
        }
        Ok(())
    }

    /// Perform every transition of the given round whose inputs are complete.
    ///
    /// Returns the round's phase afterwards. When nothing is pending (for example, because
    /// the round already advanced on its own), this is a no-op.
    pub async fn advance_round(&mut self, round: RoundId) -> Result<Phase, Error> {
        if self.active_round() == Some(round) {
            return Ok(self.progress().await);
        }
        match self.history.get(&round) {
            Some(terminal) => Err(rejected(Error::WrongPhase {
                round,
                phase: terminal.phase(),
            })),
            None => Err(rejected(Error::RoundNotFound(round))),
        }
    }

    /// Abort the given round.
    ///
    /// Aborting an already aborted round succeeds without effect. A completed round cannot be
    /// aborted.
    pub async fn abort(&mut self, round: RoundId, reason: impl Into<String>) -> Result<(), Error> {
        let reason = reason.into();
        let now = self.context.current();
        match self.active.as_mut() {
            Some(active) if active.id() == round => {
                let from = active.phase();
                if !active.abort(reason.clone(), now) {
                    return Err(rejected(Error::AlreadyTerminal {
                        round,
                        phase: active.phase(),
                    }));
                }
                warn!(round, %from, %reason, "aborted round");
                self.observers.publish(Event::PhaseChanged {
                    round,
                    phase: Phase::Aborted,
                });
                self.observers
                    .publish(Event::RoundAborted { round, reason });
                self.retire().await;
                Ok(())
            }
            _ => match self.history.get(&round).map(|terminal| terminal.phase()) {
                Some(Phase::Aborted) => Ok(()),
                Some(phase) => Err(rejected(Error::AlreadyTerminal { round, phase })),
                None => Err(rejected(Error::RoundNotFound(round))),
            },
        }
    }

    /// When the active round will time out in its current phase, if ever.
    pub fn deadline(&self) -> Option<SystemTime> {
        let timeout = self.config.phase_timeout?;
        let started = self.active.as_ref()?.phase_started()?;
        Some(started + timeout)
    }

    /// Abort the active round if it has outlived its phase timeout.
    ///
    /// Returns the aborted round, if any.
    pub async fn expire(&mut self) -> Option<RoundId> {
        let deadline = self.deadline()?;
        if self.context.current() < deadline {
            return None;
        }
        let round = self.active_round()?;
        let reason = format!("timed out while {}", self.phase());
        self.abort(round, reason).await.ok()?;
        Some(round)
    }

    /// Apply a [Command].
    pub async fn execute(&mut self, command: Command) -> Result<Response, Error> {
        match command {
            Command::Register { identity } => self
                .register(identity)
                .await
                .map(|_| Response::Registered),
            Command::StartKeyGeneration => self.start_key_generation().map(Response::Started),
            Command::SubmitCommitment {
                round,
                identity,
                commitment,
            } => self
                .submit_commitment(round, identity, commitment)
                .await
                .map(|_| Response::Accepted),
            Command::SubmitShare {
                round,
                from,
                to,
                share,
            } => self
                .submit_share(round, from, to, share)
                .await
                .map(|_| Response::Accepted),
            Command::AdvanceRound { round } => {
                self.advance_round(round).await.map(Response::Advanced)
            }
            Command::Abort { round, reason } => {
                self.abort(round, reason).await.map(|_| Response::Aborted)
            }
            Command::GetParticipants => Ok(Response::Participants(self.get_participants())),
            Command::GetRound { round } => self
                .get_round(round)
                .map(|round| Response::Round(Box::new(round))),
        }
    }

    /// The active round, if it is `round` and in `phase`.
    fn writable(&mut self, round: RoundId, phase: Phase) -> Result<&mut Round, Error> {
        match self.active.as_mut() {
            Some(active) if active.id() == round => {
                if active.phase() != phase {
                    return Err(Error::WrongPhase {
                        round,
                        phase: active.phase(),
                    });
                }
                Ok(active)
            }
            _ => match self.history.get(&round) {
                Some(terminal) => Err(Error::AlreadyTerminal {
                    round,
                    phase: terminal.phase(),
                }),
                None => Err(Error::RoundNotFound(round)),
            },
        }
    }

    /// Advance the active round through every phase whose inputs are complete.
    async fn progress(&mut self) -> Phase {
        let now = self.context.current();
        let Some(active) = self.active.as_mut() else {
            return Phase::Idle;
        };
        let round = active.id();
        loop {
            let next = match active.phase() {
                Phase::AwaitingCommitments if active.commitments_complete() => {
                    Phase::AwaitingShares
                }
                Phase::AwaitingShares if active.shares_complete() => Phase::Finalizing,
                _ => break,
            };
            active.transition(next, now);
            info!(round, phase = %next, "advanced round");
            self.observers
                .publish(Event::PhaseChanged { round, phase: next });
        }
        if active.phase() == Phase::Finalizing {
            return self.finalize().await;
        }
        active.phase()
    }

    /// Assemble the public key of the active round and retire it.
    async fn finalize(&mut self) -> Phase {
        let now = self.context.current();
        let Some(active) = self.active.as_mut() else {
            return Phase::Idle;
        };
        let round = active.id();
        let assembled = assemble(
            active.members(),
            active.commitments().iter(),
            active.shares().keys(),
        );
        match assembled {
            Ok(public_key) => {
                active.complete(public_key, now);
                info!(round, %public_key, "generated key");
                self.observers.publish(Event::PhaseChanged {
                    round,
                    phase: Phase::Completed,
                });
                self.observers
                    .publish(Event::KeyGenerated { round, public_key });
            }
            Err(err) => {
                error!(round, error = %err, "assembly failed");
                let reason = format!("assembly failed: {err}");
                active.abort(reason.clone(), now);
                self.observers.publish(Event::PhaseChanged {
                    round,
                    phase: Phase::Aborted,
                });
                self.observers
                    .publish(Event::RoundAborted { round, reason });
            }
        }
        self.retire().await
    }

    /// Move the (terminal) active round into history and journal it.
    async fn retire(&mut self) -> Phase {
        let Some(round) = self.active.take() else {
            return Phase::Idle;
        };
        let phase = round.phase();
        if let Some(journal) = self.journal.as_mut() {
            if let Err(err) = journal
                .append(Record::Round(RoundRecord::from(&round)))
                .await
            {
                error!(round = round.id(), error = %err, "failed to journal round");
            }
        }
        self.history.insert(round.id(), Arc::new(round));
        phase
    }
}
