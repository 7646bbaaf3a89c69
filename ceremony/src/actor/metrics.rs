use crate::{Error, ErrorKind, Event};
use commonware_runtime::Metrics as RuntimeMetrics;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
};

/// Label for processed commands.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CommandLabel {
    /// Name of the command
    pub command: String,
    /// `ok` or the kind of error returned
    pub outcome: String,
}

impl CommandLabel {
    pub fn new<T>(command: &'static str, result: &Result<T, Error>) -> Self {
        let outcome = match result {
            Ok(_) => "ok",
            Err(err) => match err.kind() {
                ErrorKind::Precondition => "precondition",
                ErrorKind::Integrity => "integrity",
                ErrorKind::Capacity => "capacity",
                ErrorKind::Assembly => "assembly",
                ErrorKind::Infrastructure => "infrastructure",
            },
        };
        Self {
            command: command.to_string(),
            outcome: outcome.to_string(),
        }
    }
}

/// Metrics for the [Actor](super::Actor)
#[derive(Default)]
pub struct Metrics {
    /// Number of commands processed by outcome
    pub commands: Family<CommandLabel, Counter>,
    /// Number of rounds started
    pub rounds_started: Counter,
    /// Number of rounds that generated a key
    pub rounds_completed: Counter,
    /// Number of rounds aborted (for any reason)
    pub rounds_aborted: Counter,
    /// Number of rounds aborted by a phase timeout
    pub timeouts: Counter,
    /// Number of registered participants
    pub participants: Gauge,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given context.
    pub fn init<E: RuntimeMetrics>(context: E) -> Self {
        let metrics = Metrics::default();
        context.register(
            "commands",
            "Number of commands processed by outcome",
            metrics.commands.clone(),
        );
        context.register(
            "rounds_started",
            "Number of rounds started",
            metrics.rounds_started.clone(),
        );
        context.register(
            "rounds_completed",
            "Number of rounds that generated a key",
            metrics.rounds_completed.clone(),
        );
        context.register(
            "rounds_aborted",
            "Number of rounds aborted",
            metrics.rounds_aborted.clone(),
        );
        context.register(
            "timeouts",
            "Number of rounds aborted by a phase timeout",
            metrics.timeouts.clone(),
        );
        context.register(
            "participants",
            "Number of registered participants",
            metrics.participants.clone(),
        );
        metrics
    }

    /// Update counters from a published event.
    pub fn observe(&self, event: &Event) {
        match event {
            Event::ParticipantAdded(_) => {
                self.participants.inc();
            }
            Event::RoundStarted { .. } => {
                self.rounds_started.inc();
            }
            Event::KeyGenerated { .. } => {
                self.rounds_completed.inc();
            }
            Event::RoundAborted { .. } => {
                self.rounds_aborted.inc();
            }
            Event::PhaseChanged { .. }
            | Event::CommitmentSubmitted { .. }
            | Event::ShareSubmitted { .. } => {}
        }
    }
}
