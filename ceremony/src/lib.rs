//! Coordinate a Distributed Key Generation (DKG) ceremony among untrusted participants.
//!
//! A [Ceremony] owns a [ParticipantRegistry] and the history of key generation rounds run
//! against it. Each round snapshots the registry, collects one [Commitment] from every
//! snapshot member, then one [Share] for every ordered pair of distinct members, and finally
//! assembles the group [PublicKey] from the collected commitments.
//!
//! ```text
//!            start_key_generation
//!   Idle ───────────────────────────► AwaitingCommitments
//!                                            │ all commitments
//!                                            ▼
//!                                      AwaitingShares
//!                                            │ all N × (N - 1) shares
//!                                            ▼
//!                                       Finalizing ──► Completed
//!
//!   any non-terminal phase ──abort / timeout──► Aborted
//! ```
//!
//! # Concurrency
//!
//! A [Ceremony] is a plain single-writer state machine driven by a `commonware-runtime`
//! context (for time, storage, and metrics). To share one across concurrent callers, run it
//! inside an [actor::Actor] and interact with it through the cloneable [actor::Mailbox]:
//! every command (and any transition it triggers) is applied by a single task, so no caller
//! can observe a half-applied transition.
//!
//! # Status
//!
//! `dkg-ceremony` is **ALPHA** software. Commitments are Feldman commitments over
//! BLS12-381 G1, but shares are treated as opaque blobs and are never verified against them.

pub mod actor;
mod assembler;
pub use assembler::{assemble, PublicKey, PUBLIC_KEY_LENGTH};
mod ceremony;
pub use ceremony::{Ceremony, Config};
mod command;
pub use command::{Command, Response};
mod event;
pub use event::Event;
mod identity;
pub use identity::{Identity, IDENTITY_LENGTH};
pub mod journal;
pub mod mocks;
mod registry;
pub use registry::{Participant, ParticipantRegistry};
mod round;
pub use round::{
    Commitment, CommitmentStore, Phase, Round, RoundId, Share, ShareStore, POINT_LENGTH,
    SHARE_LENGTH,
};

use thiserror::Error;

/// Errors that can occur when interacting with a [Ceremony].
#[derive(Error, Debug)]
pub enum Error {
    #[error("participant already registered: {0}")]
    AlreadyRegistered(Identity),
    #[error("registry full: {registered} of {max} participants registered")]
    RegistryFull { registered: usize, max: usize },
    #[error("insufficient participants: {registered} registered, {required} required")]
    InsufficientParticipants { registered: usize, required: usize },
    #[error("round already active: {0}")]
    RoundAlreadyActive(RoundId),
    #[error("round not found: {0}")]
    RoundNotFound(RoundId),
    #[error("round {round} is {phase}")]
    WrongPhase { round: RoundId, phase: Phase },
    #[error("round {round} is already terminal ({phase})")]
    AlreadyTerminal { round: RoundId, phase: Phase },
    #[error("not a participant: {0}")]
    NotAParticipant(Identity),
    #[error("duplicate commitment: {0}")]
    DuplicateCommitment(Identity),
    #[error("duplicate share: {from} -> {to}")]
    DuplicateShare { from: Identity, to: Identity },
    #[error("self share forbidden: {0}")]
    SelfShareForbidden(Identity),
    #[error("invalid identity: {0:?}")]
    InvalidIdentity(String),
    #[error("invalid commitment: {0}")]
    InvalidCommitment(&'static str),
    #[error("invalid share length: {0}")]
    InvalidShare(usize),
    #[error("missing commitment: {0}")]
    MissingCommitment(Identity),
    #[error("incomplete shares: {missing} missing")]
    IncompleteShares { missing: usize },
    #[error("commitments cancel to the identity")]
    DegenerateKey,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("journal error: {0}")]
    Journal(#[from] journal::Error),
    #[error("ceremony closed")]
    Closed,
    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),
}

/// Classification of an [Error].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request is valid but arrived at the wrong time or for the wrong round.
    Precondition,
    /// The request misuses the protocol (duplicate or malformed data).
    Integrity,
    /// A participant count bound was violated.
    Capacity,
    /// Key assembly failed on inputs the state machine accepted.
    Assembly,
    /// Configuration, storage, or shutdown failure.
    Infrastructure,
}

impl Error {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::WrongPhase { .. }
            | Error::NotAParticipant(_)
            | Error::RoundNotFound(_)
            | Error::AlreadyTerminal { .. }
            | Error::RoundAlreadyActive(_) => ErrorKind::Precondition,
            Error::AlreadyRegistered(_)
            | Error::DuplicateCommitment(_)
            | Error::DuplicateShare { .. }
            | Error::SelfShareForbidden(_)
            | Error::InvalidIdentity(_)
            | Error::InvalidCommitment(_)
            | Error::InvalidShare(_)
            | Error::InvalidPublicKey => ErrorKind::Integrity,
            Error::RegistryFull { .. } | Error::InsufficientParticipants { .. } => {
                ErrorKind::Capacity
            }
            Error::MissingCommitment(_)
            | Error::IncompleteShares { .. }
            | Error::DegenerateKey => ErrorKind::Assembly,
            Error::InvalidConfig(_)
            | Error::Journal(_)
            | Error::Closed
            | Error::UnexpectedResponse(_) => ErrorKind::Infrastructure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks;
    use commonware_macros::test_traced;
    use commonware_runtime::{deterministic, Metrics, Runner};
    use std::collections::BTreeSet;

    fn config() -> Config {
        Config {
            min_participants: 3,
            ..Config::default()
        }
    }

    #[test_traced]
    fn test_end_to_end() {
        let executor = deterministic::Runner::default();
        executor.start(|context| async move {
            let mut ceremony = Ceremony::new(context.with_label("first"), config()).unwrap();
            let mut events = ceremony.subscribe();

            // Register A, B, C
            let [a, b, c] = [mocks::identity(0xA), mocks::identity(0xB), mocks::identity(0xC)];
            for identity in [a, b, c] {
                ceremony.register(identity).await.unwrap();
            }

            // Start key generation
            let round = ceremony.start_key_generation().unwrap();
            assert_eq!(ceremony.phase(), Phase::AwaitingCommitments);

            // Submit commitments
            let threshold = ceremony.config().threshold;
            for identity in [a, b, c] {
                let commitment = mocks::commitment(&identity, threshold);
                ceremony
                    .submit_commitment(round, identity, commitment)
                    .await
                    .unwrap();
            }
            assert_eq!(
                ceremony.get_round(round).unwrap().phase(),
                Phase::AwaitingShares
            );

            // Submit shares
            for (from, to) in [(a, b), (a, c), (b, a), (b, c), (c, a), (c, b)] {
                ceremony
                    .submit_share(round, from, to, mocks::share(&from, &to))
                    .await
                    .unwrap();
            }

            // Verify output
            let output = ceremony.get_round(round).unwrap();
            assert_eq!(output.phase(), Phase::Completed);
            let public_key = *output.public_key().unwrap();
            let participants: BTreeSet<_> = [a, b, c].into_iter().collect();
            let expected = assemble(
                &participants,
                output.commitments().iter(),
                output.shares().keys(),
            )
            .unwrap();
            assert_eq!(public_key, expected);
            assert_eq!(ceremony.phase(), Phase::Idle);

            // Verify the key is deterministic across ceremonies
            let mut other = Ceremony::new(context.with_label("second"), config()).unwrap();
            for identity in [c, a, b] {
                other.register(identity).await.unwrap();
            }
            let round = other.start_key_generation().unwrap();
            for identity in [b, c, a] {
                other
                    .submit_commitment(round, identity, mocks::commitment(&identity, threshold))
                    .await
                    .unwrap();
            }
            for (from, to) in [(c, b), (b, c), (a, c), (c, a), (b, a), (a, b)] {
                other
                    .submit_share(round, from, to, mocks::share(&from, &to))
                    .await
                    .unwrap();
            }
            assert_eq!(
                other.get_round(round).unwrap().public_key(),
                Some(&public_key)
            );

            // Verify notifications (3 registrations, start, phase, 3 commitments, phase,
            // 6 shares, finalizing, completed, key)
            let mut received = Vec::new();
            while let Ok(Some(event)) = events.try_next() {
                received.push(event);
            }
            assert_eq!(received.len(), 3 + 2 + 3 + 1 + 6 + 3);
            assert_eq!(received[0], Event::ParticipantAdded(a));
            assert_eq!(
                received.last(),
                Some(&Event::KeyGenerated { round, public_key })
            );
        });
    }

    #[test]
    fn test_error_kinds() {
        let identity = mocks::identity(1);
        assert_eq!(
            Error::AlreadyRegistered(identity).kind(),
            ErrorKind::Integrity
        );
        assert_eq!(
            Error::WrongPhase {
                round: 0,
                phase: Phase::AwaitingShares
            }
            .kind(),
            ErrorKind::Precondition
        );
        assert_eq!(
            Error::RegistryFull {
                registered: 2,
                max: 2
            }
            .kind(),
            ErrorKind::Capacity
        );
        assert_eq!(
            Error::IncompleteShares { missing: 1 }.kind(),
            ErrorKind::Assembly
        );
        assert_eq!(Error::DegenerateKey.kind(), ErrorKind::Assembly);
        assert_eq!(Error::Closed.kind(), ErrorKind::Infrastructure);
        assert_eq!(
            Error::UnexpectedResponse("register").kind(),
            ErrorKind::Infrastructure
        );
    }

    #[test]
    fn test_types_are_send() {
        fn assert_send<T: Send>() {}
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send::<Ceremony<deterministic::Context>>();
        assert_send_sync::<Error>();
        assert_send_sync::<Round>();
    }
}
