//! Notifications published by a [Ceremony](crate::Ceremony).
//!
//! Events are published synchronously, exactly once, after the transition they describe
//! has been applied. Subscribers that have dropped their receiver are pruned on the next
//! publish.

use crate::{Identity, Phase, PublicKey, RoundId};
use futures::channel::mpsc;

/// A committed change to ceremony state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A participant joined the registry.
    ParticipantAdded(Identity),
    /// A round started over a snapshot of the registry.
    RoundStarted {
        round: RoundId,
        participants: Vec<Identity>,
    },
    /// A round entered a new phase.
    PhaseChanged { round: RoundId, phase: Phase },
    /// A participant's commitment was accepted.
    CommitmentSubmitted { round: RoundId, identity: Identity },
    /// A share was accepted.
    ShareSubmitted {
        round: RoundId,
        from: Identity,
        to: Identity,
    },
    /// A round produced its group public key.
    KeyGenerated {
        round: RoundId,
        public_key: PublicKey,
    },
    /// A round was aborted.
    RoundAborted { round: RoundId, reason: String },
}

/// Fan-out of [Event]s to subscribers.
#[derive(Default)]
pub(crate) struct Observers {
    subscribers: Vec<mpsc::UnboundedSender<Event>>,
}

impl Observers {
    pub(crate) fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Event> {
        let (sender, receiver) = mpsc::unbounded();
        self.subscribers.push(sender);
        receiver
    }

    pub(crate) fn publish(&mut self, event: Event) {
        self.subscribers
            .retain(|subscriber| subscriber.unbounded_send(event.clone()).is_ok());
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.subscribers.len()
    }
}
