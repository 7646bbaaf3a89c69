//! A single key generation round and the stores it owns.

use crate::{
    assembler::{assemble, PublicKey},
    journal, Error, Identity,
};
use bytes::{Buf, BufMut};
use commonware_codec::{Error as CodecError, FixedSize, Read, ReadExt, Write};
use std::{collections::BTreeSet, fmt, time::SystemTime};

mod commitments;
pub use commitments::{Commitment, CommitmentStore, POINT_LENGTH};
mod shares;
pub use shares::{Share, ShareStore, SHARE_LENGTH};

/// Monotonic identifier of a round. The first round is `0`.
pub type RoundId = u64;

/// Phase of a round (or of the ceremony, when no round is active).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// No round is active.
    Idle,
    /// Waiting for one commitment from every snapshot member.
    AwaitingCommitments,
    /// Waiting for one share from every member to every other member.
    AwaitingShares,
    /// All inputs collected, assembling the public key.
    Finalizing,
    /// The public key was generated.
    Completed,
    /// The round was abandoned.
    Aborted,
}

impl Phase {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Aborted)
    }

    fn rank(&self) -> u8 {
        match self {
            Phase::Idle => 0,
            Phase::AwaitingCommitments => 1,
            Phase::AwaitingShares => 2,
            Phase::Finalizing => 3,
            Phase::Completed | Phase::Aborted => 4,
        }
    }

    /// Whether a round may move from `self` to `next`.
    pub fn can_transition(&self, next: Phase) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl Write for Phase {
    fn write(&self, buf: &mut impl BufMut) {
        let tag: u8 = match self {
            Phase::Idle => 0,
            Phase::AwaitingCommitments => 1,
            Phase::AwaitingShares => 2,
            Phase::Finalizing => 3,
            Phase::Completed => 4,
            Phase::Aborted => 5,
        };
        tag.write(buf);
    }
}

impl Read for Phase {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        match u8::read(buf)? {
            0 => Ok(Phase::Idle),
            1 => Ok(Phase::AwaitingCommitments),
            2 => Ok(Phase::AwaitingShares),
            3 => Ok(Phase::Finalizing),
            4 => Ok(Phase::Completed),
            5 => Ok(Phase::Aborted),
            tag => Err(CodecError::InvalidEnum(tag)),
        }
    }
}

impl FixedSize for Phase {
    const SIZE: usize = u8::SIZE;
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::AwaitingCommitments => "awaiting commitments",
            Phase::AwaitingShares => "awaiting shares",
            Phase::Finalizing => "finalizing",
            Phase::Completed => "completed",
            Phase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// One execution of the ceremony, from registry snapshot to public key (or abort).
///
/// Rounds handed out by a [Ceremony](crate::Ceremony) are copies: mutating them has no effect
/// on the ceremony.
#[derive(Clone, Debug)]
pub struct Round {
    id: RoundId,
    phase: Phase,
    history: Vec<(Phase, SystemTime)>,

    participants: Vec<Identity>,
    members: BTreeSet<Identity>,

    commitments: CommitmentStore,
    shares: ShareStore,

    public_key: Option<PublicKey>,
    abort_reason: Option<String>,
}

impl Round {
    /// Create a round over a snapshot of participants (in registration order).
    pub(crate) fn new(id: RoundId, participants: Vec<Identity>, now: SystemTime) -> Self {
        let members = participants.iter().copied().collect();
        Self {
            id,
            phase: Phase::AwaitingCommitments,
            history: vec![(Phase::AwaitingCommitments, now)],
            participants,
            members,
            commitments: CommitmentStore::default(),
            shares: ShareStore::default(),
            public_key: None,
            abort_reason: None,
        }
    }

    /// Rebuild a terminal round from its recorded parts.
    ///
    /// Every commitment and share is re-validated against the snapshot, and the outcome
    /// is checked against the inputs: a completed round must hold every share and the
    /// key they assemble to, an aborted round must hold a reason and no key.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        id: RoundId,
        phase: Phase,
        history: Vec<(Phase, SystemTime)>,
        participants: Vec<Identity>,
        commitments: Vec<(Identity, Commitment)>,
        shares: Vec<(Identity, Identity, Share)>,
        public_key: Option<PublicKey>,
        abort_reason: Option<String>,
    ) -> Result<Self, Error> {
        let invalid = |reason| journal::Error::InvalidRound { round: id, reason };
        if !phase.is_terminal() {
            return Err(journal::Error::NonTerminalRound(id).into());
        }
        let Some((first, started)) = history.first().copied() else {
            return Err(invalid("empty history").into());
        };
        if first != Phase::AwaitingCommitments {
            return Err(invalid("history does not start awaiting commitments").into());
        }
        if history.last().map(|(last, _)| *last) != Some(phase) {
            return Err(invalid("history does not end in the recorded phase").into());
        }
        if history
            .windows(2)
            .any(|pair| !pair[0].0.can_transition(pair[1].0) || pair[1].1 < pair[0].1)
        {
            return Err(invalid("history is not monotonic").into());
        }

        let mut round = Self::new(id, participants, started);
        for (identity, commitment) in commitments {
            round.record_commitment(identity, commitment)?;
        }
        for (from, to, share) in shares {
            round.record_share(from, to, share)?;
        }

        match phase {
            Phase::Completed => {
                let Some(recorded) = public_key else {
                    return Err(invalid("completed without a public key").into());
                };
                if abort_reason.is_some() {
                    return Err(invalid("completed with an abort reason").into());
                }
                if !round.commitments_complete() || !round.shares_complete() {
                    return Err(invalid("completed with missing inputs").into());
                }
                let assembled = assemble(
                    &round.members,
                    round.commitments.iter(),
                    round.shares.keys(),
                )
                .map_err(|_| invalid("completed inputs do not assemble"))?;
                if assembled != recorded {
                    return Err(invalid("public key does not match inputs").into());
                }
            }
            _ => {
                if public_key.is_some() {
                    return Err(invalid("aborted with a public key").into());
                }
                if abort_reason.is_none() {
                    return Err(invalid("aborted without a reason").into());
                }
            }
        }

        round.phase = phase;
        round.history = history;
        round.public_key = public_key;
        round.abort_reason = abort_reason;
        Ok(round)
    }

    pub fn id(&self) -> RoundId {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Every phase the round entered, with the time it was entered.
    pub fn history(&self) -> &[(Phase, SystemTime)] {
        &self.history
    }

    /// When the current phase was entered.
    pub fn phase_started(&self) -> Option<SystemTime> {
        self.history.last().map(|(_, at)| *at)
    }

    /// Snapshot of participants, in registration order.
    pub fn participants(&self) -> &[Identity] {
        &self.participants
    }

    pub fn is_participant(&self, identity: &Identity) -> bool {
        self.members.contains(identity)
    }

    /// The snapshot as a set.
    pub fn members(&self) -> &BTreeSet<Identity> {
        &self.members
    }

    pub fn commitments(&self) -> &CommitmentStore {
        &self.commitments
    }

    pub fn shares(&self) -> &ShareStore {
        &self.shares
    }

    pub fn public_key(&self) -> Option<&PublicKey> {
        self.public_key.as_ref()
    }

    pub fn abort_reason(&self) -> Option<&str> {
        self.abort_reason.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Whether every snapshot member has committed.
    pub fn commitments_complete(&self) -> bool {
        self.commitments.is_complete(&self.participants)
    }

    /// Whether every ordered pair of distinct snapshot members has a share.
    pub fn shares_complete(&self) -> bool {
        self.shares.is_complete(&self.participants)
    }

    /// Store a commitment from a snapshot member.
    pub(crate) fn record_commitment(
        &mut self,
        identity: Identity,
        commitment: Commitment,
    ) -> Result<(), Error> {
        if !self.is_participant(&identity) {
            return Err(Error::NotAParticipant(identity));
        }
        self.commitments.insert(identity, commitment)
    }

    /// Store a share between two snapshot members.
    pub(crate) fn record_share(
        &mut self,
        from: Identity,
        to: Identity,
        share: Share,
    ) -> Result<(), Error> {
        if !self.is_participant(&from) {
            return Err(Error::NotAParticipant(from));
        }
        if !self.is_participant(&to) {
            return Err(Error::NotAParticipant(to));
        }
        self.shares.insert(from, to, share)
    }

    /// Move to a later phase. Returns false (and does nothing) if the move would regress
    /// or leave a terminal phase.
    pub(crate) fn transition(&mut self, phase: Phase, now: SystemTime) -> bool {
        if !self.phase.can_transition(phase) {
            return false;
        }
        self.phase = phase;
        self.history.push((phase, now));
        true
    }

    /// Record the public key and complete the round.
    pub(crate) fn complete(&mut self, public_key: PublicKey, now: SystemTime) -> bool {
        if self.public_key.is_some() || !self.transition(Phase::Completed, now) {
            return false;
        }
        self.public_key = Some(public_key);
        true
    }

    /// Abort the round, recording why.
    pub(crate) fn abort(&mut self, reason: String, now: SystemTime) -> bool {
        if !self.transition(Phase::Aborted, now) {
            return false;
        }
        self.abort_reason = Some(reason);
        true
    }
}
