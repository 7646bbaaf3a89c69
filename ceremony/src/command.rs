//! Typed command surface of a [Ceremony](crate::Ceremony).
//!
//! Raw caller input (hex identities, byte blobs) is validated when a [Command] is built, so
//! the state machine only ever sees well-formed identities, commitments, and shares.

use crate::{Commitment, Error, Identity, Phase, Round, RoundId, Share};

/// A request to a [Ceremony](crate::Ceremony).
#[derive(Clone, Debug)]
pub enum Command {
    /// Add a participant to the registry.
    Register { identity: Identity },
    /// Start a round over the current registry.
    StartKeyGeneration,
    /// Submit a participant's commitment.
    SubmitCommitment {
        round: RoundId,
        identity: Identity,
        commitment: Commitment,
    },
    /// Submit a share from one participant to another.
    SubmitShare {
        round: RoundId,
        from: Identity,
        to: Identity,
        share: Share,
    },
    /// Perform any transition whose inputs are complete.
    AdvanceRound { round: RoundId },
    /// Abandon a round.
    Abort { round: RoundId, reason: String },
    /// List registered identities in registration order.
    GetParticipants,
    /// Fetch a copy of a round.
    GetRound { round: RoundId },
}

impl Command {
    /// Build a [Command::Register] from a textual identity.
    pub fn register(identity: &str) -> Result<Self, Error> {
        Ok(Self::Register {
            identity: identity.parse()?,
        })
    }

    /// Build a [Command::SubmitCommitment] from raw input.
    pub fn submit_commitment(round: RoundId, identity: &str, commitment: Vec<u8>) -> Result<Self, Error> {
        Ok(Self::SubmitCommitment {
            round,
            identity: identity.parse()?,
            commitment: Commitment::new(commitment)?,
        })
    }

    /// Build a [Command::SubmitShare] from raw input.
    pub fn submit_share(round: RoundId, from: &str, to: &str, share: &[u8]) -> Result<Self, Error> {
        Ok(Self::SubmitShare {
            round,
            from: from.parse()?,
            to: to.parse()?,
            share: Share::try_from(share)?,
        })
    }

    /// Short name of the operation (used in logs and metrics).
    pub fn name(&self) -> &'static str {
        match self {
            Command::Register { .. } => "register",
            Command::StartKeyGeneration => "start_key_generation",
            Command::SubmitCommitment { .. } => "submit_commitment",
            Command::SubmitShare { .. } => "submit_share",
            Command::AdvanceRound { .. } => "advance_round",
            Command::Abort { .. } => "abort",
            Command::GetParticipants => "get_participants",
            Command::GetRound { .. } => "get_round",
        }
    }
}

/// Successful outcome of a [Command].
#[derive(Clone, Debug)]
pub enum Response {
    /// The participant was registered.
    Registered,
    /// A round was started.
    Started(RoundId),
    /// A commitment or share was stored.
    Accepted,
    /// The round's phase after advancing.
    Advanced(Phase),
    /// The round is aborted.
    Aborted,
    /// Registered identities, in registration order.
    Participants(Vec<Identity>),
    /// A copy of the requested round.
    Round(Box<Round>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mocks, SHARE_LENGTH};
    use commonware_utils::hex;

    #[test]
    fn test_constructors_validate() {
        let a = mocks::identity(1);
        let b = mocks::identity(2);

        assert!(matches!(
            Command::register("not an address"),
            Err(Error::InvalidIdentity(_))
        ));
        assert!(matches!(
            Command::register(&format!("0x{}", hex(a.as_bytes()).to_uppercase())),
            Ok(Command::Register { identity }) if identity == a
        ));

        assert!(matches!(
            Command::submit_commitment(0, &a.to_string(), vec![1, 2, 3]),
            Err(Error::InvalidCommitment(_))
        ));
        let commitment = mocks::commitment(&a, 2);
        assert!(Command::submit_commitment(0, &a.to_string(), commitment.to_bytes()).is_ok());

        assert!(matches!(
            Command::submit_share(0, &a.to_string(), &b.to_string(), &[0; SHARE_LENGTH + 1]),
            Err(Error::InvalidShare(33))
        ));
        assert!(matches!(
            Command::submit_share(0, &a.to_string(), "", &[0; SHARE_LENGTH]),
            Err(Error::InvalidIdentity(_))
        ));
        let command =
            Command::submit_share(3, &a.to_string(), &b.to_string(), &[0; SHARE_LENGTH]).unwrap();
        assert_eq!(command.name(), "submit_share");
    }
}
