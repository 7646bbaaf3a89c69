//! Append-only audit log of a ceremony.
//!
//! # Format
//!
//! Records are stored in section `0` of a [commonware_storage] variable journal, so each one
//! is length-prefixed and checksummed on disk. A record is a one byte tag followed by its
//! body:
//!
//! ```text
//! 0 | identity (20) | joined_at (u64)
//! 1 | id (u64) | phase (u8) | history | participants | commitments | shares
//!   | public key (optional) | abort reason (optional)
//! ```
//!
//! Participants are written in registration order. A round is written exactly once, when it
//! becomes terminal, and captures everything needed to audit it (phase timestamps, snapshot,
//! commitments, shares, and the public key or abort reason). Rounds still active at shutdown
//! are not recorded.
//!
//! _Each record is synced before [Journal::append] returns. Opening a journal replays it,
//! which drops any torn record left by a crash. If an append fails, the journal refuses all
//! further appends so that nothing is ever written after a partial record._

use crate::{Commitment, Identity, Participant, Phase, PublicKey, Round, RoundId, Share};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error as CodecError, Read, ReadExt, Write};
use commonware_runtime::{Clock, Metrics, Storage};
use commonware_storage::journal::{
    variable::{Config as JConfig, Journal as Inner},
    Error as StorageError,
};
use futures::{pin_mut, StreamExt};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{debug, error};

/// Only section used by the journal.
const SECTION: u64 = 0;

/// Longest abort reason that will be decoded.
const MAX_REASON_LENGTH: usize = 1024;

/// Errors that can occur when interacting with a [Journal].
#[derive(Debug, Error)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("journal poisoned by a failed append")]
    Poisoned,
    #[error("round {0} recorded before it was terminal")]
    NonTerminalRound(RoundId),
    #[error("round {0} recorded twice")]
    DuplicateRound(RoundId),
    #[error("round {round} is inconsistent: {reason}")]
    InvalidRound { round: RoundId, reason: &'static str },
}

/// Configuration for a [Journal].
#[derive(Clone, Debug)]
pub struct Config {
    /// Storage partition holding the journal.
    pub partition: String,

    /// Bytes buffered before a write reaches storage.
    pub write_buffer: usize,

    /// Bytes read at a time while replaying.
    pub replay_buffer: usize,
}

impl Config {
    /// Default buffers over `partition`.
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            write_buffer: 64 * 1024,
            replay_buffer: 1024 * 1024,
        }
    }
}

/// A single journal entry.
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    Participant(Participant),
    Round(RoundRecord),
}

impl Write for Record {
    fn write(&self, buf: &mut impl BufMut) {
        match self {
            Record::Participant(participant) => {
                0u8.write(buf);
                participant.write(buf);
            }
            Record::Round(round) => {
                1u8.write(buf);
                round.write(buf);
            }
        }
    }
}

impl Read for Record {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        match u8::read(buf)? {
            0 => Ok(Record::Participant(Participant::read(buf)?)),
            1 => Ok(Record::Round(RoundRecord::read(buf)?)),
            tag => Err(CodecError::InvalidEnum(tag)),
        }
    }
}

impl EncodeSize for Record {
    fn encode_size(&self) -> usize {
        1 + match self {
            Record::Participant(participant) => participant.encode_size(),
            Record::Round(round) => round.encode_size(),
        }
    }
}

/// Everything recorded about a terminal round.
#[derive(Clone, Debug, PartialEq)]
pub struct RoundRecord {
    pub id: RoundId,
    pub phase: Phase,
    pub phase_history: Vec<(Phase, SystemTime)>,
    pub participants: Vec<Identity>,
    pub commitments: Vec<(Identity, Commitment)>,
    pub shares: Vec<(Identity, Identity, Share)>,
    pub public_key: Option<PublicKey>,
    pub abort_reason: Option<String>,
}

impl From<&Round> for RoundRecord {
    fn from(round: &Round) -> Self {
        Self {
            id: round.id(),
            phase: round.phase(),
            phase_history: round.history().to_vec(),
            participants: round.participants().to_vec(),
            commitments: round
                .commitments()
                .iter()
                .map(|(identity, commitment)| (*identity, commitment.clone()))
                .collect(),
            shares: round
                .shares()
                .iter()
                .map(|((from, to), share)| (*from, *to, share.clone()))
                .collect(),
            public_key: round.public_key().copied(),
            abort_reason: round.abort_reason().map(str::to_string),
        }
    }
}

impl RoundRecord {
    /// Rebuild the round, re-validating every recorded entry and the outcome they produced.
    pub fn into_round(self) -> Result<Round, crate::Error> {
        Round::restore(
            self.id,
            self.phase,
            self.phase_history,
            self.participants,
            self.commitments,
            self.shares,
            self.public_key,
            self.abort_reason,
        )
    }

    /// Phase history as nanoseconds since the epoch.
    fn history_nanos(&self) -> Vec<(Phase, u64)> {
        self.phase_history
            .iter()
            .map(|(phase, at)| {
                let nanos = at
                    .duration_since(SystemTime::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_nanos();
                (*phase, u64::try_from(nanos).unwrap_or(u64::MAX))
            })
            .collect()
    }

    fn reason_bytes(&self) -> Option<Vec<u8>> {
        self.abort_reason
            .as_ref()
            .map(|reason| reason.as_bytes().to_vec())
    }
}

impl Write for RoundRecord {
    fn write(&self, buf: &mut impl BufMut) {
        self.id.write(buf);
        self.phase.write(buf);
        self.history_nanos().write(buf);
        self.participants.write(buf);
        self.commitments.write(buf);
        self.shares.write(buf);
        self.public_key.write(buf);
        self.reason_bytes().write(buf);
    }
}

impl Read for RoundRecord {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let id = RoundId::read(buf)?;
        let phase = Phase::read(buf)?;
        let phase_history = Vec::<(Phase, u64)>::read_cfg(buf, &((..).into(), ((), ())))?
            .into_iter()
            .map(|(phase, nanos)| (phase, SystemTime::UNIX_EPOCH + Duration::from_nanos(nanos)))
            .collect();
        let participants = Vec::<Identity>::read_cfg(buf, &((..).into(), ()))?;
        let commitments = Vec::<(Identity, Commitment)>::read_cfg(buf, &((..).into(), ((), ())))?;
        let shares =
            Vec::<(Identity, Identity, Share)>::read_cfg(buf, &((..).into(), ((), (), ())))?;
        let public_key = Option::<PublicKey>::read(buf)?;
        let abort_reason =
            match Option::<Vec<u8>>::read_cfg(buf, &((..=MAX_REASON_LENGTH).into(), ()))? {
                Some(bytes) => Some(
                    String::from_utf8(bytes)
                        .map_err(|_| CodecError::Invalid("RoundRecord", "abort reason"))?,
                ),
                None => None,
            };
        Ok(Self {
            id,
            phase,
            phase_history,
            participants,
            commitments,
            shares,
            public_key,
            abort_reason,
        })
    }
}

impl EncodeSize for RoundRecord {
    fn encode_size(&self) -> usize {
        self.id.encode_size()
            + self.phase.encode_size()
            + self.history_nanos().encode_size()
            + self.participants.encode_size()
            + self.commitments.encode_size()
            + self.shares.encode_size()
            + self.public_key.encode_size()
            + self.reason_bytes().encode_size()
    }
}

/// Durable, append-only log of [Record]s.
pub struct Journal<E: Storage + Metrics + Clock> {
    /// Cleared after a failed append.
    inner: Option<Inner<E, Record>>,
}

impl<E: Storage + Metrics + Clock> Journal<E> {
    /// Open (or create) the journal in `cfg.partition` and replay every intact record.
    pub async fn init(context: E, cfg: Config) -> Result<(Self, Vec<Record>), Error> {
        let inner = Inner::init(
            context,
            JConfig {
                partition: cfg.partition,
                compression: None,
                codec_config: (),
                write_buffer: cfg.write_buffer,
            },
        )
        .await?;

        let mut records = Vec::new();
        {
            let stream = inner.replay(cfg.replay_buffer).await?;
            pin_mut!(stream);
            while let Some(result) = stream.next().await {
                let (_, _, _, record) = result?;
                records.push(record);
            }
        }
        debug!(records = records.len(), "replayed journal");
        Ok((Self { inner: Some(inner) }, records))
    }

    /// Durably append a record.
    ///
    /// A failed append poisons the journal: the partial write stays at the tail (where the
    /// next [Journal::init] drops it) and every later append returns [Error::Poisoned].
    pub async fn append(&mut self, record: Record) -> Result<(), Error> {
        let Some(inner) = self.inner.as_mut() else {
            return Err(Error::Poisoned);
        };
        let result = async {
            inner.append(SECTION, record).await?;
            inner.sync(SECTION).await
        }
        .await;
        if let Err(err) = result {
            error!(?err, "journal append failed");
            self.inner = None;
            return Err(err.into());
        }
        Ok(())
    }

    /// Whether a failed append has disabled the journal.
    pub fn is_poisoned(&self) -> bool {
        self.inner.is_none()
    }

    /// Sync and close the journal.
    pub async fn close(self) -> Result<(), Error> {
        match self.inner {
            Some(inner) => Ok(inner.close().await?),
            None => Ok(()),
        }
    }
}
