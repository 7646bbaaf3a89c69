use crate::{Error, Identity};
use bytes::{Buf, BufMut};
use commonware_codec::{Error as CodecError, FixedSize, Read, ReadExt, Write};
use std::{
    collections::{btree_map::Entry, BTreeMap},
    fmt,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of a [Share] in bytes.
pub const SHARE_LENGTH: usize = 32;

/// Secret material one participant sends another.
///
/// Shares are opaque to the ceremony (typically an encrypted scalar) and are wiped from
/// memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Share([u8; SHARE_LENGTH]);

impl Share {
    pub const fn new(bytes: [u8; SHARE_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SHARE_LENGTH] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Share {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; SHARE_LENGTH] = value
            .try_into()
            .map_err(|_| Error::InvalidShare(value.len()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Share {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Share(<redacted>)")
    }
}

impl Write for Share {
    fn write(&self, buf: &mut impl BufMut) {
        self.0.write(buf);
    }
}

impl Read for Share {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        Ok(Self(<[u8; SHARE_LENGTH]>::read(buf)?))
    }
}

impl FixedSize for Share {
    const SIZE: usize = SHARE_LENGTH;
}

/// One share per ordered (sender, recipient) pair of a round.
#[derive(Clone, Debug, Default)]
pub struct ShareStore {
    shares: BTreeMap<(Identity, Identity), Share>,
}

impl ShareStore {
    /// Number of shares a round over `n` participants requires.
    pub fn required(n: usize) -> usize {
        n * n.saturating_sub(1)
    }

    /// Store a share. Each ordered pair may only be sent once and nobody shares with
    /// themselves.
    pub(crate) fn insert(&mut self, from: Identity, to: Identity, share: Share) -> Result<(), Error> {
        if from == to {
            return Err(Error::SelfShareForbidden(from));
        }
        match self.shares.entry((from, to)) {
            Entry::Occupied(_) => Err(Error::DuplicateShare { from, to }),
            Entry::Vacant(entry) => {
                entry.insert(share);
                Ok(())
            }
        }
    }

    pub fn get(&self, from: &Identity, to: &Identity) -> Option<&Share> {
        self.shares.get(&(*from, *to))
    }

    pub fn contains(&self, from: &Identity, to: &Identity) -> bool {
        self.shares.contains_key(&(*from, *to))
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    /// Ordered (sender, recipient) pairs that have a share.
    pub fn keys(&self) -> impl Iterator<Item = &(Identity, Identity)> {
        self.shares.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(Identity, Identity), &Share)> {
        self.shares.iter()
    }

    /// Number of ordered pairs of distinct participants without a share.
    pub fn missing(&self, participants: &[Identity]) -> usize {
        let mut missing = 0;
        for from in participants {
            for to in participants {
                if from != to && !self.contains(from, to) {
                    missing += 1;
                }
            }
        }
        missing
    }

    /// Whether every ordered pair of distinct participants has a share.
    pub fn is_complete(&self, participants: &[Identity]) -> bool {
        self.missing(participants) == 0
    }
}
