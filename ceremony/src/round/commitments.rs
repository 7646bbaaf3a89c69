use crate::{Error, Identity};
use bytes::{Buf, BufMut};
use commonware_codec::{
    DecodeExt, EncodeSize, Error as CodecError, FixedSize, RangeCfg, Read, Write,
};
use commonware_cryptography::bls12381::primitives::group::G1;
use commonware_utils::hex;
use std::{
    collections::{btree_map::Entry, BTreeMap},
    fmt,
};

/// Length of each compressed point in a [Commitment].
pub const POINT_LENGTH: usize = G1::SIZE;

/// Feldman commitment to a participant's secret polynomial.
///
/// One G1 point per coefficient, constant term first. Every point is checked to be a valid,
/// non-infinite member of G1 when decoded, and a commitment always has at least one point.
#[derive(Clone, PartialEq, Eq)]
pub struct Commitment(Vec<G1>);

impl Commitment {
    /// Validate and wrap an encoded commitment (concatenated compressed points).
    pub fn new(bytes: Vec<u8>) -> Result<Self, Error> {
        if bytes.is_empty() {
            return Err(Error::InvalidCommitment("empty"));
        }
        if bytes.len() % POINT_LENGTH != 0 {
            return Err(Error::InvalidCommitment("truncated point"));
        }
        let points = bytes
            .chunks_exact(POINT_LENGTH)
            .map(G1::decode)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| Error::InvalidCommitment("invalid point"))?;
        Ok(Self(points))
    }

    /// Wrap already decoded points.
    pub fn from_points(points: Vec<G1>) -> Result<Self, Error> {
        if points.is_empty() {
            return Err(Error::InvalidCommitment("empty"));
        }
        Ok(Self(points))
    }

    /// Number of coefficients committed to (the polynomial degree plus one).
    pub fn points(&self) -> usize {
        self.0.len()
    }

    /// The committer's public contribution to the group key.
    pub fn constant(&self) -> &G1 {
        &self.0[0]
    }

    /// Concatenated compressed points.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.0.len() * POINT_LENGTH);
        for point in &self.0 {
            point.write(&mut bytes);
        }
        bytes
    }
}

impl TryFrom<Vec<u8>> for Commitment {
    type Error = Error;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut constant = Vec::with_capacity(POINT_LENGTH);
        self.constant().write(&mut constant);
        write!(f, "Commitment({}, points={})", hex(&constant), self.points())
    }
}

impl Write for Commitment {
    fn write(&self, buf: &mut impl BufMut) {
        self.0.write(buf);
    }
}

impl Read for Commitment {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let range: RangeCfg = (1usize..).into();
        let points = Vec::<G1>::read_cfg(buf, &(range, ()))?;
        Ok(Self(points))
    }
}

impl EncodeSize for Commitment {
    fn encode_size(&self) -> usize {
        self.0.encode_size()
    }
}

/// One commitment per participant of a round.
#[derive(Clone, Debug, Default)]
pub struct CommitmentStore {
    commitments: BTreeMap<Identity, Commitment>,
}

impl CommitmentStore {
    /// Store a commitment. A participant may only commit once.
    pub(crate) fn insert(&mut self, identity: Identity, commitment: Commitment) -> Result<(), Error> {
        match self.commitments.entry(identity) {
            Entry::Occupied(_) => Err(Error::DuplicateCommitment(identity)),
            Entry::Vacant(entry) => {
                entry.insert(commitment);
                Ok(())
            }
        }
    }

    pub fn get(&self, identity: &Identity) -> Option<&Commitment> {
        self.commitments.get(identity)
    }

    pub fn len(&self) -> usize {
        self.commitments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commitments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identity, &Commitment)> {
        self.commitments.iter()
    }

    /// Participants that have not committed yet.
    pub fn missing<'a>(
        &'a self,
        participants: &'a [Identity],
    ) -> impl Iterator<Item = &'a Identity> + 'a {
        participants
            .iter()
            .filter(move |identity| !self.commitments.contains_key(identity))
    }

    /// Whether every participant has committed.
    pub fn is_complete(&self, participants: &[Identity]) -> bool {
        self.missing(participants).next().is_none()
    }
}
