//! Assemble the group public key of a round.
//!
//! Under Joint-Feldman, the group public key is the sum of the constant terms of every
//! participant's commitment. Point addition is commutative, so the result does not depend
//! on the order in which commitments (or shares) are presented.

use crate::{Commitment, Error, Identity};
use bytes::{Buf, BufMut};
use commonware_codec::{DecodeExt, EncodeFixed, Error as CodecError, FixedSize, Read, ReadExt, Write};
use commonware_cryptography::bls12381::primitives::group::{Element, G1};
use commonware_utils::hex;
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fmt,
};

/// Length of a [PublicKey] in bytes.
pub const PUBLIC_KEY_LENGTH: usize = G1::SIZE;

/// Group public key produced by a completed round (a compressed G1 point).
///
/// Never the point at infinity.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_LENGTH]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        &self.0
    }
}

impl TryFrom<&[u8]> for PublicKey {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let point = G1::decode(value).map_err(|_| Error::InvalidPublicKey)?;
        if point == G1::zero() {
            return Err(Error::InvalidPublicKey);
        }
        Ok(Self(point.encode_fixed()))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex(&self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex(&self.0))
    }
}

impl Write for PublicKey {
    fn write(&self, buf: &mut impl BufMut) {
        self.0.write(buf);
    }
}

impl Read for PublicKey {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let bytes = <[u8; PUBLIC_KEY_LENGTH]>::read(buf)?;
        Self::try_from(&bytes[..]).map_err(|_| CodecError::Invalid("PublicKey", "invalid point"))
    }
}

impl FixedSize for PublicKey {
    const SIZE: usize = PUBLIC_KEY_LENGTH;
}

/// Combine the commitments of `participants` into the group public key.
///
/// Fails if any participant has not committed, if any ordered pair of distinct
/// participants has not exchanged a share, or if the constant terms cancel out to the
/// point at infinity. Entries for identities outside `participants` are ignored.
pub fn assemble<'a>(
    participants: &BTreeSet<Identity>,
    commitments: impl IntoIterator<Item = (&'a Identity, &'a Commitment)>,
    shares: impl IntoIterator<Item = &'a (Identity, Identity)>,
) -> Result<PublicKey, Error> {
    let commitments: BTreeMap<&Identity, &Commitment> = commitments
        .into_iter()
        .filter(|(identity, _)| participants.contains(*identity))
        .collect();
    if let Some(missing) = participants
        .iter()
        .find(|identity| !commitments.contains_key(identity))
    {
        return Err(Error::MissingCommitment(*missing));
    }

    let shares: HashSet<&(Identity, Identity)> = shares.into_iter().collect();
    let mut missing = 0;
    for from in participants {
        for to in participants {
            if from != to && !shares.contains(&(*from, *to)) {
                missing += 1;
            }
        }
    }
    if missing > 0 {
        return Err(Error::IncompleteShares { missing });
    }

    let mut public = G1::zero();
    for commitment in commitments.values() {
        public.add(commitment.constant());
    }
    if public == G1::zero() {
        return Err(Error::DegenerateKey);
    }
    Ok(PublicKey(public.encode_fixed()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks;
    use commonware_codec::Encode;
    use proptest::prelude::*;

    fn inputs(n: u8) -> (BTreeSet<Identity>, Vec<(Identity, Commitment)>, Vec<(Identity, Identity)>) {
        let participants: BTreeSet<_> = (0..n).map(mocks::identity).collect();
        let commitments = participants
            .iter()
            .map(|identity| (*identity, mocks::commitment(identity, 2)))
            .collect();
        let mut shares = Vec::new();
        for from in &participants {
            for to in &participants {
                if from != to {
                    shares.push((*from, *to));
                }
            }
        }
        (participants, commitments, shares)
    }

    #[test]
    fn test_assemble_sums_constant_terms() {
        let (participants, commitments, shares) = inputs(3);
        let public = assemble(
            &participants,
            commitments.iter().map(|(i, c)| (i, c)),
            shares.iter(),
        )
        .unwrap();

        let mut expected = G1::zero();
        for (_, commitment) in &commitments {
            expected.add(commitment.constant());
        }
        assert_eq!(&public.as_bytes()[..], &expected.encode()[..]);
    }

    #[test]
    fn test_assemble_rejects_cancelling_commitments() {
        let (participants, mut commitments, shares) = inputs(2);

        // Flip the sign bit of the second participant's constant term so it negates the first
        let mut negated = commitments[0].1.to_bytes();
        negated[0] ^= 0x20;
        commitments[1].1 = Commitment::new(negated).unwrap();
        let mut sum = *commitments[0].1.constant();
        sum.add(commitments[1].1.constant());
        assert_eq!(sum, G1::zero());

        assert!(matches!(
            assemble(
                &participants,
                commitments.iter().map(|(i, c)| (i, c)),
                shares.iter(),
            ),
            Err(Error::DegenerateKey)
        ));
    }

    #[test]
    fn test_assemble_missing_share() {
        let (participants, commitments, mut shares) = inputs(3);
        shares.pop();
        assert!(matches!(
            assemble(
                &participants,
                commitments.iter().map(|(i, c)| (i, c)),
                shares.iter(),
            ),
            Err(Error::IncompleteShares { missing: 1 })
        ));
    }

    #[test]
    fn test_assemble_missing_commitment() {
        let (participants, mut commitments, shares) = inputs(3);
        let (dropped, _) = commitments.remove(0);
        assert!(matches!(
            assemble(
                &participants,
                commitments.iter().map(|(i, c)| (i, c)),
                shares.iter(),
            ),
            Err(Error::MissingCommitment(id)) if id == dropped
        ));
    }

    #[test]
    fn test_assemble_ignores_outsiders() {
        let (participants, mut commitments, mut shares) = inputs(2);
        let expected = assemble(
            &participants,
            commitments.iter().map(|(i, c)| (i, c)),
            shares.iter(),
        )
        .unwrap();

        let outsider = mocks::identity(99);
        commitments.push((outsider, mocks::commitment(&outsider, 2)));
        shares.push((outsider, mocks::identity(0)));
        let public = assemble(
            &participants,
            commitments.iter().map(|(i, c)| (i, c)),
            shares.iter(),
        )
        .unwrap();
        assert_eq!(public, expected);
    }

    #[test]
    fn test_public_key_rejects_infinity() {
        let mut infinity = [0u8; PUBLIC_KEY_LENGTH];
        infinity[0] = 0xc0;
        assert!(matches!(
            PublicKey::try_from(&infinity[..]),
            Err(Error::InvalidPublicKey)
        ));
        assert!(PublicKey::decode(&infinity[..]).is_err());

        let (participants, commitments, shares) = inputs(2);
        let public = assemble(
            &participants,
            commitments.iter().map(|(i, c)| (i, c)),
            shares.iter(),
        )
        .unwrap();
        assert_eq!(PublicKey::decode(public.encode()).unwrap(), public);
    }

    proptest! {
        #[test]
        fn test_assemble_order_independent(
            n in 2u8..6,
            seed in any::<u64>(),
        ) {
            let (participants, commitments, shares) = inputs(n);
            let expected = assemble(
                &participants,
                commitments.iter().map(|(i, c)| (i, c)),
                shares.iter(),
            ).unwrap();

            // Rotate and reverse the inputs by a seed-derived amount
            let mut permuted_commitments = commitments.clone();
            permuted_commitments.rotate_left(seed as usize % commitments.len());
            permuted_commitments.reverse();
            let mut permuted_shares = shares.clone();
            permuted_shares.rotate_left((seed >> 8) as usize % shares.len());
            if seed % 2 == 0 {
                permuted_shares.reverse();
            }

            let public = assemble(
                &participants,
                permuted_commitments.iter().map(|(i, c)| (i, c)),
                permuted_shares.iter(),
            ).unwrap();
            prop_assert_eq!(public, expected);
        }
    }
}
