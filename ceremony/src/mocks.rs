//! Deterministic participants, commitments, and shares.

use crate::{Commitment, Identity, Share, IDENTITY_LENGTH, SHARE_LENGTH};
use commonware_cryptography::bls12381::primitives::group::{Element, Point, G1, G1_MESSAGE};
use sha2::{Digest, Sha256};

/// Identity whose bytes are all `seed`.
pub fn identity(seed: u8) -> Identity {
    Identity::new([seed; IDENTITY_LENGTH])
}

/// Deterministic commitment with `points` coefficients for `identity`.
///
/// A commitment always carries its constant term, so `points` is clamped to at least one.
pub fn commitment(identity: &Identity, points: u32) -> Commitment {
    let points: Vec<G1> = (0..points.max(1))
        .map(|i| {
            let mut data = identity.as_bytes().to_vec();
            data.extend_from_slice(&i.to_be_bytes());
            let mut point = G1::zero();
            point.map(G1_MESSAGE, &data);
            point
        })
        .collect();
    Commitment::from_points(points).expect("commitment has a constant term")
}

/// Deterministic share sent from `from` to `to`.
pub fn share(from: &Identity, to: &Identity) -> Share {
    let mut hasher = Sha256::new();
    hasher.update(from.as_bytes());
    hasher.update(to.as_bytes());
    let mut bytes = [0u8; SHARE_LENGTH];
    bytes.copy_from_slice(&hasher.finalize());
    Share::new(bytes)
}
