//! Append-only registry of ceremony participants.

use crate::{Error, Identity, RoundId};
use bytes::{Buf, BufMut};
use commonware_codec::{Error as CodecError, FixedSize, Read, ReadExt, Write};
use std::collections::HashMap;

/// A registered participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Participant {
    pub identity: Identity,
    /// First round the participant is eligible for.
    pub joined_at: RoundId,
}

impl Write for Participant {
    fn write(&self, buf: &mut impl BufMut) {
        self.identity.write(buf);
        self.joined_at.write(buf);
    }
}

impl Read for Participant {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        let identity = Identity::read(buf)?;
        let joined_at = RoundId::read(buf)?;
        Ok(Self {
            identity,
            joined_at,
        })
    }
}

impl FixedSize for Participant {
    const SIZE: usize = Identity::SIZE + RoundId::SIZE;
}

/// Registered participants, in registration order.
///
/// Participants are never removed.
#[derive(Clone, Debug, Default)]
pub struct ParticipantRegistry {
    max: Option<usize>,
    participants: Vec<Participant>,
    index: HashMap<Identity, usize>,
}

impl ParticipantRegistry {
    /// Create an empty registry, optionally bounded to `max` participants.
    pub fn new(max: Option<usize>) -> Self {
        Self {
            max,
            participants: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Check that `identity` could be registered right now.
    pub fn check(&self, identity: &Identity) -> Result<(), Error> {
        if self.index.contains_key(identity) {
            return Err(Error::AlreadyRegistered(*identity));
        }
        if let Some(max) = self.max {
            if self.participants.len() >= max {
                return Err(Error::RegistryFull {
                    registered: self.participants.len(),
                    max,
                });
            }
        }
        Ok(())
    }

    /// Register a new participant.
    pub fn register(
        &mut self,
        identity: Identity,
        joined_at: RoundId,
    ) -> Result<&Participant, Error> {
        self.check(&identity)?;
        let position = self.participants.len();
        self.participants.push(Participant {
            identity,
            joined_at,
        });
        self.index.insert(identity, position);
        Ok(&self.participants[position])
    }

    /// Registered identities, in registration order.
    pub fn list(&self) -> Vec<Identity> {
        self.participants.iter().map(|p| p.identity).collect()
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn get(&self, identity: &Identity) -> Option<&Participant> {
        self.index.get(identity).map(|&i| &self.participants[i])
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.index.contains_key(identity)
    }

    pub fn count(&self) -> usize {
        self.participants.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks;
    use proptest::prelude::*;

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = ParticipantRegistry::new(None);
        let identity = mocks::identity(1);
        registry.register(identity, 0).unwrap();
        assert!(matches!(
            registry.register(identity, 3),
            Err(Error::AlreadyRegistered(id)) if id == identity
        ));
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.get(&identity).unwrap().joined_at, 0);
    }

    #[test]
    fn test_full() {
        let mut registry = ParticipantRegistry::new(Some(2));
        registry.register(mocks::identity(1), 0).unwrap();
        registry.register(mocks::identity(2), 0).unwrap();
        assert!(matches!(
            registry.register(mocks::identity(3), 0),
            Err(Error::RegistryFull {
                registered: 2,
                max: 2
            })
        ));
        assert!(!registry.contains(&mocks::identity(3)));

        // Duplicates are reported before capacity
        assert!(matches!(
            registry.register(mocks::identity(1), 0),
            Err(Error::AlreadyRegistered(_))
        ));
    }

    proptest! {
        #[test]
        fn test_list_preserves_registration_order(
            bytes in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let mut registry = ParticipantRegistry::new(None);
            let mut expected = Vec::new();
            for byte in bytes {
                let identity = mocks::identity(byte);
                let result = registry.register(identity, 0);
                if expected.contains(&identity) {
                    prop_assert!(matches!(result, Err(Error::AlreadyRegistered(_))));
                } else {
                    prop_assert!(result.is_ok());
                    expected.push(identity);
                }
            }
            prop_assert_eq!(registry.list(), expected.clone());
            prop_assert_eq!(registry.count(), expected.len());
        }
    }
}
