//! Participant identities.
//!
//! An [Identity] is a fixed-length account address. Textual input is normalized
//! (surrounding whitespace, an optional `0x` prefix, and letter case are ignored) before
//! it is decoded, so `0xAbC...` and `abc...` refer to the same participant.

use crate::Error;
use bytes::{Buf, BufMut};
use commonware_codec::{Error as CodecError, FixedSize, Read, ReadExt, Write};
use commonware_utils::{from_hex_formatted, hex};
use std::{fmt, str::FromStr};

/// Length of an [Identity] in bytes.
pub const IDENTITY_LENGTH: usize = 20;

/// Address of a ceremony participant.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity([u8; IDENTITY_LENGTH]);

impl Identity {
    /// Create an identity from raw bytes.
    pub const fn new(bytes: [u8; IDENTITY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Raw bytes of the identity.
    pub fn as_bytes(&self) -> &[u8; IDENTITY_LENGTH] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Identity {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; IDENTITY_LENGTH] = value
            .try_into()
            .map_err(|_| Error::InvalidIdentity(hex(value)))?;
        Ok(Self(bytes))
    }
}

impl FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        if normalized.is_empty() || !normalized.is_ascii() {
            return Err(Error::InvalidIdentity(s.to_string()));
        }
        let bytes =
            from_hex_formatted(&normalized).ok_or_else(|| Error::InvalidIdentity(s.to_string()))?;
        Self::try_from(bytes.as_slice()).map_err(|_| Error::InvalidIdentity(s.to_string()))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex(&self.0))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex(&self.0))
    }
}

impl Write for Identity {
    fn write(&self, buf: &mut impl BufMut) {
        self.0.write(buf);
    }
}

impl Read for Identity {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &()) -> Result<Self, CodecError> {
        Ok(Self(<[u8; IDENTITY_LENGTH]>::read(buf)?))
    }
}

impl FixedSize for Identity {
    const SIZE: usize = IDENTITY_LENGTH;
}
