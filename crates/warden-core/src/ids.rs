//! Core identifier types for warden.
//!
//! Projects and roles are addressed by 12-byte object identifiers, rendered as
//! 24-character lowercase hex. The leading four bytes carry the creation time in
//! seconds (big-endian) so that freshly generated IDs sort roughly by age.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of bytes in an object identifier.
pub const OBJECT_ID_LEN: usize = 12;

fn decode_object_id(s: &str) -> Result<[u8; OBJECT_ID_LEN], IdError> {
    let bytes = hex::decode(s).map_err(|_| IdError::InvalidHex)?;
    bytes.try_into().map_err(|_| IdError::InvalidLength {
        expected: OBJECT_ID_LEN,
        got: s.len() / 2,
    })
}

fn fresh_object_id() -> [u8; OBJECT_ID_LEN] {
    let seconds = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let seconds = u32::try_from(seconds).unwrap_or(u32::MAX);

    let mut bytes = [0u8; OBJECT_ID_LEN];
    bytes[..4].copy_from_slice(&seconds.to_be_bytes());
    bytes[4..].copy_from_slice(&uuid::Uuid::new_v4().as_bytes()[..8]);
    bytes
}

fn seeded_object_id(seed: &str) -> [u8; OBJECT_ID_LEN] {
    let hash = blake3::hash(seed.as_bytes());
    let mut bytes = [0u8; OBJECT_ID_LEN];
    bytes.copy_from_slice(&hash.as_bytes()[..OBJECT_ID_LEN]);
    bytes
}

macro_rules! object_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name([u8; OBJECT_ID_LEN]);

        impl $name {
            /// Create an identifier from raw bytes.
            #[must_use]
            pub const fn from_bytes(bytes: [u8; OBJECT_ID_LEN]) -> Self {
                Self(bytes)
            }

            /// Generate a new unique identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(fresh_object_id())
            }

            /// Derive a stable identifier from a seed string.
            ///
            /// Useful for fixtures and tests that need predictable IDs.
            #[must_use]
            pub fn from_seed(seed: &str) -> Self {
                Self(seeded_object_id(seed))
            }

            /// Parse an identifier from its hex representation.
            ///
            /// # Errors
            ///
            /// Returns an error if the string is not valid hex or not exactly 24 characters.
            pub fn from_hex(s: &str) -> Result<Self, IdError> {
                decode_object_id(s).map(Self)
            }

            /// Return the underlying bytes.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
                &self.0
            }

            /// Return the hex-encoded string representation.
            #[must_use]
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::from_hex(&value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.to_hex()
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

object_id! {
    /// Identifier of a project, the tenant boundary for roles and resources.
    ProjectId
}

object_id! {
    /// Identifier of a single role record in the role store.
    RoleId
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input string contains invalid hexadecimal characters.
    #[error("invalid hex encoding")]
    InvalidHex,

    /// The input has an incorrect length.
    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// The expected number of bytes.
        expected: usize,
        /// The actual number of bytes.
        got: usize,
    },
}
