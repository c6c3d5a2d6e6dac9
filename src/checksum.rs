//! Rolling input checksum for cache keys
//!
//! A single SHA-256 state absorbs every input that can affect a stage's
//! output. The state is never reset between stages, so the digest read at a
//! stage's lookup covers all input absorbed since the cache was opened.
//!
//! Every value is framed so that different input sequences cannot produce
//! the same byte stream:
//!
//! | Input | Bytes absorbed |
//! |-------|----------------|
//! | `Some(s)` | `0x00`, byte length as u64 little-endian, the bytes of `s` |
//! | `None` string | `0x01` |
//! | `Some(list)` | `0x01`, element count as u64 little-endian, each element as a string |
//! | `None` list | `0x02` |
//! | `true` / `false` | `0x01` / `0x00` |
//! | `u32` | 4 bytes little-endian |

use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

/// A 256-bit checksum value
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest([u8; 32]);

impl Digest {
    /// Wrap raw digest bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| CacheError::Internal(format!("invalid digest {:?}: {}", s, e)))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for Digest {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Digest> for String {
    fn from(value: Digest) -> Self {
        value.to_hex()
    }
}

/// Order-sensitive accumulator over all cache inputs
#[derive(Clone, Default)]
pub struct Checksum {
    hasher: Sha256,
}

impl Checksum {
    /// Create an accumulator with no input absorbed
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb an optional string
    pub fn absorb_str(&mut self, value: Option<&str>) {
        match value {
            Some(s) => {
                // Length prefix, since a str may itself contain NUL
                self.hasher.update([0u8]);
                self.hasher.update((s.len() as u64).to_le_bytes());
                self.hasher.update(s.as_bytes());
            }
            None => self.hasher.update([1u8]),
        }
    }

    /// Absorb an optional list of strings, preserving order
    pub fn absorb_strv<S: AsRef<str>>(&mut self, values: Option<&[S]>) {
        match values {
            Some(list) => {
                self.hasher.update([1u8]);
                self.hasher.update((list.len() as u64).to_le_bytes());
                for value in list {
                    self.absorb_str(Some(value.as_ref()));
                }
            }
            None => self.hasher.update([2u8]),
        }
    }

    /// Absorb a boolean
    pub fn absorb_bool(&mut self, value: bool) {
        self.hasher.update([u8::from(value)]);
    }

    /// Absorb an unsigned 32-bit integer
    pub fn absorb_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Absorb raw bytes with no framing
    pub fn absorb_bytes(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Digest of everything absorbed so far.
    ///
    /// Reading does not disturb the state; later input keeps accumulating
    /// on top of it.
    pub fn current_digest(&self) -> Digest {
        let result = self.hasher.clone().finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&result);
        Digest(bytes)
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checksum")
            .field("current", &self.current_digest())
            .finish()
    }
}
