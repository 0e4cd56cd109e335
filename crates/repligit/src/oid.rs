//! Hex object ids as they appear on the wire.

use crate::{GitError, Result};
use std::fmt;
use std::str::FromStr;

/// Length of a SHA-1 object id in hex characters.
pub const HEX_LEN: usize = 40;

/// A 40-character lowercase hex object id.
///
/// The client never resolves objects, so the id is kept in its textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(String);

impl ObjectId {
    /// Parses and validates a hex object id.
    pub fn from_hex(s: &str) -> Result<Self> {
        let valid = s.len() == HEX_LEN
            && !s.bytes().any(|b| b.is_ascii_uppercase())
            && hex::decode(s).is_ok();
        if !valid {
            return Err(GitError::InvalidObjectId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// The all-zero id used as the old value when creating a ref.
    pub fn zero() -> Self {
        Self("0".repeat(HEX_LEN))
    }

    /// Returns true for the all-zero id.
    pub fn is_zero(&self) -> bool {
        self.0.bytes().all(|b| b == b'0')
    }

    /// Returns the hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectId {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ObjectId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ObjectId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
