use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Hex-encoded SHA-256 digest naming an object's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    pub const HEX_LEN: usize = 64;

    /// Build an identifier from a raw 32-byte digest.
    pub fn from_digest(digest: &[u8]) -> Result<Self, StoreError> {
        if digest.len() * 2 != Self::HEX_LEN {
            return Err(StoreError::InvalidOid(hex::encode(digest)));
        }
        Ok(Self(hex::encode(digest)))
    }

    pub fn as_str(&self) -> &str { &self.0 }

    /// The two directory levels an object is sharded under.
    pub fn shards(&self) -> (&str, &str) { (&self.0[0..2], &self.0[2..4]) }
}

impl FromStr for Oid {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = s.len() == Self::HEX_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(StoreError::InvalidOid(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for Oid {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self { oid.0 }
}

impl AsRef<str> for Oid {
    fn as_ref(&self) -> &str { &self.0 }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}
