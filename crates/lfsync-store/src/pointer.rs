use std::fmt;
use std::str::FromStr;

use crate::{Oid, StoreError};

/// Current pointer format version.
pub const VERSION: &str = "https://git-lfs.github.com/spec/v1";

/// Pre-release version string still found in old histories.
pub const LEGACY_VERSION: &str = "https://hawser.github.com/spec/v1";

/// Anything larger than this is content, never a pointer.
pub const MAX_POINTER_SIZE: usize = 1024;

const OID_PREFIX: &str = "sha256:";

/// The stub stored in history in place of a large file.
///
/// Serialized as three `key value` lines:
///
/// ```text
/// version https://git-lfs.github.com/spec/v1
/// oid sha256:4d7a2146...
/// size 12345
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    version: String,
    oid:     Oid,
    size:    u64,
}

impl Pointer {
    pub fn new(oid: Oid, size: u64) -> Self {
        Self {
            version: VERSION.to_string(),
            oid,
            size,
        }
    }

    pub fn version(&self) -> &str { &self.version }

    pub fn oid(&self) -> &Oid { &self.oid }

    pub fn size(&self) -> u64 { self.size }

    pub fn encode(&self) -> String {
        format!(
            "version {}\noid {}{}\nsize {}\n",
            self.version, OID_PREFIX, self.oid, self.size
        )
    }

    /// Parse pointer text. Accepts exactly the form [`Pointer::encode`]
    /// produces, so a parsed pointer re-encodes to the same bytes.
    pub fn parse(text: &str) -> Result<Self, StoreError> {
        if text.len() > MAX_POINTER_SIZE {
            return Err(invalid("larger than a pointer can be"));
        }
        let body = text
            .strip_suffix('\n')
            .ok_or_else(|| invalid("missing trailing newline"))?;

        let mut lines = body.split('\n');

        let version = next_field(&mut lines, "version")?;
        if version != VERSION && version != LEGACY_VERSION {
            return Err(invalid(format!("unknown version {version:?}")));
        }
        let version = version.to_string();

        let oid = next_field(&mut lines, "oid")?
            .strip_prefix(OID_PREFIX)
            .ok_or_else(|| invalid("unsupported oid type"))?
            .parse()?;

        let size = parse_size(next_field(&mut lines, "size")?)?;

        if let Some(extra) = lines.next() {
            return Err(invalid(format!("unexpected line {extra:?}")));
        }

        Ok(Self { version, oid, size })
    }

    /// Sniff `bytes` for a pointer. Returns `None` for ordinary content.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > MAX_POINTER_SIZE {
            return None;
        }
        std::str::from_utf8(bytes).ok().and_then(|s| Self::parse(s).ok())
    }
}

fn next_field<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
    key: &str,
) -> Result<&'a str, StoreError> {
    let line = lines
        .next()
        .ok_or_else(|| invalid(format!("missing {key}")))?;
    match line.split_once(' ') {
        Some((k, v)) if k == key => Ok(v),
        _ => Err(invalid(format!("expected {key}, found {line:?}"))),
    }
}

fn parse_size(raw: &str) -> Result<u64, StoreError> {
    let canonical = !raw.is_empty()
        && raw.bytes().all(|b| b.is_ascii_digit())
        && (raw == "0" || !raw.starts_with('0'));
    if !canonical {
        return Err(invalid(format!("bad size {raw:?}")));
    }
    raw.parse().map_err(|_| invalid(format!("size out of range {raw:?}")))
}

fn invalid(reason: impl Into<String>) -> StoreError { StoreError::InvalidPointer(reason.into()) }

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.encode()) }
}

impl FromStr for Pointer {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> { Self::parse(s) }
}
