use std::io;
use std::path::PathBuf;

use crate::Oid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object {0} not found in local store")]
    NotFound(Oid),

    #[error("I/O error on {}", path.display())]
    Io {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Fs(#[from] lfsync_fs::Error),

    #[error("integrity check failed: expected {expected}, content hashes to {actual}")]
    Integrity { expected: Oid, actual: Oid },

    #[error("{} hashes to {actual}, expected object {expected}", path.display())]
    IntegrityMismatch {
        expected: Oid,
        actual:   Oid,
        path:     PathBuf,
    },

    #[error("invalid object id {0:?}")]
    InvalidOid(String),

    #[error("invalid pointer: {0}")]
    InvalidPointer(String),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for digest mismatches, which must never be retried with the same bytes.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity { .. } | Self::IntegrityMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
