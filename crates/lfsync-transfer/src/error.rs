//! Error types for lfsync-transfer.

use lfsync_store::{Oid, StoreError};
use thiserror::Error;

use crate::data::Direction;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("cannot upload {name} ({oid})")]
    Local {
        oid:    Oid,
        name:   String,
        #[source]
        source: StoreError,
    },

    #[error("batch authorization failed: {0}")]
    Authorization(String),

    #[error("remote rejected object ({code}): {message}")]
    Object { code: u16, message: String },

    #[error("transfer authorization expired")]
    AuthExpired,

    #[error("remote granted no {0} action")]
    MissingAction(&'static str),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("{actual} transfer added to a {expected} queue")]
    WrongDirection { expected: Direction, actual: Direction },

    #[error("transfer cancelled")]
    Cancelled,

    #[error("transfer worker failed: {0}")]
    Worker(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TransferError {
    /// Whether trying again later could succeed.
    ///
    /// Transport failures, expired authorizations and cancellations are
    /// retryable. Digest mismatches and remote rejections are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Authorization(_)
            | Self::AuthExpired
            | Self::Upload(_)
            | Self::Download(_)
            | Self::Cancelled
            | Self::Worker(_) => true,
            Self::Store(e) | Self::Local { source: e, .. } => {
                matches!(e, StoreError::Io { .. } | StoreError::Fs(_))
            }
            Self::Object { .. }
            | Self::MissingAction(_)
            | Self::WrongDirection { .. }
            | Self::Config(_) => false,
        }
    }

    pub fn is_integrity(&self) -> bool {
        match self {
            Self::Store(e) | Self::Local { source: e, .. } => e.is_integrity(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;
