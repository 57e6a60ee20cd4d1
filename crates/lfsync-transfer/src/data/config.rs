use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TransferError};

/// Upper bound on parallel transfers regardless of configuration.
pub const MAX_CONCURRENT_TRANSFERS: usize = 64;

const ENV_PREFIX: &str = "LFSYNC_";

/// Tuning knobs for a transfer queue.
///
/// # Examples
///
/// ```
/// use lfsync_transfer::QueueConfig;
///
/// let config = QueueConfig::default()
///     .concurrent_transfers(4)
///     .chunk_size(32 * 1024)
///     .dry_run(true);
/// assert_eq!(config.workers(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Size of the worker pool. Clamped to `1..=MAX_CONCURRENT_TRANSFERS`.
    ///
    /// Default: 8
    pub concurrent_transfers: usize,

    /// Bytes read per chunk; progress and cancellation are checked between
    /// chunks.
    ///
    /// Default: 64 KiB
    pub chunk_size: usize,

    /// Authorize only, move no bytes.
    ///
    /// Default: false
    pub dry_run: bool,

    /// How many times objects whose links expired mid-run are re-authorized.
    ///
    /// Default: 1
    pub max_reauthorizations: u32,

    /// Base delay before a re-authorization round, doubled each round.
    ///
    /// Default: 100ms
    pub reauthorize_backoff_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrent_transfers:   8,
            chunk_size:             64 * 1024,
            dry_run:                false,
            max_reauthorizations:   1,
            reauthorize_backoff_ms: 100,
        }
    }
}

impl QueueConfig {
    /// Defaults, overlaid with the TOML file at `path` if given, overlaid
    /// with `LFSYNC_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(|e| TransferError::Config(e.to_string()))
    }

    #[must_use]
    pub fn concurrent_transfers(mut self, n: usize) -> Self {
        self.concurrent_transfers = n;
        self
    }

    #[must_use]
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn max_reauthorizations(mut self, rounds: u32) -> Self {
        self.max_reauthorizations = rounds;
        self
    }

    #[must_use]
    pub fn reauthorize_backoff(mut self, backoff: Duration) -> Self {
        self.reauthorize_backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Effective worker pool size.
    pub fn workers(&self) -> usize { self.concurrent_transfers.clamp(1, MAX_CONCURRENT_TRANSFERS) }

    pub(crate) fn effective_chunk_size(&self) -> usize { self.chunk_size.max(1) }

    pub(crate) fn backoff(&self) -> Duration { Duration::from_millis(self.reauthorize_backoff_ms) }
}
