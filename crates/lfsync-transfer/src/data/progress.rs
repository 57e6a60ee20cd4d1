use std::fmt;
use std::sync::Arc;

use lfsync_store::Oid;

use super::Direction;

/// Lifecycle of one queue run.
///
/// Collecting → Authorizing → Running → Draining → Done. Re-authorization of
/// expired objects returns to Authorizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueState {
    /// Transfers are being added.
    #[default]
    Collecting,

    /// The single batch request is in flight.
    Authorizing,

    /// Workers are claiming and transferring objects.
    Running,

    /// Nothing is left to claim; in-flight transfers are finishing.
    Draining,

    /// The summary is final.
    Done,
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueState::Collecting => write!(f, "Collecting"),
            QueueState::Authorizing => write!(f, "Authorizing"),
            QueueState::Running => write!(f, "Running"),
            QueueState::Draining => write!(f, "Draining"),
            QueueState::Done => write!(f, "Done"),
        }
    }
}

/// One chunk's worth of progress for a single object.
///
/// For a given object `bytes_so_far` never decreases between callbacks.
/// Callbacks for different objects interleave arbitrarily.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress<'a> {
    pub direction:    Direction,
    pub oid:          &'a Oid,
    /// Display name, empty for transfers addressed by identifier only.
    pub name:         &'a str,
    pub total_bytes:  u64,
    pub bytes_so_far: u64,
    pub chunk_len:    usize,
}

impl Progress<'_> {
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            100.0
        } else {
            (self.bytes_so_far as f64 / self.total_bytes as f64) * 100.0
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool { self.bytes_so_far >= self.total_bytes }
}

/// Progress sink invoked after every chunk.
pub type ProgressCallback = Arc<dyn Fn(&Progress<'_>) + Send + Sync>;

/// Aggregate byte counters for a queue, independent of per-object callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferTotals {
    /// Sum of sizes of objects handed to workers.
    pub bytes_expected:    u64,
    /// Bytes moved so far, including transfers that later failed.
    pub bytes_transferred: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        let oid: Oid = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
            .parse()
            .unwrap();
        let mut progress = Progress {
            direction:    Direction::Download,
            oid:          &oid,
            name:         "",
            total_bytes:  200,
            bytes_so_far: 50,
            chunk_len:    50,
        };
        assert_eq!(progress.percentage(), 25.0);
        assert!(!progress.is_complete());

        progress.total_bytes = 0;
        progress.bytes_so_far = 0;
        assert_eq!(progress.percentage(), 100.0);
        assert!(progress.is_complete());
    }
}
