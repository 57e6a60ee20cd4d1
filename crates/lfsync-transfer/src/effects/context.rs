use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lfsync_store::{Oid, Store};
use tokio_util::sync::CancellationToken;

use crate::data::{Action, Direction, Progress, ProgressCallback, TransferTotals};
use crate::effects::http::HttpClient;
use crate::error::{Result, TransferError};

/// Everything a transfer needs besides the object itself.
///
/// Shared by all workers of a queue; cloning is cheap.
pub struct TransferContext<C> {
    pub(crate) client:      Arc<C>,
    pub(crate) store:       Store,
    pub(crate) cancel:      CancellationToken,
    pub(crate) chunk_size:  usize,
    pub(crate) on_progress: Option<ProgressCallback>,
    pub(crate) counters:    Arc<Counters>,
}

impl<C> Clone for TransferContext<C> {
    fn clone(&self) -> Self {
        Self {
            client:      Arc::clone(&self.client),
            store:       self.store.clone(),
            cancel:      self.cancel.clone(),
            chunk_size:  self.chunk_size,
            on_progress: self.on_progress.clone(),
            counters:    Arc::clone(&self.counters),
        }
    }
}

impl<C: HttpClient> TransferContext<C> {
    pub fn new(client: Arc<C>, store: Store) -> Self {
        Self {
            client,
            store,
            cancel: CancellationToken::new(),
            chunk_size: 64 * 1024,
            on_progress: None,
            counters: Arc::default(),
        }
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &Store { &self.store }

    pub fn cancel_token(&self) -> &CancellationToken { &self.cancel }

    pub fn totals(&self) -> TransferTotals { self.counters.snapshot() }
}

impl<C> TransferContext<C> {
    /// A progress emitter for one attempt at moving an object.
    ///
    /// `high_water` belongs to the object and outlives the attempt, so a
    /// retried transfer only reports bytes beyond what earlier attempts did.
    pub(crate) fn reporter(
        &self,
        direction: Direction,
        oid: &Oid,
        name: &str,
        total: u64,
        high_water: Arc<AtomicU64>,
    ) -> Reporter {
        Reporter {
            direction,
            oid: oid.clone(),
            name: name.to_string(),
            total,
            high_water,
            callback: self.on_progress.clone(),
            counters: Arc::clone(&self.counters),
        }
    }

    /// Chunk-boundary check: stop on cancellation or a lapsed authorization.
    pub(crate) fn checkpoint(&self, action: &Action) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }
        if action.is_expired() {
            return Err(TransferError::AuthExpired);
        }
        Ok(())
    }
}

/// Running byte counters shared by a queue's workers.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    bytes_expected:    AtomicU64,
    bytes_transferred: AtomicU64,
}

impl Counters {
    pub(crate) fn expect(&self, bytes: u64) { self.bytes_expected.fetch_add(bytes, Ordering::Relaxed); }

    pub(crate) fn snapshot(&self) -> TransferTotals {
        TransferTotals {
            bytes_expected:    self.bytes_expected.load(Ordering::Relaxed),
            bytes_transferred: self.bytes_transferred.load(Ordering::Relaxed),
        }
    }
}

/// Per-object progress emitter.
#[derive(Clone)]
pub(crate) struct Reporter {
    direction:  Direction,
    oid:        Oid,
    name:       String,
    total:      u64,
    high_water: Arc<AtomicU64>,
    callback:   Option<ProgressCallback>,
    counters:   Arc<Counters>,
}

impl Reporter {
    /// Record that this attempt has moved `bytes_so_far` bytes.
    ///
    /// Positions at or below the object's high-water mark were already
    /// reported by an earlier attempt and are not reported or counted again.
    pub(crate) fn report(&self, bytes_so_far: u64) {
        let previous = self.high_water.fetch_max(bytes_so_far, Ordering::AcqRel);
        if bytes_so_far > previous {
            self.emit(bytes_so_far, bytes_so_far - previous);
        }
    }

    /// Completion notice for an empty object, which never sees a chunk.
    pub(crate) fn finish(&self) {
        if self.total == 0 {
            self.emit(0, 0);
        }
    }

    fn emit(&self, bytes_so_far: u64, fresh: u64) {
        self.counters
            .bytes_transferred
            .fetch_add(fresh, Ordering::Relaxed);
        if let Some(ref callback) = self.callback {
            callback(&Progress {
                direction: self.direction,
                oid: &self.oid,
                name: &self.name,
                total_bytes: self.total,
                bytes_so_far,
                chunk_len: usize::try_from(fresh).unwrap_or(usize::MAX),
            });
        }
    }
}
