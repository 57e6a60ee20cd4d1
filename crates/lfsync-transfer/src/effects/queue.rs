//! Batch orchestration: authorize once, then transfer with a bounded pool.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use lfsync_store::{Oid, Store};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::retry_delay;
use crate::data::{Direction, ProgressCallback, QueueConfig, QueueState, TransferTotals};
use crate::effects::batch::BatchAuthorizer;
use crate::effects::context::{Counters, TransferContext};
use crate::effects::http::HttpClient;
use crate::effects::transferable::Transferable;
use crate::error::{Result, TransferError};

const MISSING_OBJECT_CODE: u16 = 404;

/// The two remote collaborators of a queue.
pub struct Remote<C, A> {
    pub client:     Arc<C>,
    pub authorizer: Arc<A>,
}

impl<C, A> Remote<C, A> {
    pub fn new(client: C, authorizer: A) -> Self {
        Self {
            client:     Arc::new(client),
            authorizer: Arc::new(authorizer),
        }
    }
}

impl<C, A> Clone for Remote<C, A> {
    fn clone(&self) -> Self {
        Self {
            client:     Arc::clone(&self.client),
            authorizer: Arc::clone(&self.authorizer),
        }
    }
}

/// What happened to one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Bytes were moved.
    Transferred { bytes: u64 },
    /// The remote already had the object; nothing was uploaded.
    AlreadyPresent,
    /// Dry run: the object would have been transferred.
    Skipped,
    /// See [`Summary::errors`] for the cause.
    Failed { retryable: bool },
    /// Never dispatched because the batch was cancelled.
    Cancelled,
}

impl Outcome {
    pub fn is_success(&self) -> bool { matches!(self, Self::Transferred { .. } | Self::AlreadyPresent) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectOutcome {
    pub oid:     Oid,
    pub name:    String,
    pub outcome: Outcome,
}

/// A failure attributed to one object.
#[derive(Debug)]
pub struct ObjectError {
    pub oid:   Oid,
    pub name:  String,
    pub error: TransferError,
}

impl ObjectError {
    pub fn is_retryable(&self) -> bool { self.error.is_retryable() }
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}: {}", self.oid, self.error)
        } else {
            write!(f, "{} ({}): {}", self.name, self.oid, self.error)
        }
    }
}

/// Final report of a queue run.
#[derive(Debug)]
pub struct Summary {
    pub direction:         Direction,
    pub succeeded:         usize,
    pub failed:            usize,
    pub skipped:           usize,
    pub cancelled:         usize,
    pub bytes_transferred: u64,
    /// One entry per added object, in add order.
    pub outcomes:          Vec<ObjectOutcome>,
    /// Failures in add order.
    pub errors:            Vec<ObjectError>,
}

impl Summary {
    /// No object failed and none was cancelled.
    pub fn is_success(&self) -> bool { self.failed == 0 && self.cancelled == 0 }

    /// Failures worth another attempt.
    pub fn retryable_errors(&self) -> impl Iterator<Item = &ObjectError> {
        self.errors.iter().filter(|e| e.is_retryable())
    }

    /// Failures that will recur with the same inputs.
    pub fn fatal_errors(&self) -> impl Iterator<Item = &ObjectError> {
        self.errors.iter().filter(|e| !e.is_retryable())
    }

    pub fn outcome(&self, oid: &Oid) -> Option<Outcome> {
        self.outcomes
            .iter()
            .find(|o| &o.oid == oid)
            .map(|o| o.outcome)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} succeeded, {} failed, {} skipped, {} cancelled, {} bytes",
            self.direction, self.succeeded, self.failed, self.skipped, self.cancelled, self.bytes_transferred
        )?;
        for error in &self.errors {
            let kind = if error.is_retryable() { "retryable" } else { "fatal" };
            write!(f, "\n  [{kind}] {error}")?;
        }
        Ok(())
    }
}

/// Read-only view of a running queue.
#[derive(Clone)]
pub struct QueueHandle {
    cancel:   CancellationToken,
    state:    watch::Receiver<QueueState>,
    counters: Arc<Counters>,
}

impl QueueHandle {
    pub fn cancel(&self) { self.cancel.cancel() }

    pub fn state(&self) -> QueueState { *self.state.borrow() }

    pub fn totals(&self) -> TransferTotals { self.counters.snapshot() }

    /// Wait until the queue reaches `state` or finishes.
    pub async fn reached(&mut self, state: QueueState) -> QueueState {
        self.state
            .wait_for(|current| *current == state || *current == QueueState::Done)
            .await
            .map(|current| *current)
            .unwrap_or(QueueState::Done)
    }
}

/// Transfers one batch of objects in one direction.
///
/// Objects are collected with [`add`](Self::add), authorized with a single
/// batch request and then moved by a fixed-size worker pool. Per-object
/// failures are recorded in the [`Summary`]; only a failed authorization
/// request fails the whole run.
pub struct TransferQueue<C, A> {
    direction:      Direction,
    authorizer:     Arc<A>,
    ctx:            TransferContext<C>,
    config:         QueueConfig,
    items:          Vec<Transferable>,
    seen:           HashSet<Oid>,
    expected_files: usize,
    expected_bytes: u64,
    state:          Arc<watch::Sender<QueueState>>,
}

impl<C: HttpClient, A: BatchAuthorizer> TransferQueue<C, A> {
    /// A queue for uploads. `files` and `bytes` are the caller's estimate,
    /// used for progress sizing only.
    pub fn new_upload(remote: Remote<C, A>, store: Store, files: usize, bytes: u64, dry_run: bool) -> Self {
        Self::new(Direction::Upload, remote, store, files, bytes, dry_run)
    }

    pub fn new_download(remote: Remote<C, A>, store: Store, files: usize, bytes: u64, dry_run: bool) -> Self {
        Self::new(Direction::Download, remote, store, files, bytes, dry_run)
    }

    fn new(direction: Direction, remote: Remote<C, A>, store: Store, files: usize, bytes: u64, dry_run: bool) -> Self {
        let config = QueueConfig::default().dry_run(dry_run);
        let (state, _) = watch::channel(QueueState::Collecting);
        Self {
            direction,
            authorizer: remote.authorizer,
            ctx: TransferContext::new(remote.client, store).with_chunk_size(config.effective_chunk_size()),
            config,
            items: Vec::with_capacity(files),
            seen: HashSet::with_capacity(files),
            expected_files: files,
            expected_bytes: bytes,
            state: Arc::new(state),
        }
    }

    /// Replace the configuration. The dry-run flag given at construction is
    /// kept if `config` does not set one.
    #[must_use]
    pub fn with_config(mut self, config: QueueConfig) -> Self {
        let dry_run = self.config.dry_run || config.dry_run;
        self.ctx = self.ctx.with_chunk_size(config.effective_chunk_size());
        self.config = config.dry_run(dry_run);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.ctx = self.ctx.with_progress(callback);
        self
    }

    /// Queue a transfer. Returns `false` if an object with the same
    /// identifier is already queued.
    pub fn add(&mut self, transferable: impl Into<Transferable>) -> Result<bool> {
        let transferable = transferable.into();
        if transferable.direction() != self.direction {
            return Err(TransferError::WrongDirection {
                expected: self.direction,
                actual:   transferable.direction(),
            });
        }
        if !self.seen.insert(transferable.oid().clone()) {
            debug!(oid = %transferable.oid(), name = transferable.name(), "object already queued");
            return Ok(false);
        }
        self.items.push(transferable);
        Ok(true)
    }

    pub fn direction(&self) -> Direction { self.direction }

    pub fn len(&self) -> usize { self.items.len() }

    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    /// The caller-declared `(files, bytes)` budget.
    pub fn expected(&self) -> (usize, u64) { (self.expected_files, self.expected_bytes) }

    pub fn config(&self) -> &QueueConfig { &self.config }

    pub fn state(&self) -> QueueState { *self.state.borrow() }

    pub fn totals(&self) -> TransferTotals { self.ctx.totals() }

    /// Cancelling the token stops the run at the next chunk boundary.
    pub fn cancel_handle(&self) -> CancellationToken { self.ctx.cancel.clone() }

    pub fn handle(&self) -> QueueHandle {
        QueueHandle {
            cancel:   self.ctx.cancel.clone(),
            state:    self.state.subscribe(),
            counters: Arc::clone(&self.ctx.counters),
        }
    }

    /// Run the batch to completion.
    ///
    /// Fails only when the initial authorization request fails; every other
    /// problem is reported per object in the returned [`Summary`].
    pub async fn wait(self) -> Result<Summary> {
        let Self {
            direction,
            authorizer,
            ctx,
            config,
            mut items,
            state,
            ..
        } = self;

        let total_bytes: u64 = items.iter().map(Transferable::size).sum();
        info!(%direction, objects = items.len(), bytes = total_bytes, dry_run = config.dry_run, "starting batch");

        let mut outcomes: Vec<Option<Outcome>> = vec![None; items.len()];
        let mut errors: Vec<Option<TransferError>> = (0..items.len()).map(|_| None).collect();
        let mut pending: Vec<usize> = (0..items.len()).collect();
        let mut round = 0u32;

        while !pending.is_empty() {
            if ctx.cancel.is_cancelled() {
                for index in pending.drain(..) {
                    outcomes[index] = Some(Outcome::Cancelled);
                    errors[index] = None;
                }
                break;
            }

            state.send_replace(QueueState::Authorizing);
            let specs: Vec<_> = pending.iter().map(|&index| items[index].spec()).collect();
            let mut authorization = match authorizer.authorize(direction, &specs).await {
                Ok(authorization) => authorization,
                Err(error) if round == 0 => {
                    warn!(%direction, %error, "batch authorization failed");
                    state.send_replace(QueueState::Done);
                    return Err(error);
                }
                Err(error) => {
                    // Objects keep their expired-link failure from the previous round.
                    warn!(%direction, %error, round, objects = pending.len(), "re-authorization failed");
                    break;
                }
            };

            let mut work = VecDeque::new();
            for index in pending.drain(..) {
                let item = &items[index];
                let granted = match authorization.remove(item.oid()) {
                    Some(Ok(resource)) => resource,
                    Some(Err(remote)) => {
                        record_failure(
                            item,
                            TransferError::Object {
                                code:    remote.code,
                                message: remote.message,
                            },
                            &mut outcomes[index],
                            &mut errors[index],
                        );
                        continue;
                    }
                    None => {
                        record_failure(
                            item,
                            TransferError::Object {
                                code:    MISSING_OBJECT_CODE,
                                message: "object missing from batch response".to_string(),
                            },
                            &mut outcomes[index],
                            &mut errors[index],
                        );
                        continue;
                    }
                };

                item.set_object(granted);
                if !item.needs_transfer() {
                    match direction {
                        Direction::Upload => {
                            debug!(oid = %item.oid(), "already present on remote");
                            outcomes[index] = Some(Outcome::AlreadyPresent);
                            errors[index] = None;
                        }
                        Direction::Download => record_failure(
                            item,
                            TransferError::MissingAction("download"),
                            &mut outcomes[index],
                            &mut errors[index],
                        ),
                    }
                } else if config.dry_run {
                    debug!(oid = %item.oid(), size = item.size(), "dry run, would transfer");
                    outcomes[index] = Some(Outcome::Skipped);
                } else {
                    if round == 0 {
                        ctx.counters.expect(item.size());
                    }
                    work.push_back((index, item.clone()));
                }
            }

            if work.is_empty() {
                break;
            }

            state.send_replace(QueueState::Running);
            let dispatched = work.len();
            let workers = config.workers().min(dispatched);
            info!(%direction, objects = dispatched, workers, round, "transferring");

            let run = run_pool(&ctx, work, workers, &state).await;
            for (index, result) in run.results {
                let item = &items[index];
                match result {
                    Ok(bytes) => {
                        debug!(oid = %item.oid(), bytes, "transfer complete");
                        outcomes[index] = Some(Outcome::Transferred { bytes });
                        errors[index] = None;
                    }
                    Err(TransferError::AuthExpired) if round < config.max_reauthorizations => {
                        debug!(oid = %item.oid(), "authorization expired, re-authorizing");
                        outcomes[index] = Some(Outcome::Failed { retryable: true });
                        errors[index] = Some(TransferError::AuthExpired);
                        pending.push(index);
                    }
                    Err(error) => record_failure(item, error, &mut outcomes[index], &mut errors[index]),
                }
            }
            for index in run.unclaimed {
                outcomes[index] = Some(Outcome::Cancelled);
                errors[index] = None;
            }
            for index in run.lost {
                let message = run.panic.clone().unwrap_or_else(|| "worker exited".to_string());
                record_failure(
                    &items[index],
                    TransferError::Worker(message),
                    &mut outcomes[index],
                    &mut errors[index],
                );
            }

            if pending.is_empty() {
                break;
            }
            pending.sort_unstable();
            for &index in &pending {
                items[index] = items[index].unauthorized();
            }

            let delay = retry_delay(round, config.backoff());
            round += 1;
            tokio::select! {
                () = ctx.cancel.cancelled() => {}
                () = tokio::time::sleep(delay) => {}
            }
        }

        let summary = summarize(direction, &items, outcomes, errors);
        state.send_replace(QueueState::Done);
        info!(
            %direction,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            bytes = summary.bytes_transferred,
            "batch finished"
        );
        Ok(summary)
    }
}

fn record_failure(
    item: &Transferable,
    error: TransferError,
    outcome: &mut Option<Outcome>,
    slot: &mut Option<TransferError>,
) {
    let retryable = error.is_retryable();
    warn!(oid = %item.oid(), name = item.name(), retryable, %error, "transfer failed");
    *outcome = Some(Outcome::Failed { retryable });
    *slot = Some(error);
}

struct PoolRun {
    results:   Vec<(usize, Result<u64>)>,
    /// Never claimed because the run was cancelled.
    unclaimed: Vec<usize>,
    /// Claimed by a worker that died before reporting.
    lost:      Vec<usize>,
    panic:     Option<String>,
}

async fn run_pool<C: HttpClient>(
    ctx: &TransferContext<C>,
    work: VecDeque<(usize, Transferable)>,
    workers: usize,
    state: &Arc<watch::Sender<QueueState>>,
) -> PoolRun {
    let mut dispatched: HashSet<usize> = work.iter().map(|(index, _)| *index).collect();
    let queue = Arc::new(Mutex::new(work));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut set = JoinSet::new();
    for id in 0..workers {
        set.spawn(worker(
            id,
            ctx.clone(),
            Arc::clone(&queue),
            tx.clone(),
            Arc::clone(state),
        ));
    }
    drop(tx);

    let mut results = Vec::with_capacity(dispatched.len());
    while let Some((index, result)) = rx.recv().await {
        dispatched.remove(&index);
        results.push((index, result));
    }

    let mut panic = None;
    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined {
            panic = Some(e.to_string());
        }
    }

    let unclaimed: Vec<usize> = queue.lock().await.drain(..).map(|(index, _)| index).collect();
    for index in &unclaimed {
        dispatched.remove(index);
    }
    let mut lost: Vec<usize> = dispatched.into_iter().collect();
    lost.sort_unstable();

    PoolRun {
        results,
        unclaimed,
        lost,
        panic,
    }
}

async fn worker<C: HttpClient>(
    id: usize,
    ctx: TransferContext<C>,
    queue: Arc<Mutex<VecDeque<(usize, Transferable)>>>,
    tx: mpsc::UnboundedSender<(usize, Result<u64>)>,
    state: Arc<watch::Sender<QueueState>>,
) {
    loop {
        let claimed = {
            let mut queue = queue.lock().await;
            if ctx.cancel.is_cancelled() {
                None
            } else {
                queue.pop_front()
            }
        };
        let Some((index, item)) = claimed else {
            state.send_if_modified(|current| {
                let draining = *current == QueueState::Running;
                if draining {
                    *current = QueueState::Draining;
                }
                draining
            });
            break;
        };

        debug!(worker = id, oid = %item.oid(), size = item.size(), "claimed object");
        let result = item.transfer(&ctx).await;
        if tx.send((index, result)).is_err() {
            break;
        }
    }
}

fn summarize(
    direction: Direction,
    items: &[Transferable],
    outcomes: Vec<Option<Outcome>>,
    errors: Vec<Option<TransferError>>,
) -> Summary {
    let mut summary = Summary {
        direction,
        succeeded: 0,
        failed: 0,
        skipped: 0,
        cancelled: 0,
        bytes_transferred: 0,
        outcomes: Vec::with_capacity(items.len()),
        errors: Vec::new(),
    };

    for ((item, outcome), error) in items.iter().zip(outcomes).zip(errors) {
        let outcome = outcome.unwrap_or(Outcome::Cancelled);
        match outcome {
            Outcome::Transferred { bytes } => {
                summary.succeeded += 1;
                summary.bytes_transferred += bytes;
            }
            Outcome::AlreadyPresent => summary.succeeded += 1,
            Outcome::Skipped => summary.skipped += 1,
            Outcome::Failed { .. } => summary.failed += 1,
            Outcome::Cancelled => summary.cancelled += 1,
        }
        if let Some(error) = error {
            summary.errors.push(ObjectError {
                oid: item.oid().clone(),
                name: item.name().to_string(),
                error,
            });
        }
        summary.outcomes.push(ObjectOutcome {
            oid: item.oid().clone(),
            name: item.name().to_string(),
            outcome,
        });
    }
    summary
}
