//! Batch-authorized, concurrent transfer of large objects.
//!
//! A [`TransferQueue`] collects [`Transferable`]s for one direction, asks a
//! [`BatchAuthorizer`] for transfer links in a single request and moves the
//! bytes with a bounded pool of workers through an [`HttpClient`]. Downloads
//! stream into a [`Store`](lfsync_store::Store) and are verified against their
//! identifier before they become visible.
//!
//! # Architecture
//!
//! - `data` - configuration, protocol types and progress records
//! - `core` - pure helpers
//! - `effects` - network, store and worker-pool code behind trait seams
//!
//! ```no_run
//! use lfsync_store::Store;
//! use lfsync_transfer::{BatchApi, Remote, ReqwestClient, TransferQueue, Uploadable};
//!
//! # async fn run(oid: lfsync_store::Oid) -> lfsync_transfer::Result<()> {
//! let store = Store::open("/repo/.git/lfs")?;
//! let remote = Remote::new(ReqwestClient::new(), BatchApi::new("https://lfs.example.com/repo"));
//!
//! let mut queue = TransferQueue::new_upload(remote, store.clone(), 1, 0, false);
//! queue.add(Uploadable::new(&store, "/repo".as_ref(), oid, Some("assets/video.mp4"))?)?;
//!
//! let summary = queue.wait().await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

mod core;
mod data;
mod effects;
mod error;

pub use crate::core::retry_delay;
pub use data::{
    Action, Authorization, Direction, MAX_CONCURRENT_TRANSFERS, ObjectResource, ObjectSpec, Progress,
    ProgressCallback, QueueConfig, QueueState, RemoteObjectError, TransferTotals,
};
#[cfg(feature = "reqwest")]
pub use effects::{BatchApi, ReqwestClient};
pub use effects::{
    BatchAuthorizer, BoxStream, Downloadable, HttpClient, LFS_MEDIA_TYPE, ObjectError, ObjectOutcome, Outcome,
    ProgressTracker, ProgressTrackerBuilder, QueueHandle, Remote, Summary, TransferContext, TransferQueue,
    Transferable, Uploadable,
};
pub use error::{Result, TransferError};
