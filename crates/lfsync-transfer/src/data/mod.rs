//! Data layer: immutable types describing objects, authorizations, progress
//! and queue configuration.

mod config;
mod object;
mod progress;

pub use config::{MAX_CONCURRENT_TRANSFERS, QueueConfig};
pub use object::{Action, Authorization, Direction, ObjectResource, ObjectSpec, RemoteObjectError};
pub use progress::{Progress, ProgressCallback, QueueState, TransferTotals};
