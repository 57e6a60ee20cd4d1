//! Effects layer: everything that touches the network, the store or the
//! clock.

pub mod batch;
pub mod context;
pub mod http;
pub mod queue;
pub mod tracker;
pub mod transferable;

#[cfg(feature = "reqwest")]
pub use batch::BatchApi;
pub use batch::BatchAuthorizer;
pub use context::TransferContext;
#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;
pub use http::{BoxStream, HttpClient, LFS_MEDIA_TYPE};
pub use queue::{ObjectError, ObjectOutcome, Outcome, QueueHandle, Remote, Summary, TransferQueue};
pub use tracker::{ProgressTracker, ProgressTrackerBuilder};
pub use transferable::{Downloadable, Transferable, Uploadable};
