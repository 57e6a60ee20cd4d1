//! Filesystem primitives for the object store.
//!
//! Bytes are written to a [`StagedFile`] next to their destination and renamed
//! into place once complete, so readers never observe a partially written
//! file. A staged file that is dropped without being committed is removed.

mod error;
mod staged;

pub use error::{Error, Result};
pub use staged::{StagedFile, StagingOptions};
