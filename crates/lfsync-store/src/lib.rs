//! Content-addressable storage for large objects.
//!
//! Objects are keyed by the SHA-256 of their content ([`Oid`]) and stored
//! under a two-level sharded directory tree. Tracked files are replaced by a
//! small text [`Pointer`]; [`Store::clean`] turns content into a pointer and
//! [`Store::smudge`] turns a pointer back into content.
//!
//! ```no_run
//! use lfsync_store::Store;
//!
//! let store = Store::open("/repo/.git/lfs")?;
//! let pointer = store.clean(&b"large binary payload"[..], "payload.bin")?;
//! let mut content = store.smudge(pointer.oid())?;
//! # Ok::<(), lfsync_store::StoreError>(())
//! ```

mod error;
mod filter;
mod oid;
mod pointer;
mod store;

pub use error::{Result, StoreError};
pub use oid::Oid;
pub use pointer::{LEGACY_VERSION, MAX_POINTER_SIZE, Pointer, VERSION};
pub use store::{ObjectWriter, Store};
