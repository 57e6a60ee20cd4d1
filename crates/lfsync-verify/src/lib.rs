//! Incremental hashing for content-addressed storage.
//!
//! Digests are computed while bytes stream through a reader, so an object is
//! hashed and written in a single pass.
//!
//! # Example
//!
//! ```
//! use std::io::Read;
//! use lfsync_verify::{Sha256Hasher, VerifiedReader};
//!
//! let expected = Sha256Hasher::digest(b"hello world");
//!
//! let mut reader = VerifiedReader::new(&b"hello world"[..], Sha256Hasher::new());
//! let mut buffer = Vec::new();
//! reader.read_to_end(&mut buffer).unwrap();
//!
//! assert_eq!(reader.finish(&expected).unwrap(), 11);
//! ```

pub use self::error::{Result, VerifyError};
pub use self::hasher::Hasher;
pub use self::reader::VerifiedReader;

#[cfg(feature = "sha256")]
pub use self::hasher::Sha256Hasher;

mod error;
mod hasher;
mod reader;
