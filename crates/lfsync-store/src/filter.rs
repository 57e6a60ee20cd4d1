//! Clean and smudge transforms between content and pointers.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use lfsync_verify::{Sha256Hasher, VerifiedReader};
use tracing::debug;

use crate::{Oid, Pointer, Result, Store, StoreError};

impl Store {
    /// Hash `reader` into the store and return the pointer that replaces it.
    ///
    /// Bytes are staged while they are hashed and only become visible under
    /// their identifier once the stream is complete. The staging file is
    /// removed on every exit path, including I/O failures part way through.
    /// Cleaning content that is already stored leaves the existing object
    /// untouched.
    pub fn clean(&self, mut reader: impl Read, name: &str) -> Result<Pointer> {
        let mut writer = self.stage()?;
        io::copy(&mut reader, &mut writer).map_err(|e| StoreError::io(name, e))?;
        let (oid, size) = writer.commit(None)?;
        debug!(%oid, size, name, "cleaned");
        Ok(Pointer::new(oid, size))
    }

    /// Reader over the stored content for `oid`.
    ///
    /// Fails with [`StoreError::NotFound`] when the object has not been
    /// downloaded yet.
    pub fn smudge(&self, oid: &Oid) -> Result<File> { self.open_object(oid) }

    /// Copy the content `pointer` refers to into `writer`.
    ///
    /// The stored bytes are re-hashed on the way out, so a damaged object
    /// fails with [`StoreError::Integrity`] instead of being passed on.
    pub fn smudge_to(&self, pointer: &Pointer, mut writer: impl Write) -> Result<u64> {
        let path = self.locate(pointer.oid());
        let mut reader = VerifiedReader::new(self.smudge(pointer.oid())?, Sha256Hasher::new());
        let copied = io::copy(&mut reader, &mut writer).map_err(|e| StoreError::io(&path, e))?;
        if copied != pointer.size() {
            return Err(StoreError::io(
                path,
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("expected {} bytes, read {copied}", pointer.size()),
                ),
            ));
        }

        let (digest, _) = reader.into_digest();
        let actual = Oid::from_digest(&digest)?;
        if actual != *pointer.oid() {
            return Err(StoreError::Integrity {
                expected: pointer.oid().clone(),
                actual,
            });
        }
        Ok(copied)
    }

    /// Make sure the store holds `expected`, cleaning `working_file` into it
    /// if necessary.
    ///
    /// Succeeds immediately when the object is already stored. Otherwise the
    /// working file is staged and must hash to `expected`; a different digest
    /// fails with [`StoreError::IntegrityMismatch`] and leaves the store as it
    /// was.
    pub fn reconcile(&self, expected: &Oid, working_file: &Path) -> Result<()> {
        if self.exists(expected) {
            return Ok(());
        }

        let mut file = File::open(working_file).map_err(|e| StoreError::io(working_file, e))?;
        let mut writer = self.stage()?;
        io::copy(&mut file, &mut writer).map_err(|e| StoreError::io(working_file, e))?;

        match writer.commit(Some(expected)) {
            Ok((oid, size)) => {
                debug!(%oid, size, path = %working_file.display(), "reconciled working file");
                Ok(())
            }
            Err(StoreError::Integrity { expected, actual }) => Err(StoreError::IntegrityMismatch {
                expected,
                actual,
                path: working_file.to_path_buf(),
            }),
            Err(e) => Err(e),
        }
    }
}
