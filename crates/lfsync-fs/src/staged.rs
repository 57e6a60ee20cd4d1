use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::{Error, Result};

#[derive(Clone, Copy, Debug)]
pub struct StagingOptions {
    prefix: &'static str,
    suffix: &'static str,
    sync:   bool,
}

impl Default for StagingOptions {
    fn default() -> Self { Self::new() }
}

impl StagingOptions {
    pub fn new() -> Self {
        Self {
            prefix: ".",
            suffix: ".tmp",
            sync:   true,
        }
    }

    pub fn prefix(mut self, prefix: &'static str) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn suffix(mut self, suffix: &'static str) -> Self {
        self.suffix = suffix;
        self
    }

    /// Flush file contents to disk before the rename.
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }
}

/// A temporary file that becomes visible under its final name only on commit.
///
/// Dropping an uncommitted `StagedFile` deletes it, which gives every early
/// return and every `?` the same teardown.
#[derive(Debug)]
pub struct StagedFile {
    inner:   NamedTempFile,
    options: StagingOptions,
    written: u64,
}

impl StagedFile {
    /// Create a staged file inside `dir`, creating the directory if needed.
    ///
    /// `dir` should live on the same filesystem as the eventual destination
    /// so that [`StagedFile::commit`] is a rename rather than a copy.
    pub fn new_in(dir: impl AsRef<Path>, options: StagingOptions) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|source| Error::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let inner = tempfile::Builder::new()
            .prefix(options.prefix)
            .suffix(options.suffix)
            .tempfile_in(dir)
            .map_err(|source| Error::Write {
                path: dir.to_path_buf(),
                source,
            })?;

        Ok(Self {
            inner,
            options,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path { self.inner.path() }

    /// Bytes written so far.
    pub fn written(&self) -> u64 { self.written }

    /// Rename the staged file to `destination`, replacing any existing file.
    pub fn commit(mut self, destination: impl AsRef<Path>) -> Result<PathBuf> {
        let destination = destination.as_ref();
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let staged_path = self.inner.path().to_path_buf();
        let write_err = |source| Error::Write {
            path: staged_path.clone(),
            source,
        };
        self.inner.flush().map_err(write_err)?;
        if self.options.sync {
            self.inner.as_file().sync_all().map_err(write_err)?;
        }

        self.inner
            .persist(destination)
            .map_err(|e| Error::Persist {
                from:   staged_path.clone(),
                to:     destination.to_path_buf(),
                source: e.error,
            })?;

        Ok(destination.to_path_buf())
    }

    /// Remove the staged file now, reporting failures instead of ignoring them.
    pub fn discard(self) -> Result<()> {
        let path = self.inner.path().to_path_buf();
        self.inner
            .close()
            .map_err(|source| Error::Write { path, source })
    }
}

impl Write for StagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> { self.inner.flush() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_commit_places_file() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("nested").join("object");

        let mut staged = StagedFile::new_in(dir.path().join("tmp"), StagingOptions::new()).unwrap();
        staged.write_all(b"hello world").unwrap();
        assert_eq!(staged.written(), 11);
        assert!(!dest.exists());

        staged.commit(&dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"hello world");
    }

    #[test]
    fn test_drop_removes_staged_file() {
        let dir = tempdir().unwrap();
        let staged_path = {
            let mut staged = StagedFile::new_in(dir.path(), StagingOptions::new()).unwrap();
            staged.write_all(b"partial").unwrap();
            staged.path().to_path_buf()
        };
        assert!(!staged_path.exists());
    }

    #[test]
    fn test_staging_name_uses_options() {
        let dir = tempdir().unwrap();
        let options = StagingOptions::new().prefix("obj-").suffix(".part").sync(false);
        let staged = StagedFile::new_in(dir.path(), options).unwrap();
        let name = staged.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("obj-"));
        assert!(name.ends_with(".part"));
        staged.discard().unwrap();
    }
}
