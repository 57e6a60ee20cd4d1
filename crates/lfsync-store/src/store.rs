use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use lfsync_fs::{StagedFile, StagingOptions};
use lfsync_verify::{Hasher, Sha256Hasher};
use tracing::debug;

use crate::{Oid, Result, StoreError};

const OBJECTS_DIR: &str = "objects";
const TMP_DIR: &str = "tmp";

/// On-disk content-addressable store.
///
/// Layout:
///
/// ```text
/// <root>/
///   objects/<oid[0..2]>/<oid[2..4]>/<oid>
///   tmp/                                    staging area, same filesystem
/// ```
///
/// Cloning is cheap and every clone refers to the same directory, so one
/// store can be shared by all workers of a process.
#[derive(Debug, Clone)]
pub struct Store {
    root:    PathBuf,
    objects: PathBuf,
    tmp:     PathBuf,
}

impl Store {
    /// Open the store rooted at `root`, creating its directories if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let objects = root.join(OBJECTS_DIR);
        let tmp = root.join(TMP_DIR);
        for dir in [&objects, &tmp] {
            fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        }
        Ok(Self { root, objects, tmp })
    }

    pub fn root(&self) -> &Path { &self.root }

    /// Path an object lives at. Pure; the object need not exist.
    pub fn locate(&self, oid: &Oid) -> PathBuf {
        let (first, second) = oid.shards();
        self.objects.join(first).join(second).join(oid.as_str())
    }

    pub fn exists(&self, oid: &Oid) -> bool { self.locate(oid).is_file() }

    pub fn size(&self, oid: &Oid) -> Result<u64> {
        let path = self.locate(oid);
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            Ok(_) => Err(StoreError::NotFound(oid.clone())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound(oid.clone())),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    /// Open a stored object for reading.
    pub fn open_object(&self, oid: &Oid) -> Result<File> {
        let path = self.locate(oid);
        File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(oid.clone()),
            _ => StoreError::io(path, e),
        })
    }

    /// Start writing a new object. Nothing is visible in the store until
    /// [`ObjectWriter::commit`] succeeds.
    pub fn stage(&self) -> Result<ObjectWriter> {
        let staged = StagedFile::new_in(&self.tmp, StagingOptions::new().prefix("obj-"))?;
        Ok(ObjectWriter {
            store: self.clone(),
            staged,
            hasher: Sha256Hasher::new(),
        })
    }

    /// Stream `reader` into the store under `expected`, rejecting content
    /// that does not hash to it. Returns the object size.
    pub fn write(&self, expected: &Oid, mut reader: impl Read) -> Result<u64> {
        let mut writer = self.stage()?;
        io::copy(&mut reader, &mut writer).map_err(|e| StoreError::io(writer.path(), e))?;
        let (_, size) = writer.commit(Some(expected))?;
        Ok(size)
    }

    /// Stream `reader` into the store, returning whatever identifier the
    /// content hashes to.
    pub fn insert(&self, mut reader: impl Read) -> Result<(Oid, u64)> {
        let mut writer = self.stage()?;
        io::copy(&mut reader, &mut writer).map_err(|e| StoreError::io(writer.path(), e))?;
        writer.commit(None)
    }

    /// All object identifiers currently stored, sorted.
    pub fn objects(&self) -> Result<Vec<Oid>> {
        let mut found = Vec::new();
        for first in read_dirs(&self.objects)? {
            for second in read_dirs(&first)? {
                let entries = fs::read_dir(&second).map_err(|e| StoreError::io(&second, e))?;
                for entry in entries {
                    let entry = entry.map_err(|e| StoreError::io(&second, e))?;
                    if let Some(oid) = entry.file_name().to_str().and_then(|n| n.parse().ok()) {
                        found.push(oid);
                    }
                }
            }
        }
        found.sort();
        Ok(found)
    }
}

fn read_dirs(path: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(path).map_err(|e| StoreError::io(path, e))? {
        let entry = entry.map_err(|e| StoreError::io(path, e))?;
        if entry.file_type().map_err(|e| StoreError::io(entry.path(), e))?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

/// Staged object being written into a [`Store`].
///
/// Hashes bytes as they are written. Dropping the writer without committing
/// removes the staging file.
pub struct ObjectWriter {
    store:  Store,
    staged: StagedFile,
    hasher: Sha256Hasher,
}

impl ObjectWriter {
    pub fn path(&self) -> &Path { self.staged.path() }

    pub fn written(&self) -> u64 { self.staged.written() }

    /// Finalize the object under the identifier its content hashes to.
    ///
    /// With `expected` set, a digest mismatch fails with
    /// [`StoreError::Integrity`] and the staged bytes are discarded. When the
    /// object is already stored the staged copy is dropped and the existing
    /// file is left untouched.
    pub fn commit(self, expected: Option<&Oid>) -> Result<(Oid, u64)> {
        let size = self.staged.written();
        let oid = Oid::from_digest(&self.hasher.finalize())?;

        if let Some(expected) = expected
            && *expected != oid
        {
            return Err(StoreError::Integrity {
                expected: expected.clone(),
                actual:   oid,
            });
        }

        if self.store.exists(&oid) {
            debug!(%oid, size, "object already stored");
            self.staged.discard()?;
        } else {
            self.staged.commit(self.store.locate(&oid))?;
            debug!(%oid, size, "object stored");
        }
        Ok((oid, size))
    }
}

impl Write for ObjectWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.staged.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> { self.staged.flush() }
}
