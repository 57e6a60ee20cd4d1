use std::io::Write;

use lfsync_fs::{StagedFile, StagingOptions};
use tempfile::tempdir;

#[test]
fn test_commit_replaces_existing_file() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("existing.txt");
    std::fs::write(&dest, "original").unwrap();

    let mut staged = StagedFile::new_in(dir.path(), StagingOptions::new()).unwrap();
    staged.write_all(b"new content").unwrap();
    staged.commit(&dest).unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), b"new content");
}

#[test]
fn test_uncommitted_file_is_never_visible_at_destination() {
    let dir = tempdir().unwrap();
    let dest = dir.path().join("object");

    let mut staged = StagedFile::new_in(dir.path().join("tmp"), StagingOptions::new()).unwrap();
    staged.write_all(b"half of the").unwrap();
    drop(staged);

    assert!(!dest.exists());
    assert_eq!(std::fs::read_dir(dir.path().join("tmp")).unwrap().count(), 0);
}

#[test]
fn test_discard_removes_file() {
    let dir = tempdir().unwrap();
    let staged = StagedFile::new_in(dir.path(), StagingOptions::new()).unwrap();
    let path = staged.path().to_path_buf();
    assert!(path.exists());

    staged.discard().unwrap();
    assert!(!path.exists());
}
