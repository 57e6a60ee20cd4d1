use std::io::Read;

use lfsync_store::{Oid, Pointer, Store, StoreError};
use proptest::prelude::*;
use tempfile::tempdir;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn clean_then_smudge_reproduces_content(content in proptest::collection::vec(any::<u8>(), 0..64 * 1024)) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        let pointer = store.clean(&content[..], "blob").unwrap();
        prop_assert_eq!(pointer.size(), content.len() as u64);

        let mut restored = Vec::new();
        store.smudge(pointer.oid()).unwrap().read_to_end(&mut restored).unwrap();
        prop_assert_eq!(restored, content);
    }

    #[test]
    fn clean_is_deterministic(content in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let first_dir = tempdir().unwrap();
        let second_dir = tempdir().unwrap();
        let first = Store::open(first_dir.path()).unwrap();
        let second = Store::open(second_dir.path()).unwrap();

        let a = first.clean(&content[..], "a").unwrap();
        let b = first.clean(&content[..], "b").unwrap();
        let c = second.clean(&content[..], "c").unwrap();
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(&a, &c);
    }

    #[test]
    fn pointer_text_round_trips(size in any::<u64>(), digest in proptest::array::uniform32(any::<u8>())) {
        let pointer = Pointer::new(Oid::from_digest(&digest).unwrap(), size);
        let text = pointer.encode();
        let parsed = Pointer::parse(&text).unwrap();
        prop_assert_eq!(parsed.encode(), text);
        prop_assert_eq!(parsed, pointer);
    }
}

#[test]
fn test_identical_files_share_one_object() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();

    let first = store.clean(&b"duplicated asset"[..], "a.psd").unwrap();
    let second = store.clean(&b"duplicated asset"[..], "copy/a.psd").unwrap();

    assert_eq!(first.oid(), second.oid());
    assert_eq!(first.encode(), second.encode());
    assert_eq!(store.objects().unwrap().len(), 1);
}

#[test]
fn test_reconcile_when_already_stored() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).unwrap();
    let pointer = store.clean(&b"present"[..], "present.bin").unwrap();

    // The working file is never opened when the object is already stored.
    store
        .reconcile(pointer.oid(), &dir.path().join("does-not-exist"))
        .unwrap();
}

#[test]
fn test_reconcile_cleans_matching_working_file() {
    let store_dir = tempdir().unwrap();
    let work_dir = tempdir().unwrap();
    let store = Store::open(store_dir.path()).unwrap();

    let working_file = work_dir.path().join("model.bin");
    std::fs::write(&working_file, b"weights").unwrap();

    let scratch = tempdir().unwrap();
    let expected = Store::open(scratch.path())
        .unwrap()
        .clean(&b"weights"[..], "model.bin")
        .unwrap();

    assert!(!store.exists(expected.oid()));
    store.reconcile(expected.oid(), &working_file).unwrap();
    assert!(store.exists(expected.oid()));
}

#[test]
fn test_reconcile_rejects_modified_working_file() {
    let store_dir = tempdir().unwrap();
    let work_dir = tempdir().unwrap();
    let store = Store::open(store_dir.path()).unwrap();

    let scratch = tempdir().unwrap();
    let expected = Store::open(scratch.path())
        .unwrap()
        .clean(&b"original"[..], "doc.bin")
        .unwrap();

    let working_file = work_dir.path().join("doc.bin");
    std::fs::write(&working_file, b"edited after commit").unwrap();

    match store.reconcile(expected.oid(), &working_file) {
        Err(StoreError::IntegrityMismatch { expected: e, path, .. }) => {
            assert_eq!(&e, expected.oid());
            assert_eq!(path, working_file);
        }
        other => panic!("expected IntegrityMismatch, got {other:?}"),
    }
    assert!(!store.exists(expected.oid()));
    // Neither the expected object nor the edited content is left behind.
    assert!(store.objects().unwrap().is_empty());
    assert_eq!(std::fs::read_dir(store.root().join("tmp")).unwrap().count(), 0);
}
