use std::sync::Arc;

use cdconf_artifact::ContentHash;
use cdconf_merge::OptimisticLock;
use cdconf_store::{
    CommitMeta, FileRevisionStore, MemoryRevisionStore, MergeKind, MergeResult, RevisionStore, StoreError,
};
use chrono::Utc;
use proptest::prelude::*;

const BASE: &str = "name: build\ntimeout: 10\n---\nname: deploy\ntimeout: 30\n";

fn meta(author: &str) -> CommitMeta {
    CommitMeta::new(author, "test", Utc::now())
}

fn stores() -> Vec<(Box<dyn RevisionStore>, Option<tempfile::TempDir>)> {
    let dir = tempfile::tempdir().unwrap();
    vec![
        (Box::new(MemoryRevisionStore::new()), None),
        (Box::new(FileRevisionStore::open(dir.path()).unwrap()), Some(dir)),
    ]
}

#[test]
fn test_first_merge_is_initial() {
    for (store, _dir) in stores() {
        let result = store.merge_against_latest(BASE, &ContentHash::zero()).unwrap();
        assert_eq!(
            result,
            MergeResult::Success {
                text: BASE.to_owned(),
                kind: MergeKind::Initial
            }
        );
    }
}

#[test]
fn test_fast_forward_returns_candidate_unchanged() {
    for (store, _dir) in stores() {
        let r0 = store.commit(BASE, meta("alice")).unwrap();
        let candidate = BASE.replace("timeout: 10", "timeout: 20");
        let result = store.merge_against_latest(&candidate, &r0.content_hash).unwrap();
        assert_eq!(
            result,
            MergeResult::Success {
                text: candidate,
                kind: MergeKind::FastForward
            }
        );
    }
}

#[test]
fn test_three_way_merge_against_newer_latest() {
    for (store, _dir) in stores() {
        let r0 = store.commit(BASE, meta("alice")).unwrap();
        store.commit(&BASE.replace("timeout: 30", "timeout: 45"), meta("bob")).unwrap();

        let ours = BASE.replace("timeout: 10", "timeout: 20");
        match store.merge_against_latest(&ours, &r0.content_hash).unwrap() {
            MergeResult::Success { text, kind } => {
                assert_eq!(kind, MergeKind::ThreeWay);
                assert!(text.contains("timeout: 20") && text.contains("timeout: 45"));
            }
            MergeResult::Conflict(c) => panic!("unexpected conflict: {c}"),
        }
    }
}

#[test]
fn test_conflicting_edit_reports_conflict() {
    let store = MemoryRevisionStore::new();
    let r0 = store.commit(BASE, meta("alice")).unwrap();
    store.commit(&BASE.replace("timeout: 10", "timeout: 15"), meta("bob")).unwrap();

    let result = store
        .merge_against_latest(&BASE.replace("timeout: 10", "timeout: 20"), &r0.content_hash)
        .unwrap();
    assert!(!result.is_success());
}

#[test]
fn test_strategy_is_pluggable() {
    let store = MemoryRevisionStore::new();
    let r0 = store.commit(BASE, meta("alice")).unwrap();
    store.commit(&BASE.replace("timeout: 30", "timeout: 45"), meta("bob")).unwrap();

    let ours = BASE.replace("timeout: 10", "timeout: 20");
    let result = store
        .merge_against_latest_with(&ours, &r0.content_hash, &OptimisticLock)
        .unwrap();
    assert!(matches!(result, MergeResult::Conflict(_)));
}

#[test]
fn test_unknown_ancestor_is_error() {
    let store = MemoryRevisionStore::new();
    let unknown = ContentHash::of_text("never committed");
    assert!(matches!(
        store.merge_against_latest(BASE, &unknown),
        Err(StoreError::UnknownRevision(h)) if h == unknown
    ));

    store.commit(BASE, meta("alice")).unwrap();
    store.commit("other\n", meta("alice")).unwrap();
    assert!(matches!(
        store.merge_against_latest(BASE, &unknown),
        Err(StoreError::UnknownRevision(_))
    ));
}

#[test]
fn test_concurrent_commits_keep_chain() {
    let store = Arc::new(MemoryRevisionStore::new());
    std::thread::scope(|s| {
        for t in 0..4 {
            let store = Arc::clone(&store);
            s.spawn(move || {
                for i in 0..25 {
                    store.commit(&format!("{t}-{i}\n"), meta("worker")).unwrap();
                }
            });
        }
    });
    assert_eq!(store.len(), 100);
    store.verify_chain().unwrap();
}

proptest! {
    #[test]
    fn prop_file_store_reopens_identically(texts in proptest::collection::vec("[a-z]{1,8}\n", 1..12)) {
        let dir = tempfile::tempdir().unwrap();
        let expected = {
            let store = FileRevisionStore::open(dir.path()).unwrap();
            for text in &texts {
                store.commit(text, meta("alice")).unwrap();
            }
            store.history(usize::MAX).unwrap()
        };
        let reopened = FileRevisionStore::open(dir.path()).unwrap();
        prop_assert_eq!(reopened.history(usize::MAX).unwrap(), expected);
        prop_assert!(reopened.verify_chain().is_ok());
    }
}
