use std::future::Future;
use std::io;
use std::path::Path;

use quotedesk_store::storage::{FileOps, NoBackoff, TokioFileOps, WipeState};
use quotedesk_store::{Customer, CustomerDraft, CustomerStore, Secret, StoreConfig, WipeOutcome};

/// Refuses to delete anything, like a file still held open on Windows.
struct StuckFileOps;

impl FileOps for StuckFileOps {
    fn remove(&self, _path: &Path) -> impl Future<Output = io::Result<()>> + Send {
        async { Ok(()) }
    }

    fn exists(&self, path: &Path) -> impl Future<Output = bool> + Send {
        let path = path.to_path_buf();
        async move { quotedesk_store::fs::exists_conservative(&path).await }
    }
}

/// Deletes for real but cannot tell whether the file is there.
struct BlindFileOps;

impl FileOps for BlindFileOps {
    fn remove(&self, path: &Path) -> impl Future<Output = io::Result<()>> + Send {
        let path = path.to_path_buf();
        async move { tokio::fs::remove_file(&path).await }
    }

    fn exists(&self, _path: &Path) -> impl Future<Output = bool> + Send {
        async { true }
    }
}

async fn populated_store(dir: &tempfile::TempDir) -> CustomerStore {
    std::fs::write(dir.path().join("data.json"), br#"{"printers": []}"#).unwrap();
    let store = CustomerStore::new(StoreConfig::new(dir.path()));
    store
        .save(
            &[Customer::new(1, CustomerDraft::new("A"))],
            &Secret::passphrase("pw"),
        )
        .await
        .unwrap();
    // Leave cached handles behind for both documents
    store.load(&Secret::passphrase("pw")).await.unwrap();
    store.migrate(&Secret::NoSecret).await.unwrap();
    store
}

#[tokio::test]
async fn test_wipe_removes_both_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = populated_store(&dir).await;

    let report = store.wipe_with(TokioFileOps, NoBackoff).await;

    assert!(report.is_complete());
    assert_eq!(report.artifacts.len(), 2);
    for artifact in &report.artifacts {
        assert_eq!(artifact.outcome, WipeOutcome::Verified);
        assert_eq!(artifact.attempts, 1);
        assert!(!artifact.path.exists());
    }
    assert!(!store.documents().is_cached("customers.json"));

    // Nothing persisted any more
    let loaded = store.load(&Secret::NoSecret).await.unwrap();
    assert!(loaded.is_empty());
    assert!(!dir.path().join("customers.json").exists());
}

#[tokio::test]
async fn test_wipe_of_missing_files_is_verified() {
    let dir = tempfile::tempdir().unwrap();
    let store = CustomerStore::new(StoreConfig::new(dir.path()));

    let report = store.wipe_with(TokioFileOps, NoBackoff).await;

    assert!(report.is_complete());
}

#[tokio::test]
async fn test_stuck_file_is_reported_after_bounded_retries() {
    let dir = tempfile::tempdir().unwrap();
    let store = populated_store(&dir).await;
    let max_retries = store.config().wipe.max_retries;

    let report = store.wipe_with(StuckFileOps, NoBackoff).await;

    assert!(!report.is_complete());
    let residual: Vec<_> = report.incomplete().map(|a| a.name.as_str()).collect();
    assert_eq!(residual, vec!["data.json", "customers.json"]);
    for artifact in &report.artifacts {
        assert_eq!(artifact.attempts, max_retries + 1);
        assert_eq!(
            artifact.history.last(),
            Some(&WipeState::Failed {
                attempts: max_retries + 1
            })
        );
        assert!(artifact.path.exists());
    }
}

#[tokio::test]
async fn test_unknown_existence_counts_as_present() {
    let dir = tempfile::tempdir().unwrap();
    let store = populated_store(&dir).await;
    let report = store.wipe_with(BlindFileOps, NoBackoff).await;

    assert!(!report.is_complete());
    assert!(report
        .artifacts
        .iter()
        .all(|artifact| artifact.outcome == WipeOutcome::Incomplete));
    assert!(!dir.path().join("customers.json").exists());
}
