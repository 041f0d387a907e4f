//! Tests for `src/store/backup.rs`.

use feira::store::{Store, StoreError};

#[tokio::test]
async fn snapshot_is_written_under_a_timestamped_directory() {
    let data = tempfile::tempdir().expect("should create data dir");
    let backups = tempfile::tempdir().expect("should create backups dir");
    let store = Store::open(&data.path().join("app.db"))
        .await
        .expect("should open");
    store.toggle_conferencia(1).await.expect("should write");

    let result = store
        .backup_into(backups.path())
        .await
        .expect("should back up");

    assert!(result.database.exists());
    assert!(result.size_bytes > 0);
    assert!(result.backup_dir.starts_with(backups.path()));

    let copy = Store::open(&result.database).await.expect("should reopen");
    let statuses = copy.conferencia_statuses(&[1]).await.expect("should read");
    assert_eq!(statuses.get(&1), Some(&1));
    copy.close().await;
    store.close().await;
}

#[tokio::test]
async fn rejected_path_leaves_nothing_behind() {
    let root = tempfile::tempdir().expect("should create dir");
    let backups = root.path().join("o'neil");
    let store = Store::open_in_memory().await.expect("should open");

    let result = store.backup_into(&backups).await;

    assert!(matches!(result, Err(StoreError::Invalid(_))));
    assert!(!backups.exists());
}
