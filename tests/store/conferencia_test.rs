//! Tests for `src/store/conferencia.rs`.

use feira::store::Store;

#[tokio::test]
async fn toggle_cycles_and_reports_creation() {
    let store = Store::open_in_memory().await.expect("should open");

    let first = store.toggle_conferencia(1000).await.expect("should toggle");
    assert!(first.created);
    assert!(first.conferido);

    let second = store.toggle_conferencia(1000).await.expect("should toggle");
    assert!(!second.created);
    assert!(!second.conferido);

    let third = store.toggle_conferencia(1000).await.expect("should toggle");
    assert!(third.conferido);
}

#[tokio::test]
async fn statuses_omit_unknown_orders_across_chunks() {
    let store = Store::open_in_memory().await.expect("should open");
    store.toggle_conferencia(5).await.expect("should toggle");
    store.toggle_conferencia(900).await.expect("should toggle");
    store.toggle_conferencia(900).await.expect("should toggle");

    let davs: Vec<i64> = (1..=1200).collect();
    let statuses = store
        .conferencia_statuses(&davs)
        .await
        .expect("should read");

    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[&5], 1);
    assert_eq!(statuses[&900], 0);
}
