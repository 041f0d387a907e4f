//! Tests for `src/store/geocode_cache.rs`.

use chrono::{Duration, TimeZone, Utc};

use feira::store::Store;

#[tokio::test]
async fn entries_expire_after_max_age() {
    let store = Store::open_in_memory().await.expect("should open");
    let written = Utc.with_ymd_and_hms(2025, 9, 1, 12, 0, 0).single().expect("valid date");
    store
        .store_coordinates("Rua A, 10", -23.5, -46.6, written)
        .await
        .expect("should write");

    let fresh = store
        .cached_coordinates("Rua A, 10", Duration::days(30), written + Duration::days(29))
        .await
        .expect("should read")
        .expect("should be fresh");
    assert_eq!((fresh.lat, fresh.lon), (-23.5, -46.6));
    assert_eq!(fresh.cached_at, written);

    let stale = store
        .cached_coordinates("Rua A, 10", Duration::days(30), written + Duration::days(31))
        .await
        .expect("should read");
    assert!(stale.is_none());
}

#[tokio::test]
async fn rewrite_refreshes_and_prune_removes_old() {
    let store = Store::open_in_memory().await.expect("should open");
    let old = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().expect("valid date");
    let recent = Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).single().expect("valid date");

    store
        .store_coordinates("Rua A", 1.0, 1.0, old)
        .await
        .expect("should write");
    store
        .store_coordinates("Rua B", 2.0, 2.0, old)
        .await
        .expect("should write");
    store
        .store_coordinates("Rua B", 3.0, 3.0, recent)
        .await
        .expect("should refresh");

    let removed = store
        .prune_geocode_cache(Duration::days(30), recent + Duration::days(1))
        .await
        .expect("should prune");
    assert_eq!(removed, 1);

    let kept = store
        .cached_coordinates("Rua B", Duration::days(30), recent)
        .await
        .expect("should read")
        .expect("should survive prune");
    assert_eq!(kept.lat, 3.0);
}

async fn insert_legacy(store: &Store, address: &str, stamp: &str) {
    sqlx::query("INSERT INTO geocode_cache (address, lat, lon, timestamp) VALUES (?1, 1.0, 2.0, ?2)")
        .bind(address)
        .bind(stamp)
        .execute(store.pool())
        .await
        .expect("should insert legacy row");
}

#[tokio::test]
async fn sqlite_timestamps_read_as_utc() {
    let store = Store::open_in_memory().await.expect("should open");
    insert_legacy(&store, "Rua Velha", "2025-09-01 12:00:00").await;

    let written = Utc.with_ymd_and_hms(2025, 9, 1, 12, 0, 0).single().expect("valid date");
    let cached = store
        .cached_coordinates("Rua Velha", Duration::days(30), written + Duration::days(1))
        .await
        .expect("should read")
        .expect("should be fresh");
    assert_eq!(cached.cached_at, written);
}

#[tokio::test]
async fn prune_compares_mixed_timestamp_forms_by_time() {
    let store = Store::open_in_memory().await.expect("should open");
    insert_legacy(&store, "Rua Antiga", "2025-01-01 00:00:00").await;
    insert_legacy(&store, "Rua Limite", "2025-01-31 07:00:00").await;

    let now = Utc.with_ymd_and_hms(2025, 3, 2, 6, 0, 0).single().expect("valid date");
    let removed = store
        .prune_geocode_cache(Duration::days(30), now)
        .await
        .expect("should prune");
    assert_eq!(removed, 1);

    assert!(store
        .cached_coordinates("Rua Limite", Duration::days(60), now)
        .await
        .expect("should read")
        .is_some());
}
