//! Tests for the cache-aside [`GeocodeService`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use feira::geocode::{Coordinates, GeocodeError, GeocodeService, Geocoder};
use feira::store::Store;

#[derive(Default)]
struct Counting {
    calls: AtomicUsize,
    miss: bool,
}

#[async_trait]
impl Geocoder for Counting {
    async fn geocode(&self, _address: &str) -> Result<Option<Coordinates>, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.miss {
            return Ok(None);
        }
        Ok(Some(Coordinates {
            lat: -23.5,
            lon: -46.6,
        }))
    }
}

#[tokio::test]
async fn second_lookup_is_served_from_cache() {
    let store = Store::open_in_memory().await.expect("should open");
    let geocoder = Arc::new(Counting::default());
    let service = GeocodeService::new(store, Some(geocoder.clone() as Arc<dyn Geocoder>), Duration::days(30));

    let first = service.lookup("Rua A, 10").await.expect("should geocode");
    let second = service.lookup("Rua A, 10").await.expect("should geocode");

    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
    assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stale_entries_are_refetched() {
    let store = Store::open_in_memory().await.expect("should open");
    store
        .store_coordinates("Rua A", 1.0, 1.0, Utc::now() - Duration::days(40))
        .await
        .expect("should seed");
    let geocoder = Arc::new(Counting::default());
    let service = GeocodeService::new(store, Some(geocoder.clone() as Arc<dyn Geocoder>), Duration::days(30));

    let found = service.lookup("Rua A").await.expect("should geocode");
    assert_eq!(found[0].lat, -23.5);
    assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn misses_are_empty_and_not_cached() {
    let store = Store::open_in_memory().await.expect("should open");
    let geocoder = Arc::new(Counting {
        miss: true,
        ..Counting::default()
    });
    let service = GeocodeService::new(store, Some(geocoder.clone() as Arc<dyn Geocoder>), Duration::days(30));

    assert!(service.lookup("nowhere").await.expect("should succeed").is_empty());
    assert!(service.lookup("nowhere").await.expect("should succeed").is_empty());
    assert_eq!(geocoder.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cache_hits_work_without_a_geocoder() {
    let store = Store::open_in_memory().await.expect("should open");
    store
        .store_coordinates("Rua A", 1.0, 2.0, Utc::now())
        .await
        .expect("should seed");
    let service = GeocodeService::new(store, None, Duration::days(30));

    assert_eq!(
        service.lookup("Rua A").await.expect("should hit cache"),
        vec![Coordinates { lat: 1.0, lon: 2.0 }]
    );
    assert!(matches!(
        service.lookup("Rua B").await,
        Err(GeocodeError::NotConfigured)
    ));
}
