//! Address → coordinates cache.

use chrono::{DateTime, Duration, Utc};

use super::{parse_timestamp, timestamp_text, Store, StoreError};

/// A cached geocoding result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedCoordinates {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
    /// When the entry was written.
    pub cached_at: DateTime<Utc>,
}

impl Store {
    /// Coordinates for `address` cached after `now - max_age`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the stored timestamp is corrupt.
    pub async fn cached_coordinates(
        &self,
        address: &str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<CachedCoordinates>, StoreError> {
        let row: Option<(f64, f64, String)> =
            sqlx::query_as("SELECT lat, lon, timestamp FROM geocode_cache WHERE address = ?1")
                .bind(address)
                .fetch_optional(&self.pool)
                .await?;
        let Some((lat, lon, stamp)) = row else {
            return Ok(None);
        };
        let cached_at = parse_timestamp("geocode_cache", "timestamp", &stamp)?;
        let fresh = now.signed_duration_since(cached_at) < max_age;
        Ok(fresh.then_some(CachedCoordinates {
            lat,
            lon,
            cached_at,
        }))
    }

    /// Insert or refresh coordinates for `address`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn store_coordinates(
        &self,
        address: &str,
        lat: f64,
        lon: f64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO geocode_cache (address, lat, lon, timestamp) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(address) DO UPDATE SET
                lat = excluded.lat, lon = excluded.lon, timestamp = excluded.timestamp",
        )
        .bind(address)
        .bind(lat)
        .bind(lon)
        .bind(timestamp_text(now))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete entries older than `max_age`; returns how many were removed.
    ///
    /// Both timestamp forms are normalised by SQLite's `datetime()` before
    /// comparing.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn prune_geocode_cache(
        &self,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let cutoff = now.checked_sub_signed(max_age).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let result = sqlx::query("DELETE FROM geocode_cache WHERE datetime(timestamp) <= datetime(?1)")
            .bind(timestamp_text(cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
