//! Address geocoding with a SQLite cache in front of the external geocoder.
//!
//! Lookups hit the local cache first and only call the geocoder on a miss
//! or a stale entry. Cache failures never fail the request: they are logged
//! and the lookup falls through to the geocoder.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GeocodeConfig;
use crate::store::Store;

const DEFAULT_TTL_DAYS: i64 = 30;

/// Errors from geocoding.
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    /// No API key was configured.
    #[error("geocoder API key not configured")]
    NotConfigured,

    /// Transport failure or undecodable body.
    #[error("geocoder request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The geocoder answered with an error status.
    #[error("geocoder returned {0}")]
    Upstream(String),
}

/// A point on the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
}

/// Resolves a free-text address to coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Best match for `address`, or `None` when nothing matched.
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, GeocodeError>;
}

// ── OpenCage ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OpenCageResponse {
    #[serde(default)]
    results: Vec<OpenCageResult>,
}

#[derive(Debug, Deserialize)]
struct OpenCageResult {
    geometry: OpenCageGeometry,
}

#[derive(Debug, Deserialize)]
struct OpenCageGeometry {
    lat: f64,
    lng: f64,
}

/// Client for the OpenCage forward geocoding API.
#[derive(Debug, Clone)]
pub struct OpenCageGeocoder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    language: String,
}

impl OpenCageGeocoder {
    /// Build a client with the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::NotConfigured`] without an API key, or
    /// [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &GeocodeConfig) -> Result<Self, GeocodeError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(GeocodeError::NotConfigured)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key,
            language: config.language.clone(),
        })
    }
}

#[async_trait]
impl Geocoder for OpenCageGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>, GeocodeError> {
        debug!(address, "calling geocoder");
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", address),
                ("key", self.api_key.as_str()),
                ("language", self.language.as_str()),
                ("limit", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Upstream(status.to_string()));
        }

        let body: OpenCageResponse = response.json().await?;
        Ok(body.results.into_iter().next().map(|r| Coordinates {
            lat: r.geometry.lat,
            lon: r.geometry.lng,
        }))
    }
}

// ── Cache-aside service ─────────────────────────────────────────

/// Geocoding through the local cache.
#[derive(Clone)]
pub struct GeocodeService {
    store: Store,
    geocoder: Option<Arc<dyn Geocoder>>,
    ttl: chrono::Duration,
}

impl std::fmt::Debug for GeocodeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeocodeService")
            .field("configured", &self.geocoder.is_some())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl GeocodeService {
    /// Service over an explicit geocoder; `None` makes every cache miss
    /// fail with [`GeocodeError::NotConfigured`].
    pub fn new(store: Store, geocoder: Option<Arc<dyn Geocoder>>, ttl: chrono::Duration) -> Self {
        Self {
            store,
            geocoder,
            ttl,
        }
    }

    /// Service backed by OpenCage when an API key is configured.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn from_config(store: Store, config: &GeocodeConfig) -> Result<Self, GeocodeError> {
        let geocoder: Option<Arc<dyn Geocoder>> = match OpenCageGeocoder::from_config(config) {
            Ok(g) => Some(Arc::new(g)),
            Err(GeocodeError::NotConfigured) => {
                warn!("OPENCAGE_API_KEY not set, geocoding disabled");
                None
            }
            Err(e) => return Err(e),
        };
        let ttl = chrono::Duration::try_days(config.cache_ttl_days)
            .unwrap_or_else(|| chrono::Duration::days(DEFAULT_TTL_DAYS));
        Ok(Self::new(store, geocoder, ttl))
    }

    /// Cache entry lifetime.
    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Coordinates for `address`: one element on a match, empty otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] when the geocoder is needed and either is
    /// not configured or fails.
    pub async fn lookup(&self, address: &str) -> Result<Vec<Coordinates>, GeocodeError> {
        let now = Utc::now();
        match self.store.cached_coordinates(address, self.ttl, now).await {
            Ok(Some(hit)) => {
                debug!(address, "geocode cache hit");
                return Ok(vec![Coordinates {
                    lat: hit.lat,
                    lon: hit.lon,
                }]);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, address, "geocode cache read failed"),
        }

        let geocoder = self.geocoder.as_ref().ok_or(GeocodeError::NotConfigured)?;
        let Some(found) = geocoder.geocode(address).await? else {
            return Ok(Vec::new());
        };

        if let Err(e) = self
            .store
            .store_coordinates(address, found.lat, found.lon, now)
            .await
        {
            warn!(error = %e, address, "geocode cache write failed");
        }
        Ok(vec![found])
    }
}
