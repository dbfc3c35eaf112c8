use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::GeocodeConfig;

const NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org/search";
const USER_AGENT: &str = "placement-ai/0.1 (senior living community matcher)";
/// WGS-84 mean radius in miles.
const EARTH_RADIUS_MILES: f64 = 3958.7613;

/// Geocoding errors. Every caller degrades these to "unknown distance";
/// they are never surfaced to the client.
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("geocoding transport failure: {0}")]
    Transport(String),
    #[error("no coordinates found for ZIP {0}")]
    NotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Capability trait for postal-code geocoding so tests can pin
/// coordinates without the network.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    async fn resolve(&self, zip: &str) -> Result<Coordinates, GeocodeError>;
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

/// OpenStreetMap Nominatim search client.
pub struct NominatimProvider {
    http: reqwest::Client,
}

impl NominatimProvider {
    pub fn new() -> Result<Self, GeocodeError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GeocodeError::Transport(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl GeocodeProvider for NominatimProvider {
    async fn resolve(&self, zip: &str) -> Result<Coordinates, GeocodeError> {
        let places: Vec<NominatimPlace> = self
            .http
            .get(NOMINATIM_BASE_URL)
            .query(&[
                ("postalcode", zip),
                ("country", "USA"),
                ("format", "json"),
                ("limit", "1"),
            ])
            .send()
            .await
            .map_err(|e| GeocodeError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| GeocodeError::Transport(e.to_string()))?;

        let place = places
            .first()
            .ok_or_else(|| GeocodeError::NotFound(zip.to_string()))?;

        let latitude = place
            .lat
            .parse::<f64>()
            .map_err(|e| GeocodeError::Transport(e.to_string()))?;
        let longitude = place
            .lon
            .parse::<f64>()
            .map_err(|e| GeocodeError::Transport(e.to_string()))?;

        Ok(Coordinates {
            latitude,
            longitude,
        })
    }
}

/// Cooperative pacing for the external service: at most one remote
/// lookup per configured interval.
struct RateLimiter {
    last_request: tokio::sync::Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: tokio::sync::Mutex::new(None),
            min_interval,
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                debug!(?wait_time, "geocode rate limiting");
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Memoizing geocoder shared by every consultation in the process.
/// Failed lookups are cached too, so an unknown ZIP costs one remote
/// call, not one per consultation.
pub struct Geocoder {
    provider: Arc<dyn GeocodeProvider>,
    cache: Mutex<LruCache<String, Option<Coordinates>>>,
    limiter: RateLimiter,
}

impl Geocoder {
    pub fn new(provider: Arc<dyn GeocodeProvider>, config: &GeocodeConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity.max(1024))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            provider,
            cache: Mutex::new(LruCache::new(capacity)),
            limiter: RateLimiter::new(config.min_request_interval),
        }
    }

    pub async fn coordinates(&self, zip: &str) -> Option<Coordinates> {
        let key = zip.trim().to_string();

        if let Some(cached) = self
            .cache
            .lock()
            .expect("geocode cache poisoned")
            .get(&key)
            .copied()
        {
            return cached;
        }

        self.limiter.wait().await;
        let resolved = match self.provider.resolve(&key).await {
            Ok(coordinates) => Some(coordinates),
            Err(error) => {
                warn!(zip = %key, %error, "geocoding failed, treating distance as unknown");
                None
            }
        };

        self.cache
            .lock()
            .expect("geocode cache poisoned")
            .put(key, resolved);
        resolved
    }

    /// Geodesic miles between two ZIPs; `None` when either endpoint is
    /// unknown.
    pub async fn distance_miles(&self, from: &str, to: &str) -> Option<f64> {
        let origin = self.coordinates(from).await?;
        let destination = self.coordinates(to).await?;
        Some(geodesic_miles(origin, destination))
    }
}

/// Great-circle distance on the WGS-84 mean radius, in miles.
pub fn geodesic_miles(a: Coordinates, b: Coordinates) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let haversine = (delta_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (delta_lon / 2.0).sin().powi(2);
    let central_angle = 2.0 * haversine.sqrt().asin();

    let miles = EARTH_RADIUS_MILES * central_angle;
    (miles * 100.0).round() / 100.0
}
