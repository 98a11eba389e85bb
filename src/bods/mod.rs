//! Client for the Bus Open Data Service live location feeds.

mod gtfs;
mod siri;

pub use gtfs::parse_feed;
pub use siri::parse_vehicle_activities;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{BoundingBox, VehiclePosition};

const USER_AGENT: &str = concat!("bus-tracker/", env!("CARGO_PKG_VERSION"));

/// Which BODS location feed to read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedFormat {
    /// SIRI-VM XML (`/datafeed/`)
    #[default]
    Siri,
    /// GTFS-RT protobuf (`/gtfsrtdatafeed/`)
    GtfsRt,
}

impl FeedFormat {
    fn path(self) -> &'static str {
        match self {
            Self::Siri => "datafeed/",
            Self::GtfsRt => "gtfsrtdatafeed/",
        }
    }
}

/// Vehicles from one fetch of the feed.
#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    pub fetched_at: DateTime<Utc>,
    pub vehicles: Vec<VehiclePosition>,
}

struct CachedFeed {
    stored_at: Instant,
    snapshot: Arc<FeedSnapshot>,
}

/// Holds the last fetch for `ttl` so page refreshes don't hit BODS each time.
pub struct FeedCache {
    ttl: Duration,
    slot: Mutex<Option<CachedFeed>>,
}

impl FeedCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Returns the cached snapshot if still fresh, otherwise runs `fetch`
    /// and stores its result. Failed fetches are not cached.
    ///
    /// The lock is held across `fetch`, so concurrent callers wait for one
    /// upstream request instead of each sending their own.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<Arc<FeedSnapshot>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<FeedSnapshot>>,
    {
        let mut slot = self.slot.lock().await;

        if let Some(cached) = slot.as_ref() {
            if cached.stored_at.elapsed() < self.ttl {
                let age_ms = cached.stored_at.elapsed().as_millis() as u64;
                tracing::debug!(age_ms, "Feed cache hit");
                return Ok(Arc::clone(&cached.snapshot));
            }
        }

        let snapshot = Arc::new(fetch().await?);
        *slot = Some(CachedFeed {
            stored_at: Instant::now(),
            snapshot: Arc::clone(&snapshot),
        });
        Ok(snapshot)
    }
}

/// Fetches live vehicle locations for a fixed bounding box.
#[derive(Clone)]
pub struct BodsClient {
    http: Client,
    base_url: String,
    api_key: String,
    bounding_box: BoundingBox,
    format: FeedFormat,
    cache: Arc<FeedCache>,
}

impl BodsClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: config.bods_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            bounding_box: config.bounding_box,
            format: config.feed,
            cache: Arc::new(FeedCache::new(config.cache_ttl())),
        })
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }

    pub fn format(&self) -> FeedFormat {
        self.format
    }

    /// Latest vehicles in the bounding box, served from cache when fresh.
    pub async fn vehicles(&self) -> Result<Arc<FeedSnapshot>> {
        self.cache.get_or_fetch(|| self.fetch()).await
    }

    /// Full feed URL without the API key, for logging.
    fn endpoint(&self) -> String {
        format!("{}/{}", self.base_url, self.format.path())
    }

    #[tracing::instrument(skip(self), fields(format = ?self.format, bbox = %self.bounding_box))]
    async fn fetch(&self) -> Result<FeedSnapshot> {
        let now = Instant::now();
        let endpoint = self.endpoint();

        let response = self
            .http
            .get(&endpoint)
            .query(&[
                ("boundingBox", self.bounding_box.to_query_value()),
                ("api_key", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(Error::from)
            .inspect_err(|e| tracing::warn!(error = %e, "BODS request failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "BODS returned an error response");
            let message = summarize(&body, status.canonical_reason());
            return Err(Error::upstream(status.as_u16(), message));
        }

        let body = response.bytes().await?;
        let vehicles = match self.format {
            FeedFormat::Siri => parse_vehicle_activities(&String::from_utf8_lossy(&body))?,
            FeedFormat::GtfsRt => parse_feed(&body)?,
        };

        tracing::info!(
            vehicles = vehicles.len(),
            bytes = body.len(),
            elapsed_ms = now.elapsed().as_millis() as u64,
            "Fetched BODS feed"
        );

        Ok(FeedSnapshot {
            fetched_at: Utc::now(),
            vehicles,
        })
    }
}

#[cfg(test)]
impl BodsClient {
    /// Client whose cache already holds `snapshot`, so reads stay offline.
    pub(crate) async fn preloaded(config: &Config, snapshot: FeedSnapshot) -> Self {
        let client = Self::from_config(config).unwrap();
        client.cache.get_or_fetch(|| async move { Ok(snapshot) }).await.unwrap();
        client
    }
}

/// First line of an error body, falling back to the status reason.
fn summarize(body: &str, reason: Option<&str>) -> String {
    body.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.chars().take(200).collect())
        .unwrap_or_else(|| reason.unwrap_or("unknown error").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GeoPoint;
    use axum::response::IntoResponse;
    use clap::Parser;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn snapshot(n: usize) -> FeedSnapshot {
        FeedSnapshot {
            fetched_at: Utc::now(),
            vehicles: (0..n)
                .map(|i| VehiclePosition::new(format!("BUS{i}"), GeoPoint::new(52.7, -2.45)))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_cache_reuses_fresh_snapshot() {
        let cache = FeedCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let snap = cache
                .get_or_fetch(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(snapshot(2))
                })
                .await
                .unwrap();
            assert_eq!(snap.vehicles.len(), 2);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_refetches_when_expired() {
        let cache = FeedCache::new(Duration::ZERO);
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            cache
                .get_or_fetch(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(snapshot(1))
                })
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_does_not_store_errors() {
        let cache = FeedCache::new(Duration::from_secs(60));

        let failed = cache
            .get_or_fetch(|| async { Err(Error::upstream(500, "boom")) })
            .await;
        assert!(failed.is_err());

        let ok = cache.get_or_fetch(|| async { Ok(snapshot(3)) }).await.unwrap();
        assert_eq!(ok.vehicles.len(), 3);

        let cached = cache.get_or_fetch(|| async { Ok(snapshot(1)) }).await.unwrap();
        assert_eq!(cached.vehicles.len(), 3);
    }

    #[test]
    fn test_feed_paths() {
        assert_eq!(FeedFormat::Siri.path(), "datafeed/");
        assert_eq!(FeedFormat::GtfsRt.path(), "gtfsrtdatafeed/");
    }

    #[test]
    fn test_summarize_error_body() {
        assert_eq!(summarize("\n  Invalid api_key\nmore", None), "Invalid api_key");
        assert_eq!(summarize("", Some("Forbidden")), "Forbidden");
        assert_eq!(summarize("   ", None), "unknown error");
    }

    #[tokio::test]
    async fn test_transport_error_does_not_expose_api_key() {
        // Nothing listens on port 1, so the request fails before any response.
        let config = Config::try_parse_from([
            "bus-tracker",
            "--api-key",
            "SECRET_KEY_123",
            "--bods-url",
            "http://127.0.0.1:1",
            "--timeout-secs",
            "5",
        ])
        .unwrap();
        let client = BodsClient::from_config(&config).unwrap();

        let err = client.vehicles().await.unwrap_err();
        assert!(matches!(err, Error::Http(_)));
        assert!(!err.to_string().contains("SECRET_KEY_123"));

        let response = err.into_response();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8_lossy(&body);
        assert!(body.contains("HTTP request failed"));
        assert!(!body.contains("SECRET_KEY_123"));
        assert!(!body.contains("api_key"));
    }
}
