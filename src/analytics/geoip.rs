//! Geolocation lookups for client addresses
//!
//! Two backends sit behind [`GeoLookup`]:
//! - [`HttpGeoLookup`] queries a JSON endpoint (`{base}/{address}/json/`) with a
//!   short timeout and caches successful answers.
//! - [`MaxMindGeoLookup`] reads a memory-mapped GeoLite2 City database.
//!
//! Neither ever returns an error: local addresses resolve to
//! `Local/Development`, everything that goes wrong resolves to `Unknown`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use maxminddb::{geoip2, Mmap, Reader};
use moka::future::Cache;
use reqwest::Client;
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::analytics::ip_extractor::is_local;
use crate::analytics::models::{GeoLocation, UNKNOWN};
use crate::config::{AnalyticsConfig, GeoProvider};

#[async_trait]
pub trait GeoLookup: Send + Sync {
    /// Resolve a normalized client address.
    ///
    /// Local and non-IP inputs short-circuit without touching the backend.
    async fn lookup(&self, addr: &str) -> GeoLocation {
        if is_local(addr) {
            return GeoLocation::local();
        }

        match addr.parse::<IpAddr>() {
            Ok(ip) => self.resolve(ip).await,
            Err(_) => {
                debug!(addr = %addr, "Skipping geolocation for non-IP address");
                GeoLocation::unknown()
            }
        }
    }

    /// Backend lookup for a routable address. Must not fail.
    async fn resolve(&self, ip: IpAddr) -> GeoLocation;
}

/// Build the configured geolocation backend
pub fn from_config(config: &AnalyticsConfig) -> Result<Arc<dyn GeoLookup>> {
    match config.geo_provider {
        GeoProvider::Http => {
            let mut lookup = HttpGeoLookup::new(
                &config.geo_lookup_url,
                Duration::from_millis(config.geo_timeout_ms),
            )?;
            if config.geo_cache_ttl_secs > 0 {
                lookup = lookup.with_cache(
                    Duration::from_secs(config.geo_cache_ttl_secs),
                    config.geo_cache_max_entries,
                );
            }
            Ok(Arc::new(lookup))
        }
        GeoProvider::Maxmind => {
            let path = config
                .geoip_city_db_path
                .as_deref()
                .context("GEOIP_CITY_DB_PATH is required for the maxmind provider")?;
            Ok(Arc::new(MaxMindGeoLookup::new(path)?))
        }
    }
}

/// Subset of the provider's JSON payload we care about
#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    country_name: Option<String>,
    #[serde(default)]
    city: Option<String>,
}

impl From<LookupResponse> for GeoLocation {
    fn from(resp: LookupResponse) -> Self {
        let or_unknown =
            |v: Option<String>| v.filter(|s| !s.is_empty()).unwrap_or_else(|| UNKNOWN.to_string());

        GeoLocation {
            country: or_unknown(resp.country_name),
            city: or_unknown(resp.city),
        }
    }
}

/// Remote JSON geolocation client
#[derive(Clone)]
pub struct HttpGeoLookup {
    client: Client,
    base_url: String,
    cache: Option<Cache<IpAddr, GeoLocation>>,
}

impl HttpGeoLookup {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("sessionlog/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client for geolocation lookups")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: None,
        })
    }

    /// Cache successful lookups for `ttl`
    pub fn with_cache(mut self, ttl: Duration, max_entries: u64) -> Self {
        self.cache = Some(
            Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build(),
        );
        self
    }

    fn url_for(&self, ip: IpAddr) -> String {
        format!("{}/{}/json/", self.base_url, ip)
    }

    async fn fetch(&self, ip: IpAddr) -> Result<GeoLocation> {
        let response: LookupResponse = self
            .client
            .get(self.url_for(ip))
            .send()
            .await
            .context("geolocation request failed")?
            .error_for_status()
            .context("geolocation endpoint returned an error status")?
            .json()
            .await
            .context("failed to parse geolocation response")?;

        Ok(response.into())
    }
}

#[async_trait]
impl GeoLookup for HttpGeoLookup {
    async fn resolve(&self, ip: IpAddr) -> GeoLocation {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&ip).await {
                return hit;
            }
        }

        match self.fetch(ip).await {
            Ok(location) => {
                // Payloads without any location data (rate limits, reserved ranges) are not cached
                if location != GeoLocation::unknown() {
                    if let Some(cache) = &self.cache {
                        cache.insert(ip, location.clone()).await;
                    }
                }
                location
            }
            Err(e) => {
                warn!(ip = %ip, error = %format!("{e:#}"), "Geolocation lookup failed");
                GeoLocation::unknown()
            }
        }
    }
}

/// GeoIP lookup backed by a MaxMind GeoLite2/GeoIP2 City database
#[derive(Clone)]
pub struct MaxMindGeoLookup {
    city_reader: Arc<Reader<Mmap>>,
}

impl MaxMindGeoLookup {
    pub fn new(city_path: &str) -> Result<Self> {
        let reader = unsafe { Reader::open_mmap(city_path) }
            .with_context(|| format!("Failed to open GeoIP City database at {}", city_path))?;

        Ok(Self {
            city_reader: Arc::new(reader),
        })
    }

    fn lookup_sync(&self, ip: IpAddr) -> GeoLocation {
        let Ok(result) = self.city_reader.lookup(ip) else {
            return GeoLocation::unknown();
        };

        let name = |v: Option<&str>| v.map(str::to_string).unwrap_or_else(|| UNKNOWN.to_string());

        if let Ok(Some(city)) = result.decode::<geoip2::City>() {
            return GeoLocation {
                country: name(city.country.names.english),
                city: name(city.city.names.english),
            };
        }

        // Country-only databases still answer the country half
        if let Ok(Some(country)) = result.decode::<geoip2::Country>() {
            return GeoLocation {
                country: name(country.country.names.english),
                city: UNKNOWN.to_string(),
            };
        }

        GeoLocation::unknown()
    }
}

#[async_trait]
impl GeoLookup for MaxMindGeoLookup {
    async fn resolve(&self, ip: IpAddr) -> GeoLocation {
        self.lookup_sync(ip)
    }
}
