//! Visit recording pipeline
//!
//! Every track request is enriched (client address, user agent, geolocation)
//! and persisted. Failures never surface to the caller: they are logged and
//! reported as `{ success: false }`.

use anyhow::{anyhow, Result};
use axum::http::{header::USER_AGENT, HeaderMap};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::analytics::geoip::GeoLookup;
use crate::analytics::ip_extractor::extract_client_ip;
use crate::analytics::models::{NewVisit, TrackPayload, TrackResponse, VisitRecord};
use crate::analytics::storage::RecentVisit;
use crate::analytics::user_agent::classify;
use crate::models::now_millis;
use crate::notify::VisitNotifier;
use crate::realtime::{Broadcaster, LiveEvent};
use crate::storage::Storage;

pub struct VisitRecorder {
    storage: Arc<dyn Storage>,
    geo: Arc<dyn GeoLookup>,
    broadcaster: Broadcaster,
    notifier: Option<Arc<dyn VisitNotifier>>,
}

impl VisitRecorder {
    pub fn new(storage: Arc<dyn Storage>, geo: Arc<dyn GeoLookup>, broadcaster: Broadcaster) -> Self {
        Self {
            storage,
            geo,
            broadcaster,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn VisitNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Record a visit. Never fails; the outcome is reported in the response.
    pub async fn track(
        &self,
        payload: TrackPayload,
        headers: &HeaderMap,
        peer: Option<IpAddr>,
    ) -> TrackResponse {
        match self.record(payload, headers, peer).await {
            Ok(visit) => {
                self.announce(visit);
                TrackResponse { success: true }
            }
            Err(e) => {
                error!("Failed to record visit: {:#}", e);
                TrackResponse { success: false }
            }
        }
    }

    pub async fn record(
        &self,
        payload: TrackPayload,
        headers: &HeaderMap,
        peer: Option<IpAddr>,
    ) -> Result<VisitRecord> {
        let path = payload
            .path
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| anyhow!("visit payload has no path"))?;

        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("")
            .to_string();
        let client = classify(&user_agent);
        let ip = extract_client_ip(headers, peer);
        let location = self.geo.lookup(&ip).await;

        debug!(
            "Visit to {} from {} ({}, {})",
            path, ip, location.country, location.city
        );

        let visit = NewVisit {
            path,
            timestamp: now_millis(),
            user_agent,
            device_type: client.device_type.as_str().to_string(),
            browser: client.browser.to_string(),
            os: client.os.to_string(),
            ip,
            country: location.country,
            city: location.city,
            referrer: payload.referrer,
            language: payload.language,
            screen_resolution: payload.screen_resolution,
            session_id: payload.session_id.filter(|s| !s.is_empty()),
            user_id: payload.user_id,
        };

        self.storage.insert_visit(&visit).await
    }

    fn announce(&self, visit: VisitRecord) {
        self.broadcaster
            .publish(LiveEvent::VisitRecorded(RecentVisit::from(&visit)));

        if let Some(notifier) = self.notifier.clone() {
            tokio::spawn(async move {
                if let Err(e) = notifier.notify_visit(&visit).await {
                    warn!("Visit notification failed: {:#}", e);
                }
            });
        }
    }
}

impl From<&VisitRecord> for RecentVisit {
    fn from(visit: &VisitRecord) -> Self {
        Self {
            path: visit.path.clone(),
            timestamp: visit.timestamp,
            device_type: visit.device_type.clone(),
            browser: visit.browser.clone(),
            os: visit.os.clone(),
            country: visit.country.clone(),
            city: visit.city.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::geoip::HttpGeoLookup;
    use crate::analytics::models::GeoLocation;
    use crate::analytics::storage::VisitFilter;
    use crate::storage::SqliteStorage;
    use async_trait::async_trait;
    use axum::http::HeaderValue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    struct FixedGeo(GeoLocation);

    #[async_trait]
    impl GeoLookup for FixedGeo {
        async fn resolve(&self, _ip: IpAddr) -> GeoLocation {
            self.0.clone()
        }
    }

    struct CountingNotifier {
        calls: AtomicUsize,
        done: Notify,
    }

    #[async_trait]
    impl VisitNotifier for CountingNotifier {
        async fn notify_visit(&self, _visit: &VisitRecord) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.done.notify_one();
            Ok(())
        }
    }

    async fn storage() -> Arc<dyn Storage> {
        let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
        storage.init().await.unwrap();
        Arc::new(storage)
    }

    fn recorder(storage: Arc<dyn Storage>) -> VisitRecorder {
        VisitRecorder::new(
            storage,
            Arc::new(FixedGeo(GeoLocation::new("Canada", "Toronto"))),
            Broadcaster::new(16),
        )
    }

    fn firefox_headers(ip: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
            ),
        );
        headers.insert("x-forwarded-for", HeaderValue::from_static(ip));
        headers
    }

    #[tokio::test]
    async fn test_enriches_and_persists_visit() {
        let storage = storage().await;
        let recorder = recorder(storage.clone());

        let payload = TrackPayload {
            path: Some("/journal".to_string()),
            referrer: Some("https://example.com".to_string()),
            session_id: Some("s1".to_string()),
            ..Default::default()
        };
        let visit = recorder
            .record(payload, &firefox_headers("203.0.113.9, 10.0.0.1"), None)
            .await
            .unwrap();

        assert_eq!(visit.path, "/journal");
        assert_eq!(visit.device_type.as_deref(), Some("desktop"));
        assert_eq!(visit.browser.as_deref(), Some("Firefox"));
        assert_eq!(visit.os.as_deref(), Some("Windows"));
        assert_eq!(visit.ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(visit.country.as_deref(), Some("Canada"));
        assert_eq!(visit.city.as_deref(), Some("Toronto"));
        assert_eq!(visit.session_id.as_deref(), Some("s1"));
        assert_eq!(storage.count_visits(&VisitFilter::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_loopback_peer_is_local() {
        let storage = storage().await;
        let recorder = recorder(storage);

        let payload = TrackPayload {
            path: Some("/".to_string()),
            ..Default::default()
        };
        let visit = recorder
            .record(payload, &HeaderMap::new(), Some("127.0.0.1".parse().unwrap()))
            .await
            .unwrap();

        assert_eq!(visit.country.as_deref(), Some("Local"));
        assert_eq!(visit.city.as_deref(), Some("Development"));
        assert_eq!(visit.device_type.as_deref(), Some("desktop"));
        assert_eq!(visit.browser.as_deref(), Some("Unknown"));
    }

    #[tokio::test]
    async fn test_empty_session_id_is_stored_as_null() {
        let storage = storage().await;
        let recorder = recorder(storage);

        let payload = TrackPayload {
            path: Some("/".to_string()),
            session_id: Some(String::new()),
            ..Default::default()
        };
        let visit = recorder
            .record(payload, &HeaderMap::new(), None)
            .await
            .unwrap();
        assert_eq!(visit.session_id, None);
    }

    #[tokio::test]
    async fn test_missing_path_reports_failure() {
        let storage = storage().await;
        let recorder = recorder(storage.clone());

        let response = recorder
            .track(TrackPayload::default(), &HeaderMap::new(), None)
            .await;
        assert!(!response.success);

        let blank = TrackPayload {
            path: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(!recorder.track(blank, &HeaderMap::new(), None).await.success);
        assert_eq!(storage.count_visits(&VisitFilter::default()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_reports_failure() {
        // Tables never created
        let storage: Arc<dyn Storage> =
            Arc::new(SqliteStorage::new("sqlite::memory:", 1).await.unwrap());
        let recorder = recorder(storage);

        let payload = TrackPayload {
            path: Some("/".to_string()),
            ..Default::default()
        };
        assert!(!recorder.track(payload, &HeaderMap::new(), None).await.success);
    }

    #[tokio::test]
    async fn test_success_broadcasts_and_notifies() {
        let storage = storage().await;
        let broadcaster = Broadcaster::new(16);
        let notifier = Arc::new(CountingNotifier {
            calls: AtomicUsize::new(0),
            done: Notify::new(),
        });
        let recorder = VisitRecorder::new(
            storage,
            Arc::new(FixedGeo(GeoLocation::unknown())),
            broadcaster.clone(),
        )
        .with_notifier(notifier.clone());

        let mut rx = broadcaster.subscribe();
        let payload = TrackPayload {
            path: Some("/about".to_string()),
            ..Default::default()
        };
        assert!(recorder.track(payload, &HeaderMap::new(), None).await.success);

        let message = rx.recv().await.unwrap();
        match message.event {
            LiveEvent::VisitRecorded(visit) => assert_eq!(visit.path, "/about"),
            other => panic!("unexpected event {:?}", other),
        }

        tokio::time::timeout(Duration::from_secs(1), notifier.done.notified())
            .await
            .unwrap();
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    /// Geo provider that answers long after any sane timeout
    async fn spawn_stalled_provider() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new().route(
            "/{ip}/json/",
            axum::routing::get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "{}"
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// Address nothing is listening on
    async fn closed_port() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_failed_geo_lookup_still_records_visit() {
        for base in [spawn_stalled_provider().await, closed_port().await] {
            let storage = storage().await;
            let geo = HttpGeoLookup::new(&base, Duration::from_millis(200)).unwrap();
            let recorder = VisitRecorder::new(storage.clone(), Arc::new(geo), Broadcaster::new(16));

            let payload = TrackPayload {
                path: Some("/journal".to_string()),
                ..Default::default()
            };
            let response = tokio::time::timeout(
                Duration::from_secs(3),
                recorder.track(payload, &firefox_headers("8.8.8.8"), None),
            )
            .await
            .unwrap();
            assert!(response.success, "provider {base}");

            let recent = storage
                .recent_visits(&VisitFilter::default(), 1)
                .await
                .unwrap();
            assert_eq!(recent.len(), 1);
            assert_eq!(recent[0].country.as_deref(), Some("Unknown"));
            assert_eq!(recent[0].city.as_deref(), Some("Unknown"));
        }
    }
}
