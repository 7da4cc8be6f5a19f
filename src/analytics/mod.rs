//! Visitor analytics
//!
//! Visits are enriched at ingest (device, browser, OS, client address and
//! geolocation) and aggregated on demand for the admin dashboard.

pub mod aggregator;
pub mod geoip;
pub mod ip_extractor;
pub mod models;
pub mod recorder;
pub mod storage;
pub mod user_agent;

pub use aggregator::StatsAggregator;
pub use geoip::{GeoLookup, HttpGeoLookup, MaxMindGeoLookup};
pub use ip_extractor::extract_client_ip;
pub use models::{GeoLocation, TrackPayload, TrackResponse, VisitRecord};
pub use recorder::VisitRecorder;
pub use storage::{DailyCount, DimensionCount, RecentVisit, VisitFilter, VisitStats};
