//! Data models for analytics

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::serialize_millis;

pub const UNKNOWN: &str = "Unknown";

/// Geographic location resolved for a client address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoLocation {
    pub country: String,
    pub city: String,
}

impl GeoLocation {
    pub fn new(country: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            city: city.into(),
        }
    }

    /// Returned for loopback and development addresses
    pub fn local() -> Self {
        Self::new("Local", "Development")
    }

    /// Returned whenever a lookup fails
    pub fn unknown() -> Self {
        Self::new(UNKNOWN, UNKNOWN)
    }
}

impl Default for GeoLocation {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Device class derived from a user-agent string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Desktop,
    Tablet,
    Mobile,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Desktop => "desktop",
            DeviceType::Tablet => "tablet",
            DeviceType::Mobile => "mobile",
        }
    }
}

/// Result of classifying a user-agent string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub device_type: DeviceType,
    pub browser: &'static str,
    pub os: &'static str,
}

/// Body of a visit-tracking request, as reported by the client
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPayload {
    pub path: Option<String>,
    pub referrer: Option<String>,
    pub language: Option<String>,
    pub screen_resolution: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<i64>,
}

/// A fully enriched visit, ready to persist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVisit {
    pub path: String,
    /// Logical event time (Unix milliseconds)
    pub timestamp: i64,
    pub user_agent: String,
    pub device_type: String,
    pub browser: String,
    pub os: String,
    pub ip: String,
    pub country: String,
    pub city: String,
    pub referrer: Option<String>,
    pub language: Option<String>,
    pub screen_resolution: Option<String>,
    /// `None` for both missing and empty session ids
    pub session_id: Option<String>,
    pub user_id: Option<i64>,
}

/// Persisted visit record
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct VisitRecord {
    pub id: i64,
    pub path: String,
    #[sqlx(rename = "occurred_at")]
    #[serde(serialize_with = "serialize_millis")]
    pub timestamp: i64,
    pub user_agent: Option<String>,
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub ip: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub referrer: Option<String>,
    pub language: Option<String>,
    pub screen_resolution: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<i64>,
    #[serde(serialize_with = "serialize_millis")]
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrackResponse {
    pub success: bool,
}
