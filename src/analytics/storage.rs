//! Analytics query models

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::serialize_millis;

/// Inclusive time range over the visit `timestamp` (Unix milliseconds)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisitFilter {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid date '{0}': expected YYYY-MM-DD or an RFC 3339 timestamp")]
pub struct InvalidDate(pub String);

/// Parse a date bound. Plain dates resolve to midnight UTC.
pub fn parse_date_bound(raw: &str) -> Result<i64, InvalidDate> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc).timestamp_millis());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
        .ok_or_else(|| InvalidDate(raw.to_string()))
}

impl VisitFilter {
    pub fn from_dates(
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Result<Self, InvalidDate> {
        Ok(Self {
            start: start_date.map(parse_date_bound).transpose()?,
            end: end_date.map(parse_date_bound).transpose()?,
        })
    }

    pub fn since(start: i64) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }
}

/// Categorical columns that can be grouped on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitDimension {
    Device,
    Browser,
    Country,
    Path,
}

impl VisitDimension {
    pub fn column(&self) -> &'static str {
        match self {
            VisitDimension::Device => "device_type",
            VisitDimension::Browser => "browser",
            VisitDimension::Country => "country",
            VisitDimension::Path => "path",
        }
    }
}

/// One group of a breakdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct DimensionCount {
    pub dimension: Option<String>,
    pub count: i64,
}

/// Reduced projection of a visit for the recent-visits list
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RecentVisit {
    pub path: String,
    #[sqlx(rename = "occurred_at")]
    #[serde(serialize_with = "serialize_millis")]
    pub timestamp: i64,
    pub device_type: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
}

/// Visit count for one UTC calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct DailyCount {
    pub year: i32,
    pub month: i32,
    pub day: i32,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitStats {
    pub total_visits: i64,
    pub unique_sessions: i64,
    pub device_breakdown: Vec<DimensionCount>,
    pub browser_breakdown: Vec<DimensionCount>,
    pub country_breakdown: Vec<DimensionCount>,
    pub top_pages: Vec<DimensionCount>,
    pub recent_visits: Vec<RecentVisit>,
}
