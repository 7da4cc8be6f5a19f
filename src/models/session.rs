use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

use super::{serialize_millis, UserSummary};

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionValidationError {
    #[error("Please provide all required fields")]
    MissingFields,
    #[error("Rating must be between 1 and 5")]
    RatingOutOfRange,
    #[error("Date must be formatted as YYYY-MM-DD")]
    InvalidDate,
}

/// Joined row: a session together with its owner's public fields
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: i64,
    pub user_id: i64,
    pub date: String,
    pub time: String,
    pub rating: i64,
    pub description: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub username: String,
    pub profile_pic: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalSession {
    pub id: i64,
    pub user: UserSummary,
    pub date: String,
    pub time: String,
    pub rating: i64,
    pub description: String,
    #[serde(serialize_with = "serialize_millis")]
    pub created_at: i64,
    #[serde(serialize_with = "serialize_millis")]
    pub updated_at: i64,
}

impl From<SessionRow> for JournalSession {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            user: UserSummary {
                id: row.user_id,
                username: row.username,
                profile_pic: row.profile_pic,
            },
            date: row.date,
            time: row.time,
            rating: row.rating,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub date: Option<String>,
    pub time: Option<String>,
    pub rating: Option<i64>,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSessionRequest {
    pub date: Option<String>,
    pub time: Option<String>,
    pub rating: Option<i64>,
    pub description: Option<String>,
}

/// A validated session ready to insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub date: String,
    pub time: String,
    pub rating: i64,
    pub description: String,
}

/// A validated partial update; `None` leaves the column untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionChanges {
    pub date: Option<String>,
    pub time: Option<String>,
    pub rating: Option<i64>,
    pub description: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn check_rating(rating: i64) -> Result<i64, SessionValidationError> {
    if (MIN_RATING..=MAX_RATING).contains(&rating) {
        Ok(rating)
    } else {
        Err(SessionValidationError::RatingOutOfRange)
    }
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp and keeps the calendar date.
pub fn normalize_date(raw: &str) -> Result<String, SessionValidationError> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.format("%Y-%m-%d").to_string());
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive().format("%Y-%m-%d").to_string())
        .map_err(|_| SessionValidationError::InvalidDate)
}

impl CreateSessionRequest {
    pub fn validate(self) -> Result<NewSession, SessionValidationError> {
        let (Some(date), Some(time), Some(rating), Some(description)) = (
            non_empty(self.date),
            non_empty(self.time),
            self.rating,
            non_empty(self.description),
        ) else {
            return Err(SessionValidationError::MissingFields);
        };

        Ok(NewSession {
            date: normalize_date(&date)?,
            time,
            rating: check_rating(rating)?,
            description,
        })
    }
}

impl UpdateSessionRequest {
    pub fn validate(self) -> Result<SessionChanges, SessionValidationError> {
        let date = match non_empty(self.date) {
            Some(d) => Some(normalize_date(&d)?),
            None => None,
        };
        let rating = self.rating.map(check_rating).transpose()?;

        Ok(SessionChanges {
            date,
            time: non_empty(self.time),
            rating,
            description: non_empty(self.description),
        })
    }
}
