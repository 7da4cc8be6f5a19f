pub mod session;
pub mod user;

pub use session::{
    CreateSessionRequest, JournalSession, NewSession, SessionChanges, SessionRow,
    SessionValidationError, UpdateSessionRequest,
};
pub use user::{User, UserSummary};

use chrono::{DateTime, Utc};
use serde::Serializer;

/// Current time as Unix milliseconds (UTC)
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Serialize a Unix-millisecond column as an RFC 3339 timestamp
pub fn serialize_millis<S: Serializer>(millis: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    match DateTime::<Utc>::from_timestamp_millis(*millis) {
        Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
        None => serializer.serialize_i64(*millis),
    }
}
