use crate::analytics::storage::{DailyCount, DimensionCount, RecentVisit, VisitDimension, VisitFilter};
use crate::analytics::models::{NewVisit, VisitRecord};
use crate::models::{JournalSession, NewSession, SessionChanges, User};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("username already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    // Users

    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        profile_pic: Option<&str>,
    ) -> StorageResult<User>;

    async fn get_user(&self, id: i64) -> Result<Option<User>>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Replace a user's password hash; false when the user does not exist
    async fn set_password(&self, username: &str, password_hash: &str) -> Result<bool>;

    /// Grant or revoke the admin flag; false when the user does not exist
    async fn set_admin(&self, username: &str, is_admin: bool) -> Result<bool>;

    async fn list_users(&self) -> Result<Vec<User>>;

    // Journal sessions

    async fn create_session(&self, user_id: i64, session: &NewSession) -> Result<JournalSession>;

    async fn get_session(&self, id: i64) -> Result<Option<JournalSession>>;

    /// List sessions newest first, optionally restricted to one owner
    async fn list_sessions(&self, user_id: Option<i64>) -> Result<Vec<JournalSession>>;

    /// Apply a partial update; `None` when the session does not exist
    async fn update_session(
        &self,
        id: i64,
        changes: &SessionChanges,
    ) -> Result<Option<JournalSession>>;

    async fn delete_session(&self, id: i64) -> Result<bool>;

    // Visits (append-only)

    async fn insert_visit(&self, visit: &NewVisit) -> Result<VisitRecord>;

    async fn count_visits(&self, filter: &VisitFilter) -> Result<i64>;

    /// Number of distinct session ids; missing ids form one group
    async fn count_distinct_sessions(&self, filter: &VisitFilter) -> Result<i64>;

    /// Grouped counts over one column, descending by count
    async fn group_visits(
        &self,
        dimension: VisitDimension,
        filter: &VisitFilter,
        limit: Option<i64>,
    ) -> Result<Vec<DimensionCount>>;

    /// Newest visits first
    async fn recent_visits(&self, filter: &VisitFilter, limit: i64) -> Result<Vec<RecentVisit>>;

    /// Visit counts per UTC calendar day, oldest first
    async fn daily_visit_counts(&self, filter: &VisitFilter) -> Result<Vec<DailyCount>>;
}
