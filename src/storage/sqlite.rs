use crate::analytics::models::{NewVisit, VisitRecord};
use crate::analytics::storage::{DailyCount, DimensionCount, RecentVisit, VisitDimension, VisitFilter};
use crate::models::{now_millis, JournalSession, NewSession, SessionChanges, SessionRow, User};
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const SESSION_SELECT: &str = r#"
    SELECT s.id, s.user_id, s.date, s.time, s.rating, s.description,
           s.created_at, s.updated_at, u.username, u.profile_pic
    FROM journal_sessions s
    JOIN users u ON u.id = s.user_id
"#;

const USER_COLUMNS: &str = "id, username, password_hash, profile_pic, is_admin, created_at";

const VISIT_COLUMNS: &str = r#"
    id, path, occurred_at, user_agent, device_type, browser, os, ip, country, city,
    referrer, language, screen_resolution, session_id, user_id, created_at
"#;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

/// Append the inclusive time-range predicate for visit queries
fn push_range(qb: &mut QueryBuilder<'_, Sqlite>, filter: &VisitFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(start) = filter.start {
        qb.push(" AND occurred_at >= ").push_bind(start);
    }
    if let Some(end) = filter.end {
        qb.push(" AND occurred_at <= ").push_bind(end);
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                profile_pic TEXT,
                is_admin INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS journal_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                date TEXT NOT NULL,
                time TEXT NOT NULL,
                rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                description TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_user ON journal_sessions(user_id, created_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS visits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL,
                occurred_at INTEGER NOT NULL,
                user_agent TEXT,
                device_type TEXT,
                browser TEXT,
                os TEXT,
                ip TEXT,
                country TEXT,
                city TEXT,
                referrer TEXT,
                language TEXT,
                screen_resolution TEXT,
                session_id TEXT,
                user_id INTEGER,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        for ddl in [
            "CREATE INDEX IF NOT EXISTS idx_visits_occurred_at ON visits(occurred_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_visits_path ON visits(path)",
            "CREATE INDEX IF NOT EXISTS idx_visits_country ON visits(country)",
            "CREATE INDEX IF NOT EXISTS idx_visits_session ON visits(session_id)",
        ] {
            sqlx::query(ddl).execute(self.pool.as_ref()).await?;
        }

        Ok(())
    }

    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        profile_pic: Option<&str>,
    ) -> StorageResult<User> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, profile_pic, is_admin, created_at)
            VALUES (?, ?, ?, 0, ?)
            ON CONFLICT(username) DO NOTHING
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .bind(profile_pic)
        .bind(now_millis())
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        let user = self
            .get_user(result.last_insert_rowid())
            .await?
            .ok_or_else(|| anyhow!("user {username} missing after insert"))?;

        Ok(user)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn set_password(&self, username: &str, password_hash: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET password_hash = ? WHERE username = ?")
            .bind(password_hash)
            .bind(username)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_admin(&self, username: &str, is_admin: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET is_admin = ? WHERE username = ?")
            .bind(is_admin)
            .bind(username)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY username"
        ))
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(users)
    }

    async fn create_session(&self, user_id: i64, session: &NewSession) -> Result<JournalSession> {
        let now = now_millis();
        let result = sqlx::query(
            r#"
            INSERT INTO journal_sessions (user_id, date, time, rating, description, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(&session.date)
        .bind(&session.time)
        .bind(session.rating)
        .bind(&session.description)
        .bind(now)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        self.get_session(result.last_insert_rowid())
            .await?
            .ok_or_else(|| anyhow!("session missing after insert"))
    }

    async fn get_session(&self, id: i64) -> Result<Option<JournalSession>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!("{SESSION_SELECT} WHERE s.id = ?"))
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(row.map(JournalSession::from))
    }

    async fn list_sessions(&self, user_id: Option<i64>) -> Result<Vec<JournalSession>> {
        let rows = match user_id {
            Some(uid) => {
                sqlx::query_as::<_, SessionRow>(&format!(
                    "{SESSION_SELECT} WHERE s.user_id = ? ORDER BY s.created_at DESC, s.id DESC"
                ))
                .bind(uid)
                .fetch_all(self.pool.as_ref())
                .await?
            }
            None => {
                sqlx::query_as::<_, SessionRow>(&format!(
                    "{SESSION_SELECT} ORDER BY s.created_at DESC, s.id DESC"
                ))
                .fetch_all(self.pool.as_ref())
                .await?
            }
        };

        Ok(rows.into_iter().map(JournalSession::from).collect())
    }

    async fn update_session(
        &self,
        id: i64,
        changes: &SessionChanges,
    ) -> Result<Option<JournalSession>> {
        let result = sqlx::query(
            r#"
            UPDATE journal_sessions
            SET date = COALESCE(?, date),
                time = COALESCE(?, time),
                rating = COALESCE(?, rating),
                description = COALESCE(?, description),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(changes.date.as_deref())
        .bind(changes.time.as_deref())
        .bind(changes.rating)
        .bind(changes.description.as_deref())
        .bind(now_millis())
        .bind(id)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_session(id).await
    }

    async fn delete_session(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM journal_sessions WHERE id = ?")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_visit(&self, visit: &NewVisit) -> Result<VisitRecord> {
        let result = sqlx::query(
            r#"
            INSERT INTO visits (
                path, occurred_at, user_agent, device_type, browser, os, ip, country, city,
                referrer, language, screen_resolution, session_id, user_id, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&visit.path)
        .bind(visit.timestamp)
        .bind(&visit.user_agent)
        .bind(&visit.device_type)
        .bind(&visit.browser)
        .bind(&visit.os)
        .bind(&visit.ip)
        .bind(&visit.country)
        .bind(&visit.city)
        .bind(visit.referrer.as_deref())
        .bind(visit.language.as_deref())
        .bind(visit.screen_resolution.as_deref())
        .bind(visit.session_id.as_deref())
        .bind(visit.user_id)
        .bind(now_millis())
        .execute(self.pool.as_ref())
        .await?;

        let record = sqlx::query_as::<_, VisitRecord>(&format!(
            "SELECT {VISIT_COLUMNS} FROM visits WHERE id = ?"
        ))
        .bind(result.last_insert_rowid())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(record)
    }

    async fn count_visits(&self, filter: &VisitFilter) -> Result<i64> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM visits");
        push_range(&mut qb, filter);

        let count = qb
            .build_query_scalar::<i64>()
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(count)
    }

    async fn count_distinct_sessions(&self, filter: &VisitFilter) -> Result<i64> {
        // DISTINCT keeps a single NULL row, so missing ids count as one group
        let mut qb =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM (SELECT DISTINCT session_id FROM visits");
        push_range(&mut qb, filter);
        qb.push(") AS distinct_sessions");

        let count = qb
            .build_query_scalar::<i64>()
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(count)
    }

    async fn group_visits(
        &self,
        dimension: VisitDimension,
        filter: &VisitFilter,
        limit: Option<i64>,
    ) -> Result<Vec<DimensionCount>> {
        let column = dimension.column();
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {column} AS dimension, COUNT(*) AS count FROM visits"
        ));
        push_range(&mut qb, filter);
        qb.push(format!(" GROUP BY {column} ORDER BY count DESC, dimension ASC"));
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let groups = qb
            .build_query_as::<DimensionCount>()
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(groups)
    }

    async fn recent_visits(&self, filter: &VisitFilter, limit: i64) -> Result<Vec<RecentVisit>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT path, occurred_at, device_type, browser, os, country, city FROM visits",
        );
        push_range(&mut qb, filter);
        qb.push(" ORDER BY occurred_at DESC, id DESC LIMIT ")
            .push_bind(limit);

        let visits = qb
            .build_query_as::<RecentVisit>()
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(visits)
    }

    async fn daily_visit_counts(&self, filter: &VisitFilter) -> Result<Vec<DailyCount>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT CAST(strftime('%Y', occurred_at / 1000, 'unixepoch') AS INTEGER) AS year,
                   CAST(strftime('%m', occurred_at / 1000, 'unixepoch') AS INTEGER) AS month,
                   CAST(strftime('%d', occurred_at / 1000, 'unixepoch') AS INTEGER) AS day,
                   COUNT(*) AS count
            FROM visits
            "#,
        );
        push_range(&mut qb, filter);
        qb.push(" GROUP BY year, month, day ORDER BY year ASC, month ASC, day ASC");

        let days = qb
            .build_query_as::<DailyCount>()
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(days)
    }
}
