use crate::analytics::models::{NewVisit, VisitRecord};
use crate::analytics::storage::{DailyCount, DimensionCount, RecentVisit, VisitDimension, VisitFilter};
use crate::models::{now_millis, JournalSession, NewSession, SessionChanges, SessionRow, User};
use crate::storage::{Storage, StorageError, StorageResult};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
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

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

fn push_range(qb: &mut QueryBuilder<'_, Postgres>, filter: &VisitFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(start) = filter.start {
        qb.push(" AND occurred_at >= ").push_bind(start);
    }
    if let Some(end) = filter.end {
        qb.push(" AND occurred_at <= ").push_bind(end);
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                profile_pic TEXT,
                is_admin BOOLEAN NOT NULL DEFAULT FALSE,
                created_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS journal_sessions (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                date TEXT NOT NULL,
                time TEXT NOT NULL,
                rating BIGINT NOT NULL CHECK (rating BETWEEN 1 AND 5),
                description TEXT NOT NULL,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL
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
                id BIGSERIAL PRIMARY KEY,
                path TEXT NOT NULL,
                occurred_at BIGINT NOT NULL,
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
                user_id BIGINT,
                created_at BIGINT NOT NULL
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
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, password_hash, profile_pic, is_admin, created_at)
            VALUES ($1, $2, $3, FALSE, $4)
            ON CONFLICT (username) DO NOTHING
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(username)
        .bind(password_hash)
        .bind(profile_pic)
        .bind(now_millis())
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        user.ok_or(StorageError::Conflict)
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn set_password(&self, username: &str, password_hash: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE username = $2")
            .bind(password_hash)
            .bind(username)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_admin(&self, username: &str, is_admin: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET is_admin = $1 WHERE username = $2")
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
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO journal_sessions (user_id, date, time, rating, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(&session.date)
        .bind(&session.time)
        .bind(session.rating)
        .bind(&session.description)
        .bind(now)
        .fetch_one(self.pool.as_ref())
        .await?;

        self.get_session(id)
            .await?
            .ok_or_else(|| anyhow!("session missing after insert"))
    }

    async fn get_session(&self, id: i64) -> Result<Option<JournalSession>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!("{SESSION_SELECT} WHERE s.id = $1"))
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(row.map(JournalSession::from))
    }

    async fn list_sessions(&self, user_id: Option<i64>) -> Result<Vec<JournalSession>> {
        let rows = match user_id {
            Some(uid) => {
                sqlx::query_as::<_, SessionRow>(&format!(
                    "{SESSION_SELECT} WHERE s.user_id = $1 ORDER BY s.created_at DESC, s.id DESC"
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
            SET date = COALESCE($1, date),
                time = COALESCE($2, time),
                rating = COALESCE($3, rating),
                description = COALESCE($4, description),
                updated_at = $5
            WHERE id = $6
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
        let result = sqlx::query("DELETE FROM journal_sessions WHERE id = $1")
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_visit(&self, visit: &NewVisit) -> Result<VisitRecord> {
        let record = sqlx::query_as::<_, VisitRecord>(&format!(
            r#"
            INSERT INTO visits (
                path, occurred_at, user_agent, device_type, browser, os, ip, country, city,
                referrer, language, screen_resolution, session_id, user_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {VISIT_COLUMNS}
            "#
        ))
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
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(record)
    }

    async fn count_visits(&self, filter: &VisitFilter) -> Result<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM visits");
        push_range(&mut qb, filter);

        let count = qb
            .build_query_scalar::<i64>()
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(count)
    }

    async fn count_distinct_sessions(&self, filter: &VisitFilter) -> Result<i64> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM (SELECT DISTINCT session_id FROM visits",
        );
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
        let mut qb = QueryBuilder::<Postgres>::new(format!(
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
        let mut qb = QueryBuilder::<Postgres>::new(
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
        let mut qb = QueryBuilder::<Postgres>::new(
            r#"
            SELECT EXTRACT(YEAR FROM day_utc)::INT AS year,
                   EXTRACT(MONTH FROM day_utc)::INT AS month,
                   EXTRACT(DAY FROM day_utc)::INT AS day,
                   COUNT(*) AS count
            FROM (
                SELECT to_timestamp(occurred_at / 1000.0) AT TIME ZONE 'UTC' AS day_utc
                FROM visits
            "#,
        );
        push_range(&mut qb, filter);
        qb.push(") AS v GROUP BY year, month, day ORDER BY year ASC, month ASC, day ASC");

        let days = qb
            .build_query_as::<DailyCount>()
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(days)
    }
}
