//! Integration tests for the storage backends
//!
//! Tests can be filtered by database backend using the DATABASE_BACKEND environment variable:
//! - `DATABASE_BACKEND=sqlite cargo test` - Run only SQLite tests
//! - `DATABASE_BACKEND=postgres cargo test` - Run only PostgreSQL tests (needs DATABASE_URL)
//! - By default, both backends are tested

use sessionlog::analytics::models::NewVisit;
use sessionlog::analytics::storage::{VisitDimension, VisitFilter};
use sessionlog::models::{NewSession, SessionChanges};
use sessionlog::storage::{PostgresStorage, SqliteStorage, Storage, StorageError};
use std::sync::Arc;

fn should_test_backend(backend: &str) -> bool {
    match std::env::var("DATABASE_BACKEND") {
        Ok(val) => val.to_lowercase() == backend.to_lowercase(),
        Err(_) => true,
    }
}

async fn create_sqlite_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

/// Only available when DATABASE_URL points at a disposable Postgres database
async fn create_postgres_storage() -> Option<Arc<dyn Storage>> {
    let db_url = std::env::var("DATABASE_URL").ok()?;
    if !db_url.starts_with("postgres") {
        return None;
    }
    let storage = PostgresStorage::new(&db_url, 5).await.ok()?;
    storage.init().await.ok()?;
    Some(Arc::new(storage))
}

fn unique(name: &str) -> String {
    format!("{}-{}", name, sessionlog::models::now_millis())
}

fn visit(path: &str, timestamp: i64, session: Option<&str>, device: &str) -> NewVisit {
    NewVisit {
        path: path.to_string(),
        timestamp,
        user_agent: "test-agent".to_string(),
        device_type: device.to_string(),
        browser: "Chrome".to_string(),
        os: "Windows".to_string(),
        ip: "192.0.2.10".to_string(),
        country: "Unknown".to_string(),
        city: "Unknown".to_string(),
        referrer: Some("https://example.com".to_string()),
        language: Some("en".to_string()),
        screen_resolution: Some("1920x1080".to_string()),
        session_id: session.map(str::to_string),
        user_id: None,
    }
}

async fn check_users(storage: Arc<dyn Storage>) {
    let name = unique("alice");
    let user = storage.create_user(&name, "hash-1", None).await.unwrap();
    assert!(!user.is_admin);

    assert!(matches!(
        storage.create_user(&name, "hash-2", None).await,
        Err(StorageError::Conflict)
    ));

    assert!(storage.set_admin(&name, true).await.unwrap());
    assert!(storage.set_password(&name, "hash-3").await.unwrap());
    let reloaded = storage.get_user(user.id).await.unwrap().unwrap();
    assert!(reloaded.is_admin);
    assert_eq!(reloaded.password_hash, "hash-3");

    assert!(!storage.set_admin("nobody-at-all", true).await.unwrap());
    assert!(storage
        .list_users()
        .await
        .unwrap()
        .iter()
        .any(|u| u.username == name));
}

async fn check_sessions(storage: Arc<dyn Storage>) {
    let owner = storage
        .create_user(&unique("owner"), "hash", Some("me.png"))
        .await
        .unwrap();

    let created = storage
        .create_session(
            owner.id,
            &NewSession {
                date: "2024-05-01".to_string(),
                time: "08:15".to_string(),
                rating: 3,
                description: "morning pages".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(created.user.id, owner.id);
    assert_eq!(created.user.profile_pic.as_deref(), Some("me.png"));

    let updated = storage
        .update_session(
            created.id,
            &SessionChanges {
                rating: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.rating, 5);
    assert_eq!(updated.description, "morning pages");
    assert!(updated.updated_at >= created.updated_at);

    let mine = storage.list_sessions(Some(owner.id)).await.unwrap();
    assert_eq!(mine.len(), 1);

    assert!(storage.delete_session(created.id).await.unwrap());
    assert!(!storage.delete_session(created.id).await.unwrap());
    assert!(storage.get_session(created.id).await.unwrap().is_none());
    assert!(storage
        .update_session(created.id, &SessionChanges::default())
        .await
        .unwrap()
        .is_none());
}

/// Runs against a window far in the future so shared databases do not interfere
async fn check_visits(storage: Arc<dyn Storage>) {
    let base = 4_102_444_800_000 + (sessionlog::models::now_millis() % 1_000) * 86_400_000;
    let filter = VisitFilter {
        start: Some(base),
        end: Some(base + 86_400_000 - 1),
    };

    let stored = storage
        .insert_visit(&visit("/a", base + 10, Some("s1"), "mobile"))
        .await
        .unwrap();
    assert_eq!(stored.timestamp, base + 10);
    assert_eq!(stored.session_id.as_deref(), Some("s1"));
    assert_eq!(stored.screen_resolution.as_deref(), Some("1920x1080"));

    storage
        .insert_visit(&visit("/a", base + 20, Some("s1"), "desktop"))
        .await
        .unwrap();
    storage
        .insert_visit(&visit("/b", base + 30, None, "desktop"))
        .await
        .unwrap();
    // Outside the window
    storage
        .insert_visit(&visit("/c", base + 86_400_000, None, "desktop"))
        .await
        .unwrap();

    assert_eq!(storage.count_visits(&filter).await.unwrap(), 3);
    assert_eq!(storage.count_distinct_sessions(&filter).await.unwrap(), 2);

    let devices = storage
        .group_visits(VisitDimension::Device, &filter, None)
        .await
        .unwrap();
    assert_eq!(devices[0].dimension.as_deref(), Some("desktop"));
    assert_eq!(devices[0].count, 2);
    assert_eq!(devices[1].dimension.as_deref(), Some("mobile"));

    let pages = storage
        .group_visits(VisitDimension::Path, &filter, Some(1))
        .await
        .unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].dimension.as_deref(), Some("/a"));

    let recent = storage.recent_visits(&filter, 2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].path, "/b");

    let two_days = VisitFilter {
        start: Some(base),
        end: Some(base + 2 * 86_400_000 - 1),
    };
    let daily = storage.daily_visit_counts(&two_days).await.unwrap();
    assert_eq!(daily.len(), 2);
    assert_eq!(daily[0].count, 3);
    assert_eq!(daily[1].count, 1);
}

#[tokio::test]
async fn test_users_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }
    check_users(create_sqlite_storage().await).await;
}

#[tokio::test]
async fn test_sessions_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }
    check_sessions(create_sqlite_storage().await).await;
}

#[tokio::test]
async fn test_visits_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }
    check_visits(create_sqlite_storage().await).await;
}

#[tokio::test]
async fn test_session_requires_existing_user_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }
    let storage = create_sqlite_storage().await;
    let user = storage.create_user("temp", "hash", None).await.unwrap();
    assert!(storage
        .create_session(
            user.id + 1,
            &NewSession {
                date: "2024-05-01".to_string(),
                time: "08:15".to_string(),
                rating: 3,
                description: "orphan".to_string(),
            },
        )
        .await
        .is_err());
}

#[tokio::test]
async fn test_file_database_survives_reopen_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("journal.db").display());

    {
        let storage = SqliteStorage::new(&url, 2).await.unwrap();
        storage.init().await.unwrap();
        storage.create_user("keeper", "hash", None).await.unwrap();
        storage
            .insert_visit(&visit("/", 1_000, Some("s1"), "desktop"))
            .await
            .unwrap();
    }

    let reopened = SqliteStorage::new(&url, 2).await.unwrap();
    reopened.init().await.unwrap();
    assert!(reopened.get_user_by_username("keeper").await.unwrap().is_some());
    assert_eq!(reopened.count_visits(&VisitFilter::default()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_users_postgres() {
    if !should_test_backend("postgres") {
        return;
    }
    let Some(storage) = create_postgres_storage().await else {
        eprintln!("Skipping PostgreSQL test: DATABASE_URL not set");
        return;
    };
    check_users(storage).await;
}

#[tokio::test]
async fn test_sessions_postgres() {
    if !should_test_backend("postgres") {
        return;
    }
    let Some(storage) = create_postgres_storage().await else {
        eprintln!("Skipping PostgreSQL test: DATABASE_URL not set");
        return;
    };
    check_sessions(storage).await;
}

#[tokio::test]
async fn test_visits_postgres() {
    if !should_test_backend("postgres") {
        return;
    }
    let Some(storage) = create_postgres_storage().await else {
        eprintln!("Skipping PostgreSQL test: DATABASE_URL not set");
        return;
    };
    check_visits(storage).await;
}
