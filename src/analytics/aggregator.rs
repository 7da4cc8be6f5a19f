//! Dashboard aggregation over stored visits
//!
//! All aggregates are computed by the store; the independent queries of a
//! stats request run concurrently.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::analytics::storage::{DailyCount, VisitDimension, VisitFilter, VisitStats};
use crate::storage::Storage;

/// Groups returned for country and page breakdowns
pub const TOP_LIMIT: i64 = 10;
/// Rows returned in the recent-visits list
pub const RECENT_LIMIT: i64 = 50;
pub const DEFAULT_TREND_DAYS: i64 = 7;

#[derive(Clone)]
pub struct StatsAggregator {
    storage: Arc<dyn Storage>,
}

impl StatsAggregator {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn stats(&self, filter: &VisitFilter) -> Result<VisitStats> {
        let store = self.storage.as_ref();

        let (
            total_visits,
            unique_sessions,
            device_breakdown,
            browser_breakdown,
            country_breakdown,
            top_pages,
            recent_visits,
        ) = tokio::try_join!(
            store.count_visits(filter),
            store.count_distinct_sessions(filter),
            store.group_visits(VisitDimension::Device, filter, None),
            store.group_visits(VisitDimension::Browser, filter, None),
            store.group_visits(VisitDimension::Country, filter, Some(TOP_LIMIT)),
            store.group_visits(VisitDimension::Path, filter, Some(TOP_LIMIT)),
            store.recent_visits(filter, RECENT_LIMIT),
        )?;

        Ok(VisitStats {
            total_visits,
            unique_sessions,
            device_breakdown,
            browser_breakdown,
            country_breakdown,
            top_pages,
            recent_visits,
        })
    }

    /// Daily counts for visits in the last `days` days
    pub async fn trends(&self, days: i64) -> Result<Vec<DailyCount>> {
        self.trends_at(days, Utc::now()).await
    }

    /// Daily counts for visits at or after `now - days`. A window reaching
    /// past the representable range covers all history.
    pub async fn trends_at(&self, days: i64, now: DateTime<Utc>) -> Result<Vec<DailyCount>> {
        let since = Duration::try_days(days)
            .and_then(|window| now.checked_sub_signed(window))
            .map(|start| start.timestamp_millis())
            .unwrap_or(i64::MIN);
        self.storage
            .daily_visit_counts(&VisitFilter::since(since))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::models::NewVisit;
    use crate::analytics::storage::DimensionCount;
    use crate::storage::SqliteStorage;
    use chrono::TimeZone;

    async fn storage() -> Arc<dyn Storage> {
        let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
        storage.init().await.unwrap();
        Arc::new(storage)
    }

    fn visit(path: &str, timestamp: i64, session: Option<&str>) -> NewVisit {
        NewVisit {
            path: path.to_string(),
            timestamp,
            user_agent: String::new(),
            device_type: "desktop".to_string(),
            browser: "Chrome".to_string(),
            os: "Linux".to_string(),
            ip: "203.0.113.1".to_string(),
            country: "Unknown".to_string(),
            city: "Unknown".to_string(),
            referrer: None,
            language: None,
            screen_resolution: None,
            session_id: session.map(str::to_string),
            user_id: None,
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_empty_store_yields_zeroes() {
        let stats = StatsAggregator::new(storage().await)
            .stats(&VisitFilter::default())
            .await
            .unwrap();

        assert_eq!(stats.total_visits, 0);
        assert_eq!(stats.unique_sessions, 0);
        assert!(stats.device_breakdown.is_empty());
        assert!(stats.top_pages.is_empty());
        assert!(stats.recent_visits.is_empty());
    }

    #[tokio::test]
    async fn test_null_session_counts_as_one_group() {
        let storage = storage().await;
        for session in [Some("s1"), Some("s1"), Some("s2"), None] {
            storage.insert_visit(&visit("/", 1_000, session)).await.unwrap();
        }

        let stats = StatsAggregator::new(storage)
            .stats(&VisitFilter::default())
            .await
            .unwrap();
        assert_eq!(stats.total_visits, 4);
        assert_eq!(stats.unique_sessions, 3);
    }

    #[tokio::test]
    async fn test_breakdowns_are_limited_and_ordered() {
        let storage = storage().await;
        for i in 0..12 {
            for _ in 0..=i {
                let row = NewVisit {
                    country: format!("C{i:02}"),
                    ..visit(&format!("/page/{i:02}"), 1_000 + i, None)
                };
                storage.insert_visit(&row).await.unwrap();
            }
        }

        let stats = StatsAggregator::new(storage)
            .stats(&VisitFilter::default())
            .await
            .unwrap();

        assert_eq!(stats.total_visits, 78);
        assert_eq!(stats.top_pages.len(), TOP_LIMIT as usize);
        assert_eq!(
            stats.top_pages[0],
            DimensionCount {
                dimension: Some("/page/11".to_string()),
                count: 12
            }
        );
        assert!(stats
            .top_pages
            .windows(2)
            .all(|w| w[0].count >= w[1].count));
        assert_eq!(stats.country_breakdown.len(), TOP_LIMIT as usize);
        assert_eq!(
            stats.country_breakdown[0],
            DimensionCount {
                dimension: Some("C11".to_string()),
                count: 12
            }
        );
        assert!(stats
            .country_breakdown
            .windows(2)
            .all(|w| w[0].count >= w[1].count));
        assert_eq!(stats.recent_visits.len(), RECENT_LIMIT as usize);
        assert!(stats
            .recent_visits
            .windows(2)
            .all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_range_filter_is_inclusive() {
        let storage = storage().await;
        for ts in [100, 200, 300] {
            storage.insert_visit(&visit("/", ts, None)).await.unwrap();
        }

        let filter = VisitFilter {
            start: Some(200),
            end: Some(300),
        };
        let stats = StatsAggregator::new(storage).stats(&filter).await.unwrap();
        assert_eq!(stats.total_visits, 2);
    }

    #[tokio::test]
    async fn test_trends_group_by_utc_day() {
        let storage = storage().await;
        let now = at(2024, 3, 10, 12);
        for ts in [
            at(2024, 3, 8, 11), // before the window
            at(2024, 3, 8, 13),
            at(2024, 3, 9, 9),
            at(2024, 3, 9, 22),
            at(2024, 3, 10, 8),
        ] {
            storage
                .insert_visit(&visit("/", ts.timestamp_millis(), None))
                .await
                .unwrap();
        }

        let trends = StatsAggregator::new(storage)
            .trends_at(2, now)
            .await
            .unwrap();

        assert_eq!(
            trends,
            vec![
                DailyCount { year: 2024, month: 3, day: 8, count: 1 },
                DailyCount { year: 2024, month: 3, day: 9, count: 2 },
                DailyCount { year: 2024, month: 3, day: 10, count: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_oversized_window_covers_everything() {
        let storage = storage().await;
        storage.insert_visit(&visit("/", 0, None)).await.unwrap();

        let trends = StatsAggregator::new(storage)
            .trends_at(i64::MAX, at(2024, 3, 10, 12))
            .await
            .unwrap();
        assert_eq!(
            trends,
            vec![DailyCount { year: 1970, month: 1, day: 1, count: 1 }]
        );
    }
}
