//! Analytics API handlers

use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Query, Request, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

use crate::analytics::aggregator::DEFAULT_TREND_DAYS;
use crate::analytics::{TrackPayload, TrackResponse, VisitFilter};

use super::handlers::{AppState, ErrorResponse};

/// Upper bound on a tracking payload
const MAX_TRACK_BODY: usize = 16 * 1024;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQueryParams {
    /// `YYYY-MM-DD` or RFC 3339, inclusive
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TrendsQueryParams {
    pub days: Option<i64>,
}

/// Record a page visit. Always answers 200; `success` reports the outcome.
pub async fn track_visit(State(state): State<Arc<AppState>>, request: Request) -> Json<TrackResponse> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let (parts, body) = request.into_parts();

    let payload = match read_payload(body).await {
        Ok(payload) => payload,
        Err(reason) => {
            warn!("Rejected track payload: {}", reason);
            return Json(TrackResponse { success: false });
        }
    };

    Json(state.recorder.track(payload, &parts.headers, peer).await)
}

async fn read_payload(body: Body) -> Result<TrackPayload, String> {
    let bytes = to_bytes(body, MAX_TRACK_BODY)
        .await
        .map_err(|e| format!("unreadable body: {}", e))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("invalid JSON: {}", e))
}

/// Aggregated dashboard statistics
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatsQueryParams>,
) -> impl IntoResponse {
    let filter = match VisitFilter::from_dates(
        params.start_date.as_deref(),
        params.end_date.as_deref(),
    ) {
        Ok(filter) => filter,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    };

    match state.stats.stats(&filter).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => {
            tracing::error!("Failed to fetch analytics: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to fetch analytics".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Daily visit counts over the last `days` days (default 7)
pub async fn get_trends(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TrendsQueryParams>,
) -> impl IntoResponse {
    let days = params.days.unwrap_or(DEFAULT_TREND_DAYS);
    if days < 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "days must not be negative".to_string(),
            }),
        )
            .into_response();
    }

    match state.stats.trends(days).await {
        Ok(trends) => Json(trends).into_response(),
        Err(e) => {
            tracing::error!("Failed to fetch trends: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to fetch trends".to_string(),
                }),
            )
                .into_response()
        }
    }
}
