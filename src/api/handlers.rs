use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

use crate::analytics::{StatsAggregator, VisitRecorder};
use crate::auth::{AuthService, CurrentUser};
use crate::models::{
    CreateSessionRequest, JournalSession, SessionValidationError, UpdateSessionRequest,
};
use crate::realtime::{Broadcaster, LiveEvent};
use crate::storage::Storage;

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub auth: Arc<AuthService>,
    pub broadcaster: Broadcaster,
    pub recorder: VisitRecorder,
    pub stats: StatsAggregator,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<SessionValidationError> for ApiError {
    fn from(e: SessionValidationError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Internal(e) => {
                error!("Request failed: {:#}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "Server is running",
    })
}

/// List every session, newest first
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<JournalSession>>, ApiError> {
    Ok(Json(state.storage.list_sessions(None).await?))
}

/// List the caller's sessions, newest first
pub async fn my_sessions(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<JournalSession>>, ApiError> {
    Ok(Json(state.storage.list_sessions(Some(user.id)).await?))
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<JournalSession>), ApiError> {
    let new_session = payload.validate()?;
    let session = state.storage.create_session(user.id, &new_session).await?;

    state
        .broadcaster
        .publish(LiveEvent::NewSession(session.clone()));

    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn update_session(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateSessionRequest>,
) -> Result<Json<JournalSession>, ApiError> {
    owned_session(&state, id, user.id, "update").await?;
    let changes = payload.validate()?;

    let session = state
        .storage
        .update_session(id, &changes)
        .await?
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;

    state
        .broadcaster
        .publish(LiveEvent::SessionUpdated(session.clone()));

    Ok(Json(session))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, ApiError> {
    owned_session(&state, id, user.id, "delete").await?;

    if !state.storage.delete_session(id).await? {
        return Err(ApiError::NotFound("Session not found".to_string()));
    }

    state.broadcaster.publish(LiveEvent::SessionDeleted { id });

    Ok(Json(SuccessResponse {
        message: "Session deleted successfully".to_string(),
    }))
}

/// Load a session and check the caller owns it
async fn owned_session(
    state: &AppState,
    id: i64,
    user_id: i64,
    action: &str,
) -> Result<JournalSession, ApiError> {
    let session = state
        .storage
        .get_session(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;

    if session.user.id != user_id {
        return Err(ApiError::Forbidden(format!(
            "Not authorized to {} this session",
            action
        )));
    }
    Ok(session)
}
