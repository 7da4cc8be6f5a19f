use axum::{extract::State, response::IntoResponse, Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::CurrentUser;
use crate::models::UserSummary;

use super::handlers::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserSummary,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> axum::response::Response {
    let (Some(username), Some(password)) = (
        payload.username.filter(|u| !u.is_empty()),
        payload.password.filter(|p| !p.is_empty()),
    ) else {
        return ApiError::BadRequest("Please provide username and password".to_string())
            .into_response();
    };

    match state.auth.login(&username, &password).await {
        Ok((token, user)) => Json(LoginResponse {
            token,
            user: UserSummary::from(&user),
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<UserSummary> {
    Json(UserSummary::from(&user))
}
