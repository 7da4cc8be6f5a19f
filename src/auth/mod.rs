pub mod jwt;
pub mod password;

use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

use crate::config::AuthConfig;
use crate::models::User;
use crate::storage::Storage;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No token, authorization denied")]
    MissingToken,
    #[error("Token is not valid")]
    InvalidToken,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Admin access required")]
    Forbidden,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingToken | AuthError::InvalidToken | AuthError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match &self {
            AuthError::Internal(e) => {
                error!("Auth failure: {:#}", e);
                "Server error".to_string()
            }
            other => other.to_string(),
        };
        (
            self.status(),
            Json(serde_json::json!({ "error": message })),
        )
            .into_response()
    }
}

/// The authenticated user, attached to the request by [`auth_middleware`]
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

pub struct AuthService {
    storage: Arc<dyn Storage>,
    secret: String,
    token_ttl_days: i64,
}

impl AuthService {
    pub fn new(storage: Arc<dyn Storage>, config: &AuthConfig) -> Self {
        Self {
            storage,
            secret: config.jwt_secret.clone(),
            token_ttl_days: config.token_ttl_days,
        }
    }

    pub fn issue_token(&self, user: &User) -> anyhow::Result<String> {
        jwt::encode_jwt(&self.secret, user.id, self.token_ttl_days)
    }

    /// Check a username/password pair and issue a token on success
    pub async fn login(&self, username: &str, password: &str) -> Result<(String, User), AuthError> {
        let user = self
            .storage
            .get_user_by_username(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !password::verify_password(password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.issue_token(&user)?;
        Ok((token, user))
    }

    /// Resolve a bearer token to a live user. Tokens of deleted users are rejected.
    pub async fn authenticate(&self, token: &str) -> Result<User, AuthError> {
        let claims = jwt::decode_jwt(token, &self.secret).map_err(|e| {
            debug!("Rejected token: {}", e);
            AuthError::InvalidToken
        })?;
        let user_id = claims.user_id().ok_or(AuthError::InvalidToken)?;

        self.storage
            .get_user(user_id)
            .await?
            .ok_or(AuthError::InvalidToken)
    }
}

/// Extract the token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub async fn auth_middleware(
    auth_service: Arc<AuthService>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return AuthError::MissingToken.into_response();
    };

    match auth_service.authenticate(token).await {
        Ok(user) => {
            request.extensions_mut().insert(CurrentUser(user));
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Must run after [`auth_middleware`]
pub async fn require_admin(request: Request, next: Next) -> Response {
    let is_admin = request
        .extensions()
        .get::<CurrentUser>()
        .map(|CurrentUser(user)| user.is_admin);

    match is_admin {
        Some(true) => next.run(request).await,
        Some(false) => AuthError::Forbidden.into_response(),
        None => AuthError::MissingToken.into_response(),
    }
}
