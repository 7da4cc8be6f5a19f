use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::auth::{auth_middleware, require_admin};

use super::analytics::{get_stats, get_trends, track_visit};
use super::auth::{login, me};
use super::handlers::{
    create_session, delete_session, health_check, list_sessions, my_sessions, update_session,
    AppState,
};
use super::realtime::ws_handler;

/// Build the full application router.
///
/// Profile pictures are served from `profile_pics_dir` when given.
pub fn create_api_router(state: AppState, profile_pics_dir: Option<&str>) -> Router {
    let state = Arc::new(state);
    let auth_service = Arc::clone(&state.auth);

    let authenticate = move |headers, req, next| {
        let auth = Arc::clone(&auth_service);
        auth_middleware(auth, headers, req, next)
    };

    let admin_routes = Router::new()
        .route("/analytics/stats", get(get_stats))
        .route("/analytics/trends", get(get_trends))
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn(authenticate.clone()));

    let protected_routes = Router::new()
        .route("/auth/me", get(me))
        .route("/sessions", get(list_sessions).post(create_session))
        .route("/sessions/my-sessions", get(my_sessions))
        .route("/sessions/{id}", put(update_session).delete(delete_session))
        .route_layer(middleware::from_fn(authenticate));

    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/auth/login", post(login))
        .route("/analytics/track", post(track_visit));

    let api = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes);

    let mut app = Router::new()
        .nest("/api", api)
        .route("/ws", get(ws_handler))
        .with_state(state);

    if let Some(dir) = profile_pics_dir {
        app = app.nest_service("/profile-pics", ServeDir::new(dir));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
