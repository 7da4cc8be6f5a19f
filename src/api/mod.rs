pub mod analytics;
pub mod auth;
pub mod handlers;
pub mod realtime;
pub mod routes;

pub use handlers::{ApiError, AppState, ErrorResponse};
pub use routes::create_api_router;
