use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sessionlog::analytics::{geoip, StatsAggregator, VisitRecorder};
use sessionlog::api::{create_api_router, AppState};
use sessionlog::auth::AuthService;
use sessionlog::config::Config;
use sessionlog::notify::EmailNotifier;
use sessionlog::realtime::{Broadcaster, DEFAULT_CAPACITY};
use sessionlog::storage;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    let storage = storage::connect(&config.database).await?;
    info!("Initializing database...");
    storage.init().await?;
    info!("Database initialized successfully");

    let geo = geoip::from_config(&config.analytics)?;
    let broadcaster = Broadcaster::new(DEFAULT_CAPACITY);

    let mut recorder = VisitRecorder::new(Arc::clone(&storage), geo, broadcaster.clone());
    match config.notify.as_ref() {
        Some(notify) => recorder = recorder.with_notifier(Arc::new(EmailNotifier::from_config(notify)?)),
        None => info!("Visit notifications disabled"),
    }

    let state = AppState {
        storage: Arc::clone(&storage),
        auth: Arc::new(AuthService::new(Arc::clone(&storage), &config.auth)),
        broadcaster,
        recorder,
        stats: StatsAggregator::new(Arc::clone(&storage)),
    };

    let profile_pics_dir = config.static_files.profile_pics_dir.as_str();
    info!("Serving profile pictures from {}", profile_pics_dir);
    let app = create_api_router(state, Some(profile_pics_dir));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
