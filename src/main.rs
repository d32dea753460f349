use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod auth;
mod cleanup;
mod config;
mod db;
mod error;
mod ffmpeg;
mod handlers;
mod models;
mod storage;
mod system_info;
#[cfg(test)]
mod test_support;

use config::Config;
use db::InMemoryVideoRepository;
use handlers::{
    create_video_handler, delete_video_handler, get_video_handler, list_videos_handler,
    upload_thumbnail_handler, upload_video_handler,
};
use models::AppState;
use storage::VideoStorage;

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/videos",
            post(create_video_handler).get(list_videos_handler),
        )
        .route(
            "/api/videos/:video_id",
            get(get_video_handler).delete(delete_video_handler),
        )
        .route(
            "/api/videos/:video_id/upload",
            post(upload_video_handler),
        )
        .route(
            "/api/videos/:video_id/thumbnail",
            post(upload_thumbnail_handler),
        )
        .nest_service("/assets", ServeDir::new(&state.config.assets_root))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tubely=debug,tower_http=debug")),
        )
        .init();

    // Load configuration
    let config = Config::load().context("loading configuration")?;

    // Ensure directories exist
    tokio::fs::create_dir_all(&config.assets_root)
        .await
        .with_context(|| format!("creating {}", config.assets_root.display()))?;
    tokio::fs::create_dir_all(&config.scratch_dir)
        .await
        .with_context(|| format!("creating {}", config.scratch_dir.display()))?;

    system_info::print_startup_info(&config).await;

    let storage = VideoStorage::s3(&config.storage).context("configuring object storage")?;
    info!("Uploading videos to bucket {}", storage.bucket());

    let app_state = Arc::new(AppState {
        config: config.clone(),
        db: Arc::new(InMemoryVideoRepository::new()),
        storage,
    });

    let _cleanup = cleanup::start_cleanup_task(Arc::new(config.clone()));

    let app = build_router(app_state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    info!("✅ Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
