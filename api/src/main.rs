/// Courier API Server
///
/// Serves the web UI and a small JSON API that wraps yt-dlp:
/// video info lookup, downloads, and retrieval of finished files.
mod config;
mod routes;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use config::Config;
use courier_downloader::{locate_ytdlp, YtDlp};

/// Shared application state for all API handlers.
pub struct AppState {
    pub ytdlp: YtDlp,
    pub download_dir: PathBuf,
}

/// Build the full router: API routes, finished downloads, and the static UI.
pub fn build_router(state: Arc<AppState>, public_dir: &Path) -> Router {
    // CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/info", post(routes::get_info))
        .route("/api/download", post(routes::download))
        .route("/api/file/:filename", get(routes::serve_file))
        .route("/api/health", get(routes::health))
        .nest_service("/downloads", ServeDir::new(&state.download_dir))
        .fallback_service(ServeDir::new(public_dir))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenvy::dotenv().ok();

    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_api=info,courier_downloader=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env();

    // Download directory
    tokio::fs::create_dir_all(&config.download_dir)
        .await
        .with_context(|| format!("Failed to create download directory {}", config.download_dir.display()))?;
    info!("Download directory: {}", config.download_dir.display());

    // yt-dlp
    let bin = locate_ytdlp(config.ytdlp_path.as_deref());
    let ytdlp = YtDlp::new(bin)
        .with_info_timeout(Duration::from_secs(config.info_timeout_secs))
        .with_download_timeout(Duration::from_secs(config.download_timeout_secs));

    let state = Arc::new(AppState {
        ytdlp,
        download_dir: config.download_dir.clone(),
    });

    // Background retention sweep
    if config.retention_secs > 0 {
        let sweep_dir = config.download_dir.clone();
        let max_age = Duration::from_secs(config.retention_secs);
        let every = Duration::from_secs(config.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                match courier_downloader::retention::sweep_expired(&sweep_dir, max_age).await {
                    Ok(n) if n > 0 => info!("Removed {} expired downloads", n),
                    Err(e) => warn!("Retention sweep error: {}", e),
                    _ => {}
                }
            }
        });
        info!("Retention sweep enabled: max age {}s", config.retention_secs);
    }

    let app = build_router(state.clone(), &config.public_dir);

    // Bind
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Courier video downloader listening on http://{}", addr);
    info!("Supports: YouTube, TikTok, Instagram");
    info!("yt-dlp: {}", state.ytdlp.bin().display());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Courier stopped.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
