// Recorded-game hub: ingest pipeline, ELO rating engine and read API.

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod http;
pub mod ingest;
mod middleware;
pub use middleware::cors_layer;
pub mod minimap;
pub mod models;
pub mod parser;
pub mod rating;
pub mod state;
pub mod storage;

use std::net::SocketAddr;

use axum::Router;
use config::AppConfig;
use state::AppState;
use tokio::signal;
use tracing_subscriber::EnvFilter;

/// Initialize tracing per `system.loglevel` / `system.logdest`. Anything
/// other than "console" logs to a file under the log directory.
pub fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.loglevel.to_lowercase()));

    if config.logdest == "console" {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return;
    }

    let _ = std::fs::create_dir_all(&config.logdir);
    let path = config.logdir.join(format!("{}.log", env!("CARGO_PKG_NAME")));
    match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        Err(e) => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            tracing::warn!("Could not open log file {}: {}", path.display(), e);
        }
    }
}

/// Start the HTTP API server plus the ingest watcher.
pub async fn start_server() {
    dotenvy::dotenv().ok();

    let config = std::sync::Arc::new(AppConfig::from_env());
    init_tracing(&config);

    let state = AppState::with_config(config)
        .await
        .expect("Failed to initialize application state");

    tracing::info!("Sqlite pool and ingest workers ready");

    let app = Router::new()
        .merge(http::create_http_routes(state.clone()))
        .layer(cors_layer())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .fallback(|| async { "404 Not Found" });

    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3001);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("Failed to bind address");

    tracing::info!("Server listening on port {}", port);

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        tracing::error!("Server error: {}", e);
    }
}

/// Handle graceful shutdown on SIGTERM or Ctrl+C
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, shutting down");
        },
        _ = terminate => {
            tracing::info!("SIGTERM received, shutting down");
        },
    }
}
