//! Indirector Server Binary
//!
//! Runs the HTTP API over the standard indirections.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use indirector_core::{RunMode, Settings};
use indirector_server::{create_router, AppState};

#[tokio::main]
async fn main() {
    // Configuration file, then environment overrides
    let settings = match env::var("INDIRECTOR_CONFIG") {
        Ok(path) => Settings::from_file(&path),
        Err(_) => Ok(Settings::default()),
    };

    // Initialize logging
    let log_level = env::var("INDIRECTOR_LOG_LEVEL")
        .ok()
        .or_else(|| settings.as_ref().ok().map(|s| s.logging.level.clone()))
        .unwrap_or_else(|| "info".into())
        .parse()
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let mut settings = settings.expect("Failed to load INDIRECTOR_CONFIG");

    if let Ok(mode) = env::var("INDIRECTOR_RUN_MODE") {
        settings.run_mode = mode
            .parse::<RunMode>()
            .expect("INDIRECTOR_RUN_MODE must be master, agent or user");
    }

    if let Ok(dir) = env::var("INDIRECTOR_DATA_DIR") {
        settings.data_dir = PathBuf::from(dir);
    }

    let mut addr: SocketAddr = settings
        .listen
        .parse()
        .expect("listen must be a socket address");
    if let Ok(port) = env::var("INDIRECTOR_PORT") {
        addr.set_port(port.parse().expect("INDIRECTOR_PORT must be a valid port number"));
    }

    info!(
        run_mode = %settings.run_mode,
        data_dir = %settings.data_dir.display(),
        "Starting indirector server"
    );

    // Create application state
    let state = Arc::new(AppState::from_settings(settings).expect("Invalid settings"));

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    info!(addr = %addr, "Indirector listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
