//! OpenMicroCar arena server - entry point
//!
//! Starts two listeners:
//! - the device port, where cars and base stations stream sightings
//! - the HTTP control panel for operators

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use microcar_arena::app::launch;
use microcar_arena::config::Config;
use microcar_arena::directory::DeviceDirectory;
use microcar_arena::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level, config.json_logs);

    // Initialize server time tracking
    init_server_time();

    info!("Starting OpenMicroCar arena server");

    let directory = match &config.directory_path {
        Some(path) => DeviceDirectory::from_file(path)
            .with_context(|| format!("loading device directory {}", path.display()))?,
        None => DeviceDirectory::default(),
    };
    info!(devices = directory.len(), "Device directory loaded");

    // Bind failures are fatal
    let device_listener = TcpListener::bind(config.device_addr)
        .await
        .with_context(|| format!("binding device port {}", config.device_addr))?;
    let control_listener = TcpListener::bind(config.control_addr)
        .await
        .with_context(|| format!("binding control panel {}", config.control_addr))?;

    info!("Device port listening on {}", config.device_addr);
    info!("Control panel: http://{}/state", config.control_addr);

    let runtime = launch(&config, directory, device_listener);
    let router = runtime.router();

    axum::serve(control_listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    runtime.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
