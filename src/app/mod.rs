//! Wiring of the device listener, the game loop and the control panel

pub mod state;

pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::directory::DeviceDirectory;
use crate::dispatch::ConnectionDirectory;
use crate::game::{ControlHandle, GameLoop};
use crate::http::build_router;
use crate::net::{run_device_listener, IngestContext};

/// Running workers plus what the control panel needs to talk to them
pub struct Runtime {
    pub state: AppState,
    shutdown: watch::Sender<bool>,
    game_loop: JoinHandle<()>,
    device_listener: JoinHandle<()>,
}

impl Runtime {
    /// Router serving the control panel for this runtime
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Stop accepting devices and stop the game loop
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.device_listener.await {
            warn!(error = %e, "Device listener task failed");
        }
        if let Err(e) = self.game_loop.await {
            warn!(error = %e, "Game loop task failed");
        }
        info!("Workers stopped");
    }
}

/// Spawn the game loop and the accept worker on an already bound listener
pub fn launch(config: &Config, directory: DeviceDirectory, device_listener: TcpListener) -> Runtime {
    let game = config.game.clone();
    if game.tick_interval > game.smallest_timeout() {
        warn!(
            tick_ms = game.tick_interval.as_millis() as u64,
            smallest_timeout_ms = game.smallest_timeout().as_millis() as u64,
            "Tick interval exceeds the smallest game timeout, timers will fire late"
        );
    }

    let directory = Arc::new(directory);
    let connections = Arc::new(ConnectionDirectory::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (events_tx, events_rx) = mpsc::channel(config.event_queue_capacity);
    let (control, control_rx) = ControlHandle::channel();

    let (game_loop, snapshots) = GameLoop::new(
        events_rx,
        control_rx,
        connections.clone(),
        directory.clone(),
        game,
        shutdown_rx.clone(),
    );
    let game_loop = tokio::spawn(game_loop.run());

    let ingest = IngestContext {
        directory,
        connections: connections.clone(),
        events: events_tx,
    };
    let device_listener = tokio::spawn(run_device_listener(device_listener, ingest, shutdown_rx));

    Runtime {
        state: AppState {
            control,
            snapshots,
            connections,
        },
        shutdown: shutdown_tx,
        game_loop,
        device_listener,
    }
}
