//! Application state shared across routes

use std::sync::Arc;

use tokio::sync::watch;

use crate::dispatch::ConnectionDirectory;
use crate::game::{ControlHandle, GameSnapshot};

/// Shared control panel state
///
/// Nothing here can mutate game state directly; changes go through
/// `control` and are judged by the game loop.
#[derive(Clone)]
pub struct AppState {
    pub control: ControlHandle,
    pub snapshots: watch::Receiver<GameSnapshot>,
    pub connections: Arc<ConnectionDirectory>,
}
