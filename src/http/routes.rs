//! HTTP route definitions for the operator control panel

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::app::AppState;
use crate::game::{CarAction, CarId, ControlError, GameSnapshot};
use crate::util::time::uptime_secs;

/// Upper bound for a request, game loop round trip included
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the control panel router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/state", get(state_handler))
        .route("/cars/:id/actions/:action", post(car_action_handler))
        .route("/cars/:id/flag", post(assign_flag_handler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health & state
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    connected_devices: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        connected_devices: state.connections.len(),
    })
}

async fn state_handler(State(state): State<AppState>) -> Json<GameSnapshot> {
    Json(state.snapshots.borrow().clone())
}

// ============================================================================
// Car control
// ============================================================================

#[derive(Serialize)]
struct ControlResponse {
    status: &'static str,
    car_id: CarId,
    action: String,
}

async fn car_action_handler(
    State(state): State<AppState>,
    Path((car_id, action)): Path<(CarId, String)>,
) -> Result<Json<ControlResponse>, AppError> {
    let parsed: CarAction = action.parse()?;
    state.control.act(car_id, parsed).await?;

    Ok(Json(ControlResponse {
        status: "ok",
        car_id,
        action: action.to_ascii_lowercase(),
    }))
}

async fn assign_flag_handler(
    State(state): State<AppState>,
    Path(car_id): Path<CarId>,
) -> Result<Json<ControlResponse>, AppError> {
    state.control.assign_flag(car_id).await?;
    info!(car_id, "Flag assigned from control panel");

    Ok(Json(ControlResponse {
        status: "ok",
        car_id,
        action: "flag".to_string(),
    }))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl From<ControlError> for AppError {
    fn from(err: ControlError) -> Self {
        let message = err.to_string();
        match err {
            ControlError::UnknownCar(_) => AppError::NotFound(message),
            ControlError::CarDisabled(_) | ControlError::FlagHeld { .. } => {
                AppError::Conflict(message)
            }
            ControlError::UnknownAction(_) => AppError::BadRequest(message),
            ControlError::Unavailable => AppError::Unavailable(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
