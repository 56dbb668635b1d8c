use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Json, Response, Sse,
    },
    routing::{get, post},
    Router,
};
use contam_sensor::{list_ports, DriverError, PortListing};
use contam_types::{analyze, Analysis, AnalysisError, SampleType};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::{wrappers::IntervalStream, Stream, StreamExt};

use crate::config::DaemonConfig;
use crate::controller::AcquisitionController;
use crate::stream::{self, DeviceStatus, StreamFrame};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<AcquisitionController>,
    pub config: Arc<DaemonConfig>,
}

impl AppState {
    fn frame(&self) -> StreamFrame {
        stream::poll(
            self.controller.device(),
            &self.config.thresholds,
            self.config.default_sample_type,
        )
    }
}

/// Errors returned to HTTP callers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl From<DriverError> for ApiError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::ConfigurationError(msg) => ApiError::BadRequest(msg),
            DriverError::Unavailable(msg) => ApiError::Unavailable(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            ApiError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        let body = json!({
            "status": kind,
            "error": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub port: String,
    pub baud: Option<u32>,
}

pub async fn connect_handler(
    State(state): State<AppState>,
    Json(payload): Json<ConnectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let port = payload.port.trim();
    if port.is_empty() {
        return Err(ApiError::BadRequest("port must not be empty".to_string()));
    }
    let baud_rate = payload.baud.unwrap_or(state.config.serial.default_baud_rate);

    // The capability check scans the OS port list; keep it off the async workers.
    let controller = state.controller.clone();
    let requested = port.to_string();
    let session = tokio::task::spawn_blocking(move || controller.connect(&requested, baud_rate))
        .await
        .map_err(|e| ApiError::Internal(format!("connect task failed: {}", e)))??;
    tracing::info!("Connect request accepted for {} ({:?})", port, session);

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "connecting",
            "port": port,
            "baud_rate": baud_rate,
            "session": session.0,
        })),
    ))
}

pub async fn disconnect_handler(State(state): State<AppState>) -> impl IntoResponse {
    let was_connected = state.controller.disconnect();
    Json(json!({
        "status": "disconnected",
        "was_connected": was_connected,
    }))
}

pub async fn status_handler(State(state): State<AppState>) -> Json<DeviceStatus> {
    let snapshot = state.controller.device().snapshot();
    Json(DeviceStatus::from_snapshot(&snapshot, Instant::now()))
}

pub async fn ports_handler() -> Json<PortListing> {
    let listing = tokio::task::spawn_blocking(list_ports)
        .await
        .unwrap_or_else(|e| PortListing::unavailable(format!("port scan failed: {}", e)));
    Json(listing)
}

pub async fn stream_handler(State(state): State<AppState>) -> Json<StreamFrame> {
    Json(state.frame())
}

pub async fn stream_events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let ticks = IntervalStream::new(tokio::time::interval(state.config.stream_interval()));
    let events = ticks.map(move |_| {
        let frame = state.frame();
        let event = match serde_json::to_string(&frame) {
            Ok(data) => Event::default().event("reading").data(data),
            Err(e) => {
                tracing::error!("Failed to serialize stream frame: {}", e);
                Event::default().event("error").data(e.to_string())
            }
        };
        Ok(event)
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub sensor_value: f64,
    pub weight_kg: f64,
    pub sample_type: Option<SampleType>,
}

pub async fn analyze_handler(
    State(state): State<AppState>,
    Json(payload): Json<AnalyzeRequest>,
) -> Result<Json<Analysis>, ApiError> {
    let sample_type = payload
        .sample_type
        .unwrap_or(state.config.default_sample_type);
    let analysis = analyze(
        payload.sensor_value,
        payload.weight_kg,
        sample_type,
        &state.config.thresholds,
    )?;
    Ok(Json(analysis))
}

pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/device/connect", post(connect_handler))
        .route("/api/device/disconnect", post(disconnect_handler))
        .route("/api/device/status", get(status_handler))
        .route("/api/device/ports", get(ports_handler))
        .route("/api/stream", get(stream_handler))
        .route("/api/stream/events", get(stream_events_handler))
        .route("/api/analyze", post(analyze_handler))
        .with_state(state)
}
