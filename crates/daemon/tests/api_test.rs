use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use contam_daemon::{
    api::{create_router, AppState},
    config::DaemonConfig,
    controller::AcquisitionController,
};
use contam_sensor::serial::{LineEvent, LineReader};
use contam_sensor::{DeviceState, DriverError, LinkOpener, SerialSettings};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

struct IdleLink;

impl LineReader for IdleLink {
    fn next_line(&mut self) -> LineEvent {
        thread::sleep(Duration::from_millis(5));
        LineEvent::Timeout
    }
}

struct IdleOpener;

impl LinkOpener for IdleOpener {
    fn open(&self, _settings: &SerialSettings) -> Result<Box<dyn LineReader>, DriverError> {
        Ok(Box::new(IdleLink))
    }
}

struct NoSerialOpener;

impl LinkOpener for NoSerialOpener {
    fn open(&self, _settings: &SerialSettings) -> Result<Box<dyn LineReader>, DriverError> {
        Err(DriverError::Unavailable("no serial support".into()))
    }

    fn capability(&self) -> Result<(), DriverError> {
        Err(DriverError::Unavailable("no serial support".into()))
    }
}

/// Reports serial support, but only after a slow scan.
struct SlowScanOpener;

impl LinkOpener for SlowScanOpener {
    fn open(&self, _settings: &SerialSettings) -> Result<Box<dyn LineReader>, DriverError> {
        Ok(Box::new(IdleLink))
    }

    fn capability(&self) -> Result<(), DriverError> {
        thread::sleep(Duration::from_millis(500));
        Ok(())
    }
}

fn test_app(opener: Arc<dyn LinkOpener>) -> (Router, Arc<AcquisitionController>) {
    test_app_with(opener, DaemonConfig::default())
}

fn test_app_with(
    opener: Arc<dyn LinkOpener>,
    config: DaemonConfig,
) -> (Router, Arc<AcquisitionController>) {
    let controller = Arc::new(AcquisitionController::new(
        DeviceState::new(),
        opener,
        Duration::from_millis(20),
    ));
    let state = AppState {
        controller: controller.clone(),
        config: Arc::new(config),
    };
    (create_router(state), controller)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = test_app(Arc::new(IdleOpener));
    let (status, body) = send(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_status_when_disconnected() {
    let (app, _) = test_app(Arc::new(IdleOpener));
    let (status, body) = send(&app, get("/api/device/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], false);
    assert_eq!(body["stale"], false);
    assert!(body["port"].is_null());
    assert!(body["latest_reading"].is_null());
}

#[tokio::test]
async fn test_connect_rejects_empty_port() {
    let (app, controller) = test_app(Arc::new(IdleOpener));
    let (status, body) = send(&app, post_json("/api/device/connect", json!({"port": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("port"));
    assert!(!controller.device().snapshot().connected);
}

#[tokio::test]
async fn test_connect_rejects_zero_baud() {
    let (app, controller) = test_app(Arc::new(IdleOpener));
    let request = post_json("/api/device/connect", json!({"port": "/dev/ttyUSB0", "baud": 0}));
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!controller.device().snapshot().connected);
}

#[tokio::test]
async fn test_connect_without_serial_support() {
    let (app, controller) = test_app(Arc::new(NoSerialOpener));
    let request = post_json("/api/device/connect", json!({"port": "/dev/ttyUSB0"}));
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unavailable");
    assert!(!controller.device().snapshot().connected);
}

#[tokio::test]
async fn test_connect_then_disconnect() {
    let (app, controller) = test_app(Arc::new(IdleOpener));

    let request = post_json("/api/device/connect", json!({"port": "/dev/ttyUSB0"}));
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "connecting");
    assert_eq!(body["port"], "/dev/ttyUSB0");
    assert_eq!(body["baud_rate"], 9600);

    let (_, status_body) = send(&app, get("/api/device/status")).await;
    assert_eq!(status_body["connected"], true);
    assert_eq!(status_body["port"], "/dev/ttyUSB0");

    let (status, body) = send(&app, post_json("/api/device/disconnect", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "disconnected");
    assert_eq!(body["was_connected"], true);

    let (status, body) = send(&app, post_json("/api/device/disconnect", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["was_connected"], false);

    let stopping = controller.clone();
    tokio::task::spawn_blocking(move || stopping.shutdown())
        .await
        .unwrap();
    assert!(!controller.device().snapshot().connected);
}

#[tokio::test]
async fn test_stream_falls_back_to_simulation() {
    let (app, _) = test_app(Arc::new(IdleOpener));
    let (status, body) = send(&app, get("/api/stream")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "simulation");
    for field in [
        "sensor_value",
        "ph_value",
        "temperature",
        "timestamp",
        "sample_type",
        "detected_level",
        "safe_limit",
        "status",
        "ph_status",
        "advisory",
    ] {
        assert!(!body[field].is_null(), "missing field {}", field);
    }
    let ph = body["ph_value"].as_f64().unwrap();
    assert!((0.0..=14.0).contains(&ph));
}

#[tokio::test]
async fn test_analyze_valid_input() {
    let (app, _) = test_app(Arc::new(IdleOpener));
    let request = post_json(
        "/api/analyze",
        json!({"sensor_value": 2.0, "weight_kg": 70.0, "sample_type": "milk"}),
    );
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sample_type"], "milk");
    assert_eq!(body["level"], "danger");
    assert!((body["detected"].as_f64().unwrap() - 0.06).abs() < 1e-9);
    assert!((body["safe_dose"].as_f64().unwrap() - 1.4).abs() < 1e-9);
    assert!((body["safe_limit"].as_f64().unwrap() - 0.05).abs() < 1e-9);
}

#[tokio::test]
async fn test_analyze_uses_default_sample_type() {
    let (app, _) = test_app(Arc::new(IdleOpener));
    let request = post_json("/api/analyze", json!({"sensor_value": 1.0, "weight_kg": 10.0}));
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sample_type"], "milk");
    assert_eq!(body["level"], "safe");
}

#[tokio::test]
async fn test_analyze_rejects_negative_weight() {
    let (app, _) = test_app(Arc::new(IdleOpener));
    let request = post_json("/api/analyze", json!({"sensor_value": 1.0, "weight_kg": -5.0}));
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("weight"));
}

#[tokio::test]
async fn test_ports_listing_shape() {
    let (app, _) = test_app(Arc::new(IdleOpener));
    let (status, body) = send(&app, get("/api/device/ports")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["available"].is_boolean());
    assert!(body["ports"].is_array());
}

#[tokio::test]
async fn test_connect_does_not_stall_other_requests() {
    let (app, controller) = test_app(Arc::new(SlowScanOpener));

    let started = Instant::now();
    let connecting = {
        let app = app.clone();
        tokio::spawn(async move {
            send(&app, post_json("/api/device/connect", json!({"port": "/dev/ttyUSB0"}))).await
        })
    };
    tokio::task::yield_now().await;

    let (status, _) = send(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(started.elapsed() < Duration::from_millis(300));

    let (status, _) = connecting.await.unwrap();
    assert_eq!(status, StatusCode::ACCEPTED);

    tokio::task::spawn_blocking(move || controller.shutdown())
        .await
        .unwrap();
}

async fn next_event(body: &mut Body) -> String {
    let frame = tokio::time::timeout(Duration::from_secs(2), body.frame())
        .await
        .expect("event within two seconds")
        .expect("stream still open")
        .unwrap();
    let data = frame.into_data().unwrap();
    String::from_utf8(data.to_vec()).unwrap()
}

fn event_payload(event: &str) -> Value {
    let data = event
        .lines()
        .find_map(|line| line.strip_prefix("data:"))
        .expect("data line");
    serde_json::from_str(data.trim()).unwrap()
}

#[tokio::test]
async fn test_stream_events_emit_reading_frames() {
    let config = DaemonConfig {
        stream_interval_ms: 60,
        ..DaemonConfig::default()
    };
    let (app, _) = test_app_with(Arc::new(IdleOpener), config);

    let response = app.clone().oneshot(get("/api/stream/events")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let mut body = response.into_body();
    let first = next_event(&mut body).await;
    let first_at = Instant::now();
    assert!(first.lines().any(|line| line == "event: reading"));

    let frame = event_payload(&first);
    assert_eq!(frame["source"], "simulation");
    for field in [
        "sensor_value",
        "ph_value",
        "temperature",
        "timestamp",
        "sample_type",
        "detected_level",
        "safe_limit",
        "status",
        "ph_status",
        "advisory",
    ] {
        assert!(!frame[field].is_null(), "missing field {}", field);
    }

    let second = next_event(&mut body).await;
    assert!(first_at.elapsed() >= Duration::from_millis(40));
    assert!(event_payload(&second)["sensor_value"].is_number());
}
