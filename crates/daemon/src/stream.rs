//! Read side of the device record: the stream frame and the status view.
//!
//! Callers outside the acquisition layer only ever see these two shapes. Neither
//! waits on hardware, so every poll returns within the span of one lock acquisition.

use std::time::Instant;

use chrono::{DateTime, Local};
use contam_sensor::mock_contam::{generate, unix_now_secs};
use contam_sensor::{DeviceConnection, DeviceState};
use contam_types::{
    PhStatus, Reading, ReadingSource, SafetyLevel, SafetyVerdict, SampleType, ThresholdTable,
};
use rand::Rng;
use serde::Serialize;

/// One classified reading, from hardware when fresh and from the generator otherwise.
#[derive(Debug, Clone, Serialize)]
pub struct StreamFrame {
    pub source: ReadingSource,
    pub sensor_value: f64,
    pub ph_value: f64,
    pub temperature: f64,
    pub timestamp: DateTime<Local>,
    pub sample_type: SampleType,
    pub detected_level: f64,
    pub safe_limit: f64,
    pub status: SafetyLevel,
    pub ph_status: PhStatus,
    pub advisory: &'static str,
}

impl StreamFrame {
    fn new(reading: Reading, sample_type: SampleType, thresholds: &ThresholdTable) -> Self {
        let verdict = SafetyVerdict::evaluate(&reading, sample_type, thresholds);
        Self {
            source: reading.source,
            sensor_value: reading.sensor_value,
            ph_value: reading.ph_value,
            temperature: reading.temperature,
            timestamp: reading.timestamp,
            sample_type,
            detected_level: verdict.detected_level,
            safe_limit: verdict.safe_limit,
            status: verdict.level,
            ph_status: verdict.ph_status,
            advisory: verdict.level.advisory(),
        }
    }
}

/// Builds a frame from a snapshot taken at `now` (monotonic) and `now_secs` (wall clock).
pub fn compose_frame<R: Rng + ?Sized>(
    snapshot: &DeviceConnection,
    now: Instant,
    now_secs: f64,
    rng: &mut R,
    thresholds: &ThresholdTable,
    default_sample_type: SampleType,
) -> StreamFrame {
    let fresh = snapshot
        .latest_reading
        .as_ref()
        .filter(|_| snapshot.has_fresh_reading(now));

    match fresh {
        Some(reading) => {
            let mut reading = Reading::clone(reading);
            reading.source = ReadingSource::Hardware;
            let sample_type = reading.sample_type.unwrap_or(default_sample_type);
            StreamFrame::new(reading, sample_type, thresholds)
        }
        None => {
            let reading = generate(now_secs, rng);
            let sample_type = reading.sample_type.unwrap_or(default_sample_type);
            StreamFrame::new(reading, sample_type, thresholds)
        }
    }
}

/// Produces the frame for one poll using the real clocks and thread-local randomness.
pub fn poll(
    device: &DeviceState,
    thresholds: &ThresholdTable,
    default_sample_type: SampleType,
) -> StreamFrame {
    let snapshot = device.snapshot();
    compose_frame(
        &snapshot,
        Instant::now(),
        unix_now_secs(),
        &mut rand::thread_rng(),
        thresholds,
        default_sample_type,
    )
}

/// Connection health as reported to callers.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub connected: bool,
    pub port: Option<String>,
    pub baud_rate: u32,
    pub error: Option<String>,
    pub stale: bool,
    pub latest_reading: Option<Reading>,
    pub last_update: Option<DateTime<Local>>,
    pub last_update_age_ms: Option<u64>,
}

impl DeviceStatus {
    pub fn from_snapshot(snapshot: &DeviceConnection, now: Instant) -> Self {
        Self {
            connected: snapshot.connected,
            port: snapshot.port.clone(),
            baud_rate: snapshot.baud_rate,
            error: snapshot.last_error.clone(),
            stale: snapshot.is_stale(now),
            latest_reading: snapshot.latest_reading.as_deref().cloned(),
            last_update: snapshot.last_update_at,
            last_update_age_ms: snapshot
                .age(now)
                .map(|age| u64::try_from(age.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}
