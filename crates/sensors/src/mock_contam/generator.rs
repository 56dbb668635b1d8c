use std::f64::consts::PI;

use chrono::{DateTime, Local};
use contam_types::{clamp_ph, Reading, ReadingSource, SampleType};
use log::trace;
use rand::Rng;

/// Centre of the synthetic sensor waveform, in raw sensor units.
const BASELINE: f64 = 1.5;
/// Slow swing, one full cycle per minute.
const SLOW_AMPLITUDE: f64 = 0.45;
const SLOW_PERIOD_SECS: f64 = 60.0;
/// Faster ripple on top of the slow swing.
const RIPPLE_AMPLITUDE: f64 = 0.1;
const RIPPLE_PERIOD_SECS: f64 = 17.0;
/// Half-width of the uniform jitter band added to the sensor value.
pub const SENSOR_NOISE: f64 = 0.04;

const TEMPERATURE_BASE: f64 = 22.0;
const TEMPERATURE_AMPLITUDE: f64 = 2.0;
const TEMPERATURE_PERIOD_SECS: f64 = 300.0;
const TEMPERATURE_NOISE: f64 = 0.1;

/// pH = PH_INTERCEPT - PH_SLOPE * sensor_value, clamped to [0, 14].
const PH_INTERCEPT: f64 = 9.2;
const PH_SLOPE: f64 = 1.4;

/// How long each sample type stays selected before rotating to the next.
pub const SAMPLE_ROTATION_SECS: f64 = 15.0;

/// Helper to read the wall clock as fractional seconds since the Unix epoch.
pub fn unix_now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// The smooth, noise-free part of the sensor signal at `t` seconds.
pub fn waveform(t: f64) -> f64 {
    BASELINE
        + SLOW_AMPLITUDE * (2.0 * PI * t / SLOW_PERIOD_SECS).sin()
        + RIPPLE_AMPLITUDE * (2.0 * PI * t / RIPPLE_PERIOD_SECS).sin()
}

/// Linear pH estimate derived from a sensor value.
pub fn ph_from_sensor(sensor_value: f64) -> f64 {
    clamp_ph(PH_INTERCEPT - PH_SLOPE * sensor_value)
}

/// Sample type shown at `t` seconds. Cycles through every type so demo traffic
/// reaches every threshold.
pub fn sample_type_at(t: f64) -> SampleType {
    let slot = (t / SAMPLE_ROTATION_SECS).floor().rem_euclid(SampleType::ALL.len() as f64);
    SampleType::ALL[slot as usize]
}

fn timestamp_at(t: f64) -> DateTime<Local> {
    let secs = t.floor();
    let nanos = ((t - secs) * 1e9) as u32;
    DateTime::from_timestamp(secs as i64, nanos)
        .unwrap_or_default()
        .with_timezone(&Local)
}

/// Generates one synthetic reading for wall-clock time `now_secs`.
///
/// No I/O and no shared state: the output depends only on `now_secs` and `rng`.
pub fn generate<R: Rng + ?Sized>(now_secs: f64, rng: &mut R) -> Reading {
    let sensor_value = (waveform(now_secs) + rng.gen_range(-SENSOR_NOISE..=SENSOR_NOISE)).max(0.0);
    let temperature = TEMPERATURE_BASE
        + TEMPERATURE_AMPLITUDE * (2.0 * PI * now_secs / TEMPERATURE_PERIOD_SECS).sin()
        + rng.gen_range(-TEMPERATURE_NOISE..=TEMPERATURE_NOISE);

    let reading = Reading {
        sensor_value,
        ph_value: ph_from_sensor(sensor_value),
        temperature,
        timestamp: timestamp_at(now_secs),
        source: ReadingSource::Simulation,
        sample_type: Some(sample_type_at(now_secs)),
    };
    trace!("Generated synthetic reading at t={}: {:?}", now_secs, reading);
    reading
}
