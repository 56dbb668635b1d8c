//! Parses device lines into readings.
//!
//! The device prints one JSON object per line, for example
//! `{"sensor_value": 1.42, "ph": 7.1, "temperature": 23.4, "sample_type": "milk"}`.
//! Anything else (boot banners, debug prints, truncated frames) is rejected.

use chrono::{DateTime, Local};
use contam_types::{clamp_ph, Reading, ReadingSource, SampleType, SensorError};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("line is not a JSON object")]
    NotStructured,
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} is not a finite number")]
    NotFinite(&'static str),
    #[error("{0}")]
    UnknownSampleType(String),
}

impl From<ParseError> for SensorError {
    fn from(err: ParseError) -> Self {
        SensorError::Malformed(err.to_string())
    }
}

#[derive(Deserialize)]
struct WireReading {
    #[serde(alias = "sensorValue", alias = "sensor")]
    sensor_value: f64,
    #[serde(alias = "ph_value", alias = "phValue")]
    ph: f64,
    #[serde(alias = "temp")]
    temperature: f64,
    #[serde(default, alias = "sampleType")]
    sample_type: Option<String>,
}

/// Cheap shape check done before any JSON parsing.
pub fn looks_structured(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('{') && trimmed.ends_with('}')
}

fn finite(value: f64, name: &'static str) -> Result<f64, ParseError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ParseError::NotFinite(name))
    }
}

/// Parses one line into a hardware reading stamped with `timestamp`.
pub fn parse_line(line: &str, timestamp: DateTime<Local>) -> Result<Reading, ParseError> {
    if !looks_structured(line) {
        return Err(ParseError::NotStructured);
    }
    let wire: WireReading = serde_json::from_str(line.trim())?;

    let sample_type = wire
        .sample_type
        .as_deref()
        .map(str::parse::<SampleType>)
        .transpose()
        .map_err(ParseError::UnknownSampleType)?;

    Ok(Reading {
        sensor_value: finite(wire.sensor_value, "sensor_value")?,
        ph_value: clamp_ph(finite(wire.ph, "ph")?),
        temperature: finite(wire.temperature, "temperature")?,
        timestamp,
        source: ReadingSource::Hardware,
        sample_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_snake_case_line() {
        let r = parse_line(
            r#"{"sensor_value": 1.42, "ph": 7.1, "temperature": 23.4, "sample_type": "egg"}"#,
            Local::now(),
        )
        .unwrap();
        assert_eq!(r.sensor_value, 1.42);
        assert_eq!(r.ph_value, 7.1);
        assert_eq!(r.temperature, 23.4);
        assert_eq!(r.source, ReadingSource::Hardware);
        assert_eq!(r.sample_type, Some(SampleType::Egg));
    }

    #[test]
    fn test_parses_aliases_and_ignores_extra_fields() {
        let r = parse_line(
            r#"  {"sensorValue": 2, "phValue": 6.2, "temp": 19.0, "seq": 17}  "#,
            Local::now(),
        )
        .unwrap();
        assert_eq!(r.sensor_value, 2.0);
        assert_eq!(r.ph_value, 6.2);
        assert!(r.sample_type.is_none());
    }

    #[test]
    fn test_clamps_ph() {
        let r = parse_line(r#"{"sensor": 1, "ph": 19.5, "temperature": 20}"#, Local::now()).unwrap();
        assert_eq!(r.ph_value, 14.0);
        let r = parse_line(r#"{"sensor": 1, "ph": -2, "temperature": 20}"#, Local::now()).unwrap();
        assert_eq!(r.ph_value, 0.0);
    }

    #[test]
    fn test_rejects_unstructured_lines() {
        assert!(matches!(
            parse_line("READY v1.3", Local::now()),
            Err(ParseError::NotStructured)
        ));
        assert!(matches!(
            parse_line("sensor=1.2,ph=7", Local::now()),
            Err(ParseError::NotStructured)
        ));
        assert!(matches!(
            parse_line(r#"{"sensor_value": 1.2, "ph""#, Local::now()),
            Err(ParseError::NotStructured)
        ));
    }

    #[test]
    fn test_rejects_incomplete_or_invalid_objects() {
        assert!(matches!(
            parse_line(r#"{"sensor_value": 1.2, "ph": 7.0}"#, Local::now()),
            Err(ParseError::Json(_))
        ));
        assert!(matches!(
            parse_line(r#"{"sensor_value": "high", "ph": 7.0, "temperature": 1}"#, Local::now()),
            Err(ParseError::Json(_))
        ));
        assert!(matches!(
            parse_line(
                r#"{"sensor_value": 1, "ph": 7, "temperature": 1, "sample_type": "honey"}"#,
                Local::now()
            ),
            Err(ParseError::UnknownSampleType(_))
        ));
    }

    #[test]
    fn test_parse_error_maps_to_malformed() {
        let err: SensorError = ParseError::NotStructured.into();
        assert!(matches!(err, SensorError::Malformed(_)));
    }
}
