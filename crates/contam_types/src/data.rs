use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Where a reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingSource {
    /// Parsed from a line sent by the attached device.
    Hardware,
    /// Produced by the synthetic generator.
    Simulation,
}

impl fmt::Display for ReadingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingSource::Hardware => f.write_str("hardware"),
            ReadingSource::Simulation => f.write_str("simulation"),
        }
    }
}

/// The kind of sample under test. Each kind has its own safe limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    Milk,
    Egg,
    Meat,
    Water,
}

impl SampleType {
    /// Every sample type, in rotation order.
    pub const ALL: [SampleType; 4] = [
        SampleType::Milk,
        SampleType::Egg,
        SampleType::Meat,
        SampleType::Water,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SampleType::Milk => "milk",
            SampleType::Egg => "egg",
            SampleType::Meat => "meat",
            SampleType::Water => "water",
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SampleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "milk" => Ok(SampleType::Milk),
            "egg" | "eggs" => Ok(SampleType::Egg),
            "meat" => Ok(SampleType::Meat),
            "water" => Ok(SampleType::Water),
            other => Err(format!("unknown sample type '{}'", other)),
        }
    }
}

/// One timestamped sensor observation.
///
/// Readings are immutable values. Shared state swaps whole readings and never
/// edits one in place, so a reader always sees a consistent set of fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Raw sensor output, in device units.
    pub sensor_value: f64,
    /// pH estimate, always within [0, 14].
    pub ph_value: f64,
    /// Sample temperature in degrees Celsius.
    pub temperature: f64,
    /// Local wall-clock time the reading was produced.
    pub timestamp: DateTime<Local>,
    pub source: ReadingSource,
    /// Sample type reported alongside the reading, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_type: Option<SampleType>,
}

/// Clamps a pH estimate to the physical [0, 14] scale.
pub fn clamp_ph(ph: f64) -> f64 {
    ph.clamp(0.0, 14.0)
}
