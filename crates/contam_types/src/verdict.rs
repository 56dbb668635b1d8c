//! Safety classification.
//!
//! Everything here is a pure function of its inputs. Out-of-range values are
//! clamped by whoever produced the reading, not here.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::{Reading, SampleType};

/// mg/L of detected contaminant per raw sensor unit.
pub const CALIBRATION_MG_PER_UNIT: f64 = 0.03;
/// Recommended exposure in mg per kg of body weight.
pub const RECOMMENDED_MG_PER_KG: f64 = 0.02;
/// Fraction of the safe limit above which a sample is flagged for caution.
pub const CAUTION_FRACTION: f64 = 0.7;

const PH_ACIDIC_BELOW: f64 = 6.5;
const PH_ALKALINE_ABOVE: f64 = 7.5;

/// Safety band for a detected contaminant level, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    Safe,
    Caution,
    Danger,
}

impl SafetyLevel {
    /// Human-readable advice shown next to the level.
    pub fn advisory(&self) -> &'static str {
        match self {
            SafetyLevel::Safe => "SAFE: level within safe limit.",
            SafetyLevel::Caution => "WARNING: level nearing limit!",
            SafetyLevel::Danger => "DANGER: level is high!",
        }
    }
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyLevel::Safe => f.write_str("safe"),
            SafetyLevel::Caution => f.write_str("caution"),
            SafetyLevel::Danger => f.write_str("danger"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhStatus {
    Acidic,
    Neutral,
    Alkaline,
}

/// Maps a detected level onto a safety band. First match wins:
/// above the limit is danger, above 70% of it is caution, anything else is safe.
pub fn classify(detected_level: f64, safe_limit: f64) -> SafetyLevel {
    if detected_level > safe_limit {
        SafetyLevel::Danger
    } else if detected_level > safe_limit * CAUTION_FRACTION {
        SafetyLevel::Caution
    } else {
        SafetyLevel::Safe
    }
}

/// Both boundaries (6.5 and 7.5) count as neutral.
pub fn ph_classify(ph: f64) -> PhStatus {
    if ph < PH_ACIDIC_BELOW {
        PhStatus::Acidic
    } else if ph > PH_ALKALINE_ABOVE {
        PhStatus::Alkaline
    } else {
        PhStatus::Neutral
    }
}

/// Converts a raw sensor value into a contaminant concentration in mg/L.
pub fn detected_level(sensor_value: f64) -> f64 {
    sensor_value * CALIBRATION_MG_PER_UNIT
}

/// Recommended safe dose in mg for the given body weight.
pub fn recommended_safe_dose(weight_kg: f64) -> f64 {
    weight_kg * RECOMMENDED_MG_PER_KG
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Safe limits in mg/L, keyed by sample type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdTable {
    limits: BTreeMap<SampleType, f64>,
}

impl ThresholdTable {
    pub fn new(limits: BTreeMap<SampleType, f64>) -> Self {
        Self { limits }
    }

    /// Built-in limit for a sample type.
    pub fn builtin_limit(sample_type: SampleType) -> f64 {
        match sample_type {
            SampleType::Milk => 0.05,
            SampleType::Egg => 0.04,
            SampleType::Meat => 0.06,
            SampleType::Water => 0.03,
        }
    }

    /// Limit for a sample type. Types missing from the table fall back to the built-in limit.
    pub fn safe_limit(&self, sample_type: SampleType) -> f64 {
        self.limits
            .get(&sample_type)
            .copied()
            .unwrap_or_else(|| Self::builtin_limit(sample_type))
    }

    /// Rejects limits that would make classification meaningless.
    pub fn validate(&self) -> Result<(), ThresholdError> {
        for (sample_type, limit) in &self.limits {
            if !limit.is_finite() || *limit <= 0.0 {
                return Err(ThresholdError::InvalidLimit {
                    sample_type: *sample_type,
                    limit: *limit,
                });
            }
        }
        Ok(())
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            limits: SampleType::ALL
                .iter()
                .map(|t| (*t, Self::builtin_limit(*t)))
                .collect(),
        }
    }
}

/// Classified safety level and chemistry status for one reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub level: SafetyLevel,
    pub ph_status: PhStatus,
    pub detected_level: f64,
    pub safe_limit: f64,
}

impl SafetyVerdict {
    pub fn evaluate(reading: &Reading, sample_type: SampleType, thresholds: &ThresholdTable) -> Self {
        let detected = detected_level(reading.sensor_value);
        let safe_limit = thresholds.safe_limit(sample_type);
        Self {
            level: classify(detected, safe_limit),
            ph_status: ph_classify(reading.ph_value),
            detected_level: detected,
            safe_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThresholdError {
    #[error("safe limit for {sample_type} must be a positive number, got {limit}")]
    InvalidLimit { sample_type: SampleType, limit: f64 },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error("{0} must be a finite number")]
    NotFinite(&'static str),
    #[error("weight must not be negative")]
    NegativeWeight,
}

/// Result of a manually entered measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub sample_type: SampleType,
    /// Detected concentration in mg/L, rounded to 3 decimals.
    pub detected: f64,
    /// Recommended safe dose in mg, rounded to 3 decimals.
    pub safe_dose: f64,
    pub safe_limit: f64,
    pub level: SafetyLevel,
    pub advisory: String,
}

/// Classifies a manually entered sensor value and computes the dose advice for a body weight.
pub fn analyze(
    sensor_value: f64,
    weight_kg: f64,
    sample_type: SampleType,
    thresholds: &ThresholdTable,
) -> Result<Analysis, AnalysisError> {
    if !sensor_value.is_finite() {
        return Err(AnalysisError::NotFinite("sensor value"));
    }
    if !weight_kg.is_finite() {
        return Err(AnalysisError::NotFinite("weight"));
    }
    if weight_kg < 0.0 {
        return Err(AnalysisError::NegativeWeight);
    }

    let detected = detected_level(sensor_value);
    let safe_limit = thresholds.safe_limit(sample_type);
    let level = classify(detected, safe_limit);

    Ok(Analysis {
        sample_type,
        detected: round3(detected),
        safe_dose: round3(recommended_safe_dose(weight_kg)),
        safe_limit,
        level,
        advisory: level.advisory().to_string(),
    })
}
