//! Common types for the serial acquisition layer

use std::time::Duration;

use contam_types::SensorError;
use thiserror::Error;

/// Baud rate used when a connect request does not name one.
pub const DEFAULT_BAUD_RATE: u32 = 9600;
/// Upper bound on one blocking read. A pending disconnect is noticed within this interval.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Parameters for opening one serial link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// Device path or name, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    pub baud_rate: u32,
    /// Read timeout applied to every blocking read on the link.
    pub read_timeout: Duration,
}

impl SerialSettings {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Rejects settings that can never produce a working session.
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.port.trim().is_empty() {
            return Err(DriverError::ConfigurationError(
                "port must not be empty".to_string(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(DriverError::ConfigurationError(
                "baud rate must be greater than 0".to_string(),
            ));
        }
        if self.read_timeout.is_zero() {
            return Err(DriverError::ConfigurationError(
                "read timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Errors that can occur in the acquisition layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    /// A sensor-level error.
    #[error("Sensor error: {0}")]
    SensorError(#[from] SensorError),
    /// The link could not be opened
    #[error("Failed to open {port}: {reason}")]
    OpenError { port: String, reason: String },
    /// Hard I/O failure on an open link
    #[error("I/O error: {0}")]
    IoError(String),
    /// Invalid configuration or request
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    /// Serial support is not available on this host
    #[error("Serial support unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for DriverError {
    fn from(err: std::io::Error) -> Self {
        DriverError::IoError(err.to_string())
    }
}
