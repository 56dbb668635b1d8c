use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use contam_sensor::DEFAULT_BAUD_RATE;
use contam_types::{SampleType, ThresholdTable};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default location of the configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "./config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read configuration file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse configuration file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Serial link settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Baud rate used when a connect request does not name one
    pub default_baud_rate: u32,
    /// Upper bound on one blocking read, in milliseconds
    pub read_timeout_ms: u64,
    /// Port to connect to at startup, if any
    pub auto_connect: Option<String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            default_baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 1000,
            auto_connect: None,
        }
    }
}

/// Configuration for the daemon
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Address the HTTP server binds to
    pub bind_address: String,
    /// Port the HTTP server listens on
    pub http_port: u16,
    pub serial: SerialConfig,
    /// Sample type assumed for hardware readings that do not name one
    pub default_sample_type: SampleType,
    /// Safe limits in mg/L per sample type
    pub thresholds: ThresholdTable,
    /// Interval between frames on the event stream, in milliseconds
    pub stream_interval_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: 9000,
            serial: SerialConfig::default(),
            default_sample_type: SampleType::Milk,
            thresholds: ThresholdTable::default(),
            stream_interval_ms: 1000,
        }
    }
}

impl DaemonConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.serial.read_timeout_ms)
    }

    pub fn stream_interval(&self) -> Duration {
        Duration::from_millis(self.stream_interval_ms)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.bind_address.parse().map_err(|_| {
            ConfigError::Invalid(format!("bind_address '{}' is not an IP address", self.bind_address))
        })?;
        Ok(SocketAddr::new(ip, self.http_port))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.serial.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "serial.read_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.serial.default_baud_rate == 0 {
            return Err(ConfigError::Invalid(
                "serial.default_baud_rate must be greater than 0".to_string(),
            ));
        }
        if self.stream_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "stream_interval_ms must be greater than 0".to_string(),
            ));
        }
        self.thresholds
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.socket_addr()?;
        Ok(())
    }
}

/// Loads the daemon configuration from `path`.
///
/// A missing file yields the defaults. A file that exists but cannot be parsed or
/// fails validation is an error.
pub fn load_config(path: &Path) -> Result<DaemonConfig, ConfigError> {
    let config = match std::fs::read_to_string(path) {
        Ok(contents) => {
            let config: DaemonConfig =
                serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
            tracing::info!("Loaded configuration from {}", path.display());
            config
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("Configuration file {} not found. Using defaults.", path.display());
            DaemonConfig::default()
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    config.validate()?;
    Ok(config)
}
