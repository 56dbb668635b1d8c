use serde::{Deserialize, Serialize};

/// Represents errors that can occur while talking to the sensing device.
///
/// These errors end up in the device status so the UI can show why hardware
/// data is not flowing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum SensorError {
    /// The device went away or closed its end of the link.
    #[error("Sensor disconnected: {0}")]
    Disconnected(String),
    /// A hardware-related fault reported by the link layer.
    #[error("Sensor hardware fault: {0}")]
    HardwareFault(String),
    /// The device sent something that is not a reading.
    #[error("Malformed sensor data: {0}")]
    Malformed(String),
}
