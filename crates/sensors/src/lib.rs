//! Hardware side of the contamination sensing daemon.
//!
//! Owns the shared device record, the serial acquisition session that fills it,
//! port discovery, and the synthetic generator used when no hardware data is fresh.

pub mod device_state;
pub mod mock_contam;
pub mod ports;
pub mod serial;
pub mod types;

// Re-export the main types that users need
pub use device_state::{DeviceConnection, DeviceState, SessionId, STALENESS_THRESHOLD};
pub use ports::{list_ports, PortInfo, PortListing};
pub use serial::{AcquisitionSession, LinkOpener, SerialOpener, SessionState, SessionStats};
pub use types::{DriverError, SerialSettings, DEFAULT_BAUD_RATE};
