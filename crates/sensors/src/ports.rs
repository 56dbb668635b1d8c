//! Serial port discovery.

use log::warn;
use serde::Serialize;
use serialport::{SerialPortInfo, SerialPortType};

use crate::types::DriverError;

/// One port a device could be attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub name: String,
    pub description: String,
}

/// Result of a port scan. When serial support is missing on the host this is an
/// empty list with `available == false` and a reason, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortListing {
    pub available: bool,
    pub ports: Vec<PortInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PortListing {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            ports: Vec::new(),
            reason: Some(reason.into()),
        }
    }
}

/// Human-readable description of a port.
pub fn describe(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(info) => {
            let mut description = format!("USB device {:04x}:{:04x}", info.vid, info.pid);
            match (&info.manufacturer, &info.product) {
                (Some(m), Some(p)) => description = format!("{} {} ({})", m, p, description),
                (None, Some(p)) => description = format!("{} ({})", p, description),
                (Some(m), None) => description = format!("{} ({})", m, description),
                (None, None) => {}
            }
            description
        }
        SerialPortType::PciPort => "PCI serial port".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth serial port".to_string(),
        SerialPortType::Unknown => "Serial port".to_string(),
    }
}

fn to_listing(ports: Vec<SerialPortInfo>) -> PortListing {
    PortListing {
        available: true,
        ports: ports
            .into_iter()
            .map(|p| PortInfo {
                description: describe(&p.port_type),
                name: p.port_name,
            })
            .collect(),
        reason: None,
    }
}

/// Checks that the host can enumerate serial ports at all.
pub fn serial_capability() -> Result<(), DriverError> {
    serialport::available_ports()
        .map(|_| ())
        .map_err(|e| DriverError::Unavailable(e.to_string()))
}

/// Lists the serial ports present on the host.
pub fn list_ports() -> PortListing {
    match serialport::available_ports() {
        Ok(ports) => to_listing(ports),
        Err(e) => {
            warn!("Serial port enumeration failed: {}", e);
            PortListing::unavailable(format!("serial support unavailable: {}", e))
        }
    }
}
