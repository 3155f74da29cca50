pub mod interface;
pub mod protocol;

pub use interface::{
    CloseSignal, ConnectionHandle, ConnectionManager, HandleState, PortOpener, RetryPolicy,
    SerialPortIO, Sleeper, SystemPortOpener, ThreadSleeper,
};
pub use protocol::{parse_line, FieldError, ParseError, Reading, FIELD_COUNT};

use serde::{Deserialize, Serialize};
use serialport::SerialPortType;

/// A serial port visible to the host, with USB identifiers when available.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialDeviceInfo {
    pub port_name: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Connection to {port} unavailable after {attempts} attempt(s): {last_error}")]
    ConnectionUnavailable {
        port: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Transport fault on {port}: {source}")]
    TransportFault {
        port: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection is closed or faulted")]
    Unavailable,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

pub type Result<T> = std::result::Result<T, SerialError>;

/// List the serial ports currently visible to the host.
pub fn discover_ports() -> Result<Vec<SerialDeviceInfo>> {
    let ports = serialport::available_ports()?;
    let devices = ports
        .into_iter()
        .map(|port| match port.port_type {
            SerialPortType::UsbPort(usb_info) => SerialDeviceInfo {
                port_name: port.port_name,
                vid: Some(usb_info.vid),
                pid: Some(usb_info.pid),
                serial_number: usb_info.serial_number,
                manufacturer: usb_info.manufacturer,
                product: usb_info.product,
            },
            _ => SerialDeviceInfo {
                port_name: port.port_name,
                vid: None,
                pid: None,
                serial_number: None,
                manufacturer: None,
                product: None,
            },
        })
        .collect();

    Ok(devices)
}
