use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::acquisition::AcquisitionState;

/// Operator-entered details attached to every exported row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionMetadata {
    pub location_id: String,
    pub patient_id: String,
    pub sex: String,
    pub birth_date: String,
    pub height: String,
    pub weight: String,
}

/// Device connection state as shown to the operator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// The channel failed mid-session; reconnect to resume.
    Faulted(String),
    Error(String),
}

/// Snapshot of the acquisition session for status displays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub port_name: Option<String>,
    pub connection_state: ConnectionState,
    pub acquisition_state: AcquisitionState,
    pub inhaler: Option<String>,
    pub resistance: Option<f64>,
    pub readings: usize,
    /// When the last reading was recorded; `None` before the first one.
    pub last_seen: Option<DateTime<Utc>>,
}
