use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::serial::{ParseError, Reading, SerialError};

/// Where the acquisition loop stands between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionState {
    /// No usable connection, or no inhaler resistance selected.
    Idle,
    Polling,
    /// The current connection hit a transport fault. Terminal until a new
    /// connection is attached.
    Faulted,
}

/// What a single tick did.
#[derive(Debug)]
pub enum TickOutcome {
    Idle,
    /// Nothing pending, or the read timed out / returned an empty line.
    NoData,
    Recorded(Reading),
    /// The line was rejected and dropped; acquisition continues.
    Discarded(ParseError),
    /// The connection already faulted; no read was attempted.
    Faulted,
}

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("Serial transport failed: {0}")]
    Transport(#[from] SerialError),
}

/// Time and flow-rate columns, index-aligned, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowSeries {
    pub times: Vec<f64>,
    pub flow_rates: Vec<f64>,
}

impl FlowSeries {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// `(measurement time, flow rate)` pairs.
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.times.iter().copied().zip(self.flow_rates.iter().copied())
    }

    /// Highest flow rate seen so far.
    pub fn peak_flow(&self) -> Option<f64> {
        self.flow_rates.iter().copied().reduce(f64::max)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AcquisitionMetrics {
    pub ticks: u64,
    pub lines_read: u64,
    pub readings_recorded: u64,
    pub lines_discarded: u64,
    pub empty_reads: u64,
    pub transport_faults: u64,
    // Counters of the currently attached connection
    pub utf8_decode_errors: u64,
    pub partial_buffer_trims: u64,
    pub last_error: Option<String>,
    /// Host time of the most recent recorded reading
    pub last_reading_at: Option<DateTime<Utc>>,
}
