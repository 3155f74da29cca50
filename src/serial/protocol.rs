use std::num::{ParseFloatError, ParseIntError};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::device::flow::{flow_rate_lpm, ConversionError};

/// Tokens per telemetry line:
/// `YYYY MM DD HH MM SS TEMP HUMIDITY PRESSURE MEAS_TIME PRESSURE_DROP`
pub const FIELD_COUNT: usize = 11;

const FIELD_NAMES: [&str; FIELD_COUNT] = [
    "year",
    "month",
    "day",
    "hour",
    "minute",
    "second",
    "temperature",
    "humidity",
    "atmospheric pressure",
    "measurement time",
    "pressure drop",
];

/// One decoded telemetry sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub year: i32,
    pub month: i32,
    pub day: i32,
    pub hour: i32,
    pub minute: i32,
    pub second: i32,
    /// Degrees Celsius
    pub temperature_c: f64,
    /// Relative humidity, percent
    pub humidity_pct: f64,
    /// Hectopascal
    pub atmospheric_pressure_hpa: f64,
    /// Seconds since the device started the measurement
    pub measurement_time_s: f64,
    /// Kilopascal, as reported by the sensor
    pub pressure_drop_kpa: f64,
    /// Litres per minute, derived from the pressure drop at parse time
    pub flow_rate_lpm: f64,
}

impl Reading {
    /// Device wall clock, when the integer fields form a real calendar moment.
    pub fn device_timestamp(&self) -> Option<NaiveDateTime> {
        let date = NaiveDate::from_ymd_opt(
            self.year,
            u32::try_from(self.month).ok()?,
            u32::try_from(self.day).ok()?,
        )?;
        date.and_hms_opt(
            u32::try_from(self.hour).ok()?,
            u32::try_from(self.minute).ok()?,
            u32::try_from(self.second).ok()?,
        )
    }
}

/// Why a single token failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("expected an integer: {0}")]
    Int(#[from] ParseIntError),

    #[error("expected a number: {0}")]
    Float(#[from] ParseFloatError),
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid data format ({tokens} fields, expected {FIELD_COUNT}): {line:?}")]
    MalformedLine { line: String, tokens: usize },

    #[error("Invalid {field} value {token:?} in {line:?}: {source}")]
    FieldTypeError {
        line: String,
        field: &'static str,
        token: String,
        #[source]
        source: FieldError,
    },

    #[error("Cannot derive flow rate from {line:?}: {source}")]
    Conversion {
        line: String,
        #[source]
        source: ConversionError,
    },
}

impl ParseError {
    /// The raw line that was rejected.
    pub fn line(&self) -> &str {
        match self {
            ParseError::MalformedLine { line, .. }
            | ParseError::FieldTypeError { line, .. }
            | ParseError::Conversion { line, .. } => line,
        }
    }
}

/// Decode one telemetry line, deriving the flow rate with `resistance`.
pub fn parse_line(line: &str, resistance: f64) -> Result<Reading, ParseError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != FIELD_COUNT {
        return Err(ParseError::MalformedLine {
            line: line.to_string(),
            tokens: parts.len(),
        });
    }

    let int = |idx: usize| -> Result<i32, ParseError> {
        parts[idx].parse::<i32>().map_err(|e| ParseError::FieldTypeError {
            line: line.to_string(),
            field: FIELD_NAMES[idx],
            token: parts[idx].to_string(),
            source: e.into(),
        })
    };
    let float = |idx: usize| -> Result<f64, ParseError> {
        parts[idx].parse::<f64>().map_err(|e| ParseError::FieldTypeError {
            line: line.to_string(),
            field: FIELD_NAMES[idx],
            token: parts[idx].to_string(),
            source: e.into(),
        })
    };

    let year = int(0)?;
    let month = int(1)?;
    let day = int(2)?;
    let hour = int(3)?;
    let minute = int(4)?;
    let second = int(5)?;
    let temperature_c = float(6)?;
    let humidity_pct = float(7)?;
    let atmospheric_pressure_hpa = float(8)?;
    let measurement_time_s = float(9)?;
    let pressure_drop_kpa = float(10)?;

    let flow_rate_lpm =
        flow_rate_lpm(pressure_drop_kpa, resistance).map_err(|source| ParseError::Conversion {
            line: line.to_string(),
            source,
        })?;

    Ok(Reading {
        year,
        month,
        day,
        hour,
        minute,
        second,
        temperature_c,
        humidity_pct,
        atmospheric_pressure_hpa,
        measurement_time_s,
        pressure_drop_kpa,
        flow_rate_lpm,
    })
}
