//! CSV export of a recorded session.
//!
//! One row per reading; the session metadata is repeated on every row so the
//! file stands on its own.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::device::SessionMetadata;
use crate::serial::Reading;

pub const CSV_HEADER: [&str; 18] = [
    "Year",
    "Month",
    "Day",
    "Hour",
    "Minute",
    "Second",
    "Temperature (C)",
    "Humidity (%)",
    "Atmospheric Pressure (hPa)",
    "Measurement Time (s)",
    "Pressure Drop (kPa)",
    "Flow Rate (L/min)",
    "Location ID",
    "Patient ID",
    "Sex",
    "Birth Date",
    "Height",
    "Weight",
];

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("No data to save")]
    NoData,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExportError>;

pub struct CsvExporter;

impl CsvExporter {
    /// Write `readings` to a new file at `path`, returning the row count.
    pub fn export(path: &Path, readings: &[Reading], metadata: &SessionMetadata) -> Result<usize> {
        if readings.is_empty() {
            return Err(ExportError::NoData);
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(path)?;
        let rows = Self::write_to(file, readings, metadata)?;
        log::info!("Data saved to {} ({} rows)", path.display(), rows);
        Ok(rows)
    }

    pub fn write_to<W: Write>(writer: W, readings: &[Reading], metadata: &SessionMetadata) -> Result<usize> {
        if readings.is_empty() {
            return Err(ExportError::NoData);
        }

        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(CSV_HEADER)?;

        for r in readings {
            csv_writer.write_record([
                r.year.to_string(),
                r.month.to_string(),
                r.day.to_string(),
                r.hour.to_string(),
                r.minute.to_string(),
                r.second.to_string(),
                float_field(r.temperature_c),
                float_field(r.humidity_pct),
                float_field(r.atmospheric_pressure_hpa),
                float_field(r.measurement_time_s),
                float_field(r.pressure_drop_kpa),
                float_field(r.flow_rate_lpm),
                metadata.location_id.clone(),
                metadata.patient_id.clone(),
                metadata.sex.clone(),
                metadata.birth_date.clone(),
                metadata.height.clone(),
                metadata.weight.clone(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(readings.len())
    }
}

/// Floats always carry a decimal point (`45.0`, not `45`) so the columns
/// read back as floating point.
fn float_field(value: f64) -> String {
    format!("{:?}", value)
}
