use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::types::FlowSeries;
use crate::serial::Reading;

#[derive(Debug, Default)]
struct SeriesData {
    readings: Vec<Reading>,
    first: Option<Reading>,
}

/// Append-only reading history shared between the acquisition loop (the
/// only writer) and any number of readers.
///
/// Clones share the same underlying series.
#[derive(Debug, Clone, Default)]
pub struct TimeSeriesStore {
    data: Arc<RwLock<SeriesData>>,
}

impl TimeSeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reading at the end; the first reading ever appended is kept
    /// as the session's first measurement.
    pub fn append(&self, reading: Reading) {
        let mut data = self.write();
        if data.first.is_none() {
            data.first = Some(reading.clone());
        }
        data.readings.push(reading);
    }

    pub fn first_reading(&self) -> Option<Reading> {
        self.read().first.clone()
    }

    pub fn latest(&self) -> Option<Reading> {
        self.read().readings.last().cloned()
    }

    pub fn projection(&self) -> FlowSeries {
        let data = self.read();
        let (times, flow_rates) = data
            .readings
            .iter()
            .map(|r| (r.measurement_time_s, r.flow_rate_lpm))
            .unzip();
        FlowSeries { times, flow_rates }
    }

    pub fn all(&self) -> Vec<Reading> {
        self.read().readings.clone()
    }

    pub fn len(&self) -> usize {
        self.read().readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().readings.is_empty()
    }

    // Every mutation is a single push, so a poisoned lock still guards a
    // consistent series.
    fn read(&self) -> RwLockReadGuard<'_, SeriesData> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SeriesData> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}
