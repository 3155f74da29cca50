use chrono::Utc;

use crate::device::{ConversionError, DeviceError, InhalerCatalog};
use crate::serial::{parse_line, ConnectionHandle, HandleState, SerialError};

use super::store::TimeSeriesStore;
use super::types::*;

/// Reads telemetry one line per tick: read → parse → convert → append.
///
/// Holds no timer; whoever owns it calls [`AcquisitionLoop::tick`] on its own
/// schedule.
pub struct AcquisitionLoop {
    handle: Option<ConnectionHandle>,
    resistance: Option<f64>,
    store: TimeSeriesStore,
    state: AcquisitionState,
    metrics: AcquisitionMetrics,
}

impl AcquisitionLoop {
    pub fn new(store: TimeSeriesStore) -> Self {
        Self {
            handle: None,
            resistance: None,
            store,
            state: AcquisitionState::Idle,
            metrics: AcquisitionMetrics::default(),
        }
    }

    /// Shared view of the recorded series.
    pub fn store(&self) -> &TimeSeriesStore {
        &self.store
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    pub fn metrics(&self) -> AcquisitionMetrics {
        self.metrics.clone()
    }

    pub fn resistance(&self) -> Option<f64> {
        self.resistance
    }

    pub fn handle(&self) -> Option<&ConnectionHandle> {
        self.handle.as_ref()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.handle.as_ref().map(|h| h.port_name())
    }

    /// Use a freshly opened connection. Any previous connection is closed.
    /// This is the only way out of `Faulted`.
    pub fn attach(&mut self, handle: ConnectionHandle) {
        if let Some(mut previous) = self.handle.replace(handle) {
            previous.close();
        }
        self.metrics.utf8_decode_errors = 0;
        self.metrics.partial_buffer_trims = 0;
        self.refresh_state();
    }

    /// Take the connection out of the loop without closing it.
    pub fn detach(&mut self) -> Option<ConnectionHandle> {
        let handle = self.handle.take();
        self.refresh_state();
        handle
    }

    /// Set the active resistance used for every following parse. `None`
    /// parks the loop in `Idle`.
    pub fn select_resistance(&mut self, resistance: Option<f64>) -> Result<(), ConversionError> {
        if let Some(r) = resistance {
            if !r.is_finite() || r <= 0.0 {
                return Err(ConversionError::InvalidResistance(r));
            }
        }
        self.resistance = resistance;
        self.refresh_state();
        Ok(())
    }

    /// Activate a catalog inhaler by name, returning its resistance.
    pub fn select_inhaler(&mut self, catalog: &InhalerCatalog, name: &str) -> Result<f64, DeviceError> {
        let resistance = catalog.resistance(name)?;
        self.resistance = Some(resistance);
        self.refresh_state();
        log::info!("Selected {} (resistance {})", name, resistance);
        Ok(resistance)
    }

    /// Close and drop the connection.
    pub fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close();
        }
        self.refresh_state();
    }

    /// One acquisition step. Never blocks longer than the connection's read
    /// timeout. A transport fault is returned once; later ticks report
    /// `TickOutcome::Faulted` without touching the port.
    pub fn tick(&mut self) -> Result<TickOutcome, AcquisitionError> {
        self.metrics.ticks += 1;
        self.refresh_state();

        match self.state {
            AcquisitionState::Faulted => return Ok(TickOutcome::Faulted),
            AcquisitionState::Idle => return Ok(TickOutcome::Idle),
            AcquisitionState::Polling => {}
        }

        let (Some(handle), Some(resistance)) = (self.handle.as_mut(), self.resistance) else {
            return Ok(TickOutcome::Idle);
        };

        if !handle.is_readable() {
            self.sync_handle_counters();
            return Ok(TickOutcome::NoData);
        }

        let read = handle.read_line();
        self.sync_handle_counters();

        let line = match read {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(TickOutcome::NoData),
            Err(e @ SerialError::TransportFault { .. }) => {
                self.metrics.transport_faults += 1;
                self.metrics.last_error = Some(e.to_string());
                self.state = AcquisitionState::Faulted;
                return Err(AcquisitionError::Transport(e));
            }
            Err(e) => {
                // closed underneath us
                log::debug!("Read skipped: {}", e);
                self.refresh_state();
                return Ok(TickOutcome::Idle);
            }
        };

        if line.trim().is_empty() {
            self.metrics.empty_reads += 1;
            log::debug!("Empty line received; treating as no data");
            return Ok(TickOutcome::NoData);
        }

        self.metrics.lines_read += 1;
        log::debug!("Raw data received: {}", line);

        match parse_line(&line, resistance) {
            Ok(reading) => {
                log::debug!("Parsed data: {:?}", reading);
                self.store.append(reading.clone());
                self.metrics.readings_recorded += 1;
                self.metrics.last_reading_at = Some(Utc::now());
                Ok(TickOutcome::Recorded(reading))
            }
            Err(e) => {
                log::warn!("Discarding line: {}", e);
                self.metrics.lines_discarded += 1;
                self.metrics.last_error = Some(e.to_string());
                Ok(TickOutcome::Discarded(e))
            }
        }
    }

    fn refresh_state(&mut self) {
        self.state = match (&self.handle, self.resistance) {
            (Some(h), _) if h.state() == HandleState::Faulted => AcquisitionState::Faulted,
            (Some(h), Some(_)) if h.is_open() => AcquisitionState::Polling,
            _ => AcquisitionState::Idle,
        };
    }

    fn sync_handle_counters(&mut self) {
        if let Some(handle) = &self.handle {
            self.metrics.utf8_decode_errors = handle.utf8_decode_errors();
            self.metrics.partial_buffer_trims = handle.partial_buffer_trims();
        }
    }
}
