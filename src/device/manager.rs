use std::path::Path;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::acquisition::{AcquisitionLoop, AcquisitionState, FlowSeries, TimeSeriesStore};
use crate::export::{self, CsvExporter};
use crate::serial::{ConnectionManager, HandleState, Reading};
use super::{ConnectionState, DeviceError, DeviceStatus, InhalerCatalog, Result, SessionMetadata};

/// Central session management
/// Owns the acquisition loop and mediates connection, inhaler selection,
/// live reads of the series and export.
pub struct DeviceManager {
    connections: Arc<ConnectionManager>,
    catalog: InhalerCatalog,
    acquisition: Arc<Mutex<AcquisitionLoop>>,
    store: TimeSeriesStore,
    inhaler: RwLock<Option<String>>,
    connection_state: RwLock<ConnectionState>,
    metadata: RwLock<SessionMetadata>,
}

impl DeviceManager {
    pub fn new(connections: ConnectionManager, catalog: InhalerCatalog) -> Self {
        let store = TimeSeriesStore::new();
        Self {
            connections: Arc::new(connections),
            catalog,
            acquisition: Arc::new(Mutex::new(AcquisitionLoop::new(store.clone()))),
            store,
            inhaler: RwLock::new(None),
            connection_state: RwLock::new(ConnectionState::Disconnected),
            metadata: RwLock::new(SessionMetadata::default()),
        }
    }

    /// The acquisition loop, for the monitor task that ticks it.
    pub fn acquisition(&self) -> Arc<Mutex<AcquisitionLoop>> {
        self.acquisition.clone()
    }

    pub fn store(&self) -> TimeSeriesStore {
        self.store.clone()
    }

    pub fn catalog(&self) -> &InhalerCatalog {
        &self.catalog
    }

    /// Open `port_name` with bounded retries and attach it to the loop.
    /// Also the recovery path after a transport fault.
    pub async fn connect_device(&self, port_name: &str, baud_rate: u32) -> Result<()> {
        {
            let acquisition = self.acquisition.lock().await;
            if acquisition.handle().map(|h| h.state()) == Some(HandleState::Open) {
                return Err(DeviceError::AlreadyConnected);
            }
        }

        self.set_connection_state(ConnectionState::Connecting).await;
        log::info!("Attempting to connect to port: {}", port_name);

        // Retries sleep between attempts; keep them off the async workers.
        let connections = self.connections.clone();
        let port = port_name.to_string();
        let opened = tokio::task::spawn_blocking(move || connections.open(&port, baud_rate))
            .await
            .map_err(|e| DeviceError::TaskFailed(e.to_string()))?;

        match opened {
            Ok(handle) => {
                self.acquisition.lock().await.attach(handle);
                self.set_connection_state(ConnectionState::Connected).await;
                Ok(())
            }
            Err(e) => {
                self.set_connection_state(ConnectionState::Error(e.to_string())).await;
                Err(DeviceError::SerialError(e))
            }
        }
    }

    /// Close the current connection. Recorded data is kept.
    pub async fn disconnect_device(&self) -> Result<()> {
        let mut acquisition = self.acquisition.lock().await;
        if acquisition.handle().is_none() {
            return Err(DeviceError::NotConnected);
        }
        acquisition.close();
        drop(acquisition);

        self.set_connection_state(ConnectionState::Disconnected).await;
        Ok(())
    }

    /// Activate an inhaler from the catalog; applies to readings parsed from
    /// now on.
    pub async fn select_inhaler(&self, name: &str) -> Result<f64> {
        let resistance = self
            .acquisition
            .lock()
            .await
            .select_inhaler(&self.catalog, name)?;
        *self.inhaler.write().await = Some(name.to_string());
        Ok(resistance)
    }

    pub async fn clear_inhaler(&self) {
        // None is always accepted
        let _ = self.acquisition.lock().await.select_resistance(None);
        *self.inhaler.write().await = None;
    }

    pub async fn set_metadata(&self, metadata: SessionMetadata) {
        *self.metadata.write().await = metadata;
    }

    pub async fn metadata(&self) -> SessionMetadata {
        self.metadata.read().await.clone()
    }

    pub fn first_measurement(&self) -> Option<Reading> {
        self.store.first_reading()
    }

    pub fn flow_series(&self) -> FlowSeries {
        self.store.projection()
    }

    pub async fn get_device_status(&self) -> DeviceStatus {
        let (port_name, acquisition_state, resistance, metrics) = {
            let acquisition = self.acquisition.lock().await;
            (
                acquisition.port_name().map(str::to_string),
                acquisition.state(),
                acquisition.resistance(),
                acquisition.metrics(),
            )
        };

        let connection_state = {
            let mut current = self.connection_state.write().await;
            if acquisition_state == AcquisitionState::Faulted
                && !matches!(*current, ConnectionState::Faulted(_))
            {
                let reason = metrics.last_error.clone().unwrap_or_else(|| "transport fault".to_string());
                *current = ConnectionState::Faulted(reason);
            }
            current.clone()
        };

        DeviceStatus {
            port_name,
            connection_state,
            acquisition_state,
            inhaler: self.inhaler.read().await.clone(),
            resistance,
            readings: self.store.len(),
            last_seen: metrics.last_reading_at,
        }
    }

    /// Write every recorded reading plus the current metadata to `path`.
    pub async fn export_csv(&self, path: &Path) -> export::Result<usize> {
        let metadata = self.metadata().await;
        let readings = self.store.all();
        CsvExporter::export(path, &readings, &metadata)
    }

    async fn set_connection_state(&self, state: ConnectionState) {
        *self.connection_state.write().await = state;
    }
}
