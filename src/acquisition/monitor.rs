use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{self, timeout, Duration, MissedTickBehavior};

use super::reader::AcquisitionLoop;
use super::types::*;

/// Latest loop status published after every tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorStatus {
    pub state: AcquisitionState,
    pub metrics: AcquisitionMetrics,
    /// Set when the connection faulted; cleared once a tick polls again.
    pub fault: Option<String>,
}

impl Default for MonitorStatus {
    fn default() -> Self {
        Self {
            state: AcquisitionState::Idle,
            metrics: AcquisitionMetrics::default(),
            fault: None,
        }
    }
}

/// Drives [`AcquisitionLoop::tick`] from a periodic timer on the tokio runtime.
pub struct AcquisitionMonitor {
    task_handle: tokio::task::JoinHandle<()>,
    stop_tx: mpsc::Sender<()>,
    status_rx: watch::Receiver<MonitorStatus>,
}

impl AcquisitionMonitor {
    pub fn start(acquisition: Arc<Mutex<AcquisitionLoop>>, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (status_tx, status_rx) = watch::channel(MonitorStatus::default());

        let task_handle = tokio::spawn(Self::polling_loop(acquisition, interval, stop_rx, status_tx));

        Self { task_handle, stop_tx, status_rx }
    }

    pub fn status(&self) -> watch::Receiver<MonitorStatus> {
        self.status_rx.clone()
    }

    /// Stop ticking and wait (bounded) for the task to finish.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(()).await;
        if timeout(Duration::from_secs(2), self.task_handle).await.is_err() {
            log::warn!("Acquisition monitor did not stop within 2s");
        }
    }

    async fn polling_loop(
        acquisition: Arc<Mutex<AcquisitionLoop>>,
        interval: Duration,
        mut stop_rx: mpsc::Receiver<()>,
        status_tx: watch::Sender<MonitorStatus>,
    ) {
        log::info!("Starting acquisition polling every {:?}", interval);
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut fault: Option<String> = None;

        loop {
            tokio::select! {
                _ = stop_rx.recv() => {
                    log::info!("Received stop signal for acquisition");
                    break;
                }
                _ = ticker.tick() => {
                    // A tick may block for up to the port read timeout.
                    let acq = acquisition.clone();
                    let result = tokio::task::spawn_blocking(move || {
                        let mut guard = acq.blocking_lock();
                        let outcome = guard.tick();
                        (outcome, guard.state(), guard.metrics())
                    })
                    .await;

                    let (outcome, state, metrics) = match result {
                        Ok(parts) => parts,
                        Err(e) => {
                            log::error!("Acquisition tick panicked: {}", e);
                            break;
                        }
                    };

                    match outcome {
                        Err(e) => {
                            log::error!("{}; reconnect required", e);
                            fault = Some(e.to_string());
                        }
                        Ok(TickOutcome::Recorded(reading)) => {
                            log::debug!(
                                "t={:.2}s flow={:.2} L/min",
                                reading.measurement_time_s, reading.flow_rate_lpm
                            );
                        }
                        Ok(_) => {}
                    }
                    if state == AcquisitionState::Polling {
                        fault = None;
                    }

                    let status = MonitorStatus { state, metrics, fault: fault.clone() };
                    status_tx.send_if_modified(|current| {
                        if *current != status {
                            *current = status;
                            true
                        } else {
                            false
                        }
                    });
                }
            }
        }
    }
}
