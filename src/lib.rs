pub mod acquisition;
pub mod cli;
pub mod config;
pub mod device;
pub mod export;
pub mod serial;

use std::sync::Arc;

use anyhow::Context;
use tokio::time::{self, Duration, MissedTickBehavior};

use acquisition::{AcquisitionMonitor, AcquisitionState, MonitorStatus};
use cli::Cli;
use config::{log_level_filter, AppConfig};
use device::DeviceManager;
use serial::ConnectionManager;

/// Install the `env_logger` backend; `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str) {
    let filter = log_level_filter(level).unwrap_or(log::LevelFilter::Info);
    let _ = env_logger::Builder::new()
        .filter_level(filter)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}

/// Run a logging session until Ctrl-C, then close the port and export.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.resolve_config().context("Failed to load configuration")?;
    init_logging(&config.log_level);

    if cli.list_ports {
        return list_ports();
    }
    if cli.list_inhalers {
        for device in config.catalog().devices() {
            println!("{}\t{}", device.name, device.resistance);
        }
        return Ok(());
    }

    config.validate().context("Invalid configuration")?;
    log::info!("Inhaler logger v{} starting", env!("CARGO_PKG_VERSION"));
    if let Ok(json) = config.to_json() {
        log::debug!("Effective configuration:\n{}", json);
    }

    let manager = Arc::new(build_manager(&config));
    manager.set_metadata(config.session.clone()).await;
    manager
        .select_inhaler(&config.inhaler)
        .await
        .with_context(|| format!("Cannot select inhaler {}", config.inhaler))?;

    if let Err(e) = manager.connect_device(&config.port, config.baud_rate).await {
        // Keep running without a device; the loop stays idle.
        log::error!("{}", e);
        if let Ok(ports) = serial::discover_ports() {
            let names: Vec<&str> = ports.iter().map(|p| p.port_name.as_str()).collect();
            log::info!("Available ports: {:?}", names);
        }
    }

    let monitor = AcquisitionMonitor::start(manager.acquisition(), config.poll_interval());
    let summary = tokio::spawn(summary_loop(
        manager.clone(),
        monitor.status(),
        config.summary_interval(),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    log::info!("Exiting...");

    monitor.stop().await;
    summary.abort();
    if let Err(e) = manager.disconnect_device().await {
        log::debug!("Disconnect on shutdown: {}", e);
    }

    match manager.export_csv(&config.output_path).await {
        Ok(_) => {}
        Err(export::ExportError::NoData) => log::info!("No data to save."),
        Err(e) => return Err(e).context("Failed to save data"),
    }
    Ok(())
}

pub fn build_manager(config: &AppConfig) -> DeviceManager {
    let connections = ConnectionManager::new(config.retry_policy(), config.read_timeout());
    DeviceManager::new(connections, config.catalog())
}

fn list_ports() -> anyhow::Result<()> {
    let ports = serial::discover_ports().context("Failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => println!(
                "{}\t{:04X}:{:04X}\t{}",
                port.port_name,
                vid,
                pid,
                port.product.as_deref().unwrap_or("")
            ),
            _ => println!("{}", port.port_name),
        }
    }
    Ok(())
}

/// Console stand-in for the live plot: logs the first measurement once and
/// the latest flow on every refresh.
async fn summary_loop(
    manager: Arc<DeviceManager>,
    mut status_rx: tokio::sync::watch::Receiver<MonitorStatus>,
    interval: Duration,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut first_shown = false;

    loop {
        tokio::select! {
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                if status.state == AcquisitionState::Faulted {
                    if let Some(reason) = status.fault {
                        log::error!("Acquisition halted: {}. Reconnect to resume.", reason);
                    }
                }
            }
            _ = ticker.tick() => {
                if !first_shown {
                    if let Some(first) = manager.first_measurement() {
                        let start = first
                            .device_timestamp()
                            .map(|ts| ts.to_string())
                            .unwrap_or_else(|| format!(
                                "{}-{}-{} {}:{}:{}",
                                first.year, first.month, first.day,
                                first.hour, first.minute, first.second
                            ));
                        log::info!(
                            "Session start {} | Temperature {} C | Humidity {} % | Pressure {} hPa",
                            start,
                            first.temperature_c,
                            first.humidity_pct,
                            first.atmospheric_pressure_hpa
                        );
                        first_shown = true;
                    }
                }

                if let Some(latest) = manager.store().latest() {
                    let series = manager.flow_series();
                    log::info!(
                        "{} readings | t={:.2}s flow={:.2} L/min | peak {:.2} L/min",
                        series.len(),
                        latest.measurement_time_s,
                        latest.flow_rate_lpm,
                        series.peak_flow().unwrap_or(latest.flow_rate_lpm)
                    );
                }
            }
        }
    }
}
