mod common;

use std::io::ErrorKind;
use std::sync::atomic::Ordering;

use common::{scripted_manager, PortScript, SAMPLE_LINE};
use inhaler_logger_lib::acquisition::{AcquisitionState, TickOutcome};
use inhaler_logger_lib::device::{
    ConnectionState, DeviceError, DeviceManager, InhalerCatalog, SessionMetadata,
};
use inhaler_logger_lib::export::ExportError;
use inhaler_logger_lib::serial::SerialError;

fn manager_for(script: &PortScript, failures: u32) -> DeviceManager {
    let (connections, _) = scripted_manager(script.clone(), failures);
    DeviceManager::new(connections, InhalerCatalog::builtin())
}

async fn tick(manager: &DeviceManager) -> TickOutcome {
    let acquisition = manager.acquisition();
    let mut guard = acquisition.lock().await;
    guard.tick().expect("tick failed")
}

#[tokio::test]
async fn test_connect_retries_then_records() {
    let script = PortScript::new();
    let (connections, opener) = scripted_manager(script.clone(), 2);
    let manager = DeviceManager::new(connections, InhalerCatalog::builtin());

    manager.select_inhaler("Inhaler A").await.unwrap();
    manager.connect_device("COM7", 9600).await.unwrap();
    assert_eq!(opener.attempts.load(Ordering::SeqCst), 3);

    let status = manager.get_device_status().await;
    assert_eq!(status.connection_state, ConnectionState::Connected);
    assert_eq!(status.acquisition_state, AcquisitionState::Polling);
    assert_eq!(status.port_name.as_deref(), Some("COM7"));
    assert_eq!(status.inhaler.as_deref(), Some("Inhaler A"));
    assert_eq!(status.last_seen, None);

    let before = chrono::Utc::now();
    script.push_line(SAMPLE_LINE);
    assert!(matches!(tick(&manager).await, TickOutcome::Recorded(_)));
    let seen = manager.get_device_status().await.last_seen.expect("reading time recorded");
    assert!(seen >= before);

    // Ticks without data leave it untouched
    assert!(matches!(tick(&manager).await, TickOutcome::NoData));
    assert_eq!(manager.get_device_status().await.last_seen, Some(seen));
    assert_eq!(manager.flow_series().flow_rates, vec![2683.28]);
    assert_eq!(manager.first_measurement().unwrap().temperature_c, 22.5);
}

#[tokio::test]
async fn test_unavailable_port_leaves_loop_idle() {
    let script = PortScript::new();
    let (connections, opener) = scripted_manager(script.clone(), u32::MAX);
    let manager = DeviceManager::new(connections, InhalerCatalog::builtin());
    manager.select_inhaler("Inhaler C").await.unwrap();

    match manager.connect_device("COM9", 9600).await {
        Err(DeviceError::SerialError(SerialError::ConnectionUnavailable { attempts, .. })) => {
            assert_eq!(attempts, 5)
        }
        other => panic!("expected ConnectionUnavailable, got {:?}", other),
    }
    assert_eq!(opener.attempts.load(Ordering::SeqCst), 5);

    let status = manager.get_device_status().await;
    assert!(matches!(status.connection_state, ConnectionState::Error(_)));
    assert_eq!(status.acquisition_state, AcquisitionState::Idle);
    assert!(matches!(tick(&manager).await, TickOutcome::Idle));
    assert!(matches!(
        manager.disconnect_device().await,
        Err(DeviceError::NotConnected)
    ));
}

#[tokio::test]
async fn test_connect_twice_is_rejected() {
    let script = PortScript::new();
    let manager = manager_for(&script, 0);
    manager.connect_device("COM7", 9600).await.unwrap();

    assert!(matches!(
        manager.connect_device("COM7", 9600).await,
        Err(DeviceError::AlreadyConnected)
    ));

    manager.disconnect_device().await.unwrap();
    let status = manager.get_device_status().await;
    assert_eq!(status.connection_state, ConnectionState::Disconnected);
    assert_eq!(status.port_name, None);
}

#[tokio::test]
async fn test_fault_is_reported_and_reconnect_resumes() {
    let script = PortScript::new();
    let manager = manager_for(&script, 0);
    manager.select_inhaler("Inhaler A").await.unwrap();
    manager.connect_device("COM7", 9600).await.unwrap();

    script.push_fault(ErrorKind::BrokenPipe);
    assert!(manager.acquisition().lock().await.tick().is_err());

    let status = manager.get_device_status().await;
    assert!(matches!(status.connection_state, ConnectionState::Faulted(_)));
    assert_eq!(status.acquisition_state, AcquisitionState::Faulted);

    // A faulted handle does not block reconnecting
    manager.connect_device("COM7", 9600).await.unwrap();
    script.push_line(SAMPLE_LINE);
    assert!(matches!(tick(&manager).await, TickOutcome::Recorded(_)));
    assert_eq!(
        manager.get_device_status().await.connection_state,
        ConnectionState::Connected
    );
}

#[tokio::test]
async fn test_unknown_inhaler_keeps_selection() {
    let script = PortScript::new();
    let manager = manager_for(&script, 0);
    manager.select_inhaler("Inhaler B").await.unwrap();

    assert!(matches!(
        manager.select_inhaler("Inhaler Q").await,
        Err(DeviceError::UnknownInhaler(_))
    ));
    let status = manager.get_device_status().await;
    assert_eq!(status.inhaler.as_deref(), Some("Inhaler B"));
    assert_eq!(status.resistance, Some(1.2));

    manager.clear_inhaler().await;
    assert_eq!(manager.get_device_status().await.resistance, None);
}

#[tokio::test]
async fn test_export_writes_session_rows() {
    let script = PortScript::new();
    let manager = manager_for(&script, 0);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions").join("run.csv");

    assert!(matches!(
        manager.export_csv(&path).await,
        Err(ExportError::NoData)
    ));
    assert!(!path.exists());

    manager.select_inhaler("Inhaler A").await.unwrap();
    manager.connect_device("COM7", 9600).await.unwrap();
    manager
        .set_metadata(SessionMetadata {
            location_id: "LAB-2".into(),
            patient_id: "P-0042".into(),
            ..Default::default()
        })
        .await;

    script.push_line(SAMPLE_LINE);
    script.push_line("2024 12 02 14 30 16 22.5 45.0 1013.0 3.6 0.0");
    tick(&manager).await;
    tick(&manager).await;

    assert_eq!(manager.export_csv(&path).await.unwrap(), 2);

    let mut reader = csv::Reader::from_path(&path).unwrap();
    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(&rows[0][11], "2683.28");
    assert_eq!(&rows[1][11], "0.0");
    assert_eq!(&rows[1][9], "3.6");
    assert_eq!(&rows[1][12], "LAB-2");
    assert_eq!(&rows[1][13], "P-0042");
    assert_eq!(&rows[1][14], "");
}
