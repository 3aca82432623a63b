//! Channel switcher against the simulated device

mod common;

use common::{eventually, SETTLE};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use switchlink_core::core::simulator::{SimulatedSwitcher, SwitcherModel};
use switchlink_core::{ChannelSwitcher, ConnectionState, DeviceError, Direction};

fn switcher(model: SwitcherModel) -> (Arc<SimulatedSwitcher>, ChannelSwitcher) {
    let sim = Arc::new(SimulatedSwitcher::new("switcher", model));
    let device = ChannelSwitcher::new(sim.clone());
    (sim, device)
}

async fn ready(model: SwitcherModel) -> (Arc<SimulatedSwitcher>, ChannelSwitcher) {
    let (sim, device) = switcher(model);
    device.open_connection().await.unwrap();
    device.wait_until_ready_async_timeout(SETTLE).await.unwrap();
    (sim, device)
}

#[tokio::test]
async fn test_identify_populates_state() {
    let (sim, device) = ready(SwitcherModel::default()).await;

    assert!(device.is_ready());
    assert_eq!(device.connection_state(), ConnectionState::Ready);
    assert_eq!(device.channels(), 4);
    assert_eq!(device.video_channel(), 1);
    assert_eq!(device.audio_channel(), 1);
    assert!(!device.is_projector_powered());
    assert_eq!(device.switcher_firmware_version().as_deref(), Some("1.11"));
    assert_eq!(device.projector_firmware_version().as_deref(), Some("1.11"));
    assert_eq!(sim.written(), vec!["I"]);

    device.close_connection().await.unwrap();
}

#[tokio::test]
async fn test_not_ready_until_opened() {
    let (_sim, device) = switcher(SwitcherModel::default());

    assert!(!device.is_ready());
    assert_eq!(device.connection_state(), ConnectionState::Closed);
    let err = device
        .wait_until_ready_async_timeout(Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, DeviceError::ReadyTimeout(_)));
    assert!(matches!(device.identify().await, Err(DeviceError::NotOpen)));
    // Channel count is unknown until identified.
    assert!(device.change_channel(1).await.unwrap_err().is_validation());
}

#[tokio::test]
async fn test_channel_commands_update_state() {
    let (sim, device) = ready(SwitcherModel::default()).await;

    device.change_channel(3).await.unwrap();
    assert!(eventually(SETTLE, || device.video_channel() == 3 && device.audio_channel() == 3).await);

    device.change_video_channel(2).await.unwrap();
    assert!(eventually(SETTLE, || device.video_channel() == 2).await);
    assert_eq!(device.audio_channel(), 3);

    device.change_audio_channel(4).await.unwrap();
    assert!(eventually(SETTLE, || device.audio_channel() == 4).await);

    assert_eq!(sim.written(), vec!["I", "3!", "2&", "4$"]);
    device.close_connection().await.unwrap();
}

#[tokio::test]
async fn test_out_of_range_channel_writes_nothing() {
    let (sim, device) = ready(SwitcherModel::default()).await;
    sim.clear_written();

    let err = device.change_channel(5).await.unwrap_err();
    assert!(err.is_validation());
    assert!(device.change_video_channel(-1).await.unwrap_err().is_validation());
    assert!(sim.written().is_empty());

    device.close_connection().await.unwrap();
}

#[tokio::test]
async fn test_mute_commands() {
    let (_sim, device) = ready(SwitcherModel::default()).await;

    device.set_audio_mute(true).await.unwrap();
    assert!(eventually(SETTLE, || device.is_audio_muted()).await);

    device.set_rgb_visibility(false).await.unwrap();
    assert!(eventually(SETTLE, || device.is_rgb_muted()).await);

    device.set_audio_mute(false).await.unwrap();
    assert!(eventually(SETTLE, || !device.is_audio_muted()).await);

    device.close_connection().await.unwrap();
}

#[tokio::test]
async fn test_projector_control() {
    let model = SwitcherModel {
        projector_attached: true,
        ..SwitcherModel::default()
    };
    let (_sim, device) = ready(model).await;

    device.set_projector_power(true).await.unwrap();
    assert!(eventually(SETTLE, || device.is_projector_powered()).await);

    device.set_projector_visibility(false).await.unwrap();
    assert!(eventually(SETTLE, || device.is_projector_muted()).await);

    device.close_connection().await.unwrap();
}

#[tokio::test]
async fn test_device_errors_reach_callbacks() {
    let (sim, device) = ready(SwitcherModel::default()).await;
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    device.register_error_callback(move |msg| sink.lock().push(msg.to_string()));

    // No projector attached, so the device answers E04.
    device.set_projector_power(true).await.unwrap();
    sim.inject("E99");

    assert!(eventually(SETTLE, || errors.lock().len() == 2).await);
    assert_eq!(
        *errors.lock(),
        vec!["Projector is powered OFF", "unknown error code E99"]
    );
    assert!(!device.is_projector_powered());

    device.close_connection().await.unwrap();
}

#[tokio::test]
async fn test_panicking_callback_does_not_stop_delivery() {
    let (sim, device) = ready(SwitcherModel::default()).await;
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    device.register_error_callback(|_| panic!("callback failure"));
    device.register_error_callback(move |msg| sink.lock().push(msg.to_string()));

    sim.inject("E01");
    assert!(eventually(SETTLE, || errors.lock().len() == 1).await);

    sim.inject("E02");
    assert!(eventually(SETTLE, || errors.lock().len() == 2).await);
    assert_eq!(errors.lock()[1], "Slave Communication Error");

    device.close_connection().await.unwrap();
}

#[tokio::test]
async fn test_software_versions_and_history() {
    let model = SwitcherModel {
        switcher_firmware: "2.05".to_string(),
        ..SwitcherModel::default()
    };
    let (sim, device) = ready(model).await;
    sim.with_model(|m| m.projector_firmware = "3.10".to_string());

    device.get_software_versions().await.unwrap();
    assert!(
        eventually(SETTLE, || {
            device.projector_firmware_version().as_deref() == Some("3.10")
        })
        .await
    );
    assert_eq!(device.switcher_firmware_version().as_deref(), Some("2.05"));

    let history = device.history();
    assert!(history
        .iter()
        .any(|e| e.direction == Direction::Sent && e.line == "q"));
    assert!(history
        .iter()
        .any(|e| e.direction == Direction::Received && e.line == "QPC3.10"));

    device.close_connection().await.unwrap();
}

#[tokio::test]
async fn test_reopen_after_close() {
    let (_sim, device) = ready(SwitcherModel::default()).await;

    assert!(matches!(
        device.open_connection().await,
        Err(DeviceError::AlreadyOpen)
    ));

    device.close_connection().await.unwrap();
    assert!(!device.is_ready());
    assert_eq!(device.connection_state(), ConnectionState::Closed);
    device.close_connection().await.unwrap();

    device.open_connection().await.unwrap();
    device.wait_until_ready_async_timeout(SETTLE).await.unwrap();
    assert_eq!(device.channels(), 4);
    device.close_connection().await.unwrap();
}
