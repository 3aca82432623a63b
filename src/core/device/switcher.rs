//! Linear channel switcher front-end

use super::{wait_async, wait_blocking};
use crate::core::callbacks::ErrorCallbacks;
use crate::core::connection::{ConnectionSettings, ConnectionState, DeviceConnection};
use crate::core::error::{validate_range, Result};
use crate::core::history::TrafficEntry;
use crate::core::protocol::linear::{SwitcherCommand, SwitcherProtocol};
use crate::core::state::{SwitcherSnapshot, SwitcherState, VideoType};
use crate::core::transport::LineTransport;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Switcher with one active channel per medium and an optional projector
pub struct ChannelSwitcher {
    connection: DeviceConnection<SwitcherProtocol>,
    state: Arc<SwitcherState>,
    callbacks: ErrorCallbacks,
}

impl ChannelSwitcher {
    /// Create a switcher on `transport` with default settings
    pub fn new(transport: Arc<dyn LineTransport>) -> Self {
        Self::with_settings(transport, ConnectionSettings::default())
    }

    /// Create a switcher with explicit connection settings
    pub fn with_settings(transport: Arc<dyn LineTransport>, settings: ConnectionSettings) -> Self {
        let state = Arc::new(SwitcherState::new());
        let callbacks = ErrorCallbacks::new();
        let protocol = SwitcherProtocol::new(Arc::clone(&state), callbacks.clone());

        Self {
            connection: DeviceConnection::new(transport, protocol, settings),
            state,
            callbacks,
        }
    }

    /// Open the transport and identify the device
    pub async fn open_connection(&self) -> Result<()> {
        self.connection.open().await
    }

    /// Close the transport and stop the workers
    pub async fn close_connection(&self) -> Result<()> {
        self.connection.close().await
    }

    /// Lifecycle state
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Whether the identify report has been processed
    pub fn is_ready(&self) -> bool {
        self.connection.readiness().is_ready()
    }

    /// Block the calling thread until ready, without limit
    ///
    /// Must not be called from inside the async runtime; use
    /// [`wait_until_ready_async`](Self::wait_until_ready_async) there.
    pub fn wait_until_ready(&self) {
        self.connection.readiness().wait();
    }

    /// Block the calling thread until ready or `timeout`
    pub fn wait_until_ready_timeout(&self, timeout: Duration) -> Result<()> {
        wait_blocking(self.connection.readiness(), timeout)
    }

    /// Wait until ready, without limit
    pub async fn wait_until_ready_async(&self) {
        self.connection.readiness().wait_async(None).await;
    }

    /// Wait until ready or `timeout`
    pub async fn wait_until_ready_async_timeout(&self, timeout: Duration) -> Result<()> {
        wait_async(self.connection.readiness(), timeout).await
    }

    async fn send(&self, command: SwitcherCommand) -> Result<()> {
        debug!(?command, "switcher command");
        self.connection.send(&command.encode()).await
    }

    fn channel_arg(&self, channel: i32) -> Result<u16> {
        validate_range("channel", channel, self.state.channels())
    }

    /// Switch audio and video to `channel`
    pub async fn change_channel(&self, channel: i32) -> Result<()> {
        let channel = self.channel_arg(channel)?;
        self.send(SwitcherCommand::Channel(channel)).await
    }

    /// Switch video to `channel`
    pub async fn change_video_channel(&self, channel: i32) -> Result<()> {
        let channel = self.channel_arg(channel)?;
        self.send(SwitcherCommand::VideoChannel(channel)).await
    }

    /// Switch audio to `channel`
    pub async fn change_audio_channel(&self, channel: i32) -> Result<()> {
        let channel = self.channel_arg(channel)?;
        self.send(SwitcherCommand::AudioChannel(channel)).await
    }

    /// Request both firmware versions
    pub async fn get_software_versions(&self) -> Result<()> {
        self.send(SwitcherCommand::SoftwareVersions).await
    }

    /// Power the projector on or off
    pub async fn set_projector_power(&self, powered: bool) -> Result<()> {
        self.send(SwitcherCommand::ProjectorPower(powered)).await
    }

    /// Show or blank the projector picture
    pub async fn set_projector_visibility(&self, visible: bool) -> Result<()> {
        self.send(SwitcherCommand::ProjectorVisibility(visible)).await
    }

    /// Show or mute the RGB output
    pub async fn set_rgb_visibility(&self, visible: bool) -> Result<()> {
        self.send(SwitcherCommand::RgbVisibility(visible)).await
    }

    /// Mute or unmute audio
    pub async fn set_audio_mute(&self, muted: bool) -> Result<()> {
        self.send(SwitcherCommand::AudioMute(muted)).await
    }

    /// Request a fresh identify report
    pub async fn identify(&self) -> Result<()> {
        self.send(SwitcherCommand::Identify).await
    }

    /// Register a callback for device error messages
    pub fn register_error_callback<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.register(callback);
    }

    /// Number of selectable channels
    pub fn channels(&self) -> u16 {
        self.state.channels()
    }

    /// Active video channel
    pub fn video_channel(&self) -> u16 {
        self.state.video_channel()
    }

    /// Active audio channel
    pub fn audio_channel(&self) -> u16 {
        self.state.audio_channel()
    }

    /// Output signal type
    pub fn video_type(&self) -> VideoType {
        self.state.video_type()
    }

    /// Projector power
    pub fn is_projector_powered(&self) -> bool {
        self.state.is_projector_powered()
    }

    /// Projector display mute
    pub fn is_projector_muted(&self) -> bool {
        self.state.is_projector_muted()
    }

    /// Audio mute
    pub fn is_audio_muted(&self) -> bool {
        self.state.is_audio_muted()
    }

    /// RGB mute
    pub fn is_rgb_muted(&self) -> bool {
        self.state.is_rgb_muted()
    }

    /// Switcher firmware version
    pub fn switcher_firmware_version(&self) -> Option<String> {
        self.state.switcher_firmware()
    }

    /// Projector controller firmware version
    pub fn projector_firmware_version(&self) -> Option<String> {
        self.state.projector_firmware()
    }

    /// Copy of every state field
    pub fn snapshot(&self) -> SwitcherSnapshot {
        self.state.snapshot()
    }

    /// Recent traffic, oldest first
    pub fn history(&self) -> Vec<TrafficEntry> {
        self.connection.history().snapshot()
    }

    /// Human-readable transport description
    pub fn connection_info(&self) -> String {
        self.connection.connection_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::{MockLineTransport, TransportType};

    #[tokio::test]
    async fn test_out_of_range_channel_writes_nothing() {
        let mut transport = MockLineTransport::new();
        transport.expect_is_open().return_const(true);
        transport.expect_write().never();
        transport.expect_transport_type().return_const(TransportType::Simulated);

        let switcher = ChannelSwitcher::new(Arc::new(transport));
        assert_eq!(switcher.channels(), 0);

        for bad in [-1, 1, 5] {
            assert!(switcher.change_channel(bad).await.unwrap_err().is_validation());
            assert!(switcher.change_video_channel(bad).await.unwrap_err().is_validation());
            assert!(switcher.change_audio_channel(bad).await.unwrap_err().is_validation());
        }
    }

    #[tokio::test]
    async fn test_commands_are_encoded() {
        let mut transport = MockLineTransport::new();
        transport.expect_is_open().return_const(true);
        let mut seq = mockall::Sequence::new();
        for expected in ["0!", "q", "[", "(", "b", "+", "I"] {
            transport
                .expect_write()
                .withf(move |text| text == expected)
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
        }

        let switcher = ChannelSwitcher::new(Arc::new(transport));
        switcher.change_channel(0).await.unwrap();
        switcher.get_software_versions().await.unwrap();
        switcher.set_projector_power(true).await.unwrap();
        switcher.set_projector_visibility(false).await.unwrap();
        switcher.set_rgb_visibility(true).await.unwrap();
        switcher.set_audio_mute(true).await.unwrap();
        switcher.identify().await.unwrap();
        assert_eq!(switcher.history().len(), 7);
    }
}
