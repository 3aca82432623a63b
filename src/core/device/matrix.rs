//! Matrix crosspoint front-end

use super::{wait_async, wait_blocking};
use crate::core::callbacks::ErrorCallbacks;
use crate::core::connection::{ConnectionSettings, ConnectionState, DeviceConnection};
use crate::core::error::{validate_range, Result};
use crate::core::history::TrafficEntry;
use crate::core::protocol::matrix::{MatrixCommand, MatrixProtocol, DEFAULT_SETTLE_DELAY};
use crate::core::state::{LockMode, MappingType, MatrixState, OutputTie};
use crate::core::transport::LineTransport;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Matrix switcher routing any input to any output
///
/// Inputs, outputs and mappings are only meaningful once the device is
/// ready; wait on one of the `wait_until_ready` variants first.
pub struct MatrixSwitcher {
    connection: DeviceConnection<MatrixProtocol>,
    state: Arc<MatrixState>,
    callbacks: ErrorCallbacks,
}

impl MatrixSwitcher {
    /// Create a matrix switcher on `transport` with default settings
    pub fn new(transport: Arc<dyn LineTransport>) -> Self {
        Self::with_options(transport, ConnectionSettings::default(), DEFAULT_SETTLE_DELAY)
    }

    /// Create a matrix switcher with explicit settings and bootstrap settle delay
    pub fn with_options(
        transport: Arc<dyn LineTransport>,
        settings: ConnectionSettings,
        settle_delay: Duration,
    ) -> Self {
        let state = Arc::new(MatrixState::new());
        let callbacks = ErrorCallbacks::new();
        let protocol = MatrixProtocol::new(Arc::clone(&state), callbacks.clone(), settle_delay);

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

    /// Whether the tie table matches the device
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

    async fn send(&self, command: MatrixCommand) -> Result<()> {
        debug!(?command, "matrix command");
        self.connection.send(&command.encode()).await
    }

    /// Route `input` to `output`; input `0` unties the output
    pub async fn map_input_to_output(&self, input: i32, output: i32, kind: MappingType) -> Result<()> {
        let input = validate_range("input", input, self.state.inputs())?;
        let output = validate_range("output", output, self.state.outputs())?;
        self.send(MatrixCommand::Tie {
            input,
            output,
            kind,
        })
        .await
    }

    /// Request the firmware version
    pub async fn query_firmware(&self) -> Result<()> {
        self.send(MatrixCommand::QueryFirmware).await
    }

    /// Request the front panel lock mode
    pub async fn query_lock_mode(&self) -> Result<()> {
        self.send(MatrixCommand::QueryLockMode).await
    }

    /// Request a fresh identify report, which restarts the tie bootstrap
    pub async fn identify(&self) -> Result<()> {
        self.send(MatrixCommand::Identify).await
    }

    /// Register a callback for device error messages
    pub fn register_error_callback<F>(&self, callback: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.register(callback);
    }

    /// Input port count
    pub fn inputs(&self) -> u16 {
        self.state.inputs()
    }

    /// Output port count
    pub fn outputs(&self) -> u16 {
        self.state.outputs()
    }

    /// Tie for one output
    pub fn mapping(&self, output: u16) -> Option<OutputTie> {
        self.state.table().get(output)
    }

    /// Every tie, ordered by output
    pub fn mappings(&self) -> Vec<OutputTie> {
        self.state.mappings()
    }

    /// Firmware version, once queried
    pub fn firmware_version(&self) -> Option<String> {
        self.state.firmware()
    }

    /// Front panel lock mode, once queried
    pub fn lock_mode(&self) -> LockMode {
        self.state.lock_mode()
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
    use crate::core::transport::MockLineTransport;

    #[tokio::test]
    async fn test_tie_before_identify_is_rejected() {
        let mut transport = MockLineTransport::new();
        transport.expect_is_open().return_const(true);
        transport.expect_write().never();

        let matrix = MatrixSwitcher::new(Arc::new(transport));
        let err = matrix
            .map_input_to_output(1, 1, MappingType::All)
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(matrix.mappings().is_empty());
    }

    #[tokio::test]
    async fn test_queries_are_encoded() {
        let mut transport = MockLineTransport::new();
        transport.expect_is_open().return_const(true);
        transport
            .expect_write()
            .withf(|text| text == "Q" || text == "X" || text == "0*0!")
            .times(3)
            .returning(|_| Ok(()));

        let matrix = MatrixSwitcher::new(Arc::new(transport));
        matrix.query_firmware().await.unwrap();
        matrix.query_lock_mode().await.unwrap();
        matrix.map_input_to_output(0, 0, MappingType::All).await.unwrap();
        assert_eq!(matrix.lock_mode(), LockMode::None);
    }
}
