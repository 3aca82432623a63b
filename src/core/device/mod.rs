//! Device front-ends
//!
//! Each device couples a [`DeviceConnection`](crate::core::connection::DeviceConnection)
//! with its protocol handler and exposes one method per control action.
//! Commands are fire-and-forget: they return once the command is written,
//! and the state changes when the device's answer is parsed.

pub mod matrix;
pub mod switcher;

pub use matrix::MatrixSwitcher;
pub use switcher::ChannelSwitcher;

use crate::core::error::{DeviceError, Result};
use crate::core::readiness::Readiness;
use std::time::Duration;

fn wait_blocking(readiness: &Readiness, timeout: Duration) -> Result<()> {
    if readiness.wait_timeout(timeout) {
        Ok(())
    } else {
        Err(DeviceError::ReadyTimeout(timeout))
    }
}

async fn wait_async(readiness: &Readiness, timeout: Duration) -> Result<()> {
    if readiness.wait_async(Some(timeout)).await {
        Ok(())
    } else {
        Err(DeviceError::ReadyTimeout(timeout))
    }
}
