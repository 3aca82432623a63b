//! # Switchlink Core Library
//!
//! Control library for AV switchers that speak short ASCII line protocols:
//! - Linear channel switchers with an attached projector controller
//! - Matrix crosspoint switchers with per-output video and audio ties
//!
//! ## Features
//!
//! - Serial and TCP transports, plus simulated devices for testing
//! - Background reader and dispatcher workers per connection
//! - FIFO correlation of responses with the commands that caused them
//! - Readiness gating after identification and tie bootstrap
//! - Device error codes delivered to registered callbacks
//! - CLI exit codes and JSON/text output
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use switchlink_core::{MappingType, MatrixSwitcher, TcpConfig, Transport};
//! use switchlink_core::core::transport::create_transport;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let transport = create_transport(Transport::Tcp(TcpConfig::new("192.168.254.254", 23)));
//!     let matrix = MatrixSwitcher::new(transport);
//!     matrix.register_error_callback(|msg| eprintln!("device error: {msg}"));
//!
//!     matrix.open_connection().await?;
//!     matrix.wait_until_ready_async_timeout(Duration::from_secs(10)).await?;
//!
//!     matrix.map_input_to_output(3, 2, MappingType::Video).await?;
//!     println!("{:?}", matrix.mappings());
//!
//!     matrix.close_connection().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{AppConfig, DeviceKind, DeviceProfile};
pub use crate::core::connection::{ConnectionSettings, ConnectionState};
pub use crate::core::device::{ChannelSwitcher, MatrixSwitcher};
pub use crate::core::error::DeviceError;
pub use crate::core::history::{Direction, TrafficEntry};
pub use crate::core::simulator::{SimulatedMatrix, SimulatedSwitcher};
pub use crate::core::state::{LockMode, MappingType, OutputTie, SwitcherSnapshot, VideoType};
pub use crate::core::transport::{
    LineTransport, SerialConfig, SerialFlowControl, TcpConfig, Transport, TransportError,
    TransportType,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
