//! Core module containing the device communication engine
//!
//! This module provides:
//! - Line transports (serial, TCP, simulated)
//! - Connection lifecycle with reader and dispatcher workers
//! - FIFO response correlation
//! - Linear-channel and matrix-tie protocol parsers
//! - Device state and tie table stores
//! - Readiness gating and error callbacks
//! - Bounded traffic history

pub mod callbacks;
pub mod connection;
pub mod correlator;
pub mod device;
pub mod error;
pub mod history;
pub mod protocol;
pub mod readiness;
pub mod simulator;
pub mod state;
pub mod transport;
