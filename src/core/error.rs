//! Device-level error types

use super::transport::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by device operations
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Argument outside the device's current range; nothing was written
    #[error("{field} {value} out of range 0..={max}")]
    Validation {
        /// Parameter name
        field: &'static str,
        /// Rejected value
        value: i64,
        /// Largest accepted value
        max: u16,
    },

    /// Open requested while the transport or the read loop is still live
    #[error("Connection already open")]
    AlreadyOpen,

    /// Operation needs an open connection
    #[error("Connection not open")]
    NotOpen,

    /// Bootstrap did not finish in time
    #[error("Device not ready after {0:?}")]
    ReadyTimeout(Duration),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl DeviceError {
    /// Whether this is a rejected argument
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

/// Result alias for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Check `0 <= value <= max` and narrow to a port number
pub fn validate_range(field: &'static str, value: i32, max: u16) -> Result<u16> {
    match u16::try_from(value) {
        Ok(v) if v <= max => Ok(v),
        _ => Err(DeviceError::Validation {
            field,
            value: i64::from(value),
            max,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_range() {
        assert_eq!(validate_range("channel", 0, 4).unwrap(), 0);
        assert_eq!(validate_range("channel", 4, 4).unwrap(), 4);
        assert!(validate_range("channel", 5, 4).unwrap_err().is_validation());
        assert!(validate_range("channel", -1, 4).unwrap_err().is_validation());
    }

    #[test]
    fn test_validation_message() {
        let err = validate_range("output", 9, 4).unwrap_err();
        assert_eq!(err.to_string(), "output 9 out of range 0..=4");
    }
}
