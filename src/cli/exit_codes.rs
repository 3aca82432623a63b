//! Process exit codes
//!
//! Scripts driving a switcher branch on these, so the numbers never change
//! once assigned.

use crate::config::ConfigError;
use crate::core::error::DeviceError;
use crate::core::transport::TransportError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Command completed
    pub const SUCCESS: u8 = 0;
    /// Unclassified failure
    pub const ERROR: u8 = 1;
    /// Command not applicable to the configured device
    pub const INVALID_ARGS: u8 = 2;
    /// Transport could not be opened or dropped
    pub const CONNECTION_FAILED: u8 = 3;
    /// Device never became ready, or a read timed out
    pub const TIMEOUT: u8 = 4;
    /// Port exists but cannot be opened by this user
    pub const PERMISSION_DENIED: u8 = 7;
    /// Config file unreadable or invalid
    pub const CONFIG_ERROR: u8 = 8;
    /// Device answered with an error code
    pub const PROTOCOL_ERROR: u8 = 9;
    /// Connection already open
    pub const DEVICE_BUSY: u8 = 13;
    /// Serial port does not exist
    pub const PORT_NOT_FOUND: u8 = 14;
    /// Channel, input or output outside the device's range
    pub const VALIDATION_FAILED: u8 = 17;
    /// Bug
    pub const INTERNAL_ERROR: u8 = 127;
}

const DESCRIPTIONS: &[(u8, &str)] = &[
    (ExitCodes::SUCCESS, "Success"),
    (ExitCodes::ERROR, "General error"),
    (ExitCodes::INVALID_ARGS, "Command not supported by this device"),
    (ExitCodes::CONNECTION_FAILED, "Connection failed"),
    (ExitCodes::TIMEOUT, "Device not ready in time"),
    (ExitCodes::PERMISSION_DENIED, "Permission denied"),
    (ExitCodes::CONFIG_ERROR, "Configuration error"),
    (ExitCodes::PROTOCOL_ERROR, "Device reported an error"),
    (ExitCodes::DEVICE_BUSY, "Device busy"),
    (ExitCodes::PORT_NOT_FOUND, "Port not found"),
    (ExitCodes::VALIDATION_FAILED, "Argument out of range"),
    (ExitCodes::INTERNAL_ERROR, "Internal error"),
];

/// Outcome of one CLI invocation
#[derive(Debug)]
pub enum CliResult {
    /// Finished, with an optional note
    Success(Option<String>),
    /// Failed with an exit code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Failure with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Exit code for this outcome
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Attached message, if any
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Convert to a process `ExitCode`
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Whether the command succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<&TransportError> for CliResult {
    fn from(err: &TransportError) -> Self {
        let code = match err {
            TransportError::Timeout(_) => ExitCodes::TIMEOUT,
            TransportError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
            TransportError::PermissionDenied(_) => ExitCodes::PERMISSION_DENIED,
            TransportError::ConfigError(_) => ExitCodes::CONFIG_ERROR,
            _ => ExitCodes::CONNECTION_FAILED,
        };
        Self::error(code, err.to_string())
    }
}

impl From<&DeviceError> for CliResult {
    fn from(err: &DeviceError) -> Self {
        let code = match err {
            DeviceError::Validation { .. } => ExitCodes::VALIDATION_FAILED,
            DeviceError::AlreadyOpen => ExitCodes::DEVICE_BUSY,
            DeviceError::NotOpen => ExitCodes::CONNECTION_FAILED,
            DeviceError::ReadyTimeout(_) => ExitCodes::TIMEOUT,
            DeviceError::Transport(inner) => return Self::from(inner),
        };
        Self::error(code, err.to_string())
    }
}

impl From<&ConfigError> for CliResult {
    fn from(err: &ConfigError) -> Self {
        Self::error(ExitCodes::CONFIG_ERROR, err.to_string())
    }
}

/// Human-readable meaning of an exit code
pub fn exit_code_description(code: u8) -> &'static str {
    DESCRIPTIONS
        .iter()
        .find(|(known, _)| *known == code)
        .map_or("Unknown error", |&(_, text)| text)
}

/// Print the exit code table to stdout
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for (code, text) in DESCRIPTIONS {
        println!("  {code:>3}  {text}");
    }
}
