//! CLI Exit Codes
//!
//! Standard exit codes for CLI operations and automation.

use crate::config::ConfigError;
use crate::core::transport::{ConnectionError, UnavailableReason};
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Connection failed
    pub const CONNECTION_FAILED: u8 = 3;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 7;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Device busy
    pub const DEVICE_BUSY: u8 = 13;

    /// Port not found
    pub const PORT_NOT_FOUND: u8 = 14;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Error with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<&ConnectionError> for CliResult {
    fn from(err: &ConnectionError) -> Self {
        let code = match err {
            ConnectionError::PortUnavailable { reason, .. } => match reason {
                UnavailableReason::NotFound => ExitCodes::PORT_NOT_FOUND,
                UnavailableReason::AccessDenied => ExitCodes::PERMISSION_DENIED,
                UnavailableReason::Busy => ExitCodes::DEVICE_BUSY,
                UnavailableReason::Other => ExitCodes::CONNECTION_FAILED,
            },
            ConnectionError::InvalidConfig(_) => ExitCodes::INVALID_ARGS,
            ConnectionError::AlreadyOpen(_)
            | ConnectionError::SimulationActive
            | ConnectionError::HardwareActive
            | ConnectionError::NotConnected
            | ConnectionError::WriteFailed(_) => ExitCodes::CONNECTION_FAILED,
            ConnectionError::InvalidTransition(_)
            | ConnectionError::Discovery(_)
            | ConnectionError::WorkerSpawn(_) => ExitCodes::ERROR,
        };

        Self::Error(code, err.to_string())
    }
}

impl From<&ConfigError> for CliResult {
    fn from(err: &ConfigError) -> Self {
        Self::Error(ExitCodes::CONFIG_ERROR, err.to_string())
    }
}

impl From<&anyhow::Error> for CliResult {
    fn from(err: &anyhow::Error) -> Self {
        if let Some(e) = err.downcast_ref::<ConnectionError>() {
            return e.into();
        }
        if let Some(e) = err.downcast_ref::<ConfigError>() {
            return e.into();
        }
        Self::Error(ExitCodes::ERROR, format!("{:#}", err))
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "Connection failed",
        7 => "Permission denied",
        8 => "Configuration error",
        13 => "Device busy",
        14 => "Port not found",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in [0, 1, 2, 3, 7, 8, 13, 14] {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}
