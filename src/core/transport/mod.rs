//! Serial transport
//!
//! Two seams separate the connection logic from the operating system:
//!
//! - [`SerialLink`]: an open port: bounded-timeout reads and raw writes
//! - [`PortBackend`]: opens links and discovers candidate devices
//!
//! [`SystemPorts`] implements both on top of the `serialport` crate.

mod serial;

pub use serial::{PortConfig, SerialParity, SystemLink, SystemPorts};

use std::fmt;
use std::io;
use thiserror::Error;

use crate::core::state_machine::InvalidTransition;

/// Why a port could not be acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// No such device
    NotFound,
    /// Permission denied
    AccessDenied,
    /// Device already in use
    Busy,
    /// Anything else the OS reported
    Other,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not found"),
            Self::AccessDenied => write!(f, "access denied"),
            Self::Busy => write!(f, "busy"),
            Self::Other => write!(f, "unavailable"),
        }
    }
}

/// Connection error types
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// A port is already open; close it first
    #[error("Port already open: {0}")]
    AlreadyOpen(String),

    /// The hardware port could not be acquired
    #[error("Port {port} {reason}: {detail}")]
    PortUnavailable {
        /// Device name
        port: String,
        /// Classified cause
        reason: UnavailableReason,
        /// OS error text
        detail: String,
    },

    /// Simulation is running; stop it before opening hardware
    #[error("Simulation is active, stop it first")]
    SimulationActive,

    /// Hardware is open; close it before simulating
    #[error("Hardware connection is open, close it first")]
    HardwareActive,

    /// No connection to write to
    #[error("Not connected")]
    NotConnected,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Device write failed
    #[error("Write failed: {0}")]
    WriteFailed(#[source] io::Error),

    /// Rejected state transition
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// Port enumeration failed
    #[error("Port discovery failed: {0}")]
    Discovery(String),

    /// Worker thread could not be started
    #[error("Failed to start worker: {0}")]
    WorkerSpawn(#[source] io::Error),
}

/// Failed read attempt
#[derive(Error, Debug)]
pub enum ReadFailure {
    /// No data arrived within the read timeout
    #[error("read timed out")]
    Timeout,

    /// The device reported an error
    #[error("{0}")]
    Device(io::Error),
}

impl From<io::Error> for ReadFailure {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => {
                Self::Timeout
            }
            _ => Self::Device(err),
        }
    }
}

/// An open serial link
#[cfg_attr(test, mockall::automock)]
pub trait SerialLink: Send {
    /// Read whatever is available, waiting at most the link's read timeout
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, ReadFailure>;

    /// Write raw bytes to the device
    fn write_bytes(&mut self, data: &[u8]) -> io::Result<usize>;
}

/// Opens links and discovers ports
#[cfg_attr(test, mockall::automock)]
pub trait PortBackend: Send + Sync {
    /// Acquire the port described by `config`
    fn open(&self, config: &PortConfig) -> Result<Box<dyn SerialLink>, ConnectionError>;

    /// Candidate device identifiers, in any order
    fn list_ports(&self) -> Result<Vec<String>, ConnectionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_failure_classification() {
        let timeout: ReadFailure = io::Error::new(io::ErrorKind::TimedOut, "t").into();
        assert!(matches!(timeout, ReadFailure::Timeout));

        let interrupted: ReadFailure = io::Error::new(io::ErrorKind::Interrupted, "i").into();
        assert!(matches!(interrupted, ReadFailure::Timeout));

        let broken: ReadFailure = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(broken, ReadFailure::Device(_)));
        assert_eq!(broken.to_string(), "gone");
    }

    #[test]
    fn test_error_messages() {
        let err = ConnectionError::PortUnavailable {
            port: "COM7".into(),
            reason: UnavailableReason::Busy,
            detail: "Access is denied.".into(),
        };
        assert_eq!(err.to_string(), "Port COM7 busy: Access is denied.");
        assert_eq!(
            ConnectionError::AlreadyOpen("COM3".into()).to_string(),
            "Port already open: COM3"
        );
    }
}
