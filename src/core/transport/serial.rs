//! Serial port transport implementation

use super::{ConnectionError, PortBackend, ReadFailure, SerialLink, UnavailableReason};
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Serial port parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    /// No parity
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

impl std::str::FromStr for SerialParity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "n" => Ok(Self::None),
            "odd" | "o" => Ok(Self::Odd),
            "even" | "e" => Ok(Self::Even),
            other => Err(format!("unknown parity '{}'", other)),
        }
    }
}

fn default_port() -> String {
    if cfg!(windows) {
        "COM1".to_string()
    } else {
        "/dev/ttyUSB0".to_string()
    }
}

/// Serial port configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Port name (e.g., COM3, /dev/ttyUSB0)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Write timeout in milliseconds
    pub write_timeout_ms: u64,
}

impl PortConfig {
    /// Create a configuration with 8N1 framing and default timeouts
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            read_timeout_ms: 100,
            write_timeout_ms: 1000,
        }
    }

    /// Set data bits
    #[must_use]
    pub fn data_bits(mut self, bits: u8) -> Self {
        self.data_bits = bits;
        self
    }

    /// Set stop bits
    #[must_use]
    pub fn stop_bits(mut self, bits: u8) -> Self {
        self.stop_bits = bits;
        self
    }

    /// Set parity
    #[must_use]
    pub fn parity(mut self, parity: SerialParity) -> Self {
        self.parity = parity;
        self
    }

    /// Set the read timeout
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the write timeout
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Read timeout as a duration
    pub fn read_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Write timeout as a duration
    pub fn write_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Check the configuration before any port is touched
    pub fn validate(&self) -> Result<(), ConnectionError> {
        let invalid = |msg: String| Err(ConnectionError::InvalidConfig(msg));

        if self.port.trim().is_empty() {
            return invalid("port name is empty".into());
        }
        if self.baud_rate == 0 {
            return invalid("baud rate must be positive".into());
        }
        if !(5..=8).contains(&self.data_bits) {
            return invalid(format!("data bits must be 5-8, got {}", self.data_bits));
        }
        if !matches!(self.stop_bits, 1 | 2) {
            return invalid(format!("stop bits must be 1 or 2, got {}", self.stop_bits));
        }
        if self.read_timeout_ms == 0 || self.write_timeout_ms == 0 {
            return invalid("timeouts must be non-zero".into());
        }
        Ok(())
    }

    /// Short description, e.g. `COM3 @ 9600 baud (8N1)`
    pub fn describe(&self) -> String {
        format!(
            "{} @ {} baud ({}{}{})",
            self.port,
            self.baud_rate,
            self.data_bits,
            match self.parity {
                SerialParity::None => "N",
                SerialParity::Odd => "O",
                SerialParity::Even => "E",
            },
            self.stop_bits,
        )
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self::new(&default_port(), 9600)
    }
}

/// Classify an open failure
fn classify_open_error(port: &str, err: &serialport::Error) -> ConnectionError {
    let reason = match err.kind() {
        serialport::ErrorKind::NoDevice => UnavailableReason::NotFound,
        serialport::ErrorKind::Io(io::ErrorKind::NotFound) => UnavailableReason::NotFound,
        serialport::ErrorKind::Io(io::ErrorKind::PermissionDenied) => {
            UnavailableReason::AccessDenied
        }
        serialport::ErrorKind::Io(io::ErrorKind::AddrInUse) => UnavailableReason::Busy,
        _ if err.description.to_lowercase().contains("busy") => UnavailableReason::Busy,
        _ => UnavailableReason::Other,
    };

    ConnectionError::PortUnavailable {
        port: port.to_string(),
        reason,
        detail: err.description.clone(),
    }
}

/// Link backed by an OS serial port
pub struct SystemLink {
    port: Box<dyn SerialPort>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl SerialLink for SystemLink {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, ReadFailure> {
        self.port.read(buf).map_err(ReadFailure::from)
    }

    fn write_bytes(&mut self, data: &[u8]) -> io::Result<usize> {
        // serialport has a single timeout shared by reads and writes
        self.port.set_timeout(self.write_timeout)?;
        let result = self
            .port
            .write_all(data)
            .and_then(|()| self.port.flush())
            .map(|()| data.len());
        self.port.set_timeout(self.read_timeout)?;
        result
    }
}

/// Backend using the operating system's serial ports
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPorts;

impl PortBackend for SystemPorts {
    fn open(&self, config: &PortConfig) -> Result<Box<dyn SerialLink>, ConnectionError> {
        let data_bits = match config.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        };

        let stop_bits = match config.stop_bits {
            2 => StopBits::Two,
            _ => StopBits::One,
        };

        let parity = match config.parity {
            SerialParity::Odd => Parity::Odd,
            SerialParity::Even => Parity::Even,
            SerialParity::None => Parity::None,
        };

        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(FlowControl::None)
            .timeout(config.read_timeout_duration())
            .open()
            .map_err(|e| classify_open_error(&config.port, &e))?;

        Ok(Box::new(SystemLink {
            port,
            read_timeout: config.read_timeout_duration(),
            write_timeout: config.write_timeout_duration(),
        }))
    }

    fn list_ports(&self) -> Result<Vec<String>, ConnectionError> {
        match serialport::available_ports() {
            Ok(ports) => Ok(ports.into_iter().map(|p| p.port_name).collect()),
            Err(e) => {
                tracing::error!("Failed to enumerate serial ports: {}", e);
                Err(ConnectionError::Discovery(e.to_string()))
            }
        }
    }
}
