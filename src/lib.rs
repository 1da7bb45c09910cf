//! # Thermolink Core Library
//!
//! Serial telemetry bridge for thermal process controllers.
//!
//! ## Features
//!
//! - Line-oriented ASCII protocol (`PV:<value>`, `SP:<value>`, status text)
//! - Background reader with error backoff and bounded shutdown
//! - Synthetic data generator when no hardware is attached
//! - Ordered observer fan-out with per-observer fault isolation
//! - Timestamped session log, flushed after every record
//! - CLI with exit codes and text/JSON output
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use thermolink_core::{
//!     ConnectionManager, FnObserver, ManagerSettings, PortConfig, SessionLogger, TelemetryEvent,
//! };
//!
//! fn main() -> anyhow::Result<()> {
//!     let logger = SessionLogger::create(std::path::Path::new("logs"), "serial")?.shared();
//!     let manager = ConnectionManager::with_system_ports(logger, ManagerSettings::default());
//!
//!     let printer = Arc::new(FnObserver(|event: &TelemetryEvent| println!("{}", event)));
//!     manager.subscribe(&printer);
//!
//!     manager.open(PortConfig::new("COM3", 9600))?;
//!     std::thread::sleep(std::time::Duration::from_secs(10));
//!     manager.close();
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
pub use crate::config::{AppConfig, ConfigError};
pub use crate::core::connection::{
    CloseOutcome, ConnectionManager, ManagerSettings, OperatingMode, WriteOutcome,
};
pub use crate::core::event_bus::{
    DeliveryReport, EventBus, FnObserver, SubscriptionId, TelemetryObserver,
};
pub use crate::core::logger::{LogRecord, LogWriteError, Logger, SessionLogger};
pub use crate::core::protocol::{parse_line, EmittedEvent, LineBuffer, TelemetryEvent};
pub use crate::core::reader::{LinkStats, ReaderSettings};
pub use crate::core::simulator::{SimulationConfig, SimulationGenerator};
pub use crate::core::state_machine::{ConnectionState, StateTransition};
pub use crate::core::transport::{
    ConnectionError, PortBackend, PortConfig, ReadFailure, SerialLink, SerialParity,
    SystemPorts, UnavailableReason,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
