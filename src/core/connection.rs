//! Connection management
//!
//! [`ConnectionManager`] is the single authority over the connection
//! lifecycle. It owns the port handle and the worker thread of whichever
//! mode is active, and publishes status changes on its [`EventBus`].
//!
//! Hardware and simulation are mutually exclusive: the active mode has to
//! be stopped before the other one can start. Open, close and the
//! simulation switches are serialized by one lock; status events are
//! published after that lock is released so observers may call back into
//! the manager.

use crate::core::event_bus::{EventBus, SubscriptionId, TelemetryObserver};
use crate::core::logger::Logger;
use crate::core::protocol::TelemetryEvent;
use crate::core::reader::{LinkSlot, LinkStats, ReaderLoop, ReaderSettings, SharedLink};
use crate::core::simulator::{SimulationConfig, SimulationGenerator};
use crate::core::state_machine::{ConnectionState, ConnectionStateMachine, StateTransition};
use crate::core::transport::{ConnectionError, PortBackend, PortConfig, SystemPorts};
use crate::core::worker::{StopResult, WorkerHandle};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const READER_THREAD: &str = "thermolink-reader";
const SIMULATION_THREAD: &str = "thermolink-sim";

/// Manager tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    /// How long close waits for a worker before releasing its resources
    pub close_timeout: Duration,
    /// Reader loop settings
    pub reader: ReaderSettings,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            close_timeout: Duration::from_millis(500),
            reader: ReaderSettings::default(),
        }
    }
}

/// Requested operating mode
#[derive(Debug, Clone, PartialEq)]
pub enum OperatingMode {
    /// Read from a hardware port
    Hardware(PortConfig),
    /// Generate synthetic telemetry
    Simulated(SimulationConfig),
}

/// Result of a close request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Nothing was open
    AlreadyClosed,
    /// The reader exited within the timeout
    Graceful,
    /// The reader missed the timeout; the port was released anyway
    TimedOut,
    /// Simulation is running; close leaves it alone
    Simulating,
}

/// Result of a write request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Bytes transmitted to the device
    Sent(usize),
    /// Accepted and logged, not transmitted
    Simulated,
}

enum Mode {
    Idle,
    Hardware {
        config: PortConfig,
        link: SharedLink,
        reader: WorkerHandle,
    },
    Simulated {
        config: SimulationConfig,
        generator: WorkerHandle,
    },
}

/// Connection manager
pub struct ConnectionManager {
    backend: Arc<dyn PortBackend>,
    bus: Arc<EventBus>,
    logger: Logger,
    settings: ManagerSettings,
    mode: Mutex<Mode>,
    machine: RwLock<ConnectionStateMachine>,
    stats: Arc<RwLock<LinkStats>>,
    shut_down: AtomicBool,
}

impl ConnectionManager {
    /// Create a manager over an arbitrary port backend
    pub fn new(backend: Arc<dyn PortBackend>, logger: Logger, settings: ManagerSettings) -> Self {
        Self {
            backend,
            bus: Arc::new(EventBus::new()),
            logger,
            settings,
            mode: Mutex::new(Mode::Idle),
            machine: RwLock::new(ConnectionStateMachine::new()),
            stats: Arc::new(RwLock::new(LinkStats::default())),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Create a manager using the operating system's serial ports
    pub fn with_system_ports(logger: Logger, settings: ManagerSettings) -> Self {
        Self::new(Arc::new(SystemPorts), logger, settings)
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.machine.read().state()
    }

    /// Link statistics for the current or last hardware connection
    pub fn stats(&self) -> LinkStats {
        self.stats.read().clone()
    }

    /// Recent state transitions, oldest first
    pub fn transitions(&self) -> Vec<StateTransition> {
        self.machine.read().history()
    }

    /// Configuration of the open port, if any
    pub fn port_config(&self) -> Option<PortConfig> {
        match &*self.mode.lock() {
            Mode::Hardware { config, .. } => Some(config.clone()),
            _ => None,
        }
    }

    /// Configuration of the running simulation, if any
    pub fn simulation_config(&self) -> Option<SimulationConfig> {
        match &*self.mode.lock() {
            Mode::Simulated { config, .. } => Some(config.clone()),
            _ => None,
        }
    }

    /// Event bus carrying telemetry and status events
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Register an observer on the event bus
    pub fn subscribe<O>(&self, observer: &Arc<O>) -> SubscriptionId
    where
        O: TelemetryObserver + 'static,
    {
        self.bus.subscribe(observer)
    }

    /// Remove an observer from the event bus
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Session logger
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Candidate serial devices, sorted
    pub fn list_ports(&self) -> Result<Vec<String>, ConnectionError> {
        let mut ports = self.backend.list_ports()?;
        ports.sort();
        ports.dedup();
        Ok(ports)
    }

    /// Open a hardware port and start reading from it
    pub fn open(&self, config: PortConfig) -> Result<(), ConnectionError> {
        config.validate()?;

        let result = {
            let mut mode = self.mode.lock();
            match &*mode {
                Mode::Hardware { config: current, .. } => {
                    return Err(ConnectionError::AlreadyOpen(current.port.clone()));
                }
                Mode::Simulated { .. } => return Err(ConnectionError::SimulationActive),
                Mode::Idle => {}
            }
            self.acquire(&mut mode, config)
        };

        match result {
            Ok(status) => {
                self.publish_status(status);
                Ok(())
            }
            Err(e) => {
                self.publish_status(format!("Open failed: {}", e));
                Err(e)
            }
        }
    }

    fn acquire(&self, mode: &mut Mode, config: PortConfig) -> Result<String, ConnectionError> {
        let link = match self.backend.open(&config) {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!("Failed to open {}: {}", config.port, e);
                self.logger.log(format!("OPEN FAILED {}: {}", config.port, e));
                return Err(e);
            }
        };

        let link = LinkSlot::new(link);
        *self.stats.write() = LinkStats::default();
        let reader = ReaderLoop::new(
            link.clone(),
            self.bus.clone(),
            self.logger.clone(),
            self.stats.clone(),
            &self.settings.reader,
        );

        self.machine
            .write()
            .transition(ConnectionState::Open, &format!("opened {}", config.port))?;

        let reader = match WorkerHandle::spawn(READER_THREAD, move |stop| reader.run(stop)) {
            Ok(handle) => handle,
            Err(e) => {
                self.set_state(ConnectionState::Closed, "reader failed to start");
                self.logger.log(format!("OPEN FAILED {}: {}", config.port, e));
                return Err(ConnectionError::WorkerSpawn(e));
            }
        };

        tracing::info!("Opened {}", config.describe());
        self.logger
            .log(format!("OPEN {} {}", config.port, config.baud_rate));
        let status = format!("Open: {} @ {}", config.port, config.baud_rate);

        *mode = Mode::Hardware {
            config,
            link,
            reader,
        };
        Ok(status)
    }

    /// Close the hardware port
    ///
    /// Signals the reader and waits up to the close timeout, then releases
    /// the port whether or not the reader acknowledged. Never blocks longer
    /// than the close timeout; a read still in flight drops the handle when
    /// it returns.
    pub fn close(&self) -> CloseOutcome {
        let (outcome, status) = {
            let mut mode = self.mode.lock();
            match std::mem::replace(&mut *mode, Mode::Idle) {
                Mode::Idle => {
                    self.logger.log("CLOSED");
                    (CloseOutcome::AlreadyClosed, "Closed")
                }
                simulated @ Mode::Simulated { .. } => {
                    *mode = simulated;
                    (CloseOutcome::Simulating, "Simulation mode -> nothing to close")
                }
                Mode::Hardware {
                    config,
                    link,
                    reader,
                } => {
                    let deadline = Instant::now() + self.settings.close_timeout;
                    let outcome = match reader.stop(self.settings.close_timeout) {
                        StopResult::Joined => CloseOutcome::Graceful,
                        StopResult::Detached => CloseOutcome::TimedOut,
                    };
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if !link.release(remaining) {
                        tracing::warn!(
                            "Read in progress on {}, port released when it returns",
                            config.port
                        );
                    }

                    self.set_state(ConnectionState::Closed, "closed");
                    tracing::info!("Closed {} ({:?})", config.port, outcome);
                    self.logger.log("CLOSED");
                    (outcome, "Closed")
                }
            }
        };

        self.publish_status(status);
        outcome
    }

    /// Start the simulation generator
    pub fn start_simulation(&self, config: SimulationConfig) -> Result<(), ConnectionError> {
        config.validate()?;

        {
            let mut mode = self.mode.lock();
            match &*mode {
                Mode::Hardware { .. } => return Err(ConnectionError::HardwareActive),
                Mode::Simulated { .. } => return Err(ConnectionError::SimulationActive),
                Mode::Idle => {}
            }

            self.machine
                .write()
                .transition(ConnectionState::Simulating, "simulation started")?;

            let generator = SimulationGenerator::new(config.clone());
            let bus = self.bus.clone();
            let logger = self.logger.clone();
            let handle = WorkerHandle::spawn(SIMULATION_THREAD, move |stop| {
                generator.run(bus, logger, stop)
            });
            let generator = match handle {
                Ok(handle) => handle,
                Err(e) => {
                    self.set_state(ConnectionState::Closed, "generator failed to start");
                    return Err(ConnectionError::WorkerSpawn(e));
                }
            };

            tracing::info!("Simulation started, interval {} ms", config.interval_ms);
            *mode = Mode::Simulated { config, generator };
        }

        self.publish_status("Simulation started");
        Ok(())
    }

    /// Stop the simulation generator
    ///
    /// Returns false, without emitting anything, when no simulation is running.
    pub fn stop_simulation(&self) -> bool {
        {
            let mut mode = self.mode.lock();
            let generator = match std::mem::replace(&mut *mode, Mode::Idle) {
                Mode::Simulated { generator, .. } => generator,
                other => {
                    *mode = other;
                    return false;
                }
            };

            if generator.stop(self.settings.close_timeout) == StopResult::Detached {
                tracing::warn!("Simulation generator did not stop in time");
            }
            self.set_state(ConnectionState::Closed, "simulation stopped");
            tracing::info!("Simulation stopped");
        }

        self.publish_status("Simulation stopped");
        true
    }

    /// Switch into the requested mode
    pub fn activate(&self, mode: OperatingMode) -> Result<(), ConnectionError> {
        match mode {
            OperatingMode::Hardware(config) => self.open(config),
            OperatingMode::Simulated(config) => self.start_simulation(config),
        }
    }

    /// Send raw text to the device
    pub fn write(&self, text: &str) -> Result<WriteOutcome, ConnectionError> {
        let link = match &*self.mode.lock() {
            Mode::Idle => return Err(ConnectionError::NotConnected),
            Mode::Simulated { .. } => {
                self.logger.log(format!("[SIM WRITE] {}", text));
                return Ok(WriteOutcome::Simulated);
            }
            Mode::Hardware { link, .. } => link.clone(),
        };

        let result = {
            let Some(mut guard) = link.lock() else {
                return Err(ConnectionError::NotConnected);
            };
            match guard.as_mut() {
                Some(link) => link.write_bytes(text.as_bytes()),
                None => return Err(ConnectionError::NotConnected),
            }
        };

        match result {
            Ok(sent) => {
                self.stats.write().bytes_sent += sent as u64;
                self.logger.log(format!("TX: {}", text));
                Ok(WriteOutcome::Sent(sent))
            }
            Err(e) => {
                tracing::warn!("Write failed: {}", e);
                self.publish_status(format!("Write err: {}", e));
                self.logger.log(format!("TXERR: {}", e));
                Err(ConnectionError::WriteFailed(e))
            }
        }
    }

    /// Stop the active worker and close the session log
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        match self.state() {
            ConnectionState::Open => {
                self.close();
            }
            ConnectionState::Simulating => {
                self.stop_simulation();
            }
            ConnectionState::Closed => {}
        }
        self.logger.close();
        tracing::debug!("Connection manager shut down");
    }

    fn set_state(&self, to: ConnectionState, reason: &str) {
        if let Err(e) = self.machine.write().transition(to, reason) {
            tracing::error!("{}", e);
        }
    }

    fn publish_status(&self, text: impl Into<String>) {
        self.bus.publish(TelemetryEvent::StatusChange(text.into()));
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
