//! Serial reader loop
//!
//! Runs on a worker thread while a hardware connection is open. Each cycle
//! makes one bounded-timeout read, reassembles lines and publishes the
//! parsed telemetry. Device errors are reported and retried after a
//! backoff; the loop only ends when stopped or when the port handle has
//! been released by a forced close.

use crate::core::event_bus::EventBus;
use crate::core::logger::Logger;
use crate::core::protocol::{classify_line, LineBuffer, ParsedLine, TelemetryEvent};
use crate::core::transport::{ReadFailure, SerialLink};
use crate::core::worker::StopSignal;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Port handle shared between the connection manager and its reader
pub type SharedLink = Arc<LinkSlot>;

/// Slot holding an open port until it is released
///
/// The reader keeps the slot locked for the duration of a read. Once the
/// released flag is set the handle is dropped by whichever side holds the
/// lock next, so a release never waits on a read in progress.
pub struct LinkSlot {
    handle: Mutex<Option<Box<dyn SerialLink>>>,
    released: AtomicBool,
}

impl LinkSlot {
    /// Wrap an open link
    pub fn new(link: Box<dyn SerialLink>) -> SharedLink {
        Arc::new(Self {
            handle: Mutex::new(Some(link)),
            released: AtomicBool::new(false),
        })
    }

    /// Mark the link released and drop it if the lock frees up within `wait`
    ///
    /// Returns false when a read still holds the handle; the reader drops it
    /// as soon as that read returns.
    pub fn release(&self, wait: Duration) -> bool {
        self.released.store(true, Ordering::SeqCst);
        match self.handle.try_lock_for(wait) {
            Some(mut guard) => {
                drop(guard.take());
                true
            }
            None => false,
        }
    }

    /// Has the link been released?
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Lock the handle, or `None` once released
    pub fn lock(&self) -> Option<MutexGuard<'_, Option<Box<dyn SerialLink>>>> {
        if self.is_released() {
            return None;
        }
        let mut guard = self.handle.lock();
        if self.is_released() {
            drop(guard.take());
            return None;
        }
        guard.is_some().then_some(guard)
    }
}

/// Reader tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderSettings {
    /// Pause after a device read error
    pub backoff: Duration,
    /// Size of a single read
    pub chunk_size: usize,
    /// Longest unterminated line kept before it is flushed
    pub max_line_length: usize,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            backoff: Duration::from_millis(200),
            chunk_size: 1024,
            max_line_length: crate::core::protocol::DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

/// Link statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStats {
    /// Bytes received
    pub bytes_received: u64,
    /// Bytes sent
    pub bytes_sent: u64,
    /// Non-empty lines received
    pub lines_received: u64,
    /// Device read errors
    pub read_errors: u64,
}

/// Outcome of one read cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cycle {
    Continue,
    Backoff,
    Released,
}

/// Reader loop state
pub struct ReaderLoop {
    link: SharedLink,
    buffer: LineBuffer,
    scratch: Vec<u8>,
    bus: Arc<EventBus>,
    logger: Logger,
    stats: Arc<RwLock<LinkStats>>,
    backoff: Duration,
}

impl ReaderLoop {
    /// Create a reader over a shared link
    pub fn new(
        link: SharedLink,
        bus: Arc<EventBus>,
        logger: Logger,
        stats: Arc<RwLock<LinkStats>>,
        settings: &ReaderSettings,
    ) -> Self {
        Self {
            link,
            buffer: LineBuffer::with_max_line_length(settings.max_line_length),
            scratch: vec![0u8; settings.chunk_size.max(1)],
            bus,
            logger,
            stats,
            backoff: settings.backoff,
        }
    }

    /// Run until stopped or until the link is released
    pub fn run(mut self, stop: StopSignal) {
        tracing::debug!("Reader started");
        loop {
            if stop.is_requested() {
                break;
            }
            match self.cycle() {
                Cycle::Continue => {}
                Cycle::Backoff => {
                    if stop.wait(self.backoff) {
                        break;
                    }
                }
                Cycle::Released => {
                    tracing::debug!("Port handle released, reader exiting");
                    break;
                }
            }
        }
        tracing::debug!("Reader stopped");
    }

    fn cycle(&mut self) -> Cycle {
        let result = {
            let Some(mut guard) = self.link.lock() else {
                return Cycle::Released;
            };
            let result = match guard.as_mut() {
                Some(link) => link.read_chunk(&mut self.scratch),
                None => return Cycle::Released,
            };
            if self.link.is_released() {
                // Closed while the read was in flight
                drop(guard.take());
                return Cycle::Released;
            }
            result
        };

        match result {
            Ok(0) | Err(ReadFailure::Timeout) => Cycle::Continue,
            Ok(n) => {
                self.handle_chunk(n);
                Cycle::Continue
            }
            Err(ReadFailure::Device(e)) => {
                self.stats.write().read_errors += 1;
                tracing::warn!("Serial read error: {}", e);
                self.bus
                    .publish(TelemetryEvent::StatusChange(format!("Serial Read Error: {}", e)));
                self.logger.log(format!("ERR: {}", e));
                Cycle::Backoff
            }
        }
    }

    fn handle_chunk(&mut self, n: usize) {
        let chunk = &self.scratch[..n];
        self.stats.write().bytes_received += n as u64;
        self.logger
            .log(format!("RX: {}", String::from_utf8_lossy(chunk)));

        let lines = self.buffer.push(chunk);
        for line in lines {
            self.dispatch_line(&line);
        }
    }

    fn dispatch_line(&self, line: &[u8]) {
        let text = String::from_utf8_lossy(line);

        match classify_line(&text) {
            ParsedLine::Event(event) => {
                self.stats.write().lines_received += 1;
                self.bus.publish(event);
            }
            ParsedLine::Malformed { field, payload } => {
                self.stats.write().lines_received += 1;
                tracing::debug!("Dropping {} line with payload {:?}", field.prefix(), payload);
            }
            ParsedLine::Blank => {}
        }
    }
}
