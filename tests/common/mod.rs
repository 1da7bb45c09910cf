//! In-memory serial device shared by the integration tests

#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thermolink_core::{
    ConnectionError, ConnectionManager, FnObserver, PortBackend, PortConfig, ReadFailure, SerialLink,
    TelemetryEvent, TelemetryObserver, UnavailableReason,
};

/// Device side of a fake port: feed bytes in, inspect what was written
#[derive(Clone)]
pub struct FakeDevice {
    incoming: Sender<Vec<u8>>,
    written: Arc<Mutex<Vec<u8>>>,
}

impl FakeDevice {
    /// Queue bytes for the reader
    pub fn feed(&self, bytes: &[u8]) {
        let _ = self.incoming.send(bytes.to_vec());
    }

    /// Everything written by the host so far
    pub fn written(&self) -> Vec<u8> {
        self.written.lock().clone()
    }
}

struct FakeLink {
    incoming: Receiver<Vec<u8>>,
    written: Arc<Mutex<Vec<u8>>>,
    read_timeout: Duration,
}

impl SerialLink for FakeLink {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, ReadFailure> {
        match self.incoming.recv_timeout(self.read_timeout) {
            Ok(bytes) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                Ok(n)
            }
            Err(_) => Err(ReadFailure::Timeout),
        }
    }

    fn write_bytes(&mut self, data: &[u8]) -> io::Result<usize> {
        self.written.lock().extend_from_slice(data);
        Ok(data.len())
    }
}

/// Backend exposing a fixed set of fake ports
pub struct FakeBackend {
    ports: Vec<String>,
    device: FakeDevice,
    incoming: Receiver<Vec<u8>>,
}

impl FakeBackend {
    /// Backend with the given port names; every port talks to the same device
    pub fn new(ports: &[&str]) -> (Self, FakeDevice) {
        let (tx, rx) = unbounded();
        let device = FakeDevice {
            incoming: tx,
            written: Arc::new(Mutex::new(Vec::new())),
        };
        let backend = Self {
            ports: ports.iter().map(|p| p.to_string()).collect(),
            device: device.clone(),
            incoming: rx,
        };
        (backend, device)
    }
}

impl PortBackend for FakeBackend {
    fn open(&self, config: &PortConfig) -> Result<Box<dyn SerialLink>, ConnectionError> {
        if !self.ports.contains(&config.port) {
            return Err(ConnectionError::PortUnavailable {
                port: config.port.clone(),
                reason: UnavailableReason::NotFound,
                detail: "no such device".into(),
            });
        }
        Ok(Box::new(FakeLink {
            incoming: self.incoming.clone(),
            written: self.device.written.clone(),
            read_timeout: config.read_timeout_duration(),
        }))
    }

    fn list_ports(&self) -> Result<Vec<String>, ConnectionError> {
        Ok(self.ports.clone())
    }
}

/// Collected events plus the observer keeping the subscription alive
pub struct Recorder {
    pub events: Arc<Mutex<Vec<TelemetryEvent>>>,
    pub observer: Arc<dyn TelemetryObserver>,
}

impl Recorder {
    /// Subscribe a new recorder to the manager's bus
    pub fn attach(manager: &ConnectionManager) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let observer = Arc::new(FnObserver(move |e: &TelemetryEvent| sink.lock().push(e.clone())));
        manager.subscribe(&observer);
        Self { events, observer }
    }

    pub fn snapshot(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter_map(|e| match e {
                TelemetryEvent::StatusChange(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Wait until `predicate` holds for the collected events
    pub fn wait_for<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&[TelemetryEvent]) -> bool,
    {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if predicate(&self.events.lock()) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        predicate(&self.events.lock())
    }
}
