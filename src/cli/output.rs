//! Event output for the command line
//!
//! Renders telemetry events as text lines or JSON objects on a writer.

use crate::core::event_bus::TelemetryObserver;
use crate::core::protocol::{EmittedEvent, TelemetryEvent};
use parking_lot::Mutex;
use std::io::{self, Write};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Format one event
pub fn format_event(emitted: &EmittedEvent, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let stamp = emitted.timestamp.format("%H:%M:%S%.3f");
            match &emitted.event {
                TelemetryEvent::PvUpdate(v) => format!("{}  PV      {}", stamp, v),
                TelemetryEvent::SpUpdate(v) => format!("{}  SP      {}", stamp, v),
                TelemetryEvent::StatusChange(text) => format!("{}  STATUS  {}", stamp, text),
            }
        }
        OutputFormat::Json => serde_json::to_string(emitted)
            .unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e)),
    }
}

/// Observer printing every event on a writer
pub struct EventPrinter {
    out: Mutex<Box<dyn Write + Send>>,
    format: OutputFormat,
}

impl EventPrinter {
    /// Print to stdout
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(Box::new(io::stdout()), format)
    }

    /// Print to an arbitrary writer
    pub fn new(out: Box<dyn Write + Send>, format: OutputFormat) -> Self {
        Self {
            out: Mutex::new(out),
            format,
        }
    }
}

impl TelemetryObserver for EventPrinter {
    fn on_event(&self, event: &TelemetryEvent) {
        let line = format_event(&EmittedEvent::now(event.clone()), self.format);
        let mut out = self.out.lock();
        // A closed pipe must not take the reader down
        let _ = writeln!(out, "{}", line).and_then(|()| out.flush());
    }
}
