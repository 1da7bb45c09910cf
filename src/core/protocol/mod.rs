//! Wire protocol support
//!
//! - Line framing over a raw byte stream
//! - Controller telemetry lines (`PV:`, `SP:`, status text)

pub mod framing;
pub mod telemetry;

pub use framing::{LineBuffer, DEFAULT_MAX_LINE_LENGTH};
pub use telemetry::{
    classify_line, parse_line, EmittedEvent, ParsedLine, TelemetryEvent, TelemetryField,
};
