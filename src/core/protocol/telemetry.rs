//! Controller telemetry protocol
//!
//! The controller speaks plain ASCII lines:
//!
//! - `PV:<decimal>`: process value (measured temperature)
//! - `SP:<decimal>`: set point
//! - anything else: free-text status
//!
//! Prefixes are matched case-insensitively.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Telemetry notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// Process value reading
    PvUpdate(f64),
    /// Set point reading
    SpUpdate(f64),
    /// Status text from the device or from the connection layer
    StatusChange(String),
}

impl fmt::Display for TelemetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PvUpdate(v) => write!(f, "PV {}", v),
            Self::SpUpdate(v) => write!(f, "SP {}", v),
            Self::StatusChange(text) => write!(f, "STATUS {}", text),
        }
    }
}

/// Event stamped with its emission time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmittedEvent {
    /// Emission time
    pub timestamp: DateTime<Local>,
    /// The event
    #[serde(flatten)]
    pub event: TelemetryEvent,
}

impl EmittedEvent {
    /// Stamp an event with the current time
    pub fn now(event: TelemetryEvent) -> Self {
        Self {
            timestamp: Local::now(),
            event,
        }
    }
}

/// Numeric telemetry field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryField {
    /// `PV:`
    ProcessValue,
    /// `SP:`
    SetPoint,
}

impl TelemetryField {
    /// Wire prefix, including the colon
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::ProcessValue => "PV:",
            Self::SetPoint => "SP:",
        }
    }

    fn event(self, value: f64) -> TelemetryEvent {
        match self {
            Self::ProcessValue => TelemetryEvent::PvUpdate(value),
            Self::SetPoint => TelemetryEvent::SpUpdate(value),
        }
    }
}

/// Result of classifying one line
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    /// A telemetry event
    Event(TelemetryEvent),
    /// A recognised prefix with a payload that is not a decimal number
    Malformed {
        /// Field the prefix named
        field: TelemetryField,
        /// Raw payload after the prefix
        payload: String,
    },
    /// Empty or whitespace-only line
    Blank,
}

impl ParsedLine {
    /// The event, if any
    pub fn into_event(self) -> Option<TelemetryEvent> {
        match self {
            Self::Event(event) => Some(event),
            Self::Malformed { .. } | Self::Blank => None,
        }
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

fn parse_decimal(payload: &str) -> Option<f64> {
    payload
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Classify a line
///
/// Surrounding whitespace is trimmed first; status text is returned trimmed.
pub fn classify_line(line: &str) -> ParsedLine {
    let line = line.trim();
    if line.is_empty() {
        return ParsedLine::Blank;
    }

    for field in [TelemetryField::ProcessValue, TelemetryField::SetPoint] {
        if let Some(payload) = strip_prefix_ignore_case(line, field.prefix()) {
            return match parse_decimal(payload) {
                Some(value) => ParsedLine::Event(field.event(value)),
                None => ParsedLine::Malformed {
                    field,
                    payload: payload.to_string(),
                },
            };
        }
    }

    ParsedLine::Event(TelemetryEvent::StatusChange(line.to_string()))
}

/// Parse a line into at most one event
pub fn parse_line(line: &str) -> Option<TelemetryEvent> {
    classify_line(line).into_event()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_value() {
        assert_eq!(parse_line("PV:123.4"), Some(TelemetryEvent::PvUpdate(123.4)));
        assert_eq!(parse_line("pv:123.4"), Some(TelemetryEvent::PvUpdate(123.4)));
        assert_eq!(parse_line("Pv:-5"), Some(TelemetryEvent::PvUpdate(-5.0)));
    }

    #[test]
    fn test_set_point() {
        assert_eq!(parse_line("SP:180"), Some(TelemetryEvent::SpUpdate(180.0)));
        assert_eq!(parse_line("sP:180.5"), Some(TelemetryEvent::SpUpdate(180.5)));
    }

    #[test]
    fn test_whitespace_tolerated() {
        assert_eq!(parse_line("  PV: 12.5 "), Some(TelemetryEvent::PvUpdate(12.5)));
    }

    #[test]
    fn test_malformed_payload_dropped() {
        assert_eq!(parse_line("PV:abc"), None);
        assert_eq!(parse_line("SP:"), None);
        assert_eq!(
            classify_line("PV:abc"),
            ParsedLine::Malformed {
                field: TelemetryField::ProcessValue,
                payload: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_non_finite_is_malformed() {
        assert_eq!(parse_line("PV:NaN"), None);
        assert_eq!(parse_line("SP:inf"), None);
    }

    #[test]
    fn test_status_text() {
        assert_eq!(
            parse_line("hello world"),
            Some(TelemetryEvent::StatusChange("hello world".to_string()))
        );
        // Prefix without the colon is just text
        assert_eq!(
            parse_line("PV 12"),
            Some(TelemetryEvent::StatusChange("PV 12".to_string()))
        );
    }

    #[test]
    fn test_blank_lines() {
        assert_eq!(classify_line(""), ParsedLine::Blank);
        assert_eq!(classify_line(" \t "), ParsedLine::Blank);
        assert_eq!(parse_line("   "), None);
    }

    #[test]
    fn test_short_and_non_ascii_lines() {
        assert_eq!(
            parse_line("P"),
            Some(TelemetryEvent::StatusChange("P".to_string()))
        );
        assert_eq!(
            parse_line("°C ok"),
            Some(TelemetryEvent::StatusChange("°C ok".to_string()))
        );
    }

    #[test]
    fn test_event_json() {
        let json = serde_json::to_string(&TelemetryEvent::PvUpdate(1.5)).unwrap();
        assert_eq!(json, r#"{"type":"pv_update","value":1.5}"#);
    }
}
