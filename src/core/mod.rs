//! Core module containing the main functionality of Thermolink
//!
//! This module provides:
//! - Serial transport with mockable port seams
//! - Line framing and telemetry parsing (`PV:`, `SP:`, status text)
//! - Observer event bus with fault isolation
//! - Connection manager with a validated state machine
//! - Background reader loop and simulation generator
//! - Session log with timestamps

pub mod connection;
pub mod event_bus;
pub mod logger;
pub mod protocol;
pub mod reader;
pub mod simulator;
pub mod state_machine;
pub mod transport;
pub mod worker;
