//! Connection state machine
//!
//! Tracks the `{Closed, Open, Simulating}` lifecycle of the connection,
//! validates every transition and keeps a bounded transition history.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No port open, no simulation running
    #[default]
    Closed,
    /// Hardware port open, reader running
    Open,
    /// Synthetic data generator running
    Simulating,
}

impl ConnectionState {
    /// Is data flowing (from hardware or the simulator)?
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open | Self::Simulating)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::Simulating => write!(f, "Simulating"),
        }
    }
}

/// Rejected transition
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid transition from {from} to {to}")]
pub struct InvalidTransition {
    /// Current state
    pub from: ConnectionState,
    /// Requested state
    pub to: ConnectionState,
}

/// Recorded state transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    /// Previous state
    pub from: ConnectionState,
    /// New state
    pub to: ConnectionState,
    /// Timestamp
    pub timestamp: DateTime<Local>,
    /// Reason for transition
    pub reason: String,
}

/// Connection state machine
#[derive(Debug)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    history: VecDeque<StateTransition>,
    max_history: usize,
    last_transition: Option<Instant>,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateMachine {
    /// Create a machine in the `Closed` state
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Closed,
            history: VecDeque::new(),
            max_history: 100,
            last_transition: None,
        }
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Transition history, oldest first
    pub fn history(&self) -> Vec<StateTransition> {
        self.history.iter().cloned().collect()
    }

    /// Time in current state
    pub fn time_in_state(&self) -> Option<Duration> {
        self.last_transition.map(|t| t.elapsed())
    }

    /// Would a transition to `to` be accepted?
    pub fn can_transition(&self, to: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self.state, to),
            (Closed, Open) | (Open, Closed) | (Closed, Simulating) | (Simulating, Closed)
        ) || self.state == to
    }

    /// Transition to a new state
    ///
    /// Same-state transitions are accepted but not recorded.
    pub fn transition(
        &mut self,
        to: ConnectionState,
        reason: &str,
    ) -> Result<(), InvalidTransition> {
        if !self.can_transition(to) {
            return Err(InvalidTransition {
                from: self.state,
                to,
            });
        }
        if self.state == to {
            return Ok(());
        }

        tracing::debug!("State {} -> {} ({})", self.state, to, reason);
        self.history.push_back(StateTransition {
            from: self.state,
            to,
            timestamp: Local::now(),
            reason: reason.to_string(),
        });
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }

        self.state = to;
        self.last_transition = Some(Instant::now());
        Ok(())
    }
}
