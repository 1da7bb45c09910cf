//! Synthetic telemetry generator
//!
//! Stands in for the controller when no hardware is attached. Each tick
//! produces a process value following a sine profile and a fixed set point.

use crate::core::event_bus::EventBus;
use crate::core::logger::Logger;
use crate::core::protocol::TelemetryEvent;
use crate::core::transport::ConnectionError;
use crate::core::worker::StopSignal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Simulation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Tick interval in milliseconds
    pub interval_ms: u64,
    /// Centre of the PV waveform
    pub base: f64,
    /// Peak deviation from `base`
    pub amplitude: f64,
    /// Radians per simulated second
    pub phase_rate: f64,
    /// Constant set point
    pub set_point: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            base: 20.0,
            amplitude: 180.0,
            phase_rate: 0.05,
            set_point: 180.0,
        }
    }
}

impl SimulationConfig {
    /// Tick interval as a duration
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Set the tick interval
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = interval.as_millis() as u64;
        self
    }

    /// Lowest and highest process value the waveform can reach
    pub fn pv_range(&self) -> (f64, f64) {
        let amplitude = self.amplitude.abs();
        (self.base - amplitude, self.base + amplitude)
    }

    /// Reject parameters the generator cannot run with
    pub fn validate(&self) -> Result<(), ConnectionError> {
        if self.interval_ms == 0 {
            return Err(ConnectionError::InvalidConfig(
                "simulation interval must be non-zero".into(),
            ));
        }
        let all_finite = [self.base, self.amplitude, self.phase_rate, self.set_point]
            .iter()
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(ConnectionError::InvalidConfig(
                "simulation parameters must be finite".into(),
            ));
        }
        Ok(())
    }
}

/// Values produced by one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationTick {
    /// Simulated time of this tick, in seconds
    pub t: f64,
    /// Process value, rounded to two decimals
    pub pv: f64,
    /// Set point
    pub sp: f64,
}

/// Waveform state
#[derive(Debug, Clone)]
pub struct SimulationGenerator {
    config: SimulationConfig,
    elapsed_secs: f64,
    ticks: u64,
}

impl SimulationGenerator {
    /// Start a generator at `t = 0`
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            elapsed_secs: 0.0,
            ticks: 0,
        }
    }

    /// Generator parameters
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Ticks produced so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Unrounded process value at simulated time `t`
    pub fn pv_at(&self, t: f64) -> f64 {
        self.config.base + self.config.amplitude * (t * self.config.phase_rate).sin()
    }

    // Rounding can overshoot the waveform bounds by up to half a cent
    fn rounded_pv(&self, t: f64) -> f64 {
        let (low, high) = self.config.pv_range();
        round2(self.pv_at(t)).clamp(low, high)
    }

    /// Produce the next tick and advance simulated time
    pub fn tick(&mut self) -> SimulationTick {
        let t = self.elapsed_secs;
        let tick = SimulationTick {
            t,
            pv: self.rounded_pv(t),
            sp: self.config.set_point,
        };
        self.elapsed_secs += self.config.interval_ms as f64 / 1000.0;
        self.ticks += 1;
        tick
    }

    /// Emit ticks until stopped
    pub fn run(mut self, bus: Arc<EventBus>, logger: Logger, stop: StopSignal) {
        let interval = self.config.interval();
        tracing::debug!("Simulation running every {:?}", interval);

        loop {
            if stop.is_requested() {
                break;
            }

            let tick = self.tick();
            tracing::trace!("Simulated tick t={} pv={} sp={}", tick.t, tick.pv, tick.sp);
            bus.publish(TelemetryEvent::PvUpdate(tick.pv));
            bus.publish(TelemetryEvent::SpUpdate(tick.sp));
            logger.log(format!("[SIM] PV={} SP={}", tick.pv, tick.sp));

            if stop.wait(interval) {
                break;
            }
        }

        tracing::debug!("Simulation stopped after {} ticks", self.ticks);
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_bus::FnObserver;
    use crate::core::logger::SessionLogger;
    use crate::core::worker::{StopResult, WorkerHandle};
    use parking_lot::Mutex;
    use std::thread;

    #[test]
    fn test_first_tick_at_zero() {
        let mut generator = SimulationGenerator::new(SimulationConfig::default());
        let first = generator.tick();
        assert_eq!(first.t, 0.0);
        assert_eq!(first.pv, 20.0);
        assert_eq!(first.sp, 180.0);

        let second = generator.tick();
        assert_eq!(second.t, 1.0);
        // 20 + 180 * sin(0.05) = 28.9956...
        assert_eq!(second.pv, 29.0);
        assert_eq!(generator.ticks(), 2);
    }

    #[test]
    fn test_time_follows_interval() {
        let config = SimulationConfig::default().with_interval(Duration::from_millis(250));
        let mut generator = SimulationGenerator::new(config);
        let ticks: Vec<f64> = (0..5).map(|_| generator.tick().t).collect();
        assert_eq!(ticks, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_pv_within_bounds() {
        let config = SimulationConfig::default();
        let mut generator = SimulationGenerator::new(config.clone());
        for _ in 0..500 {
            let tick = generator.tick();
            assert!(tick.pv >= config.base - config.amplitude);
            assert!(tick.pv <= config.base + config.amplitude);
            assert_eq!(tick.sp, config.set_point);
        }
    }

    #[test]
    fn test_rounding_stays_within_bounds() {
        let config = SimulationConfig {
            base: 0.0,
            amplitude: 0.005,
            phase_rate: std::f64::consts::FRAC_PI_2,
            ..SimulationConfig::default()
        };
        let mut generator = SimulationGenerator::new(config.clone());
        generator.tick();
        // t = 1 is the waveform peak, where rounding alone would give 0.01
        let peak = generator.tick();
        assert_eq!(peak.pv, 0.005);

        let (low, high) = config.pv_range();
        for _ in 0..100 {
            let tick = generator.tick();
            assert!(tick.pv >= low && tick.pv <= high);
        }
    }

    #[test]
    fn test_validation() {
        assert!(SimulationConfig::default().validate().is_ok());

        let zero = SimulationConfig {
            interval_ms: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let nan = SimulationConfig {
            amplitude: f64::NAN,
            ..Default::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_run_emits_pairs_until_stopped() {
        let bus = Arc::new(EventBus::new());
        let logger = SessionLogger::disabled().shared();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let observer = Arc::new(FnObserver(move |e: &TelemetryEvent| sink.lock().push(e.clone())));
        bus.subscribe(&observer);

        let generator = SimulationGenerator::new(
            SimulationConfig::default().with_interval(Duration::from_millis(20)),
        );
        let worker = {
            let bus = bus.clone();
            let logger = logger.clone();
            WorkerHandle::spawn("sim-test", move |stop| generator.run(bus, logger, stop)).unwrap()
        };

        thread::sleep(Duration::from_millis(110));
        assert_eq!(worker.stop(Duration::from_millis(500)), StopResult::Joined);

        let received = events.lock().clone();
        assert!(received.len() >= 2);
        assert_eq!(received.len() % 2, 0);
        for pair in received.chunks(2) {
            assert!(matches!(pair[0], TelemetryEvent::PvUpdate(_)));
            assert_eq!(pair[1], TelemetryEvent::SpUpdate(180.0));
        }

        let logged = logger.recent();
        assert_eq!(logged.len(), received.len() / 2);
        assert_eq!(logged[0].message, "[SIM] PV=20 SP=180");

        // Nothing more arrives once stopped
        thread::sleep(Duration::from_millis(50));
        assert_eq!(events.lock().len(), received.len());
    }
}
