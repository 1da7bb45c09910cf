mod common;

use common::{FakeBackend, Recorder};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thermolink_core::{
    CloseOutcome, ConnectionManager, ConnectionState, ManagerSettings, SessionLogger,
    SimulationConfig, SimulationGenerator, TelemetryEvent,
};

fn readings(events: &[TelemetryEvent]) -> Vec<TelemetryEvent> {
    events
        .iter()
        .filter(|e| !matches!(e, TelemetryEvent::StatusChange(_)))
        .cloned()
        .collect()
}

#[test]
fn n_ticks_give_n_pairs_within_bounds() {
    let config = SimulationConfig::default();
    let mut generator = SimulationGenerator::new(config.clone());

    let ticks: Vec<_> = (0..250).map(|_| generator.tick()).collect();
    assert_eq!(ticks.len(), 250);
    for tick in &ticks {
        assert!((config.base - config.amplitude..=config.base + config.amplitude).contains(&tick.pv));
        assert_eq!(tick.sp, config.set_point);
    }
    assert_eq!(ticks[249].t, 249.0);
}

#[test]
fn stopping_halts_emission_within_one_interval() {
    let (backend, _device) = FakeBackend::new(&[]);
    let manager = ConnectionManager::new(
        Arc::new(backend),
        SessionLogger::disabled().shared(),
        ManagerSettings::default(),
    );
    let recorder = Recorder::attach(&manager);

    let config = SimulationConfig::default().with_interval(Duration::from_millis(25));
    manager.start_simulation(config).unwrap();
    assert!(recorder.wait_for(Duration::from_secs(2), |events| readings(events).len() >= 6));

    assert!(manager.stop_simulation());
    assert_eq!(manager.state(), ConnectionState::Closed);
    let stopped_at = readings(&recorder.snapshot()).len();
    assert_eq!(stopped_at % 2, 0);

    thread::sleep(Duration::from_millis(100));
    assert_eq!(readings(&recorder.snapshot()).len(), stopped_at);

    for pair in readings(&recorder.snapshot()).chunks(2) {
        assert!(matches!(pair[0], TelemetryEvent::PvUpdate(_)));
        assert_eq!(pair[1], TelemetryEvent::SpUpdate(180.0));
    }
}

#[test]
fn close_does_not_stop_simulation() {
    let (backend, _device) = FakeBackend::new(&[]);
    let manager = ConnectionManager::new(
        Arc::new(backend),
        SessionLogger::disabled().shared(),
        ManagerSettings::default(),
    );
    let recorder = Recorder::attach(&manager);

    manager.start_simulation(SimulationConfig::default()).unwrap();
    assert_eq!(manager.close(), CloseOutcome::Simulating);
    assert_eq!(manager.state(), ConnectionState::Simulating);

    manager.shutdown();
    assert_eq!(manager.state(), ConnectionState::Closed);
    assert_eq!(
        recorder.statuses(),
        vec![
            "Simulation started",
            "Simulation mode -> nothing to close",
            "Simulation stopped"
        ]
    );
}
