//! Telemetry event bus
//!
//! Synchronous, ordered fan-out of [`TelemetryEvent`]s to registered
//! observers. Delivery happens on the publishing thread in registration
//! order. A panicking observer is isolated: the panic is caught, reported,
//! and the remaining observers still receive the event.
//!
//! The bus holds observers weakly and never extends their lifetime. Async
//! consumers can additionally take a broadcast [`receiver`](EventBus::receiver).

use crate::core::protocol::{EmittedEvent, TelemetryEvent};
use parking_lot::RwLock;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default capacity of the broadcast channel
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Observer of telemetry events
///
/// Override the per-kind hooks, or [`on_event`](Self::on_event) to see every
/// event in one place.
pub trait TelemetryObserver: Send + Sync {
    /// Process value update
    fn on_pv(&self, _value: f64) {}

    /// Set point update
    fn on_sp(&self, _value: f64) {}

    /// Status text
    fn on_status(&self, _text: &str) {}

    /// Any event; dispatches to the per-kind hooks by default
    fn on_event(&self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::PvUpdate(v) => self.on_pv(*v),
            TelemetryEvent::SpUpdate(v) => self.on_sp(*v),
            TelemetryEvent::StatusChange(text) => self.on_status(text),
        }
    }
}

/// Adapter turning a closure into an observer
pub struct FnObserver<F>(pub F);

impl<F> TelemetryObserver for FnObserver<F>
where
    F: Fn(&TelemetryEvent) + Send + Sync,
{
    fn on_event(&self, event: &TelemetryEvent) {
        (self.0)(event);
    }
}

/// Subscription handle for unsubscribing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

/// Outcome of one publish call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Observers that handled the event
    pub delivered: usize,
    /// Observers that panicked
    pub failed: usize,
    /// Registrations dropped because the observer no longer exists
    pub pruned: usize,
}

struct Registration {
    id: SubscriptionId,
    observer: Weak<dyn TelemetryObserver>,
}

/// Event bus
pub struct EventBus {
    observers: RwLock<Vec<Registration>>,
    sender: broadcast::Sender<EmittedEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with the default broadcast capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus with a custom broadcast capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            observers: RwLock::new(Vec::new()),
            sender,
        }
    }

    /// Register an observer; it is held weakly
    pub fn subscribe<O>(&self, observer: &Arc<O>) -> SubscriptionId
    where
        O: TelemetryObserver + 'static,
    {
        let weak = Arc::downgrade(observer);
        let weak: Weak<dyn TelemetryObserver> = weak;
        let id = SubscriptionId::new();
        self.observers.write().push(Registration { id, observer: weak });
        tracing::debug!("Subscription {} added", id);
        id
    }

    /// Remove an observer. Returns true if it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|r| r.id != id);
        let removed = observers.len() != before;
        if removed {
            tracing::debug!("Subscription {} removed", id);
        }
        removed
    }

    /// Number of registered observers that are still alive
    pub fn observer_count(&self) -> usize {
        self.observers
            .read()
            .iter()
            .filter(|r| r.observer.strong_count() > 0)
            .count()
    }

    /// Receiver for async consumers
    pub fn receiver(&self) -> broadcast::Receiver<EmittedEvent> {
        self.sender.subscribe()
    }

    /// Deliver an event to every observer, in registration order
    pub fn publish(&self, event: TelemetryEvent) -> DeliveryReport {
        let stamped = EmittedEvent::now(event);

        // Snapshot so observers may (un)subscribe from inside a callback
        let (targets, dead) = {
            let observers = self.observers.read();
            let targets: Vec<_> = observers
                .iter()
                .filter_map(|r| r.observer.upgrade().map(|o| (r.id, o)))
                .collect();
            let dead = observers.len() - targets.len();
            (targets, dead)
        };

        let mut report = DeliveryReport::default();
        for (id, observer) in targets {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| observer.on_event(&stamped.event)));
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(_) => {
                    report.failed += 1;
                    tracing::error!("Observer {} panicked handling {}", id, stamped.event);
                }
            }
        }

        if dead > 0 {
            let mut observers = self.observers.write();
            let before = observers.len();
            observers.retain(|r| r.observer.strong_count() > 0);
            report.pruned = before - observers.len();
        }

        // No async receivers is the normal case
        let _ = self.sender.send(stamped);

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<TelemetryEvent>>,
    }

    impl TelemetryObserver for Recorder {
        fn on_event(&self, event: &TelemetryEvent) {
            self.events.lock().push(event.clone());
        }
    }

    struct Panicker;

    impl TelemetryObserver for Panicker {
        fn on_pv(&self, _value: f64) {
            panic!("observer failure");
        }
    }

    #[test]
    fn test_delivery_in_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let order = order.clone();
            Arc::new(FnObserver(move |_: &TelemetryEvent| order.lock().push(1)))
        };
        let second = {
            let order = order.clone();
            Arc::new(FnObserver(move |_: &TelemetryEvent| order.lock().push(2)))
        };
        bus.subscribe(&first);
        bus.subscribe(&second);

        bus.publish(TelemetryEvent::PvUpdate(1.0));
        bus.publish(TelemetryEvent::SpUpdate(2.0));
        assert_eq!(*order.lock(), vec![1, 2, 1, 2]);
    }

    #[test]
    fn test_panicking_observer_isolated() {
        let bus = EventBus::new();
        let panicker = Arc::new(Panicker);
        let recorder = Arc::new(Recorder::default());
        bus.subscribe(&panicker);
        bus.subscribe(&recorder);

        let report = bus.publish(TelemetryEvent::PvUpdate(42.0));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(*recorder.events.lock(), vec![TelemetryEvent::PvUpdate(42.0)]);

        // The failing observer stays registered and later events still flow
        let report = bus.publish(TelemetryEvent::StatusChange("ok".into()));
        assert_eq!(report.delivered, 2);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        let recorder = Arc::new(Recorder::default());
        let id = bus.subscribe(&recorder);

        bus.publish(TelemetryEvent::PvUpdate(1.0));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(TelemetryEvent::PvUpdate(2.0));

        assert_eq!(recorder.events.lock().len(), 1);
    }

    #[test]
    fn test_dropped_observer_pruned() {
        let bus = EventBus::new();
        let recorder = Arc::new(Recorder::default());
        bus.subscribe(&recorder);
        assert_eq!(bus.observer_count(), 1);

        drop(recorder);
        assert_eq!(bus.observer_count(), 0);

        let report = bus.publish(TelemetryEvent::PvUpdate(1.0));
        assert_eq!(report.delivered, 0);
        assert_eq!(report.pruned, 1);
    }

    #[test]
    fn test_unsubscribe_from_callback() {
        let bus = Arc::new(EventBus::new());
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let observer = {
            let bus = bus.clone();
            let slot = slot.clone();
            Arc::new(FnObserver(move |_: &TelemetryEvent| {
                if let Some(id) = slot.lock().take() {
                    bus.unsubscribe(id);
                }
            }))
        };
        *slot.lock() = Some(bus.subscribe(&observer));

        assert_eq!(bus.publish(TelemetryEvent::PvUpdate(1.0)).delivered, 1);
        assert_eq!(bus.publish(TelemetryEvent::PvUpdate(1.0)).delivered, 0);
    }

    #[test]
    fn test_default_hooks_dispatch() {
        #[derive(Default)]
        struct Split {
            pv: Mutex<Vec<f64>>,
            sp: Mutex<Vec<f64>>,
            status: Mutex<Vec<String>>,
        }
        impl TelemetryObserver for Split {
            fn on_pv(&self, value: f64) {
                self.pv.lock().push(value);
            }
            fn on_sp(&self, value: f64) {
                self.sp.lock().push(value);
            }
            fn on_status(&self, text: &str) {
                self.status.lock().push(text.to_string());
            }
        }

        let bus = EventBus::new();
        let split = Arc::new(Split::default());
        bus.subscribe(&split);
        bus.publish(TelemetryEvent::PvUpdate(1.0));
        bus.publish(TelemetryEvent::SpUpdate(2.0));
        bus.publish(TelemetryEvent::StatusChange("Closed".into()));

        assert_eq!(*split.pv.lock(), vec![1.0]);
        assert_eq!(*split.sp.lock(), vec![2.0]);
        assert_eq!(*split.status.lock(), vec!["Closed".to_string()]);
    }

    #[tokio::test]
    async fn test_async_receiver() {
        let bus = EventBus::new();
        let mut rx = bus.receiver();
        bus.publish(TelemetryEvent::SpUpdate(180.0));

        let emitted = rx.recv().await.unwrap();
        assert_eq!(emitted.event, TelemetryEvent::SpUpdate(180.0));
    }
}
