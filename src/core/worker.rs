//! Background worker threads with cooperative cancellation
//!
//! A worker receives a stop channel and is expected to poll it once per
//! cycle. Stopping is two-phase:
//!
//! 1. signal the worker and wait up to a bound for it to exit;
//! 2. return regardless, so the caller can release resources.
//!
//! A worker that misses the deadline is detached, not killed. It will exit
//! on its own once it observes the signal.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Stop signal as seen by the worker
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: Receiver<()>,
}

impl StopSignal {
    /// Has a stop been requested?
    pub fn is_requested(&self) -> bool {
        !matches!(self.rx.try_recv(), Err(TryRecvError::Empty))
    }

    /// Sleep for `timeout` unless a stop is requested first.
    ///
    /// Returns true if the wait ended because of a stop request.
    pub fn wait(&self, timeout: Duration) -> bool {
        !matches!(self.rx.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
    }
}

/// How a worker stop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopResult {
    /// The worker exited within the timeout
    Joined,
    /// The worker did not exit in time and was detached
    Detached,
}

/// Handle to a running worker thread
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    stop_tx: Sender<()>,
    // Never sent on; disconnects when the worker thread ends
    exited_rx: Receiver<()>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Spawn a named worker thread
    pub fn spawn<F>(name: &str, body: F) -> io::Result<Self>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (exited_tx, exited_rx) = bounded::<()>(0);

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _exited = exited_tx;
                body(StopSignal { rx: stop_rx });
            })?;

        Ok(Self {
            name: name.to_string(),
            stop_tx,
            exited_rx,
            join,
        })
    }

    /// Worker name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Has the worker thread finished?
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signal the worker and wait up to `timeout` for it to exit
    pub fn stop(self, timeout: Duration) -> StopResult {
        let _ = self.stop_tx.try_send(());

        match self.exited_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    "Worker {} did not stop within {:?}, detaching",
                    self.name,
                    timeout
                );
                StopResult::Detached
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.join.join().is_err() {
                    tracing::error!("Worker {} panicked", self.name);
                }
                StopResult::Joined
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_cooperative_stop() {
        let cycles = Arc::new(AtomicUsize::new(0));
        let counter = cycles.clone();
        let worker = WorkerHandle::spawn("test-worker", move |stop| {
            while !stop.wait(Duration::from_millis(5)) {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        assert_eq!(worker.stop(Duration::from_millis(500)), StopResult::Joined);

        let after = cycles.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(cycles.load(Ordering::SeqCst), after);
    }

    #[test]
    fn test_unresponsive_worker_detached() {
        let worker = WorkerHandle::spawn("stuck-worker", |_stop| {
            thread::sleep(Duration::from_millis(300));
        })
        .unwrap();

        let started = Instant::now();
        assert_eq!(worker.stop(Duration::from_millis(50)), StopResult::Detached);
        assert!(started.elapsed() < Duration::from_millis(250));
    }

    #[test]
    fn test_already_finished_worker() {
        let worker = WorkerHandle::spawn("short-worker", |_stop| {}).unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(worker.is_finished());
        assert_eq!(worker.stop(Duration::from_millis(10)), StopResult::Joined);
    }

    #[test]
    fn test_panicking_worker_joined() {
        let worker = WorkerHandle::spawn("panicking-worker", |_stop| {
            panic!("worker failure");
        })
        .unwrap();
        assert_eq!(worker.stop(Duration::from_millis(500)), StopResult::Joined);
    }
}
