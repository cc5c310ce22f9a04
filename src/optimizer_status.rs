use crate::models::ProgressEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Receives one event per evaluated combination, on the thread that drives
/// the optimization.
pub trait ProgressObserver {
    fn on_progress(&self, event: &ProgressEvent);

    fn on_phase(&self, _phase: &str) {}
}

/// Observer for headless runs.
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressEvent),
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Cooperative cancellation flag, checked between combinations.
#[derive(Clone, Default, Debug)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Latest progress of a run, readable from any thread.
#[derive(Clone, Default)]
pub struct OptimizerStatus {
    inner: Arc<Mutex<OptimizerStatusData>>,
}

#[derive(Default)]
struct OptimizerStatusData {
    phase: String,
    total_combinations: usize,
    attempted: usize,
    accepted: usize,
    best_accuracy: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OptimizerStatusSnapshot {
    pub phase: String,
    pub total_combinations: usize,
    pub attempted: usize,
    pub accepted: usize,
    pub best_accuracy: Option<f64>,
}

impl OptimizerStatus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(OptimizerStatusData {
                phase: "Initializing".to_string(),
                ..Default::default()
            })),
        }
    }

    pub fn set_phase<S: Into<String>>(&self, phase: S) {
        if let Ok(mut data) = self.inner.lock() {
            data.phase = phase.into();
        }
    }

    pub fn set_progress(
        &self,
        total_combinations: usize,
        attempted: usize,
        accepted: usize,
        best_accuracy: Option<f64>,
    ) {
        if let Ok(mut data) = self.inner.lock() {
            data.total_combinations = total_combinations;
            data.attempted = attempted;
            data.accepted = accepted;
            data.best_accuracy = best_accuracy;
        }
    }

    pub fn snapshot(&self) -> OptimizerStatusSnapshot {
        if let Ok(data) = self.inner.lock() {
            OptimizerStatusSnapshot {
                phase: data.phase.clone(),
                total_combinations: data.total_combinations,
                attempted: data.attempted,
                accepted: data.accepted,
                best_accuracy: data.best_accuracy,
            }
        } else {
            OptimizerStatusSnapshot {
                phase: "Status unavailable".to_string(),
                total_combinations: 0,
                attempted: 0,
                accepted: 0,
                best_accuracy: None,
            }
        }
    }
}

impl ProgressObserver for OptimizerStatus {
    fn on_progress(&self, event: &ProgressEvent) {
        self.set_progress(
            event.total,
            event.attempted,
            event.accepted,
            event.best_accuracy,
        );
    }

    fn on_phase(&self, phase: &str) {
        self.set_phase(phase);
    }
}
