//! Staged progress reporting
//!
//! A run is divided into a fixed number of stages. Each stage declares its
//! unit count when it begins; every completed unit advances the overall
//! fraction. Every stage carries equal weight, so a stage with few units
//! still moves the bar as much as one with many.

use serde::Serialize;
use std::sync::{Arc, Mutex};

/// One progress event delivered to the caller's sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusEvent {
    /// Overall completion in `0.0..=1.0`, never decreasing within a run
    pub fraction: f64,
    /// Name of the current stage
    pub message: String,
    /// Item that was just completed, if any
    pub item: Option<String>,
}

/// Receives status events; purely observational
pub type StatusSink = Arc<dyn Fn(&StatusEvent) + Send + Sync>;

#[derive(Debug)]
struct Stage {
    name: String,
    total: u64,
    done: u64,
}

#[derive(Debug)]
struct StageState {
    stage_count: usize,
    stages: Vec<Stage>,
    last_fraction: f64,
}

impl StageState {
    fn fraction(&self) -> f64 {
        let Some(current) = self.stages.last() else {
            return 0.0;
        };
        let finished = (self.stages.len() - 1) as f64;
        let partial = if current.total == 0 {
            0.0
        } else {
            (current.done.min(current.total) as f64) / (current.total as f64)
        };
        let count = self.stage_count.max(self.stages.len()) as f64;
        ((finished + partial) / count).clamp(0.0, 1.0)
    }
}

/// Tracks stage progress and forwards events to a sink
pub struct StatusReporter {
    state: Mutex<StageState>,
    sink: Option<StatusSink>,
}

impl StatusReporter {
    /// Creates a reporter for a run with `stage_count` stages
    pub fn new(stage_count: usize, sink: Option<StatusSink>) -> Self {
        Self {
            state: Mutex::new(StageState {
                stage_count: stage_count.max(1),
                stages: Vec::new(),
                last_fraction: 0.0,
            }),
            sink,
        }
    }

    /// Ends the current stage and begins a new one with `units` units
    pub fn create_stage(&self, units: u64, name: &str) {
        tracing::info!(stage = name, units, "Starting stage");
        let event = self.update(|state| {
            state.stages.push(Stage {
                name: name.to_string(),
                total: units,
                done: 0,
            });
            None
        });
        self.emit(event);
    }

    /// Marks one unit of the current stage complete
    pub fn report(&self, item: &str) {
        self.report_n(1, item);
    }

    /// Marks `n` units of the current stage complete
    pub fn report_n(&self, n: u64, item: &str) {
        tracing::debug!(item, units = n, "Progress");
        let event = self.update(|state| {
            if let Some(stage) = state.stages.last_mut() {
                stage.done = stage.done.saturating_add(n);
            }
            Some(item.to_string())
        });
        self.emit(event);
    }

    /// Reports completion of the whole run
    pub fn finish(&self, message: &str) {
        let event = {
            let mut state = match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            state.last_fraction = 1.0;
            StatusEvent {
                fraction: 1.0,
                message: message.to_string(),
                item: None,
            }
        };
        self.emit(event);
    }

    /// Current overall fraction
    pub fn fraction(&self) -> f64 {
        self.state
            .lock()
            .map(|state| state.last_fraction)
            .unwrap_or_default()
    }

    /// Snapshot of the current stage as `(name, done, total)`
    pub fn current_stage(&self) -> Option<(String, u64, u64)> {
        let state = self.state.lock().ok()?;
        state
            .stages
            .last()
            .map(|s| (s.name.clone(), s.done, s.total))
    }

    fn update(&self, f: impl FnOnce(&mut StageState) -> Option<String>) -> StatusEvent {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let item = f(&mut state);
        let fraction = state.fraction().max(state.last_fraction);
        state.last_fraction = fraction;
        StatusEvent {
            fraction,
            message: state
                .stages
                .last()
                .map(|s| s.name.clone())
                .unwrap_or_default(),
            item,
        }
    }

    fn emit(&self, event: StatusEvent) {
        if let Some(sink) = &self.sink {
            sink(&event);
        }
    }
}
