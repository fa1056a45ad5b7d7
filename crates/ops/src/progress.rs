//! Session progress accounting

use lunaris_events::EventEmitter;
use lunaris_types::Phase;

/// Inputs to the fixed step total of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPlan {
    pub packages: usize,
    pub config_dirs: usize,
    pub count_confirmations: bool,
}

impl StepPlan {
    /// helper + packages + clone + config dirs, plus the two confirmations
    /// when they are counted.
    #[must_use]
    pub fn total(&self) -> usize {
        let confirmations = if self.count_confirmations { 2 } else { 0 };
        1 + self.packages + 1 + self.config_dirs + confirmations
    }
}

/// Monotonic progress against a total fixed at session start
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    progress: usize,
    total: usize,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(plan: StepPlan) -> Self {
        Self {
            progress: 0,
            total: plan.total(),
        }
    }

    #[must_use]
    pub fn progress(&self) -> usize {
        self.progress
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Count one finished unit of work and report it. Saturates at the total.
    pub fn advance<E: EventEmitter>(&mut self, events: &E, step: impl Into<String>, phase: Phase) {
        if self.progress < self.total {
            self.progress += 1;
        } else {
            tracing::warn!(total = self.total, "progress already at total");
        }
        self.report(events, step, phase);
    }

    /// Re-announce the current value, e.g. after a phase change.
    pub fn report<E: EventEmitter>(&self, events: &E, step: impl Into<String>, phase: Phase) {
        events.emit_progress(self.progress, self.total, step, phase);
    }
}
