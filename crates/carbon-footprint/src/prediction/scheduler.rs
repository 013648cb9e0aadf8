use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrainPhase {
    Idle,
    Retraining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionStats {
    pub submissions_since_last_retrain: u64,
    pub retrain_threshold: u64,
    pub submissions_until_retrain: u64,
}

#[derive(Debug, Default)]
struct SchedulerState {
    submissions: u64,
    active_cycles: usize,
}

/// Counts successful predictions and decides when a retrain cycle starts.
///
/// The increment, threshold check and cycle claim happen under one lock, so concurrent
/// requests can neither double-trigger nor lose a trigger. A claimed cycle is represented
/// by a [`RetrainTicket`]; dropping the ticket resets the counter and, once no cycle is
/// outstanding, returns the scheduler to [`RetrainPhase::Idle`].
#[derive(Debug)]
pub struct RetrainScheduler {
    threshold: u64,
    state: Mutex<SchedulerState>,
}

impl RetrainScheduler {
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold: threshold.max(1),
            state: Mutex::new(SchedulerState::default()),
        }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Count one successful prediction. Returns a ticket when this request crossed the
    /// threshold and no cycle is already running.
    pub fn record_prediction(self: &Arc<Self>) -> Option<RetrainTicket> {
        let mut state = self.state.lock();
        state.submissions += 1;

        if state.active_cycles == 0 && state.submissions >= self.threshold {
            state.active_cycles += 1;
            info!(
                submissions = state.submissions,
                threshold = self.threshold,
                "retrain threshold reached"
            );
            return Some(RetrainTicket {
                scheduler: Arc::clone(self),
            });
        }
        None
    }

    /// Claim a cycle regardless of the counter, for manual and start-up retrains.
    pub fn begin_cycle(self: &Arc<Self>) -> RetrainTicket {
        self.state.lock().active_cycles += 1;
        RetrainTicket {
            scheduler: Arc::clone(self),
        }
    }

    pub fn phase(&self) -> RetrainPhase {
        if self.state.lock().active_cycles > 0 {
            RetrainPhase::Retraining
        } else {
            RetrainPhase::Idle
        }
    }

    pub fn submissions(&self) -> u64 {
        self.state.lock().submissions
    }

    pub fn stats(&self) -> SubmissionStats {
        let submissions = self.submissions();
        SubmissionStats {
            submissions_since_last_retrain: submissions,
            retrain_threshold: self.threshold,
            submissions_until_retrain: self.threshold.saturating_sub(submissions),
        }
    }

    fn complete_cycle(&self) {
        let mut state = self.state.lock();
        state.submissions = 0;
        state.active_cycles = state.active_cycles.saturating_sub(1);
    }
}

/// Claim on one retrain cycle; completes the cycle when dropped, whatever its outcome.
#[derive(Debug)]
#[must_use = "dropping the ticket immediately completes the retrain cycle"]
pub struct RetrainTicket {
    scheduler: Arc<RetrainScheduler>,
}

impl Drop for RetrainTicket {
    fn drop(&mut self) {
        self.scheduler.complete_cycle();
    }
}
