//! Memory-ratio gate on WAITING→RUNNING transitions.

use super::{AdmissionStats, Scheduler};
use crate::error::SimError;
use crate::policy::SchedulingPolicy;
use crate::state::SystemState;

/// Before either scheduling-cycle call in a step, gate admission on
/// `gpu_memory_used / M_total`. At or above `threshold`, only the
/// memory-pressure relief path runs (no new admissions); below it, the
/// wrapped policy's normal cycle runs unchanged.
pub struct AdmissionControlOverlay {
    inner: Box<dyn SchedulingPolicy>,
    pub threshold: f64,

    pub rejected_count: u64,
    pub time_above_threshold: f64,
    pub max_memory_usage_ratio: f64,
    last_check_time: f64,
    has_checked: bool,
}

impl AdmissionControlOverlay {
    pub fn new(inner: Box<dyn SchedulingPolicy>, threshold: f64) -> Self {
        Self {
            inner,
            threshold,
            rejected_count: 0,
            time_above_threshold: 0.0,
            max_memory_usage_ratio: 0.0,
            last_check_time: 0.0,
            has_checked: false,
        }
    }

    fn ratio(&self, state: &SystemState) -> f64 {
        if state.m_total == 0 {
            0.0
        } else {
            state.gpu_memory_used() as f64 / state.m_total as f64
        }
    }
}

impl Scheduler for AdmissionControlOverlay {
    fn run_cycle(&mut self, state: &mut SystemState, current_time: f64, at_batch_construction: bool) -> Result<(), SimError> {
        let ratio = self.ratio(state);
        self.max_memory_usage_ratio = self.max_memory_usage_ratio.max(ratio);

        if ratio >= self.threshold && self.has_checked {
            self.time_above_threshold += current_time - self.last_check_time;
        }
        self.last_check_time = current_time;
        self.has_checked = true;

        if ratio >= self.threshold {
            if at_batch_construction && (!state.waiting.is_empty() || !state.swapped.is_empty()) {
                self.rejected_count += 1;
                tracing::debug!(
                    ratio,
                    threshold = self.threshold,
                    waiting = state.waiting.len(),
                    swapped = state.swapped.len(),
                    "admission control blocked waiting/swapped admission"
                );
            }
            self.inner.pressure_relief_cycle(state, current_time)
        } else {
            self.inner.scheduling_cycle(state, current_time)
        }
    }

    fn admission_stats(&self) -> Option<AdmissionStats> {
        Some(AdmissionStats {
            rejected_count: self.rejected_count,
            time_above_threshold: self.time_above_threshold,
            max_memory_usage_ratio: self.max_memory_usage_ratio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{build_policy, PreemptionMode, PreemptionStrategy};
    use crate::request::Request;

    #[test]
    fn blocks_admission_at_or_above_threshold() {
        let mut state = SystemState::new(100, 100);
        let req0 = Request::new(0, 0.0, 90, 1000);
        state.admit_to_batch(req0, 0.0).unwrap();
        state.add_to_waiting(Request::new(1, 0.0, 5, 10));

        let policy = build_policy(PreemptionMode::Sacrifice, PreemptionStrategy::Aggressive);
        let mut overlay = AdmissionControlOverlay::new(policy, 0.5);
        overlay.run_cycle(&mut state, 1.0, true).unwrap();

        assert_eq!(state.running.len(), 1);
        assert_eq!(state.waiting.len(), 1);
        assert_eq!(overlay.rejected_count, 1);
        assert_eq!(overlay.admission_stats().unwrap().rejected_count, 1);
    }

    #[test]
    fn admits_normally_below_threshold() {
        let mut state = SystemState::new(100, 100);
        state.add_to_waiting(Request::new(0, 0.0, 5, 10));

        let policy = build_policy(PreemptionMode::Sacrifice, PreemptionStrategy::Aggressive);
        let mut overlay = AdmissionControlOverlay::new(policy, 0.9);
        overlay.run_cycle(&mut state, 1.0, true).unwrap();

        assert_eq!(state.running.len(), 1);
        assert_eq!(overlay.rejected_count, 0);
    }

    #[test]
    fn post_step_call_does_not_count_as_rejection() {
        let mut state = SystemState::new(100, 100);
        let req0 = Request::new(0, 0.0, 90, 1000);
        state.admit_to_batch(req0, 0.0).unwrap();
        state.add_to_waiting(Request::new(1, 0.0, 5, 10));

        let policy = build_policy(PreemptionMode::Sacrifice, PreemptionStrategy::Aggressive);
        let mut overlay = AdmissionControlOverlay::new(policy, 0.5);
        overlay.run_cycle(&mut state, 1.0, false).unwrap();

        assert_eq!(overlay.rejected_count, 0);
    }
}
