//! Overlays decorate a base `SchedulingPolicy`: they either call through to it
//! unchanged or substitute a restricted cycle, without subclassing it.

pub mod admission_control;
pub mod truncation;

pub use admission_control::AdmissionControlOverlay;
pub use truncation::{TruncationOverlay, TruncationReport};

use crate::error::SimError;
use crate::policy::SchedulingPolicy;
use crate::state::SystemState;

/// Admission-control counters exposed through the `Scheduler` trait so the
/// CLI can report them without knowing which overlay (if any) is active.
#[derive(Clone, Copy, Debug)]
pub struct AdmissionStats {
    pub rejected_count: u64,
    pub time_above_threshold: f64,
    pub max_memory_usage_ratio: f64,
}

/// What the simulator invokes once per scheduling opportunity. A plain
/// policy and the admission-control decorator both implement it so the
/// simulator doesn't need to know which is in play.
pub trait Scheduler {
    /// `at_batch_construction` is true for the pre-batch call made when
    /// RUNNING is empty and a new execution batch needs to be assembled,
    /// false for the call made after a step's completion sweep. Overlays
    /// that count rejections care about the distinction; plain policies
    /// ignore it.
    fn run_cycle(&mut self, state: &mut SystemState, current_time: f64, at_batch_construction: bool) -> Result<(), SimError>;

    /// `None` unless this scheduler wraps an admission-control overlay.
    fn admission_stats(&self) -> Option<AdmissionStats> {
        None
    }
}

/// Thin pass-through: no overlay active.
pub struct PlainScheduler {
    pub policy: Box<dyn SchedulingPolicy>,
}

impl Scheduler for PlainScheduler {
    fn run_cycle(&mut self, state: &mut SystemState, current_time: f64, _at_batch_construction: bool) -> Result<(), SimError> {
        self.policy.scheduling_cycle(state, current_time)
    }
}
