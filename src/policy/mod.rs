//! Scheduling policy: the three-phase aggressive cycle and the no-preemption
//! conservative cycle, in both swap and sacrifice preemption modes.

mod aggressive;
mod conservative;
pub mod victim;

pub use aggressive::AggressivePolicy;
pub use conservative::ConservativePolicy;

use crate::error::SimError;
use crate::state::SystemState;

/// How a preempted request is evicted from RUNNING.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreemptionMode {
    Swap,
    Sacrifice,
}

/// Which scheduling cycle shape is used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreemptionStrategy {
    Aggressive,
    Conservative,
}

/// A capability the simulator invokes once per step. Overlays (truncation,
/// admission control) wrap a `SchedulingPolicy` rather than subclassing it, so
/// the decision of *which* cycle to run stays outside the policy itself.
pub trait SchedulingPolicy {
    /// The full per-step cycle: admission (if applicable) plus preemption.
    fn scheduling_cycle(&self, state: &mut SystemState, current_time: f64) -> Result<(), SimError>;

    /// Memory-pressure relief only — no new admissions. Used by the
    /// admission-control overlay when the gate is closed, and equivalent to
    /// Phase 2+3 of the aggressive cycle with Phase 1 skipped.
    fn pressure_relief_cycle(&self, state: &mut SystemState, current_time: f64) -> Result<(), SimError>;

    fn mode(&self) -> PreemptionMode;
}

/// Construct the configured policy.
pub fn build_policy(
    mode: PreemptionMode,
    strategy: PreemptionStrategy,
) -> Box<dyn SchedulingPolicy> {
    match strategy {
        PreemptionStrategy::Aggressive => Box::new(AggressivePolicy::new(mode)),
        PreemptionStrategy::Conservative => Box::new(ConservativePolicy::new(mode)),
    }
}
