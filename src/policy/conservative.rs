//! Conservative strategy: never preempts; relies entirely on natural
//! completion to free memory.

use std::collections::VecDeque;

use super::{PreemptionMode, SchedulingPolicy};
use crate::error::SimError;
use crate::request::Request;
use crate::state::SystemState;

pub struct ConservativePolicy {
    mode: PreemptionMode,
}

impl ConservativePolicy {
    pub fn new(mode: PreemptionMode) -> Self {
        Self { mode }
    }

    /// Admit as many requests from the front of `queue` as fit, using a
    /// reservation pattern so an earlier admission in the same pass reduces
    /// the memory available to later ones. Requests that don't fit are
    /// skipped, not a break — a smaller later request may still be admitted.
    fn admissible_ids(queue: &VecDeque<Request>, available_start: i64) -> Vec<u64> {
        let mut available = available_start;
        let mut admit_ids = Vec::new();
        for req in queue.iter() {
            let required = req.memory_requirement() as i64 + 1;
            if required <= available {
                admit_ids.push(req.req_id);
                available -= required;
            }
        }
        admit_ids
    }
}

impl SchedulingPolicy for ConservativePolicy {
    fn scheduling_cycle(&self, state: &mut SystemState, current_time: f64) -> Result<(), SimError> {
        if self.mode == PreemptionMode::Swap && !state.swapped.is_empty() {
            for id in Self::admissible_ids(&state.swapped, state.available_memory()) {
                state.swap_in_by_id(id, current_time)?;
            }
        }

        for id in Self::admissible_ids(&state.waiting, state.available_memory()) {
            let idx = state.waiting.iter().position(|r| r.req_id == id).unwrap();
            let req = state.waiting.remove(idx).unwrap();
            state.admit_to_batch(req, current_time)?;
        }

        Ok(())
    }

    fn pressure_relief_cycle(&self, _state: &mut SystemState, _current_time: f64) -> Result<(), SimError> {
        // Conservative never preempts; there is nothing to relieve.
        Ok(())
    }

    fn mode(&self) -> PreemptionMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;

    #[test]
    fn admits_smaller_later_request_when_head_does_not_fit() {
        let mut state = SystemState::new(150, 150);
        state.add_to_waiting(Request::new(0, 0.0, 200, 10));
        state.add_to_waiting(Request::new(1, 0.0, 50, 10));

        let policy = ConservativePolicy::new(PreemptionMode::Sacrifice);
        policy.scheduling_cycle(&mut state, 0.0).unwrap();

        assert_eq!(state.waiting.len(), 1);
        assert_eq!(state.waiting[0].req_id, 0);
        assert_eq!(state.running.len(), 1);
        assert_eq!(state.running[0].req_id, 1);
    }

    #[test]
    fn never_sacrifices_or_swaps_out() {
        let mut state = SystemState::new(10, 10);
        state.add_to_waiting(Request::new(0, 0.0, 8, 5));
        let policy = ConservativePolicy::new(PreemptionMode::Sacrifice);
        policy.scheduling_cycle(&mut state, 0.0).unwrap();
        for _ in 0..20 {
            for req in state.running.iter_mut() {
                req.current_decode_position += 1;
            }
            policy.pressure_relief_cycle(&mut state, 0.0).unwrap();
        }
        assert_eq!(state.total_sacrifices, 0);
        assert!(state.running.iter().all(|r| r.swap_events.is_empty()));
    }
}
