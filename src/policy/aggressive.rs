//! Aggressive strategy: the three-phase cycle (admit prefills, absorb memory
//! growth with LIFO preemption, re-enqueue preempted requests).

use super::victim::select_lifo_victims;
use super::{PreemptionMode, SchedulingPolicy};
use crate::error::SimError;
use crate::request::Request;
use crate::state::SystemState;

pub struct AggressivePolicy {
    mode: PreemptionMode,
}

impl AggressivePolicy {
    pub fn new(mode: PreemptionMode) -> Self {
        Self { mode }
    }

    /// Phase 1: admit SWAPPED (if swap mode) then WAITING, FCFS, stopping at
    /// the first request that doesn't fit — a blocked head blocks the tail.
    /// B is not checked here; it only gates execution selection.
    fn admit_prefills(&self, state: &mut SystemState, current_time: f64) -> Result<(), SimError> {
        if self.mode == PreemptionMode::Swap {
            loop {
                let Some(front) = state.swapped.front() else { break };
                let required = front.memory_requirement() as i64 + 1;
                if required > state.available_memory() {
                    break;
                }
                let req_id = front.req_id;
                state.swap_in_by_id(req_id, current_time)?;
            }
        }

        loop {
            let Some(front) = state.waiting.front() else { break };
            let required = front.memory_requirement() as i64 + 1;
            if required > state.available_memory() {
                break;
            }
            let req = state.waiting.pop_front().unwrap();
            state.admit_to_batch(req, current_time)?;
        }

        Ok(())
    }

    /// Phase 2: every RUNNING request will produce one more token next step.
    /// While the projected occupancy exceeds `M_total`, evict LIFO victims.
    /// Swap-mode victims move straight to SWAPPED; sacrifice-mode victims are
    /// collected here and handed back for Phase 3's head-of-WAITING requeue.
    fn relieve_memory_pressure(&self, state: &mut SystemState, current_time: f64) -> Vec<Request> {
        let mut preempted = Vec::new();

        loop {
            let projected = state.gpu_memory_used() + state.running.len() as u64;
            if projected <= state.m_total {
                break;
            }
            let memory_to_free = projected - state.m_total;

            let victim_ids = select_lifo_victims(&state.running, memory_to_free);
            if victim_ids.is_empty() {
                break;
            }

            for req_id in victim_ids {
                match self.mode {
                    PreemptionMode::Sacrifice => {
                        if let Some(victim) = state.sacrifice(req_id, current_time) {
                            preempted.push(victim);
                        }
                    }
                    PreemptionMode::Swap => {
                        state.swap_out(req_id, current_time);
                    }
                }
            }
        }

        preempted
    }
}

impl SchedulingPolicy for AggressivePolicy {
    fn scheduling_cycle(&self, state: &mut SystemState, current_time: f64) -> Result<(), SimError> {
        self.admit_prefills(state, current_time)?;
        let preempted = self.relieve_memory_pressure(state, current_time);
        state.requeue_at_head(preempted);
        Ok(())
    }

    fn pressure_relief_cycle(&self, state: &mut SystemState, current_time: f64) -> Result<(), SimError> {
        let preempted = self.relieve_memory_pressure(state, current_time);
        state.requeue_at_head(preempted);
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
    fn phase1_stops_at_first_blocking_request() {
        let mut state = SystemState::new(150, 150);
        state.add_to_waiting(Request::new(0, 0.0, 200, 10));
        state.add_to_waiting(Request::new(1, 0.0, 50, 10));

        let policy = AggressivePolicy::new(PreemptionMode::Sacrifice);
        policy.scheduling_cycle(&mut state, 0.0).unwrap();

        assert_eq!(state.running.len(), 0);
        assert_eq!(state.waiting.len(), 2);
    }

    #[test]
    fn sacrifice_mode_evicts_lifo_and_requeues_at_head() {
        let mut state = SystemState::new(100, 100);
        let req0 = Request::new(0, 0.0, 60, 1000);
        let req1 = Request::new(1, 0.0, 39, 1000);
        state.admit_to_batch(req0, 0.0).unwrap();
        state.admit_to_batch(req1, 0.0).unwrap();
        // 60 + 39 = 99, projected growth = 99 + 2 = 101 > 100.
        let policy = AggressivePolicy::new(PreemptionMode::Sacrifice);
        let preempted = policy.relieve_memory_pressure(&mut state, 1.0);
        assert_eq!(preempted.len(), 1);
        assert_eq!(preempted[0].req_id, 1);
        assert_eq!(preempted[0].current_decode_position, 0);
        assert_eq!(state.running.len(), 1);
        assert_eq!(state.running[0].req_id, 0);
    }

    #[test]
    fn swap_mode_moves_victim_to_swapped_not_preempted_list() {
        let mut state = SystemState::new(100, 100);
        let req0 = Request::new(0, 0.0, 60, 1000);
        let req1 = Request::new(1, 0.0, 39, 1000);
        state.admit_to_batch(req0, 0.0).unwrap();
        state.admit_to_batch(req1, 0.0).unwrap();

        let policy = AggressivePolicy::new(PreemptionMode::Swap);
        let preempted = policy.relieve_memory_pressure(&mut state, 1.0);
        assert!(preempted.is_empty());
        assert_eq!(state.swapped.len(), 1);
        assert_eq!(state.swapped[0].req_id, 1);
    }

    #[test]
    fn single_oversized_request_admits_alone_then_stalls() {
        let mut state = SystemState::new(100, 100);
        state.add_to_waiting(Request::new(0, 0.0, 150, 10));
        let policy = AggressivePolicy::new(PreemptionMode::Sacrifice);
        policy.scheduling_cycle(&mut state, 0.0).unwrap();
        assert_eq!(state.waiting.len(), 1);
        assert_eq!(state.running.len(), 0);
    }
}
