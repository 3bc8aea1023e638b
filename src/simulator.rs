//! The discrete-event driver: arrival pump, idle fast-forward, execution-batch
//! selection under `B`, time advance, decode step, completion sweep, and the
//! two scheduling-cycle calls that bracket each step.

use std::collections::VecDeque;

use crate::error::SimError;
use crate::logger::{EventLogger, SimEvent};
use crate::overlays::truncation::{TruncationOverlay, TruncationReport};
use crate::overlays::{AdmissionStats, Scheduler};
use crate::request::Request;
use crate::state::{Statistics, SystemState, TransitionEvent};

/// `d_0 + d_1 * actual_batch_tokens`, the per-step wall-time model.
pub struct TimingModel {
    pub d0: f64,
    pub d1: f64,
}

impl TimingModel {
    pub fn batch_duration(&self, actual_batch_tokens: u64) -> f64 {
        self.d0 + self.d1 * actual_batch_tokens as f64
    }
}

pub struct RunSummary {
    pub statistics: Statistics,
    pub truncation_report: Option<TruncationReport>,
}

pub struct Simulator {
    pub state: SystemState,
    scheduler: Box<dyn Scheduler>,
    timing: TimingModel,
    pending: VecDeque<Request>,
    truncation: Option<TruncationOverlay>,
    logger: EventLogger,
    current_time: f64,
    batch_id: u64,
    next_req_id: u64,
}

impl Simulator {
    pub fn new(
        m_total: u64,
        b: u64,
        timing: TimingModel,
        scheduler: Box<dyn Scheduler>,
        mut trace: Vec<Request>,
    ) -> Self {
        trace.sort_by(|a, b| a.arrival_time.total_cmp(&b.arrival_time));
        let next_req_id = trace.iter().map(|r| r.req_id).max().map(|m| m + 1).unwrap_or(0);
        Self {
            state: SystemState::new(m_total, b),
            scheduler,
            timing,
            pending: trace.into(),
            truncation: None,
            logger: EventLogger::new(),
            current_time: 0.0,
            batch_id: 0,
            next_req_id,
        }
    }

    pub fn with_truncation(mut self, overlay: TruncationOverlay) -> Self {
        self.truncation = Some(overlay);
        self
    }

    pub fn logger(&self) -> &EventLogger {
        &self.logger
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn admission_stats(&self) -> Option<AdmissionStats> {
        self.scheduler.admission_stats()
    }

    /// Drains `state.transitions` (swap/sacrifice events recorded during the
    /// scheduling cycle just run) and records them to the event log.
    fn drain_transitions(&mut self) {
        for transition in self.state.transitions.drain(..) {
            let event = match transition {
                TransitionEvent::SwapOut { req_id, time } => {
                    SimEvent::SwapOut { time, batch_id: self.batch_id, req_id }
                }
                TransitionEvent::SwapIn { req_id, time } => {
                    SimEvent::SwapIn { time, batch_id: self.batch_id, req_id }
                }
                TransitionEvent::Sacrifice { req_id, time, decode_position, memory_freed } => SimEvent::Sacrifice {
                    time,
                    batch_id: self.batch_id,
                    req_id,
                    details: format!("decode_position={decode_position} memory_freed={memory_freed}"),
                },
            };
            self.logger.record_event(event);
        }
    }

    /// Runs until pending arrivals, WAITING, RUNNING, and SWAPPED are all
    /// empty, then returns the aggregate statistics.
    pub fn run_to_completion(&mut self) -> Result<RunSummary, SimError> {
        let mut truncation_report = None;

        loop {
            if truncation_report.is_none() {
                if let Some(overlay) = self.truncation.as_mut() {
                    if let Some(report) =
                        overlay.maybe_apply(self.batch_id, self.current_time, self.next_req_id, &mut self.pending)
                    {
                        self.next_req_id += report.replacement_count as u64;
                        tracing::info!(
                            batch_id = report.truncation_batch_id,
                            time = report.truncation_time,
                            discarded = report.discarded_count,
                            replacement = report.replacement_count,
                            "truncation overlay fired"
                        );
                        truncation_report = Some(report);
                    }
                }
            }

            self.pump_arrivals();

            if self.is_drained() {
                break;
            }

            if self.state.waiting.is_empty() && self.state.running.is_empty() && self.state.swapped.is_empty() {
                if let Some(next_arrival) = self.pending.front().map(|r| r.arrival_time) {
                    self.current_time = next_arrival;
                    continue;
                }
                break;
            }

            if self.state.running.is_empty() {
                self.scheduler.run_cycle(&mut self.state, self.current_time, true)?;
                self.drain_transitions();
                if self.state.running.is_empty() {
                    break;
                }
            }

            let (batch_count, batch_tokens, executed_ids) = select_execution_batch(&self.state.running, self.state.b);
            self.state.actual_batch_count = batch_count;
            self.state.actual_batch_tokens = batch_tokens;

            let snapshot = self.state.snapshot(self.current_time, self.batch_id, self.timing.batch_duration(batch_tokens));
            self.logger.record_snapshot(snapshot);
            self.state.batch_sacrifices = 0;

            let batch_duration = self.timing.batch_duration(batch_tokens);
            self.current_time += batch_duration;
            self.batch_id += 1;

            for req in self.state.running.iter_mut() {
                if executed_ids.contains(&req.req_id) {
                    req.current_decode_position += 1;
                }
            }

            let completed_ids: Vec<u64> = self
                .state
                .running
                .iter()
                .filter(|r| r.is_completed())
                .map(|r| r.req_id)
                .collect();
            for req_id in completed_ids {
                self.state.complete_request(req_id, self.current_time);
                self.logger.record_event(SimEvent::Completion {
                    time: self.current_time,
                    batch_id: self.batch_id,
                    req_id,
                });
            }

            if self.batch_id % 100 == 0 {
                tracing::info!(
                    batch_id = self.batch_id,
                    time = self.current_time,
                    completed = self.state.total_completed,
                    "batch heartbeat"
                );
            }

            self.scheduler.run_cycle(&mut self.state, self.current_time, false)?;
            self.drain_transitions();
        }

        Ok(RunSummary { statistics: self.state.statistics(), truncation_report })
    }

    fn pump_arrivals(&mut self) {
        while let Some(front) = self.pending.front() {
            if front.arrival_time > self.current_time {
                break;
            }
            let req = self.pending.pop_front().unwrap();
            let req_id = req.req_id;
            self.state.add_to_waiting(req);
            self.logger.record_event(SimEvent::Arrival {
                time: self.current_time,
                batch_id: self.batch_id,
                req_id,
            });
        }
    }

    fn is_drained(&self) -> bool {
        self.pending.is_empty()
            && self.state.waiting.is_empty()
            && self.state.running.is_empty()
            && self.state.swapped.is_empty()
    }
}

/// Walk `running` FCFS and greedily include requests while
/// `Σ(memory_requirement + 1) ≤ b`. The first request is always included,
/// even alone over budget, to guarantee progress. Returns
/// `(count, total_tokens, included_ids)`.
pub fn select_execution_batch(running: &VecDeque<Request>, b: u64) -> (usize, u64, std::collections::HashSet<u64>) {
    let mut included = std::collections::HashSet::new();
    let mut total: u64 = 0;
    for (i, req) in running.iter().enumerate() {
        let cost = req.memory_requirement() + 1;
        if i == 0 {
            included.insert(req.req_id);
            total += cost;
            continue;
        }
        if total + cost <= b {
            included.insert(req.req_id);
            total += cost;
        } else {
            break;
        }
    }
    (included.len(), total, included)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlays::PlainScheduler;
    use crate::policy::{build_policy, PreemptionMode, PreemptionStrategy};

    fn timing() -> TimingModel {
        TimingModel { d0: 0.003, d1: 0.00032 }
    }

    fn scheduler(mode: PreemptionMode, strategy: PreemptionStrategy) -> Box<dyn Scheduler> {
        Box::new(PlainScheduler { policy: build_policy(mode, strategy) })
    }

    #[test]
    fn s1_single_request_conservative_swap_completes_with_no_preemption() {
        let trace = vec![Request::new(0, 0.0, 200, 100)];
        let mut sim = Simulator::new(
            10000,
            10000,
            timing(),
            scheduler(PreemptionMode::Swap, PreemptionStrategy::Conservative),
            trace,
        );
        let summary = sim.run_to_completion().unwrap();
        assert_eq!(summary.statistics.completed_count, 1);
        assert_eq!(summary.statistics.total_swapped_out, 0);
        assert_eq!(summary.statistics.total_sacrifices, 0);
        // Exact: 100 steps, step k costs d0 + d1*(200+k+1) tokens-wise;
        // sum_{k=0}^{99}(201+k) = 25050, so total = 0.3 + 0.00032*25050 = 8.316.
        assert!((sim.current_time() - 8.316).abs() < 1e-9);
    }

    #[test]
    fn s2_second_request_blocks_at_head_until_first_completes() {
        let trace = vec![Request::new(0, 0.0, 8000, 10), Request::new(1, 0.001, 8000, 10)];
        let mut sim = Simulator::new(
            10000,
            10000,
            timing(),
            scheduler(PreemptionMode::Sacrifice, PreemptionStrategy::Aggressive),
            trace,
        );
        let summary = sim.run_to_completion().unwrap();
        assert_eq!(summary.statistics.completed_count, 2);
        assert_eq!(summary.statistics.total_sacrifices, 0);
    }

    #[test]
    fn sacrifice_and_completion_events_reach_the_logger() {
        let trace = vec![
            Request::new(0, 0.0, 60, 1000),
            Request::new(1, 0.0, 39, 1000),
        ];
        let mut sim = Simulator::new(
            100,
            100,
            timing(),
            scheduler(PreemptionMode::Sacrifice, PreemptionStrategy::Aggressive),
            trace,
        );
        sim.run_to_completion().unwrap();

        let events = sim.logger().events();
        assert!(events.iter().any(|e| matches!(e, SimEvent::Sacrifice { req_id: 1, .. })));
        assert!(events.iter().any(|e| matches!(e, SimEvent::Completion { .. })));
        assert!(events.iter().any(|e| matches!(e, SimEvent::Arrival { .. })));
    }

    #[test]
    fn empty_trace_returns_immediately_with_zero_metrics() {
        let mut sim = Simulator::new(
            1000,
            1000,
            timing(),
            scheduler(PreemptionMode::Sacrifice, PreemptionStrategy::Aggressive),
            Vec::new(),
        );
        let summary = sim.run_to_completion().unwrap();
        assert_eq!(summary.statistics.total_requests, 0);
    }

    #[test]
    fn m_total_zero_never_admits_anything() {
        let trace = vec![Request::new(0, 0.0, 10, 5)];
        let mut sim = Simulator::new(
            0,
            1000,
            timing(),
            scheduler(PreemptionMode::Sacrifice, PreemptionStrategy::Conservative),
            trace,
        );
        let summary = sim.run_to_completion().unwrap();
        assert_eq!(summary.statistics.completed_count, 0);
        assert_eq!(summary.statistics.waiting_count, 1);
    }

    #[test]
    fn execution_batch_selection_always_includes_first_request_alone_over_budget() {
        let mut running = VecDeque::new();
        running.push_back({
            let mut r = Request::new(0, 0.0, 500, 10);
            r.status = crate::request::RequestStatus::Running;
            r
        });
        let (count, tokens, ids) = select_execution_batch(&running, 100);
        assert_eq!(count, 1);
        assert_eq!(tokens, 501); // +1 per request for the token produced this step
        assert!(ids.contains(&0));
    }
}
