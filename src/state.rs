//! System state: ordered containers, memory accounting, and state transitions.

use std::collections::VecDeque;

use crate::error::SimError;
use crate::request::{Request, RequestStatus, SacrificeEvent, SwapEvent};

/// Snapshot of the system at one executed batch boundary.
#[derive(Clone, Debug)]
pub struct SystemSnapshot {
    pub time: f64,
    pub batch_id: u64,

    pub waiting_queue_ids: Vec<u64>,
    pub running_ids: Vec<u64>,
    pub swapped_queue_ids: Vec<u64>,

    pub gpu_memory_used: u64,
    pub system_memory_total: u64,

    pub batch_duration: f64,

    pub num_completed: u64,
    pub num_admitted: u64,
    pub num_swapped_out: u64,
    pub num_swapped_in: u64,

    pub actual_batch_count: usize,
    pub actual_batch_tokens: u64,
    pub batch_sacrifice_count: u64,
}

impl SystemSnapshot {
    pub fn memory_utilization(&self) -> f64 {
        if self.system_memory_total == 0 {
            0.0
        } else {
            self.gpu_memory_used as f64 / self.system_memory_total as f64
        }
    }
}

/// A container transition worth logging, recorded as it happens and drained
/// by the simulator after each scheduling cycle so the event log stays in
/// sync without every policy having to know about the logger.
#[derive(Clone, Debug)]
pub enum TransitionEvent {
    SwapOut { req_id: u64, time: f64 },
    SwapIn { req_id: u64, time: f64 },
    Sacrifice { req_id: u64, time: f64, decode_position: u64, memory_freed: u64 },
}

/// Aggregate, point-in-time statistics (for end-of-run reporting).
#[derive(Clone, Debug)]
pub struct Statistics {
    pub total_requests: usize,
    pub waiting_count: usize,
    pub running_count: usize,
    pub swapped_count: usize,
    pub completed_count: usize,
    pub total_admitted: u64,
    pub total_swapped_out: u64,
    pub total_swapped_in: u64,
    pub total_sacrifices: u64,
    pub gpu_memory_used: u64,
    pub gpu_memory_total: u64,
    pub memory_utilization: f64,
}

/// Authoritative scheduler state: the four ordered containers plus memory
/// accounting and cumulative counters. Owned exclusively by the simulator;
/// policies mutate it through the methods below so every transition keeps the
/// request's status field and its container membership in lockstep.
pub struct SystemState {
    pub m_total: u64,
    pub b: u64,

    pub waiting: VecDeque<Request>,
    pub running: VecDeque<Request>,
    pub swapped: VecDeque<Request>,
    pub completed: Vec<Request>,

    pub total_completed: u64,
    pub total_admitted: u64,
    pub total_swapped_out: u64,
    pub total_swapped_in: u64,
    pub total_sacrifices: u64,
    pub batch_sacrifices: u64,

    /// Populated by the simulator before each snapshot; distinct from
    /// `running.len()` because execution under B may select only a prefix.
    pub actual_batch_count: usize,
    pub actual_batch_tokens: u64,

    /// Swap/sacrifice transitions since the simulator last drained them.
    pub transitions: Vec<TransitionEvent>,
}

impl SystemState {
    pub fn new(m_total: u64, b: u64) -> Self {
        Self {
            m_total,
            b,
            waiting: VecDeque::new(),
            running: VecDeque::new(),
            swapped: VecDeque::new(),
            completed: Vec::new(),
            total_completed: 0,
            total_admitted: 0,
            total_swapped_out: 0,
            total_swapped_in: 0,
            total_sacrifices: 0,
            batch_sacrifices: 0,
            actual_batch_count: 0,
            actual_batch_tokens: 0,
            transitions: Vec::new(),
        }
    }

    pub fn gpu_memory_used(&self) -> u64 {
        self.running.iter().map(Request::current_memory_usage).sum()
    }

    /// May be transiently negative during Phase 2's expected-growth check;
    /// restored to non-negative before the next snapshot boundary.
    pub fn available_memory(&self) -> i64 {
        self.m_total as i64 - self.gpu_memory_used() as i64
    }

    pub fn is_memory_overloaded(&self) -> bool {
        self.gpu_memory_used() > self.m_total
    }

    pub fn can_admit(&self, request: &Request) -> bool {
        request.memory_requirement() as i64 <= self.available_memory()
    }

    pub fn add_to_waiting(&mut self, mut request: Request) {
        request.status = RequestStatus::Waiting;
        self.waiting.push_back(request);
    }

    /// Admit a request into RUNNING. Fatal if the hard memory cap (`M_total`)
    /// would be exceeded — that is always a policy bug, never a recoverable
    /// condition (B is not checked here; it gates execution, not admission).
    pub fn admit_to_batch(&mut self, mut request: Request, current_time: f64) -> Result<(), SimError> {
        if !self.can_admit(&request) {
            return Err(SimError::InvariantViolation {
                req_id: request.req_id,
                required: request.memory_requirement(),
                available: self.available_memory(),
            });
        }
        request.status = RequestStatus::Running;
        request.enter_running_times.push(current_time);
        self.total_admitted += 1;
        self.running.push_back(request);
        Ok(())
    }

    fn take_from_running(&mut self, req_id: u64, current_time: f64) -> Option<Request> {
        let idx = self.running.iter().position(|r| r.req_id == req_id)?;
        let mut req = self.running.remove(idx)?;
        req.exit_running_times.push(current_time);
        Some(req)
    }

    pub fn swap_out(&mut self, req_id: u64, current_time: f64) {
        let Some(mut req) = self.take_from_running(req_id, current_time) else {
            return;
        };
        req.swap_events.push(SwapEvent {
            swap_out_time: current_time,
            swap_in_time: None,
            decode_position: req.current_decode_position,
            memory_size: req.memory_requirement(),
        });
        req.status = RequestStatus::Swapped;
        self.total_swapped_out += 1;
        self.transitions.push(TransitionEvent::SwapOut { req_id, time: current_time });
        self.swapped.push_back(req);
    }

    /// Admit a request from SWAPPED, stamping the matching swap event's
    /// `swap_in_time`.
    pub fn swap_in_by_id(&mut self, req_id: u64, current_time: f64) -> Result<(), SimError> {
        let Some(idx) = self.swapped.iter().position(|r| r.req_id == req_id) else {
            return Ok(());
        };
        let mut req = self.swapped.remove(idx).unwrap();
        if let Some(last) = req.swap_events.last_mut() {
            last.swap_in_time = Some(current_time);
        }
        self.admit_to_batch(req, current_time)?;
        self.total_swapped_in += 1;
        self.transitions.push(TransitionEvent::SwapIn { req_id, time: current_time });
        Ok(())
    }

    /// Evict a RUNNING request back to WAITING, discarding its decode
    /// progress. Returns the sacrificed request so the caller can batch it
    /// into a Phase-3 re-enqueue rather than enqueuing it immediately.
    pub fn sacrifice(&mut self, req_id: u64, current_time: f64) -> Option<Request> {
        let same_position_count = self
            .running
            .iter()
            .find(|r| r.req_id == req_id)
            .map(|victim| {
                self.running
                    .iter()
                    .filter(|r| r.current_decode_position == victim.current_decode_position)
                    .count()
            })?;
        let total_running_count = self.running.len();

        let mut req = self.take_from_running(req_id, current_time)?;
        let decode_position = req.current_decode_position;
        let memory_freed = req.memory_requirement();
        req.sacrifice_events.push(SacrificeEvent {
            time: current_time,
            decode_position,
            memory_freed,
            running_count_same_position: same_position_count,
            total_running_count,
        });
        req.current_decode_position = 0;
        req.status = RequestStatus::Waiting;
        self.total_sacrifices += 1;
        self.batch_sacrifices += 1;
        self.transitions.push(TransitionEvent::Sacrifice { req_id, time: current_time, decode_position, memory_freed });
        Some(req)
    }

    /// Insert a batch of preempted requests at the head of WAITING,
    /// preserving their relative order (Phase 3 of the aggressive cycle).
    pub fn requeue_at_head(&mut self, preempted: Vec<Request>) {
        for req in preempted.into_iter().rev() {
            self.waiting.push_front(req);
        }
    }

    pub fn complete_request(&mut self, req_id: u64, current_time: f64) {
        let Some(mut req) = self.take_from_running(req_id, current_time) else {
            return;
        };
        req.status = RequestStatus::Completed;
        req.completion_time = Some(current_time);
        self.total_completed += 1;
        self.completed.push(req);
    }

    pub fn snapshot(&self, time: f64, batch_id: u64, batch_duration: f64) -> SystemSnapshot {
        SystemSnapshot {
            time,
            batch_id,
            waiting_queue_ids: self.waiting.iter().map(|r| r.req_id).collect(),
            running_ids: self.running.iter().map(|r| r.req_id).collect(),
            swapped_queue_ids: self.swapped.iter().map(|r| r.req_id).collect(),
            gpu_memory_used: self.gpu_memory_used(),
            system_memory_total: self.m_total,
            batch_duration,
            num_completed: self.total_completed,
            num_admitted: self.total_admitted,
            num_swapped_out: self.total_swapped_out,
            num_swapped_in: self.total_swapped_in,
            actual_batch_count: self.actual_batch_count,
            actual_batch_tokens: self.actual_batch_tokens,
            batch_sacrifice_count: self.batch_sacrifices,
        }
    }

    pub fn statistics(&self) -> Statistics {
        let gpu_memory_used = self.gpu_memory_used();
        Statistics {
            total_requests: self.waiting.len() + self.running.len() + self.swapped.len() + self.completed.len(),
            waiting_count: self.waiting.len(),
            running_count: self.running.len(),
            swapped_count: self.swapped.len(),
            completed_count: self.completed.len(),
            total_admitted: self.total_admitted,
            total_swapped_out: self.total_swapped_out,
            total_swapped_in: self.total_swapped_in,
            total_sacrifices: self.total_sacrifices,
            gpu_memory_used,
            gpu_memory_total: self.m_total,
            memory_utilization: if self.m_total == 0 {
                0.0
            } else {
                gpu_memory_used as f64 / self.m_total as f64
            },
        }
    }
}
