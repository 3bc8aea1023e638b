//! Per-request state: identity, lifecycle status, and append-only event histories.

/// Which of the four containers a request currently occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestStatus {
    Waiting,
    Running,
    Swapped,
    Completed,
}

/// One swap-out/swap-in pair. `swap_in_time` is filled in when the request is
/// later re-admitted from SWAPPED; until then it is `None`.
#[derive(Clone, Debug)]
pub struct SwapEvent {
    pub swap_out_time: f64,
    pub swap_in_time: Option<f64>,
    pub decode_position: u64,
    pub memory_size: u64,
}

/// A sacrifice: decode progress discarded, request returned to WAITING.
/// `running_count_same_position` and `total_running_count` are contextual
/// snapshots taken at the moment of eviction, used offline to recover
/// conditional preemption probabilities.
#[derive(Clone, Debug)]
pub struct SacrificeEvent {
    pub time: f64,
    pub decode_position: u64,
    pub memory_freed: u64,
    pub running_count_same_position: usize,
    pub total_running_count: usize,
}

/// A single request moving through WAITING / RUNNING / SWAPPED / COMPLETED.
#[derive(Clone, Debug)]
pub struct Request {
    pub req_id: u64,
    pub arrival_time: f64,
    pub prefill_length: u64,
    pub decode_length: u64,

    pub status: RequestStatus,
    pub current_decode_position: u64,

    pub enter_running_times: Vec<f64>,
    pub exit_running_times: Vec<f64>,
    pub completion_time: Option<f64>,

    pub swap_events: Vec<SwapEvent>,
    pub sacrifice_events: Vec<SacrificeEvent>,
}

impl Request {
    pub fn new(req_id: u64, arrival_time: f64, prefill_length: u64, decode_length: u64) -> Self {
        Self {
            req_id,
            arrival_time,
            prefill_length,
            decode_length,
            status: RequestStatus::Waiting,
            current_decode_position: 0,
            enter_running_times: Vec::new(),
            exit_running_times: Vec::new(),
            completion_time: None,
            swap_events: Vec::new(),
            sacrifice_events: Vec::new(),
        }
    }

    /// Tokens needed to seat this request in RUNNING.
    pub fn memory_requirement(&self) -> u64 {
        self.prefill_length + self.current_decode_position
    }

    /// GPU tokens currently occupied; zero unless RUNNING.
    pub fn current_memory_usage(&self) -> u64 {
        match self.status {
            RequestStatus::Running => self.memory_requirement(),
            _ => 0,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.current_decode_position >= self.decode_length
    }

    pub fn total_delay(&self) -> Option<f64> {
        self.completion_time.map(|t| t - self.arrival_time)
    }

    pub fn waiting_time(&self) -> Option<f64> {
        self.enter_running_times.first().map(|t| t - self.arrival_time)
    }

    pub fn execution_time(&self) -> Option<f64> {
        match (self.completion_time, self.enter_running_times.first()) {
            (Some(c), Some(first)) => Some(c - first),
            _ => None,
        }
    }

    pub fn swap_count(&self) -> usize {
        self.swap_events.len()
    }

    pub fn sacrifice_count(&self) -> usize {
        self.sacrifice_events.len()
    }

    pub fn total_swapped_time(&self) -> f64 {
        self.swap_events
            .iter()
            .filter_map(|e| e.swap_in_time.map(|t_in| t_in - e.swap_out_time))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_requirement_tracks_decode_position() {
        let mut r = Request::new(0, 0.0, 100, 50);
        assert_eq!(r.memory_requirement(), 100);
        r.current_decode_position = 10;
        assert_eq!(r.memory_requirement(), 110);
    }

    #[test]
    fn current_memory_usage_zero_unless_running() {
        let mut r = Request::new(0, 0.0, 100, 50);
        r.current_decode_position = 10;
        assert_eq!(r.current_memory_usage(), 0);
        r.status = RequestStatus::Running;
        assert_eq!(r.current_memory_usage(), 110);
    }

    #[test]
    fn is_completed_when_decode_position_reaches_target() {
        let mut r = Request::new(0, 0.0, 10, 5);
        assert!(!r.is_completed());
        r.current_decode_position = 5;
        assert!(r.is_completed());
    }

    #[test]
    fn waiting_time_is_first_enter_running_minus_arrival() {
        let mut r = Request::new(0, 3.0, 10, 5);
        assert_eq!(r.waiting_time(), None);
        r.enter_running_times.push(7.5);
        assert_eq!(r.waiting_time(), Some(4.5));
    }

    #[test]
    fn total_swapped_time_only_counts_closed_intervals() {
        let mut r = Request::new(0, 0.0, 10, 5);
        r.swap_events.push(SwapEvent {
            swap_out_time: 1.0,
            swap_in_time: Some(3.0),
            decode_position: 0,
            memory_size: 10,
        });
        r.swap_events.push(SwapEvent {
            swap_out_time: 5.0,
            swap_in_time: None,
            decode_position: 0,
            memory_size: 10,
        });
        assert_eq!(r.total_swapped_time(), 2.0);
    }
}
