//! One-shot replacement of the not-yet-arrived tail of a trace.
//!
//! Unlike `AdmissionControlOverlay`, this does not decorate a `SchedulingPolicy`
//! cycle — it acts on the simulator's pending-arrivals queue at a single batch
//! boundary, so it lives alongside the `Scheduler` trait rather than
//! implementing it.

use std::collections::VecDeque;

use crate::generator::{generate, GenerationConfig};
use crate::request::Request;

/// Fires once, when `current_batch_id == truncation_batch_id` is reached.
pub struct TruncationOverlay {
    pub truncation_batch_id: u64,
    pub replacement_config: GenerationConfig,
    fired: bool,
}

/// What happened when the overlay fired, for the run summary.
#[derive(Clone, Debug)]
pub struct TruncationReport {
    pub truncation_batch_id: u64,
    pub truncation_time: f64,
    pub new_requests_start_time: f64,
    pub new_requests_end_time: f64,
    pub discarded_count: usize,
    pub replacement_count: usize,
}

impl TruncationOverlay {
    pub fn new(truncation_batch_id: u64, replacement_config: GenerationConfig) -> Self {
        Self { truncation_batch_id, replacement_config, fired: false }
    }

    /// Called once per batch boundary with the simulator's current batch id,
    /// simulated time, the highest `req_id` issued so far, and the pending
    /// (not-yet-arrived) trace. If this is the truncation boundary and the
    /// overlay hasn't already fired, discards the pending trace's tail and
    /// splices in a freshly generated one, offset to start at `current_time`
    /// and renumbered above `next_req_id`. Returns `None` on every other call.
    pub fn maybe_apply(
        &mut self,
        current_batch_id: u64,
        current_time: f64,
        next_req_id: u64,
        pending: &mut VecDeque<Request>,
    ) -> Option<TruncationReport> {
        if self.fired || current_batch_id != self.truncation_batch_id {
            return None;
        }
        self.fired = true;

        let discarded_count = pending.len();
        pending.clear();

        let mut replacement = generate(&self.replacement_config);
        let replacement_count = replacement.len();

        let start_time = replacement.first().map(|r| r.arrival_time).unwrap_or(0.0);
        let end_time = replacement.last().map(|r| r.arrival_time).unwrap_or(0.0);

        for (offset, req) in replacement.iter_mut().enumerate() {
            req.arrival_time += current_time;
            req.req_id = next_req_id + offset as u64;
        }
        pending.extend(replacement);

        Some(TruncationReport {
            truncation_batch_id: self.truncation_batch_id,
            truncation_time: current_time,
            new_requests_start_time: start_time + current_time,
            new_requests_end_time: end_time + current_time,
            discarded_count,
            replacement_count,
        })
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::RequestClass;

    fn config() -> GenerationConfig {
        GenerationConfig {
            classes: vec![RequestClass { prefill_length: 10, decode_length: 10, rate: 2.0 }],
            num_requests: 5,
            seed: 7,
        }
    }

    #[test]
    fn fires_once_at_target_batch_and_replaces_pending_tail() {
        let mut overlay = TruncationOverlay::new(3, config());
        let mut pending = VecDeque::from(vec![Request::new(10, 5.0, 1, 1), Request::new(11, 6.0, 1, 1)]);

        assert!(overlay.maybe_apply(2, 1.0, 100, &mut pending).is_none());
        assert_eq!(pending.len(), 2);

        let report = overlay.maybe_apply(3, 4.0, 100, &mut pending).unwrap();
        assert_eq!(report.discarded_count, 2);
        assert_eq!(report.replacement_count, 5);
        assert_eq!(pending.len(), 5);
        assert!(pending.iter().all(|r| r.req_id >= 100));
        assert!(pending.iter().all(|r| r.arrival_time >= 4.0));

        assert!(overlay.maybe_apply(3, 10.0, 200, &mut pending).is_none());
        assert_eq!(pending.len(), 5);
    }

    #[test]
    fn arrival_times_are_offset_by_current_time_not_generation_time() {
        let mut overlay = TruncationOverlay::new(0, config());
        let mut pending = VecDeque::new();
        let report = overlay.maybe_apply(0, 42.0, 0, &mut pending).unwrap();
        assert_eq!(report.truncation_time, 42.0);
        assert!(pending.iter().all(|r| r.arrival_time >= 42.0));
    }
}
