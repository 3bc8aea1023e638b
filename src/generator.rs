//! Trace generator contract: multi-class Poisson superposition.
//!
//! Given classes `{(prefill_i, decode_i, rate_i)}`, generates N requests whose
//! inter-arrival times are i.i.d. exponential per class (independent Poisson
//! streams superposed). Counts per class are proportional to
//! `rate_i / sum(rate)`. Deterministic given the same seed: each class draws
//! from its own `StdRng` seeded from `(seed, class_index)`, consumed in
//! class order, so two runs with the same config+seed produce an identical
//! merged, sorted trace.

use rand::SeedableRng;
use rand_distr::{Distribution, Exp};

use crate::request::Request;

/// One request class: a fixed prefill/decode shape arriving at `rate`.
#[derive(Clone, Debug)]
pub struct RequestClass {
    pub prefill_length: u64,
    pub decode_length: u64,
    pub rate: f64,
}

/// Parameters for one generation call.
#[derive(Clone, Debug)]
pub struct GenerationConfig {
    pub classes: Vec<RequestClass>,
    pub num_requests: usize,
    pub seed: u64,
}

impl GenerationConfig {
    /// Returns a copy with each class's rate replaced by `rate_list`, keeping
    /// `(prefill, decode)` unchanged. `(prefill_i, decode_i)` are preserved;
    /// only the arrival intensity changes.
    pub fn with_rate_override(&self, rate_list: &[f64]) -> Self {
        assert_eq!(
            rate_list.len(),
            self.classes.len(),
            "rate_list length must match the number of classes"
        );
        let classes = self
            .classes
            .iter()
            .zip(rate_list)
            .map(|(c, &rate)| RequestClass {
                prefill_length: c.prefill_length,
                decode_length: c.decode_length,
                rate,
            })
            .collect();
        Self {
            classes,
            num_requests: self.num_requests,
            seed: self.seed,
        }
    }
}

/// Generate a single trace: requests sorted by arrival time, with fresh
/// sequential `req_id`s starting at 0. The caller is responsible for any
/// offset/renumbering needed to splice this into an existing run (see
/// `overlays::truncation`).
pub fn generate(config: &GenerationConfig) -> Vec<Request> {
    let total_rate: f64 = config.classes.iter().map(|c| c.rate).sum();
    let counts = class_counts(config.classes.len(), config.num_requests, &config.classes, total_rate);

    let mut all: Vec<Request> = Vec::with_capacity(config.num_requests);
    for (class_idx, (class, count)) in config.classes.iter().zip(counts).enumerate() {
        if count == 0 {
            continue;
        }
        let mut rng = rand::rngs::StdRng::seed_from_u64(config.seed.wrapping_add(class_idx as u64));
        let exp = Exp::new(class.rate).expect("class rate must be positive");
        let mut t = 0.0f64;
        for _ in 0..count {
            let inter_arrival: f64 = exp.sample(&mut rng);
            t += inter_arrival;
            all.push(Request::new(0, round4(t), class.prefill_length, class.decode_length));
        }
    }

    all.sort_by(|a, b| a.arrival_time.total_cmp(&b.arrival_time));
    for (i, req) in all.iter_mut().enumerate() {
        req.req_id = i as u64;
    }
    all
}

fn class_counts(n: usize, num_requests: usize, classes: &[RequestClass], total_rate: f64) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let mut counts = Vec::with_capacity(n);
    let mut remaining = num_requests;
    for class in classes.iter().take(n - 1) {
        let weight = class.rate / total_rate;
        let count = (num_requests as f64 * weight) as usize;
        counts.push(count.min(remaining));
        remaining -= counts.last().unwrap();
    }
    counts.push(remaining);
    counts
}

fn round4(t: f64) -> f64 {
    (t * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> GenerationConfig {
        GenerationConfig {
            classes: vec![
                RequestClass { prefill_length: 20, decode_length: 20, rate: 4.0 },
                RequestClass { prefill_length: 10, decode_length: 10, rate: 2.0 },
            ],
            num_requests: 100,
            seed: 42,
        }
    }

    #[test]
    fn generates_requested_count_sorted_by_arrival() {
        let trace = generate(&sample_config());
        assert_eq!(trace.len(), 100);
        for w in trace.windows(2) {
            assert!(w[0].arrival_time <= w[1].arrival_time);
        }
        for (i, req) in trace.iter().enumerate() {
            assert_eq!(req.req_id, i as u64);
        }
    }

    #[test]
    fn same_seed_is_reproducible() {
        let a = generate(&sample_config());
        let b = generate(&sample_config());
        for (ra, rb) in a.iter().zip(b.iter()) {
            assert_eq!(ra.arrival_time, rb.arrival_time);
            assert_eq!(ra.prefill_length, rb.prefill_length);
            assert_eq!(ra.decode_length, rb.decode_length);
        }
    }

    #[test]
    fn rate_override_keeps_shapes_changes_rates() {
        let config = sample_config();
        let overridden = config.with_rate_override(&[1.0, 8.0]);
        assert_eq!(overridden.classes[0].prefill_length, 20);
        assert_eq!(overridden.classes[0].rate, 1.0);
        assert_eq!(overridden.classes[1].rate, 8.0);
    }

    #[test]
    fn class_weights_are_proportional_to_rate() {
        let config = sample_config();
        let trace = generate(&config);
        let type0 = trace.iter().filter(|r| r.decode_length == 20).count();
        let type1 = trace.iter().filter(|r| r.decode_length == 10).count();
        assert_eq!(type0 + type1, 100);
        // rate 4.0 vs 2.0 => roughly 2:1 split.
        assert!(type0 > type1);
    }
}
