//! Per-batch and per-request output: the three CSV streams the simulator
//! produces (batch snapshots, completed-request trace, event log).

use std::path::Path;

use serde::Serialize;

use crate::error::TraceError;
use crate::request::Request;
use crate::state::SystemSnapshot;

#[derive(Serialize)]
struct BatchSnapshotRow {
    time: f64,
    batch_id: u64,
    batch_count: usize,
    batch_tokens: u64,
    running_count: usize,
    waiting_count: usize,
    swapped_count: usize,
    gpu_memory_used: u64,
    memory_utilization: f64,
    batch_duration: f64,
    completed_count: u64,
    batch_sacrifice_count: u64,
}

#[derive(Serialize)]
struct RequestTraceRow {
    req_id: u64,
    arrival_time: f64,
    prefill_length: u64,
    decode_length: u64,
    completion_time: f64,
    total_delay: f64,
    waiting_time: f64,
    execution_time: f64,
    swap_count: usize,
    total_swapped_time: f64,
    sacrifice_count: usize,
}

/// Event kinds recorded to the event log. `details` is opaque free text.
pub enum SimEvent {
    Arrival { time: f64, batch_id: u64, req_id: u64 },
    Completion { time: f64, batch_id: u64, req_id: u64 },
    SwapOut { time: f64, batch_id: u64, req_id: u64 },
    SwapIn { time: f64, batch_id: u64, req_id: u64 },
    Sacrifice { time: f64, batch_id: u64, req_id: u64, details: String },
}

#[derive(Serialize)]
struct EventRow {
    time: f64,
    batch_id: u64,
    event_type: &'static str,
    req_id: u64,
    details: String,
}

impl SimEvent {
    fn into_row(self) -> EventRow {
        match self {
            SimEvent::Arrival { time, batch_id, req_id } => {
                EventRow { time, batch_id, event_type: "arrival", req_id, details: String::new() }
            }
            SimEvent::Completion { time, batch_id, req_id } => {
                EventRow { time, batch_id, event_type: "completion", req_id, details: String::new() }
            }
            SimEvent::SwapOut { time, batch_id, req_id } => {
                EventRow { time, batch_id, event_type: "swap_out", req_id, details: String::new() }
            }
            SimEvent::SwapIn { time, batch_id, req_id } => {
                EventRow { time, batch_id, event_type: "swap_in", req_id, details: String::new() }
            }
            SimEvent::Sacrifice { time, batch_id, req_id, details } => {
                EventRow { time, batch_id, event_type: "sacrifice", req_id, details }
            }
        }
    }
}

/// Accumulates the three output streams in memory and flushes them to CSV on
/// demand rather than streaming writes per row (traces here are small enough
/// to hold entirely in memory).
#[derive(Default)]
pub struct EventLogger {
    snapshots: Vec<SystemSnapshot>,
    events: Vec<SimEvent>,
}

impl EventLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_snapshot(&mut self, snapshot: SystemSnapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn record_event(&mut self, event: SimEvent) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[SimEvent] {
        &self.events
    }

    pub fn write_batch_snapshots(&self, path: &Path) -> Result<(), TraceError> {
        let mut writer = csv::Writer::from_path(path).map_err(|source| io_err(path, source))?;
        for snap in &self.snapshots {
            let row = BatchSnapshotRow {
                time: snap.time,
                batch_id: snap.batch_id,
                batch_count: snap.actual_batch_count,
                batch_tokens: snap.actual_batch_tokens,
                running_count: snap.running_ids.len(),
                waiting_count: snap.waiting_queue_ids.len(),
                swapped_count: snap.swapped_queue_ids.len(),
                gpu_memory_used: snap.gpu_memory_used,
                memory_utilization: snap.memory_utilization(),
                batch_duration: snap.batch_duration,
                completed_count: snap.num_completed,
                batch_sacrifice_count: snap.batch_sacrifice_count,
            };
            writer.serialize(row).map_err(|source| csv_err(path, source))?;
        }
        writer.flush().map_err(|source| io_err(path, source))?;
        Ok(())
    }

    pub fn write_request_trace(&self, path: &Path, completed: &[Request]) -> Result<(), TraceError> {
        let mut writer = csv::Writer::from_path(path).map_err(|source| io_err(path, source))?;
        for req in completed {
            let row = RequestTraceRow {
                req_id: req.req_id,
                arrival_time: req.arrival_time,
                prefill_length: req.prefill_length,
                decode_length: req.decode_length,
                completion_time: req.completion_time.unwrap_or_default(),
                total_delay: req.total_delay().unwrap_or_default(),
                waiting_time: req.waiting_time().unwrap_or_default(),
                execution_time: req.execution_time().unwrap_or_default(),
                swap_count: req.swap_count(),
                total_swapped_time: req.total_swapped_time(),
                sacrifice_count: req.sacrifice_count(),
            };
            writer.serialize(row).map_err(|source| csv_err(path, source))?;
        }
        writer.flush().map_err(|source| io_err(path, source))?;
        Ok(())
    }

    pub fn write_events(&self, path: &Path) -> Result<(), TraceError> {
        let mut writer = csv::Writer::from_path(path).map_err(|source| io_err(path, source))?;
        for event in self.events.iter() {
            let row = match event {
                SimEvent::Arrival { time, batch_id, req_id } => {
                    SimEvent::Arrival { time: *time, batch_id: *batch_id, req_id: *req_id }.into_row()
                }
                SimEvent::Completion { time, batch_id, req_id } => {
                    SimEvent::Completion { time: *time, batch_id: *batch_id, req_id: *req_id }.into_row()
                }
                SimEvent::SwapOut { time, batch_id, req_id } => {
                    SimEvent::SwapOut { time: *time, batch_id: *batch_id, req_id: *req_id }.into_row()
                }
                SimEvent::SwapIn { time, batch_id, req_id } => {
                    SimEvent::SwapIn { time: *time, batch_id: *batch_id, req_id: *req_id }.into_row()
                }
                SimEvent::Sacrifice { time, batch_id, req_id, details } => SimEvent::Sacrifice {
                    time: *time,
                    batch_id: *batch_id,
                    req_id: *req_id,
                    details: details.clone(),
                }
                .into_row(),
            };
            writer.serialize(row).map_err(|source| csv_err(path, source))?;
        }
        writer.flush().map_err(|source| io_err(path, source))?;
        Ok(())
    }
}

fn io_err(path: &Path, source: impl std::fmt::Display) -> TraceError {
    TraceError::Io {
        path: path.display().to_string(),
        source: std::io::Error::new(std::io::ErrorKind::Other, source.to_string()),
    }
}

fn csv_err(path: &Path, source: csv::Error) -> TraceError {
    TraceError::Csv { path: path.display().to_string(), source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SystemState;

    #[test]
    fn writes_one_row_per_recorded_snapshot() {
        let state = SystemState::new(100, 100);
        let mut logger = EventLogger::new();
        logger.record_snapshot(state.snapshot(0.0, 0, 0.1));
        logger.record_snapshot(state.snapshot(0.1, 1, 0.1));

        let file = tempfile::NamedTempFile::new().unwrap();
        logger.write_batch_snapshots(file.path()).unwrap();
        let contents = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(contents.lines().count(), 3); // header + 2 rows
    }

    #[test]
    fn writes_completed_requests_only() {
        let logger = EventLogger::new();
        let mut req = Request::new(0, 0.0, 10, 5);
        req.completion_time = Some(1.0);
        let file = tempfile::NamedTempFile::new().unwrap();
        logger.write_request_trace(file.path(), std::slice::from_ref(&req)).unwrap();
        let contents = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
