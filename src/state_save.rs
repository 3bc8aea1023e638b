//! Suspend/resume format: header comments plus a CSV body of in-flight
//! requests. Completed requests are never saved — they carry no state the
//! resumed run needs.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TraceError;
use crate::request::{Request, RequestStatus};

#[derive(Debug, Serialize, Deserialize)]
struct StateRow {
    req_id: u64,
    status: String,
    arrival_time: f64,
    prefill_length: u64,
    decode_length: u64,
    current_decode_position: u64,
    first_enter_running_time: f64,
    completion_time: f64,
    swap_count: usize,
    sacrifice_count: usize,
}

fn status_to_str(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::Waiting => "waiting",
        RequestStatus::Running => "running",
        RequestStatus::Swapped => "swapped",
        RequestStatus::Completed => "completed",
    }
}

fn status_from_str(s: &str) -> RequestStatus {
    match s {
        "running" => RequestStatus::Running,
        "swapped" => RequestStatus::Swapped,
        _ => RequestStatus::Waiting,
    }
}

/// Write every non-completed request across `waiting`, `running`, `swapped`
/// to `path`, preceded by `# `-prefixed header comments.
pub fn save_state(
    path: &Path,
    current_time: f64,
    batch_id: u64,
    requests: impl IntoIterator<Item = Request>,
) -> Result<(), TraceError> {
    let mut file = std::fs::File::create(path).map_err(|source| TraceError::Io {
        path: path.display().to_string(),
        source,
    })?;
    writeln!(file, "# current_time={current_time}").map_err(|source| io_err(path, source))?;
    writeln!(file, "# batch_id={batch_id}").map_err(|source| io_err(path, source))?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    for req in requests {
        if matches!(req.status, RequestStatus::Completed) {
            continue;
        }
        let row = StateRow {
            req_id: req.req_id,
            status: status_to_str(req.status).to_string(),
            arrival_time: req.arrival_time,
            prefill_length: req.prefill_length,
            decode_length: req.decode_length,
            current_decode_position: req.current_decode_position,
            first_enter_running_time: req.enter_running_times.first().copied().unwrap_or(0.0),
            completion_time: req.completion_time.unwrap_or_default(),
            swap_count: req.swap_count(),
            sacrifice_count: req.sacrifice_count(),
        };
        writer.serialize(row).map_err(|source| csv_err(path, source))?;
    }
    let body = writer.into_inner().map_err(|e| csv_err(path, e.into_error()))?;
    file.write_all(&body).map_err(|source| io_err(path, source))?;
    Ok(())
}

/// Load a saved state. Arrival times are normalized so that the minimum
/// arrival becomes 0; the returned `resume_time` is `max_arrival - min_arrival`.
pub fn load_state(path: &Path) -> Result<(Vec<Request>, f64), TraceError> {
    let text = std::fs::read_to_string(path).map_err(|source| TraceError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let body: String = text.lines().filter(|l| !l.starts_with('#')).collect::<Vec<_>>().join("\n");

    let mut reader = csv::Reader::from_reader(body.as_bytes());
    let mut requests = Vec::new();
    for result in reader.deserialize() {
        let row: StateRow = result.map_err(|source| TraceError::Csv {
            path: path.display().to_string(),
            source,
        })?;
        let mut req = Request::new(row.req_id, row.arrival_time, row.prefill_length, row.decode_length);
        req.status = status_from_str(&row.status);
        req.current_decode_position = row.current_decode_position;
        if row.first_enter_running_time != 0.0 || matches!(req.status, RequestStatus::Running | RequestStatus::Swapped) {
            req.enter_running_times.push(row.first_enter_running_time);
        }
        requests.push(req);
    }

    let min_arrival = requests.iter().map(|r| r.arrival_time).fold(f64::INFINITY, f64::min);
    let max_arrival = requests.iter().map(|r| r.arrival_time).fold(f64::NEG_INFINITY, f64::max);
    let (min_arrival, resume_time) = if requests.is_empty() {
        (0.0, 0.0)
    } else {
        (min_arrival, max_arrival - min_arrival)
    };

    for req in requests.iter_mut() {
        req.arrival_time -= min_arrival;
    }

    Ok((requests, resume_time))
}

fn io_err(path: &Path, source: std::io::Error) -> TraceError {
    TraceError::Io { path: path.display().to_string(), source }
}

fn csv_err(path: &Path, source: csv::Error) -> TraceError {
    TraceError::Csv { path: path.display().to_string(), source }
}
