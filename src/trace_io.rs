//! CSV trace loading: `arrival_time, prefill_length, decode_length` rows.

use std::path::Path;

use serde::Deserialize;

use crate::error::TraceError;
use crate::request::Request;

#[derive(Debug, Deserialize)]
struct TraceRow {
    arrival_time: f64,
    prefill_length: u64,
    decode_length: u64,
}

/// Load a trace, dropping rows whose `decode_length` exceeds `max_decode_length`
/// (when given), then re-sorting by `arrival_time` (stable, so ties keep their
/// original relative order) and assigning fresh sequential `req_id`s over the
/// sorted order. A non-monotone input is not an error — it is silently
/// corrected by this sort.
pub fn load_trace(path: &Path, max_decode_length: Option<u64>) -> Result<Vec<Request>, TraceError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| TraceError::Io {
        path: path.display().to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, source.to_string()),
    })?;

    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let row: TraceRow = result.map_err(|source| TraceError::Csv {
            path: path.display().to_string(),
            source,
        })?;
        if let Some(max) = max_decode_length {
            if row.decode_length > max {
                continue;
            }
        }
        rows.push(row);
    }

    rows.sort_by(|a, b| a.arrival_time.total_cmp(&b.arrival_time));

    let requests = rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| Request::new(i as u64, row.arrival_time, row.prefill_length, row.decode_length))
        .collect();
    Ok(requests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_and_resorts_by_arrival_time() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "arrival_time,prefill_length,decode_length").unwrap();
        writeln!(file, "1.0,10,5").unwrap();
        writeln!(file, "0.5,20,5").unwrap();
        file.flush().unwrap();

        let trace = load_trace(file.path(), None).unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0].arrival_time, 0.5);
        assert_eq!(trace[0].req_id, 0);
        assert_eq!(trace[1].req_id, 1);
    }

    #[test]
    fn filters_rows_above_decode_length_ceiling() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "arrival_time,prefill_length,decode_length").unwrap();
        writeln!(file, "0.0,10,5").unwrap();
        writeln!(file, "0.1,10,500").unwrap();
        file.flush().unwrap();

        let trace = load_trace(file.path(), Some(100)).unwrap();
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0].decode_length, 5);
    }

    #[test]
    fn empty_trace_is_not_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "arrival_time,prefill_length,decode_length").unwrap();
        file.flush().unwrap();

        let trace = load_trace(file.path(), None).unwrap();
        assert!(trace.is_empty());
    }
}
