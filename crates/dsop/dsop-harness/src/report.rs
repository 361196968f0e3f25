//! The one JSON record emitted per iteration, root-only.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    pub timestamp: i64,
    pub name: String,
    #[serde(rename = "N")]
    pub n: usize,
    #[serde(rename = "M")]
    pub m: usize,
    pub numprocs: i32,
    pub num_iterations: u32,
    pub iteration: u32,
    pub runtimes: Vec<i64>,
    pub runtimes_mpi: Vec<i64>,
    pub runtimes_compute: Vec<i64>,
    pub runtime: i64,
    pub runtime_mpi: i64,
    pub runtime_compute: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<f64>>,
}

/// Wall-clock microseconds since the Unix epoch, for the record's
/// `timestamp` field only — unrelated to `dsop_timing`'s monotonic clock.
pub fn epoch_us() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_micros() as i64).unwrap_or(0)
}

/// Serializes `record` as one line of JSON to stdout.
pub fn emit(record: &IterationRecord) {
    match serde_json::to_string(record) {
        Ok(line) => println!("{line}"),
        Err(err) => tracing::error!(%err, "failed to serialize iteration record"),
    }
}
