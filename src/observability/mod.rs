//! Structured logging and lightweight operation metrics.
//!
//! - [`init_logging`]: one-time `tracing` subscriber setup with `RUST_LOG` support
//! - [`Metrics`]: counters for planned and applied mutations

use std::time::Duration;

use tracing_subscriber::EnvFilter;

use crate::types::BatchUpdate;

/// Initialize structured logging.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` (normally the
/// configured `logging.filter`) is used. Logs go to stderr so command
/// output on stdout stays machine-readable. Subsequent calls are ignored.
pub fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("taxograph=info"));

    // try_init so double-init in tests doesn't panic
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Counters for one CLI run or one long-lived service.
///
/// Serializable to JSON via [`Metrics::to_json`].
#[derive(Debug, Default)]
pub struct Metrics {
    pub snapshot_load: Option<Duration>,
    pub categories_loaded: usize,
    pub reparents: u64,
    pub creates: u64,
    pub deletes: u64,
    pub cycles_rejected: u64,
    pub conflicts: u64,
    pub batches_applied: u64,
    pub rows_written: usize,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_batch(&mut self, batch: &BatchUpdate, rows_written: usize) {
        self.batches_applied += 1;
        self.rows_written += rows_written;
        self.deletes += batch.deletes.len() as u64;
        self.creates += batch.inserts.len() as u64;
    }

    /// Share of attempted mutations that were rejected for cycles.
    pub fn cycle_rejection_rate(&self) -> f64 {
        let attempts = self.reparents + self.creates + self.cycles_rejected;
        if attempts == 0 {
            return 0.0;
        }
        self.cycles_rejected as f64 / attempts as f64
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "snapshot_load_ms": self.snapshot_load.map(|d| d.as_millis() as u64),
            "categories_loaded": self.categories_loaded,
            "reparents": self.reparents,
            "creates": self.creates,
            "deletes": self.deletes,
            "cycles_rejected": self.cycles_rejected,
            "conflicts": self.conflicts,
            "batches_applied": self.batches_applied,
            "rows_written": self.rows_written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;

    #[test]
    fn init_logging_twice_does_not_panic() {
        init_logging("taxograph=debug");
        init_logging("not a [valid filter");
    }

    #[test]
    fn metrics_start_empty() {
        let m = Metrics::new();
        assert_eq!(m.batches_applied, 0);
        assert_eq!(m.cycle_rejection_rate(), 0.0);
        assert!(m.to_json()["snapshot_load_ms"].is_null());
    }

    #[test]
    fn record_batch_counts_inserts_and_deletes() {
        let mut m = Metrics::new();
        let batch = BatchUpdate {
            inserts: vec![Category::new("a", "A", "a")],
            deletes: vec!["b".into(), "c".into()],
            ..Default::default()
        };
        m.record_batch(&batch, 3);
        assert_eq!(m.batches_applied, 1);
        assert_eq!(m.rows_written, 3);
        assert_eq!(m.creates, 1);
        assert_eq!(m.deletes, 2);
    }

    #[test]
    fn rejection_rate_and_json() {
        let mut m = Metrics::new();
        m.reparents = 3;
        m.cycles_rejected = 1;
        m.snapshot_load = Some(Duration::from_millis(12));
        assert!((m.cycle_rejection_rate() - 0.25).abs() < f64::EPSILON);
        let json = m.to_json();
        assert_eq!(json["snapshot_load_ms"], 12);
        assert_eq!(json["cycles_rejected"], 1);
    }
}
