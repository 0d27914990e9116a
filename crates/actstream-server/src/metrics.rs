//! Per-operation latency sampling and the aggregated metrics document
//! served at the read-only `/metrics` endpoint (spec §6). Mirrors the
//! cache crate's own sliding-window percentile approach, generalized to an
//! arbitrary set of named operations.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

const WINDOW_SIZE: usize = 1_000;

struct Window {
    samples: VecDeque<u64>,
}

impl Window {
    fn new() -> Self {
        Self { samples: VecDeque::with_capacity(WINDOW_SIZE) }
    }

    fn push(&mut self, latency_micros: u64) {
        if self.samples.len() == WINDOW_SIZE {
            self.samples.pop_front();
        }
        self.samples.push_back(latency_micros);
    }

    fn percentile(&self, p: f64) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        let mut sorted: Vec<u64> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let idx = ((sorted.len() as f64 - 1.0) * p).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }
}

struct OpCounters {
    calls: AtomicU64,
    errors: AtomicU64,
    window: Mutex<Window>,
}

impl OpCounters {
    fn new() -> Self {
        Self { calls: AtomicU64::new(0), errors: AtomicU64::new(0), window: Mutex::new(Window::new()) }
    }
}

/// A started latency sample for one named operation.
pub struct OpTimer {
    op: &'static str,
    started: Instant,
}

/// Per-operation call counts, error counts, and latency percentiles
/// (spec §4.9: "records a per-operation latency sample").
pub struct ServerMetrics {
    ops: DashMap<&'static str, OpCounters>,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self { ops: DashMap::new() }
    }

    #[must_use]
    pub fn start(&self, op: &'static str) -> OpTimer {
        OpTimer { op, started: Instant::now() }
    }

    pub fn record(&self, timer: OpTimer, success: bool) {
        let counters = self.ops.entry(timer.op).or_insert_with(OpCounters::new);
        counters.calls.fetch_add(1, Ordering::Relaxed);
        if !success {
            counters.errors.fetch_add(1, Ordering::Relaxed);
        }
        counters.window.lock().push(timer.started.elapsed().as_micros() as u64);
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<OpSnapshot> {
        self.ops
            .iter()
            .map(|entry| {
                let window = entry.value().window.lock();
                OpSnapshot {
                    operation: (*entry.key()).to_string(),
                    calls: entry.value().calls.load(Ordering::Relaxed),
                    errors: entry.value().errors.load(Ordering::Relaxed),
                    p50_micros: window.percentile(0.50),
                    p95_micros: window.percentile(0.95),
                    p99_micros: window.percentile(0.99),
                }
            })
            .collect()
    }
}

/// Point-in-time view of one operation's counters, for the metrics
/// endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct OpSnapshot {
    pub operation: String,
    pub calls: u64,
    pub errors: u64,
    pub p50_micros: u64,
    pub p95_micros: u64,
    pub p99_micros: u64,
}

/// The full JSON document served at `/metrics` (spec §6: "per-op counts,
/// latency percentiles, cache hit rate, queue depth, pool stats, breaker
/// states").
#[derive(Debug, Clone, Serialize)]
pub struct MetricsDocument {
    pub operations: Vec<OpSnapshot>,
    pub cache: actstream_cache::MetricsSnapshot,
    pub queue_depth: u64,
    pub queue_serialize_errors: u64,
    pub pool_stats: Vec<PoolStatSnapshot>,
    pub breaker_states: Vec<BreakerSnapshot>,
    pub tickets_in_flight: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStatSnapshot {
    pub identity: String,
    pub max_size: usize,
    pub size: usize,
    pub available: isize,
    pub waiting: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub identity: String,
    pub state: String,
    pub failure_count: u32,
    pub success_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reports_calls_and_errors_per_operation() {
        let metrics = ServerMetrics::new();
        let timer = metrics.start("get_context");
        metrics.record(timer, true);
        let timer = metrics.start("get_context");
        metrics.record(timer, false);
        let snapshot = metrics.snapshot();
        let op = snapshot.iter().find(|s| s.operation == "get_context").unwrap();
        assert_eq!(op.calls, 2);
        assert_eq!(op.errors, 1);
    }

    #[test]
    fn distinct_operations_are_tracked_independently() {
        let metrics = ServerMetrics::new();
        metrics.record(metrics.start("log_event"), true);
        metrics.record(metrics.start("submit_query"), true);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.len(), 2);
    }
}
