//! Cache metrics: a sliding window of the last 1 000 latencies for
//! percentile calculation, plus hit/miss/negative-hit counters (spec
//! §4.5: "time source is a monotonic high-resolution clock").

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

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

/// Hit/miss/negative-hit counters plus a latency window for one cache
/// instance.
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    negative_hits: AtomicU64,
    l2_unavailable: AtomicU64,
    window: Mutex<Window>,
}

/// A single lookup's timing, started with [`CacheMetrics::start_timer`].
pub struct Timer(Instant);

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            negative_hits: AtomicU64::new(0),
            l2_unavailable: AtomicU64::new(0),
            window: Mutex::new(Window::new()),
        }
    }

    #[must_use]
    pub fn start_timer() -> Timer {
        Timer(Instant::now())
    }

    pub fn record_hit(&self, timer: Timer) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.window.lock().push(timer.0.elapsed().as_micros() as u64);
    }

    pub fn record_miss(&self, timer: Timer) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.window.lock().push(timer.0.elapsed().as_micros() as u64);
    }

    pub fn record_negative_hit(&self) {
        self.negative_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l2_unavailable(&self) {
        self.l2_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let window = self.window.lock();
        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            negative_hits: self.negative_hits.load(Ordering::Relaxed),
            l2_unavailable: self.l2_unavailable.load(Ordering::Relaxed),
            p50_micros: window.percentile(0.50),
            p95_micros: window.percentile(0.95),
            p99_micros: window.percentile(0.99),
        }
    }
}

/// Point-in-time view for the metrics endpoint.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub negative_hits: u64,
    pub l2_unavailable: u64,
    pub p50_micros: u64,
    pub p95_micros: u64,
    pub p99_micros: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_reflect_recorded_samples() {
        let metrics = CacheMetrics::new();
        for _ in 0..10 {
            let timer = CacheMetrics::start_timer();
            metrics.record_hit(timer);
        }
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.hits, 10);
        assert!(snapshot.p95_micros >= snapshot.p50_micros);
    }

    #[test]
    fn window_caps_at_1000_samples() {
        let mut window = Window::new();
        for i in 0..2_000u64 {
            window.push(i);
        }
        assert_eq!(window.samples.len(), WINDOW_SIZE);
        assert_eq!(*window.samples.front().unwrap(), 1_000);
    }
}
