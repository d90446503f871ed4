// Refresh pipeline metrics
//
// Lightweight counters shared by the refresh worker and the snapshot reader

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Counters for the snapshot publisher
///
/// Uses relaxed atomics so the reader path never contends with the worker.
/// Logged on shutdown for diagnostics.
#[derive(Debug)]
pub struct PublisherMetrics {
    /// Calls to `request_refresh`
    pub refresh_requests: AtomicU64,

    /// Requests that arrived while a cycle was already pending
    pub coalesced_requests: AtomicU64,

    /// Rebuild cycles that ran to completion and were published
    pub cycles_completed: AtomicU64,

    /// Collectors that returned an error
    pub collector_failures: AtomicU64,

    /// Collectors that panicked
    pub collector_panics: AtomicU64,

    /// Records across all published collections
    pub records_published: AtomicU64,

    /// Total time spent rebuilding, in milliseconds
    pub total_cycle_time_ms: AtomicU64,

    /// Reader calls that copied a newer collection out of a slot
    pub reader_copies: AtomicU64,

    /// Reader calls served from the cached collection
    pub reader_cache_hits: AtomicU64,

    /// Pin attempts the reader had to retry because a cycle published concurrently
    pub reader_pin_retries: AtomicU64,

    start_time: Instant,
}

impl PublisherMetrics {
    pub fn new() -> Self {
        Self {
            refresh_requests: AtomicU64::new(0),
            coalesced_requests: AtomicU64::new(0),
            cycles_completed: AtomicU64::new(0),
            collector_failures: AtomicU64::new(0),
            collector_panics: AtomicU64::new(0),
            records_published: AtomicU64::new(0),
            total_cycle_time_ms: AtomicU64::new(0),
            reader_copies: AtomicU64::new(0),
            reader_cache_hits: AtomicU64::new(0),
            reader_pin_retries: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_refresh_request(&self, coalesced: bool) {
        self.refresh_requests.fetch_add(1, Ordering::Relaxed);
        if coalesced {
            self.coalesced_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a published cycle
    pub fn record_cycle(&self, records: usize, duration: Duration) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.records_published
            .fetch_add(records as u64, Ordering::Relaxed);
        self.total_cycle_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_collector_failure(&self) {
        self.collector_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_collector_panic(&self) {
        self.collector_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reader_copy(&self) {
        self.reader_copies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reader_cache_hit(&self) {
        self.reader_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pin_retry(&self) {
        self.reader_pin_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cycles(&self) -> u64 {
        self.cycles_completed.load(Ordering::Relaxed)
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average rebuild time per cycle in milliseconds
    pub fn avg_cycle_time_ms(&self) -> f64 {
        let total = self.total_cycle_time_ms.load(Ordering::Relaxed);
        let count = self.cycles_completed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Refresh Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Refresh requests: {} ({} coalesced), cycles: {} (avg {:.2}ms)",
            self.refresh_requests.load(Ordering::Relaxed),
            self.coalesced_requests.load(Ordering::Relaxed),
            self.cycles(),
            self.avg_cycle_time_ms()
        );
        tracing::info!(
            "Collectors: {} failures, {} panics; records published: {}",
            self.collector_failures.load(Ordering::Relaxed),
            self.collector_panics.load(Ordering::Relaxed),
            self.records_published.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Reader: {} copies, {} cache hits, {} pin retries",
            self.reader_copies.load(Ordering::Relaxed),
            self.reader_cache_hits.load(Ordering::Relaxed),
            self.reader_pin_retries.load(Ordering::Relaxed)
        );
    }
}

impl Default for PublisherMetrics {
    fn default() -> Self {
        Self::new()
    }
}
