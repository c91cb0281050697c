// Performance metrics module
//
// Lightweight counters for the compile pipeline, logged on shutdown

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Global pipeline metrics
///
/// Uses atomic operations for thread-safe metric tracking without locks.
/// Shared as `Arc<Metrics>` between the launcher, workers and dispatchers.
#[derive(Debug)]
pub struct Metrics {
    /// Runs admitted and handed to a worker
    pub runs_launched: AtomicU64,

    /// Launches refused by validation (missing path or busy)
    pub runs_rejected: AtomicU64,

    pub runs_succeeded: AtomicU64,

    pub runs_failed: AtomicU64,

    /// Total worker time in milliseconds
    pub total_compile_time_ms: AtomicU64,

    /// Notifications applied to a display log
    pub messages_dispatched: AtomicU64,

    /// Notifications that could not be marshaled onto the display thread
    pub dispatch_errors: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            runs_launched: AtomicU64::new(0),
            runs_rejected: AtomicU64::new(0),
            runs_succeeded: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            total_compile_time_ms: AtomicU64::new(0),
            messages_dispatched: AtomicU64::new(0),
            dispatch_errors: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_launch(&self) {
        self.runs_launched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.runs_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished run and how long its worker took
    pub fn record_outcome(&self, success: bool, duration: Duration) {
        if success {
            self.runs_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.runs_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_compile_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self, count: u64) {
        self.messages_dispatched.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_dispatch_error(&self) {
        self.dispatch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average worker time per finished run in milliseconds
    pub fn avg_compile_time_ms(&self) -> f64 {
        let total = self.total_compile_time_ms.load(Ordering::Relaxed);
        let count = self.runs_succeeded.load(Ordering::Relaxed)
            + self.runs_failed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Performance Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Runs: {} launched, {} rejected, {} succeeded, {} failed",
            self.runs_launched.load(Ordering::Relaxed),
            self.runs_rejected.load(Ordering::Relaxed),
            self.runs_succeeded.load(Ordering::Relaxed),
            self.runs_failed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Total compile time: {:.2}s (avg: {:.2}ms per run)",
            self.total_compile_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_compile_time_ms()
        );
        tracing::info!(
            "Messages dispatched: {}, dispatch errors: {}",
            self.messages_dispatched.load(Ordering::Relaxed),
            self.dispatch_errors.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
