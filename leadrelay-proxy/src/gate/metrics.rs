//! Counters for the concurrency gate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Metrics for monitoring gate occupancy
#[derive(Debug, Default)]
pub struct GateMetrics {
    /// Tokens handed out
    pub acquired: AtomicU64,

    /// Tokens returned
    pub released: AtomicU64,

    /// Acquisitions that hit their deadline
    pub timed_out: AtomicU64,

    /// Tokens currently held
    pub in_flight: AtomicU64,

    /// Highest number of tokens held at once
    pub max_in_flight: AtomicU64,

    /// Total time spent waiting for a token, in milliseconds
    pub total_wait_ms: AtomicU64,
}

impl GateMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a token leaving the pool
    pub fn record_acquired(&self, wait_time: Duration) {
        self.acquired.fetch_add(1, Ordering::Relaxed);
        self.total_wait_ms
            .fetch_add(wait_time.as_millis() as u64, Ordering::Relaxed);

        let held = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let mut current_max = self.max_in_flight.load(Ordering::Relaxed);
        while held > current_max {
            match self.max_in_flight.compare_exchange_weak(
                current_max,
                held,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => current_max = x,
            }
        }
    }

    /// Record a token returning to the pool
    pub fn record_released(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    /// Tokens currently held
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Average wait per acquired token in milliseconds
    pub fn avg_wait_ms(&self) -> f64 {
        let acquired = self.acquired.load(Ordering::Relaxed);
        if acquired == 0 {
            return 0.0;
        }
        self.total_wait_ms.load(Ordering::Relaxed) as f64 / acquired as f64
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> GateSnapshot {
        GateSnapshot {
            acquired: self.acquired.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
            max_in_flight: self.max_in_flight.load(Ordering::Relaxed),
            avg_wait_ms: self.avg_wait_ms(),
        }
    }
}

/// Point-in-time copy of [`GateMetrics`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateSnapshot {
    pub acquired: u64,
    pub released: u64,
    pub timed_out: u64,
    pub in_flight: u64,
    pub max_in_flight: u64,
    pub avg_wait_ms: f64,
}
