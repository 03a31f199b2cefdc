//! Semaphore-backed token pool bounding in-flight upstream calls.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::time::Instant;

use super::metrics::GateMetrics;
use crate::metrics as prom;

/// Error types for gate operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GateError {
    #[error("No upstream capacity within the request deadline (waited {waited:?})")]
    Timeout { waited: Duration },

    #[error("No upstream capacity available right now")]
    Exhausted,

    #[error("Concurrency gate is closed")]
    Closed,
}

/// Counting gate in front of the upstream gateway
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    metrics: Arc<GateMetrics>,
}

impl ConcurrencyGate {
    /// Create a gate with a fixed number of tokens.
    ///
    /// A capacity of zero would deadlock every dispatch, so it is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        prom::set_gate_capacity(capacity);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            metrics: Arc::new(GateMetrics::new()),
        }
    }

    /// Wait for a token until `deadline`
    pub async fn acquire(&self, deadline: Instant) -> Result<GateToken, GateError> {
        let started = Instant::now();
        let permit = tokio::time::timeout_at(deadline, self.semaphore.clone().acquire_owned()).await;

        match permit {
            Ok(Ok(permit)) => Ok(self.issue(permit, started.elapsed())),
            Ok(Err(_)) => Err(GateError::Closed),
            Err(_) => {
                let waited = started.elapsed();
                self.metrics.record_timeout();
                prom::record_gate_timeout();
                tracing::warn!(
                    waited_ms = waited.as_millis() as u64,
                    capacity = self.capacity,
                    "Timed out waiting for upstream capacity"
                );
                Err(GateError::Timeout { waited })
            }
        }
    }

    /// Take a token only if one is free right now
    pub fn try_acquire(&self) -> Result<GateToken, GateError> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => Ok(self.issue(permit, Duration::ZERO)),
            Err(TryAcquireError::NoPermits) => Err(GateError::Exhausted),
            Err(TryAcquireError::Closed) => Err(GateError::Closed),
        }
    }

    fn issue(&self, permit: OwnedSemaphorePermit, waited: Duration) -> GateToken {
        self.metrics.record_acquired(waited);
        prom::record_gate_acquired(waited.as_secs_f64(), self.metrics.in_flight());
        tracing::debug!(
            wait_ms = waited.as_millis() as u64,
            in_flight = self.metrics.in_flight(),
            "Gate token acquired"
        );
        GateToken {
            _permit: permit,
            metrics: self.metrics.clone(),
        }
    }

    /// Refuse all pending and future acquisitions
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get number of free tokens
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn metrics(&self) -> &GateMetrics {
        &self.metrics
    }
}

/// One unit of upstream capacity; returned to the gate when dropped
pub struct GateToken {
    _permit: OwnedSemaphorePermit,
    metrics: Arc<GateMetrics>,
}

impl Drop for GateToken {
    fn drop(&mut self) {
        self.metrics.record_released();
        prom::set_gate_in_flight(self.metrics.in_flight());
    }
}
