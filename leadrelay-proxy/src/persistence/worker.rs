//! Detached persistence of completed exchanges.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use leadrelay_core::PersistedRecord;
use serde::Serialize;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info_span, warn, Instrument};

use super::PersistenceSink;
use crate::metrics as prom;

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    persisted: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

/// Point-in-time persistence counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistenceStats {
    pub submitted: u64,
    pub persisted: u64,
    pub failed: u64,
    pub timed_out: u64,
    /// Saves still running
    pub pending: usize,
}

/// Saves records on tracked background tasks.
///
/// Each record gets exactly one attempt bounded by the worker's own
/// timeout. Failures are logged and counted, never retried or reported to
/// the request that produced the record.
#[derive(Clone)]
pub struct PersistenceWorker {
    sink: Arc<dyn PersistenceSink>,
    tracker: TaskTracker,
    timeout: Duration,
    counters: Arc<Counters>,
}

impl PersistenceWorker {
    pub fn new(sink: Arc<dyn PersistenceSink>, timeout: Duration) -> Self {
        Self {
            sink,
            tracker: TaskTracker::new(),
            timeout,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn sink(&self) -> &Arc<dyn PersistenceSink> {
        &self.sink
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Schedule `record` for saving and return immediately
    pub fn submit(&self, record: PersistedRecord) {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);

        let sink = self.sink.clone();
        let counters = self.counters.clone();
        let timeout = self.timeout;
        let span = info_span!(
            "persist",
            kind = %record.kind(),
            upstream_id = %record.upstream_id()
        );

        self.tracker.spawn(
            async move {
                match tokio::time::timeout(timeout, sink.save(record)).await {
                    Ok(Ok(row_id)) => {
                        counters.persisted.fetch_add(1, Ordering::Relaxed);
                        prom::record_persistence("persisted");
                        debug!(row_id, "Record persisted");
                    }
                    Ok(Err(e)) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        prom::record_persistence("failed");
                        error!(error = %e, "Failed to persist record");
                    }
                    Err(_) => {
                        counters.timed_out.fetch_add(1, Ordering::Relaxed);
                        prom::record_persistence("timeout");
                        error!(timeout_ms = timeout.as_millis() as u64, "Persisting record timed out");
                    }
                }
            }
            .instrument(span),
        );
    }

    /// Number of saves still running
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every save submitted so far
    pub async fn flush(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Wait up to `grace` for outstanding saves; returns false if some were abandoned
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            debug!(pending, "Draining persistence worker");
        }
        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(pending = self.tracker.len(), "Persistence drain timed out");
                false
            }
        }
    }

    pub fn stats(&self) -> PersistenceStats {
        PersistenceStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            persisted: self.counters.persisted.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            timed_out: self.counters.timed_out.load(Ordering::Relaxed),
            pending: self.pending(),
        }
    }
}
