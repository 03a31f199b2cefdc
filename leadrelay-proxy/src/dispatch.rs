//! Per-request dispatch state machine.
//!
//! ```text
//! Validating ──▶ Gated ──▶ Calling ──▶ Decoding ──▶ Done
//!     │            │          │           │
//!     └────────────┴──────────┴───────────┴──────▶ Failed
//! ```
//!
//! One deadline covers the gate wait and the upstream call together. The
//! gate token is returned the moment the upstream call finishes, so decode
//! work never holds capacity. Only `Done` produces a persisted record.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use leadrelay_core::Exchange;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::error::DispatchError;
use crate::gate::ConcurrencyGate;
use crate::metrics::DispatchTimer;
use crate::persistence::PersistenceWorker;
use crate::upstream::UpstreamCaller;

/// Stand-in deadline for timeouts too large to add to the clock
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Dispatch lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Validating,
    Gated,
    Calling,
    Decoding,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "validating",
            Self::Gated => "gated",
            Self::Calling => "calling",
            Self::Decoding => "decoding",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Drives requests through validation, the gate and the upstream call
#[derive(Clone)]
pub struct Dispatcher {
    gate: Arc<ConcurrencyGate>,
    upstream: UpstreamCaller,
    worker: PersistenceWorker,
    request_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        gate: Arc<ConcurrencyGate>,
        upstream: UpstreamCaller,
        worker: PersistenceWorker,
        request_timeout: Duration,
    ) -> Self {
        Self {
            gate,
            upstream,
            worker,
            request_timeout,
        }
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn upstream(&self) -> &UpstreamCaller {
        &self.upstream
    }

    pub fn worker(&self) -> &PersistenceWorker {
        &self.worker
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Forward one request and return the accepted gateway response.
    ///
    /// Dropping the returned future aborts the gate wait or the upstream
    /// call and returns any held token. Once the response is accepted the
    /// record is handed to the persistence worker, which outlives the
    /// request.
    #[instrument(skip_all, fields(kind = %E::KIND))]
    pub async fn dispatch<E: Exchange>(&self, request: E) -> Result<E::Response, DispatchError> {
        let timer = DispatchTimer::new(E::KIND.as_str());
        let started = Instant::now();
        let mut phase = Phase::Validating;

        match self.run(&request, &mut phase).await {
            Ok(response) => {
                timer.record_success();
                info!(
                    upstream_id = E::upstream_id(&response),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Dispatch complete"
                );
                self.worker.submit(request.to_record(&response, Utc::now()));
                Ok(response)
            }
            Err(e) => {
                timer.record_failure(e.kind());
                let failed_in = fail(&mut phase);
                warn!(
                    failed_in = %failed_in,
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Dispatch failed"
                );
                Err(e)
            }
        }
    }

    async fn run<E: Exchange>(
        &self,
        request: &E,
        phase: &mut Phase,
    ) -> Result<E::Response, DispatchError> {
        request.validate()?;

        let deadline = deadline_after(self.request_timeout);
        advance(phase, Phase::Gated);
        let token = self.gate.acquire(deadline).await?;

        advance(phase, Phase::Calling);
        let result = self.upstream.call(E::KIND, request, deadline).await;
        drop(token);
        let body = result?;

        advance(phase, Phase::Decoding);
        let response: E::Response = serde_json::from_slice(&body).map_err(|e| {
            DispatchError::Decode(format!("Failed to parse {} response: {}", E::KIND, e))
        })?;
        E::accept(&response).map_err(DispatchError::Decode)?;

        advance(phase, Phase::Done);
        Ok(response)
    }
}

fn advance(phase: &mut Phase, next: Phase) {
    debug!(from = %phase, to = %next, "Dispatch phase");
    *phase = next;
}

/// Move to `Failed`, returning the phase the failure happened in
fn fail(phase: &mut Phase) -> Phase {
    let failed_in = *phase;
    advance(phase, Phase::Failed);
    failed_in
}

/// `timeout` from now, saturating at a far-future instant
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or(now + FAR_FUTURE)
}
