//! Concurrency gate for upstream calls.
//!
//! Every dispatch takes one token before it talks to the gateway and gives it
//! back the moment the call returns. The token pool is the only thing that
//! throttles the service; validation and decoding run unthrottled.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                Incoming dispatches (1 task each)         │
//! └───────────────────────────┬─────────────────────────────┘
//!                             │ acquire(deadline)
//!                    ┌────────▼────────┐
//!                    │ ConcurrencyGate │ ← Semaphore (max_concurrent_calls)
//!                    │   GateMetrics   │ ← in flight / peak / timeouts
//!                    └────────┬────────┘
//!                             │ GateToken (released on drop)
//!                    ┌────────▼────────┐
//!                    │  UpstreamCaller │
//!                    └─────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - Outstanding tokens never exceed the configured capacity
//! - A token is released exactly once, whether the call succeeded, failed,
//!   timed out or the dispatch future was dropped
//! - Waiters are served in roughly FIFO order (tokio's semaphore is fair)

mod metrics;
mod semaphore;

pub use metrics::{GateMetrics, GateSnapshot};
pub use semaphore::{ConcurrencyGate, GateError, GateToken};
