//! Metrics module for the leadrelay proxy
//!
//! Provides Prometheus metrics for monitoring and observability.

pub mod prometheus;

// Re-export commonly used items
pub use self::prometheus::{
    encode_metrics, record_gate_acquired, record_gate_timeout, record_persistence,
    record_rate_limited, record_upstream_error, register_metrics, set_gate_capacity,
    set_gate_in_flight, DispatchTimer,
};
