//! Prometheus metrics for the leadrelay proxy
//!
//! Exposes metrics in Prometheus format for monitoring and observability.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    /// Global Prometheus registry for leadrelay metrics
    pub static ref REGISTRY: Registry = Registry::new();

    // ============== Dispatch Metrics ==============

    /// Dispatches by exchange kind and outcome
    pub static ref DISPATCH_TOTAL: CounterVec = CounterVec::new(
        Opts::new("dispatch_total", "Total number of dispatches")
            .namespace("leadrelay"),
        &["kind", "outcome"]
    ).expect("metric can be created");

    /// End-to-end dispatch duration
    pub static ref DISPATCH_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "dispatch_duration_seconds",
            "Dispatch duration in seconds"
        )
        .namespace("leadrelay")
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["kind"]
    ).expect("metric can be created");

    /// Dispatches currently between validation and their terminal state
    pub static ref ACTIVE_DISPATCHES: Gauge = Gauge::with_opts(
        Opts::new("active_dispatches", "Number of dispatches currently being processed")
            .namespace("leadrelay")
    ).expect("metric can be created");

    // ============== Gate Metrics ==============

    /// Tokens currently held
    pub static ref GATE_IN_FLIGHT: Gauge = Gauge::with_opts(
        Opts::new("gate_in_flight", "Upstream calls currently holding a gate token")
            .namespace("leadrelay")
    ).expect("metric can be created");

    /// Configured gate capacity
    pub static ref GATE_CAPACITY: Gauge = Gauge::with_opts(
        Opts::new("gate_capacity", "Maximum concurrent upstream calls allowed")
            .namespace("leadrelay")
    ).expect("metric can be created");

    /// Time spent waiting for a gate token
    pub static ref GATE_WAIT_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "gate_wait_seconds",
            "Time spent waiting for upstream capacity"
        )
        .namespace("leadrelay")
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0])
    ).expect("metric can be created");

    /// Gate acquisitions that hit their deadline
    pub static ref GATE_TIMEOUTS_TOTAL: Counter = Counter::with_opts(
        Opts::new("gate_timeouts_total", "Total gate acquisitions that timed out")
            .namespace("leadrelay")
    ).expect("metric can be created");

    // ============== Upstream Metrics ==============

    /// Upstream failures by error kind
    pub static ref UPSTREAM_ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("upstream_errors_total", "Total upstream call failures")
            .namespace("leadrelay"),
        &["kind"]
    ).expect("metric can be created");

    // ============== Persistence Metrics ==============

    /// Persistence attempts by outcome
    pub static ref PERSISTENCE_TOTAL: CounterVec = CounterVec::new(
        Opts::new("persistence_total", "Total persistence attempts")
            .namespace("leadrelay"),
        &["outcome"]
    ).expect("metric can be created");

    // ============== Rate Limit Metrics ==============

    /// Requests rejected by the per-client rate limiter
    pub static ref RATE_LIMITED_TOTAL: Counter = Counter::with_opts(
        Opts::new("rate_limited_total", "Total requests rejected by the rate limiter")
            .namespace("leadrelay")
    ).expect("metric can be created");
}

/// Register all metrics with the global registry.
/// Should be called once at startup.
pub fn register_metrics() -> prometheus::Result<()> {
    // Dispatch metrics
    REGISTRY.register(Box::new(DISPATCH_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DISPATCH_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(ACTIVE_DISPATCHES.clone()))?;

    // Gate metrics
    REGISTRY.register(Box::new(GATE_IN_FLIGHT.clone()))?;
    REGISTRY.register(Box::new(GATE_CAPACITY.clone()))?;
    REGISTRY.register(Box::new(GATE_WAIT_SECONDS.clone()))?;
    REGISTRY.register(Box::new(GATE_TIMEOUTS_TOTAL.clone()))?;

    // Upstream, persistence and rate limit metrics
    REGISTRY.register(Box::new(UPSTREAM_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PERSISTENCE_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RATE_LIMITED_TOTAL.clone()))?;

    Ok(())
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_else(|e| format!("# Error encoding metrics: {}", e))
}

/// Helper struct for tracking dispatch duration.
/// Records the dispatch as failed if dropped without an explicit outcome,
/// which covers futures cancelled by a client disconnect.
pub struct DispatchTimer {
    kind: &'static str,
    start: std::time::Instant,
    finished: bool,
}

impl DispatchTimer {
    /// Start a new timer for the given exchange kind.
    pub fn new(kind: &'static str) -> Self {
        ACTIVE_DISPATCHES.inc();
        Self { kind, start: std::time::Instant::now(), finished: false }
    }

    /// Record a successful dispatch.
    pub fn record_success(mut self) {
        self.finish("success");
    }

    /// Record a failed dispatch with its error kind as outcome label.
    pub fn record_failure(mut self, outcome: &str) {
        self.finish(outcome);
    }

    fn finish(&mut self, outcome: &str) {
        DISPATCH_DURATION_SECONDS
            .with_label_values(&[self.kind])
            .observe(self.start.elapsed().as_secs_f64());
        DISPATCH_TOTAL.with_label_values(&[self.kind, outcome]).inc();
        ACTIVE_DISPATCHES.dec();
        self.finished = true;
    }
}

impl Drop for DispatchTimer {
    fn drop(&mut self) {
        if !self.finished {
            self.finish("cancelled");
        }
    }
}

/// Record a token leaving the gate.
pub fn record_gate_acquired(wait_secs: f64, in_flight: u64) {
    GATE_WAIT_SECONDS.observe(wait_secs);
    GATE_IN_FLIGHT.set(in_flight as f64);
}

/// Update the in-flight gauge.
pub fn set_gate_in_flight(in_flight: u64) {
    GATE_IN_FLIGHT.set(in_flight as f64);
}

/// Update the capacity gauge.
pub fn set_gate_capacity(capacity: usize) {
    GATE_CAPACITY.set(capacity as f64);
}

/// Record a gate acquisition that timed out.
pub fn record_gate_timeout() {
    GATE_TIMEOUTS_TOTAL.inc();
}

/// Record an upstream failure.
pub fn record_upstream_error(kind: &str) {
    UPSTREAM_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

/// Record a persistence outcome.
pub fn record_persistence(outcome: &str) {
    PERSISTENCE_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a rate-limited request.
pub fn record_rate_limited() {
    RATE_LIMITED_TOTAL.inc();
}
