//! Application state for the leadrelay proxy.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::dispatch::Dispatcher;
use crate::error::ConfigError;
use crate::gate::ConcurrencyGate;
use crate::persistence::{
    MemorySink, PersistenceSink, PersistenceWorker, SqliteSink, DEFAULT_MEMORY_CAPACITY,
};
use crate::rate_limit::{ClientRateLimiter, RateLimiterConfig};
use crate::upstream::{UpstreamCaller, UpstreamEndpoints, UpstreamMode};

/// Longest accepted request or persist timeout, in seconds
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Application state shared across all handlers
pub struct AppState {
    /// Gate, upstream caller and persistence worker
    pub dispatcher: Dispatcher,

    /// Per-client request limiter
    pub limiter: Arc<ClientRateLimiter>,

    /// Configuration
    pub config: ProxyConfig,

    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Build state, opening the configured sink
    pub fn new(config: ProxyConfig) -> Result<Self, ConfigError> {
        let sink: Arc<dyn PersistenceSink> = match &config.db_path {
            Some(path) => Arc::new(SqliteSink::open(path)?),
            None => {
                info!(
                    capacity = config.memory_capacity,
                    "No database configured, keeping the most recent records in memory"
                );
                Arc::new(MemorySink::with_capacity(config.memory_capacity))
            }
        };
        Self::with_sink(config, sink)
    }

    /// Build state around an existing sink
    pub fn with_sink(
        config: ProxyConfig,
        sink: Arc<dyn PersistenceSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let upstream = UpstreamCaller::new(
            config.endpoints.clone(),
            config.api_token.as_deref().unwrap_or_default(),
            config.mode,
        )?;
        let worker = PersistenceWorker::new(sink, config.effective_persist_timeout());
        let dispatcher = Dispatcher::new(
            Arc::new(ConcurrencyGate::new(config.max_concurrent_calls)),
            upstream,
            worker,
            config.request_timeout,
        );

        Ok(Self {
            dispatcher,
            limiter: Arc::new(ClientRateLimiter::new(&config.rate_limit)),
            config,
            started_at: Instant::now(),
        })
    }
}

/// Proxy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    /// Port to listen on
    pub port: u16,

    /// Gateway credential, with or without the `Bearer ` prefix
    pub api_token: Option<String>,

    pub endpoints: UpstreamEndpoints,

    /// Deadline for gate wait plus upstream call
    pub request_timeout: Duration,

    /// Deadline for each detached save
    pub persist_timeout: Duration,

    /// Gate capacity
    pub max_concurrent_calls: usize,

    pub rate_limit: RateLimiterConfig,

    /// SQLite file; in-memory storage when unset
    pub db_path: Option<PathBuf>,

    /// Records kept by the in-memory sink before the oldest are evicted
    pub memory_capacity: usize,

    pub mode: UpstreamMode,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 9000,
            api_token: None,
            endpoints: UpstreamEndpoints::default(),
            request_timeout: Duration::from_secs(30),
            persist_timeout: Duration::from_secs(10),
            max_concurrent_calls: 10,
            rate_limit: RateLimiterConfig::default(),
            db_path: None,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            mode: UpstreamMode::Live,
        }
    }
}

impl ProxyConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let lookup = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mode = match lookup("LEADRELAY_UPSTREAM_MODE") {
            Some(raw) => raw.parse::<UpstreamMode>()?,
            None => defaults.mode,
        };

        let config = Self {
            port: parse_or(&lookup, "LEADRELAY_PORT", defaults.port, |p| *p > 0),
            api_token: lookup("LEADRELAY_API_TOKEN"),
            endpoints: UpstreamEndpoints {
                lead_transfer: lookup("LEADRELAY_LEAD_TRANSFER_ENDPOINT")
                    .unwrap_or(defaults.endpoints.lead_transfer),
                quick_quote: lookup("LEADRELAY_QUICK_QUOTE_ENDPOINT")
                    .unwrap_or(defaults.endpoints.quick_quote),
            },
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "LEADRELAY_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
                |s| (1..=MAX_TIMEOUT_SECS).contains(s),
            )),
            persist_timeout: Duration::from_secs(parse_or(
                &lookup,
                "LEADRELAY_PERSIST_TIMEOUT_SECS",
                defaults.persist_timeout.as_secs(),
                |s| (1..=MAX_TIMEOUT_SECS).contains(s),
            )),
            max_concurrent_calls: parse_or(
                &lookup,
                "LEADRELAY_MAX_CONCURRENT_CALLS",
                defaults.max_concurrent_calls,
                |n| *n > 0,
            ),
            rate_limit: RateLimiterConfig {
                rps: parse_or(&lookup, "LEADRELAY_RATE_LIMIT_RPS", defaults.rate_limit.rps, |n| *n > 0),
                burst: parse_or(
                    &lookup,
                    "LEADRELAY_RATE_LIMIT_BURST",
                    defaults.rate_limit.burst,
                    |n| *n > 0,
                ),
                ..defaults.rate_limit
            },
            db_path: lookup("LEADRELAY_DB_PATH").map(PathBuf::from),
            memory_capacity: parse_or(
                &lookup,
                "LEADRELAY_MEMORY_CAPACITY",
                defaults.memory_capacity,
                |n| *n > 0,
            ),
            mode,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the proxy cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let has_token = self
            .api_token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        if self.mode == UpstreamMode::Live && !has_token {
            return Err(ConfigError::MissingCredential);
        }
        Ok(())
    }

    /// Persist timeout, never shorter than the request timeout
    pub fn effective_persist_timeout(&self) -> Duration {
        if self.persist_timeout < self.request_timeout {
            info!(
                persist_secs = self.persist_timeout.as_secs(),
                request_secs = self.request_timeout.as_secs(),
                "Persist timeout shorter than request timeout, raising it"
            );
            return self.request_timeout;
        }
        self.persist_timeout
    }
}

fn parse_or<T, L, V>(lookup: &L, key: &str, default: T, valid: V) -> T
where
    T: FromStr + Display + Copy,
    L: Fn(&str) -> Option<String>,
    V: Fn(&T) -> bool,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            warn!(
                env_var = key,
                value = %raw,
                default = %default,
                "Invalid value for environment variable, using default"
            );
            default
        }
    }
}
