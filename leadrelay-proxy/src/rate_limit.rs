//! Per-client rate limiting using the GCRA algorithm.
//!
//! Clients are identified by the first `X-Forwarded-For` entry, then
//! `X-Real-IP`, then the socket peer address. Entries that have fully
//! replenished are dropped by a periodic cleanup task.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics as prom;

const REJECTION_MESSAGE: &str = "Too many requests. Please try again later.";

/// Rate limiter settings
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterConfig {
    /// Sustained requests per second per client
    pub rps: u32,
    /// Requests a client may make back to back
    pub burst: u32,
    /// How often idle entries are evicted
    pub cleanup_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            rps: 10,
            burst: 10,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// GCRA limiter keyed by client identity
pub struct ClientRateLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
    cleanup_interval: Duration,
}

impl ClientRateLimiter {
    pub fn new(config: &RateLimiterConfig) -> Self {
        let defaults = RateLimiterConfig::default();
        let rps = NonZeroU32::new(config.rps)
            .or_else(|| NonZeroU32::new(defaults.rps))
            .unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst)
            .or_else(|| NonZeroU32::new(defaults.burst))
            .unwrap_or(NonZeroU32::MIN);

        info!(rps = rps.get(), burst = burst.get(), "Client rate limiter configured");

        Self {
            limiter: RateLimiter::keyed(Quota::per_second(rps).allow_burst(burst)),
            cleanup_interval: config.cleanup_interval,
        }
    }

    /// Returns `true` if the client may proceed
    pub fn check(&self, client: &str) -> bool {
        self.limiter.check_key(&client.to_string()).is_ok()
    }

    /// Drop entries that are back at full burst; returns how many were removed
    pub fn cleanup(&self) -> usize {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        let removed = before.saturating_sub(self.limiter.len());
        if removed > 0 {
            debug!(removed, remaining = self.limiter.len(), "Evicted idle rate limiter entries");
        }
        removed
    }

    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }

    /// Run [`cleanup`](Self::cleanup) on an interval until `shutdown` fires
    pub fn spawn_cleanup_task(self: &Arc<Self>, shutdown: CancellationToken) {
        let limiter = Arc::clone(self);
        let interval = limiter.cleanup_interval.max(Duration::from_millis(10));
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        limiter.cleanup();
                    }
                    _ = shutdown.cancelled() => {
                        debug!("Rate limiter cleanup task stopped");
                        break;
                    }
                }
            }
        });
    }
}

/// Resolve the identity a request is limited under
pub fn client_key(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(client) = forwarded {
        return client.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(client) = real_ip {
        return client.to_string();
    }

    peer.map(|ip| ip.to_string()).unwrap_or_else(|| "unknown".to_string())
}

/// Axum middleware rejecting over-limit clients with 429
pub async fn rate_limit(
    State(limiter): State<Arc<ClientRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let client = client_key(request.headers(), peer);

    if limiter.check(&client) {
        return next.run(request).await;
    }

    prom::record_rate_limited();
    warn!(client = %client, path = %request.uri().path(), "Rate limit exceeded");
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({ "success": false, "error": REJECTION_MESSAGE })),
    )
        .into_response()
}
