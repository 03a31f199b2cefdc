//! Upstream layer for forwarding requests to the insurance gateway.
//!
//! The caller runs in one of two modes fixed at startup. Live mode performs
//! the real `POST`; synthetic mode fabricates a response shaped like the
//! gateway's without touching the network and exists only for documentation
//! and demo deployments. Nothing about an incoming request can switch modes.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use leadrelay_core::ExchangeKind;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, error, instrument, warn};

use crate::metrics as prom;

const SYNTHETIC_REDIRECT_BASE: &str =
    "https://synthetic.leadrelay.invalid/car-insurance/get-started";
const SYNTHETIC_PREMIUM: f64 = 1240.46;
const SYNTHETIC_EXCESS: f64 = 6200.0;

/// Suffix that keeps synthetic ids unique within the process
static SYNTHETIC_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Upstream error types
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Payload could not be encoded
    #[error("Error marshaling request body: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Connection, TLS or body read failure
    #[error("Error sending request to {endpoint}: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The request deadline passed before the gateway answered
    #[error("Request to {endpoint} timed out after {after:?}")]
    Timeout { endpoint: String, after: Duration },

    /// Gateway answered with a non-2xx status
    #[error("API returned non-2XX status code: {status}, body: {body}")]
    Status { status: u16, body: String },

    /// HTTP client could not be constructed
    #[error("Failed to create HTTP client: {0}")]
    Client(reqwest::Error),
}

impl UpstreamError {
    /// Short label used for metrics and error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Serialization(_) => "serialization",
            Self::Network { .. } => "network",
            Self::Timeout { .. } => "timeout",
            Self::Status { .. } => "status",
            Self::Client(_) => "client",
        }
    }
}

/// How upstream calls are answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamMode {
    /// Real network calls to the gateway
    Live,
    /// Fabricated responses, no network I/O
    Synthetic,
}

impl UpstreamMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Synthetic => "synthetic",
        }
    }
}

impl fmt::Display for UpstreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized value for the upstream mode setting
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Unknown upstream mode '{0}' (expected 'live' or 'synthetic')")]
pub struct UnknownModeError(pub String);

impl FromStr for UpstreamMode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "synthetic" => Ok(Self::Synthetic),
            _ => Err(UnknownModeError(s.to_string())),
        }
    }
}

/// Gateway URLs per exchange kind
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamEndpoints {
    pub lead_transfer: String,
    pub quick_quote: String,
}

impl Default for UpstreamEndpoints {
    fn default() -> Self {
        Self {
            lead_transfer: "http://gw-test.pineapple.co.za/users/motor_lead".to_string(),
            quick_quote: "http://gw-test.pineapple.co.za/api/v1/quote/quick-quote".to_string(),
        }
    }
}

impl UpstreamEndpoints {
    pub fn for_kind(&self, kind: ExchangeKind) -> &str {
        match kind {
            ExchangeKind::LeadTransfer => &self.lead_transfer,
            ExchangeKind::QuickQuote => &self.quick_quote,
        }
    }
}

/// Gateway client shared by every dispatch
#[derive(Clone)]
pub struct UpstreamCaller {
    /// HTTP client
    client: Client,
    /// Full `Authorization` header value
    authorization: String,
    endpoints: UpstreamEndpoints,
    mode: UpstreamMode,
}

impl UpstreamCaller {
    /// Create a new caller
    pub fn new(
        endpoints: UpstreamEndpoints,
        credential: &str,
        mode: UpstreamMode,
    ) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("leadrelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(UpstreamError::Client)?;

        if mode == UpstreamMode::Synthetic {
            warn!("Upstream caller in SYNTHETIC mode: gateway will not be called");
        }
        debug!(
            lead_transfer = %endpoints.lead_transfer,
            quick_quote = %endpoints.quick_quote,
            mode = %mode,
            "Creating upstream caller"
        );

        Ok(Self {
            client,
            authorization: bearer(credential),
            endpoints,
            mode,
        })
    }

    pub fn mode(&self) -> UpstreamMode {
        self.mode
    }

    pub fn endpoints(&self) -> &UpstreamEndpoints {
        &self.endpoints
    }

    /// Forward `payload` to the endpoint for `kind` and return the raw body.
    ///
    /// The whole exchange, including reading the body, must finish before
    /// `deadline`.
    #[instrument(skip(self, payload, deadline), fields(mode = %self.mode))]
    pub async fn call<P>(
        &self,
        kind: ExchangeKind,
        payload: &P,
        deadline: Instant,
    ) -> Result<Bytes, UpstreamError>
    where
        P: Serialize + ?Sized,
    {
        let result = match serde_json::to_vec(payload) {
            Ok(body) => match self.mode {
                UpstreamMode::Live => self.call_live(kind, body, deadline).await,
                UpstreamMode::Synthetic => synthetic_response(kind, &body),
            },
            Err(e) => Err(UpstreamError::from(e)),
        };

        if let Err(e) = &result {
            error!(error = %e, error_kind = e.kind(), "Upstream call failed");
            prom::record_upstream_error(e.kind());
        }
        result
    }

    async fn call_live(
        &self,
        kind: ExchangeKind,
        body: Vec<u8>,
        deadline: Instant,
    ) -> Result<Bytes, UpstreamError> {
        let endpoint = self.endpoints.for_kind(kind);
        let started = Instant::now();
        debug!(url = %endpoint, bytes = body.len(), "Sending upstream request");

        let exchange = async {
            let response = self
                .client
                .post(endpoint)
                .header(CONTENT_TYPE, "application/json")
                .header(AUTHORIZATION, &self.authorization)
                .body(body)
                .send()
                .await
                .map_err(|source| UpstreamError::Network {
                    endpoint: endpoint.to_string(),
                    source,
                })?;

            let status = response.status();
            let bytes = response.bytes().await.map_err(|source| UpstreamError::Network {
                endpoint: endpoint.to_string(),
                source,
            })?;

            if !status.is_success() {
                return Err(UpstreamError::Status {
                    status: status.as_u16(),
                    body: String::from_utf8_lossy(&bytes).into_owned(),
                });
            }
            Ok(bytes)
        };

        match tokio::time::timeout_at(deadline, exchange).await {
            Ok(result) => {
                if result.is_ok() {
                    debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Upstream call complete");
                }
                result
            }
            Err(_) => Err(UpstreamError::Timeout {
                endpoint: endpoint.to_string(),
                after: started.elapsed(),
            }),
        }
    }
}

/// Normalize a credential into an `Authorization` header value.
///
/// Accepts both `token123` and `Bearer token123`.
fn bearer(credential: &str) -> String {
    let trimmed = credential.trim();
    match trimmed.split_once(' ') {
        Some((scheme, _)) if scheme.eq_ignore_ascii_case("bearer") => trimmed.to_string(),
        _ => format!("Bearer {}", trimmed),
    }
}

/// Fabricate a gateway-shaped response for `kind`.
fn synthetic_response(kind: ExchangeKind, body: &[u8]) -> Result<Bytes, UpstreamError> {
    let stamp = format!(
        "{}-{}",
        Utc::now().timestamp(),
        SYNTHETIC_SEQUENCE.fetch_add(1, Ordering::Relaxed)
    );
    warn!(kind = %kind, "Serving synthetic upstream response");

    let value = match kind {
        ExchangeKind::LeadTransfer => {
            let request: Value = serde_json::from_slice(body)?;
            let first_name = request
                .get("first_name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let uuid = format!("synthetic-lead-{}", stamp);
            let redirect_url = Url::parse_with_params(
                SYNTHETIC_REDIRECT_BASE,
                &[("uuid", uuid.as_str()), ("ref", "synthetic"), ("name", first_name)],
            )
            .map(String::from)
            .unwrap_or_else(|_| SYNTHETIC_REDIRECT_BASE.to_string());

            json!({
                "success": true,
                "data": {
                    "uuid": uuid,
                    "redirect_url": redirect_url,
                }
            })
        }
        ExchangeKind::QuickQuote => json!({
            "success": true,
            "id": format!("synthetic-quote-{}", stamp),
            "data": [{
                "premium": SYNTHETIC_PREMIUM,
                "excess": SYNTHETIC_EXCESS,
            }]
        }),
    };

    Ok(Bytes::from(serde_json::to_vec(&value)?))
}
