//! HTTP route handlers for the leadrelay proxy.
//!
//! This module organizes all route handlers:
//! - `health`: Health check and metrics endpoints
//! - `lead`: Lead transfer forwarding and lookup
//! - `quote`: Quick quote forwarding and lookup

pub mod health;
pub mod lead;
pub mod quote;

use axum::http::{header::CONTENT_TYPE, HeaderMap};
use leadrelay_core::ValidationError;
use serde::de::DeserializeOwned;

// Re-export handlers for convenience
pub use health::{health, live, metrics, metrics_prometheus, ping, ready};
pub use lead::{get_lead, lead_transfer};
pub use quote::{get_quote, quick_quote};

/// Decode a JSON request body, insisting on a JSON content type
pub(crate) fn json_body<T: DeserializeOwned>(
    headers: &HeaderMap,
    body: &[u8],
) -> Result<T, ValidationError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    if !mime.eq_ignore_ascii_case("application/json") {
        return Err(ValidationError::UnsupportedMediaType(content_type.to_string()));
    }

    serde_json::from_slice(body).map_err(|e| ValidationError::body(e.to_string()))
}
