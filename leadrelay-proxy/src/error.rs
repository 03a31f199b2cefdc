//! Error types for the leadrelay proxy.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use leadrelay_core::ValidationError;
use serde_json::json;

use crate::gate::GateError;
use crate::upstream::{UnknownModeError, UpstreamError};

/// Everything that can end a dispatch before a response is returned
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Request rejected before any capacity was consumed
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No gate token within the request deadline
    #[error("Upstream is busy, no capacity within the request timeout")]
    GateTimeout,

    /// Gate shut down while waiting
    #[error("Service is shutting down")]
    Unavailable,

    /// Transport failure talking to the gateway
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Gateway body was malformed or did not signal success
    #[error("{0}")]
    Decode(String),
}

impl From<GateError> for DispatchError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Timeout { .. } | GateError::Exhausted => Self::GateTimeout,
            GateError::Closed => Self::Unavailable,
        }
    }
}

impl DispatchError {
    /// Label surfaced as `kind` in error bodies and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(ValidationError::UnsupportedMediaType(_)) => "unsupported_media_type",
            Self::Validation(_) => "validation",
            Self::GateTimeout => "gate_timeout",
            Self::Unavailable => "unavailable",
            Self::Upstream(UpstreamError::Timeout { .. }) => "upstream_timeout",
            Self::Upstream(UpstreamError::Status { .. }) => "upstream_status",
            Self::Upstream(UpstreamError::Serialization(_)) => "upstream_serialization",
            Self::Upstream(_) => "upstream_network",
            Self::Decode(_) => "decode",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(ValidationError::UnsupportedMediaType(_)) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::GateTimeout | Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream(UpstreamError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            Self::Upstream(UpstreamError::Serialization(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Decode(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
            "kind": self.kind(),
        }));

        (self.status(), body).into_response()
    }
}

/// Startup configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    UnknownMode(#[from] UnknownModeError),

    #[error("LEADRELAY_API_TOKEN must be set when the upstream mode is live")]
    MissingCredential,

    #[error("Failed to initialize upstream client: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Failed to open database: {0}")]
    Persistence(#[from] crate::persistence::PersistenceError),
}
