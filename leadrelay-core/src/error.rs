//! Error types for the leadrelay core library
//!
//! Only structural validation lives here. Transport, gate and persistence
//! failures belong to the proxy crate, which wraps [`ValidationError`] in
//! its own dispatch error.
//!
//! # Usage
//!
//! ```rust,ignore
//! use leadrelay_core::error::ValidationError;
//!
//! fn check_source(source: &str) -> Result<(), ValidationError> {
//!     if source.trim().is_empty() {
//!         return Err(ValidationError::missing("source"));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Errors raised before a request is allowed anywhere near the upstream gateway
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Request did not declare a JSON body
    #[error("Content-Type must be application/json, got '{0}'")]
    UnsupportedMediaType(String),

    /// Body could not be parsed as the expected JSON shape
    #[error("Invalid request body: {0}")]
    Body(String),

    /// A required field is absent or blank
    #[error("Validation error: field '{field}' is required")]
    Missing { field: String },

    /// A field is present but violates its rule
    #[error("Validation error: field '{field}' {reason}")]
    Invalid { field: String, reason: String },
}

impl ValidationError {
    /// Create a missing-field error
    pub fn missing(field: impl Into<String>) -> Self {
        Self::Missing { field: field.into() }
    }

    /// Create an invalid-field error
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a body parse error
    pub fn body(msg: impl Into<String>) -> Self {
        Self::Body(msg.into())
    }

    /// Name of the offending field, when the error is tied to one
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Missing { field } | Self::Invalid { field, .. } => Some(field),
            _ => None,
        }
    }
}
