//! The request/response pairing the forwarding core is generic over.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::record::PersistedRecord;
use crate::validate::Validate;

/// Which gateway operation a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    LeadTransfer,
    QuickQuote,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeadTransfer => "lead_transfer",
            Self::QuickQuote => "quick_quote",
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request type that can be forwarded to the gateway.
///
/// Ties the outbound payload to the response it expects, the rule deciding
/// whether a cleanly parsed response actually succeeded, and the record
/// written once it did.
pub trait Exchange: Validate + Serialize + Send + Sync + 'static {
    /// Parsed gateway response
    type Response: DeserializeOwned + Serialize + Send + Sync + 'static;

    const KIND: ExchangeKind;

    /// Reject responses that parse but do not signal success
    fn accept(response: &Self::Response) -> Result<(), String>;

    /// Identifier the gateway assigned to this exchange
    fn upstream_id(response: &Self::Response) -> &str;

    /// Project the request/response pair into its persisted form
    fn to_record(&self, response: &Self::Response, created_at: DateTime<Utc>) -> PersistedRecord;
}
