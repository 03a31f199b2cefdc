//! Persisted record shapes.
//!
//! A record is a denormalized copy of the request's identifying fields plus
//! what the gateway handed back. It is built once per successful exchange
//! and moved into the persistence sink, which owns it from then on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::exchange::ExchangeKind;

/// Stored copy of a successful lead transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub source: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub id_number: Option<String>,
    pub quote_id: Option<String>,
    pub contact_number: String,
    /// Identifier issued by the gateway
    pub response_uuid: String,
    pub redirect_url: String,
    pub created_at: DateTime<Utc>,
}

/// Stored copy of a successful quick quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub source: String,
    pub external_reference_id: String,
    pub vehicle_count: u32,
    /// Identifier issued by the gateway
    pub response_id: String,
    /// Premium of the first priced entry, absent when the gateway priced nothing
    pub premium: Option<f64>,
    pub excess: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Any record the persistence sink accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PersistedRecord {
    Lead(LeadRecord),
    Quote(QuoteRecord),
}

impl PersistedRecord {
    pub fn kind(&self) -> ExchangeKind {
        match self {
            Self::Lead(_) => ExchangeKind::LeadTransfer,
            Self::Quote(_) => ExchangeKind::QuickQuote,
        }
    }

    /// Gateway-issued identifier the record is keyed by
    pub fn upstream_id(&self) -> &str {
        match self {
            Self::Lead(lead) => &lead.response_uuid,
            Self::Quote(quote) => &quote.response_id,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::Lead(lead) => lead.created_at,
            Self::Quote(quote) => quote.created_at,
        }
    }
}
