//! Lead transfer payloads.
//!
//! Wire format of the gateway's `POST /users/motor_lead` endpoint. Field
//! names match the gateway exactly so the body can be forwarded as is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::exchange::{Exchange, ExchangeKind};
use crate::record::{LeadRecord, PersistedRecord};
use crate::validate::{FieldScope, Validate};

/// Customer lead forwarded to the gateway
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadTransferRequest {
    pub source: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// 13-digit national ID number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_number: Option<String>,
    /// Quote previously issued for this customer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_id: Option<String>,
    pub contact_number: String,
}

impl Validate for LeadTransferRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        let root = FieldScope::root();
        root.required("source", &self.source)?;
        root.required("first_name", &self.first_name)?;
        root.required("last_name", &self.last_name)?;
        root.email("email", &self.email)?;
        if let Some(id_number) = non_blank(&self.id_number) {
            root.exact_len("id_number", id_number, 13)?;
        }
        root.required("contact_number", &self.contact_number)?;
        Ok(())
    }
}

/// Response of the lead transfer endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadTransferResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: LeadTransferData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadTransferData {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub redirect_url: String,
}

impl Exchange for LeadTransferRequest {
    type Response = LeadTransferResponse;

    const KIND: ExchangeKind = ExchangeKind::LeadTransfer;

    fn accept(response: &LeadTransferResponse) -> Result<(), String> {
        if !response.success || response.data.uuid.is_empty() {
            return Err("Invalid response from Lead Transfer API: missing success or UUID".to_string());
        }
        Ok(())
    }

    fn upstream_id(response: &LeadTransferResponse) -> &str {
        &response.data.uuid
    }

    fn to_record(&self, response: &LeadTransferResponse, created_at: DateTime<Utc>) -> PersistedRecord {
        PersistedRecord::Lead(LeadRecord {
            source: self.source.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            id_number: non_blank(&self.id_number).map(str::to_string),
            quote_id: non_blank(&self.quote_id).map(str::to_string),
            contact_number: self.contact_number.clone(),
            response_uuid: response.data.uuid.clone(),
            redirect_url: response.data.redirect_url.clone(),
            created_at,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
