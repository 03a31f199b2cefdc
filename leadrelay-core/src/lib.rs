// leadrelay Core Library
//
// Gateway payloads, structural validation and persisted record shapes

pub mod error;
pub mod exchange;
pub mod lead;
pub mod quote;
pub mod record;
pub mod validate;

pub use error::ValidationError;
pub use exchange::{Exchange, ExchangeKind};
pub use lead::{LeadTransferData, LeadTransferRequest, LeadTransferResponse};
pub use quote::{Address, Driver, QuickQuoteRequest, QuickQuoteResponse, QuotePrice, Vehicle};
pub use record::{LeadRecord, PersistedRecord, QuoteRecord};
pub use validate::{FieldScope, Validate};
