//! Durable storage for completed exchanges.
//!
//! The dispatcher never talks to a sink directly. Successful dispatches hand
//! their [`PersistedRecord`] to the [`PersistenceWorker`], which saves it on a
//! detached task under its own deadline. A slow or failing sink can therefore
//! never change what the client sees.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  Done   ┌───────────────────┐  spawn   ┌──────────────────┐
//! │ Dispatcher │ ──────▶ │ PersistenceWorker │ ───────▶ │ PersistenceSink  │
//! └────────────┘ record  │  (TaskTracker)    │ timeout  │ SqliteSink       │
//!                        └───────────────────┘          │ MemorySink       │
//!                                                       └──────────────────┘
//! ```

mod memory;
mod sqlite;
mod worker;

use async_trait::async_trait;
use leadrelay_core::{LeadRecord, PersistedRecord, QuoteRecord};

pub use memory::{MemorySink, DEFAULT_MEMORY_CAPACITY};
pub use sqlite::SqliteSink;
pub use worker::{PersistenceStats, PersistenceWorker};

/// Persistence error types
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Failed to get connection: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Persistence task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

/// Storage backend for persisted records
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Store a record and return its row id
    async fn save(&self, record: PersistedRecord) -> Result<i64, PersistenceError>;

    /// Look up a lead by the gateway-issued uuid
    async fn find_lead(&self, uuid: &str) -> Result<Option<LeadRecord>, PersistenceError>;

    /// Look up a quote by the gateway-issued id
    async fn find_quote(&self, id: &str) -> Result<Option<QuoteRecord>, PersistenceError>;

    /// Check the backend is reachable
    async fn ping(&self) -> Result<(), PersistenceError>;

    /// Short backend name for health output
    fn name(&self) -> &'static str;
}
