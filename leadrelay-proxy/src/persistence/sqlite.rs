//! SQLite-backed sink.
//!
//! Uses an r2d2 connection pool; every query runs on the blocking pool so
//! the async runtime never waits on disk.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadrelay_core::{LeadRecord, PersistedRecord, QuoteRecord};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

use super::{PersistenceError, PersistenceSink};

type DbPool = Pool<SqliteConnectionManager>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS lead_transfers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    email TEXT NOT NULL,
    id_number TEXT,
    quote_id TEXT,
    contact_number TEXT NOT NULL,
    response_uuid TEXT NOT NULL,
    redirect_url TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_lead_transfers_uuid ON lead_transfers(response_uuid);

CREATE TABLE IF NOT EXISTS quick_quotes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    external_reference_id TEXT NOT NULL,
    vehicle_count INTEGER NOT NULL,
    response_id TEXT NOT NULL,
    premium REAL,
    excess REAL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_quick_quotes_response_id ON quick_quotes(response_id);
";

/// Sink writing to a SQLite database file
#[derive(Clone)]
pub struct SqliteSink {
    pool: Arc<DbPool>,
}

impl SqliteSink {
    /// Open (or create) the database at `path` and ensure the schema exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;"));
        let pool = Pool::builder().max_size(8).build(manager)?;

        let sink = Self { pool: Arc::new(pool) };
        sink.init_schema()?;
        info!(path = %path.display(), "SQLite sink ready");
        Ok(sink)
    }

    fn init_schema(&self) -> Result<(), PersistenceError> {
        let conn = self.pool.get()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Run `f` with a pooled connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T, PersistenceError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T, PersistenceError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await?
    }
}

fn insert_lead(conn: &rusqlite::Connection, lead: &LeadRecord) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO lead_transfers
         (source, first_name, last_name, email, id_number, quote_id,
          contact_number, response_uuid, redirect_url, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            lead.source,
            lead.first_name,
            lead.last_name,
            lead.email,
            lead.id_number,
            lead.quote_id,
            lead.contact_number,
            lead.response_uuid,
            lead.redirect_url,
            lead.created_at.to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn insert_quote(conn: &rusqlite::Connection, quote: &QuoteRecord) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO quick_quotes
         (source, external_reference_id, vehicle_count, response_id,
          premium, excess, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            quote.source,
            quote.external_reference_id,
            quote.vehicle_count,
            quote.response_id,
            quote.premium,
            quote.excess,
            quote.created_at.to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn lead_from_row(row: &Row<'_>) -> rusqlite::Result<LeadRecord> {
    Ok(LeadRecord {
        source: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        id_number: row.get(4)?,
        quote_id: row.get(5)?,
        contact_number: row.get(6)?,
        response_uuid: row.get(7)?,
        redirect_url: row.get(8)?,
        created_at: timestamp(row, 9)?,
    })
}

fn quote_from_row(row: &Row<'_>) -> rusqlite::Result<QuoteRecord> {
    Ok(QuoteRecord {
        source: row.get(0)?,
        external_reference_id: row.get(1)?,
        vehicle_count: row.get(2)?,
        response_id: row.get(3)?,
        premium: row.get(4)?,
        excess: row.get(5)?,
        created_at: timestamp(row, 6)?,
    })
}

#[async_trait]
impl PersistenceSink for SqliteSink {
    async fn save(&self, record: PersistedRecord) -> Result<i64, PersistenceError> {
        self.with_conn(move |conn| {
            let id = match &record {
                PersistedRecord::Lead(lead) => insert_lead(conn, lead)?,
                PersistedRecord::Quote(quote) => insert_quote(conn, quote)?,
            };
            Ok(id)
        })
        .await
    }

    async fn find_lead(&self, uuid: &str) -> Result<Option<LeadRecord>, PersistenceError> {
        let uuid = uuid.to_string();
        self.with_conn(move |conn| {
            let lead = conn
                .query_row(
                    "SELECT source, first_name, last_name, email, id_number, quote_id,
                            contact_number, response_uuid, redirect_url, created_at
                     FROM lead_transfers
                     WHERE response_uuid = ?1
                     ORDER BY id DESC
                     LIMIT 1",
                    params![uuid],
                    lead_from_row,
                )
                .optional()?;
            Ok(lead)
        })
        .await
    }

    async fn find_quote(&self, id: &str) -> Result<Option<QuoteRecord>, PersistenceError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let quote = conn
                .query_row(
                    "SELECT source, external_reference_id, vehicle_count, response_id,
                            premium, excess, created_at
                     FROM quick_quotes
                     WHERE response_id = ?1
                     ORDER BY id DESC
                     LIMIT 1",
                    params![id],
                    quote_from_row,
                )
                .optional()?;
            Ok(quote)
        })
        .await
    }

    async fn ping(&self) -> Result<(), PersistenceError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
