//! Process-local sink used when no database is configured.
//!
//! Records are keyed by row id in insertion order and bounded: once the
//! capacity is reached the oldest record is evicted. Gateway identifiers are
//! an index over row ids, so a repeated identifier never replaces an earlier
//! record; lookups return the newest match, as the SQLite sink does.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use leadrelay_core::{LeadRecord, PersistedRecord, QuoteRecord};
use lru::LruCache;
use tracing::debug;

use super::{PersistenceError, PersistenceSink};

/// Records kept when no capacity is configured
pub const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

struct MemoryStore {
    /// Row id to record, oldest first; lookups use `peek` so order never changes
    records: LruCache<i64, PersistedRecord>,
    leads: HashMap<String, Vec<i64>>,
    quotes: HashMap<String, Vec<i64>>,
    next_id: i64,
}

impl MemoryStore {
    fn index_for(&mut self, record: &PersistedRecord) -> &mut HashMap<String, Vec<i64>> {
        match record {
            PersistedRecord::Lead(_) => &mut self.leads,
            PersistedRecord::Quote(_) => &mut self.quotes,
        }
    }

    fn unindex(&mut self, id: i64, record: &PersistedRecord) {
        let key = record.upstream_id();
        let index = self.index_for(record);
        let emptied = match index.get_mut(key) {
            Some(ids) => {
                ids.retain(|existing| *existing != id);
                ids.is_empty()
            }
            None => false,
        };
        if emptied {
            index.remove(key);
        }
    }

    /// Newest record stored under `key`
    fn newest(&self, index: &HashMap<String, Vec<i64>>, key: &str) -> Option<&PersistedRecord> {
        let id = index.get(key)?.last()?;
        self.records.peek(id)
    }
}

/// Bounded in-memory record store
pub struct MemorySink {
    store: Mutex<MemoryStore>,
    capacity: usize,
    /// When set, every operation fails
    failing: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }

    /// Keep at most `capacity` records; zero is treated as one
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store: Mutex::new(MemoryStore {
                records: LruCache::new(capacity),
                leads: HashMap::new(),
                quotes: HashMap::new(),
                next_id: 0,
            }),
            capacity: capacity.get(),
            failing: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Make every subsequent operation fail, or recover
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // No await happens under the lock, so a poisoned store is still consistent
    fn lock(&self) -> MutexGuard<'_, MemoryStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("memory sink set to fail".to_string()));
        }
        Ok(())
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemorySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySink")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn save(&self, record: PersistedRecord) -> Result<i64, PersistenceError> {
        self.check()?;
        let mut store = self.lock();
        store.next_id += 1;
        let id = store.next_id;

        store
            .index_for(&record)
            .entry(record.upstream_id().to_string())
            .or_default()
            .push(id);
        if let Some((evicted_id, evicted)) = store.records.push(id, record) {
            debug!(row_id = evicted_id, upstream_id = evicted.upstream_id(), "Evicted oldest record");
            store.unindex(evicted_id, &evicted);
        }
        Ok(id)
    }

    async fn find_lead(&self, uuid: &str) -> Result<Option<LeadRecord>, PersistenceError> {
        self.check()?;
        let store = self.lock();
        Ok(match store.newest(&store.leads, uuid) {
            Some(PersistedRecord::Lead(lead)) => Some(lead.clone()),
            _ => None,
        })
    }

    async fn find_quote(&self, id: &str) -> Result<Option<QuoteRecord>, PersistenceError> {
        self.check()?;
        let store = self.lock();
        Ok(match store.newest(&store.quotes, id) {
            Some(PersistedRecord::Quote(quote)) => Some(quote.clone()),
            _ => None,
        })
    }

    async fn ping(&self) -> Result<(), PersistenceError> {
        self.check()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn quote(id: &str) -> PersistedRecord {
        PersistedRecord::Quote(QuoteRecord {
            source: "broker".to_string(),
            external_reference_id: "ext-1".to_string(),
            vehicle_count: 1,
            response_id: id.to_string(),
            premium: Some(1240.46),
            excess: Some(6200.0),
            created_at: Utc::now(),
        })
    }

    fn lead(uuid: &str, first_name: &str) -> PersistedRecord {
        PersistedRecord::Lead(LeadRecord {
            source: "web".to_string(),
            first_name: first_name.to_string(),
            last_name: "Nkosi".to_string(),
            email: "lead@example.co.za".to_string(),
            id_number: None,
            quote_id: None,
            contact_number: "0821234567".to_string(),
            response_uuid: uuid.to_string(),
            redirect_url: "https://gw/redirect".to_string(),
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_save_and_find() {
        let sink = MemorySink::new();
        let first = sink.save(quote("q-1")).await.unwrap();
        let second = sink.save(quote("q-2")).await.unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.find_quote("q-1").await.unwrap().unwrap().response_id, "q-1");
        assert!(sink.find_quote("missing").await.unwrap().is_none());
        assert!(sink.find_lead("q-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_repeated_upstream_id_keeps_both_records() {
        let sink = MemorySink::new();
        sink.save(lead("u-1", "Alice")).await.unwrap();
        sink.save(lead("u-1", "Bob")).await.unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.find_lead("u-1").await.unwrap().unwrap().first_name, "Bob");
    }

    #[tokio::test]
    async fn test_oldest_records_evicted_at_capacity() {
        let sink = MemorySink::with_capacity(2);
        sink.save(quote("q-1")).await.unwrap();
        sink.save(lead("u-1", "Alice")).await.unwrap();
        sink.save(quote("q-3")).await.unwrap();

        assert_eq!(sink.len(), 2);
        assert!(sink.find_quote("q-1").await.unwrap().is_none());
        assert!(sink.find_lead("u-1").await.unwrap().is_some());
        assert!(sink.find_quote("q-3").await.unwrap().is_some());
        assert!(sink.lock().quotes.get("q-1").is_none());
    }

    #[tokio::test]
    async fn test_eviction_falls_back_to_older_duplicate() {
        let sink = MemorySink::with_capacity(2);
        sink.save(lead("u-1", "Alice")).await.unwrap();
        sink.save(lead("u-1", "Bob")).await.unwrap();
        sink.save(quote("q-1")).await.unwrap();

        // Alice was evicted, Bob is still the newest for u-1
        assert_eq!(sink.find_lead("u-1").await.unwrap().unwrap().first_name, "Bob");
        assert_eq!(sink.lock().leads["u-1"].len(), 1);
    }

    #[tokio::test]
    async fn test_zero_capacity_keeps_one() {
        let sink = MemorySink::with_capacity(0);
        assert_eq!(sink.capacity(), 1);
        sink.save(quote("q-1")).await.unwrap();
        sink.save(quote("q-2")).await.unwrap();
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_sink() {
        let sink = MemorySink::new();
        sink.set_failing(true);
        assert!(sink.save(quote("q-1")).await.is_err());
        assert!(sink.ping().await.is_err());
        assert!(sink.is_empty());

        sink.set_failing(false);
        assert!(sink.ping().await.is_ok());
    }
}
