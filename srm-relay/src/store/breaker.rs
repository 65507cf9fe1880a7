//! Circuit-breaker persistence
//!
//! The breaker component keeps a per-scope cache; this store is the
//! durable copy that survives restarts. A narrow trait keeps the breaker
//! free of any storage technology.

use super::{RelayDb, StoreResult};
use async_trait::async_trait;
use dashmap::DashMap;
use redb::{Database, ReadableDatabase, TableDefinition};
use shared::BreakerRecord;
use std::sync::Arc;

/// Breaker records: scope key -> JSON [`BreakerRecord`]
pub(super) const BREAKERS_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("circuit_breakers");

/// Durable store for breaker records.
#[async_trait]
pub trait BreakerStore: Send + Sync {
    async fn get(&self, scope: &str) -> StoreResult<Option<BreakerRecord>>;
    async fn put(&self, record: &BreakerRecord) -> StoreResult<()>;
}

/// redb-backed breaker store.
#[derive(Clone)]
pub struct RedbBreakerStore {
    db: Arc<Database>,
}

impl RedbBreakerStore {
    pub fn new(db: &RelayDb) -> Self {
        Self {
            db: db.raw().clone(),
        }
    }
}

#[async_trait]
impl BreakerStore for RedbBreakerStore {
    async fn get(&self, scope: &str) -> StoreResult<Option<BreakerRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(BREAKERS_TABLE)?;
        match table.get(scope)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    async fn put(&self, record: &BreakerRecord) -> StoreResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(BREAKERS_TABLE)?;
            table.insert(record.scope.as_str(), serde_json::to_vec(record)?.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }
}

/// In-memory breaker store for tests.
#[derive(Default)]
pub struct MemoryBreakerStore {
    records: DashMap<String, BreakerRecord>,
}

impl MemoryBreakerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BreakerStore for MemoryBreakerStore {
    async fn get(&self, scope: &str) -> StoreResult<Option<BreakerRecord>> {
        Ok(self.records.get(scope).map(|r| r.value().clone()))
    }

    async fn put(&self, record: &BreakerRecord) -> StoreResult<()> {
        self.records.insert(record.scope.clone(), record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::BreakerState;

    #[tokio::test]
    async fn redb_round_trip() {
        let store = RedbBreakerStore::new(&RelayDb::open_in_memory().unwrap());
        assert!(store.get("ESSAI:t1").await.unwrap().is_none());

        let mut record = BreakerRecord::closed("ESSAI:t1");
        record.state = BreakerState::Open;
        record.consecutive_failures = 5;
        record.opened_at = Some(123);
        store.put(&record).await.unwrap();

        let loaded = store.get("ESSAI:t1").await.unwrap().unwrap();
        assert_eq!(loaded, record);
    }
}
