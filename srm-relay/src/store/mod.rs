//! redb-backed durable state
//!
//! One database file holds the delivery queue, circuit-breaker records,
//! and the sealed device-profile records. Storage is deliberately narrow:
//! typed accessors per concern, no storage types leaking upward.

pub mod breaker;
pub mod profile;
pub mod queue;

use redb::Database;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queue entry not found: {0}")]
    EntryNotFound(String),

    #[error("Claim on entry {0} is no longer held by this worker")]
    StaleClaim(String),

    #[error("Entry {0} is not a dead-letter")]
    NotDeadLetter(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Shared handle to the relay database.
#[derive(Clone)]
pub struct RelayDb {
    db: Arc<Database>,
}

impl RelayDb {
    /// Open or create the database file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db = Database::create(path)?;
        let relay = Self { db: Arc::new(db) };
        relay.init_tables()?;
        Ok(relay)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        let relay = Self { db: Arc::new(db) };
        relay.init_tables()?;
        Ok(relay)
    }

    fn init_tables(&self) -> StoreResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let _ = write_txn.open_table(queue::ENTRIES_TABLE)?;
            let _ = write_txn.open_table(queue::SEQUENCES_TABLE)?;
            let _ = write_txn.open_table(queue::BY_ID_TABLE)?;
            let _ = write_txn.open_table(breaker::BREAKERS_TABLE)?;
            let _ = write_txn.open_table(profile::PROFILES_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub(crate) fn raw(&self) -> &Arc<Database> {
        &self.db
    }
}
