/// Storage layer for the primary record store and the persisted indexes
///
/// This module defines the two storage seams the engine is built against:
/// the primary keyed store of completion records (the source of truth) and
/// the index store holding one metadata record plus the three derived
/// collections. SQLite provides the durable implementation; an in-memory
/// implementation backs tests and ephemeral hosts.

pub mod memory;
pub mod migrations;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::collections::BTreeSet;

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::{CompletionId, CompletionRecord, DailySummary, DateKey, HabitId};
use crate::index::{IndexCollections, IndexMetadata};

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database query error: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Completion record not found: {id}")]
    RecordNotFound { id: String },

    #[error("Migration error: {0}")]
    Migration(String),
}

/// The durable keyed collection of completion records
///
/// The source of truth the indexes are derived from. Every operation is
/// durable upon return. `get_by_date_range` is the bounded-cost scan the
/// backfill worker and the router's fallback path rely on.
pub trait PrimaryStore {
    /// All records, in no particular order
    fn get_all(&self) -> Result<Vec<CompletionRecord>, StorageError>;

    /// Look up one record by id
    fn get_by_id(&self, id: &CompletionId) -> Result<Option<CompletionRecord>, StorageError>;

    /// Insert or replace one record
    fn put(&self, record: &CompletionRecord) -> Result<(), StorageError>;

    /// Insert or replace a batch of records
    fn put_all(&self, records: &[CompletionRecord]) -> Result<(), StorageError>;

    /// Remove one record
    fn delete(&self, id: &CompletionId) -> Result<(), StorageError>;

    /// Remove every record
    fn clear(&self) -> Result<(), StorageError>;

    /// All records completed within `[start, end]` inclusive
    fn get_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CompletionRecord>, StorageError>;
}

/// Persistence for the index metadata and the three derived collections
///
/// Saving a bucket whose id set (or summary) is empty deletes it, so the
/// persisted layout never accumulates empty rows.
pub trait IndexStore {
    /// Load the metadata record, if one has ever been written
    fn load_index_metadata(&self) -> Result<Option<IndexMetadata>, StorageError>;

    /// Persist the metadata record
    fn save_index_metadata(&self, metadata: &IndexMetadata) -> Result<(), StorageError>;

    /// Load all three persisted collections
    fn load_index_collections(&self) -> Result<IndexCollections, StorageError>;

    /// Atomically replace all three persisted collections
    fn replace_index_collections(
        &self,
        collections: &IndexCollections,
    ) -> Result<(), StorageError>;

    /// Persist one date bucket; an empty id set deletes the bucket
    fn save_date_bucket(
        &self,
        key: DateKey,
        ids: &BTreeSet<CompletionId>,
    ) -> Result<(), StorageError>;

    /// Persist one habit bucket; an empty id set deletes the bucket
    fn save_habit_bucket(
        &self,
        habit_id: &HabitId,
        ids: &BTreeSet<CompletionId>,
    ) -> Result<(), StorageError>;

    /// Persist one daily summary; a summary with zero entries is deleted
    fn save_daily_summary(
        &self,
        key: DateKey,
        summary: &DailySummary,
    ) -> Result<(), StorageError>;
}
