/// In-memory implementation of the storage interfaces
///
/// Backs tests and ephemeral hosts. Everything lives behind one mutex so
/// the store can be shared the same way the SQLite implementation is; the
/// engine itself still assumes a single writer.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Mutex;

use chrono::NaiveDate;

use crate::domain::{CompletionId, CompletionRecord, DailySummary, DateKey, HabitId};
use crate::index::{IndexCollections, IndexMetadata};
use crate::storage::{IndexStore, PrimaryStore, StorageError};

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<CompletionId, CompletionRecord>,
    metadata: Option<IndexMetadata>,
    collections: IndexCollections,
}

/// Keyed record store plus index persistence, held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned mutex means a panic mid-write; the data is still the
        // best available copy.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl PrimaryStore for MemoryStore {
    fn get_all(&self) -> Result<Vec<CompletionRecord>, StorageError> {
        let inner = self.lock();
        let mut records: Vec<CompletionRecord> = inner.records.values().cloned().collect();
        records.sort_by(|a, b| {
            (a.completed_date, a.completed_at, &a.id).cmp(&(b.completed_date, b.completed_at, &b.id))
        });
        Ok(records)
    }

    fn get_by_id(&self, id: &CompletionId) -> Result<Option<CompletionRecord>, StorageError> {
        Ok(self.lock().records.get(id).cloned())
    }

    fn put(&self, record: &CompletionRecord) -> Result<(), StorageError> {
        self.lock().records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn put_all(&self, records: &[CompletionRecord]) -> Result<(), StorageError> {
        let mut inner = self.lock();
        for record in records {
            inner.records.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    fn delete(&self, id: &CompletionId) -> Result<(), StorageError> {
        let removed = self.lock().records.remove(id);
        if removed.is_none() {
            return Err(StorageError::RecordNotFound { id: id.to_string() });
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.lock().records.clear();
        Ok(())
    }

    fn get_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CompletionRecord>, StorageError> {
        let inner = self.lock();
        let mut records: Vec<CompletionRecord> = inner
            .records
            .values()
            .filter(|r| r.completed_date >= start && r.completed_date <= end)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            (a.completed_date, a.completed_at, &a.id).cmp(&(b.completed_date, b.completed_at, &b.id))
        });
        Ok(records)
    }
}

impl IndexStore for MemoryStore {
    fn load_index_metadata(&self) -> Result<Option<IndexMetadata>, StorageError> {
        Ok(self.lock().metadata.clone())
    }

    fn save_index_metadata(&self, metadata: &IndexMetadata) -> Result<(), StorageError> {
        self.lock().metadata = Some(metadata.clone());
        Ok(())
    }

    fn load_index_collections(&self) -> Result<IndexCollections, StorageError> {
        Ok(self.lock().collections.clone())
    }

    fn replace_index_collections(
        &self,
        collections: &IndexCollections,
    ) -> Result<(), StorageError> {
        self.lock().collections = collections.clone();
        Ok(())
    }

    fn save_date_bucket(
        &self,
        key: DateKey,
        ids: &BTreeSet<CompletionId>,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if ids.is_empty() {
            inner.collections.dates.remove(&key);
        } else {
            inner.collections.dates.insert(key, ids.clone());
        }
        Ok(())
    }

    fn save_habit_bucket(
        &self,
        habit_id: &HabitId,
        ids: &BTreeSet<CompletionId>,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if ids.is_empty() {
            inner.collections.habits.remove(habit_id);
        } else {
            inner.collections.habits.insert(habit_id.clone(), ids.clone());
        }
        Ok(())
    }

    fn save_daily_summary(
        &self,
        key: DateKey,
        summary: &DailySummary,
    ) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if summary.is_empty() {
            inner.collections.summaries.remove(&key);
        } else {
            inner.collections.summaries.insert(key, *summary);
        }
        Ok(())
    }
}
