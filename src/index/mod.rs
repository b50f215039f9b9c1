/// Derived index collections and the components that maintain them
///
/// This module holds the three derived mappings (date index, habit index,
/// daily summaries) plus the bootstrap builder, the incremental backfill
/// aggregation, the integrity checker, the query router and the per-date
/// cache that together form the index engine's internals.

pub mod bootstrap;
pub mod cache;
pub mod chunk;
pub mod integrity;
pub mod metadata;
pub mod router;

pub use bootstrap::DEFAULT_BOOTSTRAP_WINDOW_DAYS;
pub use cache::{CompletionDateCache, CompletionsByHabit, CACHE_CAPACITY};
pub use chunk::{aggregate_chunk, ChunkRow};
pub use metadata::{IndexMetadata, RebuildReason, INDEX_VERSION};

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{CompletionId, CompletionRecord, DailySummary, DateKey, HabitId};

/// The three derived mappings, kept consistent with the primary store
///
/// Ordered containers throughout: rebuilding from an identical store
/// snapshot yields identical collections, which is what makes the
/// bootstrap idempotence property checkable with plain equality.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexCollections {
    /// date key -> ids of all completions on that date
    pub dates: BTreeMap<DateKey, BTreeSet<CompletionId>>,
    /// habit id -> ids of all indexed completions of that habit
    pub habits: BTreeMap<HabitId, BTreeSet<CompletionId>>,
    /// date key -> per-day aggregate counters
    pub summaries: BTreeMap<DateKey, DailySummary>,
}

impl IndexCollections {
    /// Add one row to all three mappings
    pub fn insert_row(&mut self, row: &ChunkRow) {
        self.dates
            .entry(row.date_key)
            .or_default()
            .insert(row.id.clone());
        self.habits
            .entry(row.habit_id.clone())
            .or_default()
            .insert(row.id.clone());
        self.summaries
            .entry(row.date_key)
            .or_default()
            .accumulate(row.count, row.is_skipped, row.is_postponed);
    }

    /// Remove a record from all three mappings
    ///
    /// Buckets that drop to zero members are deleted outright rather than
    /// kept as empty sets, bounding memory growth over long deployments.
    pub fn remove_record(&mut self, record: &CompletionRecord) {
        let key = record.date_key();
        if let Some(ids) = self.dates.get_mut(&key) {
            ids.remove(&record.id);
            if ids.is_empty() {
                self.dates.remove(&key);
            }
        }
        if let Some(ids) = self.habits.get_mut(&record.habit_id) {
            ids.remove(&record.id);
            if ids.is_empty() {
                self.habits.remove(&record.habit_id);
            }
        }
        if let Some(summary) = self.summaries.get_mut(&key) {
            summary.remove(record.count, record.is_skipped, record.is_postponed);
            if summary.is_empty() {
                self.summaries.remove(&key);
            }
        }
    }

    /// Merge a backfill delta into the live collections
    ///
    /// Id sets union additively. Summaries are written fresh: chunk dates
    /// are always disjoint from already-indexed dates, so there is nothing
    /// to add them to.
    pub fn merge(&mut self, delta: IndexCollections) {
        for (key, ids) in delta.dates {
            self.dates.entry(key).or_default().extend(ids);
        }
        for (habit_id, ids) in delta.habits {
            self.habits.entry(habit_id).or_default().extend(ids);
        }
        for (key, summary) in delta.summaries {
            self.summaries.insert(key, summary);
        }
    }

    /// Sum of date bucket sizes
    pub fn date_bucket_total(&self) -> u64 {
        self.dates.values().map(|ids| ids.len() as u64).sum()
    }

    /// Sum of habit bucket sizes
    pub fn habit_bucket_total(&self) -> u64 {
        self.habits.values().map(|ids| ids.len() as u64).sum()
    }

    /// Sum of daily summary entry counters
    pub fn entry_total(&self) -> u64 {
        self.summaries.values().map(|s| s.entries as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty() && self.habits.is_empty() && self.summaries.is_empty()
    }
}
