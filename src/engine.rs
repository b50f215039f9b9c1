/// The completion index engine
///
/// This is the single object the host constructs: it owns the injected
/// store, execution context and clock, holds the live index collections
/// and metadata for the session, and routes every read and write. The
/// host serializes calls; the engine performs no internal locking.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::domain::{CompletionId, CompletionRecord, DailySummary, DateKey, HabitId};
use crate::exec::{ExecutionContext, TokioExecutionContext};
use crate::index::bootstrap::{self, BootstrapOutcome, DEFAULT_BOOTSTRAP_WINDOW_DAYS};
use crate::index::cache::{CompletionDateCache, CompletionsByHabit};
use crate::index::{integrity, router, ChunkRow, IndexCollections, IndexMetadata, RebuildReason, INDEX_VERSION};
use crate::storage::{IndexStore, PrimaryStore, StorageError};
use crate::EngineError;

/// Default number of days a single backfill chunk covers
pub const DEFAULT_CHUNK_DAYS: u32 = 30;

/// Diagnostics snapshot of the engine's session state
///
/// The only window into degraded operation: index failures never surface
/// through the query methods themselves.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationStatus {
    pub use_indexes: bool,
    pub index_version: u32,
    pub indexed_from: Option<DateKey>,
    pub oldest_data: Option<DateKey>,
    pub last_indexed: Option<DateKey>,
    pub backfill_complete: bool,
    pub backfill_paused: bool,
    pub rebuild_needed: bool,
    pub date_buckets: usize,
    pub habit_buckets: usize,
    pub summary_days: usize,
    pub cached_dates: usize,
    pub last_rebuild_reason: Option<RebuildReason>,
}

/// Per-session index state, established lazily on first access
struct Session {
    ready: bool,
    use_indexes: bool,
    metadata: IndexMetadata,
    collections: IndexCollections,
    last_rebuild_reason: Option<RebuildReason>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            ready: false,
            use_indexes: false,
            metadata: IndexMetadata::unindexed(),
            collections: IndexCollections::default(),
            last_rebuild_reason: None,
        }
    }
}

/// Derived-index engine over a primary store of completion records
///
/// Reads go through the query router (and, for per-date dashboard reads,
/// the date cache); writes go to the primary store first and then update
/// the three derived collections. All index failures degrade to direct
/// store scans rather than surfacing to the caller.
pub struct CompletionIndexEngine<S: PrimaryStore + IndexStore> {
    store: S,
    exec: Arc<dyn ExecutionContext>,
    clock: Arc<dyn Clock>,
    window_days: u32,
    session: Session,
    // Private on purpose: nothing outside the engine can hold a mutable
    // handle into the memo.
    cache: CompletionDateCache,
}

impl<S: PrimaryStore + IndexStore> CompletionIndexEngine<S> {
    /// Create an engine over the given store with default collaborators
    pub fn new(store: S) -> Self {
        Self {
            store,
            exec: Arc::new(TokioExecutionContext),
            clock: Arc::new(SystemClock),
            window_days: DEFAULT_BOOTSTRAP_WINDOW_DAYS,
            session: Session::default(),
            cache: CompletionDateCache::new(),
        }
    }

    /// Replace the execution context used for backfill aggregation
    pub fn with_execution_context(mut self, exec: Arc<dyn ExecutionContext>) -> Self {
        self.exec = exec;
        self
    }

    /// Replace the clock that anchors the bootstrap window
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Change the bootstrap window length in days
    pub fn with_bootstrap_window(mut self, days: u32) -> Self {
        self.window_days = days.max(1);
        self
    }

    /// Access the underlying store (useful for testing)
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Flush session state and release the engine
    pub fn close(self) -> Result<(), EngineError> {
        if self.session.ready {
            self.store.save_index_metadata(&self.session.metadata)?;
        }
        Ok(())
    }

    // ---- readiness gate -------------------------------------------------

    /// Validate or repair the indexes, once per session
    ///
    /// Never raises: any failure inside the gate leaves the session in
    /// scan mode with `rebuild_needed` persisted so the next session
    /// retries.
    async fn ensure_ready(&mut self) {
        if self.session.ready {
            return;
        }
        self.session = match self.open_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "completion index unavailable, serving queries in scan mode");
                let mut metadata = IndexMetadata::unindexed();
                metadata.rebuild_needed = true;
                if let Err(e) = self.store.save_index_metadata(&metadata) {
                    warn!(error = %e, "could not persist rebuild flag");
                }
                Session {
                    ready: true,
                    use_indexes: false,
                    metadata,
                    collections: IndexCollections::default(),
                    last_rebuild_reason: None,
                }
            }
        };
    }

    async fn open_session(&self) -> Result<Session, StorageError> {
        let stored = self.store.load_index_metadata()?;
        let paused = stored.as_ref().map_or(false, |m| m.backfill_paused);
        let reason = match &stored {
            None => Some(RebuildReason::MissingMetadata),
            Some(metadata) => metadata.needs_rebuild(),
        };

        let (mut metadata, mut collections) = match reason {
            Some(reason) => {
                let out = self.rebuild(reason, paused).await?;
                (out.metadata, out.collections)
            }
            None => {
                let metadata = stored.unwrap_or_else(IndexMetadata::unindexed);
                let collections = self.store.load_index_collections()?;
                (metadata, collections)
            }
        };
        let mut last_rebuild_reason = reason;

        // Exactly one integrity cross-check per session. On failure: one
        // rebuild attempt, then scan mode for the rest of the session.
        let mut valid = match metadata.indexed_from {
            Some(from) => integrity::verify(&self.store, &collections, from)?,
            None => false,
        };
        if !valid {
            let out = self.rebuild(RebuildReason::IntegrityFailure, paused).await?;
            metadata = out.metadata;
            collections = out.collections;
            last_rebuild_reason = Some(RebuildReason::IntegrityFailure);
            valid = match metadata.indexed_from {
                Some(from) => integrity::verify(&self.store, &collections, from)?,
                None => false,
            };
            if !valid {
                warn!("completion index still inconsistent after rebuild, disabling indexes for this session");
                metadata.rebuild_needed = true;
                if let Err(e) = self.store.save_index_metadata(&metadata) {
                    warn!(error = %e, "could not persist rebuild flag");
                }
            }
        }

        Ok(Session {
            ready: true,
            use_indexes: valid,
            metadata,
            collections,
            last_rebuild_reason,
        })
    }

    /// Full rebuild: fresh collections swapped in atomically
    async fn rebuild(
        &self,
        reason: RebuildReason,
        paused: bool,
    ) -> Result<BootstrapOutcome, StorageError> {
        info!(reason = %reason, "rebuilding completion indexes");
        let out = bootstrap::build(&self.store, self.clock.today(), self.window_days, paused).await?;
        self.store.replace_index_collections(&out.collections)?;
        self.store.save_index_metadata(&out.metadata)?;
        Ok(out)
    }

    // ---- reads ----------------------------------------------------------

    /// All completions of one habit on one date
    pub async fn completions_for_date(
        &mut self,
        habit_id: &HabitId,
        date: NaiveDate,
    ) -> Result<Vec<CompletionRecord>, EngineError> {
        let by_habit = self.completions_for_all_habits_on_date(date).await?;
        Ok(by_habit.get(habit_id).cloned().unwrap_or_default())
    }

    /// All completions on one date, grouped by habit
    ///
    /// The memoized "today dashboard" read: served from the date cache
    /// when possible, recomputed through the router otherwise.
    pub async fn completions_for_all_habits_on_date(
        &mut self,
        date: NaiveDate,
    ) -> Result<CompletionsByHabit, EngineError> {
        self.ensure_ready().await;
        let key = DateKey::from_date(date);
        if let Some(hit) = self.cache.get(key) {
            return Ok(hit.clone());
        }

        let records = self.records_in_range(date, date)?;
        let mut by_habit: CompletionsByHabit = HashMap::new();
        for record in records {
            by_habit
                .entry(record.habit_id.clone())
                .or_default()
                .push(record);
        }
        self.cache.insert(key, by_habit.clone());
        Ok(by_habit)
    }

    /// Every completion of one habit across all time
    pub async fn completions_for_habit(
        &mut self,
        habit_id: &HabitId,
    ) -> Result<Vec<CompletionRecord>, EngineError> {
        self.ensure_ready().await;

        // The habit index covers all of history only once backfill is done.
        let indexed = self.session.use_indexes && self.session.metadata.backfill_complete;
        let mut records = if indexed {
            let ids: Vec<CompletionId> = self
                .session
                .collections
                .habits
                .get(habit_id)
                .map(|ids| ids.iter().cloned().collect())
                .unwrap_or_default();
            self.fetch_by_ids(&ids)?
        } else {
            self.store
                .get_all()?
                .into_iter()
                .filter(|r| &r.habit_id == habit_id)
                .collect()
        };
        sort_records(&mut records);
        Ok(records)
    }

    /// Completions of one habit within a date range (inclusive)
    pub async fn completions_in_range(
        &mut self,
        habit_id: &HabitId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CompletionRecord>, EngineError> {
        self.ensure_ready().await;
        let mut records = self.records_in_range(start, end)?;
        records.retain(|r| &r.habit_id == habit_id);
        Ok(records)
    }

    /// Aggregate counters for one date
    pub async fn daily_summary(&mut self, date: NaiveDate) -> Result<DailySummary, EngineError> {
        self.ensure_ready().await;
        let key = DateKey::from_date(date);

        if self.session.use_indexes {
            if let Some(from) = self.session.metadata.indexed_from {
                if key >= from {
                    return Ok(self
                        .session
                        .collections
                        .summaries
                        .get(&key)
                        .copied()
                        .unwrap_or_default());
                }
                if self.session.metadata.backfill_complete {
                    // No data exists before the indexed window.
                    return Ok(DailySummary::default());
                }
            }
        }

        let mut summary = DailySummary::default();
        for record in self.store.get_by_date_range(date, date)? {
            summary.accumulate(record.count, record.is_skipped, record.is_postponed);
        }
        Ok(summary)
    }

    /// Serve a date range through the router's split-and-merge
    ///
    /// The scan half and the indexed half cover adjacent, disjoint
    /// sub-ranges, so plain concatenation yields no duplicates and no
    /// gap at the boundary date.
    fn records_in_range(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CompletionRecord>, EngineError> {
        let plan = router::plan_range(
            start,
            end,
            self.session.metadata.indexed_from,
            self.session.metadata.backfill_complete,
            self.session.use_indexes,
        );

        let mut records = Vec::new();
        if let Some((scan_start, scan_end)) = plan.scan {
            records.extend(self.store.get_by_date_range(scan_start, scan_end)?);
        }
        if let Some((idx_start, idx_end)) = plan.indexed {
            let start_key = DateKey::from_date(idx_start);
            let end_key = DateKey::from_date(idx_end);
            let ids: Vec<CompletionId> = self
                .session
                .collections
                .dates
                .range(start_key..=end_key)
                .flat_map(|(_, ids)| ids.iter().cloned())
                .collect();
            records.extend(self.fetch_by_ids(&ids)?);
        }
        sort_records(&mut records);
        Ok(records)
    }

    /// Resolve index ids back to records
    ///
    /// An id the store no longer knows means the index is stale; flag a
    /// rebuild and serve what exists rather than failing the read.
    fn fetch_by_ids(&mut self, ids: &[CompletionId]) -> Result<Vec<CompletionRecord>, EngineError> {
        let mut records = Vec::with_capacity(ids.len());
        let mut dangling = false;
        for id in ids {
            match self.store.get_by_id(id)? {
                Some(record) => records.push(record),
                None => dangling = true,
            }
        }
        if dangling {
            warn!("completion index references records missing from the store, flagging rebuild");
            self.session.metadata.rebuild_needed = true;
            if let Err(e) = self.store.save_index_metadata(&self.session.metadata) {
                warn!(error = %e, "could not persist rebuild flag");
            }
        }
        Ok(records)
    }

    // ---- writes ---------------------------------------------------------

    /// Insert or replace one completion record
    pub async fn put_completion(&mut self, record: &CompletionRecord) -> Result<(), EngineError> {
        self.ensure_ready().await;
        let previous = self.store.get_by_id(&record.id)?;
        self.store.put(record)?;

        if let Some(prev) = &previous {
            self.cache.invalidate(prev.date_key());
        }
        self.cache.invalidate(record.date_key());
        self.apply_write(previous.as_ref(), Some(record));
        Ok(())
    }

    /// Insert or replace a batch of completion records
    pub async fn put_completions(
        &mut self,
        records: &[CompletionRecord],
    ) -> Result<(), EngineError> {
        self.ensure_ready().await;
        let mut previous = Vec::with_capacity(records.len());
        for record in records {
            previous.push(self.store.get_by_id(&record.id)?);
        }
        self.store.put_all(records)?;

        for (record, prev) in records.iter().zip(&previous) {
            if let Some(prev) = prev {
                self.cache.invalidate(prev.date_key());
            }
            self.cache.invalidate(record.date_key());
            self.apply_write(prev.as_ref(), Some(record));
        }
        Ok(())
    }

    /// Delete one completion record
    pub async fn delete_completion(&mut self, id: &CompletionId) -> Result<(), EngineError> {
        self.ensure_ready().await;
        let Some(previous) = self.store.get_by_id(id)? else {
            return Err(StorageError::RecordNotFound { id: id.to_string() }.into());
        };
        self.store.delete(id)?;
        self.cache.invalidate(previous.date_key());
        self.apply_write(Some(&previous), None);
        Ok(())
    }

    /// Delete every completion record
    pub async fn clear_all(&mut self) -> Result<(), EngineError> {
        self.ensure_ready().await;
        self.store.clear()?;
        // The date scope of a delete-all is not enumerable; drop the
        // whole memo.
        self.cache.invalidate_all();

        let today = self.clock.today();
        let window_start = DateKey::from_date(
            today - chrono::Duration::days(i64::from(self.window_days) - 1),
        );
        self.session.collections = IndexCollections::default();
        self.session.metadata = IndexMetadata {
            version: INDEX_VERSION,
            indexed_from: Some(window_start),
            oldest_data: None,
            last_indexed: Some(DateKey::from_date(today)),
            backfill_complete: true,
            backfill_paused: self.session.metadata.backfill_paused,
            rebuild_needed: false,
        };

        let mut result = self.store.replace_index_collections(&self.session.collections);
        if result.is_ok() {
            result = self.store.save_index_metadata(&self.session.metadata);
        }
        match result {
            Ok(()) => {
                // An empty store is trivially consistent, so a session
                // that had degraded can come back here.
                self.session.use_indexes = true;
            }
            Err(e) => {
                warn!(error = %e, "failed to persist index reset, flagging rebuild");
                self.session.metadata.rebuild_needed = true;
                let _ = self.store.save_index_metadata(&self.session.metadata);
            }
        }
        Ok(())
    }

    /// Mirror a primary-store write into the live and persisted indexes
    ///
    /// The primary write has already succeeded by the time this runs. If
    /// persisting the index side fails, the indexes are flagged for
    /// rebuild; the write itself is never reported as failed.
    fn apply_write(&mut self, old: Option<&CompletionRecord>, new: Option<&CompletionRecord>) {
        if !self.session.use_indexes {
            // Scan-mode sessions already carry a persisted rebuild flag.
            return;
        }
        let Some(from) = self.session.metadata.indexed_from else {
            return;
        };

        let mut touched_dates: BTreeSet<DateKey> = BTreeSet::new();
        let mut touched_habits: BTreeSet<HabitId> = BTreeSet::new();
        let mut metadata_dirty = false;

        if let Some(old) = old {
            if old.date_key() >= from {
                self.session.collections.remove_record(old);
                touched_dates.insert(old.date_key());
                touched_habits.insert(old.habit_id.clone());
            }
        }

        if let Some(new) = new {
            let key = new.date_key();
            if key >= from {
                self.session.collections.insert_row(&ChunkRow::from(new));
                touched_dates.insert(key);
                touched_habits.insert(new.habit_id.clone());
                if self.session.metadata.last_indexed.map_or(true, |last| key > last) {
                    self.session.metadata.last_indexed = Some(key);
                    metadata_dirty = true;
                }
            }
            // Track the oldest data even when the write lands below the
            // indexed window; backfill has new ground to cover then.
            if self.session.metadata.oldest_data.map_or(true, |oldest| key < oldest) {
                self.session.metadata.oldest_data = Some(key);
                metadata_dirty = true;
                if key < from {
                    self.session.metadata.backfill_complete = false;
                }
            }
        }

        let mut result = self.persist_buckets(&touched_dates, &touched_habits);
        if result.is_ok() && metadata_dirty {
            result = self.store.save_index_metadata(&self.session.metadata);
        }
        if let Err(e) = result {
            warn!(error = %e, "failed to persist index update, flagging rebuild");
            self.session.metadata.rebuild_needed = true;
            let _ = self.store.save_index_metadata(&self.session.metadata);
        }
    }

    /// Persist the touched buckets; empty buckets are deleted by the store
    fn persist_buckets(
        &self,
        dates: &BTreeSet<DateKey>,
        habits: &BTreeSet<HabitId>,
    ) -> Result<(), StorageError> {
        let empty = BTreeSet::new();
        for key in dates {
            let ids = self.session.collections.dates.get(key).unwrap_or(&empty);
            self.store.save_date_bucket(*key, ids)?;
            let summary = self
                .session
                .collections
                .summaries
                .get(key)
                .copied()
                .unwrap_or_default();
            self.store.save_daily_summary(*key, &summary)?;
        }
        for habit_id in habits {
            let ids = self.session.collections.habits.get(habit_id).unwrap_or(&empty);
            self.store.save_habit_bucket(habit_id, ids)?;
        }
        Ok(())
    }

    // ---- operational controls -------------------------------------------

    /// Extend indexed coverage one chunk further into the past
    ///
    /// Returns true when a chunk was aggregated and merged, false when
    /// there was nothing to do (paused, complete, or indexes unusable).
    /// Repeated calls after completion are safe no-ops.
    pub async fn backfill_next_chunk(&mut self, chunk_days: u32) -> Result<bool, EngineError> {
        self.ensure_ready().await;

        let metadata = &self.session.metadata;
        if !self.session.use_indexes || metadata.backfill_paused || metadata.backfill_complete {
            return Ok(false);
        }
        let (Some(from), Some(oldest)) = (metadata.indexed_from, metadata.oldest_data) else {
            return Ok(false);
        };
        if from <= oldest {
            // Coverage already reaches the data; just record the fact.
            self.session.metadata.backfill_complete = true;
            if let Err(e) = self.store.save_index_metadata(&self.session.metadata) {
                warn!(error = %e, "could not persist backfill completion");
            }
            return Ok(false);
        }
        let (Some(from_date), Some(oldest_date)) = (from.to_date(), oldest.to_date()) else {
            return Ok(false);
        };
        let Some(chunk_end) = from_date.pred_opt() else {
            return Ok(false);
        };
        let chunk_days = i64::from(chunk_days.max(1));
        let chunk_start = oldest_date.max(chunk_end - chrono::Duration::days(chunk_days - 1));

        // Only the chunk's rows cross the execution boundary, shrunk to
        // the fields aggregation needs.
        let rows: Vec<ChunkRow> = self
            .store
            .get_by_date_range(chunk_start, chunk_end)?
            .iter()
            .map(ChunkRow::from)
            .collect();
        let row_count = rows.len();
        let delta = self.exec.run_off_thread(rows).await?;

        let touched_dates: BTreeSet<DateKey> = delta.dates.keys().copied().collect();
        let touched_habits: BTreeSet<HabitId> = delta.habits.keys().cloned().collect();
        self.session.collections.merge(delta);
        self.session.metadata.indexed_from = Some(DateKey::from_date(chunk_start));
        if chunk_start <= oldest_date {
            self.session.metadata.backfill_complete = true;
        }

        let mut result = self.persist_buckets(&touched_dates, &touched_habits);
        if result.is_ok() {
            result = self.store.save_index_metadata(&self.session.metadata);
        }
        if let Err(e) = result {
            warn!(error = %e, "failed to persist backfill chunk, flagging rebuild");
            self.session.metadata.rebuild_needed = true;
            let _ = self.store.save_index_metadata(&self.session.metadata);
        }

        debug!(
            chunk_start = %chunk_start,
            chunk_end = %chunk_end,
            rows = row_count,
            backfill_complete = self.session.metadata.backfill_complete,
            "backfilled one chunk"
        );
        Ok(true)
    }

    /// Pause or resume backfill chunking
    pub async fn set_backfill_paused(&mut self, paused: bool) -> Result<(), EngineError> {
        self.ensure_ready().await;
        if self.session.metadata.backfill_paused == paused {
            return Ok(());
        }
        self.session.metadata.backfill_paused = paused;
        self.store.save_index_metadata(&self.session.metadata)?;
        Ok(())
    }

    /// Drop memoized results for one date, or for all dates
    pub fn invalidate_cache(&mut self, date: Option<NaiveDate>) {
        match date {
            Some(date) => self.cache.invalidate(DateKey::from_date(date)),
            None => self.cache.invalidate_all(),
        }
    }

    /// Diagnostics snapshot of the current session
    pub async fn optimization_status(&mut self) -> OptimizationStatus {
        self.ensure_ready().await;
        let session = &self.session;
        OptimizationStatus {
            use_indexes: session.use_indexes,
            index_version: session.metadata.version,
            indexed_from: session.metadata.indexed_from,
            oldest_data: session.metadata.oldest_data,
            last_indexed: session.metadata.last_indexed,
            backfill_complete: session.metadata.backfill_complete,
            backfill_paused: session.metadata.backfill_paused,
            rebuild_needed: session.metadata.rebuild_needed,
            date_buckets: session.collections.dates.len(),
            habit_buckets: session.collections.habits.len(),
            summary_days: session.collections.summaries.len(),
            cached_dates: self.cache.len(),
            last_rebuild_reason: session.last_rebuild_reason,
        }
    }
}

/// Stable result order: by date, then log time, then id
fn sort_records(records: &mut [CompletionRecord]) {
    records.sort_by(|a, b| {
        (a.completed_date, a.completed_at, &a.id).cmp(&(b.completed_date, b.completed_at, &b.id))
    });
}
