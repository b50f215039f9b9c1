/// Behavioral tests for the index engine over the in-memory store
///
/// These drive the whole engine through its public surface: bootstrap,
/// routed reads, write-through index maintenance, backfill chunking, the
/// per-date cache, and degradation when index persistence fails.
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration, NaiveDate};

use completion_index::*;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn today() -> NaiveDate {
    date(2024, 1, 15)
}

fn record(habit_id: &HabitId, day: NaiveDate, count: i64) -> CompletionRecord {
    CompletionRecord::new(habit_id.clone(), day, count, false, false).unwrap()
}

fn skipped(habit_id: &HabitId, day: NaiveDate) -> CompletionRecord {
    CompletionRecord::new(habit_id.clone(), day, 0, true, false).unwrap()
}

fn engine_over<S: PrimaryStore + IndexStore>(store: S) -> CompletionIndexEngine<S> {
    CompletionIndexEngine::new(store)
        .with_clock(Arc::new(FixedClock(today())))
        .with_execution_context(Arc::new(InlineExecutionContext))
}

/// Store wrapper that injects persistence failures on demand
///
/// Cloning shares the underlying store and the fault flags, so a test can
/// open a second engine over the same data after flipping a flag off.
#[derive(Clone, Default)]
struct FaultStore {
    inner: Arc<MemoryStore>,
    fail_replace: Arc<AtomicBool>,
    fail_bucket_saves: Arc<AtomicBool>,
}

impl FaultStore {
    fn injected() -> StorageError {
        StorageError::Connection("injected fault".to_string())
    }
}

impl PrimaryStore for FaultStore {
    fn get_all(&self) -> Result<Vec<CompletionRecord>, StorageError> {
        self.inner.get_all()
    }

    fn get_by_id(&self, id: &CompletionId) -> Result<Option<CompletionRecord>, StorageError> {
        self.inner.get_by_id(id)
    }

    fn put(&self, record: &CompletionRecord) -> Result<(), StorageError> {
        self.inner.put(record)
    }

    fn put_all(&self, records: &[CompletionRecord]) -> Result<(), StorageError> {
        self.inner.put_all(records)
    }

    fn delete(&self, id: &CompletionId) -> Result<(), StorageError> {
        self.inner.delete(id)
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.inner.clear()
    }

    fn get_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CompletionRecord>, StorageError> {
        self.inner.get_by_date_range(start, end)
    }
}

impl IndexStore for FaultStore {
    fn load_index_metadata(&self) -> Result<Option<IndexMetadata>, StorageError> {
        self.inner.load_index_metadata()
    }

    fn save_index_metadata(&self, metadata: &IndexMetadata) -> Result<(), StorageError> {
        self.inner.save_index_metadata(metadata)
    }

    fn load_index_collections(&self) -> Result<IndexCollections, StorageError> {
        self.inner.load_index_collections()
    }

    fn replace_index_collections(
        &self,
        collections: &IndexCollections,
    ) -> Result<(), StorageError> {
        if self.fail_replace.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.replace_index_collections(collections)
    }

    fn save_date_bucket(
        &self,
        key: DateKey,
        ids: &BTreeSet<CompletionId>,
    ) -> Result<(), StorageError> {
        if self.fail_bucket_saves.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.save_date_bucket(key, ids)
    }

    fn save_habit_bucket(
        &self,
        habit_id: &HabitId,
        ids: &BTreeSet<CompletionId>,
    ) -> Result<(), StorageError> {
        if self.fail_bucket_saves.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.save_habit_bucket(habit_id, ids)
    }

    fn save_daily_summary(
        &self,
        key: DateKey,
        summary: &DailySummary,
    ) -> Result<(), StorageError> {
        if self.fail_bucket_saves.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.save_daily_summary(key, summary)
    }
}

#[tokio::test]
async fn test_dashboard_scenario_with_older_history() {
    let store = MemoryStore::new();
    let h1 = HabitId::new();
    let h2 = HabitId::new();

    // Three entries for one habit on one dashboard day: two done, one
    // deliberately skipped.
    let dashboard_day = date(2024, 1, 10);
    store.put(&record(&h1, dashboard_day, 2)).unwrap();
    store.put(&record(&h1, dashboard_day, 1)).unwrap();
    store.put(&skipped(&h1, dashboard_day)).unwrap();
    // History reaching back 40 days in total, well past the 30-day
    // bootstrap window.
    store.put(&record(&h2, today() - Duration::days(39), 1)).unwrap();
    store.put(&record(&h2, today() - Duration::days(35), 1)).unwrap();
    store.put(&record(&h2, today() - Duration::days(20), 3)).unwrap();

    let mut engine = engine_over(store);

    let completions = engine.completions_for_date(&h1, dashboard_day).await.unwrap();
    assert_eq!(completions.len(), 3);

    let summary = engine.daily_summary(dashboard_day).await.unwrap();
    assert_eq!(summary.entries, 3);
    assert_eq!(summary.successful_entries, 2);
    assert_eq!(summary.skipped_entries, 1);
    assert_eq!(summary.total_count, 3);

    // The oldest data predates the window, so backfill has one chunk of
    // ground to cover.
    let status = engine.optimization_status().await;
    assert!(status.use_indexes);
    assert!(!status.backfill_complete);
    assert_eq!(
        status.indexed_from,
        Some(DateKey::from_date(today() - Duration::days(29)))
    );

    assert!(engine.backfill_next_chunk(DEFAULT_CHUNK_DAYS).await.unwrap());
    let status = engine.optimization_status().await;
    assert!(status.backfill_complete);
    assert_eq!(
        status.indexed_from,
        Some(DateKey::from_date(today() - Duration::days(39)))
    );

    // Further calls are no-ops once coverage reaches the oldest data.
    assert!(!engine.backfill_next_chunk(DEFAULT_CHUNK_DAYS).await.unwrap());

    // The old history is now index-served and still all there.
    let old = engine
        .completions_in_range(&h2, today() - Duration::days(39), today())
        .await
        .unwrap();
    assert_eq!(old.len(), 3);
}

#[tokio::test]
async fn test_bootstrap_is_deterministic_across_stores() {
    let h1 = HabitId::new();
    let records: Vec<CompletionRecord> = (0..20)
        .map(|i| record(&h1, today() - Duration::days(i * 2), i + 1))
        .collect();

    let store_a = MemoryStore::new();
    let store_b = MemoryStore::new();
    store_a.put_all(&records).unwrap();
    store_b.put_all(&records).unwrap();

    let mut engine_a = engine_over(store_a);
    let mut engine_b = engine_over(store_b);

    let status_a = engine_a.optimization_status().await;
    let status_b = engine_b.optimization_status().await;
    assert_eq!(status_a.indexed_from, status_b.indexed_from);
    assert_eq!(status_a.oldest_data, status_b.oldest_data);
    assert_eq!(status_a.date_buckets, status_b.date_buckets);
    assert_eq!(status_a.summary_days, status_b.summary_days);

    let range_a = engine_a
        .completions_in_range(&h1, today() - Duration::days(60), today())
        .await
        .unwrap();
    let range_b = engine_b
        .completions_in_range(&h1, today() - Duration::days(60), today())
        .await
        .unwrap();
    assert_eq!(range_a, range_b);
}

#[tokio::test]
async fn test_queries_unchanged_by_backfill_progress() {
    let store = MemoryStore::new();
    let h1 = HabitId::new();
    for i in 0..60 {
        store.put(&record(&h1, today() - Duration::days(i), 1)).unwrap();
    }

    let mut engine = engine_over(store);
    let start = today() - Duration::days(59);

    let before = engine.completions_in_range(&h1, start, today()).await.unwrap();
    assert_eq!(before.len(), 60);
    let summary_before = engine.daily_summary(start).await.unwrap();

    while engine.backfill_next_chunk(10).await.unwrap() {}

    let after = engine.completions_in_range(&h1, start, today()).await.unwrap();
    assert_eq!(before, after);
    let summary_after = engine.daily_summary(start).await.unwrap();
    assert_eq!(summary_before, summary_after);
}

#[tokio::test]
async fn test_backfill_terminates_in_bounded_chunks() {
    let store = MemoryStore::new();
    let h1 = HabitId::new();
    for i in 0..100 {
        store.put(&record(&h1, today() - Duration::days(i), 1)).unwrap();
    }

    let mut engine = engine_over(store);
    // 70 uncovered days at 30 days per chunk: exactly three chunks.
    let mut chunks = 0;
    while engine.backfill_next_chunk(30).await.unwrap() {
        chunks += 1;
        assert!(chunks <= 3, "backfill ran more chunks than the history requires");
    }
    assert_eq!(chunks, 3);
    assert!(engine.optimization_status().await.backfill_complete);
}

#[tokio::test]
async fn test_range_query_straddles_indexed_boundary() {
    let store = MemoryStore::new();
    let h1 = HabitId::new();
    let below = record(&h1, today() - Duration::days(40), 1);
    let above = record(&h1, today() - Duration::days(5), 2);
    store.put(&below).unwrap();
    store.put(&above).unwrap();

    let mut engine = engine_over(store);
    assert!(!engine.optimization_status().await.backfill_complete);

    // One half served by a store scan, the other by the date index; no
    // duplicates, no gap at the boundary.
    let all = engine
        .completions_in_range(&h1, today() - Duration::days(50), today())
        .await
        .unwrap();
    assert_eq!(all, vec![below.clone(), above.clone()]);

    // All-time habit reads fall back to a scan until backfill completes.
    assert_eq!(engine.completions_for_habit(&h1).await.unwrap().len(), 2);
    while engine.backfill_next_chunk(DEFAULT_CHUNK_DAYS).await.unwrap() {}
    assert_eq!(
        engine.completions_for_habit(&h1).await.unwrap(),
        vec![below, above]
    );
}

#[tokio::test]
async fn test_cache_stays_coherent_across_writes() {
    let store = MemoryStore::new();
    let h1 = HabitId::new();
    let day = date(2024, 1, 12);
    store.put(&record(&h1, day, 1)).unwrap();

    let mut engine = engine_over(store);

    let first = engine.completions_for_all_habits_on_date(day).await.unwrap();
    assert_eq!(first[&h1].len(), 1);

    // A write to a memoized date must invalidate the memo.
    let extra = record(&h1, day, 2);
    engine.put_completion(&extra).await.unwrap();
    let second = engine.completions_for_all_habits_on_date(day).await.unwrap();
    assert_eq!(second[&h1].len(), 2);

    engine.delete_completion(&extra.id).await.unwrap();
    let third = engine.completions_for_all_habits_on_date(day).await.unwrap();
    assert_eq!(third[&h1].len(), 1);
}

#[tokio::test]
async fn test_cache_holds_at_most_seven_dates() {
    let store = MemoryStore::new();
    let mut engine = engine_over(store);

    for i in 0..10 {
        let day = today() - Duration::days(i);
        engine.completions_for_all_habits_on_date(day).await.unwrap();
    }
    assert_eq!(engine.optimization_status().await.cached_dates, CACHE_CAPACITY);

    engine.invalidate_cache(Some(today()));
    assert_eq!(engine.optimization_status().await.cached_dates, CACHE_CAPACITY - 1);
    engine.invalidate_cache(None);
    assert_eq!(engine.optimization_status().await.cached_dates, 0);
}

#[tokio::test]
async fn test_write_below_window_reopens_backfill() {
    let store = MemoryStore::new();
    let h1 = HabitId::new();
    store.put(&record(&h1, today(), 1)).unwrap();

    let mut engine = engine_over(store);
    assert!(engine.optimization_status().await.backfill_complete);

    // An import dated far in the past gives backfill new ground to cover.
    let ancient = record(&h1, today() - Duration::days(100), 1);
    engine.put_completion(&ancient).await.unwrap();

    let status = engine.optimization_status().await;
    assert!(!status.backfill_complete);
    assert_eq!(status.oldest_data, Some(ancient.date_key()));

    while engine.backfill_next_chunk(DEFAULT_CHUNK_DAYS).await.unwrap() {}
    let found = engine
        .completions_in_range(&h1, ancient.completed_date, ancient.completed_date)
        .await
        .unwrap();
    assert_eq!(found, vec![ancient]);
}

#[tokio::test]
async fn test_delete_shrinks_summary_and_buckets() {
    let store = MemoryStore::new();
    let h1 = HabitId::new();
    let day = date(2024, 1, 14);
    let keep = record(&h1, day, 1);
    let gone = skipped(&h1, day);
    store.put(&keep).unwrap();
    store.put(&gone).unwrap();

    let mut engine = engine_over(store);
    assert_eq!(engine.daily_summary(day).await.unwrap().entries, 2);

    engine.delete_completion(&gone.id).await.unwrap();
    let summary = engine.daily_summary(day).await.unwrap();
    assert_eq!(summary.entries, 1);
    assert_eq!(summary.skipped_entries, 0);
    assert_eq!(engine.completions_for_date(&h1, day).await.unwrap(), vec![keep]);

    // Deleting an unknown id is an error from the primary store.
    assert!(engine.delete_completion(&CompletionId::new()).await.is_err());
}

#[tokio::test]
async fn test_pause_blocks_backfill_until_resumed() {
    let store = MemoryStore::new();
    let h1 = HabitId::new();
    store.put(&record(&h1, today() - Duration::days(50), 1)).unwrap();
    store.put(&record(&h1, today(), 1)).unwrap();

    let mut engine = engine_over(store);
    engine.set_backfill_paused(true).await.unwrap();
    assert!(!engine.backfill_next_chunk(DEFAULT_CHUNK_DAYS).await.unwrap());
    assert!(!engine.optimization_status().await.backfill_complete);

    engine.set_backfill_paused(false).await.unwrap();
    assert!(engine.backfill_next_chunk(DEFAULT_CHUNK_DAYS).await.unwrap());
    assert!(engine.optimization_status().await.backfill_complete);
}

#[tokio::test]
async fn test_version_bump_forces_rebuild() {
    let store = MemoryStore::new();
    let h1 = HabitId::new();
    store.put(&record(&h1, today(), 1)).unwrap();

    // Metadata written by an older layout version.
    let mut stale = IndexMetadata::unindexed();
    stale.version = INDEX_VERSION - 1;
    stale.indexed_from = Some(DateKey::from_date(today()));
    stale.last_indexed = Some(DateKey::from_date(today()));
    stale.backfill_complete = true;
    store.save_index_metadata(&stale).unwrap();

    let mut engine = engine_over(store);
    let status = engine.optimization_status().await;
    assert!(status.use_indexes);
    assert_eq!(status.index_version, INDEX_VERSION);
    assert_eq!(status.last_rebuild_reason, Some(RebuildReason::VersionMismatch));
}

#[tokio::test]
async fn test_tampered_collections_rebuilt_on_session_start() {
    let fault = FaultStore::default();
    let h1 = HabitId::new();
    fault.put(&record(&h1, today(), 1)).unwrap();
    fault.put(&record(&h1, today() - Duration::days(1), 2)).unwrap();

    // First session builds and persists consistent indexes.
    let mut engine = engine_over(fault.clone());
    assert!(engine.optimization_status().await.use_indexes);
    engine.close().unwrap();

    // Drop one date bucket behind the engine's back.
    fault
        .save_date_bucket(DateKey::from_date(today()), &BTreeSet::new())
        .unwrap();

    let mut engine = engine_over(fault);
    let status = engine.optimization_status().await;
    assert!(status.use_indexes);
    assert_eq!(status.last_rebuild_reason, Some(RebuildReason::IntegrityFailure));
    assert_eq!(
        engine.completions_for_date(&h1, today()).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_unavailable_index_store_degrades_to_scan_mode() {
    let fault = FaultStore::default();
    let h1 = HabitId::new();
    let rec = record(&h1, today() - Duration::days(2), 3);
    fault.put(&rec).unwrap();
    fault.fail_replace.store(true, Ordering::SeqCst);

    let mut engine = engine_over(fault.clone());

    // Reads still answer correctly from store scans; degradation is only
    // visible through the diagnostics.
    let found = engine.completions_for_date(&h1, rec.completed_date).await.unwrap();
    assert_eq!(found, vec![rec]);
    let status = engine.optimization_status().await;
    assert!(!status.use_indexes);
    assert!(status.rebuild_needed);

    // Once persistence works again, the next session repairs itself.
    fault.fail_replace.store(false, Ordering::SeqCst);
    let mut engine = engine_over(fault);
    let status = engine.optimization_status().await;
    assert!(status.use_indexes);
    assert!(!status.rebuild_needed);
}

#[tokio::test]
async fn test_failed_index_persist_keeps_write_and_flags_rebuild() {
    let fault = FaultStore::default();
    let h1 = HabitId::new();

    let mut engine = engine_over(fault.clone());
    engine.put_completion(&record(&h1, today(), 1)).await.unwrap();
    assert!(!engine.optimization_status().await.rebuild_needed);

    // The primary write lands; the index side fails to persist.
    fault.fail_bucket_saves.store(true, Ordering::SeqCst);
    let second = record(&h1, today(), 2);
    engine.put_completion(&second).await.unwrap();

    let status = engine.optimization_status().await;
    assert!(status.rebuild_needed);
    assert_eq!(engine.completions_for_date(&h1, today()).await.unwrap().len(), 2);
    engine.close().unwrap();

    // The flag survives to the next session, which rebuilds.
    fault.fail_bucket_saves.store(false, Ordering::SeqCst);
    let mut engine = engine_over(fault);
    let status = engine.optimization_status().await;
    assert_eq!(status.last_rebuild_reason, Some(RebuildReason::RebuildFlagged));
    assert!(!status.rebuild_needed);
    assert_eq!(engine.completions_for_date(&h1, today()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_clear_all_resets_engine_state() {
    let store = MemoryStore::new();
    let h1 = HabitId::new();
    store.put(&record(&h1, today() - Duration::days(50), 1)).unwrap();
    store.put(&record(&h1, today(), 1)).unwrap();

    let mut engine = engine_over(store);
    engine.completions_for_all_habits_on_date(today()).await.unwrap();
    engine.clear_all().await.unwrap();

    let status = engine.optimization_status().await;
    assert!(status.use_indexes);
    assert!(status.backfill_complete);
    assert_eq!(status.oldest_data, None);
    assert_eq!(status.cached_dates, 0);
    assert!(engine.completions_for_habit(&h1).await.unwrap().is_empty());
    assert!(engine.daily_summary(today()).await.unwrap().is_empty());
}
