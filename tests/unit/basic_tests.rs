/// Basic unit tests to verify core functionality
use std::sync::Arc;

use completion_index::*;
use tempfile::NamedTempFile;

#[cfg(test)]
mod basic_unit_tests {
    use super::*;

    #[test]
    fn test_completion_record_creation() {
        let habit_id = HabitId::new();
        let today = chrono::Utc::now().naive_utc().date();

        let record = CompletionRecord::new(habit_id.clone(), today, 2, false, false);
        assert!(record.is_ok());
        let record = record.unwrap();
        assert_eq!(record.habit_id, habit_id);
        assert_eq!(record.completed_date, today);
        assert!(record.is_successful());

        assert!(CompletionRecord::new(habit_id, today, -1, false, false).is_err());
    }

    #[test]
    fn test_date_key_encoding() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let key = DateKey::from_date(date);
        assert_eq!(key.value(), 20240110);
        assert_eq!(key.to_date(), Some(date));
        assert!(DateKey::parse("20240110").is_ok());
        assert!(DateKey::parse("not-a-date").is_err());
    }

    #[test]
    fn test_daily_summary_accumulation() {
        let mut summary = DailySummary::default();
        summary.accumulate(3, false, false);
        summary.accumulate(0, true, false);
        summary.accumulate(0, false, true);

        assert_eq!(summary.entries, 3);
        assert_eq!(summary.successful_entries, 1);
        assert_eq!(summary.skipped_entries, 1);
        assert_eq!(summary.postponed_entries, 1);
        assert_eq!(summary.total_count, 3);
    }

    #[test]
    fn test_sqlite_store_creation() {
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let store = SqliteStore::new(temp_file.path().to_path_buf());
        assert!(store.is_ok());
    }

    #[tokio::test]
    async fn test_engine_over_memory_store() {
        let mut engine = CompletionIndexEngine::new(MemoryStore::new())
            .with_execution_context(Arc::new(InlineExecutionContext));

        let status = engine.optimization_status().await;
        assert!(status.use_indexes);
        assert!(status.backfill_complete);
        assert_eq!(status.index_version, INDEX_VERSION);
        assert!(engine.close().is_ok());
    }

    #[tokio::test]
    async fn test_engine_over_sqlite_store() {
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let store = SqliteStore::new(temp_file.path().to_path_buf()).unwrap();
        let mut engine = CompletionIndexEngine::new(store);

        let habit_id = HabitId::new();
        let today = chrono::Utc::now().naive_utc().date();
        let record = CompletionRecord::new(habit_id.clone(), today, 1, false, false).unwrap();
        engine.put_completion(&record).await.unwrap();

        let found = engine.completions_for_date(&habit_id, today).await.unwrap();
        assert_eq!(found, vec![record]);
        assert!(engine.close().is_ok());
    }
}
