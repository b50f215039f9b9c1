/// SQLite implementation of the primary and index store interfaces
///
/// This module provides the concrete SQLite implementation for the record
/// store and the persisted index layout. It handles all SQL queries and
/// data conversion between rows and domain types.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::NaiveDate;
use rusqlite::{params, Connection};

use crate::domain::{CompletionId, CompletionRecord, DailySummary, DateKey, HabitId};
use crate::index::{IndexCollections, IndexMetadata};
use crate::storage::{migrations, IndexStore, PrimaryStore, StorageError};

/// SQLite-based storage implementation
///
/// One connection backs both the primary record table and the four index
/// tables, so the engine sees a single durable collaborator.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Create a new SQLite storage instance
    ///
    /// This opens the database file and runs any necessary migrations
    /// to ensure the schema is up to date.
    pub fn new(db_path: PathBuf) -> Result<Self, StorageError> {
        let conn = Connection::open(&db_path)
            .map_err(|e| StorageError::Connection(format!("Failed to open database: {}", e)))?;

        migrations::initialize_database(&conn)?;

        tracing::info!("SQLite storage initialized at: {:?}", db_path);

        Ok(Self { conn })
    }

    /// In-memory database, useful for tests and throwaway runs
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Connection(format!("Failed to open database: {}", e)))?;
        migrations::initialize_database(&conn)?;
        Ok(Self { conn })
    }

    /// Convert one completions row into a record
    fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CompletionRecord> {
        let id_str: String = row.get(0)?;
        let id = CompletionId::from_string(&id_str).map_err(|_| {
            rusqlite::Error::InvalidColumnType(0, "Invalid UUID".to_string(), rusqlite::types::Type::Text)
        })?;

        let habit_id_str: String = row.get(1)?;
        let habit_id = HabitId::from_string(&habit_id_str).map_err(|_| {
            rusqlite::Error::InvalidColumnType(1, "Invalid UUID".to_string(), rusqlite::types::Type::Text)
        })?;

        let completed_date_str: String = row.get(2)?;
        let completed_date = NaiveDate::parse_from_str(&completed_date_str, "%Y-%m-%d")
            .map_err(|_| {
                rusqlite::Error::InvalidColumnType(2, "Invalid date".to_string(), rusqlite::types::Type::Text)
            })?;

        let completed_at_str: String = row.get(3)?;
        let completed_at = chrono::DateTime::parse_from_rfc3339(&completed_at_str)
            .map_err(|_| {
                rusqlite::Error::InvalidColumnType(3, "Invalid datetime".to_string(), rusqlite::types::Type::Text)
            })?
            .with_timezone(&chrono::Utc);

        let payload_str: Option<String> = row.get(7)?;
        let payload = match payload_str {
            Some(s) => serde_json::from_str(&s).map_err(|_| {
                rusqlite::Error::InvalidColumnType(7, "Invalid payload".to_string(), rusqlite::types::Type::Text)
            })?,
            None => serde_json::Value::Null,
        };

        Ok(CompletionRecord::from_existing(
            id,
            habit_id,
            completed_date,
            completed_at,
            row.get(4)?, // count
            row.get(5)?, // is_skipped
            row.get(6)?, // is_postponed
            payload,
        ))
    }

    /// Insert or replace one record without wrapping a transaction
    fn put_record(&self, record: &CompletionRecord) -> Result<(), StorageError> {
        let payload = match &record.payload {
            serde_json::Value::Null => None,
            other => Some(serde_json::to_string(other)?),
        };

        self.conn.execute(
            "INSERT OR REPLACE INTO completions (
                id, habit_id, completed_date, completed_at, count, is_skipped, is_postponed, payload
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id.to_string(),
                record.habit_id.to_string(),
                record.completed_date.to_string(),
                record.completed_at.to_rfc3339(),
                record.count,
                record.is_skipped,
                record.is_postponed,
                payload
            ],
        )?;
        Ok(())
    }

    fn ids_from_json(column: &str) -> rusqlite::Error {
        rusqlite::Error::InvalidColumnType(
            1,
            format!("Invalid id list in {}", column),
            rusqlite::types::Type::Text,
        )
    }
}

impl PrimaryStore for SqliteStore {
    /// Load every completion record
    fn get_all(&self) -> Result<Vec<CompletionRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, habit_id, completed_date, completed_at, count, is_skipped, is_postponed, payload
             FROM completions ORDER BY completed_date, completed_at",
        )?;
        let record_iter = stmt.query_map([], Self::record_from_row)?;

        let mut records = Vec::new();
        for record in record_iter {
            records.push(record?);
        }
        Ok(records)
    }

    /// Look up one record by its id
    fn get_by_id(&self, id: &CompletionId) -> Result<Option<CompletionRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, habit_id, completed_date, completed_at, count, is_skipped, is_postponed, payload
             FROM completions WHERE id = ?1",
        )?;
        let result = stmt.query_row(params![id.to_string()], Self::record_from_row);

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StorageError::Query(e)),
        }
    }

    fn put(&self, record: &CompletionRecord) -> Result<(), StorageError> {
        self.put_record(record)?;
        tracing::debug!(
            "Stored completion {} for habit {}",
            record.id.to_string(),
            record.habit_id.to_string()
        );
        Ok(())
    }

    fn put_all(&self, records: &[CompletionRecord]) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        for record in records {
            self.put_record(record)?;
        }
        tx.commit()?;
        tracing::debug!("Stored {} completion records", records.len());
        Ok(())
    }

    fn delete(&self, id: &CompletionId) -> Result<(), StorageError> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM completions WHERE id = ?1", params![id.to_string()])?;
        if rows_affected == 0 {
            return Err(StorageError::RecordNotFound { id: id.to_string() });
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.conn.execute("DELETE FROM completions", [])?;
        tracing::debug!("Cleared all completion records");
        Ok(())
    }

    /// All records within a date range (inclusive)
    ///
    /// Backed by the completed_date index, so the cost is proportional to
    /// the rows in the range rather than the whole table.
    fn get_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CompletionRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, habit_id, completed_date, completed_at, count, is_skipped, is_postponed, payload
             FROM completions
             WHERE completed_date BETWEEN ?1 AND ?2
             ORDER BY completed_date, completed_at",
        )?;
        let record_iter =
            stmt.query_map(params![start.to_string(), end.to_string()], Self::record_from_row)?;

        let mut records = Vec::new();
        for record in record_iter {
            records.push(record?);
        }
        Ok(records)
    }
}

impl IndexStore for SqliteStore {
    fn load_index_metadata(&self) -> Result<Option<IndexMetadata>, StorageError> {
        let result = self.conn.query_row(
            "SELECT version, indexed_from, oldest_data, last_indexed,
                    backfill_complete, backfill_paused, rebuild_needed
             FROM index_metadata WHERE id = 1",
            [],
            |row| {
                let key_at = |idx: usize, value: Option<u32>| -> rusqlite::Result<Option<DateKey>> {
                    value
                        .map(|v| {
                            DateKey::from_value(v).map_err(|_| {
                                rusqlite::Error::InvalidColumnType(
                                    idx,
                                    "Invalid date key".to_string(),
                                    rusqlite::types::Type::Integer,
                                )
                            })
                        })
                        .transpose()
                };

                Ok(IndexMetadata {
                    version: row.get(0)?,
                    indexed_from: key_at(1, row.get(1)?)?,
                    oldest_data: key_at(2, row.get(2)?)?,
                    last_indexed: key_at(3, row.get(3)?)?,
                    backfill_complete: row.get(4)?,
                    backfill_paused: row.get(5)?,
                    rebuild_needed: row.get(6)?,
                })
            },
        );

        match result {
            Ok(metadata) => Ok(Some(metadata)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StorageError::Query(e)),
        }
    }

    fn save_index_metadata(&self, metadata: &IndexMetadata) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO index_metadata (
                id, version, indexed_from, oldest_data, last_indexed,
                backfill_complete, backfill_paused, rebuild_needed
            ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                metadata.version,
                metadata.indexed_from.map(DateKey::value),
                metadata.oldest_data.map(DateKey::value),
                metadata.last_indexed.map(DateKey::value),
                metadata.backfill_complete,
                metadata.backfill_paused,
                metadata.rebuild_needed
            ],
        )?;
        Ok(())
    }

    fn load_index_collections(&self) -> Result<IndexCollections, StorageError> {
        let mut dates = BTreeMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT date_key, completion_ids FROM index_dates")?;
        let rows = stmt.query_map([], |row| {
            let key_value: u32 = row.get(0)?;
            let key = DateKey::from_value(key_value).map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    0,
                    "Invalid date key".to_string(),
                    rusqlite::types::Type::Integer,
                )
            })?;
            let ids_json: String = row.get(1)?;
            let ids: BTreeSet<CompletionId> =
                serde_json::from_str(&ids_json).map_err(|_| Self::ids_from_json("index_dates"))?;
            Ok((key, ids))
        })?;
        for row in rows {
            let (key, ids) = row?;
            dates.insert(key, ids);
        }

        let mut habits = BTreeMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT habit_id, completion_ids FROM index_habits")?;
        let rows = stmt.query_map([], |row| {
            let habit_str: String = row.get(0)?;
            let habit_id = HabitId::from_string(&habit_str).map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    0,
                    "Invalid UUID".to_string(),
                    rusqlite::types::Type::Text,
                )
            })?;
            let ids_json: String = row.get(1)?;
            let ids: BTreeSet<CompletionId> =
                serde_json::from_str(&ids_json).map_err(|_| Self::ids_from_json("index_habits"))?;
            Ok((habit_id, ids))
        })?;
        for row in rows {
            let (habit_id, ids) = row?;
            habits.insert(habit_id, ids);
        }

        let mut summaries = BTreeMap::new();
        let mut stmt = self.conn.prepare(
            "SELECT date_key, entries, successful_entries, skipped_entries, postponed_entries, total_count
             FROM index_daily_summaries",
        )?;
        let rows = stmt.query_map([], |row| {
            let key_value: u32 = row.get(0)?;
            let key = DateKey::from_value(key_value).map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    0,
                    "Invalid date key".to_string(),
                    rusqlite::types::Type::Integer,
                )
            })?;
            Ok((
                key,
                DailySummary {
                    entries: row.get(1)?,
                    successful_entries: row.get(2)?,
                    skipped_entries: row.get(3)?,
                    postponed_entries: row.get(4)?,
                    total_count: row.get(5)?,
                },
            ))
        })?;
        for row in rows {
            let (key, summary) = row?;
            summaries.insert(key, summary);
        }

        Ok(IndexCollections {
            dates,
            habits,
            summaries,
        })
    }

    /// Replace all three collections in one transaction
    ///
    /// The swap is atomic at the database level, so a reader in a later
    /// session never observes a half-rebuilt index.
    fn replace_index_collections(
        &self,
        collections: &IndexCollections,
    ) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;

        self.conn.execute("DELETE FROM index_dates", [])?;
        self.conn.execute("DELETE FROM index_habits", [])?;
        self.conn.execute("DELETE FROM index_daily_summaries", [])?;

        for (key, ids) in &collections.dates {
            self.conn.execute(
                "INSERT INTO index_dates (date_key, completion_ids) VALUES (?1, ?2)",
                params![key.value(), serde_json::to_string(ids)?],
            )?;
        }
        for (habit_id, ids) in &collections.habits {
            self.conn.execute(
                "INSERT INTO index_habits (habit_id, completion_ids) VALUES (?1, ?2)",
                params![habit_id.to_string(), serde_json::to_string(ids)?],
            )?;
        }
        for (key, summary) in &collections.summaries {
            self.conn.execute(
                "INSERT INTO index_daily_summaries (
                    date_key, entries, successful_entries, skipped_entries, postponed_entries, total_count
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    key.value(),
                    summary.entries,
                    summary.successful_entries,
                    summary.skipped_entries,
                    summary.postponed_entries,
                    summary.total_count
                ],
            )?;
        }

        tx.commit()?;
        tracing::debug!(
            dates = collections.dates.len(),
            habits = collections.habits.len(),
            summaries = collections.summaries.len(),
            "Replaced persisted index collections"
        );
        Ok(())
    }

    fn save_date_bucket(
        &self,
        key: DateKey,
        ids: &BTreeSet<CompletionId>,
    ) -> Result<(), StorageError> {
        if ids.is_empty() {
            self.conn.execute(
                "DELETE FROM index_dates WHERE date_key = ?1",
                params![key.value()],
            )?;
        } else {
            self.conn.execute(
                "INSERT OR REPLACE INTO index_dates (date_key, completion_ids) VALUES (?1, ?2)",
                params![key.value(), serde_json::to_string(ids)?],
            )?;
        }
        Ok(())
    }

    fn save_habit_bucket(
        &self,
        habit_id: &HabitId,
        ids: &BTreeSet<CompletionId>,
    ) -> Result<(), StorageError> {
        if ids.is_empty() {
            self.conn.execute(
                "DELETE FROM index_habits WHERE habit_id = ?1",
                params![habit_id.to_string()],
            )?;
        } else {
            self.conn.execute(
                "INSERT OR REPLACE INTO index_habits (habit_id, completion_ids) VALUES (?1, ?2)",
                params![habit_id.to_string(), serde_json::to_string(ids)?],
            )?;
        }
        Ok(())
    }

    fn save_daily_summary(
        &self,
        key: DateKey,
        summary: &DailySummary,
    ) -> Result<(), StorageError> {
        if summary.is_empty() {
            self.conn.execute(
                "DELETE FROM index_daily_summaries WHERE date_key = ?1",
                params![key.value()],
            )?;
        } else {
            self.conn.execute(
                "INSERT OR REPLACE INTO index_daily_summaries (
                    date_key, entries, successful_entries, skipped_entries, postponed_entries, total_count
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    key.value(),
                    summary.entries,
                    summary.successful_entries,
                    summary.skipped_entries,
                    summary.postponed_entries,
                    summary.total_count
                ],
            )?;
        }
        Ok(())
    }
}
