/// Chunk rows and the pure backfill aggregation
///
/// Backfill aggregation may run off the caller's thread, so the data that
/// crosses that boundary is shrunk to the minimal fields indexing needs.
/// The aggregation itself is a pure function of its rows: no store access,
/// no shared state, which is what makes dispatching it elsewhere safe.

use serde::{Deserialize, Serialize};

use crate::domain::{CompletionId, CompletionRecord, DateKey, HabitId};
use crate::index::IndexCollections;

/// The subset of a completion record that index aggregation needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRow {
    pub id: CompletionId,
    pub habit_id: HabitId,
    pub date_key: DateKey,
    pub count: i64,
    pub is_skipped: bool,
    pub is_postponed: bool,
}

impl From<&CompletionRecord> for ChunkRow {
    fn from(record: &CompletionRecord) -> Self {
        Self {
            id: record.id.clone(),
            habit_id: record.habit_id.clone(),
            date_key: record.date_key(),
            count: record.count,
            is_skipped: record.is_skipped,
            is_postponed: record.is_postponed,
        }
    }
}

/// Aggregate a chunk of rows into fresh index collections
///
/// Pure and deterministic: the same rows always produce the same
/// collections, regardless of input order.
pub fn aggregate_chunk(rows: &[ChunkRow]) -> IndexCollections {
    let mut collections = IndexCollections::default();
    for row in rows {
        collections.insert_row(row);
    }
    collections
}
