/// Full-scan bootstrap of the derived indexes
///
/// One linear pass over the primary store establishes a recent indexed
/// window (30 days ending today by default) and records the oldest date
/// present anywhere, which is what later backfill chunks work back
/// towards. The pass yields control periodically so a large store never
/// starves the host.

use chrono::NaiveDate;
use tracing::info;

use crate::domain::DateKey;
use crate::index::{ChunkRow, IndexCollections, IndexMetadata, INDEX_VERSION};
use crate::storage::{PrimaryStore, StorageError};

/// Default number of days indexed immediately on first build
pub const DEFAULT_BOOTSTRAP_WINDOW_DAYS: u32 = 30;

/// How many records to process between cooperative yields
const YIELD_EVERY: usize = 256;

/// Result of a bootstrap pass: fresh collections plus matching metadata
///
/// Both are built into new values and swapped in by the caller in one
/// assignment, so partially-rebuilt state is never observable.
#[derive(Debug)]
pub struct BootstrapOutcome {
    pub collections: IndexCollections,
    pub metadata: IndexMetadata,
}

/// Run one full pass over the primary store
///
/// Records inside the window go into the fresh collections; every record,
/// windowed or not, contributes to the oldest-data tracking that decides
/// whether backfill has anything left to do.
pub async fn build<S: PrimaryStore>(
    store: &S,
    today: NaiveDate,
    window_days: u32,
    backfill_paused: bool,
) -> Result<BootstrapOutcome, StorageError> {
    let window_days = window_days.max(1);
    let today_key = DateKey::from_date(today);
    let window_start = DateKey::from_date(
        today - chrono::Duration::days(i64::from(window_days) - 1),
    );

    let records = store.get_all()?;
    let mut collections = IndexCollections::default();
    let mut oldest: Option<DateKey> = None;
    let mut newest_indexed = today_key;

    for (i, record) in records.iter().enumerate() {
        if i > 0 && i % YIELD_EVERY == 0 {
            tokio::task::yield_now().await;
        }

        let key = record.date_key();
        oldest = Some(match oldest {
            Some(o) if o <= key => o,
            _ => key,
        });

        if key >= window_start {
            collections.insert_row(&ChunkRow::from(record));
            if key > newest_indexed {
                newest_indexed = key;
            }
        }
    }

    // The indexed window never starts before the data does.
    let indexed_from = match oldest {
        Some(o) if o > window_start => o,
        _ => window_start,
    };
    let backfill_complete = oldest.map_or(true, |o| indexed_from <= o);

    let metadata = IndexMetadata {
        version: INDEX_VERSION,
        indexed_from: Some(indexed_from),
        oldest_data: oldest,
        last_indexed: Some(newest_indexed),
        backfill_complete,
        backfill_paused,
        rebuild_needed: false,
    };

    info!(
        records = records.len(),
        indexed = collections.date_bucket_total(),
        indexed_from = %indexed_from,
        backfill_complete,
        "bootstrapped completion indexes"
    );

    Ok(BootstrapOutcome {
        collections,
        metadata,
    })
}
