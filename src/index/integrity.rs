/// Cross-check of the three index collections against the primary store
///
/// The check is deliberately a triple comparison: a single aggregate count
/// cannot distinguish a dropped date bucket from a dropped habit bucket
/// from a miscounted summary. Cost is one primary scan plus a walk of the
/// collections, which is acceptable once per session at startup but not
/// per query.

use tracing::warn;

use crate::domain::DateKey;
use crate::index::IndexCollections;
use crate::storage::{PrimaryStore, StorageError};

/// Verify that the collections agree with each other and with the store
///
/// Valid iff the sum of date bucket sizes, the sum of habit bucket sizes
/// and the sum of summary entry counters all equal the number of primary
/// records dated at or after `indexed_from`. An empty store is trivially
/// valid.
pub fn verify<S: PrimaryStore>(
    store: &S,
    collections: &IndexCollections,
    indexed_from: DateKey,
) -> Result<bool, StorageError> {
    let records = store.get_all()?;
    if records.is_empty() {
        return Ok(true);
    }

    let expected = records
        .iter()
        .filter(|r| r.date_key() >= indexed_from)
        .count() as u64;

    let dates = collections.date_bucket_total();
    let habits = collections.habit_bucket_total();
    let entries = collections.entry_total();
    let valid = dates == expected && habits == expected && entries == expected;

    if !valid {
        warn!(
            expected,
            date_buckets = dates,
            habit_buckets = habits,
            summary_entries = entries,
            "completion index failed integrity cross-check"
        );
    }

    Ok(valid)
}
