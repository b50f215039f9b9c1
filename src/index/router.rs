/// Per-query routing between the indexes and direct store scans
///
/// A range query that straddles the indexed/unindexed boundary is split:
/// the older sub-range is served by a direct primary scan, the newer one
/// by the date index, and the two results concatenate without duplication
/// or gaps at the boundary. This split is what keeps queries correct
/// during partial backfill without ever blocking on a full rebuild.

use chrono::NaiveDate;

use crate::domain::DateKey;

/// How a date range should be served
///
/// Either half may be absent; both absent means the range can contain no
/// records at all (e.g. entirely before the oldest data once backfill has
/// completed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangePlan {
    /// Older sub-range to serve by scanning the primary store
    pub scan: Option<(NaiveDate, NaiveDate)>,
    /// Newer sub-range to serve from the date index
    pub indexed: Option<(NaiveDate, NaiveDate)>,
}

impl RangePlan {
    fn empty() -> Self {
        Self {
            scan: None,
            indexed: None,
        }
    }

    fn scan_all(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            scan: Some((start, end)),
            indexed: None,
        }
    }
}

/// Decide how to serve `[start, end]` given the current index coverage
///
/// Writes keep the indexes current for every date at or after
/// `indexed_from`, so indexed coverage needs no upper clamp; the split
/// only ever happens at the older boundary. Once backfill is complete no
/// records exist before `indexed_from`, so the scan half disappears
/// entirely.
pub fn plan_range(
    start: NaiveDate,
    end: NaiveDate,
    indexed_from: Option<DateKey>,
    backfill_complete: bool,
    use_indexes: bool,
) -> RangePlan {
    if start > end {
        return RangePlan::empty();
    }
    if !use_indexes {
        return RangePlan::scan_all(start, end);
    }
    let Some(from_date) = indexed_from.and_then(DateKey::to_date) else {
        return RangePlan::scan_all(start, end);
    };

    if backfill_complete {
        if end < from_date {
            // Nothing exists before the indexed window once backfill is done.
            return RangePlan::empty();
        }
        return RangePlan {
            scan: None,
            indexed: Some((start.max(from_date), end)),
        };
    }

    if end < from_date {
        return RangePlan::scan_all(start, end);
    }
    if start >= from_date {
        return RangePlan {
            scan: None,
            indexed: Some((start, end)),
        };
    }

    let Some(boundary) = from_date.pred_opt() else {
        return RangePlan::scan_all(start, end);
    };
    RangePlan {
        scan: Some((start, boundary)),
        indexed: Some((from_date, end)),
    }
}
