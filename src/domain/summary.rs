/// Per-day aggregate of completion activity
///
/// A DailySummary is the third derived mapping the engine maintains: a
/// fixed-shape struct instead of an ad hoc string-keyed map, so a typo in
/// a field name is a compile error rather than a silently wrong count.

use serde::{Deserialize, Serialize};

/// Aggregate counters for one calendar date
///
/// `entries` counts every record on the date. The three category counters
/// need not sum to `entries`: a record with a zero count that is neither
/// skipped nor postponed contributes to `entries` alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummary {
    /// Total records on this date
    pub entries: u32,
    /// Records with a positive count that were neither skipped nor postponed
    pub successful_entries: u32,
    /// Records marked skipped
    pub skipped_entries: u32,
    /// Records marked postponed (and not skipped)
    pub postponed_entries: u32,
    /// Sum of all record counts on this date
    pub total_count: i64,
}

impl DailySummary {
    /// Fold one record into the summary
    pub fn accumulate(&mut self, count: i64, is_skipped: bool, is_postponed: bool) {
        self.entries += 1;
        if is_skipped {
            self.skipped_entries += 1;
        } else if is_postponed {
            self.postponed_entries += 1;
        } else if count > 0 {
            self.successful_entries += 1;
        }
        self.total_count += count;
    }

    /// Reverse `accumulate` for a removed record
    ///
    /// Counters saturate at zero so a double-removal can never underflow;
    /// the integrity check catches the resulting drift at next startup.
    pub fn remove(&mut self, count: i64, is_skipped: bool, is_postponed: bool) {
        self.entries = self.entries.saturating_sub(1);
        if is_skipped {
            self.skipped_entries = self.skipped_entries.saturating_sub(1);
        } else if is_postponed {
            self.postponed_entries = self.postponed_entries.saturating_sub(1);
        } else if count > 0 {
            self.successful_entries = self.successful_entries.saturating_sub(1);
        }
        self.total_count -= count;
    }

    /// A summary with no entries left is deleted from the index outright
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}
