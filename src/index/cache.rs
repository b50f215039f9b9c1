/// Small memo of per-date query results
///
/// The dashboard asks for "all habits' completions on day D" repeatedly;
/// this cache answers those reads without touching the router. Capacity is
/// a week of dates with FIFO eviction: the oldest-inserted entry goes
/// first, not the least-recently-used one, so a hot entry still ages out
/// and gets recomputed.

use std::collections::{HashMap, VecDeque};

use crate::domain::{CompletionRecord, DateKey, HabitId};

/// Completions on one date, grouped by habit
pub type CompletionsByHabit = HashMap<HabitId, Vec<CompletionRecord>>;

/// How many distinct dates the cache holds
pub const CACHE_CAPACITY: usize = 7;

/// Capacity-bounded FIFO memo keyed by date
#[derive(Debug, Default)]
pub struct CompletionDateCache {
    entries: HashMap<DateKey, CompletionsByHabit>,
    order: VecDeque<DateKey>,
    capacity: usize,
}

impl CompletionDateCache {
    pub fn new() -> Self {
        Self::with_capacity(CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Look up the memoized result for a date
    pub fn get(&self, key: DateKey) -> Option<&CompletionsByHabit> {
        self.entries.get(&key)
    }

    /// Memoize a result, evicting the oldest-inserted date when full
    ///
    /// Re-inserting an existing date replaces its value but keeps its
    /// position in the eviction order.
    pub fn insert(&mut self, key: DateKey, value: CompletionsByHabit) {
        if self.entries.insert(key, value).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }
    }

    /// Drop the entry for one date, if present
    pub fn invalidate(&mut self, key: DateKey) {
        if self.entries.remove(&key).is_some() {
            self.order.retain(|k| *k != key);
        }
    }

    /// Drop everything; used when a bulk operation's date scope is not
    /// cheaply enumerable
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Number of dates currently memoized
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
