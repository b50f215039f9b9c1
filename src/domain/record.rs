/// CompletionRecord entity for habit completion events
///
/// This module defines the record type the primary store holds and the
/// typed identifiers used to reference records and habits. The index
/// collections reference records only by CompletionId; the record itself
/// is owned exclusively by the primary store.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{DateKey, DomainError};

/// Unique identifier for a completion record
///
/// This is a wrapper around UUID to provide type safety - you can't
/// accidentally pass a completion ID where a habit ID is expected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompletionId(pub Uuid);

impl CompletionId {
    /// Generate a new random completion ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a completion ID from a string (useful for database loading)
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Convert to string representation
    pub fn to_string(&self) -> String {
        self.0.to_string()
    }
}

impl Default for CompletionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a habit
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HabitId(pub Uuid);

impl HabitId {
    /// Generate a new random habit ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a habit ID from a string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Convert to string representation
    pub fn to_string(&self) -> String {
        self.0.to_string()
    }
}

impl Default for HabitId {
    fn default() -> Self {
        Self::new()
    }
}

/// A record of completing (or skipping/postponing) a habit on a specific day
///
/// The indexes only ever look at `id`, `habit_id`, `completed_date`, `count`
/// and the two flags; `payload` carries whatever else the host application
/// attaches to a completion and is opaque to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    /// Unique identifier for this record
    pub id: CompletionId,
    /// Which habit this completion belongs to
    pub habit_id: HabitId,
    /// The local calendar date the completion is credited to
    pub completed_date: NaiveDate,
    /// When the completion was actually logged
    pub completed_at: DateTime<Utc>,
    /// How much was done (repetitions, minutes, ...); 0 is a valid amount
    pub count: i64,
    /// The habit was deliberately skipped on this day
    pub is_skipped: bool,
    /// The habit was postponed to a later day
    pub is_postponed: bool,
    /// Host-application fields the engine does not interpret
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl CompletionRecord {
    /// Create a new completion record with validation
    ///
    /// The logged timestamp is set to the current time and a fresh ID is
    /// generated. Negative counts are rejected here; data loaded from an
    /// existing store goes through `from_existing` unchecked.
    pub fn new(
        habit_id: HabitId,
        completed_date: NaiveDate,
        count: i64,
        is_skipped: bool,
        is_postponed: bool,
    ) -> Result<Self, DomainError> {
        if count < 0 {
            return Err(DomainError::InvalidCount(format!(
                "completion count cannot be negative, got {}",
                count
            )));
        }

        Ok(Self {
            id: CompletionId::new(),
            habit_id,
            completed_date,
            completed_at: Utc::now(),
            count,
            is_skipped,
            is_postponed,
            payload: serde_json::Value::Null,
        })
    }

    /// Create a record from existing data (used when loading from the store)
    #[allow(clippy::too_many_arguments)]
    pub fn from_existing(
        id: CompletionId,
        habit_id: HabitId,
        completed_date: NaiveDate,
        completed_at: DateTime<Utc>,
        count: i64,
        is_skipped: bool,
        is_postponed: bool,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id,
            habit_id,
            completed_date,
            completed_at,
            count,
            is_skipped,
            is_postponed,
            payload,
        }
    }

    /// The index key for this record's calendar date
    pub fn date_key(&self) -> DateKey {
        DateKey::from_date(self.completed_date)
    }

    /// Whether this record counts as a successful completion
    ///
    /// Skipped and postponed records are never successful; neither is a
    /// record whose count is zero.
    pub fn is_successful(&self) -> bool {
        !self.is_skipped && !self.is_postponed && self.count > 0
    }
}
