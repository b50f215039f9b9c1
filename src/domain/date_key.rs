/// Calendar date keys for the derived indexes
///
/// A DateKey is the canonical YYYYMMDD encoding of a record's local calendar
/// date. Two records completed on the same calendar day always produce the
/// same key regardless of their time of day, and the numeric ordering of
/// keys equals the ordering of the dates they encode.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Canonical 8-digit encoding of a calendar date (year * 10000 + month * 100 + day)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DateKey(u32);

impl DateKey {
    /// Encode a calendar date as a DateKey
    ///
    /// Only the calendar date contributes to the key, so any two records
    /// sharing a date encode identically. Years outside 0..=9999 do not
    /// occur in habit data; they are clamped to keep the encoding total.
    pub fn from_date(date: NaiveDate) -> Self {
        let year = date.year().clamp(0, 9999) as u32;
        Self(year * 10_000 + date.month() * 100 + date.day())
    }

    /// Decode back to a calendar date
    ///
    /// Returns None for encodings that do not name a real date (possible
    /// when a key was loaded from a tampered index collection).
    pub fn to_date(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt((self.0 / 10_000) as i32, self.0 / 100 % 100, self.0 % 100)
    }

    /// Raw numeric value of the key
    pub fn value(self) -> u32 {
        self.0
    }

    /// The key for the day before this one
    pub fn pred(self) -> Option<DateKey> {
        Some(Self::from_date(self.to_date()?.pred_opt()?))
    }

    /// The key for the day after this one
    pub fn succ(self) -> Option<DateKey> {
        Some(Self::from_date(self.to_date()?.succ_opt()?))
    }

    /// The key `days` calendar days away from this one (negative moves backward)
    pub fn offset(self, days: i64) -> Option<DateKey> {
        let date = self.to_date()?.checked_add_signed(Duration::days(days))?;
        Some(Self::from_date(date))
    }

    /// Rehydrate a key from its stored numeric value
    pub fn from_value(value: u32) -> Result<Self, DomainError> {
        let key = Self(value);
        if key.to_date().is_none() {
            return Err(DomainError::InvalidDate(format!(
                "not a valid YYYYMMDD date key: {}",
                value
            )));
        }
        Ok(key)
    }

    /// Parse an 8-digit YYYYMMDD string
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        let value: u32 = s
            .parse()
            .map_err(|_| DomainError::InvalidDate(format!("not a numeric date key: {}", s)))?;
        Self::from_value(value)
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08}", self.0)
    }
}
