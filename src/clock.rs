/// Clock abstraction for the bootstrap window anchor
///
/// The bootstrap window is a fixed number of days ending "today". Injecting
/// the clock keeps window placement deterministic in tests; production code
/// uses the system's local calendar date, matching how completion dates are
/// recorded.

use chrono::{Local, NaiveDate};

/// Source of the current local calendar date
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// System clock using the device's local timezone
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Fixed clock for tests
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}
