//! Wall-clock date source, injectable so the today-discard rule is testable.

use chrono::NaiveDate;

pub trait Clock: Send + Sync {
    /// The current calendar date (UTC).
    fn today(&self) -> NaiveDate;
}

/// Reads the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Utc::now().date_naive()
    }
}

/// Always reports the same date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}
