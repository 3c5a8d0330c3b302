//! Evaluation date source.

use chrono::{NaiveDate, Utc};

/// Supplies "today" for [`Reconciler::reconcile`](super::Reconciler::reconcile).
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// UTC calendar date from the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Always returns the same date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}
