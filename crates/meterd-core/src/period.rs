//! Usage period and window types.
//!
//! Windowed history queries slice time into fixed-size windows aligned to a
//! caller-supplied UTC offset. Offsets rather than named zones keep the
//! alignment math exact and dependency-free; there is no DST ambiguity with
//! a fixed offset.

use chrono::{DateTime, Datelike, Duration, FixedOffset, Months, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// A half-open span of time `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePeriod {
    /// Start of the period (inclusive).
    pub start: DateTime<Utc>,

    /// End of the period (exclusive).
    pub end: DateTime<Utc>,
}

impl UsagePeriod {
    /// Create a period.
    #[must_use]
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Whether the period contains `at`.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Fixed window size for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowSize {
    /// One minute.
    Minute,
    /// One hour.
    Hour,
    /// One day.
    Day,
    /// One calendar month.
    Month,
}

impl WindowSize {
    /// Truncate `at` down to the nearest window boundary in the given
    /// timezone offset.
    #[must_use]
    pub fn truncate(&self, at: DateTime<Utc>, tz: FixedOffset) -> DateTime<Utc> {
        let local = at.with_timezone(&tz).naive_local();
        let truncated = match self {
            Self::Minute => local.with_second(0).and_then(|d| d.with_nanosecond(0)),
            Self::Hour => local
                .with_minute(0)
                .and_then(|d| d.with_second(0))
                .and_then(|d| d.with_nanosecond(0)),
            Self::Day => Some(start_of_day(local)),
            Self::Month => local.with_day(1).map(start_of_day),
        };

        truncated
            .and_then(|naive| to_utc(naive, tz))
            .unwrap_or(at)
    }

    /// Advance a window start to the next boundary in the given timezone
    /// offset. Months advance calendar-wise; the rest are fixed durations.
    #[must_use]
    pub fn advance(&self, start: DateTime<Utc>, tz: FixedOffset) -> DateTime<Utc> {
        match self {
            Self::Minute => start + Duration::minutes(1),
            Self::Hour => start + Duration::hours(1),
            Self::Day => start + Duration::days(1),
            Self::Month => {
                let local = start.with_timezone(&tz).naive_local();
                local
                    .checked_add_months(Months::new(1))
                    .and_then(|naive| to_utc(naive, tz))
                    .unwrap_or(start + Duration::days(31))
            }
        }
    }
}

fn start_of_day(naive: NaiveDateTime) -> NaiveDateTime {
    naive.date().and_hms_opt(0, 0, 0).unwrap_or(naive)
}

fn to_utc(naive: NaiveDateTime, tz: FixedOffset) -> Option<DateTime<Utc>> {
    // Fixed offsets never produce ambiguous local times.
    naive
        .and_local_timezone(tz)
        .single()
        .map(|local| local.with_timezone(&Utc))
}
