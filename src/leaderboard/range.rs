use serde::Deserialize;
use time::{Date, Duration, Month, OffsetDateTime, Time};

use crate::clock::{from_millis, to_millis};

/// Half-open window `[from_ms, to_ms)` over session start timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from_ms: i64,
    pub to_ms: i64,
}

impl TimeRange {
    pub fn new(from_ms: i64, to_ms: i64) -> Self {
        Self { from_ms, to_ms }
    }

    pub fn contains(&self, at_ms: i64) -> bool {
        self.from_ms <= at_ms && at_ms < self.to_ms
    }

    /// The UTC calendar day containing `now_ms`.
    pub fn today(now_ms: i64) -> Self {
        let start = start_of_day(from_millis(now_ms).date());
        let end = start + Duration::days(1);
        Self::new(to_millis(start), to_millis(end))
    }

    /// The UTC calendar month containing `now_ms`.
    pub fn this_month(now_ms: i64) -> Self {
        let date = from_millis(now_ms).date();
        let first = first_of_month(date.year(), date.month());
        let next = match date.month() {
            Month::December => first_of_month(date.year() + 1, Month::January),
            m => first_of_month(date.year(), m.next()),
        };
        Self::new(to_millis(start_of_day(first)), to_millis(start_of_day(next)))
    }
}

fn start_of_day(date: Date) -> OffsetDateTime {
    date.with_time(Time::MIDNIGHT).assume_utc()
}

fn first_of_month(year: i32, month: Month) -> Date {
    // day 1 exists in every month of every representable year
    Date::from_calendar_date(year, month, 1).unwrap_or(Date::MIN)
}

/// Leaderboard window as requested by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Today,
    Month,
    #[serde(alias = "all-time", alias = "alltime")]
    All,
}

impl Period {
    pub fn range(self, now_ms: i64) -> Option<TimeRange> {
        match self {
            Period::Today => Some(TimeRange::today(now_ms)),
            Period::Month => Some(TimeRange::this_month(now_ms)),
            Period::All => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn ms(at: OffsetDateTime) -> i64 {
        to_millis(at)
    }

    #[test]
    fn today_spans_the_utc_day() {
        let r = TimeRange::today(ms(datetime!(2024-05-17 13:45:10.250 UTC)));
        assert_eq!(r.from_ms, ms(datetime!(2024-05-17 00:00 UTC)));
        assert_eq!(r.to_ms, ms(datetime!(2024-05-18 00:00 UTC)));
    }

    #[test]
    fn last_millisecond_belongs_to_its_own_day_only() {
        let last = ms(datetime!(2024-05-17 23:59:59.999 UTC));
        let day = TimeRange::today(last);
        let next_day = TimeRange::today(ms(datetime!(2024-05-18 00:00 UTC)));
        assert!(day.contains(last));
        assert!(!next_day.contains(last));
        assert!(next_day.contains(day.to_ms));
    }

    #[test]
    fn month_rolls_over_december() {
        let r = TimeRange::this_month(ms(datetime!(2023-12-31 23:00 UTC)));
        assert_eq!(r.from_ms, ms(datetime!(2023-12-01 00:00 UTC)));
        assert_eq!(r.to_ms, ms(datetime!(2024-01-01 00:00 UTC)));
    }

    #[test]
    fn month_handles_leap_february() {
        let r = TimeRange::this_month(ms(datetime!(2024-02-10 08:00 UTC)));
        assert_eq!(r.to_ms - r.from_ms, 29 * 24 * 60 * 60 * 1000);
    }

    #[test]
    fn period_parses_from_query_values() {
        let p: Period = serde_json::from_str("\"today\"").unwrap();
        assert_eq!(p, Period::Today);
        let p: Period = serde_json::from_str("\"all-time\"").unwrap();
        assert_eq!(p, Period::All);
        assert!(Period::All.range(0).is_none());
        assert_eq!(Period::Month.range(0), Some(TimeRange::this_month(0)));
    }
}
