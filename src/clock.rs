//! Time source and local-day boundaries

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};

use crate::types::TimeRange;

/// Source of "now" for scans and daily sums
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Frozen clock for replays and tests
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Local midnight (inclusive) through `now` (inclusive) in the given offset
pub fn current_day(now: DateTime<Utc>, offset: FixedOffset) -> TimeRange {
    let local_midnight = now
        .with_timezone(&offset)
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| offset.from_local_datetime(&naive).single())
        .map(|dt| dt.with_timezone(&Utc))
        // unreachable for a fixed offset
        .unwrap_or_else(|| now - Duration::hours(24));
    TimeRange::new(local_midnight, now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_day_utc() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap();
        let day = current_day(now, FixedOffset::east_opt(0).unwrap());
        assert_eq!(day.start, Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap());
        assert_eq!(day.end, now);
    }

    #[test]
    fn test_current_day_respects_offset() {
        // 02:00 UTC is still the previous evening in New York (UTC-5)
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 2, 0, 0).unwrap();
        let day = current_day(now, FixedOffset::west_opt(5 * 3600).unwrap());
        assert_eq!(day.start, Utc.with_ymd_and_hms(2024, 1, 14, 5, 0, 0).unwrap());
    }

    #[test]
    fn test_fixed_clock() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
        assert_eq!(FixedClock(now).now(), now);
    }
}
