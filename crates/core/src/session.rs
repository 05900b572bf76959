//! Trading-session time arithmetic.
//!
//! Session boundaries are wall times at the exchange; every check converts a
//! UTC instant through the configured offset so the engine itself can run in
//! any timezone.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};

use crate::config::SessionConfig;

/// Clock over the exchange's trading session.
#[derive(Debug, Clone)]
pub struct SessionClock {
    market_open: NaiveTime,
    range_end: NaiveTime,
    entry_end: NaiveTime,
    square_off: NaiveTime,
    offset: FixedOffset,
}

impl SessionClock {
    pub fn new(config: &SessionConfig) -> Self {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
        Self {
            market_open: config.market_open,
            range_end: config.market_open + Duration::minutes(i64::from(config.range_minutes)),
            entry_end: config.entry_end,
            square_off: config.square_off,
            offset,
        }
    }

    /// Wall time at the exchange for a UTC instant.
    pub fn local_time(&self, now: DateTime<Utc>) -> NaiveTime {
        now.with_timezone(&self.offset).time()
    }

    /// Trading day at the exchange for a UTC instant.
    pub fn trading_day(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// End of the opening-range formation window.
    pub fn range_end(&self) -> NaiveTime {
        self.range_end
    }

    pub fn market_open(&self) -> NaiveTime {
        self.market_open
    }

    /// True once the opening-range window has fully elapsed.
    pub fn range_formed(&self, now: DateTime<Utc>) -> bool {
        self.local_time(now) >= self.range_end
    }

    /// True while new entries are allowed (after range formation, before the
    /// entry cutoff).
    pub fn in_entry_window(&self, now: DateTime<Utc>) -> bool {
        let t = self.local_time(now);
        t >= self.range_end && t <= self.entry_end
    }

    /// True once the end-of-day liquidation threshold has passed.
    pub fn past_square_off(&self, now: DateTime<Utc>) -> bool {
        self.local_time(now) >= self.square_off
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn clock() -> SessionClock {
        SessionClock::new(&SessionConfig::default())
    }

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        // 09:15 IST == 03:45 UTC
        Utc.with_ymd_and_hms(2026, 8, 28, h, m, 0).unwrap()
    }

    #[test]
    fn range_forms_fifteen_minutes_after_open() {
        let c = clock();
        assert!(!c.range_formed(utc(3, 45))); // 09:15 IST
        assert!(!c.range_formed(utc(3, 59))); // 09:29 IST
        assert!(c.range_formed(utc(4, 0))); // 09:30 IST
    }

    #[test]
    fn entry_window_closes_at_cutoff() {
        let c = clock();
        assert!(c.in_entry_window(utc(4, 0))); // 09:30 IST
        assert!(c.in_entry_window(utc(5, 45))); // 11:15 IST
        assert!(!c.in_entry_window(utc(5, 46))); // 11:16 IST
        assert!(!c.in_entry_window(utc(3, 50))); // during formation
    }

    #[test]
    fn square_off_at_three_pm_local() {
        let c = clock();
        assert!(!c.past_square_off(utc(9, 29))); // 14:59 IST
        assert!(c.past_square_off(utc(9, 30))); // 15:00 IST
    }
}
