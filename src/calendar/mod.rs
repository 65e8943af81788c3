use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

const OPEN_MINUTE: i64 = 570; // 09:30
const REGULAR_CLOSE: i64 = 960; // 16:00
const HALF_DAY_CLOSE: i64 = 780; // 13:00
const PRE_MARKET_START: i64 = 240; // 04:00

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Session {
    ClosedWeekend,
    ClosedHoliday,
    Closed,
    PreMarket,
    OpeningRange,
    Morning,
    Afternoon,
    PowerHour,
}

impl Session {
    pub fn as_str(&self) -> &'static str {
        match self {
            Session::ClosedWeekend => "CLOSED_WEEKEND",
            Session::ClosedHoliday => "CLOSED_HOLIDAY",
            Session::Closed => "CLOSED",
            Session::PreMarket => "PRE_MARKET",
            Session::OpeningRange => "OPENING_RANGE",
            Session::Morning => "MORNING",
            Session::Afternoon => "AFTERNOON",
            Session::PowerHour => "POWER_HOUR",
        }
    }

    /// Regular-hours sessions where candles print and signals trade.
    pub fn is_trading(&self) -> bool {
        matches!(
            self,
            Session::OpeningRange | Session::Morning | Session::Afternoon | Session::PowerHour
        )
    }

    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Session::ClosedWeekend | Session::ClosedHoliday | Session::Closed
        )
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Market clock. Session tagging is a pure function of market-local date-time
/// plus the injected holiday and half-day sets; the default table covers
/// 2024-2026. Never fails: every instant maps to some session.
#[derive(Debug, Clone)]
pub struct MarketCalendar {
    holidays: HashSet<NaiveDate>,
    half_days: HashSet<NaiveDate>,
}

impl Default for MarketCalendar {
    fn default() -> Self {
        Self::new(default_holidays(), default_half_days())
    }
}

impl MarketCalendar {
    pub fn new(holidays: HashSet<NaiveDate>, half_days: HashSet<NaiveDate>) -> Self {
        Self { holidays, half_days }
    }

    /// Session for a wall-clock instant, via the exchange time zone.
    pub fn session_at(&self, at: DateTime<Utc>) -> Session {
        self.session_local(at.with_timezone(&New_York).naive_local())
    }

    pub fn session_now(&self) -> Session {
        self.session_at(Utc::now())
    }

    /// Pure session classification over market-local date-time.
    pub fn session_local(&self, local: NaiveDateTime) -> Session {
        let date = local.date();
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            return Session::ClosedWeekend;
        }
        if self.holidays.contains(&date) {
            return Session::ClosedHoliday;
        }

        let close = self.close_minute(date);
        let m = i64::from(local.hour()) * 60 + i64::from(local.minute());
        if m < PRE_MARKET_START || m >= close {
            Session::Closed
        } else if m < OPEN_MINUTE {
            Session::PreMarket
        } else if m < 600.min(close) {
            Session::OpeningRange
        } else if m < 720.min(close) {
            Session::Morning
        } else if m < HALF_DAY_CLOSE.min(close) {
            Session::Afternoon
        } else {
            Session::PowerHour
        }
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    pub fn is_half_day(&self, date: NaiveDate) -> bool {
        self.half_days.contains(&date)
    }

    pub fn next_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut d = date + Duration::days(1);
        while !self.is_trading_day(d) {
            d += Duration::days(1);
        }
        d
    }

    /// Advance `n` trading days, skipping weekends and holidays.
    pub fn add_trading_days(&self, date: NaiveDate, n: u32) -> NaiveDate {
        let mut d = date;
        for _ in 0..n {
            d = self.next_trading_day(d);
        }
        d
    }

    /// Minutes since the 09:30 open; negative before the bell. None off-days.
    pub fn minutes_since_open(&self, at: DateTime<Utc>) -> Option<i64> {
        let local = at.with_timezone(&New_York).naive_local();
        if !self.is_trading_day(local.date()) {
            return None;
        }
        let m = i64::from(local.hour()) * 60 + i64::from(local.minute());
        Some(m - OPEN_MINUTE)
    }

    /// Minutes until today's close; negative after it. None off-days.
    pub fn minutes_to_close(&self, at: DateTime<Utc>) -> Option<i64> {
        let local = at.with_timezone(&New_York).naive_local();
        if !self.is_trading_day(local.date()) {
            return None;
        }
        let m = i64::from(local.hour()) * 60 + i64::from(local.minute());
        Some(self.close_minute(local.date()) - m)
    }

    pub fn is_friday(&self, at: DateTime<Utc>) -> bool {
        at.with_timezone(&New_York).weekday() == Weekday::Fri
    }

    /// Today's date in the exchange time zone.
    pub fn market_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&New_York).date_naive()
    }

    fn close_minute(&self, date: NaiveDate) -> i64 {
        if self.is_half_day(date) {
            HALF_DAY_CLOSE
        } else {
            REGULAR_CLOSE
        }
    }
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("static calendar date")
}

/// NYSE full-closure days, 2024-2026.
fn default_holidays() -> HashSet<NaiveDate> {
    [
        ymd(2024, 1, 1),
        ymd(2024, 1, 15),
        ymd(2024, 2, 19),
        ymd(2024, 3, 29),
        ymd(2024, 5, 27),
        ymd(2024, 6, 19),
        ymd(2024, 7, 4),
        ymd(2024, 9, 2),
        ymd(2024, 11, 28),
        ymd(2024, 12, 25),
        ymd(2025, 1, 1),
        ymd(2025, 1, 20),
        ymd(2025, 2, 17),
        ymd(2025, 4, 18),
        ymd(2025, 5, 26),
        ymd(2025, 6, 19),
        ymd(2025, 7, 4),
        ymd(2025, 9, 1),
        ymd(2025, 11, 27),
        ymd(2025, 12, 25),
        ymd(2026, 1, 1),
        ymd(2026, 1, 19),
        ymd(2026, 2, 16),
        ymd(2026, 4, 3),
        ymd(2026, 5, 25),
        ymd(2026, 6, 19),
        ymd(2026, 7, 3),
        ymd(2026, 9, 7),
        ymd(2026, 11, 26),
        ymd(2026, 12, 25),
    ]
    .into_iter()
    .collect()
}

/// 13:00 early closes, 2024-2026.
fn default_half_days() -> HashSet<NaiveDate> {
    [
        ymd(2024, 7, 3),
        ymd(2024, 11, 29),
        ymd(2024, 12, 24),
        ymd(2025, 7, 3),
        ymd(2025, 11, 28),
        ymd(2025, 12, 24),
        ymd(2026, 11, 27),
        ymd(2026, 12, 24),
    ]
    .into_iter()
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    fn at(date: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
        date.and_time(NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    #[test]
    fn test_session_ladder_on_a_regular_day() {
        let cal = MarketCalendar::default();
        let d = ymd(2025, 6, 10); // Tuesday
        assert_eq!(cal.session_local(at(d, 3, 59)), Session::Closed);
        assert_eq!(cal.session_local(at(d, 4, 0)), Session::PreMarket);
        assert_eq!(cal.session_local(at(d, 9, 29)), Session::PreMarket);
        assert_eq!(cal.session_local(at(d, 9, 30)), Session::OpeningRange);
        assert_eq!(cal.session_local(at(d, 10, 0)), Session::Morning);
        assert_eq!(cal.session_local(at(d, 12, 0)), Session::Afternoon);
        assert_eq!(cal.session_local(at(d, 13, 0)), Session::PowerHour);
        assert_eq!(cal.session_local(at(d, 15, 59)), Session::PowerHour);
        assert_eq!(cal.session_local(at(d, 16, 0)), Session::Closed);
    }

    #[test]
    fn test_weekend_and_holiday_tags() {
        let cal = MarketCalendar::default();
        assert_eq!(
            cal.session_local(at(ymd(2025, 6, 14), 11, 0)),
            Session::ClosedWeekend
        );
        assert_eq!(
            cal.session_local(at(ymd(2025, 7, 4), 11, 0)),
            Session::ClosedHoliday
        );
    }

    #[test]
    fn test_half_day_closes_at_one() {
        let cal = MarketCalendar::default();
        let d = ymd(2024, 11, 29);
        assert_eq!(cal.session_local(at(d, 12, 59)), Session::Afternoon);
        // 13:30 on a half day is after the close.
        assert_eq!(cal.session_local(at(d, 13, 30)), Session::Closed);
    }

    #[test]
    fn test_session_is_deterministic() {
        let cal = MarketCalendar::default();
        let t = at(ymd(2025, 3, 3), 10, 15);
        assert_eq!(cal.session_local(t), cal.session_local(t));
    }

    #[test]
    fn test_add_trading_days_skips_weekend() {
        let cal = MarketCalendar::default();
        // Friday -> following Monday.
        assert_eq!(cal.add_trading_days(ymd(2025, 6, 13), 1), ymd(2025, 6, 16));
    }

    #[test]
    fn test_add_trading_days_skips_monday_holiday() {
        let cal = MarketCalendar::default();
        // Friday before Memorial Day 2025 (Mon May 26) -> Tuesday.
        assert_eq!(cal.add_trading_days(ymd(2025, 5, 23), 1), ymd(2025, 5, 27));
    }

    #[test]
    fn test_minute_arithmetic() {
        let cal = MarketCalendar::default();
        let local = at(ymd(2025, 6, 10), 10, 0);
        let utc = New_York
            .from_local_datetime(&local)
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(cal.minutes_since_open(utc), Some(30));
        assert_eq!(cal.minutes_to_close(utc), Some(360));
    }
}
