//! Per-exchange trading calendar: weekdays minus a fixed holiday set.

use super::date_key::{DateKey, DateKeyError};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Exchanges the collectors talk to. Each has its own holiday calendar and
/// its own cookie-seeding homepage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    Nse,
    Bse,
}

impl Exchange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Nse => "NSE",
            Exchange::Bse => "BSE",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// NSE trading holidays (DDMMYYYY), 2025-2026.
pub const NSE_HOLIDAYS: &[&str] = &[
    "26012025", "24022025", "10032025", "21032025", "08042025", "10042025", "14042025",
    "21042025", "08052025", "15082025", "29082025", "02102025", "24102025", "31102025",
    "01112025", "05112025", "25122025", "26012026", "17022026",
];

/// BSE trading holidays (DDMMYYYY), 2025-2026. Differs from NSE on 01-05-2025.
pub const BSE_HOLIDAYS: &[&str] = &[
    "26012025", "24022025", "10032025", "21032025", "08042025", "10042025", "14042025",
    "21042025", "01052025", "08052025", "15082025", "29082025", "02102025", "24102025",
    "31102025", "01112025", "05112025", "25122025", "26012026", "17022026",
];

/// Trading calendar for one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingCalendar {
    exchange: Exchange,
    holidays: BTreeSet<DateKey>,
}

impl TradingCalendar {
    pub fn new(exchange: Exchange, holidays: impl IntoIterator<Item = DateKey>) -> Self {
        Self {
            exchange,
            holidays: holidays.into_iter().collect(),
        }
    }

    /// Build a calendar from `DDMMYYYY` strings. Any malformed key is an error.
    pub fn from_keys<S: AsRef<str>>(exchange: Exchange, keys: &[S]) -> Result<Self, DateKeyError> {
        let holidays = keys
            .iter()
            .map(|k| DateKey::parse(k.as_ref()))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self { exchange, holidays })
    }

    /// Calendar with the built-in holiday list for the exchange.
    pub fn builtin(exchange: Exchange) -> Self {
        let keys = match exchange {
            Exchange::Nse => NSE_HOLIDAYS,
            Exchange::Bse => BSE_HOLIDAYS,
        };
        Self::from_keys(exchange, keys).expect("built-in holiday keys are valid")
    }

    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    pub fn holiday_count(&self) -> usize {
        self.holidays.len()
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&DateKey::new(date))
    }

    /// False on Saturday/Sunday and on listed holidays.
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.is_holiday(date)
    }

    /// Trading days in `[start, end]`, ascending.
    pub fn trading_days(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| self.is_trading_day(*d))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn weekends_are_closed() {
        let cal = TradingCalendar::new(Exchange::Nse, []);
        assert!(!cal.is_trading_day(d(2025, 2, 1))); // Saturday
        assert!(!cal.is_trading_day(d(2025, 2, 2))); // Sunday
        assert!(cal.is_trading_day(d(2025, 2, 3))); // Monday
    }

    #[test]
    fn holidays_differ_per_exchange() {
        let nse = TradingCalendar::builtin(Exchange::Nse);
        let bse = TradingCalendar::builtin(Exchange::Bse);
        // Maharashtra Day 2025 (Thursday) is a BSE-only holiday in the built-in lists.
        let may_day = d(2025, 5, 1);
        assert!(nse.is_trading_day(may_day));
        assert!(!bse.is_trading_day(may_day));
        // Shared holidays close both.
        assert!(!nse.is_trading_day(d(2025, 3, 21)));
        assert!(!bse.is_trading_day(d(2025, 3, 21)));
    }

    #[test]
    fn from_keys_rejects_bad_entries() {
        assert!(TradingCalendar::from_keys(Exchange::Bse, &["26012025", "bogus"]).is_err());
    }

    #[test]
    fn trading_days_skips_weekends_and_holidays() {
        let cal = TradingCalendar::builtin(Exchange::Nse);
        // Week of 24 Feb 2025: Monday is a holiday.
        let days = cal.trading_days(d(2025, 2, 22), d(2025, 3, 2));
        assert_eq!(
            days,
            vec![d(2025, 2, 25), d(2025, 2, 26), d(2025, 2, 27), d(2025, 2, 28)]
        );
    }
}
