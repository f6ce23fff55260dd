//! Domain types shared by every source.

pub mod calendar;
pub mod date_key;
pub mod record;

pub use calendar::{Exchange, TradingCalendar, BSE_HOLIDAYS, NSE_HOLIDAYS};
pub use date_key::{DateKey, DateKeyError};
pub use record::MetricRecord;
