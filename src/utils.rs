use crate::error::{ReconciliationError, Result};
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};

pub fn validate_fiscal_year_end_month(month: u32) -> Result<()> {
    if !(1..=12).contains(&month) {
        return Err(ReconciliationError::InvalidFiscalYearEndMonth(month));
    }
    Ok(())
}

/// Signed number of whole days from `from` to `to`.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

pub fn add_days(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX)
}

pub fn sub_days(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN)
}

/// Prices and share counts are only meaningful when finite and strictly positive.
pub fn is_positive_finite(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Never later than `today`.
pub fn clamp_to_today(date: NaiveDate, today: NaiveDate) -> NaiveDate {
    date.min(today)
}

/// Parses an upstream period label into a naive timestamp.
///
/// Accepts plain dates, `YYYY-MM-DD HH:MM:SS`, RFC 3339 and `YYYY-MM-DD HH:MM:SS±HH:MM`.
/// A UTC offset is dropped, keeping the wall-clock value the source printed.
pub fn parse_period_label(label: &str) -> Result<NaiveDateTime> {
    let label = label.trim();

    if let Ok(date) = NaiveDate::parse_from_str(label, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(label) {
        return Ok(dt.naive_local());
    }

    if let Ok(dt) = DateTime::parse_from_str(label, "%Y-%m-%d %H:%M:%S%:z") {
        return Ok(dt.naive_local());
    }

    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(label, fmt) {
            return Ok(dt);
        }
    }

    Err(ReconciliationError::DateError(format!(
        "Invalid period label: '{}'. Expected YYYY-MM-DD with optional time and offset",
        label
    )))
}
