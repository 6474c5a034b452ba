//! Month-granularity date helpers.
//!
//! All billing is done in whole calendar months: subscription starts are the
//! first day of a month, ends are the last day of a month, and open-ended
//! subscriptions are `None` everywhere except the storage layer.

use crate::error::{AppError, AppResult};
use chrono::{Datelike, Months, NaiveDate};

/// Far-future end date written to the database for open-ended subscriptions.
pub fn open_end_sentinel() -> NaiveDate {
    NaiveDate::from_ymd_opt(2099, 12, 31).unwrap_or(NaiveDate::MAX)
}

/// Translate an optional end date into the column value.
pub fn to_storage_end(end: Option<NaiveDate>) -> NaiveDate {
    end.unwrap_or_else(open_end_sentinel)
}

/// Translate a column value back into an optional end date.
pub fn from_storage_end(stored: NaiveDate) -> Option<NaiveDate> {
    if stored >= open_end_sentinel() {
        None
    } else {
        Some(stored)
    }
}

pub fn month_start(d: NaiveDate) -> NaiveDate {
    d.with_day(1).unwrap_or(d)
}

pub fn next_month_start(d: NaiveDate) -> NaiveDate {
    month_start(d)
        .checked_add_months(Months::new(1))
        .unwrap_or(NaiveDate::MAX)
}

pub fn month_end(d: NaiveDate) -> NaiveDate {
    next_month_start(d).pred_opt().unwrap_or(NaiveDate::MAX)
}

pub fn prev_month_end(d: NaiveDate) -> NaiveDate {
    month_start(d).pred_opt().unwrap_or(NaiveDate::MIN)
}

/// Number of calendar months touched by `[a, b]`, counting both ends.
pub fn inclusive_month_count(a: NaiveDate, b: NaiveDate) -> i64 {
    let years = (b.year() - a.year()) as i64;
    let months = b.month() as i64 - a.month() as i64;
    years * 12 + months + 1
}

/// Parse the `MM-YYYY` wire format into the first day of that month.
pub fn parse_month_year(raw: &str) -> AppResult<NaiveDate> {
    let raw = raw.trim();
    let valid_shape = raw.len() == 7
        && raw.as_bytes()[2] == b'-'
        && raw
            .bytes()
            .enumerate()
            .all(|(i, b)| i == 2 || b.is_ascii_digit());
    if !valid_shape {
        return Err(AppError::ValidationError(format!(
            "Invalid month '{raw}', expected MM-YYYY"
        )));
    }
    NaiveDate::parse_from_str(&format!("01-{raw}"), "%d-%m-%Y").map_err(|_| {
        AppError::ValidationError(format!("Invalid month '{raw}', expected MM-YYYY"))
    })
}

pub fn format_month_year(d: NaiveDate) -> String {
    d.format("%m-%Y").to_string()
}

/// Month boundaries derived from a single "today".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingCalendar {
    pub today: NaiveDate,
    pub current_month_start: NaiveDate,
    pub end_of_prev_month: NaiveDate,
    pub end_of_current_month: NaiveDate,
    pub first_next_month: NaiveDate,
}

impl BillingCalendar {
    pub fn for_day(today: NaiveDate) -> Self {
        Self {
            today,
            current_month_start: month_start(today),
            end_of_prev_month: prev_month_end(today),
            end_of_current_month: month_end(today),
            first_next_month: next_month_start(today),
        }
    }

    pub fn today_utc() -> Self {
        Self::for_day(chrono::Utc::now().date_naive())
    }
}
