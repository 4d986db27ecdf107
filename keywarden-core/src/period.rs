//! Calendar interval arithmetic for license validity windows.
//!
//! End dates are start dates advanced by the license period using calendar
//! arithmetic with day-of-month clamping: Jan 31 + 1 month lands on the
//! last day of February, never overflows into March. Deployed records were
//! computed with exactly this rule, so it must not change.

use crate::device::LicenseType;
use chrono::{Datelike, NaiveDate};

/// Computes the license end date for a start date, or `None` for lifetime.
#[must_use]
pub fn end_date_for(license_type: LicenseType, start: NaiveDate) -> Option<NaiveDate> {
    let (months, years) = license_type.period()?;
    Some(add_period(start, months, years))
}

/// Advances a date by whole months/years, carrying month overflow into the
/// year and clamping the day to the target month's last valid day.
fn add_period(start: NaiveDate, months: u32, years: u32) -> NaiveDate {
    let mut year = start.year() + years as i32;
    let mut month = start.month() + months;
    while month > 12 {
        month -= 12;
        year += 1;
    }

    let day = start.day().min(days_in_month(year, month));
    // year/month are in range and day is clamped, so this cannot fail
    NaiveDate::from_ymd_opt(year, month, day).expect("clamped date is valid")
}

/// Number of days in the given month, leap years included.
fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .expect("first of month is valid")
        .pred_opt()
        .expect("first of month has a predecessor")
        .day()
}
