//! Day-count conventions for accrual and discounting.
//!
//! The term sheet admits ACT/365F (default), ACT/360, and 30/360 US.

use chrono::{Datelike, NaiveDate};

/// Supported day-count conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DayCountConvention {
    /// Actual day count over a 360-day year.
    #[serde(rename = "ACT/360")]
    Act360,
    /// Actual day count over a 365-day year.
    #[serde(rename = "ACT/365F")]
    Act365Fixed,
    /// 30/360 US (bond basis).
    #[serde(rename = "30/360")]
    Thirty360,
}

impl Default for DayCountConvention {
    fn default() -> Self {
        Self::Act365Fixed
    }
}

/// Computes the year fraction between two dates under a convention.
///
/// If `start > end`, returns the negative of the reversed interval.
///
/// # Examples
/// ```
/// use chrono::NaiveDate;
/// use ferricnote::rates::{year_fraction, DayCountConvention};
///
/// let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
/// let end = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
/// let yf = year_fraction(start, end, DayCountConvention::Act365Fixed);
/// assert!((yf - 366.0 / 365.0).abs() < 1e-12);
/// ```
pub fn year_fraction(start: NaiveDate, end: NaiveDate, convention: DayCountConvention) -> f64 {
    if start == end {
        return 0.0;
    }
    if start > end {
        return -year_fraction(end, start, convention);
    }

    match convention {
        DayCountConvention::Act360 => (end - start).num_days() as f64 / 360.0,
        DayCountConvention::Act365Fixed => (end - start).num_days() as f64 / 365.0,
        DayCountConvention::Thirty360 => year_fraction_thirty_360(start, end),
    }
}

fn year_fraction_thirty_360(start: NaiveDate, end: NaiveDate) -> f64 {
    let y1 = start.year();
    let m1 = start.month() as i32;
    let mut d1 = start.day() as i32;
    let y2 = end.year();
    let m2 = end.month() as i32;
    let mut d2 = end.day() as i32;

    if d1 == 31 {
        d1 = 30;
    }
    if d2 == 31 && d1 >= 30 {
        d2 = 30;
    }

    let days = 360 * (y2 - y1) + 30 * (m2 - m1) + (d2 - d1);
    days as f64 / 360.0
}
