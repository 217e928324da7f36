//! Business-day calendars and date adjustment.

use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Business-day adjustment rule.
///
/// Let `d` be an unadjusted date:
///
/// - `Following`: first business day `>= d`
/// - `ModifiedFollowing`: following unless the month changes, then preceding
/// - `Preceding`: last business day `<= d`
/// - `Unadjusted`: leave `d` unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessDayConvention {
    Following,
    ModifiedFollowing,
    Preceding,
    Unadjusted,
}

impl Default for BusinessDayConvention {
    fn default() -> Self {
        Self::ModifiedFollowing
    }
}

/// Weekend-aware calendar with an explicit holiday set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Calendar {
    holidays: BTreeSet<NaiveDate>,
}

impl Calendar {
    /// Weekend-only calendar (Saturday/Sunday closed, no holidays).
    pub fn weekends_only() -> Self {
        Self::default()
    }

    /// Calendar preloaded with holidays.
    pub fn with_holidays<I>(holidays: I) -> Self
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    pub fn add_holiday(&mut self, holiday: NaiveDate) {
        self.holidays.insert(holiday);
    }

    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// First business day on or after `date`.
    pub fn next_business_day(&self, date: NaiveDate) -> NaiveDate {
        let mut current = date;
        while !self.is_business_day(current) {
            current += Duration::days(1);
        }
        current
    }

    /// Last business day on or before `date`.
    pub fn prev_business_day(&self, date: NaiveDate) -> NaiveDate {
        let mut current = date;
        while !self.is_business_day(current) {
            current -= Duration::days(1);
        }
        current
    }

    /// Steps `days` business days from `date` (negative steps backwards).
    pub fn add_business_days(&self, date: NaiveDate, days: i32) -> NaiveDate {
        if days == 0 {
            return date;
        }
        let step = if days > 0 { 1 } else { -1 };
        let mut remaining = days.unsigned_abs();
        let mut current = date;
        while remaining > 0 {
            current += Duration::days(step);
            if self.is_business_day(current) {
                remaining -= 1;
            }
        }
        current
    }

    /// Business days in `(start, end]`.
    pub fn business_days_between(&self, start: NaiveDate, end: NaiveDate) -> u32 {
        if end <= start {
            return 0;
        }
        let mut count = 0;
        let mut current = start + Duration::days(1);
        while current <= end {
            if self.is_business_day(current) {
                count += 1;
            }
            current += Duration::days(1);
        }
        count
    }

    /// Adjusts `date` per the business-day convention.
    pub fn adjust(&self, date: NaiveDate, convention: BusinessDayConvention) -> NaiveDate {
        match convention {
            BusinessDayConvention::Unadjusted => date,
            BusinessDayConvention::Following => self.next_business_day(date),
            BusinessDayConvention::Preceding => self.prev_business_day(date),
            BusinessDayConvention::ModifiedFollowing => {
                let adjusted = self.next_business_day(date);
                if adjusted.month() != date.month() {
                    self.prev_business_day(date)
                } else {
                    adjusted
                }
            }
        }
    }
}
