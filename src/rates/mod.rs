//! Calendars, day-count conventions, and discount curves.

pub mod calendar;
pub mod curve;
pub mod day_count;

pub use calendar::{BusinessDayConvention, Calendar};
pub use curve::DiscountCurve;
pub use day_count::{year_fraction, DayCountConvention};
