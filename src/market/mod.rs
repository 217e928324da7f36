//! Market-data models attached to each underlying.

pub mod dividends;
pub mod vol;

pub use dividends::{DividendEvent, DividendModel};
pub use vol::{LsvParams, VolModel};
