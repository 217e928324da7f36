//! Term-sheet data model: wire format, validation, and compiled form.

pub mod prepared;
pub mod term_sheet;

pub use prepared::{KiBarrier, PreparedAsset, PreparedNote, ScheduleEntry};
pub use term_sheet::{
    BarrierMonitoring, CorrelationSpec, DiscountCurveSpec, DiscreteDividendSpec,
    DividendModelSpec, KiBarrierSpec, KiRedemption, LsvParamsSpec, Meta, PayoffSpec,
    RateTenorSpec, SchedulesSpec, Settlement, TermSheet, UnderlyingSpec, VolModelSpec,
    VolTenorSpec,
};
