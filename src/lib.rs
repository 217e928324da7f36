//! FerricNote prices worst-of autocallable structured notes by Monte Carlo
//! and computes first-order Greeks by bump-and-reprice under Common Random
//! Numbers.
//!
//! A single declarative term sheet (JSON) plus a run configuration produce a
//! present value with standard error, a coupon/redemption decomposition, an
//! expected cashflow table, and optionally per-underlying deltas and vegas
//! plus a parallel rho.
//!
//! The pricing core is pure and deterministic: for a fixed
//! `(seed, paths, block_size, antithetic)` the PV is bit-identical across
//! runs, block sizes, and worker counts. Every random draw is keyed by
//! `(seed, path, step, channel)`, which is also what keeps base and bumped
//! repricings on common random numbers.
//!
//! References used across modules:
//! - Glasserman (2004) for Monte Carlo estimators and correlated paths.
//! - Andersen (2008) for the quadratic-exponential variance scheme.
//! - Higham (2002) for nearest-correlation repair.
//!
//! # Feature Flags
//! - `parallel` (default): Rayon-powered block and bump parallelism.
//!
//! # Quick Start
//! ```rust
//! use ferricnote::engines::{price, RunConfig};
//! use ferricnote::instruments::TermSheet;
//!
//! let json = r#"{
//!     "meta": {"product_id": "AC001", "currency": "USD", "notional": 1000000,
//!              "valuation_date": "2024-01-02", "maturity_date": "2025-01-02",
//!              "maturity_payment_date": "2025-01-09"},
//!     "underlyings": [{"id": "X", "spot": 100,
//!         "dividend_model": {"type": "continuous", "continuous_yield": 0.02},
//!         "vol_model": {"type": "flat", "flat_vol": 0.25}}],
//!     "discount_curve": {"flat_rate": 0.04},
//!     "schedules": {
//!         "observation_dates": ["2024-07-02", "2025-01-02"],
//!         "payment_dates": ["2024-07-09", "2025-01-09"],
//!         "autocall_levels": [1.0, 1.0],
//!         "coupon_barriers": [0.7, 0.7],
//!         "coupon_rates": [0.02, 0.02]},
//!     "ki_barrier": {"level": 0.6, "monitoring": "continuous"}
//! }"#;
//!
//! let term_sheet = TermSheet::from_json(json).expect("valid term sheet");
//! let result = price(&term_sheet, &RunConfig::new(2_000, 42)).expect("pricing succeeds");
//! assert!(result.summary.pv > 0.0);
//! assert!(result.summary.autocall_probability > 0.0);
//! ```
//!
//! Greeks with Common Random Numbers:
//! ```rust
//! use ferricnote::engines::RunConfig;
//! use ferricnote::instruments::TermSheet;
//! use ferricnote::risk::{risk, BumpConfig};
//!
//! # let json = r#"{
//! #     "meta": {"product_id": "AC001", "notional": 1000000,
//! #              "valuation_date": "2024-01-02", "maturity_date": "2025-01-02",
//! #              "maturity_payment_date": "2025-01-09"},
//! #     "underlyings": [{"id": "X", "spot": 100,
//! #         "dividend_model": {"type": "continuous", "continuous_yield": 0.02},
//! #         "vol_model": {"type": "flat", "flat_vol": 0.25}}],
//! #     "discount_curve": {"flat_rate": 0.04},
//! #     "schedules": {
//! #         "observation_dates": ["2024-07-02", "2025-01-02"],
//! #         "payment_dates": ["2024-07-09", "2025-01-09"],
//! #         "autocall_levels": [1.0, 1.0],
//! #         "coupon_barriers": [0.7, 0.7],
//! #         "coupon_rates": [0.02, 0.02]},
//! #     "ki_barrier": {"level": 0.6, "monitoring": "continuous"}
//! # }"#;
//! let term_sheet = TermSheet::from_json(json).expect("valid term sheet");
//! let result = risk(&term_sheet, &RunConfig::new(2_000, 42), &BumpConfig::default())
//!     .expect("risk succeeds");
//! assert!(result.greeks.delta.contains_key("X"));
//! ```

pub mod core;
pub mod engines;
pub mod instruments;
pub mod market;
pub mod math;
pub mod rates;
pub mod reporting;
pub mod risk;

/// Common imports for ergonomic usage.
pub mod prelude {
    pub use crate::core::{CancelToken, PricingError, Warning};
    pub use crate::engines::{price, price_cancellable, RunConfig};
    pub use crate::instruments::TermSheet;
    pub use crate::reporting::{PriceResult, PricingSummary};
    pub use crate::risk::{risk, BumpConfig, Differencing, RiskResult};
}
