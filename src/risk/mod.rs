//! Risk engine: finite-difference Greeks with Common Random Numbers.

pub mod greeks;

pub use greeks::{risk, BumpConfig, Differencing, Greeks, RiskResult};
