//! Library-wide error taxonomy, warnings, and run diagnostics.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Errors surfaced by validation, simulation, and the risk driver.
///
/// Input problems (`InvalidSchema`, `InvalidDate`) are raised before any
/// simulation starts; `NumericFailure` aborts a run rather than letting a
/// NaN propagate into the reported PV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    /// Required fields missing, array-length mismatch, or a correlation
    /// matrix that stays non-PSD beyond repair tolerance.
    InvalidSchema(String),
    /// Unparseable or out-of-order dates; an observation before valuation.
    InvalidDate(String),
    /// Non-finite value produced by a path, or a degenerate divisor in the
    /// Brownian-bridge formula.
    NumericFailure(String),
    /// Block scratch would exceed the caller-supplied memory ceiling.
    ResourceExceeded(String),
    /// The caller cancelled between blocks; no partial results.
    Cancelled,
}

impl std::fmt::Display for PricingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSchema(msg) => write!(f, "invalid schema: {msg}"),
            Self::InvalidDate(msg) => write!(f, "invalid date: {msg}"),
            Self::NumericFailure(msg) => write!(f, "numeric failure: {msg}"),
            Self::ResourceExceeded(msg) => write!(f, "resource exceeded: {msg}"),
            Self::Cancelled => write!(f, "run cancelled"),
        }
    }
}

impl std::error::Error for PricingError {}

/// Non-fatal conditions attached to a result. Warnings never raise.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// The correlation matrix was projected to the nearest correlation
    /// matrix before factorization.
    CorrelationRepaired {
        /// Smallest eigenvalue found before clipping.
        min_eigenvalue: f64,
    },
    /// One or more discrete dividends exceeded the prevailing spot and were
    /// capped; the affected paths are counted in `degenerate_paths`.
    DividendCapped { paths: u64 },
}

/// Cooperative cancellation token polled between simulation blocks.
///
/// Cloning shares the underlying flag. Cancellation mid-block is not
/// observed; a cancelled run returns [`PricingError::Cancelled`] with no
/// partial results.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_kind_and_message() {
        let err = PricingError::InvalidSchema("autocall_levels length 3 != 4".to_string());
        assert_eq!(
            err.to_string(),
            "invalid schema: autocall_levels length 3 != 4"
        );
        assert_eq!(PricingError::Cancelled.to_string(), "run cancelled");
    }

    #[test]
    fn cancel_token_is_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
