//! Discount curves evaluated in year-fraction space.
//!
//! The term sheet carries curves in date space; [`DiscountCurve`] is the
//! compiled form the engine consumes, with tenors already mapped through the
//! curve's day-count convention. Piecewise curves integrate the rate over
//! each constant segment.

use crate::core::PricingError;

/// Flat or piecewise-constant continuously compounded discount curve.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscountCurve {
    Flat {
        rate: f64,
    },
    /// `(time, rate)` pillars, strictly increasing in time. Pillar `i`'s
    /// rate applies on `[t_i, t_{i+1})`; the first rate extends back to
    /// valuation and the last extends to infinity.
    Piecewise {
        pillars: Vec<(f64, f64)>,
    },
}

impl DiscountCurve {
    pub fn flat(rate: f64) -> Self {
        Self::Flat { rate }
    }

    /// Builds a piecewise curve, validating pillar ordering.
    pub fn piecewise(pillars: Vec<(f64, f64)>) -> Result<Self, PricingError> {
        if pillars.is_empty() {
            return Err(PricingError::InvalidSchema(
                "piecewise discount curve requires at least one pillar".to_string(),
            ));
        }
        if pillars.iter().any(|(t, r)| !t.is_finite() || !r.is_finite()) {
            return Err(PricingError::InvalidSchema(
                "discount curve pillars must be finite".to_string(),
            ));
        }
        if pillars.windows(2).any(|w| w[1].0 <= w[0].0) {
            return Err(PricingError::InvalidSchema(
                "discount curve pillar times must be strictly increasing".to_string(),
            ));
        }
        Ok(Self::Piecewise { pillars })
    }

    /// Instantaneous rate applicable at time `t`.
    pub fn rate_at(&self, t: f64) -> f64 {
        match self {
            Self::Flat { rate } => *rate,
            Self::Piecewise { pillars } => {
                for window in pillars.windows(2) {
                    if t < window[1].0 {
                        return window[0].1;
                    }
                }
                match pillars.as_slice() {
                    [] => 0.0,
                    [only] => only.1,
                    [.., last] => last.1,
                }
            }
        }
    }

    /// Discount factor from valuation (`t = 0`) to `t`.
    pub fn discount_factor(&self, t: f64) -> f64 {
        if t <= 0.0 {
            return 1.0;
        }
        match self {
            Self::Flat { rate } => (-rate * t).exp(),
            Self::Piecewise { pillars } => {
                let mut log_df = 0.0;
                let mut prev_t = 0.0;
                for &(pillar_t, _) in pillars {
                    if pillar_t >= t {
                        break;
                    }
                    if pillar_t > prev_t {
                        log_df += self.rate_at(prev_t) * (pillar_t - prev_t);
                        prev_t = pillar_t;
                    }
                }
                log_df += self.rate_at(prev_t) * (t - prev_t);
                (-log_df).exp()
            }
        }
    }

    /// Continuously compounded forward rate over `(t0, t1)`, used as the
    /// drift rate of each simulation step.
    pub fn forward_rate(&self, t0: f64, t1: f64) -> f64 {
        if t1 <= t0 {
            return self.rate_at(t0);
        }
        let df0 = self.discount_factor(t0);
        let df1 = self.discount_factor(t1);
        (df0 / df1).ln() / (t1 - t0)
    }

}
