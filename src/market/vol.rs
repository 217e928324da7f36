//! Volatility models: flat, piecewise-constant term structure, and
//! Heston-style local-stochastic variance parameters.

/// CIR variance-process parameters for the local-stochastic vol model.
///
/// Discretized with Andersen's quadratic-exponential scheme by the path
/// generator; the switching threshold lives there as a fixed constant.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LsvParams {
    /// Initial variance.
    pub v0: f64,
    /// Long-run variance.
    pub theta: f64,
    /// Mean-reversion speed.
    pub kappa: f64,
    /// Vol-of-vol.
    pub xi: f64,
    /// Spot-variance correlation.
    pub rho: f64,
}

impl LsvParams {
    pub fn validate(&self) -> Result<(), String> {
        if !self.v0.is_finite() || self.v0 <= 0.0 {
            return Err("lsv v0 must be finite and > 0".to_string());
        }
        if !self.theta.is_finite() || self.theta < 0.0 {
            return Err("lsv theta must be finite and >= 0".to_string());
        }
        if !self.kappa.is_finite() || self.kappa <= 0.0 {
            return Err("lsv kappa must be finite and > 0".to_string());
        }
        if !self.xi.is_finite() || self.xi < 0.0 {
            return Err("lsv xi must be finite and >= 0".to_string());
        }
        if !self.rho.is_finite() || self.rho <= -1.0 || self.rho >= 1.0 {
            return Err("lsv rho must be in (-1, 1)".to_string());
        }
        Ok(())
    }
}

/// Per-underlying volatility model, compiled to year-fraction space.
#[derive(Debug, Clone, PartialEq)]
pub enum VolModel {
    Flat {
        vol: f64,
    },
    /// `(time, vol)` pillars, strictly increasing in time. A lookup at `t`
    /// returns the first pillar with `t <= pillar_time`, or the last
    /// pillar's vol beyond the final tenor.
    Piecewise {
        pillars: Vec<(f64, f64)>,
    },
    LocalStochastic {
        params: LsvParams,
    },
}

impl VolModel {
    /// Builds a piecewise term structure, sorting and validating pillars.
    pub fn piecewise(mut pillars: Vec<(f64, f64)>) -> Result<Self, String> {
        if pillars.is_empty() {
            return Err("piecewise vol requires at least one pillar".to_string());
        }
        pillars.sort_by(|a, b| a.0.total_cmp(&b.0));
        if pillars.windows(2).any(|w| w[1].0 <= w[0].0) {
            return Err("piecewise vol pillar times must be strictly increasing".to_string());
        }
        let model = Self::Piecewise { pillars };
        model.validate()?;
        Ok(model)
    }

    /// Deterministic volatility at time `t` (plateau lookup). LSV assets
    /// report `sqrt(v0)`; their actual step vol comes from the simulated
    /// variance.
    pub fn vol_at(&self, t: f64) -> f64 {
        match self {
            Self::Flat { vol } => *vol,
            Self::Piecewise { pillars } => {
                for &(pillar_t, vol) in pillars {
                    if t <= pillar_t {
                        return vol;
                    }
                }
                pillars.last().map_or(0.0, |&(_, vol)| vol)
            }
            Self::LocalStochastic { params } => params.v0.sqrt(),
        }
    }

    #[inline]
    pub fn is_stochastic(&self) -> bool {
        matches!(self, Self::LocalStochastic { .. })
    }

    #[inline]
    pub fn lsv_params(&self) -> Option<&LsvParams> {
        match self {
            Self::LocalStochastic { params } => Some(params),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Flat { vol } => {
                if !vol.is_finite() || *vol < 0.0 {
                    return Err("flat vol must be finite and >= 0".to_string());
                }
            }
            Self::Piecewise { pillars } => {
                if pillars.is_empty() {
                    return Err("piecewise vol requires at least one pillar".to_string());
                }
                for &(t, vol) in pillars {
                    if !t.is_finite() || !vol.is_finite() || vol <= 0.0 {
                        return Err("piecewise vol pillars must be finite with vol > 0".to_string());
                    }
                }
            }
            Self::LocalStochastic { params } => params.validate()?,
        }
        Ok(())
    }
}
