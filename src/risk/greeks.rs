//! Bump-and-reprice Greeks under Common Random Numbers.
//!
//! Every bumped repricing reuses the base run's seed, path count, block
//! size, and antithetic pairing; the stream keying in `math::fast_rng`
//! guarantees the bumped run consumes exactly the same draws. Bumps are
//! applied to the declarative term sheet and recompiled, so derived
//! quantities (absolute barrier levels, drifts) move consistently with the
//! bumped input.

use std::collections::BTreeMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::core::PricingError;
use crate::engines::{price, RunConfig};
use crate::instruments::{TermSheet, VolModelSpec};
use crate::reporting::PriceResult;

/// Finite-difference scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Differencing {
    Central,
    Forward,
}

/// Bump sizes and Greek selection.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BumpConfig {
    /// Relative spot bump for delta (0.01 = 1%).
    pub spot_bump: f64,
    /// Absolute vol bump for vega (0.01 = one vol point).
    pub vol_bump: f64,
    /// Absolute parallel rate bump for rho (0.0001 = 1bp).
    pub rate_bump: f64,
    pub include_rho: bool,
    pub differencing: Differencing,
}

impl Default for BumpConfig {
    fn default() -> Self {
        Self {
            spot_bump: 0.01,
            vol_bump: 0.01,
            rate_bump: 0.0001,
            include_rho: false,
            differencing: Differencing::Central,
        }
    }
}

impl BumpConfig {
    fn validate(&self) -> Result<(), PricingError> {
        for (name, bump) in [
            ("spot_bump", self.spot_bump),
            ("vol_bump", self.vol_bump),
            ("rate_bump", self.rate_bump),
        ] {
            if !bump.is_finite() || bump <= 0.0 {
                return Err(PricingError::InvalidSchema(format!(
                    "bump config {name} must be finite and > 0"
                )));
            }
        }
        if self.spot_bump >= 1.0 {
            return Err(PricingError::InvalidSchema(
                "spot_bump must be below 100%".to_string(),
            ));
        }
        Ok(())
    }
}

/// First-order sensitivities.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Greeks {
    /// dPV/dS per underlying.
    pub delta: BTreeMap<String, f64>,
    /// Delta expressed as percent of notional for a 100% spot move.
    pub delta_pct: BTreeMap<String, f64>,
    /// dPV/dVol per underlying (per unit vol, i.e. 1.00 = 100 points).
    pub vega: BTreeMap<String, f64>,
    /// dPV/dRate for a parallel curve shift; `None` unless requested.
    pub rho: Option<f64>,
}

/// Pricing result plus Greeks.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RiskResult {
    #[serde(flatten)]
    pub price: PriceResult,
    pub greeks: Greeks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BumpTarget {
    Spot(usize),
    Vol(usize),
    Rate,
}

/// Computes price and Greeks for a term sheet.
pub fn risk(
    term_sheet: &TermSheet,
    run_config: &RunConfig,
    bump_config: &BumpConfig,
) -> Result<RiskResult, PricingError> {
    bump_config.validate()?;
    let base = price(term_sheet, run_config)?;
    let base_pv = base.summary.pv;

    let n_assets = term_sheet.underlyings.len();
    let central = bump_config.differencing == Differencing::Central;

    // One job per bumped repricing; 1 + 2*n_assets + 1 at most per side.
    let mut jobs: Vec<(BumpTarget, f64, TermSheet)> = Vec::new();
    for asset in 0..n_assets {
        jobs.push((
            BumpTarget::Spot(asset),
            1.0,
            bump_spot(term_sheet, asset, bump_config.spot_bump),
        ));
        if central {
            jobs.push((
                BumpTarget::Spot(asset),
                -1.0,
                bump_spot(term_sheet, asset, -bump_config.spot_bump),
            ));
        }
        jobs.push((
            BumpTarget::Vol(asset),
            1.0,
            bump_vol(term_sheet, asset, bump_config.vol_bump),
        ));
        if central {
            jobs.push((
                BumpTarget::Vol(asset),
                -1.0,
                bump_vol(term_sheet, asset, -bump_config.vol_bump),
            ));
        }
    }
    if bump_config.include_rho {
        jobs.push((
            BumpTarget::Rate,
            1.0,
            bump_rate(term_sheet, bump_config.rate_bump),
        ));
        if central {
            jobs.push((
                BumpTarget::Rate,
                -1.0,
                bump_rate(term_sheet, -bump_config.rate_bump),
            ));
        }
    }

    // Reprice every bump with the base run configuration (CRN).
    let reprice = |job: &(BumpTarget, f64, TermSheet)| -> Result<
        (BumpTarget, f64, f64),
        PricingError,
    > {
        let result = price(&job.2, run_config)?;
        Ok((job.0, job.1, result.summary.pv))
    };

    #[cfg(feature = "parallel")]
    let priced: Vec<(BumpTarget, f64, f64)> =
        jobs.par_iter().map(reprice).collect::<Result<_, _>>()?;

    #[cfg(not(feature = "parallel"))]
    let priced: Vec<(BumpTarget, f64, f64)> =
        jobs.iter().map(reprice).collect::<Result<_, _>>()?;

    let pv_for = |target: BumpTarget, direction: f64| -> f64 {
        priced
            .iter()
            .find(|(t, d, _)| *t == target && *d == direction)
            .map(|(_, _, pv)| *pv)
            .unwrap_or(base_pv)
    };

    let mut delta = BTreeMap::new();
    let mut delta_pct = BTreeMap::new();
    let mut vega = BTreeMap::new();
    let notional = term_sheet.meta.notional;

    for (asset, underlying) in term_sheet.underlyings.iter().enumerate() {
        let spot0 = underlying.spot;
        let up = pv_for(BumpTarget::Spot(asset), 1.0);
        let asset_delta = if central {
            let down = pv_for(BumpTarget::Spot(asset), -1.0);
            (up - down) / (2.0 * bump_config.spot_bump * spot0)
        } else {
            (up - base_pv) / (bump_config.spot_bump * spot0)
        };
        delta.insert(underlying.id.clone(), asset_delta);
        delta_pct.insert(
            underlying.id.clone(),
            asset_delta * spot0 / notional * 100.0,
        );

        let vol_up = pv_for(BumpTarget::Vol(asset), 1.0);
        let asset_vega = if central {
            let vol_down = pv_for(BumpTarget::Vol(asset), -1.0);
            (vol_up - vol_down) / (2.0 * bump_config.vol_bump)
        } else {
            (vol_up - base_pv) / bump_config.vol_bump
        };
        vega.insert(underlying.id.clone(), asset_vega);
    }

    let rho = bump_config.include_rho.then(|| {
        let up = pv_for(BumpTarget::Rate, 1.0);
        if central {
            let down = pv_for(BumpTarget::Rate, -1.0);
            (up - down) / (2.0 * bump_config.rate_bump)
        } else {
            (up - base_pv) / bump_config.rate_bump
        }
    });

    Ok(RiskResult {
        price: base,
        greeks: Greeks {
            delta,
            delta_pct,
            vega,
            rho,
        },
    })
}

fn bump_spot(term_sheet: &TermSheet, asset: usize, relative: f64) -> TermSheet {
    let mut bumped = term_sheet.clone();
    let spot = &mut bumped.underlyings[asset].spot;
    *spot = (*spot * (1.0 + relative)).max(1.0e-8);
    bumped
}

fn bump_vol(term_sheet: &TermSheet, asset: usize, absolute: f64) -> TermSheet {
    let mut bumped = term_sheet.clone();
    match &mut bumped.underlyings[asset].vol_model {
        VolModelSpec::Flat { flat_vol } => {
            *flat_vol = (*flat_vol + absolute).max(1.0e-6);
        }
        VolModelSpec::PiecewiseConstant { term_structure } => {
            for tenor in term_structure {
                tenor.vol = (tenor.vol + absolute).max(1.0e-6);
            }
        }
        VolModelSpec::LocalStochastic { lsv_params } => {
            // Bump the root of the initial variance: (sqrt(v0)+eps)^2.
            let bumped_vol = (lsv_params.v0.sqrt() + absolute).max(1.0e-6);
            lsv_params.v0 = bumped_vol * bumped_vol;
        }
    }
    bumped
}

fn bump_rate(term_sheet: &TermSheet, absolute: f64) -> TermSheet {
    let mut bumped = term_sheet.clone();
    if let Some(rate) = &mut bumped.discount_curve.flat_rate {
        *rate += absolute;
    }
    if let Some(tenors) = &mut bumped.discount_curve.tenors {
        for tenor in tenors {
            tenor.rate += absolute;
        }
    }
    bumped
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn sheet() -> TermSheet {
        let json = r#"{
            "meta": {"product_id": "RISK1", "notional": 1000000,
                     "valuation_date": "2024-01-02", "maturity_date": "2025-01-02",
                     "maturity_payment_date": "2025-01-09"},
            "underlyings": [{"id": "X", "spot": 100,
                "dividend_model": {"type": "continuous", "continuous_yield": 0.01},
                "vol_model": {"type": "flat", "flat_vol": 0.2}}],
            "discount_curve": {"flat_rate": 0.03},
            "schedules": {
                "observation_dates": ["2024-07-02", "2025-01-02"],
                "payment_dates": ["2024-07-09", "2025-01-09"],
                "autocall_levels": [1.0, 1.0],
                "coupon_barriers": [0.7, 0.7],
                "coupon_rates": [0.02, 0.02]},
            "ki_barrier": {"level": 0.6, "monitoring": "continuous"}
        }"#;
        TermSheet::from_json(json).unwrap()
    }

    #[test]
    fn risk_reports_per_asset_delta_and_vega() {
        let config = RunConfig::new(4_000, 3).with_block_size(1_000);
        let result = risk(&sheet(), &config, &BumpConfig::default()).unwrap();
        assert!(result.greeks.delta.contains_key("X"));
        assert!(result.greeks.vega.contains_key("X"));
        assert!(result.greeks.rho.is_none());
        assert!(result.greeks.delta["X"].is_finite());
    }

    #[test]
    fn rho_is_present_when_requested() {
        let config = RunConfig::new(2_000, 3).with_block_size(500);
        let bumps = BumpConfig {
            include_rho: true,
            ..BumpConfig::default()
        };
        let result = risk(&sheet(), &config, &bumps).unwrap();
        let rho = result.greeks.rho.expect("rho requested");
        // Discount-only sensitivity of a long note is negative in rates.
        assert!(rho < 0.0, "rho = {rho}");
    }

    #[test]
    fn crn_makes_repeated_risk_runs_identical() {
        let config = RunConfig::new(2_000, 11).with_block_size(250);
        let a = risk(&sheet(), &config, &BumpConfig::default()).unwrap();
        let b = risk(&sheet(), &config, &BumpConfig::default()).unwrap();
        assert_eq!(a.greeks.delta["X"].to_bits(), b.greeks.delta["X"].to_bits());
        assert_eq!(a.greeks.vega["X"].to_bits(), b.greeks.vega["X"].to_bits());
    }

    #[test]
    fn forward_differencing_uses_base_pv() {
        let config = RunConfig::new(2_000, 11).with_block_size(500);
        let bumps = BumpConfig {
            differencing: Differencing::Forward,
            ..BumpConfig::default()
        };
        let result = risk(&sheet(), &config, &bumps).unwrap();
        assert!(result.greeks.delta["X"].is_finite());
    }

    #[test]
    fn lsv_vol_bump_moves_root_variance() {
        let mut ts = sheet();
        ts.underlyings[0].vol_model = VolModelSpec::LocalStochastic {
            lsv_params: crate::instruments::LsvParamsSpec {
                v0: 0.04,
                theta: 0.04,
                kappa: 1.5,
                xi: 0.5,
                rho: -0.6,
            },
        };
        let bumped = bump_vol(&ts, 0, 0.01);
        let VolModelSpec::LocalStochastic { lsv_params } = &bumped.underlyings[0].vol_model
        else {
            panic!("vol model variant changed");
        };
        assert_relative_eq!(lsv_params.v0, 0.21_f64 * 0.21, epsilon = 1e-12);
    }

    #[test]
    fn invalid_bumps_are_rejected() {
        let config = RunConfig::new(100, 1).with_block_size(100);
        let bumps = BumpConfig {
            spot_bump: 0.0,
            ..BumpConfig::default()
        };
        assert!(risk(&sheet(), &config, &bumps).is_err());
    }
}
