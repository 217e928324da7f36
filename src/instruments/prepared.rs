//! Compiled term sheet in year-fraction space.
//!
//! [`PreparedNote`] is what the engines consume: dates mapped to times,
//! dividend and vol models compiled, the correlation matrix assembled from
//! its wire form. Event times use ACT/365F; the discount curve uses its own
//! day-count convention.

use chrono::NaiveDate;

use crate::core::PricingError;
use crate::instruments::term_sheet::{
    parse_date, BarrierMonitoring, CorrelationSpec, DividendModelSpec, KiRedemption, Settlement,
    TermSheet, VolModelSpec,
};
use crate::market::{DividendEvent, DividendModel, LsvParams, VolModel};
use crate::rates::{year_fraction, DayCountConvention, DiscountCurve};

/// One underlying with compiled market models.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedAsset {
    pub id: String,
    pub spot: f64,
    pub dividends: DividendModel,
    pub vol: VolModel,
}

/// One line of the observation schedule with times attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub observation_date: NaiveDate,
    pub payment_date: NaiveDate,
    /// Year fraction from valuation to the observation (ACT/365F).
    pub observation_time: f64,
    /// Year fraction from valuation to the payment (ACT/365F).
    pub payment_time: f64,
    pub autocall_level: f64,
    pub coupon_barrier: f64,
    pub coupon_rate: f64,
}

/// Knock-in barrier in compiled form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KiBarrier {
    /// Fraction of initial spot.
    pub level: f64,
    pub monitoring: BarrierMonitoring,
}

/// Validated, time-space term sheet consumed by grid, paths, and events.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedNote {
    pub product_id: String,
    pub currency: String,
    pub notional: f64,
    pub valuation_date: NaiveDate,
    pub maturity_date: NaiveDate,
    pub maturity_payment_date: NaiveDate,
    pub maturity_time: f64,
    pub maturity_payment_time: f64,
    pub assets: Vec<PreparedAsset>,
    pub curve: DiscountCurve,
    pub correlation: Vec<Vec<f64>>,
    pub schedule: Vec<ScheduleEntry>,
    pub ki_barrier: Option<KiBarrier>,
    pub worst_of: bool,
    pub coupon_memory: bool,
    pub coupon_on_autocall: bool,
    pub settlement: Settlement,
    pub redemption_if_autocall: f64,
    pub redemption_if_no_ki: f64,
    pub redemption_if_ki: KiRedemption,
    pub ki_redemption_floor: f64,
}

/// Day count used for simulation event times.
const EVENT_DAY_COUNT: DayCountConvention = DayCountConvention::Act365Fixed;

impl TermSheet {
    /// Validates and compiles the term sheet into engine form.
    pub fn compile(&self) -> Result<PreparedNote, PricingError> {
        self.validate()?;

        let valuation = parse_date("meta.valuation_date", &self.meta.valuation_date)?;
        let maturity = parse_date("meta.maturity_date", &self.meta.maturity_date)?;
        let maturity_payment =
            parse_date("meta.maturity_payment_date", &self.meta.maturity_payment_date)?;

        let to_event_time = |d: NaiveDate| year_fraction(valuation, d, EVENT_DAY_COUNT);

        let assets = self
            .underlyings
            .iter()
            .map(|u| {
                let dividends = compile_dividends(&u.dividend_model, valuation, maturity)?;
                let vol = compile_vol(&u.vol_model, valuation)?;
                Ok(PreparedAsset {
                    id: u.id.clone(),
                    spot: u.spot,
                    dividends,
                    vol,
                })
            })
            .collect::<Result<Vec<_>, PricingError>>()?;

        let curve = compile_curve(self, valuation)?;
        let correlation = assemble_correlation(self.correlation.as_ref(), &self.underlyings)?;

        let schedule = self
            .schedules
            .observation_dates
            .iter()
            .zip(&self.schedules.payment_dates)
            .enumerate()
            .map(|(i, (obs, pay))| {
                let observation_date = parse_date("schedules.observation_dates", obs)?;
                let payment_date = parse_date("schedules.payment_dates", pay)?;
                Ok(ScheduleEntry {
                    observation_date,
                    payment_date,
                    observation_time: to_event_time(observation_date),
                    payment_time: to_event_time(payment_date),
                    autocall_level: self.schedules.autocall_levels[i],
                    coupon_barrier: self.schedules.coupon_barriers[i],
                    coupon_rate: self.schedules.coupon_rates[i],
                })
            })
            .collect::<Result<Vec<_>, PricingError>>()?;

        let ki_barrier = self.ki_barrier.map(|ki| KiBarrier {
            level: ki.level,
            monitoring: ki.monitoring,
        });

        Ok(PreparedNote {
            product_id: self.meta.product_id.clone(),
            currency: self.meta.currency.clone(),
            notional: self.meta.notional,
            valuation_date: valuation,
            maturity_date: maturity,
            maturity_payment_date: maturity_payment,
            maturity_time: to_event_time(maturity),
            maturity_payment_time: to_event_time(maturity_payment),
            assets,
            curve,
            correlation,
            schedule,
            ki_barrier,
            worst_of: self.payoff.worst_of,
            coupon_memory: self.payoff.coupon_memory,
            coupon_on_autocall: self.payoff.coupon_on_autocall,
            settlement: self.payoff.settlement,
            redemption_if_autocall: self.payoff.redemption_if_autocall,
            redemption_if_no_ki: self.payoff.redemption_if_no_ki,
            redemption_if_ki: self.payoff.redemption_if_ki,
            ki_redemption_floor: self.payoff.ki_redemption_floor,
        })
    }
}

impl PreparedNote {
    #[inline]
    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    /// `true` when any asset carries a local-stochastic vol model.
    pub fn has_stochastic_vol(&self) -> bool {
        self.assets.iter().any(|a| a.vol.is_stochastic())
    }

    /// Whether the KI barrier is monitored continuously.
    pub fn continuous_ki(&self) -> bool {
        matches!(
            self.ki_barrier,
            Some(KiBarrier {
                monitoring: BarrierMonitoring::Continuous,
                ..
            })
        )
    }
}

fn compile_dividends(
    spec: &DividendModelSpec,
    valuation: NaiveDate,
    maturity: NaiveDate,
) -> Result<DividendModel, PricingError> {
    let compile_events = |divs: &[crate::instruments::term_sheet::DiscreteDividendSpec]| {
        divs.iter()
            .filter_map(|div| {
                let ex_date = match parse_date("discrete_dividends.ex_date", &div.ex_date) {
                    Ok(d) => d,
                    Err(e) => return Some(Err(e)),
                };
                // Ex-dates beyond maturity never enter the grid.
                if ex_date > maturity {
                    return None;
                }
                let time = year_fraction(valuation, ex_date, EVENT_DAY_COUNT);
                Some(
                    DividendEvent::new(time, div.amount)
                        .map_err(PricingError::InvalidSchema),
                )
            })
            .collect::<Result<Vec<_>, PricingError>>()
    };

    let model = match spec {
        DividendModelSpec::Continuous { continuous_yield } => DividendModel::Continuous {
            yield_rate: *continuous_yield,
        },
        DividendModelSpec::Discrete { discrete_dividends } => {
            DividendModel::with_events(None, compile_events(discrete_dividends)?)
                .map_err(PricingError::InvalidSchema)?
        }
        DividendModelSpec::Mixed {
            continuous_yield,
            discrete_dividends,
        } => DividendModel::with_events(
            Some(*continuous_yield),
            compile_events(discrete_dividends)?,
        )
        .map_err(PricingError::InvalidSchema)?,
    };
    model.validate().map_err(PricingError::InvalidSchema)?;
    Ok(model)
}

fn compile_vol(spec: &VolModelSpec, valuation: NaiveDate) -> Result<VolModel, PricingError> {
    let model = match spec {
        VolModelSpec::Flat { flat_vol } => VolModel::Flat { vol: *flat_vol },
        VolModelSpec::PiecewiseConstant { term_structure } => {
            let pillars = term_structure
                .iter()
                .map(|tenor| {
                    let date = parse_date("term_structure.date", &tenor.date)?;
                    Ok((year_fraction(valuation, date, EVENT_DAY_COUNT), tenor.vol))
                })
                .collect::<Result<Vec<_>, PricingError>>()?;
            VolModel::piecewise(pillars).map_err(PricingError::InvalidSchema)?
        }
        VolModelSpec::LocalStochastic { lsv_params } => VolModel::LocalStochastic {
            params: LsvParams {
                v0: lsv_params.v0,
                theta: lsv_params.theta,
                kappa: lsv_params.kappa,
                xi: lsv_params.xi,
                rho: lsv_params.rho,
            },
        },
    };
    model.validate().map_err(PricingError::InvalidSchema)?;
    Ok(model)
}

fn compile_curve(ts: &TermSheet, valuation: NaiveDate) -> Result<DiscountCurve, PricingError> {
    let spec = &ts.discount_curve;
    if let Some(tenors) = &spec.tenors {
        let pillars = tenors
            .iter()
            .map(|tenor| {
                let date = parse_date("discount_curve.tenors.date", &tenor.date)?;
                Ok((year_fraction(valuation, date, spec.day_count), tenor.rate))
            })
            .collect::<Result<Vec<_>, PricingError>>()?;
        DiscountCurve::piecewise(pillars)
    } else {
        // Presence of flat_rate or tenors is guaranteed by validation.
        Ok(DiscountCurve::flat(spec.flat_rate.unwrap_or_default()))
    }
}

/// Builds the full correlation matrix: identity filled from the pairwise map
/// or taken verbatim from the row-major matrix form.
fn assemble_correlation(
    spec: Option<&CorrelationSpec>,
    underlyings: &[crate::instruments::term_sheet::UnderlyingSpec],
) -> Result<Vec<Vec<f64>>, PricingError> {
    let n = underlyings.len();
    let mut corr = vec![vec![0.0_f64; n]; n];
    for (i, row) in corr.iter_mut().enumerate() {
        row[i] = 1.0;
    }

    let Some(spec) = spec else {
        return Ok(corr);
    };

    if let Some(matrix) = &spec.matrix {
        return Ok(matrix.clone());
    }

    if let Some(pairwise) = &spec.pairwise {
        let index_of = |id: &str| underlyings.iter().position(|u| u.id == id);
        for (pair, &rho) in pairwise {
            let mut parts = pair.splitn(2, '_');
            let (Some(a), Some(b)) = (parts.next(), parts.next()) else {
                return Err(PricingError::InvalidSchema(format!(
                    "correlation pair `{pair}` must be `A_B`"
                )));
            };
            // Validation guarantees both ids resolve.
            if let (Some(i), Some(j)) = (index_of(a), index_of(b)) {
                corr[i][j] = rho;
                corr[j][i] = rho;
            }
        }
    }

    Ok(corr)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn two_asset_sheet() -> TermSheet {
        let json = r#"{
            "meta": {"product_id": "AC002", "notional": 1000000,
                     "valuation_date": "2024-01-02", "maturity_date": "2027-01-02",
                     "maturity_payment_date": "2027-01-09"},
            "underlyings": [
                {"id": "X", "spot": 100,
                 "dividend_model": {"type": "continuous", "continuous_yield": 0.02},
                 "vol_model": {"type": "flat", "flat_vol": 0.25}},
                {"id": "Y", "spot": 50,
                 "dividend_model": {"type": "discrete", "discrete_dividends":
                     [{"ex_date": "2024-06-03", "amount": 0.75},
                      {"ex_date": "2028-06-01", "amount": 0.75}]},
                 "vol_model": {"type": "piecewise_constant", "term_structure":
                     [{"date": "2025-01-02", "vol": 0.2}, {"date": "2027-01-02", "vol": 0.3}]}}
            ],
            "discount_curve": {"flat_rate": 0.04},
            "correlation": {"pairwise": {"X_Y": 0.6}},
            "schedules": {
                "observation_dates": ["2025-01-02", "2026-01-02", "2027-01-02"],
                "payment_dates": ["2025-01-09", "2026-01-09", "2027-01-09"],
                "autocall_levels": [1.0, 1.0, 1.0],
                "coupon_barriers": [0.7, 0.7, 0.7],
                "coupon_rates": [0.03, 0.03, 0.03]},
            "ki_barrier": {"level": 0.6, "monitoring": "continuous"}
        }"#;
        TermSheet::from_json(json).expect("parse")
    }

    #[test]
    fn compile_maps_dates_to_act365_times() {
        let note = two_asset_sheet().compile().expect("compile");
        // 2024-01-02 -> 2027-01-02 spans 1096 days (2024 is a leap year).
        assert_relative_eq!(note.maturity_time, 1096.0 / 365.0, epsilon = 1e-12);
        assert_eq!(note.schedule.len(), 3);
        assert!(note.schedule[0].payment_time > note.schedule[0].observation_time);
    }

    #[test]
    fn compile_assembles_pairwise_correlation() {
        let note = two_asset_sheet().compile().expect("compile");
        assert_eq!(note.correlation[0][1], 0.6);
        assert_eq!(note.correlation[1][0], 0.6);
        assert_eq!(note.correlation[0][0], 1.0);
    }

    #[test]
    fn compile_drops_dividends_beyond_maturity() {
        let note = two_asset_sheet().compile().expect("compile");
        let events = note.assets[1].dividends.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].time < note.maturity_time);
    }

    #[test]
    fn compile_translates_vol_term_structure() {
        let note = two_asset_sheet().compile().expect("compile");
        let vol = &note.assets[1].vol;
        // Mid-2024 sits inside the first pillar, 2026 in the second.
        assert_eq!(vol.vol_at(0.5), 0.2);
        assert_eq!(vol.vol_at(2.0), 0.3);
    }

    #[test]
    fn stochastic_vol_flag_reflects_models() {
        let note = two_asset_sheet().compile().expect("compile");
        assert!(!note.has_stochastic_vol());
        assert!(note.continuous_ki());
    }
}
