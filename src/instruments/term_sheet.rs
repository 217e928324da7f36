//! Term-sheet wire format and schema validation.
//!
//! The JSON shape uses the snake-case tags of the product schema; unknown
//! keys are rejected. Dates travel as ISO-8601 strings and are parsed during
//! validation so that a malformed date surfaces as
//! [`PricingError::InvalidDate`] rather than a generic parse failure.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::core::PricingError;
use crate::rates::DayCountConvention;

/// Trade metadata.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Meta {
    pub product_id: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub notional: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_date: Option<String>,
    pub valuation_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement_date: Option<String>,
    pub maturity_date: String,
    pub maturity_payment_date: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Dividend model wire variants.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DividendModelSpec {
    Continuous {
        continuous_yield: f64,
    },
    Discrete {
        discrete_dividends: Vec<DiscreteDividendSpec>,
    },
    Mixed {
        continuous_yield: f64,
        discrete_dividends: Vec<DiscreteDividendSpec>,
    },
}

/// A single discrete dividend on the wire.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscreteDividendSpec {
    pub ex_date: String,
    pub amount: f64,
}

/// Volatility model wire variants.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VolModelSpec {
    Flat {
        flat_vol: f64,
    },
    PiecewiseConstant {
        term_structure: Vec<VolTenorSpec>,
    },
    LocalStochastic {
        lsv_params: LsvParamsSpec,
    },
}

/// One tenor of a piecewise vol term structure.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolTenorSpec {
    pub date: String,
    pub vol: f64,
}

/// Heston-style variance parameters on the wire.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LsvParamsSpec {
    pub v0: f64,
    pub theta: f64,
    pub kappa: f64,
    pub xi: f64,
    pub rho: f64,
}

/// One underlying asset.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnderlyingSpec {
    pub id: String,
    pub spot: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub dividend_model: DividendModelSpec,
    pub vol_model: VolModelSpec,
}

/// Discount curve: flat rate or piecewise `(date, rate)` tenors.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscountCurveSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flat_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenors: Option<Vec<RateTenorSpec>>,
    #[serde(default)]
    pub day_count: DayCountConvention,
}

/// One pillar of a piecewise rate curve.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateTenorSpec {
    pub date: String,
    pub rate: f64,
}

/// Correlation: full row-major matrix or pairwise `"A_B" -> rho` map.
/// Pairs absent from the map default to zero.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrelationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix: Option<Vec<Vec<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairwise: Option<BTreeMap<String, f64>>,
}

/// All schedule arrays, aligned by observation index.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulesSpec {
    pub observation_dates: Vec<String>,
    pub payment_dates: Vec<String>,
    pub autocall_levels: Vec<f64>,
    pub coupon_barriers: Vec<f64>,
    pub coupon_rates: Vec<f64>,
}

/// Barrier monitoring mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarrierMonitoring {
    /// Brownian-bridge test between grid steps.
    Continuous,
    /// Checked only at observation dates.
    Discrete,
}

/// Knock-in barrier.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KiBarrierSpec {
    /// Barrier as a fraction of initial spot.
    pub level: f64,
    pub monitoring: BarrierMonitoring,
}

/// Settlement style. Valuation-cosmetic: both settle to the same scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    Cash,
    Physical,
}

/// Maturity redemption rule when the knock-in barrier was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KiRedemption {
    /// `max(N * W_M, N * ki_redemption_floor)`.
    WorstPerformance,
    /// `N * W_M`, no floor.
    Performance,
    /// `N`.
    Par,
}

/// Payoff rules.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PayoffSpec {
    #[serde(default = "default_true")]
    pub worst_of: bool,
    #[serde(default = "default_true")]
    pub coupon_memory: bool,
    #[serde(default = "default_settlement")]
    pub settlement: Settlement,
    #[serde(default = "default_true")]
    pub coupon_on_autocall: bool,
    #[serde(default = "default_one")]
    pub redemption_if_autocall: f64,
    #[serde(default = "default_one")]
    pub redemption_if_no_ki: f64,
    #[serde(default = "default_ki_redemption")]
    pub redemption_if_ki: KiRedemption,
    #[serde(default)]
    pub ki_redemption_floor: f64,
}

impl Default for PayoffSpec {
    fn default() -> Self {
        Self {
            worst_of: true,
            coupon_memory: true,
            settlement: Settlement::Cash,
            coupon_on_autocall: true,
            redemption_if_autocall: 1.0,
            redemption_if_no_ki: 1.0,
            redemption_if_ki: KiRedemption::WorstPerformance,
            ki_redemption_floor: 0.0,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_one() -> f64 {
    1.0
}

fn default_settlement() -> Settlement {
    Settlement::Cash
}

fn default_ki_redemption() -> KiRedemption {
    KiRedemption::WorstPerformance
}

/// Complete declarative term sheet for an autocallable note.
///
/// This is the single source of truth for the product. [`TermSheet::validate`]
/// checks every invariant; the engines consume the compiled
/// [`crate::instruments::PreparedNote`] form.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TermSheet {
    pub meta: Meta,
    pub underlyings: Vec<UnderlyingSpec>,
    pub discount_curve: DiscountCurveSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<CorrelationSpec>,
    pub schedules: SchedulesSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ki_barrier: Option<KiBarrierSpec>,
    #[serde(default)]
    pub payoff: PayoffSpec,
}

impl TermSheet {
    /// Parses a term sheet from JSON, rejecting unknown keys.
    pub fn from_json(json: &str) -> Result<Self, PricingError> {
        serde_json::from_str(json).map_err(|e| PricingError::InvalidSchema(e.to_string()))
    }

    /// Validates every schema invariant. Called by [`Self::compile`]; also
    /// usable standalone to vet an input before pricing.
    pub fn validate(&self) -> Result<(), PricingError> {
        self.validate_meta()?;
        self.validate_underlyings()?;
        self.validate_discount_curve()?;
        self.validate_schedules()?;
        self.validate_correlation()?;
        self.validate_ki_and_payoff()?;
        Ok(())
    }

    fn validate_meta(&self) -> Result<(), PricingError> {
        if self.meta.product_id.is_empty() {
            return Err(PricingError::InvalidSchema(
                "meta.product_id must not be empty".to_string(),
            ));
        }
        if !self.meta.notional.is_finite() || self.meta.notional <= 0.0 {
            return Err(PricingError::InvalidSchema(
                "meta.notional must be finite and > 0".to_string(),
            ));
        }

        let valuation = parse_date("meta.valuation_date", &self.meta.valuation_date)?;
        let maturity = parse_date("meta.maturity_date", &self.meta.maturity_date)?;
        let maturity_payment =
            parse_date("meta.maturity_payment_date", &self.meta.maturity_payment_date)?;

        if maturity < valuation {
            return Err(PricingError::InvalidDate(
                "maturity_date cannot precede valuation_date".to_string(),
            ));
        }
        if maturity_payment < maturity {
            return Err(PricingError::InvalidDate(
                "maturity_payment_date cannot precede maturity_date".to_string(),
            ));
        }
        if let Some(trade) = &self.meta.trade_date {
            let trade = parse_date("meta.trade_date", trade)?;
            if valuation < trade {
                return Err(PricingError::InvalidDate(
                    "valuation_date cannot precede trade_date".to_string(),
                ));
            }
        }
        if let Some(settlement) = &self.meta.settlement_date {
            parse_date("meta.settlement_date", settlement)?;
        }
        Ok(())
    }

    fn validate_underlyings(&self) -> Result<(), PricingError> {
        if self.underlyings.is_empty() {
            return Err(PricingError::InvalidSchema(
                "at least one underlying is required".to_string(),
            ));
        }

        let valuation = parse_date("meta.valuation_date", &self.meta.valuation_date)?;

        let mut seen = BTreeSet::new();
        for underlying in &self.underlyings {
            if underlying.id.is_empty() {
                return Err(PricingError::InvalidSchema(
                    "underlying id must not be empty".to_string(),
                ));
            }
            if !seen.insert(underlying.id.as_str()) {
                return Err(PricingError::InvalidSchema(format!(
                    "duplicate underlying id `{}`",
                    underlying.id
                )));
            }
            if !underlying.spot.is_finite() || underlying.spot <= 0.0 {
                return Err(PricingError::InvalidSchema(format!(
                    "underlying `{}` spot must be finite and > 0",
                    underlying.id
                )));
            }

            match &underlying.dividend_model {
                DividendModelSpec::Continuous { continuous_yield }
                | DividendModelSpec::Mixed {
                    continuous_yield, ..
                } => {
                    if !continuous_yield.is_finite() || *continuous_yield < 0.0 {
                        return Err(PricingError::InvalidSchema(format!(
                            "underlying `{}` continuous_yield must be >= 0",
                            underlying.id
                        )));
                    }
                }
                DividendModelSpec::Discrete { .. } => {}
            }
            match &underlying.dividend_model {
                DividendModelSpec::Discrete { discrete_dividends }
                | DividendModelSpec::Mixed {
                    discrete_dividends, ..
                } => {
                    for div in discrete_dividends {
                        let ex_date = parse_date("discrete_dividends.ex_date", &div.ex_date)?;
                        if ex_date <= valuation {
                            return Err(PricingError::InvalidDate(format!(
                                "underlying `{}` dividend ex_date {} is not after valuation",
                                underlying.id, div.ex_date
                            )));
                        }
                        if !div.amount.is_finite() || div.amount < 0.0 {
                            return Err(PricingError::InvalidSchema(format!(
                                "underlying `{}` dividend amount must be >= 0",
                                underlying.id
                            )));
                        }
                    }
                }
                DividendModelSpec::Continuous { .. } => {}
            }

            match &underlying.vol_model {
                VolModelSpec::Flat { flat_vol } => {
                    if !flat_vol.is_finite() || *flat_vol < 0.0 || *flat_vol > 2.0 {
                        return Err(PricingError::InvalidSchema(format!(
                            "underlying `{}` flat_vol must be in [0, 2]",
                            underlying.id
                        )));
                    }
                }
                VolModelSpec::PiecewiseConstant { term_structure } => {
                    if term_structure.is_empty() {
                        return Err(PricingError::InvalidSchema(format!(
                            "underlying `{}` term_structure must not be empty",
                            underlying.id
                        )));
                    }
                    // Tenors outside the product life are legal; the plateau
                    // lookup simply never selects them.
                    for tenor in term_structure {
                        parse_date("term_structure.date", &tenor.date)?;
                        if !tenor.vol.is_finite() || tenor.vol <= 0.0 || tenor.vol > 2.0 {
                            return Err(PricingError::InvalidSchema(format!(
                                "underlying `{}` vol tenor must be in (0, 2]",
                                underlying.id
                            )));
                        }
                    }
                }
                VolModelSpec::LocalStochastic { lsv_params } => {
                    let params = crate::market::LsvParams {
                        v0: lsv_params.v0,
                        theta: lsv_params.theta,
                        kappa: lsv_params.kappa,
                        xi: lsv_params.xi,
                        rho: lsv_params.rho,
                    };
                    params.validate().map_err(|msg| {
                        PricingError::InvalidSchema(format!(
                            "underlying `{}`: {msg}",
                            underlying.id
                        ))
                    })?;
                }
            }
        }
        Ok(())
    }

    fn validate_discount_curve(&self) -> Result<(), PricingError> {
        let curve = &self.discount_curve;
        match (&curve.flat_rate, &curve.tenors) {
            (None, None) => Err(PricingError::InvalidSchema(
                "discount_curve requires flat_rate or tenors".to_string(),
            )),
            (Some(rate), _) if !rate.is_finite() || *rate < -0.1 || *rate > 0.5 => {
                Err(PricingError::InvalidSchema(
                    "discount_curve.flat_rate must be in [-0.1, 0.5]".to_string(),
                ))
            }
            (_, Some(tenors)) if tenors.is_empty() => Err(PricingError::InvalidSchema(
                "discount_curve.tenors must not be empty".to_string(),
            )),
            (_, Some(tenors)) => {
                for tenor in tenors {
                    parse_date("discount_curve.tenors.date", &tenor.date)?;
                    if !tenor.rate.is_finite() || tenor.rate < -0.1 || tenor.rate > 0.5 {
                        return Err(PricingError::InvalidSchema(
                            "discount_curve tenor rate must be in [-0.1, 0.5]".to_string(),
                        ));
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn validate_schedules(&self) -> Result<(), PricingError> {
        let s = &self.schedules;
        let n = s.observation_dates.len();
        if n == 0 {
            return Err(PricingError::InvalidSchema(
                "schedules require at least one observation".to_string(),
            ));
        }
        for (name, len) in [
            ("payment_dates", s.payment_dates.len()),
            ("autocall_levels", s.autocall_levels.len()),
            ("coupon_barriers", s.coupon_barriers.len()),
            ("coupon_rates", s.coupon_rates.len()),
        ] {
            if len != n {
                return Err(PricingError::InvalidSchema(format!(
                    "schedules.{name} length {len} != observation_dates length {n}"
                )));
            }
        }

        let valuation = parse_date("meta.valuation_date", &self.meta.valuation_date)?;
        let maturity = parse_date("meta.maturity_date", &self.meta.maturity_date)?;

        let mut prev: Option<NaiveDate> = None;
        for (i, (obs, pay)) in s
            .observation_dates
            .iter()
            .zip(s.payment_dates.iter())
            .enumerate()
        {
            let obs_date = parse_date("schedules.observation_dates", obs)?;
            let pay_date = parse_date("schedules.payment_dates", pay)?;

            if obs_date < valuation {
                return Err(PricingError::InvalidDate(format!(
                    "observation_dates[{i}] {obs} precedes valuation_date"
                )));
            }
            if obs_date > maturity {
                return Err(PricingError::InvalidDate(format!(
                    "observation_dates[{i}] {obs} is after maturity_date"
                )));
            }
            if pay_date < obs_date {
                return Err(PricingError::InvalidDate(format!(
                    "payment_dates[{i}] {pay} precedes its observation date"
                )));
            }
            if let Some(prev_date) = prev {
                if obs_date <= prev_date {
                    return Err(PricingError::InvalidDate(
                        "observation_dates must be strictly increasing".to_string(),
                    ));
                }
            }
            prev = Some(obs_date);
        }

        for (i, &level) in s.autocall_levels.iter().enumerate() {
            if !level.is_finite() || level <= 0.0 || level > 2.0 {
                return Err(PricingError::InvalidSchema(format!(
                    "autocall_levels[{i}] = {level} out of range (0, 2]"
                )));
            }
        }
        for (i, &level) in s.coupon_barriers.iter().enumerate() {
            if !level.is_finite() || level <= 0.0 || level > 2.0 {
                return Err(PricingError::InvalidSchema(format!(
                    "coupon_barriers[{i}] = {level} out of range (0, 2]"
                )));
            }
        }
        for (i, &rate) in s.coupon_rates.iter().enumerate() {
            if !rate.is_finite() || rate < 0.0 {
                return Err(PricingError::InvalidSchema(format!(
                    "coupon_rates[{i}] = {rate} must be >= 0"
                )));
            }
        }
        Ok(())
    }

    fn validate_correlation(&self) -> Result<(), PricingError> {
        let n = self.underlyings.len();
        if n > 1 && self.correlation.is_none() {
            return Err(PricingError::InvalidSchema(
                "correlation is required for multi-asset products".to_string(),
            ));
        }
        let Some(correlation) = &self.correlation else {
            return Ok(());
        };

        if let Some(matrix) = &correlation.matrix {
            if matrix.len() != n || matrix.iter().any(|row| row.len() != n) {
                return Err(PricingError::InvalidSchema(format!(
                    "correlation matrix must be {n}x{n}"
                )));
            }
        }
        if let Some(pairwise) = &correlation.pairwise {
            let ids: BTreeSet<&str> = self.underlyings.iter().map(|u| u.id.as_str()).collect();
            for (pair, rho) in pairwise {
                let mut parts = pair.splitn(2, '_');
                let (Some(a), Some(b)) = (parts.next(), parts.next()) else {
                    return Err(PricingError::InvalidSchema(format!(
                        "correlation pair `{pair}` must be `A_B`"
                    )));
                };
                if !ids.contains(a) || !ids.contains(b) {
                    return Err(PricingError::InvalidSchema(format!(
                        "correlation pair `{pair}` names unknown underlyings"
                    )));
                }
                if !rho.is_finite() || !(-1.0..=1.0).contains(rho) {
                    return Err(PricingError::InvalidSchema(format!(
                        "correlation for `{pair}` must be in [-1, 1]"
                    )));
                }
            }
        }
        Ok(())
    }

    fn validate_ki_and_payoff(&self) -> Result<(), PricingError> {
        if let Some(ki) = &self.ki_barrier {
            if !ki.level.is_finite() || ki.level <= 0.0 || ki.level > 1.5 {
                return Err(PricingError::InvalidSchema(format!(
                    "ki_barrier.level = {} out of range (0, 1.5]",
                    ki.level
                )));
            }
        }
        let p = &self.payoff;
        for (name, value) in [
            ("redemption_if_autocall", p.redemption_if_autocall),
            ("redemption_if_no_ki", p.redemption_if_no_ki),
        ] {
            if !value.is_finite() || value <= 0.0 || value > 2.0 {
                return Err(PricingError::InvalidSchema(format!(
                    "payoff.{name} = {value} out of range (0, 2]"
                )));
            }
        }
        if !p.ki_redemption_floor.is_finite()
            || p.ki_redemption_floor < 0.0
            || p.ki_redemption_floor > 1.0
        {
            return Err(PricingError::InvalidSchema(
                "payoff.ki_redemption_floor must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parses an ISO-8601 date, reporting the offending field on failure.
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, PricingError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| PricingError::InvalidDate(format!("{field}: cannot parse `{value}`")))
}
