//! Result aggregation: pricing summary, cashflow table, and PV
//! decomposition.
//!
//! The mean and standard error reduce the per-path PV buffer in path order,
//! which keeps the headline numbers bit-identical across block sizes and
//! worker counts. Cashflow-row amounts come from the per-date tallies.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::core::Warning;
use crate::engines::events::{BlockTally, PathOutcome};
use crate::instruments::PreparedNote;

/// Headline pricing numbers.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PricingSummary {
    pub pv: f64,
    pub pv_std_error: f64,
    pub pv_pct_notional: f64,
    pub autocall_probability: f64,
    pub ki_probability: f64,
    pub expected_coupon_count: f64,
    pub expected_life_years: f64,
    pub num_paths: u64,
    pub computation_time_ms: f64,
}

/// Category of an expected cashflow row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CashflowType {
    Coupon,
    AutocallRedemption,
    MaturityNoKi,
    MaturityWithKi,
}

/// One row of the expected cashflow table.
///
/// `expected_amount` is conditional on the flow occurring;
/// `pv_contribution` is unconditional, so rows sum to the total PV.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CashflowRow {
    pub date: NaiveDate,
    pub payment_date: NaiveDate,
    #[serde(rename = "type")]
    pub flow_type: CashflowType,
    pub expected_amount: f64,
    pub discount_factor: f64,
    pub pv_contribution: f64,
    pub probability: f64,
}

/// PV split by cashflow category.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Decomposition {
    pub coupon_pv: f64,
    pub redemption_pv: f64,
    pub autocall_redemption_pv: f64,
    pub maturity_redemption_pv: f64,
    pub total_pv: f64,
}

/// Complete pricing result.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PriceResult {
    pub summary: PricingSummary,
    pub cashflows: Vec<CashflowRow>,
    pub decomposition: Decomposition,
    pub autocall_probability_by_date: BTreeMap<NaiveDate, f64>,
    pub coupon_probability_by_date: BTreeMap<NaiveDate, f64>,
    pub warnings: Vec<Warning>,
    pub degenerate_paths: u64,
}

/// Builds the full result from per-path outcomes (in path order) and the
/// merged per-date tally.
///
/// With antithetic pairing on, the estimator samples are the pair averages
/// `(PV_{2k} + PV_{2k+1}) / 2`; treating the two halves of a pair as
/// independent would overstate the effective sample count and hide the
/// variance reduction.
pub fn build_price_result(
    note: &PreparedNote,
    outcomes: &[PathOutcome],
    tally: &BlockTally,
    antithetic: bool,
    warnings: Vec<Warning>,
    degenerate_paths: u64,
    computation_time_ms: f64,
) -> PriceResult {
    let n = outcomes.len();
    let n_f = n as f64;

    // Path-order reduction: deterministic for any block partition.
    let mut coupon_sum = 0.0_f64;
    let mut autocall_sum = 0.0_f64;
    let mut maturity_sum = 0.0_f64;
    let mut coupon_count = 0.0_f64;
    let mut life_sum = 0.0_f64;
    let mut autocalled = 0_u64;
    let mut knocked_in = 0_u64;
    for outcome in outcomes {
        coupon_sum += outcome.coupon_pv;
        autocall_sum += outcome.autocall_redemption_pv;
        maturity_sum += outcome.maturity_redemption_pv;
        coupon_count += outcome.coupon_count as f64;
        life_sum += outcome.life;
        autocalled += outcome.autocalled as u64;
        knocked_in += outcome.ki_hit as u64;
    }

    let mut sum = 0.0_f64;
    let mut sum_sq = 0.0_f64;
    let samples = if antithetic {
        for pair in outcomes.chunks_exact(2) {
            let avg = 0.5 * (pair[0].pv + pair[1].pv);
            sum += avg;
            sum_sq += avg * avg;
        }
        (n / 2) as f64
    } else {
        for outcome in outcomes {
            sum += outcome.pv;
            sum_sq += outcome.pv * outcome.pv;
        }
        n_f
    };

    let pv = sum / samples;
    let variance = if samples > 1.0 {
        ((sum_sq - sum * sum / samples) / (samples - 1.0)).max(0.0)
    } else {
        0.0
    };
    let pv_std_error = (variance / samples).sqrt();

    let coupon_pv = coupon_sum / n_f;
    let autocall_redemption_pv = autocall_sum / n_f;
    let maturity_redemption_pv = maturity_sum / n_f;

    let mut cashflows = Vec::new();
    let mut autocall_probability_by_date = BTreeMap::new();
    let mut coupon_probability_by_date = BTreeMap::new();

    for (i, entry) in note.schedule.iter().enumerate() {
        let df = note.curve.discount_factor(entry.payment_time);

        let coupon_paths = tally.coupon_count[i];
        if coupon_paths > 0 {
            let amount_sum = tally.coupon_amount[i];
            let probability = coupon_paths as f64 / n_f;
            coupon_probability_by_date.insert(entry.observation_date, probability);
            cashflows.push(CashflowRow {
                date: entry.observation_date,
                payment_date: entry.payment_date,
                flow_type: CashflowType::Coupon,
                expected_amount: amount_sum / coupon_paths as f64,
                discount_factor: df,
                pv_contribution: amount_sum / n_f * df,
                probability,
            });
        }

        let autocall_paths = tally.autocall_count[i];
        if autocall_paths > 0 {
            let amount_sum = tally.autocall_amount[i];
            let probability = autocall_paths as f64 / n_f;
            autocall_probability_by_date.insert(entry.observation_date, probability);
            cashflows.push(CashflowRow {
                date: entry.observation_date,
                payment_date: entry.payment_date,
                flow_type: CashflowType::AutocallRedemption,
                expected_amount: amount_sum / autocall_paths as f64,
                discount_factor: df,
                pv_contribution: amount_sum / n_f * df,
                probability,
            });
        }
    }

    let maturity_df = note.curve.discount_factor(note.maturity_payment_time);
    if tally.maturity_no_ki_count > 0 {
        cashflows.push(CashflowRow {
            date: note.maturity_date,
            payment_date: note.maturity_payment_date,
            flow_type: CashflowType::MaturityNoKi,
            expected_amount: tally.maturity_no_ki_amount / tally.maturity_no_ki_count as f64,
            discount_factor: maturity_df,
            pv_contribution: tally.maturity_no_ki_amount / n_f * maturity_df,
            probability: tally.maturity_no_ki_count as f64 / n_f,
        });
    }
    if tally.maturity_ki_count > 0 {
        cashflows.push(CashflowRow {
            date: note.maturity_date,
            payment_date: note.maturity_payment_date,
            flow_type: CashflowType::MaturityWithKi,
            expected_amount: tally.maturity_ki_amount / tally.maturity_ki_count as f64,
            discount_factor: maturity_df,
            pv_contribution: tally.maturity_ki_amount / n_f * maturity_df,
            probability: tally.maturity_ki_count as f64 / n_f,
        });
    }

    PriceResult {
        summary: PricingSummary {
            pv,
            pv_std_error,
            pv_pct_notional: pv / note.notional,
            autocall_probability: autocalled as f64 / n_f,
            ki_probability: knocked_in as f64 / n_f,
            expected_coupon_count: coupon_count / n_f,
            expected_life_years: life_sum / n_f,
            num_paths: n as u64,
            computation_time_ms,
        },
        cashflows,
        decomposition: Decomposition {
            coupon_pv,
            redemption_pv: autocall_redemption_pv + maturity_redemption_pv,
            autocall_redemption_pv,
            maturity_redemption_pv,
            total_pv: coupon_pv + autocall_redemption_pv + maturity_redemption_pv,
        },
        warnings,
        degenerate_paths,
        autocall_probability_by_date,
        coupon_probability_by_date,
    }
}
