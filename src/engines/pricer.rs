//! Pricing driver: grid build, blocked simulation, event evaluation, and
//! deterministic aggregation.
//!
//! Blocks fan out across worker threads; each block's random streams are
//! fixed by the global path indices it covers, and per-path PVs are reduced
//! in path order, so the reported PV is bit-identical for any block size and
//! worker count. Cancellation is polled at block granularity.

use std::time::Instant;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::core::{CancelToken, PricingError, Warning};
use crate::instruments::{PreparedNote, TermSheet};
use crate::math::factor_correlation_matrix;
use crate::reporting::{build_price_result, PriceResult};

use super::events::{BlockTally, EventEngine, PathOutcome};
use super::grid::{build_simulation_grid, SimulationGrid};
use super::path::PathGenerator;

/// Monte Carlo run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Number of paths (pairs count as two when antithetic).
    pub paths: usize,
    pub seed: u64,
    /// Paths simulated per block; bounds peak memory.
    pub block_size: usize,
    pub antithetic: bool,
    /// Optional uniform grid refinement (steps per year).
    pub steps_per_year: Option<u32>,
    /// Optional ceiling on per-block path storage, in bytes.
    pub max_block_bytes: Option<usize>,
}

impl RunConfig {
    pub fn new(paths: usize, seed: u64) -> Self {
        Self {
            paths,
            seed,
            block_size: paths.clamp(1, 50_000),
            antithetic: false,
            steps_per_year: None,
            max_block_bytes: None,
        }
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_antithetic(mut self, antithetic: bool) -> Self {
        self.antithetic = antithetic;
        self
    }

    pub fn with_steps_per_year(mut self, steps_per_year: u32) -> Self {
        self.steps_per_year = Some(steps_per_year);
        self
    }

    pub fn with_max_block_bytes(mut self, ceiling: usize) -> Self {
        self.max_block_bytes = Some(ceiling);
        self
    }

    fn validate(&self) -> Result<(), PricingError> {
        if self.paths == 0 {
            return Err(PricingError::InvalidSchema(
                "run config requires paths >= 1".to_string(),
            ));
        }
        if self.block_size == 0 || self.block_size > self.paths {
            return Err(PricingError::InvalidSchema(format!(
                "block_size must be in [1, paths]; got {} for {} paths",
                self.block_size, self.paths
            )));
        }
        if self.antithetic && self.paths % 2 != 0 {
            return Err(PricingError::InvalidSchema(
                "antithetic runs require an even path count".to_string(),
            ));
        }
        Ok(())
    }
}

/// Prices a term sheet by blocked Monte Carlo.
pub fn price(term_sheet: &TermSheet, config: &RunConfig) -> Result<PriceResult, PricingError> {
    price_cancellable(term_sheet, config, None)
}

/// Prices with an optional cooperative cancellation token.
pub fn price_cancellable(
    term_sheet: &TermSheet,
    config: &RunConfig,
    cancel: Option<&CancelToken>,
) -> Result<PriceResult, PricingError> {
    let started = Instant::now();
    config.validate()?;

    let note = term_sheet.compile()?;
    let grid = build_simulation_grid(&note, config.steps_per_year)?;

    let factor = factor_correlation_matrix(&note.correlation, note.n_assets())
        .map_err(PricingError::InvalidSchema)?;
    let mut warnings = Vec::new();
    if factor.repaired {
        warnings.push(Warning::CorrelationRepaired {
            min_eigenvalue: factor.min_eigenvalue,
        });
    }

    let generator = PathGenerator::new(&note, &grid, &factor, config.seed, config.antithetic);
    if let Some(ceiling) = config.max_block_bytes {
        let needed = generator.block_bytes(config.block_size);
        if needed > ceiling {
            return Err(PricingError::ResourceExceeded(format!(
                "block of {} paths needs {needed} bytes of path storage, ceiling is {ceiling}",
                config.block_size
            )));
        }
    }

    let engine = EventEngine::new(&note, &grid);
    let (outcomes, tally) = run_blocks(&note, config, &generator, &engine, cancel)?;

    let degenerate_paths = outcomes.iter().filter(|o| o.degenerate).count() as u64;
    if degenerate_paths > 0 {
        warnings.push(Warning::DividendCapped {
            paths: degenerate_paths,
        });
    }

    Ok(build_price_result(
        &note,
        &outcomes,
        &tally,
        config.antithetic,
        warnings,
        degenerate_paths,
        started.elapsed().as_secs_f64() * 1_000.0,
    ))
}

/// Simulates and evaluates every block, returning per-path outcomes in
/// global path order plus the merged per-date tally.
fn run_blocks(
    note: &PreparedNote,
    config: &RunConfig,
    generator: &PathGenerator<'_>,
    engine: &EventEngine<'_>,
    cancel: Option<&CancelToken>,
) -> Result<(Vec<PathOutcome>, BlockTally), PricingError> {
    let n_blocks = config.paths.div_ceil(config.block_size);
    let block_range = |index: usize| {
        let base = index * config.block_size;
        let len = config.block_size.min(config.paths - base);
        (base as u64, len)
    };

    let evaluate_one = |index: usize| -> Result<(Vec<PathOutcome>, BlockTally), PricingError> {
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(PricingError::Cancelled);
        }
        let (base, len) = block_range(index);
        let block = generator.simulate_block(base, len)?;
        let mut outcomes = Vec::with_capacity(len);
        let mut tally = BlockTally::new(note.schedule.len());
        engine.evaluate_block(&block, &mut outcomes, &mut tally)?;
        Ok((outcomes, tally))
    };

    #[cfg(feature = "parallel")]
    let per_block: Vec<(Vec<PathOutcome>, BlockTally)> = (0..n_blocks)
        .into_par_iter()
        .map(evaluate_one)
        .collect::<Result<_, _>>()?;

    #[cfg(not(feature = "parallel"))]
    let per_block: Vec<(Vec<PathOutcome>, BlockTally)> = (0..n_blocks)
        .map(evaluate_one)
        .collect::<Result<_, _>>()?;

    // Merge in block index order; outcomes land in global path order.
    let mut outcomes = Vec::with_capacity(config.paths);
    let mut tally = BlockTally::new(note.schedule.len());
    for (block_outcomes, block_tally) in &per_block {
        outcomes.extend_from_slice(block_outcomes);
        tally.merge(block_tally);
    }

    Ok((outcomes, tally))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::TermSheet;

    fn simple_sheet() -> TermSheet {
        let json = r#"{
            "meta": {"product_id": "PRC1", "notional": 1000000,
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
    fn block_size_does_not_change_pv() {
        let sheet = simple_sheet();
        let a = price(&sheet, &RunConfig::new(4_000, 9).with_block_size(4_000)).unwrap();
        let b = price(&sheet, &RunConfig::new(4_000, 9).with_block_size(137)).unwrap();
        assert_eq!(a.summary.pv.to_bits(), b.summary.pv.to_bits());
        assert_eq!(
            a.summary.pv_std_error.to_bits(),
            b.summary.pv_std_error.to_bits()
        );
    }

    #[test]
    fn repeated_runs_are_bit_identical() {
        let sheet = simple_sheet();
        let config = RunConfig::new(2_000, 77).with_block_size(500);
        let a = price(&sheet, &config).unwrap();
        let b = price(&sheet, &config).unwrap();
        assert_eq!(a.summary.pv.to_bits(), b.summary.pv.to_bits());
        assert_eq!(a.summary.autocall_probability, b.summary.autocall_probability);
    }

    #[test]
    fn invalid_run_configs_are_rejected() {
        let sheet = simple_sheet();
        assert!(price(&sheet, &RunConfig::new(0, 1)).is_err());
        let oversized = RunConfig::new(10, 1).with_block_size(20);
        assert!(price(&sheet, &oversized).is_err());
        let odd_antithetic = RunConfig::new(11, 1).with_block_size(11).with_antithetic(true);
        assert!(price(&sheet, &odd_antithetic).is_err());
    }

    #[test]
    fn memory_ceiling_is_enforced() {
        let sheet = simple_sheet();
        let config = RunConfig::new(1_000, 1).with_max_block_bytes(64);
        let err = price(&sheet, &config).unwrap_err();
        assert!(matches!(err, PricingError::ResourceExceeded(_)), "{err}");
    }

    #[test]
    fn cancelled_token_aborts_before_work() {
        let sheet = simple_sheet();
        let token = CancelToken::new();
        token.cancel();
        let err =
            price_cancellable(&sheet, &RunConfig::new(1_000, 1), Some(&token)).unwrap_err();
        assert_eq!(err, PricingError::Cancelled);
    }

    #[test]
    fn antithetic_reduces_standard_error() {
        let sheet = simple_sheet();
        let plain = price(&sheet, &RunConfig::new(20_000, 5)).unwrap();
        let anti = price(&sheet, &RunConfig::new(20_000, 5).with_antithetic(true)).unwrap();
        assert!(
            anti.summary.pv_std_error <= plain.summary.pv_std_error,
            "antithetic {} vs plain {}",
            anti.summary.pv_std_error,
            plain.summary.pv_std_error
        );
    }
}
