//! Per-path payoff state machine and block-level tallies.
//!
//! At each observation, checks run in a fixed order: autocall first, then
//! coupon (which consumes and resets memory), then discrete knock-in
//! accrual. A knock-in therefore never forfeits the same date's coupon, and
//! a continuous knock-in that is already set on entry never blocks a coupon.
//! Maturity redemption is decided last, after the final observation's
//! coupon.

use crate::core::PricingError;
use crate::instruments::{BarrierMonitoring, KiRedemption, PreparedNote};

use super::grid::SimulationGrid;
use super::path::SimulatedBlock;

/// Per-path evaluation result. These are the only values retained per path;
/// spot paths die with their block.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathOutcome {
    pub pv: f64,
    pub coupon_pv: f64,
    pub autocall_redemption_pv: f64,
    pub maturity_redemption_pv: f64,
    pub coupon_count: u32,
    pub autocalled: bool,
    pub ki_hit: bool,
    pub degenerate: bool,
    /// Time of the terminating observation (autocall) or maturity.
    pub life: f64,
}

/// Per-observation-date accumulators for the cashflow table. Counts are
/// exact; amount sums merge in block order.
#[derive(Debug, Clone, Default)]
pub struct BlockTally {
    pub autocall_count: Vec<u64>,
    pub autocall_amount: Vec<f64>,
    pub coupon_count: Vec<u64>,
    pub coupon_amount: Vec<f64>,
    pub maturity_no_ki_count: u64,
    pub maturity_no_ki_amount: f64,
    pub maturity_ki_count: u64,
    pub maturity_ki_amount: f64,
}

impl BlockTally {
    pub fn new(n_observations: usize) -> Self {
        Self {
            autocall_count: vec![0; n_observations],
            autocall_amount: vec![0.0; n_observations],
            coupon_count: vec![0; n_observations],
            coupon_amount: vec![0.0; n_observations],
            ..Self::default()
        }
    }

    pub fn merge(&mut self, other: &Self) {
        for (a, b) in self.autocall_count.iter_mut().zip(&other.autocall_count) {
            *a += b;
        }
        for (a, b) in self.autocall_amount.iter_mut().zip(&other.autocall_amount) {
            *a += b;
        }
        for (a, b) in self.coupon_count.iter_mut().zip(&other.coupon_count) {
            *a += b;
        }
        for (a, b) in self.coupon_amount.iter_mut().zip(&other.coupon_amount) {
            *a += b;
        }
        self.maturity_no_ki_count += other.maturity_no_ki_count;
        self.maturity_no_ki_amount += other.maturity_no_ki_amount;
        self.maturity_ki_count += other.maturity_ki_count;
        self.maturity_ki_amount += other.maturity_ki_amount;
    }
}

/// Evaluates simulated blocks against the note's event timeline.
#[derive(Debug)]
pub struct EventEngine<'a> {
    note: &'a PreparedNote,
    grid: &'a SimulationGrid,
    /// Discount factor per schedule payment date.
    payment_dfs: Vec<f64>,
    maturity_df: f64,
    discrete_ki: bool,
    ki_level: f64,
}

impl<'a> EventEngine<'a> {
    pub fn new(note: &'a PreparedNote, grid: &'a SimulationGrid) -> Self {
        let payment_dfs = note
            .schedule
            .iter()
            .map(|entry| note.curve.discount_factor(entry.payment_time))
            .collect();
        let maturity_df = note.curve.discount_factor(note.maturity_payment_time);
        let (discrete_ki, ki_level) = match note.ki_barrier {
            Some(ki) => (ki.monitoring == BarrierMonitoring::Discrete, ki.level),
            None => (false, 0.0),
        };

        Self {
            note,
            grid,
            payment_dfs,
            maturity_df,
            discrete_ki,
            ki_level,
        }
    }

    /// Worst-of (or best-of) performance of one path at a grid node.
    #[inline]
    fn performance(&self, block: &SimulatedBlock, path: usize, node: usize) -> f64 {
        let mut acc = if self.note.worst_of {
            f64::INFINITY
        } else {
            f64::NEG_INFINITY
        };
        for asset in 0..block.n_assets {
            let perf = block.performance(path, node, asset);
            acc = if self.note.worst_of {
                acc.min(perf)
            } else {
                acc.max(perf)
            };
        }
        acc
    }

    /// Evaluates every path of a block, appending outcomes in path order and
    /// accumulating the block tally.
    pub fn evaluate_block(
        &self,
        block: &SimulatedBlock,
        outcomes: &mut Vec<PathOutcome>,
        tally: &mut BlockTally,
    ) -> Result<(), PricingError> {
        let note = self.note;
        let notional = note.notional;

        for path in 0..block.n_paths {
            let mut outcome = PathOutcome {
                ki_hit: block.ki_hit.get(path).copied().unwrap_or(false),
                degenerate: block.degenerate[path],
                ..PathOutcome::default()
            };
            let mut memory = 0.0_f64;
            let mut alive = true;

            for (obs_idx, entry) in note.schedule.iter().enumerate() {
                let node = self.grid.observation_nodes[obs_idx];
                let perf = self.performance(block, path, node);
                let df = self.payment_dfs[obs_idx];

                // 1. Autocall terminates the path at this observation.
                if perf >= entry.autocall_level {
                    let redemption = notional * note.redemption_if_autocall;
                    outcome.autocall_redemption_pv += redemption * df;
                    tally.autocall_count[obs_idx] += 1;
                    tally.autocall_amount[obs_idx] += redemption;

                    if note.coupon_on_autocall {
                        let mut coupon = notional * entry.coupon_rate;
                        if note.coupon_memory {
                            coupon += notional * memory;
                        }
                        outcome.coupon_pv += coupon * df;
                        outcome.coupon_count += 1;
                        tally.coupon_count[obs_idx] += 1;
                        tally.coupon_amount[obs_idx] += coupon;
                    }

                    outcome.autocalled = true;
                    outcome.life = entry.observation_time;
                    alive = false;
                    break;
                }

                // 2. Coupon, gated only by its own barrier.
                if perf >= entry.coupon_barrier {
                    let coupon = notional * (entry.coupon_rate + memory);
                    memory = 0.0;
                    outcome.coupon_pv += coupon * df;
                    outcome.coupon_count += 1;
                    tally.coupon_count[obs_idx] += 1;
                    tally.coupon_amount[obs_idx] += coupon;
                } else if note.coupon_memory {
                    memory += entry.coupon_rate;
                }

                // 3. Discrete knock-in accrual, after the coupon so a
                // knock-in on the final observation keeps that coupon.
                if self.discrete_ki && perf <= self.ki_level {
                    outcome.ki_hit = true;
                }
            }

            if alive {
                let final_perf = self.performance(block, path, self.grid.maturity_node);
                let redemption_fraction = if note.ki_barrier.is_some() && outcome.ki_hit {
                    match note.redemption_if_ki {
                        KiRedemption::WorstPerformance => {
                            final_perf.max(note.ki_redemption_floor)
                        }
                        KiRedemption::Performance => final_perf,
                        KiRedemption::Par => 1.0,
                    }
                } else {
                    note.redemption_if_no_ki
                };
                let redemption = notional * redemption_fraction;
                outcome.maturity_redemption_pv += redemption * self.maturity_df;
                outcome.life = note.maturity_time;

                if note.ki_barrier.is_some() && outcome.ki_hit {
                    tally.maturity_ki_count += 1;
                    tally.maturity_ki_amount += redemption;
                } else {
                    tally.maturity_no_ki_count += 1;
                    tally.maturity_no_ki_amount += redemption;
                }
            }

            outcome.pv = outcome.coupon_pv
                + outcome.autocall_redemption_pv
                + outcome.maturity_redemption_pv;

            if !outcome.pv.is_finite() {
                return Err(PricingError::NumericFailure(format!(
                    "non-finite path PV at path {}",
                    block.base_path + path as u64
                )));
            }

            outcomes.push(outcome);
        }

        Ok(())
    }
}
