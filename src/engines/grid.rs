//! Event-aligned simulation grid.
//!
//! Merges observation dates, ex-dividend dates, and maturity into a strictly
//! increasing time partition starting at `t0 = 0`, optionally refined so that
//! no step exceeds `1 / steps_per_year`. Every step carries its drift rate,
//! per-asset vol plateau, dividend jumps, and event annotations; the merge is
//! idempotent and loses no observation.

use crate::core::PricingError;
use crate::instruments::PreparedNote;

/// Two event times closer than this collapse into one grid node.
const TIME_TOLERANCE: f64 = 1.0e-12;

/// One simulation step from `t_start` to `t_end`.
#[derive(Debug, Clone, PartialEq)]
pub struct GridStep {
    pub t_start: f64,
    pub t_end: f64,
    pub dt: f64,
    /// Continuously compounded forward rate on `(t_start, t_end)`.
    pub forward_rate: f64,
    /// Per-asset vol plateau, looked up at the step midpoint. LSV assets
    /// carry `sqrt(v0)` here; their realized step vol comes from the
    /// simulated variance.
    pub vols: Vec<f64>,
    /// Schedule index when `t_end` is an observation.
    pub observation: Option<usize>,
    /// `(asset, amount)` cash dividend jumps applied at `t_end`. Several
    /// dividends of one asset falling on the same node are pre-summed.
    pub dividends: Vec<(usize, f64)>,
    pub is_maturity: bool,
}

/// Complete simulation grid.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationGrid {
    /// Grid nodes `0 = t_0 < t_1 < ... < t_K` in year fractions.
    pub nodes: Vec<f64>,
    pub steps: Vec<GridStep>,
    /// Grid node index of each schedule observation, aligned with
    /// `PreparedNote::schedule`.
    pub observation_nodes: Vec<usize>,
    /// Grid node index of the maturity date.
    pub maturity_node: usize,
}

impl SimulationGrid {
    #[inline]
    pub fn n_steps(&self) -> usize {
        self.steps.len()
    }
}

/// Builds the simulation grid for a compiled note.
///
/// `steps_per_year` refines inter-event intervals with uniformly spaced
/// interior points until every step is at most `1 / steps_per_year` long; by
/// default only event dates enter the grid.
pub fn build_simulation_grid(
    note: &PreparedNote,
    steps_per_year: Option<u32>,
) -> Result<SimulationGrid, PricingError> {
    let mut event_times = vec![0.0_f64];

    for entry in &note.schedule {
        if entry.observation_time < -TIME_TOLERANCE {
            return Err(PricingError::InvalidDate(format!(
                "observation {} precedes valuation",
                entry.observation_date
            )));
        }
        event_times.push(entry.observation_time.max(0.0));
    }

    for asset in &note.assets {
        for event in asset.dividends.events() {
            if event.time <= note.maturity_time + TIME_TOLERANCE {
                event_times.push(event.time);
            }
        }
    }

    event_times.push(note.maturity_time);
    event_times.sort_by(f64::total_cmp);
    event_times.dedup_by(|a, b| (*a - *b).abs() <= TIME_TOLERANCE);

    // Refine inter-event intervals to the requested resolution.
    let nodes = match steps_per_year {
        None | Some(0) => event_times,
        Some(n) => {
            let max_dt = 1.0 / n as f64;
            let mut refined = Vec::with_capacity(event_times.len());
            refined.push(event_times[0]);
            for window in event_times.windows(2) {
                let (lo, hi) = (window[0], window[1]);
                let span = hi - lo;
                let pieces = (span / max_dt).ceil() as usize;
                for i in 1..pieces {
                    refined.push(lo + span * i as f64 / pieces as f64);
                }
                refined.push(hi);
            }
            refined
        }
    };

    if nodes.windows(2).any(|w| w[1] - w[0] <= TIME_TOLERANCE) {
        return Err(PricingError::InvalidDate(
            "grid nodes are not strictly increasing after merge".to_string(),
        ));
    }

    let node_index = |t: f64| -> Option<usize> {
        nodes
            .iter()
            .position(|&node| (node - t).abs() <= TIME_TOLERANCE)
    };

    let mut observation_nodes = Vec::with_capacity(note.schedule.len());
    for entry in &note.schedule {
        let idx = node_index(entry.observation_time.max(0.0)).ok_or_else(|| {
            PricingError::InvalidDate(format!(
                "observation {} lost in grid merge",
                entry.observation_date
            ))
        })?;
        observation_nodes.push(idx);
    }

    let maturity_node = node_index(note.maturity_time).ok_or_else(|| {
        PricingError::InvalidDate("maturity date lost in grid merge".to_string())
    })?;

    // Per-asset dividend amounts by destination node, summed when several
    // dividends land inside the same step.
    let mut dividends_by_node: Vec<Vec<(usize, f64)>> = vec![Vec::new(); nodes.len()];
    for (asset_idx, asset) in note.assets.iter().enumerate() {
        for event in asset.dividends.events() {
            if event.time > note.maturity_time + TIME_TOLERANCE {
                continue;
            }
            let idx = node_index(event.time).ok_or_else(|| {
                PricingError::InvalidDate("ex-dividend date lost in grid merge".to_string())
            })?;
            let slot = &mut dividends_by_node[idx];
            match slot.iter_mut().find(|(a, _)| *a == asset_idx) {
                Some((_, amount)) => *amount += event.amount,
                None => slot.push((asset_idx, event.amount)),
            }
        }
    }

    let steps = nodes
        .windows(2)
        .enumerate()
        .map(|(k, window)| {
            let (t_start, t_end) = (window[0], window[1]);
            let midpoint = 0.5 * (t_start + t_end);
            let vols = note
                .assets
                .iter()
                .map(|asset| asset.vol.vol_at(midpoint))
                .collect();
            GridStep {
                t_start,
                t_end,
                dt: t_end - t_start,
                forward_rate: note.curve.forward_rate(t_start, t_end),
                vols,
                observation: observation_nodes
                    .iter()
                    .position(|&node| node == k + 1),
                dividends: std::mem::take(&mut dividends_by_node[k + 1]),
                is_maturity: k + 1 == maturity_node,
            }
        })
        .collect();

    Ok(SimulationGrid {
        nodes,
        steps,
        observation_nodes,
        maturity_node,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::instruments::TermSheet;

    fn note_with_dividends() -> PreparedNote {
        let json = r#"{
            "meta": {"product_id": "GRID1", "notional": 1000000,
                     "valuation_date": "2024-01-02", "maturity_date": "2026-01-02",
                     "maturity_payment_date": "2026-01-09"},
            "underlyings": [{"id": "X", "spot": 100,
                "dividend_model": {"type": "discrete", "discrete_dividends":
                    [{"ex_date": "2024-06-03", "amount": 1.0},
                     {"ex_date": "2024-06-03", "amount": 0.5},
                     {"ex_date": "2025-06-02", "amount": 1.0}]},
                "vol_model": {"type": "piecewise_constant", "term_structure":
                    [{"date": "2025-01-02", "vol": 0.2}, {"date": "2026-01-02", "vol": 0.3}]}}],
            "discount_curve": {"flat_rate": 0.03},
            "schedules": {
                "observation_dates": ["2025-01-02", "2026-01-02"],
                "payment_dates": ["2025-01-09", "2026-01-09"],
                "autocall_levels": [1.0, 1.0],
                "coupon_barriers": [0.7, 0.7],
                "coupon_rates": [0.02, 0.02]}
        }"#;
        TermSheet::from_json(json).unwrap().compile().unwrap()
    }

    #[test]
    fn grid_contains_every_event_exactly_once() {
        let note = note_with_dividends();
        let grid = build_simulation_grid(&note, None).expect("grid");

        // valuation + 2 dividends (one node holds two summed) + 2 observations
        // (the second is maturity).
        assert_eq!(grid.nodes.len(), 5);
        assert_eq!(grid.observation_nodes.len(), 2);
        assert_eq!(grid.maturity_node, grid.nodes.len() - 1);
        assert!(grid.steps.last().unwrap().is_maturity);
    }

    #[test]
    fn same_day_dividends_are_summed() {
        let note = note_with_dividends();
        let grid = build_simulation_grid(&note, None).expect("grid");
        let step_with_div = grid
            .steps
            .iter()
            .find(|s| !s.dividends.is_empty())
            .expect("dividend step");
        assert_eq!(step_with_div.dividends, vec![(0, 1.5)]);
    }

    #[test]
    fn refinement_caps_step_length() {
        let note = note_with_dividends();
        let grid = build_simulation_grid(&note, Some(52)).expect("grid");
        let max_dt = grid.steps.iter().map(|s| s.dt).fold(0.0, f64::max);
        assert!(max_dt <= 1.0 / 52.0 + 1e-12, "max_dt = {max_dt}");

        // Refinement must not displace events.
        for (entry, &node) in note.schedule.iter().zip(&grid.observation_nodes) {
            assert_relative_eq!(grid.nodes[node], entry.observation_time, epsilon = 1e-12);
        }
    }

    #[test]
    fn merge_is_idempotent_for_coincident_events() {
        // The last observation coincides with maturity; the merge must not
        // duplicate the node.
        let note = note_with_dividends();
        let grid = build_simulation_grid(&note, None).expect("grid");
        assert_eq!(grid.observation_nodes[1], grid.maturity_node);
        for window in grid.nodes.windows(2) {
            assert!(window[1] > window[0]);
        }
    }

    #[test]
    fn vol_plateau_is_looked_up_at_step_midpoint() {
        let note = note_with_dividends();
        let grid = build_simulation_grid(&note, None).expect("grid");
        // First step midpoint falls inside the first vol pillar.
        assert_relative_eq!(grid.steps[0].vols[0], 0.2, epsilon = 1e-15);
        // Last step midpoint falls in the second pillar.
        assert_relative_eq!(grid.steps.last().unwrap().vols[0], 0.3, epsilon = 1e-15);
    }

    #[test]
    fn flat_curve_forward_rates_match_the_rate() {
        let note = note_with_dividends();
        let grid = build_simulation_grid(&note, Some(12)).expect("grid");
        for step in &grid.steps {
            assert_relative_eq!(step.forward_rate, 0.03, epsilon = 1e-12);
        }
    }
}
