//! Blocked multi-asset path generation.
//!
//! Paths evolve in log space with per-step drift from the discount curve,
//! piecewise-constant (or QE-simulated) volatility, discrete dividend jumps,
//! and a Brownian-bridge knock-in test under continuous monitoring. Storage
//! is single-precision; all accumulation runs in double.
//!
//! Every random draw is keyed by `(seed, path, step, channel)`, so a block's
//! content depends only on which global path indices it covers, never on
//! block size, thread, or bumped market levels.

use crate::core::PricingError;
use crate::instruments::PreparedNote;
use crate::market::LsvParams;
use crate::math::fast_rng::{sample_standard_normal, stream_rng, StreamChannel};
use crate::math::{correlate_normals, CorrelationFactor};

use super::grid::SimulationGrid;

/// QE switching threshold (Andersen 2008). Fixed numerical contract.
const QE_PSI_C: f64 = 1.5;
/// Variance floor for the QE scheme.
const QE_VARIANCE_FLOOR: f64 = 1.0e-10;
/// Fraction of spot a dividend is capped at when it would wipe the path out.
const DIVIDEND_CAP_RATIO: f64 = 0.999;

/// Log-spot paths for one block, plus per-path knock-in and degeneracy flags.
#[derive(Debug, Clone)]
pub struct SimulatedBlock {
    /// Global index of the first path in this block.
    pub base_path: u64,
    pub n_paths: usize,
    pub n_assets: usize,
    pub n_nodes: usize,
    /// `[path][node][asset]` log spots, single precision.
    log_spots: Vec<f32>,
    /// Knock-in flag from continuous monitoring (empty unless monitored).
    pub ki_hit: Vec<bool>,
    /// Paths on which a dividend cap triggered.
    pub degenerate: Vec<bool>,
}

impl SimulatedBlock {
    #[inline]
    fn index(&self, path: usize, node: usize, asset: usize) -> usize {
        (path * self.n_nodes + node) * self.n_assets + asset
    }

    /// Log spot at a node.
    #[inline]
    pub fn log_spot(&self, path: usize, node: usize, asset: usize) -> f64 {
        self.log_spots[self.index(path, node, asset)] as f64
    }

    /// Performance relative to the initial fixing. Computed from stored
    /// log spots so that a motionless path reports exactly 1.
    #[inline]
    pub fn performance(&self, path: usize, node: usize, asset: usize) -> f64 {
        (self.log_spot(path, node, asset) - self.log_spot(path, 0, asset)).exp()
    }
}

/// Generates [`SimulatedBlock`]s for a note on a grid.
///
/// The generator is immutable and shared by reference across worker threads;
/// all per-block scratch lives in [`PathGenerator::simulate_block`].
#[derive(Debug)]
pub struct PathGenerator<'a> {
    note: &'a PreparedNote,
    grid: &'a SimulationGrid,
    cholesky: Vec<Vec<f64>>,
    seed: u64,
    antithetic: bool,
    log_spots0: Vec<f64>,
    cont_yields: Vec<f64>,
    /// `(asset index, params)` for assets with a stochastic variance process.
    lsv_assets: Vec<(usize, LsvParams)>,
    /// Log barrier per asset under continuous monitoring.
    ki_log_barriers: Option<Vec<f64>>,
}

impl<'a> PathGenerator<'a> {
    pub fn new(
        note: &'a PreparedNote,
        grid: &'a SimulationGrid,
        factor: &CorrelationFactor,
        seed: u64,
        antithetic: bool,
    ) -> Self {
        let log_spots0 = note.assets.iter().map(|a| a.spot.ln()).collect::<Vec<_>>();
        let cont_yields = note
            .assets
            .iter()
            .map(|a| a.dividends.continuous_yield())
            .collect();
        let lsv_assets = note
            .assets
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.vol.lsv_params().map(|p| (i, *p)))
            .collect();
        let ki_log_barriers = if note.continuous_ki() {
            let level = note.ki_barrier.expect("continuous_ki implies barrier").level;
            Some(
                note.assets
                    .iter()
                    .map(|a| (level * a.spot).ln())
                    .collect(),
            )
        } else {
            None
        };

        Self {
            note,
            grid,
            cholesky: factor.cholesky.clone(),
            seed,
            antithetic,
            log_spots0,
            cont_yields,
            lsv_assets,
            ki_log_barriers,
        }
    }

    /// Bytes of path storage a block of `n_paths` requires.
    pub fn block_bytes(&self, n_paths: usize) -> usize {
        n_paths * (self.grid.n_steps() + 1) * self.note.n_assets() * std::mem::size_of::<f32>()
    }

    /// Simulates paths `base_path .. base_path + n_paths`.
    pub fn simulate_block(
        &self,
        base_path: u64,
        n_paths: usize,
    ) -> Result<SimulatedBlock, PricingError> {
        let n_assets = self.note.n_assets();
        let n_nodes = self.grid.n_steps() + 1;
        let n_lsv = self.lsv_assets.len();

        let mut block = SimulatedBlock {
            base_path,
            n_paths,
            n_assets,
            n_nodes,
            log_spots: vec![0.0_f32; n_paths * n_nodes * n_assets],
            ki_hit: vec![false; n_paths],
            degenerate: vec![false; n_paths],
        };

        // Double-precision running state; the f32 buffer is storage only.
        let mut x = vec![0.0_f64; n_paths * n_assets];
        for path in 0..n_paths {
            for asset in 0..n_assets {
                x[path * n_assets + asset] = self.log_spots0[asset];
                let idx = block.index(path, 0, asset);
                block.log_spots[idx] = self.log_spots0[asset] as f32;
            }
        }
        let mut variance = vec![0.0_f64; n_paths * n_lsv];
        for path in 0..n_paths {
            for (j, (_, params)) in self.lsv_assets.iter().enumerate() {
                variance[path * n_lsv + j] = params.v0;
            }
        }

        let mut indep = vec![0.0_f64; n_assets];
        let mut shocks = vec![0.0_f64; n_assets];
        let mut step_vols = vec![0.0_f64; n_assets];
        let mut x_prev = vec![0.0_f64; n_assets];

        for (k, step) in self.grid.steps.iter().enumerate() {
            let step_idx = k as u32;
            let dt = step.dt;
            let sqrt_dt = dt.sqrt();
            let r = step.forward_rate;

            for path in 0..n_paths {
                let global = base_path + path as u64;
                // Antithetic pairs share the even path's normal streams with
                // the sign flipped; uniforms stay per-path.
                let (normal_path, sign) = if self.antithetic {
                    (global & !1, if global & 1 == 1 { -1.0 } else { 1.0 })
                } else {
                    (global, 1.0)
                };

                let mut rng_normal =
                    stream_rng(self.seed, normal_path, step_idx, StreamChannel::SpotNormal);
                for z in indep.iter_mut() {
                    *z = sign * sample_standard_normal(&mut rng_normal);
                }
                correlate_normals(&self.cholesky, &indep, &mut shocks);

                step_vols.copy_from_slice(&step.vols);
                if n_lsv > 0 {
                    let mut rng_var = stream_rng(
                        self.seed,
                        normal_path,
                        step_idx,
                        StreamChannel::VarianceNormal,
                    );
                    let mut rng_qe =
                        stream_rng(self.seed, global, step_idx, StreamChannel::QeUniform);
                    for (j, (asset, params)) in self.lsv_assets.iter().enumerate() {
                        let zv = sign * sample_standard_normal(&mut rng_var);
                        let u = rng_qe.next_f64();
                        let v = variance[path * n_lsv + j];
                        let v_next = qe_variance_step(v, params, dt, zv, u);
                        variance[path * n_lsv + j] = v_next;

                        // Trapezoidal effective vol over the step.
                        step_vols[*asset] = (0.5 * (v + v_next)).sqrt();
                        // Spot shock conditionally correlated with the
                        // variance draw.
                        let rho = params.rho;
                        shocks[*asset] =
                            rho * zv + (1.0 - rho * rho).sqrt() * shocks[*asset];
                    }
                }

                let row = path * n_assets;
                for asset in 0..n_assets {
                    x_prev[asset] = x[row + asset];
                    let sigma = step_vols[asset];
                    let drift = (r - self.cont_yields[asset] - 0.5 * sigma * sigma) * dt;
                    x[row + asset] += drift + sigma * sqrt_dt * shocks[asset];
                }

                for &(asset, amount) in &step.dividends {
                    let spot = x[row + asset].exp();
                    let paid = if amount >= spot {
                        block.degenerate[path] = true;
                        DIVIDEND_CAP_RATIO * spot
                    } else {
                        amount
                    };
                    x[row + asset] += (1.0 - paid / spot).ln();
                }

                for asset in 0..n_assets {
                    let idx = block.index(path, k + 1, asset);
                    block.log_spots[idx] = x[row + asset] as f32;
                }

                if let Some(barriers) = &self.ki_log_barriers {
                    // Uniforms are consumed for every asset on every step so
                    // the stream position never depends on market levels.
                    let mut rng_bridge =
                        stream_rng(self.seed, global, step_idx, StreamChannel::BridgeUniform);
                    let mut hit = block.ki_hit[path];
                    for asset in 0..n_assets {
                        let u = rng_bridge.next_f64();
                        let b = barriers[asset];
                        let x0 = x_prev[asset];
                        let x1 = x[row + asset];
                        if x0 <= b || x1 <= b {
                            hit = true;
                            continue;
                        }
                        let var = step_vols[asset] * step_vols[asset] * dt;
                        if var <= 0.0 {
                            // Zero-variance bridge degenerates to the
                            // endpoint check above.
                            continue;
                        }
                        let p_hit = (-2.0 * (x0 - b) * (x1 - b) / var).exp();
                        if u < p_hit {
                            hit = true;
                        }
                    }
                    block.ki_hit[path] = hit;
                }
            }
        }

        if x.iter().any(|v| !v.is_finite()) {
            return Err(PricingError::NumericFailure(
                "non-finite log spot produced by path generator".to_string(),
            ));
        }

        Ok(block)
    }
}

/// One QE step of the CIR variance process (Andersen 2008).
///
/// Draws the quadratic branch from the normal `zv` when the moment ratio
/// `psi <= QE_PSI_C`, the atom-exponential branch from the uniform `u`
/// otherwise. Both inputs are consumed by the caller regardless of branch.
fn qe_variance_step(v: f64, params: &LsvParams, dt: f64, zv: f64, u: f64) -> f64 {
    let kappa = params.kappa;
    let theta = params.theta;
    let xi = params.xi;

    let ekd = (-kappa * dt).exp();
    let m = theta + (v - theta) * ekd;
    let mut s2 = v * xi * xi * ekd * (1.0 - ekd) / kappa;
    s2 += theta * xi * xi * (1.0 - ekd) * (1.0 - ekd) / (2.0 * kappa);
    s2 = s2.max(QE_VARIANCE_FLOOR);

    let psi = s2 / (m * m).max(QE_VARIANCE_FLOOR);

    let v_next = if psi <= QE_PSI_C {
        let two_over_psi = 2.0 / psi;
        let b2 = (two_over_psi - 1.0 + two_over_psi.sqrt() * (two_over_psi - 1.0).sqrt()).max(0.0);
        let a = m / (1.0 + b2);
        let z_shift = b2.sqrt() + zv;
        a * z_shift * z_shift
    } else {
        let p = (psi - 1.0) / (psi + 1.0);
        if u <= p {
            0.0
        } else {
            let beta = (1.0 - p) / m.max(QE_VARIANCE_FLOOR);
            ((1.0 - p) / (1.0 - u).max(QE_VARIANCE_FLOOR)).ln() / beta.max(QE_VARIANCE_FLOOR)
        }
    };

    v_next.max(QE_VARIANCE_FLOOR)
}
