// ─────────────────────────────────────────────────────────────────────
// HPGe Siggen — Relaxation Orchestrator
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Coarse-to-fine orchestration of the two relaxation passes.
//!
//! The bias pass runs first and, besides the potential, produces the
//! depletion map the weighting pass needs: undepleted pixels ride at the
//! point-contact potential, pinch-off bubbles float as isolated islands.

use hpge_types::config::DetectorConfig;
use hpge_types::constants::{E_OVER_EPS, MAX_ITERATIONS_FACTOR};
use hpge_types::error::{HpgeError, HpgeResult};
use ndarray::Array2;

use crate::boundary::{bias_tables, weighting_tables, StencilTables};
use crate::grid::{grid_schedule, prolongate, GridDims};
use crate::relax::{relax_sweep, DepletionMark, PassKind, SweepStats};

/// Convergence tolerances on the max per-pixel change.
const BIAS_TOLERANCE: f64 = 1e-9;
const WP_TOLERANCE: f64 = 1e-10;

/// Outcome of one relaxation pass on the finest grid.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceReport {
    pub iterations: usize,
    pub max_dif: f64,
    pub converged: bool,
}

/// Bias-potential solution, in the internal positive-potential convention
/// (see [`FieldSolver::polarity`]).
pub struct BiasSolution {
    /// Potential on the finest grid, shape `(l + 1, r + 1)`, indexed `[z, r]`.
    pub v: Array2<f64>,
    pub dims: GridDims,
    /// Depletion map at the finest grid, indexed `[r, z]`:
    /// `' '` contact/outside, `'.'` depleted bulk, `'*'` undepleted,
    /// `'B'` pinch-off bubble.
    pub undepleted: Array2<u8>,
    pub fully_depleted: bool,
    /// Potential of the first pinch-off bubble (0 when none).
    pub bubble_volts: f64,
    pub report: ConvergenceReport,
}

/// Weighting-potential solution for the point contact.
pub struct WeightingSolution {
    /// Weighting potential in [0, 1], shape `(l + 1, r + 1)`, indexed `[z, r]`.
    pub wp: Array2<f64>,
    pub dims: GridDims,
    pub report: ConvergenceReport,
}

/// The multi-resolution relaxation solver.
pub struct FieldSolver {
    cfg: DetectorConfig,
    bv: f64,
    n0: f64,
    gradient: f64,
    flipped: bool,
    schedule: Vec<f64>,
}

impl FieldSolver {
    /// Validate the setup and fix the internal sign convention: for n-type
    /// material (positive impurity concentration) bias, concentration and
    /// gradient are negated so all potentials iterate non-negative.
    pub fn new(cfg: DetectorConfig) -> HpgeResult<Self> {
        cfg.validate_for_field()?;

        let mut bv = cfg.xtal_hv;
        let mut n0 = cfg.impurity_z0;
        let mut gradient = cfg.impurity_gradient;
        let flipped = n0 > 0.0;
        if flipped {
            bv = -bv;
            n0 = -n0;
            gradient = -gradient;
        }

        let schedule = grid_schedule(cfg.xtal_length, cfg.xtal_radius, cfg.xtal_grid);
        match schedule.len() {
            1 => log::info!("single grid size: {:.4}", schedule[0]),
            2 => log::info!("two grid sizes: {:.4} {:.4}", schedule[0], schedule[1]),
            _ => log::info!(
                "three grid sizes: {:.4} {:.4} {:.4}",
                schedule[0],
                schedule[1],
                schedule[2]
            ),
        }

        Ok(FieldSolver {
            cfg,
            bv,
            n0,
            gradient,
            flipped,
            schedule,
        })
    }

    /// -1 when the solve ran with internally negated potentials (n-type),
    /// +1 otherwise. Multiply solved potentials by this before writing them
    /// out.
    pub fn polarity(&self) -> f64 {
        if self.flipped {
            -1.0
        } else {
            1.0
        }
    }

    /// Bias voltage in the internal (non-negative) convention.
    pub fn bias_volts(&self) -> f64 {
        self.bv
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.cfg
    }

    /// Solve Poisson's equation for the bias potential.
    pub fn solve_bias(&self) -> HpgeResult<BiasSolution> {
        let final_step = *self.schedule.last().expect("schedule is never empty");
        let final_dims = GridDims::for_bias(&self.cfg, final_step);
        let mut undepleted = Array2::from_elem((final_dims.r + 1, final_dims.l + 1), b' ');

        let mut max_its = self.cfg.iteration_ceiling();
        let mut prev: Option<(Array2<f64>, GridDims)> = None;
        let mut fully_depleted = true;
        let mut bubble_volts = 0.0;
        let mut report = ConvergenceReport {
            iterations: 0,
            max_dif: 0.0,
            converged: false,
        };

        for (istep, &step) in self.schedule.iter().enumerate() {
            let dims = GridDims::for_bias(&self.cfg, step);
            let gridfact = (step / final_step).round() as usize;
            log::info!(
                "grid = {:.4}  RC = {}  dRC = {:.3}  LC = {}  dLC = {:.3}",
                step,
                dims.rc,
                dims.drc,
                dims.lc,
                dims.dlc
            );

            let guess = match &prev {
                None => initial_bias_guess(&dims, self.bv),
                Some((coarse, cdims)) => {
                    let ratio = (cdims.step / step).round() as usize;
                    log::info!("grid {:.4} -> {:.4}; ratio = {}", cdims.step, step, ratio);
                    prolongate(coarse, dims.l, dims.r, ratio)
                }
            };
            let mut v_new = guess.clone();
            let mut v_old = guess;
            let tables = bias_tables(&dims, self.bv, &mut v_old, &mut v_new);

            let pass = PassKind::Bias {
                n0: self.n0,
                gradient_per_cell: 0.1 * self.gradient * step,
                kappa: E_OVER_EPS * step * step,
            };

            let (level_report, last) = relax_until(
                &mut v_old,
                &mut v_new,
                &tables,
                &dims,
                &pass,
                BIAS_TOLERANCE,
                max_its,
                Some((&mut undepleted, gridfact)),
            );
            report = level_report;
            bubble_volts = last.bubble_volts;

            // classify what stayed clamped: still-positive pixels are
            // pinch-off bubbles, the rest plain undepleted
            fully_depleted = true;
            for r in 0..=dims.r {
                for z in 0..=dims.l {
                    let mr = (r * gridfact).min(final_dims.r);
                    let mz = (z * gridfact).min(final_dims.l);
                    if undepleted[[mr, mz]] == b'*' {
                        fully_depleted = false;
                        if v_new[[z, r]] > 0.001 {
                            undepleted[[mr, mz]] = b'B';
                        }
                    }
                }
            }

            if istep == 0 {
                max_its /= MAX_ITERATIONS_FACTOR;
                if log::log_enabled!(log::Level::Info) {
                    axis_report(&v_new, &dims);
                }
            }
            prev = Some((v_new, dims));
        }

        let (v, dims) = prev.expect("at least one level was solved");

        if !report.converged {
            log::warn!(
                "{}",
                HpgeError::NotConverged {
                    iterations: report.iterations,
                    max_dif: report.max_dif,
                }
            );
        }
        if fully_depleted {
            log::info!("detector is fully depleted");
        } else {
            log::info!("detector is NOT fully depleted");
            if bubble_volts > 0.0 {
                log::info!("pinch-off bubble at {bubble_volts:.0} V potential");
            }
        }

        Ok(BiasSolution {
            v,
            dims,
            undepleted,
            fully_depleted,
            bubble_volts,
            report,
        })
    }

    /// Solve Laplace's equation for the point-contact weighting potential,
    /// using the depletion map of a previous bias solve.
    pub fn solve_weighting(&self, bias: &BiasSolution) -> HpgeResult<WeightingSolution> {
        let final_step = *self.schedule.last().expect("schedule is never empty");
        let mut max_its = self.cfg.iteration_ceiling();
        let mut prev: Option<(Array2<f64>, GridDims)> = None;
        let mut report = ConvergenceReport {
            iterations: 0,
            max_dif: 0.0,
            converged: false,
        };

        log::info!("calculating weighting potential...");
        for (istep, &step) in self.schedule.iter().enumerate() {
            let dims = GridDims::for_weighting(&self.cfg, step);
            let gridfact = (step / final_step).round() as usize;

            let guess = match &prev {
                None => initial_wp_guess(&dims),
                Some((coarse, cdims)) => {
                    let ratio = (cdims.step / step).round() as usize;
                    log::info!("grid {:.4} -> {:.4}; ratio = {}", cdims.step, step, ratio);
                    prolongate(coarse, dims.l, dims.r, ratio)
                }
            };
            let mut v_new = guess.clone();
            let mut v_old = guess;
            let tables = weighting_tables(
                &dims,
                &bias.undepleted,
                gridfact,
                bias.fully_depleted,
                &mut v_old,
                &mut v_new,
            );

            let (level_report, _) = relax_until(
                &mut v_old,
                &mut v_new,
                &tables,
                &dims,
                &PassKind::Weighting,
                WP_TOLERANCE,
                max_its,
                None,
            );
            report = level_report;

            if istep == 0 {
                max_its /= MAX_ITERATIONS_FACTOR;
            }
            prev = Some((v_new, dims));
        }

        let (wp, dims) = prev.expect("at least one level was solved");
        if !report.converged {
            log::warn!(
                "{}",
                HpgeError::NotConverged {
                    iterations: report.iterations,
                    max_dif: report.max_dif,
                }
            );
        }

        Ok(WeightingSolution { wp, dims, report })
    }
}

/// Relax until convergence or the iteration ceiling, swapping planes every
/// sweep. Returns the report and the last sweep's statistics.
#[allow(clippy::too_many_arguments)]
fn relax_until(
    v_old: &mut Array2<f64>,
    v_new: &mut Array2<f64>,
    tables: &StencilTables,
    dims: &GridDims,
    pass: &PassKind,
    tolerance: f64,
    max_its: usize,
    mut mark: Option<(&mut Array2<u8>, usize)>,
) -> (ConvergenceReport, SweepStats) {
    let pixels = (dims.l * dims.r) as f64;
    let mut iterations = 0;
    let mut last = SweepStats::default();

    for iter in 0..max_its {
        std::mem::swap(v_old, v_new);
        let stats = relax_sweep(
            v_old,
            v_new,
            tables,
            dims,
            pass,
            mark.as_mut().map(|(map, gridfact)| DepletionMark {
                map: &mut **map,
                gridfact: *gridfact,
            }),
        );

        if iter < 10 || (iter < 600 && iter % 100 == 0) || iter % 1000 == 0 {
            log::debug!(
                "{:5} {:.10} {:.10}",
                iter,
                stats.max_dif,
                stats.sum_dif / pixels
            );
        }

        iterations = iter + 1;
        last = stats;
        if stats.max_dif < tolerance {
            break;
        }
    }

    log::info!(
        ">> {} iterations, sum_dif = {:.3e}",
        iterations,
        last.sum_dif
    );
    (
        ConvergenceReport {
            iterations,
            max_dif: last.max_dif,
            converged: last.max_dif < tolerance,
        },
        last,
    )
}

/// First guess for the bias pass: linear ramp in z, blended toward the bias
/// voltage at the outer radius.
fn initial_bias_guess(dims: &GridDims, bv: f64) -> Array2<f64> {
    let mut v = Array2::zeros((dims.l + 1, dims.r + 1));
    for z in 0..dims.l {
        let a = bv * z as f64 / dims.l as f64;
        for r in 0..dims.r {
            v[[z, r]] = a + (bv - a) * r as f64 / dims.r as f64;
        }
    }
    v
}

/// First guess for the weighting pass: a 1/distance bulge around the point
/// contact, clamped to [0, 1].
fn initial_wp_guess(dims: &GridDims) -> Array2<f64> {
    let mut v = Array2::zeros((dims.l + 1, dims.r + 1));
    let a = (dims.lc + dims.rc / 2) as f64;
    let b = 2.0 * a / (dims.l + dims.r) as f64;
    for z in 1..dims.l {
        for r in 1..dims.r {
            let d = ((z * z + r * r) as f64).sqrt();
            v[[z, r]] = (a / d - b).clamp(0.0, 1.0);
        }
    }
    for z in 0..=dims.lc {
        for r in 0..=dims.rc {
            v[[z, r]] = 1.0;
        }
    }
    v
}

/// Report potential and field along the two axes after the coarse solve.
fn axis_report(v: &Array2<f64>, dims: &GridDims) {
    log::info!("  z(mm)(r=0)      V   E(V/cm) |  r(mm)(z=0)      V   E(V/cm)");
    let mut az = v[[0, 0]];
    let mut ar = v[[0, 0]];
    for z in 0..=dims.l {
        let ez = (v[[z, 0]] - az) / (0.1 * dims.step);
        let left = format!("{:10.1} {:8.1} {:8.1}  |", z as f64 * dims.step, v[[z, 0]], ez);
        az = v[[z, 0]];
        if z > dims.r {
            log::info!("{left}");
        } else {
            let r = z;
            let er = (v[[0, r]] - ar) / (0.1 * dims.step);
            log::info!("{left}{:10.1} {:8.1} {:8.1}", r as f64 * dims.step, v[[0, r]], er);
            ar = v[[0, r]];
        }
    }
}
