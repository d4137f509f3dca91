//! The per-pixel relaxation kernel.
//!
//! One sweep reads the `old` plane and writes the `new` plane (a Jacobi-like
//! two-buffer update; the caller swaps the planes between sweeps). The same
//! kernel serves both passes: the Poisson pass adds the space-charge term and
//! clamps undepleted pixels, the Laplace pass runs it with zero source.

use ndarray::Array2;

use crate::boundary::{CellKind, StencilTables};
use crate::grid::GridDims;

/// Which equation a sweep is solving.
pub enum PassKind {
    /// Poisson pass for the bias potential. `n0` is the impurity
    /// concentration at z = 0 (1e10 e/cm³), `gradient_per_cell` the impurity
    /// gradient per grid cell, and `kappa` the charge-to-potential factor
    /// for this grid spacing.
    Bias {
        n0: f64,
        gradient_per_cell: f64,
        kappa: f64,
    },
    /// Laplace pass for the weighting potential.
    Weighting,
}

/// Convergence bookkeeping for one sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepStats {
    pub max_dif: f64,
    pub sum_dif: f64,
    /// Potential assigned to the first pinch-off bubble seen this sweep
    /// (Poisson pass only; 0 when none formed).
    pub bubble_volts: f64,
}

/// Marking context for the undepleted map: the map (indexed `[r, z]` at the
/// final grid resolution) and the ratio of this level's spacing to the final
/// spacing.
pub struct DepletionMark<'a> {
    pub map: &'a mut Array2<u8>,
    pub gridfact: usize,
}

impl DepletionMark<'_> {
    fn set(&mut self, r: usize, z: usize, ch: u8) {
        let (nr, nz) = self.map.dim();
        self.map[[(r * self.gridfact).min(nr - 1), (z * self.gridfact).min(nz - 1)]] = ch;
    }
}

/// One full sweep over the interior pixels.
pub fn relax_sweep(
    old: &Array2<f64>,
    new: &mut Array2<f64>,
    tables: &StencilTables,
    dims: &GridDims,
    pass: &PassKind,
    mut mark: Option<DepletionMark<'_>>,
) -> SweepStats {
    let mut stats = SweepStats::default();
    let mut pinched_sum1 = 0.0;
    let mut pinched_sum2 = 0.0;

    let s1 = &tables.s1;
    let s2 = &tables.s2;
    let edr = &tables.eps_dr;
    let edz = &tables.eps_dz;

    for z in 0..dims.l {
        for r in 0..dims.r {
            let mut v_sum;
            let mut eps_sum;
            let mut min_nb;

            match tables.kind[[z, r]] {
                CellKind::Fixed => continue,

                CellKind::Bulk => {
                    v_sum = old[[z + 1, r]] * edz[[z, r]] + old[[z, r + 1]] * edr[[z, r]] * s1[r];
                    eps_sum = edz[[z, r]] + edr[[z, r]] * s1[r];
                    min_nb = old[[z + 1, r]].min(old[[z, r + 1]]);
                    if z > 0 {
                        v_sum += old[[z - 1, r]] * edz[[z - 1, r]];
                        eps_sum += edz[[z - 1, r]];
                        min_nb = min_nb.min(old[[z - 1, r]]);
                    } else {
                        // reflection symmetry around z = 0
                        v_sum += old[[z + 1, r]] * edz[[z, r]];
                        eps_sum += edz[[z, r]];
                    }
                    if r > 0 {
                        v_sum += old[[z, r - 1]] * edr[[z, r - 1]] * s2[r];
                        eps_sum += edr[[z, r - 1]] * s2[r];
                        min_nb = min_nb.min(old[[z, r - 1]]);
                    } else {
                        // reflection symmetry around r = 0
                        v_sum += old[[z, r + 1]] * edr[[z, r]] * s1[r];
                        eps_sum += edr[[z, r]] * s1[r];
                    }
                }

                CellKind::EdgeR => {
                    // contact radius off-pixel: modified weight toward r-1
                    v_sum = old[[z + 1, r]] * edz[[z, r]]
                        + old[[z, r + 1]] * edr[[z, r]] * s1[r]
                        + old[[z, r - 1]] * edr[[z, r - 1]] * s2[r] * tables.frc;
                    eps_sum =
                        edz[[z, r]] + edr[[z, r]] * s1[r] + edr[[z, r - 1]] * s2[r] * tables.frc;
                    min_nb = old[[z + 1, r]].min(old[[z, r + 1]]).min(old[[z, r - 1]]);
                    if z > 0 {
                        v_sum += old[[z - 1, r]] * edz[[z - 1, r]];
                        eps_sum += edz[[z - 1, r]];
                        min_nb = min_nb.min(old[[z - 1, r]]);
                    } else {
                        v_sum += old[[z + 1, r]] * edz[[z, r]];
                        eps_sum += edz[[z, r]];
                    }
                }

                CellKind::EdgeZ => {
                    // contact length off-pixel: modified weight toward z-1
                    v_sum = old[[z + 1, r]] * edz[[z, r]]
                        + old[[z, r + 1]] * edr[[z, r]] * s1[r]
                        + old[[z - 1, r]] * edz[[z - 1, r]] * tables.flc;
                    eps_sum = edz[[z, r]] + edr[[z, r]] * s1[r] + edz[[z - 1, r]] * tables.flc;
                    min_nb = old[[z + 1, r]].min(old[[z, r + 1]]).min(old[[z - 1, r]]);
                    if r > 0 {
                        v_sum += old[[z, r - 1]] * edr[[z, r - 1]] * s2[r];
                        eps_sum += edr[[z, r - 1]] * s2[r];
                        min_nb = min_nb.min(old[[z, r - 1]]);
                    } else {
                        v_sum += old[[z, r + 1]] * edr[[z, r]] * s1[r];
                        eps_sum += edr[[z, r]] * s1[r];
                    }
                    // contact corner needs the radial correction as well
                    if z == dims.lc && z > 0 && tables.kind[[z - 1, r]] == CellKind::EdgeR {
                        v_sum += old[[z, r - 1]] * edr[[z, r - 1]] * s2[r] * (tables.frc - 1.0);
                        eps_sum += edr[[z, r - 1]] * s2[r] * (tables.frc - 1.0);
                        min_nb = min_nb.min(old[[z, r - 1]]);
                    }
                }

                CellKind::Pinched => {
                    // the island floats together: collect the area-weighted
                    // sum over bulk neighbors, broadcast after the sweep
                    if tables.kind[[z + 1, r]] == CellKind::Bulk {
                        pinched_sum1 += old[[z + 1, r]] * edz[[z, r]];
                        pinched_sum2 += edz[[z, r]];
                    }
                    if tables.kind[[z, r + 1]] == CellKind::Bulk {
                        pinched_sum1 += old[[z, r + 1]] * edr[[z, r]] * s1[r];
                        pinched_sum2 += edr[[z, r]] * s1[r];
                    }
                    if z > 0 && tables.kind[[z - 1, r]] == CellKind::Bulk {
                        pinched_sum1 += old[[z - 1, r]] * edz[[z - 1, r]];
                        pinched_sum2 += edz[[z - 1, r]];
                    }
                    if r > 0 && tables.kind[[z, r - 1]] == CellKind::Bulk {
                        pinched_sum1 += old[[z, r - 1]] * edr[[z, r - 1]] * s2[r];
                        pinched_sum2 += edr[[z, r - 1]] * s2[r];
                    }
                    continue;
                }
            }

            let mean = v_sum / eps_sum;
            let mut value = mean;

            if let PassKind::Bias {
                n0,
                gradient_per_cell,
                kappa,
            } = *pass
            {
                value = mean + tables.vfraction[[z, r]] * (n0 + gradient_per_cell * z as f64) * kappa;
                let charged = tables.vfraction[[z, r]] > 0.45;
                if charged {
                    if let Some(m) = mark.as_mut() {
                        m.set(r, z, b'.');
                    }
                }
                if value <= 0.0 {
                    // undepleted pixel
                    value = 0.0;
                    if charged {
                        if let Some(m) = mark.as_mut() {
                            m.set(r, z, b'*');
                        }
                    }
                } else if value < min_nb {
                    // local minimum below every neighbor: a pinch-off bubble
                    if stats.bubble_volts == 0.0 {
                        stats.bubble_volts = min_nb + 0.1;
                    }
                    value = stats.bubble_volts;
                    if charged {
                        if let Some(m) = mark.as_mut() {
                            m.set(r, z, b'*');
                        }
                    }
                }
            }

            new[[z, r]] = value;
            let dif = (old[[z, r]] - value).abs();
            stats.sum_dif += dif;
            if dif > stats.max_dif {
                stats.max_dif = dif;
            }
        }
    }

    // broadcast the common pinched value
    if pinched_sum2 > 0.1 {
        let mean = pinched_sum1 / pinched_sum2;
        for z in 0..dims.l {
            for r in 0..dims.r {
                if tables.kind[[z, r]] == CellKind::Pinched {
                    new[[z, r]] = mean;
                    let dif = (old[[z, r]] - mean).abs();
                    stats.sum_dif += dif;
                    if dif > stats.max_dif {
                        stats.max_dif = dif;
                    }
                }
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::bias_tables;
    use crate::grid::GridDims;
    use hpge_types::config::DetectorConfig;
    use ndarray::Array2;

    fn small_dims() -> GridDims {
        let cfg = DetectorConfig {
            xtal_length: 10.0,
            xtal_radius: 10.0,
            pc_length: 2.0,
            pc_radius: 2.0,
            xtal_grid: 0.5,
            ..Default::default()
        };
        GridDims::for_bias(&cfg, 0.5)
    }

    #[test]
    fn test_fixed_pixels_untouched() {
        let dims = small_dims();
        let shape = (dims.l + 1, dims.r + 1);
        let mut va = Array2::zeros(shape);
        let mut vb = Array2::zeros(shape);
        let t = bias_tables(&dims, 600.0, &mut va, &mut vb);
        let pass = PassKind::Weighting;

        relax_sweep(&va.clone(), &mut vb, &t, &dims, &pass, None);
        assert!((vb[[dims.l, 3]] - 600.0).abs() < 1e-12);
        assert!(vb[[1, 1]].abs() < 1e-12);
    }

    #[test]
    fn test_laplace_zero_interior_stays_zero() {
        // All-zero boundary and zero source: one sweep changes nothing.
        let dims = small_dims();
        let shape = (dims.l + 1, dims.r + 1);
        let mut va = Array2::zeros(shape);
        let mut vb = Array2::zeros(shape);
        let t = bias_tables(&dims, 0.0, &mut va, &mut vb);

        let stats = relax_sweep(&va.clone(), &mut vb, &t, &dims, &PassKind::Weighting, None);
        assert!(stats.max_dif < 1e-15);
    }

    #[test]
    fn test_bias_space_charge_term() {
        // With zero boundary everywhere, one sweep from zero leaves exactly
        // the space-charge contribution in each charged bulk pixel.
        let dims = small_dims();
        let shape = (dims.l + 1, dims.r + 1);
        let mut va = Array2::zeros(shape);
        let mut vb = Array2::zeros(shape);
        let t = bias_tables(&dims, 0.0, &mut va, &mut vb);

        let kappa = 0.7072 * 4.0 * 0.25;
        let pass = PassKind::Bias {
            n0: 1.0,
            gradient_per_cell: 0.0,
            kappa,
        };
        relax_sweep(&va.clone(), &mut vb, &t, &dims, &pass, None);
        assert!((vb[[10, 10]] - kappa).abs() < 1e-12);
    }

    #[test]
    fn test_undepleted_clamp_and_mark() {
        // Negative space charge with zero boundary drives pixels negative:
        // they clamp to zero and get marked undepleted.
        let dims = small_dims();
        let shape = (dims.l + 1, dims.r + 1);
        let mut va = Array2::zeros(shape);
        let mut vb = Array2::zeros(shape);
        let t = bias_tables(&dims, 0.0, &mut va, &mut vb);
        let mut map = Array2::from_elem((dims.r + 1, dims.l + 1), b' ');

        let pass = PassKind::Bias {
            n0: -1.0,
            gradient_per_cell: 0.0,
            kappa: 0.7072,
        };
        relax_sweep(
            &va.clone(),
            &mut vb,
            &t,
            &dims,
            &pass,
            Some(DepletionMark {
                map: &mut map,
                gridfact: 1,
            }),
        );
        assert!(vb[[10, 10]].abs() < 1e-15);
        assert_eq!(map[[10, 10]], b'*');
    }

    #[test]
    fn test_pinched_island_floats_together() {
        use crate::boundary::weighting_tables;

        let cfg = DetectorConfig {
            xtal_length: 10.0,
            xtal_radius: 10.0,
            pc_length: 2.0,
            pc_radius: 2.0,
            xtal_grid: 0.5,
            ..Default::default()
        };
        let dims = GridDims::for_weighting(&cfg, 0.5);
        let mut map = Array2::from_elem((dims.r + 1, dims.l + 1), b' ');
        map[[8, 10]] = b'B';
        map[[9, 10]] = b'B';
        map[[8, 11]] = b'B';

        let shape = (dims.l + 1, dims.r + 1);
        let mut va = Array2::from_elem(shape, 0.3);
        let mut vb = Array2::from_elem(shape, 0.3);
        let t = weighting_tables(&dims, &map, 1, false, &mut va, &mut vb);

        relax_sweep(&va.clone(), &mut vb, &t, &dims, &PassKind::Weighting, None);
        let a = vb[[10, 8]];
        let b = vb[[10, 9]];
        let c = vb[[11, 8]];
        assert!((a - b).abs() < 1e-12 && (a - c).abs() < 1e-12);
        assert!((0.0..=1.0).contains(&a));
    }
}
