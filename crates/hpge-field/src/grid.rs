//! Grid levels and the coarse-to-fine schedule.
//!
//! If the grid is fine compared to the crystal, plain relaxation takes far
//! too long to converge, so the solve runs on up to three successively finer
//! grids whose spacings are integer multiples of the target spacing. The
//! coarsest level spans roughly 100 pixels across the larger crystal
//! dimension.

use hpge_types::config::DetectorConfig;
use ndarray::Array2;

/// Integer dimensions of one relaxation level, in units of the grid spacing.
///
/// Potential arrays at this level have shape `(l + 1, r + 1)`, indexed
/// `[z, r]`.
#[derive(Debug, Clone, PartialEq)]
pub struct GridDims {
    /// Grid spacing in mm.
    pub step: f64,
    /// Crystal length and radius.
    pub l: usize,
    pub r: usize,
    /// Point-contact length and radius.
    pub lc: usize,
    pub rc: usize,
    /// Signed sub-pixel offsets of the true contact boundary from the
    /// nearest pixel center, in grid units; zero when snapped.
    pub dlc: f64,
    pub drc: f64,
    /// 45° bottom-taper length.
    pub lt: usize,
    /// Wrap-around contact radius; falls back to `r - lt` when unset.
    pub ro: usize,
    /// Ditch depth and width next to the wrap-around contact.
    pub lo: usize,
    pub wo: usize,
}

impl GridDims {
    fn new(cfg: &DetectorConfig, step: f64, dlc_tol: f64, drc_tol: f64) -> Self {
        let round = |x: f64| (x / step).round() as usize;

        let l = round(cfg.xtal_length);
        let r = round(cfg.xtal_radius);
        let lc = round(cfg.pc_length);
        let rc = round(cfg.pc_radius);

        let mut dlc = cfg.pc_length / step - lc as f64;
        if dlc.abs() < dlc_tol {
            dlc = 0.0;
        }
        let mut drc = cfg.pc_radius / step - rc as f64;
        if drc.abs() < drc_tol {
            drc = 0.0;
        }

        let lt = round(cfg.taper_length);
        let mut ro = round(cfg.wrap_around_radius);
        if ro == 0 || ro >= r {
            ro = r - lt; // inner radius of the taper
        }

        GridDims {
            step,
            l,
            r,
            lc,
            rc,
            dlc,
            drc,
            lt,
            ro,
            lo: round(cfg.ditch_depth),
            wo: round(cfg.ditch_thickness),
        }
    }

    /// Dimensions for the Poisson (bias) pass.
    pub fn for_bias(cfg: &DetectorConfig, step: f64) -> Self {
        Self::new(cfg, step, 0.01, 0.05)
    }

    /// Dimensions for the Laplace (weighting) pass, which snaps the contact
    /// length slightly more eagerly.
    pub fn for_weighting(cfg: &DetectorConfig, step: f64) -> Self {
        Self::new(cfg, step, 0.05, 0.05)
    }
}

/// Choose 1, 2 or 3 grid spacings ending at `final_step`.
pub fn grid_schedule(length: f64, radius: f64, final_step: f64) -> Vec<f64> {
    let scale = (length * radius).sqrt();
    let i = 1 + ((scale / final_step) as usize) / 100;
    if i < 2 {
        vec![final_step]
    } else if i < 6 {
        vec![i as f64 * final_step, final_step]
    } else {
        let j = (i + 4) / 5;
        let i = (i + j - 1) / j;
        vec![
            (i * j) as f64 * final_step,
            j as f64 * final_step,
            final_step,
        ]
    }
}

/// Bilinearly interpolate a converged coarse potential onto a grid `ratio`
/// times finer with extents `(fine_l + 1, fine_r + 1)`.
pub fn prolongate(coarse: &Array2<f64>, fine_l: usize, fine_r: usize, ratio: usize) -> Array2<f64> {
    let (cl, cr) = coarse.dim();
    let mut fine = Array2::zeros((fine_l + 1, fine_r + 1));

    for zz in 0..=fine_l {
        let fz = zz as f64 / ratio as f64;
        let z0 = (fz.floor() as usize).min(cl - 2);
        let tz = (fz - z0 as f64).min(1.0);
        for rr in 0..=fine_r {
            let fr = rr as f64 / ratio as f64;
            let r0 = (fr.floor() as usize).min(cr - 2);
            let tr = (fr - r0 as f64).min(1.0);

            fine[[zz, rr]] = (1.0 - tz) * (1.0 - tr) * coarse[[z0, r0]]
                + tz * (1.0 - tr) * coarse[[z0 + 1, r0]]
                + (1.0 - tz) * tr * coarse[[z0, r0 + 1]]
                + tz * tr * coarse[[z0 + 1, r0 + 1]];
        }
    }
    fine
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpge_types::config::DetectorConfig;

    fn ppc() -> DetectorConfig {
        DetectorConfig {
            xtal_length: 50.5,
            xtal_radius: 34.5,
            pc_length: 2.1,
            pc_radius: 1.4,
            taper_length: 4.5,
            xtal_grid: 0.5,
            ..Default::default()
        }
    }

    #[test]
    fn test_schedule_single_level() {
        // scale = √(50.5·34.5) ≈ 41.7 mm, 83 pixels at 0.5 mm → one level.
        let s = grid_schedule(50.5, 34.5, 0.5);
        assert_eq!(s, vec![0.5]);
    }

    #[test]
    fn test_schedule_two_levels() {
        // 417 pixels at 0.1 mm → two levels with integer ratio.
        let s = grid_schedule(50.5, 34.5, 0.1);
        assert_eq!(s.len(), 2);
        assert!((s[0] - 0.5).abs() < 1e-12);
        assert!((s[1] - 0.1).abs() < 1e-12);
        let ratio = s[0] / s[1];
        assert!((ratio - ratio.round()).abs() < 1e-9);
    }

    #[test]
    fn test_schedule_three_levels() {
        // 979 pixels at 0.1 mm → three levels.
        let s = grid_schedule(120.0, 80.0, 0.1);
        assert_eq!(s.len(), 3);
        assert!(s[0] > s[1] && s[1] > s[2]);
        let r01 = s[0] / s[1];
        let r12 = s[1] / s[2];
        assert!((r01 - r01.round()).abs() < 1e-9);
        assert!((r12 - r12.round()).abs() < 1e-9);
    }

    #[test]
    fn test_dims_subpixel_offsets() {
        let d = GridDims::for_bias(&ppc(), 0.5);
        assert_eq!((d.l, d.r), (101, 69));
        // 1.4 / 0.5 = 2.8 → rc = 3, boundary 0.2 pixels inside the pixel center
        assert_eq!(d.rc, 3);
        assert!((d.drc + 0.2).abs() < 1e-9);
        // 2.1 / 0.5 = 4.2 → lc = 4, boundary 0.2 pixels beyond
        assert_eq!(d.lc, 4);
        assert!((d.dlc - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_dims_snap_small_offsets() {
        let mut cfg = ppc();
        cfg.pc_radius = 1.51; // 3.02 pixels → snaps to 3
        let d = GridDims::for_bias(&cfg, 0.5);
        assert_eq!(d.rc, 3);
        assert_eq!(d.drc, 0.0);
    }

    #[test]
    fn test_wrap_around_fallback() {
        let d = GridDims::for_bias(&ppc(), 0.5);
        // no wrap-around configured → taper inner radius
        assert_eq!(d.ro, d.r - d.lt);
    }

    #[test]
    fn test_prolongate_exact_at_nodes() {
        let coarse = Array2::from_shape_fn((6, 5), |(z, r)| (3 * z + r) as f64);
        let fine = prolongate(&coarse, 10, 8, 2);
        for z in 0..6 {
            for r in 0..5 {
                assert!(
                    (fine[[2 * z, 2 * r]] - coarse[[z, r]]).abs() < 1e-12,
                    "node ({z},{r}) not reproduced"
                );
            }
        }
    }

    #[test]
    fn test_prolongate_then_restrict_smooth() {
        // A smooth quadratic sampled on the coarse grid, prolongated, then
        // restricted by 4-point averaging, agrees with the coarse samples to
        // O(h²) of the smooth field.
        let h = 0.5;
        let f = |z: f64, r: f64| 0.3 * z * z - 0.1 * r * r + 0.05 * z * r + 2.0;
        let coarse = Array2::from_shape_fn((11, 11), |(z, r)| f(z as f64 * h, r as f64 * h));
        let fine = prolongate(&coarse, 20, 20, 2);

        for z in 0..10 {
            for r in 0..10 {
                let avg = 0.25
                    * (fine[[2 * z, 2 * r]]
                        + fine[[2 * z + 1, 2 * r]]
                        + fine[[2 * z, 2 * r + 1]]
                        + fine[[2 * z + 1, 2 * r + 1]]);
                let exact = f((z as f64 + 0.25) * h, (r as f64 + 0.25) * h);
                assert!(
                    (avg - exact).abs() < 0.5 * h * h,
                    "restriction off at ({z},{r}): {avg} vs {exact}"
                );
            }
        }
    }
}
