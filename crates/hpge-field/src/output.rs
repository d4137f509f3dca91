//! ASCII output files and the capacitance integrals.
//!
//! The field stage writes three artifacts: the potential/E-field table read
//! back by the signal stage, the weighting-potential table, and a small
//! character map of any undepleted pixels. Files are column oriented with a
//! `##` header line, outer loop over r, inner over z, and a blank line
//! between r blocks.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use hpge_types::constants::EPSILON_GE_PF_PER_MM;
use hpge_types::error::HpgeResult;
use ndarray::Array2;

use crate::solver::{BiasSolution, WeightingSolution};

/// Write the potential and electric field. `polarity` restores the external
/// sign convention (-1 for n-type material, +1 otherwise). Field components
/// are central differences in V/cm, one-sided at the grid edges, with
/// E_r = 0 pinned on the symmetry axis.
pub fn write_field_file<P: AsRef<Path>>(
    path: P,
    bias: &BiasSolution,
    polarity: f64,
) -> HpgeResult<()> {
    let dims = &bias.dims;
    let step = dims.step;
    let mut out = BufWriter::new(File::create(path)?);

    writeln!(out, "## r (mm), z (mm), V (V),  E (V/cm), E_r (V/cm), E_z (V/cm)")?;
    let v = |z: usize, r: usize| polarity * bias.v[[z, r]];

    for r in 0..=dims.r {
        for z in 0..=dims.l {
            let e_r = if r == 0 {
                0.0
            } else if r == dims.r {
                (v(z, r - 1) - v(z, r)) / (0.1 * step)
            } else {
                (v(z, r - 1) - v(z, r + 1)) / (0.2 * step)
            };
            let e_z = if z == 0 {
                (v(z, r) - v(z + 1, r)) / (0.1 * step)
            } else if z == dims.l {
                (v(z - 1, r) - v(z, r)) / (0.1 * step)
            } else {
                (v(z - 1, r) - v(z + 1, r)) / (0.2 * step)
            };
            writeln!(
                out,
                "{:7.2} {:7.2} {:7.1} {:7.1} {:7.1} {:7.1}",
                r as f64 * step,
                z as f64 * step,
                v(z, r),
                (e_r * e_r + e_z * e_z).sqrt(),
                e_r,
                e_z
            )?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

/// Write the weighting potential of the point contact.
pub fn write_wp_file<P: AsRef<Path>>(path: P, wp: &WeightingSolution) -> HpgeResult<()> {
    let dims = &wp.dims;
    let mut out = BufWriter::new(File::create(path)?);

    writeln!(out, "## r (mm), z (mm), WP")?;
    for r in 0..=dims.r {
        for z in 0..=dims.l {
            writeln!(
                out,
                "{:7.2} {:7.2} {:10.6}",
                r as f64 * dims.step,
                z as f64 * dims.step,
                wp.wp[[z, r]]
            )?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

/// Write the depletion character map, one row per radius from the outside in.
pub fn write_undepleted_map<P: AsRef<Path>>(path: P, map: &Array2<u8>) -> HpgeResult<()> {
    let (nr, nz) = map.dim();
    let mut out = BufWriter::new(File::create(path)?);
    for r in (0..nr).rev() {
        let row: String = (0..nz - 1).map(|z| map[[r, z]] as char).collect();
        writeln!(out, "{row}")?;
    }
    out.flush()?;
    Ok(())
}

/// Capacitance of the point contact from the weighting field:
/// ½ ε ∫|∇W|² dV = ½ C V² with V = 1 V, so C = ε ∫|∇W|² dV. The second
/// value is the alternative surface-integral estimate over the contact
/// faces, meaningful only when the crystal is fully depleted.
pub fn capacitance(wp: &WeightingSolution) -> (f64, f64) {
    let dims = &wp.dims;
    let step = dims.step;
    let mut esum = 0.0;
    let mut esum2 = 0.0;

    for z in 0..dims.l {
        for r in 0..dims.r {
            let e_r = if r == 0 {
                0.0
            } else {
                (wp.wp[[z, r]] - wp.wp[[z, r + 1]]) / (0.1 * step)
            };
            let e_z = (wp.wp[[z, r]] - wp.wp[[z + 1, r]]) / (0.1 * step);
            esum += (e_r * e_r + e_z * e_z) * r as f64;

            if (r == dims.rc && z <= dims.lc) || (r <= dims.rc && z == dims.lc) {
                esum2 += (e_r * e_r + e_z * e_z).sqrt() * r as f64;
            }
        }
    }

    let pi = std::f64::consts::PI;
    esum *= 2.0 * pi * 0.01 * EPSILON_GE_PF_PER_MM * step.powi(3);
    esum2 *= 2.0 * pi * EPSILON_GE_PF_PER_MM * step.powi(3);
    (esum, esum2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::FieldSolver;
    use hpge_types::config::DetectorConfig;

    fn small_config() -> DetectorConfig {
        DetectorConfig {
            xtal_length: 10.0,
            xtal_radius: 10.0,
            pc_length: 2.0,
            pc_radius: 2.0,
            xtal_grid: 0.5,
            xtal_hv: 1000.0,
            impurity_z0: -0.1,
            max_iterations: 20000,
            ..Default::default()
        }
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("hpge-field-test-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_field_file_layout() {
        let solver = FieldSolver::new(small_config()).unwrap();
        let bias = solver.solve_bias().unwrap();
        let path = temp_path("ev.dat");
        write_field_file(&path, &bias, solver.polarity()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("##"));

        let nr = bias.dims.r + 1;
        let nz = bias.dims.l + 1;
        let data: Vec<&str> = text.lines().filter(|l| !l.starts_with("##") && !l.trim().is_empty()).collect();
        assert_eq!(data.len(), nr * nz);
        // first data row is the axis: r = 0, z = 0, V = 0 (contact), E_r = 0
        let first: Vec<f64> = data[0]
            .split_whitespace()
            .map(|t| t.parse().unwrap())
            .collect();
        assert_eq!(first.len(), 6);
        assert!(first[0].abs() < 1e-9 && first[1].abs() < 1e-9);
        assert!(first[4].abs() < 1e-9, "E_r must vanish on the axis");
        // blocks separated by blank lines, one per radius
        let blanks = text.lines().filter(|l| l.trim().is_empty()).count();
        assert_eq!(blanks, nr);
    }

    #[test]
    fn test_wp_file_values_in_range() {
        let solver = FieldSolver::new(small_config()).unwrap();
        let bias = solver.solve_bias().unwrap();
        let wp = solver.solve_weighting(&bias).unwrap();
        let path = temp_path("wp.dat");
        write_wp_file(&path, &wp).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        for line in text.lines().skip(1).filter(|l| !l.trim().is_empty()) {
            let w: f64 = line.split_whitespace().nth(2).unwrap().parse().unwrap();
            assert!((-1e-9..=1.0 + 1e-9).contains(&w));
        }
    }

    #[test]
    fn test_undepleted_map_write() {
        let mut map = Array2::from_elem((3, 5), b'.');
        map[[1, 2]] = b'*';
        let path = temp_path("undepleted.txt");
        write_undepleted_map(&path, &map).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();
        let rows: Vec<&str> = text.lines().collect();
        // outermost radius first, last map column dropped
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], "....");
        assert_eq!(rows[1], "..*.");
    }

    #[test]
    fn test_capacitance_positive_and_consistent() {
        let solver = FieldSolver::new(small_config()).unwrap();
        let bias = solver.solve_bias().unwrap();
        let wp = solver.solve_weighting(&bias).unwrap();
        let (esum, esum2) = capacitance(&wp);
        assert!(esum > 0.0);
        assert!(esum2 > 0.0);
    }
}
