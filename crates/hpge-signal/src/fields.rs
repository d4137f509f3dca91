//! Field store: the solved E-field and weighting-potential grids.
//!
//! Both grids live on the same uniform cylindrical (r, z) mesh and are
//! read-only for the life of the program; every query is a bilinear
//! interpolation. The drift-velocity query combines the E-field direction
//! with the anisotropic velocity table.

use std::path::Path;

use hpge_types::config::DetectorConfig;
use hpge_types::error::{HpgeError, HpgeResult};
use hpge_types::point::Point;
use ndarray::Array2;

use crate::velocity::{Carrier, VelocityTable};

/// Precomputed fields plus the velocity table, as loaded once at setup.
#[derive(Debug, Clone)]
pub struct FieldSetup {
    step: f64,
    rmax: f64,
    zmax: f64,
    /// E-field components on the grid, V/cm, indexed `[z, r]`.
    er: Array2<f64>,
    ez: Array2<f64>,
    /// Weighting potential in [0, 1], indexed `[z, r]`.
    wp: Array2<f64>,
    table: VelocityTable,
}

impl FieldSetup {
    /// Read the field file, the weighting-potential file and the velocity
    /// table named by the setup, correcting the table to the crystal
    /// temperature.
    pub fn load(cfg: &DetectorConfig) -> HpgeResult<Self> {
        let step = cfg.xtal_grid;
        let nr = (cfg.xtal_radius / step).round() as usize + 1;
        let nz = (cfg.xtal_length / step).round() as usize + 1;

        log::info!("reading field data from {}", cfg.field_name);
        let (er, ez) = read_field_grid(&cfg.field_name, nr, nz, step)?;
        log::info!("reading weighting potential from {}", cfg.wp_name);
        let wp = read_wp_grid(&cfg.wp_name, nr, nz, step)?;
        let table = VelocityTable::from_file(&cfg.drift_name, cfg.xtal_temp)?;

        Ok(FieldSetup {
            step,
            rmax: cfg.xtal_radius,
            zmax: cfg.xtal_length,
            er,
            ez,
            wp,
            table,
        })
    }

    /// Assemble a field store from in-memory grids (used by tests and by
    /// callers that solve and simulate in one process).
    pub fn from_parts(
        step: f64,
        rmax: f64,
        zmax: f64,
        er: Array2<f64>,
        ez: Array2<f64>,
        wp: Array2<f64>,
        table: VelocityTable,
    ) -> Self {
        FieldSetup {
            step,
            rmax,
            zmax,
            er,
            ez,
            wp,
            table,
        }
    }

    pub fn velocity_table(&self) -> &VelocityTable {
        &self.table
    }

    fn bilinear(&self, grid: &Array2<f64>, r: f64, z: f64) -> HpgeResult<f64> {
        if r < 0.0 || r > self.rmax || z < 0.0 || z > self.zmax {
            return Err(HpgeError::OutOfField { r, z });
        }
        let (nz, nr) = grid.dim();
        let fr = r / self.step;
        let fz = z / self.step;
        let ir = (fr.floor() as usize).min(nr - 2);
        let iz = (fz.floor() as usize).min(nz - 2);
        let tr = (fr - ir as f64).clamp(0.0, 1.0);
        let tz = (fz - iz as f64).clamp(0.0, 1.0);

        Ok((1.0 - tz) * ((1.0 - tr) * grid[[iz, ir]] + tr * grid[[iz, ir + 1]])
            + tz * ((1.0 - tr) * grid[[iz + 1, ir]] + tr * grid[[iz + 1, ir + 1]]))
    }

    /// Interpolated (E_r, E_z) at cylindrical (r, z), V/cm.
    pub fn efield_at_cyl(&self, r: f64, z: f64) -> HpgeResult<(f64, f64)> {
        Ok((self.bilinear(&self.er, r, z)?, self.bilinear(&self.ez, r, z)?))
    }

    /// Interpolated weighting potential at a Cartesian point.
    pub fn wpotential(&self, pt: Point) -> HpgeResult<f64> {
        self.bilinear(&self.wp, pt.cyl_radius(), pt.z)
    }

    /// Drift velocity (mm/ns) of a carrier with charge sign `q` at `pt`.
    ///
    /// The anisotropy angles are those of the local field direction against
    /// the crystal axes: the z axis is [001] and the x axis [100]. Holes
    /// drift with the field, electrons against it.
    pub fn drift_velocity(&self, pt: Point, q: f64) -> HpgeResult<Point> {
        let r = pt.cyl_radius();
        let (er, ez) = self.efield_at_cyl(r, pt.z)?;

        // Cartesian field components; E has no azimuthal part
        let (fx, fy) = if r > 1e-9 {
            (er * pt.x / r, er * pt.y / r)
        } else {
            (0.0, 0.0)
        };
        let fz = ez;
        let abse = (fx * fx + fy * fy + fz * fz).sqrt();
        if abse < 1e-12 {
            return Ok(Point::default());
        }

        let sin2_theta = (fx * fx + fy * fy) / (abse * abse);
        let fxy2 = fx * fx + fy * fy;
        let sin2_2phi = if fxy2 > 0.0 {
            4.0 * fx * fx * fy * fy / (fxy2 * fxy2)
        } else {
            0.0
        };

        let carrier = if q > 0.0 {
            Carrier::Hole
        } else {
            Carrier::Electron
        };
        let axis = self.table.lookup(abse, carrier).map_err(|e| match e {
            HpgeError::OutOfField { .. } => HpgeError::OutOfField { r, z: pt.z },
            other => other,
        })?;
        let speed = axis.evaluate(sin2_theta, sin2_2phi);

        let scale = q.signum() * speed / abse;
        Ok(Point::new(fx * scale, fy * scale, fz * scale))
    }
}

/// Read the six-column field file into (E_r, E_z) grids.
fn read_field_grid(
    path: &str,
    nr: usize,
    nz: usize,
    step: f64,
) -> HpgeResult<(Array2<f64>, Array2<f64>)> {
    let contents = std::fs::read_to_string(path)?;
    let mut er = Array2::zeros((nz, nr));
    let mut ez = Array2::zeros((nz, nr));
    let mut filled = 0usize;

    for (lineno, line) in contents.lines().enumerate() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let vals: Vec<f64> = line
            .split_whitespace()
            .map(|t| t.parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| HpgeError::MalformedTable {
                line: lineno + 1,
                message: format!("bad number in field file {path}"),
            })?;
        if vals.len() < 6 {
            return Err(HpgeError::MalformedTable {
                line: lineno + 1,
                message: format!("field file {path} needs 6 columns"),
            });
        }
        let ir = (vals[0] / step).round() as usize;
        let iz = (vals[1] / step).round() as usize;
        if ir >= nr || iz >= nz {
            return Err(HpgeError::MalformedTable {
                line: lineno + 1,
                message: format!("field file {path} point off the grid"),
            });
        }
        er[[iz, ir]] = vals[4];
        ez[[iz, ir]] = vals[5];
        filled += 1;
    }

    if filled != nr * nz {
        return Err(HpgeError::MalformedTable {
            line: 0,
            message: format!(
                "field file {path} covers {filled} of {} grid points",
                nr * nz
            ),
        });
    }
    Ok((er, ez))
}

/// Read the three-column weighting-potential file.
fn read_wp_grid(path: &str, nr: usize, nz: usize, step: f64) -> HpgeResult<Array2<f64>> {
    let contents = std::fs::read_to_string(path)?;
    let mut wp = Array2::zeros((nz, nr));
    let mut filled = 0usize;

    for (lineno, line) in contents.lines().enumerate() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let vals: Vec<f64> = line
            .split_whitespace()
            .map(|t| t.parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| HpgeError::MalformedTable {
                line: lineno + 1,
                message: format!("bad number in WP file {path}"),
            })?;
        if vals.len() < 3 {
            return Err(HpgeError::MalformedTable {
                line: lineno + 1,
                message: format!("WP file {path} needs 3 columns"),
            });
        }
        let ir = (vals[0] / step).round() as usize;
        let iz = (vals[1] / step).round() as usize;
        if ir >= nr || iz >= nz {
            return Err(HpgeError::MalformedTable {
                line: lineno + 1,
                message: format!("WP file {path} point off the grid"),
            });
        }
        wp[[iz, ir]] = vals[2];
        filled += 1;
    }

    if filled != nr * nz {
        return Err(HpgeError::MalformedTable {
            line: 0,
            message: format!("WP file {path} covers {filled} of {} grid points", nr * nz),
        });
    }
    Ok(wp)
}
