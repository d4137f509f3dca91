//! Cell classification, permittivity tables and Dirichlet values.
//!
//! Each pixel of a level carries a tag that the relaxation kernel dispatches
//! on: plain bulk, fixed electrode, a sub-pixel contact edge in r or z, or a
//! pinch-off island (weighting pass only). The vacuum ditch next to a BEGe
//! wrap-around contact gets permittivity 1 instead of 16, averaged onto the
//! faces between pixels.

use hpge_types::constants::EPS_GE;
use ndarray::{Array1, Array2};

use crate::grid::GridDims;

/// Relaxation-kernel dispatch tag for one pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    /// Plain bulk, no complications.
    Bulk,
    /// Dirichlet pixel; its value never changes.
    Fixed,
    /// Radial edge of the point contact with a sub-pixel boundary.
    EdgeR,
    /// Axial edge of the point contact with a sub-pixel boundary.
    EdgeZ,
    /// Undepleted island isolated from the point contact (weighting only).
    Pinched,
}

/// Per-level lookup tables for the relaxation kernel.
pub struct StencilTables {
    /// Face permittivity toward r+1 / z+1, averaged across the face.
    pub eps_dr: Array2<f64>,
    pub eps_dz: Array2<f64>,
    /// Fraction of the pixel volume that carries space charge.
    pub vfraction: Array2<f64>,
    /// Kernel dispatch tag per pixel.
    pub kind: Array2<CellKind>,
    /// Cylindrical geometric weights for the r+1 / r-1 neighbors.
    pub s1: Array1<f64>,
    pub s2: Array1<f64>,
    /// Interpolation weights for sub-pixel contact edges.
    pub frc: f64,
    pub flc: f64,
}

/// True iff pixel (z, r) lies in the vacuum ditch.
fn in_ditch(dims: &GridDims, z: usize, r: usize) -> bool {
    z < dims.lo && r < dims.ro && r as i64 > dims.ro as i64 - dims.wo as i64 - 1
}

/// Face permittivities: 16 inside Ge, 1 in the ditch, averaged on faces.
fn permittivity(dims: &GridDims) -> (Array2<f64>, Array2<f64>) {
    let shape = (dims.l + 1, dims.r + 1);
    let mut eps = Array2::from_elem(shape, EPS_GE);
    let mut eps_dr = Array2::from_elem(shape, EPS_GE);
    let mut eps_dz = Array2::from_elem(shape, EPS_GE);

    for z in 0..=dims.l {
        for r in 0..=dims.r {
            if in_ditch(dims, z, r) {
                eps[[z, r]] = 1.0;
            }
            if r > 0 {
                eps_dr[[z, r - 1]] = (eps[[z, r - 1]] + eps[[z, r]]) / 2.0;
            }
            if z > 0 {
                eps_dz[[z - 1, r]] = (eps[[z - 1, r]] + eps[[z, r]]) / 2.0;
            }
        }
    }
    (eps_dr, eps_dz)
}

/// Geometric weights of the relaxation as a function of r: the r+1 face of
/// an annulus is larger than the r-1 face by the ratio of circumferences.
fn cyl_weights(nr: usize) -> (Array1<f64>, Array1<f64>) {
    let mut s1 = Array1::zeros(nr);
    let mut s2 = Array1::zeros(nr);
    s1[0] = 2.0;
    s2[0] = 0.0;
    for r in 1..nr {
        s1[r] = 1.0 + 0.5 / r as f64;
        s2[r] = 1.0 - 0.5 / r as f64;
    }
    (s1, s2)
}

/// Shared electrode classification for both passes. `outer` and `contact`
/// are the Dirichlet values written into both potential planes.
#[allow(clippy::too_many_arguments)]
fn classify(
    dims: &GridDims,
    outer: f64,
    contact: f64,
    scale_vfraction: bool,
    va: &mut Array2<f64>,
    vb: &mut Array2<f64>,
) -> (Array2<CellKind>, Array2<f64>, f64, f64) {
    let shape = (dims.l + 1, dims.r + 1);
    let mut kind = Array2::from_elem(shape, CellKind::Bulk);
    let mut vfraction = Array2::from_elem(shape, 1.0);
    let mut frc = 0.0;
    let mut flc = 0.0;

    for z in 0..=dims.l {
        for r in 0..=dims.r {
            if in_ditch(dims, z, r) {
                vfraction[[z, r]] = 0.0;
            }

            // outer (HV) contact: top face, outer radius, taper, wrap-around
            if z == dims.l
                || r == dims.r
                || r + dims.lt >= z + dims.r
                || (z == 0 && r >= dims.ro)
            {
                kind[[z, r]] = CellKind::Fixed;
                va[[z, r]] = outer;
                vb[[z, r]] = outer;
            }
            // inside (point) contact
            else if z <= dims.lc && r <= dims.rc {
                kind[[z, r]] = CellKind::Fixed;
                va[[z, r]] = contact;
                vb[[z, r]] = contact;
                // contact boundary falls inside this pixel: relax it with a
                // modified weight toward the contact interior
                if r == dims.rc && dims.drc < -0.05 {
                    kind[[z, r]] = CellKind::EdgeR;
                    frc = -1.0 / dims.drc;
                    if scale_vfraction {
                        vfraction[[z, r]] *= -2.0 * dims.drc;
                    }
                }
                if z == dims.lc && dims.dlc < -0.05 {
                    kind[[z, r]] = CellKind::EdgeZ;
                    flc = -1.0 / dims.dlc;
                    if scale_vfraction {
                        vfraction[[z, r]] *= -2.0 * dims.dlc;
                    }
                }
            }
            // contact boundary falls between this pixel and the contact
            else if z <= dims.lc && r == dims.rc + 1 && dims.drc > 0.05 {
                kind[[z, r]] = CellKind::EdgeR;
                frc = 1.0 / (1.0 - dims.drc);
            } else if z == dims.lc + 1 && r <= dims.rc && dims.dlc > 0.05 {
                kind[[z, r]] = CellKind::EdgeZ;
                flc = 1.0 / (1.0 - dims.dlc);
            }
        }
    }
    (kind, vfraction, frc, flc)
}

/// Tables for the Poisson (bias) pass. Writes the Dirichlet values into both
/// potential planes.
pub fn bias_tables(
    dims: &GridDims,
    bias_volts: f64,
    va: &mut Array2<f64>,
    vb: &mut Array2<f64>,
) -> StencilTables {
    let (eps_dr, eps_dz) = permittivity(dims);
    let (s1, s2) = cyl_weights(dims.r + 1);
    let (kind, vfraction, frc, flc) = classify(dims, bias_volts, 0.0, true, va, vb);
    StencilTables {
        eps_dr,
        eps_dz,
        vfraction,
        kind,
        s1,
        s2,
        frc,
        flc,
    }
}

/// Tables for the Laplace (weighting) pass: 1 on the point contact, 0 on
/// every other electrode. Undepleted pixels from the bias solve are treated
/// as part of the point contact; pinch-off bubbles get the `Pinched` tag.
pub fn weighting_tables(
    dims: &GridDims,
    undepleted: &Array2<u8>,
    gridfact: usize,
    fully_depleted: bool,
    va: &mut Array2<f64>,
    vb: &mut Array2<f64>,
) -> StencilTables {
    let (eps_dr, eps_dz) = permittivity(dims);
    let (s1, s2) = cyl_weights(dims.r + 1);
    let (mut kind, vfraction, frc, flc) = classify(dims, 0.0, 1.0, false, va, vb);

    if !fully_depleted {
        let (nr_map, nz_map) = undepleted.dim();
        for z in 0..=dims.l {
            for r in 0..=dims.r {
                let mr = (r * gridfact).min(nr_map - 1);
                let mz = (z * gridfact).min(nz_map - 1);
                match undepleted[[mr, mz]] {
                    b'*' => {
                        kind[[z, r]] = CellKind::Fixed;
                        va[[z, r]] = 1.0;
                        vb[[z, r]] = 1.0;
                    }
                    b'B' => kind[[z, r]] = CellKind::Pinched,
                    _ => {}
                }
            }
        }
    }

    StencilTables {
        eps_dr,
        eps_dz,
        vfraction,
        kind,
        s1,
        s2,
        frc,
        flc,
    }
}
