//! Crystal geometry for PPC and BEGe detectors with cylindrical symmetry.
//!
//! The only question this module answers is whether a point lies inside the
//! active volume: the bulletized top, the point-contact cavity and the 45°
//! bottom taper all cut into the bounding cylinder.

use crate::point::Point;

/// Immutable crystal dimensions, all in mm.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrystalGeometry {
    /// Axial length of the crystal.
    pub length: f64,
    /// Outer radius.
    pub radius: f64,
    /// Bulletization radius at the top of the crystal.
    pub top_bullet_radius: f64,
    /// Bulletization radius at the bottom (BEGe only, unused by the oracle).
    pub bottom_bullet_radius: f64,
    /// Point-contact length and radius.
    pub pc_length: f64,
    pub pc_radius: f64,
    /// Length of the 45° taper at the bottom of ORTEC-type crystals.
    pub taper_length: f64,
    /// Wrap-around contact radius (BEGe; zero for ORTEC).
    pub wrap_around_radius: f64,
    /// Ditch next to the wrap-around contact (BEGe; zero for ORTEC).
    pub ditch_depth: f64,
    pub ditch_thickness: f64,
}

impl CrystalGeometry {
    /// True iff the cylindrical point (r, z) lies inside the active volume.
    pub fn contains_cyl(&self, r: f64, z: f64) -> bool {
        if z >= self.length || z < 0.0 {
            return false;
        }
        if r > self.radius {
            return false;
        }
        let br = self.top_bullet_radius;
        if z > self.length - br {
            let dz = z - (self.length - br);
            if r > (self.radius - br) + (br * br - dz * dz).sqrt() {
                return false;
            }
        }
        if self.pc_radius > 0.0 && z <= self.pc_length && r <= self.pc_radius {
            return false;
        }
        if self.taper_length > 0.0 && z < self.taper_length && r > self.length - self.taper_length + z
        {
            return false;
        }
        true
    }

    /// Cartesian entry point: collapses to (r, z) and defers to
    /// [`contains_cyl`](Self::contains_cyl).
    pub fn contains(&self, pt: Point) -> bool {
        self.contains_cyl(pt.cyl_radius(), pt.z)
    }
}
