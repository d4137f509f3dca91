// ─────────────────────────────────────────────────────────────────────
// HPGe Siggen — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Detector setup file parsing.
//!
//! The setup format is line oriented: `key value` pairs separated by
//! whitespace, with `#` starting a comment. Unknown keys are ignored with a
//! warning so that one file can serve both the field and the signal stage.

use std::path::Path;

use crate::constants::DEFAULT_MAX_ITERATIONS;
use crate::error::{HpgeError, HpgeResult};
use crate::geometry::CrystalGeometry;

/// Verbosity levels accepted by `verbosity_level`.
pub const TERSE: u32 = 0;
pub const NORMAL: u32 = 1;
pub const CHATTY: u32 = 2;

/// Everything the field solver and the signal stage need to know, straight
/// from one setup file.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub verbosity: u32,

    // geometry (mm)
    pub xtal_length: f64,
    pub xtal_radius: f64,
    pub top_bullet_radius: f64,
    pub bottom_bullet_radius: f64,
    pub pc_length: f64,
    pub pc_radius: f64,
    pub bulletize_pc: bool,
    pub taper_length: f64,
    pub wrap_around_radius: f64,
    pub ditch_depth: f64,
    pub ditch_thickness: f64,
    pub li_thickness: f64,

    // field solution
    pub xtal_grid: f64,
    pub impurity_z0: f64,
    pub impurity_gradient: f64,
    pub xtal_hv: f64,
    pub max_iterations: usize,
    pub write_field: u32,
    pub write_wp: u32,

    // file names
    pub drift_name: String,
    pub field_name: String,
    pub wp_name: String,

    // signal calculation
    pub xtal_temp: f64,
    pub preamp_tau: f64,
    pub time_steps_calc: usize,
    pub step_time_calc: f64,
    pub step_time_out: f64,
    pub charge_cloud_size: f64,
    pub use_diffusion: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            verbosity: NORMAL,
            xtal_length: 0.0,
            xtal_radius: 0.0,
            top_bullet_radius: 0.0,
            bottom_bullet_radius: 0.0,
            pc_length: 0.0,
            pc_radius: 0.0,
            bulletize_pc: false,
            taper_length: 0.0,
            wrap_around_radius: 0.0,
            ditch_depth: 0.0,
            ditch_thickness: 0.0,
            li_thickness: 0.0,
            xtal_grid: 0.5,
            impurity_z0: 0.0,
            impurity_gradient: 0.0,
            xtal_hv: 0.0,
            max_iterations: 0,
            write_field: 0,
            write_wp: 0,
            drift_name: String::new(),
            field_name: String::new(),
            wp_name: String::new(),
            xtal_temp: crate::constants::REF_TEMP_K,
            preamp_tau: 0.0,
            time_steps_calc: 0,
            step_time_calc: 1.0,
            step_time_out: 1.0,
            charge_cloud_size: 0.0,
            use_diffusion: false,
        }
    }
}

impl DetectorConfig {
    /// Load a setup file from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> HpgeResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_str_contents(&contents)
    }

    /// Parse setup text (the file contents).
    pub fn from_str_contents(contents: &str) -> HpgeResult<Self> {
        let mut cfg = DetectorConfig::default();

        for (lineno, raw) in contents.lines().enumerate() {
            let line = match raw.find('#') {
                Some(pos) => &raw[..pos],
                None => raw,
            };
            let mut tokens = line.split_whitespace();
            let key = match tokens.next() {
                Some(k) => k,
                None => continue,
            };
            let value = tokens.next().ok_or_else(|| {
                HpgeError::Config(format!("line {}: key `{key}` has no value", lineno + 1))
            })?;

            match key {
                "verbosity_level" => cfg.verbosity = parse(key, value, lineno)?,
                "xtal_length" => cfg.xtal_length = parse(key, value, lineno)?,
                "xtal_radius" => cfg.xtal_radius = parse(key, value, lineno)?,
                "top_bullet_radius" => cfg.top_bullet_radius = parse(key, value, lineno)?,
                "bottom_bullet_radius" => cfg.bottom_bullet_radius = parse(key, value, lineno)?,
                "pc_length" => cfg.pc_length = parse(key, value, lineno)?,
                "pc_radius" => cfg.pc_radius = parse(key, value, lineno)?,
                "bulletize_PC" => cfg.bulletize_pc = parse::<i64>(key, value, lineno)? != 0,
                "taper_length" => cfg.taper_length = parse(key, value, lineno)?,
                "wrap_around_radius" => cfg.wrap_around_radius = parse(key, value, lineno)?,
                "ditch_depth" => cfg.ditch_depth = parse(key, value, lineno)?,
                "ditch_thickness" => cfg.ditch_thickness = parse(key, value, lineno)?,
                "Li_thickness" => cfg.li_thickness = parse(key, value, lineno)?,
                "xtal_grid" => cfg.xtal_grid = parse(key, value, lineno)?,
                "impurity_z0" => cfg.impurity_z0 = parse(key, value, lineno)?,
                "impurity_gradient" => cfg.impurity_gradient = parse(key, value, lineno)?,
                "xtal_HV" => cfg.xtal_hv = parse(key, value, lineno)?,
                "max_iterations" => cfg.max_iterations = parse(key, value, lineno)?,
                "write_field" => cfg.write_field = parse(key, value, lineno)?,
                "write_WP" => cfg.write_wp = parse(key, value, lineno)?,
                "drift_name" => cfg.drift_name = value.to_string(),
                "field_name" => cfg.field_name = value.to_string(),
                "wp_name" => cfg.wp_name = value.to_string(),
                "xtal_temp" => cfg.xtal_temp = parse(key, value, lineno)?,
                "preamp_tau" => cfg.preamp_tau = parse(key, value, lineno)?,
                "time_steps_calc" => cfg.time_steps_calc = parse(key, value, lineno)?,
                "step_time_calc" => cfg.step_time_calc = parse(key, value, lineno)?,
                "step_time_out" => cfg.step_time_out = parse(key, value, lineno)?,
                "charge_cloud_size" => cfg.charge_cloud_size = parse(key, value, lineno)?,
                "use_diffusion" => cfg.use_diffusion = parse::<i64>(key, value, lineno)? != 0,
                other => log::warn!("ignoring unknown setup key `{other}`"),
            }
        }

        if cfg.xtal_grid < 0.001 {
            cfg.xtal_grid = 0.5;
        }
        Ok(cfg)
    }

    /// Crystal geometry view of this setup.
    pub fn geometry(&self) -> CrystalGeometry {
        CrystalGeometry {
            length: self.xtal_length,
            radius: self.xtal_radius,
            top_bullet_radius: self.top_bullet_radius,
            bottom_bullet_radius: self.bottom_bullet_radius,
            pc_length: self.pc_length,
            pc_radius: self.pc_radius,
            taper_length: self.taper_length,
            wrap_around_radius: self.wrap_around_radius,
            ditch_depth: self.ditch_depth,
            ditch_thickness: self.ditch_thickness,
        }
    }

    /// Iteration ceiling for the relaxation, falling back to the default.
    pub fn iteration_ceiling(&self) -> usize {
        if self.max_iterations > 0 {
            self.max_iterations
        } else {
            DEFAULT_MAX_ITERATIONS
        }
    }

    /// Number of samples in the output signal.
    pub fn output_time_steps(&self) -> usize {
        let ratio = if self.step_time_calc > 0.0 {
            (self.step_time_out / self.step_time_calc).round().max(1.0) as usize
        } else {
            1
        };
        self.time_steps_calc / ratio
    }

    /// Sanity checks shared by the field solver:
    /// geometry must be bigger than one grid pixel, bias and impurity must
    /// have opposite signs, and the pixel count must stay manageable.
    pub fn validate_for_field(&self) -> HpgeResult<()> {
        let l = (self.xtal_length / self.xtal_grid).round() as i64;
        let r = (self.xtal_radius / self.xtal_grid).round() as i64;
        if l <= 1 || r <= 1 {
            return Err(HpgeError::Config(
                "crystal length and radius must span more than one grid pixel".into(),
            ));
        }
        if l * r > 2500 * 2500 {
            return Err(HpgeError::Config(
                "crystal size divided by grid size is too large".into(),
            ));
        }
        if (self.xtal_hv < 0.0 && self.impurity_z0 < 0.0)
            || (self.xtal_hv > 0.0 && self.impurity_z0 > 0.0)
        {
            return Err(HpgeError::Config(
                "bias voltage and impurity concentration must have opposite signs".into(),
            ));
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str, lineno: usize) -> HpgeResult<T> {
    value.parse().map_err(|_| {
        HpgeError::Config(format!(
            "line {}: cannot parse `{value}` for key `{key}`",
            lineno + 1
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    /// Workspace root, two levels up from this crate's manifest.
    fn workspace_root() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
    }

    #[test]
    fn test_load_example_config() {
        let cfg = DetectorConfig::from_file(workspace_root().join("config/ppc.config")).unwrap();
        assert!((cfg.xtal_length - 50.5).abs() < 1e-10);
        assert!((cfg.xtal_radius - 34.5).abs() < 1e-10);
        assert!((cfg.pc_radius - 1.4).abs() < 1e-10);
        assert!((cfg.xtal_hv - 2500.0).abs() < 1e-10);
        assert!((cfg.impurity_z0 + 0.318).abs() < 1e-10);
        assert_eq!(cfg.max_iterations, 30000);
        assert_eq!(cfg.time_steps_calc, 4000);
        assert_eq!(cfg.verbosity, NORMAL);
        assert!(!cfg.use_diffusion);
        assert_eq!(cfg.drift_name, "config/drift_vel_tb.dat");
    }

    #[test]
    fn test_parse_inline_with_comments() {
        let cfg = DetectorConfig::from_str_contents(
            "# comment only\n\
             xtal_length 30 # trailing comment\n\
             xtal_HV -3000\n\
             impurity_z0 0.5\n\
             unknown_key 7\n",
        )
        .unwrap();
        assert!((cfg.xtal_length - 30.0).abs() < 1e-10);
        assert!((cfg.xtal_hv + 3000.0).abs() < 1e-10);
        assert!((cfg.impurity_z0 - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_missing_value_is_config_error() {
        let err = DetectorConfig::from_str_contents("xtal_length\n").unwrap_err();
        assert!(matches!(err, HpgeError::Config(_)));
    }

    #[test]
    fn test_bad_number_is_config_error() {
        let err = DetectorConfig::from_str_contents("xtal_length abc\n").unwrap_err();
        assert!(matches!(err, HpgeError::Config(_)));
    }

    #[test]
    fn test_grid_defaults_when_unset() {
        let cfg = DetectorConfig::from_str_contents("xtal_grid 0.0\n").unwrap();
        assert!((cfg.xtal_grid - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_sign_check() {
        let mut cfg = DetectorConfig {
            xtal_length: 30.0,
            xtal_radius: 30.0,
            xtal_hv: 2000.0,
            impurity_z0: 1.0,
            ..Default::default()
        };
        assert!(cfg.validate_for_field().is_err());
        cfg.impurity_z0 = -1.0;
        assert!(cfg.validate_for_field().is_ok());
    }

    #[test]
    fn test_output_time_steps() {
        let cfg = DetectorConfig {
            time_steps_calc: 4000,
            step_time_calc: 1.0,
            step_time_out: 10.0,
            ..Default::default()
        };
        assert_eq!(cfg.output_time_steps(), 400);
    }
}
