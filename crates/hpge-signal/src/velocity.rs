//! Anisotropic drift-velocity lookup.
//!
//! Carriers in germanium drift at different speeds along the ⟨100⟩, ⟨110⟩
//! and ⟨111⟩ crystal axes. The table file carries |v|(|E|) for both carriers
//! along all three axes; at load time each row gets closed-form anisotropy
//! coefficients so a query is a binary search plus one multiply-add per
//! coefficient:
//!
//!   v(θ, φ) = v₁₀₀ − a·sin²θ − b·sin⁴θ − c·sin²(2φ)·sin⁴θ
//!
//! Fixing v at the [110] and [111] directions and requiring cubic symmetry
//! (the [011] direction must reproduce v₁₁₀ as well) determines (a, b, c)
//! uniquely.
//!
//! Temperature scaling follows Omar & Reggiani: v(E,T) = μ₀(T)E / (1 +
//! μ₀(T)E/v_s(T)) with μ₀(T) = μ₀(1 K)·T^p and v_s(T) = B·√tanh(θ/2T);
//! every row is rescaled by v(E,T)/v(E,77 K).

use std::path::Path;

use hpge_types::constants::{MAX_TEMP_K, MIN_TEMP_K, REF_TEMP_K};
use hpge_types::error::{HpgeError, HpgeResult};

/// Which carrier a lookup is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Carrier {
    Electron,
    Hole,
}

/// Omar–Reggiani mobility parameters for one carrier, from the table file's
/// `e` / `h` summary lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MobilityParams {
    /// μ₀ at 1 K, cm²/(V·s).
    pub mu0_1k: f64,
    /// Temperature power p of μ₀(T) = μ₀(1 K)·T^p.
    pub power: f64,
    /// Saturation parameter B, cm/s.
    pub sat_b: f64,
    /// Phonon temperature θ, K.
    pub theta: f64,
}

/// One table row after preparation: axis velocities in mm/ns plus the
/// anisotropy coefficients and their slopes toward the next row.
#[derive(Debug, Clone, Copy, Default)]
struct Row {
    e: f64,
    e100: f64,
    e110: f64,
    e111: f64,
    h100: f64,
    h110: f64,
    h111: f64,
    ea: f64,
    eb: f64,
    ec: f64,
    ebp: f64,
    ecp: f64,
    ha: f64,
    hb: f64,
    hc: f64,
    hbp: f64,
    hcp: f64,
}

/// Interpolated anisotropy coefficients at one field strength.
#[derive(Debug, Clone, Copy)]
pub struct AxisVelocity {
    pub v100: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl AxisVelocity {
    /// Evaluate v(θ, φ) for a field direction given as sin²θ and sin²(2φ).
    pub fn evaluate(&self, sin2_theta: f64, sin2_2phi: f64) -> f64 {
        let sin4_theta = sin2_theta * sin2_theta;
        self.v100 - self.a * sin2_theta - self.b * sin4_theta - self.c * sin2_2phi * sin4_theta
    }
}

/// The prepared drift-velocity table.
#[derive(Debug, Clone)]
pub struct VelocityTable {
    rows: Vec<Row>,
    pub electron: MobilityParams,
    pub hole: MobilityParams,
}

impl VelocityTable {
    /// Load a table file and correct it to the given crystal temperature.
    pub fn from_file<P: AsRef<Path>>(path: P, temp_k: f64) -> HpgeResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&contents, temp_k)
    }

    /// Parse table text and correct it to the given crystal temperature.
    pub fn parse(contents: &str, temp_k: f64) -> HpgeResult<Self> {
        let mut rows: Vec<Row> = Vec::new();
        let mut electron: Option<MobilityParams> = None;
        let mut hole: Option<MobilityParams> = None;

        for (lineno, raw) in contents.lines().enumerate() {
            let line = match raw.find('#') {
                Some(pos) => &raw[..pos],
                None => raw,
            };
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.is_empty() {
                continue;
            }

            let malformed = |message: String| HpgeError::MalformedTable {
                line: lineno + 1,
                message,
            };

            if tokens[0] == "e" || tokens[0] == "h" {
                if tokens.len() < 5 {
                    return Err(malformed("summary line needs four parameters".into()));
                }
                let vals: Vec<f64> = tokens[1..5]
                    .iter()
                    .map(|t| t.parse::<f64>())
                    .collect::<Result<_, _>>()
                    .map_err(|_| malformed("bad number in summary line".into()))?;
                let params = MobilityParams {
                    mu0_1k: vals[0],
                    power: vals[1],
                    sat_b: vals[2],
                    theta: vals[3],
                };
                if tokens[0] == "e" {
                    electron = Some(params);
                } else {
                    hole = Some(params);
                }
                continue;
            }

            if tokens.len() < 7 {
                return Err(malformed(format!(
                    "expected 7 columns, found {}",
                    tokens.len()
                )));
            }
            let vals: Vec<f64> = tokens[..7]
                .iter()
                .map(|t| t.parse::<f64>())
                .collect::<Result<_, _>>()
                .map_err(|_| malformed("bad number in table row".into()))?;

            if let Some(last) = rows.last() {
                if vals[0] <= last.e {
                    return Err(malformed(format!(
                        "field values must be strictly ascending ({} after {})",
                        vals[0], last.e
                    )));
                }
            }
            rows.push(Row {
                e: vals[0],
                e100: vals[1],
                e110: vals[2],
                e111: vals[3],
                h100: vals[4],
                h110: vals[5],
                h111: vals[6],
                ..Default::default()
            });
        }

        let electron = electron.ok_or(HpgeError::MalformedTable {
            line: 0,
            message: "missing `e` mobility summary line".into(),
        })?;
        let hole = hole.ok_or(HpgeError::MalformedTable {
            line: 0,
            message: "missing `h` mobility summary line".into(),
        })?;
        if rows.len() < 2 {
            return Err(HpgeError::MalformedTable {
                line: 0,
                message: "table needs at least two field rows".into(),
            });
        }

        // anchor at E = 0 with v = 0
        if rows[0].e > 0.0 {
            rows.insert(0, Row::default());
        }

        let mut table = VelocityTable {
            rows,
            electron,
            hole,
        };
        table.correct_temperature(temp_k)?;
        table.prepare();
        Ok(table)
    }

    /// Largest tabulated field strength, V/cm.
    pub fn max_field(&self) -> f64 {
        self.rows.last().map(|r| r.e).unwrap_or(0.0)
    }

    /// Rescale every row by the Omar–Reggiani factor v(E,T)/v(E,77 K).
    fn correct_temperature(&mut self, temp_k: f64) -> HpgeResult<()> {
        if !(MIN_TEMP_K..=MAX_TEMP_K).contains(&temp_k) {
            return Err(HpgeError::OutOfTemperatureRange { temp: temp_k });
        }
        if (temp_k - REF_TEMP_K).abs() < 1e-9 {
            return Ok(());
        }
        for row in &mut self.rows {
            if row.e <= 0.0 {
                continue;
            }
            let fe = omar_reggiani(&self.electron, row.e, temp_k)
                / omar_reggiani(&self.electron, row.e, REF_TEMP_K);
            let fh = omar_reggiani(&self.hole, row.e, temp_k)
                / omar_reggiani(&self.hole, row.e, REF_TEMP_K);
            row.e100 *= fe;
            row.e110 *= fe;
            row.e111 *= fe;
            row.h100 *= fh;
            row.h110 *= fh;
            row.h111 *= fh;
        }
        Ok(())
    }

    /// Closed-form anisotropy coefficients per row, then slopes to the next
    /// row so in-range interpolation is one multiply-add per coefficient.
    fn prepare(&mut self) {
        for row in &mut self.rows {
            let (ea, eb, ec) = anisotropy_coefficients(row.e100, row.e110, row.e111);
            let (ha, hb, hc) = anisotropy_coefficients(row.h100, row.h110, row.h111);
            row.ea = ea;
            row.eb = eb;
            row.ec = ec;
            row.ha = ha;
            row.hb = hb;
            row.hc = hc;
        }
        for i in 0..self.rows.len() - 1 {
            let de = self.rows[i + 1].e - self.rows[i].e;
            self.rows[i].ebp = (self.rows[i + 1].eb - self.rows[i].eb) / de;
            self.rows[i].ecp = (self.rows[i + 1].ec - self.rows[i].ec) / de;
            self.rows[i].hbp = (self.rows[i + 1].hb - self.rows[i].hb) / de;
            self.rows[i].hcp = (self.rows[i + 1].hc - self.rows[i].hc) / de;
        }
    }

    /// Interpolate the axis velocity and anisotropy coefficients at field
    /// strength `abse` (V/cm). Fails with `OutOfField` beyond the last row.
    pub fn lookup(&self, abse: f64, carrier: Carrier) -> HpgeResult<AxisVelocity> {
        if abse > self.max_field() {
            return Err(HpgeError::OutOfField { r: 0.0, z: 0.0 });
        }
        let i = match self
            .rows
            .partition_point(|row| row.e <= abse)
            .checked_sub(1)
        {
            Some(i) => i.min(self.rows.len() - 2),
            None => 0,
        };
        let lo = &self.rows[i];
        let hi = &self.rows[i + 1];
        let f = (abse - lo.e) / (hi.e - lo.e);
        let de = abse - lo.e;

        Ok(match carrier {
            Carrier::Electron => AxisVelocity {
                v100: lo.e100 + f * (hi.e100 - lo.e100),
                a: lo.ea + f * (hi.ea - lo.ea),
                b: lo.eb + lo.ebp * de,
                c: lo.ec + lo.ecp * de,
            },
            Carrier::Hole => AxisVelocity {
                v100: lo.h100 + f * (hi.h100 - lo.h100),
                a: lo.ha + f * (hi.ha - lo.ha),
                b: lo.hb + lo.hbp * de,
                c: lo.hc + lo.hcp * de,
            },
        })
    }
}

/// Omar–Reggiani drift velocity at field `e` (V/cm) and temperature `t` (K).
fn omar_reggiani(p: &MobilityParams, e: f64, t: f64) -> f64 {
    let mu0 = p.mu0_1k * t.powf(p.power);
    let v_sat = p.sat_b * (p.theta / (2.0 * t)).tanh().sqrt();
    mu0 * e / (1.0 + mu0 * e / v_sat)
}

/// Solve the three-direction system for (a, b, c) given the measured
/// velocities along [100], [110] and [111]. Cubic symmetry supplies the
/// third equation: [011] (θ = π/4, φ = π/2) must also reproduce v₁₁₀.
fn anisotropy_coefficients(v100: f64, v110: f64, v111: f64) -> (f64, f64, f64) {
    let p = v100 - v110;
    let q = v100 - v111;
    let a = 4.5 * q - 2.0 * p;
    let b = 8.0 * p - 9.0 * q;
    let c = 4.5 * q - 5.0 * p;
    (a, b, c)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
# E(V/cm) e100 e110 e111 h100 h110 h111
100   0.0320 0.0295 0.0282 0.0395 0.0340 0.0318
300   0.0723 0.0666 0.0637 0.0762 0.0656 0.0613
500   0.0954 0.0879 0.0841 0.0917 0.0789 0.0737
1000  0.1231 0.1135 0.1086 0.1052 0.0905 0.0846
2000  0.1415 0.1305 0.1248 0.1124 0.0967 0.0903
5000  0.1539 0.1419 0.1358 0.1165 0.1002 0.0936
e  5.66e7  -1.668  1.3e7  200.0
h  1.63e8  -1.747  1.06e7  144.0
";

    #[test]
    fn test_load_checked_in_table() {
        let path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../config/drift_vel_tb.dat");
        let t = VelocityTable::from_file(&path, 90.0).unwrap();
        assert!((t.max_field() - 5000.0).abs() < 1e-9);
        assert!(t.rows[0].e == 0.0, "anchor row present");
        // velocities stay monotone in E after the temperature correction
        for i in 1..t.rows.len() {
            assert!(t.rows[i].h100 > t.rows[i - 1].h100);
            assert!(t.rows[i].e100 > t.rows[i - 1].e100);
        }
    }

    #[test]
    fn test_parse_and_anchor() {
        let t = VelocityTable::parse(TABLE, 77.0).unwrap();
        assert_eq!(t.rows.len(), 7, "zero anchor row must be inserted");
        assert_eq!(t.rows[0].e, 0.0);
        assert!((t.max_field() - 5000.0).abs() < 1e-9);
        assert!((t.electron.theta - 200.0).abs() < 1e-9);
        assert!((t.hole.power + 1.747).abs() < 1e-9);
    }

    #[test]
    fn test_axis_identities() {
        // The closed form must reproduce all three measured directions.
        let t = VelocityTable::parse(TABLE, 77.0).unwrap();
        let v = t.lookup(1000.0, Carrier::Electron).unwrap();
        // [100]: θ = 0
        assert!((v.evaluate(0.0, 0.0) - 0.1231).abs() < 1e-9);
        // [110]: θ = π/2, φ = π/4
        assert!((v.evaluate(1.0, 1.0) - 0.1135).abs() < 1e-9);
        // [011]: θ = π/4, φ = π/2 — equivalent by cubic symmetry
        assert!((v.evaluate(0.5, 0.0) - 0.1135).abs() < 1e-9);
        // [111]: sin²θ = 2/3, sin²2φ = 1
        assert!((v.evaluate(2.0 / 3.0, 1.0) - 0.1086).abs() < 1e-9);

        let h = t.lookup(1000.0, Carrier::Hole).unwrap();
        assert!((h.evaluate(1.0, 1.0) - 0.0905).abs() < 1e-9);
        assert!((h.evaluate(2.0 / 3.0, 1.0) - 0.0846).abs() < 1e-9);
    }

    #[test]
    fn test_low_field_interpolates_from_origin() {
        let t = VelocityTable::parse(TABLE, 77.0).unwrap();
        let v = t.lookup(50.0, Carrier::Hole).unwrap();
        assert!((v.v100 - 0.5 * 0.0395).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_field() {
        let t = VelocityTable::parse(TABLE, 77.0).unwrap();
        assert!(matches!(
            t.lookup(6000.0, Carrier::Electron),
            Err(HpgeError::OutOfField { .. })
        ));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let bad = "\
100 1 1 1 1 1 1
100 2 2 2 2 2 2
e 1 1 1 1
h 1 1 1 1
";
        assert!(matches!(
            VelocityTable::parse(bad, 77.0),
            Err(HpgeError::MalformedTable { .. })
        ));
    }

    #[test]
    fn test_missing_summary_rejected() {
        let bad = "100 1 1 1 1 1 1\n200 2 2 2 2 2 2\ne 1 1 1 1\n";
        assert!(matches!(
            VelocityTable::parse(bad, 77.0),
            Err(HpgeError::MalformedTable { .. })
        ));
    }

    #[test]
    fn test_temperature_range() {
        assert!(matches!(
            VelocityTable::parse(TABLE, 120.0),
            Err(HpgeError::OutOfTemperatureRange { .. })
        ));
        assert!(VelocityTable::parse(TABLE, 110.0).is_ok());
    }

    #[test]
    fn test_warming_slows_carriers() {
        let cold = VelocityTable::parse(TABLE, 77.0).unwrap();
        let warm = VelocityTable::parse(TABLE, 100.0).unwrap();
        let vc = cold.lookup(1000.0, Carrier::Electron).unwrap().v100;
        let vw = warm.lookup(1000.0, Carrier::Electron).unwrap().v100;
        assert!(vw < vc, "mobility must drop with temperature: {vw} !< {vc}");
    }
}
