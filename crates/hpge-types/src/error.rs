// ─────────────────────────────────────────────────────────────────────
// HPGe Siggen — Error
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HpgeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed table at line {line}: {message}")]
    MalformedTable { line: usize, message: String },

    #[error("point (r={r:.2} mm, z={z:.2} mm) is outside the field grid")]
    OutOfField { r: f64, z: f64 },

    #[error("start point is outside the detector")]
    OutsideDetector,

    #[error("crystal temperature {temp} K is outside the allowed range [77, 110] K")]
    OutOfTemperatureRange { temp: f64 },

    #[error("relaxation stopped after {iterations} iterations with max change {max_dif:.3e}")]
    NotConverged { iterations: usize, max_dif: f64 },

    #[error("drift exhausted the time-step budget in a high-field region")]
    Truncated,
}

pub type HpgeResult<T> = Result<T, HpgeError>;
