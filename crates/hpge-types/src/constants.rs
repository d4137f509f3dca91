// ─────────────────────────────────────────────────────────────────────
// HPGe Siggen — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Reference temperature for drift-velocity corrections (K).
pub const REF_TEMP_K: f64 = 77.0;

/// Allowed crystal temperature range for the velocity model (K).
pub const MIN_TEMP_K: f64 = 77.0;
pub const MAX_TEMP_K: f64 = 110.0;

/// Relative permittivity of germanium.
pub const EPS_GE: f64 = 16.0;

/// Permittivity of germanium in pF/mm (8.85e-3 pF/mm vacuum times 16).
pub const EPSILON_GE_PF_PER_MM: f64 = 8.85 * 16.0 / 1000.0;

/// Charge-to-potential conversion for the relaxation kernel, per mm² of
/// pixel area: e/ε for an impurity density of 1e10 e/cm³, in mm·V units.
/// Multiplied by the pixel area h² when a grid level is set up.
pub const E_OVER_EPS: f64 = 0.7072 * 4.0;

/// Diffusion growth of the charge-cloud FWHM² for holes and electrons in Ge,
/// in mm² per ns at 77 K; scales as 77/T with crystal temperature.
pub const DIFFUSION_COEF_H: f64 = 2.9e-4;
pub const DIFFUSION_COEF_E: f64 = 3.7e-4;

/// Weighting potential above which a wandering electron counts as collected.
pub const WP_THRESH_ELECTRONS: f64 = 0.99;

/// Unit charges used by the drift integrator.
pub const HOLE_CHARGE: f64 = 1.0;
pub const ELECTRON_CHARGE: f64 = -1.0;

/// Default relaxation iteration ceiling, halved after the first grid level.
pub const DEFAULT_MAX_ITERATIONS: usize = 50_000;
pub const MAX_ITERATIONS_FACTOR: usize = 2;
