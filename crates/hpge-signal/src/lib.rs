// ─────────────────────────────────────────────────────────────────────
// HPGe Siggen — Signal Calculation
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Shockley–Ramo signal calculation on precomputed detector fields.
//!
//! Drifts an electron and a hole from a common starting point through the
//! solved electric field, accumulates the charge induced on the point
//! contact from the weighting-potential difference per step, and shapes the
//! summed waveform with the charge-cloud convolution, the output-rate
//! downsampling and the preamplifier RC response.

pub mod fields;
pub mod signal;
pub mod velocity;
