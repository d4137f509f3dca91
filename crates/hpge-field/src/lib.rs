// ─────────────────────────────────────────────────────────────────────
// HPGe Siggen — Field Solver
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Relaxation solver for PPC and BEGe point-contact germanium detectors.
//!
//! Solves Poisson's equation for the bias potential (with space charge from
//! ionized impurities) and Laplace's equation for the point-contact weighting
//! potential on a cylindrically symmetric (z, r) grid, coarse to fine.

pub mod boundary;
pub mod grid;
pub mod output;
pub mod relax;
pub mod solver;
