// ─────────────────────────────────────────────────────────────────────
// HPGe Siggen — Drift Integrator
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Charge drift and induced-signal generation.
//!
//! For each event the simulator drifts the electron and the hole from the
//! interaction point, accumulating the Shockley–Ramo induced current
//! q·ΔW per step, then integrates to charge and applies the charge-cloud
//! convolution, the output downsampling and the preamplifier RC response.

use hpge_types::config::DetectorConfig;
use hpge_types::constants::{
    DIFFUSION_COEF_E, DIFFUSION_COEF_H, ELECTRON_CHARGE, HOLE_CHARGE, REF_TEMP_K,
    WP_THRESH_ELECTRONS,
};
use hpge_types::error::{HpgeError, HpgeResult};
use hpge_types::geometry::CrystalGeometry;
use hpge_types::point::Point;

use crate::fields::FieldSetup;

/// Per-event signal simulator. Owns the drift-path buffers and the signal
/// scratches; independent events may run in parallel only on separate
/// instances (the field store itself is read-only and shareable).
pub struct SignalSimulator {
    cfg: DetectorConfig,
    geometry: CrystalGeometry,
    fields: FieldSetup,
    ntsteps_out: usize,

    dpath_e: Vec<Point>,
    dpath_h: Vec<Point>,

    // lazily sized scratches, reused across calls
    signal: Vec<f64>,
    tmp: Vec<f64>,
    sum: Vec<f64>,

    initial_vel: f64,
    final_vel: f64,
    final_charge_size_sq: f64,
}

impl SignalSimulator {
    /// Load fields and velocity table named by the setup and allocate the
    /// drift buffers.
    pub fn new(cfg: DetectorConfig) -> HpgeResult<Self> {
        let fields = FieldSetup::load(&cfg)?;
        Ok(Self::from_parts(cfg, fields))
    }

    /// Assemble a simulator from an already-loaded field store.
    pub fn from_parts(cfg: DetectorConfig, fields: FieldSetup) -> Self {
        let n = cfg.time_steps_calc;
        let ntsteps_out = cfg.output_time_steps();
        log::info!(
            "using {} calculation steps of {} ns; output has {} steps of {} ns",
            n,
            cfg.step_time_calc,
            ntsteps_out,
            cfg.step_time_out
        );
        SignalSimulator {
            geometry: cfg.geometry(),
            fields,
            ntsteps_out,
            dpath_e: vec![Point::default(); n],
            dpath_h: vec![Point::default(); n],
            signal: Vec::new(),
            tmp: Vec::new(),
            sum: Vec::new(),
            initial_vel: 0.0,
            final_vel: 0.0,
            final_charge_size_sq: 0.0,
            cfg,
        }
    }

    /// Number of samples `simulate` writes into the output slice.
    pub fn output_len(&self) -> usize {
        self.ntsteps_out
    }

    /// Electron / hole trajectories of the last simulated event.
    pub fn drift_path_electron(&self) -> &[Point] {
        &self.dpath_e
    }

    pub fn drift_path_hole(&self) -> &[Point] {
        &self.dpath_h
    }

    /// Simulate the charge signal for an event at `pt`.
    ///
    /// Both carriers are summed into the same waveform; the electron may
    /// fail quietly (it often ends in a low-field corner) but a hole
    /// failure fails the event. With `out` given, the charge waveform is
    /// convolved, downsampled to [`output_len`](Self::output_len) samples
    /// and RC-shaped in place.
    pub fn simulate(&mut self, pt: Point, out: Option<&mut [f64]>) -> HpgeResult<()> {
        let tsteps = self.cfg.time_steps_calc;
        if self.signal.len() != tsteps {
            self.signal = vec![0.0; tsteps];
            self.tmp = vec![0.0; tsteps];
            self.sum = vec![0.0; tsteps];
        }
        self.signal.iter_mut().for_each(|s| *s = 0.0);

        if !self.geometry.contains(pt) {
            log::debug!("point ({:.2} {:.2} {:.2}) is outside the detector", pt.x, pt.y, pt.z);
            return Err(HpgeError::OutsideDetector);
        }
        self.dpath_e.iter_mut().for_each(|p| *p = Point::default());
        self.dpath_h.iter_mut().for_each(|p| *p = Point::default());

        // electron truncation is survivable, hole truncation is not
        if let Err(e) = self.drift_carrier(pt, ELECTRON_CHARGE) {
            log::debug!("electron signal failed ({e}); continuing");
        }
        let hole_result = self.drift_carrier(pt, HOLE_CHARGE);

        // current -> charge
        let mut acc = 0.0;
        for s in self.signal.iter_mut() {
            acc += *s;
            *s = acc;
        }

        if let Some(out) = out {
            if self.cfg.charge_cloud_size > 0.001 || self.cfg.use_diffusion {
                self.convolve_charge_cloud();
            }
            self.downsample(out);
            let tau_ratio = self.cfg.preamp_tau / self.cfg.step_time_out;
            if tau_ratio >= 0.1 {
                rc_integrate_in_place(out, tau_ratio);
            }
        }

        hole_result
    }

    /// Drift one carrier and accumulate its induced current into `signal`.
    fn drift_carrier(&mut self, start: Point, q: f64) -> HpgeResult<()> {
        let tsteps = self.cfg.time_steps_calc;
        let dt = self.cfg.step_time_calc;
        // carrier that ends on the point contact: holes for p-type material
        let collecting = (q > 0.0 && self.cfg.impurity_z0 < 0.0)
            || (q < 0.0 && self.cfg.impurity_z0 > 0.0);
        let diffusion_coeff = if q > 0.0 {
            DIFFUSION_COEF_H * dt * REF_TEMP_K / self.cfg.xtal_temp
        } else {
            DIFFUSION_COEF_E * dt * REF_TEMP_K / self.cfg.xtal_temp
        };

        let mut q = q;
        let mut pt = start;
        let mut v = Point::default();
        let mut dx = Point::default();
        let mut wpot = 0.0_f64;
        let mut wpot_old = 0.0_f64;
        let mut vel1 = 0.0_f64;
        let mut low_field = false;
        let mut t = 0usize;

        loop {
            match self.fields.drift_velocity(pt, q) {
                Ok(vv) => v = vv,
                Err(_) => break, // left the field grid
            }
            if q > 0.0 {
                self.dpath_h[t] = pt;
            } else {
                self.dpath_e[t] = pt;
            }

            if collecting {
                if t == 1 {
                    vel1 = v.norm();
                    self.initial_vel = vel1;
                    self.final_vel = vel1;
                    self.final_charge_size_sq =
                        self.cfg.charge_cloud_size * self.cfg.charge_cloud_size;
                } else if t > 1 && self.cfg.use_diffusion {
                    let vel0 = vel1;
                    vel1 = v.norm();
                    self.final_charge_size_sq =
                        self.final_charge_size_sq * (vel1 * vel1) / (vel0 * vel0)
                            + diffusion_coeff;
                }
            }

            if t + 2 >= tsteps {
                if collecting || wpot > WP_THRESH_ELECTRONS {
                    log::debug!("exceeded maximum number of time steps ({tsteps})");
                    low_field = true;
                }
                break;
            }

            wpot = self.fields.wpotential(pt)?;
            if t > 0 {
                self.signal[t] += q * (wpot - wpot_old);
            }
            // undepleted point contact: the carrier sits at WP ≈ 1 without
            // making progress
            if wpot >= 0.999 && (wpot - wpot_old) < 2e-4 {
                low_field = true;
                break;
            }
            wpot_old = wpot;

            dx = v * dt;
            pt = pt + dx;
            q = charge_trapping(dx, q);
            t += 1;
        }

        if t == 0 {
            log::debug!("starting point is outside the field");
            return Err(HpgeError::OutOfField {
                r: start.cyl_radius(),
                z: start.z,
            });
        }

        if low_field {
            log::debug!("too many time steps or low field; may or may not be a problem");
        } else {
            // Left the field grid: continue along the last drift direction
            // until the crystal boundary, then smear the remaining weighting
            // potential linearly toward the nearest electrode value.
            let mut n = 0usize;
            loop {
                if n + t >= tsteps {
                    break;
                }
                pt = pt + dx;
                if q > 0.0 {
                    self.dpath_h[t + n] = pt;
                } else {
                    self.dpath_e[t + n] = pt;
                }
                if !self.geometry.contains(pt) {
                    break;
                }
                n += 1;
            }
            if n == 0 {
                n = 1; // always drift at least one more step
            }
            log::debug!(
                "q: {:.1} t: {} n: {} drifted to ({:.2} {:.2} {:.2})",
                q,
                t,
                n,
                pt.x,
                pt.y,
                pt.z
            );

            if n + t >= tsteps {
                if q > 0.0 || wpot > WP_THRESH_ELECTRONS {
                    return Err(HpgeError::Truncated);
                }
                n = tsteps - t;
            }
            let dwpot = if wpot > 0.3 {
                (1.0 - wpot) / n as f64
            } else {
                -wpot / n as f64
            };
            for i in 0..n {
                self.signal[t + i] += q * dwpot;
            }
        }

        if q > 0.0 {
            self.final_vel = v.norm();
        }
        Ok(())
    }

    /// Gaussian convolution correcting for the charge-cloud size (and, with
    /// diffusion, its growth during the drift). The effective width in
    /// samples comes from the cloud size over the collecting carrier's
    /// drift speed.
    fn convolve_charge_cloud(&mut self) {
        let tsteps = self.cfg.time_steps_calc;
        let mut width = (1.5
            + self.cfg.charge_cloud_size / (self.cfg.step_time_calc * self.initial_vel))
            as usize;
        if self.initial_vel < 1e-5 {
            width = 0;
        }
        if self.cfg.use_diffusion && self.final_vel >= 1e-5 {
            width = (1.5
                + self.final_charge_size_sq.sqrt()
                    / (self.cfg.step_time_calc * self.final_vel)) as usize;
        }
        log::debug!(
            "cloud convolution: initial v {} mm/ns, final size² {} mm², width {} steps",
            self.initial_vel,
            self.final_charge_size_sq,
            width
        );
        if width <= 1 {
            return;
        }

        let w = width as f64 / 2.355;
        let l = (width / 5).max(1); // stride: FWHM/5 instead of every sample
        for j in 0..tsteps {
            self.sum[j] = 1.0;
            self.tmp[j] = self.signal[j];
        }
        let mut k = l;
        while k < (2 * width).min(tsteps) {
            let x = k as f64 / w;
            let y = (-x * x).exp();
            for j in 0..tsteps - k {
                self.sum[j] += y;
                self.tmp[j] += self.signal[j + k] * y;
                self.sum[j + k] += y;
                self.tmp[j + k] += self.signal[j] * y;
            }
            for j in 0..tsteps {
                self.signal[j] = self.tmp[j] / self.sum[j];
            }
            k += l;
        }
    }

    /// Average contiguous runs of calculation samples into output samples.
    fn downsample(&self, out: &mut [f64]) {
        if self.ntsteps_out == 0 {
            return;
        }
        let comp_f = self.cfg.time_steps_calc / self.ntsteps_out;
        for o in out.iter_mut() {
            *o = 0.0;
        }
        for j in 0..self.ntsteps_out * comp_f {
            out[j / comp_f] += self.signal[j] / comp_f as f64;
        }
    }
}

/// Per-step charge-trapping hook. Trapping is not modeled; the charge
/// passes through unchanged.
fn charge_trapping(_dx: Point, q: f64) -> f64 {
    q
}

/// Single-pole RC integration with time constant `tau` (in output samples),
/// starting from zero. For `tau` < 1 the response collapses to a one-sample
/// delay.
pub fn rc_integrate_in_place(s: &mut [f64], tau: f64) {
    if s.is_empty() {
        return;
    }
    if tau < 1.0 {
        for j in (1..s.len()).rev() {
            s[j] = s[j - 1];
        }
        s[0] = 0.0;
    } else {
        let mut s_in_old = s[0];
        s[0] = 0.0;
        for j in 1..s.len() {
            let next = s[j - 1] + (s_in_old - s[j - 1]) / tau;
            s_in_old = s[j];
            s[j] = next;
        }
    }
}

/// RC integration into a separate output buffer. Semantically identical to
/// [`rc_integrate_in_place`]; both exist so callers can shape a waveform
/// without cloning when the buffers alias.
pub fn rc_integrate(s_in: &[f64], s_out: &mut [f64], tau: f64) {
    s_out.copy_from_slice(s_in);
    rc_integrate_in_place(s_out, tau);
}
