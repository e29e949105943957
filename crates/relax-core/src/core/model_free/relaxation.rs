//! R1, R2 and the steady-state NOE from spectral densities.
//!
//! The spectral density is sampled at the five frequencies `0, wX, wH - wX, wH, wH + wX`, with
//! `wX` the magnitude of the heteronuclear Larmor frequency.

use super::params::RelaxationKind;
use crate::core::observables::{GAMMA_1H, H_BAR, MU0};
use std::f64::consts::PI;

/// The five angular frequencies (rad/s) for a proton spectrometer frequency in Hz.
pub fn frequencies(proton_frq: f64, gamma_x: f64) -> [f64; 5] {
    let wh = 2.0 * PI * proton_frq;
    let wx = wh * (gamma_x / GAMMA_1H).abs();
    [0.0, wx, wh - wx, wh, wh + wx]
}

/// `1/4 (mu0 / 4 pi)^2 hbar^2 gH^2 gX^2 / r^6`.
pub fn dipolar_relaxation_constant(gamma_x: f64, r: f64) -> f64 {
    0.25 * (MU0 / (4.0 * PI)).powi(2) * (H_BAR * GAMMA_1H * gamma_x).powi(2) / r.powi(6)
}

/// `(wX csa)^2 / 3`.
pub fn csa_relaxation_constant(proton_frq: f64, gamma_x: f64, csa: f64) -> f64 {
    let wx = frequencies(proton_frq, gamma_x)[1];
    (wx * csa).powi(2) / 3.0
}

/// The ingredients of the rates at one field.
///
/// The same struct carries first derivatives: filled with `dJ/dp`, `d(dip)/dp` and so on, it is
/// the tangent passed to [`RateTerms::tangent`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RateTerms {
    pub j: [f64; 5],
    pub dip: f64,
    pub csa: f64,
    /// The exchange contribution to R2 in 1/s at this field.
    pub rex: f64,
}

impl RateTerms {
    pub fn r1(&self) -> f64 {
        let j = &self.j;
        self.dip * (j[2] + 3.0 * j[1] + 6.0 * j[4]) + self.csa * j[1]
    }

    pub fn r2(&self) -> f64 {
        let j = &self.j;
        0.5 * self.dip * (4.0 * j[0] + j[2] + 3.0 * j[1] + 6.0 * j[3] + 6.0 * j[4])
            + self.csa / 6.0 * (4.0 * j[0] + 3.0 * j[1])
            + self.rex
    }

    pub fn noe(&self, gamma_x: f64) -> f64 {
        let r1 = self.r1();
        if r1 == 0.0 {
            return 1.0;
        }
        1.0 + GAMMA_1H / gamma_x * self.dip * self.cross() / r1
    }

    fn cross(&self) -> f64 {
        6.0 * self.j[4] - self.j[2]
    }

    pub fn value(&self, kind: RelaxationKind, gamma_x: f64) -> f64 {
        match kind {
            RelaxationKind::R1 => self.r1(),
            RelaxationKind::R2 => self.r2(),
            RelaxationKind::Noe => self.noe(gamma_x),
        }
    }

    /// The directional derivative of the rate along `d`.
    pub fn tangent(&self, d: &RateTerms, kind: RelaxationKind, gamma_x: f64) -> f64 {
        // R1 and R2 are bilinear in (dip, csa) and J, and linear in rex.
        let bilinear = |f: fn(&RateTerms) -> f64| {
            let along_j = f(&RateTerms {
                j: d.j,
                ..*self
            }) - f(&RateTerms {
                j: [0.0; 5],
                ..*self
            });
            let along_constants = f(&RateTerms {
                dip: d.dip,
                csa: d.csa,
                rex: d.rex,
                ..*self
            }) - f(&RateTerms {
                dip: 0.0,
                csa: 0.0,
                rex: 0.0,
                ..*self
            });
            along_j + along_constants
        };
        match kind {
            RelaxationKind::R1 => bilinear(RateTerms::r1),
            RelaxationKind::R2 => bilinear(RateTerms::r2),
            RelaxationKind::Noe => {
                let r1 = self.r1();
                if r1 == 0.0 {
                    return 0.0;
                }
                let dr1 = bilinear(RateTerms::r1);
                let numer = self.dip * self.cross();
                let d_numer = d.dip * self.cross() + self.dip * (6.0 * d.j[4] - d.j[2]);
                GAMMA_1H / gamma_x * (d_numer * r1 - numer * dr1) / (r1 * r1)
            }
        }
    }
}
