//! Lipari-Szabo spectral density functions for isotropic tumbling.
//!
//! Every model is a special case of
//!
//! `J(w) = 2/5 [S2 L(tm) + (1 - S2f) L(tau_f) + (S2f - S2) L(tau_s)]`
//!
//! with `L(tau) = tau / (1 + (w tau)^2)` and the effective times `tau_i = t_i tm / (t_i + tm)`.
//! The original model sets `S2f = 1` and uses te as the slow time; the extended2 models
//! parameterise `S2 = S2f S2s`.

use super::params::{MfParam, Residue};

/// A spectral density model with its current internal-motion values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpectralDensity {
    /// Pure global tumbling, `S2 = 1`.
    Rigid,
    /// `{S2}` or `{S2, te}`.
    Original { s2: f64, te: f64 },
    /// `{S2f, S2, ts}` or `{S2f, tf, S2, ts}`.
    Extended { s2f: f64, tf: f64, s2: f64, ts: f64 },
    /// `{S2f, S2s, ts}` or `{S2f, tf, S2s, ts}`.
    Extended2 { s2f: f64, tf: f64, s2s: f64, ts: f64 },
}

/// The correlation-time sums that appear in the chain rule of the effective times.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TimeSums {
    tf_tm_sqrd: f64,
    ts_tm_sqrd: f64,
}

fn lorentzian(tau: f64, w: f64) -> f64 {
    tau / (1.0 + (w * tau).powi(2))
}

fn lorentzian_dtau(tau: f64, w: f64) -> f64 {
    let wt2 = (w * tau).powi(2);
    (1.0 - wt2) / (1.0 + wt2).powi(2)
}

fn effective_time(t: f64, tm: f64) -> f64 {
    if t == 0.0 { 0.0 } else { t * tm / (t + tm) }
}

impl SpectralDensity {
    /// Picks the model from the residue's parameter list. Internal times absent from the model
    /// are zero; present parameters without a value take their defaults.
    pub fn from_residue(residue: &Residue) -> Self {
        let value = |p: MfParam| residue.value_or_default(p);
        let optional = |p: MfParam| if residue.has_param(p) { value(p) } else { 0.0 };
        if residue.has_param(MfParam::S2s) {
            Self::Extended2 {
                s2f: value(MfParam::S2f),
                tf: optional(MfParam::Tf),
                s2s: value(MfParam::S2s),
                ts: value(MfParam::Ts),
            }
        } else if residue.has_param(MfParam::S2f) {
            Self::Extended {
                s2f: value(MfParam::S2f),
                tf: optional(MfParam::Tf),
                s2: value(MfParam::S2),
                ts: value(MfParam::Ts),
            }
        } else if residue.has_param(MfParam::S2) {
            Self::Original {
                s2: value(MfParam::S2),
                te: optional(MfParam::Te),
            }
        } else {
            Self::Rigid
        }
    }

    /// `(S2, S2f, tf, ts)` of the general form.
    fn general(&self) -> (f64, f64, f64, f64) {
        match *self {
            Self::Rigid => (1.0, 1.0, 0.0, 0.0),
            Self::Original { s2, te } => (s2, 1.0, 0.0, te),
            Self::Extended { s2f, tf, s2, ts } => (s2, s2f, tf, ts),
            Self::Extended2 { s2f, tf, s2s, ts } => (s2f * s2s, s2f, tf, ts),
        }
    }

    fn time_sums(&self, tm: f64) -> TimeSums {
        let (_, _, tf, ts) = self.general();
        TimeSums {
            tf_tm_sqrd: (tf + tm).powi(2),
            ts_tm_sqrd: (ts + tm).powi(2),
        }
    }

    /// `J(w)` for the global correlation time `tm` in s and the angular frequency `w` in rad/s.
    pub fn j(&self, tm: f64, w: f64) -> f64 {
        let (s2, s2f, tf, ts) = self.general();
        let fast = effective_time(tf, tm);
        let slow = effective_time(ts, tm);
        0.4 * (s2 * lorentzian(tm, w)
            + (1.0 - s2f) * lorentzian(fast, w)
            + (s2f - s2) * lorentzian(slow, w))
    }

    /// `J` at each of the given frequencies.
    pub fn j_all<const N: usize>(&self, tm: f64, w: &[f64; N]) -> [f64; N] {
        w.map(|w| self.j(tm, w))
    }

    /// `dJ(w)/dp`. The derivative with respect to [`MfParam::LocalTm`] is the derivative with
    /// respect to the global correlation time; parameters that do not enter `J` give zero.
    pub fn dj(&self, param: MfParam, tm: f64, w: f64) -> f64 {
        let (s2, s2f, tf, ts) = self.general();
        let fast = effective_time(tf, tm);
        let slow = effective_time(ts, tm);
        let sums = self.time_sums(tm);
        let d_fast_d_tm = if tf == 0.0 { 0.0 } else { tf * tf / sums.tf_tm_sqrd };
        let d_slow_d_tm = if ts == 0.0 { 0.0 } else { ts * ts / sums.ts_tm_sqrd };

        let derivative = match (param, self) {
            (MfParam::LocalTm, _) => {
                s2 * lorentzian_dtau(tm, w)
                    + (1.0 - s2f) * lorentzian_dtau(fast, w) * d_fast_d_tm
                    + (s2f - s2) * lorentzian_dtau(slow, w) * d_slow_d_tm
            }
            (MfParam::S2, Self::Original { .. } | Self::Extended { .. }) => {
                lorentzian(tm, w) - lorentzian(slow, w)
            }
            (MfParam::S2f, Self::Extended { .. }) => lorentzian(slow, w) - lorentzian(fast, w),
            (MfParam::S2f, Self::Extended2 { s2s, .. }) => {
                s2s * lorentzian(tm, w) - lorentzian(fast, w) + (1.0 - s2s) * lorentzian(slow, w)
            }
            (MfParam::S2s, Self::Extended2 { s2f, .. }) => {
                s2f * (lorentzian(tm, w) - lorentzian(slow, w))
            }
            (MfParam::Te, Self::Original { .. }) | (MfParam::Ts, Self::Extended { .. })
            | (MfParam::Ts, Self::Extended2 { .. }) => {
                (s2f - s2) * lorentzian_dtau(slow, w) * tm * tm / sums.ts_tm_sqrd
            }
            (MfParam::Tf, Self::Extended { .. } | Self::Extended2 { .. }) => {
                (1.0 - s2f) * lorentzian_dtau(fast, w) * tm * tm / sums.tf_tm_sqrd
            }
            _ => 0.0,
        };
        0.4 * derivative
    }

    pub fn dj_all<const N: usize>(&self, param: MfParam, tm: f64, w: &[f64; N]) -> [f64; N] {
        w.map(|w| self.dj(param, tm, w))
    }
}
