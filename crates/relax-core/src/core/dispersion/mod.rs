//! Relaxation-dispersion exchange models.
//!
//! Each model back-calculates a dispersion curve (R2eff for CPMG, R1rho for spin-lock
//! experiments) from per-spin relaxation rates and shared exchange parameters. The flat
//! parameter vector of a spin cluster is decoded by [`DispersionParams`] as:
//!
//! | model | layout |
//! |---|---|
//! | No Rex | R20 (spins x fields) |
//! | LM63, DPL94 | R20 (spins x fields), phi_ex (spins), kex |
//! | CR72 | R20A (spins x fields), R20B (spins x fields), dw (spins), pA, kex |
//! | CR72 red | R20 (spins x fields), dw (spins), pA, kex |

pub mod cr72;
pub mod dpl94;
pub mod lm63;

use crate::core::observables::GAMMA_1H;
use crate::core::utils::identifiers::lookup_dispersion_model;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The value substituted for back-calculated points that are not finite.
pub const INVALID_VALUE: f64 = 1e100;

pub(crate) fn sanitize(value: f64) -> f64 {
    if value.is_finite() { value } else { INVALID_VALUE }
}

#[derive(Debug, Error, PartialEq)]
pub enum DispersionError {
    #[error("Unknown dispersion model '{name}'")]
    UnknownModel { name: String },

    #[error("Model {model} expects {expected} parameters, got {found}")]
    ParameterCount {
        model: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Dispersion data shape mismatch for {what}: expected {expected}, found {found}")]
    DataShape {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Model {model} cannot be fitted to {experiment} data")]
    IncompatibleExperiment {
        model: &'static str,
        experiment: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispersionModel {
    NoRex,
    Lm63,
    Cr72,
    Cr72Red,
    Dpl94,
}

impl DispersionModel {
    pub const ALL: [DispersionModel; 5] = [
        Self::NoRex,
        Self::Lm63,
        Self::Cr72,
        Self::Cr72Red,
        Self::Dpl94,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::NoRex => "No Rex",
            Self::Lm63 => "LM63",
            Self::Cr72 => "CR72",
            Self::Cr72Red => "CR72 red",
            Self::Dpl94 => "DPL94",
        }
    }

    /// Whether the model describes R1rho (spin-lock) rather than CPMG data.
    pub fn is_r1rho(&self) -> bool {
        matches!(self, Self::Dpl94)
    }

    fn uses_population(&self) -> bool {
        matches!(self, Self::Cr72 | Self::Cr72Red)
    }

    fn uses_phi_ex(&self) -> bool {
        matches!(self, Self::Lm63 | Self::Dpl94)
    }

    /// The number of R20 blocks (one spins x fields block each) at the start of the vector.
    fn r20_blocks(&self) -> usize {
        if *self == Self::Cr72 { 2 } else { 1 }
    }

    pub fn param_num(&self, num_spins: usize, num_fields: usize) -> usize {
        let r20 = self.r20_blocks() * num_spins * num_fields;
        let exchange = match self {
            Self::NoRex => 0,
            Self::Lm63 | Self::Dpl94 => num_spins + 1,
            Self::Cr72 | Self::Cr72Red => num_spins + 2,
        };
        r20 + exchange
    }

    /// Parameter names in vector order, suffixed with spin and field indices.
    pub fn param_names(&self, num_spins: usize, num_fields: usize) -> Vec<String> {
        let mut names = Vec::with_capacity(self.param_num(num_spins, num_fields));
        let r20_labels: &[&str] = match self {
            Self::Cr72 => &["r20a", "r20b"],
            Self::Dpl94 => &["r1rho_prime"],
            _ => &["r20"],
        };
        for label in r20_labels {
            for spin in 0..num_spins {
                for field in 0..num_fields {
                    names.push(format!("{label}[{spin}][{field}]"));
                }
            }
        }
        if self.uses_population() {
            names.extend((0..num_spins).map(|spin| format!("dw[{spin}]")));
            names.extend(["pA".to_string(), "kex".to_string()]);
        } else if self.uses_phi_ex() {
            names.extend((0..num_spins).map(|spin| format!("phi_ex[{spin}]")));
            names.push("kex".to_string());
        }
        names
    }
}

impl fmt::Display for DispersionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for DispersionModel {
    type Err = DispersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lookup_dispersion_model(s).ok_or_else(|| DispersionError::UnknownModel {
            name: s.to_string(),
        })
    }
}

/// A decoded dispersion parameter vector.
///
/// R20 values are indexed `[spin][field]`. For the single-R20 models `r20b` mirrors `r20a`.
/// `dw` is in ppm and `phi_ex` in ppm^2; both are zero for the models that do not use them.
#[derive(Debug, Clone, PartialEq)]
pub struct DispersionParams {
    pub model: DispersionModel,
    pub r20a: Vec<Vec<f64>>,
    pub r20b: Vec<Vec<f64>>,
    pub dw: Vec<f64>,
    pub phi_ex: Vec<f64>,
    pub pa: f64,
    pub kex: f64,
}

impl DispersionParams {
    pub fn decode(
        model: DispersionModel,
        num_spins: usize,
        num_fields: usize,
        params: &[f64],
    ) -> Result<Self, DispersionError> {
        let expected = model.param_num(num_spins, num_fields);
        if params.len() != expected {
            return Err(DispersionError::ParameterCount {
                model: model.name(),
                expected,
                found: params.len(),
            });
        }

        let block = num_spins * num_fields;
        let grid = |offset: usize| -> Vec<Vec<f64>> {
            (0..num_spins)
                .map(|spin| {
                    let start = offset + spin * num_fields;
                    params[start..start + num_fields].to_vec()
                })
                .collect()
        };
        let r20a = grid(0);
        let r20b = if model == DispersionModel::Cr72 {
            grid(block)
        } else {
            r20a.clone()
        };

        let tail = &params[model.r20_blocks() * block..];
        let mut decoded = Self {
            model,
            r20a,
            r20b,
            dw: vec![0.0; num_spins],
            phi_ex: vec![0.0; num_spins],
            pa: 1.0,
            kex: 0.0,
        };
        if model.uses_population() {
            decoded.dw = tail[..num_spins].to_vec();
            decoded.pa = tail[num_spins];
            decoded.kex = tail[num_spins + 1];
        } else if model.uses_phi_ex() {
            decoded.phi_ex = tail[..num_spins].to_vec();
            decoded.kex = tail[num_spins];
        }
        Ok(decoded)
    }

    pub fn encode(&self) -> Vec<f64> {
        let mut out: Vec<f64> = self.r20a.iter().flatten().copied().collect();
        if self.model == DispersionModel::Cr72 {
            out.extend(self.r20b.iter().flatten());
        }
        if self.model.uses_population() {
            out.extend(&self.dw);
            out.extend([self.pa, self.kex]);
        } else if self.model.uses_phi_ex() {
            out.extend(&self.phi_ex);
            out.push(self.kex);
        }
        out
    }
}

/// The angular X-nucleus frequency per ppm, `1e-6 2 pi frq_x`, for a proton spectrometer
/// frequency in Hz and the X-nucleus gyromagnetic ratio.
pub fn ppm_to_rad(proton_frq: f64, gamma_x: f64) -> f64 {
    1e-6 * 2.0 * std::f64::consts::PI * proton_frq * (gamma_x / GAMMA_1H).abs()
}
