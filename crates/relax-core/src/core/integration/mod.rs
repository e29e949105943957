//! Orientational averaging of pseudo-contact shifts over a frame-order motional domain.
//!
//! Two engines share the same angular domains and integrand:
//!
//! - [`quasi_random`] filters precomputed Sobol' points against the domain and averages the
//!   integrand over the accepted rotations;
//! - [`adaptive`] nests adaptive Gauss-Kronrod rules ([`quadrature`]) over the same domain and
//!   normalises by its measure.
//!
//! Angles at or below [`DEGENERATE_ANGLE`] collapse their axis of the domain to a single point,
//! so both engines and the frame-order matrix compilers reduce to the rigid limit consistently.

pub mod adaptive;
pub mod quadrature;
pub mod quasi_random;

use nalgebra::{Matrix3, Vector3};
use std::fmt;
use std::str::FromStr;

/// Motional amplitudes at or below this value are treated as no motion along that axis.
pub const DEGENERATE_ANGLE: f64 = 1e-10;

/// The tilt boundary of a cone-like motion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TiltLimit {
    /// A circular cone with a constant half-angle.
    Iso(f64),
    /// A pseudo-ellipse whose half-angle varies with the azimuth.
    Elliptic { theta_x: f64, theta_y: f64 },
}

impl TiltLimit {
    /// The maximum tilt angle at azimuth `phi`.
    pub fn theta_max(&self, phi: f64) -> f64 {
        match *self {
            Self::Iso(theta) => theta.max(0.0),
            Self::Elliptic { theta_x, theta_y } => {
                if theta_x <= 0.0 || theta_y <= 0.0 {
                    return 0.0;
                }
                let (sin_phi, cos_phi) = phi.sin_cos();
                1.0 / ((cos_phi / theta_x).powi(2) + (sin_phi / theta_y).powi(2)).sqrt()
            }
        }
    }

    pub fn is_degenerate(&self) -> bool {
        match *self {
            Self::Iso(theta) => theta <= DEGENERATE_ANGLE,
            Self::Elliptic { theta_x, theta_y } => theta_x.min(theta_y) <= DEGENERATE_ANGLE,
        }
    }
}

/// The angular domain swept by a motional model, in its eigenframe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Domain {
    /// Torsion about z over `[-sigma_max, sigma_max]`.
    Torsion { sigma_max: f64 },
    /// A tilt of the z axis bounded by `tilt`, with an optional torsion about the tilted axis.
    Cone {
        tilt: TiltLimit,
        sigma_max: Option<f64>,
    },
    /// Independent torsions about y and then x.
    DoubleTorsion { sigma_max: f64, sigma_max_2: f64 },
}

/// Which engine averages the PCS over the motional domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrationMethod {
    #[default]
    QuasiRandom,
    Quadrature,
}

impl fmt::Display for IntegrationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QuasiRandom => write!(f, "sobol"),
            Self::Quadrature => write!(f, "quadrature"),
        }
    }
}

impl FromStr for IntegrationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sobol" | "quasi_random" | "quasi-random" => Ok(Self::QuasiRandom),
            "quad" | "quadrature" => Ok(Self::Quadrature),
            other => Err(format!("Unknown integration method '{other}'")),
        }
    }
}

/// The lever-arm vectors for one spin in one structure, all in Angstrom.
///
/// The lanthanide to atom vector after a rotation is
/// `R2^T (R1^T pivot_atom + inter_pivot) + ln_pivot`. Single-pivot models leave `inter_pivot`
/// at zero and pass no second rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PcsVectors {
    /// The atom relative to the (first) pivot.
    pub pivot_atom: Vector3<f64>,
    /// The (second) pivot relative to the paramagnetic centre.
    pub ln_pivot: Vector3<f64>,
    /// The first pivot relative to the second one.
    pub inter_pivot: Vector3<f64>,
}

impl PcsVectors {
    pub fn single(pivot_atom: Vector3<f64>, ln_pivot: Vector3<f64>) -> Self {
        Self {
            pivot_atom,
            ln_pivot,
            inter_pivot: Vector3::zeros(),
        }
    }

    /// The paramagnetic centre to atom vector for a pair of reference-frame rotations.
    pub fn rotated(&self, r1: &Matrix3<f64>, r2: Option<&Matrix3<f64>>) -> Vector3<f64> {
        let first = r1.transpose() * self.pivot_atom + self.inter_pivot;
        match r2 {
            Some(r2) => r2.transpose() * first + self.ln_pivot,
            None => first + self.ln_pivot,
        }
    }

    /// The unrotated paramagnetic centre to atom vector.
    pub fn rigid(&self) -> Vector3<f64> {
        self.pivot_atom + self.inter_pivot + self.ln_pivot
    }
}

/// The PCS integrand `v^T A v / |v|^5` without the physical constant.
pub fn pcs_kernel(v: &Vector3<f64>, tensor: &Matrix3<f64>) -> f64 {
    let norm_sq = v.norm_squared();
    v.dot(&(tensor * v)) / (norm_sq * norm_sq * norm_sq.sqrt())
}

/// Moves an eigenframe rotation into the reference frame, `E R E^T`.
pub fn reference_rotation(r_eigen: &Matrix3<f64>, inner: &Matrix3<f64>) -> Matrix3<f64> {
    r_eigen * inner * r_eigen.transpose()
}
