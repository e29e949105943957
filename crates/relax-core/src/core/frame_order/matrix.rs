//! Second-degree frame-order matrices `D = <R (x) R>`, with `D[3i+j, 3k+l] = <R_ik R_jl>`.
//!
//! Every model rotation factorises into a tilt and a torsion, `R = T . Rz(sigma)`, with the tilt
//! a Rodrigues rotation by `theta` about the in-plane axis `(-sin phi, cos phi, 0)`. Writing a
//! Rodrigues rotation as `cos t I + sin t [u]x + (1 - cos t) u u^T`, the average of `R (x) R` only
//! needs the second moments of `(cos t, sin t, 1 - cos t)`. Those moments are closed-form for
//! uniform torsions and spherical caps, so the only numerical step is the azimuthal sum of the
//! tilt: an 8-point uniform grid is exact for the isotropic cone and a 128-point periodic
//! trapezoid rule handles the pseudo-ellipse boundary.

use super::params::Motion;
use crate::core::integration::{DEGENERATE_ANGLE, TiltLimit};
use crate::core::utils::geometry::{Matrix9, cross_matrix, kron_prod};
use nalgebra::{Matrix3, Vector3};
use std::f64::consts::PI;

const ISO_CONE_PHI_POINTS: usize = 8;
const PSEUDO_ELLIPSE_PHI_POINTS: usize = 128;
const SERIES_THRESHOLD: f64 = 1e-2;

/// Builds the frame-order matrix of a motion in its own eigenframe.
pub fn compile_2nd_matrix(motion: &Motion) -> Matrix9 {
    match *motion {
        Motion::Rigid => Matrix9::identity(),
        Motion::Rotor { sigma_max, .. } => compile_torsion(&Vector3::z(), sigma_max),
        Motion::FreeRotor { .. } => compile_torsion(&Vector3::z(), PI),
        Motion::IsoCone {
            cone_theta,
            sigma_max,
            ..
        } => compile_tilt(&TiltLimit::Iso(cone_theta)) * compile_torsion(&Vector3::z(), sigma_max),
        Motion::IsoConeTorsionless { cone_theta, .. } => compile_tilt(&TiltLimit::Iso(cone_theta)),
        Motion::IsoConeFreeRotor { cone_theta, .. } => {
            compile_tilt(&TiltLimit::Iso(cone_theta)) * compile_torsion(&Vector3::z(), PI)
        }
        Motion::PseudoEllipse {
            theta_x,
            theta_y,
            sigma_max,
            ..
        } => {
            compile_tilt(&TiltLimit::Elliptic { theta_x, theta_y })
                * compile_torsion(&Vector3::z(), sigma_max)
        }
        Motion::PseudoEllipseTorsionless {
            theta_x, theta_y, ..
        } => compile_tilt(&TiltLimit::Elliptic { theta_x, theta_y }),
        Motion::PseudoEllipseFreeRotor {
            theta_x, theta_y, ..
        } => {
            compile_tilt(&TiltLimit::Elliptic { theta_x, theta_y })
                * compile_torsion(&Vector3::z(), PI)
        }
        Motion::DoubleRotor {
            sigma_max,
            sigma_max_2,
            ..
        } => compile_torsion(&Vector3::y(), sigma_max) * compile_torsion(&Vector3::x(), sigma_max_2),
    }
}

/// Moves an eigenframe matrix into the reference frame, `(E (x) E) D (E (x) E)^T`.
pub fn to_reference_frame(d: &Matrix9, r_eigen: &Matrix3<f64>) -> Matrix9 {
    let rx2 = kron_prod(r_eigen, r_eigen);
    rx2 * d * rx2.transpose()
}

/// Uniform torsion over `[-sigma_max, sigma_max]` about a fixed unit axis.
pub fn compile_torsion(axis: &Vector3<f64>, sigma_max: f64) -> Matrix9 {
    if sigma_max <= DEGENERATE_ANGLE {
        return Matrix9::identity();
    }
    rodrigues_average(axis, &torsion_moments(sigma_max))
}

/// Uniform tilt over the spherical region bounded by the tilt limit, without torsion.
pub fn compile_tilt(limit: &TiltLimit) -> Matrix9 {
    if limit.is_degenerate() {
        return Matrix9::identity();
    }
    let points = match limit {
        TiltLimit::Iso(_) => ISO_CONE_PHI_POINTS,
        TiltLimit::Elliptic { .. } => PSEUDO_ELLIPSE_PHI_POINTS,
    };

    let mut sum = Matrix9::zeros();
    let mut measure = 0.0;
    for k in 0..points {
        let phi = 2.0 * PI * k as f64 / points as f64;
        let (moments, cap) = cap_moments(limit.theta_max(phi));
        if cap == 0.0 {
            continue;
        }
        let axis = Vector3::new(-phi.sin(), phi.cos(), 0.0);
        sum += rodrigues_average(&axis, &moments);
        measure += cap;
    }

    if measure > 0.0 {
        sum / measure
    } else {
        Matrix9::identity()
    }
}

/// `sum_ab <f_a f_b> (M_a (x) M_b)` with `M = (I, [u]x, u u^T)`.
fn rodrigues_average(axis: &Vector3<f64>, moments: &Matrix3<f64>) -> Matrix9 {
    let basis = [
        Matrix3::identity(),
        cross_matrix(axis),
        axis * axis.transpose(),
    ];
    let mut out = Matrix9::zeros();
    for a in 0..3 {
        for b in 0..3 {
            let weight = moments[(a, b)];
            if weight != 0.0 {
                out += kron_prod(&basis[a], &basis[b]) * weight;
            }
        }
    }
    out
}

fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-4 {
        1.0 - x * x / 6.0
    } else {
        x.sin() / x
    }
}

/// Normalised moments of `(cos s, sin s, 1 - cos s)` for `s` uniform on `[-smax, smax]`.
fn torsion_moments(sigma_max: f64) -> Matrix3<f64> {
    let c1 = sinc(sigma_max);
    let c2 = 0.5 * (1.0 + sinc(2.0 * sigma_max));
    let f02 = c1 - c2;
    Matrix3::new(
        c2, 0.0, f02, //
        0.0, 1.0 - c2, 0.0, //
        f02, 0.0, 1.0 - 2.0 * c1 + c2,
    )
}

/// Unnormalised moments `int_0^t f_a f_b sin(theta) d theta` of a spherical cap and the cap
/// measure `1 - cos t`.
fn cap_moments(t: f64) -> (Matrix3<f64>, f64) {
    if t <= DEGENERATE_ANGLE {
        return (Matrix3::zeros(), 0.0);
    }
    let (st, ct) = t.sin_cos();
    let n = 2.0 * (0.5 * t).sin().powi(2);

    let u00 = n * (1.0 + ct + ct * ct) / 3.0;
    let u01 = st.powi(3) / 3.0;
    let u02 = n * n * (1.0 + 2.0 * ct) / 6.0;
    let u11 = n * n * (2.0 + ct) / 3.0;
    let u12 = if t < SERIES_THRESHOLD {
        t.powi(5) / 10.0 - 5.0 * t.powi(7) / 168.0
    } else {
        0.5 * t - 0.25 * (2.0 * t).sin() - u01
    };
    let u22 = n.powi(3) / 3.0;

    let moments = Matrix3::new(
        u00, u01, u02, //
        u01, u11, u12, //
        u02, u12, u22,
    );
    (moments, n)
}
