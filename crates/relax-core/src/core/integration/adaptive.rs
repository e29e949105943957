use super::quadrature::{Tolerance, integrate};
use super::{DEGENERATE_ANGLE, Domain, PcsVectors, TiltLimit, pcs_kernel, reference_rotation};
use crate::core::utils::geometry::{rot_x, rot_y, rot_z, tilt_torsion_to_r};
use nalgebra::Matrix3;
use std::f64::consts::PI;

/// Averages the PCS integrand over `domain` with nested adaptive Gauss-Kronrod rules.
///
/// The integral is normalised by the measure of the domain (`sin(theta) d theta d phi` for the
/// tilt, `d sigma` for each torsion). Collapsed axes are evaluated at zero instead of being
/// integrated, and a domain collapsed along every axis gives the rigid value.
///
/// `tolerance.relative` is applied to the typical magnitude of the integrand, so averages that
/// cancel to zero do not drive the bisection to its depth limit.
pub fn average_pcs(
    domain: &Domain,
    r_eigen: &Matrix3<f64>,
    vectors: &PcsVectors,
    tensor: &Matrix3<f64>,
    tolerance: &Tolerance,
) -> f64 {
    let rigid_vector = vectors.rigid();
    let rigid = pcs_kernel(&rigid_vector, tensor);
    let magnitude = tensor.norm() / rigid_vector.norm().powi(3);
    let averager = Averager {
        tolerance: *tolerance,
        mean_error: tolerance.absolute.max(tolerance.relative * magnitude),
    };
    let kernel = |inner: &Matrix3<f64>| {
        pcs_kernel(&vectors.rotated(&reference_rotation(r_eigen, inner), None), tensor)
    };

    match *domain {
        Domain::Torsion { sigma_max } => averager
            .torsion(sigma_max, |sigma| kernel(&rot_z(sigma)))
            .unwrap_or(rigid),
        Domain::Cone { tilt, sigma_max } => {
            let torsion = sigma_max.filter(|s| *s > DEGENERATE_ANGLE);
            if tilt.is_degenerate() {
                return match torsion {
                    Some(s) => averager
                        .torsion(s, |sigma| kernel(&rot_z(sigma)))
                        .unwrap_or(rigid),
                    None => rigid,
                };
            }
            let at_tilt = |phi: f64, theta: f64| match torsion {
                Some(s) => averager
                    .torsion(s, |sigma| kernel(&tilt_torsion_to_r(phi, theta, sigma)))
                    .unwrap_or(rigid),
                None => kernel(&tilt_torsion_to_r(phi, theta, 0.0)),
            };
            averager.tilt(&tilt, at_tilt)
        }
        Domain::DoubleTorsion {
            sigma_max,
            sigma_max_2,
        } => {
            let double_kernel = |sigma: f64, sigma2: f64| {
                let r1 = reference_rotation(r_eigen, &rot_y(sigma));
                let r2 = reference_rotation(r_eigen, &rot_x(sigma2));
                pcs_kernel(&vectors.rotated(&r1, Some(&r2)), tensor)
            };
            let inner = |sigma: f64| {
                averager
                    .torsion(sigma_max_2, |sigma2| double_kernel(sigma, sigma2))
                    .unwrap_or_else(|| double_kernel(sigma, 0.0))
            };
            averager
                .torsion(sigma_max, &inner)
                .unwrap_or_else(|| inner(0.0))
        }
    }
}

/// Nested averaging with an error budget expressed on the mean value.
struct Averager {
    tolerance: Tolerance,
    mean_error: f64,
}

impl Averager {
    fn with_weight(&self, weight: f64) -> Tolerance {
        Tolerance {
            absolute: self.mean_error * weight,
            ..self.tolerance
        }
    }

    /// The mean of `f` over `[-sigma_max, sigma_max]`, or `None` for a collapsed torsion.
    fn torsion(&self, sigma_max: f64, mut f: impl FnMut(f64) -> f64) -> Option<f64> {
        if sigma_max <= DEGENERATE_ANGLE {
            return None;
        }
        let width = 2.0 * sigma_max;
        let tolerance = self.with_weight(width);
        Some(integrate(&mut f, -sigma_max, sigma_max, &tolerance) / width)
    }

    /// The mean of `f(phi, theta)` over the tilt region, weighted by `sin(theta)`.
    fn tilt(&self, tilt: &TiltLimit, mut f: impl FnMut(f64, f64) -> f64) -> f64 {
        let measure = tilt_measure(tilt, &self.tolerance);
        let mut over_phi = |phi: f64| {
            let theta_max = tilt.theta_max(phi);
            let tolerance = self.with_weight(cap_area(theta_max));
            integrate(
                &mut |theta: f64| f(phi, theta) * theta.sin(),
                0.0,
                theta_max,
                &tolerance,
            )
        };
        let total = integrate(&mut over_phi, 0.0, 2.0 * PI, &self.with_weight(measure));
        total / measure
    }
}

/// The solid angle enclosed by the tilt limit.
pub fn tilt_measure(tilt: &TiltLimit, tolerance: &Tolerance) -> f64 {
    match *tilt {
        TiltLimit::Iso(theta) => 2.0 * PI * cap_area(theta),
        TiltLimit::Elliptic { .. } => {
            let relative_only = Tolerance {
                absolute: 0.0,
                ..*tolerance
            };
            integrate(
                &mut |phi: f64| cap_area(tilt.theta_max(phi)),
                0.0,
                2.0 * PI,
                &relative_only,
            )
        }
    }
}

/// `1 - cos(theta)` without cancellation at small angles.
fn cap_area(theta: f64) -> f64 {
    2.0 * (0.5 * theta).sin().powi(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frame_order::model::FrameOrderModel;
    use crate::core::frame_order::sampling::SobolPoints;
    use crate::core::integration::quasi_random::AcceptedRotations;
    use crate::core::sobol::DEFAULT_SKIP;
    use crate::core::utils::geometry::euler_to_r_zyz;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn tensor() -> Matrix3<f64> {
        Matrix3::new(1.0, 0.4, 0.2, 0.4, -0.3, -0.5, 0.2, -0.5, -0.7)
    }

    fn vectors() -> PcsVectors {
        PcsVectors::single(Vector3::new(3.0, 1.0, 2.0), Vector3::new(0.0, 0.0, 5.0))
    }

    fn sobol_average(model: FrameOrderModel, domain: &Domain, r_eigen: &Matrix3<f64>, n: usize) -> f64 {
        let points = SobolPoints::generate(model, n, DEFAULT_SKIP).unwrap();
        AcceptedRotations::select(&points, domain, r_eigen, usize::MAX).average_pcs(&vectors(), &tensor())
    }

    #[test]
    fn iso_measure_matches_elliptic_measure_for_circle() {
        let tolerance = Tolerance::default();
        let iso = tilt_measure(&TiltLimit::Iso(0.7), &tolerance);
        let elliptic = tilt_measure(
            &TiltLimit::Elliptic {
                theta_x: 0.7,
                theta_y: 0.7,
            },
            &tolerance,
        );
        assert_relative_eq!(iso, elliptic, max_relative = 1e-10);
    }

    #[test]
    fn vanishing_amplitudes_converge_to_rigid_value() {
        let rigid = pcs_kernel(&vectors().rigid(), &tensor());
        let tolerance = Tolerance::default();
        let r_eigen = euler_to_r_zyz(0.2, 0.9, 1.3);
        let domains = [
            Domain::Torsion { sigma_max: 1e-5 },
            Domain::Cone {
                tilt: TiltLimit::Iso(1e-5),
                sigma_max: Some(1e-5),
            },
            Domain::Cone {
                tilt: TiltLimit::Elliptic {
                    theta_x: 1e-5,
                    theta_y: 2e-5,
                },
                sigma_max: None,
            },
            Domain::DoubleTorsion {
                sigma_max: 1e-5,
                sigma_max_2: 1e-5,
            },
        ];
        for domain in domains {
            let value = average_pcs(&domain, &r_eigen, &vectors(), &tensor(), &tolerance);
            assert_relative_eq!(value, rigid, max_relative = 1e-6);
        }
    }

    #[test]
    fn degenerate_domain_is_exactly_rigid() {
        let rigid = pcs_kernel(&vectors().rigid(), &tensor());
        let domain = Domain::Cone {
            tilt: TiltLimit::Iso(0.0),
            sigma_max: Some(0.0),
        };
        let value = average_pcs(&domain, &Matrix3::identity(), &vectors(), &tensor(), &Tolerance::default());
        assert_eq!(value, rigid);
    }

    #[test]
    fn rotor_quadrature_agrees_with_sobol() {
        let domain = Domain::Torsion { sigma_max: 1.0 };
        let r_eigen = euler_to_r_zyz(0.4, 0.3, -0.2);
        let quad = average_pcs(&domain, &r_eigen, &vectors(), &tensor(), &Tolerance::default());
        let sobol = sobol_average(FrameOrderModel::Rotor, &domain, &r_eigen, 100_000);
        assert_relative_eq!(sobol, quad, max_relative = 1e-3);
    }

    #[test]
    fn iso_cone_quadrature_agrees_with_sobol() {
        let domain = Domain::Cone {
            tilt: TiltLimit::Iso(0.6),
            sigma_max: Some(0.8),
        };
        let quad = average_pcs(&domain, &Matrix3::identity(), &vectors(), &tensor(), &Tolerance::default());
        let sobol = sobol_average(FrameOrderModel::IsoCone, &domain, &Matrix3::identity(), 200_000);
        assert_relative_eq!(sobol, quad, max_relative = 1e-2);
    }

    #[test]
    fn torsionless_ellipse_quadrature_agrees_with_sobol() {
        let domain = Domain::Cone {
            tilt: TiltLimit::Elliptic {
                theta_x: 0.4,
                theta_y: 0.9,
            },
            sigma_max: None,
        };
        let quad = average_pcs(&domain, &Matrix3::identity(), &vectors(), &tensor(), &Tolerance::default());
        let sobol = sobol_average(
            FrameOrderModel::PseudoEllipseTorsionless,
            &domain,
            &Matrix3::identity(),
            100_000,
        );
        assert_relative_eq!(sobol, quad, max_relative = 1e-2);
    }

    #[test]
    fn double_rotor_quadrature_agrees_with_sobol() {
        let domain = Domain::DoubleTorsion {
            sigma_max: 0.7,
            sigma_max_2: 0.4,
        };
        let quad = average_pcs(&domain, &Matrix3::identity(), &vectors(), &tensor(), &Tolerance::default());
        let sobol = sobol_average(FrameOrderModel::DoubleRotor, &domain, &Matrix3::identity(), 100_000);
        assert_relative_eq!(sobol, quad, max_relative = 1e-2);
    }
}
