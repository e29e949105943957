use super::{DEGENERATE_ANGLE, Domain, PcsVectors, pcs_kernel, reference_rotation};
use crate::core::frame_order::sampling::SobolPoints;
use crate::core::utils::geometry::rot_z;
use nalgebra::Matrix3;

/// The reference-frame rotations of the Sobol' points that fall inside a motional domain.
///
/// `second` is empty unless the domain is a double torsion, in which case it is index-aligned
/// with `first`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcceptedRotations {
    pub first: Vec<Matrix3<f64>>,
    pub second: Vec<Matrix3<f64>>,
}

impl AcceptedRotations {
    /// Filters `points` against `domain`, keeping at most `max_points` rotations.
    ///
    /// A collapsed torsion keeps only the tilt part of each rotation and a collapsed tilt keeps
    /// only the torsion. A domain collapsed along every axis accepts nothing.
    pub fn select(
        points: &SobolPoints,
        domain: &Domain,
        r_eigen: &Matrix3<f64>,
        max_points: usize,
    ) -> Self {
        let mut accepted = Self::default();
        let to_frame = |inner: &Matrix3<f64>| reference_rotation(r_eigen, inner);

        match *domain {
            Domain::Torsion { sigma_max } => {
                if sigma_max <= DEGENERATE_ANGLE {
                    return accepted;
                }
                for (sigma, inner) in points.sigma.iter().zip(&points.rotations) {
                    if accepted.first.len() >= max_points {
                        break;
                    }
                    if sigma.abs() <= sigma_max {
                        accepted.first.push(to_frame(inner));
                    }
                }
            }
            Domain::Cone { tilt, sigma_max } => {
                let tilt_collapsed = tilt.is_degenerate();
                let torsion = sigma_max.filter(|s| *s > DEGENERATE_ANGLE);
                let torsion_collapsed = sigma_max.is_some() && torsion.is_none();
                if tilt_collapsed && torsion.is_none() {
                    return accepted;
                }
                for (i, inner) in points.rotations.iter().enumerate() {
                    if accepted.first.len() >= max_points {
                        break;
                    }
                    let sigma = points.sigma.get(i).copied().unwrap_or(0.0);
                    let in_tilt = tilt_collapsed
                        || match (points.theta.get(i), points.phi.get(i)) {
                            (Some(&theta), Some(&phi)) => theta <= tilt.theta_max(phi),
                            _ => false,
                        };
                    let in_torsion = torsion.is_none_or(|s| sigma.abs() <= s);
                    if !(in_tilt && in_torsion) {
                        continue;
                    }
                    let rotation = if tilt_collapsed {
                        rot_z(sigma)
                    } else if torsion_collapsed {
                        inner * rot_z(-sigma)
                    } else {
                        *inner
                    };
                    accepted.first.push(to_frame(&rotation));
                }
            }
            Domain::DoubleTorsion {
                sigma_max,
                sigma_max_2,
            } => {
                let first_collapsed = sigma_max <= DEGENERATE_ANGLE;
                let second_collapsed = sigma_max_2 <= DEGENERATE_ANGLE;
                if first_collapsed && second_collapsed {
                    return accepted;
                }
                let pairs = points
                    .sigma
                    .iter()
                    .zip(&points.sigma2)
                    .zip(points.rotations.iter().zip(&points.rotations2));
                for ((sigma, sigma2), (inner, inner2)) in pairs {
                    if accepted.first.len() >= max_points {
                        break;
                    }
                    if (first_collapsed || sigma.abs() <= sigma_max)
                        && (second_collapsed || sigma2.abs() <= sigma_max_2)
                    {
                        let identity = Matrix3::identity();
                        let r1 = if first_collapsed { &identity } else { inner };
                        let r2 = if second_collapsed { &identity } else { inner2 };
                        accepted.first.push(to_frame(r1));
                        accepted.second.push(to_frame(r2));
                    }
                }
            }
        }
        accepted
    }

    pub fn len(&self) -> usize {
        self.first.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_empty()
    }

    /// The mean PCS integrand over the accepted rotations, or the rigid value when none were
    /// accepted.
    pub fn average_pcs(&self, vectors: &PcsVectors, tensor: &Matrix3<f64>) -> f64 {
        if self.is_empty() {
            return pcs_kernel(&vectors.rigid(), tensor);
        }
        let sum: f64 = self
            .first
            .iter()
            .enumerate()
            .map(|(i, r1)| pcs_kernel(&vectors.rotated(r1, self.second.get(i)), tensor))
            .sum();
        sum / self.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frame_order::model::FrameOrderModel;
    use crate::core::integration::TiltLimit;
    use crate::core::sobol::DEFAULT_SKIP;
    use crate::core::utils::geometry::{euler_to_r_zyz, tilt_torsion_to_r};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use std::f64::consts::PI;

    fn tensor() -> Matrix3<f64> {
        Matrix3::new(1.0, 0.4, 0.2, 0.4, -0.3, -0.5, 0.2, -0.5, -0.7)
    }

    fn vectors() -> PcsVectors {
        PcsVectors::single(Vector3::new(3.0, 1.0, 2.0), Vector3::new(0.0, 0.0, 5.0))
    }

    #[test]
    fn torsion_acceptance_respects_amplitude_and_budget() {
        let points = SobolPoints::generate(FrameOrderModel::Rotor, 1024, 0).unwrap();
        let domain = Domain::Torsion { sigma_max: PI / 2.0 };
        let all = AcceptedRotations::select(&points, &domain, &Matrix3::identity(), usize::MAX);
        assert_eq!(all.len(), 513);
        let capped = AcceptedRotations::select(&points, &domain, &Matrix3::identity(), 100);
        assert_eq!(capped.len(), 100);
        assert!(capped.second.is_empty());
    }

    #[test]
    fn rotations_are_moved_into_the_reference_frame() {
        let points = SobolPoints::generate(FrameOrderModel::Rotor, 8, 0).unwrap();
        let r_eigen = euler_to_r_zyz(0.3, 1.1, -0.4);
        let accepted = AcceptedRotations::select(
            &points,
            &Domain::Torsion { sigma_max: PI },
            &r_eigen,
            usize::MAX,
        );
        let axis = r_eigen * Vector3::z();
        for rotation in &accepted.first {
            assert_relative_eq!(rotation * axis, axis, epsilon = 1e-12);
        }
    }

    #[test]
    fn degenerate_domain_falls_back_to_rigid_value() {
        let points = SobolPoints::generate(FrameOrderModel::IsoCone, 500, 0).unwrap();
        let domain = Domain::Cone {
            tilt: TiltLimit::Iso(0.0),
            sigma_max: Some(0.0),
        };
        let accepted = AcceptedRotations::select(&points, &domain, &Matrix3::identity(), 100);
        assert!(accepted.is_empty());
        let rigid = pcs_kernel(&vectors().rigid(), &tensor());
        assert_eq!(accepted.average_pcs(&vectors(), &tensor()), rigid);
    }

    #[test]
    fn collapsed_torsion_keeps_pure_tilts() {
        let points = SobolPoints::generate(FrameOrderModel::IsoCone, 4000, 0).unwrap();
        let domain = Domain::Cone {
            tilt: TiltLimit::Iso(0.5),
            sigma_max: Some(0.0),
        };
        let accepted = AcceptedRotations::select(&points, &domain, &Matrix3::identity(), 50);
        assert!(!accepted.is_empty());
        for rotation in &accepted.first {
            let tilted = rotation * Vector3::z();
            let theta = tilted.z.clamp(-1.0, 1.0).acos();
            let phi = tilted.y.atan2(tilted.x);
            assert!(theta <= 0.5 + 1e-12);
            assert_relative_eq!(*rotation, tilt_torsion_to_r(phi, theta, 0.0), epsilon = 1e-9);
        }
    }

    #[test]
    fn collapsed_tilt_keeps_pure_torsions() {
        let points = SobolPoints::generate(FrameOrderModel::IsoCone, 400, 0).unwrap();
        let domain = Domain::Cone {
            tilt: TiltLimit::Iso(0.0),
            sigma_max: Some(1.0),
        };
        let accepted = AcceptedRotations::select(&points, &domain, &Matrix3::identity(), usize::MAX);
        assert!(!accepted.is_empty());
        for rotation in &accepted.first {
            assert_relative_eq!(rotation * Vector3::z(), Vector3::z(), epsilon = 1e-12);
        }
    }

    #[test]
    fn double_torsion_pairs_both_rotations() {
        let points = SobolPoints::generate(FrameOrderModel::DoubleRotor, 2000, 0).unwrap();
        let domain = Domain::DoubleTorsion {
            sigma_max: 1.0,
            sigma_max_2: 0.0,
        };
        let accepted = AcceptedRotations::select(&points, &domain, &Matrix3::identity(), usize::MAX);
        assert_eq!(accepted.first.len(), accepted.second.len());
        assert!(!accepted.is_empty());
        assert!(accepted.second.iter().all(|r| *r == Matrix3::identity()));
    }

    #[test]
    fn atom_on_the_rotor_axis_sees_no_averaging() {
        let points = SobolPoints::generate(FrameOrderModel::Rotor, 2000, DEFAULT_SKIP).unwrap();
        let domain = Domain::Torsion { sigma_max: 2.0 };
        let accepted = AcceptedRotations::select(&points, &domain, &Matrix3::identity(), usize::MAX);
        let on_axis = PcsVectors::single(Vector3::new(0.0, 0.0, 4.0), Vector3::new(1.0, -2.0, 3.0));
        let rigid = pcs_kernel(&on_axis.rigid(), &tensor());
        assert_relative_eq!(accepted.average_pcs(&on_axis, &tensor()), rigid, max_relative = 1e-12);
    }
}
