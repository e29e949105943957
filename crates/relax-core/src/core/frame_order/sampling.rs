use super::FrameOrderError;
use super::model::{FrameOrderModel, SobolAngle};
use crate::core::sobol;
use crate::core::utils::geometry::{rot_x, rot_y, rot_z, tilt_torsion_to_r};
use nalgebra::Matrix3;
use std::f64::consts::PI;

/// Sobol' points mapped to motional angles, with the inner rotation of every point precomputed.
///
/// Angle vectors that the model does not sample are left empty. `rotations2` is only filled for
/// the double rotor, where `rotations` holds the first (y-axis) torsion and `rotations2` the
/// second (x-axis) torsion.
#[derive(Debug, Clone, PartialEq)]
pub struct SobolPoints {
    pub model: FrameOrderModel,
    pub theta: Vec<f64>,
    pub phi: Vec<f64>,
    pub sigma: Vec<f64>,
    pub sigma2: Vec<f64>,
    pub rotations: Vec<Matrix3<f64>>,
    pub rotations2: Vec<Matrix3<f64>>,
}

impl SobolPoints {
    /// The number of points generated for a sampling budget, `max_points * oversample * 10^m`.
    pub fn total_points(model: FrameOrderModel, max_points: usize, oversample: f64) -> usize {
        let dims = model.sobol_dimensions();
        if dims == 0 {
            return 0;
        }
        (max_points as f64 * oversample * 10f64.powi(dims as i32)).round() as usize
    }

    pub fn generate(
        model: FrameOrderModel,
        total: usize,
        skip: u64,
    ) -> Result<Self, FrameOrderError> {
        let angles = model.sobol_angles();
        let mut points = Self {
            model,
            theta: Vec::new(),
            phi: Vec::new(),
            sigma: Vec::new(),
            sigma2: Vec::new(),
            rotations: Vec::new(),
            rotations2: Vec::new(),
        };
        if angles.is_empty() || total == 0 {
            return Ok(points);
        }

        let raw = sobol::generate(angles.len(), total, skip)?;
        for (angle, row) in angles.iter().zip(raw) {
            match angle {
                SobolAngle::Theta => {
                    points.theta = row.into_iter().map(|u| (2.0 * u - 1.0).acos()).collect()
                }
                SobolAngle::Phi => points.phi = row.into_iter().map(|u| 2.0 * PI * u).collect(),
                SobolAngle::Sigma => points.sigma = row.into_iter().map(torsion_angle).collect(),
                SobolAngle::Sigma2 => points.sigma2 = row.into_iter().map(torsion_angle).collect(),
            }
        }

        points.rotations = (0..total).map(|i| points.inner_rotation(i)).collect();
        if model == FrameOrderModel::DoubleRotor {
            points.rotations2 = points.sigma2.iter().map(|&s| rot_x(s)).collect();
        }
        Ok(points)
    }

    fn inner_rotation(&self, i: usize) -> Matrix3<f64> {
        match self.model {
            FrameOrderModel::Rigid => Matrix3::identity(),
            FrameOrderModel::Rotor | FrameOrderModel::FreeRotor => rot_z(self.sigma[i]),
            FrameOrderModel::IsoConeTorsionless | FrameOrderModel::PseudoEllipseTorsionless => {
                tilt_torsion_to_r(self.phi[i], self.theta[i], 0.0)
            }
            FrameOrderModel::IsoCone
            | FrameOrderModel::IsoConeFreeRotor
            | FrameOrderModel::PseudoEllipse
            | FrameOrderModel::PseudoEllipseFreeRotor => {
                tilt_torsion_to_r(self.phi[i], self.theta[i], self.sigma[i])
            }
            FrameOrderModel::DoubleRotor => rot_y(self.sigma[i]),
        }
    }

    pub fn len(&self) -> usize {
        self.rotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rotations.is_empty()
    }
}

fn torsion_angle(u: f64) -> f64 {
    2.0 * PI * (u - 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn total_points_scales_with_dimensionality() {
        assert_eq!(SobolPoints::total_points(FrameOrderModel::Rigid, 200, 1.0), 0);
        assert_eq!(SobolPoints::total_points(FrameOrderModel::Rotor, 200, 1.0), 2_000);
        assert_eq!(SobolPoints::total_points(FrameOrderModel::IsoConeTorsionless, 200, 1.5), 30_000);
        assert_eq!(SobolPoints::total_points(FrameOrderModel::IsoCone, 20, 1.0), 20_000);
    }

    #[test]
    fn cone_points_cover_the_sphere_uniformly_in_cos_theta() {
        let points = SobolPoints::generate(FrameOrderModel::IsoCone, 4096, 0).unwrap();
        assert_eq!(points.len(), 4096);
        let upper = points.theta.iter().filter(|t| **t <= PI / 2.0).count();
        assert_eq!(upper, 2048);
        assert!(points.sigma.iter().all(|s| (-PI..PI).contains(s)));
        assert!(points.rotations2.is_empty());
    }

    #[test]
    fn inner_rotation_tilts_z_to_sampled_direction() {
        let points = SobolPoints::generate(FrameOrderModel::PseudoEllipse, 64, 7).unwrap();
        for i in 0..points.len() {
            let (theta, phi) = (points.theta[i], points.phi[i]);
            let expected = Vector3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos());
            assert_relative_eq!(points.rotations[i] * Vector3::z(), expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn torsionless_points_carry_no_torsion_samples() {
        let points = SobolPoints::generate(FrameOrderModel::IsoConeTorsionless, 32, 0).unwrap();
        assert!(points.sigma.is_empty());
        assert_eq!(points.theta.len(), 32);
    }

    #[test]
    fn double_rotor_stores_two_rotation_sets() {
        let points = SobolPoints::generate(FrameOrderModel::DoubleRotor, 16, 0).unwrap();
        assert_eq!(points.rotations.len(), 16);
        assert_eq!(points.rotations2.len(), 16);
        for i in 0..16 {
            assert_relative_eq!(points.rotations[i], rot_y(points.sigma[i]), epsilon = 1e-15);
            assert_relative_eq!(points.rotations2[i], rot_x(points.sigma2[i]), epsilon = 1e-15);
        }
    }

    #[test]
    fn rigid_model_generates_nothing() {
        let points = SobolPoints::generate(FrameOrderModel::Rigid, 100, 0).unwrap();
        assert!(points.is_empty());
    }
}
