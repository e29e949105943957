//! Alignment tensors in their 5D independent form `{Axx, Ayy, Axy, Axz, Ayz}` and as full
//! symmetric traceless 3x3 matrices, plus frame-order reduction and frame rotation.

use crate::core::utils::geometry::Matrix9;
use nalgebra::{Matrix3, SVector, Vector5};

/// A static alignment tensor and the frame it was determined in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentTensor {
    pub independent: Vector5<f64>,
    /// `true` when the tensor lives in the moving domain's reference frame, `false` when it lives
    /// in the opposite frame. The flag reverses every rotation applied for this alignment.
    pub full_in_ref_frame: bool,
}

impl AlignmentTensor {
    pub fn new(independent: Vector5<f64>, full_in_ref_frame: bool) -> Self {
        Self {
            independent,
            full_in_ref_frame,
        }
    }

    pub fn tensor(&self) -> Matrix3<f64> {
        to_tensor(&self.independent)
    }
}

/// Builds the 3x3 tensor from its five independent elements.
pub fn to_tensor(a5: &Vector5<f64>) -> Matrix3<f64> {
    let (xx, yy, xy, xz, yz) = (a5[0], a5[1], a5[2], a5[3], a5[4]);
    Matrix3::new(xx, xy, xz, xy, yy, yz, xz, yz, -xx - yy)
}

/// Extracts the five independent elements of a symmetric traceless tensor.
pub fn to_5d(tensor: &Matrix3<f64>) -> Vector5<f64> {
    Vector5::new(
        tensor[(0, 0)],
        tensor[(1, 1)],
        tensor[(0, 1)],
        tensor[(0, 2)],
        tensor[(1, 2)],
    )
}

fn flatten(tensor: &Matrix3<f64>) -> SVector<f64, 9> {
    SVector::<f64, 9>::from_fn(|i, _| tensor[(i / 3, i % 3)])
}

fn unflatten(flat: &SVector<f64, 9>) -> Matrix3<f64> {
    Matrix3::from_fn(|i, j| flat[3 * i + j])
}

/// Applies a frame-order superoperator to a full 3x3 tensor, giving `<R A R^T>`.
pub fn reduce_tensor(frame_order_2nd: &Matrix9, tensor: &Matrix3<f64>) -> Matrix3<f64> {
    unflatten(&(frame_order_2nd * flatten(tensor)))
}

/// The motionally averaged tensor in 5D form.
pub fn reduce_alignment_tensor(frame_order_2nd: &Matrix9, full_tensor: &Vector5<f64>) -> Vector5<f64> {
    to_5d(&reduce_tensor(frame_order_2nd, &to_tensor(full_tensor)))
}

/// Rotates a reduced tensor by the average domain position.
///
/// Returns `R^T A R` when the tensor is in the reference frame and `R A R^T` otherwise.
pub fn rotate_reduced_tensor(
    r_ave: &Matrix3<f64>,
    reduced: &Matrix3<f64>,
    full_in_ref_frame: bool,
) -> Matrix3<f64> {
    if full_in_ref_frame {
        r_ave.transpose() * reduced * r_ave
    } else {
        r_ave * reduced * r_ave.transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frame_order::matrix::compile_torsion;
    use crate::core::utils::geometry::euler_to_r_zyz;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn sample_tensor() -> Vector5<f64> {
        Vector5::new(1.2e-4, -0.4e-4, 0.3e-4, -0.7e-4, 0.15e-4)
    }

    #[test]
    fn five_dimensional_round_trip_is_exact() {
        let a5 = sample_tensor();
        let tensor = to_tensor(&a5);
        assert_eq!(to_5d(&tensor), a5);
        assert_eq!(to_tensor(&to_5d(&tensor)), tensor);
        assert_relative_eq!(tensor.trace(), 0.0, epsilon = 1e-20);
        assert_eq!(tensor, tensor.transpose());
    }

    #[test]
    fn identity_frame_order_leaves_tensor_unchanged() {
        let a5 = sample_tensor();
        assert_eq!(reduce_alignment_tensor(&Matrix9::identity(), &a5), a5);
    }

    #[test]
    fn reduction_shrinks_tensor_under_motion() {
        let a5 = sample_tensor();
        let reduced = reduce_alignment_tensor(&compile_torsion(&Vector3::z(), 1.0), &a5);
        assert!(to_tensor(&reduced).norm() < to_tensor(&a5).norm());
        assert_relative_eq!(to_tensor(&reduced).trace(), 0.0, epsilon = 1e-20);
    }

    #[test]
    fn rotation_direction_follows_reference_frame_flag() {
        let r = euler_to_r_zyz(0.5, 1.0, 2.0);
        let a = to_tensor(&sample_tensor());
        assert_relative_eq!(rotate_reduced_tensor(&r, &a, true), r.transpose() * a * r, epsilon = 1e-20);
        assert_relative_eq!(rotate_reduced_tensor(&r, &a, false), r * a * r.transpose(), epsilon = 1e-20);
    }

    #[test]
    fn forward_then_backward_rotation_restores_tensor() {
        let r = euler_to_r_zyz(-0.3, 2.2, 0.9);
        let a = to_tensor(&sample_tensor());
        let there = rotate_reduced_tensor(&r, &a, true);
        let back = rotate_reduced_tensor(&r, &there, false);
        assert_relative_eq!(back, a, epsilon = 1e-18);
    }
}
