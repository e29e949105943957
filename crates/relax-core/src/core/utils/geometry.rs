use nalgebra::{Matrix3, Rotation3, SMatrix, Unit, Vector3};
use std::f64::consts::PI;
use thiserror::Error;

/// The 9x9 second-degree frame-order superoperator type, acting on row-major flattened 3x3 tensors.
pub type Matrix9 = SMatrix<f64, 9, 9>;

const PARALLEL_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("Cannot build a rotation from a zero-length vector ({name})")]
    ZeroLengthVector { name: &'static str },
}

/// Rotation about the z-axis by `angle` radians.
#[inline]
pub fn rot_z(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0)
}

/// Rotation about the y-axis by `angle` radians.
#[inline]
pub fn rot_y(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(c, 0.0, s, 0.0, 1.0, 0.0, -s, 0.0, c)
}

/// Rotation about the x-axis by `angle` radians.
#[inline]
pub fn rot_x(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c)
}

/// Builds the rotation matrix for the z-y-z Euler angle convention.
///
/// The matrix is the active rotation `R = Rz(gamma) . Ry(beta) . Rz(alpha)`. Every rotation in the
/// crate that is parameterised by Euler angles goes through this function.
pub fn euler_to_r_zyz(alpha: f64, beta: f64, gamma: f64) -> Matrix3<f64> {
    let (sin_a, cos_a) = alpha.sin_cos();
    let (sin_b, cos_b) = beta.sin_cos();
    let (sin_g, cos_g) = gamma.sin_cos();

    Matrix3::new(
        -sin_a * sin_g + cos_a * cos_b * cos_g,
        -cos_a * sin_g - sin_a * cos_b * cos_g,
        sin_b * cos_g,
        sin_a * cos_g + cos_a * cos_b * sin_g,
        cos_a * cos_g - sin_a * cos_b * sin_g,
        sin_b * sin_g,
        -cos_a * sin_b,
        sin_a * sin_b,
        cos_b,
    )
}

/// Recovers z-y-z Euler angles from a rotation matrix.
///
/// In the gimbal-lock cases (`beta` of 0 or pi) the whole in-plane rotation is assigned to `alpha`
/// and `gamma` is returned as zero. Angles are wrapped to `[0, 2pi)`.
pub fn r_to_euler_zyz(r: &Matrix3<f64>) -> (f64, f64, f64) {
    let beta = r[(2, 2)].clamp(-1.0, 1.0).acos();
    let (alpha, gamma) = if beta.sin().abs() > 1e-10 {
        (r[(2, 1)].atan2(-r[(2, 0)]), r[(1, 2)].atan2(r[(0, 2)]))
    } else if r[(2, 2)] > 0.0 {
        (r[(1, 0)].atan2(r[(0, 0)]), 0.0)
    } else {
        (r[(1, 0)].atan2(-r[(0, 0)]), 0.0)
    };
    (wrap_angle(alpha), beta, wrap_angle(gamma))
}

/// Wraps an angle to the interval `[0, 2pi)`.
#[inline]
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(2.0 * PI);
    if wrapped >= 2.0 * PI { 0.0 } else { wrapped }
}

/// Converts spherical coordinates (polar angle `theta` in `[0, pi]`, azimuth `phi`) to Cartesian.
#[inline]
pub fn spherical_to_cartesian(r: f64, theta: f64, phi: f64) -> Vector3<f64> {
    let (sin_t, cos_t) = theta.sin_cos();
    let (sin_p, cos_p) = phi.sin_cos();
    Vector3::new(r * sin_t * cos_p, r * sin_t * sin_p, r * cos_t)
}

/// Converts a Cartesian vector to `(r, theta, phi)`.
///
/// The projected coordinate fed to `acos` is clamped to `[-1, 1]`. The zero vector maps to all
/// zeros and `phi` is wrapped to `[0, 2pi)`.
pub fn cartesian_to_spherical(v: &Vector3<f64>) -> (f64, f64, f64) {
    let r = v.norm();
    if r == 0.0 {
        return (0.0, 0.0, 0.0);
    }
    let theta = (v.z / r).clamp(-1.0, 1.0).acos();
    let phi = wrap_angle(v.y.atan2(v.x));
    (r, theta, phi)
}

/// The minimal rotation taking the direction of `v1` onto the direction of `v2`.
///
/// Parallel inputs give the identity. Anti-parallel inputs give a rotation by pi about an axis
/// perpendicular to `v1`.
pub fn two_vect_to_r(v1: &Vector3<f64>, v2: &Vector3<f64>) -> Result<Matrix3<f64>, GeometryError> {
    let a = Unit::try_new(*v1, 0.0).ok_or(GeometryError::ZeroLengthVector { name: "v1" })?;
    let b = Unit::try_new(*v2, 0.0).ok_or(GeometryError::ZeroLengthVector { name: "v2" })?;

    let cross = a.cross(&b);
    let sin_angle = cross.norm();
    let cos_angle = a.dot(&b);

    if sin_angle < PARALLEL_TOLERANCE {
        if cos_angle > 0.0 {
            return Ok(Matrix3::identity());
        }
        let helper = if a.x.abs() < 0.9 {
            Vector3::x()
        } else {
            Vector3::y()
        };
        let axis = a.cross(&helper).normalize();
        return Ok(2.0 * axis * axis.transpose() - Matrix3::identity());
    }

    let axis = Unit::new_unchecked(cross / sin_angle);
    Ok(Rotation3::from_axis_angle(&axis, sin_angle.atan2(cos_angle)).into_inner())
}

/// Kronecker product of two 3x3 matrices, `K[3i+k, 3j+l] = A[i,j] B[k,l]`.
pub fn kron_prod(a: &Matrix3<f64>, b: &Matrix3<f64>) -> Matrix9 {
    Matrix9::from_fn(|row, col| a[(row / 3, col / 3)] * b[(row % 3, col % 3)])
}

/// The tilt and torsion rotation `Rz(phi) . Ry(theta) . Rz(sigma - phi)`.
///
/// `theta` tilts the z-axis towards the azimuth `phi` and `sigma` twists about the tilted axis.
#[inline]
pub fn tilt_torsion_to_r(phi: f64, theta: f64, sigma: f64) -> Matrix3<f64> {
    euler_to_r_zyz(sigma - phi, theta, phi)
}

/// The cross-product matrix `[u]x` so that `[u]x . v = u x v`.
#[inline]
pub fn cross_matrix(u: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -u.z, u.y, u.z, 0.0, -u.x, -u.y, u.x, 0.0)
}
