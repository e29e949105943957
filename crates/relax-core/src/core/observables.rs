//! Forward models for residual dipolar couplings and pseudo-contact shifts, and the physical
//! constants they need.

use nalgebra::{Matrix3, Vector3, Vector5};
use std::f64::consts::PI;

/// Vacuum permeability (T m / A).
pub const MU0: f64 = 4.0 * PI * 1e-7;
/// Planck's constant (J s).
pub const PLANCK: f64 = 6.626_068_96e-34;
/// Reduced Planck constant (J s).
pub const H_BAR: f64 = PLANCK / (2.0 * PI);
/// Boltzmann's constant (J / K).
pub const BOLTZMANN: f64 = 1.380_650_4e-23;

/// Gyromagnetic ratio of 1H (rad / s / T).
pub const GAMMA_1H: f64 = 26.752_221_2e7;
/// Gyromagnetic ratio of 13C (rad / s / T).
pub const GAMMA_13C: f64 = 6.728_284e7;
/// Gyromagnetic ratio of 15N (rad / s / T).
pub const GAMMA_15N: f64 = -2.712_618_04e7;

/// The averaged N-H bond length (m).
pub const NH_BOND_LENGTH: f64 = 1.02e-10;

/// Looks up the gyromagnetic ratio of a spin type such as `"15N"` or `"1H"`.
pub fn gyromagnetic_ratio(isotope: &str) -> Option<f64> {
    match isotope.trim() {
        "1H" | "H" => Some(GAMMA_1H),
        "13C" | "C" => Some(GAMMA_13C),
        "15N" | "N" => Some(GAMMA_15N),
        _ => None,
    }
}

/// The magnetic field strength for a proton Larmor frequency in Hz.
pub fn field_strength(proton_frq: f64) -> f64 {
    2.0 * PI * proton_frq / GAMMA_1H
}

/// The dipolar constant scaling `mu^T A mu` into an RDC in Hz.
pub fn dipolar_constant(gx: f64, gh: f64, r: f64) -> f64 {
    -3.0 / (2.0 * PI) * MU0 / (4.0 * PI) * gx * gh * H_BAR / r.powi(3)
}

/// The PCS constant in ppm, `mu0 15 kB T / (16 pi^2 B0^2 r^3) x 1e6`.
pub fn pcs_constant(temperature: f64, proton_frq: f64, r: f64) -> f64 {
    let b0 = field_strength(proton_frq);
    1e6 * MU0 * 15.0 * BOLTZMANN * temperature / (16.0 * PI * PI * b0 * b0 * r.powi(3))
}

/// `d mu^T A mu` for a unit bond vector `mu`.
pub fn rdc_tensor(dip_const: f64, unit_vector: &Vector3<f64>, tensor: &Matrix3<f64>) -> f64 {
    dip_const * unit_vector.dot(&(tensor * unit_vector))
}

/// The RDC averaged over the bond vectors of a structural ensemble, evaluated directly on the
/// five independent tensor elements.
///
/// This is the mean of the per-structure [`rdc_tensor`] values, not the RDC of the mean vector.
pub fn average_rdc_5d(dip_const: f64, unit_vectors: &[Vector3<f64>], a5: &Vector5<f64>) -> f64 {
    if unit_vectors.is_empty() {
        return 0.0;
    }
    let sum: f64 = unit_vectors
        .iter()
        .map(|mu| {
            let (x, y, z) = (mu.x, mu.y, mu.z);
            let z2 = z * z;
            a5[0] * (x * x - z2)
                + a5[1] * (y * y - z2)
                + 2.0 * a5[2] * x * y
                + 2.0 * a5[3] * x * z
                + 2.0 * a5[4] * y * z
        })
        .sum();
    dip_const * sum / unit_vectors.len() as f64
}

/// `c r^T A r`. The caller folds the `1 / |r|^5` distance dependence into `c`.
pub fn pcs_tensor(c: f64, r: &Vector3<f64>, tensor: &Matrix3<f64>) -> f64 {
    c * r.dot(&(tensor * r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alignment::{to_5d, to_tensor};
    use crate::core::utils::geometry::euler_to_r_zyz;
    use approx::assert_relative_eq;

    #[test]
    fn five_dimensional_rdc_matches_tensor_form() {
        let a5 = Vector5::new(3.1e-4, -1.2e-4, 0.7e-4, -2.2e-4, 0.4e-4);
        let vectors = [
            Vector3::new(1.0, 2.0, -0.5).normalize(),
            Vector3::new(-0.3, 0.1, 0.9).normalize(),
        ];
        let d = dipolar_constant(GAMMA_15N, GAMMA_1H, NH_BOND_LENGTH);
        let tensor = to_tensor(&a5);
        let mean = vectors.iter().map(|mu| rdc_tensor(d, mu, &tensor)).sum::<f64>() / 2.0;
        assert_relative_eq!(average_rdc_5d(d, &vectors, &a5), mean, max_relative = 1e-12);
    }

    #[test]
    fn ensemble_average_is_not_the_rdc_of_the_mean_vector() {
        let mut tensor = Matrix3::<f64>::zeros();
        tensor[(0, 2)] = 1e-4;
        tensor[(2, 0)] = 1e-4;
        let vectors = [Vector3::x(), Vector3::z()];
        let averaged = average_rdc_5d(1.0, &vectors, &to_5d(&tensor));
        assert_relative_eq!(averaged, 0.0, epsilon = 1e-18);

        let mean = (vectors[0] + vectors[1]).normalize();
        assert_relative_eq!(rdc_tensor(1.0, &mean, &tensor), 1e-4, max_relative = 1e-12);
        assert_eq!(average_rdc_5d(1.0, &[], &to_5d(&tensor)), 0.0);
    }

    #[test]
    fn nh_dipolar_constant_has_expected_magnitude() {
        let d = dipolar_constant(GAMMA_15N, GAMMA_1H, NH_BOND_LENGTH);
        assert!(d > 3.0e4 && d < 4.0e4, "d = {d}");
    }

    #[test]
    fn pcs_constant_scales_with_temperature_and_field() {
        let base = pcs_constant(298.0, 600e6, 1.0);
        assert_relative_eq!(pcs_constant(596.0, 600e6, 1.0), 2.0 * base, max_relative = 1e-14);
        assert_relative_eq!(pcs_constant(298.0, 1200e6, 1.0), 0.25 * base, max_relative = 1e-14);
        assert_relative_eq!(pcs_constant(298.0, 600e6, 2.0), base / 8.0, max_relative = 1e-14);
    }

    #[test]
    fn rigid_pcs_for_rotated_axial_tensors_matches_closed_form() {
        let r = euler_to_r_zyz(0.1, 0.2, 0.3);
        let position = Vector3::<f64>::new(10.0, 0.0, 0.0);
        let c = pcs_constant(298.0, 600e6, 1.0) * 1e30 / position.norm().powi(5);
        for eigen in [
            Matrix3::from_diagonal(&Vector3::new(1e-4, -0.5e-4, -0.5e-4)),
            Matrix3::from_diagonal(&Vector3::new(-0.5e-4, 1e-4, -0.5e-4)),
        ] {
            let tensor = r * eigen * r.transpose();
            let expected = c * (position.x * position.x) * tensor[(0, 0)];
            assert_relative_eq!(pcs_tensor(c, &position, &tensor), expected, max_relative = 1e-15);
        }
    }

    #[test]
    fn gyromagnetic_lookup_knows_common_nuclei() {
        assert_eq!(gyromagnetic_ratio("15N"), Some(GAMMA_15N));
        assert_eq!(gyromagnetic_ratio(" 1H "), Some(GAMMA_1H));
        assert_eq!(gyromagnetic_ratio("31P"), None);
    }
}
