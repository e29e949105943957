use super::{INVALID_VALUE, sanitize};

/// One R1rho measurement setting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpinLockPoint {
    /// The spin-lock field strength nu1 in Hz.
    pub nu1: f64,
    /// The rotating-frame tilt angle in rad.
    pub theta: f64,
}

/// Back-calculates R1rho for the Davis, Perlman and London (1994) fast exchange model.
///
/// `r1rho = R1 cos^2(theta) + r1rho' sin^2(theta) + sin^2(theta) phi_ex kex / (kex^2 + w1^2)`,
/// with `w1 = 2 pi nu1`. A vanishing exchange term gives the exchange-free rate and a vanishing
/// denominator flags the point with [`INVALID_VALUE`].
pub fn r1rho_dpl94(
    r1rho_prime: f64,
    phi_ex: f64,
    kex: f64,
    r1: f64,
    points: &[SpinLockPoint],
    back_calc: &mut [f64],
) {
    for (value, point) in back_calc.iter_mut().zip(points) {
        let sin_theta2 = point.theta.sin().powi(2);
        let no_exchange = r1 * point.theta.cos().powi(2) + r1rho_prime * sin_theta2;
        let numer = sin_theta2 * phi_ex * kex;
        let w1 = 2.0 * std::f64::consts::PI * point.nu1;
        let denom = kex * kex + w1 * w1;
        *value = if numer == 0.0 {
            no_exchange
        } else if denom == 0.0 {
            INVALID_VALUE
        } else {
            sanitize(no_exchange + numer / denom)
        };
    }
}
