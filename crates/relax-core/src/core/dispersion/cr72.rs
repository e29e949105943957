use super::sanitize;

/// `2^(-3/2)`, the scaling of the eta+/- arguments.
const ETA_SCALE: f64 = 0.353_553_390_593_273_8;

/// Above this the `cosh` in the R2eff expression overflows.
const MAX_ETA_POS: f64 = 700.0;

/// Back-calculates R2eff for the Carver and Richards (1972) two-site model, valid on all
/// exchange time scales.
///
/// `dw` is the chemical shift difference in rad/s, `kex` the exchange rate in rad/s and `nu_cpmg`
/// the CPMG frequencies in Hz. Setting `r20a == r20b` gives the reduced model.
pub fn r2eff_cr72(
    r20a: f64,
    r20b: f64,
    pa: f64,
    dw: f64,
    kex: f64,
    nu_cpmg: &[f64],
    back_calc: &mut [f64],
) {
    if kex == 0.0 || pa == 1.0 || dw == 0.0 {
        back_calc.iter_mut().for_each(|value| *value = r20a);
        return;
    }

    let pb = 1.0 - pa;
    let dw2 = dw * dw;
    let r20_kex = 0.5 * (r20a + r20b + kex);
    let k_ba = pa * kex;
    let k_ab = pb * kex;

    let (psi, zeta) = if (r20a - r20b).abs() > 1e-8 * r20a.abs().max(r20b.abs()) {
        let fact = r20a - r20b - k_ba + k_ab;
        (fact * fact - dw2 + 4.0 * pa * pb * kex * kex, 2.0 * dw * fact)
    } else {
        (kex * kex - dw2, -2.0 * dw * (k_ba - k_ab))
    };

    let sqrt_psi2_zeta2 = (psi * psi + zeta * zeta).sqrt();
    let d_part = (psi + 2.0 * dw2) / sqrt_psi2_zeta2;
    let d_pos = 0.5 * (1.0 + d_part);
    let d_neg = 0.5 * (-1.0 + d_part);
    let eta_pos_part = ETA_SCALE * (psi + sqrt_psi2_zeta2).sqrt();
    let eta_neg_part = ETA_SCALE * (-psi + sqrt_psi2_zeta2).max(0.0).sqrt();

    // The acosh arguments go into `back_calc` first, infinity marks an overflowing eta.
    for (value, nu) in back_calc.iter_mut().zip(nu_cpmg) {
        let eta_pos = eta_pos_part / nu;
        if eta_pos > MAX_ETA_POS {
            *value = f64::INFINITY;
            continue;
        }
        let eta_neg = eta_neg_part / nu;
        let fact = d_pos * eta_pos.cosh() - d_neg * eta_neg.cos();
        if fact < 1.0 {
            // The whole curve falls back when any point leaves the acosh domain.
            back_calc.iter_mut().for_each(|value| *value = r20_kex);
            return;
        }
        *value = fact;
    }

    for (value, nu) in back_calc.iter_mut().zip(nu_cpmg) {
        *value = if value.is_infinite() {
            r20a
        } else {
            sanitize(r20_kex - nu * value.acosh())
        };
    }
}
