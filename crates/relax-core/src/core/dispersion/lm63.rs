use super::sanitize;

/// Back-calculates R2eff for the Luz and Meiboom (1963) fast two-site exchange model.
///
/// `phi_ex` is `pA pB dw^2` in rad^2/s^2 and `nu_cpmg` the CPMG frequencies in Hz. No exchange
/// (`kex = 0` or `phi_ex = 0`) gives a flat `r20` line.
pub fn r2eff_lm63(r20: f64, phi_ex: f64, kex: f64, nu_cpmg: &[f64], back_calc: &mut [f64]) {
    if kex == 0.0 || phi_ex == 0.0 {
        back_calc.iter_mut().for_each(|value| *value = r20);
        return;
    }
    let rex = phi_ex / kex;
    let kex_4 = 4.0 / kex;
    for (value, nu) in back_calc.iter_mut().zip(nu_cpmg) {
        *value = sanitize(r20 + rex * (1.0 - kex_4 * nu * (kex / (4.0 * nu)).tanh()));
    }
}
