use super::{Objective, Resample};
use crate::core::dispersion::cr72::r2eff_cr72;
use crate::core::dispersion::dpl94::{SpinLockPoint, r1rho_dpl94};
use crate::core::dispersion::lm63::r2eff_lm63;
use crate::core::dispersion::{DispersionError, DispersionModel, DispersionParams, ppm_to_rad};
use crate::core::io::table::DispersionCurves;
use crate::core::utils::bounds::{GridAxis, LinearConstraints};
use crate::engine::config::{ConfigError, DispersionConfig};
use crate::engine::error::EngineError;
use std::f64::consts::FRAC_PI_2;
use tracing::debug;

/// Scaling of the R20 (or R1rho') rates, in s^-1.
pub const R20_SCALING: f64 = 10.0;
/// Scaling of the exchange rate, in rad/s.
pub const KEX_SCALING: f64 = 1e4;

/// One curve of a spin at one field, stored flat for the model functions.
#[derive(Debug, Clone)]
struct Curve {
    dispersion: Vec<f64>,
    spin_lock: Vec<SpinLockPoint>,
    values: Vec<f64>,
    errors: Vec<f64>,
    back_calc: Vec<f64>,
}

/// The relaxation-dispersion chi-squared target for a cluster of spins sharing `pA` and `kex`.
///
/// Curves are indexed `[spin][field]`. The shift difference `dw` (ppm) and `phi_ex` (ppm^2) are
/// converted to rad/s once per field at construction.
#[derive(Debug, Clone)]
pub struct Dispersion {
    model: DispersionModel,
    num_spins: usize,
    num_fields: usize,
    curves: Vec<Vec<Curve>>,
    /// `[field]`, ppm to rad/s of the X nucleus.
    frq_rad: Vec<f64>,
    r1: Vec<Vec<f64>>,
    scaling: Vec<f64>,
    num_points: usize,
    unscaled: Vec<f64>,
}

impl Dispersion {
    pub fn new(config: &DispersionConfig) -> Result<Self, EngineError> {
        let model = config.model;
        let num_spins = config.curves.len();
        let num_fields = config.fields.len();
        check_shape("curves per spin", &config.curves, num_fields)?;

        let r1 = if model.is_r1rho() {
            let r1 = config
                .r1
                .as_ref()
                .ok_or(ConfigError::MissingParameter("r1"))?;
            if r1.len() != num_spins {
                return Err(DispersionError::DataShape {
                    what: "R1 spins",
                    expected: num_spins,
                    found: r1.len(),
                }
                .into());
            }
            if let Some(row) = r1.iter().find(|row| row.len() != num_fields) {
                return Err(DispersionError::DataShape {
                    what: "R1 fields",
                    expected: num_fields,
                    found: row.len(),
                }
                .into());
            }
            r1.clone()
        } else {
            vec![vec![0.0; num_fields]; num_spins]
        };

        let curves: Vec<Vec<Curve>> = config
            .curves
            .iter()
            .map(|spin| {
                spin.iter()
                    .map(|points| Curve {
                        dispersion: points.iter().map(|p| p.dispersion).collect(),
                        spin_lock: points
                            .iter()
                            .map(|p| SpinLockPoint {
                                nu1: p.dispersion,
                                theta: p.theta.unwrap_or(FRAC_PI_2),
                            })
                            .collect(),
                        values: points.iter().map(|p| p.value).collect(),
                        errors: points.iter().map(|p| p.error).collect(),
                        back_calc: vec![0.0; points.len()],
                    })
                    .collect()
            })
            .collect();
        let num_points = curves.iter().flatten().map(|c| c.values.len()).sum();

        let frq_rad = config
            .fields
            .iter()
            .map(|&frq| ppm_to_rad(frq, config.gamma_x))
            .collect();
        let scaling = Self::default_scaling(model, num_spins, num_fields);

        debug!(
            model = model.name(),
            spins = num_spins,
            fields = num_fields,
            points = num_points,
            "Dispersion target constructed"
        );

        Ok(Self {
            model,
            num_spins,
            num_fields,
            curves,
            frq_rad,
            r1,
            unscaled: vec![0.0; scaling.len()],
            scaling,
            num_points,
        })
    }

    pub fn model(&self) -> DispersionModel {
        self.model
    }

    pub fn default_scaling(model: DispersionModel, num_spins: usize, num_fields: usize) -> Vec<f64> {
        Self::per_param(model, num_spins, num_fields, |kind| match kind {
            Kind::R20 => R20_SCALING,
            Kind::Kex => KEX_SCALING,
            Kind::Dw | Kind::PhiEx | Kind::Pa => 1.0,
        })
    }

    /// Default grid in scaled units with `inc` points per dimension.
    pub fn default_grid(&self, inc: usize) -> Vec<GridAxis> {
        Self::per_param(self.model, self.num_spins, self.num_fields, |kind| {
            let (lower, upper) = match kind {
                Kind::R20 => (1.0, 40.0),
                Kind::Dw => (0.0, 10.0),
                Kind::PhiEx => (0.0, 1.0),
                Kind::Pa => (0.5, 1.0),
                Kind::Kex => (1.0, 1e4),
            };
            (lower, upper)
        })
        .into_iter()
        .zip(&self.scaling)
        .map(|((lower, upper), s)| GridAxis::new(inc, lower / s, upper / s))
        .collect()
    }

    /// Back-calculated values from the last evaluation, `[spin][field][point]`.
    pub fn back_calc(&self) -> Vec<Vec<Vec<f64>>> {
        self.curves
            .iter()
            .map(|spin| spin.iter().map(|c| c.back_calc.clone()).collect())
            .collect()
    }

    fn per_param<T>(
        model: DispersionModel,
        num_spins: usize,
        num_fields: usize,
        f: impl Fn(Kind) -> T,
    ) -> Vec<T> {
        let r20_blocks = if model == DispersionModel::Cr72 { 2 } else { 1 };
        let mut out: Vec<T> = (0..r20_blocks * num_spins * num_fields)
            .map(|_| f(Kind::R20))
            .collect();
        match model {
            DispersionModel::NoRex => {}
            DispersionModel::Lm63 | DispersionModel::Dpl94 => {
                out.extend((0..num_spins).map(|_| f(Kind::PhiEx)));
                out.push(f(Kind::Kex));
            }
            DispersionModel::Cr72 | DispersionModel::Cr72Red => {
                out.extend((0..num_spins).map(|_| f(Kind::Dw)));
                out.push(f(Kind::Pa));
                out.push(f(Kind::Kex));
            }
        }
        out
    }

    fn back_calculate(&mut self, params: &[f64]) -> Result<(), EngineError> {
        if params.len() != self.scaling.len() {
            return Err(DispersionError::ParameterCount {
                model: self.model.name(),
                expected: self.scaling.len(),
                found: params.len(),
            }
            .into());
        }
        for ((u, x), s) in self.unscaled.iter_mut().zip(params).zip(&self.scaling) {
            *u = x * s;
        }
        let p = DispersionParams::decode(self.model, self.num_spins, self.num_fields, &self.unscaled)?;

        for (si, spin) in self.curves.iter_mut().enumerate() {
            for (fi, curve) in spin.iter_mut().enumerate() {
                let frq = self.frq_rad[fi];
                let r20a = p.r20a[si][fi];
                match self.model {
                    DispersionModel::NoRex => curve.back_calc.fill(r20a),
                    DispersionModel::Lm63 => r2eff_lm63(
                        r20a,
                        p.phi_ex[si] * frq * frq,
                        p.kex,
                        &curve.dispersion,
                        &mut curve.back_calc,
                    ),
                    DispersionModel::Cr72 | DispersionModel::Cr72Red => r2eff_cr72(
                        r20a,
                        p.r20b[si][fi],
                        p.pa,
                        p.dw[si] * frq,
                        p.kex,
                        &curve.dispersion,
                        &mut curve.back_calc,
                    ),
                    DispersionModel::Dpl94 => r1rho_dpl94(
                        r20a,
                        p.phi_ex[si] * frq * frq,
                        p.kex,
                        self.r1[si][fi],
                        &curve.spin_lock,
                        &mut curve.back_calc,
                    ),
                }
            }
        }
        Ok(())
    }

    fn points(&self) -> impl Iterator<Item = (&f64, &f64, &f64)> {
        self.curves.iter().flatten().flat_map(|c| {
            c.values
                .iter()
                .zip(&c.errors)
                .zip(&c.back_calc)
                .map(|((v, e), b)| (v, e, b))
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    R20,
    Dw,
    PhiEx,
    Pa,
    Kex,
}

fn check_shape(
    what: &'static str,
    curves: &DispersionCurves,
    num_fields: usize,
) -> Result<(), DispersionError> {
    match curves.iter().find(|spin| spin.len() != num_fields) {
        Some(spin) => Err(DispersionError::DataShape {
            what,
            expected: num_fields,
            found: spin.len(),
        }),
        None => Ok(()),
    }
}

impl Objective for Dispersion {
    fn name(&self) -> &'static str {
        self.model.name()
    }

    fn n_params(&self) -> usize {
        self.scaling.len()
    }

    fn n_residuals(&self) -> usize {
        self.num_points
    }

    fn param_names(&self) -> Vec<String> {
        self.model.param_names(self.num_spins, self.num_fields)
    }

    fn scaling(&self) -> &[f64] {
        &self.scaling
    }

    fn evaluate(&mut self, params: &[f64]) -> Result<f64, EngineError> {
        self.back_calculate(params)?;
        let chi2: f64 = self
            .points()
            .map(|(value, error, back)| ((value - back) / error).powi(2))
            .sum();
        if !chi2.is_finite() {
            return Err(EngineError::NonFinite {
                target: self.model.name(),
            });
        }
        Ok(chi2)
    }

    fn residuals(&mut self, params: &[f64], out: &mut [f64]) -> Result<(), EngineError> {
        self.back_calculate(params)?;
        for (slot, (value, error, back)) in out.iter_mut().zip(self.points()) {
            *slot = (value - back) / error;
        }
        Ok(())
    }

    fn constraints(&self) -> LinearConstraints {
        let kinds = Self::per_param(self.model, self.num_spins, self.num_fields, |k| k);
        let mut rows = Vec::new();
        for (i, (kind, &s)) in kinds.iter().zip(&self.scaling).enumerate() {
            rows.push((vec![(i, s)], if matches!(kind, Kind::Pa) { 0.5 } else { 0.0 }));
            if matches!(kind, Kind::Pa) {
                rows.push((vec![(i, -s)], -1.0));
            }
        }
        LinearConstraints::from_rows(self.scaling.len(), &rows)
    }
}

impl Resample for Dispersion {
    fn measurements(&self) -> Vec<(f64, f64)> {
        self.curves
            .iter()
            .flatten()
            .flat_map(|c| c.values.iter().copied().zip(c.errors.iter().copied()))
            .collect()
    }

    fn set_measured_values(&mut self, values: &[f64]) -> Result<(), EngineError> {
        if values.len() != self.num_points {
            return Err(EngineError::Internal(format!(
                "expected {} measured values, got {}",
                self.num_points,
                values.len()
            )));
        }
        let mut rest = values;
        for curve in self.curves.iter_mut().flatten() {
            let (head, tail) = rest.split_at(curve.values.len());
            curve.values.copy_from_slice(head);
            rest = tail;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::table::CurvePoint;
    use crate::core::observables::GAMMA_15N;
    use approx::assert_relative_eq;

    const NU: [f64; 5] = [50.0, 100.0, 200.0, 500.0, 1000.0];
    const FIELDS: [f64; 2] = [600e6, 800e6];

    fn curve(values: impl Fn(f64) -> f64) -> Vec<CurvePoint> {
        NU.iter()
            .map(|&nu| CurvePoint {
                dispersion: nu,
                theta: None,
                value: values(nu),
                error: 0.5,
            })
            .collect()
    }

    fn config(model: DispersionModel, curves: DispersionCurves) -> DispersionConfig {
        DispersionConfig {
            model,
            gamma_x: GAMMA_15N,
            fields: FIELDS.to_vec(),
            curves,
            r1: model.is_r1rho().then(|| vec![vec![1.2, 1.0]]),
        }
    }

    fn lm63_curves(r20: [f64; 2], phi_ex_ppm: f64, kex: f64) -> DispersionCurves {
        let curves = FIELDS
            .iter()
            .zip(r20)
            .map(|(&frq, r20)| {
                let rad = ppm_to_rad(frq, GAMMA_15N);
                let mut out = [0.0; 5];
                r2eff_lm63(r20, phi_ex_ppm * rad * rad, kex, &NU, &mut out);
                let mut points = curve(|_| 0.0);
                for (point, value) in points.iter_mut().zip(out) {
                    point.value = value;
                }
                points
            })
            .collect();
        vec![curves]
    }

    #[test]
    fn lm63_truth_has_zero_chi2() {
        let mut target =
            Dispersion::new(&config(DispersionModel::Lm63, lm63_curves([10.0, 12.0], 0.5, 1500.0)))
                .unwrap();
        assert_eq!(target.n_params(), 4);
        assert_eq!(target.n_residuals(), 10);
        let scaled = [1.0, 1.2, 0.5, 0.15];
        assert_relative_eq!(target.evaluate(&scaled).unwrap(), 0.0, epsilon = 1e-18);

        let back_calc = target.back_calc();
        assert!(back_calc[0][1][0] > back_calc[0][1][4]);
        assert!(back_calc[0][1][0] - back_calc[0][1][4] > back_calc[0][0][0] - back_calc[0][0][4]);
    }

    #[test]
    fn no_rex_is_a_flat_line_per_field() {
        let curves = vec![vec![curve(|_| 11.0), curve(|_| 13.0)]];
        let mut target = Dispersion::new(&config(DispersionModel::NoRex, curves)).unwrap();
        assert_eq!(target.param_names(), vec!["r20[0][0]", "r20[0][1]"]);
        assert_relative_eq!(target.evaluate(&[1.1, 1.3]).unwrap(), 0.0, epsilon = 1e-20);
        // Each of the 5 points is off by 1 with an error of 0.5.
        assert_relative_eq!(target.evaluate(&[1.0, 1.3]).unwrap(), 20.0, max_relative = 1e-12);
    }

    #[test]
    fn cr72_red_matches_full_cr72_with_equal_rates() {
        let curves = vec![vec![curve(|nu| 15.0 - nu / 500.0), curve(|nu| 17.0 - nu / 400.0)]];
        let mut full = Dispersion::new(&config(DispersionModel::Cr72, curves.clone())).unwrap();
        let mut red = Dispersion::new(&config(DispersionModel::Cr72Red, curves)).unwrap();

        let exchange = [2.0, 0.9, 0.2];
        let mut full_params = vec![1.2, 1.4, 1.2, 1.4];
        full_params.extend(exchange);
        let mut red_params = vec![1.2, 1.4];
        red_params.extend(exchange);

        assert_relative_eq!(
            full.evaluate(&full_params).unwrap(),
            red.evaluate(&red_params).unwrap(),
            max_relative = 1e-10
        );
    }

    #[test]
    fn dpl94_uses_r1_and_default_on_resonance_tilt() {
        let curves = vec![vec![curve(|_| 0.0), curve(|_| 0.0)]];
        let mut target = Dispersion::new(&config(DispersionModel::Dpl94, curves)).unwrap();
        target.evaluate(&[1.0, 1.0, 0.0, 0.1]).unwrap();
        // With theta = pi/2 and no exchange the rate is r1rho' alone.
        assert!(target.back_calc()[0][0].iter().all(|v| (*v - 10.0).abs() < 1e-12));

        let mut missing = config(DispersionModel::Dpl94, vec![vec![curve(|_| 0.0), curve(|_| 0.0)]]);
        missing.r1 = Some(vec![vec![1.0]]);
        assert!(matches!(
            Dispersion::new(&missing).unwrap_err(),
            EngineError::Dispersion {
                source: DispersionError::DataShape { what: "R1 fields", .. }
            }
        ));
    }

    #[test]
    fn default_grid_and_constraints_are_in_scaled_units() {
        let target = Dispersion::new(&config(
            DispersionModel::Cr72Red,
            vec![vec![curve(|_| 10.0), curve(|_| 10.0)]],
        ))
        .unwrap();
        let grid = target.default_grid(3);
        assert_eq!(grid.len(), 5);
        assert_relative_eq!(grid[0].upper, 4.0);
        assert_relative_eq!(grid[4].upper, 1.0);
        assert_relative_eq!(grid[3].lower, 0.5);

        let constraints = target.constraints();
        assert_eq!(constraints.len(), 6);
        assert!(constraints.is_satisfied(&[1.0, 1.0, 2.0, 0.8, 0.1]));
        assert_eq!(constraints.violations(&[1.0, 1.0, 2.0, 1.2, 0.1]), vec![4]);
        assert_eq!(constraints.violations(&[-1.0, 1.0, 2.0, 0.8, 0.1]), vec![0]);
    }

    #[test]
    fn wrong_field_count_is_rejected() {
        let curves = vec![vec![curve(|_| 10.0)]];
        assert!(matches!(
            Dispersion::new(&config(DispersionModel::NoRex, curves)).unwrap_err(),
            EngineError::Dispersion {
                source: DispersionError::DataShape { expected: 2, found: 1, .. }
            }
        ));
    }

    #[test]
    fn residual_order_follows_spin_field_point() {
        let curves = vec![vec![curve(|nu| nu), curve(|nu| 2.0 * nu)]];
        let mut target = Dispersion::new(&config(DispersionModel::NoRex, curves)).unwrap();
        let measured = target.measurements();
        assert_eq!(measured[0], (50.0, 0.5));
        assert_eq!(measured[5], (100.0, 0.5));

        let mut out = vec![0.0; 10];
        target.residuals(&[0.0, 0.0], &mut out).unwrap();
        assert_relative_eq!(out[9], 4000.0);

        let replaced: Vec<f64> = (0..10).map(f64::from).collect();
        target.set_measured_values(&replaced).unwrap();
        assert_eq!(target.measurements()[7], (7.0, 0.5));
    }
}
