//! # Target Functions
//!
//! Stateful chi-squared targets built once per problem and evaluated many times by the
//! optimisers.
//!
//! ## Overview
//!
//! A target owns its measured data, the precomputed constants of the problem and the scratch
//! buffers of its back-calculation. Every target works on the *scaled* parameter vector: the
//! optimiser sees `x`, the physics sees `x * scaling`, element-wise.
//!
//! ## Architecture
//!
//! - [`Objective`] - the optimiser protocol: chi-squared, the residual vector and its Jacobian
//! - [`Resample`] - access to the measured values for Monte Carlo simulation
//! - [`frame_order`], [`dispersion`], [`model_free`] - the three problem families
//!
//! Scratch buffers make evaluation `&mut self`; one target instance must not be shared between
//! concurrent evaluations. Parallel callers clone the target instead.

pub mod dispersion;
pub mod frame_order;
pub mod model_free;

use super::error::EngineError;
use crate::core::utils::bounds::LinearConstraints;
use nalgebra::DMatrix;

/// A least-squares objective over a scaled parameter vector.
///
/// The residuals are error-normalised, `(measured - back_calculated) / error`, so that
/// `evaluate(x) == |residuals(x)|^2`.
pub trait Objective {
    /// Short name used in logs and error messages.
    fn name(&self) -> &'static str;

    fn n_params(&self) -> usize;

    fn n_residuals(&self) -> usize;

    fn param_names(&self) -> Vec<String>;

    /// The diagonal scaling taking the optimised vector to physical units.
    fn scaling(&self) -> &[f64];

    fn evaluate(&mut self, params: &[f64]) -> Result<f64, EngineError>;

    fn residuals(&mut self, params: &[f64], out: &mut [f64]) -> Result<(), EngineError>;

    /// The Jacobian of [`Objective::residuals`], one row per residual.
    ///
    /// The default is a forward difference with a step of `sqrt(eps) * max(|x_i|, 1)`.
    fn jacobian(&mut self, params: &[f64], out: &mut DMatrix<f64>) -> Result<(), EngineError> {
        let n = self.n_residuals();
        let mut base = vec![0.0; n];
        let mut shifted = vec![0.0; n];
        self.residuals(params, &mut base)?;

        let mut x = params.to_vec();
        let sqrt_eps = f64::EPSILON.sqrt();
        for i in 0..params.len() {
            let h = sqrt_eps * params[i].abs().max(1.0);
            x[i] = params[i] + h;
            self.residuals(&x, &mut shifted)?;
            x[i] = params[i];
            for k in 0..n {
                out[(k, i)] = (shifted[k] - base[k]) / h;
            }
        }
        Ok(())
    }

    /// Linear inequalities on the optimised vector. Unconstrained unless overridden.
    fn constraints(&self) -> LinearConstraints {
        LinearConstraints::unconstrained(self.n_params())
    }

    /// Converts an optimised vector to physical units.
    fn unscale(&self, params: &[f64]) -> Vec<f64> {
        params
            .iter()
            .zip(self.scaling())
            .map(|(x, s)| x * s)
            .collect()
    }
}

/// Read and replace access to the measured values behind the residuals.
pub trait Resample: Objective {
    /// `(value, error)` of every residual entry, in residual order.
    fn measurements(&self) -> Vec<(f64, f64)>;

    /// Replaces the measured values, in residual order. The errors are kept.
    fn set_measured_values(&mut self, values: &[f64]) -> Result<(), EngineError>;
}

/// Measured values indexed `[group][item]` with a mask for the missing entries.
///
/// Errors are stored already divided by `sqrt(weight)`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MaskedData {
    pub values: Vec<Vec<f64>>,
    pub errors: Vec<Vec<f64>>,
    pub missing: Vec<Vec<bool>>,
    count: usize,
}

impl MaskedData {
    /// A NaN value marks an entry missing, with a zero value, unit error and unit weight. Absent
    /// errors take `default_error`.
    pub fn new(
        values: &[Vec<f64>],
        errors: &[Vec<Option<f64>>],
        weights: &[Vec<f64>],
        default_error: f64,
    ) -> Self {
        let mut data = Self {
            values: Vec::with_capacity(values.len()),
            errors: Vec::with_capacity(values.len()),
            missing: Vec::with_capacity(values.len()),
            count: 0,
        };
        for ((row, error_row), weight_row) in values.iter().zip(errors).zip(weights) {
            let mut value_out = Vec::with_capacity(row.len());
            let mut error_out = Vec::with_capacity(row.len());
            let mut missing_out = Vec::with_capacity(row.len());
            for ((&value, error), &weight) in row.iter().zip(error_row).zip(weight_row) {
                if value.is_nan() {
                    value_out.push(0.0);
                    error_out.push(1.0);
                    missing_out.push(true);
                } else {
                    value_out.push(value);
                    error_out.push(error.unwrap_or(default_error) / weight.sqrt());
                    missing_out.push(false);
                    data.count += 1;
                }
            }
            data.values.push(value_out);
            data.errors.push(error_out);
            data.missing.push(missing_out);
        }
        data
    }

    pub fn len(&self) -> usize {
        self.count
    }

    /// Writes the normalised residuals of the measured entries into `out` in row-major order and
    /// returns the number written.
    pub fn residuals(&self, back_calc: &[Vec<f64>], out: &mut [f64]) -> usize {
        let mut k = 0;
        for (i, row) in self.values.iter().enumerate() {
            for (j, &value) in row.iter().enumerate() {
                if self.missing[i][j] {
                    continue;
                }
                out[k] = (value - back_calc[i][j]) / self.errors[i][j];
                k += 1;
            }
        }
        k
    }

    pub fn chi2(&self, back_calc: &[Vec<f64>]) -> f64 {
        let mut chi2 = 0.0;
        for (i, row) in self.values.iter().enumerate() {
            for (j, &value) in row.iter().enumerate() {
                if !self.missing[i][j] {
                    chi2 += ((value - back_calc[i][j]) / self.errors[i][j]).powi(2);
                }
            }
        }
        chi2
    }

    pub fn measurements(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.values.iter().enumerate().flat_map(move |(i, row)| {
            row.iter()
                .enumerate()
                .filter(move |(j, _)| !self.missing[i][*j])
                .map(move |(j, &value)| (value, self.errors[i][j]))
        })
    }

    /// Overwrites the measured entries from `values` in row-major order and returns the number
    /// consumed.
    pub fn set_values(&mut self, values: &[f64]) -> usize {
        let mut k = 0;
        for (i, row) in self.values.iter_mut().enumerate() {
            for (j, value) in row.iter_mut().enumerate() {
                if !self.missing[i][j] {
                    *value = values[k];
                    k += 1;
                }
            }
        }
        k
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn masked() -> MaskedData {
        MaskedData::new(
            &[vec![1.0, f64::NAN], vec![3.0, 4.0]],
            &[vec![Some(0.5), Some(9.0)], vec![None, Some(2.0)]],
            &[vec![4.0, 1.0], vec![1.0, 1.0]],
            0.1,
        )
    }

    #[test]
    fn masked_data_applies_weights_and_defaults() {
        let data = masked();
        assert_eq!(data.len(), 3);
        assert!(data.missing[0][1]);
        assert_eq!(data.values[0][1], 0.0);
        assert_eq!(data.errors[0][1], 1.0);
        assert_relative_eq!(data.errors[0][0], 0.25);
        assert_relative_eq!(data.errors[1][0], 0.1);
    }

    #[test]
    fn missing_entries_never_contribute() {
        let data = masked();
        let back_calc = vec![vec![1.0, 1e6], vec![3.0, 4.0]];
        assert_eq!(data.chi2(&back_calc), 0.0);

        let shifted = vec![vec![0.75, -7.0], vec![3.1, 4.0]];
        let mut out = [0.0; 3];
        assert_eq!(data.residuals(&shifted, &mut out), 3);
        assert_relative_eq!(out[0], 1.0);
        assert_relative_eq!(out[1], -1.0, max_relative = 1e-12);
        assert_relative_eq!(data.chi2(&shifted), 2.0, max_relative = 1e-12);
    }

    #[test]
    fn measured_values_round_trip_in_residual_order() {
        let mut data = masked();
        let measured: Vec<_> = data.measurements().collect();
        assert_eq!(measured.len(), 3);
        assert_eq!(measured[2], (4.0, 2.0));
        assert_eq!(data.set_values(&[10.0, 30.0, 40.0]), 3);
        assert_eq!(data.values, vec![vec![10.0, 0.0], vec![30.0, 40.0]]);
    }
}
