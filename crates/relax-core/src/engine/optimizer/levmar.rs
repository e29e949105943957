use super::FitResult;
use crate::engine::config::OptimizationConfig;
use crate::engine::error::EngineError;
use crate::engine::target::Objective;
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{DMatrix, DVector, Dyn, Owned};
use std::cell::{Cell, RefCell};
use tracing::{debug, instrument, warn};

/// The residual assigned to every entry when the target fails at a trial point.
///
/// A failed point then looks like a large uphill step and the solver shrinks its trust region
/// instead of aborting.
const FAILED_RESIDUAL: f64 = 1e10;

/// Adapts an [`Objective`] to the `levenberg-marquardt` problem interface.
///
/// The solver asks for the Jacobian through `&self`, so the target sits behind a `RefCell`.
struct Problem<'a, T: Objective + ?Sized> {
    target: RefCell<&'a mut T>,
    params: DVector<f64>,
    residuals: DVector<f64>,
    function_count: Cell<usize>,
    jacobian_count: Cell<usize>,
    failed_points: Cell<usize>,
}

impl<'a, T: Objective + ?Sized> Problem<'a, T> {
    fn new(target: &'a mut T, x0: &[f64]) -> Result<Self, EngineError> {
        let mut residuals = DVector::zeros(target.n_residuals());
        target.residuals(x0, residuals.as_mut_slice())?;
        if residuals.iter().any(|r| !r.is_finite()) {
            return Err(EngineError::NonFinite {
                target: target.name(),
            });
        }
        Ok(Self {
            target: RefCell::new(target),
            params: DVector::from_column_slice(x0),
            residuals,
            function_count: Cell::new(1),
            jacobian_count: Cell::new(0),
            failed_points: Cell::new(0),
        })
    }
}

impl<T: Objective + ?Sized> LeastSquaresProblem<f64, Dyn, Dyn> for Problem<'_, T> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.copy_from(x);
        self.function_count.set(self.function_count.get() + 1);
        let target = self.target.get_mut();
        let ok = target
            .residuals(self.params.as_slice(), self.residuals.as_mut_slice())
            .is_ok();
        if !ok || self.residuals.iter().any(|r| !r.is_finite()) {
            self.failed_points.set(self.failed_points.get() + 1);
            self.residuals.fill(FAILED_RESIDUAL);
        }
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.residuals.clone())
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        self.jacobian_count.set(self.jacobian_count.get() + 1);
        let mut target = self.target.borrow_mut();
        let mut jacobian = DMatrix::zeros(target.n_residuals(), target.n_params());
        target.jacobian(self.params.as_slice(), &mut jacobian).ok()?;
        jacobian.iter().all(|v| v.is_finite()).then_some(jacobian)
    }
}

/// Refines `x0` with Levenberg-Marquardt.
///
/// An error at the starting point is returned as is. Later failures only reject the trial step.
/// Non-convergence and constraint violations of the final point are reported through
/// [`FitResult::warning`] and a `warn!` event rather than as errors.
#[instrument(skip_all, name = "levenberg_marquardt")]
pub fn minimise<T: Objective + ?Sized>(
    target: &mut T,
    x0: &[f64],
    config: &OptimizationConfig,
) -> Result<FitResult, EngineError> {
    if x0.len() != target.n_params() {
        return Err(EngineError::Internal(format!(
            "starting point has {} entries for {} parameters",
            x0.len(),
            target.n_params()
        )));
    }
    let name = target.name();
    let problem = Problem::new(&mut *target, x0)?;

    let solver = LevenbergMarquardt::new()
        .with_ftol(config.ftol)
        .with_xtol(config.xtol)
        .with_gtol(config.gtol)
        .with_patience(config.patience);
    let (problem, report) = solver.minimize(problem);

    let params: Vec<f64> = problem.params.iter().copied().collect();
    let function_count = problem.function_count.get();
    let jacobian_count = problem.jacobian_count.get();
    let failed_points = problem.failed_points.get();
    drop(problem);

    debug!(
        target = name,
        evaluations = report.number_of_evaluations,
        failed_points,
        termination = ?report.termination,
        "Levenberg-Marquardt finished"
    );

    // Leaves the target's back-calculated values at the returned point.
    let chi2 = target.evaluate(&params)?;

    let mut warnings = Vec::new();
    if !report.termination.was_successful() {
        warnings.push(format!("optimiser did not converge: {:?}", report.termination));
    }
    let violated = target.constraints().violations(&params);
    if !violated.is_empty() {
        warnings.push(format!("constraint rows {violated:?} are violated"));
    }
    let warning = (!warnings.is_empty()).then(|| warnings.join("; "));
    if let Some(warning) = &warning {
        warn!(target = name, chi2, "{warning}");
    }

    Ok(FitResult {
        physical: target.unscale(&params),
        names: target.param_names(),
        params,
        chi2,
        iterations: jacobian_count,
        function_count,
        gradient_count: jacobian_count,
        hessian_count: 0,
        warning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::utils::bounds::LinearConstraints;
    use crate::engine::config::OptimizationConfigBuilder;
    use approx::assert_relative_eq;

    /// Fits `y = a exp(-b t)` with `b` scaled by 10.
    struct Decay {
        t: Vec<f64>,
        y: Vec<f64>,
        scaling: Vec<f64>,
        constraints: Option<LinearConstraints>,
    }

    impl Decay {
        fn new(a: f64, b: f64) -> Self {
            let t: Vec<f64> = (0..12).map(|i| i as f64 * 0.05).collect();
            let y = t.iter().map(|t| a * (-b * t).exp()).collect();
            Self {
                t,
                y,
                scaling: vec![1.0, 10.0],
                constraints: None,
            }
        }
    }

    impl Objective for Decay {
        fn name(&self) -> &'static str {
            "decay"
        }
        fn n_params(&self) -> usize {
            2
        }
        fn n_residuals(&self) -> usize {
            self.t.len()
        }
        fn param_names(&self) -> Vec<String> {
            vec!["a".into(), "b".into()]
        }
        fn scaling(&self) -> &[f64] {
            &self.scaling
        }
        fn evaluate(&mut self, params: &[f64]) -> Result<f64, EngineError> {
            let mut r = vec![0.0; self.t.len()];
            self.residuals(params, &mut r)?;
            Ok(r.iter().map(|r| r * r).sum())
        }
        fn residuals(&mut self, params: &[f64], out: &mut [f64]) -> Result<(), EngineError> {
            let (a, b) = (params[0], params[1] * 10.0);
            if b < 0.0 {
                return Err(EngineError::NonFinite { target: "decay" });
            }
            for ((o, t), y) in out.iter_mut().zip(&self.t).zip(&self.y) {
                *o = (y - a * (-b * t).exp()) / 0.01;
            }
            Ok(())
        }
        fn constraints(&self) -> LinearConstraints {
            self.constraints
                .clone()
                .unwrap_or_else(|| LinearConstraints::unconstrained(2))
        }
    }

    fn config() -> OptimizationConfig {
        OptimizationConfigBuilder::new().minimise(true).build().unwrap()
    }

    #[test]
    fn recovers_exact_parameters_from_a_nearby_start() {
        let mut decay = Decay::new(2.5, 7.0);
        let result = minimise(&mut decay, &[2.0, 0.5], &config()).unwrap();
        assert_relative_eq!(result.params[0], 2.5, max_relative = 1e-6);
        assert_relative_eq!(result.physical[1], 7.0, max_relative = 1e-6);
        assert!(result.chi2 < 1e-12);
        assert!(result.warning.is_none());
        assert!(result.function_count > 1);
        assert!(result.gradient_count >= 1);
        assert_eq!(result.physical_value("b"), Some(result.physical[1]));
    }

    #[test]
    fn an_invalid_start_is_an_error() {
        let mut decay = Decay::new(2.5, 7.0);
        assert!(matches!(
            minimise(&mut decay, &[2.0, -0.1], &config()).unwrap_err(),
            EngineError::NonFinite { target: "decay" }
        ));
        assert!(minimise(&mut decay, &[2.0], &config()).is_err());
    }

    #[test]
    fn constraint_violations_become_a_warning() {
        let mut decay = Decay::new(2.5, 7.0);
        // a <= 2
        decay.constraints = Some(LinearConstraints::from_rows(2, &[(vec![(0, -1.0)], -2.0)]));
        let result = minimise(&mut decay, &[2.0, 0.5], &config()).unwrap();
        assert_relative_eq!(result.params[0], 2.5, max_relative = 1e-6);
        assert!(result.warning.as_deref().unwrap_or("").contains("[0]"));
    }
}
