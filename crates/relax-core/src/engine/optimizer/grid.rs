use super::FitResult;
use crate::core::utils::bounds::{GridAxis, LinearConstraints, grid_size};
use crate::engine::config::ConfigError;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::target::Objective;
use tracing::{debug, info, instrument};

/// Evaluates the target at every grid point and returns the lowest chi-squared.
///
/// Points violating `constraints` are never evaluated. Points where the target fails (a
/// parameter outside its domain, a non-finite chi-squared) are skipped; the search only fails
/// when no point could be evaluated. Ties keep the first point in odometer order, with the last
/// axis varying fastest.
#[instrument(skip_all, name = "grid_search")]
pub fn grid_search<T: Objective + ?Sized>(
    target: &mut T,
    axes: &[GridAxis],
    constraints: Option<&LinearConstraints>,
    reporter: &ProgressReporter,
) -> Result<FitResult, EngineError> {
    let n = target.n_params();
    if axes.len() != n {
        return Err(ConfigError::Invalid {
            parameter: "grid",
            reason: format!("{} axes given for {n} parameters", axes.len()),
        }
        .into());
    }
    let total = match grid_size(axes) {
        Some(0) => {
            return Err(ConfigError::Invalid {
                parameter: "grid",
                reason: "every axis needs at least one increment".to_string(),
            }
            .into());
        }
        Some(total) => total,
        None => {
            return Err(ConfigError::Invalid {
                parameter: "grid",
                reason: "the number of grid points overflows".to_string(),
            }
            .into());
        }
    };
    info!(target = target.name(), points = total, "Starting grid search.");

    let values: Vec<Vec<f64>> = axes.iter().map(GridAxis::values).collect();
    let mut index = vec![0usize; n];
    let mut point: Vec<f64> = values.iter().map(|v| v[0]).collect();
    let mut best: Option<(Vec<f64>, f64)> = None;
    let mut evaluated = 0;
    let mut rejected = 0;
    let mut failed = 0;

    reporter.report(Progress::GridStart {
        points: total as u64,
    });
    for _ in 0..total {
        let allowed = constraints.is_none_or(|c| c.is_satisfied(&point));
        if !allowed {
            rejected += 1;
        } else {
            match target.evaluate(&point) {
                Ok(chi2) => {
                    evaluated += 1;
                    if best.as_ref().is_none_or(|(_, b)| chi2 < *b) {
                        reporter.report(Progress::Improved { chi2 });
                        best = Some((point.clone(), chi2));
                    }
                }
                Err(_) => failed += 1,
            }
        }
        reporter.report(Progress::GridPoint);
        advance(&mut index, &mut point, &values);
    }
    reporter.report(Progress::GridFinish);

    debug!(evaluated, rejected, failed, "Grid search finished.");
    let (params, chi2) = best.ok_or_else(|| EngineError::PhaseFailed {
        phase: "grid search",
        reason: format!("none of the {total} grid points could be evaluated"),
    })?;
    info!(chi2, "Grid search minimum found.");

    Ok(FitResult {
        physical: target.unscale(&params),
        names: target.param_names(),
        params,
        chi2,
        iterations: 0,
        function_count: evaluated,
        gradient_count: 0,
        hessian_count: 0,
        warning: None,
    })
}

/// Steps the odometer, last axis fastest.
fn advance(index: &mut [usize], point: &mut [f64], values: &[Vec<f64>]) {
    for k in (0..index.len()).rev() {
        index[k] += 1;
        if index[k] < values[k].len() {
            point[k] = values[k][index[k]];
            return;
        }
        index[k] = 0;
        point[k] = values[k][0];
    }
}
