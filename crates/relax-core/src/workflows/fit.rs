use crate::engine::config::OptimizationConfig;
use crate::engine::error::EngineError;
use crate::engine::optimizer::{FitResult, grid, levmar};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::target::Objective;
use tracing::{info, instrument, warn};

/// Fits a target: an optional grid search followed by optional Levenberg-Marquardt refinement.
///
/// `start` is the starting point of the minimisation when no grid is configured. The returned
/// result counts the function evaluations of both phases.
#[instrument(skip_all, name = "fit_workflow")]
pub fn run<T: Objective + ?Sized>(
    target: &mut T,
    start: &[f64],
    config: &OptimizationConfig,
    reporter: &ProgressReporter,
) -> Result<FitResult, EngineError> {
    info!(
        target = target.name(),
        params = target.n_params(),
        residuals = target.n_residuals(),
        "Starting fit."
    );

    // === Phase 1: Grid search ===
    let grid_result = match &config.grid {
        Some(axes) => {
            let constraints = config.constrain_grid.then(|| target.constraints());
            Some(grid::grid_search(target, axes, constraints.as_ref(), reporter)?)
        }
        None => None,
    };

    if !config.minimise {
        return grid_result.ok_or_else(|| {
            EngineError::Internal("fit requested without grid search or minimisation".to_string())
        });
    }

    // === Phase 2: Minimisation ===
    reporter.report(Progress::MinimiseStart);
    let x0 = grid_result.as_ref().map_or(start, |g| g.params.as_slice());
    let mut result = levmar::minimise(target, x0, config)?;
    reporter.report(Progress::MinimiseFinish {
        chi2: result.chi2,
        iterations: result.iterations,
    });

    if let Some(grid_result) = &grid_result {
        result.function_count += grid_result.function_count;
        if result.chi2 > grid_result.chi2 {
            warn!(
                grid = grid_result.chi2,
                minimised = result.chi2,
                "Minimisation ended above the grid-search minimum."
            );
        }
    }
    info!(chi2 = result.chi2, "Fit complete.");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispersion::DispersionModel;
    use crate::core::dispersion::lm63::r2eff_lm63;
    use crate::core::dispersion::ppm_to_rad;
    use crate::core::io::table::CurvePoint;
    use crate::core::observables::GAMMA_15N;
    use crate::engine::config::{DispersionConfig, OptimizationConfigBuilder};
    use crate::engine::target::dispersion::Dispersion;
    use approx::assert_relative_eq;

    fn lm63_target() -> Dispersion {
        let nu = [40.0, 80.0, 160.0, 320.0, 640.0, 1280.0];
        let fields = [600e6, 800e6];
        let curves = fields
            .iter()
            .zip([10.0, 12.0])
            .map(|(&frq, r20)| {
                let rad = ppm_to_rad(frq, GAMMA_15N);
                let mut out = [0.0; 6];
                r2eff_lm63(r20, 0.5 * rad * rad, 1500.0, &nu, &mut out);
                nu.iter()
                    .zip(out)
                    .map(|(&dispersion, value)| CurvePoint {
                        dispersion,
                        theta: None,
                        value,
                        error: 0.2,
                    })
                    .collect()
            })
            .collect();
        Dispersion::new(&DispersionConfig {
            model: DispersionModel::Lm63,
            gamma_x: GAMMA_15N,
            fields: fields.to_vec(),
            curves: vec![curves],
            r1: None,
        })
        .unwrap()
    }

    #[test]
    fn grid_then_minimise_recovers_exact_data() {
        let mut target = lm63_target();
        let config = OptimizationConfigBuilder::new()
            .grid(target.default_grid(5))
            .build()
            .unwrap();
        let result = run(&mut target, &[], &config, &ProgressReporter::new()).unwrap();

        assert!(result.chi2 < 1e-6, "chi2 = {}", result.chi2);
        assert_relative_eq!(result.physical[0], 10.0, max_relative = 1e-3);
        assert_relative_eq!(result.physical[1], 12.0, max_relative = 1e-3);
        assert_relative_eq!(result.physical[2], 0.5, max_relative = 1e-3);
        assert_relative_eq!(result.physical[3], 1500.0, max_relative = 1e-3);
        assert!(result.function_count > 625);
    }

    #[test]
    fn grid_only_fit_returns_the_grid_minimum() {
        let mut target = lm63_target();
        let config = OptimizationConfigBuilder::new()
            .grid(target.default_grid(3))
            .minimise(false)
            .build()
            .unwrap();
        let result = run(&mut target, &[], &config, &ProgressReporter::new()).unwrap();
        assert_eq!(result.function_count, 81);
        assert_eq!(result.gradient_count, 0);
        assert_eq!(result.names[3], "kex");
    }

    #[test]
    fn minimise_only_starts_from_the_given_point() {
        let mut target = lm63_target();
        let config = OptimizationConfigBuilder::new().build().unwrap();
        let result =
            run(&mut target, &[1.1, 1.1, 0.4, 0.2], &config, &ProgressReporter::new()).unwrap();
        assert!(result.chi2 < 1e-6);
        assert_relative_eq!(result.physical[3], 1500.0, max_relative = 1e-2);
        assert!(result.warning.is_none());
    }

    #[test]
    fn events_follow_the_grid_then_the_minimisation() {
        let mut target = lm63_target();
        let config = OptimizationConfigBuilder::new()
            .grid(target.default_grid(2))
            .build()
            .unwrap();
        let events = std::sync::Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            events.lock().unwrap().push(event);
        }));
        let result = run(&mut target, &[], &config, &reporter).unwrap();
        drop(reporter);

        let events = events.into_inner().unwrap();
        assert_eq!(events.first(), Some(&Progress::GridStart { points: 16 }));
        let grid_end = events
            .iter()
            .position(|e| *e == Progress::GridFinish)
            .unwrap();
        assert_eq!(events[grid_end + 1], Progress::MinimiseStart);
        assert_eq!(
            events.last(),
            Some(&Progress::MinimiseFinish {
                chi2: result.chi2,
                iterations: result.iterations,
            })
        );
    }
}
