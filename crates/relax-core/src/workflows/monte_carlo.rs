use crate::engine::config::{MonteCarloConfig, OptimizationConfig};
use crate::engine::error::EngineError;
use crate::engine::optimizer::{FitResult, levmar};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::target::Resample;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use tracing::{debug, info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Parameter uncertainties from Monte Carlo simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct MonteCarloResult {
    pub names: Vec<String>,
    /// Sample standard deviation of every parameter in physical units.
    pub errors: Vec<f64>,
    /// The fitted parameters of each successful replicate in physical units.
    pub simulations: Vec<Vec<f64>>,
    /// Replicates whose refit failed and were left out of the statistics.
    pub failed: usize,
}

impl MonteCarloResult {
    pub fn error_of(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.errors[i])
    }
}

/// Estimates parameter errors by refitting synthetic data sets.
///
/// Each replicate takes the values back-calculated at `best`, adds Gaussian noise with the
/// measured errors and minimises from `best` again. Replicate `i` draws from a `StdRng` seeded
/// with `seed + i`, so the result does not depend on the number of threads. Every replicate works
/// on its own clone of `target`.
#[instrument(skip_all, name = "monte_carlo_workflow")]
pub fn run<T>(
    target: &T,
    best: &FitResult,
    optimization: &OptimizationConfig,
    config: &MonteCarloConfig,
    reporter: &ProgressReporter,
) -> Result<MonteCarloResult, EngineError>
where
    T: Resample + Clone + Send + Sync,
{
    config.validate()?;
    info!(
        target = target.name(),
        simulations = config.simulations,
        seed = config.seed,
        "Starting Monte Carlo simulations."
    );

    // === Phase 1: Back-calculation at the best fit ===
    let (back_calc, errors) = back_calculate(target, &best.params)?;
    let noise = errors
        .iter()
        .map(|&e| {
            Normal::new(0.0, e).map_err(|err| {
                EngineError::Internal(format!("invalid measurement error {e}: {err}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    debug!(points = back_calc.len(), "Back-calculated the best fit.");

    // === Phase 2: Replicate fits ===
    reporter.report(Progress::SimulationsStart {
        total: config.simulations as u64,
    });

    let replicate = |i: usize| -> Result<Vec<f64>, EngineError> {
        let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(i as u64));
        let synthetic: Vec<f64> = back_calc
            .iter()
            .zip(&noise)
            .map(|(value, normal)| value + normal.sample(&mut rng))
            .collect();
        let mut sim = target.clone();
        sim.set_measured_values(&synthetic)?;
        let result = levmar::minimise(&mut sim, &best.params, optimization);
        reporter.report(Progress::SimulationDone {
            index: i,
            converged: result.is_ok(),
        });
        Ok(result?.physical)
    };

    #[cfg(not(feature = "parallel"))]
    let iterator = 0..config.simulations;

    #[cfg(feature = "parallel")]
    let iterator = (0..config.simulations).into_par_iter();

    let outcomes: Vec<Result<Vec<f64>, EngineError>> = iterator.map(replicate).collect();

    // === Phase 3: Statistics ===
    let mut simulations = Vec::with_capacity(outcomes.len());
    let mut failed = 0;
    for (i, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(params) => simulations.push(params),
            Err(e) => {
                debug!(replicate = i, error = %e, "Monte Carlo replicate failed.");
                failed += 1;
            }
        }
    }
    reporter.report(Progress::SimulationsFinish { failed });
    if failed > 0 {
        warn!(failed, "Some Monte Carlo replicates could not be refitted.");
    }
    if simulations.len() < 2 {
        return Err(EngineError::PhaseFailed {
            phase: "Monte Carlo",
            reason: format!(
                "only {} of {} replicates succeeded",
                simulations.len(),
                config.simulations
            ),
        });
    }

    let errors = sample_std_dev(&simulations, best.params.len());
    info!(succeeded = simulations.len(), failed, "Monte Carlo simulations complete.");

    Ok(MonteCarloResult {
        names: best.names.clone(),
        errors,
        simulations,
        failed,
    })
}

/// The back-calculated value and the error of every measurement at `params`.
///
/// Residuals are `(value - back) / error`, so `back = value - residual * error`.
fn back_calculate<T: Resample + Clone>(
    target: &T,
    params: &[f64],
) -> Result<(Vec<f64>, Vec<f64>), EngineError> {
    let mut target = target.clone();
    let mut residuals = vec![0.0; target.n_residuals()];
    target.residuals(params, &mut residuals)?;
    let (back, errors) = target
        .measurements()
        .into_iter()
        .zip(&residuals)
        .map(|((value, error), r)| (value - r * error, error))
        .unzip();
    Ok((back, errors))
}

fn sample_std_dev(samples: &[Vec<f64>], n: usize) -> Vec<f64> {
    let count = samples.len() as f64;
    (0..n)
        .map(|k| {
            let mean = samples.iter().map(|s| s[k]).sum::<f64>() / count;
            let ss: f64 = samples.iter().map(|s| (s[k] - mean).powi(2)).sum();
            (ss / (count - 1.0)).sqrt()
        })
        .collect()
}
