pub mod dispersion;
pub mod frame_order;

use crate::error::Result;
use relaxrs::engine::config::{MonteCarloConfig, OptimizationConfig};
use relaxrs::engine::optimizer::FitResult;
use relaxrs::engine::progress::ProgressReporter;
use relaxrs::engine::target::Resample;
use relaxrs::workflows::{self, monte_carlo::MonteCarloResult};
use tracing::info;

/// Fits the target and, when configured, estimates the parameter errors.
///
/// Monte Carlo replicates always refine with Levenberg-Marquardt from the best fit, even when the
/// fit itself stopped after the grid search.
pub fn fit_and_analyse<T>(
    target: &mut T,
    start: &[f64],
    optimization: &OptimizationConfig,
    monte_carlo: Option<&MonteCarloConfig>,
    reporter: &ProgressReporter,
) -> Result<(FitResult, Option<MonteCarloResult>)>
where
    T: Resample + Clone + Send + Sync,
{
    info!("Invoking the core fit workflow...");
    let fit = workflows::fit::run(target, start, optimization, reporter)?;

    let errors = match monte_carlo {
        Some(mc) => {
            info!(simulations = mc.simulations, "Invoking the Monte Carlo workflow...");
            let refine = OptimizationConfig {
                grid: None,
                minimise: true,
                ..optimization.clone()
            };
            Some(workflows::monte_carlo::run(
                target, &fit, &refine, mc, reporter,
            )?)
        }
        None => None,
    };
    Ok((fit, errors))
}
