use super::fit_and_analyse;
use crate::cli::DispersionArgs;
use crate::config::{PartialRunConfig, RunConfig};
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use crate::utils::report::{self, ModelSummary};
use relaxrs::core::io::dataset::{DispersionDataset, DispersionInput};
use relaxrs::core::modsel::{self, Candidate};
use relaxrs::engine::config::DispersionConfig;
use relaxrs::engine::optimizer::FitResult;
use relaxrs::engine::progress::ProgressReporter;
use relaxrs::engine::target::Objective;
use relaxrs::engine::target::dispersion::Dispersion;
use relaxrs::workflows::monte_carlo::MonteCarloResult;
use tracing::{info, warn};

/// The outcome of fitting one dispersion model.
struct ModelFit {
    model: String,
    fit: FitResult,
    errors: Option<MonteCarloResult>,
    num_data: usize,
}

pub fn run(args: DispersionArgs) -> Result<()> {
    let partial_config = PartialRunConfig::from_args(&args.run)?;
    info!("Merging configuration from file and CLI arguments...");
    let mut run_config = partial_config.merge_with_cli(&args.run)?;
    if !args.models.is_empty() {
        run_config.models = args.models.clone();
    }
    if let Some(criterion) = &args.criterion {
        run_config.criterion = criterion.parse().map_err(CliError::Config)?;
    }

    info!("Loading dataset from {:?}", &args.run.dataset);
    let input = DispersionDataset::load(&args.run.dataset)?;
    let models = if run_config.models.is_empty() {
        vec![input.dataset.model.clone()]
    } else {
        run_config.models.clone()
    };

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.callback());

    let mut fits = Vec::with_capacity(models.len());
    for model in &models {
        println!("Fitting the '{}' dispersion model...", model);
        let fitted = fit_model(&input, model, &run_config, models.len() == 1, &reporter)?;
        println!(
            "{}",
            report::format_fit(model, &fitted.fit, fitted.errors.as_ref())
        );
        fits.push(fitted);
    }

    if fits.len() > 1 {
        let selected = select_model(&run_config, &fits);
        let summaries: Vec<ModelSummary<'_>> = fits
            .iter()
            .map(|f| ModelSummary {
                name: &f.model,
                chi2: f.fit.chi2,
                k: f.fit.params.len(),
                n: f.num_data,
                criterion_value: run_config.criterion.value(
                    f.fit.chi2,
                    f.fit.params.len(),
                    f.num_data,
                ),
            })
            .collect();
        println!(
            "{}",
            report::format_selection(run_config.criterion, &summaries, selected)
        );
        match selected {
            Some(i) => info!(model = fits[i].model.as_str(), "Model selected."),
            None => warn!("No model could be selected."),
        }
    }
    Ok(())
}

fn fit_model(
    input: &DispersionInput,
    model: &str,
    run_config: &RunConfig,
    strict_names: bool,
    reporter: &ProgressReporter,
) -> Result<ModelFit> {
    let mut input = input.clone();
    input.dataset.model = model.to_string();
    let config = DispersionConfig::from_input(&input)?;
    let mut target = Dispersion::new(&config)?;

    let names = target.param_names();
    let scaling = target.scaling().to_vec();
    if strict_names {
        run_config.check_parameter_names(&names)?;
    }
    let defaults = target.default_grid(2);
    let bounds = |i: usize, _: &str| {
        let axis = &defaults[i];
        Some((axis.lower * scaling[i], axis.upper * scaling[i]))
    };
    let start = run_config.start_point(&names, &scaling, bounds);
    let optimization = run_config.optimization(run_config.grid_axes(&names, &scaling, bounds))?;

    let num_data = target.n_residuals();
    let (fit, errors) = fit_and_analyse(
        &mut target,
        &start,
        &optimization,
        run_config.monte_carlo.as_ref(),
        reporter,
    )?;
    Ok(ModelFit {
        model: model.to_string(),
        fit,
        errors,
        num_data,
    })
}

fn select_model(run_config: &RunConfig, fits: &[ModelFit]) -> Option<usize> {
    let candidates: Vec<Candidate<'_>> = fits
        .iter()
        .map(|f| Candidate {
            name: &f.model,
            chi2: f.fit.chi2,
            k: f.fit.params.len(),
            n: f.num_data,
        })
        .collect();
    modsel::select(run_config.criterion, &candidates).map(|(i, _)| i)
}
