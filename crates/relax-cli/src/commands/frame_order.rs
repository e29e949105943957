use super::fit_and_analyse;
use crate::cli::FrameOrderArgs;
use crate::config::{PartialRunConfig, RunConfig};
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use crate::utils::report;
use relaxrs::core::io::dataset::{FrameOrderDataset, FrameOrderInput};
use relaxrs::engine::cache::SobolCache;
use relaxrs::engine::config::{FrameOrderConfigBuilder, SobolConfig};
use relaxrs::engine::optimizer::FitResult;
use relaxrs::engine::progress::ProgressReporter;
use relaxrs::engine::target::Objective;
use relaxrs::engine::target::frame_order::FrameOrder;
use relaxrs::workflows::monte_carlo::MonteCarloResult;
use tracing::info;

pub fn run(args: FrameOrderArgs) -> Result<()> {
    let partial_config = PartialRunConfig::from_args(&args.run)?;
    info!("Merging configuration from file and CLI arguments...");
    let mut run_config = partial_config.merge_with_cli(&args.run)?;
    if let Some(method) = &args.integration {
        run_config.integration = Some(method.parse().map_err(CliError::Config)?);
    }
    if let Some(points) = args.sobol_points {
        run_config.sobol_max_points = Some(points);
    }

    info!("Loading dataset from {:?}", &args.run.dataset);
    let mut input = FrameOrderDataset::load(&args.run.dataset)?;
    if let Some(model) = &args.model {
        input.dataset.model = model.clone();
    }

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.callback());

    println!("Fitting the '{}' frame-order model...", input.dataset.model);
    let (fit, errors) = fit_frame_order(&input, &run_config, &reporter)?;
    println!(
        "{}",
        report::format_fit(&input.dataset.model, &fit, errors.as_ref())
    );
    Ok(())
}

fn fit_frame_order(
    input: &FrameOrderInput,
    run_config: &RunConfig,
    reporter: &ProgressReporter,
) -> Result<(FitResult, Option<MonteCarloResult>)> {
    let mut sobol = SobolConfig::default();
    if let Some(points) = run_config.sobol_max_points {
        sobol.max_points = points;
    }
    if let Some(oversample) = run_config.sobol_oversample {
        sobol.oversample = oversample;
    }
    let mut builder = FrameOrderConfigBuilder::from_input(input)?.sobol(sobol);
    if let Some(method) = run_config.integration {
        builder = builder.integration(method);
    }
    let config = builder.build()?;

    let cache = SobolCache::new();
    let mut target = FrameOrder::new(&config, &cache)?;
    info!(
        model = target.model().name(),
        params = target.n_params(),
        data = target.n_residuals(),
        sobol_points = target.sobol_points(),
        "Frame-order target constructed."
    );

    let names = target.param_names();
    let scaling = target.scaling().to_vec();
    run_config.check_parameter_names(&names)?;
    let bounds = |_: usize, name: &str| FrameOrder::angular_bounds(name);
    let start = run_config.start_point(&names, &scaling, bounds);
    let optimization = run_config.optimization(run_config.grid_axes(&names, &scaling, bounds))?;

    fit_and_analyse(
        &mut target,
        &start,
        &optimization,
        run_config.monte_carlo.as_ref(),
        reporter,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    const DATASET: &str = r#"
        model = "rigid"
        pivot = [0.0, 0.0, 0.0]
        centre_of_mass = [1.0, 1.0, 1.0]
        rdc = "rdc.csv"

        [[alignments]]
        id = "tb"
        tensor = [1.2e-4, -0.4e-4, 0.3e-4, -0.7e-4, 0.15e-4]
        temperature = 298.0
        frequency = 600e6

        [[spins]]
        id = "N1"
        vector = [0.0, 0.0, 1.0]

        [[spins]]
        id = "N2"
        vector = [1.0, 0.0, 0.0]

        [[spins]]
        id = "N3"
        vector = [0.0, 1.0, 1.0]
    "#;

    fn write_dataset(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("problem.toml");
        fs::write(&path, DATASET).unwrap();
        fs::write(
            dir.join("rdc.csv"),
            "alignment,spin,value,error\ntb,N1,-5.0,1.0\ntb,N2,3.0,1.0\ntb,N3,,\n",
        )
        .unwrap();
        path
    }

    fn args(dataset: &Path, extra: &[&str]) -> FrameOrderArgs {
        let mut argv = vec!["relax", "frame-order", "-d", dataset.to_str().unwrap()];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::FrameOrder(args) => args,
            Commands::Dispersion(_) => panic!("Expected 'frame-order' subcommand"),
        }
    }

    #[test]
    fn grid_search_over_the_rigid_model_holds_translations_fixed() {
        let dir = tempdir().unwrap();
        let dataset = write_dataset(dir.path());
        let args = args(&dataset, &["--grid-inc", "3", "--no-minimise"]);
        let run_config = PartialRunConfig::from_args(&args.run)
            .unwrap()
            .merge_with_cli(&args.run)
            .unwrap();
        let input = FrameOrderDataset::load(&dataset).unwrap();

        let (fit, errors) =
            fit_frame_order(&input, &run_config, &ProgressReporter::new()).unwrap();
        assert!(errors.is_none());
        assert!(fit.chi2.is_finite());
        assert_eq!(fit.function_count, 27);
        assert_eq!(fit.physical_value("ave_pos_x"), Some(0.0));
    }

    #[test]
    fn unknown_parameter_names_are_rejected() {
        let dir = tempdir().unwrap();
        let dataset = write_dataset(dir.path());
        let args = args(&dataset, &["-S", "parameters.cone_theta=0.5"]);
        let run_config = PartialRunConfig::from_args(&args.run)
            .unwrap()
            .merge_with_cli(&args.run)
            .unwrap();
        let input = FrameOrderDataset::load(&dataset).unwrap();
        assert!(matches!(
            fit_frame_order(&input, &run_config, &ProgressReporter::new()),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn run_reports_missing_datasets() {
        let dir = tempdir().unwrap();
        let args = args(&dir.path().join("missing.toml"), &[]);
        assert!(matches!(run(args), Err(CliError::Core(_))));
    }
}
