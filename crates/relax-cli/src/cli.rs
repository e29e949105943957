use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "relax CLI - fit frame-order and relaxation dispersion models to NMR data.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for Monte Carlo simulations.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fit a frame-order motional model to RDC and PCS data.
    FrameOrder(FrameOrderArgs),
    /// Fit relaxation dispersion models to CPMG or R1rho curves.
    Dispersion(DispersionArgs),
}

/// Arguments for the `frame-order` subcommand.
#[derive(Args, Debug)]
pub struct FrameOrderArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Override the model named in the dataset (e.g., 'iso_cone').
    #[arg(short, long, value_name = "NAME")]
    pub model: Option<String>,

    /// Override the PCS integration method ('sobol' or 'quadrature').
    #[arg(long, value_name = "METHOD")]
    pub integration: Option<String>,

    /// Override the maximum number of Sobol' points used per evaluation.
    #[arg(long, value_name = "INT")]
    pub sobol_points: Option<usize>,
}

/// Arguments for the `dispersion` subcommand.
#[derive(Args, Debug)]
pub struct DispersionArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Fit these models instead of the one named in the dataset and select the best.
    /// Can be used multiple times. Example: --model no_rex --model lm63
    #[arg(short, long = "model", value_name = "NAME")]
    pub models: Vec<String>,

    /// Override the model-selection criterion ('aic', 'aicc' or 'bic').
    #[arg(long, value_name = "NAME")]
    pub criterion: Option<String>,
}

/// Arguments shared by every fitting subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    // --- Core Arguments ---
    /// Path to the dataset file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub dataset: PathBuf,

    /// Path to the run configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    // --- Optimization Overrides ---
    /// Override the number of grid increments per parameter.
    #[arg(short, long = "grid-inc", value_name = "INT")]
    pub grid_inc: Option<usize>,

    /// Skip the grid search, starting the minimisation from the configured parameter values.
    #[arg(long, conflicts_with = "grid_inc")]
    pub no_grid: bool,

    /// Stop after the grid search.
    #[arg(long)]
    pub no_minimise: bool,

    // --- Error Analysis Overrides ---
    /// Override the number of Monte Carlo simulations. Zero disables the error analysis.
    #[arg(short = 'n', long, value_name = "INT")]
    pub mc_sims: Option<usize>,

    /// Override the Monte Carlo random seed.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S optimization.patience=200
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}
