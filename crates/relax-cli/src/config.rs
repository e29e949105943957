use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use relaxrs::core::integration::IntegrationMethod;
use relaxrs::core::modsel::Criterion;
use relaxrs::core::utils::bounds::GridAxis;
use relaxrs::engine::config::{MonteCarloConfig, OptimizationConfig, OptimizationConfigBuilder};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

const DEFAULT_GRID_INCREMENTS: usize = 5;

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialOptimizationConfig {
    #[serde(rename = "grid-increments")]
    grid_increments: Option<usize>,
    #[serde(rename = "constrain-grid")]
    constrain_grid: Option<bool>,
    minimise: Option<bool>,
    ftol: Option<f64>,
    xtol: Option<f64>,
    gtol: Option<f64>,
    patience: Option<usize>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialMonteCarloConfig {
    simulations: Option<usize>,
    seed: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialIntegrationConfig {
    method: Option<String>,
    #[serde(rename = "max-points")]
    max_points: Option<usize>,
    oversample: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialModelSelectionConfig {
    models: Option<Vec<String>>,
    criterion: Option<String>,
}

/// A run configuration as read from disk, every field optional.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialRunConfig {
    optimization: Option<PartialOptimizationConfig>,
    #[serde(rename = "monte-carlo")]
    monte_carlo: Option<PartialMonteCarloConfig>,
    integration: Option<PartialIntegrationConfig>,
    #[serde(rename = "model-selection")]
    model_selection: Option<PartialModelSelectionConfig>,
    /// Starting values in physical units, by parameter name.
    #[serde(default)]
    parameters: BTreeMap<String, f64>,
    /// Grid bounds in physical units, by parameter name.
    #[serde(default, rename = "grid-bounds")]
    grid_bounds: BTreeMap<String, [f64; 2]>,
}

/// The merged run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// No grid search when `None`.
    pub grid_increments: Option<usize>,
    pub constrain_grid: bool,
    pub minimise: bool,
    pub ftol: Option<f64>,
    pub xtol: Option<f64>,
    pub gtol: Option<f64>,
    pub patience: Option<usize>,
    /// No error analysis when `None`.
    pub monte_carlo: Option<MonteCarloConfig>,
    pub parameters: BTreeMap<String, f64>,
    pub grid_bounds: BTreeMap<String, (f64, f64)>,
    pub integration: Option<IntegrationMethod>,
    pub sobol_max_points: Option<usize>,
    pub sobol_oversample: Option<f64>,
    pub models: Vec<String>,
    pub criterion: Criterion,
}

impl PartialRunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading run configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Loads the file named by `--config`, or starts empty.
    pub fn from_args(args: &RunArgs) -> Result<Self> {
        match &args.config {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn merge_with_cli(mut self, args: &RunArgs) -> Result<RunConfig> {
        self.apply_set_values(&args.set_values)?;

        let opt = self.optimization.take().unwrap_or_default();
        let mc = self.monte_carlo.take().unwrap_or_default();
        let integration = self.integration.take().unwrap_or_default();
        let selection = self.model_selection.take().unwrap_or_default();

        let grid_increments = if args.no_grid {
            None
        } else {
            Some(
                args.grid_inc
                    .or(opt.grid_increments)
                    .unwrap_or(DEFAULT_GRID_INCREMENTS),
            )
        };
        let minimise = !args.no_minimise && opt.minimise.unwrap_or(true);
        if grid_increments.is_none() && !minimise {
            return Err(CliError::Config(
                "Nothing to do: both the grid search and the minimisation are disabled."
                    .to_string(),
            ));
        }

        let simulations = args.mc_sims.or(mc.simulations).unwrap_or(0);
        let monte_carlo = (simulations > 0).then(|| MonteCarloConfig {
            simulations,
            seed: args.seed.or(mc.seed).unwrap_or(0),
        });

        let integration_method = integration
            .method
            .as_deref()
            .map(|m| m.parse::<IntegrationMethod>().map_err(CliError::Config))
            .transpose()?;
        let criterion = selection
            .criterion
            .as_deref()
            .map(|c| c.parse::<Criterion>().map_err(CliError::Config))
            .transpose()?
            .unwrap_or_default();

        let mut grid_bounds = BTreeMap::new();
        for (name, [lower, upper]) in self.grid_bounds {
            if !(lower <= upper) {
                return Err(CliError::Config(format!(
                    "Grid bounds for '{}' must satisfy lower <= upper, got [{}, {}].",
                    name, lower, upper
                )));
            }
            grid_bounds.insert(name, (lower, upper));
        }

        Ok(RunConfig {
            grid_increments,
            constrain_grid: opt.constrain_grid.unwrap_or(true),
            minimise,
            ftol: opt.ftol,
            xtol: opt.xtol,
            gtol: opt.gtol,
            patience: opt.patience,
            monte_carlo,
            parameters: self.parameters,
            grid_bounds,
            integration: integration_method,
            sobol_max_points: integration.max_points,
            sobol_oversample: integration.oversample,
            models: selection.models.unwrap_or_default(),
            criterion,
        })
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value_str)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };
            let key = key.trim();
            let value_str = value_str.trim();

            match key {
                "optimization.grid-increments" => {
                    self.optimization.get_or_insert_with(Default::default).grid_increments =
                        Some(parse_value(key, value_str)?);
                }
                "optimization.constrain-grid" => {
                    self.optimization.get_or_insert_with(Default::default).constrain_grid =
                        Some(parse_value(key, value_str)?);
                }
                "optimization.minimise" => {
                    self.optimization.get_or_insert_with(Default::default).minimise =
                        Some(parse_value(key, value_str)?);
                }
                "optimization.ftol" => {
                    self.optimization.get_or_insert_with(Default::default).ftol =
                        Some(parse_value(key, value_str)?);
                }
                "optimization.xtol" => {
                    self.optimization.get_or_insert_with(Default::default).xtol =
                        Some(parse_value(key, value_str)?);
                }
                "optimization.gtol" => {
                    self.optimization.get_or_insert_with(Default::default).gtol =
                        Some(parse_value(key, value_str)?);
                }
                "optimization.patience" => {
                    self.optimization.get_or_insert_with(Default::default).patience =
                        Some(parse_value(key, value_str)?);
                }
                "monte-carlo.simulations" => {
                    self.monte_carlo
                        .get_or_insert_with(Default::default)
                        .simulations = Some(parse_value(key, value_str)?);
                }
                "monte-carlo.seed" => {
                    self.monte_carlo.get_or_insert_with(Default::default).seed =
                        Some(parse_value(key, value_str)?);
                }
                "integration.method" => {
                    self.integration.get_or_insert_with(Default::default).method =
                        Some(value_str.to_string());
                }
                "integration.max-points" => {
                    self.integration
                        .get_or_insert_with(Default::default)
                        .max_points = Some(parse_value(key, value_str)?);
                }
                "integration.oversample" => {
                    self.integration
                        .get_or_insert_with(Default::default)
                        .oversample = Some(parse_value(key, value_str)?);
                }
                "model-selection.criterion" => {
                    self.model_selection
                        .get_or_insert_with(Default::default)
                        .criterion = Some(value_str.to_string());
                }
                _ => match key.strip_prefix("parameters.") {
                    Some(name) if !name.is_empty() => {
                        self.parameters
                            .insert(name.to_string(), parse_value(key, value_str)?);
                    }
                    _ => {
                        return Err(CliError::Config(format!(
                            "Unsupported configuration key for --set: '{}'",
                            key
                        )));
                    }
                },
            }
        }
        Ok(())
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        CliError::Config(format!(
            "Invalid {} value for {}: {}",
            std::any::type_name::<T>(),
            key,
            value
        ))
    })
}

impl RunConfig {
    /// Rejects starting values and grid bounds naming parameters the model does not have.
    pub fn check_parameter_names(&self, names: &[String]) -> Result<()> {
        let unknown = self
            .parameters
            .keys()
            .chain(self.grid_bounds.keys())
            .find(|name| !names.contains(name));
        match unknown {
            Some(name) => Err(CliError::Config(format!(
                "Unknown parameter '{}'. The model has: {}.",
                name,
                names.join(", ")
            ))),
            None => Ok(()),
        }
    }

    /// The bounds of a parameter in physical units: the configured ones, else `default`.
    fn bounds(
        &self,
        i: usize,
        name: &str,
        default: &impl Fn(usize, &str) -> Option<(f64, f64)>,
    ) -> Option<(f64, f64)> {
        self.grid_bounds
            .get(name)
            .copied()
            .or_else(|| default(i, name))
    }

    /// The scaled starting point of the minimisation.
    ///
    /// Each parameter takes its configured value, else the middle of its bounds, else zero.
    pub fn start_point(
        &self,
        names: &[String],
        scaling: &[f64],
        default_bounds: impl Fn(usize, &str) -> Option<(f64, f64)>,
    ) -> Vec<f64> {
        names
            .iter()
            .zip(scaling)
            .enumerate()
            .map(|(i, (name, s))| {
                let value = self.parameters.get(name).copied().unwrap_or_else(|| {
                    self.bounds(i, name, &default_bounds)
                        .map_or(0.0, |(lower, upper)| 0.5 * (lower + upper))
                });
                value / s
            })
            .collect()
    }

    /// The scaled grid, or `None` when the grid search is disabled.
    ///
    /// Parameters without bounds are held at their starting value.
    pub fn grid_axes(
        &self,
        names: &[String],
        scaling: &[f64],
        default_bounds: impl Fn(usize, &str) -> Option<(f64, f64)>,
    ) -> Option<Vec<GridAxis>> {
        let inc = self.grid_increments?;
        let start = self.start_point(names, scaling, &default_bounds);
        let axes = names
            .iter()
            .zip(scaling)
            .enumerate()
            .map(
                |(i, (name, s))| match self.bounds(i, name, &default_bounds) {
                    Some((lower, upper)) => GridAxis::new(inc, lower / s, upper / s),
                    None => GridAxis::new(1, start[i], start[i]),
                },
            )
            .collect();
        Some(axes)
    }

    pub fn optimization(&self, grid: Option<Vec<GridAxis>>) -> Result<OptimizationConfig> {
        let mut builder = OptimizationConfigBuilder::new()
            .constrain_grid(self.constrain_grid)
            .minimise(self.minimise);
        if let Some(grid) = grid {
            builder = builder.grid(grid);
        }
        if let Some(tol) = self.ftol {
            builder = builder.ftol(tol);
        }
        if let Some(tol) = self.xtol {
            builder = builder.xtol(tol);
        }
        if let Some(tol) = self.gtol {
            builder = builder.gtol(tol);
        }
        if let Some(patience) = self.patience {
            builder = builder.patience(patience);
        }
        Ok(builder.build()?)
    }
}
