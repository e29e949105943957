use crate::core::alignment::AlignmentTensor;
use crate::core::dispersion::{DispersionError, DispersionModel};
use crate::core::frame_order::FrameOrderError;
use crate::core::frame_order::model::FrameOrderModel;
use crate::core::frame_order::sampling::SobolPoints;
use crate::core::integration::IntegrationMethod;
use crate::core::integration::quadrature::Tolerance;
use crate::core::io::dataset::{DispersionInput, FrameOrderInput};
use crate::core::io::table::{DispersionCurves, ObservationGrid};
use crate::core::observables::{GAMMA_1H, dipolar_constant, gyromagnetic_ratio};
use crate::core::sobol::DEFAULT_SKIP;
use crate::core::utils::bounds::GridAxis;
use nalgebra::{Vector3, Vector5};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for '{parameter}': {reason}")]
    Invalid {
        parameter: &'static str,
        reason: String,
    },
}

fn invalid(parameter: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        parameter,
        reason: reason.into(),
    }
}

/// The largest Sobol' point set a frame-order target may generate.
///
/// Every point keeps its angles and a precomputed rotation, about 100 bytes, so this bounds the
/// set at roughly half a gigabyte.
pub const MAX_SOBOL_POINTS: usize = 5_000_000;

/// The Sobol' sampling budget of the quasi-random PCS integrator.
///
/// `max_points * oversample * 10^m` points are generated for a model sampling `m` angles, and at
/// most `max_points` of those falling inside the motional domain are used per evaluation. The
/// default generates 200 000 points for the three-angle cone models. Narrow cones accept only a
/// small fraction of them and need a larger `oversample` to reach `max_points`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SobolConfig {
    pub max_points: usize,
    pub oversample: f64,
    pub skip: u64,
}

impl Default for SobolConfig {
    fn default() -> Self {
        Self {
            max_points: 200,
            oversample: 1.0,
            skip: DEFAULT_SKIP,
        }
    }
}

/// One alignment medium: its static tensor and the conditions it was measured under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentMedium {
    pub tensor: AlignmentTensor,
    /// Temperature in K.
    pub temperature: f64,
    /// Proton spectrometer frequency in Hz.
    pub frequency: f64,
}

/// RDC data indexed `[alignment][spin]` with the per-spin dipolar constants and unit bond
/// vectors, one vector per structure of the ensemble.
#[derive(Debug, Clone)]
pub struct RdcInput {
    pub vectors: Vec<Vec<Vector3<f64>>>,
    pub dipolar_constants: Vec<f64>,
    pub data: ObservationGrid,
}

/// PCS data indexed `[alignment][spin]` with the per-spin atomic positions in Angstrom, one
/// position per structure of the ensemble.
#[derive(Debug, Clone)]
pub struct PcsInput {
    pub positions: Vec<Vec<Vector3<f64>>>,
    pub data: ObservationGrid,
}

#[derive(Debug, Clone)]
pub struct FrameOrderConfig {
    pub model: FrameOrderModel,
    pub pivot: Option<Vector3<f64>>,
    pub pivot_opt: bool,
    pub paramag_centre: Vector3<f64>,
    pub centre_of_mass: Option<Vector3<f64>>,
    pub ave_pos_pivot: Vector3<f64>,
    pub alignments: Vec<AlignmentMedium>,
    pub rdc: Option<RdcInput>,
    pub pcs: Option<PcsInput>,
    /// Diagonal scaling of the parameter vector; the model default when `None`.
    pub scaling: Option<Vec<f64>>,
    pub integration: IntegrationMethod,
    pub sobol: SobolConfig,
    pub tolerance: Tolerance,
}

#[derive(Default)]
pub struct FrameOrderConfigBuilder {
    model: Option<FrameOrderModel>,
    pivot: Option<Vector3<f64>>,
    pivot_opt: bool,
    paramag_centre: Option<Vector3<f64>>,
    centre_of_mass: Option<Vector3<f64>>,
    ave_pos_pivot: Option<Vector3<f64>>,
    alignments: Vec<AlignmentMedium>,
    rdc: Option<RdcInput>,
    pcs: Option<PcsInput>,
    scaling: Option<Vec<f64>>,
    integration: IntegrationMethod,
    sobol: SobolConfig,
    tolerance: Tolerance,
}

impl FrameOrderConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a builder from a loaded dataset.
    ///
    /// Bond vectors are normalised and dipolar constants computed from each spin's isotope and
    /// bond length. A spin with data but without the geometry that data needs is an error.
    /// Spins given several coordinates are averaged over those structures.
    pub fn from_input(input: &FrameOrderInput) -> Result<Self, ConfigError> {
        let dataset = &input.dataset;
        let model: FrameOrderModel = dataset
            .model
            .parse()
            .map_err(|e: FrameOrderError| invalid("model", e.to_string()))?;

        let mut builder = Self::new()
            .model(model)
            .pivot_opt(dataset.pivot_opt)
            .paramag_centre(Vector3::from(dataset.paramag_centre));
        if let Some(pivot) = dataset.pivot {
            builder = builder.pivot(Vector3::from(pivot));
        }
        if let Some(com) = dataset.centre_of_mass {
            builder = builder.centre_of_mass(Vector3::from(com));
        }
        if let Some(ave) = dataset.ave_pos_pivot.or(dataset.centre_of_mass) {
            builder = builder.ave_pos_pivot(Vector3::from(ave));
        }
        for alignment in &dataset.alignments {
            builder = builder.alignment(AlignmentMedium {
                tensor: AlignmentTensor::new(
                    Vector5::from(alignment.tensor),
                    alignment.full_in_ref_frame,
                ),
                temperature: alignment.temperature,
                frequency: alignment.frequency,
            });
        }

        let measured = |grid: &ObservationGrid, spin: usize| {
            grid.values.iter().any(|row| !row[spin].is_nan())
        };

        if let Some(grid) = &input.rdc {
            let mut vectors = Vec::with_capacity(dataset.spins.len());
            let mut constants = Vec::with_capacity(dataset.spins.len());
            for (j, spin) in dataset.spins.iter().enumerate() {
                let gx = gyromagnetic_ratio(&spin.isotope).ok_or_else(|| {
                    invalid("isotope", format!("unknown isotope '{}' of spin '{}'", spin.isotope, spin.id))
                })?;
                let structures = match &spin.vector {
                    Some(v) => v
                        .structures()
                        .iter()
                        .map(|&v| {
                            Vector3::from(v).try_normalize(0.0).ok_or_else(|| {
                                invalid(
                                    "vector",
                                    format!("spin '{}' has a zero-length bond vector", spin.id),
                                )
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    None if measured(grid, j) => {
                        return Err(invalid(
                            "vector",
                            format!("spin '{}' has RDC data but no bond vector", spin.id),
                        ));
                    }
                    None => Vec::new(),
                };
                vectors.push(structures);
                constants.push(dipolar_constant(gx, GAMMA_1H, spin.bond_length * 1e-10));
            }
            builder = builder.rdc(RdcInput {
                vectors,
                dipolar_constants: constants,
                data: grid.clone(),
            });
        }

        if let Some(grid) = &input.pcs {
            let mut positions = Vec::with_capacity(dataset.spins.len());
            for (j, spin) in dataset.spins.iter().enumerate() {
                match &spin.position {
                    Some(p) => {
                        positions.push(p.structures().iter().map(|&p| Vector3::from(p)).collect())
                    }
                    None if measured(grid, j) => {
                        return Err(invalid(
                            "position",
                            format!("spin '{}' has PCS data but no position", spin.id),
                        ));
                    }
                    None => positions.push(Vec::new()),
                }
            }
            builder = builder.pcs(PcsInput {
                positions,
                data: grid.clone(),
            });
        }
        Ok(builder)
    }

    pub fn model(mut self, model: FrameOrderModel) -> Self {
        self.model = Some(model);
        self
    }
    pub fn pivot(mut self, pivot: Vector3<f64>) -> Self {
        self.pivot = Some(pivot);
        self
    }
    pub fn pivot_opt(mut self, pivot_opt: bool) -> Self {
        self.pivot_opt = pivot_opt;
        self
    }
    pub fn paramag_centre(mut self, centre: Vector3<f64>) -> Self {
        self.paramag_centre = Some(centre);
        self
    }
    pub fn centre_of_mass(mut self, com: Vector3<f64>) -> Self {
        self.centre_of_mass = Some(com);
        self
    }
    pub fn ave_pos_pivot(mut self, point: Vector3<f64>) -> Self {
        self.ave_pos_pivot = Some(point);
        self
    }
    pub fn alignment(mut self, alignment: AlignmentMedium) -> Self {
        self.alignments.push(alignment);
        self
    }
    pub fn rdc(mut self, rdc: RdcInput) -> Self {
        self.rdc = Some(rdc);
        self
    }
    pub fn pcs(mut self, pcs: PcsInput) -> Self {
        self.pcs = Some(pcs);
        self
    }
    pub fn scaling(mut self, scaling: Vec<f64>) -> Self {
        self.scaling = Some(scaling);
        self
    }
    pub fn integration(mut self, method: IntegrationMethod) -> Self {
        self.integration = method;
        self
    }
    pub fn sobol(mut self, sobol: SobolConfig) -> Self {
        self.sobol = sobol;
        self
    }
    pub fn tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn build(self) -> Result<FrameOrderConfig, ConfigError> {
        let model = self.model.ok_or(ConfigError::MissingParameter("model"))?;
        if self.alignments.is_empty() {
            return Err(ConfigError::MissingParameter("alignments"));
        }
        if self.rdc.is_none() && self.pcs.is_none() {
            return Err(ConfigError::MissingParameter("rdc or pcs data"));
        }
        let num_alignments = self.alignments.len();
        if let Some(rdc) = &self.rdc {
            check_grid("rdc", &rdc.data, num_alignments, rdc.vectors.len())?;
            check_measurements("rdc", &rdc.data)?;
            check_ensemble("rdc", &rdc.data, &rdc.vectors)?;
            if rdc.dipolar_constants.len() != rdc.vectors.len() {
                return Err(invalid(
                    "rdc",
                    format!(
                        "{} dipolar constants for {} bond vectors",
                        rdc.dipolar_constants.len(),
                        rdc.vectors.len()
                    ),
                ));
            }
        }
        if let Some(pcs) = &self.pcs {
            check_grid("pcs", &pcs.data, num_alignments, pcs.positions.len())?;
            check_measurements("pcs", &pcs.data)?;
            check_ensemble("pcs", &pcs.data, &pcs.positions)?;
        }
        if let Some(scaling) = &self.scaling {
            let expected = model.param_num(self.pivot_opt);
            if scaling.len() != expected {
                return Err(invalid(
                    "scaling",
                    format!("expected {expected} entries, found {}", scaling.len()),
                ));
            }
            if scaling.iter().any(|s| !(*s > 0.0) || !s.is_finite()) {
                return Err(invalid("scaling", "entries must be finite and positive"));
            }
        }
        if self.sobol.max_points == 0 {
            return Err(invalid("sobol.max_points", "must be positive"));
        }
        if !(self.sobol.oversample > 0.0) {
            return Err(invalid("sobol.oversample", "must be positive"));
        }
        let total = SobolPoints::total_points(model, self.sobol.max_points, self.sobol.oversample);
        if total > MAX_SOBOL_POINTS {
            return Err(invalid(
                "sobol",
                format!("{total} points requested, at most {MAX_SOBOL_POINTS} are allowed"),
            ));
        }

        Ok(FrameOrderConfig {
            model,
            pivot: self.pivot,
            pivot_opt: self.pivot_opt,
            paramag_centre: self.paramag_centre.unwrap_or_else(Vector3::zeros),
            centre_of_mass: self.centre_of_mass,
            ave_pos_pivot: self
                .ave_pos_pivot
                .or(self.centre_of_mass)
                .unwrap_or_else(Vector3::zeros),
            alignments: self.alignments,
            rdc: self.rdc,
            pcs: self.pcs,
            scaling: self.scaling,
            integration: self.integration,
            sobol: self.sobol,
            tolerance: self.tolerance,
        })
    }
}

fn check_grid(
    parameter: &'static str,
    grid: &ObservationGrid,
    num_alignments: usize,
    num_spins: usize,
) -> Result<(), ConfigError> {
    let shaped = grid.values.len() == num_alignments
        && grid.errors.len() == num_alignments
        && grid.weights.len() == num_alignments
        && grid.values.iter().all(|row| row.len() == num_spins)
        && grid.errors.iter().all(|row| row.len() == num_spins)
        && grid.weights.iter().all(|row| row.len() == num_spins);
    if shaped {
        Ok(())
    } else {
        Err(invalid(
            parameter,
            format!("data must be indexed [alignment][spin] with {num_alignments} x {num_spins} entries"),
        ))
    }
}

/// Measured entries need a finite positive error, when one is given, and a finite positive
/// weight. Missing entries are not checked.
fn check_measurements(parameter: &'static str, grid: &ObservationGrid) -> Result<(), ConfigError> {
    for (i, row) in grid.values.iter().enumerate() {
        for (j, value) in row.iter().enumerate() {
            if value.is_nan() {
                continue;
            }
            if let Some(error) = grid.errors[i][j] {
                if !(error > 0.0) || !error.is_finite() {
                    return Err(invalid(
                        parameter,
                        format!("error {error} of alignment {i}, spin {j} must be finite and positive"),
                    ));
                }
            }
            let weight = grid.weights[i][j];
            if !(weight > 0.0) || !weight.is_finite() {
                return Err(invalid(
                    parameter,
                    format!("weight {weight} of alignment {i}, spin {j} must be finite and positive"),
                ));
            }
        }
    }
    Ok(())
}

/// Every measured spin needs at least one structure.
fn check_ensemble<T>(
    parameter: &'static str,
    grid: &ObservationGrid,
    structures: &[Vec<T>],
) -> Result<(), ConfigError> {
    for (j, spin) in structures.iter().enumerate() {
        if spin.is_empty() && grid.values.iter().any(|row| !row[j].is_nan()) {
            return Err(invalid(parameter, format!("spin {j} has data but no structure")));
        }
    }
    Ok(())
}

/// A relaxation-dispersion problem for one spin cluster.
#[derive(Debug, Clone)]
pub struct DispersionConfig {
    pub model: DispersionModel,
    /// The gyromagnetic ratio of the observed X nucleus.
    pub gamma_x: f64,
    /// Proton spectrometer frequencies in Hz.
    pub fields: Vec<f64>,
    pub curves: DispersionCurves,
    /// R1 indexed `[spin][field]`, required by R1rho models.
    pub r1: Option<Vec<Vec<f64>>>,
}

impl DispersionConfig {
    pub fn from_input(input: &DispersionInput) -> Result<Self, ConfigError> {
        let dataset = &input.dataset;
        let model: DispersionModel = dataset
            .model
            .parse()
            .map_err(|e: DispersionError| invalid("model", e.to_string()))?;
        let gamma_x = gyromagnetic_ratio(&dataset.isotope)
            .ok_or_else(|| invalid("isotope", format!("unknown isotope '{}'", dataset.isotope)))?;
        if model.is_r1rho() && dataset.r1.is_none() {
            return Err(ConfigError::MissingParameter("r1"));
        }
        Ok(Self {
            model,
            gamma_x,
            fields: dataset.fields.clone(),
            curves: input.curves.clone(),
            r1: dataset.r1.clone(),
        })
    }
}

/// Controls for the grid search and the Levenberg-Marquardt refinement.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationConfig {
    /// Grid axes in scaled units, one per parameter. No grid search when `None`.
    pub grid: Option<Vec<GridAxis>>,
    /// Whether grid points violating the linear constraints are skipped.
    pub constrain_grid: bool,
    pub minimise: bool,
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
    /// The evaluation budget is `patience * (n + 1)` for `n` parameters.
    pub patience: usize,
}

#[derive(Default)]
pub struct OptimizationConfigBuilder {
    grid: Option<Vec<GridAxis>>,
    constrain_grid: Option<bool>,
    minimise: Option<bool>,
    ftol: Option<f64>,
    xtol: Option<f64>,
    gtol: Option<f64>,
    patience: Option<usize>,
}

impl OptimizationConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grid(mut self, axes: Vec<GridAxis>) -> Self {
        self.grid = Some(axes);
        self
    }
    pub fn constrain_grid(mut self, constrain: bool) -> Self {
        self.constrain_grid = Some(constrain);
        self
    }
    pub fn minimise(mut self, minimise: bool) -> Self {
        self.minimise = Some(minimise);
        self
    }
    pub fn ftol(mut self, tol: f64) -> Self {
        self.ftol = Some(tol);
        self
    }
    pub fn xtol(mut self, tol: f64) -> Self {
        self.xtol = Some(tol);
        self
    }
    pub fn gtol(mut self, tol: f64) -> Self {
        self.gtol = Some(tol);
        self
    }
    pub fn patience(mut self, patience: usize) -> Self {
        self.patience = Some(patience);
        self
    }

    pub fn build(self) -> Result<OptimizationConfig, ConfigError> {
        let default_tol = f64::EPSILON.sqrt();
        let config = OptimizationConfig {
            grid: self.grid,
            constrain_grid: self.constrain_grid.unwrap_or(true),
            minimise: self.minimise.unwrap_or(true),
            ftol: self.ftol.unwrap_or(default_tol),
            xtol: self.xtol.unwrap_or(default_tol),
            gtol: self.gtol.unwrap_or(0.0),
            patience: self.patience.unwrap_or(100),
        };
        for (name, tol) in [("ftol", config.ftol), ("xtol", config.xtol), ("gtol", config.gtol)] {
            if !(tol >= 0.0 && tol.is_finite()) {
                return Err(invalid(name, format!("{tol} is not a non-negative tolerance")));
            }
        }
        if config.patience == 0 {
            return Err(invalid("patience", "must be positive"));
        }
        if config.grid.is_none() && !config.minimise {
            return Err(invalid("minimise", "nothing to do without a grid search or minimisation"));
        }
        Ok(config)
    }
}

/// Monte Carlo simulation settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonteCarloConfig {
    pub simulations: usize,
    pub seed: u64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            simulations: 500,
            seed: 0,
        }
    }
}

impl MonteCarloConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulations < 2 {
            return Err(invalid("simulations", "at least two simulations are needed"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::dataset::{AlignmentEntry, Coordinates, FrameOrderDataset, SpinEntry};

    fn dataset() -> FrameOrderDataset {
        FrameOrderDataset {
            model: "rotor".to_string(),
            pivot: Some([1.0, 2.0, 3.0]),
            pivot_opt: false,
            paramag_centre: [0.0; 3],
            centre_of_mass: Some([5.0, 5.0, 5.0]),
            ave_pos_pivot: None,
            alignments: vec![AlignmentEntry {
                id: "tb".to_string(),
                tensor: [1e-4, -0.5e-4, 0.0, 0.0, 0.0],
                full_in_ref_frame: true,
                temperature: 298.0,
                frequency: 600e6,
            }],
            spins: vec![SpinEntry {
                id: "N1".to_string(),
                position: Some(Coordinates::Single([10.0, 0.0, 0.0])),
                vector: Some(Coordinates::Single([0.0, 0.0, 2.0])),
                isotope: "15N".to_string(),
                bond_length: 1.02,
            }],
            rdc: None,
            pcs: None,
        }
    }

    fn grid(value: f64) -> ObservationGrid {
        let mut grid = ObservationGrid::missing(1, 1);
        grid.values[0][0] = value;
        grid
    }

    fn rigid_pcs(data: ObservationGrid) -> FrameOrderConfigBuilder {
        FrameOrderConfigBuilder::new()
            .model(FrameOrderModel::Rigid)
            .alignment(AlignmentMedium {
                tensor: AlignmentTensor::new(Vector5::zeros(), true),
                temperature: 298.0,
                frequency: 600e6,
            })
            .pcs(PcsInput {
                positions: vec![vec![Vector3::x()]],
                data,
            })
    }

    #[test]
    fn builder_requires_model_and_data() {
        let missing_model = FrameOrderConfigBuilder::new().build();
        assert_eq!(missing_model.unwrap_err(), ConfigError::MissingParameter("model"));

        let medium = AlignmentMedium {
            tensor: AlignmentTensor::new(Vector5::zeros(), true),
            temperature: 298.0,
            frequency: 600e6,
        };
        let no_data = FrameOrderConfigBuilder::new()
            .model(FrameOrderModel::Rigid)
            .alignment(medium)
            .build();
        assert_eq!(
            no_data.unwrap_err(),
            ConfigError::MissingParameter("rdc or pcs data")
        );
    }

    #[test]
    fn builder_rejects_misshaped_data() {
        let medium = AlignmentMedium {
            tensor: AlignmentTensor::new(Vector5::zeros(), true),
            temperature: 298.0,
            frequency: 600e6,
        };
        let result = FrameOrderConfigBuilder::new()
            .model(FrameOrderModel::Rigid)
            .alignment(medium)
            .pcs(PcsInput {
                positions: vec![vec![Vector3::x()], vec![Vector3::y()]],
                data: grid(0.1),
            })
            .build();
        assert!(matches!(result, Err(ConfigError::Invalid { parameter: "pcs", .. })));
    }

    #[test]
    fn builder_requires_positive_errors_and_weights() {
        for error in [0.0, -0.1, f64::INFINITY] {
            let mut data = grid(0.1);
            data.errors[0][0] = Some(error);
            let result = rigid_pcs(data).build();
            assert!(
                matches!(result, Err(ConfigError::Invalid { parameter: "pcs", .. })),
                "error {error} was accepted"
            );
        }
        for weight in [-1.0, 0.0, f64::NAN] {
            let mut data = grid(0.1);
            data.weights[0][0] = weight;
            let result = rigid_pcs(data).build();
            assert!(
                matches!(result, Err(ConfigError::Invalid { parameter: "pcs", .. })),
                "weight {weight} was accepted"
            );
        }

        let mut data = grid(0.1);
        data.errors[0][0] = Some(0.05);
        data.weights[0][0] = 2.0;
        assert!(rigid_pcs(data).build().is_ok());
    }

    #[test]
    fn missing_entries_are_not_checked_for_errors() {
        let mut data = grid(f64::NAN);
        data.errors[0][0] = Some(-1.0);
        data.weights[0][0] = -1.0;
        assert!(rigid_pcs(data).build().is_ok());
    }

    #[test]
    fn measured_spins_need_a_structure() {
        let result = rigid_pcs(grid(0.1))
            .pcs(PcsInput {
                positions: vec![Vec::new()],
                data: grid(0.1),
            })
            .build();
        assert!(matches!(result, Err(ConfigError::Invalid { parameter: "pcs", .. })));

        let unmeasured = rigid_pcs(grid(0.1))
            .pcs(PcsInput {
                positions: vec![Vec::new()],
                data: grid(f64::NAN),
            })
            .build();
        assert!(unmeasured.is_ok());
    }

    #[test]
    fn scaling_entries_must_be_positive() {
        for bad in [-1.0, 0.0, f64::NAN] {
            let result = rigid_pcs(grid(0.1))
                .scaling(vec![1.0, 1.0, 1.0, bad, 1.0, 1.0])
                .build();
            assert!(
                matches!(result, Err(ConfigError::Invalid { parameter: "scaling", .. })),
                "scaling {bad} was accepted"
            );
        }
        assert!(rigid_pcs(grid(0.1)).scaling(vec![2.0; 6]).build().is_ok());
    }

    #[test]
    fn sobol_budget_is_bounded() {
        let default = SobolConfig::default();
        assert_eq!(
            SobolPoints::total_points(FrameOrderModel::IsoCone, default.max_points, default.oversample),
            200_000
        );
        let cone = |sobol: SobolConfig| {
            rigid_pcs(grid(0.1))
                .model(FrameOrderModel::IsoCone)
                .pivot(Vector3::zeros())
                .sobol(sobol)
                .build()
        };
        assert!(cone(default).is_ok());
        let huge = SobolConfig {
            oversample: 100.0,
            ..default
        };
        assert!(matches!(cone(huge), Err(ConfigError::Invalid { parameter: "sobol", .. })));
    }

    #[test]
    fn from_input_normalises_vectors_and_defaults_the_average_pivot() {
        let input = FrameOrderInput {
            dataset: dataset(),
            rdc: Some(grid(5.0)),
            pcs: Some(grid(0.2)),
        };
        let config = FrameOrderConfigBuilder::from_input(&input)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.model, FrameOrderModel::Rotor);
        assert_eq!(config.ave_pos_pivot, Vector3::new(5.0, 5.0, 5.0));
        let rdc = config.rdc.unwrap();
        assert_eq!(rdc.vectors[0], vec![Vector3::z()]);
        assert!(rdc.dipolar_constants[0] > 0.0);
        assert_eq!(config.pcs.unwrap().positions[0], vec![Vector3::new(10.0, 0.0, 0.0)]);
    }

    #[test]
    fn from_input_keeps_every_structure_of_an_ensemble() {
        let mut data = dataset();
        data.spins[0].vector = Some(Coordinates::Ensemble(vec![[0.0, 0.0, 2.0], [3.0, 0.0, 0.0]]));
        data.spins[0].position =
            Some(Coordinates::Ensemble(vec![[10.0, 0.0, 0.0], [0.0, 10.0, 0.0]]));
        let input = FrameOrderInput {
            dataset: data,
            rdc: Some(grid(5.0)),
            pcs: Some(grid(0.2)),
        };
        let config = FrameOrderConfigBuilder::from_input(&input)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.rdc.unwrap().vectors[0], vec![Vector3::z(), Vector3::x()]);
        assert_eq!(
            config.pcs.unwrap().positions[0],
            vec![Vector3::new(10.0, 0.0, 0.0), Vector3::new(0.0, 10.0, 0.0)]
        );
    }

    #[test]
    fn from_input_requires_geometry_for_measured_spins() {
        let mut data = dataset();
        data.spins[0].position = None;
        let input = FrameOrderInput {
            dataset: data,
            rdc: None,
            pcs: Some(grid(0.2)),
        };
        let result = FrameOrderConfigBuilder::from_input(&input);
        assert!(matches!(result, Err(ConfigError::Invalid { parameter: "position", .. })));

        let mut data = dataset();
        data.model = "cone".to_string();
        let input = FrameOrderInput {
            dataset: data,
            rdc: None,
            pcs: Some(grid(0.2)),
        };
        let result = FrameOrderConfigBuilder::from_input(&input);
        assert!(matches!(result, Err(ConfigError::Invalid { parameter: "model", .. })));
    }

    #[test]
    fn optimization_builder_applies_defaults_and_validates() {
        let config = OptimizationConfigBuilder::new().build().unwrap();
        assert!(config.minimise && config.constrain_grid);
        assert_eq!(config.patience, 100);
        assert_eq!(config.grid, None);

        let bad = OptimizationConfigBuilder::new().ftol(-1.0).build();
        assert!(matches!(bad, Err(ConfigError::Invalid { parameter: "ftol", .. })));

        let idle = OptimizationConfigBuilder::new().minimise(false).build();
        assert!(idle.is_err());
    }

    #[test]
    fn monte_carlo_needs_at_least_two_simulations() {
        assert!(MonteCarloConfig::default().validate().is_ok());
        let config = MonteCarloConfig {
            simulations: 1,
            seed: 7,
        };
        assert!(config.validate().is_err());
    }
}
