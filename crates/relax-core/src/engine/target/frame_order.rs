use super::{MaskedData, Objective, Resample};
use crate::core::alignment::{reduce_tensor, rotate_reduced_tensor, to_5d};
use crate::core::frame_order::FrameOrderError;
use crate::core::frame_order::matrix::{compile_2nd_matrix, to_reference_frame};
use crate::core::frame_order::model::FrameOrderModel;
use crate::core::frame_order::params::{FrameOrderParams, Motion};
use crate::core::frame_order::sampling::SobolPoints;
use crate::core::integration::quadrature::Tolerance;
use crate::core::integration::quasi_random::AcceptedRotations;
use crate::core::integration::{IntegrationMethod, PcsVectors, adaptive, pcs_kernel};
use crate::core::observables::{average_rdc_5d, pcs_constant};
use crate::core::utils::bounds::LinearConstraints;
use crate::engine::cache::SobolCache;
use crate::engine::config::{ConfigError, FrameOrderConfig};
use crate::engine::error::EngineError;
use nalgebra::{Matrix3, Vector3};
use std::f64::consts::PI;
use std::sync::Arc;
use tracing::debug;

/// RDC error in Hz assumed when none is given.
pub const DEFAULT_RDC_ERROR: f64 = 1.0;
/// PCS error in ppm assumed when none is given.
pub const DEFAULT_PCS_ERROR: f64 = 0.1;
/// The diagonal scaling of optimised pivot coordinates.
pub const PIVOT_SCALING: f64 = 1e2;

/// The PCS constant is evaluated at `r = 1 m` while positions are in Angstrom.
const ANGSTROM_CUBED_PER_METRE_CUBED: f64 = 1e30;

#[derive(Debug, Clone)]
struct Medium {
    tensor: Matrix3<f64>,
    full_in_ref_frame: bool,
}

/// Geometry is indexed `[spin][structure]`.
#[derive(Debug, Clone)]
struct RdcSet {
    data: MaskedData,
    vectors: Vec<Vec<Vector3<f64>>>,
    dip_const: Vec<f64>,
    back_calc: Vec<Vec<f64>>,
}

#[derive(Debug, Clone)]
struct PcsSet {
    data: MaskedData,
    positions: Vec<Vec<Vector3<f64>>>,
    /// Per alignment.
    constants: Vec<f64>,
    back_calc: Vec<Vec<f64>>,
}

/// The frame-order chi-squared target over RDC and PCS data from several alignment media.
///
/// Construction validates the geometry the model needs, masks missing data and fetches the
/// Sobol' points. Evaluation decodes the scaled parameter vector, reduces and rotates every
/// alignment tensor, then back-calculates the RDCs from the reduced tensors and the PCSs by
/// averaging over the motional domain with the full tensors. Spins with several structures take
/// the mean of the per-structure values.
#[derive(Debug, Clone)]
pub struct FrameOrder {
    model: FrameOrderModel,
    pivot_opt: bool,
    pivot: Vector3<f64>,
    com: Option<Vector3<f64>>,
    ave_pos_pivot: Vector3<f64>,
    paramag_centre: Vector3<f64>,
    scaling: Vec<f64>,
    media: Vec<Medium>,
    rdc: Option<RdcSet>,
    pcs: Option<PcsSet>,
    integration: IntegrationMethod,
    sobol: Option<Arc<SobolPoints>>,
    max_points: usize,
    tolerance: Tolerance,
    rotated: Vec<Matrix3<f64>>,
    unscaled: Vec<f64>,
}

impl FrameOrder {
    pub fn new(config: &FrameOrderConfig, cache: &SobolCache) -> Result<Self, EngineError> {
        let model = config.model;
        if !model.is_rigid() && !config.pivot_opt && config.pivot.is_none() {
            return Err(FrameOrderError::MissingGeometry {
                model: model.name(),
                what: "a pivot point",
            }
            .into());
        }
        if model.needs_centre_of_mass() && config.centre_of_mass.is_none() {
            return Err(FrameOrderError::MissingGeometry {
                model: model.name(),
                what: "a centre of mass",
            }
            .into());
        }

        let scaling = match &config.scaling {
            Some(scaling) => scaling.clone(),
            None => Self::default_scaling(model, config.pivot_opt),
        };
        let expected = model.param_num(config.pivot_opt);
        if scaling.len() != expected {
            return Err(ConfigError::Invalid {
                parameter: "scaling",
                reason: format!("expected {expected} entries, found {}", scaling.len()),
            }
            .into());
        }

        let media: Vec<Medium> = config
            .alignments
            .iter()
            .map(|a| Medium {
                tensor: a.tensor.tensor(),
                full_in_ref_frame: a.tensor.full_in_ref_frame,
            })
            .collect();

        let rdc = config.rdc.as_ref().map(|rdc| RdcSet {
            data: MaskedData::new(
                &rdc.data.values,
                &rdc.data.errors,
                &rdc.data.weights,
                DEFAULT_RDC_ERROR,
            ),
            vectors: rdc.vectors.clone(),
            dip_const: rdc.dipolar_constants.clone(),
            back_calc: vec![vec![0.0; rdc.vectors.len()]; media.len()],
        });

        let pcs = config.pcs.as_ref().map(|pcs| PcsSet {
            data: MaskedData::new(
                &pcs.data.values,
                &pcs.data.errors,
                &pcs.data.weights,
                DEFAULT_PCS_ERROR,
            ),
            positions: pcs.positions.clone(),
            constants: config
                .alignments
                .iter()
                .map(|a| pcs_constant(a.temperature, a.frequency, 1.0) * ANGSTROM_CUBED_PER_METRE_CUBED)
                .collect(),
            back_calc: vec![vec![0.0; pcs.positions.len()]; media.len()],
        });

        let needs_sobol = pcs.is_some()
            && !model.is_rigid()
            && config.integration == IntegrationMethod::QuasiRandom;
        let sobol = if needs_sobol {
            let total =
                SobolPoints::total_points(model, config.sobol.max_points, config.sobol.oversample);
            Some(cache.get_or_generate(model, total, config.sobol.skip)?)
        } else {
            None
        };

        debug!(
            model = model.name(),
            alignments = media.len(),
            rdc = rdc.as_ref().map_or(0, |r| r.data.len()),
            pcs = pcs.as_ref().map_or(0, |p| p.data.len()),
            sobol_points = sobol.as_ref().map_or(0, |s| s.len()),
            "Frame-order target constructed"
        );

        Ok(Self {
            model,
            pivot_opt: config.pivot_opt,
            pivot: config.pivot.unwrap_or_else(Vector3::zeros),
            com: config.centre_of_mass,
            ave_pos_pivot: config.ave_pos_pivot,
            paramag_centre: config.paramag_centre,
            rotated: vec![Matrix3::zeros(); media.len()],
            unscaled: vec![0.0; scaling.len()],
            scaling,
            media,
            rdc,
            pcs,
            integration: config.integration,
            sobol,
            max_points: config.sobol.max_points,
            tolerance: config.tolerance,
        })
    }

    /// Unit scaling except for optimised pivot coordinates.
    pub fn default_scaling(model: FrameOrderModel, pivot_opt: bool) -> Vec<f64> {
        model
            .param_names(pivot_opt)
            .iter()
            .map(|name| if name.starts_with("pivot_") && *name != "pivot_disp" {
                PIVOT_SCALING
            } else {
                1.0
            })
            .collect()
    }

    /// Default grid-search bounds of the angular parameters, in rad.
    pub fn angular_bounds(name: &str) -> Option<(f64, f64)> {
        match name {
            "ave_pos_alpha" | "ave_pos_gamma" | "eigen_alpha" | "eigen_gamma" | "axis_phi" => {
                Some((0.0, 2.0 * PI))
            }
            "ave_pos_beta" | "eigen_beta" | "axis_theta" => Some((0.0, PI)),
            "axis_alpha" => Some((-PI, PI)),
            name if FrameOrderModel::is_amplitude_param(name) => Some((0.0, PI)),
            _ => None,
        }
    }

    pub fn model(&self) -> FrameOrderModel {
        self.model
    }

    /// The number of Sobol' points available to the quasi-random integrator.
    pub fn sobol_points(&self) -> usize {
        self.sobol.as_ref().map_or(0, |s| s.len())
    }

    /// RDCs from the last evaluation, indexed `[alignment][spin]`, zero where not measured.
    pub fn back_calc_rdc(&self) -> Option<&[Vec<f64>]> {
        self.rdc.as_ref().map(|r| r.back_calc.as_slice())
    }

    /// PCSs from the last evaluation, indexed `[alignment][spin]`, zero where not measured.
    pub fn back_calc_pcs(&self) -> Option<&[Vec<f64>]> {
        self.pcs.as_ref().map(|p| p.back_calc.as_slice())
    }

    fn back_calculate(&mut self, params: &[f64]) -> Result<(), EngineError> {
        if params.len() != self.scaling.len() {
            return Err(FrameOrderError::ParameterCount {
                model: self.model.name(),
                expected: self.scaling.len(),
                found: params.len(),
            }
            .into());
        }
        for ((u, x), s) in self.unscaled.iter_mut().zip(params).zip(&self.scaling) {
            *u = x * s;
        }
        let decoded = FrameOrderParams::decode(self.model, self.pivot_opt, &self.unscaled)?;

        // For the double rotor the decoded pivot is the second one, the first sits along the
        // eigenframe z axis.
        let pivot2 = decoded.pivot.unwrap_or(self.pivot);
        let r_eigen = decoded.motion.eigenframe(&pivot2, self.com.as_ref())?;
        let pivot1 = match decoded.motion {
            Motion::DoubleRotor { pivot_disp, .. } => pivot2 + r_eigen.column(2) * pivot_disp,
            _ => pivot2,
        };
        let r_ave = decoded.ave.to_matrix();

        let frame_order = match decoded.motion {
            Motion::Rigid => None,
            motion => Some(to_reference_frame(&compile_2nd_matrix(&motion), &r_eigen)),
        };
        for (rotated, medium) in self.rotated.iter_mut().zip(&self.media) {
            let reduced = match &frame_order {
                Some(d) => reduce_tensor(d, &medium.tensor),
                None => medium.tensor,
            };
            *rotated = rotate_reduced_tensor(&r_ave, &reduced, medium.full_in_ref_frame);
        }

        if let Some(rdc) = &mut self.rdc {
            for (i, rotated) in self.rotated.iter().enumerate() {
                let a5 = to_5d(rotated);
                for (j, vectors) in rdc.vectors.iter().enumerate() {
                    rdc.back_calc[i][j] = if rdc.data.missing[i][j] {
                        0.0
                    } else {
                        average_rdc_5d(rdc.dip_const[j], vectors, &a5)
                    };
                }
            }
        }

        if let Some(pcs) = &mut self.pcs {
            let domain = decoded.motion.domain();
            let accepted = match (&domain, &self.sobol) {
                (Some(domain), Some(points)) => Some(AcceptedRotations::select(
                    points,
                    domain,
                    &r_eigen,
                    self.max_points,
                )),
                _ => None,
            };
            let ln_pivot = pivot2 - self.paramag_centre;
            let inter_pivot = pivot1 - pivot2;
            let shift = self.ave_pos_pivot + decoded.translation - pivot1;

            let r_ave_t = r_ave.transpose();

            for (j, structures) in pcs.positions.iter().enumerate() {
                for (i, medium) in self.media.iter().enumerate() {
                    if pcs.data.missing[i][j] || structures.is_empty() {
                        pcs.back_calc[i][j] = 0.0;
                        continue;
                    }
                    let rotation = if medium.full_in_ref_frame {
                        &r_ave
                    } else {
                        &r_ave_t
                    };
                    let mut kernel = 0.0;
                    for position in structures {
                        let vectors = PcsVectors {
                            pivot_atom: rotation * (position - self.ave_pos_pivot) + shift,
                            ln_pivot,
                            inter_pivot,
                        };
                        kernel += match (&domain, &accepted, self.integration) {
                            (None, _, _) => pcs_kernel(&vectors.rigid(), &medium.tensor),
                            (Some(_), Some(accepted), IntegrationMethod::QuasiRandom) => {
                                accepted.average_pcs(&vectors, &medium.tensor)
                            }
                            (Some(domain), _, _) => adaptive::average_pcs(
                                domain,
                                &r_eigen,
                                &vectors,
                                &medium.tensor,
                                &self.tolerance,
                            ),
                        };
                    }
                    pcs.back_calc[i][j] = pcs.constants[i] * kernel / structures.len() as f64;
                }
            }
        }
        Ok(())
    }
}

impl Objective for FrameOrder {
    fn name(&self) -> &'static str {
        self.model.name()
    }

    fn n_params(&self) -> usize {
        self.scaling.len()
    }

    fn n_residuals(&self) -> usize {
        self.rdc.as_ref().map_or(0, |r| r.data.len()) + self.pcs.as_ref().map_or(0, |p| p.data.len())
    }

    fn param_names(&self) -> Vec<String> {
        self.model
            .param_names(self.pivot_opt)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn scaling(&self) -> &[f64] {
        &self.scaling
    }

    fn evaluate(&mut self, params: &[f64]) -> Result<f64, EngineError> {
        self.back_calculate(params)?;
        let chi2 = self.rdc.as_ref().map_or(0.0, |r| r.data.chi2(&r.back_calc))
            + self.pcs.as_ref().map_or(0.0, |p| p.data.chi2(&p.back_calc));
        if !chi2.is_finite() {
            return Err(FrameOrderError::NonFiniteChi2 {
                model: self.model.name(),
            }
            .into());
        }
        Ok(chi2)
    }

    fn residuals(&mut self, params: &[f64], out: &mut [f64]) -> Result<(), EngineError> {
        self.back_calculate(params)?;
        let mut k = 0;
        if let Some(rdc) = &self.rdc {
            k += rdc.data.residuals(&rdc.back_calc, &mut out[k..]);
        }
        if let Some(pcs) = &self.pcs {
            pcs.data.residuals(&pcs.back_calc, &mut out[k..]);
        }
        Ok(())
    }

    fn constraints(&self) -> LinearConstraints {
        let mut rows = Vec::new();
        for (i, name) in self.model.param_names(self.pivot_opt).iter().enumerate() {
            if FrameOrderModel::is_amplitude_param(name) {
                rows.push((vec![(i, self.scaling[i])], 0.0));
                rows.push((vec![(i, -self.scaling[i])], -PI));
            }
        }
        LinearConstraints::from_rows(self.scaling.len(), &rows)
    }
}

impl Resample for FrameOrder {
    fn measurements(&self) -> Vec<(f64, f64)> {
        let rdc = self.rdc.iter().flat_map(|r| r.data.measurements());
        let pcs = self.pcs.iter().flat_map(|p| p.data.measurements());
        rdc.chain(pcs).collect()
    }

    fn set_measured_values(&mut self, values: &[f64]) -> Result<(), EngineError> {
        if values.len() != self.n_residuals() {
            return Err(EngineError::Internal(format!(
                "expected {} measured values, got {}",
                self.n_residuals(),
                values.len()
            )));
        }
        let mut k = 0;
        if let Some(rdc) = &mut self.rdc {
            k += rdc.data.set_values(values);
        }
        if let Some(pcs) = &mut self.pcs {
            pcs.data.set_values(&values[k..]);
        }
        Ok(())
    }
}
