use super::{Objective, Resample};
use crate::core::model_free::ModelFreeError;
use crate::core::model_free::bounds::{Increments, grid_search_setup, linear_constraints};
use crate::core::model_free::params::{
    DiffParam, DiffusionShape, MfParam, ModelFreeStore, RelaxationDatum, Residue, ResidueId,
};
use crate::core::model_free::relaxation::{
    RateTerms, csa_relaxation_constant, dipolar_relaxation_constant, frequencies,
};
use crate::core::model_free::spectral::SpectralDensity;
use crate::core::model_free::vector::{
    AssembledParams, ParamSetType, ParamSlot, Scope, assemble, determine_param_set_type,
    disassemble, param_names,
};
use crate::core::utils::bounds::{GridAxis, LinearConstraints};
use crate::engine::error::EngineError;
use nalgebra::DMatrix;
use std::f64::consts::PI;
use tracing::debug;

#[derive(Debug, Clone)]
struct ResidueData {
    id: ResidueId,
    data: Vec<RelaxationDatum>,
    back_calc: Vec<f64>,
}

/// The model-free chi-squared target over R1, R2 and NOE data.
///
/// The target owns a copy of the store and writes every trial vector back into it, so the
/// spectral densities always see the same values a caller would after [`ModelFree::store_for`].
/// Only isotropic diffusion (or a local tm per residue) is supported.
#[derive(Debug, Clone)]
pub struct ModelFree {
    store: ModelFreeStore,
    set: ParamSetType,
    scope: Scope,
    assembled: AssembledParams,
    names: Vec<String>,
    residues: Vec<ResidueData>,
    num_points: usize,
    unscaled: Vec<f64>,
}

impl ModelFree {
    pub fn new(store: ModelFreeStore, scope: Scope) -> Result<Self, EngineError> {
        let set = determine_param_set_type(&store)?;
        if set != ParamSetType::LocalTm {
            match store.diffusion.as_ref().map(|d| d.shape) {
                Some(DiffusionShape::Sphere) => {}
                Some(DiffusionShape::Spheroid(_)) => {
                    return Err(ModelFreeError::UnsupportedDiffusion {
                        diffusion: "spheroid",
                    }
                    .into());
                }
                Some(DiffusionShape::Ellipsoid) => {
                    return Err(ModelFreeError::UnsupportedDiffusion {
                        diffusion: "ellipsoid",
                    }
                    .into());
                }
                None => return Err(ModelFreeError::MissingDiffusionTensor.into()),
            }
        }

        let assembled = assemble(&store, set, scope)?;
        if assembled.is_empty() {
            return Err(ModelFreeError::NoParameters.into());
        }
        let names = param_names(&store, &assembled.slots);

        // Diffusion-only fits see every selected residue; otherwise the scope decides.
        let residues: Vec<ResidueData> = store
            .selected()
            .filter(|(id, _)| match scope {
                Scope::Residue(only) if set.includes_residues() => *id == only,
                _ => true,
            })
            .map(|(id, residue)| ResidueData {
                id,
                data: residue.data.clone(),
                back_calc: vec![0.0; residue.data.len()],
            })
            .collect();
        let num_points = residues.iter().map(|r| r.data.len()).sum();

        debug!(
            set = %set,
            params = assembled.len(),
            residues = residues.len(),
            points = num_points,
            "Model-free target constructed"
        );

        Ok(Self {
            unscaled: vec![0.0; assembled.len()],
            store,
            set,
            scope,
            assembled,
            names,
            residues,
            num_points,
        })
    }

    pub fn param_set(&self) -> ParamSetType {
        self.set
    }

    /// The starting vector in optimisation units, taken from the store values.
    pub fn initial_params(&self) -> Vec<f64> {
        self.assembled.scaled()
    }

    pub fn default_grid(&self, inc: usize) -> Result<Vec<GridAxis>, EngineError> {
        Ok(grid_search_setup(
            &self.store,
            &self.assembled,
            &Increments::Uniform(inc),
            None,
            None,
        )?)
    }

    /// A copy of the store holding the physical values of `params`.
    pub fn store_for(&self, params: &[f64]) -> Result<ModelFreeStore, EngineError> {
        let mut store = self.store.clone();
        disassemble(&mut store, self.set, self.scope, &self.assembled.unscale(params))?;
        Ok(store)
    }

    /// Back-calculated values from the last evaluation, one vector per residue in data order.
    pub fn back_calc(&self) -> Vec<Vec<f64>> {
        self.residues.iter().map(|r| r.back_calc.clone()).collect()
    }

    fn load(&mut self, params: &[f64]) -> Result<(), EngineError> {
        if params.len() != self.assembled.len() {
            return Err(ModelFreeError::LengthMismatch {
                expected: self.assembled.len(),
                found: params.len(),
            }
            .into());
        }
        for ((u, x), s) in self.unscaled.iter_mut().zip(params).zip(&self.assembled.scaling) {
            *u = x * s;
        }
        disassemble(&mut self.store, self.set, self.scope, &self.unscaled)?;
        Ok(())
    }

    fn tm(&self, residue: &Residue) -> Result<f64, EngineError> {
        if residue.has_local_tm() {
            return Ok(residue.value_or_default(MfParam::LocalTm));
        }
        self.store
            .diffusion
            .as_ref()
            .and_then(|d| d.tm())
            .ok_or_else(|| ModelFreeError::MissingDiffusionTensor.into())
    }

    fn back_calculate(&mut self) -> Result<(), EngineError> {
        let gamma_x = self.store.gamma_x;
        for k in 0..self.residues.len() {
            let residue = self.residue(k)?;
            let tm = self.tm(residue)?;
            let spectral = SpectralDensity::from_residue(residue);
            let values: Vec<f64> = self.residues[k]
                .data
                .iter()
                .map(|datum| {
                    rate_terms(residue, &spectral, tm, datum.frq, gamma_x).value(datum.kind, gamma_x)
                })
                .collect();
            self.residues[k].back_calc = values;
        }
        Ok(())
    }

    fn residue(&self, k: usize) -> Result<&Residue, EngineError> {
        let id = self.residues[k].id;
        self.store
            .residue(id)
            .ok_or_else(|| EngineError::Internal(format!("residue {id:?} vanished from the store")))
    }
}

/// The rate ingredients of a residue at one field.
fn rate_terms(
    residue: &Residue,
    spectral: &SpectralDensity,
    tm: f64,
    frq: f64,
    gamma_x: f64,
) -> RateTerms {
    let w = frequencies(frq, gamma_x);
    let rex = if residue.has_param(MfParam::Rex) {
        residue.value_or_default(MfParam::Rex) * (2.0 * PI * frq).powi(2)
    } else {
        0.0
    };
    RateTerms {
        j: spectral.j_all(tm, &w),
        dip: dipolar_relaxation_constant(gamma_x, residue.value_or_default(MfParam::R)),
        csa: csa_relaxation_constant(frq, gamma_x, residue.value_or_default(MfParam::Csa)),
        rex,
    }
}

/// The derivative of the rate ingredients with respect to one physical parameter.
fn rate_tangent(
    param: MfParam,
    terms: &RateTerms,
    residue: &Residue,
    spectral: &SpectralDensity,
    tm: f64,
    frq: f64,
    gamma_x: f64,
) -> RateTerms {
    let w = frequencies(frq, gamma_x);
    match param {
        MfParam::R => RateTerms {
            dip: -6.0 * terms.dip / residue.value_or_default(MfParam::R),
            ..RateTerms::default()
        },
        MfParam::Csa => RateTerms {
            csa: 2.0 * terms.csa / residue.value_or_default(MfParam::Csa),
            ..RateTerms::default()
        },
        MfParam::Rex => RateTerms {
            rex: (2.0 * PI * frq).powi(2),
            ..RateTerms::default()
        },
        param => RateTerms {
            j: spectral.dj_all(param, tm, &w),
            ..RateTerms::default()
        },
    }
}

impl Objective for ModelFree {
    fn name(&self) -> &'static str {
        "model-free"
    }

    fn n_params(&self) -> usize {
        self.assembled.len()
    }

    fn n_residuals(&self) -> usize {
        self.num_points
    }

    fn param_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn scaling(&self) -> &[f64] {
        &self.assembled.scaling
    }

    fn evaluate(&mut self, params: &[f64]) -> Result<f64, EngineError> {
        self.load(params)?;
        self.back_calculate()?;
        let chi2: f64 = self
            .residues
            .iter()
            .flat_map(|r| r.data.iter().zip(&r.back_calc))
            .map(|(datum, back)| ((datum.value - back) / datum.error).powi(2))
            .sum();
        if !chi2.is_finite() {
            return Err(EngineError::NonFinite {
                target: "model-free",
            });
        }
        Ok(chi2)
    }

    fn residuals(&mut self, params: &[f64], out: &mut [f64]) -> Result<(), EngineError> {
        self.load(params)?;
        self.back_calculate()?;
        let pairs = self
            .residues
            .iter()
            .flat_map(|r| r.data.iter().zip(&r.back_calc));
        for (slot, (datum, back)) in out.iter_mut().zip(pairs) {
            *slot = (datum.value - back) / datum.error;
        }
        Ok(())
    }

    fn jacobian(&mut self, params: &[f64], out: &mut DMatrix<f64>) -> Result<(), EngineError> {
        self.load(params)?;
        out.fill(0.0);
        let gamma_x = self.store.gamma_x;

        let mut row = 0;
        for k in 0..self.residues.len() {
            let residue = self.residue(k)?;
            let id = self.residues[k].id;
            let tm = self.tm(residue)?;
            let spectral = SpectralDensity::from_residue(residue);

            for datum in &self.residues[k].data {
                let terms = rate_terms(residue, &spectral, tm, datum.frq, gamma_x);
                for (col, slot) in self.assembled.slots.iter().enumerate() {
                    let param = match *slot {
                        ParamSlot::Diffusion(DiffParam::Tm) if !residue.has_local_tm() => {
                            MfParam::LocalTm
                        }
                        ParamSlot::Residue(owner, param) if owner == id => param,
                        _ => continue,
                    };
                    let d = rate_tangent(param, &terms, residue, &spectral, tm, datum.frq, gamma_x);
                    out[(row, col)] = -terms.tangent(&d, datum.kind, gamma_x)
                        * self.assembled.scaling[col]
                        / datum.error;
                }
                row += 1;
            }
        }
        Ok(())
    }

    fn constraints(&self) -> LinearConstraints {
        linear_constraints(&self.store, &self.assembled)
    }
}

impl Resample for ModelFree {
    fn measurements(&self) -> Vec<(f64, f64)> {
        self.residues
            .iter()
            .flat_map(|r| r.data.iter().map(|d| (d.value, d.error)))
            .collect()
    }

    fn set_measured_values(&mut self, values: &[f64]) -> Result<(), EngineError> {
        if values.len() != self.num_points {
            return Err(EngineError::Internal(format!(
                "expected {} measured values, got {}",
                self.num_points,
                values.len()
            )));
        }
        let data = self.residues.iter_mut().flat_map(|r| r.data.iter_mut());
        for (datum, &value) in data.zip(values) {
            datum.value = value;
        }
        Ok(())
    }
}
