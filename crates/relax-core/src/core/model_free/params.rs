use super::ModelFreeError;
use crate::core::observables::{GAMMA_15N, NH_BOND_LENGTH};
use crate::core::utils::identifiers::{lookup_model_free_param, model_free_model_params};
use slotmap::{SlotMap, new_key_type};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

new_key_type! {
    pub struct ResidueId;
}

/// A residue-specific model-free parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MfParam {
    LocalTm,
    S2,
    S2f,
    S2s,
    Te,
    Tf,
    Ts,
    Rex,
    R,
    Csa,
}

impl MfParam {
    pub const ALL: [MfParam; 10] = [
        Self::LocalTm,
        Self::S2,
        Self::S2f,
        Self::S2s,
        Self::Te,
        Self::Tf,
        Self::Ts,
        Self::Rex,
        Self::R,
        Self::Csa,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::LocalTm => "local_tm",
            Self::S2 => "s2",
            Self::S2f => "s2f",
            Self::S2s => "s2s",
            Self::Te => "te",
            Self::Tf => "tf",
            Self::Ts => "ts",
            Self::Rex => "rex",
            Self::R => "r",
            Self::Csa => "csa",
        }
    }

    /// The value used when a parameter has not been set.
    ///
    /// Rex is stored as the field-independent `rho`, so its default is zero.
    pub fn default_value(&self) -> f64 {
        match self {
            Self::LocalTm => 10e-9,
            Self::S2 | Self::S2f | Self::S2s => 0.8,
            Self::Te => 100e-12,
            Self::Tf => 10e-12,
            Self::Ts => 1000e-12,
            Self::Rex => 0.0,
            Self::R => NH_BOND_LENGTH,
            Self::Csa => -170e-6,
        }
    }

    /// The optimisation scaling. Rex is scaled by `1 / (2 pi frq)^2` of the residue's first
    /// spectrometer frequency.
    pub fn scaling(&self, frq: Option<f64>) -> Option<f64> {
        Some(match self {
            Self::LocalTm | Self::Te | Self::Tf | Self::Ts => 1e-9,
            Self::S2 | Self::S2f | Self::S2s => 1.0,
            Self::Rex => 1.0 / (2.0 * PI * frq?).powi(2),
            Self::R => 1e-10,
            Self::Csa => 1e-4,
        })
    }
}

impl fmt::Display for MfParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for MfParam {
    type Err = ModelFreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        lookup_model_free_param(s).ok_or_else(|| ModelFreeError::UnknownParameter {
            name: s.to_string(),
        })
    }
}

/// A global diffusion tensor parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffParam {
    Tm,
    Dper,
    Dpar,
    Theta,
    Phi,
    Dx,
    Dy,
    Dz,
    Alpha,
    Beta,
    Gamma,
}

impl DiffParam {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tm => "tm",
            Self::Dper => "Dper",
            Self::Dpar => "Dpar",
            Self::Theta => "theta",
            Self::Phi => "phi",
            Self::Dx => "Dx",
            Self::Dy => "Dy",
            Self::Dz => "Dz",
            Self::Alpha => "alpha",
            Self::Beta => "beta",
            Self::Gamma => "gamma",
        }
    }

    pub fn is_rate(&self) -> bool {
        matches!(self, Self::Dper | Self::Dpar | Self::Dx | Self::Dy | Self::Dz)
    }

    pub fn is_angle(&self) -> bool {
        matches!(
            self,
            Self::Theta | Self::Phi | Self::Alpha | Self::Beta | Self::Gamma
        )
    }

    pub fn scaling(&self) -> f64 {
        if *self == Self::Tm {
            1e-9
        } else if self.is_rate() {
            1e9
        } else {
            1.0
        }
    }
}

/// Any parameter that can appear in an assembled vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Diffusion(DiffParam),
    ModelFree(MfParam),
}

impl ParamKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Diffusion(p) => p.name(),
            Self::ModelFree(p) => p.name(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpheroidType {
    Oblate,
    Prolate,
    #[default]
    Unspecified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffusionShape {
    Sphere,
    Spheroid(SpheroidType),
    Ellipsoid,
}

impl DiffusionShape {
    pub fn params(&self) -> &'static [DiffParam] {
        match self {
            Self::Sphere => &[DiffParam::Tm],
            Self::Spheroid(_) => &[
                DiffParam::Dper,
                DiffParam::Dpar,
                DiffParam::Theta,
                DiffParam::Phi,
            ],
            Self::Ellipsoid => &[
                DiffParam::Dx,
                DiffParam::Dy,
                DiffParam::Dz,
                DiffParam::Alpha,
                DiffParam::Beta,
                DiffParam::Gamma,
            ],
        }
    }
}

/// The global rotational diffusion tensor. `values` follows [`DiffusionShape::params`].
#[derive(Debug, Clone, PartialEq)]
pub struct DiffusionTensor {
    pub shape: DiffusionShape,
    pub values: Vec<f64>,
    pub fixed: bool,
}

impl DiffusionTensor {
    pub fn sphere(tm: f64) -> Self {
        Self {
            shape: DiffusionShape::Sphere,
            values: vec![tm],
            fixed: false,
        }
    }

    pub fn spheroid(dper: f64, dpar: f64, theta: f64, phi: f64, kind: SpheroidType) -> Self {
        Self {
            shape: DiffusionShape::Spheroid(kind),
            values: vec![dper, dpar, theta, phi],
            fixed: false,
        }
    }

    pub fn ellipsoid(rates: [f64; 3], angles: [f64; 3]) -> Self {
        Self {
            shape: DiffusionShape::Ellipsoid,
            values: vec![rates[0], rates[1], rates[2], angles[0], angles[1], angles[2]],
            fixed: false,
        }
    }

    pub fn with_fixed(mut self, fixed: bool) -> Self {
        self.fixed = fixed;
        self
    }

    pub fn value(&self, param: DiffParam) -> Option<f64> {
        self.shape
            .params()
            .iter()
            .position(|p| *p == param)
            .map(|i| self.values[i])
    }

    /// The isotropic global correlation time, if the tensor is a sphere.
    pub fn tm(&self) -> Option<f64> {
        self.value(DiffParam::Tm)
    }
}

/// The kind of relaxation measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
pub enum RelaxationKind {
    R1,
    R2,
    #[serde(rename = "NOE")]
    Noe,
}

/// One measured relaxation value at a proton spectrometer frequency in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelaxationDatum {
    pub kind: RelaxationKind,
    pub frq: f64,
    pub value: f64,
    pub error: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Residue {
    pub number: i32,
    pub name: String,
    pub select: bool,
    pub fixed: bool,
    pub params: Vec<MfParam>,
    pub data: Vec<RelaxationDatum>,
    values: BTreeMap<MfParam, f64>,
}

impl Residue {
    pub fn new(number: i32, name: &str) -> Self {
        Self {
            number,
            name: name.to_string(),
            select: true,
            fixed: false,
            params: Vec::new(),
            data: Vec::new(),
            values: BTreeMap::new(),
        }
    }

    /// Sets the parameters of a named model (`m0` to `m9`, `tm0` to `tm9`).
    pub fn with_model(mut self, model: &str) -> Result<Self, ModelFreeError> {
        let params =
            model_free_model_params(model).ok_or_else(|| ModelFreeError::UnknownModel {
                name: model.to_string(),
            })?;
        self.params = params.to_vec();
        Ok(self)
    }

    pub fn with_params(mut self, params: &[MfParam]) -> Self {
        self.params = params.to_vec();
        self
    }

    pub fn with_data(mut self, data: Vec<RelaxationDatum>) -> Self {
        self.data = data;
        self
    }

    pub fn has_param(&self, param: MfParam) -> bool {
        self.params.contains(&param)
    }

    pub fn has_local_tm(&self) -> bool {
        self.has_param(MfParam::LocalTm)
    }

    pub fn value(&self, param: MfParam) -> Option<f64> {
        self.values.get(&param).copied()
    }

    /// The stored value, or the parameter default when unset.
    pub fn value_or_default(&self, param: MfParam) -> f64 {
        self.value(param).unwrap_or_else(|| param.default_value())
    }

    pub fn set_value(&mut self, param: MfParam, value: f64) {
        self.values.insert(param, value);
    }

    /// Fills every unset model parameter with its default.
    pub fn set_default_values(&mut self) {
        for param in self.params.clone() {
            self.values.entry(param).or_insert(param.default_value());
        }
    }

    /// The first spectrometer frequency of the residue's data, which sets the Rex scaling.
    pub fn first_frequency(&self) -> Option<f64> {
        self.data.first().map(|datum| datum.frq)
    }

    pub fn scaling(&self, param: MfParam) -> Result<f64, ModelFreeError> {
        param
            .scaling(self.first_frequency())
            .ok_or(ModelFreeError::MissingFrequency {
                residue: self.number,
            })
    }
}

/// The model-free analysis state: an optional global diffusion tensor and the residues in order.
#[derive(Debug, Clone)]
pub struct ModelFreeStore {
    pub diffusion: Option<DiffusionTensor>,
    /// Gyromagnetic ratio of the heteronucleus.
    pub gamma_x: f64,
    residues: SlotMap<ResidueId, Residue>,
    order: Vec<ResidueId>,
}

impl Default for ModelFreeStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelFreeStore {
    pub fn new(diffusion: Option<DiffusionTensor>) -> Self {
        Self {
            diffusion,
            gamma_x: GAMMA_15N,
            residues: SlotMap::with_key(),
            order: Vec::new(),
        }
    }

    pub fn add_residue(&mut self, residue: Residue) -> ResidueId {
        let id = self.residues.insert(residue);
        self.order.push(id);
        id
    }

    pub fn residue(&self, id: ResidueId) -> Option<&Residue> {
        self.residues.get(id)
    }

    pub fn residue_mut(&mut self, id: ResidueId) -> Option<&mut Residue> {
        self.residues.get_mut(id)
    }

    /// All residues in insertion order.
    pub fn residues(&self) -> impl Iterator<Item = (ResidueId, &Residue)> {
        self.order.iter().map(|&id| (id, &self.residues[id]))
    }

    pub fn selected(&self) -> impl Iterator<Item = (ResidueId, &Residue)> {
        self.residues().filter(|(_, res)| res.select)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rex_scaling_needs_a_frequency() {
        let residue = Residue::new(5, "GLY").with_params(&[MfParam::Rex]);
        assert!(matches!(
            residue.scaling(MfParam::Rex),
            Err(ModelFreeError::MissingFrequency { residue: 5 })
        ));
        let scale = MfParam::Rex.scaling(Some(600e6)).unwrap();
        assert_eq!(scale, 1.0 / (2.0 * PI * 600e6).powi(2));
    }

    #[test]
    fn named_models_set_parameter_lists() {
        let residue = Residue::new(1, "ALA").with_model("tm2").unwrap();
        assert_eq!(residue.params, vec![MfParam::LocalTm, MfParam::S2, MfParam::Te]);
        assert!(residue.has_local_tm());
        assert!(Residue::new(1, "ALA").with_model("m42").is_err());
    }

    #[test]
    fn defaults_fill_only_unset_values() {
        let mut residue = Residue::new(1, "ALA").with_model("m2").unwrap();
        residue.set_value(MfParam::S2, 0.5);
        residue.set_default_values();
        assert_eq!(residue.value(MfParam::S2), Some(0.5));
        assert_eq!(residue.value(MfParam::Te), Some(100e-12));
        assert_eq!(residue.value(MfParam::Rex), None);
        assert_eq!(residue.value_or_default(MfParam::Csa), -170e-6);
    }

    #[test]
    fn diffusion_values_follow_shape_order() {
        let tensor = DiffusionTensor::spheroid(1.5e7, 2.0e7, 0.3, 1.1, SpheroidType::Prolate);
        assert_eq!(tensor.value(DiffParam::Dpar), Some(2.0e7));
        assert_eq!(tensor.value(DiffParam::Tm), None);
        assert_eq!(DiffusionTensor::sphere(8e-9).tm(), Some(8e-9));
    }

    #[test]
    fn store_keeps_insertion_order() {
        let mut store = ModelFreeStore::default();
        let mut second = Residue::new(2, "LEU");
        second.select = false;
        store.add_residue(Residue::new(1, "ALA"));
        store.add_residue(second);
        store.add_residue(Residue::new(3, "GLY"));
        let numbers: Vec<i32> = store.residues().map(|(_, r)| r.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(store.selected().count(), 2);
    }
}
