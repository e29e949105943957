use super::ModelFreeError;
use super::params::{DiffParam, MfParam, ModelFreeStore, ParamKind, ResidueId};
use std::fmt;

/// Which parameters an optimisation varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSetType {
    /// Every residue carries its own tm; there is no global diffusion tensor.
    LocalTm,
    /// Only the diffusion tensor varies.
    Diff,
    /// Only the model-free parameters vary.
    Mf,
    /// The diffusion tensor and the model-free parameters vary together.
    All,
}

impl ParamSetType {
    pub fn includes_diffusion(&self) -> bool {
        matches!(self, Self::Diff | Self::All)
    }

    pub fn includes_residues(&self) -> bool {
        !matches!(self, Self::Diff)
    }
}

impl fmt::Display for ParamSetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LocalTm => "local_tm",
            Self::Diff => "diff",
            Self::Mf => "mf",
            Self::All => "all",
        };
        write!(f, "{name}")
    }
}

/// Restricts residue parameters to a single residue, for per-residue optimisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    AllResidues,
    Residue(ResidueId),
}

impl Scope {
    fn admits(&self, id: ResidueId) -> bool {
        match self {
            Self::AllResidues => true,
            Self::Residue(only) => *only == id,
        }
    }
}

/// One position in the assembled vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamSlot {
    Diffusion(DiffParam),
    Residue(ResidueId, MfParam),
}

impl ParamSlot {
    pub fn kind(&self) -> ParamKind {
        match self {
            Self::Diffusion(p) => ParamKind::Diffusion(*p),
            Self::Residue(_, p) => ParamKind::ModelFree(*p),
        }
    }

    pub fn residue(&self) -> Option<ResidueId> {
        match self {
            Self::Diffusion(_) => None,
            Self::Residue(id, _) => Some(*id),
        }
    }
}

/// A parameter vector in physical units together with its per-element scaling.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledParams {
    pub values: Vec<f64>,
    pub scaling: Vec<f64>,
    pub slots: Vec<ParamSlot>,
}

impl AssembledParams {
    /// The vector in optimisation units, `values / scaling`.
    pub fn scaled(&self) -> Vec<f64> {
        self.values
            .iter()
            .zip(&self.scaling)
            .map(|(v, s)| v / s)
            .collect()
    }

    pub fn unscale(&self, scaled: &[f64]) -> Vec<f64> {
        scaled.iter().zip(&self.scaling).map(|(v, s)| v * s).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub fn determine_param_set_type(store: &ModelFreeStore) -> Result<ParamSetType, ModelFreeError> {
    let mut local_tm: Option<bool> = None;
    for (_, residue) in store.selected() {
        match local_tm {
            None => local_tm = Some(residue.has_local_tm()),
            Some(flag) if flag != residue.has_local_tm() => {
                return Err(ModelFreeError::MixedLocalTm);
            }
            Some(_) => {}
        }
    }
    let local_tm = local_tm.unwrap_or(false);
    let mf_all_fixed = store.selected().all(|(_, residue)| residue.fixed);

    if local_tm {
        return if mf_all_fixed {
            Err(ModelFreeError::AllFixed)
        } else {
            Ok(ParamSetType::LocalTm)
        };
    }

    let diff_fixed = store
        .diffusion
        .as_ref()
        .ok_or(ModelFreeError::MissingDiffusionTensor)?
        .fixed;
    match (mf_all_fixed, diff_fixed) {
        (true, true) => Err(ModelFreeError::AllFixed),
        (true, false) => Ok(ParamSetType::Diff),
        (false, true) => Ok(ParamSetType::Mf),
        (false, false) => Ok(ParamSetType::All),
    }
}

/// The vector layout: diffusion parameters first, then each selected residue's model
/// parameters in residue order.
pub fn param_slots(
    store: &ModelFreeStore,
    set: ParamSetType,
    scope: Scope,
) -> Result<Vec<ParamSlot>, ModelFreeError> {
    let mut slots = Vec::new();
    if set.includes_diffusion() {
        let diffusion = store
            .diffusion
            .as_ref()
            .ok_or(ModelFreeError::MissingDiffusionTensor)?;
        slots.extend(diffusion.shape.params().iter().map(|&p| ParamSlot::Diffusion(p)));
    }
    if set.includes_residues() {
        for (id, residue) in store.selected().filter(|(id, _)| scope.admits(*id)) {
            slots.extend(residue.params.iter().map(|&p| ParamSlot::Residue(id, p)));
        }
    }
    Ok(slots)
}

pub fn param_num(
    store: &ModelFreeStore,
    set: ParamSetType,
    scope: Scope,
) -> Result<usize, ModelFreeError> {
    Ok(param_slots(store, set, scope)?.len())
}

/// Collects the current values (unset values read as zero) and the scaling of every slot.
pub fn assemble(
    store: &ModelFreeStore,
    set: ParamSetType,
    scope: Scope,
) -> Result<AssembledParams, ModelFreeError> {
    let mut assembled = AssembledParams {
        values: Vec::new(),
        scaling: Vec::new(),
        slots: Vec::new(),
    };
    let mut push = |slot: ParamSlot, value: f64, scale: f64| {
        assembled.slots.push(slot);
        assembled.values.push(value);
        assembled.scaling.push(scale);
    };
    if set.includes_diffusion() {
        let diffusion = store
            .diffusion
            .as_ref()
            .ok_or(ModelFreeError::MissingDiffusionTensor)?;
        for (&p, &value) in diffusion.shape.params().iter().zip(&diffusion.values) {
            push(ParamSlot::Diffusion(p), value, p.scaling());
        }
    }
    if set.includes_residues() {
        for (id, residue) in store.selected().filter(|(id, _)| scope.admits(*id)) {
            for &p in &residue.params {
                push(
                    ParamSlot::Residue(id, p),
                    residue.value(p).unwrap_or(0.0),
                    residue.scaling(p)?,
                );
            }
        }
    }
    Ok(assembled)
}

/// Writes a physical-unit vector back into the store. Exact inverse of [`assemble`].
pub fn disassemble(
    store: &mut ModelFreeStore,
    set: ParamSetType,
    scope: Scope,
    vector: &[f64],
) -> Result<(), ModelFreeError> {
    let slots = param_slots(store, set, scope)?;
    if slots.len() != vector.len() {
        return Err(ModelFreeError::LengthMismatch {
            expected: slots.len(),
            found: vector.len(),
        });
    }
    for (slot, &value) in slots.iter().zip(vector) {
        match *slot {
            ParamSlot::Diffusion(p) => {
                if let Some(diffusion) = store.diffusion.as_mut() {
                    if let Some(i) = diffusion.shape.params().iter().position(|q| *q == p) {
                        diffusion.values[i] = value;
                    }
                }
            }
            ParamSlot::Residue(id, p) => {
                if let Some(residue) = store.residue_mut(id) {
                    residue.set_value(p, value);
                }
            }
        }
    }
    Ok(())
}

/// Human-readable names of the vector positions, e.g. `tm` or `s2[12]`.
pub fn param_names(store: &ModelFreeStore, slots: &[ParamSlot]) -> Vec<String> {
    slots
        .iter()
        .map(|slot| match slot.residue().and_then(|id| store.residue(id)) {
            Some(residue) => format!("{}[{}]", slot.kind().name(), residue.number),
            None => slot.kind().name().to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model_free::params::{
        DiffusionTensor, RelaxationDatum, RelaxationKind, Residue, SpheroidType,
    };
    use approx::assert_relative_eq;

    fn datum(frq: f64) -> RelaxationDatum {
        RelaxationDatum {
            kind: RelaxationKind::R1,
            frq,
            value: 1.5,
            error: 0.05,
        }
    }

    fn store_with(diffusion: Option<DiffusionTensor>, models: &[&str]) -> ModelFreeStore {
        let mut store = ModelFreeStore::new(diffusion);
        for (i, model) in models.iter().enumerate() {
            let mut residue = Residue::new(i as i32 + 1, "ALA")
                .with_model(model)
                .unwrap()
                .with_data(vec![datum(600e6)]);
            residue.set_default_values();
            store.add_residue(residue);
        }
        store
    }

    #[test]
    fn param_set_type_follows_fixed_flags() {
        let store = store_with(Some(DiffusionTensor::sphere(1e-8)), &["m2", "m4"]);
        assert_eq!(determine_param_set_type(&store), Ok(ParamSetType::All));

        let store = store_with(Some(DiffusionTensor::sphere(1e-8).with_fixed(true)), &["m2"]);
        assert_eq!(determine_param_set_type(&store), Ok(ParamSetType::Mf));

        let mut store = store_with(Some(DiffusionTensor::sphere(1e-8)), &["m2"]);
        let ids: Vec<_> = store.residues().map(|(id, _)| id).collect();
        store.residue_mut(ids[0]).unwrap().fixed = true;
        assert_eq!(determine_param_set_type(&store), Ok(ParamSetType::Diff));

        store.diffusion = Some(DiffusionTensor::sphere(1e-8).with_fixed(true));
        assert_eq!(determine_param_set_type(&store), Err(ModelFreeError::AllFixed));
    }

    #[test]
    fn local_tm_must_be_all_or_nothing() {
        let store = store_with(None, &["tm1", "tm2"]);
        assert_eq!(determine_param_set_type(&store), Ok(ParamSetType::LocalTm));

        let store = store_with(None, &["tm1", "m2"]);
        assert_eq!(determine_param_set_type(&store), Err(ModelFreeError::MixedLocalTm));
    }

    #[test]
    fn unselected_residues_do_not_count_towards_mixing() {
        let mut store = store_with(None, &["tm1", "m2"]);
        let ids: Vec<_> = store.residues().map(|(id, _)| id).collect();
        store.residue_mut(ids[1]).unwrap().select = false;
        assert_eq!(determine_param_set_type(&store), Ok(ParamSetType::LocalTm));
    }

    #[test]
    fn missing_diffusion_tensor_is_reported() {
        let store = store_with(None, &["m1"]);
        assert_eq!(
            determine_param_set_type(&store),
            Err(ModelFreeError::MissingDiffusionTensor)
        );
    }

    #[test]
    fn assembly_puts_diffusion_first_then_residues_in_order() {
        let diffusion = DiffusionTensor::spheroid(1.5e7, 2.5e7, 0.4, 1.2, SpheroidType::Prolate);
        let store = store_with(Some(diffusion), &["m2", "m3"]);
        let assembled = assemble(&store, ParamSetType::All, Scope::AllResidues).unwrap();
        let names = param_names(&store, &assembled.slots);
        assert_eq!(
            names,
            vec!["Dper", "Dpar", "theta", "phi", "s2[1]", "te[1]", "s2[2]", "rex[2]"]
        );
        assert_eq!(&assembled.values[..4], &[1.5e7, 2.5e7, 0.4, 1.2]);
        assert_eq!(
            &assembled.scaling[..7],
            &[1e9, 1e9, 1.0, 1.0, 1.0, 1e-9, 1.0]
        );
        let rex_scale = 1.0 / (2.0 * std::f64::consts::PI * 600e6).powi(2);
        assert_eq!(assembled.scaling[7], rex_scale);
        assert_eq!(
            assembled.len(),
            param_num(&store, ParamSetType::All, Scope::AllResidues).unwrap()
        );
    }

    #[test]
    fn disassemble_inverts_assemble() {
        let mut store = store_with(Some(DiffusionTensor::sphere(9e-9)), &["m5", "m8"]);
        let assembled = assemble(&store, ParamSetType::All, Scope::AllResidues).unwrap();
        let mut changed = assembled.values.clone();
        for (i, value) in changed.iter_mut().enumerate() {
            *value *= 1.0 + 0.01 * i as f64;
        }
        disassemble(&mut store, ParamSetType::All, Scope::AllResidues, &changed).unwrap();
        let again = assemble(&store, ParamSetType::All, Scope::AllResidues).unwrap();
        assert_eq!(again.values, changed);
        assert_eq!(
            store.diffusion.as_ref().unwrap().value(DiffParam::Tm),
            Some(9e-9)
        );
    }

    #[test]
    fn disassemble_rejects_wrong_length() {
        let mut store = store_with(Some(DiffusionTensor::sphere(9e-9)), &["m2"]);
        let err = disassemble(&mut store, ParamSetType::All, Scope::AllResidues, &[1.0]);
        assert_eq!(
            err,
            Err(ModelFreeError::LengthMismatch {
                expected: 3,
                found: 1
            })
        );
    }

    #[test]
    fn residue_scope_limits_the_vector() {
        let store = store_with(Some(DiffusionTensor::sphere(9e-9).with_fixed(true)), &["m2", "m4"]);
        let ids: Vec<_> = store.residues().map(|(id, _)| id).collect();
        let assembled = assemble(&store, ParamSetType::Mf, Scope::Residue(ids[1])).unwrap();
        assert_eq!(
            assembled.slots,
            vec![
                ParamSlot::Residue(ids[1], MfParam::S2),
                ParamSlot::Residue(ids[1], MfParam::Te),
                ParamSlot::Residue(ids[1], MfParam::Rex)
            ]
        );
    }

    #[test]
    fn unset_values_assemble_as_zero() {
        let mut store = ModelFreeStore::new(Some(DiffusionTensor::sphere(9e-9)));
        store.add_residue(Residue::new(1, "ALA").with_params(&[MfParam::S2]));
        let assembled = assemble(&store, ParamSetType::All, Scope::AllResidues).unwrap();
        assert_eq!(assembled.values, vec![9e-9, 0.0]);
        let scaled = assembled.scaled();
        assert_relative_eq!(scaled[0], 9.0, max_relative = 1e-12);
        assert_eq!(scaled[1], 0.0);
    }
}
