//! Grid-search bounds and linear constraints for the model-free parameter vector.
//!
//! Both are expressed in optimisation units: physical bounds are divided by the scaling of the
//! parameter they apply to.

use super::ModelFreeError;
use super::params::{DiffParam, DiffusionShape, MfParam, ModelFreeStore, Residue, SpheroidType};
use super::vector::{AssembledParams, ParamSlot};
use crate::core::utils::bounds::{GridAxis, LinearConstraints, grid_size};
use std::f64::consts::PI;

/// The largest grid the search will enumerate.
pub const MAX_GRID_POINTS: usize = i32::MAX as usize;

/// Increments per grid dimension: one shared count or one per parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Increments {
    Uniform(usize),
    PerParam(Vec<usize>),
}

/// Physical-unit grid bounds of a parameter.
fn default_bounds(slot: &ParamSlot, residue: Option<&Residue>) -> Result<(f64, f64), ModelFreeError> {
    let bounds = match *slot {
        ParamSlot::Diffusion(DiffParam::Tm) => (1e-9, 10e-9),
        ParamSlot::Diffusion(
            DiffParam::Dper | DiffParam::Dpar | DiffParam::Dx | DiffParam::Dy | DiffParam::Dz,
        ) => (0.0, 10e9),
        ParamSlot::Diffusion(
            DiffParam::Theta | DiffParam::Phi | DiffParam::Alpha | DiffParam::Beta | DiffParam::Gamma,
        ) => (0.0, 2.0 * PI),
        ParamSlot::Residue(_, MfParam::LocalTm) => (1e-9, 10e-9),
        ParamSlot::Residue(_, MfParam::S2 | MfParam::S2f | MfParam::S2s) => (0.0, 1.0),
        ParamSlot::Residue(_, MfParam::Te | MfParam::Tf | MfParam::Ts) => (0.0, 5000e-12),
        ParamSlot::Residue(_, MfParam::Rex) => {
            let frq = residue.and_then(|r| r.first_frequency()).ok_or(
                ModelFreeError::MissingFrequency {
                    residue: residue.map_or(-1, |r| r.number),
                },
            )?;
            (0.0, 5.0 / (2.0 * PI * frq).powi(2))
        }
        ParamSlot::Residue(_, MfParam::R) => (1.0e-10, 1.05e-10),
        ParamSlot::Residue(_, MfParam::Csa) => (-120e-6, -200e-6),
    };
    Ok(bounds)
}

/// Sets up the grid search over the assembled vector.
///
/// `lower` and `upper` override individual physical bounds where an entry is `Some`. The
/// returned axes are in optimisation units.
pub fn grid_search_setup(
    store: &ModelFreeStore,
    assembled: &AssembledParams,
    inc: &Increments,
    lower: Option<&[Option<f64>]>,
    upper: Option<&[Option<f64>]>,
) -> Result<Vec<GridAxis>, ModelFreeError> {
    let n = assembled.len();
    if n == 0 {
        return Err(ModelFreeError::NoParameters);
    }
    for overrides in [lower, upper].into_iter().flatten() {
        if overrides.len() != n {
            return Err(ModelFreeError::GridOptionCount {
                expected: n,
                found: overrides.len(),
            });
        }
    }
    let increments = match inc {
        Increments::Uniform(inc) => vec![*inc; n],
        Increments::PerParam(incs) if incs.len() == n => incs.clone(),
        Increments::PerParam(incs) => {
            return Err(ModelFreeError::GridOptionCount {
                expected: n,
                found: incs.len(),
            });
        }
    };

    let mut axes = Vec::with_capacity(n);
    for (j, slot) in assembled.slots.iter().enumerate() {
        let residue = slot.residue().and_then(|id| store.residue(id));
        let (mut lo, mut hi) = default_bounds(slot, residue)?;
        if let Some(value) = lower.and_then(|l| l[j]) {
            lo = value;
        }
        if let Some(value) = upper.and_then(|u| u[j]) {
            hi = value;
        }
        let scale = assembled.scaling[j];
        axes.push(GridAxis::new(increments[j], lo / scale, hi / scale));
    }

    match grid_size(&axes) {
        Some(points) if points <= MAX_GRID_POINTS => Ok(axes),
        _ => Err(ModelFreeError::GridTooLarge {
            points: increments.iter().map(|&i| i as f64).product(),
            max: MAX_GRID_POINTS,
        }),
    }
}

/// The linear constraints `A x >= b` over the assembled vector.
pub fn linear_constraints(store: &ModelFreeStore, assembled: &AssembledParams) -> LinearConstraints {
    let n = assembled.len();
    let mut rows: Vec<(Vec<(usize, f64)>, f64)> = Vec::new();
    let scale = |i: usize| assembled.scaling[i];

    let mut i = 0;
    while i < n {
        match assembled.slots[i] {
            ParamSlot::Diffusion(param) => {
                if param == DiffParam::Tm || param.is_rate() {
                    rows.push((vec![(i, 1.0)], 0.0));
                }
                if param == DiffParam::Dpar {
                    if let Some(diffusion) = &store.diffusion {
                        match diffusion.shape {
                            DiffusionShape::Spheroid(SpheroidType::Oblate) => {
                                rows.push((vec![(i - 1, 1.0), (i, -1.0)], 0.0));
                            }
                            DiffusionShape::Spheroid(SpheroidType::Prolate) => {
                                rows.push((vec![(i - 1, -1.0), (i, 1.0)], 0.0));
                            }
                            _ => {}
                        }
                    }
                }
                i += 1;
            }
            ParamSlot::Residue(id, _) => {
                // One residue block at a time so that pairwise rows can find their partner.
                let start = i;
                while i < n && assembled.slots[i].residue() == Some(id) {
                    i += 1;
                }
                residue_constraints(&assembled.slots[start..i], start, &scale, &mut rows);
            }
        }
    }
    LinearConstraints::from_rows(n, &rows)
}

fn residue_constraints(
    block: &[ParamSlot],
    offset: usize,
    scale: &dyn Fn(usize) -> f64,
    rows: &mut Vec<(Vec<(usize, f64)>, f64)>,
) {
    let position = |wanted: MfParam| {
        block
            .iter()
            .position(|slot| matches!(slot, ParamSlot::Residue(_, p) if *p == wanted))
            .map(|k| offset + k)
    };
    let mut range = |i: usize, lo: f64, hi: f64| {
        rows.push((vec![(i, 1.0)], lo / scale(i)));
        rows.push((vec![(i, -1.0)], -hi / scale(i)));
    };

    let mut zero_bounded = Vec::new();
    for (k, slot) in block.iter().enumerate() {
        let i = offset + k;
        let ParamSlot::Residue(_, param) = *slot else {
            continue;
        };
        match param {
            MfParam::S2 | MfParam::S2f | MfParam::S2s => {
                range(i, 0.0, 1.0);
                if param == MfParam::S2 {
                    for partner in [MfParam::S2f, MfParam::S2s] {
                        if let Some(m) = position(partner) {
                            zero_bounded.push(vec![(i, -1.0), (m, 1.0)]);
                        }
                    }
                }
            }
            MfParam::Te | MfParam::Tf | MfParam::Ts => {
                range(i, 0.0, 10e-9);
                if param == MfParam::Ts {
                    if let Some(m) = position(MfParam::Tf) {
                        zero_bounded.push(vec![(i, 1.0), (m, -1.0)]);
                    }
                }
            }
            MfParam::R => range(i, 0.9e-10, 2e-10),
            MfParam::Csa => range(i, -300e-6, 0.0),
            MfParam::Rex | MfParam::LocalTm => {
                zero_bounded.push(vec![(i, 1.0)]);
            }
        }
    }
    rows.extend(zero_bounded.into_iter().map(|coefficients| (coefficients, 0.0)));
}
