use super::{ParamLoadError, read_csv};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// One RDC or PCS measurement, `alignment,spin,value,error` with an optional `weight` column.
///
/// An empty or `nan` value marks the measurement as missing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ObservationRow {
    pub alignment: String,
    pub spin: String,
    pub value: Option<f64>,
    #[serde(default)]
    pub error: Option<f64>,
    #[serde(default)]
    pub weight: Option<f64>,
}

/// One point of a dispersion curve, `spin,frequency,nu_cpmg,r2eff,error`.
///
/// For spin-lock data the `nu_cpmg` column carries the spin-lock field `nu1`, the `r2eff`
/// column carries R1rho and an additional `theta` column gives the tilt angle in rad.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DispersionRow {
    pub spin: String,
    pub frequency: f64,
    #[serde(alias = "nu1")]
    pub nu_cpmg: f64,
    #[serde(alias = "r1rho")]
    pub r2eff: Option<f64>,
    #[serde(default)]
    pub error: Option<f64>,
    #[serde(default)]
    pub theta: Option<f64>,
}

pub fn load_observations(path: &Path) -> Result<Vec<ObservationRow>, ParamLoadError> {
    read_csv(path)
}

pub fn load_dispersion(path: &Path) -> Result<Vec<DispersionRow>, ParamLoadError> {
    read_csv(path)
}

/// Measured values indexed `[alignment][spin]`.
///
/// Entries without a measurement hold NaN, with no error and unit weight.
#[derive(Debug, Clone)]
pub struct ObservationGrid {
    pub values: Vec<Vec<f64>>,
    pub errors: Vec<Vec<Option<f64>>>,
    pub weights: Vec<Vec<f64>>,
}

impl ObservationGrid {
    pub fn missing(num_alignments: usize, num_spins: usize) -> Self {
        Self {
            values: vec![vec![f64::NAN; num_spins]; num_alignments],
            errors: vec![vec![None; num_spins]; num_alignments],
            weights: vec![vec![1.0; num_spins]; num_alignments],
        }
    }

    /// Places the rows of `path` into a grid ordered by the given alignment and spin IDs.
    pub fn from_rows(
        path: &Path,
        rows: &[ObservationRow],
        alignments: &[String],
        spins: &[String],
    ) -> Result<Self, ParamLoadError> {
        let align_index = index_of(alignments);
        let spin_index = index_of(spins);
        let mut grid = Self::missing(alignments.len(), spins.len());
        let mut seen = vec![vec![false; spins.len()]; alignments.len()];

        for row in rows {
            let &i = align_index.get(row.alignment.as_str()).ok_or_else(|| {
                ParamLoadError::invalid(path, format!("unknown alignment '{}'", row.alignment))
            })?;
            let &j = spin_index.get(row.spin.as_str()).ok_or_else(|| {
                ParamLoadError::invalid(path, format!("unknown spin '{}'", row.spin))
            })?;
            if seen[i][j] {
                return Err(ParamLoadError::invalid(
                    path,
                    format!("duplicate entry for alignment '{}', spin '{}'", row.alignment, row.spin),
                ));
            }
            seen[i][j] = true;
            grid.values[i][j] = row.value.unwrap_or(f64::NAN);
            grid.errors[i][j] = row.error;
            if let Some(weight) = row.weight {
                if weight <= 0.0 {
                    return Err(ParamLoadError::invalid(
                        path,
                        format!("weight of spin '{}' must be positive", row.spin),
                    ));
                }
                grid.weights[i][j] = weight;
            }
        }
        Ok(grid)
    }

    pub fn num_measured(&self) -> usize {
        self.values.iter().flatten().filter(|v| !v.is_nan()).count()
    }
}

/// A single measured point on a dispersion curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    /// `nu_cpmg` for CPMG data, the spin-lock field `nu1` for R1rho data, both in Hz.
    pub dispersion: f64,
    pub theta: Option<f64>,
    pub value: f64,
    pub error: f64,
}

/// Curves indexed `[spin][field]`, with each curve's points kept in file order.
pub type DispersionCurves = Vec<Vec<Vec<CurvePoint>>>;

/// Groups dispersion rows by spin and field.
///
/// Rows without a value are skipped. A frequency is matched to a field when they agree to a
/// relative 1e-6.
pub fn group_dispersion(
    path: &Path,
    rows: &[DispersionRow],
    spins: &[String],
    fields: &[f64],
) -> Result<DispersionCurves, ParamLoadError> {
    let spin_index = index_of(spins);
    let mut curves = vec![vec![Vec::new(); fields.len()]; spins.len()];

    for row in rows {
        let Some(value) = row.r2eff.filter(|v| !v.is_nan()) else {
            continue;
        };
        let &i = spin_index
            .get(row.spin.as_str())
            .ok_or_else(|| ParamLoadError::invalid(path, format!("unknown spin '{}'", row.spin)))?;
        let j = fields
            .iter()
            .position(|&f| (f - row.frequency).abs() <= 1e-6 * f.abs())
            .ok_or_else(|| {
                ParamLoadError::invalid(path, format!("frequency {} is not a listed field", row.frequency))
            })?;
        let error = row
            .error
            .filter(|e| *e > 0.0)
            .ok_or_else(|| {
                ParamLoadError::invalid(
                    path,
                    format!("spin '{}' at nu = {} needs a positive error", row.spin, row.nu_cpmg),
                )
            })?;
        curves[i][j].push(CurvePoint {
            dispersion: row.nu_cpmg,
            theta: row.theta,
            value,
            error,
        });
    }
    Ok(curves)
}

fn index_of(ids: &[String]) -> HashMap<&str, usize> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect()
}
