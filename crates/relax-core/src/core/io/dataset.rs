use super::table::{
    DispersionCurves, ObservationGrid, group_dispersion, load_dispersion, load_observations,
};
use super::{ParamLoadError, read_toml};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

fn default_true() -> bool {
    true
}

fn default_isotope() -> String {
    "15N".to_string()
}

fn default_bond_length() -> f64 {
    1.02
}

/// A frame-order problem: the model, the static geometry, the alignment media and the spins.
///
/// Positions are in Angstrom, bond lengths in Angstrom, temperatures in K and spectrometer
/// frequencies in Hz.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrameOrderDataset {
    pub model: String,
    #[serde(default)]
    pub pivot: Option<[f64; 3]>,
    #[serde(default)]
    pub pivot_opt: bool,
    #[serde(default)]
    pub paramag_centre: [f64; 3],
    #[serde(default)]
    pub centre_of_mass: Option<[f64; 3]>,
    /// The point the moving domain is rotated about to reach its average position. Defaults to
    /// the centre of mass, or the origin when that is absent too.
    #[serde(default)]
    pub ave_pos_pivot: Option<[f64; 3]>,
    pub alignments: Vec<AlignmentEntry>,
    pub spins: Vec<SpinEntry>,
    #[serde(default)]
    pub rdc: Option<PathBuf>,
    #[serde(default)]
    pub pcs: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlignmentEntry {
    pub id: String,
    /// `{Axx, Ayy, Axy, Axz, Ayz}`.
    pub tensor: [f64; 5],
    #[serde(default = "default_true")]
    pub full_in_ref_frame: bool,
    pub temperature: f64,
    pub frequency: f64,
}

/// A coordinate triple, or one triple per structure of an ensemble.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Coordinates {
    Single([f64; 3]),
    Ensemble(Vec<[f64; 3]>),
}

impl Coordinates {
    pub fn structures(&self) -> &[[f64; 3]] {
        match self {
            Self::Single(xyz) => std::slice::from_ref(xyz),
            Self::Ensemble(structures) => structures,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpinEntry {
    pub id: String,
    /// The atomic position, needed for PCS data.
    #[serde(default)]
    pub position: Option<Coordinates>,
    /// The bond vector to the attached proton, needed for RDC data. It need not be normalised.
    #[serde(default)]
    pub vector: Option<Coordinates>,
    #[serde(default = "default_isotope")]
    pub isotope: String,
    #[serde(default = "default_bond_length")]
    pub bond_length: f64,
}

/// A frame-order dataset together with its measurement tables.
#[derive(Debug, Clone)]
pub struct FrameOrderInput {
    pub dataset: FrameOrderDataset,
    pub rdc: Option<ObservationGrid>,
    pub pcs: Option<ObservationGrid>,
}

impl FrameOrderDataset {
    pub fn load(path: &Path) -> Result<FrameOrderInput, ParamLoadError> {
        let dataset: Self = read_toml(path)?;
        check_unique(path, "alignment", dataset.alignments.iter().map(|a| a.id.as_str()))?;
        check_unique(path, "spin", dataset.spins.iter().map(|s| s.id.as_str()))?;
        if dataset.rdc.is_none() && dataset.pcs.is_none() {
            return Err(ParamLoadError::invalid(path, "no RDC or PCS table is given"));
        }

        let alignments = dataset.alignment_ids();
        let spins = dataset.spin_ids();
        let grid = |table: &Option<PathBuf>| -> Result<Option<ObservationGrid>, ParamLoadError> {
            table
                .as_ref()
                .map(|table| {
                    let table = resolve(path, table);
                    let rows = load_observations(&table)?;
                    ObservationGrid::from_rows(&table, &rows, &alignments, &spins)
                })
                .transpose()
        };
        let rdc = grid(&dataset.rdc)?;
        let pcs = grid(&dataset.pcs)?;
        Ok(FrameOrderInput { dataset, rdc, pcs })
    }

    pub fn alignment_ids(&self) -> Vec<String> {
        self.alignments.iter().map(|a| a.id.clone()).collect()
    }

    pub fn spin_ids(&self) -> Vec<String> {
        self.spins.iter().map(|s| s.id.clone()).collect()
    }
}

/// A relaxation-dispersion problem for one cluster of spins.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispersionDataset {
    pub model: String,
    #[serde(default = "default_isotope")]
    pub isotope: String,
    /// Proton spectrometer frequencies in Hz.
    pub fields: Vec<f64>,
    pub spins: Vec<String>,
    pub data: PathBuf,
    /// Longitudinal rates indexed `[spin][field]`, needed for R1rho models.
    #[serde(default)]
    pub r1: Option<Vec<Vec<f64>>>,
}

#[derive(Debug, Clone)]
pub struct DispersionInput {
    pub dataset: DispersionDataset,
    pub curves: DispersionCurves,
}

impl DispersionDataset {
    pub fn load(path: &Path) -> Result<DispersionInput, ParamLoadError> {
        let dataset: Self = read_toml(path)?;
        check_unique(path, "spin", dataset.spins.iter().map(String::as_str))?;
        if dataset.fields.is_empty() {
            return Err(ParamLoadError::invalid(path, "at least one field is required"));
        }
        if let Some(r1) = &dataset.r1 {
            let shaped = r1.len() == dataset.spins.len()
                && r1.iter().all(|row| row.len() == dataset.fields.len());
            if !shaped {
                return Err(ParamLoadError::invalid(path, "r1 must be indexed [spin][field]"));
            }
        }

        let table = resolve(path, &dataset.data);
        let rows = load_dispersion(&table)?;
        let curves = group_dispersion(&table, &rows, &dataset.spins, &dataset.fields)?;
        Ok(DispersionInput { dataset, curves })
    }
}

fn resolve(dataset_path: &Path, table: &Path) -> PathBuf {
    if table.is_absolute() {
        return table.to_path_buf();
    }
    dataset_path
        .parent()
        .map(|dir| dir.join(table))
        .unwrap_or_else(|| table.to_path_buf())
}

fn check_unique<'a>(
    path: &Path,
    what: &str,
    ids: impl Iterator<Item = &'a str>,
) -> Result<(), ParamLoadError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(ParamLoadError::invalid(path, format!("duplicate {what} id '{id}'")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const FRAME_ORDER_TOML: &str = r#"
        model = "iso_cone"
        pivot = [37.254, 0.5, 16.7465]
        paramag_centre = [1.0, 2.0, 3.0]
        centre_of_mass = [40.0, 0.0, 15.0]
        pcs = "pcs.csv"

        [[alignments]]
        id = "tb"
        tensor = [1.2e-4, -0.4e-4, 0.3e-4, -0.7e-4, 0.15e-4]
        temperature = 298.0
        frequency = 600e6

        [[alignments]]
        id = "dy"
        tensor = [-2.0e-4, 1.0e-4, 0.0, 0.2e-4, -0.1e-4]
        full_in_ref_frame = false
        temperature = 303.0
        frequency = 800e6

        [[spins]]
        id = "N1"
        position = [10.0, 0.0, 0.0]
        vector = [0.0, 0.0, 1.0]

        [[spins]]
        id = "C2"
        position = [[12.0, 1.0, -3.0], [12.5, 0.5, -3.0]]
        isotope = "13C"
        bond_length = 1.09
    "#;

    #[test]
    fn frame_order_dataset_loads_with_relative_tables() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("problem.toml");
        fs::write(&file_path, FRAME_ORDER_TOML).unwrap();
        fs::write(
            dir.path().join("pcs.csv"),
            "alignment,spin,value,error\ntb,N1,0.25,0.1\ndy,C2,-0.75,\n",
        )
        .unwrap();

        let input = FrameOrderDataset::load(&file_path).unwrap();
        let dataset = &input.dataset;
        assert_eq!(dataset.model, "iso_cone");
        assert!(!dataset.pivot_opt);
        assert_eq!(dataset.ave_pos_pivot, None);
        assert!(dataset.alignments[0].full_in_ref_frame);
        assert!(!dataset.alignments[1].full_in_ref_frame);
        assert_eq!(dataset.spins[0].isotope, "15N");
        assert_eq!(dataset.spins[0].bond_length, 1.02);
        assert_eq!(dataset.spins[1].vector, None);
        assert_eq!(
            dataset.spins[0].position,
            Some(Coordinates::Single([10.0, 0.0, 0.0]))
        );
        let ensemble = dataset.spins[1].position.as_ref().unwrap().structures();
        assert_eq!(ensemble, &[[12.0, 1.0, -3.0], [12.5, 0.5, -3.0]]);

        assert!(input.rdc.is_none());
        let pcs = input.pcs.unwrap();
        assert_eq!(pcs.values[0][0], 0.25);
        assert_eq!(pcs.values[1][1], -0.75);
        assert!(pcs.values[0][1].is_nan());
    }

    #[test]
    fn frame_order_dataset_rejects_unknown_keys() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("problem.toml");
        fs::write(&file_path, format!("unknown_key = 1\n{FRAME_ORDER_TOML}")).unwrap();
        let result = FrameOrderDataset::load(&file_path);
        assert!(matches!(result, Err(ParamLoadError::Toml { .. })));
    }

    #[test]
    fn frame_order_dataset_requires_a_table() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("problem.toml");
        fs::write(&file_path, FRAME_ORDER_TOML.replace("pcs = \"pcs.csv\"", "")).unwrap();
        let result = FrameOrderDataset::load(&file_path);
        assert!(matches!(result, Err(ParamLoadError::Invalid { .. })));
    }

    #[test]
    fn frame_order_dataset_reports_a_missing_table() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("problem.toml");
        fs::write(&file_path, FRAME_ORDER_TOML).unwrap();
        let result = FrameOrderDataset::load(&file_path);
        assert!(matches!(result, Err(ParamLoadError::Csv { .. })));
    }

    #[test]
    fn dispersion_dataset_loads_curves() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("cluster.toml");
        fs::write(
            &file_path,
            r#"
            model = "CR72"
            fields = [600e6, 800e6]
            spins = ["N1"]
            data = "cpmg.csv"
            "#,
        )
        .unwrap();
        fs::write(
            dir.path().join("cpmg.csv"),
            "spin,frequency,nu_cpmg,r2eff,error\nN1,600e6,50,12.0,0.2\nN1,800e6,50,14.0,0.2\n",
        )
        .unwrap();

        let input = DispersionDataset::load(&file_path).unwrap();
        assert_eq!(input.dataset.isotope, "15N");
        assert_eq!(input.curves[0][0][0].value, 12.0);
        assert_eq!(input.curves[0][1][0].value, 14.0);
    }

    #[test]
    fn dispersion_dataset_checks_r1_shape() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("cluster.toml");
        fs::write(
            &file_path,
            r#"
            model = "DPL94"
            fields = [600e6]
            spins = ["N1", "N2"]
            data = "r1rho.csv"
            r1 = [[1.5]]
            "#,
        )
        .unwrap();
        let result = DispersionDataset::load(&file_path);
        assert!(matches!(result, Err(ParamLoadError::Invalid { .. })));
    }

    #[test]
    fn duplicate_spin_ids_are_rejected() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("cluster.toml");
        fs::write(
            &file_path,
            "model = \"LM63\"\nfields = [600e6]\nspins = [\"N1\", \"N1\"]\ndata = \"x.csv\"\n",
        )
        .unwrap();
        let result = DispersionDataset::load(&file_path);
        assert!(matches!(result, Err(ParamLoadError::Invalid { .. })));
    }
}
