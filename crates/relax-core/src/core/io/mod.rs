//! Reading problem descriptions and measured data from disk.
//!
//! A problem is described by a TOML dataset file ([`dataset`]) that names the model, the static
//! geometry and one or more CSV measurement tables ([`table`]). Relative table paths are resolved
//! against the directory of the dataset file.

pub mod dataset;
pub mod table;

use serde::de::DeserializeOwned;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParamLoadError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("CSV parsing error for '{path}': {source}")]
    Csv { path: String, source: csv::Error },
    #[error("TOML parsing error for '{path}': {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("Invalid content in '{path}': {reason}")]
    Invalid { path: String, reason: String },
}

impl ParamLoadError {
    pub(crate) fn invalid(path: &Path, reason: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.to_string_lossy().to_string(),
            reason: reason.into(),
        }
    }
}

pub(crate) fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ParamLoadError> {
    let content = std::fs::read_to_string(path).map_err(|e| ParamLoadError::Io {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;
    toml::from_str(&content).map_err(|e| ParamLoadError::Toml {
        path: path.to_string_lossy().to_string(),
        source: e,
    })
}

pub(crate) fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, ParamLoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| ParamLoadError::Csv {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;

    let mut records = Vec::new();
    for result in reader.deserialize::<T>() {
        let record = result.map_err(|e| ParamLoadError::Csv {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        records.push(record);
    }
    Ok(records)
}
