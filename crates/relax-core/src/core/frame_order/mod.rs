//! # Frame Order
//!
//! Rigid-body motion models for two-domain systems and their second-degree frame-order
//! superoperators.
//!
//! ## Architecture
//!
//! - [`model`] - the closed set of model identities and everything derived from the identity
//!   alone (parameter names, counts, Sobol' dimensionality)
//! - [`params`] - named per-model parameter structs decoded from and encoded to flat vectors,
//!   plus the eigenframe construction
//! - [`matrix`] - the 9x9 `<R (x) R>` compilers
//! - [`sampling`] - Sobol' angles and the precomputed per-point inner rotations

pub mod matrix;
pub mod model;
pub mod params;
pub mod sampling;

use crate::core::sobol::SobolError;
use crate::core::utils::geometry::GeometryError;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FrameOrderError {
    #[error("Unknown frame-order model '{name}'")]
    UnknownModel { name: String },

    #[error("Model '{model}' expects {expected} parameters, got {found}")]
    ParameterCount {
        model: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Model '{model}' requires {what}")]
    MissingGeometry {
        model: &'static str,
        what: &'static str,
    },

    #[error("Parameter '{parameter}' of model '{model}' is out of its valid domain: {value}")]
    AngleOutOfDomain {
        model: &'static str,
        parameter: &'static str,
        value: f64,
    },

    #[error("Geometry error in model '{model}': {source}")]
    Geometry {
        model: &'static str,
        #[source]
        source: GeometryError,
    },

    #[error("Model '{model}' produced a non-finite chi-squared value")]
    NonFiniteChi2 { model: &'static str },

    #[error("Sobol' sampling failed: {source}")]
    Sobol {
        #[from]
        source: SobolError,
    },
}
