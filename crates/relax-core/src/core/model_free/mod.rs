//! Model-free analysis of heteronuclear relaxation data.
//!
//! ## Overview
//!
//! Internal bond-vector motion is described by Lipari-Szabo order parameters and correlation
//! times layered on top of the global rotational diffusion of the molecule. This module holds
//! the pieces that do not depend on an optimiser:
//!
//! - [`params`] - the residue and diffusion-tensor store with parameter defaults and scaling
//! - [`vector`] - assembly of the store into a flat parameter vector and back
//! - [`bounds`] - grid-search bounds and the linear constraints `A x >= b`
//! - [`spectral`] - spectral density functions and their derivatives
//! - [`relaxation`] - R1, R2 and NOE from the spectral densities

pub mod bounds;
pub mod params;
pub mod relaxation;
pub mod spectral;
pub mod vector;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ModelFreeError {
    #[error("Unknown model-free parameter '{name}'")]
    UnknownParameter { name: String },

    #[error("Unknown model-free model '{name}'")]
    UnknownModel { name: String },

    #[error("The local tm parameter must be present in all or none of the selected residues")]
    MixedLocalTm,

    #[error("All parameters are fixed")]
    AllFixed,

    #[error("A diffusion tensor is required when residues do not carry a local tm")]
    MissingDiffusionTensor,

    #[error("Residue {residue} has Rex but no relaxation data to fix its spectrometer frequency")]
    MissingFrequency { residue: i32 },

    #[error("Parameter vector length mismatch: expected {expected}, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("There are no parameters to optimise")]
    NoParameters,

    #[error("The grid of {points} points exceeds the maximum of {max}")]
    GridTooLarge { points: f64, max: usize },

    #[error("Grid options have {found} entries for {expected} parameters")]
    GridOptionCount { expected: usize, found: usize },

    #[error("{diffusion} diffusion is not supported by the model-free target")]
    UnsupportedDiffusion { diffusion: &'static str },
}
