//! # relaxrs Core Library
//!
//! Numerical target functions for NMR relaxation analysis: frame-order rigid-body motion models
//! fitted to RDC and PCS data, relaxation-dispersion exchange models fitted to CPMG and R1rho
//! curves, and model-free spectral density models fitted to R1, R2 and NOE data.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture so that the mathematics can be tested in
//! isolation from the stateful optimisation machinery.
//!
//! - **[`core`]: The Foundation.** Stateless mathematics: rotation geometry, the Sobol' sequence,
//!   frame-order superoperators, alignment tensor reduction, RDC/PCS forward models, numerical
//!   integration, dispersion and model-free physics, and the model-free parameter-vector layout.
//!
//! - **[`engine`]: The Logic Core.** Target-function objects that own precomputed data and
//!   scratch buffers, the Sobol' point cache, configuration builders, and the optimisers (grid
//!   search and Levenberg-Marquardt) that drive the targets through the [`engine::target::Objective`]
//!   trait.
//!
//! - **[`workflows`]: The Public API.** Complete procedures built from the two layers below:
//!   a grid-search plus minimisation fit and Monte Carlo error analysis.

pub mod core;
pub mod engine;
pub mod workflows;
