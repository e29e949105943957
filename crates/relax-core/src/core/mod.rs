//! # Core Module
//!
//! Stateless mathematical building blocks shared by every target function in relaxrs.
//!
//! ## Overview
//!
//! Nothing in this module owns mutable state between calls. Target-function objects in
//! [`crate::engine`] combine these pieces and keep their own scratch buffers.
//!
//! ## Architecture
//!
//! - **Geometry** ([`utils`]) - z-y-z Euler rotations, spherical coordinates, Kronecker products
//! - **Quasi-random sampling** ([`sobol`]) - the Sobol' low-discrepancy sequence
//! - **Frame order** ([`frame_order`]) - model identities, parameter layouts, 9x9 superoperators
//!   and the per-point Sobol' rotations
//! - **Alignment** ([`alignment`]) - 5D/3x3 tensor conversion, reduction and frame rotation
//! - **Observables** ([`observables`]) - RDC and PCS forward models with their physical constants
//! - **Integration** ([`integration`]) - Sobol' and adaptive Gauss-Kronrod PCS averaging
//! - **Dispersion** ([`dispersion`]) - LM63, CR72 and DPL94 exchange models
//! - **Model-free** ([`model_free`]) - spectral densities, relaxation rates and the parameter
//!   vector layout with its scaling, grid bounds and linear constraints
//! - **Model selection** ([`modsel`]) - AIC, AICc and BIC
//! - **File I/O** ([`io`]) - TOML dataset descriptions and CSV measurement tables
//!
//! ## Conventions
//!
//! - Rotations follow the active z-y-z Euler convention of [`utils::geometry::euler_to_r_zyz`]
//!   everywhere.
//! - Atomic positions are in Angstrom. The PCS is reported in ppm and the RDC in Hz.
//! - Second-degree frame-order matrices act on row-major flattened 3x3 tensors.

pub mod alignment;
pub mod dispersion;
pub mod frame_order;
pub mod integration;
pub mod io;
pub mod model_free;
pub mod modsel;
pub mod observables;
pub mod sobol;
pub mod utils;
