//! # Engine Module
//!
//! The stateful layer of relaxrs: validated configuration, the chi-squared targets built from it
//! and the optimisers that drive them.
//!
//! ## Overview
//!
//! Everything in [`crate::core`] is a pure function of its arguments. The engine owns the state
//! those functions need across millions of evaluations: masked measurement arrays, precomputed
//! physical constants, Sobol' point sets and scratch buffers. A target is built once per
//! optimisation run and evaluated many times.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - builders for frame-order, dispersion, optimisation and
//!   Monte Carlo settings
//! - **Targets** ([`target`]) - the [`target::Objective`] protocol and its three implementations
//! - **Optimisers** ([`optimizer`]) - grid search and Levenberg-Marquardt refinement
//! - **Caching** ([`cache`]) - the shared Sobol' point store
//! - **Progress Monitoring** ([`progress`]) - callbacks for long-running phases
//! - **Error Handling** ([`error`]) - the aggregated [`error::EngineError`]

pub mod cache;
pub mod config;
pub mod error;
pub mod optimizer;
pub mod progress;
pub mod target;
