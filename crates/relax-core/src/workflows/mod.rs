//! # Workflows Module
//!
//! Complete fitting procedures assembled from the engine's targets and optimisers.
//!
//! ## Overview
//!
//! A workflow takes a constructed target and the run configuration, drives every phase of the
//! procedure and reports progress through a [`ProgressReporter`](crate::engine::progress::ProgressReporter).
//! Callers that need finer control use the optimisers in [`crate::engine::optimizer`] directly.
//!
//! ## Architecture
//!
//! - **Fit** ([`fit`]) - grid search followed by Levenberg-Marquardt minimisation
//! - **Monte Carlo** ([`monte_carlo`]) - parameter errors from refitting synthetic data, one target
//!   clone per replicate, run on rayon when the `parallel` feature is enabled

pub mod fit;
pub mod monte_carlo;
