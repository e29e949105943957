//! # Optimisers
//!
//! The two stages of a fit, both driving an [`Objective`](super::target::Objective) over its
//! scaled parameter vector.
//!
//! - [`grid`] - exhaustive search over a regular grid, skipping points that violate the target's
//!   linear constraints
//! - [`levmar`] - Levenberg-Marquardt refinement through the `levenberg-marquardt` crate
//!
//! Both stages fill a [`FitResult`], so a caller can stop after either one.

pub mod grid;
pub mod levmar;

/// The outcome of a fit in optimisation units, with the bookkeeping of the optimiser.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    pub params: Vec<f64>,
    /// `params` multiplied by the target's scaling.
    pub physical: Vec<f64>,
    pub names: Vec<String>,
    pub chi2: f64,
    pub iterations: usize,
    pub function_count: usize,
    pub gradient_count: usize,
    pub hessian_count: usize,
    /// Set when the optimiser did not converge or the result violates a constraint.
    pub warning: Option<String>,
}

impl FitResult {
    /// The value of a named parameter in physical units.
    pub fn physical_value(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.physical[i])
    }
}
