use nalgebra::{DMatrix, DVector};

/// One dimension of a grid search, in optimisation (scaled) units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridAxis {
    pub inc: usize,
    pub lower: f64,
    pub upper: f64,
}

impl GridAxis {
    pub fn new(inc: usize, lower: f64, upper: f64) -> Self {
        Self { inc, lower, upper }
    }

    /// The `inc` evenly spaced values from `lower` to `upper` inclusive. A single increment
    /// sits on the lower bound.
    pub fn values(&self) -> Vec<f64> {
        match self.inc {
            0 => Vec::new(),
            1 => vec![self.lower],
            n => {
                let step = (self.upper - self.lower) / (n - 1) as f64;
                (0..n).map(|i| self.lower + step * i as f64).collect()
            }
        }
    }
}

/// The number of grid points, or `None` when the product overflows.
pub fn grid_size(axes: &[GridAxis]) -> Option<usize> {
    axes.iter()
        .try_fold(1usize, |acc, axis| acc.checked_mul(axis.inc))
}

/// Linear inequality constraints `A x >= b` in optimisation units.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraints {
    pub a: DMatrix<f64>,
    pub b: DVector<f64>,
}

impl LinearConstraints {
    /// Builds the matrices from sparse rows of `(column, coefficient)` pairs.
    pub fn from_rows(n_params: usize, rows: &[(Vec<(usize, f64)>, f64)]) -> Self {
        let mut a = DMatrix::zeros(rows.len(), n_params);
        let mut b = DVector::zeros(rows.len());
        for (j, (coefficients, bound)) in rows.iter().enumerate() {
            for &(i, coefficient) in coefficients {
                a[(j, i)] = coefficient;
            }
            b[j] = *bound;
        }
        Self { a, b }
    }

    pub fn unconstrained(n_params: usize) -> Self {
        Self {
            a: DMatrix::zeros(0, n_params),
            b: DVector::zeros(0),
        }
    }

    pub fn len(&self) -> usize {
        self.b.len()
    }

    pub fn is_empty(&self) -> bool {
        self.b.is_empty()
    }

    /// Indices of the rows violated by `x`.
    pub fn violations(&self, x: &[f64]) -> Vec<usize> {
        let x = DVector::from_column_slice(x);
        let lhs = &self.a * x;
        (0..self.len()).filter(|&j| lhs[j] < self.b[j]).collect()
    }

    pub fn is_satisfied(&self, x: &[f64]) -> bool {
        self.violations(x).is_empty()
    }
}
