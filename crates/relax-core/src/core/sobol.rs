//! Sobol' low-discrepancy sequence in up to ten dimensions.
//!
//! Points are produced with the Antonov-Saleev Gray-code recurrence on 32-bit direction numbers.
//! The first dimension is the van der Corput sequence and dimensions 2 to 10 use the Joe-Kuo
//! primitive polynomials and initial direction numbers. The output is deterministic for a given
//! `(dimensions, count, skip)` triple but is not bit-compatible with the Fortran/Python `i4_sobol`
//! routines, whose direction number tables differ.

use thiserror::Error;

pub const MAX_DIMENSIONS: usize = 10;

const BITS: usize = 32;
const SCALE: f64 = 1.0 / 4_294_967_296.0;

/// The default number of leading points discarded before sampling.
pub const DEFAULT_SKIP: u64 = 1000;

struct PolynomialSpec {
    degree: u32,
    coefficients: u32,
    initial: &'static [u32],
}

static JOE_KUO: [PolynomialSpec; MAX_DIMENSIONS - 1] = [
    PolynomialSpec { degree: 1, coefficients: 0, initial: &[1] },
    PolynomialSpec { degree: 2, coefficients: 1, initial: &[1, 3] },
    PolynomialSpec { degree: 3, coefficients: 1, initial: &[1, 3, 1] },
    PolynomialSpec { degree: 3, coefficients: 2, initial: &[1, 1, 1] },
    PolynomialSpec { degree: 4, coefficients: 1, initial: &[1, 1, 3, 3] },
    PolynomialSpec { degree: 4, coefficients: 4, initial: &[1, 3, 5, 13] },
    PolynomialSpec { degree: 5, coefficients: 2, initial: &[1, 1, 5, 5, 17] },
    PolynomialSpec { degree: 5, coefficients: 4, initial: &[1, 1, 5, 5, 5] },
    PolynomialSpec { degree: 5, coefficients: 7, initial: &[1, 1, 7, 11, 19] },
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SobolError {
    #[error("Sobol' sequence supports 1 to {max} dimensions, {requested} requested")]
    UnsupportedDimensions { requested: usize, max: usize },
    #[error("Sobol' sequence exhausted: skip {skip} plus {count} points exceeds 2^32")]
    Exhausted { skip: u64, count: u64 },
}

/// A stateful Sobol' point stream.
#[derive(Debug, Clone)]
pub struct SobolSequence {
    directions: Vec<[u32; BITS]>,
    state: Vec<u32>,
    index: u64,
}

impl SobolSequence {
    pub fn new(dimensions: usize) -> Result<Self, SobolError> {
        if dimensions == 0 || dimensions > MAX_DIMENSIONS {
            return Err(SobolError::UnsupportedDimensions {
                requested: dimensions,
                max: MAX_DIMENSIONS,
            });
        }

        let mut directions = Vec::with_capacity(dimensions);
        directions.push(van_der_corput_directions());
        for spec in JOE_KUO.iter().take(dimensions - 1) {
            directions.push(polynomial_directions(spec));
        }

        Ok(Self {
            directions,
            state: vec![0; dimensions],
            index: 0,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.directions.len()
    }

    /// Jumps directly to point `index` using its Gray code.
    pub fn seek(&mut self, index: u64) -> Result<(), SobolError> {
        if index >= 1 << BITS {
            return Err(SobolError::Exhausted { skip: index, count: 0 });
        }
        let gray = index ^ (index >> 1);
        for (value, v) in self.state.iter_mut().zip(&self.directions) {
            *value = (0..BITS)
                .filter(|bit| gray >> bit & 1 == 1)
                .fold(0, |acc, bit| acc ^ v[bit]);
        }
        self.index = index;
        Ok(())
    }

    /// Writes the current point into `out` and advances the stream.
    pub fn next_into(&mut self, out: &mut [f64]) -> Result<(), SobolError> {
        if self.index >= (1 << BITS) - 1 {
            return Err(SobolError::Exhausted {
                skip: self.index,
                count: 1,
            });
        }
        for (slot, value) in out.iter_mut().zip(&self.state) {
            *slot = f64::from(*value) * SCALE;
        }
        let bit = self.index.trailing_ones() as usize;
        for (value, v) in self.state.iter_mut().zip(&self.directions) {
            *value ^= v[bit];
        }
        self.index += 1;
        Ok(())
    }
}

fn van_der_corput_directions() -> [u32; BITS] {
    std::array::from_fn(|k| 1u32 << (BITS - 1 - k))
}

fn polynomial_directions(spec: &PolynomialSpec) -> [u32; BITS] {
    let s = spec.degree as usize;
    let mut v = [0u32; BITS];
    for (k, m) in spec.initial.iter().enumerate() {
        v[k] = *m << (BITS - 1 - k);
    }
    for k in s..BITS {
        let mut value = v[k - s] ^ (v[k - s] >> s);
        for j in 1..s {
            if (spec.coefficients >> (s - 1 - j)) & 1 == 1 {
                value ^= v[k - j];
            }
        }
        v[k] = value;
    }
    v
}

/// Generates `count` points of a `dimensions`-dimensional Sobol' sequence after discarding the
/// first `skip` points.
///
/// The result is laid out as `dimensions` rows of `count` values, each in `[0, 1)`.
pub fn generate(dimensions: usize, count: usize, skip: u64) -> Result<Vec<Vec<f64>>, SobolError> {
    let mut sequence = SobolSequence::new(dimensions)?;
    let total = skip.saturating_add(count as u64);
    if total >= 1 << BITS {
        return Err(SobolError::Exhausted {
            skip,
            count: count as u64,
        });
    }
    sequence.seek(skip)?;

    let mut rows = vec![Vec::with_capacity(count); dimensions];
    let mut point = vec![0.0; dimensions];
    for _ in 0..count {
        sequence.next_into(&mut point)?;
        for (row, value) in rows.iter_mut().zip(&point) {
            row.push(*value);
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_dimension_is_van_der_corput() {
        let points = generate(1, 8, 0).unwrap();
        assert_eq!(
            points[0],
            vec![0.0, 0.5, 0.75, 0.25, 0.375, 0.875, 0.625, 0.125]
        );
    }

    #[test]
    fn second_dimension_matches_reference_values() {
        let points = generate(2, 4, 0).unwrap();
        assert_eq!(points[1], vec![0.0, 0.5, 0.25, 0.75]);
    }

    #[test]
    fn generation_is_deterministic() {
        let a = generate(3, 500, DEFAULT_SKIP).unwrap();
        let b = generate(3, 500, DEFAULT_SKIP).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn skip_matches_sequential_generation() {
        let long = generate(4, 300, 0).unwrap();
        let skipped = generate(4, 100, 200).unwrap();
        for d in 0..4 {
            assert_eq!(&long[d][200..], &skipped[d][..]);
        }
    }

    #[test]
    fn different_skip_gives_different_points() {
        let a = generate(2, 64, 0).unwrap();
        let b = generate(2, 64, 64).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn aligned_blocks_stratify_every_dimension() {
        for skip in [0u64, 1024] {
            let points = generate(MAX_DIMENSIONS, 1024, skip).unwrap();
            for row in &points {
                assert!(row.iter().all(|&u| (0.0..1.0).contains(&u)));
                assert_eq!(row.iter().filter(|&&u| u < 0.5).count(), 512);
                assert_eq!(row.iter().filter(|&&u| u < 0.25).count(), 256);
            }
        }
    }

    #[test]
    fn unsupported_dimensions_are_rejected() {
        assert_eq!(
            generate(0, 10, 0).unwrap_err(),
            SobolError::UnsupportedDimensions { requested: 0, max: MAX_DIMENSIONS }
        );
        assert!(matches!(
            generate(11, 10, 0),
            Err(SobolError::UnsupportedDimensions { requested: 11, .. })
        ));
    }

    #[test]
    fn overflowing_index_range_is_rejected() {
        assert!(matches!(
            generate(1, 10, u32::MAX as u64),
            Err(SobolError::Exhausted { .. })
        ));
    }
}
