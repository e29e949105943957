//! Model-selection statistics.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Criterion {
    #[default]
    Aic,
    Aicc,
    Bic,
}

impl Criterion {
    /// The criterion value for a fit with chi-squared `chi2`, `k` parameters and `n` data points.
    ///
    /// AICc is infinite when `n - k - 1 <= 0`.
    pub fn value(&self, chi2: f64, k: usize, n: usize) -> f64 {
        let kf = k as f64;
        let nf = n as f64;
        match self {
            Self::Aic => chi2 + 2.0 * kf,
            Self::Aicc => {
                let denom = nf - kf - 1.0;
                if denom <= 0.0 {
                    f64::INFINITY
                } else {
                    chi2 + 2.0 * kf + 2.0 * kf * (kf + 1.0) / denom
                }
            }
            Self::Bic => chi2 + kf * nf.ln(),
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Aic => "AIC",
            Self::Aicc => "AICc",
            Self::Bic => "BIC",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Criterion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aic" => Ok(Self::Aic),
            "aicc" => Ok(Self::Aicc),
            "bic" => Ok(Self::Bic),
            other => Err(format!("unknown model-selection criterion '{other}'")),
        }
    }
}

/// The summary of one fitted model offered to [`select`].
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<'a> {
    pub name: &'a str,
    pub chi2: f64,
    pub k: usize,
    pub n: usize,
}

/// The index of the candidate with the smallest criterion value, with that value.
///
/// Candidates whose value is not a number are skipped; ties keep the earlier candidate.
pub fn select(criterion: Criterion, candidates: &[Candidate<'_>]) -> Option<(usize, f64)> {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, criterion.value(c.chi2, c.k, c.n)))
        .filter(|(_, value)| !value.is_nan())
        .fold(None, |best, (i, value)| match best {
            Some((_, best_value)) if best_value <= value => best,
            _ => Some((i, value)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn criteria_follow_their_definitions() {
        assert_eq!(Criterion::Aic.value(10.0, 3, 20), 16.0);
        assert_relative_eq!(Criterion::Aicc.value(10.0, 3, 20), 16.0 + 24.0 / 16.0);
        assert_relative_eq!(Criterion::Bic.value(10.0, 3, 20), 10.0 + 3.0 * 20f64.ln());
    }

    #[test]
    fn aicc_is_infinite_without_spare_degrees_of_freedom() {
        assert_eq!(Criterion::Aicc.value(1.0, 4, 5), f64::INFINITY);
        assert_eq!(Criterion::Aicc.value(1.0, 5, 5), f64::INFINITY);
    }

    #[test]
    fn selection_picks_the_smallest_value() {
        let candidates = [
            Candidate { name: "m1", chi2: 30.0, k: 1, n: 30 },
            Candidate { name: "m2", chi2: 12.0, k: 2, n: 30 },
            Candidate { name: "m4", chi2: 11.5, k: 4, n: 30 },
        ];
        assert_eq!(select(Criterion::Aic, &candidates), Some((1, 16.0)));
        assert_eq!(select(Criterion::Bic, &[]), None);
    }

    #[test]
    fn names_parse_case_insensitively() {
        assert_eq!("AICc".parse::<Criterion>(), Ok(Criterion::Aicc));
        assert_eq!(" bic ".parse::<Criterion>(), Ok(Criterion::Bic));
        assert!("cv".parse::<Criterion>().is_err());
    }
}
