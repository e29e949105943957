/// Events emitted while a fit runs.
///
/// A fit reports an optional grid search, then an optional minimisation; Monte Carlo error
/// analysis reports one event per replicate. Replicates may finish out of order when they run
/// in parallel.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    GridStart { points: u64 },
    /// One grid point visited, whether evaluated, rejected by a constraint or failed.
    GridPoint,
    /// A new lowest chi-squared found by the grid search.
    Improved { chi2: f64 },
    GridFinish,

    MinimiseStart,
    MinimiseFinish { chi2: f64, iterations: usize },

    SimulationsStart { total: u64 },
    SimulationDone { index: usize, converged: bool },
    SimulationsFinish { failed: usize },

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}
