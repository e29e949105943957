use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use relaxrs::engine::progress::{Progress, ProgressCallback};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const SPINNER_TICK_MS: u64 = 100;
const BAR_TEMPLATE: &str = "{prefix:>12.cyan.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}";
const SPINNER_TEMPLATE: &str = "{prefix:>12.cyan.bold} {spinner:.green} {msg}";

#[derive(Default)]
struct FitDisplay {
    bar: Option<ProgressBar>,
    best_chi2: Option<f64>,
    failed: usize,
}

/// Renders grid search, minimisation and Monte Carlo progress on stderr.
#[derive(Clone)]
pub struct CliProgressHandler {
    display: Arc<Mutex<FitDisplay>>,
    visible: bool,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        Self {
            display: Arc::new(Mutex::new(FitDisplay::default())),
            visible: true,
        }
    }

    pub fn callback(&self) -> ProgressCallback<'static> {
        let handler = self.clone();
        Box::new(move |progress: Progress| {
            let Ok(mut display) = handler.display.lock() else {
                warn!("Progress display mutex was poisoned. Cannot update progress.");
                return;
            };
            handler.apply(&mut display, progress);
        })
    }

    fn apply(&self, display: &mut FitDisplay, progress: Progress) {
        match progress {
            Progress::GridStart { points } => {
                display.best_chi2 = None;
                display.bar = Some(self.counter("Grid", points));
            }
            Progress::GridPoint => {
                if let Some(bar) = &display.bar {
                    bar.inc(1);
                }
            }
            Progress::Improved { chi2 } => {
                display.best_chi2 = Some(chi2);
                if let Some(bar) = &display.bar {
                    bar.set_message(format!("best chi2 {chi2:.6e}"));
                }
            }
            Progress::GridFinish => {
                let summary = match display.best_chi2 {
                    Some(chi2) => format!("best chi2 {chi2:.6e}"),
                    None => "no point evaluated".to_string(),
                };
                if let Some(bar) = &display.bar {
                    bar.finish_with_message(summary);
                }
            }
            Progress::MinimiseStart => {
                let bar = self
                    .bar(None)
                    .with_style(Self::style(SPINNER_TEMPLATE))
                    .with_prefix("Minimise")
                    .with_message("Levenberg-Marquardt");
                bar.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
                display.bar = Some(bar);
            }
            Progress::MinimiseFinish { chi2, iterations } => {
                if let Some(bar) = &display.bar {
                    bar.disable_steady_tick();
                    bar.finish_with_message(format!(
                        "chi2 {chi2:.6e} after {iterations} iterations"
                    ));
                }
            }
            Progress::SimulationsStart { total } => {
                display.failed = 0;
                display.bar = Some(self.counter("Monte Carlo", total));
            }
            Progress::SimulationDone { index, converged } => {
                if !converged {
                    display.failed += 1;
                }
                if let Some(bar) = &display.bar {
                    bar.inc(1);
                    bar.set_message(match display.failed {
                        0 => format!("replicate {index}"),
                        n => format!("replicate {index}, {n} failed"),
                    });
                }
            }
            Progress::SimulationsFinish { failed } => {
                display.failed = failed;
                if let Some(bar) = &display.bar {
                    bar.finish_with_message(match failed {
                        0 => "all replicates converged".to_string(),
                        n => format!("{n} replicates failed"),
                    });
                }
            }
            Progress::Message(msg) => match &display.bar {
                Some(bar) if !bar.is_finished() => bar.println(format!("  {msg}")),
                _ => eprintln!("  {msg}"),
            },
        }
    }

    fn counter(&self, prefix: &'static str, total: u64) -> ProgressBar {
        self.bar(Some(total))
            .with_style(Self::style(BAR_TEMPLATE).progress_chars("##-"))
            .with_prefix(prefix)
    }

    fn bar(&self, len: Option<u64>) -> ProgressBar {
        let target = if self.visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        ProgressBar::with_draw_target(len, target)
    }

    fn style(template: &str) -> ProgressStyle {
        ProgressStyle::with_template(template).expect("Progress templates are valid constants")
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}
