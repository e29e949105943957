use relaxrs::core::modsel::Criterion;
use relaxrs::engine::optimizer::FitResult;
use relaxrs::workflows::monte_carlo::MonteCarloResult;
use std::fmt::Write;

/// One fitted model offered to model selection.
pub struct ModelSummary<'a> {
    pub name: &'a str,
    pub chi2: f64,
    pub k: usize,
    pub n: usize,
    pub criterion_value: f64,
}

/// Renders the fitted parameters in physical units, with Monte Carlo errors when available.
pub fn format_fit(title: &str, result: &FitResult, errors: Option<&MonteCarloResult>) -> String {
    let width = result
        .names
        .iter()
        .map(String::len)
        .max()
        .unwrap_or(0)
        .max("Parameter".len());

    let mut out = String::new();
    let _ = writeln!(out, "{title}");
    let _ = writeln!(out, "  {:<width$}  {:>16}  {:>16}", "Parameter", "Value", "Error");
    for (i, (name, value)) in result.names.iter().zip(&result.physical).enumerate() {
        let error = errors
            .and_then(|mc| mc.errors.get(i))
            .map_or_else(|| "-".to_string(), |e| format!("{e:.6e}"));
        let _ = writeln!(out, "  {name:<width$}  {value:>16.6e}  {error:>16}");
    }
    let _ = writeln!(out, "  chi2 = {:.6e}", result.chi2);
    let _ = writeln!(
        out,
        "  iterations = {}, function calls = {}, gradient calls = {}",
        result.iterations, result.function_count, result.gradient_count
    );
    if let Some(mc) = errors {
        let _ = writeln!(
            out,
            "  Monte Carlo: {} simulations, {} failed",
            mc.simulations.len() + mc.failed,
            mc.failed
        );
    }
    if let Some(warning) = &result.warning {
        let _ = writeln!(out, "  warning: {warning}");
    }
    out
}

/// Renders the model-selection table, marking the selected model.
pub fn format_selection(
    criterion: Criterion,
    models: &[ModelSummary<'_>],
    selected: Option<usize>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Model selection ({criterion})");
    let _ = writeln!(
        out,
        "  {:<10}  {:>4}  {:>4}  {:>16}  {:>16}",
        "Model", "k", "n", "chi2", criterion.to_string()
    );
    for (i, model) in models.iter().enumerate() {
        let marker = if Some(i) == selected { " *" } else { "" };
        let _ = writeln!(
            out,
            "  {:<10}  {:>4}  {:>4}  {:>16.6e}  {:>16.6e}{marker}",
            model.name, model.k, model.n, model.chi2, model.criterion_value
        );
    }
    out
}
