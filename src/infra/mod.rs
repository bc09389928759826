// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Read-only consumers and persistence around a FitResult:
//
//   fit_store.rs   — Saves and loads fits, held-out predictions
//                    and the effective PipelineConfig as JSON
//                    under the output directory.
//
//   metrics.rs     — Evaluator (point predictions, RMSE, MAE)
//                    and the metrics CSV log, one row per model.
//
//   diagnostics.rs — Per-parameter posterior summary: mean, sd,
//                    central interval, split R-hat, bulk/tail ESS,
//                    MCSE, plus sampler warnings.
//
//   plots.rs       — Density, trace, interval, ESS-ratio and
//                    observed-vs-predicted SVG files.
//
// None of these modules mutate a fit; they only read draws.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)

/// Fit, holdout and config persistence
pub mod fit_store;

/// Evaluator and metrics CSV logger
pub mod metrics;

/// Convergence and efficiency diagnostics
pub mod diagnostics;

/// SVG plot rendering
pub mod plots;
