// ============================================================
// Layer 2 — Report Use Case
// ============================================================
// Reloads a persisted fit and rebuilds its diagnostics and plots
// without touching CmdStan:
//
//   1. Load <output_dir>/<model>/fit.json
//   2. Read the interval mass from pipeline_config.json
//      (defaults if the file is missing)
//   3. Summarise the parameters
//   4. Re-render plots, including observed-vs-predicted when the
//      held-out predictions were saved

use anyhow::Result;

use crate::application::fit_use_case::PipelineConfig;
use crate::domain::fit::FitResult;
use crate::infra::{
    diagnostics::{summarize, DiagnosticsReport},
    fit_store::FitStore,
    plots,
};

/// Parameters worth summarising: scalars plus regression slopes.
/// Latent whitening and predictive columns are left out.
pub fn summary_names(fit: &FitResult) -> Vec<String> {
    fit.scalar_names()
        .into_iter()
        .chain(fit.vector_columns("beta"))
        .map(String::from)
        .collect()
}

pub struct ReportUseCase {
    store: FitStore,
}

impl ReportUseCase {
    pub fn new(output_dir: &str) -> Result<Self> {
        Ok(Self { store: FitStore::new(output_dir)? })
    }

    pub fn execute(&self, model: &str, render_plots: bool) -> Result<DiagnosticsReport> {
        let fit = self.store.load_fit(model)?;

        let interval_prob = match self.store.load_config() {
            Ok(cfg) => cfg.interval_prob,
            Err(e) => {
                tracing::debug!("No saved config ({e:#}); using defaults");
                PipelineConfig::default().interval_prob
            }
        };

        let report = summarize(&fit, &summary_names(&fit), interval_prob);
        tracing::info!(
            "Summarised {} parameters of '{}' ({} chains × {} draws)",
            report.params.len(),
            model,
            report.num_chains,
            report.num_draws
        );

        if render_plots {
            let holdout = self.store.load_holdout(model)?;
            let paths = plots::render_fit(
                &self.store.model_dir(model),
                &fit,
                &report,
                holdout.as_ref().map(|h| (h.observed.as_slice(), h.predicted.as_slice())),
            )?;
            tracing::info!("Wrote {} plots for '{}'", paths.len(), model);
        }

        Ok(report)
    }
}
