// ============================================================
// Layer 2 — FitUseCase
// ============================================================
// Runs the regression pipeline in order:
//
//   Step 1: Load the table                 (Layer 4 - data)
//   Step 2: Split train/test once          (Layer 4 - data)
//   Step 3: Standardise with train stats   (Layer 5 - model)
//   Step 4: Save the effective config      (Layer 6 - infra)
//   Then, for every requested model family:
//   Step 5: Bind data and pre-flight       (Layer 5 - model)
//   Step 6: Sample the posterior           (PosteriorSampler)
//   Step 7: Persist the fit                (Layer 6 - infra)
//   Step 8: Predict, unscale, evaluate     (Layer 6 - infra)
//   Step 9: OLS baseline on the same split (Layer 5 - model)
//   Step 10: Diagnostics, metrics row, plots
//
// Both families see the same Split. A family that fails is
// logged and reported; the next family still runs.
//
// Reference: Rust Book §10 (Generic Types and Traits)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::application::report_use_case::summary_names;
use crate::data::{loader::WhitespaceTableLoader, splitter::split_train_test};
use crate::domain::{
    error::PipelineError,
    record::{Dataset, Split},
    spec::SamplerConfig,
    traits::{PosteriorSampler, RecordSource},
};
use crate::infra::{
    diagnostics::summarize,
    fit_store::{FitStore, Holdout},
    metrics::{evaluate, point_predictions, EvaluationRecord, Metrics, MetricsLogger},
    plots,
};
use crate::model::{gp, linear::fit_ols, ModelFamily, ModelInputs};

const AUTO_MPG_URL: &str =
    "https://archive.ics.uci.edu/ml/machine-learning-databases/auto-mpg/auto-mpg.data";

/// Draws used for GP latent-function recovery.
const LATENT_DRAWS: usize = 200;

// ─── Configuration ───────────────────────────────────────────────────────────
// Where the data comes from and how it is split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub source:         String,
    pub columns:        Vec<String>,
    pub label_column:   Option<String>,
    pub missing_marker: String,
    pub target:         String,
    pub predictors:     Vec<String>,
    pub train_fraction: f64,
    pub split_seed:     Option<u64>,
}

impl Default for DataConfig {
    fn default() -> Self {
        let names = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            source:         AUTO_MPG_URL.to_string(),
            columns:        names(&[
                "mpg", "cylinders", "displacement", "horsepower",
                "weight", "acceleration", "model_year", "origin", "car_name",
            ]),
            label_column:   Some("car_name".to_string()),
            missing_marker: "?".to_string(),
            target:         "mpg".to_string(),
            predictors:     names(&["displacement", "horsepower", "weight", "acceleration"]),
            train_fraction: 0.7,
            split_seed:     Some(42),
        }
    }
}

impl DataConfig {
    pub fn loader(&self) -> WhitespaceTableLoader {
        WhitespaceTableLoader::new(&self.source, self.columns.clone())
            .with_label_column(self.label_column.clone())
            .with_missing_marker(&self.missing_marker)
    }
}

// Everything one pipeline run needs.
// Serialisable so the run can be persisted next to its fits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data:          DataConfig,
    pub sampler:       SamplerConfig,
    pub gp_jitter:     f64,
    /// CmdStan installation; falls back to the CMDSTAN env var
    pub cmdstan_home:  Option<String>,
    pub output_dir:    String,
    pub render_plots:  bool,
    /// Mass of the central credible interval in reports
    pub interval_prob: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data:          DataConfig::default(),
            sampler:       SamplerConfig::default(),
            gp_jitter:     gp::DEFAULT_JITTER,
            cmdstan_home:  None,
            output_dir:    "runs".to_string(),
            render_plots:  true,
            interval_prob: 0.9,
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config; missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid config file '{}'", path.display()))
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        self.sampler.validate()?;

        let d = &self.data;
        if !(d.train_fraction > 0.0 && d.train_fraction < 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "train fraction must lie in (0, 1), got {}",
                d.train_fraction
            )));
        }
        if d.predictors.is_empty() {
            return Err(PipelineError::InvalidConfig("no predictors configured".into()));
        }
        for name in d.predictors.iter().chain(std::iter::once(&d.target)) {
            if !d.columns.contains(name) {
                return Err(PipelineError::InvalidConfig(format!("unknown column '{name}'")));
            }
            if d.label_column.as_ref() == Some(name) {
                return Err(PipelineError::InvalidConfig(format!(
                    "'{name}' is the label column and cannot be modelled"
                )));
            }
        }
        if !(self.gp_jitter >= 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "GP jitter must be non-negative, got {}",
                self.gp_jitter
            )));
        }
        if !(self.interval_prob > 0.0 && self.interval_prob < 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "interval probability must lie in (0, 1), got {}",
                self.interval_prob
            )));
        }
        Ok(())
    }
}

// ─── Results ──────────────────────────────────────────────────────────────────
/// What one successful family run produced.
#[derive(Debug, Clone)]
pub struct ModelEvaluation {
    pub record:   EvaluationRecord,
    pub warnings: Vec<String>,
    pub fit_path: PathBuf,
    pub plots:    Vec<PathBuf>,
}

#[derive(Debug)]
pub struct FamilyRun {
    pub family:  ModelFamily,
    pub outcome: Result<ModelEvaluation>,
}

impl FamilyRun {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

// ─── FitUseCase ───────────────────────────────────────────────────────────────
pub struct FitUseCase<S: PosteriorSampler> {
    config:  PipelineConfig,
    sampler: S,
}

impl<S: PosteriorSampler> FitUseCase<S> {
    pub fn new(config: PipelineConfig, sampler: S) -> Self {
        Self { config, sampler }
    }

    /// Run every family in `families` on one shared split.
    ///
    /// Errors from loading, splitting or persistence setup abort the
    /// run; errors inside a family are returned in its FamilyRun.
    pub fn execute(&self, families: &[ModelFamily]) -> Result<Vec<FamilyRun>> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Step 1: Load ──────────────────────────────────────────────────────
        tracing::info!("Loading dataset from '{}'", cfg.data.source);
        let dataset = cfg.data.loader().load()?;

        // ── Step 2: Split ─────────────────────────────────────────────────────
        let split = split_train_test(&dataset, cfg.data.train_fraction, cfg.data.split_seed)?;
        tracing::info!("Split: {} train, {} test", split.train.len(), split.test.len());

        // ── Step 3: Standardise ───────────────────────────────────────────────
        let inputs = ModelInputs::prepare(&split, &cfg.data.predictors, &cfg.data.target)
            .context("Cannot build model inputs from the split")?;

        // ── Step 4: Persist config ────────────────────────────────────────────
        let store  = FitStore::new(&cfg.output_dir)?;
        store.save_config(cfg)?;
        let logger = MetricsLogger::new(store.dir())?;

        let mut runs = Vec::with_capacity(families.len());
        for &family in families {
            tracing::info!("Fitting model '{}'", family.name());
            let outcome = self
                .run_family(family, &split, &inputs, &store, &logger)
                .with_context(|| format!("Model '{}' failed", family.name()));

            if let Err(e) = &outcome {
                tracing::error!("{e:#}");
            }
            runs.push(FamilyRun { family, outcome });
        }
        Ok(runs)
    }

    fn run_family(
        &self,
        family: ModelFamily,
        split:  &Split,
        inputs: &ModelInputs,
        store:  &FitStore,
        logger: &MetricsLogger,
    ) -> Result<ModelEvaluation> {
        let cfg   = &self.config;
        let model = family.model(cfg.gp_jitter);

        // ── Step 5: Bind and pre-flight ───────────────────────────────────────
        let spec = model.spec();
        let data = model.bind(inputs)?;
        model.preflight(inputs)?;

        // ── Step 6: Sample ────────────────────────────────────────────────────
        let fit = self.sampler.sample(&spec, &data, &cfg.sampler)?;

        // ── Step 7: Persist ───────────────────────────────────────────────────
        let fit_path = store.save_fit(&fit)?;

        // ── Step 8: Evaluate in MPG units ─────────────────────────────────────
        let z_pred    = point_predictions(&fit, &spec.prediction)?;
        let predicted = inputs.target.inverse_all(&z_pred);
        let bayes     = evaluate(&predicted, &inputs.y_test_raw)?;

        // ── Step 9: Frequentist baseline ──────────────────────────────────────
        let ols = ols_baseline(inputs)?;

        // ── Step 10: Diagnostics, metrics, plots ──────────────────────────────
        let report = summarize(&fit, &summary_names(&fit), cfg.interval_prob);
        let warnings = report.warnings();
        for w in &warnings {
            tracing::warn!("{}: {w}", spec.name);
        }

        let record = EvaluationRecord {
            model:       spec.name.clone(),
            n_train:     split.train.len(),
            n_test:      split.test.len(),
            bayes,
            ols,
            divergences: fit.divergences(),
        };
        logger.log(&record)?;

        let holdout = Holdout { observed: inputs.y_test_raw.clone(), predicted };
        store.save_holdout(&spec.name, &holdout)?;

        let mut plot_paths = Vec::new();
        if cfg.render_plots {
            let dir = store.model_dir(&spec.name);
            plot_paths = plots::render_fit(
                &dir,
                &fit,
                &report,
                Some((holdout.observed.as_slice(), holdout.predicted.as_slice())),
            )?;

            if family == ModelFamily::GaussianProcess {
                let latent = gp::latent_mean(&fit, &inputs.x_train, cfg.gp_jitter, LATENT_DRAWS)?;
                let fitted = inputs.target.inverse_all(&latent);
                plot_paths.push(plots::render_fitted(&dir, &spec.name, &inputs.y_train_raw, &fitted)?);
            }
        }

        tracing::info!(
            "{}: RMSE {:.3} MAE {:.3} (OLS RMSE {:.3} MAE {:.3})",
            spec.name,
            bayes.rmse,
            bayes.mae,
            ols.rmse,
            ols.mae
        );

        Ok(ModelEvaluation { record, warnings, fit_path, plots: plot_paths })
    }
}

/// OLS on the standardised predictors against raw targets,
/// scored on the test side of the same split.
fn ols_baseline(inputs: &ModelInputs) -> Result<Metrics, PipelineError> {
    let ols = fit_ols(&inputs.x_train, &inputs.y_train_raw)?;
    evaluate(&ols.predict(&inputs.x_test), &inputs.y_test_raw)
}

/// Load the configured dataset without fitting anything.
pub fn load_dataset(config: &DataConfig) -> Result<Dataset> {
    Ok(config.loader().load()?)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fit::FitResult;
    use crate::domain::spec::{BoundData, ModelSpec, SlotValue};
    use std::io::Write;

    /// Answers every model with the standardised posterior predictive
    /// pinned at zero, so predictions equal the train mean.
    struct StubSampler {
        fail_on: Option<&'static str>,
    }

    fn int_slot(data: &BoundData, name: &str) -> usize {
        match data.get(name) {
            Some(SlotValue::Int(n)) => *n as usize,
            other => panic!("slot {name} missing or not an int: {other:?}"),
        }
    }

    impl PosteriorSampler for StubSampler {
        fn sample(
            &self,
            spec:   &ModelSpec,
            data:   &BoundData,
            config: &SamplerConfig,
        ) -> Result<FitResult, PipelineError> {
            spec.check_bound(data)?;
            if self.fail_on == Some(spec.name.as_str()) {
                return Err(PipelineError::sampling(&spec.name, "stub failure"));
            }

            let n     = int_slot(data, "N");
            let n_new = int_slot(data, "N_new");

            let mut columns: Vec<String> =
                ["accept_stat__", "divergent__", "alpha", "rho", "sigma"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect();
            columns.extend((1..=n).map(|i| format!("eta.{i}")));
            columns.extend((1..=n_new).map(|i| format!("y_pred.{i}")));

            let chains: Vec<Vec<Vec<f64>>> = (0..config.chains)
                .map(|c| {
                    (0..config.num_samples())
                        .map(|d| {
                            let wiggle = ((c * 31 + d * 7) % 11) as f64 * 0.01;
                            let mut row = vec![0.9, 0.0, 1.0 + wiggle, 1.0 + wiggle, 0.5 + wiggle];
                            row.extend(std::iter::repeat(wiggle).take(n));
                            // symmetric around zero so the mean is exactly 0
                            row.extend((0..n_new).map(|_| if d % 2 == 0 { 0.25 } else { -0.25 }));
                            row
                        })
                        .collect()
                })
                .collect();

            FitResult::from_chains(&spec.name, &columns, &chains)
        }
    }

    fn write_table(dir: &Path) -> PathBuf {
        let path = dir.join("auto-mpg.data");
        let mut f = std::fs::File::create(&path).expect("create table");
        for i in 0..30u32 {
            let horsepower = if i == 5 { "?".to_string() } else { format!("{}.0", 60 + (i * 53) % 120) };
            writeln!(
                f,
                "{:.1}   {}   {}.0   {}   {}.   {}.0   {}  {}\t\"car {}\"",
                15.0 + (i % 17) as f64,
                4 + 2 * (i % 3),
                100 + (i * 37) % 200,
                horsepower,
                2000 + (i * 97) % 2000,
                10 + (i * 7) % 11,
                70 + i % 13,
                1 + i % 3,
                i
            )
            .expect("write row");
        }
        path
    }

    fn config(dir: &Path) -> PipelineConfig {
        let mut cfg = PipelineConfig::default();
        cfg.data.source   = write_table(dir).display().to_string();
        cfg.output_dir    = dir.join("runs").display().to_string();
        cfg.sampler.chains     = 2;
        cfg.sampler.iterations = 40;
        cfg
    }

    #[test]
    fn test_end_to_end_with_stub_sampler() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cfg = config(dir.path());

        let use_case = FitUseCase::new(cfg.clone(), StubSampler { fail_on: None });
        let runs     = use_case.execute(&ModelFamily::ALL).unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(FamilyRun::succeeded));

        // 29 complete rows, 0.7 split
        let linear = runs[0].outcome.as_ref().unwrap();
        assert_eq!(linear.record.n_train + linear.record.n_test, 29);
        assert_eq!(linear.record.n_train, 20);

        // Zero standardised prediction means the train mean in MPG
        let dataset = load_dataset(&cfg.data).unwrap();
        let split   = split_train_test(&dataset, 0.7, Some(42)).unwrap();
        let y_train = split.train.column("mpg").unwrap();
        let y_test  = split.test.column("mpg").unwrap();
        let mean    = y_train.iter().sum::<f64>() / y_train.len() as f64;
        let expect  = evaluate(&vec![mean; y_test.len()], &y_test).unwrap();
        assert!((linear.record.bayes.rmse - expect.rmse).abs() < 1e-9);
        assert!((linear.record.bayes.mae - expect.mae).abs() < 1e-9);

        let out = dir.path().join("runs");
        assert!(out.join("linear/fit.json").exists());
        assert!(out.join("gp/fit.json").exists());
        assert!(out.join("pipeline_config.json").exists());
        assert!(out.join("gp/plots/observed_vs_fitted.svg").exists());

        assert!(linear.fit_path.ends_with("linear/fit.json"));
        let gp = runs[1].outcome.as_ref().unwrap();
        assert!(gp.plots.iter().any(|p| p.ends_with("observed_vs_fitted.svg")));
        assert!(gp.plots.iter().all(|p| p.exists()));

        let csv = std::fs::read_to_string(out.join("metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn test_failed_family_does_not_stop_the_other() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut cfg = config(dir.path());
        cfg.render_plots = false;

        let use_case = FitUseCase::new(cfg, StubSampler { fail_on: Some("linear") });
        let runs     = use_case.execute(&ModelFamily::ALL).unwrap();

        assert!(!runs[0].succeeded());
        assert!(runs[1].succeeded());
        let err = runs[0].outcome.as_ref().unwrap_err();
        assert!(format!("{err:#}").contains("stub failure"));

        let csv = std::fs::read_to_string(dir.path().join("runs/metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 2);
        assert!(!dir.path().join("runs/gp/plots").exists());
    }

    #[test]
    fn test_unreachable_source_aborts_run() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut cfg = config(dir.path());
        cfg.data.source = dir.path().join("missing.data").display().to_string();

        let err = FitUseCase::new(cfg, StubSampler { fail_on: None })
            .execute(&[ModelFamily::Linear])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Load { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_columns() {
        let mut cfg = PipelineConfig::default();
        cfg.data.predictors.push("colour".to_string());
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.data.target = "car_name".to_string();
        assert!(cfg.validate().is_err());

        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_config_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"sampler": {{"chains": 2}}, "output_dir": "out"}}"#).expect("write");

        let cfg = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.sampler.chains, 2);
        assert_eq!(cfg.sampler.iterations, 2000);
        assert_eq!(cfg.output_dir, "out");
        assert_eq!(cfg.data.target, "mpg");
    }
}
