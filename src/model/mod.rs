// ============================================================
// Layer 5 — Models and Sampling Engine
// ============================================================
// Everything that knows about Stan lives in this layer.
//
//   linear.rs   — parametric linear regression program, plus the
//                 ordinary-least-squares baseline it is compared to
//   gp.rs       — Gaussian-process regression program, plus the
//                 host-side exponentiated-quadratic covariance and
//                 latent-function recovery
//   engine.rs   — CmdStanEngine: compiles programs, runs chains
//                 as child processes, enforces the timeout
//   stan_csv.rs — reads the per-chain CSV files CmdStan writes
//
// Both model families implement RegressionModel: they declare
// their data slots (through ModelSpec) and bind standardised
// train/test inputs to them.
//
// Reference: Stan User's Guide §10 (Gaussian Processes)
//            Rust Book §17 (Trait Objects)

/// Parametric linear regression and the OLS baseline
pub mod linear;

/// Gaussian-process regression and covariance helpers
pub mod gp;

/// CmdStan process driver implementing PosteriorSampler
pub mod engine;

/// Stan CSV output reader
pub mod stan_csv;

use serde::{Deserialize, Serialize};

use crate::data::preprocessor::{Scaler, Standardizer};
use crate::domain::error::PipelineError;
use crate::domain::record::Split;
use crate::domain::spec::{BoundData, ModelSpec};

// ─── ModelInputs ──────────────────────────────────────────────────────────────
/// Standardised design matrices and targets for one Split.
///
/// Predictors and target are scaled with train statistics; the raw
/// targets are kept for evaluation in miles per gallon.
#[derive(Debug, Clone)]
pub struct ModelInputs {
    pub x_train:     Vec<Vec<f64>>,
    pub y_train:     Vec<f64>,
    pub x_test:      Vec<Vec<f64>>,
    pub y_train_raw: Vec<f64>,
    pub y_test_raw:  Vec<f64>,
    pub target:      Scaler,
}

impl ModelInputs {
    pub fn prepare(split: &Split, predictors: &[String], target: &str) -> Result<Self, PipelineError> {
        if predictors.is_empty() {
            return Err(PipelineError::InvalidConfig("at least one predictor is required".into()));
        }
        if split.train.is_empty() || split.test.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "split has {} train and {} test records; both sides need records",
                split.train.len(),
                split.test.len()
            )));
        }

        let x_train_raw = split.train.rows(predictors)?;
        let x_test_raw  = split.test.rows(predictors)?;
        let y_train_raw = split.train.column(target)?;
        let y_test_raw  = split.test.column(target)?;

        let standardizer = Standardizer::fit(&x_train_raw);
        let target_scale = Scaler::fit(&y_train_raw);

        Ok(Self {
            x_train: standardizer.transform(&x_train_raw),
            y_train: target_scale.transform_all(&y_train_raw),
            x_test:  standardizer.transform(&x_test_raw),
            y_train_raw,
            y_test_raw,
            target:  target_scale,
        })
    }

    pub fn num_predictors(&self) -> usize {
        self.x_train.first().map(|r| r.len()).unwrap_or(0)
    }
}

// ─── RegressionModel ──────────────────────────────────────────────────────────
/// A model family: a Stan program with declared data slots, and the
/// binding of ModelInputs to those slots.
pub trait RegressionModel {
    fn spec(&self) -> ModelSpec;

    fn bind(&self, inputs: &ModelInputs) -> Result<BoundData, PipelineError>;

    /// Cheap host-side checks run before the engine is started.
    fn preflight(&self, _inputs: &ModelInputs) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// The two model families the pipeline can fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    Linear,
    GaussianProcess,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 2] = [ModelFamily::Linear, ModelFamily::GaussianProcess];

    /// Artifact and log name, also the Stan model name.
    pub fn name(&self) -> &'static str {
        match self {
            ModelFamily::Linear => "linear",
            ModelFamily::GaussianProcess => "gp",
        }
    }

    pub fn model(&self, gp_jitter: f64) -> Box<dyn RegressionModel> {
        match self {
            ModelFamily::Linear => Box::new(linear::LinearRegression),
            ModelFamily::GaussianProcess => Box::new(gp::GaussianProcess::new(gp_jitter)),
        }
    }
}
