// ============================================================
// Layer 6 — Fit Store
// ============================================================
// Persists sampler output and the configuration that produced it
// so `report` can reload a fit without rerunning CmdStan.
//
// Directory layout:
//   <output_dir>/
//     pipeline_config.json    ← effective PipelineConfig of the last run
//     metrics.csv             ← written by MetricsLogger
//     linear/
//       fit.json              ← FitResult (every chain, every draw)
//       holdout.json          ← observed and predicted test targets
//       plots/*.svg
//     gp/
//       ...
//
// Reference: Rust Book §9 (Error Handling)
//            serde_json documentation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::fit_use_case::PipelineConfig;
use crate::domain::fit::FitResult;

/// Test-set targets next to the point predictions made for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holdout {
    pub observed:  Vec<f64>,
    pub predicted: Vec<f64>,
}

pub struct FitStore {
    dir: PathBuf,
}

impl FitStore {
    /// Creates the output directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create output directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory holding one model's artifacts.
    pub fn model_dir(&self, model: &str) -> PathBuf {
        self.dir.join(model)
    }

    pub fn save_fit(&self, fit: &FitResult) -> Result<PathBuf> {
        let dir = self.model_dir(fit.model_name());
        fs::create_dir_all(&dir)?;

        let path = dir.join("fit.json");
        let json = serde_json::to_string(fit)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to save fit to '{}'", path.display()))?;

        tracing::debug!("Saved fit '{}' to '{}'", fit.model_name(), path.display());
        Ok(path)
    }

    pub fn load_fit(&self, model: &str) -> Result<FitResult> {
        let path = self.model_dir(model).join("fit.json");
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read fit from '{}'. Have you run 'fit --model {model}' first?",
                path.display()
            )
        })?;
        serde_json::from_str(&json)
            .with_context(|| format!("'{}' is not a valid fit file", path.display()))
    }

    pub fn save_holdout(&self, model: &str, holdout: &Holdout) -> Result<()> {
        let dir = self.model_dir(model);
        fs::create_dir_all(&dir)?;
        let path = dir.join("holdout.json");
        fs::write(&path, serde_json::to_string_pretty(holdout)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        Ok(())
    }

    /// The held-out predictions, if the fit was produced by `fit`.
    pub fn load_holdout(&self, model: &str) -> Result<Option<Holdout>> {
        let path = self.model_dir(model).join("holdout.json");
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    pub fn save_config(&self, cfg: &PipelineConfig) -> Result<()> {
        let path = self.dir.join("pipeline_config.json");
        let json = serde_json::to_string_pretty(cfg)?;

        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved pipeline config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<PipelineConfig> {
        let path = self.dir.join("pipeline_config.json");
        let json = fs::read_to_string(&path).with_context(|| {
            format!("Cannot read config from '{}'", path.display())
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn fit() -> FitResult {
        let columns = vec!["alpha".to_string(), "divergent__".to_string()];
        FitResult::from_chains("gp", &columns, &[vec![vec![0.1, 0.0], vec![0.2, 0.0]]]).unwrap()
    }

    #[test]
    fn test_fit_round_trips_through_disk() {
        let dir   = tempfile::tempdir().expect("temp dir");
        let store = FitStore::new(dir.path()).unwrap();

        let path = store.save_fit(&fit()).unwrap();
        assert_eq!(path, dir.path().join("gp").join("fit.json"));
        assert_eq!(store.load_fit("gp").unwrap(), fit());
    }

    #[test]
    fn test_fit_with_nan_draw_reloads() {
        let dir   = tempfile::tempdir().expect("temp dir");
        let store = FitStore::new(dir.path()).unwrap();
        let columns = vec!["lp__".to_string(), "sigma".to_string(), "y_pred.1".to_string()];
        let chain   = vec![vec![-1.0, 0.5, f64::NAN], vec![-1.2, 0.6, 3.0]];
        let fit     = FitResult::from_chains("linear", &columns, &[chain]).unwrap();

        store.save_fit(&fit).unwrap();
        let back = store.load_fit("linear").unwrap();
        let y    = back.draws("y_pred.1").unwrap();
        assert!(y[0][0].is_nan());
        assert_eq!(y[0][1], 3.0);
        assert_eq!(back.draws("sigma"), fit.draws("sigma"));
    }

    #[test]
    fn test_missing_fit_mentions_fit_command() {
        let dir   = tempfile::tempdir().expect("temp dir");
        let store = FitStore::new(dir.path()).unwrap();
        let err   = store.load_fit("linear").unwrap_err();
        assert!(format!("{err:#}").contains("fit --model linear"));
    }

    #[test]
    fn test_holdout_is_optional() {
        let dir   = tempfile::tempdir().expect("temp dir");
        let store = FitStore::new(dir.path()).unwrap();
        assert!(store.load_holdout("linear").unwrap().is_none());

        let h = Holdout { observed: vec![20.0], predicted: vec![21.0] };
        store.save_holdout("linear", &h).unwrap();
        assert_eq!(store.load_holdout("linear").unwrap(), Some(h));
    }

    #[test]
    fn test_config_round_trip() {
        let dir   = tempfile::tempdir().expect("temp dir");
        let store = FitStore::new(dir.path()).unwrap();
        let mut cfg = PipelineConfig::default();
        cfg.sampler.chains = 2;

        store.save_config(&cfg).unwrap();
        assert_eq!(store.load_config().unwrap(), cfg);
    }
}
