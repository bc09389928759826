// ============================================================
// Layer 6 — Evaluator and Metrics Logger
// ============================================================
// Turns posterior predictive draws into numbers we can compare:
//
//   point prediction  ŷ_i = mean over every chain and draw of
//                           the predictive column "<q>.i"
//   RMSE              = sqrt( mean( (ŷ_i − y_i)² ) )
//   MAE               = mean( |ŷ_i − y_i| )
//
// RMSE ≥ MAE for any residual vector, with equality only when
// every non-zero residual has the same magnitude.
//
// Predicted and observed sequences must have the same non-zero
// length and order (test records in load order); anything else
// is an AlignmentError.
//
// MetricsLogger appends one row per evaluated model to
// <output_dir>/metrics.csv:
//
//   model,n_train,n_test,rmse,mae,ols_rmse,ols_mae,divergences
//   linear,274,118,3.402100,2.591300,3.398700,2.588000,0
//
// Reference: Rust Book §12 (I/O and File Handling)

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::domain::error::PipelineError;
use crate::domain::fit::FitResult;

/// Scalar error metrics of one set of predictions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub rmse: f64,
    pub mae:  f64,
}

/// Per-test-point posterior mean of the predictive quantity `name`.
pub fn point_predictions(fit: &FitResult, name: &str) -> Result<Vec<f64>, PipelineError> {
    let columns = fit.vector_columns(name);
    if columns.is_empty() {
        return Err(PipelineError::sampling(
            fit.model_name(),
            format!("fit has no predictive quantity '{name}'"),
        ));
    }

    columns
        .into_iter()
        .map(|column| {
            fit.mean(column).ok_or_else(|| {
                PipelineError::sampling(fit.model_name(), format!("no draws for '{column}'"))
            })
        })
        .collect()
}

/// RMSE and MAE of `predicted` against `observed`.
pub fn evaluate(predicted: &[f64], observed: &[f64]) -> Result<Metrics, PipelineError> {
    if predicted.len() != observed.len() || predicted.is_empty() {
        return Err(PipelineError::Alignment {
            predicted: predicted.len(),
            observed:  observed.len(),
        });
    }

    let n = predicted.len() as f64;
    let (sq, abs) = predicted
        .iter()
        .zip(observed)
        .fold((0.0, 0.0), |(sq, abs), (p, o)| {
            let r = p - o;
            (sq + r * r, abs + r.abs())
        });

    Ok(Metrics {
        rmse: (sq / n).sqrt(),
        mae:  abs / n,
    })
}

/// One row of the metrics log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub model:       String,
    pub n_train:     usize,
    pub n_test:      usize,
    pub bayes:       Metrics,
    pub ols:         Metrics,
    pub divergences: usize,
}

/// Appends evaluation rows to a CSV file.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create the logger, writing the header if the file is new.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "model,n_train,n_test,rmse,mae,ols_rmse,ols_mae,divergences")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, r: &EvaluationRecord) -> Result<(), PipelineError> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;

        writeln!(
            f,
            "{},{},{},{:.6},{:.6},{:.6},{:.6},{}",
            r.model,
            r.n_train,
            r.n_test,
            r.bayes.rmse,
            r.bayes.mae,
            r.ols.rmse,
            r.ols.mae,
            r.divergences,
        )?;

        tracing::debug!("Logged metrics for '{}' to {}", r.model, self.csv_path.display());
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_worked_example() {
        let observed  = [20.0, 25.0, 30.0];
        let predicted = [22.0, 24.0, 28.0];

        let m = evaluate(&predicted, &observed).unwrap();
        assert!((m.rmse - 3f64.sqrt()).abs() < 1e-12);
        assert!((m.mae - 5.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_perfect_predictions_score_zero() {
        let m = evaluate(&[1.0, 2.0], &[1.0, 2.0]).unwrap();
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.mae, 0.0);
    }

    #[test]
    fn test_length_mismatch_is_alignment_error() {
        let err = evaluate(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert!(matches!(err, PipelineError::Alignment { predicted: 2, observed: 1 }));
        assert!(evaluate(&[], &[]).is_err());
    }

    #[test]
    fn test_point_predictions_average_chains_and_draws() {
        let columns: Vec<String> = ["sigma", "y_pred.1", "y_pred.2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let chain_a = vec![vec![1.0, 10.0, 20.0], vec![1.0, 12.0, 22.0]];
        let chain_b = vec![vec![1.0, 14.0, 24.0], vec![1.0, 16.0, 26.0]];
        let fit = FitResult::from_chains("linear", &columns, &[chain_a, chain_b]).unwrap();

        assert_eq!(point_predictions(&fit, "y_pred").unwrap(), vec![13.0, 23.0]);
        assert!(point_predictions(&fit, "f_pred").is_err());
    }

    #[test]
    fn test_logger_appends_rows() {
        let dir    = tempfile::tempdir().expect("temp dir");
        let logger = MetricsLogger::new(dir.path()).unwrap();
        let record = EvaluationRecord {
            model:       "linear".to_string(),
            n_train:     7,
            n_test:      3,
            bayes:       Metrics { rmse: 1.5, mae: 1.0 },
            ols:         Metrics { rmse: 1.4, mae: 0.9 },
            divergences: 0,
        };
        logger.log(&record).unwrap();
        logger.log(&record).unwrap();

        let text = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "linear,7,3,1.500000,1.000000,1.400000,0.900000,0");
    }

    proptest! {
        #[test]
        fn prop_rmse_dominates_mae(
            pairs in proptest::collection::vec((-100.0f64..100.0, -100.0f64..100.0), 1..50)
        ) {
            let (predicted, observed): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
            let m = evaluate(&predicted, &observed).unwrap();

            prop_assert!(m.rmse >= 0.0);
            prop_assert!(m.mae >= 0.0);
            prop_assert!(m.rmse + 1e-9 >= m.mae);
        }

        #[test]
        fn prop_zero_iff_identical(values in proptest::collection::vec(-50.0f64..50.0, 1..30)) {
            let m = evaluate(&values, &values).unwrap();
            prop_assert_eq!(m.rmse, 0.0);
            prop_assert_eq!(m.mae, 0.0);

            let mut shifted = values.clone();
            shifted[0] += 1.0;
            let m = evaluate(&shifted, &values).unwrap();
            prop_assert!(m.rmse > 0.0 && m.mae > 0.0);
        }
    }
}
