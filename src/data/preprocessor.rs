// ============================================================
// Layer 4 — Standardisation
// ============================================================
// Centres and scales predictors and the target before they are
// bound to a model:
//
//   z = (x − mean) / sd
//
// Statistics come from the TRAIN side only and are then applied
// unchanged to the test side, so no information from held-out
// records leaks into the fit.
//
// Standardised inputs keep the priors meaningful: Normal(0, 10)
// slopes and half-Normal(0, 1) GP amplitudes assume unit-scale
// data, while raw weights are in the thousands of pounds.
//
// Predictions come back from the sampler in standardised target
// units; Scaler::inverse maps them back to miles per gallon.
//
// Reference: Rust Book §13 (Iterators)

use serde::{Deserialize, Serialize};

/// Mean and standard deviation of one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: f64,
    pub sd:   f64,
}

impl Scaler {
    /// Fit on a column of values. A constant (or too short) column
    /// gets sd = 1 so it passes through centred but unscaled.
    pub fn fit(values: &[f64]) -> Self {
        let n = values.len();
        if n == 0 {
            return Self { mean: 0.0, sd: 1.0 };
        }

        let mean = values.iter().sum::<f64>() / n as f64;
        let var  = if n > 1 {
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            0.0
        };
        let sd = var.sqrt();

        Self {
            mean,
            sd: if sd > f64::EPSILON { sd } else { 1.0 },
        }
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.mean) / self.sd
    }

    pub fn inverse(&self, z: f64) -> f64 {
        z * self.sd + self.mean
    }

    pub fn transform_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.transform(v)).collect()
    }

    pub fn inverse_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&z| self.inverse(z)).collect()
    }
}

/// One Scaler per predictor column of a row-major design matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    scalers: Vec<Scaler>,
}

impl Standardizer {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let width   = rows.first().map(|r| r.len()).unwrap_or(0);
        let scalers = (0..width)
            .map(|j| {
                let column: Vec<f64> = rows.iter().map(|r| r[j]).collect();
                Scaler::fit(&column)
            })
            .collect();
        Self { scalers }
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|row| {
                row.iter()
                    .zip(&self.scalers)
                    .map(|(&v, s)| s.transform(v))
                    .collect()
            })
            .collect()
    }
}
