// ============================================================
// Layer 5 — Parametric Linear Regression
// ============================================================
// Bayesian model (standardised units):
//
//   alpha   ~ Normal(0, 10)          intercept
//   beta_k  ~ Normal(0, 10)          one slope per predictor
//   sigma   ~ half-Cauchy(0, 10)     noise scale
//   y       ~ Normal(alpha + X·beta, sigma)
//
//   y_pred  = Normal_rng(alpha + X_new·beta, sigma)   per draw
//
// The frequentist counterpart is ordinary least squares on the
// same standardised predictors, solved with nalgebra's SVD so a
// rank-deficient design still yields the minimum-norm answer.
//
// Reference: Gelman et al., Bayesian Data Analysis §14
//            nalgebra documentation (SVD::solve)

use nalgebra::{DMatrix, DVector};

use crate::domain::error::PipelineError;
use crate::domain::spec::{BoundData, DataSlot, Dim, ModelSpec, SlotKind, SlotValue};
use crate::model::{ModelInputs, RegressionModel};

const PROGRAM: &str = r#"data {
  int<lower=1> N;
  int<lower=1> K;
  matrix[N, K] x;
  vector[N] y;
  int<lower=0> N_new;
  matrix[N_new, K] x_new;
}
parameters {
  real alpha;
  vector[K] beta;
  real<lower=0> sigma;
}
model {
  alpha ~ normal(0, 10);
  beta ~ normal(0, 10);
  sigma ~ cauchy(0, 10);
  y ~ normal(alpha + x * beta, sigma);
}
generated quantities {
  array[N_new] real y_pred = normal_rng(alpha + x_new * beta, sigma);
}
"#;

pub struct LinearRegression;

impl RegressionModel for LinearRegression {
    fn spec(&self) -> ModelSpec {
        ModelSpec {
            name:       "linear".to_string(),
            program:    PROGRAM.to_string(),
            slots:      vec![
                DataSlot::new("N", SlotKind::Int),
                DataSlot::new("K", SlotKind::Int),
                DataSlot::new("x", SlotKind::Matrix(Dim::slot("N"), Dim::slot("K"))),
                DataSlot::new("y", SlotKind::Vector(Dim::slot("N"))),
                DataSlot::new("N_new", SlotKind::Int),
                DataSlot::new("x_new", SlotKind::Matrix(Dim::slot("N_new"), Dim::slot("K"))),
            ],
            prediction: "y_pred".to_string(),
        }
    }

    fn bind(&self, inputs: &ModelInputs) -> Result<BoundData, PipelineError> {
        Ok(BoundData::new()
            .with("N", SlotValue::Int(inputs.x_train.len() as i64))
            .with("K", SlotValue::Int(inputs.num_predictors() as i64))
            .with("x", SlotValue::Matrix(inputs.x_train.clone()))
            .with("y", SlotValue::Vector(inputs.y_train.clone()))
            .with("N_new", SlotValue::Int(inputs.x_test.len() as i64))
            .with("x_new", SlotValue::Matrix(inputs.x_test.clone())))
    }
}

// ─── Ordinary Least Squares Baseline ─────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    pub intercept: f64,
    pub slopes:    Vec<f64>,
}

impl OlsFit {
    pub fn predict(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter()
            .map(|row| {
                self.intercept
                    + row.iter().zip(&self.slopes).map(|(v, b)| v * b).sum::<f64>()
            })
            .collect()
    }
}

/// Least-squares fit of y on [1, x].
pub fn fit_ols(x: &[Vec<f64>], y: &[f64]) -> Result<OlsFit, PipelineError> {
    let n = x.len();
    let k = x.first().map(|r| r.len()).unwrap_or(0);

    if n == 0 || n != y.len() {
        return Err(PipelineError::Alignment { predicted: n, observed: y.len() });
    }

    let design = DMatrix::from_fn(n, k + 1, |i, j| if j == 0 { 1.0 } else { x[i][j - 1] });
    let target = DVector::from_column_slice(y);

    let coef = design
        .svd(true, true)
        .solve(&target, 1e-12)
        .map_err(|e| PipelineError::InvalidConfig(format!("least squares failed: {e}")))?;

    Ok(OlsFit {
        intercept: coef[0],
        slopes:    coef.iter().skip(1).copied().collect(),
    })
}
