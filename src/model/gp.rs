// ============================================================
// Layer 5 — Gaussian-Process Regression
// ============================================================
// Bayesian model (standardised units), non-centred:
//
//   rho    ~ half-Student-t(4, 0, 1)     length-scale
//   alpha  ~ half-Normal(0, 1)           signal amplitude
//   sigma  ~ half-Normal(0, 1)           noise scale
//   eta_i  ~ Normal(0, 1)                one per training point
//
//   K_ij   = alpha² · exp(−‖x_i − x_j‖² / (2 rho²))
//   L      = cholesky(K + jitter · I)
//   f      = L · eta                     latent function
//   y      ~ Normal(f, sigma)
//
// Generated quantities draw f_pred from the conditional GP at
// the held-out inputs and y_pred = f_pred + noise.
//
// The same covariance is built host-side with nalgebra for two
// jobs: a pre-flight positive-definiteness check of the training
// covariance, and recovering the latent function from posterior
// draws of (alpha, rho, eta) for the fitted-vs-observed plot.
//
// Reference: Stan User's Guide §10.3 (Latent variable GP)
//            Rasmussen & Williams (2006), Gaussian Processes for ML

use nalgebra::{DMatrix, DVector};

use crate::domain::error::PipelineError;
use crate::domain::fit::FitResult;
use crate::domain::spec::{BoundData, DataSlot, Dim, ModelSpec, SlotKind, SlotValue};
use crate::model::{ModelInputs, RegressionModel};

pub const DEFAULT_JITTER: f64 = 1e-9;

const PROGRAM: &str = r#"functions {
  vector gp_pred_rng(array[] vector x_new, vector y, array[] vector x,
                     real alpha, real rho, real sigma, real delta) {
    int N = rows(y);
    int N_new = size(x_new);
    vector[N_new] f_new;
    {
      matrix[N, N] K = gp_exp_quad_cov(x, alpha, rho);
      for (n in 1:N) {
        K[n, n] = K[n, n] + square(sigma);
      }
      matrix[N, N] L_K = cholesky_decompose(K);
      vector[N] K_div_y = mdivide_left_tri_low(L_K, y);
      K_div_y = mdivide_right_tri_low(K_div_y', L_K)';
      matrix[N, N_new] k_x_new = gp_exp_quad_cov(x, x_new, alpha, rho);
      vector[N_new] f_mu = k_x_new' * K_div_y;
      matrix[N, N_new] v_pred = mdivide_left_tri_low(L_K, k_x_new);
      matrix[N_new, N_new] cov_f = gp_exp_quad_cov(x_new, alpha, rho) - v_pred' * v_pred
                                   + diag_matrix(rep_vector(delta, N_new));
      f_new = multi_normal_rng(f_mu, cov_f);
    }
    return f_new;
  }
}
data {
  int<lower=1> N;
  int<lower=1> D;
  array[N] vector[D] x;
  vector[N] y;
  int<lower=0> N_new;
  array[N_new] vector[D] x_new;
  real<lower=0> jitter;
}
parameters {
  real<lower=0> rho;
  real<lower=0> alpha;
  real<lower=0> sigma;
  vector[N] eta;
}
model {
  vector[N] f;
  {
    matrix[N, N] K = gp_exp_quad_cov(x, alpha, rho);
    for (n in 1:N) {
      K[n, n] = K[n, n] + jitter;
    }
    matrix[N, N] L_K = cholesky_decompose(K);
    f = L_K * eta;
  }

  rho ~ student_t(4, 0, 1);
  alpha ~ normal(0, 1);
  sigma ~ normal(0, 1);
  eta ~ std_normal();

  y ~ normal(f, sigma);
}
generated quantities {
  vector[N_new] f_pred = gp_pred_rng(x_new, y, x, alpha, rho, sigma, jitter);
  array[N_new] real y_pred = normal_rng(f_pred, sigma);
}
"#;

pub struct GaussianProcess {
    jitter: f64,
}

impl GaussianProcess {
    pub fn new(jitter: f64) -> Self {
        Self { jitter }
    }
}

impl Default for GaussianProcess {
    fn default() -> Self {
        Self::new(DEFAULT_JITTER)
    }
}

impl RegressionModel for GaussianProcess {
    fn spec(&self) -> ModelSpec {
        ModelSpec {
            name:       "gp".to_string(),
            program:    PROGRAM.to_string(),
            slots:      vec![
                DataSlot::new("N", SlotKind::Int),
                DataSlot::new("D", SlotKind::Int),
                DataSlot::new("x", SlotKind::Matrix(Dim::slot("N"), Dim::slot("D"))),
                DataSlot::new("y", SlotKind::Vector(Dim::slot("N"))),
                DataSlot::new("N_new", SlotKind::Int),
                DataSlot::new("x_new", SlotKind::Matrix(Dim::slot("N_new"), Dim::slot("D"))),
                DataSlot::new("jitter", SlotKind::Real),
            ],
            prediction: "y_pred".to_string(),
        }
    }

    fn bind(&self, inputs: &ModelInputs) -> Result<BoundData, PipelineError> {
        if !(self.jitter >= 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "GP jitter must be non-negative, got {}",
                self.jitter
            )));
        }

        Ok(BoundData::new()
            .with("N", SlotValue::Int(inputs.x_train.len() as i64))
            .with("D", SlotValue::Int(inputs.num_predictors() as i64))
            .with("x", SlotValue::Matrix(inputs.x_train.clone()))
            .with("y", SlotValue::Vector(inputs.y_train.clone()))
            .with("N_new", SlotValue::Int(inputs.x_test.len() as i64))
            .with("x_new", SlotValue::Matrix(inputs.x_test.clone()))
            .with("jitter", SlotValue::Real(self.jitter)))
    }

    /// Factor the training covariance at unit amplitude and
    /// length-scale; duplicate inputs with too little jitter fail
    /// here instead of inside every chain.
    fn preflight(&self, inputs: &ModelInputs) -> Result<(), PipelineError> {
        let mut k = exp_quad_covariance(&inputs.x_train, 1.0, 1.0);
        add_jitter(&mut k, self.jitter);
        if k.cholesky().is_none() {
            return Err(PipelineError::sampling(
                "gp",
                format!(
                    "training covariance is not positive-definite with jitter {:e}; increase the jitter",
                    self.jitter
                ),
            ));
        }
        Ok(())
    }
}

// ─── Covariance Construction ─────────────────────────────────────────────────

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(p, q)| (p - q).powi(2)).sum()
}

/// Exponentiated-quadratic covariance between every pair of rows:
/// K_ij = amplitude² · exp(−‖x_i − x_j‖² / (2 · length_scale²)).
pub fn exp_quad_covariance(x: &[Vec<f64>], amplitude: f64, length_scale: f64) -> DMatrix<f64> {
    let n     = x.len();
    let a2    = amplitude * amplitude;
    let denom = 2.0 * length_scale * length_scale;

    DMatrix::from_fn(n, n, |i, j| a2 * (-squared_distance(&x[i], &x[j]) / denom).exp())
}

pub fn add_jitter(k: &mut DMatrix<f64>, jitter: f64) {
    for i in 0..k.nrows() {
        k[(i, i)] += jitter;
    }
}

/// f = chol(K + jitter·I) · eta.
pub fn latent_function(
    x:            &[Vec<f64>],
    amplitude:    f64,
    length_scale: f64,
    jitter:       f64,
    eta:          &[f64],
) -> Result<Vec<f64>, PipelineError> {
    if eta.len() != x.len() {
        return Err(PipelineError::Alignment { predicted: eta.len(), observed: x.len() });
    }

    let mut k = exp_quad_covariance(x, amplitude, length_scale);
    add_jitter(&mut k, jitter);

    let chol = k.cholesky().ok_or_else(|| {
        PipelineError::sampling(
            "gp",
            format!("covariance not positive-definite (alpha={amplitude}, rho={length_scale})"),
        )
    })?;

    let f = chol.l() * DVector::from_column_slice(eta);
    Ok(f.iter().copied().collect())
}

/// Posterior mean of the latent function at the training inputs,
/// averaged over at most `max_draws` evenly spaced draws.
pub fn latent_mean(
    fit:       &FitResult,
    x:         &[Vec<f64>],
    jitter:    f64,
    max_draws: usize,
) -> Result<Vec<f64>, PipelineError> {
    let missing = |name: &str| PipelineError::sampling("gp", format!("fit has no draws for '{name}'"));

    let alpha = fit.flat_draws("alpha").ok_or_else(|| missing("alpha"))?;
    let rho   = fit.flat_draws("rho").ok_or_else(|| missing("rho"))?;
    let eta: Vec<Vec<f64>> = fit
        .vector_columns("eta")
        .into_iter()
        .filter_map(|name| fit.flat_draws(name))
        .collect();

    if eta.len() != x.len() {
        return Err(PipelineError::Alignment { predicted: eta.len(), observed: x.len() });
    }

    let total = alpha.len();
    if total == 0 || max_draws == 0 {
        return Err(PipelineError::sampling("gp", "no draws to average the latent function over"));
    }
    let used  = max_draws.min(total);
    let step  = (total / used).max(1);

    let mut sum   = vec![0.0; x.len()];
    let mut count = 0usize;

    for d in (0..total).step_by(step).take(used) {
        let eta_d: Vec<f64> = eta.iter().map(|column| column[d]).collect();
        let f = latent_function(x, alpha[d], rho[d], jitter, &eta_d)?;
        for (acc, v) in sum.iter_mut().zip(f) {
            *acc += v;
        }
        count += 1;
    }

    Ok(sum.into_iter().map(|s| s / count as f64).collect())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::toy_inputs;

    #[test]
    fn test_identical_points_covary_at_amplitude_squared() {
        let x = vec![vec![0.3, -1.2], vec![0.3, -1.2]];
        let k = exp_quad_covariance(&x, 1.7, 0.5);
        for v in k.iter() {
            assert!((v - 1.7 * 1.7).abs() < 1e-12);
        }
    }

    #[test]
    fn test_infinite_length_scale_correlates_everything() {
        let x = vec![vec![0.0], vec![3.0], vec![-10.0]];
        let k = exp_quad_covariance(&x, 2.0, 1e9);
        for v in k.iter() {
            assert!((v - 4.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_covariance_decays_with_distance() {
        let x = vec![vec![0.0], vec![1.0], vec![2.0]];
        let k = exp_quad_covariance(&x, 1.0, 1.0);
        assert!(k[(0, 1)] > k[(0, 2)]);
        assert!((k[(0, 1)] - (-0.5f64).exp()).abs() < 1e-12);
        assert_eq!(k[(0, 1)], k[(1, 0)]);
    }

    #[test]
    fn test_latent_function_matches_manual_cholesky() {
        // One point: L = sqrt(alpha² + jitter), f = L · eta
        let f = latent_function(&[vec![0.0]], 2.0, 1.0, 0.0, &[0.5]).unwrap();
        assert!((f[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_duplicate_points_without_jitter_fail() {
        let x   = vec![vec![1.0], vec![1.0]];
        let err = latent_function(&x, 1.0, 1.0, 0.0, &[0.1, 0.2]).unwrap_err();
        assert!(matches!(err, PipelineError::Sampling { .. }));

        // With jitter the same inputs factor fine
        assert!(latent_function(&x, 1.0, 1.0, 1e-6, &[0.1, 0.2]).is_ok());
    }

    #[test]
    fn test_bind_and_preflight() {
        let inputs = toy_inputs();
        let model  = GaussianProcess::new(1e-6);
        let data   = model.bind(&inputs).unwrap();

        assert!(model.spec().check_bound(&data).is_ok());
        assert!(model.preflight(&inputs).is_ok());
    }

    #[test]
    fn test_latent_mean_from_fit() {
        let x = vec![vec![0.0], vec![5.0]];
        let columns: Vec<String> = ["rho", "alpha", "eta.1", "eta.2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        // Far-apart points: f ≈ alpha · eta
        let chain = vec![vec![0.1, 1.0, 1.0, -1.0], vec![0.1, 3.0, 1.0, -1.0]];
        let fit   = FitResult::from_chains("gp", &columns, &[chain]).unwrap();

        let f = latent_mean(&fit, &x, 0.0, 10).unwrap();
        assert!((f[0] - 2.0).abs() < 1e-6);
        assert!((f[1] + 2.0).abs() < 1e-6);

        let err = latent_mean(&fit, &x, 0.0, 0).unwrap_err();
        assert!(matches!(err, PipelineError::Sampling { .. }));
    }

    #[test]
    fn test_latent_mean_of_empty_fit_is_error() {
        let fit: FitResult = serde_json::from_value(serde_json::json!({
            "model_name":    "gp",
            "param_names":   ["rho", "alpha", "eta.1"],
            "params":        { "rho": [[]], "alpha": [[]], "eta.1": [[]] },
            "sampler_stats": {},
            "num_chains":    1,
            "num_draws":     0
        }))
        .unwrap();

        let err = latent_mean(&fit, &[vec![0.0]], 0.0, 10).unwrap_err();
        assert!(matches!(err, PipelineError::Sampling { .. }));
    }
}
