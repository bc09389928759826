// ============================================================
// Layer 6 — Posterior Diagnostics
// ============================================================
// Per-parameter summary of a FitResult:
//
//   mean, sd        over every chain and draw
//   central interval  [q(α/2), q(1 − α/2)] for interval_prob 1 − α
//   split R-hat     each chain halved, then the classic
//                   potential scale reduction over 2M halves
//   bulk ESS        ESS of rank-normalised draws
//   tail ESS        min ESS of the 5% / 95% indicator chains
//   MCSE            sd / sqrt(bulk ESS)
//
// ESS uses Geyer's initial positive sequence on the combined
// autocorrelation of the split chains.
//
// Chains shorter than 4 draws cannot be split meaningfully;
// R-hat and the ESS figures are NaN for them.
//
// Reference: Vehtari et al. (2021), "Rank-normalization, folding,
//            and localization: an improved R-hat"
//            statrs documentation (ContinuousCDF::inverse_cdf)

use std::fmt::Write as _;

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::domain::fit::FitResult;

/// R-hat above this flags a parameter as not converged.
pub const RHAT_WARN: f64 = 1.05;

/// Bulk or tail ESS below this flags a parameter as poorly mixed.
pub const ESS_WARN: f64 = 400.0;

const MIN_DRAWS: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamDiagnostics {
    pub name:     String,
    pub mean:     f64,
    pub sd:       f64,
    pub lower:    f64,
    pub upper:    f64,
    pub ess_bulk: f64,
    pub ess_tail: f64,
    pub r_hat:    f64,
    pub mcse:     f64,
}

impl ParamDiagnostics {
    pub fn flagged(&self) -> bool {
        !self.r_hat.is_finite()
            || self.r_hat > RHAT_WARN
            || self.ess_bulk < ESS_WARN
            || self.ess_tail < ESS_WARN
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticsReport {
    pub model_name:    String,
    pub params:        Vec<ParamDiagnostics>,
    pub num_chains:    usize,
    pub num_draws:     usize,
    pub interval_prob: f64,
    pub accept_rates:  Vec<f64>,
    pub divergences:   usize,
}

impl DiagnosticsReport {
    /// Sampler warnings, one line each. Empty when nothing is off.
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();

        let bad_rhat: Vec<&str> = self
            .params
            .iter()
            .filter(|p| !p.r_hat.is_finite() || p.r_hat > RHAT_WARN)
            .map(|p| p.name.as_str())
            .collect();
        if !bad_rhat.is_empty() {
            out.push(format!("R-hat > {RHAT_WARN} for: {}", bad_rhat.join(", ")));
        }

        let low_ess = self
            .params
            .iter()
            .filter(|p| p.ess_bulk < ESS_WARN || p.ess_tail < ESS_WARN)
            .count();
        if low_ess > 0 {
            out.push(format!("{low_ess} parameter(s) with ESS < {ESS_WARN}"));
        }

        if self.divergences > 0 {
            out.push(format!("{} divergent transitions after warm-up", self.divergences));
        }
        out
    }

    /// Fixed-width text table, one row per parameter.
    pub fn to_table(&self) -> String {
        let pct = self.interval_prob * 100.0;
        let lo  = format!("{:.1}%", (100.0 - pct) / 2.0);
        let hi  = format!("{:.1}%", 100.0 - (100.0 - pct) / 2.0);

        let mut s = String::new();
        let _ = writeln!(
            s,
            "{}: {} chains × {} draws",
            self.model_name, self.num_chains, self.num_draws
        );
        let _ = writeln!(
            s,
            "{:<14} {:>10} {:>9} {:>10} {:>10} {:>9} {:>9} {:>7} {:>9}",
            "parameter", "mean", "sd", lo, hi, "ess_bulk", "ess_tail", "r_hat", "mcse"
        );
        let _ = writeln!(s, "{}", "─".repeat(96));

        for p in &self.params {
            let _ = writeln!(
                s,
                "{:<14} {:>10.4} {:>9.4} {:>10.4} {:>10.4} {:>9} {:>9} {:>7.3} {:>9.5}{}",
                p.name,
                p.mean,
                p.sd,
                p.lower,
                p.upper,
                fmt_ess(p.ess_bulk),
                fmt_ess(p.ess_tail),
                p.r_hat,
                p.mcse,
                if p.flagged() { "  *" } else { "" },
            );
        }
        let _ = writeln!(s, "{}", "─".repeat(96));

        if !self.accept_rates.is_empty() {
            let mean_accept =
                self.accept_rates.iter().sum::<f64>() / self.accept_rates.len() as f64;
            let _ = writeln!(
                s,
                "mean accept rate {:.3}  divergences {}",
                mean_accept, self.divergences
            );
        }
        for w in self.warnings() {
            let _ = writeln!(s, "warning: {w}");
        }
        s
    }
}

fn fmt_ess(v: f64) -> String {
    if v.is_finite() { format!("{v:.0}") } else { "NaN".to_string() }
}

/// Summarise `names` (every scalar parameter when empty).
pub fn summarize(fit: &FitResult, names: &[String], interval_prob: f64) -> DiagnosticsReport {
    let selected: Vec<String> = if names.is_empty() {
        fit.scalar_names().into_iter().map(String::from).collect()
    } else {
        names.to_vec()
    };

    let alpha = (1.0 - interval_prob.clamp(0.0, 1.0)) / 2.0;

    let params = selected
        .iter()
        .filter_map(|name| {
            let chains = fit.draws(name)?;
            Some(param_diagnostics(name, chains, alpha))
        })
        .collect();

    DiagnosticsReport {
        model_name: fit.model_name().to_string(),
        params,
        num_chains: fit.num_chains(),
        num_draws: fit.num_draws(),
        interval_prob,
        accept_rates: fit.accept_rates(),
        divergences: fit.divergences(),
    }
}

fn param_diagnostics(name: &str, chains: &[Vec<f64>], alpha: f64) -> ParamDiagnostics {
    let mut all: Vec<f64> = chains.iter().flat_map(|c| c.iter().copied()).collect();
    let mean = mean(&all);
    let sd   = sample_sd(&all, mean);
    all.sort_unstable_by(f64::total_cmp);

    let long_enough = chains.iter().all(|c| c.len() >= MIN_DRAWS);
    let (ess_bulk, ess_tail, r_hat) = if long_enough {
        (ess_bulk(chains), ess_tail(chains), split_r_hat(chains))
    } else {
        (f64::NAN, f64::NAN, f64::NAN)
    };

    ParamDiagnostics {
        name: name.to_string(),
        mean,
        sd,
        lower: quantile_sorted(&all, alpha),
        upper: quantile_sorted(&all, 1.0 - alpha),
        ess_bulk,
        ess_tail,
        r_hat,
        mcse: if ess_bulk > 0.0 { sd / ess_bulk.sqrt() } else { f64::NAN },
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn sample_sd(xs: &[f64], mean: f64) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let ss: f64 = xs.iter().map(|x| (x - mean).powi(2)).sum();
    (ss / (xs.len() - 1) as f64).sqrt()
}

/// Linear-interpolated quantile of sorted data.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos  = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo   = pos.floor() as usize;
    let hi   = (pos.ceil() as usize).min(sorted.len() - 1);
    let frac = pos - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

fn split_chains(chains: &[Vec<f64>]) -> Vec<&[f64]> {
    chains
        .iter()
        .flat_map(|c| {
            let half = c.len() / 2;
            // An odd draw count drops the middle draw so halves match.
            [&c[..half], &c[c.len() - half..]]
        })
        .collect()
}

/// Between-chain (B/n) and mean within-chain (W) variances.
fn variance_components(split: &[&[f64]]) -> (f64, f64) {
    let m = split.len() as f64;
    let n = split[0].len() as f64;

    let means: Vec<f64> = split.iter().map(|c| mean(c)).collect();
    let grand = means.iter().sum::<f64>() / m;

    let b_over_n = means.iter().map(|cm| (cm - grand).powi(2)).sum::<f64>() / (m - 1.0);
    let w = split
        .iter()
        .zip(&means)
        .map(|(c, cm)| c.iter().map(|x| (x - cm).powi(2)).sum::<f64>() / (n - 1.0))
        .sum::<f64>()
        / m;
    (b_over_n, w)
}

pub fn split_r_hat(chains: &[Vec<f64>]) -> f64 {
    let split = split_chains(chains);
    let n = split[0].len() as f64;
    let (b_over_n, w) = variance_components(&split);

    if w < 1e-30 {
        return f64::NAN;
    }
    let var_plus = (n - 1.0) / n * w + b_over_n;
    (var_plus / w).sqrt()
}

pub fn ess_bulk(chains: &[Vec<f64>]) -> f64 {
    ess(&rank_normalize(chains))
}

pub fn ess_tail(chains: &[Vec<f64>]) -> f64 {
    let mut all: Vec<f64> = chains.iter().flat_map(|c| c.iter().copied()).collect();
    all.sort_unstable_by(f64::total_cmp);
    let q05 = quantile_sorted(&all, 0.05);
    let q95 = quantile_sorted(&all, 0.95);

    let indicator = |pred: &dyn Fn(f64) -> bool| -> Vec<Vec<f64>> {
        chains
            .iter()
            .map(|c| c.iter().map(|&x| if pred(x) { 1.0 } else { 0.0 }).collect())
            .collect()
    };
    let lower = indicator(&|x| x <= q05);
    let upper = indicator(&|x| x >= q95);

    ess(&lower).min(ess(&upper))
}

/// Normal scores Φ⁻¹((r − 3/8) / (S + 1/4)) of the pooled ranks,
/// averaging ranks over ties.
fn rank_normalize(chains: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut indexed: Vec<(f64, usize, usize)> = chains
        .iter()
        .enumerate()
        .flat_map(|(c, chain)| chain.iter().enumerate().map(move |(d, &v)| (v, c, d)))
        .collect();
    indexed.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

    let total = indexed.len() as f64;
    let mut out: Vec<Vec<f64>> = chains.iter().map(|c| vec![0.0; c.len()]).collect();

    let standard = match Normal::new(0.0, 1.0) {
        Ok(n) => n,
        Err(_) => return out,
    };

    let mut i = 0;
    while i < indexed.len() {
        let mut j = i;
        while j < indexed.len() && indexed[j].0 == indexed[i].0 {
            j += 1;
        }
        let rank  = (i + j + 1) as f64 / 2.0;
        let score = standard.inverse_cdf((rank - 0.375) / (total + 0.25));
        for &(_, c, d) in &indexed[i..j] {
            out[c][d] = score;
        }
        i = j;
    }
    out
}

fn ess(chains: &[Vec<f64>]) -> f64 {
    let split = split_chains(chains);
    let m = split.len() as f64;
    let n = split[0].len();
    let n_f = n as f64;

    let (b_over_n, w) = variance_components(&split);
    if w < 1e-30 {
        return f64::NAN;
    }
    let var_plus = (n_f - 1.0) / n_f * w + b_over_n;

    let means: Vec<f64> = split.iter().map(|c| mean(c)).collect();
    let rho = |lag: usize| -> f64 {
        let acov: f64 = split
            .iter()
            .zip(&means)
            .map(|(c, cm)| {
                (0..n - lag).map(|t| (c[t] - cm) * (c[t + lag] - cm)).sum::<f64>() / n_f
            })
            .sum::<f64>()
            / m;
        1.0 - (w - acov) / var_plus
    };

    // Geyer: sum consecutive pairs of autocorrelations while positive.
    let mut tau = -1.0;
    let mut t = 0;
    while t + 1 < n {
        let pair = rho(t) + rho(t + 1);
        if pair < 0.0 {
            break;
        }
        tau += 2.0 * pair;
        t += 2;
    }
    let tau = tau.max(1.0 / (m * n_f).log10().max(1.0));

    m * n_f / tau
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn param<'a>(report: &'a DiagnosticsReport, name: &str) -> &'a ParamDiagnostics {
        report.params.iter().find(|p| p.name == name).expect("parameter in report")
    }

    fn iid_chains(seed: u64, chains: usize, draws: usize, offset: f64) -> Vec<Vec<f64>> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        (0..chains)
            .map(|c| {
                (0..draws)
                    .map(|_| rng.gen::<f64>() + if c == 0 { offset } else { 0.0 })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_r_hat_near_one_for_mixed_chains() {
        let rh = split_r_hat(&iid_chains(1, 4, 1000, 0.0));
        assert!((rh - 1.0).abs() < 0.02, "r_hat = {rh}");
    }

    #[test]
    fn test_r_hat_large_for_separated_chains() {
        let rh = split_r_hat(&iid_chains(2, 4, 500, 50.0));
        assert!(rh > 1.5, "r_hat = {rh}");
    }

    #[test]
    fn test_ess_of_independent_draws_is_close_to_sample_size() {
        let chains = iid_chains(3, 4, 1000, 0.0);
        let bulk   = ess_bulk(&chains);
        assert!(bulk > 2500.0 && bulk < 6000.0, "ess_bulk = {bulk}");
        assert!(ess_tail(&chains) > 1000.0);
    }

    #[test]
    fn test_ess_drops_for_autocorrelated_draws() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let chains: Vec<Vec<f64>> = (0..4)
            .map(|_| {
                let mut x = 0.0;
                (0..1000)
                    .map(|_| {
                        x = 0.95 * x + rng.gen::<f64>() - 0.5;
                        x
                    })
                    .collect()
            })
            .collect();
        assert!(ess_bulk(&chains) < 800.0);
    }

    #[test]
    fn test_quantile_interpolates() {
        let sorted = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile_sorted(&sorted, 0.5), 2.0);
        assert_eq!(quantile_sorted(&sorted, 0.125), 0.5);
        assert!(quantile_sorted(&[], 0.5).is_nan());
    }

    #[test]
    fn test_summarize_reports_scalars_and_table() {
        let chains = iid_chains(5, 2, 200, 0.0);
        let columns: Vec<String> = ["accept_stat__", "divergent__", "sigma", "y_pred.1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let tables: Vec<Vec<Vec<f64>>> = chains
            .iter()
            .map(|c| c.iter().map(|&v| vec![0.9, 0.0, v, 2.0 * v]).collect())
            .collect();
        let fit = FitResult::from_chains("linear", &columns, &tables).unwrap();

        let report = summarize(&fit, &[], 0.9);
        assert_eq!(report.params.len(), 1);

        let sigma = param(&report, "sigma");
        assert!(sigma.lower < sigma.mean && sigma.mean < sigma.upper);
        assert!(sigma.mcse > 0.0);

        let table = report.to_table();
        assert!(table.contains("sigma"));
        assert!(table.contains("5.0%"));
        assert!(table.contains("95.0%"));
        assert!(table.contains("mean accept rate 0.900"));
    }

    #[test]
    fn test_short_chains_give_nan_diagnostics() {
        let columns = vec!["alpha".to_string()];
        let fit = FitResult::from_chains("linear", &columns, &[vec![vec![1.0], vec![2.0]]]).unwrap();
        let report = summarize(&fit, &["alpha".to_string()], 0.9);
        let alpha = param(&report, "alpha");
        assert!(alpha.r_hat.is_nan());
        assert!(alpha.flagged());
        assert_eq!(alpha.mean, 1.5);
    }
}
