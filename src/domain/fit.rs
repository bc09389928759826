// ============================================================
// Layer 3 — FitResult
// ============================================================
// The output of one sampler invocation. Every column the engine
// reports is stored as draws[chain][draw]:
//
//   params        — model parameters and generated quantities,
//                   e.g. "alpha", "beta.2", "y_pred.17"
//   sampler_stats — engine bookkeeping columns ending in "__",
//                   e.g. "lp__", "accept_stat__", "divergent__"
//
// Vector-valued quantities are flattened by the engine into
// "name.1", "name.2", ... (1-based). vector_columns() recovers
// them in index order.
//
// A FitResult is read-only after construction. Summaries are
// computed on demand by infra::diagnostics.
//
// JSON has no NaN or infinity, so non-finite draws are written
// as the strings "NaN", "inf" and "-inf".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    model_name:    String,
    param_names:   Vec<String>,
    #[serde(with = "draws_json")]
    params:        BTreeMap<String, Vec<Vec<f64>>>,
    #[serde(with = "draws_json")]
    sampler_stats: BTreeMap<String, Vec<Vec<f64>>>,
    num_chains:    usize,
    num_draws:     usize,
}

impl FitResult {
    /// Assemble a fit from per-chain tables: `chains[c][d][k]` is the
    /// value of `columns[k]` at draw `d` of chain `c`. Every chain must
    /// hold the same number of draws.
    pub fn from_chains(
        model_name: &str,
        columns: &[String],
        chains: &[Vec<Vec<f64>>],
    ) -> Result<Self, PipelineError> {
        let num_chains = chains.len();
        let num_draws  = chains.first().map(|c| c.len()).unwrap_or(0);

        if num_chains == 0 || num_draws == 0 {
            return Err(PipelineError::sampling(model_name, "sampler returned no draws"));
        }

        for (c, chain) in chains.iter().enumerate() {
            if chain.len() != num_draws {
                return Err(PipelineError::sampling(
                    model_name,
                    format!("chain {} has {} draws, expected {num_draws}", c + 1, chain.len()),
                ));
            }
            if let Some(row) = chain.iter().find(|row| row.len() != columns.len()) {
                return Err(PipelineError::sampling(
                    model_name,
                    format!("chain {} has a row of {} values for {} columns", c + 1, row.len(), columns.len()),
                ));
            }
        }

        let mut params        = BTreeMap::new();
        let mut sampler_stats = BTreeMap::new();
        let mut param_names   = Vec::new();

        for (k, column) in columns.iter().enumerate() {
            let per_chain: Vec<Vec<f64>> = chains
                .iter()
                .map(|chain| chain.iter().map(|row| row[k]).collect())
                .collect();

            if column.ends_with("__") {
                sampler_stats.insert(column.clone(), per_chain);
            } else {
                param_names.push(column.clone());
                params.insert(column.clone(), per_chain);
            }
        }

        Ok(Self {
            model_name: model_name.to_string(),
            param_names,
            params,
            sampler_stats,
            num_chains,
            num_draws,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Parameter and generated-quantity names in engine column order.
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn num_chains(&self) -> usize {
        self.num_chains
    }

    /// Draws per chain (post warm-up).
    pub fn num_draws(&self) -> usize {
        self.num_draws
    }

    pub fn draws(&self, name: &str) -> Option<&[Vec<f64>]> {
        self.params.get(name).map(|v| v.as_slice())
    }

    /// All draws of one parameter with chains concatenated.
    pub fn flat_draws(&self, name: &str) -> Option<Vec<f64>> {
        self.draws(name)
            .map(|chains| chains.iter().flat_map(|c| c.iter().copied()).collect())
    }

    pub fn stat(&self, name: &str) -> Option<&[Vec<f64>]> {
        self.sampler_stats.get(name).map(|v| v.as_slice())
    }

    /// Column names "base.1", "base.2", ... sorted by index.
    pub fn vector_columns(&self, base: &str) -> Vec<&str> {
        let prefix = format!("{base}.");
        let mut indexed: Vec<(usize, &str)> = self
            .param_names
            .iter()
            .filter_map(|name| {
                let idx = name.strip_prefix(&prefix)?.parse::<usize>().ok()?;
                Some((idx, name.as_str()))
            })
            .collect();
        indexed.sort_unstable_by_key(|(idx, _)| *idx);
        indexed.into_iter().map(|(_, name)| name).collect()
    }

    /// Scalar parameters: names without an index suffix.
    pub fn scalar_names(&self) -> Vec<&str> {
        self.param_names
            .iter()
            .filter(|n| !n.contains('.'))
            .map(|n| n.as_str())
            .collect()
    }

    pub fn mean(&self, name: &str) -> Option<f64> {
        let flat = self.flat_draws(name)?;
        Some(flat.iter().sum::<f64>() / flat.len() as f64)
    }

    /// Total divergent transitions across chains.
    pub fn divergences(&self) -> usize {
        self.stat("divergent__")
            .map(|chains| {
                chains
                    .iter()
                    .flat_map(|c| c.iter())
                    .filter(|&&v| v > 0.5)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Mean acceptance statistic per chain, empty if not reported.
    pub fn accept_rates(&self) -> Vec<f64> {
        self.stat("accept_stat__")
            .map(|chains| {
                chains
                    .iter()
                    .map(|c| c.iter().sum::<f64>() / c.len() as f64)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Serde adapter for draw tables that may hold NaN or ±infinity.
mod draws_json {
    use std::collections::BTreeMap;

    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

    type Draws = BTreeMap<String, Vec<Vec<f64>>>;

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Value {
        Number(f64),
        Special(String),
    }

    fn encode(v: f64) -> Value {
        if v.is_nan() {
            Value::Special("NaN".into())
        } else if v == f64::INFINITY {
            Value::Special("inf".into())
        } else if v == f64::NEG_INFINITY {
            Value::Special("-inf".into())
        } else {
            Value::Number(v)
        }
    }

    fn decode(v: Value) -> Result<f64, String> {
        match v {
            Value::Number(x) => Ok(x),
            Value::Special(text) => match text.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(format!("'{other}' is not a draw value")),
            },
        }
    }

    pub fn serialize<S: Serializer>(draws: &Draws, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded: BTreeMap<&str, Vec<Vec<Value>>> = draws
            .iter()
            .map(|(name, chains)| {
                let chains = chains
                    .iter()
                    .map(|chain| chain.iter().map(|&v| encode(v)).collect())
                    .collect();
                (name.as_str(), chains)
            })
            .collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Draws, D::Error> {
        let encoded = BTreeMap::<String, Vec<Vec<Value>>>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(name, chains)| {
                let chains = chains
                    .into_iter()
                    .map(|chain| chain.into_iter().map(decode).collect::<Result<Vec<_>, _>>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(D::Error::custom)?;
                Ok((name, chains))
            })
            .collect()
    }
}
