// ============================================================
// Layer 2 — Inspect Use Case
// ============================================================
// Loads the configured dataset and summarises each numeric
// column, a quick check of the source before spending minutes
// in the sampler.

use anyhow::Result;

use crate::application::fit_use_case::{load_dataset, DataConfig};
use crate::domain::record::Dataset;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSummary {
    pub name: String,
    pub mean: f64,
    pub sd:   f64,
    pub min:  f64,
    pub max:  f64,
}

#[derive(Debug, Clone)]
pub struct DatasetSummary {
    pub records:  usize,
    pub labelled: usize,
    pub columns:  Vec<ColumnSummary>,
}

impl DatasetSummary {
    pub fn of(dataset: &Dataset) -> Result<Self> {
        let columns = dataset
            .columns()
            .iter()
            .map(|name| -> Result<ColumnSummary> {
                let values = dataset.column(name)?;
                Ok(summarise_column(name, &values))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            records:  dataset.len(),
            labelled: dataset.records().iter().filter(|r| r.label.is_some()).count(),
            columns,
        })
    }

    pub fn to_table(&self) -> String {
        let mut lines = vec![
            format!("{} records ({} labelled)", self.records, self.labelled),
            format!("{:<14} {:>10} {:>10} {:>10} {:>10}", "column", "mean", "sd", "min", "max"),
        ];
        for c in &self.columns {
            lines.push(format!(
                "{:<14} {:>10.3} {:>10.3} {:>10.3} {:>10.3}",
                c.name, c.mean, c.sd, c.min, c.max
            ));
        }
        lines.join("\n")
    }
}

fn summarise_column(name: &str, values: &[f64]) -> ColumnSummary {
    let n    = values.len().max(1) as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var  = if values.len() > 1 {
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
    } else {
        0.0
    };

    ColumnSummary {
        name: name.to_string(),
        mean,
        sd:   var.sqrt(),
        min:  values.iter().copied().fold(f64::INFINITY, f64::min),
        max:  values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

pub struct InspectUseCase {
    config: DataConfig,
}

impl InspectUseCase {
    pub fn new(config: DataConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<DatasetSummary> {
        let dataset = load_dataset(&self.config)?;
        DatasetSummary::of(&dataset)
    }
}
