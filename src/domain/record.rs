// ============================================================
// Layer 3 — Record, Dataset and Split
// ============================================================
// A Record is one row of the fuel-economy table: the numeric
// values of every configured column, an optional text label
// (the car name) and the identifier assigned at load time.
//
// A Dataset owns the column names and an ordered list of
// Records. Identifiers are unique within a Dataset; the
// constructor refuses duplicates so the splitter can rely on
// identifier set arithmetic.
//
// A Split is the (train, test) pair derived from one Dataset.
//
// Reference: Rust Book §5 (Structs and Methods)
//            Rust Book §8 (Collections)

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::error::PipelineError;

/// One observation. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Sequential identifier assigned by the loader (0, 1, 2, ...)
    pub id: usize,

    /// One value per numeric column, in Dataset::columns order
    pub values: Vec<f64>,

    /// Free-text label column, e.g. "chevrolet chevelle malibu"
    pub label: Option<String>,
}

impl Record {
    pub fn new(id: usize, values: Vec<f64>, label: Option<String>) -> Self {
        Self { id, values, label }
    }
}

/// An ordered collection of Records sharing one column layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<String>,
    records: Vec<Record>,
}

impl Dataset {
    /// Build a Dataset, checking that every record has one value per
    /// column and that no identifier appears twice.
    pub fn new(columns: Vec<String>, records: Vec<Record>) -> Result<Self, PipelineError> {
        let mut seen = HashSet::with_capacity(records.len());

        for record in &records {
            if record.values.len() != columns.len() {
                return Err(PipelineError::InvalidConfig(format!(
                    "record {} has {} values for {} columns",
                    record.id,
                    record.values.len(),
                    columns.len()
                )));
            }
            if !seen.insert(record.id) {
                return Err(PipelineError::InvalidConfig(format!(
                    "duplicate record identifier {}",
                    record.id
                )));
            }
        }

        Ok(Self { columns, records })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.id).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one named column, in record order.
    pub fn column(&self, name: &str) -> Result<Vec<f64>, PipelineError> {
        let idx = self.column_index(name).ok_or_else(|| {
            PipelineError::InvalidConfig(format!("unknown column '{name}'"))
        })?;
        Ok(self.records.iter().map(|r| r.values[idx]).collect())
    }

    /// Row-major matrix of the named columns: one row per record.
    pub fn rows(&self, names: &[String]) -> Result<Vec<Vec<f64>>, PipelineError> {
        let indices = names
            .iter()
            .map(|name| {
                self.column_index(name).ok_or_else(|| {
                    PipelineError::InvalidConfig(format!("unknown column '{name}'"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self
            .records
            .iter()
            .map(|r| indices.iter().map(|&i| r.values[i]).collect())
            .collect())
    }

    /// A new Dataset holding only the records whose id is in `ids`,
    /// preserving this Dataset's order.
    pub fn subset(&self, ids: &HashSet<usize>) -> Dataset {
        Dataset {
            columns: self.columns.clone(),
            records: self
                .records
                .iter()
                .filter(|r| ids.contains(&r.id))
                .cloned()
                .collect(),
        }
    }
}

/// Disjoint train and test views of one source Dataset.
#[derive(Debug, Clone)]
pub struct Split {
    pub train: Dataset,
    pub test:  Dataset,
}

impl Split {
    pub fn train_fraction(&self) -> f64 {
        let total = self.train.len() + self.test.len();
        if total == 0 {
            return 0.0;
        }
        self.train.len() as f64 / total as f64
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn cols() -> Vec<String> {
        vec!["mpg".to_string(), "weight".to_string()]
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let records = vec![
            Record::new(0, vec![18.0, 3504.0], None),
            Record::new(0, vec![15.0, 3693.0], None),
        ];
        assert!(Dataset::new(cols(), records).is_err());
    }

    #[test]
    fn test_rejects_short_record() {
        let records = vec![Record::new(0, vec![18.0], None)];
        assert!(Dataset::new(cols(), records).is_err());
    }

    #[test]
    fn test_column_and_rows() {
        let records = vec![
            Record::new(0, vec![18.0, 3504.0], None),
            Record::new(1, vec![15.0, 3693.0], Some("buick skylark 320".into())),
        ];
        let ds = Dataset::new(cols(), records).unwrap();

        assert_eq!(ds.column("mpg").unwrap(), vec![18.0, 15.0]);
        assert_eq!(
            ds.rows(&["weight".to_string()]).unwrap(),
            vec![vec![3504.0], vec![3693.0]]
        );
        assert!(ds.column("horsepower").is_err());
    }

    #[test]
    fn test_subset_keeps_order() {
        let records = (0..5)
            .map(|i| Record::new(i, vec![i as f64, 0.0], None))
            .collect();
        let ds   = Dataset::new(cols(), records).unwrap();
        let keep = [3usize, 1].into_iter().collect();
        assert_eq!(ds.subset(&keep).ids(), vec![1, 3]);
    }
}
