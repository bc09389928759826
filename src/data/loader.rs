// ============================================================
// Layer 4 — Dataset Loader
// ============================================================
// Loads the Auto MPG table: one car per line, fields separated
// by runs of whitespace, the car name double-quoted because it
// contains spaces:
//
//   18.0   8   307.0   130.0   3504.   12.0   70  1	"chevrolet chevelle malibu"
//
// The source is either an http(s) URL, fetched with reqwest's
// blocking client, or a path on disk.
//
// Parsing rules:
//   - blank lines are ignored
//   - every other line must have exactly one field per column
//   - a numeric field equal to the missing marker ("?") drops
//     the whole row; dropped rows are counted and logged
//   - any other non-numeric field in a numeric column is an error
//   - identifiers are assigned 0, 1, 2, ... over the kept rows
//
// Reference: UCI Machine Learning Repository, Auto MPG
//            reqwest crate documentation (blocking client)

use std::{fs, time::Duration};

use crate::domain::error::PipelineError;
use crate::domain::record::{Dataset, Record};
use crate::domain::traits::RecordSource;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Loads a whitespace-delimited table from a URL or a file.
/// Implements the RecordSource trait from Layer 3.
pub struct WhitespaceTableLoader {
    source:         String,
    columns:        Vec<String>,
    label_column:   Option<String>,
    missing_marker: String,
}

impl WhitespaceTableLoader {
    pub fn new(source: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            source:         source.into(),
            columns,
            label_column:   None,
            missing_marker: "?".to_string(),
        }
    }

    /// Treat `name` as a free-text column stored in Record::label.
    pub fn with_label_column(mut self, name: Option<String>) -> Self {
        self.label_column = name;
        self
    }

    pub fn with_missing_marker(mut self, marker: impl Into<String>) -> Self {
        self.missing_marker = marker.into();
        self
    }

    fn is_remote(&self) -> bool {
        self.source.starts_with("http://") || self.source.starts_with("https://")
    }

    fn fetch(&self) -> Result<String, PipelineError> {
        if !self.is_remote() {
            return fs::read_to_string(&self.source)
                .map_err(|e| PipelineError::load(&self.source, e.to_string()));
        }

        tracing::info!("Fetching dataset from {}", self.source);

        let client = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::load(&self.source, e.to_string()))?;

        let response = client
            .get(&self.source)
            .send()
            .map_err(|e| PipelineError::load(&self.source, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::load(&self.source, format!("HTTP status {status}")));
        }

        response
            .text()
            .map_err(|e| PipelineError::load(&self.source, e.to_string()))
    }

    /// Parse the raw table text into a Dataset.
    pub fn parse(&self, text: &str) -> Result<Dataset, PipelineError> {
        let label_idx = match &self.label_column {
            Some(name) => Some(self.columns.iter().position(|c| c == name).ok_or_else(|| {
                PipelineError::InvalidConfig(format!("label column '{name}' is not in the column list"))
            })?),
            None => None,
        };

        let numeric_columns: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != label_idx)
            .map(|(_, c)| c.clone())
            .collect();

        let mut records = Vec::new();
        let mut skipped = 0usize;

        for (line_no, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            let fields = split_fields(line).ok_or_else(|| {
                PipelineError::load(&self.source, format!("line {}: unterminated quote", line_no + 1))
            })?;

            if fields.len() != self.columns.len() {
                return Err(PipelineError::load(
                    &self.source,
                    format!(
                        "line {}: expected {} fields, found {}",
                        line_no + 1,
                        self.columns.len(),
                        fields.len()
                    ),
                ));
            }

            let mut values  = Vec::with_capacity(numeric_columns.len());
            let mut label   = None;
            let mut missing = false;

            for (i, field) in fields.into_iter().enumerate() {
                if Some(i) == label_idx {
                    label = Some(field);
                } else if field == self.missing_marker {
                    missing = true;
                } else {
                    let value = field.parse::<f64>().map_err(|_| {
                        PipelineError::load(
                            &self.source,
                            format!(
                                "line {}: column '{}' has non-numeric value '{}'",
                                line_no + 1,
                                self.columns[i],
                                field
                            ),
                        )
                    })?;
                    values.push(value);
                }
            }

            if missing {
                skipped += 1;
                continue;
            }

            records.push(Record::new(records.len(), values, label));
        }

        if skipped > 0 {
            tracing::warn!(
                "Skipped {} rows containing the missing marker '{}'",
                skipped,
                self.missing_marker
            );
        }

        Dataset::new(numeric_columns, records)
    }
}

impl RecordSource for WhitespaceTableLoader {
    fn load(&self) -> Result<Dataset, PipelineError> {
        let text    = self.fetch()?;
        let dataset = self.parse(&text)?;
        tracing::info!("Loaded {} records from {}", dataset.len(), self.source);
        Ok(dataset)
    }
}

/// Split one line on whitespace, keeping double-quoted runs intact.
/// Returns None for an unterminated quote.
fn split_fields(line: &str) -> Option<Vec<String>> {
    let mut fields    = Vec::new();
    let mut current   = String::new();
    let mut in_quotes = false;
    let mut in_field  = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                in_field  = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if in_field {
                    fields.push(std::mem::take(&mut current));
                    in_field = false;
                }
            }
            c => {
                current.push(c);
                in_field = true;
            }
        }
    }

    if in_quotes {
        return None;
    }
    if in_field {
        fields.push(current);
    }
    Some(fields)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
18.0   8   307.0      130.0      3504.      12.0   70  1\t\"chevrolet chevelle malibu\"
15.0   8   350.0      165.0      3693.      11.5   70  1\t\"buick skylark 320\"

25.0   4   98.00      ?          2046.      19.0   71  1\t\"ford pinto\"
18.0   8   318.0      150.0      3436.      11.0   70  1\t\"plymouth satellite\"
";

    fn columns() -> Vec<String> {
        [
            "mpg", "cylinders", "displacement", "horsepower", "weight",
            "acceleration", "model_year", "origin", "car_name",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn loader(source: &str) -> WhitespaceTableLoader {
        WhitespaceTableLoader::new(source, columns())
            .with_label_column(Some("car_name".to_string()))
    }

    #[test]
    fn test_split_fields_keeps_quoted_names() {
        let fields = split_fields("1.0  2\t\"amc rebel sst\"").unwrap();
        assert_eq!(fields, vec!["1.0", "2", "amc rebel sst"]);
        assert!(split_fields("1.0 \"open").is_none());
    }

    #[test]
    fn test_parse_skips_missing_and_assigns_sequential_ids() {
        let ds = loader("inline").parse(SAMPLE).unwrap();

        assert_eq!(ds.len(), 3);
        assert_eq!(ds.ids(), vec![0, 1, 2]);
        assert_eq!(ds.columns().len(), 8);
        assert_eq!(ds.column("weight").unwrap(), vec![3504.0, 3693.0, 3436.0]);
        assert_eq!(ds.records()[2].label.as_deref(), Some("plymouth satellite"));
    }

    #[test]
    fn test_column_count_mismatch_is_load_error() {
        let err = loader("inline").parse("18.0 8 307.0\n").unwrap_err();
        assert!(matches!(err, PipelineError::Load { .. }));
    }

    #[test]
    fn test_non_numeric_value_is_load_error() {
        let line = "abc 8 307.0 130.0 3504. 12.0 70 1 \"x\"\n";
        assert!(matches!(
            loader("inline").parse(line),
            Err(PipelineError::Load { .. })
        ));
    }

    #[test]
    fn test_unknown_label_column_rejected() {
        let l = WhitespaceTableLoader::new("inline", vec!["mpg".to_string()])
            .with_label_column(Some("car_name".to_string()));
        assert!(matches!(l.parse("1.0"), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(SAMPLE.as_bytes()).expect("write sample");

        let ds = loader(file.path().to_str().unwrap()).load().unwrap();
        assert_eq!(ds.len(), 3);
    }

    #[test]
    fn test_unreachable_file_is_load_error() {
        let err = loader("/definitely/not/here/auto-mpg.data").load().unwrap_err();
        assert!(matches!(err, PipelineError::Load { .. }));
    }
}
