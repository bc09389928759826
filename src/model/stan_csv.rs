// ============================================================
// Layer 5 — Stan CSV Reader
// ============================================================
// CmdStan writes one CSV file per chain:
//
//   # model = linear                 ← configuration comments
//   lp__,accept_stat__,...,alpha,beta.1,beta.2,sigma,y_pred.1,...
//   # Adaptation terminated          ← adaptation comments
//   # Step size = 0.42
//   -120.3,0.93,...                  ← one row per kept draw
//   # Elapsed Time: ...              ← timing comments
//
// Comment lines are skipped by the csv reader; the header row
// gives the column names, every other row is one draw.
//
// Reference: CmdStan Guide, "Stan CSV File Format"
//            csv crate documentation (ReaderBuilder::comment)

use std::path::Path;

use crate::domain::error::PipelineError;

/// Column names and rows of one chain's output.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainTable {
    pub columns: Vec<String>,
    pub rows:    Vec<Vec<f64>>,
}

/// Read one chain's CSV file. `model` is used in error messages.
pub fn read_chain(path: &Path, model: &str) -> Result<ChainTable, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| {
            PipelineError::sampling(model, format!("cannot open '{}': {e}", path.display()))
        })?;

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| PipelineError::sampling(model, format!("bad header in '{}': {e}", path.display())))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if columns.is_empty() {
        return Err(PipelineError::sampling(
            model,
            format!("'{}' has no header row", path.display()),
        ));
    }

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| {
            PipelineError::sampling(model, format!("'{}' row {}: {e}", path.display(), i + 1))
        })?;

        let row = record
            .iter()
            .map(|field| field.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                PipelineError::sampling(
                    model,
                    format!("'{}' row {}: non-numeric value ({e})", path.display(), i + 1),
                )
            })?;
        rows.push(row);
    }

    tracing::debug!("Read {} draws × {} columns from {}", rows.len(), columns.len(), path.display());

    Ok(ChainTable { columns, rows })
}
