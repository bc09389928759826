// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between the remote table and the model inputs:
//
//   auto-mpg.data (URL or file)
//       │
//       ▼
//   WhitespaceTableLoader → parses rows, assigns identifiers
//       │
//       ▼
//   split_train_test      → disjoint train / test Datasets
//       │
//       ▼
//   Standardizer          → train-fitted centring and scaling
//       │
//       ▼
//   model::*::bind        → BoundData for the engine
//
// Reference: Rust Book §13 (Iterators and Closures)

/// Loads the whitespace-delimited table over HTTP or from disk
pub mod loader;

/// Train-fitted standardisation of predictors and target
pub mod preprocessor;

/// Random train/test partitioning
pub mod splitter;
