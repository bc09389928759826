// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums and traits that name the core
// concepts of the pipeline:
//
//   record.rs — Record, Dataset and Split (the observations)
//   spec.rs   — ModelSpec, data slots, BoundData, SamplerConfig
//   fit.rs    — FitResult (posterior draws per chain)
//   error.rs  — PipelineError, the typed failure kinds
//   traits.rs — RecordSource and PosteriorSampler seams
//
// Rules for this layer:
//   - NO network, process or file I/O
//   - NO knowledge of CmdStan or of the concrete models
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

pub mod record;

pub mod spec;

pub mod fit;

pub mod error;

pub mod traits;
