// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The two seams where the pipeline meets the outside world:
//
//   RecordSource     — anything that yields a Dataset
//                      (HTTP resource, local file)
//   PosteriorSampler — anything that turns a bound ModelSpec
//                      into posterior draws (CmdStan, or a stub
//                      in tests)
//
// The application layer only sees these traits, so the use
// cases can be exercised without network access or a Stan
// installation.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)
//            Rust Book §17 (Trait Objects)

use crate::domain::error::PipelineError;
use crate::domain::fit::FitResult;
use crate::domain::record::Dataset;
use crate::domain::spec::{BoundData, ModelSpec, SamplerConfig};

// ─── RecordSource ─────────────────────────────────────────────────────────────
/// Any component that can load the observation table.
///
/// Implementations:
///   - WhitespaceTableLoader → HTTP(S) URL or local file
pub trait RecordSource {
    /// Load every record, assigning identifiers in load order.
    fn load(&self) -> Result<Dataset, PipelineError>;
}

// ─── PosteriorSampler ─────────────────────────────────────────────────────────
/// Any engine that compiles a model and draws from its posterior.
///
/// Implementations:
///   - CmdStanEngine → compiles with CmdStan and runs NUTS chains
pub trait PosteriorSampler {
    /// Compile `spec`, bind `data`, and sample with `config`.
    ///
    /// Errors: Compile for a malformed program or data, Sampling for
    /// a numerical or process failure, SamplingTimeout when the chains
    /// outlive `config.timeout_secs`.
    fn sample(
        &self,
        spec:   &ModelSpec,
        data:   &BoundData,
        config: &SamplerConfig,
    ) -> Result<FitResult, PipelineError>;
}
