// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates the other layers to accomplish one
// goal per command (fit, report, inspect).
//
// Rules for this layer:
//   - No model or sampler code here
//   - No printing here (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The load → split → sample → evaluate workflow, and PipelineConfig
pub mod fit_use_case;

// Diagnostics and plots from a persisted fit
pub mod report_use_case;

// Dataset column summaries
pub mod inspect_use_case;
