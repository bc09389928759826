// ============================================================
// Layer 3 — Pipeline Errors
// ============================================================
// Every failure the pipeline can report, one variant per kind:
//
//   Load            — dataset source unreachable or malformed
//   Compile         — model program or its bound data rejected
//   Sampling        — numerical or process failure while sampling
//   SamplingTimeout — the chains exceeded the configured budget
//   Alignment       — predictions and observations differ in length
//   InvalidConfig   — a configuration value is out of range
//   Io / Json       — artifact persistence failures
//
// Library layers return Result<_, PipelineError>. The application
// and CLI layers wrap these in anyhow with extra context.
//
// Reference: Rust Book §9 (Recoverable Errors with Result)
//            thiserror crate documentation

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to load dataset from '{source_locator}': {message}")]
    Load {
        source_locator: String,
        message:        String,
    },

    #[error("model '{model}' failed to compile: {message}")]
    Compile { model: String, message: String },

    #[error("sampling model '{model}' failed: {message}")]
    Sampling { model: String, message: String },

    #[error("sampling model '{model}' exceeded the {}s timeout", .limit.as_secs())]
    SamplingTimeout { model: String, limit: Duration },

    #[error("cannot align {predicted} predictions with {observed} observations")]
    Alignment { predicted: usize, observed: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn load(source_locator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            source_locator: source_locator.into(),
            message:        message.into(),
        }
    }

    pub fn compile(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compile {
            model:   model.into(),
            message: message.into(),
        }
    }

    pub fn sampling(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Sampling {
            model:   model.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_reports_seconds() {
        let err = PipelineError::SamplingTimeout {
            model: "gp".to_string(),
            limit: Duration::from_secs(90),
        };
        assert_eq!(err.to_string(), "sampling model 'gp' exceeded the 90s timeout");
    }

    #[test]
    fn test_alignment_message() {
        let err = PipelineError::Alignment { predicted: 3, observed: 4 };
        assert!(err.to_string().contains("3 predictions"));
    }
}
