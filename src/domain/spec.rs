// ============================================================
// Layer 3 — Model Specification and Bound Data
// ============================================================
// A ModelSpec is the declarative description handed to the
// probabilistic-programming engine:
//
//   name       — used for artifact directories and log lines
//   program    — the Stan program text (priors, likelihood,
//                generated quantities)
//   slots      — the data block: every input the program reads,
//                with its kind and shape
//   prediction — name of the generated quantity holding the
//                held-out predictive draws
//
// Shapes refer to other integer slots by name, e.g. a vector
// slot `y` of length `N`. BoundData maps slot names to values;
// ModelSpec::check_bound verifies every slot is present and
// every shape agrees before the engine is ever started.
//
// SamplerConfig carries the chain/iteration/adaptation knobs
// of one sampler invocation.
//
// Reference: Stan Reference Manual (program blocks, JSON data)
//            Rust Book §6 (Enums and Pattern Matching)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::error::PipelineError;

/// A dimension of a data slot: a literal size or the value of an
/// integer slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dim {
    Fixed(usize),
    Slot(String),
}

impl Dim {
    pub fn slot(name: &str) -> Self {
        Dim::Slot(name.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotKind {
    Int,
    Real,
    Vector(Dim),
    /// Rows × columns. Also used for arrays of vectors, which share
    /// the engine's nested-array data layout.
    Matrix(Dim, Dim),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSlot {
    pub name: String,
    pub kind: SlotKind,
}

impl DataSlot {
    pub fn new(name: &str, kind: SlotKind) -> Self {
        Self { name: name.to_string(), kind }
    }
}

#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub name:       String,
    pub program:    String,
    pub slots:      Vec<DataSlot>,
    pub prediction: String,
}

impl ModelSpec {
    /// Verify that `data` fills every declared slot with a value of
    /// the declared kind and shape.
    pub fn check_bound(&self, data: &BoundData) -> Result<(), PipelineError> {
        if self.program.trim().is_empty() {
            return Err(PipelineError::compile(&self.name, "empty model program"));
        }

        for slot in &self.slots {
            let value = data.get(&slot.name).ok_or_else(|| {
                PipelineError::compile(&self.name, format!("data slot '{}' is not bound", slot.name))
            })?;
            self.check_slot(slot, value, data)?;
        }
        Ok(())
    }

    fn check_slot(
        &self,
        slot: &DataSlot,
        value: &SlotValue,
        data: &BoundData,
    ) -> Result<(), PipelineError> {
        let mismatch = |detail: String| {
            PipelineError::compile(&self.name, format!("data slot '{}': {detail}", slot.name))
        };

        match (&slot.kind, value) {
            (SlotKind::Int, SlotValue::Int(_)) => Ok(()),
            (SlotKind::Real, SlotValue::Real(_)) => Ok(()),
            (SlotKind::Vector(len), SlotValue::Vector(v)) => {
                let want = self.resolve(len, data)?;
                if v.len() == want {
                    Ok(())
                } else {
                    Err(mismatch(format!("expected length {want}, got {}", v.len())))
                }
            }
            (SlotKind::Matrix(rows, cols), SlotValue::Matrix(m)) => {
                let want_rows = self.resolve(rows, data)?;
                let want_cols = self.resolve(cols, data)?;
                if m.len() != want_rows {
                    return Err(mismatch(format!("expected {want_rows} rows, got {}", m.len())));
                }
                match m.iter().find(|row| row.len() != want_cols) {
                    Some(row) => Err(mismatch(format!(
                        "expected {want_cols} columns, got a row of {}",
                        row.len()
                    ))),
                    None => Ok(()),
                }
            }
            (kind, _) => Err(mismatch(format!("expected {kind:?}, got {}", value.kind_name()))),
        }
    }

    fn resolve(&self, dim: &Dim, data: &BoundData) -> Result<usize, PipelineError> {
        match dim {
            Dim::Fixed(n) => Ok(*n),
            Dim::Slot(name) => match data.get(name) {
                Some(SlotValue::Int(n)) if *n >= 0 => Ok(*n as usize),
                _ => Err(PipelineError::compile(
                    &self.name,
                    format!("dimension slot '{name}' must be bound to a non-negative int"),
                )),
            },
        }
    }
}

/// A value bound to a data slot. Serialises to the engine's JSON
/// data layout (scalars, arrays, nested arrays).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotValue {
    Int(i64),
    Real(f64),
    Vector(Vec<f64>),
    Matrix(Vec<Vec<f64>>),
}

impl SlotValue {
    fn kind_name(&self) -> &'static str {
        match self {
            SlotValue::Int(_) => "int",
            SlotValue::Real(_) => "real",
            SlotValue::Vector(_) => "vector",
            SlotValue::Matrix(_) => "matrix",
        }
    }
}

/// Slot name → value, ordered so the written data file is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundData(BTreeMap<String, SlotValue>);

impl BoundData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: SlotValue) -> Self {
        self.0.insert(name.to_string(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&SlotValue> {
        self.0.get(name)
    }
}

// ─── Sampler Configuration ───────────────────────────────────────────────────
// Defaults: 4 chains × 2000 iterations, half of them warm-up,
// NUTS with adapt_delta 0.8 and tree depth 10.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub chains:       usize,
    pub iterations:   usize,
    /// Warm-up iterations per chain; None means iterations / 2
    pub warmup:       Option<usize>,
    pub adapt_delta:  f64,
    pub step_size:    f64,
    pub max_depth:    usize,
    pub seed:         u64,
    /// Wall-clock limit for all chains together; None waits forever
    pub timeout_secs: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            chains:       4,
            iterations:   2000,
            warmup:       None,
            adapt_delta:  0.8,
            step_size:    1.0,
            max_depth:    10,
            seed:         42,
            timeout_secs: None,
        }
    }
}

impl SamplerConfig {
    pub fn num_warmup(&self) -> usize {
        self.warmup.unwrap_or(self.iterations / 2)
    }

    /// Post-warm-up draws kept per chain.
    pub fn num_samples(&self) -> usize {
        self.iterations.saturating_sub(self.num_warmup())
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.chains == 0 {
            return Err(PipelineError::InvalidConfig("chains must be at least 1".into()));
        }
        if self.num_samples() == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "{} iterations with {} warm-up leaves no draws",
                self.iterations,
                self.num_warmup()
            )));
        }
        if !(self.adapt_delta > 0.0 && self.adapt_delta < 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "adapt_delta must lie in (0, 1), got {}",
                self.adapt_delta
            )));
        }
        if !(self.step_size > 0.0 && self.step_size.is_finite()) {
            return Err(PipelineError::InvalidConfig(format!(
                "step_size must be a positive number, got {}",
                self.step_size
            )));
        }
        if self.max_depth == 0 {
            return Err(PipelineError::InvalidConfig("max_depth must be at least 1".into()));
        }
        Ok(())
    }
}
