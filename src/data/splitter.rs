// ============================================================
// Layer 4 — Train/Test Splitter
// ============================================================
// Partitions a Dataset into a training side and a held-out
// test side:
//
//   1. shuffle the record identifiers (Fisher-Yates via
//      rand::seq::SliceRandom)
//   2. the first round(f · n) identifiers form the train set
//   3. test = all identifiers − train identifiers
//
// Both sides keep the source Dataset's load order, so the test
// targets line up with the order the test inputs were bound to
// the model, and therefore with the predictive draws.
//
// Passing a seed makes the split reproducible (ChaCha8Rng);
// without one the thread RNG is used.
//
// Reference: rand crate documentation (SliceRandom, SeedableRng)

use std::collections::HashSet;

use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::domain::error::PipelineError;
use crate::domain::record::{Dataset, Split};

/// Randomly split `dataset` into (train, test) with `train_fraction`
/// of the records on the train side.
///
/// # Example
/// ```ignore
/// let split = split_train_test(&dataset, 0.7, Some(42))?;
/// // 392 records → 274 train, 118 test
/// ```
pub fn split_train_test(
    dataset:        &Dataset,
    train_fraction: f64,
    seed:           Option<u64>,
) -> Result<Split, PipelineError> {
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "train fraction must lie in (0, 1), got {train_fraction}"
        )));
    }

    let mut ids = dataset.ids();
    match seed {
        Some(seed) => ids.shuffle(&mut ChaCha8Rng::seed_from_u64(seed)),
        None => ids.shuffle(&mut rand::thread_rng()),
    }

    let total    = ids.len();
    let split_at = ((total as f64) * train_fraction).round() as usize;
    let split_at = split_at.min(total);

    let train_ids: HashSet<usize> = ids[..split_at].iter().copied().collect();
    let test_ids: HashSet<usize>  = dataset
        .ids()
        .into_iter()
        .filter(|id| !train_ids.contains(id))
        .collect();

    let split = Split {
        train: dataset.subset(&train_ids),
        test:  dataset.subset(&test_ids),
    };

    tracing::debug!(
        "Dataset split: {} train, {} test (fraction {:.2})",
        split.train.len(),
        split.test.len(),
        split.train_fraction(),
    );

    Ok(split)
}
