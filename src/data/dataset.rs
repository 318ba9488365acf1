// ============================================================
// Layer 4 — LSTM Sequence Dataset
// ============================================================
// Slices the feature matrix into fixed-length history windows.
//
//   store 1:  d1 d2 d3 ... d14 │ d15      ← target
//             d2 d3 d4 ... d15 │ d16
//             ...
//
// Each time step is the row's feature vector followed by that
// day's scaled sales, so the model sees its own recent history.
// Rows are grouped per store and ordered by date; gaps left by
// dropped closed days are not filled.

use anyhow::{Context, Result};
use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::data::{features::FeatureMatrix, preprocessor::ColumnScale};

/// One window of `sequence_length` steps and the next day's scaled sales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceSample {
    /// Row-major [sequence_length, step_size]
    pub window: Vec<f32>,
    pub target: f32,
    /// Unscaled, unclipped sales of the target day
    pub actual: f64,
    pub store:  u32,
}

/// Width of one time step for a matrix: its columns plus scaled sales.
pub fn step_size(matrix: &FeatureMatrix) -> usize {
    matrix.columns.len() + 1
}

/// Build every window of every store.
///
/// `max_sequences` keeps an evenly strided subset when there are
/// more windows than that.
pub fn build_sequences(
    matrix:          &FeatureMatrix,
    target_scale:    ColumnScale,
    sequence_length: usize,
    max_sequences:   Option<usize>,
) -> Result<Vec<SequenceSample>> {
    let target = matrix
        .target
        .as_ref()
        .context("sequence windows need a Sales target on every row")?;
    let actuals = matrix.actuals().unwrap_or(target);

    let mut by_store: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (i, key) in matrix.keys.iter().enumerate() {
        by_store.entry(key.store).or_default().push(i);
    }

    let step = step_size(matrix);
    let mut samples = Vec::new();
    for (store, mut rows) in by_store {
        rows.sort_by_key(|&i| matrix.keys[i].date);
        if rows.len() <= sequence_length {
            continue;
        }

        let steps: Vec<Vec<f32>> = rows
            .iter()
            .map(|&i| {
                let mut v: Vec<f32> = matrix.data.row(i).iter().map(|x| *x as f32).collect();
                v.push(target_scale.transform(target[i]) as f32);
                v
            })
            .collect();

        for start in 0..rows.len() - sequence_length {
            let end = start + sequence_length;
            let mut window = Vec::with_capacity(sequence_length * step);
            for s in &steps[start..end] {
                window.extend_from_slice(s);
            }
            samples.push(SequenceSample {
                window,
                target: target_scale.transform(target[rows[end]]) as f32,
                actual: actuals[rows[end]],
                store,
            });
        }
    }

    if let Some(max) = max_sequences.filter(|m| *m > 0 && samples.len() > *m) {
        let stride = samples.len().div_ceil(max);
        samples = samples.into_iter().step_by(stride).take(max).collect();
    }

    tracing::info!(
        "Built {} sequences of {} steps x {} values",
        samples.len(),
        sequence_length,
        step
    );
    Ok(samples)
}

pub struct SequenceDataset {
    samples: Vec<SequenceSample>,
}

impl SequenceDataset {
    pub fn new(samples: Vec<SequenceSample>) -> Self { Self { samples } }
}

impl Dataset<SequenceSample> for SequenceDataset {
    fn get(&self, index: usize) -> Option<SequenceSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
