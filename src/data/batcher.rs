// ============================================================
// Layer 4 — Sequence Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec<SequenceSample>
// into the tensors the LSTM consumes.
//
//   Input:  N samples, each a flat window of S steps x F values
//   Output: inputs  [N, S, F]
//           targets [N, 1]
//
// All windows share the same S and F, so the flat vectors are
// concatenated and reshaped in one go.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::data::dataset::SequenceSample;

// ─── SequenceBatch ────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct SequenceBatch<B: Backend> {
    /// shape: [batch_size, sequence_length, step_size]
    pub inputs: Tensor<B, 3>,

    /// Scaled next-day sales — shape: [batch_size, 1]
    pub targets: Tensor<B, 2>,
}

// ─── SequenceBatcher ──────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct SequenceBatcher<B: Backend> {
    pub device:          B::Device,
    pub sequence_length: usize,
    pub step_size:       usize,
}

impl<B: Backend> SequenceBatcher<B> {
    pub fn new(device: B::Device, sequence_length: usize, step_size: usize) -> Self {
        Self { device, sequence_length, step_size }
    }

    /// Inputs tensor for windows that have no target (inference).
    pub fn inputs(&self, windows: &[&[f32]]) -> Tensor<B, 3> {
        let flat: Vec<f32> = windows.iter().flat_map(|w| w.iter().copied()).collect();
        Tensor::from_data(
            TensorData::new(flat, [windows.len(), self.sequence_length, self.step_size]),
            &self.device,
        )
    }
}

// ─── Burn Batcher Trait Implementation ────────────────────────────────────────
impl<B: Backend> Batcher<SequenceSample, SequenceBatch<B>> for SequenceBatcher<B> {
    fn batch(&self, items: Vec<SequenceSample>) -> SequenceBatch<B> {
        let windows: Vec<&[f32]> = items.iter().map(|s| s.window.as_slice()).collect();
        let inputs = self.inputs(&windows);

        let targets: Vec<f32> = items.iter().map(|s| s.target).collect();
        let targets = Tensor::from_data(TensorData::new(targets, [items.len(), 1]), &self.device);

        SequenceBatch { inputs, targets }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    #[test]
    fn test_batch_shapes() {
        let batcher = SequenceBatcher::<B>::new(Default::default(), 3, 2);
        let items = vec![
            SequenceSample { window: vec![0.0; 6], target: 1.0, actual: 1.0, store: 1 },
            SequenceSample { window: vec![1.0; 6], target: 2.0, actual: 2.0, store: 1 },
        ];
        let batch = batcher.batch(items);
        assert_eq!(batch.inputs.dims(), [2, 3, 2]);
        assert_eq!(batch.targets.dims(), [2, 1]);

        let targets: Vec<f32> = batch.targets.into_data().to_vec().unwrap();
        assert_eq!(targets, vec![1.0, 2.0]);
    }

    #[test]
    fn test_step_order_is_preserved() {
        let batcher = SequenceBatcher::<B>::new(Default::default(), 2, 2);
        let window = [1.0, 2.0, 3.0, 4.0];
        let inputs = batcher.inputs(&[&window]);
        // second step, first value
        let v: Vec<f32> = inputs.slice([0..1, 1..2, 0..1]).into_data().to_vec().unwrap();
        assert_eq!(v, vec![3.0]);
    }
}
