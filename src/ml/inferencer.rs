// ============================================================
// Layer 5 — LSTM Inferencer
// ============================================================
// Rebuilds the trained LSTM from its checkpoint and forecasts
// the next day's sales for history windows.
//
// A window is `sequence_length` consecutive open days of one
// store, each step laid out like the training windows: the
// feature row followed by that day's scaled sales.
use anyhow::{ensure, Result};
use burn::prelude::*;

use crate::data::batcher::SequenceBatcher;
use crate::infra::checkpoint::{ArtifactStore, LstmArtifact};
use crate::ml::{model::SalesLstm, InferBackend};

pub struct LstmForecaster {
    model:    SalesLstm<InferBackend>,
    artifact: LstmArtifact,
    batcher:  SequenceBatcher<InferBackend>,
}

impl LstmForecaster {
    pub fn from_checkpoint(store: &ArtifactStore) -> Result<Self> {
        let device   = burn::backend::ndarray::NdArrayDevice::default();
        let artifact = store.load_lstm_config()?;
        let model: SalesLstm<InferBackend> = artifact.model.init(&device);
        let model    = store.load_lstm_model(model, &device)?;
        let batcher  = SequenceBatcher::new(device, artifact.sequence_length, artifact.step_size);
        tracing::info!(
            "LSTM loaded from checkpoint: windows of {} steps x {}",
            artifact.sequence_length,
            artifact.step_size
        );
        Ok(Self { model, artifact, batcher })
    }

    /// Forecast one value per window, in sales units.
    pub fn predict(&self, windows: &[&[f32]]) -> Result<Vec<f64>> {
        if windows.is_empty() {
            return Ok(Vec::new());
        }
        let expected = self.artifact.sequence_length * self.artifact.step_size;
        for w in windows {
            ensure!(
                w.len() == expected,
                "window has {} values, expected {} ({} steps x {})",
                w.len(),
                expected,
                self.artifact.sequence_length,
                self.artifact.step_size
            );
        }

        let output = self.model.forward(self.batcher.inputs(windows));
        let scaled: Vec<f32> = output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("Cannot read LSTM output: {e:?}"))?;

        let scale = self.artifact.target_scale;
        Ok(scaled.into_iter().map(|v| scale.inverse(v as f64)).collect())
    }
}
