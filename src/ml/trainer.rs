// ============================================================
// Layer 5 — LSTM Training Loop
// ============================================================
// Train + validation loop using Burn's DataLoader and Adam.
//
//   - training runs on TrainBackend (Autodiff<NdArray>)
//   - model.valid() returns the model on InferBackend, so the
//     validation batcher uses InferBackend too
//   - losses are MSE on scaled sales; val_rmse undoes the
//     scaling: sqrt(mse) · target_scale.scale
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{ensure, Result};
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    nn::loss::{MseLoss, Reduction},
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
};
use serde::{Deserialize, Serialize};

use crate::config::LstmParams;
use crate::data::{
    batcher::SequenceBatcher,
    dataset::{SequenceDataset, SequenceSample},
    preprocessor::ColumnScale,
};
use crate::infra::{
    checkpoint::{ArtifactStore, LstmArtifact},
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::{
    model::{SalesLstm, SalesLstmConfig},
    InferBackend, TrainBackend,
};

/// Everything the training loop needs besides the data.
pub struct LstmTrainingSetup<'a> {
    pub params:       &'a LstmParams,
    pub step_size:    usize,
    pub target_scale: ColumnScale,
    pub seed:         u64,
    pub store:        &'a ArtifactStore,
    pub logger:       &'a MetricsLogger,
}

/// Outcome of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmReport {
    pub train_sequences:      usize,
    pub validation_sequences: usize,
    pub epochs:               Vec<EpochMetrics>,
}

impl LstmReport {
    pub fn final_val_rmse(&self) -> Option<f64> {
        self.epochs.last().map(|e| e.val_rmse)
    }
}

pub fn run_training(
    setup: &LstmTrainingSetup<'_>,
    train: Vec<SequenceSample>,
    val:   Vec<SequenceSample>,
) -> Result<LstmReport> {
    ensure!(!train.is_empty(), "no LSTM training sequences; is sequence_length longer than the store histories?");
    let device = burn::backend::ndarray::NdArrayDevice::default();
    tracing::info!("Using NdArray device: {:?}", device);
    train_loop(setup, train, val, device)
}

fn train_loop(
    setup:  &LstmTrainingSetup<'_>,
    train:  Vec<SequenceSample>,
    val:    Vec<SequenceSample>,
    device: burn::backend::ndarray::NdArrayDevice,
) -> Result<LstmReport> {
    let p = setup.params;
    let (train_sequences, validation_sequences) = (train.len(), val.len());

    // ── Build model ───────────────────────────────────────────────────────────
    let model_cfg = SalesLstmConfig::new(setup.step_size, p.units, p.layers, p.dropout);
    let mut model: SalesLstm<TrainBackend> = model_cfg.init(&device);
    tracing::info!(
        "Model ready: {} LSTM layers x {} units, {} values per step",
        p.layers,
        p.units,
        setup.step_size
    );

    setup.store.save_lstm_config(&LstmArtifact {
        model:           model_cfg.clone(),
        sequence_length: p.sequence_length,
        step_size:       setup.step_size,
        target_scale:    setup.target_scale,
    })?;

    // ── Adam optimiser ────────────────────────────────────────────────────────
    let mut optim = AdamConfig::new().with_epsilon(1e-8).init();

    // ── Training data loader (AutodiffBackend) ────────────────────────────────
    let train_batcher =
        SequenceBatcher::<TrainBackend>::new(device.clone(), p.sequence_length, setup.step_size);
    let train_loader = DataLoaderBuilder::new(train_batcher)
        .batch_size(p.batch_size)
        .shuffle(setup.seed)
        .num_workers(1)
        .build(SequenceDataset::new(train));

    // ── Validation data loader (InferBackend — no autodiff overhead) ──────────
    let val_batcher =
        SequenceBatcher::<InferBackend>::new(device.clone(), p.sequence_length, setup.step_size);
    let val_loader = DataLoaderBuilder::new(val_batcher)
        .batch_size(p.batch_size)
        .num_workers(1)
        .build(SequenceDataset::new(val));

    // ── Epoch loop ────────────────────────────────────────────────────────────
    let mut history = Vec::with_capacity(p.epochs);
    let mut best_val_loss = f64::INFINITY;
    for epoch in 1..=p.epochs {

        // ── Training phase ────────────────────────────────────────────────────
        let mut train_loss_sum = 0.0f64;
        let mut train_batches  = 0usize;

        for batch in train_loader.iter() {
            let (loss, _) = model.forward_loss(batch.inputs, batch.targets);

            train_loss_sum += loss.clone().into_scalar().elem::<f64>();
            train_batches  += 1;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(p.learning_rate, model, grads);
        }

        let avg_train_loss = if train_batches > 0 {
            train_loss_sum / train_batches as f64
        } else { f64::NAN };

        // ── Validation phase ──────────────────────────────────────────────────
        // dropout disabled on the inner backend
        let model_valid = model.valid();
        let mse = MseLoss::new();

        let mut val_sq_sum = 0.0f64;
        let mut val_count  = 0usize;
        for batch in val_loader.iter() {
            let n = batch.targets.dims()[0];
            let output = model_valid.forward(batch.inputs);
            let batch_mse: f64 = mse
                .forward(output, batch.targets, Reduction::Mean)
                .into_scalar()
                .elem::<f64>();
            val_sq_sum += batch_mse * n as f64;
            val_count  += n;
        }

        let avg_val_loss = if val_count > 0 { val_sq_sum / val_count as f64 } else { f64::NAN };
        let val_rmse     = avg_val_loss.sqrt() * setup.target_scale.scale;

        let metrics = EpochMetrics::new(epoch, avg_train_loss, avg_val_loss, val_rmse);
        if metrics.is_improvement(best_val_loss) {
            best_val_loss = avg_val_loss;
        }
        setup.logger.log(&metrics)?;
        tracing::info!(
            "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | val_rmse={:.2}",
            epoch, p.epochs, avg_train_loss, avg_val_loss, val_rmse,
        );
        history.push(metrics);
    }

    setup.store.save_lstm_model(&model)?;
    tracing::info!(
        "Training complete! Best val_loss={:.4}, checkpoint in '{}'",
        best_val_loss,
        setup.store.dir().display()
    );

    Ok(LstmReport { train_sequences, validation_sequences, epochs: history })
}
