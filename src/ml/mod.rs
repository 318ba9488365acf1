// ============================================================
// Layer 5 — ML / Model Layer
// ============================================================
// Everything that fits or evaluates a model.
//
//   random_forest.rs    — bagged CART regression trees (ndarray,
//                         rayon); the model behind the API
//   model.rs            — stacked LSTM architecture (Burn)
//   trainer.rs          — LSTM training loop: Adam, MSE loss,
//                         validation RMSE, checkpoint
//   inferencer.rs       — LstmForecaster, rebuilds the LSTM from
//                         its checkpoint and predicts windows
//   evaluation.rs       — RMSE / MAE / MAPE / RMSPE / R²
//   cross_validation.rs — chronological expanding-window folds
//
// Burn code stays inside model / trainer / inferencer and the
// data batcher. Training runs on Autodiff<NdArray>, validation
// and inference on plain NdArray: the workload is small tabular
// windows on the CPU.

/// Random forest regressor with tree-quantile intervals
pub mod random_forest;

/// LSTM architecture
pub mod model;

/// LSTM training loop with validation and checkpointing
pub mod trainer;

/// Loads the LSTM checkpoint and predicts from history windows
pub mod inferencer;

/// Regression metrics
pub mod evaluation;

/// Time-series cross-validation
pub mod cross_validation;

pub type TrainBackend = burn::backend::Autodiff<burn::backend::NdArray>;
pub type InferBackend = burn::backend::NdArray;
