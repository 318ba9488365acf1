// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Persistence shared by the training and serving paths:
//
//   checkpoint.rs — ArtifactStore
//                   JSON artefacts (fitted preprocessing state,
//                   random forest, LSTM shape, training summary)
//                   and LSTM weights via Burn's CompactRecorder.
//                   `train` writes them; `serve` and `predict`
//                   read them back.
//
//   metrics.rs    — MetricsLogger
//                   Appends per-epoch LSTM losses and per-fold
//                   cross-validation scores to CSV files for
//                   later inspection.

/// Artefact saving and loading
pub mod checkpoint;

/// Epoch and fold metrics CSV logger
pub mod metrics;
