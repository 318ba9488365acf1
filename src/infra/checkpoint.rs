// ============================================================
// Layer 6 — Artifact Store
// ============================================================
// Everything `train` produces and `serve` / `predict` need,
// kept in one directory:
//
//   artifacts/
//     preprocessor.json      ← fitted imputation / outlier /
//                              encoder / scaler / calendar state
//     random_forest.json     ← trees and feature importances
//     lstm_config.json       ← architecture + window shape +
//                              target scale, to rebuild the LSTM
//     lstm_model.mpk         ← LSTM weights (CompactRecorder)
//     training_summary.json  ← CV scores and validation metrics
//     lstm_metrics.csv       ← per-epoch log (MetricsLogger)
//     cv_metrics.csv         ← per-fold log (MetricsLogger)
//     predictions.csv        ← test-set forecasts of the forest
//
// The preprocessor is refitted on every run. A run that skips a
// model discards that model's files, since they were fitted
// against the previous preprocessor.
//
// Burn's CompactRecorder:
//   - Serialises model parameters to MessagePack (half precision)
//   - Type-safe: loading fails if the architecture doesn't match
//   - Adds its own file extension to the path it is given

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::data::{features::FittedPreprocessor, preprocessor::ColumnScale};
use crate::infra::metrics::{EPOCH_LOG, FOLD_LOG};
use crate::ml::{
    model::{SalesLstm, SalesLstmConfig},
    random_forest::RandomForest,
};

const PREPROCESSOR_FILE: &str = "preprocessor.json";
const FOREST_FILE: &str = "random_forest.json";
const LSTM_CONFIG_FILE: &str = "lstm_config.json";
const LSTM_MODEL_FILE: &str = "lstm_model";
/// Extension CompactRecorder appends to LSTM_MODEL_FILE
const LSTM_MODEL_EXT: &str = "mpk";
pub const SUMMARY_FILE: &str = "training_summary.json";
pub const PREDICTIONS_FILE: &str = "predictions.csv";

/// What inference needs besides the LSTM weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmArtifact {
    pub model:           SalesLstmConfig,
    pub sequence_length: usize,
    pub step_size:       usize,
    /// Maps sales to the model's target scale and back
    pub target_scale:    ColumnScale,
}

/// Saves and loads pipeline artifacts under one directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create artifacts directory '{}'", self.dir.display()))
    }

    pub fn save_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.path(name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Saved '{}'", path.display());
        Ok(path)
    }

    pub fn load_json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.path(name);
        let json = fs::read_to_string(&path).with_context(|| {
            format!("Cannot read '{}'. Have you run 'train' first?", path.display())
        })?;
        serde_json::from_str(&json).with_context(|| format!("Malformed artifact '{}'", path.display()))
    }

    /// Delete `name` if present. Returns whether a file was removed.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let path = self.path(name);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("Removed stale artifact '{}'", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Cannot remove '{}'", path.display())),
        }
    }

    /// Drop the forest, its fold log and its test-set forecasts.
    pub fn discard_forest(&self) -> Result<()> {
        for name in [FOREST_FILE, FOLD_LOG, PREDICTIONS_FILE] {
            self.remove(name)?;
        }
        Ok(())
    }

    /// Drop the LSTM weights, its config and its epoch log.
    pub fn discard_lstm(&self) -> Result<()> {
        let weights = format!("{LSTM_MODEL_FILE}.{LSTM_MODEL_EXT}");
        for name in [LSTM_CONFIG_FILE, weights.as_str(), EPOCH_LOG] {
            self.remove(name)?;
        }
        Ok(())
    }

    pub fn save_preprocessor(&self, fitted: &FittedPreprocessor) -> Result<()> {
        self.save_json(PREPROCESSOR_FILE, fitted).map(|_| ())
    }

    pub fn load_preprocessor(&self) -> Result<FittedPreprocessor> {
        self.load_json(PREPROCESSOR_FILE)
    }

    pub fn save_forest(&self, forest: &RandomForest) -> Result<()> {
        self.save_json(FOREST_FILE, forest).map(|_| ())
    }

    pub fn load_forest(&self) -> Result<RandomForest> {
        self.load_json(FOREST_FILE)
    }

    pub fn has_forest(&self) -> bool {
        self.path(FOREST_FILE).is_file() && self.path(PREPROCESSOR_FILE).is_file()
    }

    pub fn save_lstm_config(&self, artifact: &LstmArtifact) -> Result<()> {
        self.save_json(LSTM_CONFIG_FILE, artifact).map(|_| ())
    }

    pub fn load_lstm_config(&self) -> Result<LstmArtifact> {
        self.load_json(LSTM_CONFIG_FILE)
    }

    /// Save LSTM weights with CompactRecorder.
    pub fn save_lstm_model<B: Backend>(&self, model: &SalesLstm<B>) -> Result<()> {
        self.ensure_dir()?;
        let path = self.path(LSTM_MODEL_FILE);
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;
        tracing::debug!("Saved LSTM checkpoint to '{}'", path.display());
        Ok(())
    }

    /// Load LSTM weights into `model`, which must have the saved architecture.
    pub fn load_lstm_model<B: Backend>(
        &self,
        model:  SalesLstm<B>,
        device: &B::Device,
    ) -> Result<SalesLstm<B>> {
        let path = self.path(LSTM_MODEL_FILE);
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Have you trained the model first?", path.display())
            })?;
        Ok(model.load_record(record))
    }
}
