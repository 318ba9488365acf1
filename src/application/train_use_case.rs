// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load config                    (config)
//   Step 2: Load and merge CSV tables      (Layer 4 - data)
//   Step 3: Fit preprocessing + features   (Layer 4 - data)
//   Step 4: Cross-validate, fit forest     (Layer 5 - ml)
//   Step 5: Build windows, train LSTM      (Layer 4 + 5)
//   Step 6: Forecast the test set          (Layer 5 - ml)
//   Step 7: Save training summary          (Layer 6 - infra)
//
// `--model` limits steps 4 and 5 to one model. The preprocessor
// is refitted on every run, so the artefacts of a model that is
// not retrained are discarded rather than left paired with it.

use anyhow::{ensure, Context, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use crate::application::Workspace;
use crate::config::ForecastConfig;
use crate::data::{
    dataset::{build_sequences, step_size},
    features::{preprocess_data, FeatureMatrix},
    loader::{merge_store_data, CsvSalesSource},
    preprocessor::{ColumnScale, ScalingMethod},
    splitter::split_train_val,
};
use crate::domain::{feature::Feature, traits::SalesSource};
use crate::infra::{
    checkpoint::{ArtifactStore, PREDICTIONS_FILE, SUMMARY_FILE},
    metrics::{FoldMetrics, MetricsLogger, EPOCH_LOG, FOLD_LOG},
};
use crate::ml::{
    cross_validation::{cross_validate, CvReport},
    evaluation::{evaluate, Metric},
    inferencer::LstmForecaster,
    random_forest::RandomForest,
    trainer::{run_training, LstmReport, LstmTrainingSetup},
};

/// Windows scored per LSTM forward pass when evaluating.
const EVAL_CHUNK: usize = 1024;

// ─── Training Configuration ──────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelSelection {
    All,
    RandomForest,
    Lstm,
}

impl ModelSelection {
    pub fn includes_forest(self) -> bool {
        matches!(self, Self::All | Self::RandomForest)
    }

    pub fn includes_lstm(self) -> bool {
        matches!(self, Self::All | Self::Lstm)
    }
}

#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub config_path:   PathBuf,
    pub artifacts_dir: PathBuf,
    pub model:         ModelSelection,
    /// Overrides model_params.lstm.epochs
    pub epochs:        Option<usize>,
}

// ─── Training Summary ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestSummary {
    pub n_trees:             usize,
    pub cross_validation:    CvReport,
    /// Highest importance first
    pub feature_importances: Vec<(Feature, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmSummary {
    pub training:   LstmReport,
    /// Held-out windows scored in sales units
    pub validation: BTreeMap<Metric, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub trained_at:    String,
    pub train_rows:    usize,
    /// Rows left after closed days are dropped
    pub fitted_rows:   usize,
    pub test_rows:     usize,
    pub features:      Vec<Feature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_forest: Option<ForestSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lstm:          Option<LstmSummary>,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline end to end and return what was saved as the summary.
    pub fn execute(&self) -> Result<TrainingSummary> {
        let cfg = &self.config;

        // ── Step 1: Load config ───────────────────────────────────────────────
        let Workspace { config: mut forecast, root } = Workspace::load(&cfg.config_path)?;
        if let Some(epochs) = cfg.epochs {
            ensure!(epochs > 0, "--epochs must be at least 1");
            forecast.model_params.lstm.epochs = epochs;
        }
        let store = ArtifactStore::new(&cfg.artifacts_dir);

        // ── Step 2: Load and merge the tables ─────────────────────────────────
        let source = CsvSalesSource::from_config(&forecast, &root);
        let (train, test) = source.load_sales()?;
        let stores = source.load_stores()?;
        let (train_rows, test_rows) = (train.len(), test.len());
        let train = merge_store_data(train, &stores);
        let test  = merge_store_data(test, &stores);

        // ── Step 3: Fit preprocessing ─────────────────────────────────────────
        let test = (!test.is_empty()).then_some(test);
        let (fitted, matrix, test_matrix) = preprocess_data(&forecast, train, test)?;
        store.save_preprocessor(&fitted)?;
        if !cfg.model.includes_forest() {
            store.discard_forest()?;
        }
        if !cfg.model.includes_lstm() {
            store.discard_lstm()?;
        }

        // ── Step 4: Random forest ─────────────────────────────────────────────
        let mut forest = None;
        let mut forest_summary = None;
        if cfg.model.includes_forest() {
            let (model, summary) = train_forest(&forecast, &matrix, &store)?;
            forest = Some(model);
            forest_summary = Some(summary);
        }

        // ── Step 5: LSTM ──────────────────────────────────────────────────────
        let lstm_summary = if cfg.model.includes_lstm() {
            Some(train_lstm(&forecast, &matrix, &store)?)
        } else {
            None
        };

        // ── Step 6: Test-set forecasts ────────────────────────────────────────
        if let Some(forest) = &forest {
            match &test_matrix {
                Some(test_matrix) => {
                    let predictions = forest.predict(&test_matrix.data)?;
                    let path = store.path(PREDICTIONS_FILE);
                    let written = write_predictions(&path, test_matrix, &predictions)?;
                    tracing::info!("Wrote {} test forecasts to '{}'", written, path.display());
                }
                None => {
                    store.remove(PREDICTIONS_FILE)?;
                    tracing::warn!("Test table is empty; no predictions written");
                }
            }
        }

        // ── Step 7: Summary ───────────────────────────────────────────────────
        let summary = TrainingSummary {
            trained_at:    chrono::Utc::now().to_rfc3339(),
            train_rows,
            fitted_rows:   matrix.nrows(),
            test_rows,
            features:      fitted.features.clone(),
            random_forest: forest_summary,
            lstm:          lstm_summary,
        };
        let path = store.save_json(SUMMARY_FILE, &summary)?;
        tracing::info!("Training summary saved to '{}'", path.display());

        Ok(summary)
    }
}

fn train_forest(
    cfg:    &ForecastConfig,
    matrix: &FeatureMatrix,
    store:  &ArtifactStore,
) -> Result<(RandomForest, ForestSummary)> {
    let params = &cfg.model_params.random_forest;
    let target = matrix.target.as_ref().context("training matrix has no Sales target")?;

    tracing::info!(
        "Cross-validating random forest ({} trees) over {} folds",
        params.n_estimators,
        cfg.evaluation.cv_folds
    );
    let cv = cross_validate(
        || RandomForest::new(params.clone()),
        matrix,
        cfg.evaluation.cv_folds,
        &cfg.evaluation.metrics,
    )?;
    let rows: Vec<FoldMetrics> = cv
        .folds
        .iter()
        .flat_map(|f| {
            f.scores.iter().map(move |(metric, value)| FoldMetrics {
                fold:            f.fold,
                train_rows:      f.train_rows,
                validation_rows: f.validation_rows,
                metric:          metric.to_string(),
                value:           *value,
            })
        })
        .collect();
    MetricsLogger::new(store.dir(), FOLD_LOG)?.log_all(&rows)?;
    for (metric, value) in &cv.mean {
        tracing::info!("CV mean {metric}: {value:.4}");
    }

    // ── Final fit on every row ────────────────────────────────────────────────
    let mut forest = RandomForest::new(params.clone());
    forest.fit(&matrix.data, target)?;
    store.save_forest(&forest)?;

    let mut feature_importances: Vec<(Feature, f64)> = matrix
        .columns
        .iter()
        .copied()
        .zip(forest.feature_importances().iter().copied())
        .collect();
    feature_importances.sort_by(|a, b| b.1.total_cmp(&a.1));
    for (feature, importance) in feature_importances.iter().take(5) {
        tracing::debug!("importance {feature}: {importance:.4}");
    }

    let summary = ForestSummary {
        n_trees: forest.n_trees(),
        cross_validation: cv,
        feature_importances,
    };
    Ok((forest, summary))
}

fn train_lstm(
    cfg:    &ForecastConfig,
    matrix: &FeatureMatrix,
    store:  &ArtifactStore,
) -> Result<LstmSummary> {
    let params = &cfg.model_params.lstm;
    let seed   = cfg.model_params.random_forest.random_state;
    let target = matrix.target.as_ref().context("training matrix has no Sales target")?;

    // ── Windows ───────────────────────────────────────────────────────────────
    let target_scale = ColumnScale::fit(&target.to_vec(), ScalingMethod::Standard);
    let samples = build_sequences(matrix, target_scale, params.sequence_length, params.max_sequences)?;
    let (train, val) = split_train_val(samples, params.validation_split, seed);
    tracing::info!("LSTM windows: {} train, {} validation", train.len(), val.len());

    // ── Training loop (Layer 5) ───────────────────────────────────────────────
    let logger = MetricsLogger::new(store.dir(), EPOCH_LOG)?;
    let setup = LstmTrainingSetup {
        params,
        step_size: step_size(matrix),
        target_scale,
        seed,
        store,
        logger: &logger,
    };
    let training = run_training(&setup, train, val.clone())?;
    if let Some(rmse) = training.final_val_rmse() {
        tracing::info!("Final epoch validation RMSE {rmse:.4}");
    }
    tracing::info!("Epoch metrics logged to '{}'", logger.csv_path().display());

    // ── Score the saved checkpoint in sales units ─────────────────────────────
    let forecaster = LstmForecaster::from_checkpoint(store)?;
    let mut predicted = Vec::with_capacity(val.len());
    for chunk in val.chunks(EVAL_CHUNK) {
        let windows: Vec<&[f32]> = chunk.iter().map(|s| s.window.as_slice()).collect();
        predicted.extend(forecaster.predict(&windows)?);
    }
    let actual: Vec<f64> = val.iter().map(|s| s.actual).collect();
    let validation = evaluate(&cfg.evaluation.metrics, &actual, &predicted);
    for (metric, value) in &validation {
        tracing::info!("LSTM validation {metric}: {value:.4}");
    }

    Ok(LstmSummary { training, validation })
}

#[derive(Debug, Serialize)]
struct PredictionRow {
    #[serde(rename = "Id")]
    id:    u32,
    #[serde(rename = "Sales")]
    sales: f64,
}

/// Write one row per test Id; closed days forecast 0.
/// Returns the number of rows written.
fn write_predictions(path: &Path, matrix: &FeatureMatrix, predictions: &Array1<f64>) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Cannot create '{}'", path.display()))?;
    let mut written = 0;
    for (key, prediction) in matrix.keys.iter().zip(predictions.iter()) {
        let Some(id) = key.id else { continue };
        let sales = if key.open { prediction.max(0.0) } else { 0.0 };
        writer.serialize(PredictionRow { id, sales })?;
        written += 1;
    }
    writer.flush()?;
    if written < matrix.nrows() {
        tracing::warn!("{} test rows have no Id and were not written", matrix.nrows() - written);
    }
    Ok(written)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{fixtures::write_project, predict_use_case::PredictUseCase};
    use std::fs;

    fn use_case(dir: &Path, model: ModelSelection, epochs: Option<usize>) -> TrainUseCase {
        TrainUseCase::new(TrainConfig {
            config_path:   write_project(dir),
            artifacts_dir: dir.join("artifacts"),
            model,
            epochs,
        })
    }

    #[test]
    fn test_forest_run_writes_artifacts_and_predictions() {
        let dir = tempfile::tempdir().unwrap();
        let summary = use_case(dir.path(), ModelSelection::RandomForest, None).execute().unwrap();

        assert_eq!(summary.train_rows, 118);
        assert_eq!(summary.test_rows, 14);
        assert!(summary.fitted_rows < summary.train_rows);
        assert!(summary.lstm.is_none());

        let forest = summary.random_forest.unwrap();
        assert_eq!(forest.n_trees, 8);
        assert_eq!(forest.cross_validation.folds.len(), 2);
        assert!(forest.cross_validation.mean.contains_key(&Metric::Rmspe));
        let total: f64 = forest.feature_importances.iter().map(|(_, v)| v).sum();
        assert!((total - 1.0).abs() < 1e-9);

        let artifacts = dir.path().join("artifacts");
        for file in ["preprocessor.json", "random_forest.json", "cv_metrics.csv", SUMMARY_FILE] {
            assert!(artifacts.join(file).is_file(), "{file} missing");
        }
        assert!(!artifacts.join("lstm_config.json").exists());

        let mut reader = csv::Reader::from_path(artifacts.join(PREDICTIONS_FILE)).unwrap();
        let rows: Vec<(u32, f64)> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 14);
        // 2015-03-01 is a Sunday: Ids 1 and 2 are closed
        assert_eq!(rows[0], (1, 0.0));
        assert_eq!(rows[1], (2, 0.0));
        assert!(rows[2..].iter().all(|(_, sales)| *sales > 0.0));
    }

    #[test]
    fn test_lstm_run_honours_epoch_override() {
        let dir = tempfile::tempdir().unwrap();
        let summary = use_case(dir.path(), ModelSelection::Lstm, Some(1)).execute().unwrap();

        assert!(summary.random_forest.is_none());
        let lstm = summary.lstm.unwrap();
        assert_eq!(lstm.training.epochs.len(), 1);
        assert!(lstm.training.validation_sequences > 0);
        assert!(lstm.validation[&Metric::Rmse].is_finite());

        let artifacts = dir.path().join("artifacts");
        assert!(artifacts.join("lstm_config.json").is_file());
        assert!(artifacts.join(EPOCH_LOG).is_file());
        assert!(!artifacts.join(PREDICTIONS_FILE).exists());
    }

    #[test]
    fn test_lstm_rerun_discards_forest_fitted_on_old_features() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_project(dir.path());
        let artifacts = dir.path().join("artifacts");
        let run = |model| {
            TrainUseCase::new(TrainConfig {
                config_path:   config_path.clone(),
                artifacts_dir: artifacts.clone(),
                model,
                epochs:        Some(1),
            })
            .execute()
            .unwrap()
        };

        run(ModelSelection::RandomForest);
        let store = ArtifactStore::new(&artifacts);
        assert!(store.has_forest());
        assert!(PredictUseCase::load(&config_path, &artifacts).is_ok());

        // narrower feature set, then retrain the LSTM only
        let mut text = fs::read_to_string(&config_path).unwrap();
        text.push_str(
            "features:\n  datetime: [month, weekday]\n  holiday: [school_holiday]\n  store: [store, promo]\n",
        );
        fs::write(&config_path, text).unwrap();
        let summary = run(ModelSelection::Lstm);
        assert_eq!(summary.features.len(), 5);
        assert_eq!(store.load_preprocessor().unwrap().features.len(), 5);

        assert!(!store.has_forest());
        assert!(!artifacts.join(PREDICTIONS_FILE).exists());
        assert!(!artifacts.join(FOLD_LOG).exists());
        assert!(PredictUseCase::load(&config_path, &artifacts).is_err());
        assert!(artifacts.join("lstm_config.json").is_file());
    }

    #[test]
    fn test_forest_rerun_discards_lstm() {
        let dir = tempfile::tempdir().unwrap();
        use_case(dir.path(), ModelSelection::Lstm, Some(1)).execute().unwrap();
        let artifacts = dir.path().join("artifacts");
        assert!(artifacts.join("lstm_model.mpk").is_file());

        use_case(dir.path(), ModelSelection::RandomForest, None).execute().unwrap();
        assert!(!artifacts.join("lstm_config.json").exists());
        assert!(!artifacts.join("lstm_model.mpk").exists());
        assert!(!artifacts.join(EPOCH_LOG).exists());
        assert!(artifacts.join(PREDICTIONS_FILE).is_file());
    }

    #[test]
    fn test_zero_epochs_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(use_case(dir.path(), ModelSelection::Lstm, Some(0)).execute().is_err());
    }

    #[test]
    fn test_model_selection_names() {
        let m: ModelSelection = serde_json::from_str("\"random-forest\"").unwrap();
        assert_eq!(m, ModelSelection::RandomForest);
        assert!(ModelSelection::All.includes_forest() && ModelSelection::All.includes_lstm());
        assert!(!ModelSelection::Lstm.includes_forest());
    }
}
