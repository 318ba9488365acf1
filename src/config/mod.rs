// ============================================================
// Configuration — model_config.yaml
// ============================================================
// A single YAML document drives the whole pipeline:
//
//   model_params        → random forest and LSTM hyperparameters
//   data_paths          → train / test / store CSV tables
//   data_preprocessing  → imputation, outliers, scaling, encoding
//   features            → datetime / holiday / store feature groups
//   analysis            → which exploratory analyses to run
//   evaluation          → metrics and cross-validation folds
//   prediction          → forecast horizon and interval width
//
// Every section carries #[serde(default)], so a partial file
// only overrides what it names. A missing file falls back to
// the built-in defaults with a warning.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::data::preprocessor::ScalingMethod;
use crate::domain::feature::{Feature, OutlierColumn};
use crate::ml::evaluation::Metric;
use crate::ml::random_forest::MaxFeatures;

/// Default location of the configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/model_config.yaml";

// ─── Root document ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub model_params:       ModelParams,
    pub data_paths:         DataPaths,
    pub data_preprocessing: Preprocessing,
    pub features:           FeatureGroups,
    pub analysis:           AnalysisToggles,
    pub evaluation:         EvaluationParams,
    pub prediction:         PredictionParams,
}

// ─── Model hyperparameters ────────────────────────────────────────────────────
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    pub random_forest: RandomForestParams,
    pub lstm:          LstmParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomForestParams {
    pub n_estimators:      usize,
    /// None grows trees until leaves are pure or too small to split
    pub max_depth:         Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf:  usize,
    pub max_features:      MaxFeatures,
    pub bootstrap:         bool,
    /// Rows drawn per tree; None draws as many rows as the training set has
    pub max_samples:       Option<usize>,
    pub random_state:      u64,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_estimators:      100,
            max_depth:         Some(20),
            min_samples_split: 5,
            min_samples_leaf:  2,
            max_features:      MaxFeatures::Sqrt,
            bootstrap:         true,
            max_samples:       None,
            random_state:      42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LstmParams {
    /// Hidden units per LSTM layer
    pub units:            usize,
    pub layers:           usize,
    pub dropout:          f64,
    pub epochs:           usize,
    pub batch_size:       usize,
    /// Days of history per training window
    pub sequence_length:  usize,
    pub learning_rate:    f64,
    /// Fraction of windows held out for validation
    pub validation_split: f64,
    /// Cap on the number of windows built; None keeps all
    pub max_sequences:    Option<usize>,
}

impl Default for LstmParams {
    fn default() -> Self {
        Self {
            units:            50,
            layers:           2,
            dropout:          0.2,
            epochs:           10,
            batch_size:       64,
            sequence_length:  14,
            learning_rate:    1e-3,
            validation_split: 0.2,
            max_sequences:    None,
        }
    }
}

// ─── Data paths ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPaths {
    pub train: PathBuf,
    pub test:  PathBuf,
    pub store: PathBuf,
}

impl Default for DataPaths {
    fn default() -> Self {
        Self {
            train: PathBuf::from("data/raw/train.csv"),
            test:  PathBuf::from("data/raw/test.csv"),
            store: PathBuf::from("data/raw/store.csv"),
        }
    }
}

// ─── Preprocessing rules ──────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Preprocessing {
    /// Drop training rows of closed stores / zero sales before fitting
    pub drop_closed_days: bool,
    pub missing_values:   MissingValues,
    pub outliers:         Outliers,
    pub scaling:          Scaling,
    pub encoding:         Encoding,
}

impl Default for Preprocessing {
    fn default() -> Self {
        Self {
            drop_closed_days: true,
            missing_values:   MissingValues::default(),
            outliers:         Outliers::default(),
            scaling:          Scaling::default(),
            encoding:         Encoding::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy {
    Median,
    Mean,
    Zero,
    /// Treat "no competitor recorded" as "competitor far away"
    Max,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissingValues {
    pub competition_distance:   ImputeStrategy,
    /// Fill value for CompetitionOpenSinceMonth / CompetitionOpenSinceYear
    pub competition_open_since: f64,
    /// Fill value for Promo2SinceWeek / Promo2SinceYear
    pub promo2_since:           f64,
    pub promo_interval:         String,
}

impl Default for MissingValues {
    fn default() -> Self {
        Self {
            competition_distance:   ImputeStrategy::Median,
            competition_open_since: 0.0,
            promo2_since:           0.0,
            promo_interval:         String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierMethod {
    Iqr,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Outliers {
    pub method:    OutlierMethod,
    /// k in [Q1 − k·IQR, Q3 + k·IQR]
    pub threshold: f64,
    pub columns:   Vec<OutlierColumn>,
}

impl Default for Outliers {
    fn default() -> Self {
        Self {
            method:    OutlierMethod::Iqr,
            threshold: 1.5,
            columns:   vec![OutlierColumn::Sales, OutlierColumn::CompetitionDistance],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scaling {
    pub method:   ScalingMethod,
    pub features: Vec<Feature>,
}

impl Default for Scaling {
    fn default() -> Self {
        Self {
            method:   ScalingMethod::Standard,
            features: vec![
                Feature::CompetitionDistance,
                Feature::CompetitionOpen,
                Feature::Promo2Open,
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingMethod {
    Label,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Encoding {
    pub method:   EncodingMethod,
    pub features: Vec<Feature>,
}

impl Default for Encoding {
    fn default() -> Self {
        Self {
            method:   EncodingMethod::Label,
            features: vec![Feature::StoreType, Feature::Assortment, Feature::StateHoliday],
        }
    }
}

// ─── Feature groups ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureGroups {
    pub datetime: Vec<Feature>,
    pub holiday:  Vec<Feature>,
    pub store:    Vec<Feature>,
}

impl Default for FeatureGroups {
    fn default() -> Self {
        Self {
            datetime: vec![
                Feature::Year,
                Feature::Month,
                Feature::Day,
                Feature::WeekOfYear,
                Feature::DayOfWeek,
                Feature::IsWeekend,
            ],
            holiday: vec![
                Feature::IsHoliday,
                Feature::StateHoliday,
                Feature::SchoolHoliday,
                Feature::DaysToHoliday,
                Feature::DaysAfterHoliday,
            ],
            store: vec![
                Feature::Store,
                Feature::StoreType,
                Feature::Assortment,
                Feature::CompetitionDistance,
                Feature::CompetitionOpen,
                Feature::Promo,
                Feature::Promo2,
                Feature::Promo2Open,
                Feature::IsPromoMonth,
            ],
        }
    }
}

impl FeatureGroups {
    /// All groups concatenated in order, first occurrence wins.
    pub fn selected(&self) -> Vec<Feature> {
        let mut out: Vec<Feature> = Vec::new();
        for f in self.datetime.iter().chain(&self.holiday).chain(&self.store) {
            if !out.contains(f) {
                out.push(*f);
            }
        }
        out
    }
}

// ─── Analysis / evaluation / prediction ──────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisToggles {
    pub promotions:          bool,
    pub holidays:            bool,
    pub seasonality:         bool,
    pub store_patterns:      bool,
    pub competition:         bool,
    pub promo_effectiveness: bool,
    /// Where the JSON report is written
    pub output:              PathBuf,
}

impl Default for AnalysisToggles {
    fn default() -> Self {
        Self {
            promotions:          true,
            holidays:            true,
            seasonality:         true,
            store_patterns:      true,
            competition:         true,
            promo_effectiveness: true,
            output:              PathBuf::from("reports/analysis.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationParams {
    pub metrics:  Vec<Metric>,
    pub cv_folds: usize,
}

impl Default for EvaluationParams {
    fn default() -> Self {
        Self {
            metrics:  vec![Metric::Rmse, Metric::Mae, Metric::Mape],
            cv_folds: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionParams {
    /// Maximum number of days a single request may forecast
    pub horizon:             usize,
    pub confidence_interval: f64,
}

impl Default for PredictionParams {
    fn default() -> Self {
        Self { horizon: 42, confidence_interval: 0.95 }
    }
}

// ─── Loading ──────────────────────────────────────────────────────────────────
impl ForecastConfig {
    /// Read, parse and validate a YAML config.
    ///
    /// A missing file is not an error: the defaults are used and a
    /// warning is logged. Malformed YAML and failed validation are.
    pub fn load(path: &Path) -> Result<Self> {
        let cfg = match fs::read_to_string(path) {
            Ok(text) => serde_yaml::from_str::<Self>(&text)
                .with_context(|| format!("Cannot parse config '{}'", path.display()))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(
                    "Config file not found at '{}'. Using default configuration.",
                    path.display()
                );
                Self::default()
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Cannot read config '{}'", path.display()))
            }
        };

        cfg.validate()
            .with_context(|| format!("Invalid config '{}'", path.display()))?;
        tracing::debug!("Loaded configuration from '{}'", path.display());
        Ok(cfg)
    }

    /// Check the document is internally consistent.
    pub fn validate(&self) -> Result<()> {
        let rf = &self.model_params.random_forest;
        if rf.n_estimators == 0 {
            bail!("model_params.random_forest.n_estimators must be at least 1");
        }
        if rf.min_samples_split < 2 {
            bail!("model_params.random_forest.min_samples_split must be at least 2");
        }
        if rf.min_samples_leaf == 0 {
            bail!("model_params.random_forest.min_samples_leaf must be at least 1");
        }
        if let MaxFeatures::Fraction(f) = rf.max_features {
            if !(f > 0.0 && f <= 1.0) {
                bail!("model_params.random_forest.max_features fraction must be in (0, 1], got {f}");
            }
        }

        let lstm = &self.model_params.lstm;
        if lstm.units == 0 || lstm.layers == 0 {
            bail!("model_params.lstm needs at least one layer with at least one unit");
        }
        if lstm.sequence_length == 0 || lstm.batch_size == 0 || lstm.epochs == 0 {
            bail!("model_params.lstm sequence_length, batch_size and epochs must be positive");
        }
        if !(0.0..1.0).contains(&lstm.dropout) {
            bail!("model_params.lstm.dropout must be in [0, 1), got {}", lstm.dropout);
        }
        if !(lstm.validation_split > 0.0 && lstm.validation_split < 1.0) {
            bail!(
                "model_params.lstm.validation_split must be in (0, 1), got {}",
                lstm.validation_split
            );
        }

        let prep = &self.data_preprocessing;
        if prep.outliers.method == OutlierMethod::Iqr && prep.outliers.threshold <= 0.0 {
            bail!("data_preprocessing.outliers.threshold must be positive");
        }
        if let Some(f) = prep.scaling.features.iter().find(|f| f.is_categorical()) {
            bail!("data_preprocessing.scaling.features: '{f}' is categorical and cannot be scaled");
        }
        if let Some(f) = prep.encoding.features.iter().find(|f| !f.is_categorical()) {
            bail!("data_preprocessing.encoding.features: '{f}' is not a categorical column");
        }

        let selected = self.features.selected();
        if selected.is_empty() {
            bail!("features: at least one feature must be selected");
        }
        if let Some(f) = selected
            .iter()
            .find(|f| f.is_categorical() && !prep.encoding.features.contains(f))
        {
            bail!("features: '{f}' is categorical but not listed under data_preprocessing.encoding");
        }

        if self.evaluation.cv_folds < 2 {
            bail!("evaluation.cv_folds must be at least 2, got {}", self.evaluation.cv_folds);
        }
        if self.evaluation.metrics.is_empty() {
            bail!("evaluation.metrics must name at least one metric");
        }

        if self.prediction.horizon == 0 {
            bail!("prediction.horizon must be at least 1 day");
        }
        let c = self.prediction.confidence_interval;
        if !(c > 0.0 && c < 1.0) {
            bail!("prediction.confidence_interval must be in (0, 1), got {c}");
        }
        Ok(())
    }
}

/// The project root a config file belongs to: the parent of the
/// directory that holds it (`config/model_config.yaml` → `.`).
pub fn project_root(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Resolve `path` against `root` unless it is already absolute.
pub fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    const SHIPPED: &str = include_str!("../../config/model_config.yaml");

    #[test]
    fn test_shipped_config_parses_and_validates() {
        let cfg: ForecastConfig = serde_yaml::from_str(SHIPPED).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.model_params.random_forest.n_estimators, 100);
        assert_eq!(cfg.model_params.lstm.sequence_length, 14);
        assert_eq!(cfg.data_paths.store, PathBuf::from("data/raw/store.csv"));
        assert_eq!(cfg.data_preprocessing.outliers.threshold, 1.5);
        assert_eq!(cfg.evaluation.cv_folds, 5);
        assert!(cfg.evaluation.metrics.contains(&Metric::Rmspe));
        assert_eq!(cfg.prediction.horizon, 42);
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let cfg: ForecastConfig =
            serde_yaml::from_str("prediction:\n  horizon: 7\n").unwrap();
        assert_eq!(cfg.prediction.horizon, 7);
        assert_eq!(cfg.prediction.confidence_interval, 0.95);
        assert_eq!(cfg.data_paths, DataPaths::default());
        cfg.validate().unwrap();
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ForecastConfig::load(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(cfg.data_paths.train, PathBuf::from("data/raw/train.csv"));
    }

    #[test]
    fn test_malformed_yaml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(&path, "evaluation: [this is: not a mapping").unwrap();
        assert!(ForecastConfig::load(&path).is_err());
    }

    #[test]
    fn test_rejects_scaling_a_categorical_column() {
        let mut cfg = ForecastConfig::default();
        cfg.data_preprocessing.scaling.features.push(Feature::StoreType);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_unencoded_categorical_feature() {
        let mut cfg = ForecastConfig::default();
        cfg.data_preprocessing.encoding.features.retain(|f| *f != Feature::Assortment);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_numbers() {
        let mut cfg = ForecastConfig::default();
        cfg.evaluation.cv_folds = 1;
        assert!(cfg.validate().is_err());

        let mut cfg = ForecastConfig::default();
        cfg.prediction.confidence_interval = 1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = ForecastConfig::default();
        cfg.model_params.random_forest.max_features = MaxFeatures::Fraction(1.5);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_selected_features_deduplicate() {
        let groups = FeatureGroups {
            datetime: vec![Feature::Month, Feature::Year],
            holiday:  vec![Feature::Month],
            store:    vec![Feature::Promo],
        };
        assert_eq!(groups.selected(), vec![Feature::Month, Feature::Year, Feature::Promo]);
    }

    #[test]
    fn test_project_root() {
        assert_eq!(project_root(Path::new("config/model_config.yaml")), PathBuf::from("."));
        assert_eq!(
            project_root(Path::new("/srv/forecast/config/model_config.yaml")),
            PathBuf::from("/srv/forecast")
        );
        assert_eq!(
            resolve(Path::new("/srv/forecast"), Path::new("data/raw/train.csv")),
            PathBuf::from("/srv/forecast/data/raw/train.csv")
        );
    }
}
