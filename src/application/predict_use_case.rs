// ============================================================
// Layer 2 — PredictUseCase
// ============================================================
// Forecasts one store for `days` consecutive dates:
//
//   Step 1: Validate the request      (store known, 1 ≤ days ≤ horizon)
//   Step 2: Build the future rows     (store table joined in)
//   Step 3: Apply the fitted pipeline (Layer 4 - data)
//   Step 4: Forest + interval         (Layer 5 - ml)
//
// Only the random forest serves requests: the LSTM needs a
// window of recent history that a single request does not carry.
// The use case is immutable after loading and is shared between
// HTTP handlers behind an Arc.

use anyhow::{ensure, Result};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::Path,
};
use thiserror::Error;

use crate::application::Workspace;
use crate::config::PredictionParams;
use crate::data::{features::FittedPreprocessor, loader::CsvSalesSource};
use crate::domain::{
    record::{MergedRecord, SalesRecord, StoreRecord},
    traits::SalesSource,
};
use crate::infra::checkpoint::ArtifactStore;
use crate::ml::random_forest::RandomForest;

pub const MODEL_NAME: &str = "random_forest";

const STATE_HOLIDAY_CODES: [&str; 4] = ["0", "a", "b", "c"];

// ─── Request / response ───────────────────────────────────────────────────────
/// Flags use the 0/1 convention of the sales table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub store:          u32,
    /// First forecast day
    pub date:           NaiveDate,
    #[serde(default = "default_days")]
    pub days:           usize,
    #[serde(default)]
    pub promo:          u8,
    #[serde(default = "default_state_holiday")]
    pub state_holiday:  String,
    #[serde(default)]
    pub school_holiday: u8,
    #[serde(default = "default_open")]
    pub open:           u8,
}

fn default_days() -> usize { 1 }
fn default_state_holiday() -> String { "0".to_string() }
fn default_open() -> u8 { 1 }

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date:       NaiveDate,
    pub prediction: f64,
    pub lower:      f64,
    pub upper:      f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResponse {
    pub store:      u32,
    pub model:      String,
    pub confidence: f64,
    pub forecasts:  Vec<DailyForecast>,
}

// ─── Errors ───────────────────────────────────────────────────────────────────
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("unknown store {0}")]
    UnknownStore(u32),

    #[error("days must be between 1 and {horizon}, got {days}")]
    InvalidHorizon { days: usize, horizon: usize },

    #[error("invalid request: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Model(#[from] anyhow::Error),
}

// ─── PredictUseCase ───────────────────────────────────────────────────────────
pub struct PredictUseCase {
    preprocessor: FittedPreprocessor,
    forest:       RandomForest,
    stores:       BTreeMap<u32, StoreRecord>,
    prediction:   PredictionParams,
}

impl PredictUseCase {
    pub fn new(
        preprocessor: FittedPreprocessor,
        forest:       RandomForest,
        stores:       Vec<StoreRecord>,
        prediction:   PredictionParams,
    ) -> Self {
        let stores = stores.into_iter().map(|s| (s.store, s)).collect();
        Self { preprocessor, forest, stores, prediction }
    }

    /// Load the fitted pipeline and forest from `artifacts_dir` and
    /// the store table named by the config.
    pub fn load(config_path: &Path, artifacts_dir: &Path) -> Result<Self> {
        let Workspace { config, root } = Workspace::load(config_path)?;
        let artifacts    = ArtifactStore::new(artifacts_dir);
        let preprocessor = artifacts.load_preprocessor()?;
        let forest       = artifacts.load_forest()?;
        ensure!(
            forest.n_features() == preprocessor.features.len(),
            "random forest was fitted on {} features but the preprocessor produces {}; retrain the forest",
            forest.n_features(),
            preprocessor.features.len()
        );
        let stores = CsvSalesSource::from_config(&config, &root).load_stores()?;
        tracing::info!(
            "Prediction model ready: {} trees, {} stores, horizon {} days",
            forest.n_trees(),
            stores.len(),
            config.prediction.horizon
        );
        Ok(Self::new(preprocessor, forest, stores, config.prediction))
    }

    pub fn horizon(&self) -> usize {
        self.prediction.horizon
    }

    pub fn predict(&self, request: &ForecastRequest) -> Result<ForecastResponse, PredictError> {
        // ── Step 1: Validate ──────────────────────────────────────────────────
        let store = self
            .stores
            .get(&request.store)
            .ok_or(PredictError::UnknownStore(request.store))?;
        let horizon = self.horizon();
        if request.days == 0 || request.days > horizon {
            return Err(PredictError::InvalidHorizon { days: request.days, horizon });
        }
        for (name, flag) in [
            ("promo", request.promo),
            ("school_holiday", request.school_holiday),
            ("open", request.open),
        ] {
            if flag > 1 {
                return Err(PredictError::InvalidInput(format!("{name} must be 0 or 1, got {flag}")));
            }
        }
        let state_holiday = request.state_holiday.trim();
        if !STATE_HOLIDAY_CODES.contains(&state_holiday) {
            return Err(PredictError::InvalidInput(format!(
                "state_holiday must be one of 0, a, b, c, got '{state_holiday}'"
            )));
        }

        // ── Step 2: Future rows ───────────────────────────────────────────────
        let mut records = Vec::with_capacity(request.days);
        for offset in 0..request.days {
            let date = request
                .date
                .checked_add_signed(Duration::days(offset as i64))
                .ok_or_else(|| PredictError::InvalidInput("date out of range".to_string()))?;
            let sale = SalesRecord {
                id:             None,
                store:          request.store,
                day_of_week:    date.weekday().number_from_monday() as u8,
                date,
                sales:          None,
                customers:      None,
                open:           Some(f64::from(request.open)),
                promo:          request.promo,
                state_holiday:  state_holiday.to_string(),
                school_holiday: request.school_holiday,
            };
            records.push(MergedRecord::new(sale, Some(store)));
        }

        // ── Step 3: Features ──────────────────────────────────────────────────
        let matrix = self.preprocessor.transform(records)?;

        // ── Step 4: Forecast ──────────────────────────────────────────────────
        let confidence = self.prediction.confidence_interval;
        let intervals  = self.forest.predict_with_interval(&matrix.data, confidence)?;
        let forecasts = matrix
            .keys
            .iter()
            .zip(intervals)
            .map(|(key, iv)| {
                if key.open {
                    DailyForecast { date: key.date, prediction: iv.prediction, lower: iv.lower, upper: iv.upper }
                } else {
                    DailyForecast { date: key.date, prediction: 0.0, lower: 0.0, upper: 0.0 }
                }
            })
            .collect();

        tracing::debug!("Forecast store {} from {} for {} days", request.store, request.date, request.days);
        Ok(ForecastResponse {
            store: request.store,
            model: MODEL_NAME.to_string(),
            confidence,
            forecasts,
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{
        fixtures::write_project,
        train_use_case::{ModelSelection, TrainConfig, TrainUseCase},
    };

    /// Train the forest on the fixture project and load it back.
    fn trained() -> (tempfile::TempDir, PredictUseCase) {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_project(dir.path());
        let artifacts_dir = dir.path().join("artifacts");
        TrainUseCase::new(TrainConfig {
            config_path:   config_path.clone(),
            artifacts_dir: artifacts_dir.clone(),
            model:         ModelSelection::RandomForest,
            epochs:        None,
        })
        .execute()
        .unwrap();
        let use_case = PredictUseCase::load(&config_path, &artifacts_dir).unwrap();
        (dir, use_case)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// One open, non-promo, non-holiday day.
    fn open_day(store: u32, date: NaiveDate) -> ForecastRequest {
        ForecastRequest {
            store,
            date,
            days:           1,
            promo:          0,
            state_holiday:  "0".to_string(),
            school_holiday: 0,
            open:           1,
        }
    }

    #[test]
    fn test_multi_day_forecast_with_intervals() {
        let (_dir, uc) = trained();
        let mut request = open_day(2, date(2015, 3, 2));
        request.days = 5;
        request.promo = 1;

        let response = uc.predict(&request).unwrap();
        assert_eq!(response.store, 2);
        assert_eq!(response.model, MODEL_NAME);
        assert_eq!(response.confidence, 0.9);
        assert_eq!(response.forecasts.len(), 5);
        assert_eq!(response.forecasts[4].date, date(2015, 3, 6));
        for f in &response.forecasts {
            assert!(f.prediction > 0.0);
            assert!(f.lower <= f.prediction && f.prediction <= f.upper);
        }
    }

    #[test]
    fn test_closed_days_forecast_zero() {
        let (_dir, uc) = trained();
        let mut request = open_day(1, date(2015, 3, 2));
        request.open = 0;
        let response = uc.predict(&request).unwrap();
        assert_eq!(response.forecasts[0].prediction, 0.0);
        assert_eq!(response.forecasts[0].upper, 0.0);
    }

    #[test]
    fn test_request_validation() {
        let (_dir, uc) = trained();

        let unknown = open_day(99, date(2015, 3, 2));
        assert!(matches!(uc.predict(&unknown), Err(PredictError::UnknownStore(99))));

        let mut too_long = open_day(1, date(2015, 3, 2));
        too_long.days = uc.horizon() + 1;
        assert!(matches!(
            uc.predict(&too_long),
            Err(PredictError::InvalidHorizon { days: 8, horizon: 7 })
        ));

        let mut bad_flag = open_day(1, date(2015, 3, 2));
        bad_flag.promo = 2;
        assert!(matches!(uc.predict(&bad_flag), Err(PredictError::InvalidInput(_))));

        let mut bad_holiday = open_day(1, date(2015, 3, 2));
        bad_holiday.state_holiday = "x".to_string();
        assert!(matches!(uc.predict(&bad_holiday), Err(PredictError::InvalidInput(_))));
    }

    #[test]
    fn test_load_rejects_forest_preprocessor_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_project(dir.path());
        let artifacts_dir = dir.path().join("artifacts");
        TrainUseCase::new(TrainConfig {
            config_path:   config_path.clone(),
            artifacts_dir: artifacts_dir.clone(),
            model:         ModelSelection::RandomForest,
            epochs:        None,
        })
        .execute()
        .unwrap();

        let store = ArtifactStore::new(&artifacts_dir);
        let mut preprocessor = store.load_preprocessor().unwrap();
        preprocessor.features.pop();
        store.save_preprocessor(&preprocessor).unwrap();

        let err = PredictUseCase::load(&config_path, &artifacts_dir).err().unwrap();
        assert!(err.to_string().contains("retrain the forest"));
    }

    #[test]
    fn test_request_defaults() {
        let parsed: ForecastRequest =
            serde_json::from_str(r#"{"store": 1, "date": "2015-08-01"}"#).unwrap();
        assert_eq!(parsed, open_day(1, date(2015, 8, 1)));
    }
}
