// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between the raw CSV tables and model-ready arrays.
//
//   train.csv / test.csv / store.csv
//       │
//       ▼
//   loader        → CSV rows, left join on Store
//       │
//       ▼
//   preprocessor  → imputation, IQR clipping, encoders, scaler
//       │
//       ▼
//   features      → calendar / holiday / competition / promo
//                   columns, assembled into a FeatureMatrix
//       │
//       ├──────────► random forest (rows of the matrix)
//       ▼
//   dataset       → per-store windows for the LSTM
//   batcher       → burn tensors [batch, seq, features]
//
// `analysis` reads the merged rows directly and produces the
// exploratory report; `stats` holds the shared numeric helpers.

use std::path::PathBuf;
use thiserror::Error;

/// Reads the three CSV tables
pub mod loader;

/// Cleaning: missing values, outliers, encoding, scaling
pub mod preprocessor;

/// Feature engineering and matrix assembly
pub mod features;

/// Exploratory statistics over the merged tables
pub mod analysis;

/// Descriptive statistics helpers
pub mod stats;

/// LSTM training windows (burn Dataset)
pub mod dataset;

/// burn Batcher turning windows into tensors
pub mod batcher;

/// Seeded shuffle and train/validation split
pub mod splitter;

/// Failures while reading or shaping tabular data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("cannot open '{path}': {source}")]
    Open {
        path:   PathBuf,
        source: std::io::Error,
    },

    #[error("malformed CSV in '{path}': {source}")]
    Csv {
        path:   PathBuf,
        source: csv::Error,
    },

    #[error("'{0}' contains no data rows")]
    EmptyTable(PathBuf),

    #[error("no rows left to fit on after preprocessing")]
    NoTrainingRows,

    #[error("training rows must carry a Sales value (store {store}, {date})")]
    MissingTarget { store: u32, date: chrono::NaiveDate },

    #[error("feature matrix has no '{0}' column")]
    UnknownColumn(String),
}
