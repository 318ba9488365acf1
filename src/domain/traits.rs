// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer talks to data sources and models only
// through these traits:
//   - CsvSalesSource implements SalesSource
//   - RandomForest implements Regressor
//
// Cross-validation is written against Regressor, so any model
// that can fit a matrix and predict rows can be scored.

use anyhow::Result;
use ndarray::{Array1, Array2};

use crate::domain::record::{SalesRecord, StoreRecord};

// ─── SalesSource ──────────────────────────────────────────────────────────────
/// Any component that can provide the three Rossmann tables.
pub trait SalesSource {
    /// Load the (train, test) sales tables.
    fn load_sales(&self) -> Result<(Vec<SalesRecord>, Vec<SalesRecord>)>;

    /// Load the store attribute table.
    fn load_stores(&self) -> Result<Vec<StoreRecord>>;
}

// ─── Regressor ────────────────────────────────────────────────────────────────
/// A model mapping a feature matrix (rows = samples) to one
/// continuous target per row.
pub trait Regressor {
    /// Fit on `x` ([n_samples, n_features]) against `y` ([n_samples]).
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Predict one value per row of `x`. Errors if called before `fit`.
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}
