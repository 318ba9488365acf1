// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends metric rows to CSV files in the artifacts directory.
//
//   lstm_metrics.csv — one row per LSTM epoch
//     epoch,train_loss,val_loss,val_rmse
//     1,0.912345,0.854321,1893.120000
//
//   cv_metrics.csv   — one row per (fold, metric)
//     fold,train_rows,validation_rows,metric,value
//     1,140230,140229,rmse,1201.550000
//
// The header is written when the file is new or empty, so
// repeated runs append to the same log.
//
// How to read the epoch log:
//   - train_loss and val_loss are MSE on scaled sales
//   - val_rmse is in sales units
//   - val_loss rising while train_loss falls → overfitting

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
};

pub const EPOCH_LOG: &str = "lstm_metrics.csv";
pub const FOLD_LOG: &str = "cv_metrics.csv";

/// One row of the LSTM epoch log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch:      usize,
    pub train_loss: f64,
    pub val_loss:   f64,
    /// sqrt(val_loss) in sales units
    pub val_rmse:   f64,
}

impl EpochMetrics {
    pub fn new(epoch: usize, train_loss: f64, val_loss: f64, val_rmse: f64) -> Self {
        Self { epoch, train_loss, val_loss, val_rmse }
    }

    /// Returns true if this epoch improved over the previous best val_loss
    pub fn is_improvement(&self, best_val_loss: f64) -> bool {
        self.val_loss < best_val_loss
    }
}

/// One metric of one cross-validation fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldMetrics {
    pub fold:            usize,
    pub train_rows:      usize,
    pub validation_rows: usize,
    pub metric:          String,
    pub value:           f64,
}

/// Appends serialisable rows to one CSV file.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create the directory if needed; the file itself is created on first write.
    pub fn new(dir: &Path, file_name: &str) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create metrics directory '{}'", dir.display()))?;
        Ok(Self { csv_path: dir.join(file_name) })
    }

    pub fn log<T: Serialize>(&self, row: &T) -> Result<()> {
        self.log_all(std::slice::from_ref(row))
    }

    pub fn log_all<T: Serialize>(&self, rows: &[T]) -> Result<()> {
        let is_new = fs::metadata(&self.csv_path).map_or(true, |m| m.len() == 0);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;

        tracing::debug!("Logged {} rows to '{}'", rows.len(), self.csv_path.display());
        Ok(())
    }

    /// Return the path to the metrics CSV file
    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_improvement() {
        let m = EpochMetrics::new(2, 2.5, 2.3, 100.0);
        // 2.3 < 3.0 → this is an improvement
        assert!(m.is_improvement(3.0));
        // 2.3 is NOT less than 2.0 → not an improvement
        assert!(!m.is_improvement(2.0));
    }

    #[test]
    fn test_header_written_once_across_loggers() {
        let dir = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path(), EPOCH_LOG).unwrap();
        logger.log(&EpochMetrics::new(1, 0.5, 0.4, 12.0)).unwrap();

        let again = MetricsLogger::new(dir.path(), EPOCH_LOG).unwrap();
        again.log(&EpochMetrics::new(2, 0.25, 0.2, 6.0)).unwrap();

        let text = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "epoch,train_loss,val_loss,val_rmse");
        assert_eq!(lines[2], "2,0.25,0.2,6.0");
    }

    #[test]
    fn test_fold_rows() {
        let dir = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(&dir.path().join("nested"), FOLD_LOG).unwrap();
        let rows = vec![
            FoldMetrics { fold: 1, train_rows: 10, validation_rows: 5, metric: "rmse".into(), value: 1.5 },
            FoldMetrics { fold: 1, train_rows: 10, validation_rows: 5, metric: "mae".into(), value: 1.0 },
        ];
        logger.log_all(&rows).unwrap();

        let mut reader = csv::Reader::from_path(logger.csv_path()).unwrap();
        let back: Vec<FoldMetrics> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(back, rows);
    }
}
