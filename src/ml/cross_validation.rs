// ============================================================
// Layer 5 — Time-Series Cross-Validation
// ============================================================
// Expanding-window folds: the data is cut into folds + 1
// consecutive blocks; fold k trains on everything before
// block k and validates on block k.
//
//   folds = 3, blocks A B C D
//     fold 1: train A       → validate B
//     fold 2: train A B     → validate C
//     fold 3: train A B C   → validate D
//
// Rows are blocked by calendar date so one day's stores never
// straddle the train / validation boundary.

use anyhow::{ensure, Result};
use chrono::NaiveDate;
use ndarray::Axis;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, ops::Range};

use crate::data::features::FeatureMatrix;
use crate::domain::traits::Regressor;
use crate::ml::evaluation::{evaluate, Metric};

/// Positions of one fold in an ordered sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train:      Range<usize>,
    pub validation: Range<usize>,
}

/// Expanding-window splits over `n` ordered items. The first
/// block absorbs the remainder when `n` is not divisible.
pub fn time_series_splits(n: usize, folds: usize) -> Result<Vec<Split>> {
    ensure!(folds >= 2, "need at least 2 folds, got {folds}");
    let block = n / (folds + 1);
    ensure!(block > 0, "{n} ordered items cannot fill {} blocks", folds + 1);

    Ok((0..folds)
        .map(|k| {
            let train_end = n - (folds - k) * block;
            Split { train: 0..train_end, validation: train_end..train_end + block }
        })
        .collect())
}

/// Row indices of one fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train:      Vec<usize>,
    pub validation: Vec<usize>,
}

/// Expanding-window folds over the distinct dates of `dates`.
pub fn date_blocked_folds(dates: &[NaiveDate], folds: usize) -> Result<Vec<Fold>> {
    let mut unique: Vec<NaiveDate> = dates.to_vec();
    unique.sort();
    unique.dedup();

    let splits = time_series_splits(unique.len(), folds)?;
    Ok(splits
        .into_iter()
        .map(|s| {
            let train_until = unique[s.train.end - 1];
            let val_from    = unique[s.validation.start];
            let val_until   = unique[s.validation.end - 1];
            let mut fold = Fold { train: Vec::new(), validation: Vec::new() };
            for (i, d) in dates.iter().enumerate() {
                if *d <= train_until {
                    fold.train.push(i);
                } else if *d >= val_from && *d <= val_until {
                    fold.validation.push(i);
                }
            }
            fold
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldScore {
    pub fold:            usize,
    pub train_rows:      usize,
    pub validation_rows: usize,
    pub scores:          BTreeMap<Metric, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvReport {
    pub folds: Vec<FoldScore>,
    /// Mean of each metric over the folds
    pub mean:  BTreeMap<Metric, f64>,
}

/// Fit a fresh model from `factory` on each fold's training rows
/// and score it on the fold's validation rows.
pub fn cross_validate<R, F>(
    factory: F,
    matrix:  &FeatureMatrix,
    folds:   usize,
    metrics: &[Metric],
) -> Result<CvReport>
where
    R: Regressor,
    F: Fn() -> R,
{
    let target = matrix
        .target
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("cross-validation needs a Sales target"))?;
    let actuals = matrix.actuals().unwrap_or(target);
    let dates: Vec<NaiveDate> = matrix.keys.iter().map(|k| k.date).collect();
    let plan = date_blocked_folds(&dates, folds)?;

    let mut scores = Vec::with_capacity(plan.len());
    for (k, fold) in plan.iter().enumerate() {
        let x_train = matrix.data.select(Axis(0), &fold.train);
        let y_train = target.select(Axis(0), &fold.train);
        let x_valid = matrix.data.select(Axis(0), &fold.validation);
        let actual  = actuals.select(Axis(0), &fold.validation);

        let mut model = factory();
        model.fit(&x_train, &y_train)?;
        let predicted = model.predict(&x_valid)?;

        let fold_scores = evaluate(metrics, &actual.to_vec(), &predicted.to_vec());
        tracing::info!(
            "Fold {}/{}: {} train / {} validation rows, {}",
            k + 1,
            plan.len(),
            fold.train.len(),
            fold.validation.len(),
            fold_scores
                .iter()
                .map(|(m, v)| format!("{m}={v:.4}"))
                .collect::<Vec<_>>()
                .join(" ")
        );
        scores.push(FoldScore {
            fold:            k + 1,
            train_rows:      fold.train.len(),
            validation_rows: fold.validation.len(),
            scores:          fold_scores,
        });
    }

    let mean = metrics
        .iter()
        .map(|m| {
            let vals: Vec<f64> = scores.iter().map(|s| s.scores[m]).collect();
            (*m, crate::data::stats::mean(&vals))
        })
        .collect();

    Ok(CvReport { folds: scores, mean })
}
