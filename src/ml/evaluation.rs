// ============================================================
// Layer 5 — Regression Metrics
// ============================================================
// All metrics compare `actual` and `predicted` element-wise.
//
//   rmse   sqrt(mean((y − ŷ)²))
//   mae    mean(|y − ŷ|)
//   mape   mean(|y − ŷ| / |y|)          over y ≠ 0
//   rmspe  sqrt(mean(((y − ŷ) / y)²))    over y ≠ 0
//   r2     1 − SS_res / SS_tot
//
// MAPE and RMSPE are fractions (0.12 = 12%). Rows with a zero
// actual are skipped, matching the Kaggle scoring of this data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Rmse,
    Mae,
    Mape,
    Rmspe,
    R2,
}

impl Metric {
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Rmse  => "rmse",
            Metric::Mae   => "mae",
            Metric::Mape  => "mape",
            Metric::Rmspe => "rmspe",
            Metric::R2    => "r2",
        }
    }

    /// NaN when there is nothing to score.
    pub fn compute(&self, actual: &[f64], predicted: &[f64]) -> f64 {
        debug_assert_eq!(actual.len(), predicted.len());
        match self {
            Metric::Rmse  => rmse(actual, predicted),
            Metric::Mae   => mae(actual, predicted),
            Metric::Mape  => mape(actual, predicted),
            Metric::Rmspe => rmspe(actual, predicted),
            Metric::R2    => r2(actual, predicted),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn mean_of(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { f64::NAN } else { sum / n as f64 }
}

pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    mean_of(actual.iter().zip(predicted).map(|(y, p)| (y - p).powi(2))).sqrt()
}

pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    mean_of(actual.iter().zip(predicted).map(|(y, p)| (y - p).abs()))
}

pub fn mape(actual: &[f64], predicted: &[f64]) -> f64 {
    mean_of(
        actual
            .iter()
            .zip(predicted)
            .filter(|(y, _)| **y != 0.0)
            .map(|(y, p)| ((y - p) / y).abs()),
    )
}

pub fn rmspe(actual: &[f64], predicted: &[f64]) -> f64 {
    mean_of(
        actual
            .iter()
            .zip(predicted)
            .filter(|(y, _)| **y != 0.0)
            .map(|(y, p)| ((y - p) / y).powi(2)),
    )
    .sqrt()
}

/// 0 when the actuals are constant and the predictions exact,
/// −∞ when they are constant and the predictions are not.
pub fn r2(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return f64::NAN;
    }
    let m = mean_of(actual.iter().copied());
    let ss_tot: f64 = actual.iter().map(|y| (y - m).powi(2)).sum();
    let ss_res: f64 = actual.iter().zip(predicted).map(|(y, p)| (y - p).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 0.0 } else { f64::NEG_INFINITY };
    }
    1.0 - ss_res / ss_tot
}

/// Every requested metric, keyed by metric.
pub fn evaluate(metrics: &[Metric], actual: &[f64], predicted: &[f64]) -> BTreeMap<Metric, f64> {
    metrics.iter().map(|m| (*m, m.compute(actual, predicted))).collect()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    const Y: [f64; 4] = [100.0, 200.0, 0.0, 400.0];
    const P: [f64; 4] = [110.0, 180.0, 5.0, 400.0];

    #[test]
    fn test_rmse_and_mae() {
        // squared errors 100, 400, 25, 0
        assert!((rmse(&Y, &P) - (525.0f64 / 4.0).sqrt()).abs() < 1e-12);
        assert_eq!(mae(&Y, &P), 35.0 / 4.0);
    }

    #[test]
    fn test_percentage_metrics_skip_zero_actuals() {
        // relative errors 0.1, 0.1, 0.0 over the three non-zero rows
        assert!((mape(&Y, &P) - 0.2 / 3.0).abs() < 1e-12);
        assert!((rmspe(&Y, &P) - (0.02f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!(mape(&[0.0], &[1.0]).is_nan());
    }

    #[test]
    fn test_r2() {
        assert_eq!(r2(&Y, &Y), 1.0);
        let mean = [175.0; 4];
        assert!(r2(&Y, &mean).abs() < 1e-12);
        assert_eq!(r2(&[3.0, 3.0], &[3.0, 3.0]), 0.0);
    }

    #[test]
    fn test_metric_names_parse() {
        let m: Vec<Metric> = serde_yaml::from_str("[rmse, mae, mape, rmspe, r2]").unwrap();
        assert_eq!(m, vec![Metric::Rmse, Metric::Mae, Metric::Mape, Metric::Rmspe, Metric::R2]);
        assert_eq!(Metric::Rmspe.to_string(), "rmspe");

        let scores = evaluate(&m, &Y, &P);
        assert_eq!(scores.len(), 5);
        assert_eq!(scores[&Metric::Mae], mae(&Y, &P));
    }
}
