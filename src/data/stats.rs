// ============================================================
// Layer 4 — Descriptive Statistics
// ============================================================
// Small numeric helpers shared by the preprocessor (medians,
// IQR quantiles, scaler moments) and the analyzer (group means
// and standard deviations).
//
// Conventions match the usual dataframe defaults:
//   - quantiles interpolate linearly between order statistics
//   - sample_std uses n − 1 (population_std uses n)
//   - empty input yields NaN rather than an error

use serde::{Deserialize, Serialize};

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Standard deviation with n − 1 in the denominator. NaN below two values.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Standard deviation with n in the denominator.
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / values.len() as f64).sqrt()
}

/// Quantile of an already sorted slice, `q` in [0, 1].
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let q   = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo  = pos.floor() as usize;
    let hi  = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

pub fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    quantile_sorted(&sorted, q)
}

pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// mean / std / count of one group of values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub mean:  f64,
    pub std:   f64,
    pub count: usize,
}

impl Summary {
    pub fn of(values: &[f64]) -> Self {
        Self {
            mean:  mean(values),
            std:   sample_std(values),
            count: values.len(),
        }
    }
}
