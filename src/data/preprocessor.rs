// ============================================================
// Layer 4 — Preprocessor
// ============================================================
// Cleaning steps applied to merged rows before (and, for the
// encoders and scaler, after) feature engineering:
//
//   1. drop_closed_days      — closed stores sell nothing; they
//                              are forecast as 0 and never fitted
//   2. handle_missing_values — CompetitionDistance by strategy,
//                              *_Since* columns and PromoInterval
//                              by configured constants
//   3. IQR outliers          — bounds fitted on train, values
//                              outside [Q1 − k·IQR, Q3 + k·IQR]
//                              clipped to the bounds
//   4. LabelEncoder          — sorted category codes
//   5. FeatureScaler         — standard or min-max per column
//
// Every fitted piece is serialisable so the prediction server
// applies exactly the transformation the model was trained on.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{ImputeStrategy, MissingValues};
use crate::data::{features::FeatureMatrix, stats, DataError};
use crate::domain::{
    feature::{Feature, OutlierColumn},
    record::MergedRecord,
};

// ─── Closed days ──────────────────────────────────────────────────────────────
/// Keep only rows where the store was open and sold something.
pub fn drop_closed_days(records: Vec<MergedRecord>) -> Vec<MergedRecord> {
    let before = records.len();
    let kept: Vec<MergedRecord> = records
        .into_iter()
        .filter(|r| r.sale.is_open() && r.sale.sales.map_or(true, |s| s > 0.0))
        .collect();
    tracing::info!("Dropped {} closed / zero-sales rows", before - kept.len());
    kept
}

// ─── Missing values ───────────────────────────────────────────────────────────
/// Fill value for CompetitionDistance under `strategy`, computed
/// over the rows that have one. Falls back to 0 when none do.
pub fn competition_distance_fill(records: &[MergedRecord], strategy: ImputeStrategy) -> f64 {
    let known: Vec<f64> = records.iter().filter_map(|r| r.competition_distance).collect();
    let fill = match strategy {
        ImputeStrategy::Median => stats::median(&known),
        ImputeStrategy::Mean   => stats::mean(&known),
        ImputeStrategy::Zero   => 0.0,
        ImputeStrategy::Max    => known.iter().copied().fold(f64::NAN, f64::max),
    };
    if fill.is_nan() { 0.0 } else { fill }
}

/// Replace every missing store attribute with its configured fill value.
pub fn handle_missing_values(records: &mut [MergedRecord], cfg: &MissingValues, distance_fill: f64) {
    let mut filled = 0usize;
    for r in records.iter_mut() {
        filled += fill(&mut r.competition_distance, distance_fill);
        filled += fill(&mut r.competition_open_since_month, cfg.competition_open_since);
        filled += fill(&mut r.competition_open_since_year, cfg.competition_open_since);
        filled += fill(&mut r.promo2_since_week, cfg.promo2_since);
        filled += fill(&mut r.promo2_since_year, cfg.promo2_since);
        if r.promo_interval.is_none() {
            r.promo_interval = Some(cfg.promo_interval.clone());
            filled += 1;
        }
    }
    tracing::info!("Successfully handled missing values ({filled} cells filled)");
}

fn fill(slot: &mut Option<f64>, value: f64) -> usize {
    if slot.is_none() {
        *slot = Some(value);
        1
    } else {
        0
    }
}

// ─── Outliers ─────────────────────────────────────────────────────────────────
/// Inclusive acceptance interval of the IQR rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IqrBounds {
    pub lower: f64,
    pub upper: f64,
}

impl IqrBounds {
    /// Bounds `[Q1 − k·IQR, Q3 + k·IQR]` of `values`. None when empty.
    pub fn fit(values: &[f64], threshold: f64) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let q1  = stats::quantile_sorted(&sorted, 0.25);
        let q3  = stats::quantile_sorted(&sorted, 0.75);
        let iqr = q3 - q1;
        Some(Self {
            lower: q1 - threshold * iqr,
            upper: q3 + threshold * iqr,
        })
    }

    pub fn is_outlier(&self, value: f64) -> bool {
        value < self.lower || value > self.upper
    }

    pub fn clip(&self, value: f64) -> f64 {
        value.clamp(self.lower, self.upper)
    }
}

/// Flag each value outside the IQR bounds of the slice itself.
pub fn detect_outliers(values: &[f64], threshold: f64, column: &str) -> Vec<bool> {
    let Some(bounds) = IqrBounds::fit(values, threshold) else {
        return Vec::new();
    };
    let mask: Vec<bool> = values.iter().map(|v| bounds.is_outlier(*v)).collect();
    tracing::info!(
        "Detected {} outliers in {column}",
        mask.iter().filter(|o| **o).count()
    );
    mask
}

fn outlier_value(record: &MergedRecord, column: OutlierColumn) -> Option<f64> {
    match column {
        OutlierColumn::Sales               => record.sale.sales,
        OutlierColumn::Customers           => record.sale.customers,
        OutlierColumn::CompetitionDistance => record.competition_distance,
    }
}

fn outlier_slot(record: &mut MergedRecord, column: OutlierColumn) -> &mut Option<f64> {
    match column {
        OutlierColumn::Sales               => &mut record.sale.sales,
        OutlierColumn::Customers           => &mut record.sale.customers,
        OutlierColumn::CompetitionDistance => &mut record.competition_distance,
    }
}

/// Fit IQR bounds for each configured column over the present values.
pub fn fit_outlier_bounds(
    records:   &[MergedRecord],
    columns:   &[OutlierColumn],
    threshold: f64,
) -> BTreeMap<OutlierColumn, IqrBounds> {
    let mut bounds = BTreeMap::new();
    for &column in columns {
        let values: Vec<f64> = records
            .iter()
            .filter_map(|r| outlier_value(r, column))
            .collect();
        let name = column.to_string();
        detect_outliers(&values, threshold, &name);
        if let Some(b) = IqrBounds::fit(&values, threshold) {
            tracing::debug!("{name} bounds: [{:.2}, {:.2}]", b.lower, b.upper);
            bounds.insert(column, b);
        }
    }
    bounds
}

/// Clip present values of each bounded column into its interval.
pub fn clip_outliers(records: &mut [MergedRecord], bounds: &BTreeMap<OutlierColumn, IqrBounds>) {
    for (&column, b) in bounds {
        let mut clipped = 0usize;
        for r in records.iter_mut() {
            if let Some(v) = outlier_slot(r, column) {
                if b.is_outlier(*v) {
                    *v = b.clip(*v);
                    clipped += 1;
                }
            }
        }
        tracing::debug!("Clipped {clipped} values of {column}");
    }
}

// ─── Label encoding ───────────────────────────────────────────────────────────
/// Maps category strings to their index in the sorted set of
/// categories seen during fitting. Unseen categories encode as -1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut classes: Vec<String> = values.into_iter().map(str::to_string).collect();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    pub fn encode(&self, value: &str) -> f64 {
        match self.classes.binary_search_by(|c| c.as_str().cmp(value)) {
            Ok(i)  => i as f64,
            Err(_) => -1.0,
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

// ─── Scaling ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMethod {
    /// (x − mean) / std
    Standard,
    /// (x − min) / (max − min)
    #[serde(rename = "minmax", alias = "min_max")]
    MinMax,
    None,
}

/// Affine transform `(x − offset) / scale` for one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnScale {
    pub offset: f64,
    pub scale:  f64,
}

impl ColumnScale {
    pub const IDENTITY: ColumnScale = ColumnScale { offset: 0.0, scale: 1.0 };

    /// A zero or undefined spread falls back to a scale of 1.
    pub fn fit(values: &[f64], method: ScalingMethod) -> Self {
        if values.is_empty() {
            return Self::IDENTITY;
        }
        let (offset, spread) = match method {
            ScalingMethod::Standard => (stats::mean(values), stats::population_std(values)),
            ScalingMethod::MinMax => {
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                (min, max - min)
            }
            ScalingMethod::None => return Self::IDENTITY,
        };
        let scale = if spread.is_finite() && spread > 0.0 { spread } else { 1.0 };
        Self { offset, scale }
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.offset) / self.scale
    }

    pub fn inverse(&self, value: f64) -> f64 {
        value * self.scale + self.offset
    }
}

/// Per-column scaling of a FeatureMatrix, fitted on training rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub method:  ScalingMethod,
    pub columns: Vec<(Feature, ColumnScale)>,
}

impl FeatureScaler {
    /// Fit on the named columns. Columns not present in the matrix are an error.
    pub fn fit(matrix: &FeatureMatrix, features: &[Feature], method: ScalingMethod) -> Result<Self> {
        let mut columns = Vec::with_capacity(features.len());
        for &f in features {
            let idx = matrix
                .column_index(f)
                .ok_or_else(|| DataError::UnknownColumn(f.to_string()))?;
            let values: Vec<f64> = matrix.data.column(idx).to_vec();
            columns.push((f, ColumnScale::fit(&values, method)));
        }
        Ok(Self { method, columns })
    }

    pub fn transform(&self, matrix: &mut FeatureMatrix) -> Result<()> {
        for (f, scale) in &self.columns {
            let idx = matrix
                .column_index(*f)
                .ok_or_else(|| DataError::UnknownColumn(f.to_string()))?;
            matrix.data.column_mut(idx).mapv_inplace(|v| scale.transform(v));
        }
        tracing::info!("Successfully scaled features");
        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::SalesRecord;
    use chrono::NaiveDate;
    use ndarray::array;

    fn merged(sales: f64, open: f64, distance: Option<f64>) -> MergedRecord {
        let sale = SalesRecord {
            id:             None,
            store:          1,
            day_of_week:    1,
            date:           NaiveDate::from_ymd_opt(2015, 1, 5).unwrap(),
            sales:          Some(sales),
            customers:      Some(sales / 10.0),
            open:           Some(open),
            promo:          0,
            state_holiday:  "0".into(),
            school_holiday: 0,
        };
        let mut m = MergedRecord::new(sale, None);
        m.competition_distance = distance;
        m
    }

    #[test]
    fn test_drop_closed_days() {
        let rows = vec![
            merged(100.0, 1.0, None),
            merged(0.0, 0.0, None),
            merged(0.0, 1.0, None),
        ];
        assert_eq!(drop_closed_days(rows).len(), 1);
    }

    #[test]
    fn test_median_imputation_and_constants() {
        let mut rows = vec![
            merged(1.0, 1.0, Some(100.0)),
            merged(1.0, 1.0, Some(300.0)),
            merged(1.0, 1.0, Some(200.0)),
            merged(1.0, 1.0, None),
        ];
        let cfg = MissingValues::default();
        let fill = competition_distance_fill(&rows, cfg.competition_distance);
        assert_eq!(fill, 200.0);

        handle_missing_values(&mut rows, &cfg, fill);
        assert_eq!(rows[3].competition_distance, Some(200.0));
        assert_eq!(rows[3].competition_open_since_year, Some(0.0));
        assert_eq!(rows[3].promo2_since_week, Some(0.0));
        assert_eq!(rows[3].promo_interval.as_deref(), Some(""));
    }

    #[test]
    fn test_other_strategies() {
        let rows = vec![merged(1.0, 1.0, Some(10.0)), merged(1.0, 1.0, Some(30.0))];
        assert_eq!(competition_distance_fill(&rows, ImputeStrategy::Mean), 20.0);
        assert_eq!(competition_distance_fill(&rows, ImputeStrategy::Max), 30.0);
        assert_eq!(competition_distance_fill(&rows, ImputeStrategy::Zero), 0.0);
        assert_eq!(competition_distance_fill(&[], ImputeStrategy::Median), 0.0);
    }

    #[test]
    fn test_iqr_bounds_and_detection() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 100.0];
        let b = IqrBounds::fit(&values, 1.5).unwrap();
        // Q1 = 3, Q3 = 7, IQR = 4
        assert_eq!(b.lower, -3.0);
        assert_eq!(b.upper, 13.0);

        let mask = detect_outliers(&values, 1.5, "Sales");
        assert_eq!(mask.iter().filter(|o| **o).count(), 1);
        assert!(mask[8]);
        assert_eq!(b.clip(100.0), 13.0);
    }

    #[test]
    fn test_clip_outliers_uses_fitted_bounds() {
        let mut rows: Vec<MergedRecord> = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 100.0]
            .iter()
            .map(|s| merged(*s, 1.0, Some(1.0)))
            .collect();
        let bounds = fit_outlier_bounds(&rows, &[OutlierColumn::Sales], 1.5);
        clip_outliers(&mut rows, &bounds);
        assert_eq!(rows[8].sale.sales, Some(13.0));
        assert_eq!(rows[0].sale.sales, Some(1.0));
    }

    #[test]
    fn test_label_encoder_sorted_with_unknown() {
        let enc = LabelEncoder::fit(["c", "a", "0", "b", "a"]);
        assert_eq!(enc.classes(), &["0", "a", "b", "c"]);
        assert_eq!(enc.encode("0"), 0.0);
        assert_eq!(enc.encode("c"), 3.0);
        assert_eq!(enc.encode("z"), -1.0);
    }

    #[test]
    fn test_column_scale() {
        let s = ColumnScale::fit(&[1.0, 2.0, 3.0], ScalingMethod::MinMax);
        assert_eq!(s.transform(3.0), 1.0);
        assert_eq!(s.inverse(0.5), 2.0);

        let s = ColumnScale::fit(&[5.0, 5.0], ScalingMethod::Standard);
        assert_eq!(s.scale, 1.0);
        assert_eq!(s.transform(5.0), 0.0);
    }

    #[test]
    fn test_feature_scaler_on_matrix() {
        let mut m = FeatureMatrix {
            columns:  vec![Feature::Promo, Feature::CompetitionDistance],
            data:     array![[0.0, 100.0], [1.0, 300.0]],
            target:   None,
            observed: None,
            keys:     Vec::new(),
        };
        let scaler =
            FeatureScaler::fit(&m, &[Feature::CompetitionDistance], ScalingMethod::Standard).unwrap();
        scaler.transform(&mut m).unwrap();
        assert_eq!(m.data[[0, 1]], -1.0);
        assert_eq!(m.data[[1, 1]], 1.0);
        // untouched column
        assert_eq!(m.data[[1, 0]], 1.0);

        let (_, scale) = scaler.columns[0];
        assert_eq!(scale.inverse(m.data[[1, 1]]), 300.0);

        assert!(FeatureScaler::fit(&m, &[Feature::Year], ScalingMethod::Standard).is_err());
    }
}
