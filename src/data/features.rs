// ============================================================
// Layer 4 — Feature Engineering
// ============================================================
// Turns merged rows into a numeric FeatureMatrix.
//
// Derived columns, in the order they are computed:
//
//   datetime     Year, Month, Day, WeekOfYear (ISO), DayOfWeek
//                (Mon = 0), IsWeekend, IsMonthStart (day ≤ 5),
//                IsMonthEnd (day ≥ 26), IsMidMonth, Quarter,
//                Season (0 winter … 3 autumn)
//   holidays     IsHoliday, DaysToHoliday, DaysAfterHoliday,
//                per store, strictly before / after the date
//   competition  CompetitionOpen (months), CompetitionDuration
//                (0 not open, 1 ≤ 12m, 2 ≤ 24m, 3 older),
//                CompetitionDistanceCategory (train quartiles)
//   promotion    Promo2Open, IsPromoMonth (month ∈ PromoInterval)
//
// FittedPreprocessor::fit learns everything that depends on the
// training rows (fill values, IQR bounds, quartile edges, label
// encoders, scaler, holiday calendar). FittedPreprocessor::
// transform replays it on test rows or API requests.

use anyhow::{bail, Result};
use chrono::{Datelike, NaiveDate};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::config::{ForecastConfig, MissingValues, OutlierMethod};
use crate::data::{
    preprocessor::{
        clip_outliers, competition_distance_fill, drop_closed_days, fit_outlier_bounds,
        handle_missing_values, FeatureScaler, IqrBounds, LabelEncoder,
    },
    stats, DataError,
};
use crate::domain::{
    feature::{Feature, OutlierColumn},
    record::{is_holiday_code, MergedRecord},
};

// ─── Calendar features ────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateFeatures {
    pub year:           i32,
    pub month:          u32,
    pub day:            u32,
    pub week_of_year:   u32,
    /// Monday = 0 … Sunday = 6
    pub day_of_week:    u32,
    pub is_weekend:     bool,
    pub is_month_start: bool,
    pub is_month_end:   bool,
    pub is_mid_month:   bool,
    pub quarter:        u32,
    pub season:         u32,
}

impl DateFeatures {
    pub fn from_date(date: NaiveDate) -> Self {
        let day         = date.day();
        let day_of_week = date.weekday().num_days_from_monday();
        Self {
            year:           date.year(),
            month:          date.month(),
            day,
            week_of_year:   date.iso_week().week(),
            day_of_week,
            is_weekend:     day_of_week >= 5,
            is_month_start: day <= 5,
            is_month_end:   day >= 26,
            is_mid_month:   day > 5 && day < 26,
            quarter:        (date.month() - 1) / 3 + 1,
            season:         season_of(date.month()),
        }
    }
}

/// Dec–Feb 0, Mar–May 1, Jun–Aug 2, Sep–Nov 3.
pub fn season_of(month: u32) -> u32 {
    match month {
        12 | 1 | 2 => 0,
        3..=5      => 1,
        6..=8      => 2,
        _          => 3,
    }
}

// ─── Holiday calendar ─────────────────────────────────────────────────────────
/// Sorted state-holiday dates per store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HolidayCalendar {
    by_store: BTreeMap<u32, Vec<NaiveDate>>,
}

impl HolidayCalendar {
    pub fn from_records(records: &[MergedRecord]) -> Self {
        let mut cal = Self::default();
        cal.extend(records);
        cal
    }

    /// A copy of this calendar extended with the holidays in `records`.
    pub fn merged_with(&self, records: &[MergedRecord]) -> Self {
        let mut cal = self.clone();
        cal.extend(records);
        cal
    }

    fn extend(&mut self, records: &[MergedRecord]) {
        for r in records.iter().filter(|r| r.sale.is_state_holiday()) {
            self.by_store.entry(r.sale.store).or_default().push(r.sale.date);
        }
        for dates in self.by_store.values_mut() {
            dates.sort();
            dates.dedup();
        }
    }

    /// (days until the next holiday after `date`, days since the last
    /// holiday before `date`). Either is 0 when no such holiday exists.
    pub fn distances(&self, store: u32, date: NaiveDate) -> (i64, i64) {
        let Some(dates) = self.by_store.get(&store) else {
            return (0, 0);
        };
        let after_idx  = dates.partition_point(|d| *d <= date);
        let before_idx = dates.partition_point(|d| *d < date);

        let to_next = dates
            .get(after_idx)
            .map_or(0, |next| (*next - date).num_days());
        let since_last = before_idx
            .checked_sub(1)
            .map_or(0, |i| (date - dates[i]).num_days());
        (to_next, since_last)
    }

    pub fn store_count(&self) -> usize {
        self.by_store.len()
    }
}

// ─── Competition and promotion helpers ───────────────────────────────────────
/// Months since the competitor opened; negative if it opens later.
pub fn competition_open_months(year: i32, month: u32, since_year: f64, since_month: f64) -> f64 {
    12.0 * (year as f64 - since_year) + (month as f64 - since_month)
}

/// (−∞, 0] → 0, (0, 12] → 1, (12, 24] → 2, (24, ∞) → 3.
pub fn competition_duration_bin(months: f64) -> u8 {
    if months <= 0.0 {
        0
    } else if months <= 12.0 {
        1
    } else if months <= 24.0 {
        2
    } else {
        3
    }
}

/// Interior edges splitting `values` into `bins` equal-frequency bins.
pub fn quantile_edges(values: &[f64], bins: usize) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    (1..bins)
        .map(|i| stats::quantile_sorted(&sorted, i as f64 / bins as f64))
        .collect()
}

/// Bin index of `value`: bins are closed on the right, so a value
/// equal to an edge falls in the lower bin.
pub fn bin_index(value: f64, edges: &[f64]) -> u8 {
    edges.iter().filter(|e| value > **e).count() as u8
}

pub fn promo2_open_months(year: i32, week: u32, since_year: f64, since_week: f64) -> f64 {
    12.0 * (year as f64 - since_year) + (week as f64 - since_week) / 4.0
}

pub fn month_number(name: &str) -> Option<u32> {
    let n = match name.trim() {
        "Jan" | "January"           => 1,
        "Feb" | "February"          => 2,
        "Mar" | "March"             => 3,
        "Apr" | "April"             => 4,
        "May"                       => 5,
        "Jun" | "June"              => 6,
        "Jul" | "July"              => 7,
        "Aug" | "August"            => 8,
        "Sep" | "Sept" | "September" => 9,
        "Oct" | "October"           => 10,
        "Nov" | "November"          => 11,
        "Dec" | "December"          => 12,
        _ => return None,
    };
    Some(n)
}

/// Months listed in a PromoInterval such as "Feb,May,Aug,Nov".
/// Returns the first unrecognised name as the error.
pub fn parse_promo_interval(interval: &str) -> Result<Vec<u32>, String> {
    interval
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(|m| month_number(m).ok_or_else(|| m.to_string()))
        .collect()
}

// ─── Engineered rows ──────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct EngineeredRecord {
    pub id:             Option<u32>,
    pub store:          u32,
    pub date:           NaiveDate,
    pub open:           bool,
    pub sales:          Option<f64>,
    pub customers:      Option<f64>,
    pub promo:          u8,
    pub school_holiday: u8,
    pub state_holiday:  String,
    pub store_type:     String,
    pub assortment:     String,
    pub promo2:         u8,

    pub competition_distance:          f64,
    pub dates:                         DateFeatures,
    pub is_holiday:                    bool,
    pub days_to_holiday:               i64,
    pub days_after_holiday:            i64,
    pub competition_open:              f64,
    pub competition_duration:          u8,
    pub competition_distance_category: u8,
    pub promo2_open:                   f64,
    pub is_promo_month:                bool,
}

/// A column value before encoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureValue<'a> {
    Numeric(f64),
    Categorical(&'a str),
}

fn flag(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

impl EngineeredRecord {
    pub fn value(&self, feature: Feature) -> FeatureValue<'_> {
        use FeatureValue::{Categorical, Numeric};
        let d = &self.dates;
        match feature {
            Feature::Year                        => Numeric(d.year as f64),
            Feature::Month                       => Numeric(d.month as f64),
            Feature::Day                         => Numeric(d.day as f64),
            Feature::WeekOfYear                  => Numeric(d.week_of_year as f64),
            Feature::DayOfWeek                   => Numeric(d.day_of_week as f64),
            Feature::IsWeekend                   => Numeric(flag(d.is_weekend)),
            Feature::IsMonthStart                => Numeric(flag(d.is_month_start)),
            Feature::IsMonthEnd                  => Numeric(flag(d.is_month_end)),
            Feature::IsMidMonth                  => Numeric(flag(d.is_mid_month)),
            Feature::Quarter                     => Numeric(d.quarter as f64),
            Feature::Season                      => Numeric(d.season as f64),
            Feature::IsHoliday                   => Numeric(flag(self.is_holiday)),
            Feature::StateHoliday                => Categorical(&self.state_holiday),
            Feature::SchoolHoliday               => Numeric(self.school_holiday as f64),
            Feature::DaysToHoliday               => Numeric(self.days_to_holiday as f64),
            Feature::DaysAfterHoliday            => Numeric(self.days_after_holiday as f64),
            Feature::Store                       => Numeric(self.store as f64),
            Feature::StoreType                   => Categorical(&self.store_type),
            Feature::Assortment                  => Categorical(&self.assortment),
            Feature::CompetitionDistance         => Numeric(self.competition_distance),
            Feature::CompetitionOpen             => Numeric(self.competition_open),
            Feature::CompetitionDuration         => Numeric(self.competition_duration as f64),
            Feature::CompetitionDistanceCategory => Numeric(self.competition_distance_category as f64),
            Feature::Promo                       => Numeric(self.promo as f64),
            Feature::Promo2                      => Numeric(self.promo2 as f64),
            Feature::Promo2Open                  => Numeric(self.promo2_open),
            Feature::IsPromoMonth                => Numeric(flag(self.is_promo_month)),
        }
    }
}

/// Derive every engineered column for already-imputed rows.
pub fn engineer(
    records:        Vec<MergedRecord>,
    calendar:       &HolidayCalendar,
    distance_edges: &[f64],
) -> Vec<EngineeredRecord> {
    let mut interval_cache: HashMap<String, Vec<u32>> = HashMap::new();

    let out: Vec<EngineeredRecord> = records
        .into_iter()
        .map(|r| {
            let dates = DateFeatures::from_date(r.sale.date);
            let (days_to_holiday, days_after_holiday) = calendar.distances(r.sale.store, r.sale.date);

            let distance = r.competition_distance.unwrap_or(f64::NAN);
            let competition_open = competition_open_months(
                dates.year,
                dates.month,
                r.competition_open_since_year.unwrap_or(0.0),
                r.competition_open_since_month.unwrap_or(0.0),
            );
            let promo2_open = promo2_open_months(
                dates.year,
                dates.week_of_year,
                r.promo2_since_year.unwrap_or(0.0),
                r.promo2_since_week.unwrap_or(0.0),
            );

            let interval = r.promo_interval.clone().unwrap_or_default();
            let promo_months = interval_cache
                .entry(interval)
                .or_insert_with_key(|raw| match parse_promo_interval(raw) {
                    Ok(months) => months,
                    Err(unknown) => {
                        tracing::warn!("Unknown month format found in PromoInterval: {unknown}");
                        Vec::new()
                    }
                });
            let is_promo_month = promo_months.contains(&dates.month);

            EngineeredRecord {
                id:             r.sale.id,
                store:          r.sale.store,
                date:           r.sale.date,
                open:           r.sale.is_open(),
                sales:          r.sale.sales,
                customers:      r.sale.customers,
                promo:          r.sale.promo,
                school_holiday: r.sale.school_holiday,
                is_holiday:     is_holiday_code(&r.sale.state_holiday),
                state_holiday:  r.sale.state_holiday,
                store_type:     r.store_type.unwrap_or_default(),
                assortment:     r.assortment.unwrap_or_default(),
                promo2:         r.promo2.unwrap_or(0),

                competition_distance:          distance,
                dates,
                days_to_holiday,
                days_after_holiday,
                competition_open,
                competition_duration:          competition_duration_bin(competition_open),
                competition_distance_category: bin_index(distance, distance_edges),
                promo2_open,
                is_promo_month,
            }
        })
        .collect();

    tracing::info!(
        "Successfully created datetime, holiday, competition and promotion features for {} rows",
        out.len()
    );
    out
}

// ─── Feature matrix ───────────────────────────────────────────────────────────
/// Identifies the source row of each matrix row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowKey {
    pub id:    Option<u32>,
    pub store: u32,
    pub date:  NaiveDate,
    pub open:  bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub columns: Vec<Feature>,
    /// [n_rows, n_columns]
    pub data:    Array2<f64>,
    /// Sales per row, present when every row carries one
    pub target:   Option<Array1<f64>>,
    /// Sales as loaded, before outlier clipping; models are scored on these
    pub observed: Option<Array1<f64>>,
    pub keys:     Vec<RowKey>,
}

impl FeatureMatrix {
    pub fn column_index(&self, feature: Feature) -> Option<usize> {
        self.columns.iter().position(|c| *c == feature)
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    /// Unclipped sales when known, else the training target.
    pub fn actuals(&self) -> Option<&Array1<f64>> {
        self.observed.as_ref().or(self.target.as_ref())
    }
}

/// Encode and stack the selected columns of engineered rows.
pub fn build_matrix(
    records:  &[EngineeredRecord],
    features: &[Feature],
    encoders: &BTreeMap<Feature, LabelEncoder>,
) -> Result<FeatureMatrix> {
    let mut data = Array2::<f64>::zeros((records.len(), features.len()));
    for (i, rec) in records.iter().enumerate() {
        for (j, &f) in features.iter().enumerate() {
            data[[i, j]] = match rec.value(f) {
                FeatureValue::Numeric(v) => v,
                FeatureValue::Categorical(code) => match encoders.get(&f) {
                    Some(enc) => enc.encode(code),
                    None => bail!("categorical feature '{f}' has no fitted encoder"),
                },
            };
        }
    }

    let target = records
        .iter()
        .map(|r| r.sales)
        .collect::<Option<Vec<f64>>>()
        .map(Array1::from);

    let keys = records
        .iter()
        .map(|r| RowKey { id: r.id, store: r.store, date: r.date, open: r.open })
        .collect();

    Ok(FeatureMatrix { columns: features.to_vec(), data, target, observed: None, keys })
}

// ─── Fitted preprocessing state ───────────────────────────────────────────────
/// Everything learned from the training rows that later rows must reuse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPreprocessor {
    pub features:       Vec<Feature>,
    pub missing_values: MissingValues,
    pub distance_fill:  f64,
    pub outlier_bounds: BTreeMap<OutlierColumn, IqrBounds>,
    pub distance_edges: Vec<f64>,
    pub encoders:       BTreeMap<Feature, LabelEncoder>,
    pub scaler:         FeatureScaler,
    pub calendar:       HolidayCalendar,
}

impl FittedPreprocessor {
    /// Learn the preprocessing state from training rows and return
    /// it with the transformed training matrix (target included).
    pub fn fit(cfg: &ForecastConfig, train: Vec<MergedRecord>) -> Result<(Self, FeatureMatrix)> {
        let prep = &cfg.data_preprocessing;

        // ── Step 1: Holiday calendar ──────────────────────────────────────────
        // Built before closed days are dropped: stores are usually
        // closed on the holidays themselves.
        let calendar = HolidayCalendar::from_records(&train);
        tracing::debug!("Holiday calendar covers {} stores", calendar.store_count());

        // ── Step 2: Closed days ───────────────────────────────────────────────
        let mut records = if prep.drop_closed_days { drop_closed_days(train) } else { train };
        if records.is_empty() {
            return Err(DataError::NoTrainingRows.into());
        }
        if let Some(r) = records.iter().find(|r| r.sale.sales.is_none()) {
            return Err(DataError::MissingTarget { store: r.sale.store, date: r.sale.date }.into());
        }

        // ── Step 3: Missing values ────────────────────────────────────────────
        let distance_fill =
            competition_distance_fill(&records, prep.missing_values.competition_distance);
        handle_missing_values(&mut records, &prep.missing_values, distance_fill);

        // ── Step 4: Outliers ──────────────────────────────────────────────────
        let outlier_bounds = match prep.outliers.method {
            OutlierMethod::Iqr => {
                fit_outlier_bounds(&records, &prep.outliers.columns, prep.outliers.threshold)
            }
            OutlierMethod::None => BTreeMap::new(),
        };
        let observed = observed_sales(&records);
        clip_outliers(&mut records, &outlier_bounds);

        // ── Step 5: Engineered columns ────────────────────────────────────────
        let distances: Vec<f64> = records.iter().filter_map(|r| r.competition_distance).collect();
        let distance_edges = quantile_edges(&distances, 4);
        let engineered = engineer(records, &calendar, &distance_edges);

        // ── Step 6: Label encoders ────────────────────────────────────────────
        let encoders: BTreeMap<Feature, LabelEncoder> = prep
            .encoding
            .features
            .iter()
            .map(|&f| {
                let enc = LabelEncoder::fit(engineered.iter().filter_map(|r| match r.value(f) {
                    FeatureValue::Categorical(code) => Some(code),
                    FeatureValue::Numeric(_) => None,
                }));
                tracing::debug!("{f} classes: {:?}", enc.classes());
                (f, enc)
            })
            .collect();
        tracing::info!("Successfully encoded categorical features");

        // ── Step 7: Matrix and scaler ─────────────────────────────────────────
        let features = cfg.features.selected();
        let mut matrix = build_matrix(&engineered, &features, &encoders)?;
        matrix.observed = observed;
        let scaled: Vec<Feature> = prep
            .scaling
            .features
            .iter()
            .copied()
            .filter(|f| features.contains(f))
            .collect();
        let scaler = FeatureScaler::fit(&matrix, &scaled, prep.scaling.method)?;
        scaler.transform(&mut matrix)?;

        tracing::info!(
            "Successfully completed preprocessing pipeline: {} rows x {} features",
            matrix.nrows(),
            features.len()
        );

        let fitted = Self {
            features,
            missing_values: prep.missing_values.clone(),
            distance_fill,
            outlier_bounds,
            distance_edges,
            encoders,
            scaler,
            calendar,
        };
        Ok((fitted, matrix))
    }

    /// Apply the fitted state to new rows (test set or API requests).
    /// No rows are dropped, so matrix rows line up with `records`.
    pub fn transform(&self, mut records: Vec<MergedRecord>) -> Result<FeatureMatrix> {
        let calendar = self.calendar.merged_with(&records);
        handle_missing_values(&mut records, &self.missing_values, self.distance_fill);
        let observed = observed_sales(&records);
        clip_outliers(&mut records, &self.outlier_bounds);

        let engineered = engineer(records, &calendar, &self.distance_edges);
        let mut matrix = build_matrix(&engineered, &self.features, &self.encoders)?;
        matrix.observed = observed;
        self.scaler.transform(&mut matrix)?;
        Ok(matrix)
    }
}

fn observed_sales(records: &[MergedRecord]) -> Option<Array1<f64>> {
    records
        .iter()
        .map(|r| r.sale.sales)
        .collect::<Option<Vec<f64>>>()
        .map(Array1::from)
}

/// Fit on train and transform test in one call.
pub fn preprocess_data(
    cfg:   &ForecastConfig,
    train: Vec<MergedRecord>,
    test:  Option<Vec<MergedRecord>>,
) -> Result<(FittedPreprocessor, FeatureMatrix, Option<FeatureMatrix>)> {
    let (fitted, train_matrix) = FittedPreprocessor::fit(cfg, train)?;
    let test_matrix = test.map(|rows| fitted.transform(rows)).transpose()?;
    Ok((fitted, train_matrix, test_matrix))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{SalesRecord, StoreRecord};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sale(store: u32, d: NaiveDate, sales: f64, holiday: &str) -> SalesRecord {
        SalesRecord {
            id:             None,
            store,
            day_of_week:    d.weekday().number_from_monday() as u8,
            date:           d,
            sales:          Some(sales),
            customers:      Some(sales / 10.0),
            open:           Some(if sales > 0.0 { 1.0 } else { 0.0 }),
            promo:          1,
            state_holiday:  holiday.to_string(),
            school_holiday: 0,
        }
    }

    fn store_row(store: u32, store_type: &str, distance: Option<f64>) -> StoreRecord {
        StoreRecord {
            store,
            store_type:                   store_type.to_string(),
            assortment:                   "a".to_string(),
            competition_distance:         distance,
            competition_open_since_month: Some(9.0),
            competition_open_since_year:  Some(2014.0),
            promo2:                       1,
            promo2_since_week:            Some(10.0),
            promo2_since_year:            Some(2014.0),
            promo_interval:               Some("Jan,Apr,Jul,Oct".to_string()),
        }
    }

    #[test]
    fn test_datetime_features() {
        // Saturday 2015-01-03, ISO week 1
        let f = DateFeatures::from_date(date(2015, 1, 3));
        assert_eq!(f.year, 2015);
        assert_eq!(f.week_of_year, 1);
        assert_eq!(f.day_of_week, 5);
        assert!(f.is_weekend);
        assert!(f.is_month_start);
        assert!(!f.is_mid_month);
        assert_eq!(f.quarter, 1);
        assert_eq!(f.season, 0);

        let f = DateFeatures::from_date(date(2015, 7, 27));
        assert_eq!(f.day_of_week, 0);
        assert!(f.is_month_end);
        assert_eq!(f.quarter, 3);
        assert_eq!(f.season, 2);

        // 2014-12-29 belongs to ISO week 1 of 2015
        assert_eq!(DateFeatures::from_date(date(2014, 12, 29)).week_of_year, 1);
    }

    #[test]
    fn test_seasons() {
        assert_eq!(season_of(2), 0);
        assert_eq!(season_of(3), 1);
        assert_eq!(season_of(8), 2);
        assert_eq!(season_of(11), 3);
        assert_eq!(season_of(12), 0);
    }

    #[test]
    fn test_holiday_distances_are_strict_and_per_store() {
        let rows: Vec<MergedRecord> = [
            (1, date(2015, 1, 1), "a"),
            (1, date(2015, 1, 10), "0"),
            (1, date(2015, 4, 3), "b"),
            (2, date(2015, 12, 25), "c"),
        ]
        .iter()
        .map(|(s, d, h)| MergedRecord::new(sale(*s, *d, 0.0, h), None))
        .collect();
        let cal = HolidayCalendar::from_records(&rows);

        assert_eq!(cal.distances(1, date(2015, 1, 10)), (83, 9));
        // on a holiday, the holiday itself does not count
        assert_eq!(cal.distances(1, date(2015, 1, 1)), (92, 0));
        assert_eq!(cal.distances(1, date(2015, 5, 1)), (0, 28));
        assert_eq!(cal.distances(2, date(2015, 12, 20)), (5, 0));
        assert_eq!(cal.distances(9, date(2015, 12, 20)), (0, 0));
    }

    #[test]
    fn test_competition_bins() {
        assert_eq!(competition_open_months(2015, 3, 2014.0, 9.0), 6.0);
        assert_eq!(competition_duration_bin(-3.0), 0);
        assert_eq!(competition_duration_bin(0.0), 0);
        assert_eq!(competition_duration_bin(12.0), 1);
        assert_eq!(competition_duration_bin(13.0), 2);
        assert_eq!(competition_duration_bin(25.0), 3);

        let edges = quantile_edges(&[1.0, 2.0, 3.0, 4.0, 5.0], 4);
        assert_eq!(edges, vec![2.0, 3.0, 4.0]);
        assert_eq!(bin_index(1.0, &edges), 0);
        assert_eq!(bin_index(2.0, &edges), 0);
        assert_eq!(bin_index(2.5, &edges), 1);
        assert_eq!(bin_index(5.0, &edges), 3);
    }

    #[test]
    fn test_promo_interval_parsing() {
        assert_eq!(parse_promo_interval("Jan,Apr,Jul,Oct"), Ok(vec![1, 4, 7, 10]));
        assert_eq!(parse_promo_interval("Mar,Jun,Sept,Dec"), Ok(vec![3, 6, 9, 12]));
        assert_eq!(parse_promo_interval(""), Ok(vec![]));
        assert_eq!(parse_promo_interval("Jan,Foo"), Err("Foo".to_string()));
        assert_eq!(promo2_open_months(2015, 14, 2014.0, 10.0), 13.0);
    }

    fn training_rows() -> Vec<MergedRecord> {
        let stores = vec![
            store_row(1, "c", Some(1270.0)),
            store_row(2, "a", Some(570.0)),
            store_row(3, "d", None),
        ];
        let mut sales = Vec::new();
        for day in 1..=20u32 {
            let d = date(2015, 4, day);
            let holiday = if day == 3 { "b" } else { "0" };
            for store in 1..=3u32 {
                let amount = if day == 3 { 0.0 } else { 1000.0 * store as f64 + day as f64 };
                sales.push(sale(store, d, amount, holiday));
            }
        }
        crate::data::loader::merge_store_data(sales, &stores)
    }

    #[test]
    fn test_fit_builds_matrix_with_target() {
        let cfg = ForecastConfig::default();
        let (fitted, matrix) = FittedPreprocessor::fit(&cfg, training_rows()).unwrap();

        // the holiday (closed) day is dropped: 19 days x 3 stores
        assert_eq!(matrix.nrows(), 57);
        assert_eq!(matrix.columns, cfg.features.selected());
        assert_eq!(matrix.target.as_ref().unwrap().len(), 57);

        // but still drives the holiday distances
        let after = matrix.column_index(Feature::DaysAfterHoliday).unwrap();
        let row = matrix.keys.iter().position(|k| k.store == 1 && k.date == date(2015, 4, 5)).unwrap();
        assert_eq!(matrix.data[[row, after]], 2.0);

        // store 3 has no distance: median of 570 and 1270
        assert_eq!(fitted.distance_fill, 920.0);

        // scaled columns are centred
        let cd = matrix.column_index(Feature::CompetitionDistance).unwrap();
        let mean = matrix.data.column(cd).mean().unwrap();
        assert!(mean.abs() < 1e-9);

        // encoders learned sorted classes
        let st = &fitted.encoders[&Feature::StoreType];
        assert_eq!(st.classes(), &["a", "c", "d"]);
    }

    #[test]
    fn test_transform_reuses_fitted_state() {
        let cfg = ForecastConfig::default();
        let (fitted, _) = FittedPreprocessor::fit(&cfg, training_rows()).unwrap();

        let mut unseen = sale(1, date(2015, 4, 21), 0.0, "0");
        unseen.sales = None;
        let stores = vec![store_row(1, "z", None)];
        let rows = crate::data::loader::merge_store_data(vec![unseen], &stores);

        let m = fitted.transform(rows).unwrap();
        assert_eq!(m.nrows(), 1);
        assert!(m.target.is_none());

        let st = m.column_index(Feature::StoreType).unwrap();
        assert_eq!(m.data[[0, st]], -1.0);

        let promo_month = m.column_index(Feature::IsPromoMonth).unwrap();
        assert_eq!(m.data[[0, promo_month]], 1.0);

        let after = m.column_index(Feature::DaysAfterHoliday).unwrap();
        assert_eq!(m.data[[0, after]], 18.0);
    }

    #[test]
    fn test_fit_rejects_all_closed() {
        let cfg = ForecastConfig::default();
        let rows = vec![MergedRecord::new(sale(1, date(2015, 1, 1), 0.0, "a"), None)];
        assert!(FittedPreprocessor::fit(&cfg, rows).is_err());
    }

    #[test]
    fn test_preprocess_data_aligns_test_columns() {
        let cfg = ForecastConfig::default();
        let mut upcoming = sale(2, date(2015, 4, 21), 0.0, "0");
        upcoming.sales = None;
        upcoming.id = Some(7);
        let test = crate::data::loader::merge_store_data(vec![upcoming], &[store_row(2, "a", Some(570.0))]);

        let (fitted, train_m, test_m) = preprocess_data(&cfg, training_rows(), Some(test)).unwrap();
        let test_m = test_m.unwrap();
        assert_eq!(test_m.columns, train_m.columns);
        assert_eq!(test_m.columns, fitted.features);
        assert_eq!(test_m.nrows(), 1);
        assert_eq!(test_m.keys[0].id, Some(7));
        assert!(test_m.target.is_none());
        assert!(test_m.actuals().is_none());

        let (_, _, none) = preprocess_data(&cfg, training_rows(), None).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_observed_sales_skip_outlier_clipping() {
        let cfg = ForecastConfig::default();
        let mut rows = training_rows();
        let spike = rows
            .iter()
            .position(|r| r.sale.store == 1 && r.sale.date == date(2015, 4, 10))
            .unwrap();
        rows[spike].sale.sales = Some(1_000_000.0);

        let (fitted, m) = FittedPreprocessor::fit(&cfg, rows).unwrap();
        let row = m.keys.iter().position(|k| k.store == 1 && k.date == date(2015, 4, 10)).unwrap();
        let upper = fitted.outlier_bounds[&OutlierColumn::Sales].upper;
        assert_eq!(m.target.as_ref().unwrap()[row], upper);
        assert_eq!(m.actuals().unwrap()[row], 1_000_000.0);
    }
}
