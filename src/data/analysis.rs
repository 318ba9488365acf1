// ============================================================
// Layer 4 — Exploratory Analysis
// ============================================================
// Group statistics over the merged training rows, one section
// per toggle in the `analysis` block of the config:
//
//   promotions           Promo share / count, train vs test
//   holidays             Sales by StateHoliday, day before / after
//   seasonality          by month and weekday, December vs rest
//   store_patterns       always-open stores, by type / assortment
//   competition          by distance quintile, new vs established
//   promo_effectiveness  Sales, Customers, Sales per customer by Promo
//
// Sections that are switched off are omitted from the JSON.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::AnalysisToggles;
use crate::data::{
    features::{bin_index, quantile_edges},
    stats::{self, Summary},
};
use crate::domain::record::{MergedRecord, SalesRecord};

const DISTANCE_LABELS: [&str; 5] = ["Very Close", "Close", "Medium", "Far", "Very Far"];

/// Competitors younger than this many months count as new.
const NEW_COMPETITION_MONTHS: f64 = 3.0;

fn summarize_groups<K: Ord>(pairs: impl IntoIterator<Item = (K, f64)>) -> BTreeMap<K, Summary> {
    let mut groups: BTreeMap<K, Vec<f64>> = BTreeMap::new();
    for (k, v) in pairs {
        groups.entry(k).or_default().push(v);
    }
    groups.into_iter().map(|(k, v)| (k, Summary::of(&v))).collect()
}

// ─── Report sections ──────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionStats {
    pub train_promo_dist:  BTreeMap<u8, f64>,
    pub test_promo_dist:   BTreeMap<u8, f64>,
    pub train_promo_count: BTreeMap<u8, usize>,
    pub test_promo_count:  BTreeMap<u8, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolidayStats {
    pub holiday_stats:      BTreeMap<String, Summary>,
    pub before_holiday_avg: f64,
    pub after_holiday_avg:  f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalStats {
    pub monthly_stats:      BTreeMap<u32, Summary>,
    /// Keyed by the raw DayOfWeek code, 1 = Monday
    pub weekly_stats:       BTreeMap<u8, Summary>,
    pub holiday_season_avg: f64,
    pub regular_season_avg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorePatternStats {
    pub always_open_stores: Vec<u32>,
    pub store_type_stats:   BTreeMap<String, Summary>,
    pub assortment_stats:   BTreeMap<String, Summary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitionStats {
    pub distance_stats:              BTreeMap<String, Summary>,
    pub new_competition_avg:         f64,
    pub established_competition_avg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoEffectStats {
    pub promo_stats:              BTreeMap<u8, Summary>,
    /// StoreType → Promo → mean Sales
    pub promo_store_stats:        BTreeMap<String, BTreeMap<u8, f64>>,
    pub customer_promo_stats:     BTreeMap<u8, Summary>,
    pub sales_per_customer_stats: BTreeMap<u8, Summary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotions:          Option<PromotionStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holidays:            Option<HolidayStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seasonality:         Option<SeasonalStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_patterns:      Option<StorePatternStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub competition:         Option<CompetitionStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_effectiveness: Option<PromoEffectStats>,
}

// ─── Analyzer ─────────────────────────────────────────────────────────────────
/// Read-only view over the merged training rows and the test rows.
pub struct RossmannAnalyzer<'a> {
    train: &'a [MergedRecord],
    test:  &'a [SalesRecord],
}

impl<'a> RossmannAnalyzer<'a> {
    pub fn new(train: &'a [MergedRecord], test: &'a [SalesRecord]) -> Self {
        Self { train, test }
    }

    /// Every analysis switched on in `toggles`.
    pub fn run(&self, toggles: &AnalysisToggles) -> AnalysisReport {
        AnalysisReport {
            promotions:          toggles.promotions.then(|| self.analyze_promotions()),
            holidays:            toggles.holidays.then(|| self.analyze_holiday_sales()),
            seasonality:         toggles.seasonality.then(|| self.analyze_seasonal_patterns()),
            store_patterns:      toggles.store_patterns.then(|| self.analyze_store_patterns()),
            competition:         toggles.competition.then(|| self.analyze_competition_impact()),
            promo_effectiveness: toggles.promo_effectiveness.then(|| self.analyze_promo_effectiveness()),
        }
    }

    fn sales(&self) -> impl Iterator<Item = (&'a MergedRecord, f64)> {
        self.train.iter().filter_map(|r| r.sale.sales.map(|s| (r, s)))
    }

    pub fn analyze_promotions(&self) -> PromotionStats {
        fn counts<'r>(rows: impl Iterator<Item = &'r SalesRecord>) -> BTreeMap<u8, usize> {
            let mut out = BTreeMap::new();
            for r in rows {
                *out.entry(r.promo).or_insert(0) += 1;
            }
            out
        }
        fn shares(counts: &BTreeMap<u8, usize>) -> BTreeMap<u8, f64> {
            let total: usize = counts.values().sum();
            counts.iter().map(|(k, c)| (*k, *c as f64 / total as f64)).collect()
        }

        let train_promo_count = counts(self.train.iter().map(|r| &r.sale));
        let test_promo_count  = counts(self.test.iter());
        tracing::info!("Completed promotion analysis");
        PromotionStats {
            train_promo_dist: shares(&train_promo_count),
            test_promo_dist:  shares(&test_promo_count),
            train_promo_count,
            test_promo_count,
        }
    }

    /// Day-before / day-after averages look at each store's rows in
    /// date order. The first and last row of a store have no
    /// neighbour and are never counted.
    pub fn analyze_holiday_sales(&self) -> HolidayStats {
        let holiday_stats =
            summarize_groups(self.sales().map(|(r, s)| (r.sale.state_holiday.clone(), s)));

        let mut by_store: BTreeMap<u32, Vec<&MergedRecord>> = BTreeMap::new();
        for r in self.train {
            by_store.entry(r.sale.store).or_default().push(r);
        }

        let mut before = Vec::new();
        let mut after  = Vec::new();
        for rows in by_store.values_mut() {
            rows.sort_by_key(|r| r.sale.date);
            for pair in rows.windows(2) {
                let (prev, next) = (pair[0], pair[1]);
                if next.sale.is_state_holiday() {
                    before.extend(prev.sale.sales);
                }
                if prev.sale.is_state_holiday() {
                    after.extend(next.sale.sales);
                }
            }
        }

        tracing::info!("Completed holiday sales analysis");
        HolidayStats {
            holiday_stats,
            before_holiday_avg: stats::mean(&before),
            after_holiday_avg:  stats::mean(&after),
        }
    }

    pub fn analyze_seasonal_patterns(&self) -> SeasonalStats {
        let monthly_stats = summarize_groups(self.sales().map(|(r, s)| (r.sale.date.month(), s)));
        let weekly_stats  = summarize_groups(self.sales().map(|(r, s)| (r.sale.day_of_week, s)));

        let (december, rest): (Vec<_>, Vec<_>) =
            self.sales().partition(|(r, _)| r.sale.date.month() == 12);
        let december: Vec<f64> = december.into_iter().map(|(_, s)| s).collect();
        let rest: Vec<f64>     = rest.into_iter().map(|(_, s)| s).collect();

        tracing::info!("Completed seasonal pattern analysis");
        SeasonalStats {
            monthly_stats,
            weekly_stats,
            holiday_season_avg: stats::mean(&december),
            regular_season_avg: stats::mean(&rest),
        }
    }

    pub fn analyze_store_patterns(&self) -> StorePatternStats {
        let mut open_everywhere: BTreeMap<u32, bool> = BTreeMap::new();
        for r in self.train {
            let open = r.sale.open.map_or(false, |o| o == 1.0);
            *open_everywhere.entry(r.sale.store).or_insert(true) &= open;
        }
        let always_open_stores = open_everywhere
            .into_iter()
            .filter_map(|(store, open)| open.then_some(store))
            .collect();

        let store_type_stats = summarize_groups(
            self.sales()
                .filter_map(|(r, s)| r.store_type.clone().map(|t| (t, s))),
        );
        let assortment_stats = summarize_groups(
            self.sales()
                .filter_map(|(r, s)| r.assortment.clone().map(|a| (a, s))),
        );

        tracing::info!("Completed store pattern analysis");
        StorePatternStats { always_open_stores, store_type_stats, assortment_stats }
    }

    /// Rows without a CompetitionDistance are left out of the quintiles,
    /// rows without an opening date out of the new / established split.
    pub fn analyze_competition_impact(&self) -> CompetitionStats {
        let with_distance: Vec<(f64, f64)> = self
            .sales()
            .filter_map(|(r, s)| r.competition_distance.map(|d| (d, s)))
            .collect();
        let distances: Vec<f64> = with_distance.iter().map(|(d, _)| *d).collect();
        let edges = quantile_edges(&distances, DISTANCE_LABELS.len());
        let distance_stats = summarize_groups(
            with_distance
                .iter()
                .map(|(d, s)| (bin_index(*d, &edges) as usize, *s)),
        )
        .into_iter()
        .map(|(bin, summary)| (DISTANCE_LABELS[bin].to_string(), summary))
        .collect();

        let mut new_comp = Vec::new();
        let mut established = Vec::new();
        for (r, s) in self.sales() {
            let (Some(year), Some(month)) =
                (r.competition_open_since_year, r.competition_open_since_month)
            else {
                continue;
            };
            let age = 12.0 * (r.sale.date.year() as f64 - year) + (r.sale.date.month() as f64 - month);
            if age <= NEW_COMPETITION_MONTHS {
                new_comp.push(s);
            } else {
                established.push(s);
            }
        }

        tracing::info!("Completed competition impact analysis");
        CompetitionStats {
            distance_stats,
            new_competition_avg:         stats::mean(&new_comp),
            established_competition_avg: stats::mean(&established),
        }
    }

    pub fn analyze_promo_effectiveness(&self) -> PromoEffectStats {
        let promo_stats = summarize_groups(self.sales().map(|(r, s)| (r.sale.promo, s)));

        let promo_store_stats: BTreeMap<String, BTreeMap<u8, f64>> = summarize_groups(
            self.sales()
                .filter_map(|(r, s)| r.store_type.clone().map(|t| ((t, r.sale.promo), s))),
        )
        .into_iter()
        .fold(BTreeMap::new(), |mut acc, ((store_type, promo), summary)| {
            acc.entry(store_type).or_default().insert(promo, summary.mean);
            acc
        });

        let customer_promo_stats = summarize_groups(
            self.train
                .iter()
                .filter_map(|r| r.sale.customers.map(|c| (r.sale.promo, c))),
        );

        let sales_per_customer_stats = summarize_groups(self.sales().filter_map(|(r, s)| {
            r.sale
                .customers
                .filter(|c| *c > 0.0)
                .map(|c| (r.sale.promo, s / c))
        }));

        tracing::info!("Completed promotion effectiveness analysis");
        PromoEffectStats {
            promo_stats,
            promo_store_stats,
            customer_promo_stats,
            sales_per_customer_stats,
        }
    }
}
