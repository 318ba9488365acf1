// ============================================================
// Layer 3 — Feature Columns
// ============================================================
// Every column a model can consume, as one closed enum.
//
// The YAML configuration names features in snake_case
// ("week_of_year", "competition_open", ...). Parsing those
// names into this enum means a config that references a
// column the pipeline cannot produce fails at load time.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    // ── Calendar ─────────────────────────────────────────────────────────────
    Year,
    Month,
    Day,
    WeekOfYear,
    #[serde(rename = "weekday", alias = "day_of_week")]
    DayOfWeek,
    IsWeekend,
    IsMonthStart,
    IsMonthEnd,
    IsMidMonth,
    Quarter,
    Season,

    // ── Holidays ─────────────────────────────────────────────────────────────
    IsHoliday,
    StateHoliday,
    SchoolHoliday,
    DaysToHoliday,
    DaysAfterHoliday,

    // ── Store, competition, promotion ────────────────────────────────────────
    Store,
    StoreType,
    Assortment,
    CompetitionDistance,
    CompetitionOpen,
    CompetitionDuration,
    CompetitionDistanceCategory,
    Promo,
    Promo2,
    Promo2Open,
    IsPromoMonth,
}

impl Feature {
    /// Column header used in reports and importance listings.
    pub fn column_name(&self) -> &'static str {
        match self {
            Feature::Year                        => "Year",
            Feature::Month                       => "Month",
            Feature::Day                         => "Day",
            Feature::WeekOfYear                  => "WeekOfYear",
            Feature::DayOfWeek                   => "DayOfWeek",
            Feature::IsWeekend                   => "IsWeekend",
            Feature::IsMonthStart                => "IsMonthStart",
            Feature::IsMonthEnd                  => "IsMonthEnd",
            Feature::IsMidMonth                  => "IsMidMonth",
            Feature::Quarter                     => "Quarter",
            Feature::Season                      => "Season",
            Feature::IsHoliday                   => "IsHoliday",
            Feature::StateHoliday                => "StateHoliday",
            Feature::SchoolHoliday               => "SchoolHoliday",
            Feature::DaysToHoliday               => "DaysToHoliday",
            Feature::DaysAfterHoliday            => "DaysAfterHoliday",
            Feature::Store                       => "Store",
            Feature::StoreType                   => "StoreType",
            Feature::Assortment                  => "Assortment",
            Feature::CompetitionDistance         => "CompetitionDistance",
            Feature::CompetitionOpen             => "CompetitionOpen",
            Feature::CompetitionDuration         => "CompetitionDuration",
            Feature::CompetitionDistanceCategory => "CompetitionDistanceCategory",
            Feature::Promo                       => "Promo",
            Feature::Promo2                      => "Promo2",
            Feature::Promo2Open                  => "Promo2Open",
            Feature::IsPromoMonth                => "IsPromoMonth",
        }
    }

    /// Categorical columns hold text codes and must be label-encoded
    /// before they can enter a feature matrix.
    pub fn is_categorical(&self) -> bool {
        matches!(
            self,
            Feature::StoreType | Feature::Assortment | Feature::StateHoliday
        )
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// Raw numeric columns the outlier rule may be applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierColumn {
    Sales,
    Customers,
    CompetitionDistance,
}

impl fmt::Display for OutlierColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutlierColumn::Sales               => "Sales",
            OutlierColumn::Customers           => "Customers",
            OutlierColumn::CompetitionDistance => "CompetitionDistance",
        };
        f.write_str(name)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_config_names() {
        let parsed: Vec<Feature> =
            serde_yaml::from_str("[week_of_year, weekday, day_of_week, promo2_open]").unwrap();
        assert_eq!(
            parsed,
            vec![
                Feature::WeekOfYear,
                Feature::DayOfWeek,
                Feature::DayOfWeek,
                Feature::Promo2Open
            ]
        );
    }

    #[test]
    fn test_unknown_feature_is_rejected() {
        let parsed: Result<Vec<Feature>, _> = serde_yaml::from_str("[moon_phase]");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_categorical_columns() {
        assert!(Feature::StoreType.is_categorical());
        assert!(Feature::StateHoliday.is_categorical());
        assert!(!Feature::CompetitionDistance.is_categorical());
        assert_eq!(Feature::DayOfWeek.to_string(), "DayOfWeek");
    }
}
