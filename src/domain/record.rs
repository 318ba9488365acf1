// ============================================================
// Layer 3 — Record Domain Types
// ============================================================
// One struct per CSV table plus the left-joined row used by
// every later stage.
//
// Field names follow the Kaggle Rossmann headers through
// serde renames, so the csv crate can deserialise rows
// directly. Columns that may be blank are Option<T>: the csv
// crate maps an empty field to None.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One row of `train.csv` or `test.csv`.
///
/// The train table carries `Sales` and `Customers`, the test
/// table carries `Id` instead. Both share the remaining columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
    #[serde(rename = "Id", default)]
    pub id: Option<u32>,

    #[serde(rename = "Store")]
    pub store: u32,

    /// 1 = Monday … 7 = Sunday, as published in the raw data
    #[serde(rename = "DayOfWeek")]
    pub day_of_week: u8,

    #[serde(rename = "Date")]
    pub date: NaiveDate,

    #[serde(rename = "Sales", default)]
    pub sales: Option<f64>,

    #[serde(rename = "Customers", default)]
    pub customers: Option<f64>,

    /// Blank for a handful of test rows
    #[serde(rename = "Open", default)]
    pub open: Option<f64>,

    #[serde(rename = "Promo")]
    pub promo: u8,

    /// "0" = none, "a" = public, "b" = Easter, "c" = Christmas
    #[serde(rename = "StateHoliday")]
    pub state_holiday: String,

    #[serde(rename = "SchoolHoliday")]
    pub school_holiday: u8,
}

impl SalesRecord {
    /// Rows with an unknown `Open` flag are treated as open.
    pub fn is_open(&self) -> bool {
        self.open.map_or(true, |o| o != 0.0)
    }

    pub fn is_state_holiday(&self) -> bool {
        is_holiday_code(&self.state_holiday)
    }
}

/// True for any StateHoliday code other than "0" / blank.
pub fn is_holiday_code(code: &str) -> bool {
    let code = code.trim();
    !(code.is_empty() || code == "0")
}

/// One row of `store.csv`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRecord {
    #[serde(rename = "Store")]
    pub store: u32,

    #[serde(rename = "StoreType")]
    pub store_type: String,

    #[serde(rename = "Assortment")]
    pub assortment: String,

    #[serde(rename = "CompetitionDistance", default)]
    pub competition_distance: Option<f64>,

    #[serde(rename = "CompetitionOpenSinceMonth", default)]
    pub competition_open_since_month: Option<f64>,

    #[serde(rename = "CompetitionOpenSinceYear", default)]
    pub competition_open_since_year: Option<f64>,

    #[serde(rename = "Promo2")]
    pub promo2: u8,

    #[serde(rename = "Promo2SinceWeek", default)]
    pub promo2_since_week: Option<f64>,

    #[serde(rename = "Promo2SinceYear", default)]
    pub promo2_since_year: Option<f64>,

    /// e.g. "Jan,Apr,Jul,Oct"
    #[serde(rename = "PromoInterval", default)]
    pub promo_interval: Option<String>,
}

/// A sales row left-joined with its store row.
///
/// Store attributes stay `None` when the store table has no
/// matching entry, mirroring a left join with nulls.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub sale:                         SalesRecord,
    pub store_type:                   Option<String>,
    pub assortment:                   Option<String>,
    pub competition_distance:         Option<f64>,
    pub competition_open_since_month: Option<f64>,
    pub competition_open_since_year:  Option<f64>,
    pub promo2:                       Option<u8>,
    pub promo2_since_week:            Option<f64>,
    pub promo2_since_year:            Option<f64>,
    pub promo_interval:               Option<String>,
}

impl MergedRecord {
    pub fn new(sale: SalesRecord, store: Option<&StoreRecord>) -> Self {
        match store {
            Some(s) => Self {
                sale,
                store_type:                   Some(s.store_type.clone()),
                assortment:                   Some(s.assortment.clone()),
                competition_distance:         s.competition_distance,
                competition_open_since_month: s.competition_open_since_month,
                competition_open_since_year:  s.competition_open_since_year,
                promo2:                       Some(s.promo2),
                promo2_since_week:            s.promo2_since_week,
                promo2_since_year:            s.promo2_since_year,
                promo_interval:               s.promo_interval.clone(),
            },
            None => Self {
                sale,
                store_type:                   None,
                assortment:                   None,
                competition_distance:         None,
                competition_open_since_month: None,
                competition_open_since_year:  None,
                promo2:                       None,
                promo2_since_week:            None,
                promo2_since_year:            None,
                promo_interval:               None,
            },
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn sale(open: Option<f64>, holiday: &str) -> SalesRecord {
        SalesRecord {
            id:             None,
            store:          1,
            day_of_week:    5,
            date:           NaiveDate::from_ymd_opt(2015, 7, 31).unwrap(),
            sales:          Some(5263.0),
            customers:      Some(555.0),
            open,
            promo:          1,
            state_holiday:  holiday.to_string(),
            school_holiday: 1,
        }
    }

    #[test]
    fn test_unknown_open_counts_as_open() {
        assert!(sale(None, "0").is_open());
        assert!(sale(Some(1.0), "0").is_open());
        assert!(!sale(Some(0.0), "0").is_open());
    }

    #[test]
    fn test_holiday_codes() {
        assert!(!sale(None, "0").is_state_holiday());
        assert!(!sale(None, "").is_state_holiday());
        assert!(sale(None, "a").is_state_holiday());
        assert!(sale(None, "c").is_state_holiday());
    }

    #[test]
    fn test_merge_without_store_keeps_nulls() {
        let merged = MergedRecord::new(sale(Some(1.0), "0"), None);
        assert!(merged.store_type.is_none());
        assert!(merged.competition_distance.is_none());
        assert_eq!(merged.sale.store, 1);
    }
}
