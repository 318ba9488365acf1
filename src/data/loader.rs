// ============================================================
// Layer 4 — CSV Loader
// ============================================================
// Reads the three Rossmann tables with the csv crate and joins
// sales rows to store attributes.
//
//   train.csv  → Vec<SalesRecord>  (Sales, Customers present)
//   test.csv   → Vec<SalesRecord>  (Id present, no Sales)
//   store.csv  → Vec<StoreRecord>
//
// `Date` is parsed into chrono::NaiveDate by serde. Blank
// fields (CompetitionDistance, PromoInterval, Open, ...) become
// None and are dealt with by the preprocessor.

use anyhow::Result;
use serde::de::DeserializeOwned;
use std::{collections::HashMap, fs::File, io::BufReader, path::{Path, PathBuf}};

use crate::config::{resolve, ForecastConfig};
use crate::data::DataError;
use crate::domain::record::{MergedRecord, SalesRecord, StoreRecord};
use crate::domain::traits::SalesSource;

/// Loads the tables named in `data_paths` from disk.
/// Implements the SalesSource trait from Layer 3.
pub struct CsvSalesSource {
    train: PathBuf,
    test:  PathBuf,
    store: PathBuf,
}

impl CsvSalesSource {
    pub fn new(train: impl Into<PathBuf>, test: impl Into<PathBuf>, store: impl Into<PathBuf>) -> Self {
        Self { train: train.into(), test: test.into(), store: store.into() }
    }

    /// Paths from the config, resolved against the project root.
    pub fn from_config(cfg: &ForecastConfig, root: &Path) -> Self {
        Self::new(
            resolve(root, &cfg.data_paths.train),
            resolve(root, &cfg.data_paths.test),
            resolve(root, &cfg.data_paths.store),
        )
    }
}

impl SalesSource for CsvSalesSource {
    fn load_sales(&self) -> Result<(Vec<SalesRecord>, Vec<SalesRecord>)> {
        let train = read_table::<SalesRecord>(&self.train).map_err(|e| {
            tracing::error!("Error loading data: {e}");
            e
        })?;
        let test = read_table::<SalesRecord>(&self.test).map_err(|e| {
            tracing::error!("Error loading data: {e}");
            e
        })?;
        tracing::info!(
            "Successfully loaded training and test data ({} / {} rows)",
            train.len(),
            test.len()
        );
        Ok((train, test))
    }

    fn load_stores(&self) -> Result<Vec<StoreRecord>> {
        let stores = read_table::<StoreRecord>(&self.store).map_err(|e| {
            tracing::error!("Error loading store data: {e}");
            e
        })?;
        tracing::info!("Successfully loaded store data ({} stores)", stores.len());
        Ok(stores)
    }
}

/// Deserialise every row of a headed CSV file.
pub fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, DataError> {
    let file = File::open(path).map_err(|source| DataError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let mut rows = Vec::new();
    for record in reader.deserialize::<T>() {
        let row = record.map_err(|source| DataError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(DataError::EmptyTable(path.to_path_buf()));
    }
    tracing::debug!("Read {} rows from '{}'", rows.len(), path.display());
    Ok(rows)
}

/// Left join of sales rows with store attributes on `Store`.
pub fn merge_store_data(sales: Vec<SalesRecord>, stores: &[StoreRecord]) -> Vec<MergedRecord> {
    let by_id: HashMap<u32, &StoreRecord> = stores.iter().map(|s| (s.store, s)).collect();

    let mut unmatched = 0usize;
    let merged: Vec<MergedRecord> = sales
        .into_iter()
        .map(|sale| {
            let store = by_id.get(&sale.store).copied();
            if store.is_none() {
                unmatched += 1;
            }
            MergedRecord::new(sale, store)
        })
        .collect();

    if unmatched > 0 {
        tracing::warn!("{unmatched} sales rows have no matching store row");
    }
    tracing::info!("Successfully merged {} rows with store data", merged.len());
    merged
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const TRAIN: &str = "\
Store,DayOfWeek,Date,Sales,Customers,Open,Promo,StateHoliday,SchoolHoliday
1,5,2015-07-31,5263,555,1,1,0,1
2,5,2015-07-31,6064,625,1,1,0,1
1,4,2015-07-30,0,0,0,0,a,1
";

    const TEST: &str = "\
Id,Store,DayOfWeek,Date,Open,Promo,StateHoliday,SchoolHoliday
1,1,4,2015-09-17,1.0,1,0,0
2,3,4,2015-09-17,,1,0,0
";

    const STORE: &str = "\
Store,StoreType,Assortment,CompetitionDistance,CompetitionOpenSinceMonth,CompetitionOpenSinceYear,Promo2,Promo2SinceWeek,Promo2SinceYear,PromoInterval
1,c,a,1270,9,2008,0,,,
2,a,a,570,11,2007,1,13,2010,\"Jan,Apr,Jul,Oct\"
";

    fn write_tables(dir: &Path) -> CsvSalesSource {
        fs::write(dir.join("train.csv"), TRAIN).unwrap();
        fs::write(dir.join("test.csv"), TEST).unwrap();
        fs::write(dir.join("store.csv"), STORE).unwrap();
        CsvSalesSource::new(dir.join("train.csv"), dir.join("test.csv"), dir.join("store.csv"))
    }

    #[test]
    fn test_loads_all_tables() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_tables(dir.path());

        let (train, test) = source.load_sales().unwrap();
        assert_eq!(train.len(), 3);
        assert_eq!(train[0].sales, Some(5263.0));
        assert_eq!(train[0].id, None);
        assert_eq!(train[2].state_holiday, "a");

        assert_eq!(test.len(), 2);
        assert_eq!(test[0].id, Some(1));
        assert_eq!(test[0].sales, None);
        assert_eq!(test[1].open, None);

        let stores = source.load_stores().unwrap();
        assert_eq!(stores.len(), 2);
        assert_eq!(stores[0].promo2_since_week, None);
        assert_eq!(stores[0].promo_interval, None);
        assert_eq!(stores[1].promo_interval.as_deref(), Some("Jan,Apr,Jul,Oct"));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_table::<StoreRecord>(&dir.path().join("store.csv")).unwrap_err();
        assert!(matches!(err, DataError::Open { .. }));
    }

    #[test]
    fn test_header_only_table_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.csv");
        fs::write(&path, STORE.lines().next().unwrap()).unwrap();
        let err = read_table::<StoreRecord>(&path).unwrap_err();
        assert!(matches!(err, DataError::EmptyTable(_)));
    }

    #[test]
    fn test_merge_is_a_left_join() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_tables(dir.path());
        let (_, test) = source.load_sales().unwrap();
        let stores = source.load_stores().unwrap();

        let merged = merge_store_data(test, &stores);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].store_type.as_deref(), Some("c"));
        assert_eq!(merged[0].competition_distance, Some(1270.0));
        // store 3 is absent from store.csv
        assert!(merged[1].store_type.is_none());
    }
}
