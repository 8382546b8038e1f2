use crate::error::{ReconciliationError, Result};
use crate::schema::{FinancialRecord, RecordKey, SchemaVersion};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Persistence boundary: keyed membership plus atomic insert-or-skip.
pub trait ExistingStore {
    fn contains(&self, key: &RecordKey) -> bool;

    /// Inserts `record` unless its key is already present.
    ///
    /// Returns `Ok(true)` when inserted and `Ok(false)` when skipped as a duplicate.
    /// Records without a positive finite price, share count and market cap are refused.
    fn persist(&mut self, record: FinancialRecord) -> Result<bool>;
}

pub(crate) fn ensure_complete(record: &FinancialRecord) -> Result<()> {
    if record.is_complete() {
        return Ok(());
    }

    let mut missing = Vec::new();
    if record.adj_close_price.is_none() {
        missing.push("adj_close_price");
    }
    if record.shares_outstanding.is_none() {
        missing.push("shares_outstanding");
    }
    if record.market_cap.is_none() {
        missing.push("market_cap");
    }
    let details = if missing.is_empty() {
        "zero, negative or non-finite value".to_string()
    } else {
        format!("missing {}", missing.join(", "))
    };

    Err(ReconciliationError::IncompleteRecord {
        ticker: record.ticker.clone(),
        report_period: record.report_period.to_string(),
        report_type: record.report_type.to_string(),
        details,
    })
}

/// In-memory store keyed by (ticker, report period, report type), with JSON snapshots.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: BTreeMap<RecordKey, FinancialRecord>,
}

#[derive(Serialize)]
struct SnapshotOut<'a> {
    schema_version: SchemaVersion,
    records: Vec<&'a FinancialRecord>,
}

#[derive(Deserialize)]
struct SnapshotIn {
    schema_version: SchemaVersion,
    records: Vec<FinancialRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &RecordKey) -> Option<&FinancialRecord> {
        self.records.get(key)
    }

    /// All records in key order.
    pub fn records(&self) -> impl Iterator<Item = &FinancialRecord> {
        self.records.values()
    }

    pub fn records_for<'a>(&'a self, ticker: &'a str) -> impl Iterator<Item = &'a FinancialRecord> {
        self.records.values().filter(move |r| r.ticker == ticker)
    }

    pub fn to_json(&self) -> Result<String> {
        let snapshot = SnapshotOut {
            schema_version: SchemaVersion::CURRENT,
            records: self.records.values().collect(),
        };
        Ok(serde_json::to_string_pretty(&snapshot)?)
    }

    /// Loads a snapshot, refusing layouts written by a newer version.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: SnapshotIn = serde_json::from_str(json)?;
        check_version(snapshot.schema_version)?;

        let mut store = Self::new();
        for record in snapshot.records {
            check_version(record.schema_version)?;
            if !store.persist(record)? {
                debug!("duplicate key in snapshot ignored");
            }
        }
        Ok(store)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?)?;
        info!("Saved {} records to {}", self.len(), path.display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let store = Self::from_json(&fs::read_to_string(path)?)?;
        info!("Loaded {} records from {}", store.len(), path.display());
        Ok(store)
    }
}

fn check_version(found: SchemaVersion) -> Result<()> {
    if found.is_supported() {
        Ok(())
    } else {
        Err(ReconciliationError::UnsupportedSchemaVersion {
            found: found.0,
            supported: SchemaVersion::CURRENT.0,
        })
    }
}

impl ExistingStore for MemoryStore {
    fn contains(&self, key: &RecordKey) -> bool {
        self.records.contains_key(key)
    }

    fn persist(&mut self, record: FinancialRecord) -> Result<bool> {
        ensure_complete(&record)?;

        let key = record.key();
        if self.records.contains_key(&key) {
            debug!("{} already stored, skipping", key);
            return Ok(false);
        }
        self.records.insert(key, record);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        AnnounceDateSource, FiscalQuarter, FiscalSource, MetricMap, Provenance, ReportType,
        SharesSource,
    };
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(ticker: &str, period: NaiveDate, price: f64) -> FinancialRecord {
        let shares = 15.5e9;
        FinancialRecord {
            ticker: ticker.to_string(),
            report_period: period,
            announce_date: date(2023, 11, 2),
            fiscal_year: 2023,
            fiscal_quarter: FiscalQuarter::FY,
            report_type: ReportType::Annual,
            merged_metrics: MetricMap::new(),
            shares_outstanding: Some(shares),
            adj_close_price: Some(price),
            market_cap: Some(price * shares / 1e9),
            provenance: Provenance {
                fiscal: FiscalSource::StaticDefault,
                announce_date: AnnounceDateSource::Matched,
                announce_clamped: false,
                shares: Some(SharesSource::StatementPrimary),
            },
            schema_version: SchemaVersion::CURRENT,
            data_source: "yfinance".to_string(),
            updated_at: date(2024, 1, 2),
        }
    }

    #[test]
    fn test_persist_same_key_twice_keeps_first() {
        let mut store = MemoryStore::new();
        let first = record("AAPL", date(2023, 9, 30), 177.57);
        let second = record("AAPL", date(2023, 9, 30), 999.0);

        assert!(store.persist(first).unwrap());
        assert!(!store.persist(second).unwrap());
        assert_eq!(store.len(), 1);

        let key = RecordKey::new("AAPL", date(2023, 9, 30), ReportType::Annual);
        assert!(store.contains(&key));
        assert_eq!(store.get(&key).unwrap().adj_close_price, Some(177.57));
    }

    #[test]
    fn test_incomplete_record_refused() {
        let mut store = MemoryStore::new();
        let mut incomplete = record("AAPL", date(2023, 9, 30), 177.57);
        incomplete.adj_close_price = None;
        incomplete.market_cap = None;

        let err = store.persist(incomplete).unwrap_err();
        assert!(matches!(err, ReconciliationError::IncompleteRecord { .. }));
        assert!(err.to_string().contains("adj_close_price"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut store = MemoryStore::new();
        store.persist(record("AAPL", date(2023, 9, 30), 177.57)).unwrap();
        store.persist(record("MSFT", date(2023, 6, 30), 340.54)).unwrap();

        let restored = MemoryStore::from_json(&store.to_json().unwrap()).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.records_for("MSFT").count(), 1);
    }

    #[test]
    fn test_newer_snapshot_rejected() {
        let json = r#"{"schema_version": 99, "records": []}"#;
        let err = MemoryStore::from_json(json).unwrap_err();
        assert!(matches!(
            err,
            ReconciliationError::UnsupportedSchemaVersion { found: 99, .. }
        ));
    }
}
