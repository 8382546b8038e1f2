use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metric name to value. `None` marks a metric the source reported without a usable number.
pub type MetricMap = BTreeMap<String, Option<f64>>;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
#[serde(rename_all = "PascalCase")]
pub enum ReportType {
    #[schemars(description = "Full fiscal-year report (10-K style)")]
    Annual,

    #[schemars(description = "Single fiscal-quarter report (10-Q style)")]
    Quarterly,
}

impl ReportType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Annual => "Annual",
            Self::Quarterly => "Quarterly",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Income,
    BalanceSheet,
    CashFlow,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Income => "income",
            Self::BalanceSheet => "balance_sheet",
            Self::CashFlow => "cash_flow",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
pub enum FiscalQuarter {
    Q1,
    Q2,
    Q3,
    Q4,
    #[schemars(description = "Whole fiscal year; only used for Annual reports")]
    FY,
}

impl FiscalQuarter {
    /// Maps a 1-based quarter number to its label. Anything outside 1..=4 is not a quarter.
    pub fn from_number(quarter: u32) -> Option<Self> {
        match quarter {
            1 => Some(Self::Q1),
            2 => Some(Self::Q2),
            3 => Some(Self::Q3),
            4 => Some(Self::Q4),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Q1 => "Q1",
            Self::Q2 => "Q2",
            Self::Q3 => "Q3",
            Self::Q4 => "Q4",
            Self::FY => "FY",
        }
    }
}

impl fmt::Display for FiscalQuarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
pub struct FiscalPeriod {
    pub fiscal_year: i32,
    pub fiscal_quarter: FiscalQuarter,
}

impl fmt::Display for FiscalPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FY{} {}", self.fiscal_year, self.fiscal_quarter)
    }
}

/// One row of one upstream statement table, before merging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawStatementRow {
    pub ticker: String,
    /// Period end as reported upstream, with any UTC offset already dropped.
    pub period_end: NaiveDateTime,
    pub report_type: ReportType,
    pub metrics: MetricMap,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct CompanyFiscalProfile {
    pub ticker: String,

    #[schemars(
        description = "The month when the fiscal year ends (1 = January, 12 = December). Absent when the upstream profile did not say."
    )]
    pub fiscal_year_end_month: Option<u32>,

    #[schemars(
        description = "Latest known outstanding share count. Not historically accurate; only a last-resort fallback."
    )]
    pub current_shares_outstanding: Option<f64>,
}

impl CompanyFiscalProfile {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            fiscal_year_end_month: None,
            current_shares_outstanding: None,
        }
    }

    /// Builds a profile from an upstream "last fiscal year end" unix timestamp.
    ///
    /// The month is read in UTC, not the host's local time zone, so a timestamp late on
    /// the last day of a month keeps that month on every machine.
    pub fn from_last_fiscal_year_end(
        ticker: impl Into<String>,
        last_fiscal_year_end: Option<i64>,
        current_shares_outstanding: Option<f64>,
    ) -> Self {
        let fiscal_year_end_month = last_fiscal_year_end
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.date_naive().month());

        Self {
            ticker: ticker.into(),
            fiscal_year_end_month,
            current_shares_outstanding,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ShareHistoryPoint {
    pub date: NaiveDate,
    pub shares: f64,
}

/// Merge key: one merged report per period end and report type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReportKey {
    pub period_end: NaiveDate,
    pub report_type: ReportType,
}

/// Store key: the uniqueness constraint on persisted records.
#[derive(
    Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
pub struct RecordKey {
    pub ticker: String,
    pub report_period: NaiveDate,
    pub report_type: ReportType,
}

impl RecordKey {
    pub fn new(ticker: impl Into<String>, report_period: NaiveDate, report_type: ReportType) -> Self {
        Self {
            ticker: ticker.into(),
            report_period,
            report_type,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.ticker, self.report_period, self.report_type)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FiscalSource {
    #[schemars(description = "Fiscal year end month reported by the profile source")]
    Profile,
    #[schemars(description = "Fiscal year end month taken from the static per-ticker defaults")]
    StaticDefault,
    #[schemars(description = "No month known; calendar quarters were used")]
    CalendarDefault,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnnounceDateSource {
    #[schemars(description = "A known calendar date fell inside the matching window")]
    Matched,
    #[schemars(description = "No calendar date matched; period end plus a fixed offset")]
    Estimated,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SharesSource {
    StatementPrimary,
    StatementSecondary,
    History,
    #[schemars(description = "Current outstanding shares; lower confidence for old reports")]
    CurrentSnapshot,
}

impl SharesSource {
    pub const fn is_historically_accurate(self) -> bool {
        !matches!(self, Self::CurrentSnapshot)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct Provenance {
    pub fiscal: FiscalSource,
    pub announce_date: AnnounceDateSource,
    /// The resolved announce date was in the future and got pulled back to the run date.
    pub announce_clamped: bool,
    pub shares: Option<SharesSource>,
}

/// Layout version of persisted records. Bump when the record shape changes.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, JsonSchema,
)]
#[serde(transparent)]
pub struct SchemaVersion(pub u16);

impl SchemaVersion {
    pub const CURRENT: SchemaVersion = SchemaVersion(1);

    pub fn is_supported(self) -> bool {
        self <= Self::CURRENT
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct FinancialRecord {
    pub ticker: String,
    pub report_period: NaiveDate,
    pub announce_date: NaiveDate,
    pub fiscal_year: i32,
    pub fiscal_quarter: FiscalQuarter,
    pub report_type: ReportType,

    #[serde(serialize_with = "finite_metrics::serialize")]
    #[schemars(with = "MetricMap")]
    #[schemars(description = "Union of every statement metric known for this report; non-finite values are null")]
    pub merged_metrics: MetricMap,

    pub shares_outstanding: Option<f64>,
    pub adj_close_price: Option<f64>,

    #[serde(rename = "market_cap_billions")]
    pub market_cap: Option<f64>,

    pub provenance: Provenance,

    #[serde(default)]
    pub schema_version: SchemaVersion,

    pub data_source: String,
    pub updated_at: NaiveDate,
}

impl FinancialRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.ticker.clone(), self.report_period, self.report_type)
    }

    pub fn fiscal_period(&self) -> FiscalPeriod {
        FiscalPeriod {
            fiscal_year: self.fiscal_year,
            fiscal_quarter: self.fiscal_quarter,
        }
    }

    /// True when price, shares and market cap are all present, finite and positive.
    pub fn is_complete(&self) -> bool {
        [self.adj_close_price, self.shares_outstanding, self.market_cap]
            .iter()
            .all(|v| v.is_some_and(crate::utils::is_positive_finite))
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(FinancialRecord)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }
}

/// Writes metric maps so that NaN and infinities come out as `null`.
pub mod finite_metrics {
    use super::MetricMap;
    use serde::ser::SerializeMap;
    use serde::Serializer;

    pub fn serialize<S>(metrics: &MetricMap, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(metrics.len()))?;
        for (name, value) in metrics {
            map.serialize_entry(name, &value.filter(|v| v.is_finite()))?;
        }
        map.end()
    }
}
