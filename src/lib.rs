//! # Financial Period Reconciler
//!
//! A library for turning raw, per-source financial statement tables into canonical
//! fiscal-period records, each tagged with its announcement date, point-in-time share
//! count and market capitalization.
//!
//! ## Core Concepts
//!
//! - **Merging**: income, balance sheet and cash flow tables (annual and quarterly) are
//!   folded into one metric map per (period end, report type)
//! - **Fiscal periods**: period ends are labelled with the company's fiscal year and
//!   quarter, which may differ from the calendar year
//! - **Announcement dates**: each report is matched to the day it became public, or the
//!   date is estimated from the period end
//! - **Point-in-time shares**: share counts come from the statement, then from a share
//!   history series, and only as a last resort from today's snapshot
//! - **Idempotence**: records are keyed by (ticker, report period, report type); keys
//!   already in the store are never emitted again
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_period_reconciler::*;
//! use chrono::NaiveDate;
//!
//! let mut balance = StatementTable::new(
//!     StatementKind::BalanceSheet,
//!     ReportType::Annual,
//!     vec!["Ordinary Shares Number".to_string()],
//! );
//! balance.push_row("2023-09-30", vec![Some(15_550_061_000.0)]);
//! let tables = StatementBundle::new().with_table(balance).to_raw_tables("AAPL")?;
//!
//! let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
//! let prices = PriceHistory::from_config(&ReconcilerConfig::default(), today)
//!     .with_closes("AAPL", vec![(NaiveDate::from_ymd_opt(2023, 11, 3).unwrap(), 176.65)]);
//!
//! let mut store = MemoryStore::new();
//! let result = reconcile(
//!     "AAPL",
//!     &tables,
//!     &[NaiveDate::from_ymd_opt(2023, 11, 2).unwrap()],
//!     &[],
//!     None,
//!     &prices,
//!     &store,
//! )?;
//!
//! for record in result.records {
//!     store.persist(record)?;
//! }
//! ```

pub mod aliases;
pub mod announcement;
pub mod config;
pub mod engine;
pub mod error;
pub mod fiscal;
pub mod ingestion;
pub mod market_cap;
pub mod merger;
pub mod runner;
pub mod schema;
pub mod shares;
pub mod sources;
pub mod store;
pub mod timeseries;
pub mod utils;

pub use aliases::FieldAliasTable;
pub use announcement::{AnnouncementDateResolver, ResolvedAnnouncement};
pub use config::{AnnouncementConfig, ReconcilerConfig, ShareResolutionConfig};
pub use engine::{
    ReconciliationPipeline, TickerInputs, TickerReconciliation, WithheldReport, WithholdReason,
};
pub use error::{ReconciliationError, Result};
pub use fiscal::{compute_fiscal_period, FiscalCalendarCalculator};
pub use ingestion::{StatementBundle, StatementTable, PROCESSING_ORDER};
pub use market_cap::MarketCapCalculator;
pub use merger::{MergeOutcome, MetricConflict, RecordMerger};
pub use runner::{ReconciliationRunner, RunStage, RunSummary, TickerFailure};
pub use schema::*;
pub use shares::{ResolvedShares, ShareCountResolver};
pub use sources::{
    CalendarSource, MaterializedSource, PriceHistory, PriceSource, ProfileSource,
    ShareHistorySource, SourceChain, SourceError, SourceErrorKind, SourceResult,
    StatementSource,
};
pub use store::{ExistingStore, MemoryStore};
pub use timeseries::{LookupWindow, SparseSeries};

use chrono::{NaiveDate, Utc};

pub struct FinancialPeriodReconciler;

impl FinancialPeriodReconciler {
    /// Reconciles one ticker with an explicit configuration and run date.
    pub fn reconcile_with(
        config: &ReconcilerConfig,
        today: NaiveDate,
        inputs: TickerInputs<'_>,
        price_lookup: &dyn PriceSource,
        existing_store: &dyn ExistingStore,
    ) -> Result<TickerReconciliation> {
        let pipeline = ReconciliationPipeline::new(config.clone(), today)?;
        pipeline.reconcile(inputs, price_lookup, existing_store)
    }
}

/// Reconciles one ticker with the default configuration, using today's UTC date as the
/// run date.
///
/// Records whose key is already in `existing_store` are not returned, so calling this
/// again after persisting the output yields nothing.
pub fn reconcile(
    ticker: &str,
    statement_tables: &[Vec<RawStatementRow>],
    calendar_dates: &[NaiveDate],
    share_history: &[ShareHistoryPoint],
    profile: Option<&CompanyFiscalProfile>,
    price_lookup: &dyn PriceSource,
    existing_store: &dyn ExistingStore,
) -> Result<TickerReconciliation> {
    let inputs = TickerInputs {
        ticker,
        statement_tables,
        calendar_dates,
        share_history,
        profile,
    };
    FinancialPeriodReconciler::reconcile_with(
        &ReconcilerConfig::default(),
        Utc::now().date_naive(),
        inputs,
        price_lookup,
        existing_store,
    )
}
