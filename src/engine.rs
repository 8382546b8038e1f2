use crate::announcement::AnnouncementDateResolver;
use crate::config::ReconcilerConfig;
use crate::error::{ReconciliationError, Result};
use crate::fiscal::FiscalCalendarCalculator;
use crate::market_cap::MarketCapCalculator;
use crate::merger::{MergeOutcome, MetricConflict, RecordMerger};
use crate::schema::{
    CompanyFiscalProfile, FinancialRecord, FiscalPeriod, Provenance, RawStatementRow, RecordKey,
    SchemaVersion, ShareHistoryPoint,
};
use crate::shares::ShareCountResolver;
use crate::sources::PriceSource;
use crate::store::ExistingStore;
use crate::timeseries::SparseSeries;
use crate::utils::is_positive_finite;
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Everything already fetched for one ticker.
#[derive(Debug, Clone, Copy)]
pub struct TickerInputs<'a> {
    pub ticker: &'a str,
    /// Tables in processing order; later tables win metric collisions.
    pub statement_tables: &'a [Vec<RawStatementRow>],
    pub calendar_dates: &'a [NaiveDate],
    pub share_history: &'a [ShareHistoryPoint],
    pub profile: Option<&'a CompanyFiscalProfile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithholdReason {
    SharesUnresolved,
    PriceUnavailable,
    /// Price and shares were present but their product is not a finite number.
    MarketCapUndefined,
}

/// A report that reconciled but cannot be persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithheldReport {
    pub key: RecordKey,
    pub fiscal_period: FiscalPeriod,
    pub announce_date: NaiveDate,
    pub reason: WithholdReason,
    pub shares_outstanding: Option<f64>,
    pub adj_close_price: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct TickerReconciliation {
    pub ticker: String,
    /// New records, most recent report period first.
    pub records: Vec<FinancialRecord>,
    pub withheld: Vec<WithheldReport>,
    /// Reports whose key was already in the store.
    pub skipped_existing: usize,
    pub conflicts: Vec<MetricConflict>,
    pub discarded_future_rows: usize,
}

impl TickerReconciliation {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Sequences merge, fiscal classification, announcement and share resolution, price
/// lookup, market cap and deduplication for one ticker at a time.
pub struct ReconciliationPipeline {
    config: ReconcilerConfig,
    today: NaiveDate,
    announcements: AnnouncementDateResolver,
    shares: ShareCountResolver,
}

impl ReconciliationPipeline {
    /// `today` bounds every date the pipeline produces. Pass a fixed date for
    /// reproducible runs.
    pub fn new(config: ReconcilerConfig, today: NaiveDate) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            announcements: AnnouncementDateResolver::new(config.announcement.clone(), today),
            shares: ShareCountResolver::new(config.shares.clone()),
            config,
            today,
        })
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Reconciles one ticker against a read-only view of the store.
    ///
    /// Keys already in the store are skipped, so re-running with the same inputs after
    /// persisting the output yields no records. A failing price source aborts the whole
    /// ticker; a missing, zero or negative price withholds just that report.
    pub fn reconcile(
        &self,
        inputs: TickerInputs<'_>,
        price_lookup: &dyn PriceSource,
        existing_store: &dyn ExistingStore,
    ) -> Result<TickerReconciliation> {
        let ticker = inputs.ticker;
        let fiscal = FiscalCalendarCalculator::for_ticker(ticker, inputs.profile, &self.config);
        let current_shares = inputs.profile.and_then(|p| p.current_shares_outstanding);
        let history: SparseSeries<f64> = inputs
            .share_history
            .iter()
            .map(|p| (p.date, p.shares))
            .collect();

        let merger = RecordMerger::new(&self.config.field_aliases, self.today);
        let outcome = merger.merge(inputs.statement_tables.iter().map(Vec::as_slice));
        let keys = outcome.keys_newest_first();
        let MergeOutcome {
            mut reports,
            conflicts,
            discarded_future_rows,
        } = outcome;

        let mut result = TickerReconciliation {
            ticker: ticker.to_string(),
            conflicts,
            discarded_future_rows,
            ..TickerReconciliation::default()
        };

        for key in keys {
            let Some(merged_metrics) = reports.remove(&key) else {
                continue;
            };
            let record_key = RecordKey::new(ticker, key.period_end, key.report_type);
            if existing_store.contains(&record_key) {
                debug!("{} already stored", record_key);
                result.skipped_existing += 1;
                continue;
            }

            let fiscal_period = fiscal.classify(key.period_end, key.report_type);
            let announcement =
                self.announcements
                    .resolve(key.period_end, key.report_type, inputs.calendar_dates);
            let resolved_shares = self.shares.resolve(
                &merged_metrics,
                ticker,
                announcement.date,
                &history,
                current_shares,
            );

            let Some(resolved_shares) = resolved_shares else {
                warn!("{}: withheld, no share count", record_key);
                result.withheld.push(WithheldReport {
                    key: record_key,
                    fiscal_period,
                    announce_date: announcement.date,
                    reason: WithholdReason::SharesUnresolved,
                    shares_outstanding: None,
                    adj_close_price: None,
                });
                continue;
            };

            let price = price_lookup
                .fetch_price(ticker, announcement.date)
                .map_err(|source| ReconciliationError::SourceFailure {
                    ticker: ticker.to_string(),
                    source,
                })?
                .filter(|p| is_positive_finite(*p));

            let shares = Some(resolved_shares.shares);
            let market_cap = MarketCapCalculator::compute(price, shares);
            let reason = match (price, market_cap) {
                (None, _) => Some(WithholdReason::PriceUnavailable),
                (Some(_), None) => Some(WithholdReason::MarketCapUndefined),
                _ => None,
            };
            if let Some(reason) = reason {
                warn!(
                    "{}: withheld ({:?}), announce date {}",
                    record_key, reason, announcement.date
                );
                result.withheld.push(WithheldReport {
                    key: record_key,
                    fiscal_period,
                    announce_date: announcement.date,
                    reason,
                    shares_outstanding: shares,
                    adj_close_price: price,
                });
                continue;
            }

            debug!(
                "{}: {} announced {} ({:?}), shares {:?}, price {:?}",
                record_key,
                fiscal_period,
                announcement.date,
                announcement.source,
                resolved_shares.source,
                price
            );

            result.records.push(FinancialRecord {
                ticker: ticker.to_string(),
                report_period: key.period_end,
                announce_date: announcement.date,
                fiscal_year: fiscal_period.fiscal_year,
                fiscal_quarter: fiscal_period.fiscal_quarter,
                report_type: key.report_type,
                merged_metrics,
                shares_outstanding: shares,
                adj_close_price: price,
                market_cap,
                provenance: Provenance {
                    fiscal: fiscal.source(),
                    announce_date: announcement.source,
                    announce_clamped: announcement.clamped,
                    shares: Some(resolved_shares.source),
                },
                schema_version: SchemaVersion::CURRENT,
                data_source: self.config.data_source.clone(),
                updated_at: self.today,
            });
        }

        info!(
            "{}: {} new, {} already stored, {} withheld, {} conflicts",
            ticker,
            result.records.len(),
            result.skipped_existing,
            result.withheld.len(),
            result.conflicts.len()
        );

        Ok(result)
    }
}
