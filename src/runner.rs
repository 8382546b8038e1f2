use crate::engine::{ReconciliationPipeline, TickerInputs, TickerReconciliation};
use crate::error::ReconciliationError;
use crate::schema::RawStatementRow;
use crate::sources::{
    CalendarSource, PriceSource, ProfileSource, ShareHistorySource, SourceChain, StatementSource,
};
use crate::store::ExistingStore;
use crate::utils::sub_days;
use chrono::NaiveDate;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Statements,
    Ingestion,
    Calendar,
    ShareHistory,
    Price,
    Reconcile,
    Persist,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Statements => "statements",
            Self::Ingestion => "ingestion",
            Self::Calendar => "calendar",
            Self::ShareHistory => "share history",
            Self::Price => "price",
            Self::Reconcile => "reconcile",
            Self::Persist => "persist",
        };
        f.write_str(label)
    }
}

/// A ticker that was skipped; nothing from it reached the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerFailure {
    pub ticker: String,
    pub stage: RunStage,
    pub reason: String,
}

impl TickerFailure {
    fn new(ticker: &str, stage: RunStage, reason: impl fmt::Display) -> Self {
        Self {
            ticker: ticker.to_string(),
            stage,
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for TickerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed at {}: {}", self.ticker, self.stage, self.reason)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub outcomes: Vec<TickerReconciliation>,
    pub failures: Vec<TickerFailure>,
    pub persisted: usize,
}

impl RunSummary {
    pub fn withheld(&self) -> usize {
        self.outcomes.iter().map(|o| o.withheld.len()).sum()
    }

    pub fn skipped_existing(&self) -> usize {
        self.outcomes.iter().map(|o| o.skipped_existing).sum()
    }

    pub fn outcome(&self, ticker: &str) -> Option<&TickerReconciliation> {
        self.outcomes.iter().find(|o| o.ticker == ticker)
    }
}

/// Fetches each ticker's inputs through its sources, reconciles, and persists.
pub struct ReconciliationRunner {
    pipeline: ReconciliationPipeline,
    statements: Box<dyn StatementSource>,
    calendars: Box<dyn CalendarSource>,
    share_history: Box<dyn ShareHistorySource>,
    prices: Box<dyn PriceSource>,
    profiles: Box<dyn ProfileSource>,
}

impl ReconciliationRunner {
    /// Starts with no profile source; every ticker then uses static defaults.
    pub fn new(
        pipeline: ReconciliationPipeline,
        statements: Box<dyn StatementSource>,
        calendars: Box<dyn CalendarSource>,
        share_history: Box<dyn ShareHistorySource>,
        prices: Box<dyn PriceSource>,
    ) -> Self {
        Self {
            pipeline,
            statements,
            calendars,
            share_history,
            prices,
            profiles: Box::new(SourceChain::<dyn ProfileSource>::new()),
        }
    }

    #[must_use]
    pub fn with_profiles(mut self, profiles: Box<dyn ProfileSource>) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn pipeline(&self) -> &ReconciliationPipeline {
        &self.pipeline
    }

    /// Processes tickers in order. A failing ticker is logged and skipped; its records
    /// are only persisted once the whole ticker reconciled.
    ///
    /// Persisting stops at the first store error. Records written before it stay in the
    /// store and are counted in `persisted`; the ticker is reported as a `Persist`
    /// failure and its outcome is left out of `outcomes`.
    pub fn run<S: AsRef<str>>(&self, tickers: &[S], store: &mut dyn ExistingStore) -> RunSummary {
        let pause = Duration::from_millis(self.pipeline.config().pause_between_tickers_ms);
        let mut summary = RunSummary::default();

        for (i, ticker) in tickers.iter().enumerate() {
            let ticker = ticker.as_ref();
            if i > 0 && !pause.is_zero() {
                thread::sleep(pause);
            }

            info!("Reconciling {} ({}/{})", ticker, i + 1, tickers.len());
            let outcome = match self.reconcile_ticker(ticker, &*store) {
                Ok(outcome) => outcome,
                Err(failure) => {
                    warn!("Skipping {}", failure);
                    summary.failures.push(failure);
                    continue;
                }
            };

            let mut persist_failure = None;
            for record in &outcome.records {
                match store.persist(record.clone()) {
                    Ok(true) => summary.persisted += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!("{}: could not persist {}: {}", ticker, record.key(), e);
                        persist_failure = Some(TickerFailure::new(ticker, RunStage::Persist, e));
                        break;
                    }
                }
            }
            match persist_failure {
                Some(failure) => summary.failures.push(failure),
                None => summary.outcomes.push(outcome),
            }
        }

        info!(
            "Run finished: {} tickers reconciled, {} failed, {} records persisted",
            summary.outcomes.len(),
            summary.failures.len(),
            summary.persisted
        );
        summary
    }

    fn reconcile_ticker(
        &self,
        ticker: &str,
        store: &dyn ExistingStore,
    ) -> Result<TickerReconciliation, TickerFailure> {
        let bundle = self
            .statements
            .fetch_statements(ticker)
            .map_err(|e| TickerFailure::new(ticker, RunStage::Statements, e))?
            .filter(|b| !b.is_empty())
            .ok_or_else(|| TickerFailure::new(ticker, RunStage::Statements, "no statement data"))?;

        let tables = bundle
            .to_raw_tables(ticker)
            .map_err(|e| TickerFailure::new(ticker, RunStage::Ingestion, e))?;

        let calendar_dates = self
            .calendars
            .fetch_announcement_dates(ticker)
            .map_err(|e| TickerFailure::new(ticker, RunStage::Calendar, e))?
            .unwrap_or_default();

        let profile = match self.profiles.fetch_profile(ticker) {
            Ok(profile) => profile,
            Err(e) => {
                warn!("{}: profile unavailable, using defaults: {}", ticker, e);
                None
            }
        };

        let share_history = match earliest_period(&tables) {
            Some(earliest) => {
                let start = sub_days(
                    earliest,
                    self.pipeline.config().shares.history_days_before,
                );
                self.share_history
                    .fetch_share_history(ticker, start, self.pipeline.today())
                    .map_err(|e| TickerFailure::new(ticker, RunStage::ShareHistory, e))?
                    .unwrap_or_default()
            }
            None => Vec::new(),
        };

        let inputs = TickerInputs {
            ticker,
            statement_tables: &tables,
            calendar_dates: &calendar_dates,
            share_history: &share_history,
            profile: profile.as_ref(),
        };

        self.pipeline
            .reconcile(inputs, self.prices.as_ref(), store)
            .map_err(|e| {
                let stage = match e {
                    ReconciliationError::SourceFailure { .. } => RunStage::Price,
                    _ => RunStage::Reconcile,
                };
                TickerFailure::new(ticker, stage, e)
            })
    }
}

fn earliest_period(tables: &[Vec<RawStatementRow>]) -> Option<NaiveDate> {
    tables
        .iter()
        .flatten()
        .map(|row| row.period_end.date())
        .min()
}
