//! Interfaces to the upstream collaborators (statements, calendars, share history,
//! prices, profiles) plus in-memory implementations.
//!
//! Every fetch returns `Ok(Some(_))` with data, `Ok(None)` when the source has nothing
//! for the request, or `Err` when the source itself failed. [`SourceChain`] turns an
//! ordered list of sources into one source that stops at the first hit.

use crate::config::ReconcilerConfig;
use crate::ingestion::StatementBundle;
use crate::schema::{CompanyFiscalProfile, ShareHistoryPoint};
use crate::timeseries::{LookupWindow, SparseSeries};
use crate::utils::{is_positive_finite, sub_days};
use chrono::NaiveDate;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Unavailable,
    RateLimited,
    InvalidResponse,
}

impl fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unavailable => "unavailable",
            Self::RateLimited => "rate limited",
            Self::InvalidResponse => "invalid response",
        };
        f.write_str(label)
    }
}

/// A collaborator failed outright (as opposed to having no data).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("source {kind}: {message}")]
pub struct SourceError {
    pub kind: SourceErrorKind,
    pub message: String,
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidResponse,
            message: message.into(),
        }
    }
}

pub type SourceResult<T> = std::result::Result<Option<T>, SourceError>;

pub trait StatementSource {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn fetch_statements(&self, ticker: &str) -> SourceResult<StatementBundle>;
}

pub trait CalendarSource {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn fetch_announcement_dates(&self, ticker: &str) -> SourceResult<Vec<NaiveDate>>;
}

pub trait ShareHistorySource {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn fetch_share_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> SourceResult<Vec<ShareHistoryPoint>>;
}

pub trait PriceSource {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Adjusted close of the trading day nearest to `target`.
    fn fetch_price(&self, ticker: &str, target: NaiveDate) -> SourceResult<f64>;
}

impl<F> PriceSource for F
where
    F: Fn(&str, NaiveDate) -> SourceResult<f64>,
{
    fn fetch_price(&self, ticker: &str, target: NaiveDate) -> SourceResult<f64> {
        self(ticker, target)
    }
}

pub trait ProfileSource {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn fetch_profile(&self, ticker: &str) -> SourceResult<CompanyFiscalProfile>;
}

/// Ordered fallback list of sources of one kind.
pub struct SourceChain<S: ?Sized> {
    sources: Vec<Box<S>>,
}

impl<S: ?Sized> Default for SourceChain<S> {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
        }
    }
}

impl<S: ?Sized> SourceChain<S> {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_source(mut self, source: Box<S>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn push(&mut self, source: Box<S>) {
        self.sources.push(source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Tries each source in order and returns the first `Ok(Some(_))`.
    ///
    /// Falls back to `Ok(None)` if at least one source answered without data, and to the
    /// last error if every source failed.
    fn first_hit<T>(
        &self,
        ticker: &str,
        name: impl Fn(&S) -> &str,
        fetch: impl Fn(&S) -> SourceResult<T>,
    ) -> SourceResult<T> {
        let mut last_error = None;
        let mut answered = false;

        for source in &self.sources {
            match fetch(source) {
                Ok(Some(data)) => return Ok(Some(data)),
                Ok(None) => {
                    debug!("{}: no data from {}", ticker, name(source));
                    answered = true;
                }
                Err(e) => {
                    warn!("{}: {} failed: {}", ticker, name(source), e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !answered => Err(e),
            _ => Ok(None),
        }
    }
}

impl StatementSource for SourceChain<dyn StatementSource> {
    fn name(&self) -> &str {
        "statement chain"
    }

    fn fetch_statements(&self, ticker: &str) -> SourceResult<StatementBundle> {
        self.first_hit(ticker, |s| s.name(), |s| s.fetch_statements(ticker))
    }
}

impl CalendarSource for SourceChain<dyn CalendarSource> {
    fn name(&self) -> &str {
        "calendar chain"
    }

    fn fetch_announcement_dates(&self, ticker: &str) -> SourceResult<Vec<NaiveDate>> {
        self.first_hit(ticker, |s| s.name(), |s| s.fetch_announcement_dates(ticker))
    }
}

impl ShareHistorySource for SourceChain<dyn ShareHistorySource> {
    fn name(&self) -> &str {
        "share history chain"
    }

    fn fetch_share_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> SourceResult<Vec<ShareHistoryPoint>> {
        self.first_hit(
            ticker,
            |s| s.name(),
            |s| s.fetch_share_history(ticker, start, end),
        )
    }
}

impl PriceSource for SourceChain<dyn PriceSource> {
    fn name(&self) -> &str {
        "price chain"
    }

    fn fetch_price(&self, ticker: &str, target: NaiveDate) -> SourceResult<f64> {
        self.first_hit(ticker, |s| s.name(), |s| s.fetch_price(ticker, target))
    }
}

impl ProfileSource for SourceChain<dyn ProfileSource> {
    fn name(&self) -> &str {
        "profile chain"
    }

    fn fetch_profile(&self, ticker: &str) -> SourceResult<CompanyFiscalProfile> {
        self.first_hit(ticker, |s| s.name(), |s| s.fetch_profile(ticker))
    }
}

/// Daily adjusted closes held in memory, answering nearest-trading-day lookups.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    closes: BTreeMap<String, SparseSeries<f64>>,
    window: LookupWindow,
    today: NaiveDate,
}

impl PriceHistory {
    pub fn new(window_days: u64, today: NaiveDate) -> Self {
        Self {
            closes: BTreeMap::new(),
            window: LookupWindow::symmetric(window_days),
            today,
        }
    }

    /// Uses the configured `price_window_days` on each side of the target.
    pub fn from_config(config: &ReconcilerConfig, today: NaiveDate) -> Self {
        Self::new(config.price_window_days, today)
    }

    #[must_use]
    pub fn with_closes<I>(mut self, ticker: impl Into<String>, closes: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let series = self.closes.entry(ticker.into()).or_default();
        for (date, close) in closes {
            if is_positive_finite(close) {
                series.insert(date, close);
            }
        }
        self
    }
}

impl PriceSource for PriceHistory {
    fn name(&self) -> &str {
        "in-memory price history"
    }

    /// Targets after today are moved to yesterday, the latest session with a close.
    fn fetch_price(&self, ticker: &str, target: NaiveDate) -> SourceResult<f64> {
        let Some(series) = self.closes.get(ticker) else {
            return Ok(None);
        };

        let target = if target > self.today {
            sub_days(self.today, 1)
        } else {
            target
        };

        Ok(series
            .nearest_within(target, self.window)
            .map(|(_, close)| *close))
    }
}

/// Upstream data already fetched into memory, keyed by ticker.
///
/// Tickers marked failing answer every request with [`SourceError::unavailable`].
#[derive(Debug, Clone, Default)]
pub struct MaterializedSource {
    name: String,
    statements: BTreeMap<String, StatementBundle>,
    calendars: BTreeMap<String, Vec<NaiveDate>>,
    share_history: BTreeMap<String, Vec<ShareHistoryPoint>>,
    profiles: BTreeMap<String, CompanyFiscalProfile>,
    failing: BTreeSet<String>,
}

impl MaterializedSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_statements(mut self, ticker: impl Into<String>, bundle: StatementBundle) -> Self {
        self.statements.insert(ticker.into(), bundle);
        self
    }

    #[must_use]
    pub fn with_calendar(mut self, ticker: impl Into<String>, dates: Vec<NaiveDate>) -> Self {
        self.calendars.insert(ticker.into(), dates);
        self
    }

    #[must_use]
    pub fn with_share_history(
        mut self,
        ticker: impl Into<String>,
        points: Vec<ShareHistoryPoint>,
    ) -> Self {
        self.share_history.insert(ticker.into(), points);
        self
    }

    #[must_use]
    pub fn with_profile(mut self, profile: CompanyFiscalProfile) -> Self {
        self.profiles.insert(profile.ticker.clone(), profile);
        self
    }

    #[must_use]
    pub fn failing_for(mut self, ticker: impl Into<String>) -> Self {
        self.failing.insert(ticker.into());
        self
    }

    fn check(&self, ticker: &str) -> Result<(), SourceError> {
        if self.failing.contains(ticker) {
            return Err(SourceError::unavailable(format!(
                "{} has no connection for {}",
                self.name, ticker
            )));
        }
        Ok(())
    }
}

impl StatementSource for MaterializedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_statements(&self, ticker: &str) -> SourceResult<StatementBundle> {
        self.check(ticker)?;
        Ok(self.statements.get(ticker).cloned())
    }
}

impl CalendarSource for MaterializedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_announcement_dates(&self, ticker: &str) -> SourceResult<Vec<NaiveDate>> {
        self.check(ticker)?;
        Ok(self.calendars.get(ticker).cloned())
    }
}

impl ShareHistorySource for MaterializedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_share_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> SourceResult<Vec<ShareHistoryPoint>> {
        self.check(ticker)?;
        Ok(self.share_history.get(ticker).map(|points| {
            points
                .iter()
                .filter(|p| p.date >= start && p.date <= end)
                .copied()
                .collect()
        }))
    }
}

impl ProfileSource for MaterializedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_profile(&self, ticker: &str) -> SourceResult<CompanyFiscalProfile> {
        self.check(ticker)?;
        Ok(self.profiles.get(ticker).cloned())
    }
}
