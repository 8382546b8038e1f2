use crate::config::ShareResolutionConfig;
use crate::schema::{MetricMap, SharesSource};
use crate::timeseries::{LookupWindow, SparseSeries};
use crate::utils::is_positive_finite;
use chrono::NaiveDate;
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedShares {
    pub shares: f64,
    pub source: SharesSource,
    /// Date of the history point used, when the count came from the history series.
    pub as_of: Option<NaiveDate>,
}

/// Resolves the share count for one report: statement, then history, then current snapshot.
#[derive(Debug, Clone)]
pub struct ShareCountResolver {
    config: ShareResolutionConfig,
}

impl ShareCountResolver {
    pub fn new(config: ShareResolutionConfig) -> Self {
        Self { config }
    }

    pub fn history_window(&self) -> LookupWindow {
        LookupWindow::new(self.config.history_days_before, self.config.history_days_after)
    }

    pub fn resolve(
        &self,
        merged_metrics: &MetricMap,
        ticker: &str,
        announce_date: NaiveDate,
        history: &SparseSeries<f64>,
        current_shares_outstanding: Option<f64>,
    ) -> Option<ResolvedShares> {
        let statement = [
            (&self.config.primary_metric, SharesSource::StatementPrimary),
            (&self.config.secondary_metric, SharesSource::StatementSecondary),
        ];
        for (metric, source) in statement {
            let reported = merged_metrics
                .get(metric.as_str())
                .copied()
                .flatten()
                .filter(|v| is_positive_finite(*v));
            if let Some(shares) = reported {
                return Some(ResolvedShares {
                    shares,
                    source,
                    as_of: None,
                });
            }
        }

        let from_history = history
            .nearest_within(announce_date, self.history_window())
            .filter(|(_, shares)| is_positive_finite(**shares));
        if let Some((as_of, shares)) = from_history {
            debug!(
                "{}: shares for announce date {} taken from history point {}",
                ticker, announce_date, as_of
            );
            return Some(ResolvedShares {
                shares: *shares,
                source: SharesSource::History,
                as_of: Some(as_of),
            });
        }

        if let Some(shares) = current_shares_outstanding.filter(|v| is_positive_finite(*v)) {
            debug!(
                "{}: no historical share count near {}, falling back to current snapshot",
                ticker, announce_date
            );
            return Some(ResolvedShares {
                shares,
                source: SharesSource::CurrentSnapshot,
                as_of: None,
            });
        }

        None
    }
}
