use crate::aliases::FieldAliasTable;
use crate::schema::{MetricMap, RawStatementRow, ReportKey, ReportType};
use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Two tables reported different values for the same metric of the same report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricConflict {
    pub period_end: NaiveDate,
    pub report_type: ReportType,
    pub metric: String,
    pub kept: f64,
    pub overwritten: f64,
}

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub reports: BTreeMap<ReportKey, MetricMap>,
    pub conflicts: Vec<MetricConflict>,
    pub discarded_future_rows: usize,
}

impl MergeOutcome {
    /// Keys ordered most recent period first; Annual before Quarterly on the same date.
    pub fn keys_newest_first(&self) -> Vec<ReportKey> {
        let mut keys: Vec<ReportKey> = self.reports.keys().copied().collect();
        keys.sort_by(|a, b| {
            b.period_end
                .cmp(&a.period_end)
                .then(a.report_type.cmp(&b.report_type))
        });
        keys
    }
}

/// Folds partial statement tables into one metric map per (period end, report type).
pub struct RecordMerger<'a> {
    aliases: &'a FieldAliasTable,
    today: NaiveDate,
}

impl<'a> RecordMerger<'a> {
    pub fn new(aliases: &'a FieldAliasTable, today: NaiveDate) -> Self {
        Self { aliases, today }
    }

    /// Tables are applied in iteration order; on a collision the later table's present
    /// value wins. A missing value never erases a present one.
    pub fn merge<'t, I>(&self, tables: I) -> MergeOutcome
    where
        I: IntoIterator<Item = &'t [RawStatementRow]>,
    {
        let mut outcome = MergeOutcome::default();

        for table in tables {
            for row in table {
                let period_end = row.period_end.date();
                if period_end > self.today {
                    debug!(
                        "{}: discarding {} row dated {} (after {})",
                        row.ticker, row.report_type, period_end, self.today
                    );
                    outcome.discarded_future_rows += 1;
                    continue;
                }

                let key = ReportKey {
                    period_end,
                    report_type: row.report_type,
                };
                let merged = outcome.reports.entry(key).or_default();

                for (name, value) in &row.metrics {
                    let canonical = self.aliases.canonical(name);
                    let value = value.filter(|v| v.is_finite());
                    if let Some(conflict) = merge_metric(merged, canonical, value, key) {
                        warn!(
                            "{}: conflicting '{}' for {} {}: {} overwritten by {}",
                            row.ticker,
                            conflict.metric,
                            conflict.report_type,
                            conflict.period_end,
                            conflict.overwritten,
                            conflict.kept
                        );
                        outcome.conflicts.push(conflict);
                    }
                }
            }
        }

        outcome
    }
}

fn merge_metric(
    merged: &mut MetricMap,
    name: &str,
    value: Option<f64>,
    key: ReportKey,
) -> Option<MetricConflict> {
    match merged.entry(name.to_string()) {
        Entry::Vacant(slot) => {
            slot.insert(value);
            None
        }
        Entry::Occupied(mut slot) => {
            let incoming = value?;
            let previous = slot.insert(Some(incoming));
            match previous {
                Some(old) if old != incoming => Some(MetricConflict {
                    period_end: key.period_end,
                    report_type: key.report_type,
                    metric: name.to_string(),
                    kept: incoming,
                    overwritten: old,
                }),
                _ => None,
            }
        }
    }
}
