use crate::error::{ReconciliationError, Result};
use crate::schema::{MetricMap, RawStatementRow, ReportType, StatementKind};
use crate::utils::parse_period_label;
use log::debug;

/// Order in which statement tables are merged. Later tables win metric collisions.
pub const PROCESSING_ORDER: [(StatementKind, ReportType); 6] = [
    (StatementKind::Income, ReportType::Annual),
    (StatementKind::Income, ReportType::Quarterly),
    (StatementKind::BalanceSheet, ReportType::Annual),
    (StatementKind::BalanceSheet, ReportType::Quarterly),
    (StatementKind::CashFlow, ReportType::Annual),
    (StatementKind::CashFlow, ReportType::Quarterly),
];

/// A date-indexed statement table: one row per period, one column per metric.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementTable {
    pub kind: StatementKind,
    pub report_type: ReportType,
    pub metrics: Vec<String>,
    pub rows: Vec<(String, Vec<Option<f64>>)>,
}

impl StatementTable {
    pub fn new(kind: StatementKind, report_type: ReportType, metrics: Vec<String>) -> Self {
        Self {
            kind,
            report_type,
            metrics,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, period_label: impl Into<String>, values: Vec<Option<f64>>) {
        self.rows.push((period_label.into(), values));
    }

    pub fn label(&self) -> String {
        format!("{} {}", self.report_type, self.kind)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Builds a table from text records whose first column is the period index and whose
    /// remaining columns are metrics, e.g. CSV with a header row.
    pub fn from_string_rows<H, R, S>(
        kind: StatementKind,
        report_type: ReportType,
        header: &[H],
        rows: R,
    ) -> Result<Self>
    where
        H: AsRef<str>,
        R: IntoIterator<Item = Vec<S>>,
        S: AsRef<str>,
    {
        let rows: Vec<Vec<S>> = rows.into_iter().collect();
        let Some((_, metric_headers)) = header.split_first() else {
            return Err(ReconciliationError::MissingDateIndex {
                table: format!("{} {}", report_type, kind),
                rows: rows.len(),
            });
        };

        let metrics = metric_headers
            .iter()
            .map(|h| h.as_ref().trim().to_string())
            .collect();
        let mut table = Self::new(kind, report_type, metrics);

        for (idx, record) in rows.iter().enumerate() {
            let Some((period_label, cells)) = record.split_first() else {
                return Err(ReconciliationError::MalformedRow {
                    table: table.label(),
                    row: idx,
                    expected: header.len(),
                    found: 0,
                });
            };
            table.push_row(
                period_label.as_ref().trim(),
                cells.iter().map(|c| parse_cell(c.as_ref())).collect(),
            );
        }

        Ok(table)
    }

    /// Builds a table from the metric-major layout statement endpoints usually return:
    /// the header holds period labels and each record is one metric across periods.
    pub fn from_metric_major_rows<H, R, S>(
        kind: StatementKind,
        report_type: ReportType,
        header: &[H],
        rows: R,
    ) -> Result<Self>
    where
        H: AsRef<str>,
        R: IntoIterator<Item = Vec<S>>,
        S: AsRef<str>,
    {
        let label = format!("{} {}", report_type, kind);
        let rows: Vec<Vec<S>> = rows.into_iter().collect();
        let periods: Vec<String> = header
            .iter()
            .skip(1)
            .map(|h| h.as_ref().trim().to_string())
            .collect();

        if periods.is_empty() && !rows.is_empty() {
            return Err(ReconciliationError::MissingDateIndex {
                table: label,
                rows: rows.len(),
            });
        }

        let mut metrics = Vec::with_capacity(rows.len());
        let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(rows.len()); periods.len()];

        for (idx, record) in rows.iter().enumerate() {
            if record.len() != periods.len() + 1 {
                return Err(ReconciliationError::MalformedRow {
                    table: label,
                    row: idx,
                    expected: periods.len() + 1,
                    found: record.len(),
                });
            }
            metrics.push(record[0].as_ref().trim().to_string());
            for (column, cell) in columns.iter_mut().zip(&record[1..]) {
                column.push(parse_cell(cell.as_ref()));
            }
        }

        let mut table = Self::new(kind, report_type, metrics);
        for (period, values) in periods.into_iter().zip(columns) {
            table.push_row(period, values);
        }
        Ok(table)
    }

    /// Converts each period row into a raw statement row for `ticker`.
    pub fn to_raw_rows(&self, ticker: &str) -> Result<Vec<RawStatementRow>> {
        let mut out = Vec::with_capacity(self.rows.len());

        for (idx, (period_label, values)) in self.rows.iter().enumerate() {
            if values.len() != self.metrics.len() {
                return Err(ReconciliationError::MalformedRow {
                    table: self.label(),
                    row: idx,
                    expected: self.metrics.len(),
                    found: values.len(),
                });
            }

            if period_label.is_empty() {
                return Err(ReconciliationError::MissingDateIndex {
                    table: self.label(),
                    rows: self.rows.len(),
                });
            }

            let period_end = parse_period_label(period_label)?;
            let metrics: MetricMap = self
                .metrics
                .iter()
                .cloned()
                .zip(values.iter().copied())
                .collect();

            out.push(RawStatementRow {
                ticker: ticker.to_string(),
                period_end,
                report_type: self.report_type,
                metrics,
            });
        }

        Ok(out)
    }
}

/// Blank and placeholder cells become `None`.
fn parse_cell(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    match cell {
        "" | "-" | "NaN" | "nan" | "None" | "null" => None,
        _ => match cell.parse::<f64>() {
            Ok(v) if v.is_finite() => Some(v),
            Ok(_) => None,
            Err(_) => {
                debug!("Treating unparseable statement cell '{}' as missing", cell);
                None
            }
        },
    }
}

/// The up-to-six tables one statement source returns for a ticker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementBundle {
    tables: Vec<StatementTable>,
}

impl StatementBundle {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_table(mut self, table: StatementTable) -> Self {
        self.insert(table);
        self
    }

    /// Replaces any table of the same kind and report type.
    pub fn insert(&mut self, table: StatementTable) {
        self.tables
            .retain(|t| !(t.kind == table.kind && t.report_type == table.report_type));
        self.tables.push(table);
    }

    pub fn get(&self, kind: StatementKind, report_type: ReportType) -> Option<&StatementTable> {
        self.tables
            .iter()
            .find(|t| t.kind == kind && t.report_type == report_type)
    }

    /// True when no table has any row.
    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(StatementTable::is_empty)
    }

    /// Tables in [`PROCESSING_ORDER`], skipping absent ones.
    pub fn ordered(&self) -> Vec<&StatementTable> {
        PROCESSING_ORDER
            .iter()
            .filter_map(|(kind, report_type)| self.get(*kind, *report_type))
            .collect()
    }

    pub fn to_raw_tables(&self, ticker: &str) -> Result<Vec<Vec<RawStatementRow>>> {
        self.ordered()
            .into_iter()
            .map(|table| table.to_raw_rows(ticker))
            .collect()
    }
}
