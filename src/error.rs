use crate::sources::SourceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconciliationError {
    #[error("Invalid fiscal year end month {0}: must be between 1 and 12")]
    InvalidFiscalYearEndMonth(u32),

    #[error("Statement table {table} has {rows} rows but no date index")]
    MissingDateIndex { table: String, rows: usize },

    #[error("Statement table {table}, row {row}: expected {expected} values, found {found}")]
    MalformedRow {
        table: String,
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Refusing to persist incomplete record {ticker} {report_period} ({report_type}): {details}")]
    IncompleteRecord {
        ticker: String,
        report_period: String,
        report_type: String,
        details: String,
    },

    #[error("Unsupported schema version {found} (this build understands up to {supported})")]
    UnsupportedSchemaVersion { found: u16, supported: u16 },

    #[error("Source failure for {ticker}: {source}")]
    SourceFailure {
        ticker: String,
        #[source]
        source: SourceError,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReconciliationError>;
