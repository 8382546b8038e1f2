use crate::aliases::FieldAliasTable;
use crate::error::{ReconciliationError, Result};
use crate::utils::validate_fiscal_year_end_month;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct AnnouncementConfig {
    #[schemars(description = "Smallest accepted gap in days between period end and a calendar announcement date (inclusive)")]
    pub min_offset_days: i64,

    #[schemars(description = "Largest accepted gap in days between period end and a calendar announcement date (inclusive)")]
    pub max_offset_days: i64,

    #[schemars(description = "Days after period end used as the estimated announcement date of an Annual report")]
    pub annual_estimate_days: u64,

    #[schemars(description = "Days after period end used as the estimated announcement date of a Quarterly report")]
    pub quarterly_estimate_days: u64,
}

impl Default for AnnouncementConfig {
    fn default() -> Self {
        Self {
            min_offset_days: 10,
            max_offset_days: 100,
            annual_estimate_days: 60,
            quarterly_estimate_days: 35,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct ShareResolutionConfig {
    #[schemars(description = "Canonical statement metric holding the share count")]
    pub primary_metric: String,

    #[schemars(description = "Second reporting convention for the same concept, tried after the primary metric")]
    pub secondary_metric: String,

    #[schemars(description = "How far before the announce date a share-history point may lie")]
    pub history_days_before: u64,

    #[schemars(description = "How far after the announce date a share-history point may lie")]
    pub history_days_after: u64,
}

impl Default for ShareResolutionConfig {
    fn default() -> Self {
        Self {
            primary_metric: "Ordinary Shares Number".to_string(),
            secondary_metric: "Share Issued".to_string(),
            history_days_before: 90,
            history_days_after: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct ReconcilerConfig {
    pub announcement: AnnouncementConfig,

    pub shares: ShareResolutionConfig,

    #[schemars(description = "Trading days are searched this many calendar days either side of the target date")]
    pub price_window_days: u64,

    #[schemars(
        description = "Fiscal year end month per ticker, used when the profile source does not report one"
    )]
    pub fiscal_year_end_defaults: BTreeMap<String, u32>,

    pub field_aliases: FieldAliasTable,

    #[schemars(description = "Label written to the data_source field of every record")]
    pub data_source: String,

    #[schemars(description = "Pause between tickers in a multi-ticker run, in milliseconds")]
    pub pause_between_tickers_ms: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        let fiscal_year_end_defaults = [("NVDA", 1), ("AAPL", 9), ("MSFT", 6)]
            .into_iter()
            .map(|(ticker, month)| (ticker.to_string(), month))
            .collect();

        Self {
            announcement: AnnouncementConfig::default(),
            shares: ShareResolutionConfig::default(),
            price_window_days: 10,
            fiscal_year_end_defaults,
            field_aliases: FieldAliasTable::default(),
            data_source: "yfinance".to_string(),
            pause_between_tickers_ms: 0,
        }
    }
}

impl ReconcilerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn fiscal_year_end_default(&self, ticker: &str) -> Option<u32> {
        self.fiscal_year_end_defaults.get(ticker).copied()
    }

    pub fn validate(&self) -> Result<()> {
        let window = &self.announcement;
        if window.min_offset_days < 0 || window.min_offset_days > window.max_offset_days {
            return Err(ReconciliationError::InvalidConfig(format!(
                "Announcement window [{}, {}] must be non-negative and ordered",
                window.min_offset_days, window.max_offset_days
            )));
        }

        if window.annual_estimate_days == 0 || window.quarterly_estimate_days == 0 {
            return Err(ReconciliationError::InvalidConfig(
                "Announcement estimate offsets must be positive".to_string(),
            ));
        }

        if self.shares.primary_metric.trim().is_empty() {
            return Err(ReconciliationError::InvalidConfig(
                "Primary share metric name must not be empty".to_string(),
            ));
        }

        for month in self.fiscal_year_end_defaults.values() {
            validate_fiscal_year_end_month(*month)?;
        }

        self.field_aliases.validate()
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = schemars::schema_for!(ReconcilerConfig);
        serde_json::to_string_pretty(&schema)
    }
}
