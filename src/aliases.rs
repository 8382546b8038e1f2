use crate::error::{ReconciliationError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maps metric names as spelled by an upstream source to the canonical names used in
/// merged records. Names without an entry are already canonical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct FieldAliasTable {
    #[schemars(description = "Upstream metric name -> canonical metric name")]
    aliases: BTreeMap<String, String>,
}

impl FieldAliasTable {
    pub fn empty() -> Self {
        Self {
            aliases: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>, canonical: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), canonical.into());
        self
    }

    pub fn canonical<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Aliases must resolve in one hop: a canonical name may not itself be an alias.
    pub fn validate(&self) -> Result<()> {
        for (alias, canonical) in &self.aliases {
            if alias == canonical {
                continue;
            }
            if self.aliases.contains_key(canonical) {
                return Err(ReconciliationError::InvalidConfig(format!(
                    "Field alias '{}' points at '{}', which is itself an alias",
                    alias, canonical
                )));
            }
        }
        Ok(())
    }
}

impl Default for FieldAliasTable {
    /// CamelCase keys emitted by the raw statement endpoints, mapped onto the
    /// display names the spreadsheet-style tables use.
    fn default() -> Self {
        [
            ("OrdinarySharesNumber", "Ordinary Shares Number"),
            ("ShareIssued", "Share Issued"),
            ("TotalRevenue", "Total Revenue"),
            ("GrossProfit", "Gross Profit"),
            ("OperatingIncome", "Operating Income"),
            ("NetIncome", "Net Income"),
            ("BasicEPS", "Basic EPS"),
            ("DilutedEPS", "Diluted EPS"),
            ("TotalAssets", "Total Assets"),
            ("StockholdersEquity", "Stockholders Equity"),
            ("OperatingCashFlow", "Operating Cash Flow"),
            ("FreeCashFlow", "Free Cash Flow"),
            ("CapitalExpenditure", "Capital Expenditure"),
        ]
        .into_iter()
        .fold(Self::empty(), |table, (alias, canonical)| {
            table.with_alias(alias, canonical)
        })
    }
}
