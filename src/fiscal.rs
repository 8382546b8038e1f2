use crate::config::ReconcilerConfig;
use crate::schema::{CompanyFiscalProfile, FiscalPeriod, FiscalQuarter, FiscalSource, ReportType};
use chrono::{Datelike, NaiveDate};
use log::{debug, warn};

pub const CALENDAR_YEAR_END_MONTH: u32 = 12;

/// Converts natural calendar dates into a company's fiscal year and quarter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiscalCalendarCalculator {
    fiscal_year_end_month: u32,
    source: FiscalSource,
}

impl FiscalCalendarCalculator {
    /// An unknown or out-of-range month degrades to calendar quarters instead of failing.
    pub fn new(fiscal_year_end_month: Option<u32>, source: FiscalSource) -> Self {
        match fiscal_year_end_month {
            Some(month) if (1..=12).contains(&month) => Self {
                fiscal_year_end_month: month,
                source,
            },
            Some(month) => {
                warn!(
                    "Ignoring fiscal year end month {} (outside 1-12), using calendar quarters",
                    month
                );
                Self::calendar()
            }
            None => Self::calendar(),
        }
    }

    pub fn calendar() -> Self {
        Self {
            fiscal_year_end_month: CALENDAR_YEAR_END_MONTH,
            source: FiscalSource::CalendarDefault,
        }
    }

    /// Picks the fiscal year end for a ticker: profile source first, then the configured
    /// static default, then December.
    pub fn for_ticker(
        ticker: &str,
        profile: Option<&CompanyFiscalProfile>,
        config: &ReconcilerConfig,
    ) -> Self {
        let from_profile = profile
            .and_then(|p| p.fiscal_year_end_month)
            .filter(|m| (1..=12).contains(m));

        let calculator = if let Some(month) = from_profile {
            Self::new(Some(month), FiscalSource::Profile)
        } else if let Some(month) = config.fiscal_year_end_default(ticker) {
            Self::new(Some(month), FiscalSource::StaticDefault)
        } else {
            Self::calendar()
        };

        debug!(
            "{}: fiscal year ends in month {} ({:?})",
            ticker, calculator.fiscal_year_end_month, calculator.source
        );
        calculator
    }

    pub fn fiscal_year_end_month(&self) -> u32 {
        self.fiscal_year_end_month
    }

    pub fn source(&self) -> FiscalSource {
        self.source
    }

    pub fn compute(&self, period_end: NaiveDate) -> FiscalPeriod {
        compute_fiscal_period(period_end, self.fiscal_year_end_month)
    }

    /// Like [`compute`](Self::compute), but Annual reports are always labelled `FY`.
    pub fn classify(&self, period_end: NaiveDate, report_type: ReportType) -> FiscalPeriod {
        let mut period = self.compute(period_end);
        if report_type == ReportType::Annual {
            period.fiscal_quarter = FiscalQuarter::FY;
        }
        period
    }
}

/// Fiscal year and quarter of `period_end` for a fiscal year ending in `fiscal_year_end_month`.
///
/// A month after the year-end month belongs to the next fiscal year. The year-end month
/// itself is the twelfth month of its fiscal year, so it always lands in Q4.
///
/// # Examples
/// - FY ends Jan (1): 2025-10-31 -> FY2026 Q3
/// - FY ends Sept (9): 2023-09-30 -> FY2023 Q4
/// - FY ends Dec (12): calendar quarters
pub fn compute_fiscal_period(period_end: NaiveDate, fiscal_year_end_month: u32) -> FiscalPeriod {
    let fy_end = if (1..=12).contains(&fiscal_year_end_month) {
        fiscal_year_end_month
    } else {
        CALENDAR_YEAR_END_MONTH
    };

    let month = period_end.month();
    let mut fiscal_year = period_end.year();
    if month > fy_end {
        fiscal_year += 1;
    }

    let mut months_offset = (month + 12 - fy_end) % 12;
    if months_offset == 0 {
        months_offset = 12;
    }

    let quarter_number = (months_offset - 1) / 3 + 1;
    // months_offset is in 1..=12, so quarter_number is in 1..=4
    let fiscal_quarter = FiscalQuarter::from_number(quarter_number).unwrap_or(FiscalQuarter::Q4);

    FiscalPeriod {
        fiscal_year,
        fiscal_quarter,
    }
}
