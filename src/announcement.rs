use crate::config::AnnouncementConfig;
use crate::schema::{AnnounceDateSource, ReportType};
use crate::utils::{add_days, clamp_to_today, days_between};
use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAnnouncement {
    pub date: NaiveDate,
    pub source: AnnounceDateSource,
    pub clamped: bool,
}

/// Maps a report's period end to the day it was made public.
#[derive(Debug, Clone)]
pub struct AnnouncementDateResolver {
    config: AnnouncementConfig,
    today: NaiveDate,
}

impl AnnouncementDateResolver {
    pub fn new(config: AnnouncementConfig, today: NaiveDate) -> Self {
        Self { config, today }
    }

    /// Match against known dates first, estimate second, clamp to today last.
    pub fn resolve(
        &self,
        period_end: NaiveDate,
        report_type: ReportType,
        known_dates: &[NaiveDate],
    ) -> ResolvedAnnouncement {
        let (date, source) = match self.best_match(period_end, known_dates) {
            Some(date) => (date, AnnounceDateSource::Matched),
            None => (
                add_days(period_end, self.estimate_offset(report_type)),
                AnnounceDateSource::Estimated,
            ),
        };

        let clamped_date = clamp_to_today(date, self.today);

        ResolvedAnnouncement {
            date: clamped_date,
            source,
            clamped: clamped_date != date,
        }
    }

    /// The known date with the smallest offset inside the inclusive window.
    fn best_match(&self, period_end: NaiveDate, known_dates: &[NaiveDate]) -> Option<NaiveDate> {
        let window = self.config.min_offset_days..=self.config.max_offset_days;
        known_dates
            .iter()
            .copied()
            .filter(|d| window.contains(&days_between(period_end, *d)))
            .min_by_key(|d| days_between(period_end, *d))
    }

    fn estimate_offset(&self, report_type: ReportType) -> u64 {
        match report_type {
            ReportType::Annual => self.config.annual_estimate_days,
            ReportType::Quarterly => self.config.quarterly_estimate_days,
        }
    }
}
