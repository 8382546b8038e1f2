use crate::utils::{add_days, sub_days};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::ops::Bound;

/// A sparse, date-ordered series with nearest-point lookup.
///
/// Used for share-count history and daily closing prices alike.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SparseSeries<T> {
    points: BTreeMap<NaiveDate, T>,
}

/// Search window around a target date, in calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupWindow {
    pub days_before: u64,
    pub days_after: u64,
}

impl LookupWindow {
    pub const fn new(days_before: u64, days_after: u64) -> Self {
        Self {
            days_before,
            days_after,
        }
    }

    pub const fn symmetric(days: u64) -> Self {
        Self::new(days, days)
    }

    pub fn bounds(&self, target: NaiveDate) -> (NaiveDate, NaiveDate) {
        (
            sub_days(target, self.days_before),
            add_days(target, self.days_after),
        )
    }
}

impl<T> SparseSeries<T> {
    pub fn new() -> Self {
        Self {
            points: BTreeMap::new(),
        }
    }

    /// Later duplicates of the same date replace earlier ones.
    pub fn insert(&mut self, date: NaiveDate, value: T) {
        self.points.insert(date, value);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.keys().next_back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &T)> {
        self.points.iter()
    }

    /// The point closest to `target`; equal distances go to the earlier point.
    pub fn nearest(&self, target: NaiveDate) -> Option<(NaiveDate, &T)> {
        let before = self
            .points
            .range((Bound::Unbounded, Bound::Included(target)))
            .next_back();
        let after = self
            .points
            .range((Bound::Excluded(target), Bound::Unbounded))
            .next();

        match (before, after) {
            (Some((bd, bv)), Some((ad, av))) => {
                if (target - *bd) <= (*ad - target) {
                    Some((*bd, bv))
                } else {
                    Some((*ad, av))
                }
            }
            (Some((d, v)), None) | (None, Some((d, v))) => Some((*d, v)),
            (None, None) => None,
        }
    }

    /// Nearest point among those inside `window` around `target`.
    pub fn nearest_within(&self, target: NaiveDate, window: LookupWindow) -> Option<(NaiveDate, &T)> {
        let (start, end) = window.bounds(target);
        self.nearest(target)
            .filter(|(date, _)| *date >= start && *date <= end)
            .or_else(|| {
                // The overall nearest point can sit outside an asymmetric window while a
                // farther point on the other side is still inside it.
                self.points
                    .range(start..=end)
                    .min_by_key(|(date, _)| ((**date - target).num_days().abs(), **date))
                    .map(|(date, value)| (*date, value))
            })
    }
}

impl<T> FromIterator<(NaiveDate, T)> for SparseSeries<T> {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, T)>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}
