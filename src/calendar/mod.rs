//! Projection of a user's daily aggregates onto a one year calendar grid.
//!
//! The grid is week-major: every row holds 7 days starting at the configured weekday, and
//! rows run from the week containing the day one year before "today" up to the week
//! containing "today".

pub mod grid;
pub mod history;
pub mod streak;

use chrono::{NaiveDate, Weekday};
use serde::Serialize;
use tracing::warn;

use crate::{
    storage::entities::{DailyAggregateEntity, TagWeights},
    utils::percentage::{share_percentage, Percentage},
};

/// Activity of one day as shown to presentation code. Values are never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub total_weight: i64,
    pub tag_weights: TagWeights,
}

impl DaySummary {
    /// A day without any recorded activity.
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_weight: 0,
            tag_weights: TagWeights::new(),
        }
    }

    /// Negative values can only come from a broken store. They are reported and shown as zero.
    pub fn from_aggregate(aggregate: &DailyAggregateEntity) -> Self {
        if !aggregate.is_consistent() {
            warn!(
                "Aggregate of {} on {} is inconsistent, total {} breakdown {:?}",
                aggregate.user_id, aggregate.date, aggregate.total_weight, aggregate.tag_weights
            );
        }
        let tag_weights = aggregate
            .tag_weights
            .iter()
            .map(|(tag, weight)| (tag.clone(), (*weight).max(0)))
            .collect::<TagWeights>();
        Self {
            date: aggregate.date,
            total_weight: tag_weights.values().sum(),
            tag_weights,
        }
    }

    pub fn heat_level(&self) -> HeatLevel {
        HeatLevel::from_weight(self.total_weight)
    }

    /// Part of the day's total a single tag is responsible for.
    pub fn tag_share(&self, tag: &str) -> Percentage {
        share_percentage(
            self.tag_weights.get(tag).copied().unwrap_or(0),
            self.total_weight,
        )
    }
}

/// Coarse intensity bucket of a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatLevel {
    None,
    Low,
    Medium,
    High,
    Max,
}

impl HeatLevel {
    pub fn from_weight(weight: i64) -> Self {
        match weight {
            i64::MIN..=0 => HeatLevel::None,
            1..=2 => HeatLevel::Low,
            3..=5 => HeatLevel::Medium,
            6..=8 => HeatLevel::High,
            _ => HeatLevel::Max,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalendarCell {
    /// Before the tracked one year window.
    NoData { date: NaiveDate },
    /// After today.
    Future { date: NaiveDate },
    /// Inside the window. Days without activity carry an empty summary.
    Day(DaySummary),
}

impl CalendarCell {
    pub fn date(&self) -> NaiveDate {
        match self {
            CalendarCell::NoData { date } | CalendarCell::Future { date } => *date,
            CalendarCell::Day(summary) => summary.date,
        }
    }

    pub fn summary(&self) -> Option<&DaySummary> {
        match self {
            CalendarCell::Day(summary) => Some(summary),
            CalendarCell::NoData { .. } | CalendarCell::Future { .. } => None,
        }
    }
}

/// A grid row.
pub type Week = [CalendarCell; 7];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthLabel {
    /// Short month name, e.g. "Mar".
    pub name: String,
    pub week_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarOptions {
    pub week_start: Weekday,
}

impl Default for CalendarOptions {
    fn default() -> Self {
        Self {
            week_start: Weekday::Sun,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarGrid {
    pub today: NaiveDate,
    /// First day inside the window.
    pub start: NaiveDate,
    pub weeks: Vec<Week>,
    pub month_labels: Vec<MonthLabel>,
    pub streak: u32,
}

/// Dashboard numbers for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivitySummary {
    pub today: DaySummary,
    pub all_time: TagWeights,
    pub all_time_total: i64,
    pub streak: u32,
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::storage::entities::{DailyAggregateEntity, TagWeights};

    use super::{DaySummary, HeatLevel};

    const TEST_DATE: NaiveDate = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

    #[test]
    fn heat_levels() {
        let table = [
            (0, HeatLevel::None),
            (-3, HeatLevel::None),
            (1, HeatLevel::Low),
            (2, HeatLevel::Low),
            (3, HeatLevel::Medium),
            (5, HeatLevel::Medium),
            (6, HeatLevel::High),
            (8, HeatLevel::High),
            (9, HeatLevel::Max),
            (100, HeatLevel::Max),
        ];
        for (weight, level) in table {
            assert_eq!(HeatLevel::from_weight(weight), level, "weight {weight}");
        }
    }

    #[test]
    fn negative_values_are_not_shown() {
        let aggregate = DailyAggregateEntity {
            user_id: "user".into(),
            date: TEST_DATE,
            total_weight: -1,
            tag_weights: [("tag-money".into(), -2), ("tag-knowledge".into(), 1)]
                .into_iter()
                .collect::<TagWeights>(),
            revision: 3,
        };
        let summary = DaySummary::from_aggregate(&aggregate);
        assert_eq!(summary.total_weight, 1);
        assert_eq!(summary.tag_weights.get("tag-money"), Some(&0));
    }

    #[test]
    fn tag_share() {
        let mut aggregate = DailyAggregateEntity::empty("user".into(), TEST_DATE);
        aggregate.apply_delta(
            &[("tag-money".into(), 3), ("tag-knowledge".into(), 1)]
                .into_iter()
                .collect::<TagWeights>(),
        );
        let summary = DaySummary::from_aggregate(&aggregate);
        assert_eq!(*summary.tag_share("tag-money"), 75.);
        assert_eq!(*summary.tag_share("tag-branding"), 0.);
        assert_eq!(*DaySummary::empty(TEST_DATE).tag_share("tag-money"), 0.);
    }
}
