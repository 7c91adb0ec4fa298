use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::storage::entities::{DailyAggregateEntity, TagWeights};

use super::{streak::current_streak, ActivitySummary, DaySummary};

/// A user's daily summaries ordered by date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityHistory {
    days: BTreeMap<NaiveDate, DaySummary>,
}

impl ActivityHistory {
    /// Order of `aggregates` doesn't matter. If a date repeats the last aggregate wins.
    pub fn from_aggregates(aggregates: impl IntoIterator<Item = DailyAggregateEntity>) -> Self {
        Self {
            days: aggregates
                .into_iter()
                .map(|v| (v.date, DaySummary::from_aggregate(&v)))
                .collect(),
        }
    }

    pub fn get(&self, date: NaiveDate) -> Option<&DaySummary> {
        self.days.get(&date)
    }

    /// Summary of the day, an empty one when nothing was recorded.
    pub fn day(&self, date: NaiveDate) -> DaySummary {
        self.get(date)
            .cloned()
            .unwrap_or_else(|| DaySummary::empty(date))
    }

    /// Missing days weigh nothing.
    pub fn weight_on(&self, date: NaiveDate) -> i64 {
        self.get(date).map_or(0, |v| v.total_weight)
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DaySummary> {
        self.days.values()
    }

    /// Weight per tag summed over every recorded day.
    pub fn all_time(&self) -> TagWeights {
        let mut weights = TagWeights::new();
        for day in self.days.values() {
            for (tag, weight) in &day.tag_weights {
                *weights.entry(tag.clone()).or_insert(0) += weight;
            }
        }
        weights
    }

    pub fn summary(&self, today: NaiveDate) -> ActivitySummary {
        let all_time = self.all_time();
        ActivitySummary {
            today: self.day(today),
            all_time_total: all_time.values().sum(),
            all_time,
            streak: current_streak(self, today),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::storage::entities::{DailyAggregateEntity, TagWeights};

    use super::ActivityHistory;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn aggregate(date: NaiveDate, values: &[(&str, i64)]) -> DailyAggregateEntity {
        let mut aggregate = DailyAggregateEntity::empty("user".into(), date);
        aggregate.apply_delta(
            &values
                .iter()
                .map(|(k, v)| ((*k).into(), *v))
                .collect::<TagWeights>(),
        );
        aggregate
    }

    #[test]
    fn unordered_input_is_sorted() {
        let history = ActivityHistory::from_aggregates([
            aggregate(date(2024, 3, 1), &[("tag-money", 1)]),
            aggregate(date(2023, 5, 1), &[("tag-money", 2)]),
            aggregate(date(2024, 1, 1), &[("tag-money", 3)]),
        ]);
        let dates = history.iter().map(|v| v.date).collect::<Vec<_>>();
        assert_eq!(dates, vec![date(2023, 5, 1), date(2024, 1, 1), date(2024, 3, 1)]);
    }

    #[test]
    fn summary_sums_all_days() {
        let today = date(2024, 3, 1);
        let history = ActivityHistory::from_aggregates([
            aggregate(today, &[("tag-money", 1), ("tag-knowledge", 1)]),
            aggregate(date(2024, 2, 29), &[("tag-money", 2)]),
            aggregate(date(2023, 1, 1), &[("tag-branding", 4)]),
        ]);
        let summary = history.summary(today);

        assert_eq!(summary.today.total_weight, 2);
        assert_eq!(summary.all_time.get("tag-money"), Some(&3));
        assert_eq!(summary.all_time.get("tag-branding"), Some(&4));
        assert_eq!(summary.all_time_total, 8);
        assert_eq!(summary.streak, 2);
    }

    #[test]
    fn missing_today_is_empty_summary() {
        let today = date(2024, 3, 1);
        let history =
            ActivityHistory::from_aggregates([aggregate(date(2024, 2, 29), &[("tag-money", 2)])]);
        let summary = history.summary(today);
        assert_eq!(summary.today.date, today);
        assert_eq!(summary.today.total_weight, 0);
        assert!(summary.today.tag_weights.is_empty());
        assert_eq!(summary.streak, 0);
    }
}
