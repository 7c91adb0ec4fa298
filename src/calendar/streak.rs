use chrono::NaiveDate;

use super::history::ActivityHistory;

/// Number of consecutive days ending today with a strictly positive weight. Today itself
/// counts, so a day without activity today means no streak, even if yesterday was active.
pub fn current_streak(history: &ActivityHistory, today: NaiveDate) -> u32 {
    let mut streak = 0;
    let mut day = today;
    while history.weight_on(day) > 0 {
        streak += 1;
        match day.pred_opt() {
            Some(previous) => day = previous,
            None => break,
        }
    }
    streak
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};

    use crate::{
        calendar::history::ActivityHistory,
        storage::entities::{DailyAggregateEntity, TagWeights},
    };

    use super::current_streak;

    const TODAY: NaiveDate = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

    /// Weights for today, yesterday, and so on. `None` means no aggregate was stored.
    fn history(weights: &[Option<i64>]) -> ActivityHistory {
        ActivityHistory::from_aggregates(weights.iter().enumerate().filter_map(
            |(days_back, weight)| {
                let weight = (*weight)?;
                let mut aggregate = DailyAggregateEntity::empty(
                    "user".into(),
                    TODAY - Duration::days(days_back as i64),
                );
                aggregate.apply_delta(
                    &[("tag-money".into(), weight)]
                        .into_iter()
                        .collect::<TagWeights>(),
                );
                Some(aggregate)
            },
        ))
    }

    #[test]
    fn streak_table() {
        let table: &[(&str, &[Option<i64>], u32)] = &[
            ("nothing recorded", &[], 0),
            ("only today", &[Some(1)], 1),
            ("five days including today", &[Some(1), Some(2), Some(1), Some(3), Some(1)], 5),
            ("active yesterday, no row today", &[None, Some(4), Some(4)], 0),
            ("active yesterday, empty row today", &[Some(0), Some(4), Some(4)], 0),
            ("gap in the middle", &[Some(1), Some(1), None, Some(1)], 2),
            ("zero row breaks", &[Some(1), Some(0), Some(1)], 1),
            ("deleted back to zero", &[Some(2), Some(0)], 1),
        ];
        for (name, weights, expected) in table {
            assert_eq!(
                current_streak(&history(weights), TODAY),
                *expected,
                "{name}"
            );
        }
    }

    #[test]
    fn streak_crosses_month_and_leap_day() {
        let weights = vec![Some(1); 40];
        assert_eq!(current_streak(&history(&weights), TODAY), 40);
    }
}
