use chrono::{Datelike, Duration, NaiveDate};
use tracing::instrument;

use crate::utils::time::{beginning_of_week, one_year_before, short_month_name};

use super::{
    history::ActivityHistory, streak::current_streak, CalendarCell, CalendarGrid,
    CalendarOptions, MonthLabel, Week,
};

/// Lays the history of a user out as full weeks covering one year back from `today`.
/// Nothing in `history` is modified, the same input always gives the same grid.
#[instrument(skip(history), fields(days = history.len()))]
pub fn project_calendar(
    history: &ActivityHistory,
    today: NaiveDate,
    options: CalendarOptions,
) -> CalendarGrid {
    let start = one_year_before(today);
    let first_day = beginning_of_week(start, options.week_start);

    let mut weeks = Vec::new();
    let mut week_start = first_day;
    while week_start <= today {
        let week: Week = std::array::from_fn(|offset| {
            classify(history, week_start + Duration::days(offset as i64), start, today)
        });
        weeks.push(week);
        week_start += Duration::days(7);
    }

    let month_labels = month_labels(&weeks);

    CalendarGrid {
        today,
        start,
        weeks,
        month_labels,
        streak: current_streak(history, today),
    }
}

fn classify(
    history: &ActivityHistory,
    date: NaiveDate,
    start: NaiveDate,
    today: NaiveDate,
) -> CalendarCell {
    if date > today {
        CalendarCell::Future { date }
    } else if date < start {
        CalendarCell::NoData { date }
    } else {
        CalendarCell::Day(history.day(date))
    }
}

/// Walks the cells in order and places a label wherever the month changes. Future cells are
/// ignored, so the tail of the last week never produces a label.
fn month_labels(weeks: &[Week]) -> Vec<MonthLabel> {
    let mut labels = Vec::new();
    let mut last_month = None;
    for (week_index, week) in weeks.iter().enumerate() {
        for cell in week {
            let date = match cell {
                CalendarCell::Future { .. } => continue,
                CalendarCell::NoData { date } => *date,
                CalendarCell::Day(summary) => summary.date,
            };
            if last_month != Some(date.month()) {
                last_month = Some(date.month());
                labels.push(MonthLabel {
                    name: short_month_name(date),
                    week_index,
                });
            }
        }
    }
    labels
}
