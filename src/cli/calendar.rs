use std::fmt::{Display, Write};

use anyhow::Result;
use chrono::{Local, NaiveDate, Weekday};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};

use crate::{
    calendar::{ActivitySummary, CalendarCell, CalendarGrid, CalendarOptions, HeatLevel},
    engine::AggregationEngine,
    storage::aggregate_storage::AggregateStorage,
    tags::TagRegistry,
    utils::{
        clock::{Clock, DefaultClock},
        percentage::share_percentage,
    },
};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WeekStart {
    Sunday,
    Monday,
}

impl From<WeekStart> for Weekday {
    fn from(value: WeekStart) -> Self {
        match value {
            WeekStart::Sunday => Weekday::Sun,
            WeekStart::Monday => Weekday::Mon,
        }
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct ReferenceDay {
    #[arg(
        long,
        help = "Day to show the data for instead of today. Examples are \"yesterday\", \"15/03/2025\", \"last friday\""
    )]
    today: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
}

impl ReferenceDay {
    fn resolve(&self) -> Result<NaiveDate> {
        let Some(today) = &self.today else {
            return Ok(DefaultClock.today());
        };
        match parse_date_string(today, Local::now(), self.date_style.into()) {
            Ok(v) => Ok(v.with_timezone(&Local).date_naive()),
            Err(e) => Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate date {e}"),
                )
                .into()),
        }
    }
}

#[derive(Debug, Parser)]
pub struct CalendarCommand {
    #[arg(long)]
    user: String,
    #[command(flatten)]
    day: ReferenceDay,
    #[arg(long, value_enum, default_value_t = WeekStart::Sunday, help = "First day of every row")]
    week_start: WeekStart,
    #[arg(long, help = "Print the whole grid as JSON")]
    json: bool,
}

#[derive(Debug, Parser)]
pub struct SummaryCommand {
    #[arg(long)]
    user: String,
    #[command(flatten)]
    day: ReferenceDay,
    #[arg(long, help = "Print the summary as JSON")]
    json: bool,
}

pub async fn process_calendar_command<S: AggregateStorage + Sync>(
    CalendarCommand {
        user,
        day,
        week_start,
        json,
    }: CalendarCommand,
    engine: &AggregationEngine<S>,
) -> Result<()> {
    let today = day.resolve()?;
    let grid = engine
        .get_calendar_grid(
            &user,
            today,
            CalendarOptions {
                week_start: week_start.into(),
            },
        )
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&grid)?);
    } else {
        print!("{}", render_grid(&grid));
    }
    Ok(())
}

pub async fn process_summary_command<S: AggregateStorage + Sync>(
    SummaryCommand { user, day, json }: SummaryCommand,
    engine: &AggregationEngine<S>,
) -> Result<()> {
    let today = day.resolve()?;
    let summary = engine.get_summary(&user, today).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", render_summary(&summary, engine.registry()));
    }
    Ok(())
}

fn heat_symbol(cell: &CalendarCell) -> char {
    let Some(day) = cell.summary() else {
        return ' ';
    };
    match day.heat_level() {
        HeatLevel::None => '.',
        HeatLevel::Low => '1',
        HeatLevel::Medium => '2',
        HeatLevel::High => '3',
        HeatLevel::Max => '4',
    }
}

/// One line per week, first date of the week followed by a heat symbol per day.
fn render_grid(grid: &CalendarGrid) -> String {
    let mut out = String::new();
    // Writing into a String can't fail.
    let _ = writeln!(out, "{} - {}\tstreak {}", grid.start, grid.today, grid.streak);

    for (week_index, week) in grid.weeks.iter().enumerate() {
        let labels = grid
            .month_labels
            .iter()
            .filter(|v| v.week_index == week_index)
            .map(|v| v.name.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let days = week.iter().map(heat_symbol).collect::<String>();
        let _ = writeln!(out, "{}\t{days}\t{labels}", week[0].date());
    }
    out
}

fn render_summary(summary: &ActivitySummary, registry: &TagRegistry) -> String {
    let mut out = String::new();
    let name = |id: &str| registry.get(id).map(|v| v.name.clone()).unwrap_or(id.into());

    let _ = writeln!(
        out,
        "{}\t{} xp\tstreak {}",
        summary.today.date, summary.today.total_weight, summary.streak
    );
    for (tag, weight) in &summary.today.tag_weights {
        let _ = writeln!(
            out,
            "\t{}\t{weight}\t{}%",
            name(tag.as_ref()),
            *summary.today.tag_share(tag) as i32
        );
    }
    let _ = writeln!(out, "all time\t{} xp", summary.all_time_total);
    for (tag, weight) in &summary.all_time {
        let _ = writeln!(
            out,
            "\t{}\t{weight}\t{}%",
            name(tag.as_ref()),
            *share_percentage(*weight, summary.all_time_total) as i32
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::NaiveDate;

    use crate::{
        calendar::{grid::project_calendar, history::ActivityHistory, CalendarOptions},
        engine::{AggregationEngine, Sign},
        storage::{
            entities::{DailyAggregateEntity, TagId, TagWeights},
            memory::MemoryStorage,
        },
        tags::TagRegistry,
    };

    use super::{render_grid, render_summary, DateStyle, ReferenceDay};

    const TODAY: NaiveDate = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

    fn aggregate(date: NaiveDate, weight: i64) -> DailyAggregateEntity {
        let mut aggregate = DailyAggregateEntity::empty("user".into(), date);
        aggregate.apply_delta(
            &[(TagId::from("tag-money"), weight)]
                .into_iter()
                .collect::<TagWeights>(),
        );
        aggregate
    }

    #[test]
    fn grid_text() {
        let history = ActivityHistory::from_aggregates([
            aggregate(TODAY, 4),
            aggregate(TODAY.pred_opt().unwrap(), 1),
        ]);
        let grid = project_calendar(&history, TODAY, CalendarOptions::default());
        let text = render_grid(&grid);
        let lines = text.lines().collect::<Vec<_>>();

        assert_eq!(lines.len(), grid.weeks.len() + 1);
        assert_eq!(lines[0], "2023-03-01 - 2024-03-01\tstreak 2");
        assert_eq!(lines[1], "2023-02-26\t   ....\tFeb Mar");
        // Thursday the 29th is low, Friday the 1st is medium, Saturday is in the future.
        assert_eq!(*lines.last().unwrap(), "2024-02-25\t....12 \tMar");
    }

    #[tokio::test]
    async fn summary_text() -> Result<()> {
        let engine = AggregationEngine::new(MemoryStorage::new(), TagRegistry::default());
        let weights = [(TagId::from("tag-money"), 3), (TagId::from("tag-knowledge"), 1)]
            .into_iter()
            .collect::<TagWeights>();
        engine
            .apply_weights("user", &weights, Sign::Increment, TODAY)
            .await?;

        let summary = engine.get_summary("user", TODAY).await?;
        let text = render_summary(&summary, engine.registry());
        assert!(text.starts_with("2024-03-01\t4 xp\tstreak 1\n"));
        assert!(text.contains("\tmoney\t3\t75%\n"));
        assert!(text.contains("\tknowledge\t1\t25%\n"));
        assert!(text.contains("all time\t4 xp\n"));
        Ok(())
    }

    #[test]
    fn reference_day_parsing() -> Result<()> {
        let day = ReferenceDay {
            today: Some("15/03/2025".into()),
            date_style: DateStyle::Uk,
        };
        assert_eq!(day.resolve()?, NaiveDate::from_ymd_opt(2025, 3, 15).unwrap());

        let day = ReferenceDay {
            today: Some("03/15/2025".into()),
            date_style: DateStyle::Us,
        };
        assert_eq!(day.resolve()?, NaiveDate::from_ymd_opt(2025, 3, 15).unwrap());

        let day = ReferenceDay {
            today: Some("not a date at all".into()),
            date_style: DateStyle::Uk,
        };
        assert!(day.resolve().is_err());
        Ok(())
    }
}
