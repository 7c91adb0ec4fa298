use chrono::{Datelike, NaiveDate, Weekday};

/// This is the standard way of converting a date to a string in streakboard. Aggregates are
/// keyed by it, so it must stay sortable.
pub fn date_to_record_name(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn record_name_to_date(name: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(name, "%Y-%m-%d").ok()
}

/// The same calendar day one year earlier. 29th of February has no such day and rolls over to
/// the 1st of March, so the window never reaches back into February.
pub fn one_year_before(date: NaiveDate) -> NaiveDate {
    let year = date.year() - 1;
    NaiveDate::from_ymd_opt(year, date.month(), date.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, 3, 1))
        .expect("Dates a year before any supported date always exist")
}

/// Returns the first day of the week containing `date`, where weeks start on `week_start`.
pub fn beginning_of_week(date: NaiveDate, week_start: Weekday) -> NaiveDate {
    date.week(week_start).first_day()
}

/// Short English month name of the date, e.g. "Mar".
pub fn short_month_name(date: NaiveDate) -> String {
    date.format("%b").to_string()
}
