use super::period_model::{find_field, Measure, Period};
use crate::errors::{Error, Result};
use crate::utils::time_utils::{previous_day, shift_days, shift_months, shift_years};
use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::HashMap;

/// Caller supplied start dates for field codes outside the catalogue.
pub type ExtensionDates = HashMap<String, NaiveDate>;

impl Period {
    /// The comparison date this period implies for `date`.
    pub fn resolve(&self, date: NaiveDate) -> NaiveDate {
        match *self {
            Period::Days(days) => shift_days(date, -days),
            Period::Months(months) => shift_months(date, -months),
            Period::Years(years) => shift_years(date, -years),
            Period::WeekToDate => {
                let week_ago = shift_days(date, -7);
                let to_friday = (Weekday::Fri.num_days_from_monday() + 7
                    - week_ago.weekday().num_days_from_monday())
                    % 7;
                shift_days(week_ago, i64::from(to_friday))
            }
            Period::MonthToDate => previous_day(date.with_day(1).unwrap_or(date)),
            Period::QuarterToDate => {
                let quarter_month = (date.month0() / 3) * 3 + 1;
                previous_day(
                    NaiveDate::from_ymd_opt(date.year(), quarter_month, 1).unwrap_or(date),
                )
            }
            Period::YearToDate => {
                NaiveDate::from_ymd_opt(date.year() - 1, 12, 31).unwrap_or(NaiveDate::MIN)
            }
            Period::SinceInception => date,
            Period::Extension(start) => start,
        }
    }
}

/// Resolves the measure and period of a field code, consulting `extensions`
/// for codes outside the built-in catalogue.
pub fn resolve_field(code: &str, extensions: &ExtensionDates) -> Result<(Measure, Period)> {
    if let Some(field) = find_field(code) {
        return Ok((field.measure, field.period));
    }
    extensions
        .get(code)
        .or_else(|| {
            extensions
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(code))
                .map(|(_, v)| v)
        })
        .map(|start| (Measure::Return, Period::Extension(*start)))
        .ok_or_else(|| Error::UnknownField(code.to_string()))
}

/// Comparison start date needed to compute `code` on `date`.
///
/// With `compare` set, returns the earlier of the two dates so a caller can
/// fold the furthest lookback across many fields.
pub fn start_date(
    code: &str,
    date: NaiveDate,
    compare: Option<NaiveDate>,
    extensions: &ExtensionDates,
) -> Result<NaiveDate> {
    let (_, period) = resolve_field(code, extensions)?;
    let start = period.resolve(date);
    Ok(match compare {
        Some(other) => start.min(other),
        None => start,
    })
}
