use chrono::{Datelike, Months, NaiveDate};
use log::warn;
use rust_decimal::prelude::*;

pub fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}

/// Moves a date by whole months, clamping the day to the end of the target month.
pub fn shift_months(date: NaiveDate, months: i32) -> NaiveDate {
    let shifted = if months >= 0 {
        date.checked_add_months(Months::new(months.unsigned_abs()))
    } else {
        date.checked_sub_months(Months::new(months.unsigned_abs()))
    };
    shifted.unwrap_or(if months >= 0 {
        NaiveDate::MAX
    } else {
        NaiveDate::MIN
    })
}

pub fn shift_years(date: NaiveDate, years: i32) -> NaiveDate {
    shift_months(date, years.saturating_mul(12))
}

pub fn shift_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(chrono::Duration::days(days))
        .unwrap_or(if days >= 0 {
            NaiveDate::MAX
        } else {
            NaiveDate::MIN
        })
}

pub fn previous_day(date: NaiveDate) -> NaiveDate {
    date.pred_opt().unwrap_or(NaiveDate::MIN)
}

pub fn next_day(date: NaiveDate) -> NaiveDate {
    date.succ_opt().unwrap_or(NaiveDate::MAX)
}

fn start_of_year(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Splits the span between two dates into whole years, days falling in
/// regular years and days falling in leap years.
///
/// A Feb-28 to Feb-29 span ending a whole number of years counts as whole years.
pub fn date_diffs(d1: NaiveDate, d2: NaiveDate) -> (i64, i64, i64) {
    if d2 <= d1 {
        return (0, 0, 0);
    }

    let mut months = (d2.year() - d1.year()) * 12 + d2.month() as i32 - d1.month() as i32;
    if shift_months(d1, months) > d2 {
        months -= 1;
    }
    let years = i64::from(months / 12);
    let days = (d2 - shift_months(d1, months)).num_days();

    if months % 12 == 0 && days <= 1 {
        if days == 0 {
            return (years, 0, 0);
        }
        if is_leap_year(d2.year())
            && (d1.month(), d1.day()) == (2, 28)
            && (d2.month(), d2.day()) == (2, 29)
        {
            return (years, 0, 0);
        }
    }

    let start = shift_months(d1, months - months % 12);
    let total = (d2 - start).num_days();

    if is_leap_year(d2.year()) {
        if start.year() == d2.year() {
            (years, 0, total)
        } else {
            let leap_days = (d2 - start_of_year(d2.year())).num_days() + 1;
            (years, total - leap_days, leap_days)
        }
    } else if is_leap_year(start.year()) {
        let regular_days = (d2 - start_of_year(d2.year())).num_days() + 1;
        (years, regular_days, total - regular_days)
    } else {
        (years, total, 0)
    }
}

/// Elapsed time between two dates in (fractional) years.
pub fn years_between(start: NaiveDate, end: NaiveDate) -> Decimal {
    let (years, regular_days, leap_days) = date_diffs(start, end);
    Decimal::from(years)
        + Decimal::from(regular_days) / Decimal::from(365)
        + Decimal::from(leap_days) / Decimal::from(366)
}

/// Converts a cumulative return over `[start, end]` into an annual rate.
pub fn annualise(start: NaiveDate, end: NaiveDate, cumulative_return: Decimal) -> Decimal {
    if (end - start).num_days() < 1 || cumulative_return.is_zero() {
        return Decimal::ZERO;
    }

    let base = Decimal::ONE + cumulative_return;
    if base <= Decimal::ZERO {
        warn!(
            "Cumulative return {} from {} to {} is a total loss, capping at -100%",
            cumulative_return, start, end
        );
        return -Decimal::ONE;
    }

    let years = years_between(start, end);
    if years.is_zero() {
        return Decimal::ZERO;
    }

    match base.checked_powd(Decimal::ONE / years) {
        Some(value) => value - Decimal::ONE,
        None => {
            warn!(
                "Annualising {} over {} years overflowed, returning the raw return",
                cumulative_return, years
            );
            cumulative_return
        }
    }
}

/// Divides, returning `default` when the denominator is zero.
pub fn safe_divide(numerator: Decimal, denominator: Decimal, default: Decimal) -> Decimal {
    if denominator.is_zero() {
        default
    } else {
        numerator.checked_div(denominator).unwrap_or(default)
    }
}
