//! Date column parsing.
//!
//! Three strategies are tried in order, and the first that accepts every
//! value wins:
//!
//! 1. **Strict day-first.** One format, ISO or day-first, must parse all
//!    values. `01/02/2024` is 1 February.
//! 2. **Mixed.** Each value is parsed on its own, trying day-first formats,
//!    then month-first formats, then date-time forms. Handles files that
//!    switch format part way through.
//! 3. **Inferred.** A single representation is inferred from the first
//!    value (month-first, compact `20240105`, ISO week `2024-W01`, year-month
//!    `2024-01`, or a spreadsheet serial day number) and must parse all.

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::error::AdapterError;

/// Two-digit-year forms come first: `%Y` accepts `24` as the year 24, so
/// `01-02-24` would otherwise parse as ISO.
const DAY_FIRST: &[&str] = &[
    "%d/%m/%y",
    "%d-%m-%y",
    "%d.%m.%y",
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%d-%b-%Y",
];

const MONTH_FIRST: &[&str] = &[
    "%m/%d/%y",
    "%m/%d/%Y",
    "%m-%d-%y",
    "%m-%d-%Y",
    "%b %d %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%B %d, %Y",
];

const DATE_TIME: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Day numbers accepted as spreadsheet serial dates (1954 to 2119).
const SERIAL_RANGE: std::ops::RangeInclusive<u64> = 20_000..=80_000;

/// Which strategy parsed a date column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStrategy {
    StrictDayFirst,
    Mixed,
    Inferred,
}

/// Parses every value of a date column.
///
/// Returns one date per input value, in input order. Fails with a
/// configuration error on `date_column` if no strategy parses all values.
pub fn parse_dates(values: &[&str]) -> Result<Vec<NaiveDate>, AdapterError> {
    parse_dates_with_strategy(values).map(|(dates, _)| dates)
}

/// Like [`parse_dates`], also reporting which strategy succeeded.
pub fn parse_dates_with_strategy(
    values: &[&str],
) -> Result<(Vec<NaiveDate>, DateStrategy), AdapterError> {
    if values.is_empty() {
        return Err(AdapterError::configuration(
            "date_column",
            "the date column has no values",
        ));
    }

    let parsed = strict_day_first(values)
        .map(|d| (d, DateStrategy::StrictDayFirst))
        .or_else(|| mixed(values).map(|d| (d, DateStrategy::Mixed)))
        .or_else(|| inferred(values).map(|d| (d, DateStrategy::Inferred)));

    match parsed {
        Some((dates, strategy)) => {
            debug!(?strategy, values = values.len(), "dates.parsed");
            Ok((dates, strategy))
        }
        None => {
            let (row, value) = values
                .iter()
                .enumerate()
                .find(|(_, v)| parse_any(v).is_none() && parse_inferred_any(v).is_none())
                .map_or((1, values[0]), |(i, v)| (i + 1, *v));
            Err(AdapterError::configuration(
                "date_column",
                format!(
                    "dates could not be parsed as day-first, mixed or inferred \
                     formats (first problem: '{value}' at row {row})"
                ),
            ))
        }
    }
}

/// Formats a date as a `YYYY-MM-DD` time-axis key.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn strict_day_first(values: &[&str]) -> Option<Vec<NaiveDate>> {
    DAY_FIRST.iter().find_map(|format| {
        values
            .iter()
            .map(|v| NaiveDate::parse_from_str(v.trim(), format).ok())
            .collect()
    })
}

fn mixed(values: &[&str]) -> Option<Vec<NaiveDate>> {
    values.iter().map(|v| parse_any(v)).collect()
}

fn parse_any(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DAY_FIRST
        .iter()
        .chain(MONTH_FIRST)
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .or_else(|| {
            DATE_TIME.iter().find_map(|format| {
                NaiveDateTime::parse_from_str(value, format)
                    .ok()
                    .map(|dt| dt.date())
            })
        })
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

/// Representations the inference strategy can commit to.
#[derive(Debug, Clone, Copy)]
enum Representation {
    Format(&'static str),
    Compact,
    IsoWeek,
    YearMonth,
    Serial,
}

impl Representation {
    fn candidates() -> impl Iterator<Item = Representation> {
        MONTH_FIRST
            .iter()
            .map(|f| Representation::Format(*f))
            .chain([
                Representation::Compact,
                Representation::IsoWeek,
                Representation::YearMonth,
                Representation::Serial,
            ])
    }

    fn parse(self, value: &str) -> Option<NaiveDate> {
        let value = value.trim();
        match self {
            Representation::Format(format) => {
                NaiveDate::parse_from_str(value, format).ok()
            }
            Representation::Compact => {
                if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                NaiveDate::parse_from_str(value, "%Y%m%d").ok()
            }
            Representation::IsoWeek => {
                // Weeks are keyed by their Monday.
                let with_day = if value.matches('-').count() == 2 {
                    value.to_string()
                } else {
                    format!("{value}-1")
                };
                NaiveDate::parse_from_str(&with_day, "%G-W%V-%u").ok()
            }
            Representation::YearMonth => {
                NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d").ok()
            }
            Representation::Serial => {
                let days: u64 = value.parse().ok()?;
                if !SERIAL_RANGE.contains(&days) {
                    return None;
                }
                NaiveDate::from_ymd_opt(1899, 12, 30)?
                    .checked_add_days(Days::new(days))
            }
        }
    }
}

fn inferred(values: &[&str]) -> Option<Vec<NaiveDate>> {
    let first = values.first()?;
    let representation =
        Representation::candidates().find(|r| r.parse(first).is_some())?;
    debug!(?representation, "dates.inferred");
    values.iter().map(|v| representation.parse(v)).collect()
}

fn parse_inferred_any(value: &str) -> Option<NaiveDate> {
    Representation::candidates().find_map(|r| r.parse(value))
}
