//! Data-quality assessment of the input table.
//!
//! The report is informational: it is attached to the result document and
//! never aborts a run. Each check is weighted by severity when failed
//! (error 1.0, warning 0.5, info 0.0) and the score is
//! `100 · (1 − penalty / checks)`, rounded and clamped to `[0, 100]`.

use chrono::NaiveDate;
use itertools::Itertools;
use mmm_schemas::{DataQualityReport, MediaSource, QualityCheck, Severity};

use crate::resolve::ResolvedColumns;
use crate::table::TimeSeriesTable;

/// Rows needed for a full year of weekly data.
pub const RECOMMENDED_POINTS: usize = 52;

/// Below this many rows the data is unusable for MMM.
pub const MINIMUM_POINTS: usize = 26;

const MAX_GAPS_BEFORE_ERROR: usize = 3;
const MISSING_ERROR_PERCENT: f64 = 10.0;
const OUTLIER_SIGMAS: f64 = 3.0;

/// Runs every check against the table.
///
/// `dates` are the parsed values of the date column, one per row.
pub fn assess_quality(
    table: &TimeSeriesTable,
    columns: &ResolvedColumns,
    dates: &[NaiveDate],
) -> DataQualityReport {
    let mut checks = Vec::new();
    let mut recommendations = Vec::new();

    let continuity = date_continuity(dates, &columns.date);
    if !continuity.passed {
        recommendations.push(format!(
            "Check for missing dates in {} column",
            columns.date
        ));
    }
    checks.push(continuity);

    let numeric_columns: Vec<&String> = table
        .headers()
        .iter()
        .filter(|h| {
            **h != columns.date && columns.geo.as_ref() != Some(*h)
        })
        .collect();

    for column in &numeric_columns {
        let Some(values) = table.numeric_column_lenient(column) else {
            continue;
        };
        let missing = missing_values(column, &values);
        if !missing.passed {
            recommendations.push(format!(
                "Consider handling missing values in {column} column"
            ));
        }
        checks.push(missing);

        let spread = outliers(column, &values);
        if !spread.passed {
            recommendations.push(format!("Review outliers in {column} column"));
        }
        checks.push(spread);
    }

    for channel in &columns.channels {
        if let Some(values) = table.numeric_column_lenient(channel) {
            let negative = negative_values(channel, &values);
            if !negative.passed {
                recommendations
                    .push(format!("Fix negative values in {channel} column"));
            }
            checks.push(negative);
        }
    }

    for check in media_pairs(table, columns) {
        if !check.passed && check.severity == Severity::Warning {
            if let Some(column) = &check.column {
                recommendations.push(format!("Add impression data for {column}"));
            }
        }
        checks.push(check);
    }

    let quantity = data_quantity(table.len());
    if !quantity.passed {
        recommendations.push(format!(
            "For reliable MMM results, provide at least {RECOMMENDED_POINTS} weeks of data"
        ));
    }
    checks.push(quantity);

    let total = score(&checks);
    let is_valid = !checks
        .iter()
        .any(|c| !c.passed && c.severity == Severity::Error);

    recommendations.push(
        match total {
            90.. => "Data quality is excellent for MMM analysis",
            70..=89 => "Data quality is good for MMM analysis",
            50..=69 => "Data quality is acceptable but could be improved",
            _ => "Data quality needs significant improvement for reliable MMM results",
        }
        .to_string(),
    );

    DataQualityReport {
        score: total,
        is_valid,
        checks,
        recommendations,
    }
}

fn check(
    passed: bool,
    category: &str,
    message: String,
    severity: Severity,
    column: Option<&str>,
) -> QualityCheck {
    QualityCheck {
        passed,
        category: category.to_string(),
        message,
        severity,
        column: column.map(str::to_string),
    }
}

/// Gaps in the time axis. Cadence comes from the first interval: 6 to 8
/// days means weekly, anything else daily.
fn date_continuity(dates: &[NaiveDate], column: &str) -> QualityCheck {
    let unique: Vec<NaiveDate> = dates.iter().copied().sorted().dedup().collect();
    let intervals: Vec<i64> = unique
        .windows(2)
        .map(|w| (w[1] - w[0]).num_days())
        .collect();

    let weekly = intervals.first().is_some_and(|d| (6..=8).contains(d));
    let tolerance = if weekly { 8 } else { 1 };
    let gaps = intervals.iter().filter(|&&d| d > tolerance).count();

    if gaps == 0 {
        check(
            true,
            "Date Continuity",
            "No gaps found in time series".to_string(),
            Severity::Info,
            Some(column),
        )
    } else {
        check(
            false,
            "Date Continuity",
            format!("Found {gaps} gaps in time series"),
            if gaps > MAX_GAPS_BEFORE_ERROR {
                Severity::Error
            } else {
                Severity::Warning
            },
            Some(column),
        )
    }
}

fn missing_values(column: &str, values: &[Option<f64>]) -> QualityCheck {
    let missing = values.iter().filter(|v| v.is_none()).count();
    if missing == 0 {
        return check(
            true,
            "Missing Values",
            format!("No missing values in column '{column}'"),
            Severity::Info,
            Some(column),
        );
    }
    #[expect(clippy::cast_precision_loss, reason = "row counts are small")]
    let percent = 100.0 * missing as f64 / values.len() as f64;
    check(
        false,
        "Missing Values",
        format!("{missing} missing values ({percent:.1}%) in column '{column}'"),
        if percent > MISSING_ERROR_PERCENT {
            Severity::Error
        } else {
            Severity::Warning
        },
        Some(column),
    )
}

/// Values more than three population standard deviations from the mean.
fn outliers(column: &str, values: &[Option<f64>]) -> QualityCheck {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return check(
            true,
            "Outlier Detection",
            format!("No numeric data in column '{column}'"),
            Severity::Info,
            Some(column),
        );
    }

    #[expect(clippy::cast_precision_loss, reason = "row counts are small")]
    let n = present.len() as f64;
    let mean = present.iter().sum::<f64>() / n;
    let variance = present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let threshold = OUTLIER_SIGMAS * variance.sqrt();
    let count = present
        .iter()
        .filter(|v| (*v - mean).abs() > threshold)
        .count();

    if count == 0 {
        check(
            true,
            "Outlier Detection",
            format!("No outliers found in column '{column}'"),
            Severity::Info,
            Some(column),
        )
    } else {
        check(
            false,
            "Outlier Detection",
            format!("Found {count} outliers in column '{column}'"),
            Severity::Warning,
            Some(column),
        )
    }
}

fn negative_values(column: &str, values: &[Option<f64>]) -> QualityCheck {
    let count = values.iter().flatten().filter(|v| **v < 0.0).count();
    if count == 0 {
        check(
            true,
            "Negative Values",
            format!("No negative values in column '{column}'"),
            Severity::Info,
            Some(column),
        )
    } else {
        check(
            false,
            "Negative Values",
            format!("Found {count} negative values in column '{column}'"),
            Severity::Error,
            Some(column),
        )
    }
}

/// Spend columns without a matching `_impressions` column. Only a problem
/// when impressions feed the media array.
fn media_pairs(
    table: &TimeSeriesTable,
    columns: &ResolvedColumns,
) -> Vec<QualityCheck> {
    columns
        .channels
        .iter()
        .zip(&columns.media)
        .map(|(spend, media)| {
            let stem = spend.strip_suffix("_spend").unwrap_or(spend.as_str());
            let paired =
                media != spend || table.has_column(&format!("{stem}_impressions"));
            if paired {
                check(
                    true,
                    "Media Pairs",
                    format!("Spend column '{spend}' has impression data"),
                    Severity::Info,
                    Some(spend),
                )
            } else {
                let severity = match columns.media_source {
                    MediaSource::Impressions => Severity::Warning,
                    MediaSource::Spend => Severity::Info,
                };
                check(
                    false,
                    "Media Pairs",
                    format!(
                        "Spend column '{spend}' has no impressions column; spend is used as exposure"
                    ),
                    severity,
                    Some(spend),
                )
            }
        })
        .collect()
}

fn data_quantity(rows: usize) -> QualityCheck {
    if rows >= RECOMMENDED_POINTS {
        check(
            true,
            "Data Quantity",
            format!("{rows} data points (recommended: {RECOMMENDED_POINTS}+)"),
            Severity::Info,
            None,
        )
    } else {
        check(
            false,
            "Data Quantity",
            format!("Only {rows} data points (recommended: {RECOMMENDED_POINTS}+)"),
            if rows < MINIMUM_POINTS {
                Severity::Error
            } else {
                Severity::Warning
            },
            None,
        )
    }
}

fn score(checks: &[QualityCheck]) -> u8 {
    if checks.is_empty() {
        return 100;
    }
    let penalty: f64 = checks
        .iter()
        .filter(|c| !c.passed)
        .map(|c| match c.severity {
            Severity::Error => 1.0,
            Severity::Warning => 0.5,
            Severity::Info => 0.0,
        })
        .sum();
    #[expect(clippy::cast_precision_loss, reason = "check counts are small")]
    let total = checks.len() as f64;
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "clamped to [0, 100] first"
    )]
    let score = (100.0 * (1.0 - penalty / total)).round().clamp(0.0, 100.0) as u8;
    score
}
