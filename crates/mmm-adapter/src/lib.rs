//! Input adaptation for marketing-mix model training.
//!
//! This crate turns a CSV time series plus a loosely specified
//! [`RunConfig`] into the strict geo × time × channel arrays a model backend
//! consumes. It is the first stage of the mmm pipeline.
//!
//! ## Steps
//!
//! 1. Bind logical fields (date, KPI, channels, controls, geo) to table
//!    columns, falling back to header-name heuristics for required fields
//! 2. Parse the date column with three strategies of decreasing strictness
//! 3. Order rows by date and index them by (geo, date); every geo must cover
//!    every date exactly once
//! 4. Fill the KPI, media, spend and control arrays in configured channel
//!    order
//! 5. Assess data quality (informational only)
//!
//! Configuration and shape problems are errors. Nothing here falls back to
//! synthetic data.
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//!
//! use mmm_adapter::{adapt, load_table};
//! use mmm_schemas::RunConfig;
//!
//! let table = load_table(Path::new("data.csv")).unwrap();
//! let adapted = adapt(&table, &RunConfig::default()).unwrap();
//! println!("{} weeks", adapted.arrays.n_times());
//! ```

mod arrays;
mod dates;
mod error;
mod quality;
mod resolve;
mod table;

use chrono::NaiveDate;
use indexmap::IndexMap;
use itertools::Itertools;
use mmm_schemas::{DataQualityReport, RunConfig};
use ndarray::{Array1, Array2, Array3};
use tracing::{debug_span, info, warn};

#[doc(inline)]
pub use crate::arrays::{ModelInputArrays, NATIONAL_GEO};
#[doc(inline)]
pub use crate::dates::{DateStrategy, date_key, parse_dates, parse_dates_with_strategy};
#[doc(inline)]
pub use crate::error::AdapterError;
#[doc(inline)]
pub use crate::quality::assess_quality;
#[doc(inline)]
pub use crate::resolve::{ResolvedColumns, resolve_columns};
#[doc(inline)]
pub use crate::table::{TimeSeriesTable, load_table, read_table};

/// Everything the later stages need from the input.
#[derive(Debug, Clone)]
pub struct AdaptedInput {
    pub arrays: ModelInputArrays,
    pub columns: ResolvedColumns,
    /// Raw spend per channel summed over every table row, in channel order.
    pub spend_totals: IndexMap<String, f64>,
    pub quality: DataQualityReport,
}

/// Adapts a table to model input arrays.
///
/// # Errors
///
/// Returns [`AdapterError`] if:
/// - A required field cannot be resolved, dates do not parse, or a
///   (geo, date) pair repeats ([`AdapterError::is_configuration`])
/// - A geo is missing dates or the arrays disagree
///   ([`AdapterError::is_shape`])
/// - A used numeric cell is blank or non-numeric, or a spend cell is
///   negative ([`AdapterError::is_invalid_value`])
pub fn adapt(
    table: &TimeSeriesTable,
    config: &RunConfig,
) -> Result<AdaptedInput, AdapterError> {
    let _span = debug_span!("adapt", rows = table.len()).entered();

    if table.is_empty() {
        return Err(AdapterError::shape("input table has no data rows"));
    }

    let columns = resolve_columns(table, config)?;
    let dates = parse_dates(&table.text_column(&columns.date)?)?;

    let row_geos: Vec<String> = match &columns.geo {
        Some(geo) => table
            .text_column(geo)?
            .into_iter()
            .map(str::to_string)
            .collect(),
        None => vec![NATIONAL_GEO.to_string(); table.len()],
    };

    let times: Vec<NaiveDate> = dates.iter().copied().sorted().dedup().collect();
    let time_index: IndexMap<NaiveDate, usize> =
        times.iter().enumerate().map(|(i, d)| (*d, i)).collect();

    let mut geo_index: IndexMap<String, usize> = IndexMap::new();
    for geo in &row_geos {
        let next = geo_index.len();
        geo_index.entry(geo.clone()).or_insert(next);
    }

    let (g, t, c) = (geo_index.len(), times.len(), columns.channels.len());

    // cell[(geo, time)] = source row
    let mut cell: Array2<Option<usize>> = Array2::from_elem((g, t), None);
    for (row, (geo, date)) in row_geos.iter().zip(&dates).enumerate() {
        let gi = geo_index[geo];
        let ti = time_index[date];
        if cell[(gi, ti)].is_some() {
            return Err(AdapterError::configuration(
                "date_column",
                format!(
                    "date {} appears more than once for geo '{geo}' (row {})",
                    date_key(*date),
                    row + 1
                ),
            ));
        }
        cell[(gi, ti)] = Some(row);
    }
    if let Some(((gi, ti), _)) = cell.indexed_iter().find(|(_, r)| r.is_none()) {
        let geo = geo_index.get_index(gi).map_or("", |(name, _)| name.as_str());
        return Err(AdapterError::shape(format!(
            "geo '{geo}' has no row for {} while other geos do",
            date_key(times[ti])
        )));
    }
    let source_row = |gi: usize, ti: usize| cell[(gi, ti)].unwrap_or_default();

    let kpi_values = table.numeric_column(&columns.target)?;
    let kpi = Array2::from_shape_fn((g, t), |(gi, ti)| kpi_values[source_row(gi, ti)]);

    let spend_values: Vec<Vec<f64>> = columns
        .channels
        .iter()
        .map(|name| table.numeric_column(name))
        .collect::<Result<_, _>>()?;
    for (name, values) in columns.channels.iter().zip(&spend_values) {
        if let Some((row, &value)) =
            values.iter().enumerate().find(|(_, v)| **v < 0.0)
        {
            return Err(AdapterError::negative_spend(name, row + 1, value));
        }
    }
    let media_values: Vec<Vec<f64>> = if columns.media == columns.channels {
        spend_values.clone()
    } else {
        columns
            .media
            .iter()
            .map(|name| table.numeric_column(name))
            .collect::<Result<_, _>>()?
    };
    let media_spend = Array3::from_shape_fn((g, t, c), |(gi, ti, ci)| {
        spend_values[ci][source_row(gi, ti)]
    });
    let media = Array3::from_shape_fn((g, t, c), |(gi, ti, ci)| {
        media_values[ci][source_row(gi, ti)]
    });

    let controls_data = if columns.controls.is_empty() {
        None
    } else {
        let control_values: Vec<Vec<f64>> = columns
            .controls
            .iter()
            .map(|name| table.numeric_column(name))
            .collect::<Result<_, _>>()?;
        Some(Array3::from_shape_fn(
            (g, t, columns.controls.len()),
            |(gi, ti, ki)| control_values[ki][source_row(gi, ti)],
        ))
    };

    let population = match &columns.population {
        Some(name) => {
            let values = table.numeric_column(name)?;
            // First row of each geo; populations are per geo, not per row.
            Array1::from_shape_fn(g, |gi| values[source_row(gi, 0)])
        }
        None => Array1::from_elem(g, config.default_population),
    };

    let spend_totals: IndexMap<String, f64> = columns
        .channels
        .iter()
        .zip(&spend_values)
        .map(|(name, values)| (name.clone(), values.iter().sum()))
        .collect();

    let arrays = ModelInputArrays {
        geos: geo_index.into_keys().collect(),
        times: times.iter().map(|d| date_key(*d)).collect(),
        channels: columns.channels.clone(),
        controls: columns.controls.clone(),
        kpi,
        media,
        media_spend,
        controls_data,
        population,
        media_source: columns.media_source,
        seasonality: config.seasonality,
    };
    arrays.validate()?;

    let quality = assess_quality(table, &columns, &dates);
    if !quality.is_valid {
        warn!(score = quality.score, "quality.invalid");
    }

    info!(
        geos = g,
        times = t,
        channels = c,
        controls = columns.controls.len(),
        "input.adapted"
    );

    Ok(AdaptedInput {
        arrays,
        columns,
        spend_totals,
        quality,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(json: &str) -> RunConfig {
        RunConfig::from_reader(json.as_bytes()).unwrap()
    }

    #[test]
    fn test_rows_sorted_by_date() {
        let table = read_table(
            "date,sales,tv_spend\n2024-01-15,3,30\n2024-01-01,1,10\n2024-01-08,2,20\n"
                .as_bytes(),
        )
        .unwrap();
        let adapted = adapt(&table, &config("{}")).unwrap();

        assert_eq!(
            adapted.arrays.times,
            ["2024-01-01", "2024-01-08", "2024-01-15"]
        );
        assert_eq!(adapted.arrays.kpi.row(0).to_vec(), [1.0, 2.0, 3.0]);
        assert_eq!(adapted.arrays.geos, [NATIONAL_GEO]);
        assert_eq!(adapted.spend_totals["tv_spend"], 60.0);
    }

    #[test]
    fn test_geo_panel() {
        let table = read_table(
            "date,region,sales,tv_spend\n\
             2024-01-01,north,1,10\n\
             2024-01-01,south,2,20\n\
             2024-01-08,south,4,40\n\
             2024-01-08,north,3,30\n"
                .as_bytes(),
        )
        .unwrap();
        let adapted =
            adapt(&table, &config(r#"{"geo_column": "region"}"#)).unwrap();
        let arrays = &adapted.arrays;

        assert_eq!(arrays.geos, ["north", "south"]);
        assert_eq!(arrays.kpi.shape(), &[2, 2]);
        assert_eq!(arrays.kpi.row(1).to_vec(), [2.0, 4.0]);
        assert_eq!(arrays.media[(0, 1, 0)], 30.0);
        assert_eq!(arrays.population.to_vec(), [1_000_000.0, 1_000_000.0]);
    }

    #[test]
    fn test_duplicate_date_rejected() {
        let table = read_table(
            "date,sales,tv_spend\n2024-01-01,1,10\n2024-01-01,2,20\n".as_bytes(),
        )
        .unwrap();
        let err = adapt(&table, &config("{}")).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(err.field(), Some("date_column"));
    }

    #[test]
    fn test_unbalanced_geo_is_shape_error() {
        let table = read_table(
            "date,region,sales,tv_spend\n\
             2024-01-01,north,1,10\n\
             2024-01-08,north,3,30\n\
             2024-01-01,south,2,20\n"
                .as_bytes(),
        )
        .unwrap();
        let err =
            adapt(&table, &config(r#"{"geo_column": "region"}"#)).unwrap_err();
        assert!(err.is_shape(), "{err}");
    }

    #[test]
    fn test_blank_kpi_cell() {
        let table = read_table(
            "date,sales,tv_spend\n2024-01-01,,10\n2024-01-08,2,20\n".as_bytes(),
        )
        .unwrap();
        let err = adapt(&table, &config("{}")).unwrap_err();
        assert!(err.is_invalid_value());
    }

    #[test]
    fn test_negative_spend_rejected() {
        let table = read_table(
            "date,sales,tv_spend,radio_spend\n\
             2024-01-01,1,10,5\n\
             2024-01-08,2,-10,5\n"
                .as_bytes(),
        )
        .unwrap();
        let err = adapt(&table, &config("{}")).unwrap_err();
        assert!(err.is_invalid_value());
        assert!(err.to_string().contains("'tv_spend' row 2"), "{err}");
    }

    #[test]
    fn test_repeated_channel_rejected() {
        let table = read_table(
            "date,sales,tv_spend\n2024-01-01,1,10\n2024-01-08,2,20\n".as_bytes(),
        )
        .unwrap();
        let err = adapt(
            &table,
            &config(r#"{"channel_columns": ["tv_spend", "tv_spend"]}"#),
        )
        .unwrap_err();
        assert_eq!(err.field(), Some("channel_columns"));
    }

    #[test]
    fn test_controls_and_population() {
        let table = read_table(
            "date,sales,tv_spend,price,pop\n\
             2024-01-01,1,10,5,300\n\
             2024-01-08,2,20,6,300\n"
                .as_bytes(),
        )
        .unwrap();
        let adapted = adapt(
            &table,
            &config(
                r#"{"control_columns": ["price", "weather"],
                    "population_column": "pop"}"#,
            ),
        )
        .unwrap();

        assert_eq!(adapted.arrays.controls, ["price"]);
        let controls = adapted.arrays.controls_data.as_ref().unwrap();
        assert_eq!(controls.shape(), &[1, 2, 1]);
        assert_eq!(controls[(0, 1, 0)], 6.0);
        assert_eq!(adapted.arrays.population.to_vec(), [300.0]);
    }
}
