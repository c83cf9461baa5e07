//! Binding of logical fields to table columns.
//!
//! For each required field the configured name is used when the table has
//! it; otherwise a header-name heuristic picks a column; otherwise the field
//! is a configuration error. Optional fields never fall back to heuristics.

use indexmap::IndexMap;
use itertools::Itertools;
use mmm_schemas::{ColumnProvenance, ColumnSource, MediaSource, RunConfig};
use tracing::warn;

use crate::error::AdapterError;
use crate::table::TimeSeriesTable;

const DATE_KEYWORDS: &[&str] = &["date", "week", "month", "day"];
const TARGET_KEYWORDS: &[&str] = &["sales", "revenue", "conversion", "kpi"];
const CHANNEL_KEYWORD: &str = "spend";
const IMPRESSIONS_SUFFIX: &str = "_impressions";

/// Table columns bound to each logical field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub date: String,
    pub date_source: ColumnSource,
    pub target: String,
    pub target_source: ColumnSource,
    /// Spend column per channel, in configured order. Channel names are
    /// these column names.
    pub channels: Vec<String>,
    pub channels_source: ColumnSource,
    /// Column feeding the media array for each channel, parallel to
    /// `channels`. Equal to `channels` for spend-sourced media.
    pub media: Vec<String>,
    pub media_source: MediaSource,
    pub controls: Vec<String>,
    pub geo: Option<String>,
    pub population: Option<String>,
}

impl ResolvedColumns {
    /// Field-to-column provenance for the result document.
    pub fn provenance(&self) -> IndexMap<String, ColumnProvenance> {
        let mut map = IndexMap::new();
        let mut insert = |field: &str, columns: Vec<String>, source| {
            map.insert(field.to_string(), ColumnProvenance { columns, source });
        };
        insert("date_column", vec![self.date.clone()], self.date_source);
        insert("target_column", vec![self.target.clone()], self.target_source);
        insert(
            "channel_columns",
            self.channels.clone(),
            self.channels_source,
        );
        if self.media_source == MediaSource::Impressions {
            insert("impression_columns", self.media.clone(), ColumnSource::Configured);
        }
        if !self.controls.is_empty() {
            insert("control_columns", self.controls.clone(), ColumnSource::Configured);
        }
        if let Some(geo) = &self.geo {
            insert("geo_column", vec![geo.clone()], ColumnSource::Configured);
        }
        if let Some(population) = &self.population {
            insert(
                "population_column",
                vec![population.clone()],
                ColumnSource::Configured,
            );
        }
        map
    }
}

/// Resolves every logical field of `config` against `table`.
pub fn resolve_columns(
    table: &TimeSeriesTable,
    config: &RunConfig,
) -> Result<ResolvedColumns, AdapterError> {
    let headers = table.headers();
    reject_repeats("channel_columns", &config.channel_columns)?;
    reject_repeats("control_columns", &config.control_columns)?;

    let geo = resolve_optional(table, config.geo_column.as_deref(), "geo_column")?;
    let population = resolve_optional(
        table,
        config.population_column.as_deref(),
        "population_column",
    )?;

    let (date, date_source) = resolve_single(
        table,
        config.date_column.as_deref(),
        "date_column",
        DATE_KEYWORDS,
        &[],
    )?;
    let (target, target_source) = resolve_single(
        table,
        config.target_column.as_deref(),
        "target_column",
        TARGET_KEYWORDS,
        &[date.as_str()],
    )?;

    let configured: Vec<String> = config
        .channel_columns
        .iter()
        .filter(|name| {
            let present = table.has_column(name);
            if !present {
                warn!(column = %name, "channel.missing");
            }
            present
        })
        .cloned()
        .collect();

    let (channels, channels_source) = if configured.is_empty() {
        let reserved: Vec<&str> = [Some(date.as_str()), Some(target.as_str())]
            .into_iter()
            .chain([geo.as_deref(), population.as_deref()])
            .flatten()
            .chain(config.control_columns.iter().map(String::as_str))
            .collect();
        let detected: Vec<String> = headers
            .iter()
            .filter(|h| {
                let lower = h.to_lowercase();
                lower.contains(CHANNEL_KEYWORD)
                    && !lower.ends_with(IMPRESSIONS_SUFFIX)
                    && !reserved.contains(&h.as_str())
            })
            .cloned()
            .collect();
        if detected.is_empty() {
            return Err(AdapterError::configuration(
                "channel_columns",
                "no configured channel is in the table and no column name contains 'spend'",
            ));
        }
        (detected, ColumnSource::Heuristic)
    } else {
        (configured, ColumnSource::Configured)
    };

    let media = match config.media_source {
        MediaSource::Spend => channels.clone(),
        MediaSource::Impressions => channels
            .iter()
            .map(|channel| impressions_column(table, config, channel))
            .collect::<Result<_, _>>()?,
    };

    let controls = config
        .control_columns
        .iter()
        .filter(|name| {
            let present = table.has_column(name);
            if !present {
                warn!(column = %name, "control.missing");
            }
            present
        })
        .cloned()
        .collect();

    Ok(ResolvedColumns {
        date,
        date_source,
        target,
        target_source,
        channels,
        channels_source,
        media,
        media_source: config.media_source,
        controls,
        geo,
        population,
    })
}

/// Configured name if present, else first header containing a keyword.
///
/// Keywords are tried in priority order, so `date` beats `holiday_day`.
fn resolve_single(
    table: &TimeSeriesTable,
    configured: Option<&str>,
    field: &str,
    keywords: &[&str],
    exclude: &[&str],
) -> Result<(String, ColumnSource), AdapterError> {
    if let Some(name) = configured {
        if table.has_column(name) {
            return Ok((name.to_string(), ColumnSource::Configured));
        }
        warn!(field, column = name, "column.missing");
    }

    keywords
        .iter()
        .find_map(|keyword| {
            table.headers().iter().find(|h| {
                h.to_lowercase().contains(*keyword)
                    && !exclude.contains(&h.as_str())
            })
        })
        .map(|h| (h.clone(), ColumnSource::Heuristic))
        .ok_or_else(|| {
            let detail = match configured {
                Some(name) => format!(
                    "column '{name}' is not in the table and no header matches {keywords:?}"
                ),
                None => format!("no header matches {keywords:?}"),
            };
            AdapterError::configuration(field, detail)
        })
}

/// A column listed twice would become two channels (or controls) with the
/// same name.
fn reject_repeats(field: &str, names: &[String]) -> Result<(), AdapterError> {
    let repeated: Vec<&String> = names.iter().duplicates().collect();
    if repeated.is_empty() {
        Ok(())
    } else {
        Err(AdapterError::configuration(
            field,
            format!("columns listed more than once: {}", repeated.iter().join(", ")),
        ))
    }
}

/// Optional columns are bound only when configured, and must then exist.
fn resolve_optional(
    table: &TimeSeriesTable,
    configured: Option<&str>,
    field: &str,
) -> Result<Option<String>, AdapterError> {
    match configured {
        None => Ok(None),
        Some(name) if table.has_column(name) => Ok(Some(name.to_string())),
        Some(name) => Err(AdapterError::configuration(
            field,
            format!("column '{name}' is not in the table"),
        )),
    }
}

/// Impressions column for a channel: explicit mapping, else naming
/// convention (`tv_spend` → `tv_impressions`).
fn impressions_column(
    table: &TimeSeriesTable,
    config: &RunConfig,
    channel: &str,
) -> Result<String, AdapterError> {
    if let Some(column) = config.impression_columns.get(channel) {
        return if table.has_column(column) {
            Ok(column.clone())
        } else {
            Err(AdapterError::configuration(
                "impression_columns",
                format!("column '{column}' for channel '{channel}' is not in the table"),
            ))
        };
    }

    let stem = channel
        .strip_suffix("_spend")
        .or_else(|| channel.strip_suffix("_Spend"))
        .unwrap_or(channel);
    let candidate = format!("{stem}{IMPRESSIONS_SUFFIX}");
    if table.has_column(&candidate) {
        Ok(candidate)
    } else {
        Err(AdapterError::configuration(
            "impression_columns",
            format!(
                "media_source is 'impressions' but channel '{channel}' has no \
                 impressions column (expected '{candidate}')"
            ),
        ))
    }
}
