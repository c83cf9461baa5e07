//! Run configuration: which columns mean what, and how to train.
//!
//! The configuration file is loosely specified by the front end. Every key is
//! optional; missing column names are filled in by the adapter's column
//! resolution heuristics, and everything else falls back to the defaults
//! documented on each field. Unknown keys are ignored.

use std::io::Read;
use std::path::Path;

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;

/// Default seasonality period: one year of weekly data.
pub const DEFAULT_SEASONALITY: u32 = 52;

/// Population assigned to each geography when no population column exists.
pub const DEFAULT_POPULATION: f64 = 1_000_000.0;

/// Deserializes `null` as the type's default, so `"control_columns": null`
/// behaves like an absent key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Top-level run configuration read from the JSON config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RunConfig {
    /// Column holding the time axis.
    pub date_column: Option<String>,

    /// Column holding the KPI (sales, revenue, conversions).
    pub target_column: Option<String>,

    /// Ordered channel spend columns. The order here is the channel order of
    /// every array and every per-channel result.
    #[serde(deserialize_with = "null_as_default")]
    #[schemars(with = "Vec<String>")]
    pub channel_columns: Vec<String>,

    /// Control covariate columns. Names missing from the table are dropped.
    #[serde(deserialize_with = "null_as_default")]
    #[schemars(with = "Vec<String>")]
    pub control_columns: Vec<String>,

    /// Geography column. Absent means a single national series.
    pub geo_column: Option<String>,

    /// Per-geography population column.
    pub population_column: Option<String>,

    /// Seasonality period in time steps.
    pub seasonality: u32,

    /// Which values feed the media array.
    pub media_source: MediaSource,

    /// Explicit impressions column per channel, used when `media_source` is
    /// `impressions`. Channels without an entry fall back to the
    /// `<stem>_impressions` naming convention.
    #[serde(deserialize_with = "null_as_default")]
    #[schemars(with = "IndexMap<String, String>")]
    pub impression_columns: IndexMap<String, String>,

    /// Population used for every geography when no population column exists.
    pub default_population: f64,

    /// Model backend selection.
    pub backend: BackendConfig,

    /// Posterior sampling layout.
    pub sampler: SamplerSettings,

    /// Worker thread budget handed to the backend.
    pub threads: Option<usize>,

    /// When set, a failed model invocation falls back to fabricated mock
    /// results instead of writing a failure document.
    pub allow_mock_fallback: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            date_column: None,
            target_column: None,
            channel_columns: Vec::new(),
            control_columns: Vec::new(),
            geo_column: None,
            population_column: None,
            seasonality: DEFAULT_SEASONALITY,
            media_source: MediaSource::default(),
            impression_columns: IndexMap::new(),
            default_population: DEFAULT_POPULATION,
            backend: BackendConfig::default(),
            sampler: SamplerSettings::default(),
            threads: None,
            allow_mock_fallback: false,
        }
    }
}

impl RunConfig {
    /// Parses and validates a configuration from a reader.
    pub fn from_reader(reader: impl Read) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seasonality == 0 {
            return Err(ConfigError::invalid("seasonality must be at least 1"));
        }
        if !(self.default_population.is_finite()
            && self.default_population > 0.0)
        {
            return Err(ConfigError::invalid(format!(
                "default_population must be positive, got {}",
                self.default_population
            )));
        }
        if self.sampler.chains == 0 {
            return Err(ConfigError::invalid("sampler.chains must be at least 1"));
        }
        if self.sampler.keep == 0 {
            return Err(ConfigError::invalid("sampler.keep must be at least 1"));
        }
        if self.threads == Some(0) {
            return Err(ConfigError::invalid("threads must be at least 1"));
        }
        if self.backend.kind == BackendKind::Subprocess
            && self.backend.command.is_empty()
        {
            return Err(ConfigError::invalid(
                "backend.command is required for the subprocess backend",
            ));
        }
        Ok(())
    }
}

/// Loads and validates a `RunConfig` from a JSON file.
pub fn load_run_config(path: &Path) -> Result<RunConfig, ConfigError> {
    let file = std::fs::File::open(path)?;
    RunConfig::from_reader(std::io::BufReader::new(file))
}

/// Source of the values placed in the media (exposure) array.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum MediaSource {
    /// Each channel's spend column doubles as its exposure series.
    #[default]
    Spend,
    /// Each channel has a separate impressions column.
    Impressions,
}

/// Which model backend to run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend implementation.
    pub kind: BackendKind,

    /// Program and arguments for the subprocess backend, e.g.
    /// `["python3", "scripts/meridian_bridge.py"]`.
    #[serde(deserialize_with = "null_as_default")]
    #[schemars(with = "Vec<String>")]
    pub command: Vec<String>,

    /// Version tag forwarded to the external bridge so it can pick the
    /// matching library API.
    pub api_version: Option<String>,
}

/// Backend implementations known to the pipeline.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Built-in regression with bootstrap draws.
    #[default]
    Native,
    /// External sampler speaking JSON over stdin/stdout.
    Subprocess,
    /// Fabricated results for UI development.
    Mock,
}

/// Posterior sampling layout passed to the backend.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(default)]
pub struct SamplerSettings {
    /// Number of independent chains.
    pub chains: u32,
    /// Adaptation draws per chain (discarded).
    pub adapt: u32,
    /// Burn-in draws per chain (discarded).
    pub burnin: u32,
    /// Retained draws per chain.
    pub keep: u32,
    /// Random seed.
    pub seed: u64,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            chains: 2,
            adapt: 100,
            burnin: 100,
            keep: 200,
            seed: 42,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use proptest::prelude::*;

    use super::*;
    use crate::testutil::arb_name;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = RunConfig::from_reader(
            r#"{"date_column": "date", "target_column": "sales"}"#.as_bytes(),
        )
        .unwrap();

        assert_eq!(config.seasonality, 52);
        assert_eq!(config.media_source, MediaSource::Spend);
        assert_eq!(config.backend.kind, BackendKind::Native);
        assert_eq!(config.sampler, SamplerSettings::default());
        assert!(config.channel_columns.is_empty());
        assert!(!config.allow_mock_fallback);
    }

    #[test]
    fn test_null_lists_are_empty() {
        let config = RunConfig::from_reader(
            r#"{"channel_columns": null, "control_columns": null}"#.as_bytes(),
        )
        .unwrap();
        assert!(config.channel_columns.is_empty());
        assert!(config.control_columns.is_empty());
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let config = RunConfig::from_reader(
            r#"{"seasonality": 12, "project_id": 7, "name": "q3"}"#.as_bytes(),
        )
        .unwrap();
        assert_eq!(config.seasonality, 12);
    }

    #[test]
    fn test_zero_seasonality_rejected() {
        let err =
            RunConfig::from_reader(r#"{"seasonality": 0}"#.as_bytes())
                .unwrap_err();
        assert!(err.is_invalid());
    }

    #[test]
    fn test_subprocess_requires_command() {
        let err = RunConfig::from_reader(
            r#"{"backend": {"kind": "subprocess"}}"#.as_bytes(),
        )
        .unwrap_err();
        assert!(err.is_invalid());
        assert!(err.to_string().contains("backend.command"));
    }

    #[test]
    fn test_partial_sampler_keeps_other_defaults() {
        let config = RunConfig::from_reader(
            r#"{"sampler": {"chains": 4, "seed": 7}}"#.as_bytes(),
        )
        .unwrap();
        assert_eq!(config.sampler.chains, 4);
        assert_eq!(config.sampler.seed, 7);
        assert_eq!(config.sampler.keep, 200);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"channel_columns": ["tv_spend", "radio_spend"]}}"#
        )
        .unwrap();

        let config = load_run_config(file.path()).unwrap();
        assert_eq!(config.channel_columns, ["tv_spend", "radio_spend"]);
    }

    #[test]
    fn test_missing_file_is_io() {
        let err =
            load_run_config(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn test_json_schema_lists_channel_columns() {
        let schema = serde_json::to_value(schemars::schema_for!(RunConfig))
            .unwrap();
        let properties = &schema["properties"];
        assert!(properties.get("channel_columns").is_some());
        assert!(properties.get("media_source").is_some());
    }

    proptest! {
        /// Channel order in the file is the channel order in the config.
        #[test]
        fn test_channel_order_preserved(
            channels in proptest::collection::vec(arb_name(), 0..8),
        ) {
            let json = serde_json::json!({ "channel_columns": channels });
            let config = RunConfig::from_reader(json.to_string().as_bytes())
                .expect("valid config");
            prop_assert_eq!(config.channel_columns, channels);
        }
    }
}
