//! Wire form of the adapted model input.
//!
//! External backends receive the geo × time × channel arrays as nested JSON
//! lists, the layout `numpy.asarray` rebuilds without further reshaping.

use serde::{Deserialize, Serialize};

use crate::config::{MediaSource, SamplerSettings};

/// Model input arrays serialized as nested lists.
///
/// Axis order is fixed: `kpi[geo][time]`, `media[geo][time][channel]`,
/// `controls_data[geo][time][control]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInputPayload {
    /// Geography labels (`["national"]` without a geo column).
    pub geos: Vec<String>,
    /// Ascending `YYYY-MM-DD` time coordinates.
    pub times: Vec<String>,
    /// Channel names in configured order.
    pub channels: Vec<String>,
    /// Control covariate names.
    pub controls: Vec<String>,
    pub kpi: Vec<Vec<f64>>,
    pub media: Vec<Vec<Vec<f64>>>,
    pub media_spend: Vec<Vec<Vec<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controls_data: Option<Vec<Vec<Vec<f64>>>>,
    /// One population value per geography.
    pub population: Vec<f64>,
    pub media_source: MediaSource,
    pub seasonality: u32,
}

/// Request document written to an external backend's stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendRequest {
    /// Library API version the bridge should target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    pub sampler: SamplerSettings,
    /// Worker thread budget for the external sampler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    pub input: ModelInputPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_layout() {
        let request = BackendRequest {
            api_version: Some("1.1".into()),
            sampler: SamplerSettings::default(),
            threads: None,
            input: ModelInputPayload {
                geos: vec!["national".into()],
                times: vec!["2024-01-01".into(), "2024-01-08".into()],
                channels: vec!["tv_spend".into()],
                controls: Vec::new(),
                kpi: vec![vec![10.0, 12.0]],
                media: vec![vec![vec![1.0], vec![2.0]]],
                media_spend: vec![vec![vec![1.0], vec![2.0]]],
                controls_data: None,
                population: vec![1_000_000.0],
                media_source: MediaSource::Spend,
                seasonality: 52,
            },
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["api_version"], "1.1");
        assert_eq!(value["sampler"]["chains"], 2);
        assert!(value.get("threads").is_none());
        assert!(value["input"].get("controls_data").is_none());
        assert_eq!(value["input"]["media"][0][1][0], 2.0);
        assert_eq!(value["input"]["media_source"], "spend");
    }
}
