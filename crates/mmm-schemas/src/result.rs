//! Result document written to the output path.
//!
//! A run writes exactly one document: a [`TrainingReport`] on success or a
//! [`FailureReport`] otherwise. Both carry `model_type` and `success`, so the
//! front end can branch on `success` before reading anything else.
//!
//! Per-channel maps are `IndexMap`s keyed by channel name; their iteration
//! order is the configured channel order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Successful training result.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct TrainingReport {
    /// Backend tag, e.g. `meridian`, `mmm_native`, `meridian_mock`.
    pub model_type: String,
    /// Always `true`.
    pub success: bool,
    pub metrics: FitMetrics,
    pub channel_analysis: IndexMap<String, ChannelAnalysis>,
    pub response_curves: IndexMap<String, ResponseCurve>,
    pub optimization: OptimizationSummary,
    /// Where every reported value came from.
    pub provenance: Provenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub training_info: Option<TrainingInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub data_quality: Option<DataQualityReport>,
}

/// In-sample goodness of fit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct FitMetrics {
    pub r_squared: f64,
    /// Mean absolute percentage error, as a fraction.
    pub mape: f64,
}

/// Attribution and return figures for one channel.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct ChannelAnalysis {
    /// Incremental KPI attributed to the channel.
    pub contribution: f64,
    /// Share of total contribution across channels, in `[0, 1]`.
    pub contribution_percentage: f64,
    pub roi: f64,
    pub roi_lower: f64,
    pub roi_upper: f64,
    /// Whether the ROI bounds are a posterior interval or the ±20 %
    /// placeholder.
    pub roi_interval: IntervalSource,
    /// Share of total spend from the raw input table, in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub spend_percentage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub total_spend: Option<f64>,
}

/// Origin of a channel's ROI bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum IntervalSource {
    /// 90 % credible interval from posterior draws or explicit bounds.
    Credible,
    /// Point estimate ±20 %. Not a statistical interval.
    Approximate,
}

/// Response-curve parameters for one channel.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct ResponseCurve {
    pub saturation: Saturation,
    pub adstock: Adstock,
}

/// Hill saturation parameters.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct Saturation {
    /// Half-saturation point.
    pub ec: f64,
    pub slope: f64,
}

/// Geometric adstock parameters.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct Adstock {
    pub decay: f64,
    /// Lag of peak effect, in time steps.
    pub peak: u32,
}

/// Output of the budget reallocation heuristic.
///
/// `optimal_allocation` is a heuristic reallocation, not the solution of an
/// optimization problem; `expected_lift` can be negative.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct OptimizationSummary {
    pub current_budget: f64,
    pub current_allocation: IndexMap<String, f64>,
    /// Sums to `current_budget`.
    pub optimal_allocation: IndexMap<String, f64>,
    /// Percentage change per channel.
    pub changes: IndexMap<String, f64>,
    /// Lift as a percentage of `current_budget`.
    pub expected_lift: f64,
    /// Lift in KPI units.
    pub expected_lift_absolute: f64,
}

/// Provenance of reported values.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct Provenance {
    /// Backend identifier, e.g. `native-v1`.
    pub backend: String,
    /// Quantities replaced by a neutral default because the backend did not
    /// report them.
    pub fallbacks: Vec<FallbackNote>,
    /// Input column used for each logical field.
    pub columns: IndexMap<String, ColumnProvenance>,
    /// Set when a failed real backend was replaced by mock output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub mock_fallback_reason: Option<String>,
}

/// A quantity synthesized from a default.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct FallbackNote {
    pub quantity: Quantity,
    /// `None` for run-level quantities such as `r_squared`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub channel: Option<String>,
    /// Value that was substituted.
    pub value: f64,
}

/// Quantities the normalizer can default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Quantity {
    Roi,
    Contribution,
    SaturationEc,
    SaturationSlope,
    AdstockDecay,
    AdstockPeak,
    RSquared,
    Mape,
}

/// How a logical field was bound to input columns.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct ColumnProvenance {
    pub columns: Vec<String>,
    pub source: ColumnSource,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ColumnSource {
    /// Named in the run configuration.
    Configured,
    /// Detected from header names.
    Heuristic,
}

/// Sampler layout and backend used for the run.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct TrainingInfo {
    pub backend: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub api_version: Option<String>,
    pub chains: u32,
    pub adapt: u32,
    pub burnin: u32,
    pub keep: u32,
    #[ts(type = "number")]
    pub seed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub threads: Option<usize>,
}

/// Data-quality assessment of the input table.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct DataQualityReport {
    /// 0 to 100.
    pub score: u8,
    /// False when any check failed with error severity.
    pub is_valid: bool,
    pub checks: Vec<QualityCheck>,
    pub recommendations: Vec<String>,
}

/// One data-quality finding.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct QualityCheck {
    pub passed: bool,
    pub category: String,
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub column: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Document written when a run fails after argument parsing.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, TS)]
#[ts(export)]
pub struct FailureReport {
    pub model_type: String,
    /// Always `false`.
    pub success: bool,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub error_type: Option<ErrorClass>,
}

impl FailureReport {
    #[must_use]
    pub fn new(
        model_type: impl Into<String>,
        error: impl Into<String>,
        error_type: ErrorClass,
    ) -> Self {
        Self {
            model_type: model_type.into(),
            success: false,
            error: error.into(),
            error_type: Some(error_type),
        }
    }
}

/// User-facing error taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, TS)]
#[ts(export)]
pub enum ErrorClass {
    /// Bad or missing column mapping, unparseable dates, invalid config.
    ConfigurationError,
    /// Inconsistent array dimensions.
    ShapeError,
    /// The model backend failed or returned unusable output.
    ExternalModelError,
    /// A file could not be read or written.
    #[serde(rename = "IOError")]
    IoError,
}

/// Either outcome, for readers of the output file.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ResultDocument {
    Success(Box<TrainingReport>),
    Failure(FailureReport),
}

impl ResultDocument {
    pub fn is_success(&self) -> bool {
        matches!(self, ResultDocument::Success(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_document_shape() {
        let report = FailureReport::new(
            "meridian",
            "date_column: no date format parses every value",
            ErrorClass::ConfigurationError,
        );
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error_type"], "ConfigurationError");

        let io = serde_json::to_value(ErrorClass::IoError).unwrap();
        assert_eq!(io, "IOError");
    }

    #[test]
    fn test_result_document_dispatch() {
        let failure = r#"{"model_type": "meridian", "success": false, "error": "boom"}"#;
        let doc: ResultDocument = serde_json::from_str(failure).unwrap();
        assert!(!doc.is_success());

        let report = TrainingReport {
            model_type: "mmm_native".into(),
            success: true,
            metrics: FitMetrics::default(),
            channel_analysis: IndexMap::new(),
            response_curves: IndexMap::new(),
            optimization: OptimizationSummary::default(),
            provenance: Provenance::default(),
            training_info: None,
            data_quality: None,
        };
        let json = serde_json::to_string(&report).unwrap();
        let doc: ResultDocument = serde_json::from_str(&json).unwrap();
        assert!(doc.is_success());
    }

    #[test]
    fn test_channel_order_survives_serialization() {
        let mut allocation = IndexMap::new();
        allocation.insert("radio_spend".to_string(), 1.0);
        allocation.insert("tv_spend".to_string(), 2.0);
        let summary = OptimizationSummary {
            optimal_allocation: allocation,
            ..OptimizationSummary::default()
        };
        let json = serde_json::to_string(&summary).unwrap();
        let radio = json.find("radio_spend").unwrap();
        let tv = json.find("tv_spend").unwrap();
        assert!(radio < tv);
    }
}
