//! End-to-end tests of the `mmm` binary.
//!
//! Each test writes a CSV and a config into a temporary directory, runs the
//! binary, and inspects the exit code, the progress stream on stdout, and
//! the result document.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use chrono::{Days, NaiveDate};
use mmm_schemas::{ProgressEvent, Stage, TrainingReport};
use serde_json::Value;

// =============================================================================
// HELPERS
// =============================================================================

fn mmm_bin() -> &'static str {
    env!("CARGO_BIN_EXE_mmm")
}

/// ISO date of week `i` counted from Monday 2024-01-01.
fn week(i: u64) -> String {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    (start + Days::new(7 * i)).format("%Y-%m-%d").to_string()
}

/// 52 weekly rows of `date,sales,tv_spend,radio_spend`.
///
/// Returns the CSV text and the total spend over both channels.
fn weekly_csv() -> (String, f64) {
    let mut csv = String::from("date,sales,tv_spend,radio_spend\n");
    let mut total = 0.0;
    for i in 0..52u64 {
        let tv = 100 + (i * 37) % 50;
        let radio = 40 + (i * 13) % 20;
        let sales = 1_000 + 2 * tv + 3 * radio / 2 + 3 * (i % 5);
        writeln!(csv, "{},{sales},{tv},{radio}", week(i)).unwrap();
        total += f64::from(u32::try_from(tv + radio).unwrap());
    }
    (csv, total)
}

struct Run {
    dir: tempfile::TempDir,
}

impl Run {
    fn new(csv: &str, config: &Value) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("data.csv"), csv).unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            serde_json::to_vec(config).unwrap(),
        )
        .unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn output_path(&self) -> PathBuf {
        self.path("result.json")
    }

    fn exec(&self) -> Output {
        run_with(&[
            &self.path("data.csv"),
            &self.path("config.json"),
            &self.output_path(),
        ])
    }

    fn result(&self) -> Value {
        let bytes = std::fs::read(self.output_path()).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn report(&self) -> TrainingReport {
        let bytes = std::fs::read(self.output_path()).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}

fn run_with(args: &[&Path]) -> Output {
    Command::new(mmm_bin())
        .args(args)
        .output()
        .expect("failed to run mmm")
}

fn progress_events(output: &Output) -> Vec<ProgressEvent> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn fast_sampler() -> Value {
    serde_json::json!({ "chains": 1, "adapt": 5, "burnin": 5, "keep": 20, "seed": 7 })
}

// =============================================================================
// SUCCESS PATHS
// =============================================================================

#[test]
fn test_weekly_two_channel_scenario() {
    let (csv, total_spend) = weekly_csv();
    let run = Run::new(
        &csv,
        &serde_json::json!({
            "date_column": "date",
            "target_column": "sales",
            "channel_columns": ["tv_spend", "radio_spend"],
            "sampler": fast_sampler(),
        }),
    );
    let output = run.exec();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let result = run.result();
    assert_eq!(result["success"], true);
    assert_eq!(result["model_type"], "mmm_native");

    // `Value` objects sort their keys; the typed report keeps file order.
    let report = run.report();
    let channels: Vec<&str> =
        report.channel_analysis.keys().map(String::as_str).collect();
    assert_eq!(channels, ["tv_spend", "radio_spend"]);
    let allocation_order: Vec<&str> = report
        .optimization
        .optimal_allocation
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(allocation_order, ["tv_spend", "radio_spend"]);

    let allocated: f64 = result["optimization"]["optimal_allocation"]
        .as_object()
        .unwrap()
        .values()
        .map(|v| v.as_f64().unwrap())
        .sum();
    assert!((allocated - total_spend).abs() < 1e-6 * total_spend);
    assert!(
        (result["optimization"]["current_budget"].as_f64().unwrap() - total_spend).abs()
            < 1e-6
    );

    let shares: f64 = result["channel_analysis"]
        .as_object()
        .unwrap()
        .values()
        .map(|a| a["contribution_percentage"].as_f64().unwrap())
        .sum();
    let contributions: f64 = result["channel_analysis"]
        .as_object()
        .unwrap()
        .values()
        .map(|a| a["contribution"].as_f64().unwrap())
        .sum();
    if contributions > 0.0 {
        assert!((shares - 1.0).abs() < 1e-6);
    }

    assert_eq!(result["training_info"]["backend"], "native-v1");
    assert_eq!(result["training_info"]["keep"], 20);
    assert_eq!(
        result["provenance"]["columns"]["channel_columns"]["source"],
        "configured"
    );
    assert!(result["data_quality"]["score"].as_u64().is_some());
}

#[test]
fn test_progress_stream_is_monotone() {
    let (csv, _) = weekly_csv();
    let run = Run::new(
        &csv,
        &serde_json::json!({
            "date_column": "date",
            "target_column": "sales",
            "backend": { "kind": "mock" },
        }),
    );
    let output = run.exec();
    assert!(output.status.success());

    let events = progress_events(&output);
    let stages: Vec<Stage> = events.iter().map(|e| e.status).collect();
    assert_eq!(
        stages,
        [
            Stage::LoadingData,
            Stage::DataLoaded,
            Stage::DataPrepared,
            Stage::ModelConfigured,
            Stage::TrainingStarted,
            Stage::ResultsExtracted,
            Stage::ResultsSaved,
            Stage::Completed,
        ]
    );
    assert!(events.windows(2).all(|w| w[0].progress <= w[1].progress));
    assert_eq!(events.last().map(|e| e.progress), Some(100));
}

#[test]
fn test_mock_backend_with_heuristic_channels() {
    let (csv, _) = weekly_csv();
    let run = Run::new(
        &csv,
        &serde_json::json!({
            "date_column": "date",
            "target_column": "sales",
            "backend": { "kind": "mock" },
        }),
    );
    assert!(run.exec().status.success());

    let result = run.result();
    assert_eq!(result["model_type"], "meridian_mock");
    assert!(result["channel_analysis"].get("tv_spend").is_some());
    assert_eq!(
        result["provenance"]["columns"]["channel_columns"]["source"],
        "heuristic"
    );
    // Mock output carries no intervals, so bounds are the labelled fallback.
    assert_eq!(
        result["channel_analysis"]["tv_spend"]["roi_interval"],
        "approximate"
    );
}

#[test]
fn test_opt_in_mock_fallback_after_backend_failure() {
    let (csv, _) = weekly_csv();
    let run = Run::new(
        &csv,
        &serde_json::json!({
            "date_column": "date",
            "target_column": "sales",
            "backend": { "kind": "subprocess", "command": ["/nonexistent/mmm-bridge"] },
            "allow_mock_fallback": true,
        }),
    );
    assert!(run.exec().status.success());

    let result = run.result();
    assert_eq!(result["model_type"], "meridian_mock");
    assert!(
        result["provenance"]["mock_fallback_reason"]
            .as_str()
            .unwrap()
            .contains("/nonexistent/mmm-bridge")
    );
    assert_eq!(result["training_info"]["backend"], "mock-v1");
}

// =============================================================================
// FAILURE PATHS
// =============================================================================

#[test]
fn test_backend_failure_without_opt_in() {
    let (csv, _) = weekly_csv();
    let run = Run::new(
        &csv,
        &serde_json::json!({
            "date_column": "date",
            "target_column": "sales",
            "backend": { "kind": "subprocess", "command": ["/nonexistent/mmm-bridge"] },
        }),
    );
    let output = run.exec();
    assert_eq!(output.status.code(), Some(1));

    let result = run.result();
    assert_eq!(result["success"], false);
    assert_eq!(result["model_type"], "meridian");
    assert_eq!(result["error_type"], "ExternalModelError");
}

#[test]
fn test_malformed_dates_write_failure_document() {
    let mut csv = String::from("date,sales,tv_spend,radio_spend\n");
    for i in 0..10 {
        writeln!(csv, "not-a-date-{i},100,10,5").unwrap();
    }
    let run = Run::new(
        &csv,
        &serde_json::json!({
            "date_column": "date",
            "target_column": "sales",
            "channel_columns": ["tv_spend", "radio_spend"],
        }),
    );
    let output = run.exec();
    assert_eq!(output.status.code(), Some(1));

    let result = run.result();
    assert_eq!(result["success"], false);
    assert_eq!(result["error_type"], "ConfigurationError");
    assert!(result["error"].as_str().unwrap().contains("date_column"));

    let events = progress_events(&output);
    let last = events.last().unwrap();
    assert_eq!(last.status, Stage::Error);
    assert_eq!(last.progress, 20);
}

#[test]
fn test_repeated_channel_is_configuration_error() {
    let (csv, _) = weekly_csv();
    let run = Run::new(
        &csv,
        &serde_json::json!({
            "date_column": "date",
            "target_column": "sales",
            "channel_columns": ["tv_spend", "radio_spend", "tv_spend"],
            "backend": { "kind": "mock" },
        }),
    );
    let output = run.exec();
    assert_eq!(output.status.code(), Some(1));

    let result = run.result();
    assert_eq!(result["success"], false);
    assert_eq!(result["error_type"], "ConfigurationError");
    assert!(result["error"].as_str().unwrap().contains("channel_columns"));
}

#[test]
fn test_negative_spend_is_configuration_error() {
    let (csv, _) = weekly_csv();
    let csv = csv.replacen(",100,", ",-100,", 1);
    let run = Run::new(
        &csv,
        &serde_json::json!({
            "date_column": "date",
            "target_column": "sales",
            "channel_columns": ["tv_spend", "radio_spend"],
            "backend": { "kind": "mock" },
        }),
    );
    let output = run.exec();
    assert_eq!(output.status.code(), Some(1));

    let result = run.result();
    assert_eq!(result["error_type"], "ConfigurationError");
    assert!(result["error"].as_str().unwrap().contains("negative"));
}

#[test]
fn test_missing_data_file_is_io_error() {
    let run = Run::new("", &serde_json::json!({}));
    let output = run_with(&[
        &run.path("missing.csv"),
        &run.path("config.json"),
        &run.output_path(),
    ]);
    assert_eq!(output.status.code(), Some(1));

    let result = run.result();
    assert_eq!(result["success"], false);
    assert_eq!(result["error_type"], "IOError");
}

#[test]
fn test_wrong_argument_count_prints_usage() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("result.json");
    let output = run_with(&[&dir.path().join("data.csv"), &output_path]);

    assert_eq!(output.status.code(), Some(1));
    let stdout: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        stdout["error"],
        "Usage: mmm <data_file> <config_file> <output_file>"
    );
    assert!(!output_path.exists());

    let extra = run_with(&[
        Path::new("a.csv"),
        Path::new("b.json"),
        Path::new("c.json"),
        Path::new("d.json"),
    ]);
    assert_eq!(extra.status.code(), Some(1));
}
