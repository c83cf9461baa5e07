//! One training run, from input files to the result document.

use std::io::Write;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use mmm_adapter::{AdaptedInput, AdapterError, adapt, load_table};
use mmm_backend::{
    BackendDescriptor, BackendError, MockBackend, ModelBackend, select_backend,
};
use mmm_normalize::{NormalizeContext, NormalizeError, normalize};
use mmm_schemas::{
    ConfigError, ErrorClass, FailureReport, ModelOutput, RunConfig, Stage,
    TrainingInfo, TrainingReport, load_run_config,
};
use serde::Serialize;
use tracing::{debug_span, error, info, warn};

use crate::progress::ProgressReporter;

/// `model_type` of a failure document written before the backend is known.
const UNKNOWN_MODEL_TYPE: &str = "unknown";

/// The three positional paths of an invocation.
#[derive(Debug, Clone)]
pub(crate) struct RunPaths {
    pub data: Utf8PathBuf,
    pub config: Utf8PathBuf,
    pub output: Utf8PathBuf,
}

/// Runs the pipeline and writes exactly one result document.
///
/// Returns whether the run succeeded. On failure a [`FailureReport`] is
/// written to the output path, the progress stream ends with an error
/// event, and the message goes to stderr.
pub(crate) fn run<W: Write>(
    paths: &RunPaths,
    progress: &mut ProgressReporter<W>,
) -> bool {
    let mut model_type = UNKNOWN_MODEL_TYPE.to_string();
    let Err(err) = train(paths, progress, &mut model_type) else {
        return true;
    };

    let class = classify(&err);
    let message = format!("{err:#}");
    error!(error = %message, class = ?class, "run.failed");
    eprintln!("error: {message}");
    progress.fail(message.clone());

    let failure = FailureReport::new(model_type, message, class);
    if let Err(write_err) = write_json(&paths.output, &failure) {
        error!(error = %format!("{write_err:#}"), "run.failure_document_unwritable");
    }
    false
}

fn train<W: Write>(
    paths: &RunPaths,
    progress: &mut ProgressReporter<W>,
    model_type: &mut String,
) -> Result<()> {
    let _span = debug_span!("train").entered();

    progress.stage(Stage::LoadingData);
    let config = load_run_config(paths.config.as_std_path())
        .with_context(|| format!("failed to load config {}", paths.config))?;
    let backend = select_backend(&config.backend, config.threads)?;
    let descriptor = backend.descriptor();
    model_type.clone_from(&descriptor.model_type);

    let table = load_table(paths.data.as_std_path())
        .with_context(|| format!("failed to read data {}", paths.data))?;
    info!(rows = table.len(), columns = table.headers().len(), "data.loaded");
    progress.stage_with(Stage::DataLoaded, format!("{} rows", table.len()));

    let adapted = adapt(&table, &config)?;
    let arrays = &adapted.arrays;
    progress.stage_with(
        Stage::DataPrepared,
        format!(
            "{} geos x {} periods x {} channels",
            arrays.n_geos(),
            arrays.n_times(),
            arrays.n_channels()
        ),
    );

    info!(backend = descriptor.id, model_type = %descriptor.model_type, "model.configured");
    progress.stage(Stage::ModelConfigured);

    progress.stage(Stage::TrainingStarted);
    let fitted = fit(backend.as_ref(), descriptor, &adapted, &config)?;
    *model_type = fitted.model_type.clone();

    let report = assemble(&fitted, &adapted, &config)?;
    progress.stage(Stage::ResultsExtracted);

    write_json(&paths.output, &report)?;
    info!(path = %paths.output, "results.saved");
    progress.stage(Stage::ResultsSaved);

    progress.stage(Stage::Completed);
    Ok(())
}

/// Backend output and the backend that actually produced it.
struct Fitted {
    output: ModelOutput,
    producer: BackendDescriptor,
    model_type: String,
    mock_fallback_reason: Option<String>,
}

/// Fits the configured backend, substituting mock output only when the
/// configuration opts in and the real backend failed.
fn fit(
    backend: &dyn ModelBackend,
    descriptor: BackendDescriptor,
    adapted: &AdaptedInput,
    config: &RunConfig,
) -> Result<Fitted> {
    match backend.fit(&adapted.arrays, &config.sampler) {
        Ok(output) => Ok(Fitted {
            output,
            model_type: descriptor.model_type.clone(),
            producer: descriptor,
            mock_fallback_reason: None,
        }),
        Err(err) if config.allow_mock_fallback => {
            let reason = err.to_string();
            warn!(
                error = %reason,
                backend = descriptor.id,
                "model.mock_fallback"
            );
            let mock = MockBackend::standing_in_for(&descriptor.model_type);
            let output = mock.fit(&adapted.arrays, &config.sampler)?;
            Ok(Fitted {
                output,
                model_type: mock.model_type(),
                producer: mock.descriptor(),
                mock_fallback_reason: Some(reason),
            })
        }
        Err(err) => Err(err.into()),
    }
}

/// Builds the success document from backend output.
fn assemble(
    fitted: &Fitted,
    adapted: &AdaptedInput,
    config: &RunConfig,
) -> Result<TrainingReport> {
    let columns = adapted.columns.provenance();
    let ctx = NormalizeContext {
        model_type: &fitted.model_type,
        backend: fitted.producer.id,
        channels: &adapted.arrays.channels,
        spend: &adapted.spend_totals,
        columns: &columns,
    };
    let mut report = normalize(&fitted.output, &ctx)?;

    report
        .provenance
        .mock_fallback_reason
        .clone_from(&fitted.mock_fallback_reason);
    let sampler = config.sampler;
    report.training_info = Some(TrainingInfo {
        backend: fitted.producer.id.to_string(),
        api_version: fitted.producer.api_version.clone(),
        chains: sampler.chains,
        adapt: sampler.adapt,
        burnin: sampler.burnin,
        keep: sampler.keep,
        seed: sampler.seed,
        threads: config.threads,
    });
    report.data_quality = Some(adapted.quality.clone());
    Ok(report)
}

/// Writes a document as pretty-printed JSON, replacing any existing file.
fn write_json(path: &Utf8Path, value: &impl Serialize) -> Result<()> {
    let mut json = serde_json::to_vec_pretty(value)?;
    json.push(b'\n');
    std::fs::write(path, json)
        .with_context(|| format!("failed to write {path}"))
}

/// Maps a run failure onto the result document's error taxonomy.
pub(crate) fn classify(err: &anyhow::Error) -> ErrorClass {
    if let Some(err) = err.downcast_ref::<AdapterError>() {
        return if err.is_io() || err.is_csv() {
            ErrorClass::IoError
        } else if err.is_shape() {
            ErrorClass::ShapeError
        } else {
            ErrorClass::ConfigurationError
        };
    }
    if let Some(err) = err.downcast_ref::<ConfigError>() {
        return if err.is_io() {
            ErrorClass::IoError
        } else {
            ErrorClass::ConfigurationError
        };
    }
    if let Some(err) = err.downcast_ref::<NormalizeError>() {
        return if err.is_shape() {
            ErrorClass::ShapeError
        } else {
            ErrorClass::ExternalModelError
        };
    }
    if err.downcast_ref::<BackendError>().is_some() {
        return ErrorClass::ExternalModelError;
    }
    if err.downcast_ref::<std::io::Error>().is_some() {
        return ErrorClass::IoError;
    }
    ErrorClass::ConfigurationError
}
