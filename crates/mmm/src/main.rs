mod pipeline;
mod progress;

use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use clap::error::ErrorKind;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use itertools::Itertools;
use mimalloc::MiMalloc;
use mmm_schemas::RunConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use crate::pipeline::RunPaths;
use crate::progress::ProgressReporter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Message printed as `{"error": ...}` when the arguments are wrong.
const USAGE: &str = "Usage: mmm <data_file> <config_file> <output_file>";

/// Train a marketing-mix model on a CSV time series.
///
/// Progress is streamed to stdout as newline-delimited JSON; logs go to
/// stderr. The result document (success or failure) is written to the
/// output file.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,

    /// Print the JSON Schema of the configuration file and exit
    #[arg(long)]
    config_schema: bool,

    /// Input time series (CSV, one row per period and geo)
    data_file: Option<Utf8PathBuf>,

    /// Run configuration (JSON)
    config_file: Option<Utf8PathBuf>,

    /// Where to write the result document (JSON)
    output_file: Option<Utf8PathBuf>,
}

fn usage_error() -> ExitCode {
    println!("{}", serde_json::json!({ "error": USAGE }));
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err)
            if matches!(
                err.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) =>
        {
            err.exit()
        }
        Err(err) => {
            eprintln!("{err}");
            return usage_error();
        }
    };

    if cli.config_schema {
        let schema = schemars::schema_for!(RunConfig);
        return match serde_json::to_string_pretty(&schema) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("error: {err}");
                ExitCode::FAILURE
            }
        };
    }

    let (Some(data), Some(config), Some(output)) =
        (cli.data_file, cli.config_file, cli.output_file)
    else {
        return usage_error();
    };

    // Logs go to stderr; stdout carries only the progress stream.
    const CRATES: &[&str] = &[
        "mmm",
        "mmm_adapter",
        "mmm_backend",
        "mmm_normalize",
        "mmm_schemas",
    ];
    let level = cli.verbose.tracing_level_filter();
    let allowlist = CRATES.iter().map(|c| format!("{c}={level}")).join(",");
    let filter = EnvFilter::new(format!("warn,{allowlist}"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    let paths = RunPaths {
        data,
        config,
        output,
    };
    let mut progress = ProgressReporter::new(std::io::stdout().lock());
    if pipeline::run(&paths, &mut progress) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
