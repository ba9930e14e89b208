//! `target-mysql` binary.
//!
//! Reads Singer messages from standard input (or a file), materializes them into MySQL tables
//! and writes every acknowledged STATE message to standard output.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use config::load_config;
use config::shared::TargetConfig;

use crate::core::run_with_config;
use crate::error::{LoaderError, LoaderResult};

mod core;
mod error;

/// Command line arguments of the loader.
#[derive(Debug, Parser)]
#[command(name = "target-mysql", version, about = "Load a Singer stream into MySQL")]
struct Args {
    /// Path to the JSON or YAML configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Read messages from this file instead of standard input.
    #[arg(short, long)]
    input: Option<PathBuf>,
}

fn main() -> ExitCode {
    match try_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

/// Loads configuration, initializes tracing, starts the async runtime and runs the loader.
fn try_main() -> LoaderResult<()> {
    let args = Args::parse();

    let target_config = load_target_config(&args)?;

    let _log_flusher =
        telemetry::init_tracing(env!("CARGO_BIN_NAME")).map_err(LoaderError::config)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run_with_config(target_config, args.input))
}

fn load_target_config(args: &Args) -> LoaderResult<TargetConfig> {
    let config = load_config::<TargetConfig>(&args.config).map_err(LoaderError::config)?;
    config.validate().map_err(LoaderError::config)?;

    Ok(config)
}
