//! Entry point: parse arguments, initialize logging, run the push, and exit
//! with a status code that reflects the first error encountered (if any).

use archive_registry_pusher::cli::Args;
use archive_registry_pusher::logging;
use archive_registry_pusher::processor::ArchiveProcessor;
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let verbosity = args.verbosity();
    let log_file = args.log_file.clone();
    let color = !args.no_color;

    let _logging_guard = logging::init(verbosity, log_file.as_deref(), color);

    let config = match args.into_push_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let archive_path = config.archive_path.display().to_string();
    let processor = ArchiveProcessor::new(config);

    if let Err(e) = processor.process().await {
        error!(archive = %archive_path, error = %e, "push failed");
        logging::set_first_error(e.to_string());
    }

    match logging::first_error() {
        Some(_) => ExitCode::FAILURE,
        None => ExitCode::SUCCESS,
    }
}
