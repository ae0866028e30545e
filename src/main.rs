use std::process::ExitCode;

use anyhow::Context;
use hdr_log_processor::logging::init_logging;
use hdr_log_processor::{Cli, Config};
use tracing::debug;

#[tokio::main]
async fn main() -> ExitCode {
    // Exits with usage on bad arguments, before anything is opened.
    let cli = Cli::parse_legacy(std::env::args_os());
    init_logging();

    let config = Config::from(cli);
    debug!(?config, "starting");

    // The pass is plain blocking I/O; keep it off the runtime's async workers.
    let result = tokio::task::spawn_blocking(move || hdr_log_processor::run(config))
        .await
        .context("processing task failed")
        .and_then(|r| r.context("histogram log processing failed"));

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
