use std::process::ExitCode;

use anyhow::Context;
use tracing::{debug, error, info};

use genre_recommendation::{
    app::Components,
    config::{self, Config},
    observability, pipeline::ProcessSummary,
};

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv_path = config::load_dotenv();
    observability::install_panic_hook();
    let _telemetry = match observability::init("process-and-send") {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize tracing: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    debug!(path = ?dotenv_path, "environment loaded");

    match run().await {
        Ok(summary) => {
            info!(
                assets = summary.assets,
                aggregated = summary.aggregated,
                failed_asset_ids = ?summary.failed_asset_ids,
                "processed assets and sent to DS successfully"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "process-and-send failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<ProcessSummary> {
    let config = Config::from_env().context("failed to load configuration")?;
    let components = Components::build(config).context("failed to build pipeline components")?;

    components
        .process_and_send()
        .run()
        .await
        .context("process-and-send stage aborted")
}
