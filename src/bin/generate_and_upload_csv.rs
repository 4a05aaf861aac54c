use std::process::ExitCode;

use anyhow::Context;
use tracing::{debug, error, info};

use genre_recommendation::{
    app::Components,
    config::{self, Config},
    observability, pipeline::ReportSummary,
};

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv_path = config::load_dotenv();
    observability::install_panic_hook();
    let _telemetry = match observability::init("generate-and-upload-csv") {
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
                key = %summary.report_key,
                rows = summary.rows,
                "recommendations CSV generated and uploaded successfully"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "generate-and-upload-csv failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<ReportSummary> {
    let config = Config::from_env().context("failed to load configuration")?;
    let components = Components::build(config).context("failed to build pipeline components")?;

    components
        .generate_and_upload()
        .run()
        .await
        .context("generate-and-upload stage aborted")
}
