//! Cutout CLI: remove the background of local images through the Cutout API.
//!
//! Set CUTOUT_API_URL (or API_URL) to point at the server.

use anyhow::Context;
use clap::Parser;
use cutout_api_client::{
    ApiClient, BatchOrchestrator, BatchSettings, ClientConfig, DirectorySink, LogNotifier,
    SourceFile,
};
use cutout_cli::{init_tracing, BatchSummary};
use cutout_core::OutputFormat;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "cutout", about = "Remove image backgrounds with the Cutout API")]
struct Cli {
    /// Images to process
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Output format: png, jpg, jpeg or webp
    #[arg(long, default_value = "png")]
    format: OutputFormat,

    /// Save all results as a single zip archive
    #[arg(long)]
    zip: bool,

    /// Directory the results are written to
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Server base URL (overrides CUTOUT_API_URL)
    #[arg(long)]
    server: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Retries after a timeout or conflict
    #[arg(long)]
    retries: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env();
    if let Some(server) = cli.server {
        config.base_url = server;
    }
    if let Some(secs) = cli.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(retries) = cli.retries {
        config.max_retries = retries;
    }
    let client = ApiClient::new(config).context("Failed to create API client")?;

    let mut files = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        files.push(SourceFile::from_path(path).await?);
    }

    let settings = BatchSettings {
        default_format: cli.format,
        batch_zip: cli.zip,
    };
    let orchestrator = BatchOrchestrator::new(client, Arc::new(LogNotifier));
    let report = orchestrator.submit_batch(files, &settings).await?;

    let sink = DirectorySink::new(&cli.out_dir);
    let saved = orchestrator.download_all(&settings, &sink).await?;

    let summary = BatchSummary::new(&report, saved);
    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped,
        out_dir = %cli.out_dir.display(),
        "Batch finished"
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("Serialize summary")?
    );

    if summary.succeeded == 0 && summary.failed > 0 {
        anyhow::bail!("No images were processed");
    }
    Ok(())
}
