mod config;
mod logging;

use std::process::ExitCode;

use resource_core::{EnqueueOutcome, ResourceError};
use resource_imagekit::{ImageKitClient, ResourceCenter};
use resource_platform::{PlatformError, PlatformServices, load_local_file};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::{ConfigError, SmokeConfig};

#[derive(Debug, Error)]
enum SmokeError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("media api: {0}")]
    Resource(#[from] ResourceError),
    #[error("local file: {0}")]
    Platform(#[from] PlatformError),
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "resource center smoke run failed");
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), SmokeError> {
    let config = SmokeConfig::from_env()?;
    info!(endpoint = %config.widget.list_endpoint, "starting resource center smoke run");

    let client = ImageKitClient::new(&config.widget)?;
    let center = ResourceCenter::new(client, PlatformServices::in_memory(), config.widget.clone());
    center.open().await?;

    let snapshot = center.snapshot();
    info!(
        assets = snapshot.tiles.len(),
        has_more = snapshot.has_more,
        "first page loaded"
    );
    for tile in snapshot.tiles.iter().take(10) {
        println!(
            "{:<24} {:>5} {:>8}  {}",
            tile.asset.id, tile.format_label, tile.size_label, tile.asset.display_name
        );
    }

    if let Some(path) = &config.upload_path {
        let file = load_local_file(path)?;
        for outcome in center.enqueue(vec![file])? {
            if let EnqueueOutcome::Rejected { key, error } = outcome {
                warn!(%key, code = %error.code, "file rejected before upload");
                return Err(error.into());
            }
        }
        let summary = center.upload_all().await?;
        info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            "upload finished"
        );
    }

    center.close();
    Ok(())
}
