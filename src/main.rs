use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use event_fetcher::config::{Config, LookupLocation};
use event_fetcher::fetch::HttpPageSource;
use event_fetcher::logging;
use event_fetcher::pipeline::EventsPipeline;
use event_fetcher::storage::S3ObjectStore;
use event_fetcher::types::RunClock;

/// Scrape the San Diego events listing, write events.csv and upload it to S3.
#[derive(Parser)]
#[command(name = "event_fetcher")]
#[command(version)]
struct Cli {
    /// Destination bucket name
    bucket_name: String,
    /// Destination key prefix, e.g. `external-data/events_data/`
    bucket_path: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    info!("Bucket name : {}", cli.bucket_name);
    info!("S3 File Path : {}", cli.bucket_path);

    let config = Config::load().context("loading configuration")?;
    let source = HttpPageSource::new(&config.user_agent, config.request_timeout())
        .context("building HTTP client")?;
    let store = S3ObjectStore::from_env().await;

    let pipeline = EventsPipeline::new(
        Arc::new(source),
        Arc::new(store),
        config.events_url.clone(),
        config.work_dir.clone(),
    )
    .with_lookup(LookupLocation::from_env());

    let clock = RunClock::now();
    match pipeline
        .run(&cli.bucket_name, &cli.bucket_path, &clock)
        .await
    {
        Ok(summary) if summary.uploaded => {
            info!(
                "Uploaded {} events to s3://{}/{}",
                summary.records, cli.bucket_name, summary.object_key
            );
            Ok(())
        }
        Ok(summary) => {
            warn!(
                "Wrote {} events but the upload did not succeed",
                summary.records
            );
            Ok(())
        }
        Err(e) => {
            error!("Event fetch failed: {}", e);
            Err(e.into())
        }
    }
}
