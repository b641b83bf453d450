use std::sync::Arc;

use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;
use tracing::info;

use event_fetcher::config::{Config, MajorEventsEnv};
use event_fetcher::dates::{DateRangeNormalizer, MonthTable};
use event_fetcher::fetch::HttpPageSource;
use event_fetcher::logging;
use event_fetcher::pipeline::MajorEventsPipeline;
use event_fetcher::scrapers::major_events::MajorEventsCrawler;
use event_fetcher::storage::S3ObjectStore;
use event_fetcher::types::RunClock;

#[tokio::main]
async fn main() -> Result<(), Error> {
    logging::init_lambda_logging();
    lambda_runtime::run(service_fn(handler)).await
}

async fn handler(_event: LambdaEvent<Value>) -> Result<Value, Error> {
    let env = MajorEventsEnv::from_env()?;
    let config = Config::load()?;

    let source = HttpPageSource::new(&config.user_agent, config.request_timeout())?;
    let crawler = MajorEventsCrawler::new(
        Arc::new(source),
        config.major_events_url.clone(),
        config.detail_page_delay(),
    );
    let store = S3ObjectStore::from_env().await;
    let pipeline = MajorEventsPipeline::new(
        crawler,
        Arc::new(store),
        DateRangeNormalizer::with_months(MonthTable::english_long()),
    );

    let summary = pipeline
        .run(&env.bucket_name, &env.bucket_path, &RunClock::now())
        .await?;
    info!("Major events run finished: {} records", summary.records);

    Ok(serde_json::to_value(&summary)?)
}
