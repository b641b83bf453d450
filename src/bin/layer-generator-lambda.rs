use std::path::Path;

use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::{json, Value};

use event_fetcher::config::LayerEnv;
use event_fetcher::layer::{publish_layer, PipInstaller};
use event_fetcher::logging;
use event_fetcher::storage::S3ObjectStore;

// The only writable location inside the function sandbox
const WORK_DIR: &str = "/tmp";

#[tokio::main]
async fn main() -> Result<(), Error> {
    logging::init_lambda_logging();
    lambda_runtime::run(service_fn(handler)).await
}

async fn handler(_event: LambdaEvent<Value>) -> Result<Value, Error> {
    let env = LayerEnv::from_env()?;
    let store = S3ObjectStore::from_env().await;

    let key = publish_layer(
        &store,
        &PipInstaller::default(),
        Path::new(WORK_DIR),
        &env.bucket,
        &env.library,
    )
    .await?;

    Ok(json!({ "bucket": env.bucket, "key": key }))
}
