use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::{json, Value};
use tracing::{error, info};

use event_fetcher::config::{Config, FetcherEnv};
use event_fetcher::logging;
use event_fetcher::remote::{run_remote_fetch, AwsInstanceController, RemoteRunSettings};

#[tokio::main]
async fn main() -> Result<(), Error> {
    logging::init_lambda_logging();
    lambda_runtime::run(service_fn(handler)).await
}

async fn handler(_event: LambdaEvent<Value>) -> Result<Value, Error> {
    let env = FetcherEnv::from_env()?;
    let config = Config::load()?;
    let settings = RemoteRunSettings::from(&config.remote);
    let command_line =
        settings.command_line(&env.bucket_name, &env.bucket_path, env.lookup.as_ref());
    if let Some(lookup) = &env.lookup {
        info!("Forwarding major event lookup s3://{}/{}", lookup.bucket, lookup.key);
    }

    let controller = AwsInstanceController::from_env().await;
    let status = run_remote_fetch(&controller, &env.instance_id, &command_line, &settings)
        .await
        .map_err(|e| {
            error!("An error occurred: {}", e);
            e
        })?;

    Ok(json!({
        "instance_id": env.instance_id,
        "command_status": status.to_string(),
    }))
}
