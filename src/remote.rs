//! Drives the scrape on a compute instance: start it, wait for it to run,
//! execute the fetch command remotely, poll until the command settles, and
//! stop the instance again.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ec2::types::InstanceStateName;
use tokio::time::{sleep, Instant};
use tracing::{error, info, instrument, warn};

use crate::config::{LookupLocation, RemoteConfig};
use crate::constants::{ENV_MAJOR_EVENTS_BUCKET, ENV_MAJOR_EVENTS_CSV_PATH, REMOTE_DOCUMENT};
use crate::error::{RemoteError, Result};

/// Remote command states as reported by the command service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Pending,
    InProgress,
    Delayed,
    Success,
    Cancelled,
    TimedOut,
    Failed,
    Cancelling,
    Other(String),
}

impl CommandStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "Pending" => Self::Pending,
            "InProgress" => Self::InProgress,
            "Delayed" => Self::Delayed,
            "Success" => Self::Success,
            "Cancelled" => Self::Cancelled,
            "TimedOut" => Self::TimedOut,
            "Failed" => Self::Failed,
            "Cancelling" => Self::Cancelling,
            other => Self::Other(other.to_string()),
        }
    }

    /// Only `Pending` and `InProgress` keep the poll loop going.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("Pending"),
            Self::InProgress => f.write_str("InProgress"),
            Self::Delayed => f.write_str("Delayed"),
            Self::Success => f.write_str("Success"),
            Self::Cancelled => f.write_str("Cancelled"),
            Self::TimedOut => f.write_str("TimedOut"),
            Self::Failed => f.write_str("Failed"),
            Self::Cancelling => f.write_str("Cancelling"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

#[async_trait]
pub trait InstanceController: Send + Sync {
    async fn start(&self, instance_id: &str) -> Result<()>;
    async fn is_running(&self, instance_id: &str) -> Result<bool>;
    /// Returns the command id.
    async fn send_command(&self, instance_id: &str, script: &str) -> Result<String>;
    async fn command_status(&self, command_id: &str) -> Result<CommandStatus>;
    async fn stop(&self, instance_id: &str) -> Result<()>;
}

fn api_error(err: impl fmt::Display) -> RemoteError {
    RemoteError::Api {
        message: err.to_string(),
    }
}

pub struct AwsInstanceController {
    ec2: aws_sdk_ec2::Client,
    ssm: aws_sdk_ssm::Client,
}

impl AwsInstanceController {
    pub async fn from_env() -> Self {
        let shared_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::from_config(&shared_config)
    }

    pub fn from_config(shared_config: &aws_config::SdkConfig) -> Self {
        Self {
            ec2: aws_sdk_ec2::Client::new(shared_config),
            ssm: aws_sdk_ssm::Client::new(shared_config),
        }
    }
}

#[async_trait]
impl InstanceController for AwsInstanceController {
    async fn start(&self, instance_id: &str) -> Result<()> {
        self.ec2
            .start_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| api_error(aws_sdk_ec2::error::DisplayErrorContext(e)))?;
        Ok(())
    }

    async fn is_running(&self, instance_id: &str) -> Result<bool> {
        let output = self
            .ec2
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| api_error(aws_sdk_ec2::error::DisplayErrorContext(e)))?;

        let running = output
            .reservations()
            .iter()
            .flat_map(|reservation| reservation.instances())
            .filter(|instance| instance.instance_id() == Some(instance_id))
            .any(|instance| {
                instance.state().and_then(|state| state.name()) == Some(&InstanceStateName::Running)
            });
        Ok(running)
    }

    async fn send_command(&self, instance_id: &str, script: &str) -> Result<String> {
        let output = self
            .ssm
            .send_command()
            .instance_ids(instance_id)
            .document_name(REMOTE_DOCUMENT)
            .parameters("commands", vec![script.to_string()])
            .send()
            .await
            .map_err(|e| api_error(aws_sdk_ssm::error::DisplayErrorContext(e)))?;

        let command_id = output
            .command()
            .and_then(|command| command.command_id())
            .ok_or_else(|| api_error("send_command returned no command id"))?;
        Ok(command_id.to_string())
    }

    async fn command_status(&self, command_id: &str) -> Result<CommandStatus> {
        let output = self
            .ssm
            .list_commands()
            .command_id(command_id)
            .send()
            .await
            .map_err(|e| api_error(aws_sdk_ssm::error::DisplayErrorContext(e)))?;

        let command = output
            .commands()
            .first()
            .ok_or_else(|| RemoteError::CommandNotFound {
                command_id: command_id.to_string(),
            })?;
        Ok(command
            .status()
            .map(|status| CommandStatus::parse(status.as_str()))
            .unwrap_or(CommandStatus::Pending))
    }

    async fn stop(&self, instance_id: &str) -> Result<()> {
        self.ec2
            .stop_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| api_error(aws_sdk_ec2::error::DisplayErrorContext(e)))?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RemoteRunSettings {
    pub script: String,
    pub instance_poll: Duration,
    pub instance_wait_timeout: Duration,
    pub warmup: Duration,
    pub command_poll: Duration,
}

impl From<&RemoteConfig> for RemoteRunSettings {
    fn from(config: &RemoteConfig) -> Self {
        Self {
            script: config.script.clone(),
            instance_poll: Duration::from_secs(config.instance_poll_secs),
            instance_wait_timeout: Duration::from_secs(config.instance_wait_timeout_secs),
            warmup: Duration::from_secs(config.warmup_secs),
            command_poll: Duration::from_secs(config.command_poll_secs),
        }
    }
}

impl RemoteRunSettings {
    /// The command line the instance runs: the fetch binary with the
    /// destination bucket and prefix as its two positional arguments. A
    /// lookup location travels as environment assignments in front of it.
    pub fn command_line(&self, bucket: &str, path: &str, lookup: Option<&LookupLocation>) -> String {
        let command = format!("{} {} {}", self.script, bucket, path);
        match lookup {
            Some(location) => format!(
                "{}={} {}={} {}",
                ENV_MAJOR_EVENTS_BUCKET,
                shell_quote(&location.bucket),
                ENV_MAJOR_EVENTS_CSV_PATH,
                shell_quote(&location.key),
                command
            ),
            None => command,
        }
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

async fn wait_until_running(
    controller: &dyn InstanceController,
    instance_id: &str,
    settings: &RemoteRunSettings,
) -> Result<()> {
    let deadline = Instant::now() + settings.instance_wait_timeout;
    loop {
        if controller.is_running(instance_id).await? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(RemoteError::InstanceTimeout {
                instance_id: instance_id.to_string(),
                waited_secs: settings.instance_wait_timeout.as_secs(),
            }
            .into());
        }
        sleep(settings.instance_poll).await;
    }
}

async fn run_on_instance(
    controller: &dyn InstanceController,
    instance_id: &str,
    command_line: &str,
    settings: &RemoteRunSettings,
) -> Result<CommandStatus> {
    wait_until_running(controller, instance_id, settings).await?;
    info!("EC2 instance is up and running: {}", instance_id);

    // Give the instance time to finish initializing
    sleep(settings.warmup).await;

    let command_id = controller.send_command(instance_id, command_line).await?;
    info!(command_id = %command_id, "Sent remote command");

    loop {
        let status = controller.command_status(&command_id).await?;
        if !status.is_in_flight() {
            return Ok(status);
        }
        info!("Remote command still in progress. Waiting...");
        sleep(settings.command_poll).await;
    }
}

/// Runs `command_line` on the instance and returns the command's final
/// status. The instance is stopped whether or not the command step worked.
#[instrument(skip(controller, settings))]
pub async fn run_remote_fetch(
    controller: &dyn InstanceController,
    instance_id: &str,
    command_line: &str,
    settings: &RemoteRunSettings,
) -> Result<CommandStatus> {
    controller.start(instance_id).await?;
    info!("Started EC2 instance: {}", instance_id);

    let outcome = run_on_instance(controller, instance_id, command_line, settings).await;
    match &outcome {
        Ok(status) => info!("Remote command completed with status: {}", status),
        Err(e) => error!("Remote run failed: {}", e),
    }

    match controller.stop(instance_id).await {
        Ok(()) => info!("Stopped EC2 instance: {}", instance_id),
        Err(e) if outcome.is_ok() => return Err(e),
        Err(e) => warn!("Failed to stop EC2 instance {}: {}", instance_id, e),
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedController {
        running_after: usize,
        statuses: Mutex<VecDeque<CommandStatus>>,
        calls: Mutex<Vec<String>>,
        state_checks: Mutex<usize>,
    }

    impl ScriptedController {
        fn new(running_after: usize, statuses: Vec<CommandStatus>) -> Self {
            Self {
                running_after,
                statuses: Mutex::new(statuses.into()),
                ..Default::default()
            }
        }

        fn log(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InstanceController for ScriptedController {
        async fn start(&self, instance_id: &str) -> Result<()> {
            self.log(format!("start {instance_id}"));
            Ok(())
        }

        async fn is_running(&self, _instance_id: &str) -> Result<bool> {
            let mut checks = self.state_checks.lock().unwrap();
            *checks += 1;
            Ok(*checks > self.running_after)
        }

        async fn send_command(&self, _instance_id: &str, script: &str) -> Result<String> {
            self.log(format!("send {script}"));
            Ok("cmd-1".to_string())
        }

        async fn command_status(&self, command_id: &str) -> Result<CommandStatus> {
            self.log(format!("status {command_id}"));
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| {
                    RemoteError::CommandNotFound {
                        command_id: command_id.to_string(),
                    }
                    .into()
                })
        }

        async fn stop(&self, instance_id: &str) -> Result<()> {
            self.log(format!("stop {instance_id}"));
            Ok(())
        }
    }

    fn settings(wait_timeout: Duration) -> RemoteRunSettings {
        RemoteRunSettings {
            script: "/opt/event_fetcher".to_string(),
            instance_poll: Duration::ZERO,
            instance_wait_timeout: wait_timeout,
            warmup: Duration::ZERO,
            command_poll: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn polls_until_command_settles_then_stops() {
        let controller = ScriptedController::new(
            2,
            vec![
                CommandStatus::Pending,
                CommandStatus::InProgress,
                CommandStatus::Success,
            ],
        );
        let settings = settings(Duration::from_secs(60));
        let command_line = settings.command_line("lake", "events/", None);

        let status = run_remote_fetch(&controller, "i-123", &command_line, &settings)
            .await
            .unwrap();

        assert_eq!(status, CommandStatus::Success);
        assert_eq!(
            controller.calls(),
            vec![
                "start i-123",
                "send /opt/event_fetcher lake events/",
                "status cmd-1",
                "status cmd-1",
                "status cmd-1",
                "stop i-123",
            ]
        );
    }

    #[tokio::test]
    async fn failed_command_is_a_final_status() {
        let controller = ScriptedController::new(0, vec![CommandStatus::parse("Failed")]);
        let settings = settings(Duration::from_secs(60));
        let status = run_remote_fetch(&controller, "i-1", "x", &settings).await.unwrap();
        assert_eq!(status, CommandStatus::Failed);
    }

    #[tokio::test]
    async fn instance_is_stopped_when_it_never_runs() {
        let controller = ScriptedController::new(usize::MAX, vec![]);
        let err = run_remote_fetch(&controller, "i-9", "x", &settings(Duration::ZERO))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("did not reach running state"));
        assert_eq!(controller.calls(), vec!["start i-9", "stop i-9"]);
    }

    #[test]
    fn lookup_location_is_forwarded_as_environment() {
        let settings = settings(Duration::ZERO);
        let lookup = LookupLocation {
            bucket: "reference".into(),
            key: "lookups/major events.csv".into(),
        };
        assert_eq!(
            settings.command_line("lake", "events/", Some(&lookup)),
            "MAJOR_EVENTS_S3_BUCKET_NAME='reference' \
             MAJOR_EVENTS_CSV_FILE_PATH='lookups/major events.csv' \
             /opt/event_fetcher lake events/"
        );
        assert_eq!(
            settings.command_line("lake", "events/", None),
            "/opt/event_fetcher lake events/"
        );
    }

    #[test]
    fn quoting_survives_single_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn unknown_statuses_are_final() {
        let status = CommandStatus::parse("Terminated");
        assert!(!status.is_in_flight());
        assert_eq!(status.to_string(), "Terminated");
        assert!(CommandStatus::parse("InProgress").is_in_flight());
        assert!(!CommandStatus::Delayed.is_in_flight());
    }
}
