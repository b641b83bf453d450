use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::constants;
use crate::error::{Result, ScraperError};

/// Tunables, optionally overridden from `fetcher.toml` (or the file named by
/// `EVENT_FETCHER_CONFIG`). Every field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub events_url: String,
    pub major_events_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub detail_page_delay_ms: u64,
    pub work_dir: PathBuf,
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub script: String,
    pub instance_poll_secs: u64,
    pub instance_wait_timeout_secs: u64,
    pub warmup_secs: u64,
    pub command_poll_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            events_url: constants::EVENTS_URL.to_string(),
            major_events_url: constants::MAJOR_EVENTS_URL.to_string(),
            user_agent: constants::USER_AGENT.to_string(),
            request_timeout_secs: constants::REQUEST_TIMEOUT_SECS,
            detail_page_delay_ms: constants::DETAIL_PAGE_DELAY_MS,
            work_dir: PathBuf::from("."),
            remote: RemoteConfig::default(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            script: constants::REMOTE_SCRIPT.to_string(),
            instance_poll_secs: constants::INSTANCE_POLL_SECS,
            instance_wait_timeout_secs: constants::INSTANCE_WAIT_TIMEOUT_SECS,
            warmup_secs: constants::INSTANCE_WARMUP_SECS,
            command_poll_secs: constants::COMMAND_POLL_SECS,
        }
    }
}

impl Config {
    /// Loads the config file if present, defaults otherwise.
    pub fn load() -> Result<Self> {
        let path = env::var(constants::ENV_CONFIG_FILE)
            .unwrap_or_else(|_| constants::DEFAULT_CONFIG_FILE.to_string());
        let path = Path::new(&path);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn detail_page_delay(&self) -> Duration {
        Duration::from_millis(self.detail_page_delay_ms)
    }
}

fn required(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ScraperError::Config(format!(
            "Missing required environment variable {name}"
        ))),
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Location of the `major_events,mapping_event` lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupLocation {
    pub bucket: String,
    pub key: String,
}

impl LookupLocation {
    /// Both variables must be set for the lookup join to run.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            bucket: optional(constants::ENV_MAJOR_EVENTS_BUCKET)?,
            key: optional(constants::ENV_MAJOR_EVENTS_CSV_PATH)?,
        })
    }
}

/// Environment of the scheduled function that drives the compute instance.
#[derive(Debug, Clone)]
pub struct FetcherEnv {
    pub instance_id: String,
    pub bucket_name: String,
    pub bucket_path: String,
    pub lookup: Option<LookupLocation>,
}

impl FetcherEnv {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            instance_id: required(constants::ENV_EC2_INSTANCE_ID)?,
            bucket_name: required(constants::ENV_BUCKET_NAME)?,
            bucket_path: required(constants::ENV_BUCKET_PATH)?,
            lookup: LookupLocation::from_env(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct MajorEventsEnv {
    pub bucket_name: String,
    pub bucket_path: String,
}

impl MajorEventsEnv {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bucket_name: required(constants::ENV_BUCKET_NAME)?,
            bucket_path: required(constants::ENV_BUCKET_PATH)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LayerEnv {
    pub bucket: String,
    pub library: String,
}

impl LayerEnv {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bucket: required(constants::ENV_LAYER_BUCKET)?,
            library: required(constants::ENV_LAYER_LIBRARY)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.events_url, constants::EVENTS_URL);
        assert_eq!(config.remote.command_poll_secs, 20);
        assert_eq!(config.detail_page_delay(), Duration::from_secs(1));
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let config = Config::from_toml(
            r#"
            detail_page_delay_ms = 0
            work_dir = "/tmp/run"

            [remote]
            warmup_secs = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.detail_page_delay_ms, 0);
        assert_eq!(config.work_dir, PathBuf::from("/tmp/run"));
        assert_eq!(config.remote.warmup_secs, 3);
        assert_eq!(config.remote.command_poll_secs, 20);
        assert_eq!(config.major_events_url, constants::MAJOR_EVENTS_URL);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let err = Config::from_toml("request_timeout_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, ScraperError::Toml(_)));
    }

    #[test]
    fn missing_config_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }
}
