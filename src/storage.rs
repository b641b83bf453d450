use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::error::CredentialsError;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, error, info};

use crate::error::UploadError;
use crate::types::RunClock;

/// `{prefix}date=YYYY-MM-DD/{stem}_YYYYmmdd_HHMMSS.csv`. The prefix is used
/// verbatim, so callers pass it with its trailing slash.
pub fn partitioned_key(prefix: &str, stem: &str, clock: &RunClock) -> String {
    format!(
        "{prefix}date={}/{stem}_{}.csv",
        clock.partition_date(),
        clock.file_stamp()
    )
}

/// Object storage as the pipelines need it.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), UploadError>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, UploadError>;

    async fn upload_file(&self, path: &Path, bucket: &str, key: &str) -> Result<(), UploadError> {
        let body = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => UploadError::MissingFile(path.display().to_string()),
            _ => UploadError::Rejected {
                message: format!("failed to read {}: {}", path.display(), e),
            },
        })?;
        self.put_object(bucket, key, body).await
    }
}

pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub async fn from_env() -> Self {
        let shared_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::from_config(&shared_config)
    }

    pub fn from_config(shared_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(shared_config),
        }
    }
}

fn rejected(err: impl std::fmt::Display) -> UploadError {
    UploadError::Rejected {
        message: err.to_string(),
    }
}

fn caused_by_credentials(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if cause.is::<CredentialsError>() {
            return true;
        }
        source = cause.source();
    }
    false
}

/// Credential resolution happens before the request is sent, so a missing
/// or unusable credential chain shows up as a construction or dispatch
/// failure caused by a `CredentialsError`.
pub(crate) fn upload_error<E, R>(err: SdkError<E, R>) -> UploadError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let before_send = matches!(
        err,
        SdkError::ConstructionFailure(_) | SdkError::DispatchFailure(_)
    );
    if before_send && caused_by_credentials(&err) {
        UploadError::MissingCredentials
    } else {
        rejected(DisplayErrorContext(err))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), UploadError> {
        debug!("PUT s3://{}/{} ({} bytes)", bucket, key, body.len());
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(upload_error)?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, UploadError> {
        debug!("GET s3://{}/{}", bucket, key);
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(upload_error)?;
        let data = output.body.collect().await.map_err(rejected)?;
        Ok(data.into_bytes().to_vec())
    }
}

/// In-memory object store for development/testing
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Arc<Mutex<HashMap<(String, String), Vec<u8>>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) -> Self {
        self.insert(bucket, key, body.into());
        self
    }

    fn insert(&self, bucket: &str, key: &str, body: Vec<u8>) {
        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.insert((bucket.to_string(), key.to_string()), body);
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.get(&(bucket.to_string(), key.to_string())).cloned()
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), UploadError> {
        debug!("Stored {} bytes at {}/{}", body.len(), bucket, key);
        self.insert(bucket, key, body);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, UploadError> {
        self.object(bucket, key).ok_or_else(|| UploadError::Rejected {
            message: format!("NoSuchKey: {bucket}/{key}"),
        })
    }
}

/// Uploads the run's CSV under a date-partitioned key. Failures are logged
/// and reported as `false`, never raised.
pub async fn upload_events_file(
    store: &dyn ObjectStore,
    path: &Path,
    bucket: &str,
    prefix: &str,
    stem: &str,
    clock: &RunClock,
) -> (String, bool) {
    let key = partitioned_key(prefix, stem, clock);
    match store.upload_file(path, bucket, &key).await {
        Ok(()) => {
            info!("Upload Successful: s3://{}/{}", bucket, key);
            (key, true)
        }
        Err(e) => {
            error!("Upload failed: {}", e);
            (key, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn clock() -> RunClock {
        RunClock::at(
            NaiveDate::from_ymd_opt(2025, 1, 4)
                .unwrap()
                .and_hms_opt(6, 30, 9)
                .unwrap(),
        )
    }

    #[test]
    fn key_is_partitioned_by_run_date() {
        assert_eq!(
            partitioned_key("external-data/events_data/", "events", &clock()),
            "external-data/events_data/date=2025-01-04/events_20250104_063009.csv"
        );
    }

    #[tokio::test]
    async fn upload_reports_missing_file_as_false() {
        let store = InMemoryObjectStore::new();
        let dir = tempfile::tempdir().unwrap();
        let (key, uploaded) = upload_events_file(
            &store,
            &dir.path().join("events.csv"),
            "bucket",
            "events/",
            "events",
            &clock(),
        )
        .await;
        assert!(!uploaded);
        assert!(key.starts_with("events/date=2025-01-04/"));
        assert!(store.keys("bucket").is_empty());
    }

    #[tokio::test]
    async fn upload_file_copies_bytes() {
        let store = InMemoryObjectStore::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.csv");
        std::fs::write(&path, "a,b\n").unwrap();

        let (key, uploaded) =
            upload_events_file(&store, &path, "bucket", "p/", "events", &clock()).await;
        assert!(uploaded);
        assert_eq!(store.object("bucket", &key).unwrap(), b"a,b\n");
    }

    type PutFailure = SdkError<
        aws_sdk_s3::operation::put_object::PutObjectError,
        aws_sdk_s3::config::http::HttpResponse,
    >;

    #[test]
    fn credential_failures_map_to_missing_credentials() {
        let err = PutFailure::construction_failure(CredentialsError::not_loaded(
            "no providers in chain provided credentials",
        ));
        assert!(matches!(upload_error(err), UploadError::MissingCredentials));
    }

    #[test]
    fn other_construction_failures_are_rejections() {
        let err = PutFailure::construction_failure(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "bucket name is empty",
        ));
        match upload_error(err) {
            UploadError::Rejected { message } => assert!(message.contains("bucket name is empty")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_local_file_maps_to_missing_file() {
        let store = InMemoryObjectStore::new();
        let err = store
            .upload_file(Path::new("/definitely/not/here.csv"), "b", "k")
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::MissingFile(_)));
    }
}
