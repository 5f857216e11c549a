//! Secondary (remote) storage target.
//!
//! The remote copy is a mirror: callers log its failures and carry on.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;

use crate::error::StorageError;

/// An object store that accepts whole files keyed by file name.
#[async_trait]
pub trait RemoteTarget: Send + Sync {
    /// Upload `bytes` under `key` and return the public URL.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<String, StorageError>;

    /// Remove `key`. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Connection settings for an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible services (OSS, MinIO, R2).
    pub endpoint: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Public base URL for objects, e.g. a CDN domain.
    pub public_domain: Option<String>,
}

impl S3Config {
    /// Public URL of `key` in this bucket.
    pub fn object_url(&self, key: &str) -> String {
        if let Some(domain) = self.public_domain.as_deref() {
            let domain = domain.trim_end_matches('/');
            if domain.starts_with("http://") || domain.starts_with("https://") {
                return format!("{domain}/{key}");
            }
            return format!("https://{domain}/{key}");
        }
        match self.endpoint.as_deref() {
            Some(endpoint) => format!("{}/{}/{key}", endpoint.trim_end_matches('/'), self.bucket),
            None => format!("https://{}.s3.{}.amazonaws.com/{key}", self.bucket, self.region),
        }
    }
}

/// [`RemoteTarget`] backed by `aws-sdk-s3`.
pub struct S3Target {
    client: aws_sdk_s3::Client,
    config: S3Config,
}

impl S3Target {
    pub fn new(config: S3Config) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "imagegen-static",
        );
        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true);
        if let Some(endpoint) = config.endpoint.as_deref() {
            builder = builder.endpoint_url(endpoint);
        }
        let client = aws_sdk_s3::Client::from_conf(builder.build());
        Self { client, config }
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }
}

#[async_trait]
impl RemoteTarget for S3Target {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Remote(format!("put {key}: {}", DisplayErrorContext(&e))))?;
        Ok(self.config.object_url(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                StorageError::Remote(format!("delete {key}: {}", DisplayErrorContext(&e)))
            })?;
        Ok(())
    }
}
