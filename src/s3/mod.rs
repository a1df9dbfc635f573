//! Owned object storage for relayed thumbnails.

mod memory;

pub use memory::{MemoryObjectStore, StoredObject};

use anyhow::{Context, Result};
use async_trait::async_trait;
use s3::creds::Credentials;
use s3::region::Region;
use s3::Bucket;
use tracing::debug;

use crate::config::Config;

/// Write side of the object storage the relay uploads into.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, overwriting any existing object.
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<()>;

    /// Public URL under which `key` is served.
    fn public_url(&self, key: &str) -> String;
}

/// S3 client wrapper.
#[derive(Clone)]
pub struct S3Client {
    bucket: Box<Bucket>,
    public_base: String,
}

impl S3Client {
    /// Create a new S3 client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if client initialization fails.
    pub fn new(config: &Config) -> Result<Self> {
        let access_key = std::env::var("AWS_ACCESS_KEY_ID").context("AWS_ACCESS_KEY_ID not set")?;
        let secret_key =
            std::env::var("AWS_SECRET_ACCESS_KEY").context("AWS_SECRET_ACCESS_KEY not set")?;

        let credentials = Credentials::new(Some(&access_key), Some(&secret_key), None, None, None)
            .context("Failed to create S3 credentials")?;

        let region = if let Some(ref endpoint) = config.s3_endpoint {
            Region::Custom {
                region: config.s3_region.clone(),
                endpoint: endpoint.clone(),
            }
        } else {
            config.s3_region.parse().unwrap_or(Region::UsEast1)
        };

        let bucket = Bucket::new(&config.s3_bucket, region, credentials)
            .context("Failed to create S3 bucket")?;

        // Use path-style for custom endpoints (MinIO, R2, Supabase storage, etc.)
        let bucket = if config.s3_endpoint.is_some() {
            bucket.with_path_style()
        } else {
            bucket
        };

        let public_base = public_base_url(
            config.s3_public_url.as_deref(),
            config.s3_endpoint.as_deref(),
            &config.s3_bucket,
        );

        Ok(Self {
            bucket,
            public_base,
        })
    }

    /// Get the bucket name
    #[must_use]
    pub fn bucket_name(&self) -> String {
        self.bucket.name().to_string()
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<()> {
        debug!(key = %key, content_type = %content_type, size = data.len(), "Uploading bytes to S3");

        let response = self
            .bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .context("Failed to upload bytes to S3")?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            anyhow::bail!("S3 upload of {key} failed with status {status}");
        }

        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key.trim_start_matches('/'))
    }
}

impl std::fmt::Debug for S3Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Client")
            .field("bucket", &self.bucket.name())
            .field("public_base", &self.public_base)
            .finish()
    }
}

/// Base URL that public object URLs are built on, without a trailing slash.
///
/// An explicit public URL wins; custom endpoints are addressed path-style;
/// plain AWS uses the virtual-hosted bucket domain.
fn public_base_url(public_url: Option<&str>, endpoint: Option<&str>, bucket: &str) -> String {
    match (public_url, endpoint) {
        (Some(base), _) => base.trim_end_matches('/').to_string(),
        (None, Some(endpoint)) => format!("{}/{bucket}", endpoint.trim_end_matches('/')),
        (None, None) => format!("https://{bucket}.s3.amazonaws.com"),
    }
}
