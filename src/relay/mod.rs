//! Image relay: re-host external thumbnails in owned object storage.
//!
//! Every thumbnail a source points at is downloaded, downscaled, re-encoded as
//! JPEG, and uploaded under a fresh key, so stored posts never reference a
//! third-party image host. Failures never escape [`ImageRelay::upload`]; they
//! are logged and turned into "no thumbnail".

mod transcode;

pub use transcode::{bounded_dimensions, transcode_to_jpeg, Thumbnail};

use std::sync::Arc;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::constants::{MAX_THUMB_SOURCE_BYTES, SCRAPER_USER_AGENT, THUMBNAIL_CONTENT_TYPE};
use crate::retry::{retry, RetryPolicy};
use crate::s3::ObjectStore;

const RANDOM_SUFFIX_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid image url {0}")]
    InvalidUrl(String),
    #[error("image request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("image request returned status {0}")]
    Status(StatusCode),
    #[error("image exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("failed to decode or encode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("failed to store thumbnail: {0:#}")]
    Storage(anyhow::Error),
}

impl RelayError {
    /// Whether another attempt could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Status(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Storage(_) => true,
            Self::InvalidUrl(_) | Self::TooLarge { .. } | Self::Image(_) => false,
        }
    }
}

/// Relay tuning.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub max_width: u32,
    pub jpeg_quality: u8,
    /// Downloads larger than this are abandoned.
    pub max_source_bytes: usize,
    /// Key prefix inside the bucket, without slashes.
    pub namespace: String,
    pub retry: RetryPolicy,
}

impl RelaySettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_width: config.thumb_max_width,
            jpeg_quality: config.thumb_jpeg_quality,
            max_source_bytes: MAX_THUMB_SOURCE_BYTES,
            namespace: config.thumb_namespace.trim_matches('/').to_string(),
            retry: RetryPolicy::from_config(config),
        }
    }
}

/// Downloads, transcodes, and re-uploads thumbnails.
#[derive(Clone)]
pub struct ImageRelay {
    client: reqwest::Client,
    store: Arc<dyn ObjectStore>,
    settings: RelaySettings,
}

impl ImageRelay {
    #[must_use]
    pub fn new(client: reqwest::Client, store: Arc<dyn ObjectStore>, settings: RelaySettings) -> Self {
        Self {
            client,
            store,
            settings,
        }
    }

    /// Relay an image and return its owned public URL.
    ///
    /// Returns `None` without any network I/O for a missing or blank URL, and
    /// `None` after logging for any download, transcode, or storage failure.
    pub async fn upload(&self, image_url: Option<&str>) -> Option<String> {
        let image_url = image_url.map(str::trim).filter(|u| !u.is_empty())?;

        match self.try_upload(image_url).await {
            Ok(public_url) => {
                debug!(source_url = %image_url, public_url = %public_url, "Relayed thumbnail");
                Some(public_url)
            }
            Err(e) => {
                warn!(source_url = %image_url, transient = e.is_transient(), "Thumbnail relay failed: {e}");
                None
            }
        }
    }

    /// Relay an image, surfacing the failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not http(s), the download fails or is
    /// larger than the configured cap, the bytes are not an image, or the
    /// upload fails.
    pub async fn try_upload(&self, image_url: &str) -> Result<String, RelayError> {
        let parsed = url::Url::parse(image_url)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| RelayError::InvalidUrl(image_url.to_string()))?;

        let bytes = retry(
            &self.settings.retry,
            "thumbnail download",
            || self.download(parsed.clone()),
            RelayError::is_transient,
        )
        .await?;

        let thumbnail = transcode_to_jpeg(
            &bytes,
            self.settings.max_width,
            self.settings.jpeg_quality,
        )?;
        debug!(
            source_url = %image_url,
            width = thumbnail.width,
            height = thumbnail.height,
            size = thumbnail.jpeg.len(),
            "Transcoded thumbnail"
        );

        let key = object_key(&self.settings.namespace);
        retry(
            &self.settings.retry,
            "thumbnail upload",
            || async {
                self.store
                    .put(&key, &thumbnail.jpeg, THUMBNAIL_CONTENT_TYPE)
                    .await
                    .map_err(RelayError::Storage)
            },
            RelayError::is_transient,
        )
        .await?;

        Ok(self.store.public_url(&key))
    }

    async fn download(&self, url: url::Url) -> Result<Vec<u8>, RelayError> {
        let mut response = self
            .client
            .get(url)
            .header("User-Agent", SCRAPER_USER_AGENT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RelayError::Status(response.status()));
        }

        let limit = self.settings.max_source_bytes;
        if response
            .content_length()
            .is_some_and(|len| len > limit as u64)
        {
            return Err(RelayError::TooLarge { limit });
        }

        let mut data = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if data.len() + chunk.len() > limit {
                return Err(RelayError::TooLarge { limit });
            }
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }
}

impl std::fmt::Debug for ImageRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageRelay")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Generate a collision-resistant key: `<namespace>/<millis>-<random>.jpg`.
fn object_key(namespace: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();
    format!("{namespace}/{}-{suffix}.jpg", Utc::now().timestamp_millis())
}
