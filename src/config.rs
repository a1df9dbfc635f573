use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Ingestion configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_path: PathBuf,

    // S3 Storage
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub s3_public_url: Option<String>,

    // Thumbnails
    pub thumb_namespace: String,
    pub thumb_max_width: u32,
    pub thumb_jpeg_quality: u8,

    // Sources
    pub sources_path: PathBuf,
    pub summary_max_chars: usize,

    // Search API
    pub search_api_endpoint: Option<String>,
    pub search_api_key: Option<String>,
    pub search_api_engine_id: Option<String>,

    // HTTP
    pub http_timeout: Duration,
    pub enrich_timeout: Duration,

    // Headless browser
    pub chrome_path: Option<String>,
    pub browser_settle: Duration,
    pub browser_nav_timeout: Duration,

    // Retry
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Database
            database_path: PathBuf::from(env_or_default(
                "DATABASE_PATH",
                "./data/scraped.sqlite",
            )),

            // S3 Storage
            s3_bucket: required_env("S3_BUCKET")?,
            s3_region: env_or_default("S3_REGION", "us-east-1"),
            s3_endpoint: optional_env("S3_ENDPOINT"),
            s3_public_url: optional_env("S3_PUBLIC_URL"),

            // Thumbnails
            thumb_namespace: env_or_default("THUMB_NAMESPACE", "scraped"),
            thumb_max_width: parse_env_u32("THUMB_MAX_WIDTH", 800)?,
            thumb_jpeg_quality: parse_env_u8("THUMB_JPEG_QUALITY", 80)?,

            // Sources
            sources_path: PathBuf::from(env_or_default("SOURCES_PATH", "./sources.toml")),
            summary_max_chars: parse_env_usize("SUMMARY_MAX_CHARS", 140)?,

            // Search API
            search_api_endpoint: optional_env("SEARCH_API_ENDPOINT"),
            search_api_key: optional_env("SEARCH_API_KEY"),
            search_api_engine_id: optional_env("SEARCH_API_ENGINE_ID"),

            // HTTP
            http_timeout: Duration::from_secs(parse_env_u64("HTTP_TIMEOUT_SECS", 30)?),
            enrich_timeout: Duration::from_secs(parse_env_u64("ENRICH_TIMEOUT_SECS", 5)?),

            // Headless browser
            chrome_path: optional_env("CHROME_PATH"),
            browser_settle: Duration::from_millis(parse_env_u64("BROWSER_SETTLE_MS", 500)?),
            browser_nav_timeout: Duration::from_secs(parse_env_u64(
                "BROWSER_NAV_TIMEOUT_SECS",
                30,
            )?),

            // Retry
            retry_max_attempts: parse_env_u32("RETRY_MAX_ATTEMPTS", 3)?,
            retry_base_delay: Duration::from_millis(parse_env_u64("RETRY_BASE_DELAY_MS", 500)?),
        })
    }

    /// Configuration for tests: no retries, local paths, no external keys.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            database_path: PathBuf::from("./data/test.sqlite"),
            s3_bucket: "test-bucket".to_string(),
            s3_region: "us-east-1".to_string(),
            s3_endpoint: None,
            s3_public_url: Some("https://storage.test".to_string()),
            thumb_namespace: "scraped".to_string(),
            thumb_max_width: 800,
            thumb_jpeg_quality: 80,
            sources_path: PathBuf::from("./sources.toml"),
            summary_max_chars: 140,
            search_api_endpoint: None,
            search_api_key: None,
            search_api_engine_id: None,
            http_timeout: Duration::from_secs(5),
            enrich_timeout: Duration::from_secs(2),
            chrome_path: None,
            browser_settle: Duration::from_millis(0),
            browser_nav_timeout: Duration::from_secs(5),
            retry_max_attempts: 1,
            retry_base_delay: Duration::from_millis(1),
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.s3_bucket.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "S3_BUCKET".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.thumb_max_width == 0 {
            return Err(ConfigError::InvalidValue {
                name: "THUMB_MAX_WIDTH".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !(1..=100).contains(&self.thumb_jpeg_quality) {
            return Err(ConfigError::InvalidValue {
                name: "THUMB_JPEG_QUALITY".to_string(),
                message: "must be between 1 and 100".to_string(),
            });
        }
        if self.summary_max_chars == 0 {
            return Err(ConfigError::InvalidValue {
                name: "SUMMARY_MAX_CHARS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.retry_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                name: "RETRY_MAX_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.thumb_namespace.trim_matches('/').is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "THUMB_NAMESPACE".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    parse_env(name, default)
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    parse_env(name, default)
}

fn parse_env_u8(name: &str, default: u8) -> Result<u8, ConfigError> {
    parse_env(name, default)
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    parse_env(name, default)
}
