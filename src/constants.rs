//! Shared constants used across the ingestion pipeline.

/// User agent string used for listing, detail, and image requests.
///
/// A realistic browser user agent; several gallery sites serve an empty shell
/// or a 403 to obvious bot agents.
pub const SCRAPER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Content type of every relayed thumbnail.
pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

/// Largest source image the relay will download before transcoding.
pub const MAX_THUMB_SOURCE_BYTES: usize = 15 * 1024 * 1024;
