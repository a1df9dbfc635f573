//! Post sink: normalize scraped records and upsert them by `post_url`.

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::db::{upsert_scraped_post, Database, NewScrapedPost};

/// Observed summary cap used when nothing else is configured.
pub const DEFAULT_SUMMARY_MAX_CHARS: usize = 140;

/// A record handed to the sink by an adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostRecord {
    pub source: String,
    pub post_url: String,
    pub title: String,
    pub summary: Option<String>,
    pub thumb_url: Option<String>,
    pub score: Option<i64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("post url is not an absolute http(s) url: {0:?}")]
    InvalidUrl(String),
    #[error("title is empty")]
    EmptyTitle,
    #[error("source is empty")]
    EmptySource,
}

/// Sink tuning.
#[derive(Debug, Clone)]
pub struct SinkSettings {
    pub summary_max_chars: usize,
    /// Thumbnails must start with this prefix (the owned bucket's public
    /// base). Anything else is dropped instead of stored.
    pub owned_thumb_prefix: Option<String>,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            summary_max_chars: DEFAULT_SUMMARY_MAX_CHARS,
            owned_thumb_prefix: None,
        }
    }
}

/// Persistence boundary for scraped posts.
#[derive(Debug, Clone)]
pub struct PostSink {
    db: Database,
    settings: SinkSettings,
}

impl PostSink {
    #[must_use]
    pub fn new(db: Database, settings: SinkSettings) -> Self {
        Self { db, settings }
    }

    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Normalize and upsert one record.
    ///
    /// Never fails: invalid records and store errors are logged and reported
    /// as `false` so the calling adapter can move on to its next item.
    pub async fn save(&self, record: PostRecord) -> bool {
        let post = match normalize(record, &self.settings) {
            Ok(post) => post,
            Err(e) => {
                warn!("Dropping scraped record: {e}");
                return false;
            }
        };

        match upsert_scraped_post(self.db.pool(), &post).await {
            Ok(id) => {
                debug!(id, source = %post.source, post_url = %post.post_url, score = post.score, "Saved scraped post");
                true
            }
            Err(e) => {
                error!(source = %post.source, post_url = %post.post_url, "Failed to save scraped post: {e:#}");
                false
            }
        }
    }
}

/// Turn an adapter record into the row that gets written.
///
/// Text is whitespace-collapsed, the summary is cut to the configured number
/// of characters, blank optionals become `None`, and foreign thumbnail URLs are
/// dropped.
///
/// # Errors
///
/// Returns an error if the record has no usable URL, title, or source.
pub fn normalize(record: PostRecord, settings: &SinkSettings) -> Result<NewScrapedPost, RecordError> {
    let source = record.source.trim().to_string();
    if source.is_empty() {
        return Err(RecordError::EmptySource);
    }

    let post_url = record.post_url.trim().to_string();
    let valid_url = url::Url::parse(&post_url)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false);
    if !valid_url {
        return Err(RecordError::InvalidUrl(record.post_url));
    }

    let title = collapse_whitespace(&record.title);
    if title.is_empty() {
        return Err(RecordError::EmptyTitle);
    }

    let summary = record
        .summary
        .as_deref()
        .map(collapse_whitespace)
        .map(|s| truncate_chars(&s, settings.summary_max_chars))
        .filter(|s| !s.is_empty());

    let thumb_url = record
        .thumb_url
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .filter(|t| match settings.owned_thumb_prefix.as_deref() {
            Some(prefix) if !t.starts_with(prefix) => {
                warn!(thumb_url = %t, "Dropping thumbnail outside owned storage");
                false
            }
            _ => true,
        });

    Ok(NewScrapedPost {
        source,
        post_url,
        title,
        summary,
        thumb_url,
        score: record.score.unwrap_or(0),
    })
}

/// Collapse runs of whitespace into single spaces and trim the ends.
#[must_use]
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep at most `max_chars` characters, cutting on a char boundary.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PostRecord {
        PostRecord {
            source: "gallery".to_string(),
            post_url: "https://gallery.example.com/exhibitions/1".to_string(),
            title: "Spring Exhibition".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_applied() {
        let post = normalize(record(), &SinkSettings::default()).unwrap();
        assert_eq!(post.score, 0);
        assert_eq!(post.summary, None);
        assert_eq!(post.thumb_url, None);
    }

    #[test]
    fn test_summary_truncated_to_char_count() {
        let long = "전시".repeat(100);
        let post = normalize(
            PostRecord {
                summary: Some(long),
                ..record()
            },
            &SinkSettings::default(),
        )
        .unwrap();
        assert_eq!(post.summary.unwrap().chars().count(), 140);
    }

    #[test]
    fn test_whitespace_collapsed() {
        let post = normalize(
            PostRecord {
                title: "  Light \n\t and   Shadow ".to_string(),
                summary: Some("   ".to_string()),
                ..record()
            },
            &SinkSettings::default(),
        )
        .unwrap();
        assert_eq!(post.title, "Light and Shadow");
        assert_eq!(post.summary, None);
    }

    #[test]
    fn test_rejects_invalid_records() {
        let settings = SinkSettings::default();
        assert_eq!(
            normalize(
                PostRecord {
                    title: " ".to_string(),
                    ..record()
                },
                &settings
            ),
            Err(RecordError::EmptyTitle)
        );
        assert!(matches!(
            normalize(
                PostRecord {
                    post_url: "/relative/path".to_string(),
                    ..record()
                },
                &settings
            ),
            Err(RecordError::InvalidUrl(_))
        ));
        assert_eq!(
            normalize(
                PostRecord {
                    source: String::new(),
                    ..record()
                },
                &settings
            ),
            Err(RecordError::EmptySource)
        );
    }

    #[test]
    fn test_foreign_thumbnail_dropped() {
        let settings = SinkSettings {
            owned_thumb_prefix: Some("https://storage.test/".to_string()),
            ..SinkSettings::default()
        };

        let owned = normalize(
            PostRecord {
                thumb_url: Some("https://storage.test/scraped/1-abc.jpg".to_string()),
                ..record()
            },
            &settings,
        )
        .unwrap();
        assert!(owned.thumb_url.is_some());

        let foreign = normalize(
            PostRecord {
                thumb_url: Some("https://cdn.gallery.example.com/poster.jpg".to_string()),
                ..record()
            },
            &settings,
        )
        .unwrap();
        assert_eq!(foreign.thumb_url, None);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("ab cd", 3), "ab");
    }
}
