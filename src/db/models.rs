use serde::{Deserialize, Serialize};

/// A scraped exhibition post as stored in `scraped_posts`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScrapedPost {
    pub id: i64,
    pub source: String,
    pub post_url: String,
    pub title: String,
    pub summary: Option<String>,
    pub thumb_url: Option<String>,
    pub score: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Values written by an upsert. `post_url` is the conflict key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScrapedPost {
    pub source: String,
    pub post_url: String,
    pub title: String,
    pub summary: Option<String>,
    pub thumb_url: Option<String>,
    pub score: i64,
}
