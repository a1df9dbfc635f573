use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};

use super::models::{NewScrapedPost, ScrapedPost};

/// Insert a scraped post, or overwrite the existing row with the same `post_url`.
///
/// A single `INSERT .. ON CONFLICT` statement, so concurrent writers of the same
/// URL never produce two rows. `created_at` is kept from the first insert.
pub async fn upsert_scraped_post(pool: &SqlitePool, post: &NewScrapedPost) -> Result<i64> {
    let row = sqlx::query(
        r"
        INSERT INTO scraped_posts (source, post_url, title, summary, thumb_url, score)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(post_url) DO UPDATE SET
            source = excluded.source,
            title = excluded.title,
            summary = excluded.summary,
            thumb_url = excluded.thumb_url,
            score = excluded.score,
            updated_at = datetime('now')
        RETURNING id
        ",
    )
    .bind(&post.source)
    .bind(&post.post_url)
    .bind(&post.title)
    .bind(&post.summary)
    .bind(&post.thumb_url)
    .bind(post.score)
    .fetch_one(pool)
    .await
    .context("Failed to upsert scraped post")?;

    Ok(row.get::<i64, _>("id"))
}

/// Get a scraped post by its source URL.
pub async fn get_scraped_post_by_url(
    pool: &SqlitePool,
    post_url: &str,
) -> Result<Option<ScrapedPost>> {
    sqlx::query_as("SELECT * FROM scraped_posts WHERE post_url = ?")
        .bind(post_url)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch scraped post")
}

/// List scraped posts from one source, best score first.
pub async fn get_scraped_posts_by_source(
    pool: &SqlitePool,
    source: &str,
    limit: i64,
) -> Result<Vec<ScrapedPost>> {
    sqlx::query_as(
        r"
        SELECT * FROM scraped_posts
        WHERE source = ?
        ORDER BY score DESC, updated_at DESC, id ASC
        LIMIT ?
        ",
    )
    .bind(source)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to fetch scraped posts by source")
}

/// Count all scraped posts.
pub async fn count_scraped_posts(pool: &SqlitePool) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM scraped_posts")
        .fetch_one(pool)
        .await
        .context("Failed to count scraped posts")?;
    Ok(row.0)
}

/// Count scraped posts that have the given `post_url`.
pub async fn count_scraped_posts_with_url(pool: &SqlitePool, post_url: &str) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM scraped_posts WHERE post_url = ?")
        .bind(post_url)
        .fetch_one(pool)
        .await
        .context("Failed to count scraped posts by url")?;
    Ok(row.0)
}
