//! Integration tests for the post sink and the scraped_posts upsert.

use exhibition_ingest::db::{
    count_scraped_posts, count_scraped_posts_with_url, get_scraped_post_by_url,
    get_scraped_posts_by_source, upsert_scraped_post, Database, NewScrapedPost,
};
use exhibition_ingest::sink::{PostRecord, PostSink, SinkSettings};
use tempfile::TempDir;

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

fn record(post_url: &str, title: &str, summary: Option<&str>) -> PostRecord {
    PostRecord {
        source: "city-gallery".to_string(),
        post_url: post_url.to_string(),
        title: title.to_string(),
        summary: summary.map(ToString::to_string),
        thumb_url: None,
        score: None,
    }
}

#[tokio::test]
async fn test_second_save_overwrites_summary() {
    let (db, _temp_dir) = setup_db().await;
    let sink = PostSink::new(db.clone(), SinkSettings::default());
    let url = "https://gallery.example.com/exhibitions/1";

    assert!(sink.save(record(url, "Spring Exhibition", Some("first"))).await);
    assert!(sink.save(record(url, "Spring Exhibition", Some("second"))).await);

    assert_eq!(count_scraped_posts_with_url(db.pool(), url).await.unwrap(), 1);
    let post = get_scraped_post_by_url(db.pool(), url)
        .await
        .expect("Failed to get post")
        .expect("Post not found");
    assert_eq!(post.summary.as_deref(), Some("second"));
}

#[tokio::test]
async fn test_second_save_overwrites_title_and_thumb() {
    let (db, _temp_dir) = setup_db().await;
    let sink = PostSink::new(db.clone(), SinkSettings::default());
    let url = "https://gallery.example.com/exhibitions/2";

    let mut first = record(url, "Old title", None);
    first.thumb_url = Some("https://storage.test/scraped/1-aaaaaaaa.jpg".to_string());
    first.score = Some(3);
    assert!(sink.save(first).await);

    let first_row = get_scraped_post_by_url(db.pool(), url)
        .await
        .unwrap()
        .unwrap();

    assert!(sink.save(record(url, "New title", None)).await);

    let post = get_scraped_post_by_url(db.pool(), url)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(post.id, first_row.id);
    assert_eq!(post.title, "New title");
    assert_eq!(post.thumb_url, None);
    assert_eq!(post.score, 0);
    assert_eq!(post.created_at, first_row.created_at);
    assert_eq!(count_scraped_posts(db.pool()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_distinct_urls_are_distinct_rows() {
    let (db, _temp_dir) = setup_db().await;
    let sink = PostSink::new(db.clone(), SinkSettings::default());

    for i in 0..3 {
        let url = format!("https://gallery.example.com/exhibitions/{i}");
        assert!(sink.save(record(&url, "Gallery show", None)).await);
    }

    assert_eq!(count_scraped_posts(db.pool()).await.unwrap(), 3);
    let posts = get_scraped_posts_by_source(db.pool(), "city-gallery", 10)
        .await
        .unwrap();
    assert_eq!(posts.len(), 3);
}

#[tokio::test]
async fn test_invalid_record_is_dropped_not_raised() {
    let (db, _temp_dir) = setup_db().await;
    let sink = PostSink::new(db.clone(), SinkSettings::default());

    assert!(!sink.save(record("not-a-url", "Title", None)).await);
    assert!(!sink.save(record("https://gallery.example.com/x", "   ", None)).await);
    assert_eq!(count_scraped_posts(db.pool()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_summary_capped_before_storage() {
    let (db, _temp_dir) = setup_db().await;
    let sink = PostSink::new(db.clone(), SinkSettings::default());
    let url = "https://gallery.example.com/exhibitions/long";

    let long = "a".repeat(500);
    assert!(sink.save(record(url, "Long exhibition", Some(&long))).await);

    let post = get_scraped_post_by_url(db.pool(), url)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(post.summary.unwrap().chars().count(), 140);
}

#[tokio::test]
async fn test_concurrent_upserts_same_url_single_row() {
    let (db, _temp_dir) = setup_db().await;
    let url = "https://gallery.example.com/exhibitions/race";

    let mut handles = Vec::new();
    for i in 0..8 {
        let pool = db.pool().clone();
        handles.push(tokio::spawn(async move {
            let post = NewScrapedPost {
                source: "race".to_string(),
                post_url: url.to_string(),
                title: format!("Title {i}"),
                summary: None,
                thumb_url: None,
                score: i,
            };
            upsert_scraped_post(&pool, &post).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().expect("Upsert failed");
    }

    assert_eq!(count_scraped_posts_with_url(db.pool(), url).await.unwrap(), 1);
}
