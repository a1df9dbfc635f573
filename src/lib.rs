//! Exhibition ingestion pipeline.
//!
//! Scrapes exhibition listings from external sites and search APIs, relays
//! their thumbnails into owned object storage, and upserts the results into a
//! shared `scraped_posts` store keyed by source URL.

pub mod config;
pub mod constants;
pub mod db;
pub mod og_extractor;
pub mod orchestrator;
pub mod relay;
pub mod retry;
pub mod s3;
pub mod sink;
pub mod sources;
