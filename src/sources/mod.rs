//! Site adapters and the shared per-item ingestion pipeline.
//!
//! Each adapter knows how to reach one external listing and turn it into
//! [`Candidate`]s. Everything after that (relevance gate, detail enrichment,
//! thumbnail relay, ranking, sink) is shared in [`pipeline`].

mod browser;
mod catalog;
mod html;
mod pipeline;
mod ranking;
mod relevance;
mod search;

pub use browser::{
    BrowserDetailFetcher, BrowserListingAdapter, BrowserSession, BrowserSettings,
    BrowserSourceConfig,
};
pub use catalog::{build_adapters, load_sources_file, CatalogError, SourceDefinition, SourceKind, SourcesFile};
pub use html::{parse_listing, HtmlListingAdapter, HtmlSourceConfig, HttpDetailFetcher, ListingSelectors};
pub use pipeline::{ingest_candidates, IngestContext, IngestReport};
pub use ranking::{extract_year, mentions_year, RankingPolicy, RankingSignals, SourceTier};
pub use relevance::{RelevanceError, RelevanceFilter, DEFAULT_KEYWORDS};
pub use search::{SearchApiAdapter, SearchApiSettings, SearchSourceConfig};

use anyhow::Result;
use async_trait::async_trait;

/// An item found on a listing, before enrichment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidate {
    /// Absolute URL of the detail page. Becomes the post's upsert key.
    pub url: String,
    pub title: String,
    /// Listing-level text (search snippet, card blurb).
    pub snippet: Option<String>,
    /// Listing-level image, used when the detail page has none.
    pub image_url: Option<String>,
}

/// What a detail page adds to a candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub description: Option<String>,
    pub image_url: Option<String>,
}

/// Per-invocation overrides for an adapter run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunQuery {
    /// Replaces the configured search keyword or `{keyword}` placeholder.
    pub keyword: Option<String>,
    /// Replaces the configured per-run item cap.
    pub limit: Option<usize>,
}

/// Settings shared by every adapter regardless of strategy.
#[derive(Debug, Clone)]
pub struct SourceProfile {
    /// Tag written to `scraped_posts.source`.
    pub id: String,
    pub tier: SourceTier,
    /// Maximum number of relevant items processed per run.
    pub limit: usize,
    pub filter: RelevanceFilter,
    /// Year the source is expected to cover; feeds the recency signal.
    pub target_year: Option<i32>,
}

impl SourceProfile {
    /// Apply the run's limit override.
    #[must_use]
    pub fn with_query(&self, query: &RunQuery) -> Self {
        Self {
            limit: query.limit.unwrap_or(self.limit),
            target_year: query
                .keyword
                .as_deref()
                .and_then(extract_year)
                .or(self.target_year),
            ..self.clone()
        }
    }
}

/// Loads a detail page for one candidate.
#[async_trait]
pub trait DetailFetcher: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the detail page could not be loaded; the pipeline
    /// skips the item.
    async fn enrich(&self, candidate: &Candidate) -> Result<Enrichment>;
}

/// Fetcher for sources whose listing already carries everything needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDetail;

#[async_trait]
impl DetailFetcher for NoDetail {
    async fn enrich(&self, _candidate: &Candidate) -> Result<Enrichment> {
        Ok(Enrichment::default())
    }
}

/// A self-contained scraper for one external source.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn profile(&self) -> &SourceProfile;

    /// Source tag, also used in logs.
    fn id(&self) -> &str {
        &self.profile().id
    }

    /// Scrape, enrich, relay, and save. Never fails: listing-level errors end
    /// the run early and are reported through [`IngestReport::aborted`].
    async fn run(&self, ctx: &IngestContext, query: &RunQuery) -> IngestReport;
}
