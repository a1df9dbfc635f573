//! Per-item state machine shared by all adapters:
//! `Filter -> (skip | Enrich -> Relay -> Sink)`.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::ranking::{mentions_year, RankingPolicy, RankingSignals};
use super::{Candidate, DetailFetcher, SourceProfile};
use crate::config::Config;
use crate::db::Database;
use crate::relay::{ImageRelay, RelaySettings};
use crate::s3::ObjectStore;
use crate::sink::{PostRecord, PostSink, SinkSettings};

/// Shared collaborators handed to every adapter run.
#[derive(Debug, Clone)]
pub struct IngestContext {
    pub http: reqwest::Client,
    pub relay: ImageRelay,
    pub sink: PostSink,
    pub ranking: RankingPolicy,
}

impl IngestContext {
    /// Wire the relay and sink from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config, db: Database, store: Arc<dyn ObjectStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        let sink = PostSink::new(
            db,
            SinkSettings {
                summary_max_chars: config.summary_max_chars,
                owned_thumb_prefix: Some(store.public_url("")),
            },
        );
        let relay = ImageRelay::new(http.clone(), store, RelaySettings::from_config(config));

        Ok(Self {
            http,
            relay,
            sink,
            ranking: RankingPolicy::default(),
        })
    }
}

/// What happened during one adapter run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Candidates looked at (duplicates and items past the limit excluded).
    pub seen: usize,
    /// Rejected by the relevance filter.
    pub filtered: usize,
    /// Detail page could not be loaded; item skipped.
    pub enrich_failed: usize,
    pub saved: usize,
    pub save_failed: usize,
    /// Saved posts that carry a relayed thumbnail.
    pub with_image: usize,
    /// The run ended before processing items (configuration or listing failure).
    pub aborted: bool,
}

impl IngestReport {
    #[must_use]
    pub fn aborted() -> Self {
        Self {
            aborted: true,
            ..Self::default()
        }
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: &Self) {
        self.seen += other.seen;
        self.filtered += other.filtered;
        self.enrich_failed += other.enrich_failed;
        self.saved += other.saved;
        self.save_failed += other.save_failed;
        self.with_image += other.with_image;
        self.aborted |= other.aborted;
    }
}

/// Process candidates in listing order, one at a time.
///
/// Only candidates passing the relevance filter count toward the profile's
/// limit. A failing detail page skips that item only.
pub async fn ingest_candidates(
    ctx: &IngestContext,
    profile: &SourceProfile,
    candidates: Vec<Candidate>,
    fetcher: &dyn DetailFetcher,
) -> IngestReport {
    let mut report = IngestReport::default();
    let mut seen_urls = HashSet::new();
    let mut accepted = 0;

    for candidate in candidates {
        if accepted >= profile.limit {
            debug!(source = %profile.id, limit = profile.limit, "Item limit reached");
            break;
        }
        if !seen_urls.insert(candidate.url.clone()) {
            continue;
        }
        report.seen += 1;

        if !profile.filter.matches_candidate(&candidate) {
            debug!(source = %profile.id, title = %candidate.title, "Skipping off-topic item");
            report.filtered += 1;
            continue;
        }
        accepted += 1;

        let enrichment = match fetcher.enrich(&candidate).await {
            Ok(enrichment) => enrichment,
            Err(e) => {
                warn!(source = %profile.id, url = %candidate.url, "Detail fetch failed, skipping item: {e:#}");
                report.enrich_failed += 1;
                continue;
            }
        };

        let image_url = enrichment.image_url.or(candidate.image_url);
        let thumb_url = ctx.relay.upload(image_url.as_deref()).await;

        let summary = enrichment.description.or(candidate.snippet);
        let text = format!(
            "{} {}",
            candidate.title,
            summary.as_deref().unwrap_or_default()
        );
        let signals = RankingSignals {
            tier: profile.tier,
            has_image: thumb_url.is_some(),
            recent: mentions_year(&text, profile.target_year),
        };
        let has_image = thumb_url.is_some();

        let record = PostRecord {
            source: profile.id.clone(),
            post_url: candidate.url,
            title: candidate.title,
            summary,
            thumb_url,
            score: Some(ctx.ranking.score(&signals)),
        };

        if ctx.sink.save(record).await {
            report.saved += 1;
            if has_image {
                report.with_image += 1;
            }
        } else {
            report.save_failed += 1;
        }
    }

    info!(
        source = %profile.id,
        seen = report.seen,
        filtered = report.filtered,
        enrich_failed = report.enrich_failed,
        saved = report.saved,
        save_failed = report.save_failed,
        with_image = report.with_image,
        "Source run complete"
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_merge() {
        let mut total = IngestReport {
            seen: 3,
            saved: 2,
            ..IngestReport::default()
        };
        total.merge(&IngestReport {
            seen: 1,
            filtered: 1,
            ..IngestReport::aborted()
        });
        assert_eq!(total.seen, 4);
        assert_eq!(total.saved, 2);
        assert_eq!(total.filtered, 1);
        assert!(total.aborted);
    }
}
