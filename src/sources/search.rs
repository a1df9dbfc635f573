//! Search-API adapter: queries a third-party JSON search endpoint.
//!
//! Results arrive with a title, link, and short snippet. Snippets that look too
//! thin (short, or missing the targeted year) get a best-effort page fetch for
//! Open Graph metadata under a short timeout.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::html::fetch_html;
use super::pipeline::{ingest_candidates, IngestContext, IngestReport};
use super::ranking::{extract_year, mentions_year};
use super::{Candidate, DetailFetcher, Enrichment, RunQuery, SourceAdapter, SourceProfile};
use crate::config::Config;
use crate::constants::SCRAPER_USER_AGENT;
use crate::og_extractor::extract_og_metadata;

/// Most search APIs cap a single page of results at ten.
const MAX_RESULTS_PER_REQUEST: usize = 10;

const fn default_min_text_len() -> usize {
    40
}

/// Source definition for a search-API query.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSourceConfig {
    /// Query sent when the run gives no keyword.
    pub keyword: String,
    /// Accept only results on these hosts (or their subdomains). Empty accepts all.
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    /// Snippets shorter than this (in characters) trigger a page fetch.
    #[serde(default = "default_min_text_len")]
    pub min_text_len: usize,
}

/// Endpoint and credentials for the search API, supplied by the environment.
#[derive(Debug, Clone, Default)]
pub struct SearchApiSettings {
    pub endpoint: Option<String>,
    pub key: Option<String>,
    /// Engine/context id for APIs that need one.
    pub engine_id: Option<String>,
    pub enrich_timeout: Duration,
}

impl SearchApiSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.search_api_endpoint.clone(),
            key: config.search_api_key.clone(),
            engine_id: config.search_api_engine_id.clone(),
            enrich_timeout: config.enrich_timeout,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    pagemap: Option<PageMap>,
}

#[derive(Debug, Default, Deserialize)]
struct PageMap {
    #[serde(default)]
    cse_image: Vec<CseImage>,
    #[serde(default)]
    metatags: Vec<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct CseImage {
    src: String,
}

impl SearchItem {
    fn image_url(&self) -> Option<String> {
        let pagemap = self.pagemap.as_ref()?;
        pagemap
            .cse_image
            .iter()
            .map(|img| img.src.clone())
            .chain(
                pagemap
                    .metatags
                    .iter()
                    .filter_map(|tags| tags.get("og:image"))
                    .filter_map(|v| v.as_str().map(ToString::to_string)),
            )
            .find(|src| src.starts_with("http://") || src.starts_with("https://"))
    }
}

/// Whether `url`'s host is one of `allowed` or a subdomain of one.
#[must_use]
pub fn domain_allowed(url: &str, allowed: &[String]) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let Some(host) = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
    else {
        return false;
    };
    allowed.iter().any(|domain| {
        let domain = domain.trim().trim_start_matches('.').to_lowercase();
        host == domain || host.ends_with(&format!(".{domain}"))
    })
}

/// Fetches the result page only when the snippet is weak; never fails.
#[derive(Debug, Clone)]
pub struct SearchEnricher {
    client: reqwest::Client,
    timeout: Duration,
    min_text_len: usize,
    target_year: Option<i32>,
}

impl SearchEnricher {
    fn is_weak(&self, candidate: &Candidate) -> bool {
        let snippet = candidate.snippet.as_deref().unwrap_or_default();
        if snippet.chars().count() < self.min_text_len {
            return true;
        }
        self.target_year.is_some_and(|year| {
            !mentions_year(&format!("{} {snippet}", candidate.title), Some(year))
        })
    }
}

#[async_trait]
impl DetailFetcher for SearchEnricher {
    async fn enrich(&self, candidate: &Candidate) -> Result<Enrichment> {
        if !self.is_weak(candidate) {
            return Ok(Enrichment::default());
        }

        debug!(url = %candidate.url, "Weak search snippet, fetching page metadata");
        match fetch_html(&self.client, &candidate.url, Some(self.timeout)).await {
            Ok(body) => {
                let og = extract_og_metadata(&body, Some(&candidate.url));
                let snippet_len = candidate.snippet.as_deref().map_or(0, |s| s.chars().count());
                let description = og
                    .description
                    .filter(|d| d.chars().count() > snippet_len);
                Ok(Enrichment {
                    description,
                    image_url: og.image,
                })
            }
            Err(e) => {
                debug!(url = %candidate.url, "Page metadata fetch failed, keeping snippet: {e:#}");
                Ok(Enrichment::default())
            }
        }
    }
}

/// Adapter for a JSON search endpoint.
#[derive(Debug)]
pub struct SearchApiAdapter {
    profile: SourceProfile,
    config: SearchSourceConfig,
    settings: SearchApiSettings,
}

impl SearchApiAdapter {
    #[must_use]
    pub fn new(profile: SourceProfile, config: SearchSourceConfig, settings: SearchApiSettings) -> Self {
        Self {
            profile,
            config,
            settings,
        }
    }

    async fn search(
        &self,
        client: &reqwest::Client,
        endpoint: &str,
        key: &str,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<SearchItem>> {
        let num = limit.clamp(1, MAX_RESULTS_PER_REQUEST).to_string();
        let mut params = vec![("key", key), ("q", keyword), ("num", num.as_str())];
        if let Some(engine_id) = self.settings.engine_id.as_deref() {
            params.push(("cx", engine_id));
        }

        let response = client
            .get(endpoint)
            .query(&params)
            .header("User-Agent", SCRAPER_USER_AGENT)
            .send()
            .await
            .context("Failed to call search API")?;

        if !response.status().is_success() {
            anyhow::bail!("Search API returned status {}", response.status());
        }

        let body: SearchResponse = response
            .json()
            .await
            .context("Failed to parse search API response")?;
        Ok(body.items)
    }
}

#[async_trait]
impl SourceAdapter for SearchApiAdapter {
    fn profile(&self) -> &SourceProfile {
        &self.profile
    }

    async fn run(&self, ctx: &IngestContext, query: &RunQuery) -> IngestReport {
        let (Some(endpoint), Some(key)) = (
            self.settings.endpoint.as_deref(),
            self.settings.key.as_deref(),
        ) else {
            warn!(source = %self.profile.id, "Search API endpoint or key not configured, skipping source");
            return IngestReport::aborted();
        };

        let keyword = query.keyword.as_deref().unwrap_or(&self.config.keyword);
        let mut profile = self.profile.with_query(query);
        profile.target_year = extract_year(keyword).or(profile.target_year);

        let items = match self.search(&ctx.http, endpoint, key, keyword, profile.limit).await {
            Ok(items) => items,
            Err(e) => {
                warn!(source = %profile.id, keyword = %keyword, "Search request failed: {e:#}");
                return IngestReport::aborted();
            }
        };
        debug!(source = %profile.id, keyword = %keyword, count = items.len(), "Search results received");

        let mut candidates = Vec::with_capacity(items.len());
        for item in items {
            if item.link.is_empty() || item.title.trim().is_empty() {
                continue;
            }
            if !domain_allowed(&item.link, &self.config.allowed_domains) {
                debug!(source = %profile.id, url = %item.link, "Skipping result outside allowed domains");
                continue;
            }
            let image_url = item.image_url();
            candidates.push(Candidate {
                url: item.link,
                title: item.title,
                snippet: item.snippet.filter(|s| !s.trim().is_empty()),
                image_url,
            });
        }

        let enricher = SearchEnricher {
            client: ctx.http.clone(),
            timeout: self.settings.enrich_timeout,
            min_text_len: self.config.min_text_len,
            target_year: profile.target_year,
        };
        ingest_candidates(ctx, &profile, candidates, &enricher).await
    }
}
