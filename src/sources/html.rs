//! Static listing adapter: HTTP GET + `scraper` DOM queries.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use tracing::{debug, warn};

use super::pipeline::{ingest_candidates, IngestContext, IngestReport};
use super::{Candidate, DetailFetcher, Enrichment, NoDetail, RunQuery, SourceAdapter, SourceProfile};
use crate::constants::SCRAPER_USER_AGENT;
use crate::og_extractor::{extract_from_document, resolve_url};
use crate::sink::collapse_whitespace;

/// Attributes that may hold an image URL, in preference order.
const IMAGE_ATTRS: &[&str] = &["src", "data-src", "data-original", "content", "href"];

/// Placeholder in listing URLs replaced by the run keyword.
pub const KEYWORD_PLACEHOLDER: &str = "{keyword}";

/// Fill `{keyword}` in a listing URL with the run keyword, else the source's
/// default, form-encoded. No keyword leaves the placeholder empty.
pub(crate) fn expand_listing_url(
    template: &str,
    query: &RunQuery,
    default_keyword: Option<&str>,
) -> String {
    let keyword = query.keyword.as_deref().or(default_keyword).unwrap_or_default();
    let encoded: String = url::form_urlencoded::byte_serialize(keyword.as_bytes()).collect();
    template.replace(KEYWORD_PLACEHOLDER, &encoded)
}

fn default_link_selector() -> String {
    "a".to_string()
}

const fn default_true() -> bool {
    true
}

/// Source definition for a server-rendered listing page.
#[derive(Debug, Clone, Deserialize)]
pub struct HtmlSourceConfig {
    /// Listing page. May contain `{keyword}`.
    pub listing_url: String,
    /// One element per listed item.
    pub item_selector: String,
    /// Anchor inside the item holding the detail URL.
    #[serde(default = "default_link_selector")]
    pub link_selector: String,
    /// Title element inside the item; the link text is used when absent.
    pub title_selector: Option<String>,
    /// Blurb inside the item.
    pub snippet_selector: Option<String>,
    /// Thumbnail inside the item.
    pub image_selector: Option<String>,
    /// Visit each detail page for a longer summary and a better image.
    #[serde(default = "default_true")]
    pub fetch_detail: bool,
    /// Description element on the detail page (Open Graph is the fallback).
    pub detail_summary_selector: Option<String>,
    /// Image element on the detail page (Open Graph is the fallback).
    pub detail_image_selector: Option<String>,
    /// Keyword substituted into `listing_url` when the run gives none.
    pub default_keyword: Option<String>,
}

/// Compiled listing selectors.
#[derive(Debug, Clone)]
pub struct ListingSelectors {
    pub item: Selector,
    pub link: Selector,
    pub title: Option<Selector>,
    pub snippet: Option<Selector>,
    pub image: Option<Selector>,
}

/// Compiled detail-page selectors.
#[derive(Debug, Clone, Default)]
pub struct DetailSelectors {
    pub summary: Option<Selector>,
    pub image: Option<Selector>,
}

/// Parse a CSS selector, keeping the error as text.
pub(crate) fn parse_selector(selector: &str) -> Result<Selector, String> {
    Selector::parse(selector).map_err(|e| format!("invalid selector {selector:?}: {e:?}"))
}

fn parse_optional(selector: Option<&String>) -> Result<Option<Selector>, String> {
    selector.map(|s| parse_selector(s)).transpose()
}

impl HtmlSourceConfig {
    /// Compile the listing selectors.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid selector.
    pub fn listing_selectors(&self) -> Result<ListingSelectors, String> {
        Ok(ListingSelectors {
            item: parse_selector(&self.item_selector)?,
            link: parse_selector(&self.link_selector)?,
            title: parse_optional(self.title_selector.as_ref())?,
            snippet: parse_optional(self.snippet_selector.as_ref())?,
            image: parse_optional(self.image_selector.as_ref())?,
        })
    }

    /// Compile the detail selectors.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid selector.
    pub fn detail_selectors(&self) -> Result<DetailSelectors, String> {
        Ok(DetailSelectors {
            summary: parse_optional(self.detail_summary_selector.as_ref())?,
            image: parse_optional(self.detail_image_selector.as_ref())?,
        })
    }
}

/// Extract candidates from a listing document.
///
/// Items without a resolvable link or a non-empty title are dropped. Links and
/// images are made absolute against `base_url`.
#[must_use]
pub fn parse_listing(html: &str, base_url: &str, selectors: &ListingSelectors) -> Vec<Candidate> {
    let document = Html::parse_document(html);
    let mut candidates = Vec::new();

    for item in document.select(&selectors.item) {
        let link = item.select(&selectors.link).next().or_else(|| {
            (item.value().name() == "a").then_some(item)
        });
        let Some(url) = link
            .and_then(|l| l.value().attr("href"))
            .and_then(|href| resolve_url(base_url, href))
        else {
            continue;
        };

        let title_source = selectors
            .title
            .as_ref()
            .and_then(|s| item.select(s).next())
            .or(link);
        let title = title_source.map(element_text).unwrap_or_default();
        if title.is_empty() {
            continue;
        }

        let snippet = selectors
            .snippet
            .as_ref()
            .and_then(|s| item.select(s).next())
            .map(element_text)
            .filter(|s| !s.is_empty());

        let image_url = selectors
            .image
            .as_ref()
            .and_then(|s| item.select(s).next())
            .and_then(|img| element_image_url(img, base_url));

        candidates.push(Candidate {
            url,
            title,
            snippet,
            image_url,
        });
    }

    candidates
}

/// Pull a description and image out of a detail document.
#[must_use]
pub fn parse_detail(html: &str, page_url: &str, selectors: &DetailSelectors) -> Enrichment {
    let document = Html::parse_document(html);

    let description = selectors
        .summary
        .as_ref()
        .and_then(|s| document.select(s).next())
        .map(element_text)
        .filter(|t| !t.is_empty());

    let image_url = selectors
        .image
        .as_ref()
        .and_then(|s| document.select(s).next())
        .and_then(|img| element_image_url(img, page_url));

    if description.is_some() && image_url.is_some() {
        return Enrichment {
            description,
            image_url,
        };
    }

    let og = extract_from_document(&document, Some(page_url));
    Enrichment {
        description: description.or(og.description),
        image_url: image_url.or(og.image),
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn element_image_url(element: ElementRef<'_>, base_url: &str) -> Option<String> {
    IMAGE_ATTRS
        .iter()
        .filter_map(|attr| element.value().attr(attr))
        .find_map(|value| resolve_url(base_url, value))
}

/// Fetch a page body, failing on non-success status.
pub(crate) async fn fetch_html(
    client: &reqwest::Client,
    url: &str,
    timeout: Option<Duration>,
) -> Result<String> {
    let mut request = client.get(url).header("User-Agent", SCRAPER_USER_AGENT);
    if let Some(timeout) = timeout {
        request = request.timeout(timeout);
    }

    let response = request.send().await.context("Failed to fetch page")?;

    if !response.status().is_success() {
        anyhow::bail!("HTTP request failed with status {}", response.status());
    }

    response.text().await.context("Failed to read response body")
}

/// Detail fetcher for server-rendered pages.
#[derive(Debug, Clone)]
pub struct HttpDetailFetcher {
    client: reqwest::Client,
    selectors: DetailSelectors,
    timeout: Option<Duration>,
}

impl HttpDetailFetcher {
    #[must_use]
    pub fn new(client: reqwest::Client, selectors: DetailSelectors, timeout: Option<Duration>) -> Self {
        Self {
            client,
            selectors,
            timeout,
        }
    }
}

#[async_trait]
impl DetailFetcher for HttpDetailFetcher {
    async fn enrich(&self, candidate: &Candidate) -> Result<Enrichment> {
        let body = fetch_html(&self.client, &candidate.url, self.timeout).await?;
        Ok(parse_detail(&body, &candidate.url, &self.selectors))
    }
}

/// Adapter for server-rendered listing pages.
#[derive(Debug)]
pub struct HtmlListingAdapter {
    profile: SourceProfile,
    config: HtmlSourceConfig,
    listing: ListingSelectors,
    detail: DetailSelectors,
}

impl HtmlListingAdapter {
    /// # Errors
    ///
    /// Returns a description of the first invalid selector.
    pub fn new(profile: SourceProfile, config: HtmlSourceConfig) -> Result<Self, String> {
        let listing = config.listing_selectors()?;
        let detail = config.detail_selectors()?;
        Ok(Self {
            profile,
            config,
            listing,
            detail,
        })
    }

}

#[async_trait]
impl SourceAdapter for HtmlListingAdapter {
    fn profile(&self) -> &SourceProfile {
        &self.profile
    }

    async fn run(&self, ctx: &IngestContext, query: &RunQuery) -> IngestReport {
        let profile = self.profile.with_query(query);
        let listing_url = expand_listing_url(
            &self.config.listing_url,
            query,
            self.config.default_keyword.as_deref(),
        );

        let body = match fetch_html(&ctx.http, &listing_url, None).await {
            Ok(body) => body,
            Err(e) => {
                warn!(source = %profile.id, url = %listing_url, "Listing fetch failed: {e:#}");
                return IngestReport::aborted();
            }
        };

        let candidates = parse_listing(&body, &listing_url, &self.listing);
        debug!(source = %profile.id, count = candidates.len(), "Parsed listing");

        if self.config.fetch_detail {
            let fetcher = HttpDetailFetcher::new(ctx.http.clone(), self.detail.clone(), None);
            ingest_candidates(ctx, &profile, candidates, &fetcher).await
        } else {
            ingest_candidates(ctx, &profile, candidates, &NoDetail).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HtmlSourceConfig {
        HtmlSourceConfig {
            listing_url: "https://gallery.example.com/exhibitions?q={keyword}".to_string(),
            item_selector: "ul.board li".to_string(),
            link_selector: "a".to_string(),
            title_selector: Some(".tit".to_string()),
            snippet_selector: Some(".desc".to_string()),
            image_selector: Some("img".to_string()),
            fetch_detail: true,
            detail_summary_selector: Some(".view-content".to_string()),
            detail_image_selector: Some(".view-content img".to_string()),
            default_keyword: None,
        }
    }

    const LISTING: &str = r#"
        <ul class="board">
            <li>
                <a href="/exhibitions/1"><span class="tit"> 봄 기획 전시 </span></a>
                <p class="desc">Paintings and   prints</p>
                <img data-src="/thumbs/1.png">
            </li>
            <li><a href="javascript:void(0)"><span class="tit">No link</span></a></li>
            <li><a href="https://other.example.com/2"><span class="tit"></span></a></li>
            <li><a href="view.php?id=3">Gallery talk</a></li>
        </ul>
    "#;

    #[test]
    fn test_parse_listing_extracts_items() {
        let selectors = config().listing_selectors().unwrap();
        let candidates = parse_listing(LISTING, "https://gallery.example.com/exhibitions", &selectors);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].url, "https://gallery.example.com/exhibitions/1");
        assert_eq!(candidates[0].title, "봄 기획 전시");
        assert_eq!(candidates[0].snippet.as_deref(), Some("Paintings and prints"));
        assert_eq!(
            candidates[0].image_url.as_deref(),
            Some("https://gallery.example.com/thumbs/1.png")
        );

        // Falls back to link text when the title element is missing.
        assert_eq!(candidates[1].url, "https://gallery.example.com/view.php?id=3");
        assert_eq!(candidates[1].title, "Gallery talk");
        assert_eq!(candidates[1].image_url, None);
    }

    #[test]
    fn test_parse_detail_prefers_selectors() {
        let html = r#"
            <head><meta property="og:description" content="og text">
                  <meta property="og:image" content="/og.jpg"></head>
            <body><div class="view-content">Main text <img src="/poster.jpg"></div></body>
        "#;
        let selectors = config().detail_selectors().unwrap();
        let enrichment = parse_detail(html, "https://gallery.example.com/exhibitions/1", &selectors);
        assert_eq!(enrichment.description.as_deref(), Some("Main text"));
        assert_eq!(
            enrichment.image_url.as_deref(),
            Some("https://gallery.example.com/poster.jpg")
        );
    }

    #[test]
    fn test_parse_detail_falls_back_to_og() {
        let html = r#"
            <head><meta property="og:description" content="og text">
                  <meta property="og:image" content="/og.jpg"></head>
            <body><div class="other">Nothing here</div></body>
        "#;
        let selectors = config().detail_selectors().unwrap();
        let enrichment = parse_detail(html, "https://gallery.example.com/exhibitions/1", &selectors);
        assert_eq!(enrichment.description.as_deref(), Some("og text"));
        assert_eq!(
            enrichment.image_url.as_deref(),
            Some("https://gallery.example.com/og.jpg")
        );
    }

    #[test]
    fn test_invalid_selector_rejected() {
        let config = HtmlSourceConfig {
            item_selector: "ul[".to_string(),
            ..config()
        };
        assert!(config.listing_selectors().is_err());
    }

    #[test]
    fn test_listing_url_keyword_substitution() {
        let template = &config().listing_url;
        let url = expand_listing_url(
            template,
            &RunQuery {
                keyword: Some("현대 미술".to_string()),
                limit: None,
            },
            Some("전시"),
        );
        assert_eq!(
            url,
            "https://gallery.example.com/exhibitions?q=%ED%98%84%EB%8C%80+%EB%AF%B8%EC%88%A0"
        );

        let url = expand_listing_url(template, &RunQuery::default(), Some("전시"));
        assert_eq!(url, "https://gallery.example.com/exhibitions?q=%EC%A0%84%EC%8B%9C");

        let url = expand_listing_url(template, &RunQuery::default(), None);
        assert_eq!(url, "https://gallery.example.com/exhibitions?q=");
    }
}
