//! Headless-browser adapter for JS-rendered listings.
//!
//! Each run launches its own Chromium, extracts `{url, title}` pairs and
//! detail data by evaluating scripts inside the page, and closes the browser
//! on every exit path.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::html::{expand_listing_url, parse_selector};
use super::pipeline::{ingest_candidates, IngestContext, IngestReport};
use super::{Candidate, DetailFetcher, Enrichment, RunQuery, SourceAdapter, SourceProfile};
use crate::config::Config;
use crate::constants::SCRAPER_USER_AGENT;
use crate::og_extractor::resolve_url;
use crate::sink::collapse_whitespace;

/// Default viewport width in pixels.
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;

/// Default viewport height in pixels.
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 800;

const LISTING_SCRIPT: &str = r"
(() => {
  const linkSel = __LINK__;
  const titleSel = __TITLE__;
  const items = Array.from(document.querySelectorAll(__ITEM__));
  return JSON.stringify(items.map((item) => {
    const link = item.matches(linkSel) ? item : item.querySelector(linkSel);
    const titleEl = titleSel ? item.querySelector(titleSel) : null;
    const title = ((titleEl || link || item).textContent || '').trim();
    return { url: link && link.href ? link.href : null, title };
  }));
})()
";

const DETAIL_SCRIPT: &str = r#"
(() => {
  const pick = (sel) => (sel ? document.querySelector(sel) : null);
  const meta = (name) => {
    const el = document.querySelector(`meta[property="${name}"]`) || document.querySelector(`meta[name="${name}"]`);
    return el ? el.getAttribute('content') : null;
  };
  const img = pick(__IMAGE__);
  const src = img ? (img.currentSrc || img.src || img.getAttribute('data-src')) : null;
  const body = pick(__SUMMARY__);
  const text = body ? (body.innerText || body.textContent || '').trim() : '';
  return JSON.stringify({
    image: src || meta('og:image'),
    description: text || meta('og:description') || meta('description'),
  });
})()
"#;

fn default_link_selector() -> String {
    "a".to_string()
}

/// Source definition for a JS-rendered listing page.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSourceConfig {
    /// Listing page. May contain `{keyword}`.
    pub listing_url: String,
    pub item_selector: String,
    #[serde(default = "default_link_selector")]
    pub link_selector: String,
    pub title_selector: Option<String>,
    /// Description element on the detail page (Open Graph is the fallback).
    pub detail_summary_selector: Option<String>,
    /// Image element on the detail page (Open Graph is the fallback).
    pub detail_image_selector: Option<String>,
    pub default_keyword: Option<String>,
}

impl BrowserSourceConfig {
    /// Check every selector parses before any browser is launched.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid selector.
    pub fn validate(&self) -> Result<(), String> {
        parse_selector(&self.item_selector)?;
        parse_selector(&self.link_selector)?;
        for selector in [
            &self.title_selector,
            &self.detail_summary_selector,
            &self.detail_image_selector,
        ]
        .into_iter()
        .flatten()
        {
            parse_selector(selector)?;
        }
        Ok(())
    }

    fn listing_script(&self) -> String {
        LISTING_SCRIPT
            .replace("__ITEM__", &js_string(Some(&self.item_selector)))
            .replace("__LINK__", &js_string(Some(&self.link_selector)))
            .replace("__TITLE__", &js_string(self.title_selector.as_deref()))
    }

    fn detail_script(&self) -> String {
        DETAIL_SCRIPT
            .replace("__IMAGE__", &js_string(self.detail_image_selector.as_deref()))
            .replace("__SUMMARY__", &js_string(self.detail_summary_selector.as_deref()))
    }
}

/// Encode a selector as a JS literal (`null` when absent).
fn js_string(value: Option<&str>) -> String {
    serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string())
}

/// Browser launch and navigation settings.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    /// Path to Chrome/Chromium executable (None for auto-detection).
    pub chrome_path: Option<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub nav_timeout: Duration,
    /// Extra wait after the load event for client-side rendering to settle.
    pub settle: Duration,
}

impl BrowserSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            chrome_path: config.chrome_path.clone(),
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            nav_timeout: config.browser_nav_timeout,
            settle: config.browser_settle,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListedLink {
    url: Option<String>,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Default, Deserialize)]
struct DetailData {
    image: Option<String>,
    description: Option<String>,
}

/// A browser owned by one adapter run.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    settings: BrowserSettings,
}

impl BrowserSession {
    /// Launch a headless browser with the sandbox disabled (containers).
    ///
    /// # Errors
    ///
    /// Returns an error if the browser config is invalid or Chromium fails to start.
    pub async fn launch(settings: BrowserSettings) -> Result<Self> {
        info!("Launching headless browser");

        let mut config_builder = BrowserConfig::builder()
            .window_size(settings.viewport_width, settings.viewport_height)
            .request_timeout(settings.nav_timeout)
            .no_sandbox()
            .disable_default_args()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--mute-audio")
            .arg(format!("--user-agent={SCRAPER_USER_AGENT}"));

        if let Some(ref chrome_path) = settings.chrome_path {
            config_builder = config_builder.chrome_executable(chrome_path);
        }

        let browser_config = config_builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("Failed to launch browser")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {e}");
                }
            }
        });

        Ok(Self {
            browser,
            handler,
            settings,
        })
    }

    /// Open `url` in a new tab and wait for it to load and settle.
    ///
    /// # Errors
    ///
    /// Returns an error if the tab cannot be created or navigation times out.
    pub async fn open(&self, url: &str) -> Result<Page> {
        let page = self
            .browser
            .new_page(url)
            .await
            .with_context(|| format!("Failed to open {url}"))?;

        match tokio::time::timeout(self.settings.nav_timeout, page.wait_for_navigation()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                close_page(page).await;
                return Err(anyhow::anyhow!("Navigation to {url} failed: {e}"));
            }
            Err(_) => {
                close_page(page).await;
                anyhow::bail!("Navigation to {url} timed out");
            }
        }

        if !self.settings.settle.is_zero() {
            tokio::time::sleep(self.settings.settle).await;
        }

        Ok(page)
    }

    /// Evaluate a script that returns a JSON string and decode it.
    async fn evaluate_json<T: serde::de::DeserializeOwned>(page: &Page, script: String) -> Result<T> {
        let raw: String = page
            .evaluate(script)
            .await
            .context("Script evaluation failed")?
            .into_value()
            .context("Script did not return a string")?;
        serde_json::from_str(&raw).context("Script returned malformed JSON")
    }

    /// Close the browser. Errors are logged, never returned.
    pub async fn close(self) {
        let mut browser = self.browser;
        if let Err(e) = browser.close().await {
            warn!("Failed to close browser: {e}");
        } else if let Err(e) = browser.wait().await {
            debug!("Failed to reap browser process: {e}");
        }
        self.handler.abort();
        info!("Browser closed");
    }
}

impl std::fmt::Debug for BrowserSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserSession")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

async fn close_page(page: Page) {
    if let Err(e) = page.close().await {
        debug!("Failed to close page: {e}");
    }
}

/// Turn in-page listing results into candidates.
fn listed_to_candidates(listed: Vec<ListedLink>, base_url: &str) -> Vec<Candidate> {
    listed
        .into_iter()
        .filter_map(|item| {
            let url = resolve_url(base_url, item.url.as_deref()?)?;
            let title = collapse_whitespace(&item.title);
            (!title.is_empty()).then_some(Candidate {
                url,
                title,
                snippet: None,
                image_url: None,
            })
        })
        .collect()
}

/// Detail fetcher that renders each page in the session's browser.
pub struct BrowserDetailFetcher<'a> {
    session: &'a BrowserSession,
    script: String,
}

impl<'a> BrowserDetailFetcher<'a> {
    #[must_use]
    pub fn new(session: &'a BrowserSession, config: &BrowserSourceConfig) -> Self {
        Self {
            session,
            script: config.detail_script(),
        }
    }
}

#[async_trait]
impl DetailFetcher for BrowserDetailFetcher<'_> {
    async fn enrich(&self, candidate: &Candidate) -> Result<Enrichment> {
        let page = self.session.open(&candidate.url).await?;
        let data = BrowserSession::evaluate_json::<DetailData>(&page, self.script.clone()).await;
        close_page(page).await;
        let data = data?;

        Ok(Enrichment {
            description: data
                .description
                .map(|d| collapse_whitespace(&d))
                .filter(|d| !d.is_empty()),
            image_url: data
                .image
                .and_then(|src| resolve_url(&candidate.url, &src)),
        })
    }
}

/// Adapter for JS-rendered listing pages.
#[derive(Debug)]
pub struct BrowserListingAdapter {
    profile: SourceProfile,
    config: BrowserSourceConfig,
    settings: BrowserSettings,
}

impl BrowserListingAdapter {
    /// # Errors
    ///
    /// Returns a description of the first invalid selector.
    pub fn new(
        profile: SourceProfile,
        config: BrowserSourceConfig,
        settings: BrowserSettings,
    ) -> Result<Self, String> {
        config.validate()?;
        Ok(Self {
            profile,
            config,
            settings,
        })
    }

    async fn run_with_session(
        &self,
        ctx: &IngestContext,
        session: &BrowserSession,
        profile: &SourceProfile,
        listing_url: &str,
    ) -> Result<IngestReport> {
        let page = session.open(listing_url).await?;
        let listed =
            BrowserSession::evaluate_json::<Vec<ListedLink>>(&page, self.config.listing_script())
                .await;
        close_page(page).await;

        let candidates = listed_to_candidates(listed?, listing_url);
        debug!(source = %profile.id, count = candidates.len(), "Extracted rendered listing");

        let fetcher = BrowserDetailFetcher::new(session, &self.config);
        Ok(ingest_candidates(ctx, profile, candidates, &fetcher).await)
    }
}

#[async_trait]
impl SourceAdapter for BrowserListingAdapter {
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

        let session = match BrowserSession::launch(self.settings.clone()).await {
            Ok(session) => session,
            Err(e) => {
                warn!(source = %profile.id, "Browser launch failed: {e:#}");
                return IngestReport::aborted();
            }
        };

        let result = self
            .run_with_session(ctx, &session, &profile, &listing_url)
            .await;
        session.close().await;

        match result {
            Ok(report) => report,
            Err(e) => {
                warn!(source = %profile.id, url = %listing_url, "Rendered listing failed: {e:#}");
                IngestReport::aborted()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BrowserSourceConfig {
        BrowserSourceConfig {
            listing_url: "https://art.example.com/list".to_string(),
            item_selector: "li.item".to_string(),
            link_selector: "a".to_string(),
            title_selector: Some("h3[data-role=\"title\"]".to_string()),
            detail_summary_selector: None,
            detail_image_selector: Some(".poster img".to_string()),
            default_keyword: None,
        }
    }

    #[test]
    fn test_scripts_embed_escaped_selectors() {
        let listing = config().listing_script();
        assert!(listing.contains(r#"document.querySelectorAll("li.item")"#));
        assert!(listing.contains(r#"const titleSel = "h3[data-role=\"title\"]";"#));
        assert!(!listing.contains("__"));

        let detail = config().detail_script();
        assert!(detail.contains(r#"pick(".poster img")"#));
        assert!(detail.contains("pick(null)"));
        assert!(!detail.contains("__"));
    }

    #[test]
    fn test_validate_rejects_bad_selector() {
        let bad = BrowserSourceConfig {
            detail_image_selector: Some("img[".to_string()),
            ..config()
        };
        assert!(bad.validate().is_err());
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_listed_to_candidates() {
        let listed: Vec<ListedLink> = serde_json::from_str(
            r#"[
                {"url": "https://art.example.com/view/1", "title": "  Museum \n night "},
                {"url": null, "title": "No link"},
                {"url": "/view/3", "title": ""},
                {"url": "/view/4", "title": "Gallery opening"}
            ]"#,
        )
        .unwrap();

        let candidates = listed_to_candidates(listed, "https://art.example.com/list");
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].title, "Museum night");
        assert_eq!(candidates[1].url, "https://art.example.com/view/4");
    }
}
