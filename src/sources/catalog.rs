//! Source catalog: which adapters run, in which order, with which settings.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use super::browser::{BrowserListingAdapter, BrowserSettings, BrowserSourceConfig};
use super::html::{HtmlListingAdapter, HtmlSourceConfig, KEYWORD_PLACEHOLDER};
use super::ranking::SourceTier;
use super::relevance::RelevanceFilter;
use super::search::{SearchApiAdapter, SearchApiSettings, SearchSourceConfig};
use super::{SourceAdapter, SourceProfile};
use crate::config::Config;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read sources file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse sources file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("duplicate source id {0:?}")]
    DuplicateId(String),
    #[error("source {id:?}: {message}")]
    Invalid { id: String, message: String },
}

const fn default_limit() -> usize {
    20
}

const fn default_enabled() -> bool {
    true
}

/// Top-level shape of the sources file.
#[derive(Debug, Clone, Deserialize)]
pub struct SourcesFile {
    #[serde(default)]
    pub sources: Vec<SourceDefinition>,
}

/// One `[[sources]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceDefinition {
    /// Tag written to `scraped_posts.source`.
    pub id: String,
    #[serde(default)]
    pub tier: SourceTier,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Replaces the shared relevance keywords for this source.
    pub keywords: Option<Vec<String>>,
    pub target_year: Option<i32>,
    #[serde(flatten)]
    pub kind: SourceKind,
}

/// Strategy-specific settings, selected by `kind`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceKind {
    Html(HtmlSourceConfig),
    Browser(BrowserSourceConfig),
    Search(SearchSourceConfig),
}

impl SourcesFile {
    /// Parse a sources file from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or does not match the schema.
    pub fn parse(text: &str) -> Result<Self, CatalogError> {
        Ok(toml::from_str(text)?)
    }
}

/// Read and parse a sources file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_sources_file(path: &Path) -> Result<SourcesFile, CatalogError> {
    let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
        path: path.display().to_string(),
        source,
    })?;
    SourcesFile::parse(&text)
}

impl SourceDefinition {
    fn invalid(&self, message: impl Into<String>) -> CatalogError {
        CatalogError::Invalid {
            id: self.id.clone(),
            message: message.into(),
        }
    }

    fn profile(&self) -> Result<SourceProfile, CatalogError> {
        if self.id.trim().is_empty() {
            return Err(self.invalid("id cannot be empty"));
        }
        if self.limit == 0 {
            return Err(self.invalid("limit must be at least 1"));
        }
        let filter = match &self.keywords {
            Some(keywords) => RelevanceFilter::new(keywords)
                .map_err(|e| self.invalid(format!("invalid keywords: {e}")))?,
            None => RelevanceFilter::default(),
        };
        Ok(SourceProfile {
            id: self.id.trim().to_string(),
            tier: self.tier,
            limit: self.limit,
            filter,
            target_year: self.target_year,
        })
    }

    fn check_listing_url(&self, listing_url: &str) -> Result<(), CatalogError> {
        let probe = listing_url.replace(KEYWORD_PLACEHOLDER, "");
        match url::Url::parse(&probe) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => Ok(()),
            _ => Err(self.invalid(format!("listing_url is not an http(s) url: {listing_url}"))),
        }
    }

    /// Build the adapter for this definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the id, limit, keywords, URL, or selectors are invalid.
    pub fn build(&self, config: &Config) -> Result<Box<dyn SourceAdapter>, CatalogError> {
        let profile = self.profile()?;
        match &self.kind {
            SourceKind::Html(html) => {
                self.check_listing_url(&html.listing_url)?;
                let adapter = HtmlListingAdapter::new(profile, html.clone())
                    .map_err(|e| self.invalid(e))?;
                Ok(Box::new(adapter))
            }
            SourceKind::Browser(browser) => {
                self.check_listing_url(&browser.listing_url)?;
                let adapter = BrowserListingAdapter::new(
                    profile,
                    browser.clone(),
                    BrowserSettings::from_config(config),
                )
                .map_err(|e| self.invalid(e))?;
                Ok(Box::new(adapter))
            }
            SourceKind::Search(search) => {
                if search.keyword.trim().is_empty() {
                    return Err(self.invalid("keyword cannot be empty"));
                }
                Ok(Box::new(SearchApiAdapter::new(
                    profile,
                    search.clone(),
                    SearchApiSettings::from_config(config),
                )))
            }
        }
    }
}

/// Build the enabled adapters in file order.
///
/// # Errors
///
/// Returns an error for duplicate ids or the first invalid definition.
pub fn build_adapters(
    definitions: &[SourceDefinition],
    config: &Config,
) -> Result<Vec<Box<dyn SourceAdapter>>, CatalogError> {
    let mut ids = HashSet::new();
    let mut adapters = Vec::new();

    for definition in definitions {
        if !ids.insert(definition.id.trim().to_string()) {
            return Err(CatalogError::DuplicateId(definition.id.clone()));
        }
        if !definition.enabled {
            continue;
        }
        adapters.push(definition.build(config)?);
    }

    Ok(adapters)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[sources]]
        id = "city-gallery"
        kind = "html"
        tier = "primary"
        limit = 15
        listing_url = "https://gallery.example.com/exhibitions"
        item_selector = "ul.board li"
        title_selector = ".tit"

        [[sources]]
        id = "art-portal"
        kind = "browser"
        listing_url = "https://portal.example.com/search?q={keyword}"
        item_selector = "li.result"
        default_keyword = "전시"
        enabled = false

        [[sources]]
        id = "web-search"
        kind = "search"
        tier = "aggregated"
        keyword = "2025 전시회"
        allowed_domains = ["example.org"]
        keywords = ["전시", "exhibition"]
    "#;

    #[test]
    fn test_parse_sample() {
        let file = SourcesFile::parse(SAMPLE).unwrap();
        assert_eq!(file.sources.len(), 3);

        let html = &file.sources[0];
        assert_eq!(html.tier, SourceTier::Primary);
        assert_eq!(html.limit, 15);
        match &html.kind {
            SourceKind::Html(c) => {
                assert_eq!(c.link_selector, "a");
                assert!(c.fetch_detail);
            }
            other => panic!("unexpected kind {other:?}"),
        }

        let browser = &file.sources[1];
        assert!(!browser.enabled);
        assert_eq!(browser.tier, SourceTier::Secondary);
        assert_eq!(browser.limit, 20);

        match &file.sources[2].kind {
            SourceKind::Search(c) => {
                assert_eq!(c.min_text_len, 40);
                assert_eq!(c.allowed_domains, vec!["example.org".to_string()]);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_build_skips_disabled() {
        let file = SourcesFile::parse(SAMPLE).unwrap();
        let adapters = build_adapters(&file.sources, &Config::for_testing()).unwrap();
        let ids: Vec<&str> = adapters.iter().map(|a| a.id()).collect();
        assert_eq!(ids, vec!["city-gallery", "web-search"]);
    }

    #[test]
    fn test_keyword_placeholder_url_accepted() {
        let text = r#"
            [[sources]]
            id = "portal"
            kind = "browser"
            listing_url = "https://portal.example.com/search?q={keyword}&page=1"
            item_selector = "li.result"

            [[sources]]
            id = "board"
            kind = "html"
            listing_url = "{keyword}"
            item_selector = "li"
        "#;
        let file = SourcesFile::parse(text).unwrap();
        assert!(file.sources[0].build(&Config::for_testing()).is_ok());
        assert!(matches!(
            file.sources[1].build(&Config::for_testing()),
            Err(CatalogError::Invalid { .. })
        ));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let text = r#"
            [[sources]]
            id = "dup"
            kind = "search"
            keyword = "전시"

            [[sources]]
            id = "dup"
            kind = "search"
            keyword = "미술"
        "#;
        let file = SourcesFile::parse(text).unwrap();
        assert!(matches!(
            build_adapters(&file.sources, &Config::for_testing()),
            Err(CatalogError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_invalid_definitions_rejected() {
        let cases = [
            r#"
            [[sources]]
            id = "bad-url"
            kind = "html"
            listing_url = "ftp://example.com/list"
            item_selector = "li"
            "#,
            r#"
            [[sources]]
            id = "bad-selector"
            kind = "html"
            listing_url = "https://example.com/list"
            item_selector = "li["
            "#,
            r#"
            [[sources]]
            id = "bad-limit"
            kind = "search"
            keyword = "전시"
            limit = 0
            "#,
            r#"
            [[sources]]
            id = "bad-keywords"
            kind = "search"
            keyword = "전시"
            keywords = []
            "#,
        ];

        for text in cases {
            let file = SourcesFile::parse(text).unwrap();
            assert!(
                matches!(
                    build_adapters(&file.sources, &Config::for_testing()),
                    Err(CatalogError::Invalid { .. })
                ),
                "expected invalid: {text}"
            );
        }
    }

    #[test]
    fn test_unknown_kind_fails_to_parse() {
        let text = r#"
            [[sources]]
            id = "x"
            kind = "ftp"
        "#;
        assert!(SourcesFile::parse(text).is_err());
    }
}
