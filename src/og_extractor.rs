//! Open Graph metadata extraction from detail pages.
//!
//! Adapters use this when a listing gives them no description or image of
//! their own, and as the fallback behind their site-specific selectors.

use std::sync::LazyLock;

use scraper::{Html, Selector};

static OG_META: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[property^="og:"]"#).expect("valid selector"));
static META_DESCRIPTION: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"meta[name="description"]"#).expect("valid selector"));
static TWITTER_IMAGE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[name="twitter:image"], meta[property="twitter:image"]"#)
        .expect("valid selector")
});
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));

/// Extracted Open Graph metadata from an HTML page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedOgMetadata {
    /// og:title, falling back to `<title>`
    pub title: Option<String>,
    /// og:description, falling back to `meta[name=description]`
    pub description: Option<String>,
    /// og:image, falling back to twitter:image; absolute when a base URL was given
    pub image: Option<String>,
    /// og:type
    pub og_type: Option<String>,
}

impl ExtractedOgMetadata {
    /// Check if any metadata was extracted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.image.is_none()
            && self.og_type.is_none()
    }
}

/// Extract Open Graph metadata (with plain meta fallbacks) from HTML content.
///
/// Relative image URLs are resolved against `page_url` when it is given and
/// parseable.
#[must_use]
pub fn extract_og_metadata(html: &str, page_url: Option<&str>) -> ExtractedOgMetadata {
    let document = Html::parse_document(html);
    extract_from_document(&document, page_url)
}

/// Same as [`extract_og_metadata`] for an already parsed document.
#[must_use]
pub fn extract_from_document(document: &Html, page_url: Option<&str>) -> ExtractedOgMetadata {
    let mut metadata = ExtractedOgMetadata::default();

    for element in document.select(&OG_META) {
        let Some(property) = element.value().attr("property") else {
            continue;
        };
        let Some(content) = element
            .value()
            .attr("content")
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(ToString::to_string)
        else {
            continue;
        };

        let slot = match property {
            "og:title" => &mut metadata.title,
            "og:description" => &mut metadata.description,
            "og:image" | "og:image:url" | "og:image:secure_url" => &mut metadata.image,
            "og:type" => &mut metadata.og_type,
            _ => continue,
        };
        // First occurrence wins; pages often repeat og:image for each size.
        if slot.is_none() {
            *slot = Some(content);
        }
    }

    if metadata.description.is_none() {
        metadata.description = first_meta_content(document, &META_DESCRIPTION);
    }
    if metadata.image.is_none() {
        metadata.image = first_meta_content(document, &TWITTER_IMAGE);
    }
    if metadata.title.is_none() {
        metadata.title = document
            .select(&TITLE)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty());
    }

    if let Some(base) = page_url {
        metadata.image = metadata
            .image
            .map(|image| resolve_url(base, &image).unwrap_or(image));
    }

    metadata
}

fn first_meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .filter_map(|e| e.value().attr("content"))
        .map(str::trim)
        .find(|c| !c.is_empty())
        .map(ToString::to_string)
}

/// Resolve `href` against `base`, returning an absolute http(s) URL.
#[must_use]
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") || href.starts_with("data:") {
        return None;
    }
    let base = url::Url::parse(base).ok()?;
    let resolved = base.join(href).ok()?;
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}
