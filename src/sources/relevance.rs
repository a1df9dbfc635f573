//! Coarse topical gate for exhibition/art listings.

use regex::{Regex, RegexBuilder};
use thiserror::Error;

use super::Candidate;

#[derive(Debug, Error)]
pub enum RelevanceError {
    #[error("keyword list is empty")]
    EmptyKeywords,
    #[error("keyword pattern failed to compile: {0}")]
    Pattern(#[from] regex::Error),
}

/// Keywords used when a source does not declare its own.
///
/// ASCII keywords match at the start of a word ("art" matches "artist", not
/// "start"); other keywords match anywhere.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "전시",
    "展",
    "미술",
    "갤러리",
    "아트",
    "작가",
    "비엔날레",
    "exhibit",
    "gallery",
    "art",
    "museum",
    "biennale",
];

/// Case-insensitive keyword matcher compiled into one alternation.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    pattern: Regex,
}

impl RelevanceFilter {
    /// Build a filter from keywords. Blank keywords are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if no usable keyword remains or the compiled pattern
    /// exceeds the regex size limit.
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Result<Self, RelevanceError> {
        let alternatives: Vec<String> = keywords
            .iter()
            .map(|k| k.as_ref().trim())
            .filter(|k| !k.is_empty())
            .map(|k| {
                if k.starts_with(|c: char| c.is_ascii_alphanumeric()) {
                    format!(r"\b{}", regex::escape(k))
                } else {
                    regex::escape(k)
                }
            })
            .collect();

        if alternatives.is_empty() {
            return Err(RelevanceError::EmptyKeywords);
        }

        let pattern = RegexBuilder::new(&format!("(?:{})", alternatives.join("|")))
            .case_insensitive(true)
            .build()?;
        Ok(Self { pattern })
    }

    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// Whether the candidate's title or snippet is on topic.
    #[must_use]
    pub fn matches_candidate(&self, candidate: &Candidate) -> bool {
        self.matches(&candidate.title)
            || candidate
                .snippet
                .as_deref()
                .is_some_and(|snippet| self.matches(snippet))
    }
}

impl Default for RelevanceFilter {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS).expect("default keywords compile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_korean_and_english() {
        let filter = RelevanceFilter::default();
        assert!(filter.matches("2024 서울 현대미술 특별전시"));
        assert!(filter.matches("Gallery Night: New Works"));
        assert!(filter.matches("Solo EXHIBITION by Kim"));
        assert!(filter.matches("Meet the Artist"));
    }

    #[test]
    fn test_default_rejects_off_topic() {
        let filter = RelevanceFilter::default();
        assert!(!filter.matches("주차장 이용 안내"));
        assert!(!filter.matches("Start of the season sale"));
        assert!(!filter.matches("Office closed for holidays"));
    }

    #[test]
    fn test_custom_keywords_escaped() {
        let filter = RelevanceFilter::new(&["c++", "a.b"]).unwrap();
        assert!(filter.matches("learn c++ today"));
        assert!(filter.matches("a.b"));
        assert!(!filter.matches("axb"));
    }

    #[test]
    fn test_empty_keywords_rejected() {
        assert!(matches!(
            RelevanceFilter::new(&["", "  "]),
            Err(RelevanceError::EmptyKeywords)
        ));
        let none: [&str; 0] = [];
        assert!(matches!(
            RelevanceFilter::new(&none),
            Err(RelevanceError::EmptyKeywords)
        ));
    }

    #[test]
    fn test_snippet_can_carry_the_match() {
        let filter = RelevanceFilter::default();
        let candidate = Candidate {
            url: "https://example.com/1".to_string(),
            title: "Spring opening".to_string(),
            snippet: Some("Works from the museum collection".to_string()),
            image_url: None,
        };
        assert!(filter.matches_candidate(&candidate));

        let candidate = Candidate {
            snippet: None,
            ..candidate
        };
        assert!(!filter.matches_candidate(&candidate));
    }
}
