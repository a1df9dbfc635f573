//! Ranking policy: one scoring function for every source.

use std::sync::LazyLock;

use chrono::Datelike;
use regex::Regex;
use serde::Deserialize;

static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// How much a source's listings are trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTier {
    /// The venue's own listing.
    Primary,
    /// Curated third-party listings.
    #[default]
    Secondary,
    /// Search results and other aggregated feeds.
    Aggregated,
}

/// Inputs to [`RankingPolicy::score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankingSignals {
    pub tier: SourceTier,
    /// A thumbnail was relayed into owned storage.
    pub has_image: bool,
    /// The item text mentions the current or targeted year.
    pub recent: bool,
}

/// Weights for the ranking hint written to `scraped_posts.score`.
///
/// `score = tier weight + image bonus (if any) + recency bonus (if any)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankingPolicy {
    pub primary_weight: i64,
    pub secondary_weight: i64,
    pub aggregated_weight: i64,
    pub image_bonus: i64,
    pub recency_bonus: i64,
}

impl Default for RankingPolicy {
    fn default() -> Self {
        Self {
            primary_weight: 2,
            secondary_weight: 1,
            aggregated_weight: 0,
            image_bonus: 1,
            recency_bonus: 1,
        }
    }
}

impl RankingPolicy {
    #[must_use]
    pub fn score(&self, signals: &RankingSignals) -> i64 {
        let tier = match signals.tier {
            SourceTier::Primary => self.primary_weight,
            SourceTier::Secondary => self.secondary_weight,
            SourceTier::Aggregated => self.aggregated_weight,
        };
        let image = if signals.has_image { self.image_bonus } else { 0 };
        let recent = if signals.recent { self.recency_bonus } else { 0 };
        tier + image + recent
    }
}

/// First plausible year (1900-2099) embedded in `text`, e.g. "2024년 전시".
#[must_use]
pub fn extract_year(text: &str) -> Option<i32> {
    years(text).next()
}

/// Whether `text` mentions `target_year`, or the current year when no target is set.
#[must_use]
pub fn mentions_year(text: &str, target_year: Option<i32>) -> bool {
    let year = target_year.unwrap_or_else(|| chrono::Utc::now().year());
    years(text).any(|y| y == year)
}

/// Standalone four-digit runs starting with 19 or 20.
fn years(text: &str) -> impl Iterator<Item = i32> + '_ {
    DIGIT_RUN
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|run| run.len() == 4 && (run.starts_with("19") || run.starts_with("20")))
        .filter_map(|run| run.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_combines_signals() {
        let policy = RankingPolicy::default();
        let score = |tier, has_image, recent| {
            policy.score(&RankingSignals {
                tier,
                has_image,
                recent,
            })
        };

        assert_eq!(score(SourceTier::Aggregated, false, false), 0);
        assert_eq!(score(SourceTier::Secondary, false, false), 1);
        assert_eq!(score(SourceTier::Primary, false, false), 2);
        assert_eq!(score(SourceTier::Primary, true, true), 4);
        assert_eq!(score(SourceTier::Aggregated, true, false), 1);
    }

    #[test]
    fn test_extract_year() {
        assert_eq!(extract_year("2024년 봄 전시"), Some(2024));
        assert_eq!(extract_year("exhibitions 2025"), Some(2025));
        assert_eq!(extract_year("room 12024"), None);
        assert_eq!(extract_year("no year here"), None);
    }

    #[test]
    fn test_mentions_year() {
        assert!(mentions_year("2024.03.01 ~ 2024.04.30", Some(2024)));
        assert!(!mentions_year("2023.03.01 ~ 2023.04.30", Some(2024)));

        let current = chrono::Utc::now().year();
        assert!(mentions_year(&format!("{current}년 기획전"), None));
    }

    #[test]
    fn test_tier_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            tier: SourceTier,
        }
        let w: Wrapper = toml::from_str(r#"tier = "primary""#).unwrap();
        assert_eq!(w.tier, SourceTier::Primary);
    }
}
