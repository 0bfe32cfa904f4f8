//! Response comparison
//!
//! Three methods, selected per test case: `exact` (trimmed equality),
//! `substring` (all required words present), and `semantic` (similarity
//! score against a threshold). The similarity backend sits behind a trait
//! so an embedding-based provider can replace the built-in lexical one
//! without touching the runner.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::Result;

/// Result of comparing an actual answer with the expected one.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonResult {
    /// Whether the answer passes
    pub is_match: bool,
    /// Score in `0.0..=1.0`
    pub score: f64,
    /// Method used
    pub method: String,
    /// Human-readable detail line
    pub details: Option<String>,
    /// Error message when comparison itself failed
    pub error_message: Option<String>,
}

/// Pluggable similarity backend for the `semantic` method.
#[async_trait]
pub trait SimilarityProvider: Send + Sync {
    /// Provider name for diagnostics
    fn name(&self) -> &str;

    /// Similarity score in `0.0..=1.0`
    async fn similarity(&self, actual: &str, expected: &str) -> Result<f64>;
}

/// Deterministic lexical similarity: Dice coefficient over lowercase word
/// sets. A stand-in for embedding models that keeps test runs reproducible
/// and offline.
pub struct LexicalProvider;

fn word_set(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl SimilarityProvider for LexicalProvider {
    fn name(&self) -> &str {
        "lexical-dice"
    }

    async fn similarity(&self, actual: &str, expected: &str) -> Result<f64> {
        let a = word_set(actual);
        let b = word_set(expected);
        if a.is_empty() && b.is_empty() {
            return Ok(1.0);
        }
        if a.is_empty() || b.is_empty() {
            return Ok(0.0);
        }
        let common = a.intersection(&b).count();
        #[allow(clippy::cast_precision_loss)]
        Ok(2.0 * common as f64 / (a.len() + b.len()) as f64)
    }
}

/// Comparison service holding the similarity provider.
pub struct Comparator {
    provider: Arc<dyn SimilarityProvider>,
}

impl Default for Comparator {
    fn default() -> Self {
        Self::new()
    }
}

impl Comparator {
    /// Comparator with the built-in lexical provider.
    #[must_use]
    pub fn new() -> Self {
        Self {
            provider: Arc::new(LexicalProvider),
        }
    }

    /// Comparator with a custom similarity provider.
    #[must_use]
    pub fn with_provider(provider: Arc<dyn SimilarityProvider>) -> Self {
        Self { provider }
    }

    /// Compare an actual answer against expectations using the named method.
    ///
    /// Unknown methods produce a non-matching result with an error message
    /// rather than failing the run.
    pub async fn compare(
        &self,
        actual: &str,
        expected: &str,
        method: &str,
        threshold: f64,
        required_words: Option<&[String]>,
    ) -> ComparisonResult {
        debug!(method = %method, "Comparing responses");

        let result = match method {
            "exact" => Self::exact(actual, expected),
            "substring" => Self::substring(actual, required_words.unwrap_or_default()),
            "semantic" => self.semantic(actual, expected, threshold).await,
            other => ComparisonResult {
                is_match: false,
                score: 0.0,
                method: other.to_string(),
                details: None,
                error_message: Some(format!("Unknown comparison method: {other}")),
            },
        };

        info!(
            method = %result.method,
            score = format!("{:.3}", result.score),
            is_match = result.is_match,
            "Response comparison"
        );
        result
    }

    fn exact(actual: &str, expected: &str) -> ComparisonResult {
        let is_match = actual.trim() == expected.trim();
        ComparisonResult {
            is_match,
            score: if is_match { 1.0 } else { 0.0 },
            method: "exact".to_string(),
            details: Some(format!("Exact match: {}", if is_match { "yes" } else { "no" })),
            error_message: None,
        }
    }

    fn substring(actual: &str, required_words: &[String]) -> ComparisonResult {
        if required_words.is_empty() {
            return ComparisonResult {
                is_match: true,
                score: 1.0,
                method: "substring".to_string(),
                details: Some("No required words specified".to_string()),
                error_message: None,
            };
        }

        let haystack = actual.trim().to_lowercase();
        let missing: Vec<&String> = required_words
            .iter()
            .filter(|w| !haystack.contains(&w.trim().to_lowercase()))
            .collect();

        let found = required_words.len() - missing.len();
        #[allow(clippy::cast_precision_loss)]
        let score = found as f64 / required_words.len() as f64;
        let mut details = format!("Found {found}/{} words", required_words.len());
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|s| s.as_str()).collect();
            details.push_str(&format!(" | Missing: {}", names.join(", ")));
        }

        ComparisonResult {
            is_match: missing.is_empty(),
            score,
            method: "substring".to_string(),
            details: Some(details),
            error_message: None,
        }
    }

    async fn semantic(&self, actual: &str, expected: &str, threshold: f64) -> ComparisonResult {
        match self.provider.similarity(actual, expected).await {
            Ok(score) => ComparisonResult {
                is_match: score >= threshold,
                score,
                method: "semantic".to_string(),
                details: Some(format!(
                    "Similarity ({}): {score:.3} (threshold: {threshold})",
                    self.provider.name()
                )),
                error_message: None,
            },
            Err(e) => ComparisonResult {
                is_match: false,
                score: 0.0,
                method: "semantic".to_string(),
                details: None,
                error_message: Some(format!("Similarity comparison failed: {e}")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn exact_match_trims_whitespace() {
        let comparator = Comparator::new();
        let result = comparator
            .compare("  hello  ", "hello", "exact", 0.8, None)
            .await;
        assert!(result.is_match);
        assert_eq!(result.score, 1.0);
    }

    #[tokio::test]
    async fn substring_requires_all_words() {
        let comparator = Comparator::new();
        let words = vec!["net".to_string(), "pay".to_string()];
        let result = comparator
            .compare("Your NET pay is 100", "", "substring", 0.8, Some(&words))
            .await;
        assert!(result.is_match);

        let words = vec!["net".to_string(), "bonus".to_string()];
        let result = comparator
            .compare("Your net pay is 100", "", "substring", 0.8, Some(&words))
            .await;
        assert!(!result.is_match);
        assert_eq!(result.score, 0.5);
        assert!(result.details.unwrap().contains("bonus"));
    }

    #[tokio::test]
    async fn semantic_scores_identical_text_at_one() {
        let comparator = Comparator::new();
        let result = comparator
            .compare("your pay is 100", "Your pay is 100.", "semantic", 0.85, None)
            .await;
        assert!(result.is_match);
        assert!(result.score > 0.99);
    }

    #[tokio::test]
    async fn semantic_rejects_unrelated_text() {
        let comparator = Comparator::new();
        let result = comparator
            .compare("completely different topic", "your pay is 100", "semantic", 0.85, None)
            .await;
        assert!(!result.is_match);
    }

    #[tokio::test]
    async fn unknown_method_is_a_non_match_with_error() {
        let comparator = Comparator::new();
        let result = comparator.compare("a", "a", "fuzzy", 0.8, None).await;
        assert!(!result.is_match);
        assert!(result.error_message.is_some());
    }
}
