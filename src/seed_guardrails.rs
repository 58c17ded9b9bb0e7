//! Seed combination deny-list and auto-balancing (spec §4.3), grounded on
//! the original `seed_guardrails.py`: fingerprinting, fallback suggestion,
//! and the exact order of the auto-balance checks.

use std::sync::Arc;

use chrono::Duration;

use crate::cache::CacheManager;
use crate::error::Result;
use crate::models::deny_list::DenyEntry;

const DENY_LIST_TTL_SECS: i64 = 3600 * 24;
const CATEGORY: &str = "seed_deny_list";

/// Permanent-failure substrings checked by `should_skip_retry`, ported
/// from `seed_guardrails.py`'s fixed list.
const PERMANENT_FAILURE_SUBSTRINGS: &[&str] = &[
    "validation error",
    "overlap",
    "empty",
    "negative ratio",
    "negative seeds",
];

#[derive(Debug, Clone, PartialEq)]
pub enum FallbackStrategy {
    DropNegativeSeeds,
    ReduceNegativeSeeds { keep: usize },
    ReduceSeeds { keep_seeds: Vec<String> },
    RemoveAllNegatives,
}

#[derive(Debug, Clone, Default)]
pub struct BalancedParams {
    pub seeds: Vec<String>,
    pub negatives: Vec<String>,
}

pub struct SeedGuardrails {
    cache: Arc<CacheManager>,
}

impl SeedGuardrails {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self { cache }
    }

    /// `md5(sorted(seeds) | sorted(negatives) | sorted_non_null(features))`.
    /// Sorting first is essential so identical combinations in different
    /// orders hash the same (spec §4.3).
    pub fn fingerprint(seeds: &[String], negatives: &[String], features: &[String]) -> String {
        let mut seeds = seeds.to_vec();
        seeds.sort();
        let mut negatives = negatives.to_vec();
        negatives.sort();
        let mut features: Vec<String> = features.iter().filter(|f| !f.is_empty()).cloned().collect();
        features.sort();

        let payload = format!("{}|{}|{}", seeds.join(","), negatives.join(","), features.join(","));
        format!("{:x}", md5::compute(payload.as_bytes()))
    }

    pub async fn is_combination_denied(
        &self,
        seeds: &[String],
        negatives: &[String],
        features: &[String],
    ) -> Option<String> {
        let fingerprint = Self::fingerprint(seeds, negatives, features);
        self.cache
            .get::<DenyEntry>(CATEGORY, &[&fingerprint])
            .await
            .map(|entry| entry.reason)
    }

    pub async fn add_to_deny_list(
        &self,
        seeds: &[String],
        negatives: &[String],
        features: &[String],
        reason: &str,
    ) -> Result<()> {
        let fingerprint = Self::fingerprint(seeds, negatives, features);
        let entry = DenyEntry::new(fingerprint.clone(), reason, seeds.len(), negatives.len());
        self.cache
            .set(CATEGORY, &[&fingerprint], &entry, Duration::seconds(DENY_LIST_TTL_SECS))
            .await
    }

    pub fn should_skip_retry(error_message: &str) -> bool {
        let lower = error_message.to_lowercase();
        PERMANENT_FAILURE_SUBSTRINGS
            .iter()
            .any(|substring| lower.contains(substring))
    }

    /// First applicable repair, in the order `seed_guardrails.py` applies
    /// them: drop-negatives, reduce-negatives, reduce-seeds,
    /// remove-all-negatives as the last resort.
    pub fn suggest_fallback_strategy(
        seeds: &[String],
        negatives: &[String],
        reason: &str,
    ) -> Option<FallbackStrategy> {
        let lower = reason.to_lowercase();
        if lower.contains("negative") || lower.contains("ratio") {
            return Some(FallbackStrategy::DropNegativeSeeds);
        }
        if !seeds.is_empty() && negatives.len() as f64 >= seeds.len() as f64 * 0.5 {
            let cap = (seeds.len() / 2).saturating_sub(1).max(1);
            return Some(FallbackStrategy::ReduceNegativeSeeds { keep: cap });
        }
        if seeds.len() > 3 {
            return Some(FallbackStrategy::ReduceSeeds {
                keep_seeds: seeds.iter().take(3).cloned().collect(),
            });
        }
        Some(FallbackStrategy::RemoveAllNegatives)
    }

    /// Applies the auto-balance rules in order, first match wins (spec
    /// §4.3). Returns `Err` for hard failures (empty IDs, bad size) and
    /// `Ok(params)` — possibly repaired — otherwise.
    pub async fn validate_and_auto_balance(
        &self,
        seeds: &[String],
        negatives: &[String],
        features: &[String],
    ) -> std::result::Result<BalancedParams, String> {
        if seeds.iter().any(|s| s.trim().is_empty()) || negatives.iter().any(|n| n.trim().is_empty()) {
            return Err("seed or negative id is empty or whitespace".to_string());
        }
        if seeds.is_empty() || seeds.len() > 100 {
            return Err(format!("seed count {} outside allowed range [1,100]", seeds.len()));
        }
        if let Some(reason) = self.is_combination_denied(seeds, negatives, features).await {
            return Err(format!("combination is on the deny-list: {reason}"));
        }
        if negatives.len() >= seeds.len() {
            let keep = (seeds.len() / 2).max(1);
            return Ok(BalancedParams {
                seeds: seeds.to_vec(),
                negatives: negatives.iter().take(keep).cloned().collect(),
            });
        }
        let seed_set: std::collections::HashSet<&String> = seeds.iter().collect();
        let overlap: Vec<String> = negatives
            .iter()
            .filter(|n| seed_set.contains(n))
            .cloned()
            .collect();
        if !overlap.is_empty() {
            let overlap_set: std::collections::HashSet<&String> = overlap.iter().collect();
            let cleaned: Vec<String> = negatives
                .iter()
                .filter(|n| !overlap_set.contains(n))
                .cloned()
                .collect();
            return Ok(BalancedParams {
                seeds: seeds.to_vec(),
                negatives: cleaned,
            });
        }
        Ok(BalancedParams {
            seeds: seeds.to_vec(),
            negatives: negatives.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_order_independent() {
        let a = SeedGuardrails::fingerprint(
            &["s2".to_string(), "s1".to_string()],
            &["n1".to_string()],
            &[],
        );
        let b = SeedGuardrails::fingerprint(
            &["s1".to_string(), "s2".to_string()],
            &["n1".to_string()],
            &[],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn should_skip_retry_matches_permanent_failures() {
        assert!(SeedGuardrails::should_skip_retry("Validation Error: empty ids"));
        assert!(SeedGuardrails::should_skip_retry("seeds and negatives overlap"));
        assert!(!SeedGuardrails::should_skip_retry("upstream timeout"));
    }

    #[test]
    fn fallback_strategy_prefers_drop_negatives_on_ratio_error() {
        let strategy = SeedGuardrails::suggest_fallback_strategy(
            &["s1".to_string(), "s2".to_string()],
            &["n1".to_string()],
            "negative ratio too high",
        );
        assert_eq!(strategy, Some(FallbackStrategy::DropNegativeSeeds));
    }

    #[test]
    fn fallback_strategy_reduces_negatives_when_half_or_more() {
        let seeds: Vec<String> = (0..4).map(|i| format!("s{i}")).collect();
        let negatives: Vec<String> = (0..2).map(|i| format!("n{i}")).collect();
        let strategy = SeedGuardrails::suggest_fallback_strategy(&seeds, &negatives, "upstream rejected");
        assert_eq!(strategy, Some(FallbackStrategy::ReduceNegativeSeeds { keep: 1 }));
    }

    #[test]
    fn fallback_strategy_reduces_seeds_when_more_than_three() {
        let seeds: Vec<String> = (0..5).map(|i| format!("s{i}")).collect();
        let strategy = SeedGuardrails::suggest_fallback_strategy(&seeds, &[], "upstream rejected");
        assert_eq!(
            strategy,
            Some(FallbackStrategy::ReduceSeeds {
                keep_seeds: vec!["s0".to_string(), "s1".to_string(), "s2".to_string()]
            })
        );
    }

    #[test]
    fn fallback_strategy_falls_back_to_remove_all_negatives() {
        let strategy = SeedGuardrails::suggest_fallback_strategy(
            &["s0".to_string(), "s1".to_string()],
            &[],
            "unknown upstream error",
        );
        assert_eq!(strategy, Some(FallbackStrategy::RemoveAllNegatives));
    }
}
