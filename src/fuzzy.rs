//! Fuzzy name matching shared by the Anchor Selector (§4.7), the
//! user-anchor strategy's artist search (§4.9.1), and the orchestrator's
//! enrichment pass (§4.13). Grounded on the teacher's
//! `services/entity_resolution.rs` name-similarity routine.

/// Similarity in `[0,1]`: exact match is `1.0`, a substring match scales
/// with the length ratio, otherwise falls back to normalized Levenshtein
/// distance with a penalty, matching the teacher's tiered approach.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a_norm = normalize(a);
    let b_norm = normalize(b);

    if a_norm == b_norm {
        return 1.0;
    }
    if a_norm.is_empty() || b_norm.is_empty() {
        return 0.0;
    }

    if a_norm.contains(&b_norm) || b_norm.contains(&a_norm) {
        let shorter = a_norm.len().min(b_norm.len()) as f64;
        let longer = a_norm.len().max(b_norm.len()) as f64;
        let ratio = shorter / longer;
        return if ratio >= 0.8 {
            0.95
        } else if ratio >= 0.6 {
            0.85
        } else {
            ratio * 0.8
        };
    }

    let distance = levenshtein::levenshtein(&a_norm, &b_norm);
    let max_len = a_norm.len().max(b_norm.len());
    let similarity = 1.0 - (distance as f64 / max_len as f64);
    if similarity >= 0.5 {
        similarity * 0.7
    } else {
        0.0
    }
}

fn normalize(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

/// Picks the best-matching candidate by [`name_similarity`] against
/// `query`, used by the user-anchor strategy to resolve a mentioned
/// artist name to a Catalog search result (spec §4.9.1, §8 scenario 6).
pub fn best_match<'a, T>(query: &str, candidates: &'a [T], name_of: impl Fn(&T) -> &str) -> Option<&'a T> {
    candidates
        .iter()
        .map(|candidate| (candidate, name_similarity(query, name_of(candidate))))
        .filter(|(_, score)| *score > 0.0)
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(candidate, _)| candidate)
}

/// Non-stopword token overlap ratio used by the orchestrator's enrichment
/// pass (spec §4.13): "pick the best match by fuzzy artist-name overlap
/// (>= 50% of non-stopword tokens)".
pub fn token_overlap_ratio(a: &str, b: &str) -> f64 {
    let tokens_a = content_tokens(a);
    let tokens_b: std::collections::HashSet<String> = content_tokens(b).into_iter().collect();
    if tokens_a.is_empty() {
        return 0.0;
    }
    let matched = tokens_a.iter().filter(|token| tokens_b.contains(*token)).count();
    matched as f64 / tokens_a.len() as f64
}

const STOPWORDS: &[&str] = &["the", "a", "an", "and", "feat", "featuring", "ft"];

fn content_tokens(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .filter(|token| !STOPWORDS.contains(token))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_scores_one() {
        assert_eq!(name_similarity("Justice", "justice"), 1.0);
    }

    #[test]
    fn substring_match_scores_highly() {
        assert!(name_similarity("Justice", "Justice (band)") > 0.8);
    }

    #[test]
    fn unrelated_names_score_zero() {
        assert_eq!(name_similarity("Justice", "Daft Punk"), 0.0);
    }

    #[test]
    fn best_match_picks_highest_scoring_candidate() {
        let candidates = vec!["Wrong Genre Justice Tribute", "Justice", "Unrelated"];
        let picked = best_match("justice", &candidates, |s: &&str| s);
        assert_eq!(picked, Some(&"Justice"));
    }

    #[test]
    fn token_overlap_meets_half_threshold() {
        assert!(token_overlap_ratio("Daft Punk", "Daft Punk feat. Pharrell") >= 0.5);
        assert!(token_overlap_ratio("Daft Punk", "Justice") < 0.5);
    }
}
