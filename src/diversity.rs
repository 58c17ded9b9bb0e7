//! Artist diversity penalty, stable sort partitioning, and deduplication
//! (spec §4.11).

use std::collections::HashMap;
use std::collections::HashSet;

use crate::models::track::TrackRecommendation;

/// Subtracts `0.1 * (count - 1)` from each non-protected track's
/// confidence per repeated artist, floored at 0.1. Protected tracks are
/// exempt (spec §4.11).
pub fn apply_artist_diversity_penalty(tracks: &mut [TrackRecommendation]) {
    let mut counts: HashMap<String, u32> = HashMap::new();
    for track in tracks.iter() {
        if track.protected {
            continue;
        }
        for artist in &track.artists {
            *counts.entry(artist.clone()).or_insert(0) += 1;
        }
    }
    for track in tracks.iter_mut() {
        if track.protected {
            continue;
        }
        let max_repeats = track
            .artists
            .iter()
            .filter_map(|artist| counts.get(artist))
            .copied()
            .max()
            .unwrap_or(1);
        if max_repeats > 1 {
            let penalty = 0.1 * (max_repeats - 1) as f64;
            track.confidence_score = (track.confidence_score - penalty).max(0.1);
        }
    }
}

/// Partitions into protected/non-protected, sorts each independently by
/// confidence descending, and concatenates protected first. The combined
/// list is never re-sorted afterward (spec §4.11's stability invariant).
pub fn sort_protected_first_by_confidence(mut tracks: Vec<TrackRecommendation>) -> Vec<TrackRecommendation> {
    let (mut protected, mut rest): (Vec<_>, Vec<_>) = tracks.drain(..).partition(|t| t.protected);
    protected.sort_by(|a, b| b.confidence_score.partial_cmp(&a.confidence_score).unwrap_or(std::cmp::Ordering::Equal));
    rest.sort_by(|a, b| b.confidence_score.partial_cmp(&a.confidence_score).unwrap_or(std::cmp::Ordering::Equal));
    protected.extend(rest);
    protected
}

/// Normalizes a track name for dedup comparison: lowercase, strip
/// `(radio edit)`, `(feat. ...)`, `(featuring ...)` and hyphenated
/// equivalents (spec §4.11).
pub fn normalize_track_name(name: &str) -> String {
    let lower = name.to_lowercase();
    let mut normalized = lower;
    for pattern in [
        "(radio edit)",
        "- radio edit",
        "(feat.",
        "(featuring",
        "- feat.",
        "- featuring",
    ] {
        if let Some(index) = normalized.find(pattern) {
            normalized.truncate(index);
        }
    }
    normalized.trim().to_string()
}

/// Removes duplicates keyed by exact `track_id`, normalized `track_name`,
/// or exact `spotify_uri` — any match removes the later occurrence (spec
/// §4.11). Order is preserved.
pub fn dedup(tracks: Vec<TrackRecommendation>) -> Vec<TrackRecommendation> {
    let mut seen_ids = HashSet::new();
    let mut seen_names = HashSet::new();
    let mut seen_uris = HashSet::new();
    let mut result = Vec::with_capacity(tracks.len());

    for track in tracks {
        let normalized_name = normalize_track_name(&track.track_name);
        let uri_key = track.spotify_uri.clone();

        if seen_ids.contains(&track.track_id) || seen_names.contains(&normalized_name) {
            continue;
        }
        if let Some(uri) = &uri_key {
            if seen_uris.contains(uri) {
                continue;
            }
        }

        seen_ids.insert(track.track_id.clone());
        seen_names.insert(normalized_name);
        if let Some(uri) = uri_key {
            seen_uris.insert(uri);
        }
        result.push(track);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::track::{AnchorType, TrackSource};
    use std::collections::HashMap;

    fn track(id: &str, name: &str, artists: &[&str], confidence: f64, protected: bool) -> TrackRecommendation {
        TrackRecommendation::new(
            id.into(),
            name.into(),
            artists.iter().map(|a| a.to_string()).collect(),
            None,
            confidence,
            HashMap::new(),
            "".into(),
            TrackSource::ArtistDiscovery,
            false,
            protected,
            AnchorType::None,
            None,
        )
    }

    #[test]
    fn repeated_artist_lowers_confidence_but_not_below_floor() {
        let mut tracks = vec![
            track("t1", "A", &["Artist"], 0.9, false),
            track("t2", "B", &["Artist"], 0.9, false),
            track("t3", "C", &["Artist"], 0.15, false),
        ];
        apply_artist_diversity_penalty(&mut tracks);
        assert_eq!(tracks[0].confidence_score, 0.8);
        assert_eq!(tracks[2].confidence_score, 0.1);
    }

    #[test]
    fn protected_tracks_exempt_from_penalty() {
        let mut tracks = vec![
            track("t1", "A", &["Artist"], 0.9, true),
            track("t2", "B", &["Artist"], 0.9, true),
        ];
        apply_artist_diversity_penalty(&mut tracks);
        assert_eq!(tracks[0].confidence_score, 0.9);
    }

    #[test]
    fn protected_sorted_first_regardless_of_confidence() {
        let tracks = vec![
            track("t1", "A", &["X"], 0.9, false),
            track("t2", "B", &["Y"], 0.1, true),
        ];
        let sorted = sort_protected_first_by_confidence(tracks);
        assert_eq!(sorted[0].track_id, "t2");
        assert_eq!(sorted[1].track_id, "t1");
    }

    #[test]
    fn dedup_removes_feat_variant_by_normalized_name() {
        let tracks = vec![
            track("t1", "Song", &["Artist"], 0.9, false),
            track("t2", "Song (feat. Other)", &["Artist"], 0.5, false),
        ];
        let deduped = dedup(tracks);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].track_id, "t1");
    }
}
