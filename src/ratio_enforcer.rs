//! Ratio Enforcer (spec §4.12): caps non-user anchors, then splits the
//! remaining slots 98:2 between the artist-discovery and seed-based
//! pools, concatenating group-by-group without a final re-sort.

use crate::models::track::TrackRecommendation;

/// Non-user anchors are capped independently of the anchor-count the
/// Anchor Selector chose (spec §4.7 picks the anchor *candidates*; this
/// caps how many of them survive into the final list).
const NON_USER_ANCHOR_CAP: usize = 5;

fn sort_by_confidence_desc(tracks: &mut [TrackRecommendation]) {
    tracks.sort_by(|a, b| b.confidence_score.partial_cmp(&a.confidence_score).unwrap_or(std::cmp::Ordering::Equal));
}

/// Composes the final recommendation list (spec §4.12): user-mentioned
/// anchors are exempt from both the anchor cap and the 98:2 split and
/// always survive in full; everything else is sorted within its own
/// group and concatenated anchor | artist | seed, with no re-sort of the
/// combined list afterward.
pub fn enforce_ratio(
    anchor_tracks: Vec<TrackRecommendation>,
    artist_discovery_tracks: Vec<TrackRecommendation>,
    seed_based_tracks: Vec<TrackRecommendation>,
    target_count: usize,
    artist_discovery_ratio: f64,
) -> Vec<TrackRecommendation> {
    let (mut user_anchors, mut non_user_anchors): (Vec<_>, Vec<_>) = anchor_tracks.into_iter().partition(|t| t.user_mentioned);
    sort_by_confidence_desc(&mut user_anchors);
    sort_by_confidence_desc(&mut non_user_anchors);
    non_user_anchors.truncate(NON_USER_ANCHOR_CAP);

    let remaining_after_anchors = target_count
        .saturating_sub(user_anchors.len())
        .saturating_sub(non_user_anchors.len());

    let artist_slots = if remaining_after_anchors == 0 {
        0
    } else {
        ((remaining_after_anchors as f64 * artist_discovery_ratio).round() as usize).min(remaining_after_anchors.saturating_sub(1))
    };
    let seed_slots = remaining_after_anchors.saturating_sub(artist_slots);

    let mut artist = artist_discovery_tracks;
    sort_by_confidence_desc(&mut artist);
    artist.truncate(artist_slots);

    let mut seed = seed_based_tracks;
    sort_by_confidence_desc(&mut seed);
    seed.truncate(seed_slots);

    let mut result = user_anchors;
    result.extend(non_user_anchors);
    result.extend(artist);
    result.extend(seed);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::track::{AnchorType, TrackSource};
    use std::collections::HashMap;

    fn track(id: &str, confidence: f64, user_mentioned: bool) -> TrackRecommendation {
        TrackRecommendation::new(
            id.into(),
            id.into(),
            vec!["Artist".into()],
            None,
            confidence,
            HashMap::new(),
            "".into(),
            if user_mentioned { TrackSource::UserMentioned } else { TrackSource::ArtistDiscovery },
            user_mentioned,
            false,
            if user_mentioned { AnchorType::User } else { AnchorType::None },
            None,
        )
    }

    #[test]
    fn user_anchors_survive_uncapped_and_unsplit() {
        let user_anchors: Vec<_> = (0..10).map(|i| track(&format!("u{i}"), 0.5, true)).collect();
        let result = enforce_ratio(user_anchors, Vec::new(), Vec::new(), 5, 0.98);
        assert_eq!(result.len(), 10);
        assert!(result.iter().all(|t| t.user_mentioned));
    }

    #[test]
    fn non_user_anchors_are_capped_at_five() {
        let anchors: Vec<_> = (0..20).map(|i| track(&format!("a{i}"), 0.9 - i as f64 * 0.01, false)).collect();
        let result = enforce_ratio(anchors, Vec::new(), Vec::new(), 50, 0.98);
        assert_eq!(result.len(), 5);
    }

    #[test]
    fn remaining_slots_split_roughly_ninety_eight_two() {
        let artist: Vec<_> = (0..100).map(|i| track(&format!("ar{i}"), 0.5, false)).collect();
        let seed: Vec<_> = (0..100).map(|i| track(&format!("se{i}"), 0.5, false)).collect();
        let result = enforce_ratio(Vec::new(), artist, seed, 100, 0.98);
        let seed_count = result.iter().filter(|t| t.track_id.starts_with("se")).count();
        let artist_count = result.iter().filter(|t| t.track_id.starts_with("ar")).count();
        assert_eq!(seed_count, 2);
        assert_eq!(artist_count, 98);
    }

    #[test]
    fn seed_pool_always_gets_at_least_one_slot_when_any_remain() {
        let artist: Vec<_> = (0..5).map(|i| track(&format!("ar{i}"), 0.5, false)).collect();
        let seed: Vec<_> = (0..5).map(|i| track(&format!("se{i}"), 0.5, false)).collect();
        let result = enforce_ratio(Vec::new(), artist, seed, 3, 0.98);
        assert!(result.iter().any(|t| t.track_id.starts_with("se")));
    }
}
