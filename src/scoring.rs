//! Confidence scoring, mood-match, cohesion, violation filtering, and the
//! temporal filter (spec §4.10).

use std::collections::HashMap;

use crate::models::mood::{FeatureTarget, MoodAnalysis};
use crate::models::track::{TrackRecommendation, TrackSource};

/// Features compared for mood-match (spec §4.10).
const MOOD_MATCH_FEATURES: &[&str] = &["energy", "valence", "danceability", "acousticness"];

/// Cohesion tolerance table (spec §4.10).
fn cohesion_tolerance(feature: &str) -> Option<f64> {
    Some(match feature {
        "energy" => 0.3,
        "valence" => 0.3,
        "danceability" => 0.3,
        "acousticness" => 0.4,
        "instrumentalness" => 0.25,
        "speechiness" => 0.25,
        "tempo" => 40.0,
        "loudness" => 6.0,
        "liveness" => 0.4,
        "popularity" => 30.0,
        _ => return None,
    })
}

/// Violation-filter tolerance table: wider than the cohesion table (spec
/// §4.10).
fn violation_tolerance(feature: &str) -> Option<f64> {
    Some(match feature {
        "speechiness" => 0.15,
        "instrumentalness" => 0.15,
        "energy" => 0.20,
        "valence" => 0.25,
        "danceability" => 0.20,
        "tempo" => 30.0,
        "loudness" => 5.0,
        "acousticness" => 0.25,
        "liveness" => 0.30,
        "popularity" => 20.0,
        _ => return None,
    })
}

const CRITICAL_FEATURES: &[&str] = &["energy", "acousticness", "instrumentalness", "danceability"];

fn similarity(track_value: f64, target: &FeatureTarget) -> f64 {
    let reference = match target {
        FeatureTarget::Range(a, b) => (a + b) / 2.0,
        FeatureTarget::Single(t) => *t,
    };
    (1.0 - (track_value - reference).abs()).max(0.0)
}

/// Average similarity over whichever of [`MOOD_MATCH_FEATURES`] are
/// present on both sides.
pub fn mood_match(audio_features: &HashMap<String, f64>, target_features: &HashMap<String, FeatureTarget>) -> Option<f64> {
    let mut total = 0.0;
    let mut count = 0;
    for feature in MOOD_MATCH_FEATURES {
        if let (Some(track_value), Some(target)) = (audio_features.get(*feature), target_features.get(*feature)) {
            total += similarity(*track_value, target);
            count += 1;
        }
    }
    if count == 0 {
        None
    } else {
        Some(total / count as f64)
    }
}

/// Confidence score (spec §4.10): prefers an upstream-reported score,
/// else builds one from popularity + mood-match + feature penalties.
pub fn confidence_score(
    upstream_score: Option<f64>,
    audio_features: &HashMap<String, f64>,
    target_features: &HashMap<String, FeatureTarget>,
    popularity: Option<f64>,
    source: TrackSource,
) -> f64 {
    if let Some(score) = upstream_score {
        return score.clamp(0.0, 1.0);
    }

    let mut score = 0.6;
    if let Some(popularity) = popularity {
        score += 0.15 * (popularity / 100.0);
    }

    let mood = mood_match(audio_features, target_features);
    match mood {
        Some(mood) => score += 0.40 * mood,
        None if !target_features.is_empty() => score += 0.10,
        None => {}
    }

    if let Some(target_speechiness) = target_features.get("speechiness").map(FeatureTarget::midpoint) {
        if target_speechiness < 0.2 {
            if let Some(speechiness) = audio_features.get("speechiness") {
                score -= 0.15 * (speechiness - 0.3).max(0.0);
            }
        }
    }
    if let Some(target_liveness) = target_features.get("liveness").map(FeatureTarget::midpoint) {
        if target_liveness < 0.3 {
            if let Some(liveness) = audio_features.get("liveness") {
                score -= 0.10 * (liveness - 0.5).max(0.0);
            }
        }
    }

    if source == TrackSource::Reccobeat {
        score *= 0.85;
    }

    score.clamp(0.0, 1.0)
}

/// Mean per-feature tolerance score over present features (spec §4.10),
/// or 0.5 if none are present.
pub fn track_cohesion(audio_features: &HashMap<String, f64>, target_features: &HashMap<String, FeatureTarget>) -> f64 {
    let mut total = 0.0;
    let mut count = 0;
    for (feature, target) in target_features {
        let Some(tolerance) = cohesion_tolerance(feature) else {
            continue;
        };
        let Some(&actual) = audio_features.get(feature) else {
            continue;
        };
        let midpoint = target.midpoint();
        let per_feature = (1.0 - (actual - midpoint).abs() / tolerance).max(0.0);
        total += per_feature;
        count += 1;
    }
    if count == 0 {
        0.5
    } else {
        total / count as f64
    }
}

/// Counts critical violations (spec §4.10): a feature in
/// [`CRITICAL_FEATURES`] whose distance from the extended target exceeds
/// 2x its violation tolerance.
fn count_critical_violations(audio_features: &HashMap<String, f64>, target_features: &HashMap<String, FeatureTarget>) -> usize {
    let mut critical = 0;
    for feature in CRITICAL_FEATURES {
        let Some(tolerance) = violation_tolerance(feature) else {
            continue;
        };
        let Some(target) = target_features.get(*feature) else {
            continue;
        };
        let Some(&actual) = audio_features.get(*feature) else {
            continue;
        };
        let distance = (actual - target.midpoint()).abs();
        if distance > 2.0 * tolerance {
            critical += 1;
        }
    }
    critical
}

/// `true` if the track should be dropped: `critical_violations >= 2` (3
/// for `artist_discovery`), unless protected (spec §4.10).
pub fn is_violating(track: &TrackRecommendation, target_features: &HashMap<String, FeatureTarget>) -> bool {
    if track.protected {
        return false;
    }
    let threshold = if track.source == TrackSource::ArtistDiscovery { 3 } else { 2 };
    count_critical_violations(&track.audio_features, target_features) >= threshold
}

/// `true` if the track passes the temporal filter (spec §4.10): accepted
/// when not temporal, when the release year parses within tolerance, or
/// when the release date is missing/unparseable (lenient), or when the
/// track is a user-mentioned explicit track (bypasses entirely).
pub fn passes_temporal_filter(
    track: &TrackRecommendation,
    mood_analysis: Option<&MoodAnalysis>,
    release_year: Option<i32>,
) -> bool {
    if track.user_mentioned {
        return true;
    }
    let Some(mood_analysis) = mood_analysis else {
        return true;
    };
    let Some(temporal) = &mood_analysis.temporal_context else {
        return true;
    };
    if !temporal.is_temporal {
        return true;
    }
    let Some((min_year, max_year)) = temporal.year_range else {
        return true;
    };
    let Some(release_year) = release_year else {
        return true;
    };
    let tolerance = temporal.tolerance_years();
    release_year >= min_year - tolerance && release_year <= max_year + tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn targets(pairs: &[(&str, FeatureTarget)]) -> HashMap<String, FeatureTarget> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn mood_match_averages_present_features() {
        let audio = features(&[("energy", 0.8), ("valence", 0.5)]);
        let target = targets(&[("energy", FeatureTarget::Single(0.8)), ("valence", FeatureTarget::Single(0.5))]);
        assert_eq!(mood_match(&audio, &target), Some(1.0));
    }

    #[test]
    fn reccobeat_source_applies_bias_correction() {
        let audio = features(&[]);
        let target = targets(&[]);
        let score = confidence_score(None, &audio, &target, None, TrackSource::Reccobeat);
        assert!((score - 0.6 * 0.85).abs() < 1e-9);
    }

    #[test]
    fn upstream_score_is_used_directly() {
        let score = confidence_score(Some(0.42), &HashMap::new(), &HashMap::new(), None, TrackSource::AnchorTrack);
        assert_eq!(score, 0.42);
    }

    #[test]
    fn protected_track_never_violates() {
        let mut audio_features = HashMap::new();
        audio_features.insert("energy".to_string(), 0.0);
        audio_features.insert("acousticness".to_string(), 1.0);
        let track = TrackRecommendation::new(
            "t1".into(),
            "Song".into(),
            vec!["Artist".into()],
            None,
            0.9,
            audio_features,
            "".into(),
            TrackSource::UserMentioned,
            true,
            true,
            crate::models::track::AnchorType::User,
            None,
        );
        let target = targets(&[
            ("energy", FeatureTarget::Single(0.9)),
            ("acousticness", FeatureTarget::Single(0.1)),
        ]);
        assert!(!is_violating(&track, &target));
    }

    #[test]
    fn temporal_filter_accepts_missing_release_year() {
        assert!(passes_temporal_filter(
            &sample_track(),
            None,
            None,
        ));
    }

    fn mood_with_temporal(year_range: (i32, i32), decade: Option<&str>) -> MoodAnalysis {
        use crate::models::mood::{ColorScheme, EnergyLevel, PrimaryEmotion, TemporalContext};
        MoodAnalysis {
            mood_interpretation: "".into(),
            primary_emotion: PrimaryEmotion::Neutral,
            energy_level: EnergyLevel::Medium,
            target_features: HashMap::new(),
            feature_weights: HashMap::new(),
            search_keywords: Vec::new(),
            artist_recommendations: Vec::new(),
            genre_keywords: Vec::new(),
            preferred_regions: Vec::new(),
            excluded_regions: Vec::new(),
            excluded_themes: Vec::new(),
            temporal_context: Some(TemporalContext {
                is_temporal: true,
                year_range: Some(year_range),
                decade: decade.map(str::to_string),
                era: None,
            }),
            color_scheme: ColorScheme {
                primary: "".into(),
                secondary: "".into(),
                tertiary: "".into(),
            },
            reasoning: "".into(),
        }
    }

    #[test]
    fn temporal_filter_rejects_year_outside_strict_decade_window() {
        let mood = mood_with_temporal((1990, 1999), Some("90s"));
        assert!(!passes_temporal_filter(&sample_track(), Some(&mood), Some(1985)));
        assert!(passes_temporal_filter(&sample_track(), Some(&mood), Some(1995)));
    }

    #[test]
    fn temporal_filter_boundary_at_min_year_minus_tolerance() {
        let strict = mood_with_temporal((1990, 1999), Some("90s"));
        assert!(!passes_temporal_filter(&sample_track(), Some(&strict), Some(1985)));

        let loose = mood_with_temporal((1990, 1999), None);
        assert!(passes_temporal_filter(&sample_track(), Some(&loose), Some(1985)));
        assert!(!passes_temporal_filter(&sample_track(), Some(&loose), Some(1984)));
    }

    fn sample_track() -> TrackRecommendation {
        TrackRecommendation::new(
            "t1".into(),
            "Song".into(),
            vec!["Artist".into()],
            None,
            0.5,
            HashMap::new(),
            "".into(),
            TrackSource::ArtistDiscovery,
            false,
            false,
            crate::models::track::AnchorType::None,
            None,
        )
    }
}
