//! Mood Analysis Engine (spec §4.6): an LLM primary path with strict JSON
//! extraction, falling back to a rule-based profile matcher when the LLM
//! is unavailable or its output doesn't parse.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::llm::MoodLlm;
use crate::models::mood::{ColorScheme, EnergyLevel, FeatureTarget, MoodAnalysis, PrimaryEmotion, TemporalContext};

/// System prompt sent on the primary (LLM) path: describes the 12 audio
/// features, their ranges, and the required JSON shape (spec §4.6). Kept
/// as a single constant since its content never varies by request.
pub const MOOD_SYSTEM_PROMPT: &str = concat!(
    "You analyze a listener's mood prompt and produce a JSON object describing ",
    "target audio features for a playlist. Audio features: acousticness, ",
    "danceability, energy, instrumentalness, key, liveness, loudness, mode, ",
    "speechiness, tempo, valence, popularity (key in [-1,11], loudness in ",
    "[-60,2], tempo in [0,250], popularity in [0,100], all others in [0,1]). ",
    "Respond with a single JSON object containing mood_interpretation, ",
    "primary_emotion, energy_level, target_features, feature_weights, ",
    "search_keywords, artist_recommendations, genre_keywords, ",
    "preferred_regions, excluded_regions, excluded_themes, temporal_context, ",
    "color_scheme, and reasoning.",
);

/// Scans `text` for the first balanced `{...}` substring. A bracket
/// counter rather than a regex, since regex cannot reliably balance
/// nested braces (spec §4.6).
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Runs the primary LLM path, falling back to the rule-based engine on
/// any failure: network error, unparseable output, or a validation
/// failure of the parsed `MoodAnalysis` (spec §4.6, §7).
pub async fn analyze_mood(llm: &dyn MoodLlm, prompt: &str) -> Result<MoodAnalysis> {
    match try_llm_analysis(llm, prompt).await {
        Ok(analysis) => Ok(analysis),
        Err(err) => {
            warn!(error = %err, "mood LLM path failed, falling back to rule-based engine");
            Ok(rule_based_fallback(prompt))
        }
    }
}

async fn try_llm_analysis(llm: &dyn MoodLlm, prompt: &str) -> Result<MoodAnalysis> {
    let completion = llm.complete(MOOD_SYSTEM_PROMPT, prompt).await?;
    let json = extract_json_object(&completion)
        .ok_or_else(|| EngineError::LlmFailure("no balanced JSON object in LLM response".to_string()))?;
    let analysis: MoodAnalysis =
        serde_json::from_str(json).map_err(|err| EngineError::LlmFailure(format!("unparseable mood JSON: {err}")))?;
    analysis
        .validate()
        .map_err(|err| EngineError::LlmFailure(format!("mood JSON failed validation: {err}")))?;
    info!("mood analysis produced by LLM path");
    Ok(analysis)
}

struct MoodProfile {
    keywords: &'static [&'static str],
    features: &'static [(&'static str, FeatureTarget)],
    weights: &'static [(&'static str, f64)],
}

/// Fixed table of named mood profiles (spec §4.6(a)): a profile matches
/// if any of its keywords appears in the lowercased prompt.
const MOOD_PROFILES: &[(&str, MoodProfile)] = &[
    (
        "indie",
        MoodProfile {
            keywords: &["indie", "alternative", "lo-fi", "lofi", "dreamy"],
            features: &[
                ("energy", FeatureTarget::Range(0.3, 0.6)),
                ("acousticness", FeatureTarget::Range(0.4, 0.8)),
                ("valence", FeatureTarget::Range(0.3, 0.6)),
            ],
            weights: &[("energy", 0.5), ("acousticness", 0.6), ("valence", 0.4)],
        },
    ),
    (
        "party",
        MoodProfile {
            keywords: &["party", "hype", "turn up", "club", "rave"],
            features: &[
                ("energy", FeatureTarget::Range(0.75, 1.0)),
                ("danceability", FeatureTarget::Range(0.7, 1.0)),
                ("valence", FeatureTarget::Range(0.6, 1.0)),
            ],
            weights: &[("energy", 0.7), ("danceability", 0.7), ("valence", 0.5)],
        },
    ),
    (
        "chill",
        MoodProfile {
            keywords: &["chill", "relax", "mellow", "calm", "laid back", "laid-back"],
            features: &[
                ("energy", FeatureTarget::Range(0.2, 0.5)),
                ("valence", FeatureTarget::Range(0.4, 0.7)),
                ("acousticness", FeatureTarget::Range(0.3, 0.7)),
            ],
            weights: &[("energy", 0.6), ("valence", 0.4), ("acousticness", 0.4)],
        },
    ),
    (
        "focus",
        MoodProfile {
            keywords: &["focus", "study", "concentration", "deep work", "instrumental"],
            features: &[
                ("instrumentalness", FeatureTarget::Range(0.5, 1.0)),
                ("energy", FeatureTarget::Range(0.2, 0.5)),
                ("speechiness", FeatureTarget::Range(0.0, 0.2)),
            ],
            weights: &[("instrumentalness", 0.7), ("energy", 0.4), ("speechiness", 0.3)],
        },
    ),
    (
        "emotional",
        MoodProfile {
            keywords: &["sad", "heartbreak", "emotional", "crying", "breakup", "melancholic", "melancholy"],
            features: &[
                ("valence", FeatureTarget::Range(0.0, 0.35)),
                ("energy", FeatureTarget::Range(0.1, 0.4)),
                ("acousticness", FeatureTarget::Range(0.4, 0.9)),
            ],
            weights: &[("valence", 0.7), ("energy", 0.4), ("acousticness", 0.5)],
        },
    ),
];

/// Keyword-to-feature overrides applied after profile matching (spec
/// §4.6(b)): these force a specific range regardless of what the profile
/// matcher contributed, since they read as a stronger, more specific
/// signal ("energetic/workout/hype" vs. the broader "party" profile).
const KEYWORD_FEATURE_OVERLAY: &[(&[&str], &str, FeatureTarget)] = &[
    (&["energetic", "workout", "hype", "pump up", "gym"], "energy", FeatureTarget::Range(0.7, 1.0)),
    (&["sad", "dark", "moody"], "valence", FeatureTarget::Range(0.0, 0.4)),
];

/// Region inference keywords (spec §4.6(c)): a small table of language
/// cues mapped to a preferred region code.
const REGION_CUES: &[(&[&str], &str)] = &[
    (&["k-pop", "kpop", "korean"], "KR"),
    (&["j-pop", "jpop", "japanese", "city pop"], "JP"),
    (&["reggaeton", "latin", "latino", "spanish"], "LATAM"),
    (&["afrobeats", "afro", "nigerian"], "NG"),
];

fn matching_profiles(prompt_lower: &str) -> Vec<&'static MoodProfile> {
    MOOD_PROFILES
        .iter()
        .filter(|(_, profile)| profile.keywords.iter().any(|keyword| prompt_lower.contains(keyword)))
        .map(|(_, profile)| profile)
        .collect()
}

/// Rule-based fallback (spec §4.6(b)-(d)), used when the LLM is
/// unavailable or unparseable. Never invoked for a feature the LLM path
/// already set (the two paths never run together — this function builds
/// a complete `MoodAnalysis` from scratch on its own).
pub fn rule_based_fallback(prompt: &str) -> MoodAnalysis {
    let prompt_lower = prompt.to_lowercase();

    let mut target_features: HashMap<String, FeatureTarget> = HashMap::new();
    let mut feature_weights: HashMap<String, f64> = HashMap::new();

    for profile in matching_profiles(&prompt_lower) {
        for (feature, target) in profile.features {
            target_features.insert(feature.to_string(), *target);
        }
        for (feature, weight) in profile.weights {
            feature_weights.insert(feature.to_string(), *weight);
        }
    }

    for (keywords, feature, target) in KEYWORD_FEATURE_OVERLAY {
        if keywords.iter().any(|keyword| prompt_lower.contains(keyword)) {
            target_features.insert(feature.to_string(), *target);
        }
    }

    let mut preferred_regions = Vec::new();
    for (keywords, region) in REGION_CUES {
        if keywords.iter().any(|keyword| prompt_lower.contains(keyword)) && !preferred_regions.contains(&region.to_string()) {
            preferred_regions.push(region.to_string());
        }
    }

    let excluded_themes = infer_excluded_themes(&prompt_lower);

    let energy_level = match target_features.get("energy").map(FeatureTarget::midpoint) {
        Some(value) if value >= 0.7 => EnergyLevel::High,
        Some(value) if value <= 0.4 => EnergyLevel::Low,
        _ => EnergyLevel::Medium,
    };
    let primary_emotion = match target_features.get("valence").map(FeatureTarget::midpoint) {
        Some(value) if value >= 0.6 => PrimaryEmotion::Positive,
        Some(value) if value <= 0.4 => PrimaryEmotion::Negative,
        _ => PrimaryEmotion::Neutral,
    };

    MoodAnalysis {
        mood_interpretation: format!("rule-based interpretation of: {prompt}"),
        primary_emotion,
        energy_level,
        target_features,
        feature_weights,
        search_keywords: prompt_lower.split_whitespace().map(str::to_string).collect(),
        artist_recommendations: Vec::new(),
        genre_keywords: Vec::new(),
        preferred_regions,
        excluded_regions: Vec::new(),
        excluded_themes,
        temporal_context: infer_temporal_context(&prompt_lower),
        color_scheme: ColorScheme {
            primary: "#4A4A4A".to_string(),
            secondary: "#8A8A8A".to_string(),
            tertiary: "#C4C4C4".to_string(),
        },
        reasoning: "generated by the rule-based fallback; the mood LLM was unavailable".to_string(),
    }
}

/// Theme exclusions with context rules (spec §4.6(d)): a conservative
/// default exclusion set, relaxed or expanded by explicit prompt context.
fn infer_excluded_themes(prompt_lower: &str) -> Vec<String> {
    let mut excluded: Vec<String> = vec!["holiday".to_string()];
    if prompt_lower.contains("christmas") || prompt_lower.contains("holiday") {
        excluded.retain(|theme| theme != "holiday");
    }
    if prompt_lower.contains("romantic") || prompt_lower.contains("romance") {
        for theme in ["religious", "kids"] {
            if !excluded.iter().any(|existing| existing == theme) {
                excluded.push(theme.to_string());
            }
        }
    }
    excluded
}

fn infer_temporal_context(prompt_lower: &str) -> Option<TemporalContext> {
    const DECADES: &[(&str, (i32, i32))] = &[
        ("90s", (1990, 1999)),
        ("1990s", (1990, 1999)),
        ("80s", (1980, 1989)),
        ("1980s", (1980, 1989)),
        ("70s", (1970, 1979)),
        ("2000s", (2000, 2009)),
        ("2010s", (2010, 2019)),
    ];
    for (label, range) in DECADES {
        if prompt_lower.contains(label) {
            return Some(TemporalContext {
                is_temporal: true,
                year_range: Some(*range),
                decade: Some(label.to_string()),
                era: None,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{NullMoodLlm, StubMoodLlm};

    #[test]
    fn extract_json_object_finds_first_balanced_braces() {
        let text = "here is the answer: {\"a\": {\"b\": 1}} trailing junk";
        let extracted = extract_json_object(text).unwrap();
        assert_eq!(extracted, "{\"a\": {\"b\": 1}}");
    }

    #[test]
    fn extract_json_object_returns_none_without_braces() {
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_rule_based() {
        let analysis = analyze_mood(&NullMoodLlm, "90s hip hop workout").await.unwrap();
        assert_eq!(analysis.energy_level, EnergyLevel::High);
        assert!(analysis.temporal_context.as_ref().unwrap().is_temporal);
    }

    #[tokio::test]
    async fn unparseable_llm_output_falls_back() {
        let llm = StubMoodLlm::new("not json at all");
        let analysis = analyze_mood(&llm, "chill evening").await.unwrap();
        assert!(analysis.reasoning.contains("rule-based"));
    }

    #[test]
    fn profile_matcher_sets_energy_range_for_party() {
        let analysis = rule_based_fallback("I want a party playlist");
        let energy = analysis.target_features.get("energy").unwrap();
        assert_eq!(*energy, FeatureTarget::Range(0.75, 1.0));
    }

    #[test]
    fn keyword_overlay_forces_sad_valence_range() {
        let analysis = rule_based_fallback("feeling sad and dark tonight");
        let valence = analysis.target_features.get("valence").unwrap();
        assert_eq!(*valence, FeatureTarget::Range(0.0, 0.4));
    }

    #[test]
    fn christmas_prompt_does_not_exclude_holiday() {
        let analysis = rule_based_fallback("christmas party hits");
        assert!(!analysis.excluded_themes.iter().any(|t| t == "holiday"));
    }

    #[test]
    fn romantic_prompt_excludes_religious_and_kids() {
        let analysis = rule_based_fallback("romantic dinner playlist");
        assert!(analysis.excluded_themes.iter().any(|t| t == "religious"));
        assert!(analysis.excluded_themes.iter().any(|t| t == "kids"));
    }

    #[test]
    fn decade_prompt_infers_strict_temporal_context() {
        let analysis = rule_based_fallback("90s hip hop workout");
        let temporal = analysis.temporal_context.unwrap();
        assert_eq!(temporal.year_range, Some((1990, 1999)));
        assert_eq!(temporal.tolerance_years(), 0);
    }

    #[test]
    fn region_cue_sets_preferred_region() {
        let analysis = rule_based_fallback("upbeat k-pop playlist");
        assert!(analysis.preferred_regions.contains(&"KR".to_string()));
    }
}
