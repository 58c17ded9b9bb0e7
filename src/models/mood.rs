//! Mood analysis JSON shape (spec §6) produced by the Mood Analysis Engine
//! and consumed by every downstream strategy.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A target value for an audio feature: either a single point or an
/// inclusive range. `target_features` in the JSON maps a feature name to
/// either shape; we deserialize into this closed sum type instead of
/// leaving it as an untyped `serde_json::Value`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureTarget {
    Single(f64),
    Range(f64, f64),
}

impl FeatureTarget {
    /// Midpoint used by every scoring routine that needs a single number
    /// (cohesion, violation filtering) even when the target is a range.
    pub fn midpoint(&self) -> f64 {
        match self {
            FeatureTarget::Single(v) => *v,
            FeatureTarget::Range(a, b) => (a + b) / 2.0,
        }
    }

    /// `true` for a range whose bounds satisfy `min <= max` (model
    /// invariant from spec §3); always `true` for a single point.
    pub fn is_valid(&self) -> bool {
        match self {
            FeatureTarget::Single(_) => true,
            FeatureTarget::Range(a, b) => a <= b,
        }
    }
}

impl<'de> Deserialize<'de> for FeatureTarget {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Pair(f64, f64),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Number(v) => Ok(FeatureTarget::Single(v)),
            Raw::Pair(a, b) => Ok(FeatureTarget::Range(a, b)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimaryEmotion {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TemporalContext {
    pub is_temporal: bool,
    pub year_range: Option<(i32, i32)>,
    pub decade: Option<String>,
    pub era: Option<String>,
}

impl TemporalContext {
    /// Tolerance in years applied around `year_range` (spec §4.10's
    /// temporal filter): 0 when the user named an explicit decade/era,
    /// 5 otherwise.
    pub fn tolerance_years(&self) -> i32 {
        if self.decade.is_some() || self.era.is_some() {
            0
        } else {
            5
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorScheme {
    pub primary: String,
    pub secondary: String,
    pub tertiary: String,
}

/// The full structured mood analysis (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoodAnalysis {
    pub mood_interpretation: String,
    pub primary_emotion: PrimaryEmotion,
    pub energy_level: EnergyLevel,
    pub target_features: HashMap<String, FeatureTarget>,
    pub feature_weights: HashMap<String, f64>,
    pub search_keywords: Vec<String>,
    pub artist_recommendations: Vec<String>,
    pub genre_keywords: Vec<String>,
    pub preferred_regions: Vec<String>,
    pub excluded_regions: Vec<String>,
    pub excluded_themes: Vec<String>,
    #[serde(default)]
    pub temporal_context: Option<TemporalContext>,
    pub color_scheme: ColorScheme,
    pub reasoning: String,
}

impl MoodAnalysis {
    /// Validates the model invariants spec §3 lists for `MoodAnalysis`:
    /// range pairs satisfy `min <= max`, weights are in `[0,1]`, and
    /// preferred/excluded regions are disjoint.
    pub fn validate(&self) -> Result<(), String> {
        for (feature, target) in &self.target_features {
            if !target.is_valid() {
                return Err(format!("target_features.{feature} has min > max"));
            }
        }
        for (feature, weight) in &self.feature_weights {
            if !(0.0..=1.0).contains(weight) {
                return Err(format!("feature_weights.{feature} out of [0,1]: {weight}"));
            }
        }
        let preferred: std::collections::HashSet<_> = self.preferred_regions.iter().collect();
        let excluded: std::collections::HashSet<_> = self.excluded_regions.iter().collect();
        if preferred.intersection(&excluded).next().is_some() {
            return Err("preferred_regions and excluded_regions overlap".to_string());
        }
        Ok(())
    }
}

/// The full, documented feature name set from spec §6, used to validate
/// that `target_features`/`feature_weights` keys are recognized.
pub const FEATURE_NAMES: &[&str] = &[
    "acousticness",
    "danceability",
    "energy",
    "instrumentalness",
    "key",
    "liveness",
    "loudness",
    "mode",
    "speechiness",
    "tempo",
    "valence",
    "popularity",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_target_deserializes_single_and_range() {
        let single: FeatureTarget = serde_json::from_str("0.7").unwrap();
        assert_eq!(single, FeatureTarget::Single(0.7));

        let range: FeatureTarget = serde_json::from_str("[0.2, 0.6]").unwrap();
        assert_eq!(range, FeatureTarget::Range(0.2, 0.6));
        assert_eq!(range.midpoint(), 0.4);
    }

    #[test]
    fn invalid_range_fails_validation() {
        let mut analysis = sample_analysis();
        analysis
            .target_features
            .insert("energy".to_string(), FeatureTarget::Range(0.8, 0.2));
        assert!(analysis.validate().is_err());
    }

    #[test]
    fn overlapping_regions_fail_validation() {
        let mut analysis = sample_analysis();
        analysis.preferred_regions = vec!["kr".to_string()];
        analysis.excluded_regions = vec!["kr".to_string()];
        assert!(analysis.validate().is_err());
    }

    fn sample_analysis() -> MoodAnalysis {
        MoodAnalysis {
            mood_interpretation: "chill".to_string(),
            primary_emotion: PrimaryEmotion::Positive,
            energy_level: EnergyLevel::Low,
            target_features: HashMap::new(),
            feature_weights: HashMap::new(),
            search_keywords: vec![],
            artist_recommendations: vec![],
            genre_keywords: vec![],
            preferred_regions: vec![],
            excluded_regions: vec![],
            excluded_themes: vec![],
            temporal_context: None,
            color_scheme: ColorScheme {
                primary: "#000000".to_string(),
                secondary: "#111111".to_string(),
                tertiary: "#222222".to_string(),
            },
            reasoning: "test".to_string(),
        }
    }
}
