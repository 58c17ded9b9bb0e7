//! `TrackRecommendation` and the anchor-candidate shape it is built from
//! (spec §3).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackSource {
    AnchorTrack,
    ArtistDiscovery,
    Reccobeat,
    UserMentioned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorType {
    None,
    User,
    Genre,
    ArtistMentioned,
    ArtistRecommended,
}

/// A scored, provenance-tagged track. Invariants (spec §3) are enforced by
/// [`TrackRecommendation::new`] rather than left to callers to remember.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackRecommendation {
    pub track_id: String,
    pub track_name: String,
    pub artists: Vec<String>,
    pub spotify_uri: Option<String>,
    pub confidence_score: f64,
    pub audio_features: HashMap<String, f64>,
    pub reasoning: String,
    pub source: TrackSource,
    pub user_mentioned: bool,
    pub protected: bool,
    pub anchor_type: AnchorType,
    pub release_year: Option<i32>,
}

impl TrackRecommendation {
    /// Constructs a recommendation, upholding the invariant that
    /// `user_mentioned ⟹ protected ∧ anchor_type = User`. Callers who set
    /// `user_mentioned = true` get the other two fields forced for them
    /// rather than silently producing an inconsistent record.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        track_id: String,
        track_name: String,
        artists: Vec<String>,
        spotify_uri: Option<String>,
        confidence_score: f64,
        audio_features: HashMap<String, f64>,
        reasoning: String,
        source: TrackSource,
        user_mentioned: bool,
        protected: bool,
        anchor_type: AnchorType,
        release_year: Option<i32>,
    ) -> Self {
        let (protected, anchor_type) = if user_mentioned {
            (true, AnchorType::User)
        } else {
            (protected, anchor_type)
        };
        Self {
            track_id,
            track_name,
            artists,
            spotify_uri,
            confidence_score: confidence_score.clamp(0.0, 1.0),
            audio_features,
            reasoning,
            source,
            user_mentioned,
            protected,
            anchor_type,
            release_year,
        }
    }

    /// `true` when this track is immune to diversity penalty, temporal
    /// filtering, quality threshold, and the 98:2 ratio cap (spec §3).
    pub fn is_exempt_from_filtering(&self) -> bool {
        self.protected
    }

    pub fn needs_enrichment(&self) -> bool {
        self.spotify_uri.is_none() || self.artists.first().map(String::as_str) == Some("Unknown Artist")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_mentioned_forces_protected_and_anchor_type() {
        let track = TrackRecommendation::new(
            "t1".into(),
            "Song".into(),
            vec!["Artist".into()],
            None,
            0.9,
            HashMap::new(),
            "mentioned by user".into(),
            TrackSource::UserMentioned,
            true,
            false,
            AnchorType::None,
            None,
        );
        assert!(track.protected);
        assert_eq!(track.anchor_type, AnchorType::User);
    }

    #[test]
    fn confidence_score_is_clamped() {
        let track = TrackRecommendation::new(
            "t1".into(),
            "Song".into(),
            vec!["Artist".into()],
            None,
            1.5,
            HashMap::new(),
            "".into(),
            TrackSource::Reccobeat,
            false,
            false,
            AnchorType::None,
            None,
        );
        assert_eq!(track.confidence_score, 1.0);
    }
}
