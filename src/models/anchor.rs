//! `AnchorCandidate` (spec §3): the track-plus-scoring composite the
//! Anchor Selector (§4.7) produces, before it is folded into a
//! [`TrackRecommendation`](crate::models::track::TrackRecommendation).

use crate::models::track::{AnchorType, TrackSource};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorCandidate {
    pub track_id: String,
    pub track_name: String,
    pub artists: Vec<String>,
    pub spotify_uri: Option<String>,
    pub score: f64,
    pub confidence: f64,
    pub source: TrackSource,
    pub anchor_type: AnchorType,
    pub protected: bool,
}

impl AnchorCandidate {
    /// A track the user named directly: maximal score/confidence and
    /// protected, per spec §3's explicit carve-out for user anchors.
    pub fn user_anchor(track_id: String, track_name: String, artists: Vec<String>, spotify_uri: Option<String>) -> Self {
        Self {
            track_id,
            track_name,
            artists,
            spotify_uri,
            score: 1.0,
            confidence: 1.0,
            source: TrackSource::UserMentioned,
            anchor_type: AnchorType::User,
            protected: true,
        }
    }
}
