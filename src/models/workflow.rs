//! `WorkflowState` (spec §3): the orchestrator's exclusively-owned,
//! per-request state, threaded by reference through every stage.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::mood::MoodAnalysis;
use crate::models::track::TrackRecommendation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    AnalyzingMood,
    GatheringSeeds,
    GeneratingRecommendations,
    Finalizing,
    Completed,
    Failed,
    Error,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Error
        )
    }
}

/// The target shape `determine_playlist_target` (spec §4.13) produces:
/// total track count plus the genre-diversity toggle the Anchor Selector
/// (§4.7) asks the LLM for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlaylistTarget {
    pub target_count: usize,
    pub genre_diversity: bool,
}

impl Default for PlaylistTarget {
    fn default() -> Self {
        Self {
            target_count: 30,
            genre_diversity: true,
        }
    }
}

/// The original's open-ended `metadata` dict (spec §3), re-architected as a
/// struct with named optional fields per Design Notes — every key the spec
/// enumerates gets its own typed slot instead of an untyped bag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    pub spotify_access_token: Option<String>,
    pub target_features: HashMap<String, crate::models::mood::FeatureTarget>,
    pub feature_weights: HashMap<String, f64>,
    pub anchor_tracks: Vec<crate::models::anchor::AnchorCandidate>,
    pub anchor_track_ids: Vec<String>,
    pub discovered_artists: Vec<String>,
    pub mood_matched_artists: Vec<String>,
    pub user_mentioned_track_ids: Vec<String>,
    pub user_mentioned_tracks_full: Vec<TrackRecommendation>,
    pub intent_analysis: Option<MoodAnalysis>,
    pub playlist_target: Option<PlaylistTarget>,
    /// Per-stage failure notes written by the orchestrator's failure
    /// policy (spec §4.13): `stage name -> message`, never cleared.
    pub stage_errors: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub session_id: String,
    pub user_id: String,
    pub mood_prompt: String,
    pub status: WorkflowStatus,
    pub current_step: String,
    pub mood_analysis: Option<MoodAnalysis>,
    pub seed_tracks: Vec<String>,
    pub negative_seeds: Vec<String>,
    pub recommendations: Vec<TrackRecommendation>,
    pub metadata: WorkflowMetadata,
}

impl WorkflowState {
    pub fn new(session_id: String, user_id: String, mood_prompt: String) -> Self {
        Self {
            session_id,
            user_id,
            mood_prompt,
            status: WorkflowStatus::Pending,
            current_step: "pending".to_string(),
            mood_analysis: None,
            seed_tracks: Vec::new(),
            negative_seeds: Vec::new(),
            recommendations: Vec::new(),
            metadata: WorkflowMetadata::default(),
        }
    }

    /// Transitions to `status`, updating `current_step` to match. The
    /// orchestrator calls `notify_progress` immediately after this (spec
    /// §4.13); that call is fire-and-forget and lives on the orchestrator,
    /// not here, so this type stays free of channel plumbing.
    pub fn transition(&mut self, status: WorkflowStatus, step: impl Into<String>) {
        self.status = status;
        self.current_step = step.into();
    }

    pub fn record_stage_error(&mut self, stage: &str, message: impl Into<String>) {
        self.metadata.stage_errors.insert(stage.to_string(), message.into());
    }

    /// The fatal condition named in spec §4.13's failure policy: nothing
    /// to build recommendations from at all.
    pub fn is_fatal(&self) -> bool {
        self.seed_tracks.is_empty()
            && self.metadata.discovered_artists.is_empty()
            && self.metadata.anchor_tracks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_starts_pending() {
        let state = WorkflowState::new("s1".into(), "u1".into(), "chill evening".into());
        assert_eq!(state.status, WorkflowStatus::Pending);
        assert!(!state.status.is_terminal());
    }

    #[test]
    fn transition_updates_step() {
        let mut state = WorkflowState::new("s1".into(), "u1".into(), "chill evening".into());
        state.transition(WorkflowStatus::AnalyzingMood, "analyzing_mood");
        assert_eq!(state.status, WorkflowStatus::AnalyzingMood);
        assert_eq!(state.current_step, "analyzing_mood");
    }

    #[test]
    fn fatal_when_nothing_to_build_from() {
        let state = WorkflowState::new("s1".into(), "u1".into(), "chill evening".into());
        assert!(state.is_fatal());
    }
}
