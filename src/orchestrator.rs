//! Orchestrator (spec §4.13): drives a single recommendation workflow
//! through its state machine, fanning out to the candidate strategies
//! each iteration and composing the final list via the Ratio Enforcer.
//! Grounded on the teacher's `CatalogSyncOrchestrator`: `Arc`-shared
//! collaborators, a `broadcast` channel for fire-and-forget progress, and
//! per-run state in `Arc<RwLock<HashMap<Uuid, _>>>`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::anchor_selector::AnchorSelector;
use crate::cache::CacheManager;
use crate::config::OrchestratorConfig;
use crate::diversity;
use crate::error::{EngineError, Result};
use crate::fuzzy;
use crate::http::catalog::{CatalogClient, TimeRange};
use crate::http::features::FeaturesClient;
use crate::id_registry::IdRegistry;
use crate::llm::MoodLlm;
use crate::models::anchor::AnchorCandidate;
use crate::models::track::{AnchorType, TrackRecommendation};
use crate::models::workflow::{PlaylistTarget, WorkflowState, WorkflowStatus};
use crate::mood_engine;
use crate::ratio_enforcer;
use crate::scoring;
use crate::seed_gatherer::SeedGatherer;
use crate::seed_guardrails::SeedGuardrails;
use crate::strategies::{CandidateStrategy, GenerationContext};
use crate::token_manager::{TokenExchanger, TokenManager};

pub struct Orchestrator<E: TokenExchanger + 'static> {
    catalog: Arc<CatalogClient>,
    features: Arc<FeaturesClient>,
    cache: Arc<CacheManager>,
    guardrails: Arc<SeedGuardrails>,
    id_registry: Arc<IdRegistry>,
    anchor_selector: Arc<AnchorSelector>,
    seed_gatherer: Arc<SeedGatherer>,
    token_manager: Arc<TokenManager<E>>,
    llm: Arc<dyn MoodLlm>,
    primary_strategies: Vec<Arc<dyn CandidateStrategy>>,
    fallback_strategy: Arc<dyn CandidateStrategy>,
    config: OrchestratorConfig,
    states: RwLock<HashMap<Uuid, WorkflowState>>,
    progress_tx: broadcast::Sender<String>,
}

#[allow(clippy::too_many_arguments)]
impl<E: TokenExchanger + 'static> Orchestrator<E> {
    pub fn new(
        catalog: Arc<CatalogClient>,
        features: Arc<FeaturesClient>,
        cache: Arc<CacheManager>,
        guardrails: Arc<SeedGuardrails>,
        id_registry: Arc<IdRegistry>,
        anchor_selector: Arc<AnchorSelector>,
        seed_gatherer: Arc<SeedGatherer>,
        token_manager: Arc<TokenManager<E>>,
        llm: Arc<dyn MoodLlm>,
        primary_strategies: Vec<Arc<dyn CandidateStrategy>>,
        fallback_strategy: Arc<dyn CandidateStrategy>,
        config: OrchestratorConfig,
    ) -> Self {
        let (progress_tx, _) = broadcast::channel(256);
        Self {
            catalog,
            features,
            cache,
            guardrails,
            id_registry,
            anchor_selector,
            seed_gatherer,
            token_manager,
            llm,
            primary_strategies,
            fallback_strategy,
            config,
            states: RwLock::new(HashMap::new()),
            progress_tx,
        }
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<String> {
        self.progress_tx.subscribe()
    }

    pub async fn get_state(&self, session_id: Uuid) -> Option<WorkflowState> {
        self.states.read().await.get(&session_id).cloned()
    }

    /// Spawns the workflow in the background and returns its session id
    /// immediately; callers poll [`Orchestrator::get_state`] or subscribe
    /// to progress (spec §4.13's async fire-and-forget task lifecycle).
    pub fn start(self: Arc<Self>, user_id: String, mood_prompt: String) -> Uuid {
        let session_id = Uuid::new_v4();
        let state = WorkflowState::new(session_id.to_string(), user_id, mood_prompt);
        let orchestrator = self;
        tokio::spawn(async move {
            orchestrator.states.write().await.insert(session_id, state);
            orchestrator.run_workflow(session_id).await;
        });
        session_id
    }

    async fn run_workflow(&self, session_id: Uuid) {
        if let Err(err) = self.execute(session_id).await {
            warn!(session_id = %session_id, error = %err, "workflow failed");
            let mut states = self.states.write().await;
            if let Some(state) = states.get_mut(&session_id) {
                state.transition(WorkflowStatus::Failed, "failed");
                state.record_stage_error("orchestrator", err.to_string());
            }
            drop(states);
            self.notify(session_id, "failed");
        }
    }

    async fn execute(&self, session_id: Uuid) -> Result<()> {
        let (user_id, mood_prompt) = self.identity(session_id).await?;

        self.transition(session_id, WorkflowStatus::AnalyzingMood, "analyzing_mood").await;
        let token = self.token_manager.ensure_valid_token(&user_id).await?;
        let mood_analysis = mood_engine::analyze_mood(self.llm.as_ref(), &mood_prompt).await?;
        self.set_mood_analysis(session_id, mood_analysis.clone()).await;

        self.transition(session_id, WorkflowStatus::GatheringSeeds, "gathering_seeds").await;
        let anchors = self
            .anchor_selector
            .select_anchors(self.llm.as_ref(), &token, &user_id, &mood_prompt, &mood_analysis)
            .await?;
        let user_mentioned_ids: Vec<String> = anchors
            .iter()
            .filter(|anchor| anchor.anchor_type == AnchorType::User)
            .map(|anchor| anchor.track_id.clone())
            .collect();
        let gathered = self
            .seed_gatherer
            .gather_seeds(&token, &user_id, &user_mentioned_ids, TimeRange::MediumTerm, false, &[], Some(&self.progress_tx))
            .await?;
        self.set_seed_and_anchor_data(session_id, &gathered, &anchors).await;

        self.transition(session_id, WorkflowStatus::GeneratingRecommendations, "generating_recommendations").await;
        let target = PlaylistTarget::default();
        let tracks = self
            .generate_iterations(session_id, &token, &mood_analysis, &anchors, &gathered.seed_ids, &gathered.negative_seed_ids, target.target_count)
            .await?;
        self.set_discovered_artists(session_id, &tracks).await;

        if self.is_fatal(session_id).await {
            return Err(EngineError::Fatal("no recommendations could be produced".to_string()));
        }

        self.transition(session_id, WorkflowStatus::Finalizing, "finalizing").await;
        let final_tracks = self.enrich_unresolved(&token, tracks).await;
        self.set_recommendations(session_id, final_tracks).await;

        self.transition(session_id, WorkflowStatus::Completed, "completed").await;
        Ok(())
    }

    /// Main iteration loop (spec §4.13): merge → score → filter → ratio-cap
    /// → diversify/dedup every iteration, breaking once the non-protected
    /// mean confidence clears `cohesion_threshold` or `max_iterations` is
    /// reached, and otherwise feeding the losers back as negative seeds.
    async fn generate_iterations(
        &self,
        session_id: Uuid,
        token: &str,
        mood_analysis: &crate::models::mood::MoodAnalysis,
        anchors: &[AnchorCandidate],
        seed_ids: &[String],
        negative_seed_ids: &[String],
        target_count: usize,
    ) -> Result<Vec<TrackRecommendation>> {
        let anchor_tracks: Vec<TrackRecommendation> = anchors.iter().map(anchor_to_recommendation).collect();
        let mut negatives = negative_seed_ids.to_vec();
        let mut final_tracks: Vec<TrackRecommendation> = Vec::new();
        let max_iterations = self.config.max_iterations.max(1);

        for iteration in 0..max_iterations {
            let ctx = GenerationContext {
                catalog: self.catalog.clone(),
                features: self.features.clone(),
                cache: self.cache.clone(),
                guardrails: self.guardrails.clone(),
                token,
                mood_analysis,
                anchors,
                seed_ids,
                negative_seed_ids: &negatives,
                target_count,
            };

            let mut found_any = false;
            let mut candidates = Vec::new();
            for strategy in &self.primary_strategies {
                match strategy.generate(&ctx).await {
                    Ok(tracks) => {
                        if !tracks.is_empty() {
                            found_any = true;
                        }
                        candidates.extend(tracks);
                    }
                    Err(err) => {
                        warn!(session_id = %session_id, strategy = strategy.name(), error = %err, "candidate strategy failed");
                        self.record_stage_error(session_id, strategy.name(), err.to_string()).await;
                    }
                }
            }

            if !found_any {
                match self.fallback_strategy.generate(&ctx).await {
                    Ok(tracks) => candidates.extend(tracks),
                    Err(err) => {
                        self.record_stage_error(session_id, "fallback", err.to_string()).await;
                    }
                }
            }

            // `scored ← score(candidates, target_features)`: recompute now
            // that real audio features exist, rather than trusting each
            // strategy's pre-enrichment guess.
            self.enrich_audio_features(&mut candidates).await;
            for track in candidates.iter_mut() {
                track.confidence_score =
                    scoring::confidence_score(None, &track.audio_features, &mood_analysis.target_features, None, track.source);
            }

            candidates.retain(|track| scoring::passes_temporal_filter(track, Some(mood_analysis), track.release_year));
            candidates.retain(|track| !scoring::is_violating(track, &mood_analysis.target_features));

            let mut artist_pool = Vec::new();
            let mut seed_pool = Vec::new();
            for track in candidates {
                match track.source {
                    crate::models::track::TrackSource::Reccobeat => seed_pool.push(track),
                    _ => artist_pool.push(track),
                }
            }
            let ratio_capped = ratio_enforcer::enforce_ratio(anchor_tracks.clone(), artist_pool, seed_pool, target_count, self.config.artist_discovery_ratio);

            let mut final_candidates = ratio_capped;
            diversity::apply_artist_diversity_penalty(&mut final_candidates);
            final_candidates = diversity::dedup(final_candidates);
            final_candidates = diversity::sort_protected_first_by_confidence(final_candidates);

            let non_protected: Vec<&TrackRecommendation> = final_candidates.iter().filter(|track| !track.protected).collect();
            let cohesion = if non_protected.is_empty() {
                1.0
            } else {
                non_protected.iter().map(|track| track.confidence_score).sum::<f64>() / non_protected.len() as f64
            };
            let outliers: Vec<String> = non_protected
                .iter()
                .filter(|track| scoring::track_cohesion(&track.audio_features, &mood_analysis.target_features) < self.config.cohesion_threshold)
                .map(|track| track.track_id.clone())
                .collect();

            debug!(session_id = %session_id, iteration, count = final_candidates.len(), cohesion, outliers = outliers.len(), "generation iteration complete");
            final_tracks = final_candidates;

            if cohesion >= self.config.cohesion_threshold || iteration + 1 >= max_iterations {
                break;
            }
            negatives = outliers.into_iter().take(self.config.max_negative_seeds).collect();
        }

        Ok(final_tracks)
    }

    /// Fills in audio features for tracks that don't carry them yet, via
    /// the ID Registry's validated mapping where known, else assuming the
    /// track's own id is already Features-shaped (true for
    /// Reccobeat-sourced tracks).
    async fn enrich_audio_features(&self, tracks: &mut [TrackRecommendation]) {
        for track in tracks.iter_mut() {
            if !track.audio_features.is_empty() {
                continue;
            }
            let features_id = self
                .id_registry
                .get_validated_id(&track.track_id)
                .await
                .unwrap_or_else(|| track.track_id.clone());
            if let Ok(audio) = self.features.get_audio_features(&features_id).await {
                track.audio_features = audio.values;
            }
        }
    }

    /// Post-loop enrichment pass (spec §4.13): re-resolves any track
    /// still missing a URI or artist by name-searching the Catalog,
    /// matching by fuzzy artist-name overlap, and keeping a protected
    /// track even when it can't be enriched.
    async fn enrich_unresolved(&self, token: &str, tracks: Vec<TrackRecommendation>) -> Vec<TrackRecommendation> {
        let mut enriched = Vec::with_capacity(tracks.len());
        for track in tracks {
            if !track.needs_enrichment() {
                enriched.push(track);
                continue;
            }
            let artist = track.artists.first().cloned().unwrap_or_default();
            let query = format!("track:{} artist:{}", track.track_name, artist);
            let matched = match self.catalog.search(token, &query, &["track"]).await {
                Ok(result) => result
                    .tracks
                    .and_then(|page| page.items.into_iter().find(|candidate| fuzzy::token_overlap_ratio(&track.track_name, &candidate.name) >= 0.5)),
                Err(_) => None,
            };
            match matched {
                Some(candidate) => {
                    let mut updated = track;
                    updated.release_year = updated.release_year.or_else(|| candidate.release_year());
                    updated.spotify_uri = candidate.uri.or(updated.spotify_uri);
                    if updated.artists.first().map(String::as_str) == Some("Unknown Artist") {
                        updated.artists = candidate.artists.iter().map(|a| a.name.clone()).collect();
                    }
                    enriched.push(updated);
                }
                None if track.protected => enriched.push(track),
                None => debug!(track = %track.track_name, "dropping unenrichable non-protected track"),
            }
        }
        enriched
    }

    async fn identity(&self, session_id: Uuid) -> Result<(String, String)> {
        let states = self.states.read().await;
        let state = states
            .get(&session_id)
            .ok_or_else(|| EngineError::Validation(format!("unknown session {session_id}")))?;
        Ok((state.user_id.clone(), state.mood_prompt.clone()))
    }

    async fn transition(&self, session_id: Uuid, status: WorkflowStatus, step: &str) {
        {
            let mut states = self.states.write().await;
            if let Some(state) = states.get_mut(&session_id) {
                state.transition(status, step);
            }
        }
        self.notify(session_id, step);
    }

    async fn set_mood_analysis(&self, session_id: Uuid, mood_analysis: crate::models::mood::MoodAnalysis) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&session_id) {
            state.mood_analysis = Some(mood_analysis);
        }
    }

    async fn set_seed_and_anchor_data(&self, session_id: Uuid, gathered: &crate::seed_gatherer::GatheredSeeds, anchors: &[AnchorCandidate]) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&session_id) {
            state.seed_tracks = gathered.seed_ids.clone();
            state.negative_seeds = gathered.negative_seed_ids.clone();
            state.metadata.anchor_track_ids = anchors.iter().map(|a| a.track_id.clone()).collect();
            state.metadata.anchor_tracks = anchors.to_vec();
            state.metadata.user_mentioned_track_ids = anchors
                .iter()
                .filter(|a| a.anchor_type == AnchorType::User)
                .map(|a| a.track_id.clone())
                .collect();
        }
    }

    /// Populates `metadata.discovered_artists` from the generated pool so
    /// [`WorkflowState::is_fatal`] reflects whether artist-based discovery
    /// produced anything, not just whether seeds/anchors did.
    async fn set_discovered_artists(&self, session_id: Uuid, tracks: &[TrackRecommendation]) {
        use crate::models::track::TrackSource;
        let artists: Vec<String> = tracks
            .iter()
            .filter(|t| matches!(t.source, TrackSource::ArtistDiscovery | TrackSource::AnchorTrack))
            .flat_map(|t| t.artists.first().cloned())
            .collect();
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&session_id) {
            state.metadata.discovered_artists = artists;
        }
    }

    async fn is_fatal(&self, session_id: Uuid) -> bool {
        self.states.read().await.get(&session_id).map(WorkflowState::is_fatal).unwrap_or(true)
    }

    async fn set_recommendations(&self, session_id: Uuid, tracks: Vec<TrackRecommendation>) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&session_id) {
            state.recommendations = tracks;
        }
    }

    async fn record_stage_error(&self, session_id: Uuid, stage: &str, message: String) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(&session_id) {
            state.record_stage_error(stage, message);
        }
    }

    /// Fire-and-forget progress notification (spec §4.13): no receiver is
    /// required, so a send with no subscribers is not an error.
    fn notify(&self, session_id: Uuid, step: &str) {
        let _ = self.progress_tx.send(format!("{session_id}:{step}"));
        info!(session_id = %session_id, step, "workflow progress");
    }
}

fn anchor_to_recommendation(anchor: &AnchorCandidate) -> TrackRecommendation {
    TrackRecommendation::new(
        anchor.track_id.clone(),
        anchor.track_name.clone(),
        anchor.artists.clone(),
        anchor.spotify_uri.clone(),
        anchor.confidence,
        HashMap::new(),
        "selected anchor track".to_string(),
        anchor.source,
        anchor.anchor_type == AnchorType::User,
        anchor.protected,
        anchor.anchor_type,
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_to_recommendation_preserves_user_mentioned_invariant() {
        let anchor = AnchorCandidate::user_anchor("t1".into(), "Song".into(), vec!["Artist".into()], None);
        let track = anchor_to_recommendation(&anchor);
        assert!(track.user_mentioned);
        assert!(track.protected);
        assert_eq!(track.anchor_type, AnchorType::User);
    }
}
