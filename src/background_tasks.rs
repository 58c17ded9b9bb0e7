//! Background Tasks (spec §4.14): two independent fire-and-forget
//! workers layered on top of the orchestrator and the HTTP clients.
//! Grounded on `TokenManager::start_with_shutdown`'s supervisor-loop
//! shape (`tokio::select!` over an interval tick and an `oneshot`
//! shutdown signal).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::cache::CacheManager;
use crate::error::{EngineError, Result};
use crate::http::catalog::{CatalogClient, TimeRange};
use crate::http::features::FeaturesClient;
use crate::id_registry::IdRegistry;
use crate::models::track::TrackRecommendation;
use crate::models::workflow::WorkflowStatus;
use crate::orchestrator::Orchestrator;
use crate::token_manager::TokenExchanger;

/// Eight fixed, normalized mood prompts precomputed ahead of demand (spec
/// §4.14) so a cold cache never stalls a common request.
const POPULAR_MOOD_KEYS: &[&str] = &[
    "chill evening",
    "party night",
    "focus session",
    "emotional release",
    "indie discovery",
    "workout energy",
    "nostalgic throwback",
    "romantic dinner",
];

const POPULAR_MOOD_CACHE_CATEGORY: &str = "popular_mood_recommendations";
const POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAX_POLL_SECONDS: u64 = 180;
const INTER_MOOD_SLEEP: Duration = Duration::from_secs(5);

/// Runs each of [`POPULAR_MOOD_KEYS`] through a real orchestrator
/// workflow under a service account, polling for completion, and caches
/// the resulting list for four hours.
pub struct PopularMoodPrecomputer<E: TokenExchanger + 'static> {
    orchestrator: Arc<Orchestrator<E>>,
    cache: Arc<CacheManager>,
    precompute_user_id: String,
}

impl<E: TokenExchanger + 'static> PopularMoodPrecomputer<E> {
    pub fn new(orchestrator: Arc<Orchestrator<E>>, cache: Arc<CacheManager>, precompute_user_id: String) -> Self {
        Self { orchestrator, cache, precompute_user_id }
    }

    /// One sweep over every mood key, skipping any already cached.
    pub async fn run_once(&self) {
        for mood in POPULAR_MOOD_KEYS {
            if self.cache.exists(POPULAR_MOOD_CACHE_CATEGORY, &[mood]).await.unwrap_or(false) {
                debug!(mood, "popular mood already cached, skipping");
                continue;
            }
            match self.precompute(mood).await {
                Ok(tracks) => {
                    if let Err(err) = self
                        .cache
                        .set(POPULAR_MOOD_CACHE_CATEGORY, &[mood], &tracks, chrono::Duration::hours(4))
                        .await
                    {
                        warn!(mood, error = %err, "failed to cache popular mood result");
                    }
                }
                Err(err) => warn!(mood, error = %err, "failed to precompute popular mood"),
            }
            tokio::time::sleep(INTER_MOOD_SLEEP).await;
        }
    }

    async fn precompute(&self, mood: &str) -> Result<Vec<TrackRecommendation>> {
        let session_id = self.orchestrator.clone().start(self.precompute_user_id.clone(), mood.to_string());
        let attempts = MAX_POLL_SECONDS / POLL_INTERVAL.as_secs().max(1);
        for _ in 0..attempts {
            tokio::time::sleep(POLL_INTERVAL).await;
            let Some(state) = self.orchestrator.get_state(session_id).await else {
                continue;
            };
            if !state.status.is_terminal() {
                continue;
            }
            if state.status == WorkflowStatus::Completed {
                return Ok(state.recommendations);
            }
            return Err(EngineError::StageFailure {
                stage: "popular_mood_precompute".to_string(),
                message: format!("workflow for '{mood}' ended in {:?}", state.status),
            });
        }
        Err(EngineError::Transient {
            upstream: "orchestrator".to_string(),
            message: format!("mood '{mood}' did not complete within the poll budget"),
        })
    }

    /// Background supervisor loop: sweeps on every `interval` tick until
    /// told to shut down.
    pub fn start_with_shutdown(self: Arc<Self>, interval: Duration, mut shutdown_rx: oneshot::Receiver<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    _ = &mut shutdown_rx => {
                        info!("popular mood precomputer shutting down");
                        break;
                    }
                }
            }
        })
    }
}

/// Prefetches a listener's top tracks, top artists, and their audio
/// features right after login so the first real recommendation request
/// hits a warm cache (spec §4.14).
pub struct UserCacheWarmer {
    catalog: Arc<CatalogClient>,
    features: Arc<FeaturesClient>,
    cache: Arc<CacheManager>,
    id_registry: Arc<IdRegistry>,
}

impl UserCacheWarmer {
    pub fn new(catalog: Arc<CatalogClient>, features: Arc<FeaturesClient>, cache: Arc<CacheManager>, id_registry: Arc<IdRegistry>) -> Self {
        Self { catalog, features, cache, id_registry }
    }

    /// Fire-and-forget: spawns the warm-up and returns immediately.
    pub fn warm_on_login(self: Arc<Self>, token: String, user_id: String) {
        tokio::spawn(async move {
            if let Err(err) = self.warm(&token, &user_id).await {
                warn!(user_id, error = %err, "user cache warm-up failed");
            }
        });
    }

    async fn warm(&self, token: &str, user_id: &str) -> Result<()> {
        let top_tracks = self.catalog.get_top_tracks(token, TimeRange::MediumTerm, 50).await?;
        let track_ids: Vec<String> = top_tracks.items.iter().map(|t| t.id.clone()).collect();
        self.cache
            .set("top_tracks", &[user_id, "medium_term", "50"], &track_ids, chrono::Duration::minutes(30))
            .await?;

        let top_artists = self.catalog.get_top_artists(token, TimeRange::MediumTerm, 20).await?;
        let artist_ids: Vec<String> = top_artists.items.iter().map(|a| a.id.clone()).collect();
        self.cache
            .set("top_artists", &[user_id, "medium_term"], &artist_ids, chrono::Duration::minutes(30))
            .await?;

        for chunk in track_ids.chunks(40) {
            let Ok(features) = self.features.get_multiple_tracks(chunk).await else {
                continue;
            };
            for track in features {
                let _ = self.id_registry.mark_validated(&track.id, &track.id).await;
                if let Ok(audio) = self.features.get_audio_features(&track.id).await {
                    let _ = self
                        .cache
                        .set("track_details", &[track.id.as_str()], &audio.values, chrono::Duration::hours(2))
                        .await;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::POPULAR_MOOD_KEYS;

    #[test]
    fn exactly_eight_popular_mood_keys() {
        assert_eq!(POPULAR_MOOD_KEYS.len(), 8);
    }

    #[test]
    fn popular_mood_keys_are_unique() {
        let mut sorted = POPULAR_MOOD_KEYS.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), POPULAR_MOOD_KEYS.len());
    }
}
