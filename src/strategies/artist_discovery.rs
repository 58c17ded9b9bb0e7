//! Artist-discovery strategy (spec §4.9.2): a discovery-focused hybrid
//! that widens the net to moderately popular tracks from artists the
//! mood analysis named, bounded by a fan-out semaphore.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::error::{EngineError, Result};
use crate::models::track::{AnchorType, TrackRecommendation, TrackSource};
use crate::scoring;

use super::{CandidateStrategy, GenerationContext};

const ARTIST_DISCOVERY_RATIO: f64 = 0.3;
const MIN_POPULARITY: u32 = 20;
const MAX_POPULARITY: u32 = 80;
const MAX_CONCURRENT_ARTISTS: usize = 5;
const FAILED_ARTIST_CACHE_CATEGORY: &str = "artist_discovery_failed";
const FAILED_ARTIST_TTL_SECS: i64 = 600;
/// Relaxed compared to the pipeline-wide cohesion threshold: the artist
/// was already coarsely mood-matched before its tracks reached here
/// (spec §4.9.2).
const RELAXED_COHESION_THRESHOLD: f64 = 0.2;

pub struct ArtistDiscoveryStrategy;

#[async_trait]
impl CandidateStrategy for ArtistDiscoveryStrategy {
    fn name(&self) -> &'static str {
        "artist_discovery"
    }

    async fn generate(&self, ctx: &GenerationContext<'_>) -> Result<Vec<TrackRecommendation>> {
        let artist_names: Vec<String> = ctx
            .mood_analysis
            .artist_recommendations
            .iter()
            .chain(ctx.mood_analysis.genre_keywords.iter())
            .cloned()
            .collect();
        if artist_names.is_empty() {
            return Ok(Vec::new());
        }

        let discovery_take = ((ctx.target_count as f64) * ARTIST_DISCOVERY_RATIO).ceil().max(1.0) as usize;
        let per_artist = (discovery_take / artist_names.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_ARTISTS));

        let mut handles = Vec::new();
        for name in &artist_names {
            let semaphore = semaphore.clone();
            let name = name.clone();
            handles.push(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                discover_for_artist(ctx, &name, per_artist).await
            });
        }
        let results = futures::future::join_all(handles).await;

        let total = results.len();
        let mut failures = 0usize;
        let mut tracks = Vec::new();
        for (name, result) in artist_names.iter().zip(results) {
            match result {
                Ok(mut found) => tracks.append(&mut found),
                Err(err) => {
                    failures += 1;
                    warn!(artist = %name, error = %err, "artist discovery failed for artist");
                    let _ = ctx
                        .cache
                        .set(FAILED_ARTIST_CACHE_CATEGORY, &[name.as_str()], &true, chrono::Duration::seconds(FAILED_ARTIST_TTL_SECS))
                        .await;
                }
            }
        }

        if failures == total {
            return Err(EngineError::StageFailure {
                stage: "artist_discovery".to_string(),
                message: "every discovery artist failed".to_string(),
            });
        }
        if total > 0 && failures as f64 / total as f64 > 0.5 {
            warn!(failures, total, "artist discovery: majority of artists failed, continuing with partial results");
        }
        Ok(tracks)
    }
}

async fn discover_for_artist(ctx: &GenerationContext<'_>, artist_name: &str, take: usize) -> Result<Vec<TrackRecommendation>> {
    if ctx.cache.get::<bool>(FAILED_ARTIST_CACHE_CATEGORY, &[artist_name]).await.is_some() {
        return Err(EngineError::Transient {
            upstream: "catalog".to_string(),
            message: format!("artist '{artist_name}' recently failed discovery, skipping"),
        });
    }

    let search = ctx.catalog.search(ctx.token, artist_name, &["artist"]).await?;
    let artist = search
        .artists
        .and_then(|page| page.items.into_iter().next())
        .ok_or_else(|| EngineError::MissingMapping { catalog_id: artist_name.to_string() })?;

    let top_tracks = ctx.catalog.get_artist_top_tracks(ctx.token, &artist.id, None).await?;
    let mut tracks: Vec<TrackRecommendation> = top_tracks
        .items
        .into_iter()
        .filter(|track| {
            let popularity = track.popularity.unwrap_or(50);
            (MIN_POPULARITY..=MAX_POPULARITY).contains(&popularity)
        })
        .take(take)
        .map(|track| {
            let popularity = track.popularity.map(|p| p as f64);
            let release_year = track.release_year();
            let score = scoring::confidence_score(None, &HashMap::new(), &ctx.mood_analysis.target_features, popularity, TrackSource::ArtistDiscovery);
            TrackRecommendation::new(
                track.id,
                track.name,
                track.artists.iter().map(|a| a.name.clone()).collect(),
                track.uri,
                score,
                HashMap::new(),
                format!("artist discovery via '{artist_name}'"),
                TrackSource::ArtistDiscovery,
                false,
                false,
                AnchorType::None,
                release_year,
            )
        })
        .collect();

    batch_fetch_audio_features(ctx, &mut tracks).await;
    tracks.retain(|track| scoring::track_cohesion(&track.audio_features, &ctx.mood_analysis.target_features) >= RELAXED_COHESION_THRESHOLD);
    Ok(tracks)
}

/// Batch-fetches audio features for one artist's candidate tracks
/// concurrently (spec §4.9.2's "batch audio-feature lookups per
/// artist"), so the relaxed cohesion filter above has real features to
/// work with rather than the empty map strategies start from.
async fn batch_fetch_audio_features(ctx: &GenerationContext<'_>, tracks: &mut [TrackRecommendation]) {
    let fetches = tracks.iter().map(|track| ctx.features.get_audio_features(&track.track_id));
    let results = futures::future::join_all(fetches).await;
    for (track, result) in tracks.iter_mut().zip(results) {
        if let Ok(audio) = result {
            track.audio_features = audio.values;
        }
    }
}
