//! Fallback strategy (spec §4.9.4): the last resort when every other
//! generator comes up empty — search for the top artist behind each of
//! the first three mood keywords and take their top tracks as seeds.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{EngineError, Result};
use crate::models::track::{AnchorType, TrackRecommendation, TrackSource};
use crate::scoring;

use super::{CandidateStrategy, GenerationContext};

const MAX_KEYWORDS: usize = 3;
const TRACKS_PER_ARTIST: usize = 3;

pub struct FallbackStrategy;

#[async_trait]
impl CandidateStrategy for FallbackStrategy {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn generate(&self, ctx: &GenerationContext<'_>) -> Result<Vec<TrackRecommendation>> {
        let keywords: Vec<&String> = ctx
            .mood_analysis
            .search_keywords
            .iter()
            .chain(ctx.mood_analysis.genre_keywords.iter())
            .take(MAX_KEYWORDS)
            .collect();
        if keywords.is_empty() {
            return Err(EngineError::Fatal("fallback strategy has no mood keywords to search".to_string()));
        }

        let mut tracks = Vec::new();
        for keyword in keywords {
            let Ok(search) = ctx.catalog.search(ctx.token, keyword, &["artist"]).await else {
                continue;
            };
            let Some(artist) = search.artists.and_then(|page| page.items.into_iter().next()) else {
                continue;
            };
            let Ok(top_tracks) = ctx.catalog.get_artist_top_tracks(ctx.token, &artist.id, None).await else {
                continue;
            };
            for track in top_tracks.items.into_iter().take(TRACKS_PER_ARTIST) {
                let popularity = track.popularity.map(|p| p as f64);
                let release_year = track.release_year();
                let score = scoring::confidence_score(None, &HashMap::new(), &ctx.mood_analysis.target_features, popularity, TrackSource::ArtistDiscovery);
                tracks.push(TrackRecommendation::new(
                    track.id,
                    track.name,
                    track.artists.iter().map(|a| a.name.clone()).collect(),
                    track.uri,
                    score,
                    HashMap::new(),
                    format!("fallback via mood keyword '{keyword}'"),
                    TrackSource::ArtistDiscovery,
                    false,
                    false,
                    AnchorType::None,
                    release_year,
                ));
            }
        }

        if tracks.is_empty() {
            return Err(EngineError::Fatal("fallback strategy produced no candidates".to_string()));
        }
        Ok(tracks)
    }
}
