//! User-anchor strategy (spec §4.9.1): expands each anchor's primary
//! artist into a popularity-weighted hybrid of top tracks and deeper
//! album cuts.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;
use crate::fuzzy;
use crate::http::catalog::CatalogTrack;
use crate::models::anchor::AnchorCandidate;
use crate::models::track::{AnchorType, TrackRecommendation, TrackSource};
use crate::scoring;

use super::{CandidateStrategy, GenerationContext};

/// Share of each anchor's slot filled by its most popular top tracks; the
/// remainder comes from album deep cuts (spec §4.9.1's "popular-focused
/// hybrid ratio").
const HYBRID_POPULAR_RATIO: f64 = 0.9;

pub struct UserAnchorStrategy;

#[async_trait]
impl CandidateStrategy for UserAnchorStrategy {
    fn name(&self) -> &'static str {
        "user_anchor"
    }

    async fn generate(&self, ctx: &GenerationContext<'_>) -> Result<Vec<TrackRecommendation>> {
        if ctx.anchors.is_empty() {
            return Ok(Vec::new());
        }
        let per_anchor_target = (ctx.target_count / ctx.anchors.len()).max(1);

        let fetches = ctx.anchors.iter().map(|anchor| tracks_for_anchor(ctx, anchor, per_anchor_target));
        let results = futures::future::join_all(fetches).await;

        let mut tracks = Vec::new();
        for (anchor, result) in ctx.anchors.iter().zip(results) {
            match result {
                Ok(mut found) => tracks.append(&mut found),
                Err(err) => warn!(anchor = %anchor.track_name, error = %err, "user-anchor strategy: artist fetch failed"),
            }
        }
        Ok(tracks)
    }
}

async fn tracks_for_anchor(ctx: &GenerationContext<'_>, anchor: &AnchorCandidate, target: usize) -> Result<Vec<TrackRecommendation>> {
    let Some(artist_name) = anchor.artists.first() else {
        return Ok(Vec::new());
    };
    let search = ctx.catalog.search(ctx.token, artist_name, &["artist"]).await?;
    let Some(artists) = search.artists else {
        return Ok(Vec::new());
    };
    let Some(artist) = fuzzy::best_match(artist_name, &artists.items, |a| a.name.as_str()) else {
        return Ok(Vec::new());
    };
    let top_tracks = ctx.catalog.get_artist_top_tracks(ctx.token, &artist.id, None).await?;

    let popular_take = ((target as f64) * HYBRID_POPULAR_RATIO).ceil().max(1.0) as usize;
    let mut tracks: Vec<TrackRecommendation> = top_tracks
        .items
        .into_iter()
        .take(popular_take)
        .map(|track| build_recommendation(track, anchor, ctx))
        .collect();

    let remaining = target.saturating_sub(tracks.len());
    if remaining > 0 {
        if let Ok(albums) = ctx.catalog.get_artist_albums(ctx.token, &artist.id).await {
            if let Some(items) = albums.get("items").and_then(|v| v.as_array()) {
                'albums: for album in items.iter().take(remaining) {
                    let Some(album_id) = album.get("id").and_then(|v| v.as_str()) else {
                        continue;
                    };
                    if let Ok(album_tracks) = ctx.catalog.get_album_tracks(ctx.token, album_id).await {
                        for track in album_tracks.items.into_iter().take(1) {
                            tracks.push(build_recommendation(track, anchor, ctx));
                            if tracks.len() >= target {
                                break 'albums;
                            }
                        }
                    }
                }
            }
        }
    }
    Ok(tracks)
}

fn build_recommendation(track: CatalogTrack, anchor: &AnchorCandidate, ctx: &GenerationContext<'_>) -> TrackRecommendation {
    let popularity = track.popularity.map(|p| p as f64);
    let release_year = track.release_year();
    let score = scoring::confidence_score(None, &HashMap::new(), &ctx.mood_analysis.target_features, popularity, TrackSource::AnchorTrack);
    TrackRecommendation::new(
        track.id,
        track.name,
        track.artists.iter().map(|a| a.name.clone()).collect(),
        track.uri,
        score,
        HashMap::new(),
        format!("discovered via anchor '{}'", anchor.track_name),
        TrackSource::AnchorTrack,
        false,
        false,
        AnchorType::None,
        release_year,
    )
}
