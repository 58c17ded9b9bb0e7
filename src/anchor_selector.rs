//! Anchor Selector (spec §4.7): resolves three tiers of anchor tracks —
//! user-mentioned, artist-derived, and genre-derived — then composes a
//! final anchor list sized by an LLM strategy call (or a fixed fallback).

use std::cmp::Ordering;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::warn;

use crate::cache::manager::CacheManager;
use crate::error::Result;
use crate::fuzzy;
use crate::http::catalog::CatalogClient;
use crate::llm::MoodLlm;
use crate::models::anchor::AnchorCandidate;
use crate::models::mood::{FeatureTarget, MoodAnalysis};
use crate::models::track::{AnchorType, TrackSource};
use crate::scripts;

const ANCHOR_CACHE_TTL_MINUTES: i64 = 15;
const DEFAULT_ANCHOR_COUNT: usize = 5;
const GENRE_SCORE_THRESHOLD: f64 = 0.6;

const USER_MENTION_SYSTEM_PROMPT: &str = concat!(
    "Extract any specific tracks the listener names directly (phrases like ",
    "\"especially X\" or \"like X by Y\"). Respond with a JSON array of ",
    "objects: {\"track\": string, \"artist\": string|null}. Respond with ",
    "an empty array if none are named.",
);

const ANCHOR_COUNT_SYSTEM_PROMPT: &str =
    "Given a mood prompt, respond with a single integer between 3 and 8: how many anchor tracks should seed this playlist.";

#[derive(Debug, Clone, serde::Deserialize)]
struct UserMention {
    track: String,
    artist: Option<String>,
}

fn especially_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)especially ([A-Za-z0-9' ]+?)(?:[.,]|$)").unwrap())
}

fn like_by_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)like ([A-Za-z0-9' ]+?) by ([A-Za-z0-9' ]+?)(?:[.,]|$)").unwrap())
}

pub struct AnchorSelector {
    catalog: Arc<CatalogClient>,
    cache: Arc<CacheManager>,
}

impl AnchorSelector {
    pub fn new(catalog: Arc<CatalogClient>, cache: Arc<CacheManager>) -> Self {
        Self { catalog, cache }
    }

    /// Selects the final anchor list: all user-mentioned anchors plus the
    /// highest-scoring artist/genre anchors, up to an LLM-decided (or
    /// default) anchor count (spec §4.7). Cached 15 minutes per
    /// `(user_id, mood_prompt)`.
    pub async fn select_anchors(
        &self,
        llm: &dyn MoodLlm,
        token: &str,
        user_id: &str,
        mood_prompt: &str,
        mood_analysis: &MoodAnalysis,
    ) -> Result<Vec<AnchorCandidate>> {
        if let Some(cached) = self
            .cache
            .get::<Vec<AnchorCandidate>>("anchor_selection", &[user_id, mood_prompt])
            .await
        {
            return Ok(renormalize_protection(cached));
        }

        let user_anchors = self.collect_user_anchors(llm, token, mood_prompt).await;
        let artist_anchors = self.collect_artist_anchors(token, mood_analysis).await;
        let genre_anchors = self.collect_genre_anchors(token, mood_prompt, mood_analysis).await;

        let mut non_user_anchors: Vec<AnchorCandidate> = artist_anchors.into_iter().chain(genre_anchors).collect();
        non_user_anchors.retain(|anchor| anchor.score >= GENRE_SCORE_THRESHOLD);
        non_user_anchors.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        let anchor_count = self
            .decide_anchor_count(llm, mood_prompt)
            .await
            .unwrap_or(DEFAULT_ANCHOR_COUNT)
            .clamp(3, 8);
        let remaining_slots = anchor_count.saturating_sub(user_anchors.len());
        non_user_anchors.truncate(remaining_slots);

        let mut anchors = user_anchors;
        anchors.extend(non_user_anchors);

        self.cache
            .set(
                "anchor_selection",
                &[user_id, mood_prompt],
                &anchors,
                chrono::Duration::minutes(ANCHOR_CACHE_TTL_MINUTES),
            )
            .await?;
        Ok(anchors)
    }

    /// User-mentioned anchors (spec §4.7, tier 1): guaranteed inclusion,
    /// `score = 1.0`, `protected = true`, `anchor_type = User`. A second
    /// LLM call extracts mentions; a pattern-matching fallback covers the
    /// "especially X" / "like X by Y" shapes when the LLM is unavailable.
    async fn collect_user_anchors(&self, llm: &dyn MoodLlm, token: &str, mood_prompt: &str) -> Vec<AnchorCandidate> {
        let mentions = match llm.complete(USER_MENTION_SYSTEM_PROMPT, mood_prompt).await {
            Ok(completion) => extract_mentions_json(&completion).unwrap_or_else(|| extract_mentions_pattern(mood_prompt)),
            Err(err) => {
                warn!(error = %err, "user-mention LLM call failed, using pattern fallback");
                extract_mentions_pattern(mood_prompt)
            }
        };

        let mut anchors = Vec::new();
        for mention in mentions {
            match self.resolve_mention(token, &mention).await {
                Some(anchor) => anchors.push(anchor),
                None => warn!(track = %mention.track, "could not resolve user-mentioned track in catalog"),
            }
        }
        anchors
    }

    async fn resolve_mention(&self, token: &str, mention: &UserMention) -> Option<AnchorCandidate> {
        let query = match &mention.artist {
            Some(artist) => format!("track:{} artist:{}", mention.track, artist),
            None => mention.track.clone(),
        };
        let result = self.catalog.search(token, &query, &["track"]).await.ok()?;
        let tracks = result.tracks?.items;
        let best = fuzzy::best_match(&mention.track, &tracks, |t| t.name.as_str())?;
        Some(AnchorCandidate::user_anchor(
            best.id.clone(),
            best.name.clone(),
            best.artists.iter().map(|a| a.name.clone()).collect(),
            best.uri.clone(),
        ))
    }

    /// Artist-derived anchors (spec §4.7, tier 2): top tracks of artists
    /// the mood analysis named.
    async fn collect_artist_anchors(&self, token: &str, mood_analysis: &MoodAnalysis) -> Vec<AnchorCandidate> {
        let mut anchors = Vec::new();
        for artist_name in &mood_analysis.artist_recommendations {
            let Ok(search) = self.catalog.search(token, artist_name, &["artist"]).await else {
                continue;
            };
            let Some(artists) = search.artists else { continue };
            let Some(artist) = fuzzy::best_match(artist_name, &artists.items, |a| a.name.as_str()) else {
                continue;
            };
            let Ok(top_tracks) = self.catalog.get_artist_top_tracks(token, &artist.id, None).await else {
                continue;
            };
            for track in top_tracks.items.into_iter().take(2) {
                let score = base_anchor_score(track.popularity, &mood_analysis.target_features);
                anchors.push(AnchorCandidate {
                    track_id: track.id,
                    track_name: track.name,
                    artists: track.artists.iter().map(|a| a.name.clone()).collect(),
                    spotify_uri: track.uri,
                    score,
                    confidence: score,
                    source: TrackSource::AnchorTrack,
                    anchor_type: AnchorType::ArtistRecommended,
                    protected: false,
                });
            }
        }
        anchors
    }

    /// Genre-derived anchors (spec §4.7, tier 3): catalog search by genre
    /// keyword, with the non-Latin-script cultural penalty applied and
    /// low scorers dropped before the final composition step.
    async fn collect_genre_anchors(&self, token: &str, mood_prompt: &str, mood_analysis: &MoodAnalysis) -> Vec<AnchorCandidate> {
        let mut anchors = Vec::new();
        for genre in &mood_analysis.genre_keywords {
            let Ok(search) = self.catalog.search(token, genre, &["track"]).await else {
                continue;
            };
            let Some(tracks) = search.tracks else { continue };
            for track in tracks.items.into_iter().take(3) {
                let artist_name = track.artists.first().map(|a| a.name.as_str()).unwrap_or("");
                let mut score = base_anchor_score(track.popularity, &mood_analysis.target_features);
                if scripts::needs_script_penalty(artist_name, mood_prompt) {
                    score *= 0.5;
                }
                anchors.push(AnchorCandidate {
                    track_id: track.id,
                    track_name: track.name,
                    artists: track.artists.iter().map(|a| a.name.clone()).collect(),
                    spotify_uri: track.uri,
                    score,
                    confidence: score,
                    source: TrackSource::AnchorTrack,
                    anchor_type: AnchorType::Genre,
                    protected: false,
                });
            }
        }
        anchors
    }

    /// Asks the LLM how many anchors to use; `None` on any failure to
    /// parse or call, which the caller maps to the fixed default.
    async fn decide_anchor_count(&self, llm: &dyn MoodLlm, mood_prompt: &str) -> Option<usize> {
        let completion = llm.complete(ANCHOR_COUNT_SYSTEM_PROMPT, mood_prompt).await.ok()?;
        completion.trim().chars().take_while(|c| c.is_ascii_digit()).collect::<String>().parse().ok()
    }
}

/// Forces `protected = true` on every `anchor_type = User` entry: a
/// defensive re-normalization on cache hits so a stale cached record
/// from before a model change can't resurrect an unprotected user
/// anchor (spec §4.7's caching note).
fn renormalize_protection(mut anchors: Vec<AnchorCandidate>) -> Vec<AnchorCandidate> {
    for anchor in &mut anchors {
        if anchor.anchor_type == AnchorType::User {
            anchor.protected = true;
        }
    }
    anchors
}

fn base_anchor_score(popularity: Option<u32>, target_features: &std::collections::HashMap<String, FeatureTarget>) -> f64 {
    match (popularity, target_features.get("popularity")) {
        (Some(popularity), Some(target)) => {
            let distance = (popularity as f64 - target.midpoint()).abs() / 100.0;
            ((1.0 - distance).clamp(0.0, 1.0) * 0.5 + 0.5).clamp(0.0, 1.0)
        }
        _ => 0.7,
    }
}

fn extract_mentions_json(completion: &str) -> Option<Vec<UserMention>> {
    let start = completion.find('[')?;
    let end = completion.rfind(']')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&completion[start..=end]).ok()
}

fn extract_mentions_pattern(mood_prompt: &str) -> Vec<UserMention> {
    let mut mentions = Vec::new();
    for capture in like_by_pattern().captures_iter(mood_prompt) {
        mentions.push(UserMention {
            track: capture[1].trim().to_string(),
            artist: Some(capture[2].trim().to_string()),
        });
    }
    for capture in especially_pattern().captures_iter(mood_prompt) {
        mentions.push(UserMention {
            track: capture[1].trim().to_string(),
            artist: None,
        });
    }
    mentions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn especially_pattern_extracts_track_name() {
        let mentions = extract_mentions_pattern("play something chill, especially Weightless by Marconi Union.");
        assert!(mentions.iter().any(|m| m.track.eq_ignore_ascii_case("Weightless by Marconi Union") || m.track.eq_ignore_ascii_case("Weightless")));
    }

    #[test]
    fn like_by_pattern_extracts_track_and_artist() {
        let mentions = extract_mentions_pattern("something like Midnight City by M83 please");
        let found = mentions.iter().find(|m| m.track.eq_ignore_ascii_case("Midnight City")).unwrap();
        assert_eq!(found.artist.as_deref(), Some("M83"));
    }

    #[test]
    fn json_mentions_parse_from_llm_completion() {
        let completion = "here you go: [{\"track\": \"Song\", \"artist\": \"Artist\"}]";
        let mentions = extract_mentions_json(completion).unwrap();
        assert_eq!(mentions[0].track, "Song");
        assert_eq!(mentions[0].artist.as_deref(), Some("Artist"));
    }

    #[test]
    fn renormalize_forces_protected_on_user_anchors() {
        let mut anchor = AnchorCandidate::user_anchor("t1".into(), "Song".into(), vec!["Artist".into()], None);
        anchor.protected = false;
        let normalized = renormalize_protection(vec![anchor]);
        assert!(normalized[0].protected);
    }

    #[test]
    fn base_anchor_score_defaults_without_popularity_target() {
        let score = base_anchor_score(Some(80), &std::collections::HashMap::new());
        assert_eq!(score, 0.7);
    }
}
