//! Typed wrapper around [`HttpTool`] for the Catalog upstream (spec §6):
//! user profile, top tracks/artists, search, artist catalog browsing, and
//! playlist creation.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::config::CatalogConfig;
use crate::error::{EngineError, Result};

use super::client::{HttpTool, HttpToolConfig, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    ShortTerm,
    MediumTerm,
    LongTerm,
}

impl TimeRange {
    fn as_str(self) -> &'static str {
        match self {
            TimeRange::ShortTerm => "short_term",
            TimeRange::MediumTerm => "medium_term",
            TimeRange::LongTerm => "long_term",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogArtist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    pub popularity: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumInfo {
    #[serde(default)]
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogTrack {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<CatalogArtist>,
    pub uri: Option<String>,
    pub popularity: Option<u32>,
    #[serde(default)]
    pub album: Option<AlbumInfo>,
}

impl CatalogTrack {
    /// Parses the leading 4 digits of `album.release_date` (spec §4.10's
    /// temporal filter operates on this year alone, never month/day).
    /// `None` for a missing or unparseable date — the filter treats that
    /// as lenient-accept, not a violation.
    pub fn release_year(&self) -> Option<i32> {
        self.album
            .as_ref()
            .and_then(|album| album.release_date.as_deref())
            .and_then(|date| date.get(0..4))
            .and_then(|year| year.parse().ok())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackPage {
    pub items: Vec<CatalogTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistPage {
    pub items: Vec<CatalogArtist>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub tracks: Option<TrackPage>,
    #[serde(default)]
    pub artists: Option<ArtistPage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedPlaylist {
    pub id: String,
    pub uri: Option<String>,
}

/// Market codes tried in order when a market-scoped lookup fails (spec §6:
/// "fall back through a market list and finally to a name-based search").
const MARKET_FALLBACK_LIST: &[&str] = &["US", "GB", "DE", "JP", "BR"];

pub struct CatalogClient {
    tool: HttpTool,
}

impl CatalogClient {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let tool = HttpTool::new(HttpToolConfig {
            base_url: config.base_url.clone(),
            requests_per_minute: config.requests_per_minute,
            min_request_interval: config.min_request_interval,
            retry_policy: RetryPolicy {
                max_attempts: config.max_retries,
                timeout: config.request_timeout,
            },
            global_semaphore: None,
        })?;
        Ok(Self { tool })
    }

    pub async fn get_user_profile(&self, token: &str) -> Result<UserProfile> {
        self.tool.get_json("/me", Some(token), &[]).await
    }

    pub async fn get_top_tracks(&self, token: &str, time_range: TimeRange, limit: u32) -> Result<TrackPage> {
        let limit = limit.min(50).to_string();
        self.tool
            .get_json(
                "/me/top/tracks",
                Some(token),
                &[("time_range", time_range.as_str().to_string()), ("limit", limit)],
            )
            .await
    }

    pub async fn get_top_artists(&self, token: &str, time_range: TimeRange, limit: u32) -> Result<ArtistPage> {
        let limit = limit.min(50).to_string();
        self.tool
            .get_json(
                "/me/top/artists",
                Some(token),
                &[("time_range", time_range.as_str().to_string()), ("limit", limit)],
            )
            .await
    }

    pub async fn search(&self, token: &str, query: &str, types: &[&str]) -> Result<SearchResult> {
        self.tool
            .get_json(
                "/search",
                Some(token),
                &[("q", query.to_string()), ("type", types.join(","))],
            )
            .await
    }

    /// Tries `preferred_market` first, then [`MARKET_FALLBACK_LIST`], then
    /// gives up and lets the caller fall back to a name-based search
    /// (spec §6).
    pub async fn get_artist_top_tracks(
        &self,
        token: &str,
        artist_id: &str,
        preferred_market: Option<&str>,
    ) -> Result<TrackPage> {
        let mut markets: Vec<&str> = Vec::new();
        if let Some(market) = preferred_market {
            markets.push(market);
        }
        markets.extend(MARKET_FALLBACK_LIST.iter().copied());

        let mut last_err = None;
        for market in markets {
            let path = format!("/artists/{artist_id}/top-tracks");
            match self
                .tool
                .get_json::<TrackPage>(&path, Some(token), &[("market", market.to_string())])
                .await
            {
                Ok(page) => return Ok(page),
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| EngineError::MissingMapping {
            catalog_id: artist_id.to_string(),
        }))
    }

    pub async fn get_artist_albums(&self, token: &str, artist_id: &str) -> Result<serde_json::Value> {
        let path = format!("/artists/{artist_id}/albums");
        self.tool.get_json(&path, Some(token), &[]).await
    }

    pub async fn get_album_tracks(&self, token: &str, album_id: &str) -> Result<TrackPage> {
        let path = format!("/albums/{album_id}/tracks");
        self.tool.get_json(&path, Some(token), &[]).await
    }

    pub async fn get_track(&self, token: &str, track_id: &str) -> Result<CatalogTrack> {
        let path = format!("/tracks/{track_id}");
        self.tool.get_json(&path, Some(token), &[]).await
    }

    pub async fn create_playlist(&self, token: &str, user_id: &str, name: &str) -> Result<CreatedPlaylist> {
        let path = format!("/users/{user_id}/playlists");
        self.tool
            .post_json(&path, Some(token), serde_json::json!({ "name": name, "public": false }))
            .await
    }

    /// Adds tracks in batches of 100 (spec §6's documented cap).
    pub async fn add_tracks_to_playlist(&self, token: &str, playlist_id: &str, uris: &[String]) -> Result<()> {
        for chunk in uris.chunks(100) {
            let path = format!("/playlists/{playlist_id}/tracks");
            let _: serde_json::Value = self
                .tool
                .post_json(&path, Some(token), serde_json::json!({ "uris": chunk }))
                .await?;
        }
        Ok(())
    }

    /// Uploads a base64-encoded JPEG cover image; the upstream is
    /// expected to answer 202 Accepted (spec §6).
    pub async fn upload_cover_image(&self, token: &str, playlist_id: &str, image_base64: &str) -> Result<()> {
        let path = format!("/playlists/{playlist_id}/images");
        let _: serde_json::Value = self
            .tool
            .post_json(&path, Some(token), serde_json::Value::String(image_base64.to_string()))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_range_renders_expected_strings() {
        assert_eq!(TimeRange::ShortTerm.as_str(), "short_term");
        assert_eq!(TimeRange::LongTerm.as_str(), "long_term");
    }

    #[test]
    fn market_fallback_list_leads_with_common_markets() {
        assert_eq!(MARKET_FALLBACK_LIST[0], "US");
    }
}
