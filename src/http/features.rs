//! Typed wrapper around [`HttpTool`] for the Features upstream (spec §6):
//! seed-based recommendation, bulk track/artist lookup, and audio
//! features. Every call here is flagged `use_global_semaphore` (spec
//! §4.4): the service misbehaves under concurrency.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::Semaphore;

use crate::config::FeaturesConfig;
use crate::error::{EngineError, Result};

use super::client::{HttpTool, HttpToolConfig, RetryPolicy};

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureTrack {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioFeatures {
    pub id: String,
    #[serde(flatten)]
    pub values: HashMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationResponse {
    pub tracks: Vec<FeatureTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureArtist {
    pub id: String,
    pub name: String,
}

pub struct FeaturesClient {
    tool: HttpTool,
}

impl FeaturesClient {
    pub fn new(config: &FeaturesConfig, global_semaphore: Arc<Semaphore>) -> Result<Self> {
        let tool = HttpTool::new(HttpToolConfig {
            base_url: config.base_url.clone(),
            requests_per_minute: config.requests_per_minute,
            min_request_interval: config.min_request_interval,
            retry_policy: RetryPolicy {
                max_attempts: config.max_retries,
                timeout: config.request_timeout,
            },
            global_semaphore: Some(global_semaphore),
        })?;
        Ok(Self { tool })
    }

    /// `seeds`: 1-5, `negative_seeds`: 0-5, `size`: 1-100 (spec §6).
    pub async fn recommend(
        &self,
        seeds: &[String],
        negative_seeds: &[String],
        size: u32,
    ) -> Result<RecommendationResponse> {
        if seeds.is_empty() || seeds.len() > 5 {
            return Err(EngineError::Validation(format!(
                "seed count {} outside allowed range [1,5]",
                seeds.len()
            )));
        }
        if negative_seeds.len() > 5 {
            return Err(EngineError::Validation(format!(
                "negative seed count {} exceeds allowed maximum 5",
                negative_seeds.len()
            )));
        }
        let size = size.clamp(1, 100).to_string();
        let mut query = vec![("seeds", seeds.join(",")), ("size", size)];
        if !negative_seeds.is_empty() {
            query.push(("negative_seeds", negative_seeds.join(",")));
        }
        self.tool.get_json("/track-recommendation", None, &query).await
    }

    /// `ids`: at most 40 (spec §6).
    pub async fn get_multiple_tracks(&self, ids: &[String]) -> Result<Vec<FeatureTrack>> {
        if ids.len() > 40 {
            return Err(EngineError::Validation(format!(
                "track id count {} exceeds allowed maximum 40",
                ids.len()
            )));
        }
        self.tool.get_json("/tracks", None, &[("ids", ids.join(","))]).await
    }

    pub async fn get_track(&self, id: &str) -> Result<FeatureTrack> {
        let path = format!("/track/{id}");
        self.tool.get_json(&path, None, &[]).await
    }

    pub async fn get_audio_features(&self, id: &str) -> Result<AudioFeatures> {
        let path = format!("/track/{id}/audio-features");
        self.tool.get_json(&path, None, &[]).await
    }

    pub async fn search_artists(&self, query: &str) -> Result<Vec<FeatureArtist>> {
        self.tool.get_json("/search/artists", None, &[("q", query.to_string())]).await
    }

    /// `ids`: at most 50 (spec §6).
    pub async fn get_multiple_artists(&self, ids: &[String]) -> Result<Vec<FeatureArtist>> {
        if ids.len() > 50 {
            return Err(EngineError::Validation(format!(
                "artist id count {} exceeds allowed maximum 50",
                ids.len()
            )));
        }
        self.tool.get_json("/artists", None, &[("ids", ids.join(","))]).await
    }

    pub async fn get_artist_tracks(&self, artist_id: &str) -> Result<Vec<FeatureTrack>> {
        let path = format!("/artist/{artist_id}/tracks");
        self.tool.get_json(&path, None, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recommend_rejects_too_many_seeds() {
        let config = FeaturesConfig {
            base_url: "https://example.com".to_string(),
            api_key: String::new(),
            request_timeout: std::time::Duration::from_secs(180),
            requests_per_minute: 60,
            min_request_interval: std::time::Duration::from_millis(1),
            max_retries: 1,
            global_semaphore_capacity: 5,
        };
        let client = FeaturesClient::new(&config, Arc::new(Semaphore::new(5))).unwrap();
        let seeds: Vec<String> = (0..6).map(|i| format!("s{i}")).collect();
        let result = client.recommend(&seeds, &[], 20).await;
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }
}
