//! Application configuration module
//!
//! Provides centralized, environment-aware configuration the way the
//! teacher's `AppConfig` composes sub-configs, each with its own
//! `from_env()` and documented defaults.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    MissingRequired(String),

    #[error("invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Complete engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub catalog: CatalogConfig,
    pub features: FeaturesConfig,
    pub cache: CacheConfig,
    pub orchestrator: OrchestratorConfig,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            catalog: CatalogConfig::from_env()?,
            features: FeaturesConfig::from_env()?,
            cache: CacheConfig::from_env(),
            orchestrator: OrchestratorConfig::from_env(),
        })
    }
}

/// Catalog (Spotify-shaped) upstream configuration.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub request_timeout: Duration,
    pub requests_per_minute: u32,
    pub min_request_interval: Duration,
    pub max_retries: u32,
}

impl CatalogConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: std::env::var("CATALOG_BASE_URL")
                .unwrap_or_else(|_| "https://api.catalog.example.com/v1".to_string()),
            client_id: std::env::var("CATALOG_CLIENT_ID").unwrap_or_default(),
            client_secret: std::env::var("CATALOG_CLIENT_SECRET").unwrap_or_default(),
            request_timeout: Duration::from_secs(30),
            requests_per_minute: 180,
            min_request_interval: Duration::from_millis(50),
            max_retries: 3,
        })
    }
}

/// Features (RecoBeat-shaped) upstream configuration.
#[derive(Debug, Clone)]
pub struct FeaturesConfig {
    pub base_url: String,
    pub api_key: String,
    /// Features endpoints use a much longer per-request deadline (spec §4.4).
    pub request_timeout: Duration,
    pub requests_per_minute: u32,
    pub min_request_interval: Duration,
    pub max_retries: u32,
    /// Process-wide cap on concurrent requests to this upstream (spec §4.4, §5).
    pub global_semaphore_capacity: usize,
}

impl FeaturesConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: std::env::var("FEATURES_BASE_URL")
                .unwrap_or_else(|_| "https://api.features.example.com/v1".to_string()),
            api_key: std::env::var("FEATURES_API_KEY").unwrap_or_default(),
            request_timeout: Duration::from_secs(180),
            requests_per_minute: 60,
            min_request_interval: Duration::from_millis(200),
            max_retries: 3,
            global_semaphore_capacity: 5,
        })
    }
}

/// Cache TTLs, one constant per category (spec §6 table).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub redis_url: String,
    pub memory_max_size: usize,
    pub user_profile_ttl: Duration,
    pub top_tracks_ttl: Duration,
    pub top_artists_ttl: Duration,
    pub artist_top_tracks_ttl: Duration,
    pub recommendations_ttl: Duration,
    pub mood_analysis_ttl: Duration,
    pub workflow_state_ttl: Duration,
    pub track_details_ttl: Duration,
    pub workflow_artifacts_ttl: Duration,
    pub validated_seeds_ttl: Duration,
    pub artist_enrichment_ttl: Duration,
    pub popular_mood_cache_ttl: Duration,
    pub missing_id_ttl: Duration,
    pub validated_id_ttl: Duration,
    pub deny_list_ttl: Duration,
    pub anchor_tracks_ttl: Duration,
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("CACHE_REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            memory_max_size: 10_000,
            user_profile_ttl: Duration::from_secs(3600),
            top_tracks_ttl: Duration::from_secs(1800),
            top_artists_ttl: Duration::from_secs(1800),
            artist_top_tracks_ttl: Duration::from_secs(7200),
            recommendations_ttl: Duration::from_secs(1800),
            mood_analysis_ttl: Duration::from_secs(3600),
            workflow_state_ttl: Duration::from_secs(300),
            track_details_ttl: Duration::from_secs(7200),
            workflow_artifacts_ttl: Duration::from_secs(1800),
            validated_seeds_ttl: Duration::from_secs(7200),
            artist_enrichment_ttl: Duration::from_secs(3600),
            popular_mood_cache_ttl: Duration::from_secs(14_400),
            missing_id_ttl: Duration::from_secs(7_776_000),
            validated_id_ttl: Duration::from_secs(15_552_000),
            deny_list_ttl: Duration::from_secs(86_400),
            anchor_tracks_ttl: Duration::from_secs(900),
        }
    }
}

/// Orchestrator tuning knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_iterations: u32,
    /// Canonical per spec §9's Open Questions resolution: 0.60, not 0.65/0.75.
    pub cohesion_threshold: f64,
    pub artist_discovery_ratio: f64,
    pub seed_based_ratio: f64,
    pub max_anchor_count: usize,
    pub min_anchor_count: usize,
    pub max_negative_seeds: usize,
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        Self {
            max_iterations: 2,
            cohesion_threshold: 0.60,
            artist_discovery_ratio: 0.98,
            seed_based_ratio: 0.02,
            max_anchor_count: 8,
            min_anchor_count: 3,
            max_negative_seeds: 5,
        }
    }
}
