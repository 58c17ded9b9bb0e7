//! Candidate Generators (spec §4.9): four independent strategies behind
//! one trait, composed over inheritance per Design Notes — each strategy
//! is a struct implementing [`CandidateStrategy`], not a subclass of a
//! shared base tool.

pub mod artist_discovery;
pub mod fallback;
pub mod seed_based;
pub mod user_anchor;

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::CacheManager;
use crate::error::Result;
use crate::http::catalog::CatalogClient;
use crate::http::features::FeaturesClient;
use crate::models::anchor::AnchorCandidate;
use crate::models::mood::MoodAnalysis;
use crate::models::track::TrackRecommendation;
use crate::seed_guardrails::SeedGuardrails;

pub use artist_discovery::ArtistDiscoveryStrategy;
pub use fallback::FallbackStrategy;
pub use seed_based::SeedBasedStrategy;
pub use user_anchor::UserAnchorStrategy;

/// Shared collaborators and per-run inputs every strategy needs. Cheap to
/// construct per iteration since every field is an `Arc` clone or a
/// borrow.
pub struct GenerationContext<'a> {
    pub catalog: Arc<CatalogClient>,
    pub features: Arc<FeaturesClient>,
    pub cache: Arc<CacheManager>,
    pub guardrails: Arc<SeedGuardrails>,
    pub token: &'a str,
    pub mood_analysis: &'a MoodAnalysis,
    pub anchors: &'a [AnchorCandidate],
    pub seed_ids: &'a [String],
    pub negative_seed_ids: &'a [String],
    pub target_count: usize,
}

#[async_trait]
pub trait CandidateStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn generate(&self, ctx: &GenerationContext<'_>) -> Result<Vec<TrackRecommendation>>;
}
