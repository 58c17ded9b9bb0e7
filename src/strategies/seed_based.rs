//! Seed-based strategy (spec §4.9.3): chunks seed IDs into groups of 3,
//! fans out concurrent `recommend` calls through the Seed Guardrails,
//! and retries once on the guardrails' suggested repair before giving up.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::error::{EngineError, Result};
use crate::http::features::RecommendationResponse;
use crate::models::track::{AnchorType, TrackRecommendation, TrackSource};
use crate::scoring;
use crate::seed_guardrails::{FallbackStrategy, SeedGuardrails};

use super::{CandidateStrategy, GenerationContext};

const SEED_CHUNK_SIZE: usize = 3;
const MAX_CONCURRENT_RECOMMEND_CALLS: usize = 10;

pub struct SeedBasedStrategy;

#[async_trait]
impl CandidateStrategy for SeedBasedStrategy {
    fn name(&self) -> &'static str {
        "seed_based"
    }

    async fn generate(&self, ctx: &GenerationContext<'_>) -> Result<Vec<TrackRecommendation>> {
        if ctx.seed_ids.is_empty() {
            return Ok(Vec::new());
        }
        let chunks: Vec<Vec<String>> = ctx.seed_ids.chunks(SEED_CHUNK_SIZE).map(<[String]>::to_vec).collect();
        let per_chunk_size = (ctx.target_count / chunks.len().max(1)).max(1) as u32;
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_RECOMMEND_CALLS));

        let mut handles = Vec::new();
        for chunk in chunks {
            let semaphore = semaphore.clone();
            let negatives = ctx.negative_seed_ids.to_vec();
            handles.push(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                recommend_for_chunk(ctx, &chunk, &negatives, per_chunk_size).await
            });
        }
        let results = futures::future::join_all(handles).await;

        let mut tracks = Vec::new();
        for result in results {
            match result {
                Ok(mut found) => tracks.append(&mut found),
                Err(err) => warn!(error = %err, "seed-based strategy: chunk failed"),
            }
        }
        Ok(tracks)
    }
}

async fn recommend_for_chunk(ctx: &GenerationContext<'_>, seeds: &[String], negatives: &[String], size: u32) -> Result<Vec<TrackRecommendation>> {
    if let Some(reason) = ctx.guardrails.is_combination_denied(seeds, negatives, &[]).await {
        return Err(EngineError::Validation(format!("seed combination denied: {reason}")));
    }
    let balanced = ctx
        .guardrails
        .validate_and_auto_balance(seeds, negatives, &[])
        .await
        .map_err(EngineError::Validation)?;

    match ctx.features.recommend(&balanced.seeds, &balanced.negatives, size).await {
        Ok(response) => Ok(to_recommendations(response, ctx)),
        Err(err) => retry_with_fallback(ctx, seeds, negatives, size, err).await,
    }
}

async fn retry_with_fallback(
    ctx: &GenerationContext<'_>,
    seeds: &[String],
    negatives: &[String],
    size: u32,
    err: EngineError,
) -> Result<Vec<TrackRecommendation>> {
    if SeedGuardrails::should_skip_retry(&err.to_string()) {
        if matches!(err, EngineError::Persistent { .. }) {
            let _ = ctx.guardrails.add_to_deny_list(seeds, negatives, &[], &err.to_string()).await;
        }
        return Err(err);
    }

    let Some(strategy) = SeedGuardrails::suggest_fallback_strategy(seeds, negatives, &err.to_string()) else {
        return Err(err);
    };
    let (retry_seeds, retry_negatives) = apply_fallback(seeds, negatives, &strategy);

    match ctx.features.recommend(&retry_seeds, &retry_negatives, size).await {
        Ok(response) => Ok(to_recommendations(response, ctx)),
        Err(retry_err) => {
            if matches!(retry_err, EngineError::Persistent { .. }) {
                let _ = ctx
                    .guardrails
                    .add_to_deny_list(&retry_seeds, &retry_negatives, &[], &retry_err.to_string())
                    .await;
            }
            Err(retry_err)
        }
    }
}

fn apply_fallback(seeds: &[String], negatives: &[String], strategy: &FallbackStrategy) -> (Vec<String>, Vec<String>) {
    match strategy {
        FallbackStrategy::DropNegativeSeeds | FallbackStrategy::RemoveAllNegatives => (seeds.to_vec(), Vec::new()),
        FallbackStrategy::ReduceNegativeSeeds { keep } => (seeds.to_vec(), negatives.iter().take(*keep).cloned().collect()),
        FallbackStrategy::ReduceSeeds { keep_seeds } => (keep_seeds.clone(), negatives.to_vec()),
    }
}

fn to_recommendations(response: RecommendationResponse, ctx: &GenerationContext<'_>) -> Vec<TrackRecommendation> {
    response
        .tracks
        .into_iter()
        .map(|track| {
            let score = scoring::confidence_score(None, &HashMap::new(), &ctx.mood_analysis.target_features, None, TrackSource::Reccobeat);
            TrackRecommendation::new(
                track.id,
                track.name,
                track.artists,
                None,
                score,
                HashMap::new(),
                "seed-based recommendation".to_string(),
                TrackSource::Reccobeat,
                false,
                false,
                AnchorType::None,
                None,
            )
        })
        .collect()
}
