//! Smoke-test harness: wires every collaborator together against the
//! real HTTP client plumbing (pointed at whatever `CATALOG_BASE_URL`/
//! `FEATURES_BASE_URL` resolve to) and drives one workflow to
//! completion, logging each stage transition. Not a server — HTTP
//! routing is out of scope for this crate.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Semaphore;
use tracing::info;

use moodlist_engine::config::EngineConfig;
use moodlist_engine::error::Result;
use moodlist_engine::http::{CatalogClient, FeaturesClient};
use moodlist_engine::llm::NullMoodLlm;
use moodlist_engine::models::workflow::WorkflowStatus;
use moodlist_engine::token_manager::{TokenExchangeResult, TokenExchanger, TokenManager, TokenRecord};
use moodlist_engine::{AnchorSelector, ArtistDiscoveryStrategy, CacheManager, CandidateStrategy, FallbackStrategy, IdRegistry, Orchestrator, SeedBasedStrategy, SeedGatherer, SeedGuardrails, UserAnchorStrategy};

/// Always succeeds with a fresh one-hour token; the real OAuth grant flow
/// is out of scope for this crate (spec §1).
struct StubTokenExchanger;

#[async_trait]
impl TokenExchanger for StubTokenExchanger {
    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenExchangeResult> {
        Ok(TokenExchangeResult {
            access_token: format!("smoke-access-{refresh_token}"),
            refresh_token: Some(refresh_token.to_string()),
            expires_in_seconds: 3600,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = EngineConfig::from_env()?;
    let cache = Arc::new(CacheManager::new(&config.cache, "moodlist:")?);

    let catalog = Arc::new(CatalogClient::new(&config.catalog)?);
    let features_semaphore = Arc::new(Semaphore::new(config.features.global_semaphore_capacity));
    let features = Arc::new(FeaturesClient::new(&config.features, features_semaphore)?);

    let id_registry = Arc::new(IdRegistry::new(cache.clone()));
    let guardrails = Arc::new(SeedGuardrails::new(cache.clone()));
    let anchor_selector = Arc::new(AnchorSelector::new(catalog.clone(), cache.clone()));
    let seed_gatherer = Arc::new(SeedGatherer::new(catalog.clone(), features.clone(), cache.clone(), id_registry.clone()));

    let exchanger = Arc::new(StubTokenExchanger);
    let token_manager = Arc::new(TokenManager::new(cache.clone(), exchanger));

    let user_id = "smoke-test-user".to_string();
    token_manager
        .store_token(
            &user_id,
            TokenRecord {
                access_token: "smoke-access-initial".to_string(),
                refresh_token: "smoke-refresh".to_string(),
                expires_at: Utc::now() + Duration::hours(1),
            },
        )
        .await?;

    let llm = Arc::new(NullMoodLlm);
    let primary_strategies: Vec<Arc<dyn CandidateStrategy>> = vec![
        Arc::new(UserAnchorStrategy),
        Arc::new(ArtistDiscoveryStrategy),
        Arc::new(SeedBasedStrategy),
    ];
    let fallback_strategy: Arc<dyn CandidateStrategy> = Arc::new(FallbackStrategy);

    let orchestrator = Arc::new(Orchestrator::new(
        catalog,
        features,
        cache,
        guardrails,
        id_registry,
        anchor_selector,
        seed_gatherer,
        token_manager,
        llm,
        primary_strategies,
        fallback_strategy,
        config.orchestrator,
    ));

    let session_id = orchestrator.clone().start(user_id, "a chill rainy evening, especially anything like Feels Like by Gracie Abrams".to_string());
    info!(%session_id, "workflow started");

    loop {
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        let Some(state) = orchestrator.get_state(session_id).await else {
            continue;
        };
        if state.status.is_terminal() {
            info!(%session_id, status = ?state.status, recommendations = state.recommendations.len(), "workflow finished");
            if state.status != WorkflowStatus::Completed {
                info!(%session_id, stage_errors = ?state.metadata.stage_errors, "workflow did not complete cleanly");
            }
            break;
        }
    }

    Ok(())
}
