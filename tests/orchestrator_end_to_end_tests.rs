//! End-to-end integration tests driving the orchestrator against mocked
//! Catalog and Features upstreams, and a couple of upstream-contract
//! tests for the rate-limited HTTP client's 429/Retry-After handling
//! (spec §8's end-to-end scenarios and boundary behaviors).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::Semaphore;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use moodlist_engine::config::{CacheConfig, CatalogConfig, FeaturesConfig, OrchestratorConfig};
use moodlist_engine::error::Result;
use moodlist_engine::http::{CatalogClient, FeaturesClient};
use moodlist_engine::llm::NullMoodLlm;
use moodlist_engine::models::workflow::WorkflowStatus;
use moodlist_engine::token_manager::{TokenExchangeResult, TokenExchanger, TokenManager, TokenRecord};
use moodlist_engine::{
    AnchorSelector, ArtistDiscoveryStrategy, CacheManager, CandidateStrategy, FallbackStrategy, IdRegistry,
    Orchestrator, SeedBasedStrategy, SeedGatherer, SeedGuardrails, UserAnchorStrategy,
};

struct StubTokenExchanger;

#[async_trait]
impl TokenExchanger for StubTokenExchanger {
    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenExchangeResult> {
        Ok(TokenExchangeResult {
            access_token: format!("access-{refresh_token}"),
            refresh_token: Some(refresh_token.to_string()),
            expires_in_seconds: 3600,
        })
    }
}

fn test_cache_config() -> CacheConfig {
    let mut config = CacheConfig::from_env();
    // Tests never touch a real Redis instance: the distributed backend
    // degrades to "miss"/no-op on connection failure (spec §4.1), so a
    // pool that can never reach this address is fine for these tests.
    config.redis_url = "redis://127.0.0.1:1".to_string();
    config
}

fn catalog_config(base_url: &str) -> CatalogConfig {
    CatalogConfig {
        base_url: base_url.to_string(),
        client_id: String::new(),
        client_secret: String::new(),
        request_timeout: Duration::from_secs(5),
        requests_per_minute: 600,
        min_request_interval: Duration::from_millis(1),
        max_retries: 1,
    }
}

fn features_config(base_url: &str) -> FeaturesConfig {
    FeaturesConfig {
        base_url: base_url.to_string(),
        api_key: String::new(),
        request_timeout: Duration::from_secs(5),
        requests_per_minute: 600,
        min_request_interval: Duration::from_millis(1),
        max_retries: 1,
        global_semaphore_capacity: 5,
    }
}

/// Mounts the Catalog endpoints the orchestrator's happy path touches:
/// top tracks, top artists, and artist search (used by the fallback
/// strategy when no seeds resolve).
async fn setup_catalog_mocks(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/me/top/tracks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {
                    "id": "cat_track_1",
                    "name": "Warm Nights",
                    "artists": [{"id": "cat_artist_1", "name": "Gracie Abrams", "genres": [], "popularity": 70}],
                    "uri": "spotify:track:cat_track_1",
                    "popularity": 70,
                    "album": {"release_date": "2023-05-01"}
                }
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/me/top/artists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"id": "cat_artist_1", "name": "Gracie Abrams", "genres": ["pop"], "popularity": 70}
            ]
        })))
        .mount(server)
        .await;

    // Also backs the orchestrator's post-loop enrichment pass (spec
    // §4.13), which re-resolves every seed-based recommendation (those
    // never carry a Catalog URI) by searching on `track name` here and
    // matching by fuzzy name overlap — hence entries for both tracks
    // the Features mock's `/track-recommendation` response returns.
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tracks": {"items": [
                {
                    "id": "cat_track_2",
                    "name": "Quiet Hours",
                    "artists": [{"id": "cat_artist_2", "name": "Men I Trust", "genres": [], "popularity": 60}],
                    "uri": "spotify:track:cat_track_2",
                    "popularity": 60,
                    "album": {"release_date": "2021-01-01"}
                },
                {
                    "id": "cat_track_3",
                    "name": "Slow Burn",
                    "artists": [{"id": "cat_artist_3", "name": "Clairo", "genres": [], "popularity": 55}],
                    "uri": "spotify:track:cat_track_3",
                    "popularity": 55,
                    "album": {"release_date": "2019-01-01"}
                }
            ]},
            "artists": {"items": [{"id": "cat_artist_1", "name": "Gracie Abrams", "genres": ["pop"], "popularity": 70}]}
        })))
        .mount(server)
        .await;
}

/// Mounts the Features endpoints: bulk track resolution (ID Registry),
/// the seed-based recommendation call, and audio features.
async fn setup_features_mocks(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/tracks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "cat_track_1", "name": "Warm Nights", "artists": ["Gracie Abrams"]}
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/track-recommendation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tracks": [
                {"id": "feat_track_2", "name": "Quiet Hours", "artists": ["Men I Trust"]},
                {"id": "feat_track_3", "name": "Slow Burn", "artists": ["Clairo"]}
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search/artists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "feat_artist_1", "name": "Men I Trust"}
        ])))
        .mount(server)
        .await;

    Mock::given(wiremock::matchers::path_regex(r"^/track/.+/audio-features$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "feat_track_2",
            "energy": 0.5,
            "valence": 0.5,
            "danceability": 0.5,
            "acousticness": 0.4
        })))
        .mount(server)
        .await;
}

#[allow(clippy::too_many_arguments)]
async fn build_orchestrator(
    catalog_server: &MockServer,
    features_server: &MockServer,
) -> (Arc<Orchestrator<StubTokenExchanger>>, String) {
    let cache = Arc::new(CacheManager::new(&test_cache_config(), "moodlist-test:").unwrap());
    let catalog = Arc::new(CatalogClient::new(&catalog_config(&catalog_server.uri())).unwrap());
    let features_semaphore = Arc::new(Semaphore::new(5));
    let features = Arc::new(FeaturesClient::new(&features_config(&features_server.uri()), features_semaphore).unwrap());

    let id_registry = Arc::new(IdRegistry::new(cache.clone()));
    let guardrails = Arc::new(SeedGuardrails::new(cache.clone()));
    let anchor_selector = Arc::new(AnchorSelector::new(catalog.clone(), cache.clone()));
    let seed_gatherer = Arc::new(SeedGatherer::new(catalog.clone(), features.clone(), cache.clone(), id_registry.clone()));

    let exchanger = Arc::new(StubTokenExchanger);
    let token_manager = Arc::new(TokenManager::new(cache.clone(), exchanger));
    let user_id = "integration-test-user".to_string();
    token_manager
        .store_token(
            &user_id,
            TokenRecord {
                access_token: "initial-access".to_string(),
                refresh_token: "initial-refresh".to_string(),
                expires_at: Utc::now() + chrono::Duration::hours(1),
            },
        )
        .await
        .unwrap();

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
        OrchestratorConfig::from_env(),
    ));
    (orchestrator, user_id)
}

#[tokio::test]
async fn workflow_reaches_completed_with_mocked_upstreams() {
    let catalog_server = MockServer::start().await;
    let features_server = MockServer::start().await;
    setup_catalog_mocks(&catalog_server).await;
    setup_features_mocks(&features_server).await;

    let (orchestrator, user_id) = build_orchestrator(&catalog_server, &features_server).await;
    let session_id = orchestrator.clone().start(user_id, "a chill rainy evening".to_string());

    let mut final_state = None;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if let Some(state) = orchestrator.get_state(session_id).await {
            if state.status.is_terminal() {
                final_state = Some(state);
                break;
            }
        }
    }

    let state = final_state.expect("workflow did not reach a terminal state in time");
    assert_eq!(state.status, WorkflowStatus::Completed, "stage_errors: {:?}", state.metadata.stage_errors);
    assert!(!state.recommendations.is_empty());
    // No two recommendations share a track id (spec §8 invariant 6).
    let mut ids: Vec<&str> = state.recommendations.iter().map(|t| t.track_id.as_str()).collect();
    ids.sort_unstable();
    let unique = {
        let mut d = ids.clone();
        d.dedup();
        d
    };
    assert_eq!(ids.len(), unique.len());
}

#[tokio::test]
async fn named_track_mention_survives_as_a_protected_user_anchor() {
    let catalog_server = MockServer::start().await;
    let features_server = MockServer::start().await;

    // Only one `/search` mock here (unlike `setup_catalog_mocks`'s): the
    // anchor selector's pattern-matching fallback needs it to resolve the
    // explicitly-mentioned track, and mounting two mocks for the same
    // route on one server leaves the match ambiguous.
    Mock::given(method("GET"))
        .and(path("/me/top/tracks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .mount(&catalog_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me/top/artists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .mount(&catalog_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tracks": {"items": [
                {
                    "id": "mentioned_track",
                    "name": "Feels Like",
                    "artists": [{"id": "a1", "name": "Gracie Abrams", "genres": [], "popularity": 80}],
                    "uri": "spotify:track:mentioned_track",
                    "popularity": 80,
                    "album": {"release_date": "2024-01-01"}
                }
            ]},
            "artists": {"items": []}
        })))
        .mount(&catalog_server)
        .await;
    setup_features_mocks(&features_server).await;

    let (orchestrator, user_id) = build_orchestrator(&catalog_server, &features_server).await;
    let session_id = orchestrator
        .clone()
        .start(user_id, "chill evening, especially Feels Like".to_string());

    let mut final_state = None;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if let Some(state) = orchestrator.get_state(session_id).await {
            if state.status.is_terminal() {
                final_state = Some(state);
                break;
            }
        }
    }

    let state = final_state.expect("workflow did not reach a terminal state in time");
    assert_eq!(state.status, WorkflowStatus::Completed, "stage_errors: {:?}", state.metadata.stage_errors);
    let mentioned = state
        .recommendations
        .iter()
        .find(|t| t.track_name.eq_ignore_ascii_case("Feels Like"))
        .expect("explicitly mentioned track missing from final recommendations");
    assert!(mentioned.protected);
    assert_eq!(mentioned.confidence_score, 1.0);
}

#[tokio::test]
async fn features_429_with_long_retry_after_fails_fast_without_sleeping() {
    let features_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/track-recommendation"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "500"))
        .mount(&features_server)
        .await;

    let features = FeaturesClient::new(&features_config(&features_server.uri()), Arc::new(Semaphore::new(5))).unwrap();

    let started = std::time::Instant::now();
    let result = features.recommend(&["seed1".to_string()], &[], 20).await;
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_secs(5), "client slept instead of failing fast: {elapsed:?}");
    match result {
        Err(moodlist_engine::error::EngineError::RateLimited { retry_after, .. }) => {
            assert_eq!(retry_after, 500);
        }
        other => panic!("expected RateLimited{{retry_after: 500}}, got {other:?}"),
    }
}

#[tokio::test]
async fn features_5xx_is_retried_then_succeeds() {
    let features_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tracks"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&features_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tracks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "t1", "name": "Recovered Track", "artists": ["Someone"]}
        ])))
        .mount(&features_server)
        .await;

    let mut config = features_config(&features_server.uri());
    config.max_retries = 3;
    let features = FeaturesClient::new(&config, Arc::new(Semaphore::new(5))).unwrap();

    let result = features.get_multiple_tracks(&["t1".to_string()]).await.unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].name, "Recovered Track");
}
