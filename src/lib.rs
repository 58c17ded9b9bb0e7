//! Mood-based playlist recommendation orchestration engine.
//!
//! Interleaves mood analysis, anchor selection, seed gathering,
//! multi-strategy candidate generation, scoring, diversity enforcement,
//! and ratio capping behind a single [`orchestrator::Orchestrator`], atop
//! a namespaced cache, a cross-service ID registry, seed-combination
//! guardrails, rate-limited HTTP clients, and an OAuth token manager.

pub mod anchor_selector;
pub mod background_tasks;
pub mod cache;
pub mod config;
pub mod diversity;
pub mod error;
pub mod fuzzy;
pub mod http;
pub mod id_registry;
pub mod llm;
pub mod models;
pub mod mood_engine;
pub mod orchestrator;
pub mod ratio_enforcer;
pub mod scoring;
pub mod scripts;
pub mod seed_gatherer;
pub mod seed_guardrails;
pub mod strategies;
pub mod token_manager;

pub use anchor_selector::AnchorSelector;
pub use background_tasks::{PopularMoodPrecomputer, UserCacheWarmer};
pub use cache::CacheManager;
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use id_registry::IdRegistry;
pub use llm::MoodLlm;
pub use orchestrator::Orchestrator;
pub use seed_gatherer::SeedGatherer;
pub use seed_guardrails::SeedGuardrails;
pub use strategies::{ArtistDiscoveryStrategy, CandidateStrategy, FallbackStrategy, SeedBasedStrategy, UserAnchorStrategy};
pub use token_manager::{TokenExchanger, TokenManager};
