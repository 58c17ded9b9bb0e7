//! Token lifecycle manager (spec §4.5). The OAuth token endpoint itself is
//! a named non-goal (spec §1: "no auth grant flow"), so the exchange call
//! is a pluggable [`TokenExchanger`] trait, the same shape `MoodLlm`
//! (§4.6) uses for the LLM.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, RwLock};
use tracing::{info, warn};

use crate::cache::CacheManager;
use crate::error::Result;

const TOKEN_CATEGORY: &str = "oauth_tokens";
const TOKEN_RECORD_TTL_SECS: i64 = 86_400 * 60;
/// Validity margin (spec §4.5): a token counts as invalid once fewer than
/// this remains before `expires_at`.
const REFRESH_MARGIN: Duration = Duration::minutes(5);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at - REFRESH_MARGIN
    }
}

#[derive(Debug, Clone)]
pub struct TokenExchangeResult {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in_seconds: i64,
}

/// The OAuth refresh-grant call, left pluggable since implementing the
/// grant flow itself is out of scope (spec §1).
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenExchangeResult>;
}

pub struct TokenManager<E: TokenExchanger> {
    cache: Arc<CacheManager>,
    exchanger: Arc<E>,
    /// Hot path for `ensure_valid_token`: avoids a cache round-trip on
    /// every call from an in-flight workflow.
    hot_cache: RwLock<HashMap<String, TokenRecord>>,
}

impl<E: TokenExchanger + 'static> TokenManager<E> {
    pub fn new(cache: Arc<CacheManager>, exchanger: Arc<E>) -> Self {
        Self {
            cache,
            exchanger,
            hot_cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn store_token(&self, user_id: &str, record: TokenRecord) -> Result<()> {
        self.cache
            .set(TOKEN_CATEGORY, &[user_id], &record, Duration::seconds(TOKEN_RECORD_TTL_SECS))
            .await?;
        self.hot_cache.write().await.insert(user_id.to_string(), record);
        Ok(())
    }

    async fn load_token(&self, user_id: &str) -> Option<TokenRecord> {
        if let Some(record) = self.hot_cache.read().await.get(user_id).cloned() {
            return Some(record);
        }
        self.cache.get::<TokenRecord>(TOKEN_CATEGORY, &[user_id]).await
    }

    /// `now < expires_at - 5min`; if invalid, refreshes via the
    /// exchanger and persists the result atomically (spec §4.5).
    pub async fn ensure_valid_token(&self, user_id: &str) -> Result<String> {
        if let Some(record) = self.load_token(user_id).await {
            if record.is_valid() {
                return Ok(record.access_token);
            }
            return self.refresh_user_token(user_id, &record.refresh_token).await;
        }
        Err(crate::error::EngineError::Validation(format!(
            "no token on file for user {user_id}"
        )))
    }

    pub async fn refresh_user_token(&self, user_id: &str, refresh_token: &str) -> Result<String> {
        let exchanged = self.exchanger.exchange_refresh_token(refresh_token).await?;
        let record = TokenRecord {
            access_token: exchanged.access_token.clone(),
            refresh_token: exchanged.refresh_token.unwrap_or_else(|| refresh_token.to_string()),
            expires_at: Utc::now() + Duration::seconds(exchanged.expires_in_seconds),
        };
        self.store_token(user_id, record).await?;
        info!(user_id, "refreshed oauth token");
        Ok(exchanged.access_token)
    }

    /// Background supervisor loop, grounded on the teacher's
    /// `OAuthTokenManager::start`/`start_with_shutdown`: proactively
    /// refreshes tokens nearing expiry so `ensure_valid_token` rarely
    /// blocks an in-flight workflow.
    pub fn start_with_shutdown(
        self: Arc<Self>,
        user_ids: Vec<String>,
        refresh_interval: StdDuration,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(refresh_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        for user_id in &user_ids {
                            if let Some(record) = self.load_token(user_id).await {
                                if !record.is_valid() {
                                    if let Err(err) = self.refresh_user_token(user_id, &record.refresh_token).await {
                                        warn!(user_id, error = %err, "background token refresh failed");
                                    }
                                }
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("token refresh supervisor shutting down");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_invalid_inside_refresh_margin() {
        let record = TokenRecord {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at: Utc::now() + Duration::minutes(3),
        };
        assert!(!record.is_valid());
    }

    #[test]
    fn token_is_valid_well_before_expiry() {
        let record = TokenRecord {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at: Utc::now() + Duration::minutes(30),
        };
        assert!(record.is_valid());
    }
}
