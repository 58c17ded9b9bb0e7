//! `HttpTool`: one rate-limited, circuit-broken HTTP client every upstream
//! wrapper is built from (spec §4.4). Composition, not inheritance — see
//! Design Notes: a single concrete struct parameterized by config, instead
//! of a `BaseTool` hierarchy.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::error::{EngineError, Result};

use super::rate_limit::{CircuitBreaker, CircuitBreakerConfig, SlidingWindowLimiter};

const MAX_RETRY_AFTER_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct HttpToolConfig {
    pub base_url: String,
    pub requests_per_minute: u32,
    pub min_request_interval: Duration,
    pub retry_policy: RetryPolicy,
    pub global_semaphore: Option<Arc<Semaphore>>,
}

/// One shared `reqwest::Client` per upstream base URL, built once with the
/// connection pool settings spec §4.4 specifies, composed with a sliding
/// window limiter and a circuit breaker.
pub struct HttpTool {
    client: Client,
    base_url: String,
    limiter: SlidingWindowLimiter,
    breaker: CircuitBreaker,
    retry_policy: RetryPolicy,
    global_semaphore: Option<Arc<Semaphore>>,
}

impl HttpTool {
    pub fn new(config: HttpToolConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(30))
            .timeout(config.retry_policy.timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url,
            limiter: SlidingWindowLimiter::new(config.requests_per_minute, config.min_request_interval),
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            retry_policy: config.retry_policy,
            global_semaphore: config.global_semaphore,
        })
    }

    /// Authenticated GET against `path`, with query params serialized the
    /// way spec §4.4 requires: list-valued params comma-joined.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        bearer_token: Option<&str>,
        query: &[(&str, String)],
    ) -> Result<T> {
        self.request_json(Method::GET, path, bearer_token, query, None).await
    }

    /// Authenticated POST with a JSON body, used for playlist creation,
    /// track addition, and cover upload (spec §6).
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        bearer_token: Option<&str>,
        body: serde_json::Value,
    ) -> Result<T> {
        self.request_json(Method::POST, path, bearer_token, &[], Some(body)).await
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        bearer_token: Option<&str>,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            if !self.breaker.allow_request().await {
                return Err(EngineError::Persistent {
                    upstream: self.base_url.clone(),
                    status: None,
                    message: "circuit breaker open".to_string(),
                });
            }
            let _permit = match &self.global_semaphore {
                Some(semaphore) => Some(semaphore.acquire().await.map_err(|err| EngineError::StageFailure {
                    stage: "http_client".to_string(),
                    message: err.to_string(),
                })?),
                None => None,
            };
            self.limiter.acquire().await;
            match self
                .execute_once::<T>(method.clone(), &url, bearer_token, query, body.as_ref())
                .await
            {
                Ok(value) => {
                    self.breaker.record_success().await;
                    return Ok(value);
                }
                Err(err) => {
                    let wait = self.handle_attempt_error(err, attempt).await?;
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    async fn execute_once<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        bearer_token: Option<&str>,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        let mut request = self.client.request(method, url);
        if let Some(token) = bearer_token {
            request = request.bearer_auth(token);
        }
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok());
            return Err(EngineError::RateLimited {
                upstream: url.to_string(),
                retry_after: retry_after.unwrap_or(0),
            });
        }
        if status.is_server_error() {
            return Err(EngineError::Transient {
                upstream: url.to_string(),
                message: format!("status {status}"),
            });
        }
        if status.is_client_error() {
            return Err(EngineError::Persistent {
                upstream: url.to_string(),
                status: Some(status.as_u16()),
                message: format!("status {status}"),
            });
        }
        Ok(response.json::<T>().await?)
    }

    /// Decides, for a failed attempt, whether to retry (returning the
    /// backoff duration to sleep first) or give up (returning the error).
    async fn handle_attempt_error(&self, err: EngineError, attempt: u32) -> Result<Duration> {
        match &err {
            EngineError::RateLimited { retry_after, .. } => {
                self.breaker.record_failure().await;
                if *retry_after > MAX_RETRY_AFTER_SECS {
                    return Err(err);
                }
                if attempt >= self.retry_policy.max_attempts {
                    return Err(err);
                }
                if *retry_after > 0 {
                    return Ok(Duration::from_secs(*retry_after));
                }
                let backoff = 2.0 * 2f64.powi(attempt as i32 + 1);
                Ok(Duration::from_secs_f64(backoff))
            }
            EngineError::Transient { .. } => {
                self.breaker.record_failure().await;
                if attempt >= self.retry_policy.max_attempts {
                    warn!(attempt, "giving up after max retries on transient failure");
                    return Err(err);
                }
                let backoff = 0.5 * 2f64.powi(attempt as i32);
                info!(attempt, backoff_secs = backoff, "retrying after transient failure");
                Ok(Duration::from_secs_f64(backoff))
            }
            EngineError::Persistent { .. } => {
                self.breaker.record_failure().await;
                Err(err)
            }
            EngineError::Http(_) => {
                self.breaker.record_failure().await;
                if attempt >= self.retry_policy.max_attempts {
                    return Err(err);
                }
                let backoff = 0.5 * 2f64.powi(attempt as i32);
                Ok(Duration::from_secs_f64(backoff))
            }
            _ => Err(err),
        }
    }
}
