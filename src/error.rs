//! Error taxonomy for the recommendation engine.
//!
//! Every stage returns `Result<T>` instead of raising; the orchestrator is
//! the only place that turns an `Err` into workflow-state bookkeeping
//! (`state.metadata.stage_errors`) rather than propagating it further.

use thiserror::Error;

/// Application error type, one variant per category in spec §7.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Timeout, connect failure, 5xx, or 429 with a short `Retry-After`.
    /// The HTTP client already retried internally; this is the final
    /// failure after retries are exhausted.
    #[error("upstream {upstream} transient failure after retries: {message}")]
    Transient { upstream: String, message: String },

    /// 429 with `Retry-After` over 300s, or a non-429 4xx.
    #[error("upstream {upstream} persistent failure (status {status:?}): {message}")]
    Persistent {
        upstream: String,
        status: Option<u16>,
        message: String,
    },

    /// 429 specifically, carrying the server's requested wait.
    #[error("rate limited by {upstream}, retry after {retry_after}s")]
    RateLimited { upstream: String, retry_after: u64 },

    /// Guardrails rejected the request before any call was made.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Catalog ID has no counterpart in the Features service. Not fatal —
    /// callers skip the ID and record it in the ID Registry.
    #[error("id {catalog_id} has no mapping in the Features service")]
    MissingMapping { catalog_id: String },

    /// The LLM call failed or returned unparseable output. Callers fall
    /// back to rule-based paths; this variant exists so the fallback
    /// trigger is explicit rather than inferred from a generic error.
    #[error("mood/intent LLM call failed: {0}")]
    LlmFailure(String),

    /// A named pipeline stage failed outright. Carries the stage name so
    /// the orchestrator can record `state.metadata.stage_errors[stage]`.
    #[error("stage '{stage}' failed: {message}")]
    StageFailure { stage: String, message: String },

    /// No recommendations could be produced at all. Terminal: the
    /// workflow transitions to `Failed`.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("cache backend error: {0}")]
    Cache(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EngineError {
    /// True for error kinds the HTTP client's retry loop should not
    /// treat as transient (matches §7's "Persistent" bucket).
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            EngineError::Persistent { .. } | EngineError::Validation(_)
        )
    }

    /// True for error kinds that should never drop a protected track or
    /// abort a workflow outright (§7's protected-track guarantee).
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, EngineError::Fatal(_))
    }
}

impl From<redis::RedisError> for EngineError {
    fn from(err: redis::RedisError) -> Self {
        EngineError::Cache(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for EngineError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        EngineError::Cache(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistent_and_validation_are_permanent() {
        let persistent = EngineError::Persistent {
            upstream: "features".into(),
            status: Some(400),
            message: "bad request".into(),
        };
        assert!(persistent.is_permanent());

        let validation = EngineError::Validation("empty seed ids".into());
        assert!(validation.is_permanent());

        let transient = EngineError::Transient {
            upstream: "catalog".into(),
            message: "timeout".into(),
        };
        assert!(!transient.is_permanent());
    }

    #[test]
    fn only_fatal_is_unrecoverable() {
        assert!(!EngineError::Fatal("no recommendations".into()).is_recoverable());
        assert!(EngineError::MissingMapping {
            catalog_id: "abc".into()
        }
        .is_recoverable());
    }
}
