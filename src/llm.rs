//! The LLM used for mood/intent analysis and user-mention extraction is an
//! opaque capability (spec §1, Design Notes: "LLM calls as pluggable
//! interface"). The engine depends only on this trait's prompt/response
//! contract, never on a vendor's request/response shape.

use async_trait::async_trait;

use crate::error::{EngineError, Result};

#[async_trait]
pub trait MoodLlm: Send + Sync {
    /// Sends a system prompt plus a user prompt, returns the raw
    /// completion text. Callers are responsible for extracting and
    /// validating JSON from the response (spec §4.6).
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Deterministic test double returning a fixed completion regardless of
/// input, so mood-engine and anchor-selector tests can exercise the
/// primary (LLM) path without a real vendor call.
pub struct StubMoodLlm {
    pub response: String,
}

impl StubMoodLlm {
    pub fn new(response: impl Into<String>) -> Self {
        Self { response: response.into() }
    }
}

#[async_trait]
impl MoodLlm for StubMoodLlm {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
        Ok(self.response.clone())
    }
}

/// Always-fails test double used to exercise the rule-based fallback path
/// (spec §4.6/§7: "LLM failures ... fall back to the rule-based mood
/// engine").
pub struct NullMoodLlm;

#[async_trait]
impl MoodLlm for NullMoodLlm {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
        Err(EngineError::LlmFailure("no LLM configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_llm_returns_configured_response() {
        let llm = StubMoodLlm::new("{}");
        assert_eq!(llm.complete("sys", "user").await.unwrap(), "{}");
    }

    #[tokio::test]
    async fn null_llm_always_fails() {
        let llm = NullMoodLlm;
        assert!(llm.complete("sys", "user").await.is_err());
    }
}
